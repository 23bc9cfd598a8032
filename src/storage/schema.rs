//! Current layout of the `survey_responses` table.

use crate::types::SurveyDetails;

pub const SURVEY_TABLE: &str = "survey_responses";
pub const USERS_TABLE: &str = "users";

/// How a column is carried over when an older table is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Primary key; legacy integer ids are cast to text.
    Id,
    /// Server-assigned insert time.
    Timestamp,
    /// `NOT NULL` text.
    RequiredText,
    /// Nullable free text.
    Text,
    /// Feature rating; NULL becomes 0.
    Rating,
    /// `NOT NULL` boolean stored as 0/1.
    Flag,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub kind: ColumnKind,
}

const fn column(name: &'static str, sql_type: &'static str, kind: ColumnKind) -> Column {
    Column { name, sql_type, kind }
}

pub const FEATURE_COLUMNS: [&str; 6] = [
    "offline",
    "collaboration",
    "asset_management",
    "pdf_handling",
    "version_control",
    "workflows",
];

const BASE_COLUMNS: [Column; 14] = [
    column("id", "TEXT PRIMARY KEY", ColumnKind::Id),
    column("created_at", "TIMESTAMP DEFAULT CURRENT_TIMESTAMP", ColumnKind::Timestamp),
    column("role", "TEXT NOT NULL", ColumnKind::RequiredText),
    column("other_role", "TEXT", ColumnKind::Text),
    column("cms_usage", "TEXT NOT NULL", ColumnKind::RequiredText),
    column("other_cms_usage", "TEXT", ColumnKind::Text),
    column("offline", "INTEGER", ColumnKind::Rating),
    column("collaboration", "INTEGER", ColumnKind::Rating),
    column("asset_management", "INTEGER", ColumnKind::Rating),
    column("pdf_handling", "INTEGER", ColumnKind::Rating),
    column("version_control", "INTEGER", ColumnKind::Rating),
    column("workflows", "INTEGER", ColumnKind::Rating),
    column("beta_interest", "BOOLEAN NOT NULL", ColumnKind::Flag),
    column("email", "TEXT", ColumnKind::Text),
];

/// Every column of the current layout, in table order.
pub fn survey_columns() -> Vec<Column> {
    BASE_COLUMNS
        .iter()
        .copied()
        .chain(
            SurveyDetails::COLUMNS
                .iter()
                .map(|name| column(name, "TEXT", ColumnKind::Text)),
        )
        .collect()
}

pub fn survey_column_names() -> Vec<&'static str> {
    survey_columns().iter().map(|c| c.name).collect()
}

/// `CREATE TABLE` statement for the current layout under `table`.
pub fn create_survey_table_sql(table: &str) -> String {
    let columns = survey_columns()
        .iter()
        .map(|c| format!("    {} {}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("CREATE TABLE {table} (\n{columns}\n)")
}

pub fn create_users_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {USERS_TABLE} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)"
    )
}
