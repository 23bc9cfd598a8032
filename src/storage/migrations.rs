//! Versioned schema migrations.
//!
//! Each step is idempotent: it inspects the live schema before acting, so a
//! database created by an older release (which never recorded a version) is
//! brought forward by the same list. The applied version is kept in
//! `PRAGMA user_version`. All pending steps run inside one transaction; if
//! any step fails nothing is committed.

use rusqlite::{Connection, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use super::schema::{self, ColumnKind, SURVEY_TABLE};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Migration {version} ({name}) failed: {source}")]
    Step {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// One ordered schema change.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_survey_responses",
        apply: create_survey_responses,
    },
    Migration {
        version: 2,
        name: "rebuild_legacy_layout",
        apply: rebuild_legacy_layout,
    },
    Migration {
        version: 3,
        name: "create_users",
        apply: create_users,
    },
];

/// Latest version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every pending migration. Returns the resulting schema version.
pub fn run(conn: &mut Connection) -> Result<u32, MigrationError> {
    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!("Schema up to date at version {}", current);
        return Ok(current);
    }

    let tx = conn.transaction()?;
    let mut version = current;
    for migration in pending {
        (migration.apply)(&tx).map_err(|source| MigrationError::Step {
            version: migration.version,
            name: migration.name,
            source,
        })?;
        version = migration.version;
        info!("📐 Applied migration {} ({})", migration.version, migration.name);
    }
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;

    Ok(version)
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn create_survey_responses(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if table_exists(tx, SURVEY_TABLE)? {
        return Ok(());
    }
    tx.execute_batch(&schema::create_survey_table_sql(SURVEY_TABLE))
}

/// Rebuild an older table shape into the current layout through a shadow
/// table. Every column shared with the old table is copied; columns the old
/// table never had stay NULL, except ratings which start at 0.
fn rebuild_legacy_layout(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let existing = table_columns(tx, SURVEY_TABLE)?;
    let columns = schema::survey_columns();
    if columns.iter().all(|c| existing.iter().any(|e| e == c.name)) {
        return Ok(());
    }

    let shadow = format!("{SURVEY_TABLE}_new");
    info!(
        "Rebuilding {} ({} of {} columns present)",
        SURVEY_TABLE,
        existing.len(),
        columns.len()
    );

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {shadow}"))?;
    tx.execute_batch(&schema::create_survey_table_sql(&shadow))?;

    let mut targets = Vec::new();
    let mut sources = Vec::new();
    for column in &columns {
        let present = existing.iter().any(|e| e == column.name);
        let source = match (column.kind, present) {
            (ColumnKind::Id, true) => format!("CAST({} AS TEXT)", column.name),
            (ColumnKind::Id, false) => "lower(hex(randomblob(16)))".to_string(),
            (ColumnKind::Rating, true) => format!("COALESCE({}, 0)", column.name),
            (ColumnKind::Rating, false) => "0".to_string(),
            (ColumnKind::RequiredText, true) => format!("COALESCE({}, '')", column.name),
            (ColumnKind::RequiredText, false) => "''".to_string(),
            (ColumnKind::Flag, true) => format!("COALESCE({}, 0)", column.name),
            (ColumnKind::Flag, false) => "0".to_string(),
            (ColumnKind::Timestamp | ColumnKind::Text, true) => column.name.to_string(),
            (ColumnKind::Timestamp | ColumnKind::Text, false) => continue,
        };
        targets.push(column.name);
        sources.push(source);
    }

    let copied = tx.execute(
        &format!(
            "INSERT INTO {shadow} ({}) SELECT {} FROM {SURVEY_TABLE}",
            targets.join(", "),
            sources.join(", ")
        ),
        [],
    )?;
    tx.execute_batch(&format!(
        "DROP TABLE {SURVEY_TABLE}; ALTER TABLE {shadow} RENAME TO {SURVEY_TABLE};"
    ))?;

    info!("Copied {} rows into the current layout", copied);
    Ok(())
}

fn create_users(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(&schema::create_users_table_sql())
}
