//! Persistent storage for survey responses using SQLite.

pub mod migrations;
pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, types::Value, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{FeatureAverages, Features, SurveyDetails, SurveyMetrics, SurveyResponse, SurveySubmission};
use migrations::MigrationError;
use schema::SURVEY_TABLE;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent storage for survey responses
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create storage at the given path and bring the schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Journal mode: {}", mode);
        let storage = Self::with_connection(conn)?;

        info!("💾 Storage opened at {}", path.display());
        Ok(storage)
    }

    /// In-memory database, used by tests and throwaway runs
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, StorageError> {
        let version = migrations::run(&mut conn)?;
        info!("Schema at version {}", version);
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert one response as a single row
    pub fn save_response(&self, response: &SurveyResponse) -> Result<(), StorageError> {
        let s = &response.submission;
        let mut values: Vec<Value> = vec![
            response.id.clone().into(),
            timestamp_value(&response.created_at),
            s.role.clone().into(),
            s.other_role.clone().into(),
            s.cms_usage.clone().into(),
            s.other_cms_usage.clone().into(),
            s.features.offline.into(),
            s.features.collaboration.into(),
            s.features.asset_management.into(),
            s.features.pdf_handling.into(),
            s.features.version_control.into(),
            s.features.workflows.into(),
            s.beta_interest.into(),
            s.email.clone().into(),
        ];
        values.extend(s.details.values().into_iter().map(|v| Value::from(v.clone())));

        let columns = schema::survey_column_names();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {SURVEY_TABLE} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        self.conn().execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Load every response in storage order
    pub fn load_all_responses(&self) -> Result<Vec<SurveyResponse>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {SURVEY_TABLE}",
            schema::survey_column_names().join(", ")
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let responses = stmt
            .query_map([], response_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(responses)
    }

    /// Delete a response by id. Returns the number of rows removed.
    pub fn delete_response(&self, id: &str) -> Result<usize, StorageError> {
        let removed = self
            .conn()
            .execute(&format!("DELETE FROM {SURVEY_TABLE} WHERE id = ?1"), [id])?;
        Ok(removed)
    }

    /// Count, beta-interest count, feature means and grouped distributions
    pub fn compute_metrics(&self) -> Result<SurveyMetrics, StorageError> {
        let conn = self.conn();

        let (total_responses, beta_interest_count, averages) = conn.query_row(
            &format!(
                "SELECT
                    COUNT(*),
                    SUM(CASE WHEN beta_interest = 1 THEN 1 ELSE 0 END),
                    AVG(offline),
                    AVG(collaboration),
                    AVG(asset_management),
                    AVG(pdf_handling),
                    AVG(version_control),
                    AVG(workflows)
                 FROM {SURVEY_TABLE}"
            ),
            [],
            |row| {
                let average = |idx: usize| -> rusqlite::Result<f64> {
                    Ok(round2(row.get::<_, Option<f64>>(idx)?.unwrap_or(0.0)))
                };
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    FeatureAverages {
                        offline: average(2)?,
                        collaboration: average(3)?,
                        asset_management: average(4)?,
                        pdf_handling: average(5)?,
                        version_control: average(6)?,
                        workflows: average(7)?,
                    },
                ))
            },
        )?;

        Ok(SurveyMetrics {
            total_responses,
            beta_interest_count,
            average_feature_scores: averages,
            usage_frequency_stats: group_counts(&conn, "usage_frequency")?,
            team_size_distribution: group_counts(&conn, "team_size")?,
            pricing_preferences: group_counts(&conn, "pricing_model")?,
        })
    }
}

fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::Text(at.to_rfc3339())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Row counts grouped by `column`; NULL groups under "".
fn group_counts(conn: &Connection, column: &str) -> rusqlite::Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM {SURVEY_TABLE} GROUP BY {column}"
    ))?;
    let mut counts = BTreeMap::new();
    for pair in stmt.query_map([], |row| {
        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
    })? {
        let (key, count) = pair?;
        *counts.entry(key.unwrap_or_default()).or_insert(0) += count;
    }
    Ok(counts)
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<SurveyResponse> {
    let rating = |name: &str| -> rusqlite::Result<i64> {
        Ok(row.get::<_, Option<i64>>(name)?.unwrap_or(0))
    };

    let mut details: [Option<String>; 23] = Default::default();
    for (slot, column) in details.iter_mut().zip(SurveyDetails::COLUMNS) {
        *slot = row.get(column)?;
    }

    Ok(SurveyResponse {
        id: row.get("id")?,
        created_at: row
            .get::<_, Option<DateTime<Utc>>>("created_at")?
            .unwrap_or_default(),
        submission: SurveySubmission {
            role: row.get("role")?,
            other_role: row.get("other_role")?,
            cms_usage: row.get("cms_usage")?,
            other_cms_usage: row.get("other_cms_usage")?,
            features: Features {
                offline: rating("offline")?,
                collaboration: rating("collaboration")?,
                asset_management: rating("asset_management")?,
                pdf_handling: rating("pdf_handling")?,
                version_control: rating("version_control")?,
                workflows: rating("workflows")?,
            },
            beta_interest: row.get("beta_interest")?,
            email: row.get("email")?,
            details: SurveyDetails::from_values(details),
        },
    })
}
