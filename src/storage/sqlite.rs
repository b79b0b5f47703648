use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    AnalysisRecord, AnalysisStats, DailyCount, Diagnosis, DiseaseDistribution, NewAnalysis,
    RecordStore, UNKNOWN_TYPE,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed analysis history
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database file and bring its schema up to date
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run embedded migrations, then add any column older files are missing
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        self.ensure_image_column().await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Add `image_data` to tables created before images were stored.
    /// Additive only: existing rows keep a NULL image.
    async fn ensure_image_column(&self) -> StorageResult<()> {
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('analysis_history')")
                .fetch_all(&self.pool)
                .await?;

        if columns.iter().any(|(name,)| name == "image_data") {
            return Ok(());
        }

        warn!("analysis_history has no image_data column, adding it");
        sqlx::query("ALTER TABLE analysis_history ADD COLUMN image_data BLOB")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to add image_data column: {}", e),
            })?;

        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn insert(&self, analysis: &NewAnalysis, image: Option<&[u8]>) -> StorageResult<i64> {
        let diagnosis = &analysis.diagnosis;
        let image = image.filter(|bytes| !bytes.is_empty());

        let result = sqlx::query(
            r#"
            INSERT INTO analysis_history
                (timestamp, disease_detected, disease_name, disease_type, severity,
                 confidence, symptoms, possible_causes, treatment, image_filename, image_data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(&analysis.timestamp))
        .bind(diagnosis.disease_detected)
        .bind(&diagnosis.disease_name)
        .bind(&diagnosis.disease_type)
        .bind(diagnosis.severity.map(|s| s.as_str()))
        .bind(diagnosis.confidence)
        .bind(encode_list(&diagnosis.symptoms)?)
        .bind(encode_list(&diagnosis.possible_causes)?)
        .bind(encode_list(&diagnosis.treatment)?)
        .bind(&analysis.image_filename)
        .bind(image)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self, limit: u32) -> StorageResult<Vec<AnalysisRecord>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, timestamp, disease_detected, disease_name, disease_type, severity,
                   confidence, symptoms, possible_causes, treatment, image_filename
            FROM analysis_history_normalized
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_image(&self, id: i64) -> StorageResult<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT image_data FROM analysis_history WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .and_then(|(data,)| data)
            .filter(|bytes| !bytes.is_empty()))
    }

    async fn aggregate_stats(&self) -> StorageResult<AnalysisStats> {
        // One read transaction so the counts and the distribution agree
        let mut tx = self.pool.begin().await?;

        let (total, diseased, healthy, invalid): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN disease_detected = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN COALESCE(disease_detected, 0) = 0
                                   AND COALESCE(disease_type, '') != 'invalid_image'
                                  THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN disease_type = 'invalid_image' THEN 1 ELSE 0 END), 0)
            FROM analysis_history_normalized
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;

        let distribution: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT COALESCE(disease_type, ?) AS kind, COUNT(*) AS n
            FROM analysis_history_normalized
            WHERE disease_detected = 1
            GROUP BY kind
            ORDER BY n DESC, kind ASC
            "#,
        )
        .bind(UNKNOWN_TYPE)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AnalysisStats {
            total_analyses: total,
            disease_detections: diseased,
            healthy_plants: healthy,
            invalid_images: invalid,
            disease_distribution: DiseaseDistribution(distribution),
        })
    }

    async fn daily_counts(&self, days: u32) -> StorageResult<Vec<DailyCount>> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT date(timestamp) AS day, COUNT(*) AS n
            FROM analysis_history_normalized
            WHERE date(timestamp) >= date('now', ?)
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(format!("-{} days", days))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(day, count)| {
                let date = NaiveDate::parse_from_str(day.as_deref()?, "%Y-%m-%d").ok()?;
                Some(DailyCount { date, count })
            })
            .collect())
    }

    async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analysis_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Fixed-width RFC 3339 so lexical order in SQL matches time order
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accept RFC 3339 as well as the naive ISO-8601 timestamps of older rows
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| {
            warn!(timestamp = %raw, "Unparseable timestamp in analysis_history");
            DateTime::<Utc>::default()
        })
}

fn encode_list(items: &[String]) -> StorageResult<String> {
    serde_json::to_string(items).map_err(|e| StorageError::Query {
        message: format!("Failed to encode list column: {}", e),
    })
}

fn decode_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

// Internal row type for SQLx mapping, read from analysis_history_normalized.
// Every column is nullable because rows may predate the current writer.
#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: i64,
    timestamp: String,
    disease_detected: Option<i64>,
    disease_name: Option<String>,
    disease_type: Option<String>,
    severity: Option<String>,
    confidence: Option<f64>,
    symptoms: Option<String>,
    possible_causes: Option<String>,
    treatment: Option<String>,
    image_filename: Option<String>,
}

impl From<AnalysisRow> for AnalysisRecord {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            timestamp: parse_timestamp(&row.timestamp),
            diagnosis: Diagnosis {
                disease_detected: row.disease_detected.is_some_and(|flag| flag != 0),
                disease_name: row.disease_name,
                disease_type: row
                    .disease_type
                    .unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
                severity: row.severity.and_then(|s| s.parse().ok()),
                confidence: row
                    .confidence
                    .filter(|c| c.is_finite())
                    .map_or(0.0, |c| c.clamp(0.0, 100.0)),
                symptoms: decode_list(row.symptoms),
                possible_causes: decode_list(row.possible_causes),
                treatment: decode_list(row.treatment),
            },
            image_filename: row.image_filename.unwrap_or_default(),
        }
    }
}
