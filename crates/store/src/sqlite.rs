//! SQLite persistence backend.
//!
//! Uses a single database file with four tables:
//! - `traces` — one row per trace, steps and running counters as JSON text
//! - `metrics` — write-once snapshots for cheap aggregate queries
//! - `sessions` — one row per lifecycle session, touched per query
//! - `framework_health` — append-only probe history
//!
//! Writes are serialized through an internal lock so concurrent upserts of
//! the same trace cannot interleave. Reads take no lock.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use switchboard_core::{
    HealthInfo, HealthStatus, MetricRecord, RunningMetrics, Step, StoreError, Trace, TraceStatus,
};

use crate::model::{
    FrameworkSummary, HealthSample, MetricsSummary, RecentTrace, TimeSeries, TimeSeriesPoint,
};

/// Production SQLite store for traces, metrics, sessions, and health rows.
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for
    /// tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traces (
                iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                trace_id         TEXT UNIQUE NOT NULL,
                session_id       TEXT NOT NULL,
                started_at       TEXT NOT NULL,
                ended_at         TEXT,
                status           TEXT NOT NULL,
                framework        TEXT NOT NULL,
                model            TEXT NOT NULL,
                vector_store     TEXT NOT NULL,
                query            TEXT NOT NULL,
                response         TEXT,
                duration_seconds REAL,
                input_tokens     INTEGER NOT NULL DEFAULT 0,
                output_tokens    INTEGER NOT NULL DEFAULT 0,
                total_tokens     INTEGER NOT NULL DEFAULT 0,
                input_cost       REAL NOT NULL DEFAULT 0.0,
                output_cost      REAL NOT NULL DEFAULT 0.0,
                total_cost       REAL NOT NULL DEFAULT 0.0,
                error_message    TEXT,
                steps            TEXT NOT NULL DEFAULT '[]',
                running_metrics  TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("traces table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                trace_id      TEXT NOT NULL,
                timestamp     TEXT NOT NULL,
                framework     TEXT NOT NULL,
                model         TEXT NOT NULL,
                vector_store  TEXT NOT NULL,
                input_tokens  INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens  INTEGER NOT NULL DEFAULT 0,
                input_cost    REAL NOT NULL DEFAULT 0.0,
                output_cost   REAL NOT NULL DEFAULT 0.0,
                total_cost    REAL NOT NULL DEFAULT 0.0,
                latency_ms    REAL NOT NULL DEFAULT 0.0,
                status        TEXT NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("metrics table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT UNIQUE NOT NULL,
                started_at  TEXT NOT NULL,
                last_seen   TEXT NOT NULL,
                query_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS framework_health (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                framework   TEXT NOT NULL,
                status      TEXT NOT NULL,
                test_passed INTEGER NOT NULL DEFAULT 0,
                error       TEXT,
                checked_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("framework_health table: {e}")))?;

        for idx in [
            "CREATE INDEX IF NOT EXISTS idx_traces_started_at ON traces(started_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_traces_status ON traces(status)",
            "CREATE INDEX IF NOT EXISTS idx_traces_framework ON traces(framework)",
            "CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_metrics_trace_id ON metrics(trace_id)",
            "CREATE INDEX IF NOT EXISTS idx_health_framework ON framework_health(framework)",
        ] {
            sqlx::query(idx)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("index: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    // ── Traces ────────────────────────────────────────────────────────────

    /// Insert or update a trace. The update path touches only the fields
    /// that legitimately change after creation. Returns `false` on failure.
    pub async fn save_trace(&self, trace: &Trace) -> bool {
        match self.try_save_trace(trace).await {
            Ok(()) => true,
            Err(e) => {
                error!(trace_id = %trace.trace_id, "Failed to save trace: {e}");
                false
            }
        }
    }

    async fn try_save_trace(&self, trace: &Trace) -> Result<(), StoreError> {
        let steps_json = serde_json::to_string(&trace.steps)
            .map_err(|e| StoreError::Storage(format!("Steps serialization: {e}")))?;
        let metrics_json = serde_json::to_string(&trace.metrics)
            .map_err(|e| StoreError::Storage(format!("Running metrics serialization: {e}")))?;

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO traces (
                trace_id, session_id, started_at, ended_at, status,
                framework, model, vector_store, query, response,
                duration_seconds, input_tokens, output_tokens, total_tokens,
                input_cost, output_cost, total_cost, error_message,
                steps, running_metrics
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(trace_id) DO UPDATE SET
                ended_at = excluded.ended_at,
                status = excluded.status,
                response = excluded.response,
                duration_seconds = excluded.duration_seconds,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens,
                total_tokens = excluded.total_tokens,
                input_cost = excluded.input_cost,
                output_cost = excluded.output_cost,
                total_cost = excluded.total_cost,
                error_message = excluded.error_message,
                steps = excluded.steps,
                running_metrics = excluded.running_metrics
            "#,
        )
        .bind(&trace.trace_id)
        .bind(&trace.session_id)
        .bind(trace.started_at.to_rfc3339())
        .bind(trace.ended_at.map(|t| t.to_rfc3339()))
        .bind(trace.status.as_str())
        .bind(&trace.framework)
        .bind(&trace.model)
        .bind(&trace.vector_store)
        .bind(&trace.query)
        .bind(&trace.response)
        .bind(trace.duration_seconds)
        .bind(trace.input_tokens as i64)
        .bind(trace.output_tokens as i64)
        .bind(trace.total_tokens as i64)
        .bind(trace.input_cost)
        .bind(trace.output_cost)
        .bind(trace.total_cost)
        .bind(&trace.error_message)
        .bind(&steps_json)
        .bind(&metrics_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Trace upsert failed: {e}")))?;

        debug!(trace_id = %trace.trace_id, status = %trace.status, "Saved trace");
        Ok(())
    }

    /// Load a trace by id. Storage errors degrade to `None`.
    pub async fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let row = match sqlx::query("SELECT * FROM traces WHERE trace_id = ?1")
            .bind(trace_id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row?,
            Err(e) => {
                error!(trace_id = %trace_id, "Failed to load trace: {e}");
                return None;
            }
        };

        match Self::row_to_trace(&row) {
            Ok(trace) => Some(trace),
            Err(e) => {
                error!(trace_id = %trace_id, "Failed to decode trace row: {e}");
                None
            }
        }
    }

    /// Recent traces, newest first, optionally filtered by status.
    /// Errors degrade to an empty vec.
    pub async fn list_traces(&self, limit: u32, status: Option<TraceStatus>) -> Vec<Trace> {
        let result = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM traces WHERE status = ?1 ORDER BY started_at DESC LIMIT ?2",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM traces ORDER BY started_at DESC LIMIT ?1")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        };

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to list traces: {e}");
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|row| match Self::row_to_trace(row) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    warn!("Skipping undecodable trace row: {e}");
                    None
                }
            })
            .collect()
    }

    fn row_to_trace(row: &sqlx::sqlite::SqliteRow) -> Result<Trace, StoreError> {
        let col = |e: sqlx::Error, name: &str| StoreError::QueryFailed(format!("{name} column: {e}"));

        let trace_id: String = row.try_get("trace_id").map_err(|e| col(e, "trace_id"))?;
        let session_id: String = row.try_get("session_id").map_err(|e| col(e, "session_id"))?;
        let started_at_str: String = row.try_get("started_at").map_err(|e| col(e, "started_at"))?;
        let ended_at_str: Option<String> = row.try_get("ended_at").map_err(|e| col(e, "ended_at"))?;
        let status_str: String = row.try_get("status").map_err(|e| col(e, "status"))?;
        let framework: String = row.try_get("framework").map_err(|e| col(e, "framework"))?;
        let model: String = row.try_get("model").map_err(|e| col(e, "model"))?;
        let vector_store: String = row
            .try_get("vector_store")
            .map_err(|e| col(e, "vector_store"))?;
        let query: String = row.try_get("query").map_err(|e| col(e, "query"))?;
        let response: Option<String> = row.try_get("response").map_err(|e| col(e, "response"))?;
        let duration_seconds: Option<f64> = row
            .try_get("duration_seconds")
            .map_err(|e| col(e, "duration_seconds"))?;
        let input_tokens: i64 = row
            .try_get("input_tokens")
            .map_err(|e| col(e, "input_tokens"))?;
        let output_tokens: i64 = row
            .try_get("output_tokens")
            .map_err(|e| col(e, "output_tokens"))?;
        let total_tokens: i64 = row
            .try_get("total_tokens")
            .map_err(|e| col(e, "total_tokens"))?;
        let input_cost: f64 = row.try_get("input_cost").map_err(|e| col(e, "input_cost"))?;
        let output_cost: f64 = row
            .try_get("output_cost")
            .map_err(|e| col(e, "output_cost"))?;
        let total_cost: f64 = row.try_get("total_cost").map_err(|e| col(e, "total_cost"))?;
        let error_message: Option<String> = row
            .try_get("error_message")
            .map_err(|e| col(e, "error_message"))?;
        let steps_json: String = row.try_get("steps").map_err(|e| col(e, "steps"))?;
        let metrics_json: String = row
            .try_get("running_metrics")
            .map_err(|e| col(e, "running_metrics"))?;

        let started_at = parse_timestamp(&started_at_str);
        let ended_at = ended_at_str.as_deref().map(parse_timestamp);

        let steps: Vec<Step> = serde_json::from_str(&steps_json).unwrap_or_default();
        let metrics: RunningMetrics =
            serde_json::from_str(&metrics_json).unwrap_or(RunningMetrics {
                start_time: started_at,
                tokens_used: 0,
                api_calls: 0,
            });

        Ok(Trace {
            trace_id,
            session_id,
            started_at,
            ended_at,
            status: TraceStatus::parse(&status_str),
            framework,
            model,
            vector_store,
            query,
            response,
            duration_seconds,
            input_tokens: input_tokens.max(0) as u64,
            output_tokens: output_tokens.max(0) as u64,
            total_tokens: total_tokens.max(0) as u64,
            input_cost,
            output_cost,
            total_cost,
            error_message,
            steps,
            metrics,
        })
    }

    // ── Metrics ───────────────────────────────────────────────────────────

    /// Append a write-once metric snapshot. Returns `false` on failure.
    pub async fn save_metric(&self, record: &MetricRecord) -> bool {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO metrics (
                trace_id, timestamp, framework, model, vector_store,
                input_tokens, output_tokens, total_tokens,
                input_cost, output_cost, total_cost,
                latency_ms, status, error_message
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&record.trace_id)
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.framework)
        .bind(&record.model)
        .bind(&record.vector_store)
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.total_tokens as i64)
        .bind(record.input_cost)
        .bind(record.output_cost)
        .bind(record.total_cost)
        .bind(record.latency_ms)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(trace_id = %record.trace_id, "Failed to save metric: {e}");
                false
            }
        }
    }

    /// Windowed aggregate over the metrics table. A zero-value summary is
    /// returned on error.
    pub async fn metrics_summary(&self, window_hours: u32) -> MetricsSummary {
        let cutoff = window_cutoff(window_hours);

        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                COALESCE(SUM(total_cost), 0.0) AS cost,
                COALESCE(AVG(latency_ms), 0.0) AS latency
            FROM metrics WHERE timestamp >= ?1
            "#,
        )
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await;

        let totals = match totals {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to compute metrics summary: {e}");
                return MetricsSummary::empty(window_hours);
            }
        };

        let total_requests: i64 = totals.try_get("total").unwrap_or(0);
        let completed: i64 = totals.try_get("completed").unwrap_or(0);
        let failed: i64 = totals.try_get("failed").unwrap_or(0);
        let total_tokens: i64 = totals.try_get("tokens").unwrap_or(0);
        let total_cost: f64 = totals.try_get("cost").unwrap_or(0.0);
        let avg_latency_ms: f64 = totals.try_get("latency").unwrap_or(0.0);

        let by_framework = sqlx::query(
            r#"
            SELECT
                framework,
                COUNT(*) AS requests,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS errors,
                COALESCE(AVG(latency_ms), 0.0) AS latency,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                COALESCE(SUM(total_cost), 0.0) AS cost
            FROM metrics WHERE timestamp >= ?1
            GROUP BY framework
            ORDER BY requests DESC
            "#,
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to compute per-framework breakdown: {e}");
            Vec::new()
        });

        let frameworks = by_framework
            .iter()
            .map(|row| FrameworkSummary {
                framework: row.try_get("framework").unwrap_or_default(),
                requests: row.try_get::<i64, _>("requests").unwrap_or(0).max(0) as u64,
                errors: row.try_get::<i64, _>("errors").unwrap_or(0).max(0) as u64,
                avg_latency_ms: row.try_get("latency").unwrap_or(0.0),
                total_tokens: row.try_get::<i64, _>("tokens").unwrap_or(0).max(0) as u64,
                total_cost: row.try_get("cost").unwrap_or(0.0),
            })
            .collect();

        MetricsSummary {
            window_hours,
            total_requests: total_requests.max(0) as u64,
            completed: completed.max(0) as u64,
            failed: failed.max(0) as u64,
            success_rate: if total_requests > 0 {
                completed as f64 / total_requests as f64
            } else {
                0.0
            },
            total_tokens: total_tokens.max(0) as u64,
            total_cost,
            avg_latency_ms,
            frameworks,
        }
    }

    /// Hour-bucketed request/token/cost series over the window.
    /// Empty on error.
    pub async fn time_series(&self, window_hours: u32) -> TimeSeries {
        let cutoff = window_cutoff(window_hours);

        let rows = sqlx::query(
            r#"
            SELECT
                strftime('%Y-%m-%d %H:00', timestamp) AS hour,
                COUNT(*) AS requests,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS errors,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                ROUND(COALESCE(SUM(total_cost), 0.0), 4) AS cost,
                ROUND(COALESCE(AVG(latency_ms), 0.0), 2) AS latency
            FROM metrics WHERE timestamp >= ?1
            GROUP BY hour
            ORDER BY hour ASC
            "#,
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to compute time series: {e}");
                return TimeSeries::empty(window_hours);
            }
        };

        let points = rows
            .iter()
            .map(|row| TimeSeriesPoint {
                hour: row.try_get("hour").unwrap_or_default(),
                requests: row.try_get::<i64, _>("requests").unwrap_or(0).max(0) as u64,
                errors: row.try_get::<i64, _>("errors").unwrap_or(0).max(0) as u64,
                total_tokens: row.try_get::<i64, _>("tokens").unwrap_or(0).max(0) as u64,
                total_cost: row.try_get("cost").unwrap_or(0.0),
                avg_latency_ms: row.try_get("latency").unwrap_or(0.0),
            })
            .collect();

        TimeSeries {
            window_hours,
            points,
        }
    }

    /// Newest metric rows, for the recent-activity view. Empty on error.
    pub async fn recent_traces(&self, limit: u32) -> Vec<RecentTrace> {
        let rows = sqlx::query(
            r#"
            SELECT trace_id, timestamp, framework, model, status,
                   latency_ms, total_tokens, total_cost, error_message
            FROM metrics ORDER BY timestamp DESC LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to list recent traces: {e}");
                return Vec::new();
            }
        };

        rows.iter()
            .map(|row| RecentTrace {
                trace_id: row.try_get("trace_id").unwrap_or_default(),
                timestamp: parse_timestamp(
                    &row.try_get::<String, _>("timestamp").unwrap_or_default(),
                ),
                framework: row.try_get("framework").unwrap_or_default(),
                model: row.try_get("model").unwrap_or_default(),
                status: row.try_get("status").unwrap_or_default(),
                latency_ms: row.try_get("latency_ms").unwrap_or(0.0),
                total_tokens: row.try_get::<i64, _>("total_tokens").unwrap_or(0).max(0) as u64,
                total_cost: row.try_get("total_cost").unwrap_or(0.0),
                error_message: row.try_get("error_message").unwrap_or(None),
            })
            .collect()
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Insert a session row or touch an existing one, bumping its query
    /// count. Returns `false` on failure.
    pub async fn record_session(&self, session_id: &str) -> bool {
        let now = Utc::now().to_rfc3339();
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (session_id, started_at, last_seen, query_count)
            VALUES (?1, ?2, ?2, 1)
            ON CONFLICT(session_id) DO UPDATE SET
                last_seen = excluded.last_seen,
                query_count = query_count + 1
            "#,
        )
        .bind(session_id)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(session_id = %session_id, "Failed to record session: {e}");
                false
            }
        }
    }

    // ── Health ────────────────────────────────────────────────────────────

    /// Append one health row per framework from a probe sweep.
    /// Returns `false` if any row failed to write.
    pub async fn save_health(&self, results: &HashMap<String, HealthInfo>) -> bool {
        let now = Utc::now().to_rfc3339();
        let _guard = self.write_lock.lock().await;
        let mut ok = true;
        for (framework, info) in results {
            let result = sqlx::query(
                r#"
                INSERT INTO framework_health (framework, status, test_passed, error, checked_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(framework)
            .bind(info.status.as_str())
            .bind(info.test_passed as i64)
            .bind(&info.error)
            .bind(&now)
            .execute(&self.pool)
            .await;

            if let Err(e) = result {
                error!(framework = %framework, "Failed to save health row: {e}");
                ok = false;
            }
        }
        ok
    }

    /// Probe history inside the window, grouped by framework, newest first.
    /// Empty on error.
    pub async fn health_history(&self, window_hours: u32) -> HashMap<String, Vec<HealthSample>> {
        let cutoff = window_cutoff(window_hours);

        let rows = sqlx::query(
            r#"
            SELECT framework, status, test_passed, error, checked_at
            FROM framework_health WHERE checked_at >= ?1
            ORDER BY checked_at DESC
            "#,
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to load health history: {e}");
                return HashMap::new();
            }
        };

        let mut history: HashMap<String, Vec<HealthSample>> = HashMap::new();
        for row in &rows {
            let framework: String = row.try_get("framework").unwrap_or_default();
            let status_str: String = row.try_get("status").unwrap_or_default();
            let status = if status_str == "healthy" {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            history.entry(framework).or_default().push(HealthSample {
                status,
                test_passed: row.try_get::<i64, _>("test_passed").unwrap_or(0) != 0,
                error: row.try_get("error").unwrap_or(None),
                checked_at: parse_timestamp(
                    &row.try_get::<String, _>("checked_at").unwrap_or_default(),
                ),
            });
        }
        history
    }

    // ── Maintenance ───────────────────────────────────────────────────────

    /// Delete rows strictly older than the cutoff from traces, metrics, and
    /// framework_health. Returns the total number of rows removed, 0 on
    /// error.
    pub async fn cleanup(&self, older_than_days: u32) -> u64 {
        let cutoff = (Utc::now() - Duration::days(older_than_days as i64)).to_rfc3339();
        let _guard = self.write_lock.lock().await;

        let mut removed: u64 = 0;
        for (table, column) in [
            ("traces", "started_at"),
            ("metrics", "timestamp"),
            ("framework_health", "checked_at"),
        ] {
            let sql = format!("DELETE FROM {table} WHERE {column} < ?1");
            match sqlx::query(&sql).bind(&cutoff).execute(&self.pool).await {
                Ok(result) => removed += result.rows_affected(),
                Err(e) => {
                    error!(table = %table, "Cleanup failed: {e}");
                }
            }
        }

        if removed > 0 {
            info!(removed = removed, "Retention cleanup removed old rows");
        }
        removed
    }

    /// Mark traces still `started` after the cutoff as failed. These are
    /// traces whose lifecycle never reached a terminal status (for example
    /// after a crash). Returns the number of rows changed.
    pub async fn reconcile_stuck(&self, older_than_minutes: u32) -> u64 {
        let now = Utc::now();
        let cutoff = (now - Duration::minutes(older_than_minutes as i64)).to_rfc3339();
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            r#"
            UPDATE traces
            SET status = 'failed',
                ended_at = ?1,
                error_message = 'Trace abandoned without a terminal status'
            WHERE status = 'started' AND started_at < ?2
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(&cutoff)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => {
                let changed = result.rows_affected();
                if changed > 0 {
                    warn!(changed = changed, "Marked stuck traces as failed");
                }
                changed
            }
            Err(e) => {
                error!("Stuck-trace reconcile failed: {e}");
                0
            }
        }
    }
}

fn window_cutoff(window_hours: u32) -> String {
    (Utc::now() - Duration::hours(window_hours as i64)).to_rfc3339()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
