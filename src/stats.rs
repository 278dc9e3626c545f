//! Durable message statistics — append-only event log with time-windowed
//! aggregation.
//!
//! Every pipeline entry appends one `incoming` row and every successful
//! forward appends one `outgoing` row; each write is an independent
//! insert so concurrent runs never lose updates. Rows are only ever
//! removed wholesale by the admin reset.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{Connection, params};
use tracing::info;

use crate::error::StoreError;

/// Kind of counted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Incoming,
    Outgoing,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// Aggregated counters, all-time and trailing 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_incoming: u64,
    pub total_outgoing: u64,
    pub last_day_incoming: u64,
    pub last_day_outgoing: u64,
}

impl StatsSummary {
    /// All-time outgoing/incoming percentage; 0 when nothing came in.
    pub fn total_forward_rate_pct(&self) -> f64 {
        rate_pct(self.total_outgoing, self.total_incoming)
    }

    /// Trailing-24h outgoing/incoming percentage; 0 when nothing came in.
    pub fn last_day_forward_rate_pct(&self) -> f64 {
        rate_pct(self.last_day_outgoing, self.last_day_incoming)
    }
}

fn rate_pct(outgoing: u64, incoming: u64) -> f64 {
    if incoming == 0 {
        0.0
    } else {
        outgoing as f64 / incoming as f64 * 100.0
    }
}

/// Backend-agnostic statistics store.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Append one immutable event row stamped with the current time.
    async fn record_event(&self, kind: EventKind) -> Result<(), StoreError>;

    /// Aggregate counts, unfiltered and within the trailing 24 hours.
    async fn get_stats(&self) -> Result<StatsSummary, StoreError>;

    /// Delete every event row. Irreversible.
    async fn reset_all(&self) -> Result<(), StoreError>;
}

/// libSQL statistics backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async
/// use, so one connection serves all pipeline runs.
pub struct LibSqlStats {
    #[allow(dead_code)]
    db: Arc<libsql::Database>,
    conn: Connection,
}

impl LibSqlStats {
    /// Open (or create) a local database file and set up the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("failed to create data directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;
        let conn = db.connect().map_err(|e| StoreError::Open(e.to_string()))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Stats database opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;
        let conn = db.connect().map_err(|e| StoreError::Open(e.to_string()))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS message_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    recorded_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_events_kind ON message_events(kind);
                CREATE INDEX IF NOT EXISTS idx_events_recorded_at
                    ON message_events(recorded_at);",
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// Append one row with an explicit timestamp.
    async fn record_at(&self, kind: EventKind, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO message_events (kind, recorded_at) VALUES (?1, ?2)",
                params![kind.as_str(), timestamp(at)],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// Count events per kind, optionally only at or after `since`.
    async fn counts(&self, since: Option<DateTime<Utc>>) -> Result<(u64, u64), StoreError> {
        let mut rows = match since {
            Some(cutoff) => self
                .conn
                .query(
                    "SELECT kind, COUNT(*) FROM message_events
                     WHERE recorded_at >= ?1 GROUP BY kind",
                    params![timestamp(cutoff)],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT kind, COUNT(*) FROM message_events GROUP BY kind",
                    (),
                )
                .await,
        }
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let (mut incoming, mut outgoing) = (0u64, 0u64);
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            let kind: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
            match kind.as_str() {
                "incoming" => incoming = count.max(0) as u64,
                "outgoing" => outgoing = count.max(0) as u64,
                _ => {}
            }
        }
        Ok((incoming, outgoing))
    }
}

/// Canonical timestamp format — fixed-width UTC RFC 3339, so string
/// comparison in SQL matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl StatsStore for LibSqlStats {
    async fn record_event(&self, kind: EventKind) -> Result<(), StoreError> {
        self.record_at(kind, Utc::now()).await
    }

    async fn get_stats(&self) -> Result<StatsSummary, StoreError> {
        let (total_incoming, total_outgoing) = self.counts(None).await?;
        let cutoff = Utc::now() - Duration::hours(24);
        let (last_day_incoming, last_day_outgoing) = self.counts(Some(cutoff)).await?;
        Ok(StatsSummary {
            total_incoming,
            total_outgoing,
            last_day_incoming,
            last_day_outgoing,
        })
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM message_events", ())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        info!("Stats counters reset");
        Ok(())
    }
}
