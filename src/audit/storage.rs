use super::{AuditEntry, AuditLogger, AuditStream};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Builder, Connection, Database};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Most records held in memory while the database is unavailable; the oldest
/// are dropped first.
pub const MAX_FALLBACK_RECORDS: usize = 10_000;

/// Audit log backed by libSQL, with an in-memory fallback when the database
/// cannot be opened or written.
///
/// In strict mode there is no fallback: a record that cannot be stored in the
/// database is an [`Error::AuditLog`].
pub struct SqlAuditLogger {
    // Kept open for the logger's lifetime; an in-memory database lives only
    // as long as its connection.
    db: Option<(Database, Connection)>,
    fallback: Arc<Mutex<VecDeque<AuditEntry>>>,
    strict: bool,
}

impl SqlAuditLogger {
    pub async fn new(db_path: &str) -> Result<Self> {
        let mut logger = Self {
            db: None,
            fallback: Arc::new(Mutex::new(VecDeque::new())),
            strict: false,
        };

        match logger.init_database(db_path).await {
            Ok(()) => {
                info!("Audit database initialized: {}", db_path);
            }
            Err(e) => {
                warn!(
                    "Audit database initialization failed, using in-memory fallback: {}",
                    e
                );
            }
        }

        Ok(logger)
    }

    async fn init_database(&mut self, db_path: &str) -> Result<()> {
        let db = Builder::new_local(db_path).build().await?;

        let conn = db.connect()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS audit_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                record_id TEXT,
                payload TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
            (),
        )
        .await?;

        self.db = Some((db, conn));
        Ok(())
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Records waiting in memory because the database was unavailable.
    pub fn fallback_len(&self) -> usize {
        self.fallback.lock().map(|f| f.len()).unwrap_or(0)
    }

    async fn save_to_db(
        &self,
        conn: &Connection,
        stream: AuditStream,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let record_id = record_id(stream, payload).unwrap_or_default();
        conn.execute(
            "INSERT INTO audit_records (stream, record_id, payload, created_at) VALUES (?, ?, ?, ?)",
            (
                stream.as_str(),
                record_id.as_str(),
                serde_json::to_string(payload)?,
                Utc::now().to_rfc3339(),
            ),
        )
        .await?;
        Ok(())
    }

    fn save_to_fallback(&self, stream: AuditStream, payload: serde_json::Value) -> Result<()> {
        let mut fallback = self
            .fallback
            .lock()
            .map_err(|e| Error::audit(format!("Mutex lock failed: {e}")))?;
        if fallback.len() >= MAX_FALLBACK_RECORDS {
            warn!(
                "Audit fallback full ({} records), dropping the oldest",
                MAX_FALLBACK_RECORDS
            );
            fallback.pop_front();
        }
        fallback.push_back(AuditEntry { stream, payload });
        Ok(())
    }

    /// Records of one stream in write order.
    pub async fn list(&self, stream: AuditStream) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();

        if let Some((_, ref conn)) = self.db {
            match self.list_from_db(conn, stream).await {
                Ok(stored) => entries = stored,
                Err(e) => {
                    warn!("Failed to read audit database, using fallback only: {}", e);
                }
            }
        }

        entries.extend(self.list_from_fallback(stream)?);
        debug!("Read {} {} audit records", entries.len(), stream);
        Ok(entries)
    }

    async fn list_from_db(
        &self,
        conn: &Connection,
        stream: AuditStream,
    ) -> Result<Vec<AuditEntry>> {
        let mut rows = conn
            .query(
                "SELECT payload FROM audit_records WHERE stream = ? ORDER BY id ASC",
                [stream.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let payload: String = row.get(0)?;
            entries.push(AuditEntry {
                stream,
                payload: serde_json::from_str(&payload)?,
            });
        }

        Ok(entries)
    }

    fn list_from_fallback(&self, stream: AuditStream) -> Result<Vec<AuditEntry>> {
        let fallback = self
            .fallback
            .lock()
            .map_err(|e| Error::audit(format!("Mutex lock failed: {e}")))?;

        Ok(fallback
            .iter()
            .filter(|entry| entry.stream == stream)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditLogger for SqlAuditLogger {
    async fn log(&self, stream: AuditStream, record: serde_json::Value) -> Result<()> {
        let failure = match self.db {
            Some((_, ref conn)) => match self.save_to_db(conn, stream, &record).await {
                Ok(()) => {
                    debug!("Audit record written to {} stream", stream);
                    return Ok(());
                }
                Err(e) => format!("failed to write audit database: {e}"),
            },
            None => "audit database is not available".to_string(),
        };

        if self.strict {
            return Err(Error::audit(format!("{stream} record not stored: {failure}")));
        }

        warn!("{}, using fallback", failure);
        self.save_to_fallback(stream, record)
    }
}

fn record_id(stream: AuditStream, payload: &serde_json::Value) -> Option<String> {
    let key = match stream {
        AuditStream::Input => "input_id",
        AuditStream::Output => "output_id",
    };
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}
