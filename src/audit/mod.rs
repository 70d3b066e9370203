mod storage;
mod types;

pub use storage::SqlAuditLogger;
pub use types::*;

use crate::Result;
use async_trait::async_trait;

/// Append-only sink for the "input" and "output" analytics streams.
///
/// Records written by one caller to one stream must keep their order.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, stream: AuditStream, record: serde_json::Value) -> Result<()>;
}
