mod process;
mod types;

pub use process::ProcessRunner;
pub use types::{JobResult, JobSpec};

use crate::Result;
use async_trait::async_trait;

/// Runs one external job to completion.
///
/// A job that starts and exits non-zero is still `Ok`; callers inspect
/// [`JobResult::exit_code`]. `Err` is reserved for jobs that never ran
/// (launch failure) or were killed at their deadline.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, spec: JobSpec) -> Result<JobResult>;
}
