use crate::{
    Error, Result,
    runner::{JobRunner, JobSpec},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Brings the device back to baseline memory usage between workloads.
#[async_trait]
pub trait DeviceCleaner: Send + Sync {
    async fn reset(&self) -> Result<()>;
}

/// Used when every workload runs in its own process and the driver reclaims
/// memory on exit.
#[derive(Debug, Default)]
pub struct NoopCleaner;

#[async_trait]
impl DeviceCleaner for NoopCleaner {
    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs an operator-supplied command; a non-zero exit means the device could
/// not be recovered.
pub struct CommandCleaner {
    runner: Arc<dyn JobRunner>,
    spec: JobSpec,
}

impl CommandCleaner {
    pub fn new(runner: Arc<dyn JobRunner>, spec: JobSpec) -> Self {
        Self { runner, spec }
    }
}

#[async_trait]
impl DeviceCleaner for CommandCleaner {
    async fn reset(&self) -> Result<()> {
        debug!("Running device cleanup command: {}", self.spec.program);

        let result = self
            .runner
            .run(self.spec.clone())
            .await
            .map_err(|e| Error::corrupted(format!("cleanup command did not run: {e}")))?;

        if !result.success() {
            return Err(Error::corrupted(format!(
                "cleanup command exited with {}: {}",
                result.exit_code,
                result.stderr_lossy().trim()
            )));
        }

        Ok(())
    }
}
