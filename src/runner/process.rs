use super::{JobResult, JobRunner, JobSpec};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs jobs as child processes of the worker.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, spec: JobSpec) -> Result<JobResult> {
        debug!(
            "Launching {} with {} args (cwd: {:?})",
            spec.program,
            spec.args.len(),
            spec.working_dir
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A timed-out wait drops the child, which must take the process with it.
        cmd.kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| Error::LaunchFailure {
            program: spec.program.clone(),
            source,
        })?;

        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(
                        "{} exceeded its {}s deadline and was killed",
                        spec.program,
                        limit.as_secs()
                    );
                    return Err(Error::Timeout {
                        program: spec.program,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("{} exited with code {}", spec.program, exit_code);

        Ok(JobResult {
            program: spec.program,
            args: spec.args,
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
