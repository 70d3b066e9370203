use album_cover_worker::{
    Error, Result,
    artifacts::{Artifact, ArtifactStore},
    audit::{AuditLogger, AuditStream},
    gpu::DeviceCleaner,
    runner::{JobResult, JobRunner, JobSpec},
    summarizer::{Summarizer, SummaryRequest},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a mock program behaves when it is run.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Files written to `{results_dir}/{--token}/` on a zero exit.
    pub outputs: Vec<(String, Vec<u8>)>,
    pub delay: Option<Duration>,
    pub launch_error: bool,
}

impl Script {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    pub fn missing() -> Self {
        Self {
            launch_error: true,
            ..Default::default()
        }
    }

    pub fn with_outputs(mut self, outputs: &[(&str, &[u8])]) -> Self {
        self.outputs = outputs
            .iter()
            .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
            .collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Job runner that plays back scripts keyed by program name.
pub struct MockJobRunner {
    scripts: Mutex<HashMap<String, Script>>,
    results_dir: PathBuf,
    calls: Mutex<Vec<JobSpec>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockJobRunner {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            results_dir: results_dir.into(),
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, program: &str, script: Script) -> Self {
        self.set_script(program, script);
        self
    }

    pub fn set_script(&self, program: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), script);
    }

    pub fn calls(&self) -> Vec<JobSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|spec| spec.program).collect()
    }

    pub fn calls_to(&self, program: &str) -> Vec<JobSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.program == program)
            .collect()
    }

    /// Highest number of jobs that were running at the same time.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for MockJobRunner {
    async fn run(&self, spec: JobSpec) -> Result<JobResult> {
        self.calls.lock().unwrap().push(spec.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&spec.program)
            .cloned()
            .unwrap_or_else(|| Script::fail(127, "unknown program"));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if script.launch_error {
            Err(Error::LaunchFailure {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        } else {
            if script.exit_code == 0 && !script.outputs.is_empty() {
                let token = spec.flag_value("--token").unwrap_or("unknown");
                let dir = self.results_dir.join(token);
                std::fs::create_dir_all(&dir).unwrap();
                for (name, bytes) in &script.outputs {
                    std::fs::write(dir.join(name), bytes).unwrap();
                }
            }
            Ok(JobResult {
                program: spec.program.clone(),
                args: spec.args.clone(),
                exit_code: script.exit_code,
                stdout: script.stdout.into_bytes(),
                stderr: script.stderr.into_bytes(),
            })
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct MockSummarizer {
    pub summary: String,
    pub error: Option<String>,
    pub requests: Mutex<Vec<SummaryRequest>>,
}

impl MockSummarizer {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        match self.error {
            Some(ref error) => Err(Error::summarize(error.clone())),
            None => Ok(self.summary.clone()),
        }
    }
}

#[derive(Default)]
pub struct MockArtifactStore {
    pub batches: Mutex<Vec<Vec<Artifact>>>,
    pub error: Option<String>,
    /// Returns one URL fewer than requested.
    pub drop_last: bool,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn batches(&self) -> Vec<Vec<Artifact>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn upload(&self, batch: Vec<Artifact>) -> Result<Vec<String>> {
        if let Some(ref error) = self.error {
            return Err(Error::upload(error.clone()));
        }

        let mut urls: Vec<String> = batch
            .iter()
            .map(|artifact| format!("mock://covers/{}", artifact.blob_name))
            .collect();
        if self.drop_last {
            urls.pop();
        }

        self.batches.lock().unwrap().push(batch);
        Ok(urls)
    }
}

#[derive(Default)]
pub struct MockAuditLogger {
    pub records: Mutex<Vec<(AuditStream, Value)>>,
    pub fail_on: Option<AuditStream>,
}

impl MockAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, stream: AuditStream) -> Self {
        self.fail_on = Some(stream);
        self
    }

    pub fn records(&self) -> Vec<(AuditStream, Value)> {
        self.records.lock().unwrap().clone()
    }

    pub fn stream(&self, stream: AuditStream) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, record)| record)
            .collect()
    }
}

#[async_trait]
impl AuditLogger for MockAuditLogger {
    async fn log(&self, stream: AuditStream, record: Value) -> Result<()> {
        if self.fail_on == Some(stream) {
            return Err(Error::audit(format!("{stream} sink unavailable")));
        }
        self.records.lock().unwrap().push((stream, record));
        Ok(())
    }
}

/// Device cleaner that counts resets and can be told to fail.
#[derive(Default)]
pub struct CountingCleaner {
    pub resets: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
}

impl CountingCleaner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceCleaner for CountingCleaner {
    async fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::corrupted("memory still allocated"));
        }
        Ok(())
    }
}
