use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    pub trainer: TrainerConfig,
    pub inferer: JobCommandConfig,
    #[serde(default)]
    pub postprocess: PostprocessConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    pub summarizer: SummarizerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Local directories shared with the external trainer and renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Reference images submitted by users, one subdirectory per token.
    #[serde(default = "default_users_dir")]
    pub users_dir: PathBuf,
    /// Images written by the inference job, one subdirectory per token.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

/// How to launch one external job. Stage flags are appended after `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(flatten)]
    pub command: JobCommandConfig,
    pub config_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessConfig {
    #[serde(default = "default_postprocess_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub on_failure: PostprocessFailure,
    /// Programs the trainer may ask us to run. Empty allows any program.
    #[serde(default)]
    pub allowed_programs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostprocessFailure {
    #[default]
    Fatal,
    Ignore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuConfig {
    #[serde(default)]
    pub acquire_mode: AcquireMode,
    /// Upper bound on how long a blocking acquire waits.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    /// Command run between jobs to bring device memory back to baseline.
    #[serde(default)]
    pub cleanup_command: Option<JobCommandConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMode {
    #[default]
    Blocking,
    NonBlocking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    Gcs(GcsConfig),
    Local(LocalStorageConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    #[serde(default = "default_gcs_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_gcs_endpoint")]
    pub public_base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub policy: AuditPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPolicy {
    #[default]
    BestEffort,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model name echoed into the input audit record.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Civil offset used for `create_date` in audit records.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_true")]
    pub cleanup_results: bool,
}

impl JobCommandConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl GpuConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            users_dir: default_users_dir(),
            results_dir: default_results_dir(),
        }
    }
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            working_dir: default_postprocess_dir(),
            timeout_secs: None,
            on_failure: PostprocessFailure::default(),
            allowed_programs: Vec::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_path: default_audit_database_path(),
            policy: AuditPolicy::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            utc_offset_hours: default_utc_offset_hours(),
            cleanup_results: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_users_dir() -> PathBuf {
    PathBuf::from("src/scratch/dreambooth/data/users")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("src/scratch/dreambooth/data/results")
}

fn default_postprocess_dir() -> PathBuf {
    PathBuf::from("src/scratch")
}

fn default_summarizer_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_audit_database_path() -> String {
    "audit.db".to_string()
}

fn default_model_name() -> String {
    "dreambooth".to_string()
}

// Asia/Seoul, which has no daylight saving time.
fn default_utc_offset_hours() -> i32 {
    9
}

fn default_true() -> bool {
    true
}
