use super::mocks::{
    CountingCleaner, MockArtifactStore, MockAuditLogger, MockJobRunner, MockSummarizer, Script,
};
use album_cover_worker::{
    audit::AuditLogger,
    config::{
        AcquireMode, AuditPolicy, Config, JobCommandConfig, PostprocessConfig, PostprocessFailure,
        TrainerConfig,
    },
    gpu::GpuGuard,
    pipeline::{
        AlbumInfo, Collaborators, GenerationRequest, Pipeline, PipelineSettings, Staging,
        UserProfile,
    },
};
use chrono::FixedOffset;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const TRAIN: &str = "train";
pub const INFER: &str = "infer";
pub const CONVERT: &str = "convert";

/// What the trainer prints when it finishes.
pub const CONVERT_LINE: &str = "convert --model_path ./out --half\n";

pub const SUMMARY: &str = "neon-lit midnight drive";

pub fn command(program: &str) -> JobCommandConfig {
    JobCommandConfig {
        program: program.to_string(),
        args: Vec::new(),
        working_dir: None,
        timeout_secs: None,
        env: HashMap::new(),
    }
}

pub fn sample_request(token: &str) -> GenerationRequest {
    GenerationRequest {
        user: UserProfile {
            user_id: "user-42".to_string(),
            gender: "female".to_string(),
        },
        album: AlbumInfo {
            lyric: "we drive all night under city lights".to_string(),
            album_name: "Night Drive".to_string(),
            song_names: vec!["Intro".to_string(), "Highway".to_string()],
            genre: "synthwave".to_string(),
            artist_name: "The Lanes".to_string(),
        },
        token: token.to_string(),
    }
}

/// A pipeline wired to mocks inside a throwaway workspace.
pub struct TestEnv {
    pub dir: TempDir,
    pub runner: Arc<MockJobRunner>,
    pub summarizer: Arc<MockSummarizer>,
    pub artifacts: Arc<MockArtifactStore>,
    pub audit: Arc<MockAuditLogger>,
    pub cleaner: Arc<CountingCleaner>,
    pub settings: PipelineSettings,
    pub mode: AcquireMode,
}

impl TestEnv {
    /// Every job succeeds and the inferer renders two covers.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let runner = MockJobRunner::new(dir.path().join("results"))
            .with_script(TRAIN, Script::ok(CONVERT_LINE))
            .with_script(CONVERT, Script::ok(""))
            .with_script(
                INFER,
                Script::ok("")
                    .with_outputs(&[("1.png", &b"cover-1"[..]), ("0.png", &b"cover-0"[..])]),
            );

        let settings = PipelineSettings {
            trainer: TrainerConfig {
                command: command(TRAIN),
                config_file: PathBuf::from("configs/dreambooth.yaml"),
            },
            inferer: command(INFER),
            postprocess: PostprocessConfig {
                working_dir: dir.path().join("scratch"),
                ..Default::default()
            },
            audit_policy: AuditPolicy::BestEffort,
            model_name: "dreambooth".to_string(),
            utc_offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            cleanup_results: true,
        };

        Self {
            dir,
            runner: Arc::new(runner),
            summarizer: Arc::new(MockSummarizer::new(SUMMARY)),
            artifacts: Arc::new(MockArtifactStore::new()),
            audit: Arc::new(MockAuditLogger::new()),
            cleaner: CountingCleaner::new(),
            settings,
            mode: AcquireMode::Blocking,
        }
    }

    pub fn with_summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn with_artifacts(mut self, artifacts: MockArtifactStore) -> Self {
        self.artifacts = Arc::new(artifacts);
        self
    }

    pub fn with_audit(mut self, audit: MockAuditLogger) -> Self {
        self.audit = Arc::new(audit);
        self
    }

    pub fn with_postprocess_failure(mut self, on_failure: PostprocessFailure) -> Self {
        self.settings.postprocess.on_failure = on_failure;
        self
    }

    pub fn with_audit_policy(mut self, policy: AuditPolicy) -> Self {
        self.settings.audit_policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: AcquireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn users_dir(&self) -> PathBuf {
        self.dir.path().join("users")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with_audit(self.audit.clone())
    }

    /// Same wiring, with a different audit sink.
    pub fn pipeline_with_audit(&self, audit: Arc<dyn AuditLogger>) -> Pipeline {
        let gpu = GpuGuard::new(self.mode, self.cleaner.clone());
        Pipeline::new(
            self.settings.clone(),
            Staging::new(self.users_dir(), self.results_dir()),
            Arc::new(gpu),
            Collaborators {
                runner: self.runner.clone(),
                summarizer: self.summarizer.clone(),
                artifacts: self.artifacts.clone(),
                audit,
            },
        )
    }
}

/// Sample configuration YAML for testing
pub const SAMPLE_CONFIG_YAML: &str = r#"
server:
  host: "127.0.0.1"
  port: 8000
  logs:
    level: "debug"
workspace:
  users_dir: "/tmp/covers/users"
  results_dir: "/tmp/covers/results"
trainer:
  program: "python"
  args: ["train.py"]
  config_file: "configs/dreambooth.yaml"
  timeout_secs: 3600
inferer:
  program: "python"
  args: ["infer.py"]
postprocess:
  working_dir: "/srv/scratch"
  on_failure: ignore
  allowed_programs: ["python"]
gpu:
  acquire_mode: non_blocking
summarizer:
  base_url: "http://localhost:11434/v1"
  api_key: "test-key"
storage:
  type: local
  root: "/tmp/covers/store"
audit:
  database_path: ":memory:"
  policy: required
"#;

pub fn create_test_config() -> Config {
    serde_yaml::from_str(SAMPLE_CONFIG_YAML).unwrap()
}
