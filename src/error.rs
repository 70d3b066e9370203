use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to launch {program}: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} job failed: {stderr}")]
    JobFailure { stage: String, stderr: String },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("Invalid post-process command: {0}")]
    InvalidCommand(String),

    #[error("GPU is busy")]
    ResourceBusy,

    #[error("GPU is in an unrecoverable state: {0}")]
    ResourceCorrupted(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Audit log error: {0}")]
    AuditLog(String),

    #[error("Summarization error: {0}")]
    Summarize(String),

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("OpenAI error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("Invalid state transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn job_failure(stage: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::JobFailure {
            stage: stage.into(),
            stderr: stderr.into(),
        }
    }

    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::ResourceCorrupted(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn audit(msg: impl Into<String>) -> Self {
        Self::AuditLog(msg.into())
    }

    pub fn summarize(msg: impl Into<String>) -> Self {
        Self::Summarize(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message handed back to the dispatcher when a stage fails.
    ///
    /// Job failures report the captured stderr verbatim so callers see exactly
    /// what the external trainer or renderer printed.
    pub fn client_message(&self) -> String {
        match self {
            Self::JobFailure { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}
