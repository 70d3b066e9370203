use super::{
    AssetRef, GenerationRequest, PipelineFailure, PipelineOutcome, PipelineResult, PipelineStage,
    Staging, TrainResult,
    fsm::{PipelineEvent, PipelineStateMachine},
    prompt::build_prompt,
};
use crate::{
    Error, Result,
    artifacts::{Artifact, ArtifactStore, create_artifact_store},
    audit::{AuditLogger, AuditStream, InputRecord, OutputRecord, SqlAuditLogger, civil_timestamp},
    config::{
        AuditPolicy, Config, JobCommandConfig, PostprocessConfig, PostprocessFailure,
        TrainerConfig,
    },
    gpu::{CommandCleaner, DeviceCleaner, GpuGuard, NoopCleaner},
    runner::{JobResult, JobRunner, JobSpec, ProcessRunner},
    summarizer::{OpenAiSummarizer, Summarizer, SummaryRequest},
};
use chrono::{FixedOffset, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Seeds are drawn uniformly from `0..SEED_RANGE`.
pub const SEED_RANGE: u32 = 100_000;

/// Static knobs of a pipeline, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub trainer: TrainerConfig,
    pub inferer: JobCommandConfig,
    pub postprocess: PostprocessConfig,
    pub audit_policy: AuditPolicy,
    pub model_name: String,
    pub utc_offset: FixedOffset,
    pub cleanup_results: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let utc_offset = config
            .pipeline
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::config(format!(
                    "pipeline.utc_offset_hours out of range: {}",
                    config.pipeline.utc_offset_hours
                ))
            })?;

        Ok(Self {
            trainer: config.trainer.clone(),
            inferer: config.inferer.clone(),
            postprocess: config.postprocess.clone(),
            audit_policy: config.audit.policy,
            model_name: config.pipeline.model_name.clone(),
            utc_offset,
            cleanup_results: config.pipeline.cleanup_results,
        })
    }
}

/// External systems the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn JobRunner>,
    pub summarizer: Arc<dyn Summarizer>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub audit: Arc<dyn AuditLogger>,
}

/// What the GPU-bound stages hand to the rest of the run.
struct Rendered {
    prompt: String,
    seed: u32,
}

/// Save → train → prompt → infer → collect → upload → log.
///
/// Only train, post-process, prompt building and infer run under the GPU
/// lease; collection, upload and audit logging run after it is released.
pub struct Pipeline {
    settings: PipelineSettings,
    staging: Staging,
    gpu: Arc<GpuGuard>,
    deps: Collaborators,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        staging: Staging,
        gpu: Arc<GpuGuard>,
        deps: Collaborators,
    ) -> Self {
        Self {
            settings,
            staging,
            gpu,
            deps,
        }
    }

    /// Wires the production collaborators described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let settings = PipelineSettings::from_config(config)?;
        let staging = Staging::new(
            config.workspace.users_dir.clone(),
            config.workspace.results_dir.clone(),
        );

        let runner: Arc<dyn JobRunner> = Arc::new(ProcessRunner::new());

        let cleaner: Arc<dyn DeviceCleaner> = match config.gpu.cleanup_command {
            Some(ref command) => Arc::new(CommandCleaner::new(
                Arc::clone(&runner),
                JobSpec::from_config(command),
            )),
            None => Arc::new(NoopCleaner),
        };
        let gpu = GpuGuard::new(config.gpu.acquire_mode, cleaner)
            .with_acquire_timeout(config.gpu.acquire_timeout());

        let audit_path = std::env::var("AUDIT_DB_PATH")
            .unwrap_or_else(|_| config.audit.database_path.clone());
        let audit = SqlAuditLogger::new(&audit_path)
            .await?
            .strict(config.audit.policy == AuditPolicy::Required);

        let deps = Collaborators {
            runner,
            summarizer: Arc::new(OpenAiSummarizer::new(config.summarizer.clone())),
            artifacts: create_artifact_store(&config.storage)?,
            audit: Arc::new(audit),
        };

        Ok(Self::new(settings, staging, Arc::new(gpu), deps))
    }

    pub fn gpu(&self) -> &GpuGuard {
        &self.gpu
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Stores one user reference image. Does not touch the GPU.
    pub async fn save_asset(
        &self,
        token: &str,
        filename: &str,
        base64_content: &str,
    ) -> Result<AssetRef> {
        let mut fsm = PipelineStateMachine::new(token);
        fsm.transition(PipelineEvent::SaveRequested)?;

        match self.staging.save_asset(token, filename, base64_content).await {
            Ok(asset) => {
                fsm.transition(PipelineEvent::Saved)?;
                Ok(asset)
            }
            Err(e) => {
                fsm.fail(PipelineStage::Save, e.to_string());
                Err(e)
            }
        }
    }

    /// Runs the full train-and-render job. Stage failures come back as
    /// [`PipelineOutcome::Failed`]; this never returns an error.
    pub async fn run(&self, request: &GenerationRequest) -> PipelineOutcome {
        let input_id = Uuid::new_v4().to_string();
        let mut fsm = PipelineStateMachine::new(request.token.clone());

        info!(
            "Starting pipeline for token {} (input {})",
            request.token, input_id
        );

        match self.execute(request, &input_id, &mut fsm).await {
            Ok(result) => {
                info!(
                    "Pipeline for token {} finished with {} images (output {})",
                    request.token,
                    result.images.len(),
                    result.output_id
                );
                PipelineOutcome::Completed(result)
            }
            Err(failure) => {
                fsm.fail(failure.stage, failure.message.clone());
                error!(
                    "Pipeline for token {} failed at {}: {}",
                    request.token,
                    failure.stage,
                    failure.message.trim_end()
                );
                PipelineOutcome::Failed(failure)
            }
        }
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        input_id: &str,
        fsm: &mut PipelineStateMachine,
    ) -> std::result::Result<PipelineResult, PipelineFailure> {
        // The token must be a single path component before any job sees it.
        self.staging
            .result_dir(&request.token)
            .map_err(|e| stage_failure(PipelineStage::Validate, e))?;

        let mut lease = self
            .gpu
            .acquire()
            .await
            .map_err(|e| stage_failure(PipelineStage::Acquire, e))?;

        let rendered = match advance(fsm, PipelineEvent::LeaseAcquired, PipelineStage::Acquire) {
            Ok(()) => self.render(request, fsm).await,
            Err(failure) => Err(failure),
        };

        // The one release for this run, whichever way the GPU stages ended.
        if let Err(e) = lease.release().await {
            warn!("GPU release after token {} reported: {}", request.token, e);
        }

        let Rendered { prompt, seed } = rendered?;

        let assets = self
            .staging
            .collect_results(&request.token)
            .await
            .map_err(|e| stage_failure(PipelineStage::Collect, e))?;
        if assets.is_empty() {
            warn!("Inference for token {} produced no images", request.token);
        }
        advance(fsm, PipelineEvent::Collected, PipelineStage::Collect)?;

        let expected = assets.len();
        let batch: Vec<Artifact> = assets
            .into_iter()
            .map(|asset| {
                let blob_name = asset.blob_name();
                Artifact::new(asset.bytes, blob_name)
            })
            .collect();

        let images = self
            .deps
            .artifacts
            .upload(batch)
            .await
            .map_err(|e| stage_failure(PipelineStage::Upload, e))?;
        if images.len() != expected {
            return Err(PipelineFailure::new(
                PipelineStage::Upload,
                format!(
                    "artifact store returned {} URLs for {} images",
                    images.len(),
                    expected
                ),
            ));
        }
        advance(fsm, PipelineEvent::Uploaded, PipelineStage::Upload)?;

        if self.settings.cleanup_results {
            self.staging.remove_results(&request.token).await;
        }

        let output_id = self
            .write_audit(request, input_id, &images, &prompt, seed)
            .await?;
        advance(fsm, PipelineEvent::Logged, PipelineStage::Log)?;

        Ok(PipelineResult { images, output_id })
    }

    /// Train, post-process, prompt and infer. Runs while the lease is held.
    async fn render(
        &self,
        request: &GenerationRequest,
        fsm: &mut PipelineStateMachine,
    ) -> std::result::Result<Rendered, PipelineFailure> {
        let seed = draw_seed();
        let train_spec = JobSpec::from_config(&self.settings.trainer.command)
            .flag(
                "--config-file",
                self.settings.trainer.config_file.to_string_lossy(),
            )
            .flag("--token", request.token.as_str())
            .flag("--user-gender", request.user.gender.as_str())
            .flag("--seed", seed.to_string());

        info!("Training token {} with seed {}", request.token, seed);
        let trained = self.run_job(PipelineStage::Train, train_spec).await?;

        self.postprocess(&trained).await?;
        advance(fsm, PipelineEvent::Trained, PipelineStage::Train)?;

        let summary = self
            .deps
            .summarizer
            .summarize(SummaryRequest {
                lyric: request.album.lyric.clone(),
                album_name: request.album.album_name.clone(),
                song_names: request.album.song_names.clone(),
                gender: request.user.gender.clone(),
                genre: request.album.genre.clone(),
                artist_name: request.album.artist_name.clone(),
            })
            .await
            .map_err(|e| stage_failure(PipelineStage::Prompt, e))?;

        let prompt = build_prompt(
            &request.album.genre,
            &summary,
            &request.token,
            &request.user.gender,
        );
        debug!("Prompt for token {}: {}", request.token, prompt);
        advance(fsm, PipelineEvent::PromptReady, PipelineStage::Prompt)?;

        let infer_spec = JobSpec::from_config(&self.settings.inferer)
            .flag("--token", request.token.as_str())
            .flag("--prompt", prompt.as_str())
            .flag("--user-gender", request.user.gender.as_str());

        // Leftovers from an earlier run for this token must not be collected.
        self.staging.remove_results(&request.token).await;

        info!("Rendering covers for token {}", request.token);
        self.run_job(PipelineStage::Infer, infer_spec).await?;
        advance(fsm, PipelineEvent::Inferred, PipelineStage::Infer)?;

        Ok(Rendered { prompt, seed })
    }

    /// Runs a job and turns a launch error or non-zero exit into a stage failure.
    async fn run_job(
        &self,
        stage: PipelineStage,
        spec: JobSpec,
    ) -> std::result::Result<JobResult, PipelineFailure> {
        let result = self
            .deps
            .runner
            .run(spec)
            .await
            .map_err(|e| stage_failure(stage, e))?;

        if !result.success() {
            debug!("{} exited with {}", result.program, result.exit_code);
            return Err(stage_failure(
                stage,
                Error::job_failure(stage.as_str(), result.stderr_lossy()),
            ));
        }

        Ok(result)
    }

    /// Executes the command the trainer printed on stdout.
    async fn postprocess(&self, trained: &JobResult) -> std::result::Result<(), PipelineFailure> {
        let config = &self.settings.postprocess;

        let handoff = TrainResult::from_stdout(&trained.stdout_lossy(), &config.allowed_programs);
        let outcome = match handoff {
            Ok(handoff) => {
                let spec = JobSpec::new(handoff.program())
                    .working_dir(config.working_dir.clone())
                    .timeout(config.timeout_secs.map(std::time::Duration::from_secs));
                let spec = handoff.args().iter().fold(spec, |spec, arg| spec.arg(arg));

                info!("Running post-process step: {}", handoff.program());
                self.run_job(PipelineStage::Postprocess, spec).await.map(|_| ())
            }
            Err(e) => Err(stage_failure(PipelineStage::Postprocess, e)),
        };

        match (outcome, config.on_failure) {
            (Ok(()), _) => Ok(()),
            (Err(failure), PostprocessFailure::Fatal) => Err(failure),
            (Err(failure), PostprocessFailure::Ignore) => {
                warn!(
                    "Ignoring post-process failure: {}",
                    failure.message.trim_end()
                );
                Ok(())
            }
        }
    }

    /// Writes the input record, then the output record. Returns the output id.
    async fn write_audit(
        &self,
        request: &GenerationRequest,
        input_id: &str,
        images: &[String],
        prompt: &str,
        seed: u32,
    ) -> std::result::Result<String, PipelineFailure> {
        let output_id = Uuid::new_v4().to_string();

        let image_urls = match self.staging.reference_images(&request.token).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Could not list reference images for {}: {}", request.token, e);
                Vec::new()
            }
        };

        let input = InputRecord {
            input_id: input_id.to_string(),
            user_id: request.user.user_id.clone(),
            token: request.token.clone(),
            model: self.settings.model_name.clone(),
            song_names: request.album.song_names.clone(),
            artist_name: request.album.artist_name.clone(),
            album_name: request.album.album_name.clone(),
            genre: request.album.genre.clone(),
            lyric: request.album.lyric.clone(),
            gender: request.user.gender.clone(),
            image_urls,
            create_date: civil_timestamp(Utc::now(), self.settings.utc_offset),
        };

        if let Err(e) = self.log_record(AuditStream::Input, &input).await {
            return match self.settings.audit_policy {
                AuditPolicy::Required => Err(stage_failure(PipelineStage::Log, e)),
                AuditPolicy::BestEffort => {
                    // An output record must never point at an unlogged input.
                    warn!("Skipping audit records for input {}: {}", input_id, e);
                    Ok(output_id)
                }
            };
        }

        let output = OutputRecord {
            output_id: output_id.clone(),
            input_id: input_id.to_string(),
            image_urls: images.to_vec(),
            seeds: vec![seed],
            prompt: prompt.to_string(),
            create_date: civil_timestamp(Utc::now(), self.settings.utc_offset),
        };

        if let Err(e) = self.log_record(AuditStream::Output, &output).await {
            match self.settings.audit_policy {
                AuditPolicy::Required => return Err(stage_failure(PipelineStage::Log, e)),
                AuditPolicy::BestEffort => {
                    warn!("Output record {} was not logged: {}", output_id, e)
                }
            }
        }

        Ok(output_id)
    }

    async fn log_record<T: serde::Serialize>(
        &self,
        stream: AuditStream,
        record: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.deps.audit.log(stream, value).await
    }
}

fn draw_seed() -> u32 {
    (Uuid::new_v4().as_u128() % u128::from(SEED_RANGE)) as u32
}

fn stage_failure(stage: PipelineStage, error: Error) -> PipelineFailure {
    PipelineFailure::new(stage, error.client_message())
}

fn advance(
    fsm: &mut PipelineStateMachine,
    event: PipelineEvent,
    stage: PipelineStage,
) -> std::result::Result<(), PipelineFailure> {
    fsm.transition(event).map_err(|e| stage_failure(stage, e))
}
