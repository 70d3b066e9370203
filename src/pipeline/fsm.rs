use super::PipelineStage;
use crate::{Error, Result};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Saving,
    Training,
    PromptBuilding,
    Inferring,
    Collecting,
    Uploading,
    Logging,
    Done,
    Failed {
        stage: PipelineStage,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SaveRequested,
    Saved,
    LeaseAcquired,
    Trained,
    PromptReady,
    Inferred,
    Collected,
    Uploaded,
    Logged,
    Failed {
        stage: PipelineStage,
        reason: String,
    },
}

/// Tracks one unit of work through its stages and rejects out-of-order steps.
#[derive(Debug)]
pub struct PipelineStateMachine {
    state: PipelineState,
    label: String,
}

impl PipelineStateMachine {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            state: PipelineState::Idle,
            label: label.into(),
        }
    }

    pub fn current_state(&self) -> &PipelineState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Done | PipelineState::Failed { .. }
        )
    }

    pub fn transition(&mut self, event: PipelineEvent) -> Result<()> {
        use PipelineEvent as E;
        use PipelineState as S;

        let new_state = match (&self.state, event) {
            (S::Idle, E::SaveRequested) => S::Saving,
            (S::Saving, E::Saved) => S::Done,
            (S::Idle, E::LeaseAcquired) => S::Training,
            (S::Training, E::Trained) => S::PromptBuilding,
            (S::PromptBuilding, E::PromptReady) => S::Inferring,
            (S::Inferring, E::Inferred) => S::Collecting,
            (S::Collecting, E::Collected) => S::Uploading,
            (S::Uploading, E::Uploaded) => S::Logging,
            (S::Logging, E::Logged) => S::Done,
            (state, E::Failed { stage, reason }) if !is_terminal(state) => {
                S::Failed { stage, reason }
            }
            (state, event) => {
                warn!(
                    "[{}] invalid pipeline transition from {:?} with {:?}",
                    self.label, state, event
                );
                return Err(Error::InvalidTransition {
                    current: format!("{state:?}"),
                    requested: format!("{event:?}"),
                });
            }
        };

        match &new_state {
            PipelineState::Failed { stage, .. } => {
                info!("[{}] {:?} -> failed at {}", self.label, self.state, stage)
            }
            other => debug!("[{}] {:?} -> {:?}", self.label, self.state, other),
        }

        self.state = new_state;
        Ok(())
    }

    /// Moves to `Failed` unless already terminal; failures never mask a
    /// completed or earlier failed run.
    pub fn fail(&mut self, stage: PipelineStage, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.state = PipelineState::Failed {
                stage,
                reason: reason.into(),
            };
            info!("[{}] failed at {}", self.label, stage);
        }
    }
}

fn is_terminal(state: &PipelineState) -> bool {
    matches!(state, PipelineState::Done | PipelineState::Failed { .. })
}
