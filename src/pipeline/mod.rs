mod executor;
pub mod fsm;
mod handoff;
mod prompt;
mod staging;
mod types;

pub use executor::{Collaborators, Pipeline, PipelineSettings, SEED_RANGE};
pub use fsm::{PipelineEvent, PipelineState, PipelineStateMachine};
pub use handoff::TrainResult;
pub use prompt::build_prompt;
pub use staging::Staging;
pub use types::*;
