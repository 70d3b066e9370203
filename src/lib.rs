pub mod artifacts;
pub mod audit;
pub mod config;
pub mod error;
pub mod gpu;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod summarizer;

pub use error::{Error, Result};
