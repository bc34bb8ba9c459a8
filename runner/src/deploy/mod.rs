//! Deployment pipeline

pub mod builder;
pub mod cancel;
pub mod container;
pub mod context;
pub mod fsm;
pub mod limits;
pub mod metrics;
pub mod orchestrator;
pub mod port;
pub mod probe;
pub mod streamer;

pub use orchestrator::{AttemptLog, DeploymentOutcome, Orchestrator, OrchestratorOptions};
