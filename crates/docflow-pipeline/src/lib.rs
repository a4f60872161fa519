//! # docflow-pipeline
//!
//! Server-side auto-processing: the orchestrator that runs once per new
//! job, plus webhook notification dispatch.

pub mod notify;
pub mod orchestrator;

pub use notify::WebhookDispatcher;
pub use orchestrator::{AutoProcessor, PipelineOutcome};
