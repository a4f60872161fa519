//! # docflow-workflow
//!
//! Compiler-facing job workflow: the per-job state machine, tool-result
//! reconciliation, CSV export, and the completion path.

pub mod completion;
pub mod export;
pub mod machine;

pub use export::to_csv;
pub use machine::JobWorkflow;
