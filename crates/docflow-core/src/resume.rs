//! Workflow resumption from persisted job state.
//!
//! A compiler session may open a job at any point in its lifecycle; the
//! step to resume at is inferred from which fields are populated. The
//! inference rule lives here as a pure function so it is testable in
//! isolation from any session or rendering concern.

use crate::models::{Job, WorkflowStep};

/// Decide which workflow step a session should resume at.
///
/// Precedence (first match wins):
///
/// | Persisted state                              | Resume at    |
/// |----------------------------------------------|--------------|
/// | `extracted_data` and `analysis_result` set   | `reviewing`  |
/// | only `extracted_data` set                    | `reviewing`  |
/// | `compiler_step` persisted                    | that step    |
/// | otherwise                                    | `analyzing`  |
pub fn resume(job: &Job) -> WorkflowStep {
    if job.extracted_data.is_some() {
        return WorkflowStep::Reviewing;
    }
    if let Some(step) = job.compiler_step {
        return step;
    }
    WorkflowStep::Analyzing
}
