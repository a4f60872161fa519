//! Mutation policy checks shared by all job repository implementations.
//!
//! Both the Postgres repository and the in-memory double enforce the same
//! rules, so they live here as pure functions.

use crate::error::{Error, Result};
use crate::models::{Caller, Job, JobStatus};

/// Check that `caller` may mutate `job`.
///
/// Compilers may only touch jobs they are assigned to. `Caller::System`
/// is the elevated path used by the auto-processing pipeline, which runs
/// before any compiler is assigned.
pub fn authorize_mutation(job: &Job, caller: Caller) -> Result<()> {
    match caller {
        Caller::System => Ok(()),
        Caller::Compiler(id) => match job.compiler_id {
            Some(owner) if owner == id => Ok(()),
            Some(_) => Err(Error::Unauthorized(format!(
                "job {} belongs to another compiler",
                job.id
            ))),
            None => Err(Error::Unauthorized(format!(
                "job {} has no assigned compiler",
                job.id
            ))),
        },
    }
}

/// Check that a status change is forward-only.
///
/// `Received → InProgress → Completed`, monotonic. The orchestrator's
/// failure reset is handled separately (`reset_for_manual`) and never
/// goes through here.
pub fn check_status_transition(current: JobStatus, next: JobStatus) -> Result<()> {
    if next.rank() < current.rank() {
        return Err(Error::Workflow(format!(
            "status cannot move backwards: {} -> {}",
            current, next
        )));
    }
    Ok(())
}

/// Check that the failure reset is still permitted for this job.
///
/// The reset reverts `InProgress → Received`, which is only allowed while
/// no compiler has been assigned and the job is not completed.
pub fn check_manual_reset(job: &Job) -> Result<()> {
    if job.compiler_id.is_some() {
        return Err(Error::Workflow(format!(
            "job {} already has a compiler; reset not permitted",
            job.id
        )));
    }
    if job.status == JobStatus::Completed {
        return Err(Error::Workflow(format!(
            "job {} is completed; reset not permitted",
            job.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn job_with(compiler_id: Option<Uuid>, status: JobStatus) -> Job {
        Job {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            client_id: Uuid::new_v4(),
            compiler_id,
            status,
            compiler_step: None,
            deadline: None,
            price: None,
            analysis_result: None,
            confirmed_fields: None,
            extracted_data: None,
            supplier_name: None,
            template_found: None,
            completed_at: None,
            output_file_id: None,
            inbound_email: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_system_always_authorized() {
        let job = job_with(Some(Uuid::new_v4()), JobStatus::InProgress);
        assert!(authorize_mutation(&job, Caller::System).is_ok());
    }

    #[test]
    fn test_owning_compiler_authorized() {
        let compiler = Uuid::new_v4();
        let job = job_with(Some(compiler), JobStatus::InProgress);
        assert!(authorize_mutation(&job, Caller::Compiler(compiler)).is_ok());
    }

    #[test]
    fn test_other_compiler_rejected() {
        let job = job_with(Some(Uuid::new_v4()), JobStatus::InProgress);
        let err = authorize_mutation(&job, Caller::Compiler(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_unassigned_job_rejects_compilers() {
        let job = job_with(None, JobStatus::Received);
        assert!(authorize_mutation(&job, Caller::Compiler(Uuid::new_v4())).is_err());
    }

    #[test]
    fn test_status_forward_transitions_ok() {
        assert!(check_status_transition(JobStatus::Received, JobStatus::InProgress).is_ok());
        assert!(check_status_transition(JobStatus::InProgress, JobStatus::Completed).is_ok());
        assert!(check_status_transition(JobStatus::InProgress, JobStatus::InProgress).is_ok());
    }

    #[test]
    fn test_status_backward_transitions_rejected() {
        assert!(check_status_transition(JobStatus::Completed, JobStatus::InProgress).is_err());
        assert!(check_status_transition(JobStatus::InProgress, JobStatus::Received).is_err());
    }

    #[test]
    fn test_manual_reset_gating() {
        assert!(check_manual_reset(&job_with(None, JobStatus::InProgress)).is_ok());
        assert!(check_manual_reset(&job_with(Some(Uuid::new_v4()), JobStatus::InProgress)).is_err());
        assert!(check_manual_reset(&job_with(None, JobStatus::Completed)).is_err());
    }
}
