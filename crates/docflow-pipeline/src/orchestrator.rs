//! Auto-processing orchestrator.
//!
//! Runs once per newly created job as the server-side fast path: identify
//! the supplier, look for a high-confidence template, extract against it,
//! and either complete the job outright or stage it for human review.
//! Outcomes that a human must handle are soft results, not errors; only
//! infrastructure faults propagate, and those leave the job reset to the
//! front of the manual queue.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use docflow_core::{
    defaults, Caller, Error, ExtractionOracle, JobRepository, JobStatus, JobWithFiles,
    NotificationDispatcher, ObjectStorage, ProcessingMode, Result, SystemConfig, UpdateStepRequest,
    WorkflowStep,
};
use docflow_inference::{with_retry, RetryPolicy};
use docflow_match::TemplateMatcher;
use docflow_workflow::JobWorkflow;

/// Terminal outcome of one auto-processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Job completed without human involvement.
    AutoCompleted,
    /// High-confidence extraction staged at `reviewing` for a compiler.
    ReadyForReview,
    /// The job needs the full manual workflow; it sits at
    /// `selecting`/RECEIVED in the queue.
    ManualProcessing,
}

/// Server-side auto-processing pipeline.
pub struct AutoProcessor {
    jobs: Arc<dyn JobRepository>,
    matcher: Arc<TemplateMatcher>,
    oracle: Arc<dyn ExtractionOracle>,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: SystemConfig,
}

impl AutoProcessor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        matcher: Arc<TemplateMatcher>,
        oracle: Arc<dyn ExtractionOracle>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: SystemConfig,
    ) -> Self {
        Self {
            jobs,
            matcher,
            oracle,
            storage,
            notifier,
            config,
        }
    }

    /// Process a freshly created job.
    ///
    /// On error the job is best-effort reset to `selecting`/RECEIVED so it
    /// stays queue-visible; the reset never masks the original error.
    #[instrument(skip(self), fields(subsystem = "pipeline"))]
    pub async fn process(&self, job_id: Uuid) -> Result<PipelineOutcome> {
        match self.run(job_id).await {
            Ok(outcome) => {
                info!(job_id = %job_id, outcome = ?outcome, "Auto-processing finished");
                Ok(outcome)
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Auto-processing failed");
                if let Err(reset_err) = self.jobs.reset_for_manual(job_id).await {
                    warn!(
                        job_id = %job_id,
                        error = %reset_err,
                        "Failure reset did not apply"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(&self, job_id: Uuid) -> Result<PipelineOutcome> {
        // Creation and processing race; wait briefly for the job row.
        let with_files = with_retry(RetryPolicy::job_fetch(), "fetch_job", || async {
            self.jobs
                .fetch_with_files(job_id)
                .await?
                .ok_or(Error::JobNotFound(job_id))
        })
        .await?;

        self.jobs
            .update_step(
                job_id,
                Caller::System,
                UpdateStepRequest {
                    compiler_step: Some(WorkflowStep::Selecting),
                    status: Some(JobStatus::InProgress),
                    ..Default::default()
                },
            )
            .await?;

        let file_urls = self.collect_file_urls(&with_files).await?;

        // A missing supplier is a designed outcome: the documents simply
        // don't identify one, so a human takes over.
        let supplier = match self.oracle.extract_supplier(&file_urls).await {
            Ok(Some(supplier)) => supplier,
            Ok(None) => {
                info!(job_id = %job_id, "No supplier identified");
                return self.manual_processing(job_id, None, false).await;
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Supplier identification failed");
                return self.manual_processing(job_id, None, false).await;
            }
        };

        self.jobs
            .update_step(
                job_id,
                Caller::System,
                UpdateStepRequest {
                    compiler_step: Some(WorkflowStep::Analyzing),
                    ..Default::default()
                },
            )
            .await?;

        let matches = self.matcher.find_matches(&supplier, None).await?;
        let best = match matches.first() {
            Some(best) => best.clone(),
            None => {
                info!(job_id = %job_id, supplier = %supplier, "No template match");
                return self.manual_processing(job_id, Some(supplier), false).await;
            }
        };

        if best.score < defaults::AUTO_PROCESS_SCORE {
            info!(
                job_id = %job_id,
                supplier = %supplier,
                best_score = best.score,
                "Best match below automation gate"
            );
            return self.manual_processing(job_id, Some(supplier), true).await;
        }

        self.jobs
            .update_step(
                job_id,
                Caller::System,
                UpdateStepRequest {
                    supplier_name: Some(supplier.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let mut machine = JobWorkflow::load(self.jobs.clone(), job_id, Caller::System).await?;
        machine.select_template(&best).await?;
        machine
            .run_extraction(self.oracle.as_ref(), self.storage.as_ref())
            .await?;

        match self.config.processing_mode {
            ProcessingMode::AutoProcess => {
                machine
                    .complete(self.storage.as_ref(), self.notifier.as_ref())
                    .await?;
                Ok(PipelineOutcome::AutoCompleted)
            }
            ProcessingMode::RequireHumanReview => {
                // run_extraction already left the job at `reviewing` with
                // the extracted data persisted.
                Ok(PipelineOutcome::ReadyForReview)
            }
        }
    }

    async fn collect_file_urls(&self, with_files: &JobWithFiles) -> Result<Vec<String>> {
        if with_files.files.is_empty() {
            return Err(Error::Workflow(format!(
                "job {} has no source documents",
                with_files.job.id
            )));
        }
        let mut urls = Vec::with_capacity(with_files.files.len());
        for file in &with_files.files {
            urls.push(self.storage.resolve_url(&file.storage_id).await?);
        }
        Ok(urls)
    }

    /// Soft landing: record what we learned, then hand the job back to
    /// the manual queue at `selecting`/RECEIVED.
    async fn manual_processing(
        &self,
        job_id: Uuid,
        supplier: Option<String>,
        template_found: bool,
    ) -> Result<PipelineOutcome> {
        self.jobs
            .update_step(
                job_id,
                Caller::System,
                UpdateStepRequest {
                    supplier_name: supplier,
                    template_found: Some(template_found),
                    ..Default::default()
                },
            )
            .await?;
        self.jobs.reset_for_manual(job_id).await?;
        Ok(PipelineOutcome::ManualProcessing)
    }
}
