//! Job completion: CSV artifact, storage upload, final mutation, and
//! the conditional completion notification.

use tracing::{info, warn};

use docflow_core::{
    CompleteJobRequest, Error, JobStatus, NotificationDispatcher, ObjectStorage, Result,
    WorkflowStep,
};

use crate::export;
use crate::machine::JobWorkflow;

impl JobWorkflow {
    /// Finish the job: serialize the reviewed data to CSV, upload it,
    /// record the completion, and notify the inbound-email sender if the
    /// job has one.
    ///
    /// Notification dispatch is fire-and-forget; its failure never fails
    /// the completion. Returns the CSV artifact's storage id.
    pub async fn complete(
        &mut self,
        storage: &dyn ObjectStorage,
        notifier: &dyn NotificationDispatcher,
    ) -> Result<String> {
        let schema = self.confirmed_schema()?;
        let extracted = self
            .job
            .extracted_data
            .clone()
            .ok_or_else(|| Error::Workflow("job has no extracted data yet".to_string()))?;

        let csv = export::to_csv(&schema, &extracted)?;
        let file_name = format!("{}.csv", self.job.title);
        let output_file_id = storage.upload(&file_name, "text/csv", &csv).await?;

        self.jobs
            .complete(
                self.job.id,
                self.caller,
                CompleteJobRequest {
                    output_file_id: output_file_id.clone(),
                    header_fields: schema.header_fields,
                    line_item_fields: schema.line_item_fields,
                    extracted_data: extracted,
                },
            )
            .await?;
        self.job.status = JobStatus::Completed;
        self.job.compiler_step = Some(WorkflowStep::Completed);
        self.job.output_file_id = Some(output_file_id.clone());

        info!(
            job_id = %self.job.id,
            output_file_id = %output_file_id,
            "Job completed"
        );

        if let Some(recipient) = &self.job.inbound_email {
            if let Err(err) = notifier
                .send_completion_notification(recipient, self.job.id, &output_file_id)
                .await
            {
                warn!(
                    job_id = %self.job.id,
                    error = %err,
                    "Completion notification failed"
                );
            }
        }

        Ok(output_file_id)
    }
}
