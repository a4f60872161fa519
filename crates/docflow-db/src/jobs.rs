//! Job repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use docflow_core::policy::{authorize_mutation, check_manual_reset, check_status_transition};
use docflow_core::{
    new_v7, AnalysisResult, Caller, CompleteJobRequest, CreateJobRequest, Error, Job, JobFile,
    JobRepository, JobStatus, JobWithFiles, Result, SuggestedField, UpdateStepRequest,
    WorkflowStep,
};

/// PostgreSQL implementation of [`JobRepository`].
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &PgRow) -> Result<Job> {
        let status: String = row.get("status");
        let step: Option<String> = row.get("compiler_step");
        let analysis: Option<JsonValue> = row.get("analysis_result");
        let confirmed: Option<JsonValue> = row.get("confirmed_fields");

        Ok(Job {
            id: row.get("id"),
            title: row.get("title"),
            client_id: row.get("client_id"),
            compiler_id: row.get("compiler_id"),
            status: status.parse::<JobStatus>().map_err(Error::Serialization)?,
            compiler_step: step
                .map(|s| s.parse::<WorkflowStep>().map_err(Error::Serialization))
                .transpose()?,
            deadline: row.get("deadline"),
            price: row.get("price"),
            analysis_result: analysis
                .map(serde_json::from_value::<AnalysisResult>)
                .transpose()?,
            confirmed_fields: confirmed
                .map(serde_json::from_value::<Vec<SuggestedField>>)
                .transpose()?,
            extracted_data: row.get("extracted_data"),
            supplier_name: row.get("supplier_name"),
            template_found: row.get("template_found"),
            completed_at: row.get("completed_at"),
            output_file_id: row.get("output_file_id"),
            inbound_email: row.get("inbound_email"),
            created_at: row.get("created_at"),
        })
    }

    fn file_from_row(row: &PgRow) -> JobFile {
        JobFile {
            id: row.get("id"),
            job_id: row.get("job_id"),
            file_name: row.get("file_name"),
            storage_id: row.get("storage_id"),
            content_type: row.get("content_type"),
            created_at: row.get("created_at"),
        }
    }

    const JOB_COLUMNS: &'static str = "id, title, client_id, compiler_id, status, compiler_step, \
         deadline, price, analysis_result, confirmed_fields, extracted_data, supplier_name, \
         template_found, completed_at, output_file_id, inbound_email, created_at";
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO job (id, title, client_id, status, deadline, price, inbound_email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(&req.title)
        .bind(req.client_id)
        .bind(JobStatus::Received.to_string())
        .bind(req.deadline)
        .bind(req.price)
        .bind(&req.inbound_email)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for (file_name, storage_id, content_type) in &req.files {
            sqlx::query(
                r#"
                INSERT INTO job_file (id, job_id, file_name, storage_id, content_type, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(new_v7())
            .bind(id)
            .bind(file_name)
            .bind(storage_id)
            .bind(content_type)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        debug!(job_id = %id, file_count = req.files.len(), "Created job");
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM job WHERE id = $1",
            Self::JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn fetch_with_files(&self, id: Uuid) -> Result<Option<JobWithFiles>> {
        let Some(job) = self.fetch(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT id, job_id, file_name, storage_id, content_type, created_at
            FROM job_file
            WHERE job_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Some(JobWithFiles {
            job,
            files: rows.iter().map(Self::file_from_row).collect(),
        }))
    }

    async fn accept(&self, id: Uuid, compiler_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE job
            SET compiler_id = $2, status = $3
            WHERE id = $1 AND compiler_id IS NULL AND status != $4
            "#,
        )
        .bind(id)
        .bind(compiler_id)
        .bind(JobStatus::InProgress.to_string())
        .bind(JobStatus::Completed.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Either missing, already assigned, or completed.
            return match self.fetch(id).await? {
                None => Err(Error::JobNotFound(id)),
                Some(job) if job.compiler_id.is_some() => Err(Error::Workflow(format!(
                    "job {} already has a compiler",
                    id
                ))),
                Some(_) => Err(Error::Workflow(format!("job {} is completed", id))),
            };
        }
        Ok(())
    }

    async fn update_step(&self, id: Uuid, caller: Caller, req: UpdateStepRequest) -> Result<()> {
        let job = self.fetch(id).await?.ok_or(Error::JobNotFound(id))?;
        authorize_mutation(&job, caller)?;
        if let Some(next) = req.status {
            // The pipeline's failure reset uses reset_for_manual, so even
            // system callers are held to forward-only here.
            check_status_transition(job.status, next)?;
        }

        // Build dynamic patch query over exactly the declared fields.
        let mut updates: Vec<String> = Vec::new();
        let mut param_count = 1;
        let mut push = |updates: &mut Vec<String>, col: &str| {
            updates.push(format!("{} = ${}", col, param_count));
            param_count += 1;
        };

        if req.compiler_step.is_some() {
            push(&mut updates, "compiler_step");
        }
        if req.status.is_some() {
            push(&mut updates, "status");
        }
        if req.analysis_result.is_some() {
            push(&mut updates, "analysis_result");
        }
        if req.confirmed_fields.is_some() {
            push(&mut updates, "confirmed_fields");
        }
        if req.extracted_data.is_some() {
            push(&mut updates, "extracted_data");
        }
        if req.supplier_name.is_some() {
            push(&mut updates, "supplier_name");
        }
        if req.template_found.is_some() {
            push(&mut updates, "template_found");
        }

        if updates.is_empty() {
            // Redundant invocation with nothing to change; by contract a no-op.
            return Ok(());
        }

        let query = format!(
            "UPDATE job SET {} WHERE id = ${}",
            updates.join(", "),
            param_count
        );

        let mut q = sqlx::query(&query);
        if let Some(step) = req.compiler_step {
            q = q.bind(step.to_string());
        }
        if let Some(status) = req.status {
            q = q.bind(status.to_string());
        }
        if let Some(analysis) = &req.analysis_result {
            q = q.bind(serde_json::to_value(analysis)?);
        }
        if let Some(confirmed) = &req.confirmed_fields {
            q = q.bind(serde_json::to_value(confirmed)?);
        }
        if let Some(extracted) = &req.extracted_data {
            q = q.bind(extracted.clone());
        }
        if let Some(supplier) = &req.supplier_name {
            q = q.bind(supplier);
        }
        if let Some(found) = req.template_found {
            q = q.bind(found);
        }

        q.bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, caller: Caller, req: CompleteJobRequest) -> Result<()> {
        let job = self.fetch(id).await?.ok_or(Error::JobNotFound(id))?;
        authorize_mutation(&job, caller)?;
        check_status_transition(job.status, JobStatus::Completed)?;
        if job.status == JobStatus::Completed {
            return Err(Error::Workflow(format!("job {} is already completed", id)));
        }

        let analysis = AnalysisResult {
            header_fields: req.header_fields,
            line_item_fields: req.line_item_fields,
            document_type: job
                .analysis_result
                .as_ref()
                .map(|a| a.document_type.clone())
                .unwrap_or_else(|| "invoice".to_string()),
            confidence: job
                .analysis_result
                .as_ref()
                .map(|a| a.confidence)
                .unwrap_or(1.0),
            notes: job.analysis_result.and_then(|a| a.notes),
        };

        sqlx::query(
            r#"
            UPDATE job
            SET status = $2,
                compiler_step = $3,
                completed_at = $4,
                output_file_id = $5,
                analysis_result = $6,
                extracted_data = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(JobStatus::Completed.to_string())
        .bind(WorkflowStep::Completed.to_string())
        .bind(Utc::now())
        .bind(&req.output_file_id)
        .bind(serde_json::to_value(&analysis)?)
        .bind(&req.extracted_data)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn reset_for_manual(&self, id: Uuid) -> Result<()> {
        let job = self.fetch(id).await?.ok_or(Error::JobNotFound(id))?;
        check_manual_reset(&job)?;

        sqlx::query("UPDATE job SET status = $2, compiler_step = $3 WHERE id = $1")
            .bind(id)
            .bind(JobStatus::Received.to_string())
            .bind(WorkflowStep::Selecting.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
