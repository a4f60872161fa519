//! In-memory repository doubles.
//!
//! Deterministic stand-ins for the Postgres repositories and the object
//! store, enforcing the same mutation policy so workflow and pipeline
//! tests exercise real authorization and status rules without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use docflow_core::policy::{authorize_mutation, check_manual_reset, check_status_transition};
use docflow_core::{
    new_v7, Caller, CompleteJobRequest, CreateJobRequest, Error, ExtractionTemplate, Job, JobFile,
    JobRepository, JobStatus, JobWithFiles, NotificationDispatcher, ObjectStorage, Result,
    SettingsRepository, TemplateRepository, UpdateStepRequest, UpsertTemplateRequest,
    WorkflowStep,
};

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// =============================================================================
// JOBS
// =============================================================================

/// In-memory implementation of [`JobRepository`].
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, JobWithFiles>>>,
    steps: Arc<Mutex<HashMap<Uuid, Vec<WorkflowStep>>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read bypassing the repository contract, for assertions.
    pub fn snapshot(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).map(|j| j.job.clone())
    }

    /// Every step persisted through `update_step`, in order, for
    /// asserting the progress cursor's path.
    pub fn step_history(&self, id: Uuid) -> Vec<WorkflowStep> {
        self.steps.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    /// Seed a fully formed job, for tests that need preexisting state.
    pub fn seed(&self, job: Job, files: Vec<JobFile>) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id, JobWithFiles { job, files });
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let files = req
            .files
            .iter()
            .map(|(file_name, storage_id, content_type)| JobFile {
                id: new_v7(),
                job_id: id,
                file_name: file_name.clone(),
                storage_id: storage_id.clone(),
                content_type: content_type.clone(),
                created_at: now,
            })
            .collect();

        let job = Job {
            id,
            title: req.title,
            client_id: req.client_id,
            compiler_id: None,
            status: JobStatus::Received,
            compiler_step: None,
            deadline: req.deadline,
            price: req.price,
            analysis_result: None,
            confirmed_fields: None,
            extracted_data: None,
            supplier_name: None,
            template_found: None,
            completed_at: None,
            output_file_id: None,
            inbound_email: req.inbound_email,
            created_at: now,
        };
        self.jobs
            .lock()
            .unwrap()
            .insert(id, JobWithFiles { job, files });
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.snapshot(id))
    }

    async fn fetch_with_files(&self, id: Uuid) -> Result<Option<JobWithFiles>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn accept(&self, id: Uuid, compiler_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        if entry.job.compiler_id.is_some() {
            return Err(Error::Workflow(format!("job {} already has a compiler", id)));
        }
        if entry.job.status == JobStatus::Completed {
            return Err(Error::Workflow(format!("job {} is completed", id)));
        }
        entry.job.compiler_id = Some(compiler_id);
        entry.job.status = JobStatus::InProgress;
        Ok(())
    }

    async fn update_step(&self, id: Uuid, caller: Caller, req: UpdateStepRequest) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        authorize_mutation(&entry.job, caller)?;
        if let Some(next) = req.status {
            check_status_transition(entry.job.status, next)?;
        }

        let job = &mut entry.job;
        if let Some(step) = req.compiler_step {
            job.compiler_step = Some(step);
            self.steps.lock().unwrap().entry(id).or_default().push(step);
        }
        if let Some(status) = req.status {
            job.status = status;
        }
        if let Some(analysis) = req.analysis_result {
            job.analysis_result = Some(analysis);
        }
        if let Some(confirmed) = req.confirmed_fields {
            job.confirmed_fields = Some(confirmed);
        }
        if let Some(extracted) = req.extracted_data {
            job.extracted_data = Some(extracted);
        }
        if let Some(supplier) = req.supplier_name {
            job.supplier_name = Some(supplier);
        }
        if let Some(found) = req.template_found {
            job.template_found = Some(found);
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, caller: Caller, req: CompleteJobRequest) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        authorize_mutation(&entry.job, caller)?;
        check_status_transition(entry.job.status, JobStatus::Completed)?;
        if entry.job.status == JobStatus::Completed {
            return Err(Error::Workflow(format!("job {} is already completed", id)));
        }

        let job = &mut entry.job;
        if let Some(analysis) = job.analysis_result.as_mut() {
            analysis.header_fields = req.header_fields;
            analysis.line_item_fields = req.line_item_fields;
        } else {
            job.analysis_result = Some(docflow_core::AnalysisResult {
                header_fields: req.header_fields,
                line_item_fields: req.line_item_fields,
                document_type: "invoice".to_string(),
                confidence: 1.0,
                notes: None,
            });
        }
        job.extracted_data = Some(req.extracted_data);
        job.output_file_id = Some(req.output_file_id);
        job.status = JobStatus::Completed;
        job.compiler_step = Some(WorkflowStep::Completed);
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn reset_for_manual(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        check_manual_reset(&entry.job)?;
        entry.job.status = JobStatus::Received;
        entry.job.compiler_step = Some(WorkflowStep::Selecting);
        Ok(())
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// In-memory implementation of [`TemplateRepository`] with brute-force
/// cosine search over stored embeddings.
#[derive(Clone, Default)]
pub struct InMemoryTemplateRepository {
    templates: Arc<Mutex<HashMap<Uuid, (ExtractionTemplate, Vec<f32>)>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored templates.
    pub fn len(&self) -> usize {
        self.templates.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored embedding for a template, for assertions.
    pub fn embedding_of(&self, id: Uuid) -> Option<Vec<f32>> {
        self.templates
            .lock()
            .unwrap()
            .get(&id)
            .map(|(_, e)| e.clone())
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn insert(&self, req: UpsertTemplateRequest, embedding: Vec<f32>) -> Result<Uuid> {
        let id = new_v7();
        let template = ExtractionTemplate {
            id,
            client_id: req.client_id,
            supplier: req.supplier,
            client_name: req.client_name,
            header_fields: req.header_fields,
            line_item_fields: req.line_item_fields,
            created_at: Utc::now(),
            created_by: req.created_by,
        };
        self.templates
            .lock()
            .unwrap()
            .insert(id, (template, embedding));
        Ok(id)
    }

    async fn update(
        &self,
        id: Uuid,
        req: UpsertTemplateRequest,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let mut templates = self.templates.lock().unwrap();
        let (template, stored) = templates.get_mut(&id).ok_or(Error::TemplateNotFound(id))?;
        template.supplier = req.supplier;
        template.client_name = req.client_name;
        template.header_fields = req.header_fields;
        template.line_item_fields = req.line_item_fields;
        *stored = embedding;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExtractionTemplate>> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .get(&id)
            .map(|(t, _)| t.clone()))
    }

    async fn find_by_client_supplier(
        &self,
        client_id: Option<Uuid>,
        supplier: &str,
    ) -> Result<Option<ExtractionTemplate>> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .values()
            .find(|(t, _)| t.client_id == client_id && t.supplier == supplier)
            .map(|(t, _)| t.clone()))
    }

    async fn find_similar(
        &self,
        query: &[f32],
        limit: i64,
    ) -> Result<Vec<(ExtractionTemplate, f32)>> {
        let mut scored: Vec<(ExtractionTemplate, f32)> = self
            .templates
            .lock()
            .unwrap()
            .values()
            .map(|(t, e)| (t.clone(), cosine_similarity(query, e)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit as usize);
        Ok(scored)
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// In-memory implementation of [`SettingsRepository`].
#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// In-memory implementation of [`ObjectStorage`] with `mem://` URLs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes for a blob, for assertions.
    pub fn read(&self, storage_id: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(storage_id).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, _file_name: &str, _content_type: &str, data: &[u8]) -> Result<String> {
        let id = new_v7().to_string();
        self.blobs.lock().unwrap().insert(id.clone(), data.to_vec());
        Ok(id)
    }

    async fn resolve_url(&self, storage_id: &str) -> Result<String> {
        if !self.blobs.lock().unwrap().contains_key(storage_id) {
            return Err(Error::Storage(format!("no blob for id {}", storage_id)));
        }
        Ok(format!("mem://{}", storage_id))
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Recording dispatcher for asserting on completion notifications.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<(String, Uuid, String)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dispatches fail, for testing the fire-and-forget
    /// contract.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }

    /// All `(recipient, job_id, csv_ref)` notifications dispatched so far.
    pub fn sent(&self) -> Vec<(String, Uuid, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_completion_notification(
        &self,
        recipient: &str,
        job_id: Uuid,
        csv_ref: &str,
    ) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(Error::Notification("simulated dispatch failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), job_id, csv_ref.to_string()));
        Ok(())
    }
}
