//! Job workflow state machine.
//!
//! Drives one job through `selecting → analyzing → confirming →
//! extracting → reviewing → completed` on behalf of a single caller.
//! The machine keeps a working copy of the job, persists every state
//! change as a narrow idempotent patch, and owns the processed-call set
//! that makes tool-result reconciliation at-most-once.

use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docflow_core::merge::{merge_extracted, replace_document};
use docflow_core::resume::resume;
use docflow_core::{
    fields, AnalysisResult, Caller, Error, ExtractionOracle, ExtractionSchema, FieldGroup,
    FieldType, Job, JobFile, JobRepository, ObjectStorage, Result, SuggestedField, TemplateMatch,
    ToolInvocation, ToolOutcome, UpdateStepRequest, UpsertTemplateRequest, WorkflowStep,
};
use docflow_inference::{with_retry, RetryPolicy};

/// State machine for one job's extraction workflow.
pub struct JobWorkflow {
    pub(crate) jobs: Arc<dyn JobRepository>,
    pub(crate) caller: Caller,
    pub(crate) job: Job,
    pub(crate) files: Vec<JobFile>,
    processed_calls: HashSet<String>,
    last_matches: Vec<TemplateMatch>,
}

impl JobWorkflow {
    /// Load a job and position the workflow at its resume step.
    pub async fn load(jobs: Arc<dyn JobRepository>, job_id: Uuid, caller: Caller) -> Result<Self> {
        let with_files = jobs
            .fetch_with_files(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;

        let machine = Self {
            jobs,
            caller,
            job: with_files.job,
            files: with_files.files,
            processed_calls: HashSet::new(),
            last_matches: Vec::new(),
        };
        debug!(
            job_id = %job_id,
            step = %machine.current_step(),
            "Loaded workflow"
        );
        Ok(machine)
    }

    /// The step the workflow is currently at, derived from persisted
    /// state so a reloaded machine lands where the previous one left off.
    pub fn current_step(&self) -> WorkflowStep {
        resume(&self.job)
    }

    /// Working copy of the job.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Source documents attached to the job.
    pub fn files(&self) -> &[JobFile] {
        &self.files
    }

    /// Template matches delivered by the most recent `matchTemplate`
    /// tool result.
    pub fn last_matches(&self) -> &[TemplateMatch] {
        &self.last_matches
    }

    async fn persist(&self, req: UpdateStepRequest) -> Result<()> {
        self.jobs.update_step(self.job.id, self.caller, req).await
    }

    // -------------------------------------------------------------------------
    // Tool-result reconciliation
    // -------------------------------------------------------------------------

    /// Reconcile a batch of agent tool results into workflow state.
    ///
    /// Each call id is applied at most once; replays and unrecognized
    /// outcomes are skipped, never errors.
    pub async fn apply_tool_results(&mut self, invocations: &[ToolInvocation]) -> Result<()> {
        for invocation in invocations {
            if !self.processed_calls.insert(invocation.call_id.clone()) {
                debug!(
                    job_id = %self.job.id,
                    call_id = %invocation.call_id,
                    "Skipping replayed tool call"
                );
                continue;
            }
            match &invocation.outcome {
                ToolOutcome::AnalyzeInvoice(analysis) => {
                    self.accept_analysis(analysis.clone()).await?;
                }
                ToolOutcome::ExtractInvoice { extracted_data } => {
                    self.complete_extraction(extracted_data.clone()).await?;
                }
                ToolOutcome::MatchTemplate { matches } => {
                    self.accept_matches(matches.clone()).await?;
                }
            }
        }
        Ok(())
    }

    /// Record an analysis result and seed the confirmed set with every
    /// suggested field; moves to `confirming`.
    pub async fn accept_analysis(&mut self, analysis: AnalysisResult) -> Result<()> {
        let confirmed = analysis.all_fields();
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Confirming),
            analysis_result: Some(analysis.clone()),
            confirmed_fields: Some(confirmed.clone()),
            ..Default::default()
        })
        .await?;
        self.job.analysis_result = Some(analysis);
        self.job.confirmed_fields = Some(confirmed);
        self.job.compiler_step = Some(WorkflowStep::Confirming);
        Ok(())
    }

    async fn accept_matches(&mut self, matches: Vec<TemplateMatch>) -> Result<()> {
        // With no schema in place yet, the top-ranked match is adopted
        // outright; the compiler can still re-select or skip afterwards.
        if let Some(best) = matches.first().cloned() {
            if self.job.analysis_result.is_none() {
                self.last_matches = matches;
                return self.select_template(&best).await;
            }
        }

        let found = !matches.is_empty();
        self.persist(UpdateStepRequest {
            template_found: Some(found),
            ..Default::default()
        })
        .await?;
        self.job.template_found = Some(found);
        self.last_matches = matches;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Template selection
    // -------------------------------------------------------------------------

    /// Adopt a matched template's schema wholesale.
    ///
    /// Overwrites analysis_result and confirmed_fields with the template
    /// content; any in-progress field edits on this job are discarded.
    pub async fn select_template(&mut self, template: &TemplateMatch) -> Result<()> {
        let analysis = template.to_analysis_result();
        let confirmed = analysis.all_fields();
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Confirming),
            analysis_result: Some(analysis.clone()),
            confirmed_fields: Some(confirmed.clone()),
            template_found: Some(true),
            ..Default::default()
        })
        .await?;
        self.job.analysis_result = Some(analysis);
        self.job.confirmed_fields = Some(confirmed);
        self.job.template_found = Some(true);
        self.job.compiler_step = Some(WorkflowStep::Confirming);
        info!(
            job_id = %self.job.id,
            template_id = %template.template_id,
            "Selected template"
        );
        Ok(())
    }

    /// Decline the matched templates and fall through to AI analysis.
    pub async fn skip_templates(&mut self) -> Result<()> {
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Analyzing),
            template_found: Some(false),
            ..Default::default()
        })
        .await?;
        self.job.template_found = Some(false);
        self.job.compiler_step = Some(WorkflowStep::Analyzing);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Confirmed-field editing
    // -------------------------------------------------------------------------

    fn analysis_mut(&mut self) -> Result<&mut AnalysisResult> {
        self.job
            .analysis_result
            .as_mut()
            .ok_or_else(|| Error::Workflow("job has no analysis result yet".to_string()))
    }

    /// Toggle whether a suggested field is in the confirmed set.
    pub async fn set_field_confirmed(&mut self, name: &str, confirmed: bool) -> Result<()> {
        let analysis = self
            .job
            .analysis_result
            .as_ref()
            .ok_or_else(|| Error::Workflow("job has no analysis result yet".to_string()))?;
        let mut fields = self.job.confirmed_fields.clone().unwrap_or_default();

        if confirmed {
            if !fields.iter().any(|f| f.name == name) {
                let (_, field) = analysis
                    .find_field(name)
                    .ok_or_else(|| Error::InvalidInput(format!("unknown field: {}", name)))?;
                fields.push(field.clone());
            }
        } else {
            fields.retain(|f| f.name != name);
        }

        self.persist(UpdateStepRequest {
            confirmed_fields: Some(fields.clone()),
            ..Default::default()
        })
        .await?;
        self.job.confirmed_fields = Some(fields);
        Ok(())
    }

    /// Edit a field's presentation attributes, mirroring the change into
    /// the matching analysis_result entry so both views stay in sync.
    pub async fn edit_field(
        &mut self,
        name: &str,
        label: Option<String>,
        description: Option<String>,
        required: Option<bool>,
    ) -> Result<()> {
        let apply = |field: &mut SuggestedField| {
            if let Some(label) = &label {
                field.label = label.clone();
            }
            if let Some(description) = &description {
                field.description = description.clone();
            }
            if let Some(required) = required {
                field.required = required;
            }
        };

        {
            let analysis = self.analysis_mut()?;
            let field = analysis
                .find_field_mut(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown field: {}", name)))?;
            apply(field);
        }
        let mut confirmed = self.job.confirmed_fields.clone().unwrap_or_default();
        if let Some(field) = confirmed.iter_mut().find(|f| f.name == name) {
            apply(field);
        }

        let analysis = self.job.analysis_result.clone();
        self.persist(UpdateStepRequest {
            analysis_result: analysis,
            confirmed_fields: Some(confirmed.clone()),
            ..Default::default()
        })
        .await?;
        self.job.confirmed_fields = Some(confirmed);
        Ok(())
    }

    /// Add an ad-hoc field. The name is slugified from the label; the
    /// field lands in the chosen analysis group and the confirmed set.
    pub async fn add_custom_field(
        &mut self,
        label: &str,
        field_type: FieldType,
        group: FieldGroup,
        description: &str,
        required: bool,
    ) -> Result<()> {
        let name = fields::slugify_label(label);
        if name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "label produces an empty field name: {:?}",
                label
            )));
        }

        let field = SuggestedField {
            name: name.clone(),
            label: label.to_string(),
            field_type,
            description: description.to_string(),
            required,
            example: None,
        };

        {
            let analysis = self.analysis_mut()?;
            if analysis.find_field(&name).is_some() {
                return Err(Error::InvalidInput(format!(
                    "field {} already exists",
                    name
                )));
            }
            match group {
                FieldGroup::Header => analysis.header_fields.push(field.clone()),
                FieldGroup::LineItem => analysis.line_item_fields.push(field.clone()),
            }
        }
        let mut confirmed = self.job.confirmed_fields.clone().unwrap_or_default();
        confirmed.push(field);

        let analysis = self.job.analysis_result.clone();
        self.persist(UpdateStepRequest {
            analysis_result: analysis,
            confirmed_fields: Some(confirmed.clone()),
            ..Default::default()
        })
        .await?;
        self.job.confirmed_fields = Some(confirmed);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Extraction
    // -------------------------------------------------------------------------

    /// Split the confirmed set into the schema handed to the oracle,
    /// using the analysis result's grouping.
    pub fn confirmed_schema(&self) -> Result<ExtractionSchema> {
        let confirmed = self
            .job
            .confirmed_fields
            .as_ref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                Error::Workflow("at least one confirmed field is required".to_string())
            })?;
        let analysis = self
            .job
            .analysis_result
            .as_ref()
            .ok_or_else(|| Error::Workflow("job has no analysis result yet".to_string()))?;

        let mut schema = ExtractionSchema {
            header_fields: Vec::new(),
            line_item_fields: Vec::new(),
        };
        for field in confirmed {
            match analysis.find_field(&field.name).map(|(group, _)| group) {
                Some(FieldGroup::LineItem) => schema.line_item_fields.push(field.clone()),
                // Fields no longer present in the analysis default to the
                // header group.
                _ => schema.header_fields.push(field.clone()),
            }
        }
        Ok(schema)
    }

    /// Move to `extracting`. Fails unless at least one field is
    /// confirmed; returns the schema to extract against.
    pub async fn begin_extraction(&mut self) -> Result<ExtractionSchema> {
        let schema = self.confirmed_schema()?;
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Extracting),
            ..Default::default()
        })
        .await?;
        self.job.compiler_step = Some(WorkflowStep::Extracting);
        Ok(schema)
    }

    /// Record extracted data and move to `reviewing`.
    pub async fn complete_extraction(&mut self, extracted_data: JsonValue) -> Result<()> {
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Reviewing),
            extracted_data: Some(extracted_data.clone()),
            ..Default::default()
        })
        .await?;
        self.job.extracted_data = Some(extracted_data);
        self.job.compiler_step = Some(WorkflowStep::Reviewing);
        Ok(())
    }

    /// Roll back to `confirming` after a failed extraction so the
    /// schema can be adjusted and retried.
    pub async fn fail_extraction(&mut self) -> Result<()> {
        self.persist(UpdateStepRequest {
            compiler_step: Some(WorkflowStep::Confirming),
            ..Default::default()
        })
        .await?;
        self.job.compiler_step = Some(WorkflowStep::Confirming);
        Ok(())
    }

    /// Run extraction end to end: gate, oracle call with bounded retry,
    /// success or rollback. The original oracle error is surfaced after
    /// the rollback.
    pub async fn run_extraction(
        &mut self,
        oracle: &dyn ExtractionOracle,
        storage: &dyn ObjectStorage,
    ) -> Result<()> {
        let schema = self.begin_extraction().await?;

        let mut file_urls = Vec::with_capacity(self.files.len());
        for file in &self.files {
            match storage.resolve_url(&file.storage_id).await {
                Ok(url) => file_urls.push(url),
                Err(err) => {
                    warn!(
                        job_id = %self.job.id,
                        storage_id = %file.storage_id,
                        error = %err,
                        "Source document unavailable, returning to confirming"
                    );
                    self.fail_extraction().await?;
                    return Err(err);
                }
            }
        }
        if file_urls.is_empty() {
            self.fail_extraction().await?;
            return Err(Error::Workflow("job has no source documents".to_string()));
        }

        let outcome = with_retry(RetryPolicy::extraction(), "extract", || {
            oracle.extract(&file_urls, &schema)
        })
        .await;

        match outcome {
            Ok(extracted) => self.complete_extraction(extracted).await,
            Err(err) => {
                warn!(
                    job_id = %self.job.id,
                    error = %err,
                    "Extraction failed, returning to confirming"
                );
                self.fail_extraction().await?;
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Review
    // -------------------------------------------------------------------------

    fn extracted_data(&self) -> Result<&JsonValue> {
        self.job
            .extracted_data
            .as_ref()
            .ok_or_else(|| Error::Workflow("job has no extracted data yet".to_string()))
    }

    /// Deep-merge review edits into the extracted payload. Objects merge
    /// key-wise, arrays and scalars replace; unknown top-level sections
    /// are dropped.
    pub async fn merge_review_edits(&mut self, edits: &JsonValue) -> Result<()> {
        let merged = merge_extracted(self.extracted_data()?, edits);
        self.persist(UpdateStepRequest {
            extracted_data: Some(merged.clone()),
            ..Default::default()
        })
        .await?;
        self.job.extracted_data = Some(merged);
        Ok(())
    }

    /// Replace exactly one document of a multi-document payload.
    pub async fn edit_document(&mut self, index: usize, doc: JsonValue) -> Result<()> {
        let replaced = replace_document(self.extracted_data()?, index, doc)?;
        self.persist(UpdateStepRequest {
            extracted_data: Some(replaced.clone()),
            ..Default::default()
        })
        .await?;
        self.job.extracted_data = Some(replaced);
        Ok(())
    }

    /// Discard the current analysis and restart from `confirming` with a
    /// fresh analysis result.
    pub async fn reanalyze(&mut self, analysis: AnalysisResult) -> Result<()> {
        self.accept_analysis(analysis).await
    }

    /// Build a template upsert request from this job's reviewed schema,
    /// so the schema can be reused for future jobs from the same
    /// supplier. Requires a known supplier name and a confirmed schema.
    pub fn template_request(&self) -> Result<UpsertTemplateRequest> {
        let supplier = self
            .job
            .supplier_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Workflow("job has no supplier name".to_string()))?;
        let schema = self.confirmed_schema()?;
        let created_by = match self.caller {
            Caller::Compiler(id) => Some(id),
            Caller::System => None,
        };
        Ok(UpsertTemplateRequest {
            template_id: None,
            client_id: Some(self.job.client_id),
            supplier,
            client_name: None,
            header_fields: schema.header_fields,
            line_item_fields: schema.line_item_fields,
            created_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_db::memory::{InMemoryJobRepository, MemoryStorage};
    use docflow_inference::MockOracle;
    use serde_json::json;

    fn field(name: &str, label: &str) -> SuggestedField {
        SuggestedField {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::String,
            description: String::new(),
            required: true,
            example: None,
        }
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            header_fields: vec![field("invoiceDate", "Invoice Date"), field("total", "Total")],
            line_item_fields: vec![field("quantity", "Quantity")],
            document_type: "invoice".to_string(),
            confidence: 0.9,
            notes: None,
        }
    }

    async fn seeded_workflow() -> (JobWorkflow, Arc<InMemoryJobRepository>, Uuid, Uuid) {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job_id = repo
            .create(docflow_core::CreateJobRequest {
                title: "Invoices".to_string(),
                client_id: Uuid::new_v4(),
                deadline: None,
                price: None,
                inbound_email: None,
                files: vec![(
                    "a.pdf".to_string(),
                    "unused".to_string(),
                    "application/pdf".to_string(),
                )],
            })
            .await
            .unwrap();
        let compiler = Uuid::new_v4();
        repo.accept(job_id, compiler).await.unwrap();

        let machine = JobWorkflow::load(repo.clone(), job_id, Caller::Compiler(compiler))
            .await
            .unwrap();
        (machine, repo, job_id, compiler)
    }

    fn invocation(call_id: &str, outcome: ToolOutcome) -> ToolInvocation {
        ToolInvocation {
            call_id: call_id.to_string(),
            outcome,
        }
    }

    #[tokio::test]
    async fn test_fresh_job_resumes_at_analyzing() {
        let (machine, _, _, _) = seeded_workflow().await;
        assert_eq!(machine.current_step(), WorkflowStep::Analyzing);
    }

    #[tokio::test]
    async fn test_analysis_seeds_confirmed_and_moves_to_confirming() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();

        assert_eq!(machine.current_step(), WorkflowStep::Confirming);
        let job = repo.snapshot(job_id).unwrap();
        assert_eq!(job.confirmed_fields.unwrap().len(), 3);
        assert_eq!(job.compiler_step, Some(WorkflowStep::Confirming));
    }

    #[tokio::test]
    async fn test_tool_replay_is_noop() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine
            .apply_tool_results(&[invocation("call-1", ToolOutcome::AnalyzeInvoice(analysis()))])
            .await
            .unwrap();
        machine.set_field_confirmed("total", false).await.unwrap();
        let before = repo.snapshot(job_id).unwrap().confirmed_fields.unwrap();

        // Replaying the same call id must not re-seed confirmed fields.
        machine
            .apply_tool_results(&[invocation("call-1", ToolOutcome::AnalyzeInvoice(analysis()))])
            .await
            .unwrap();
        let after = repo.snapshot(job_id).unwrap().confirmed_fields.unwrap();
        assert_eq!(before, after);
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn test_field_edit_mirrors_into_analysis() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .edit_field("total", Some("Grand Total".to_string()), None, Some(false))
            .await
            .unwrap();

        let job = repo.snapshot(job_id).unwrap();
        let stored = job.analysis_result.unwrap();
        let (_, in_analysis) = stored.find_field("total").unwrap();
        assert_eq!(in_analysis.label, "Grand Total");
        assert!(!in_analysis.required);

        let in_confirmed = job
            .confirmed_fields
            .unwrap()
            .into_iter()
            .find(|f| f.name == "total")
            .unwrap();
        assert_eq!(in_confirmed.label, "Grand Total");
        assert!(!in_confirmed.required);
    }

    #[tokio::test]
    async fn test_unconfirm_and_reconfirm_field() {
        let (mut machine, _, _, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();

        machine.set_field_confirmed("quantity", false).await.unwrap();
        let schema = machine.confirmed_schema().unwrap();
        assert!(schema.line_item_fields.is_empty());

        machine.set_field_confirmed("quantity", true).await.unwrap();
        let schema = machine.confirmed_schema().unwrap();
        assert_eq!(schema.line_item_fields.len(), 1);

        assert!(machine.set_field_confirmed("bogus", true).await.is_err());
    }

    #[tokio::test]
    async fn test_add_custom_field_slugifies_label() {
        let (mut machine, _, _, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .add_custom_field("PO Number!!", FieldType::String, FieldGroup::Header, "", false)
            .await
            .unwrap();

        let schema = machine.confirmed_schema().unwrap();
        assert!(schema.header_fields.iter().any(|f| f.name == "poNumber"));

        // Duplicate names are rejected.
        assert!(machine
            .add_custom_field("PO Number", FieldType::String, FieldGroup::Header, "", false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_extraction_requires_confirmed_field() {
        let (mut machine, _, _, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        for name in ["invoiceDate", "total", "quantity"] {
            machine.set_field_confirmed(name, false).await.unwrap();
        }
        let err = machine.begin_extraction().await.unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
        assert_eq!(machine.current_step(), WorkflowStep::Confirming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_extraction_success() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        let storage = MemoryStorage::new();
        let storage_id = storage.upload("a.pdf", "application/pdf", b"%PDF").await.unwrap();
        // Point the job file at a live blob.
        {
            let with_files = repo.fetch_with_files(job_id).await.unwrap().unwrap();
            let mut files = with_files.files;
            files[0].storage_id = storage_id;
            repo.seed(with_files.job, files);
        }
        machine = JobWorkflow::load(
            repo.clone(),
            job_id,
            machine.caller,
        )
        .await
        .unwrap();
        machine.accept_analysis(analysis()).await.unwrap();

        let oracle = MockOracle::new();
        oracle.enqueue_extraction(json!({
            "header": {"invoiceDate": "2026-03-01", "total": 120.5},
            "lineItems": [{"quantity": 3}],
        }));

        machine.run_extraction(&oracle, &storage).await.unwrap();
        assert_eq!(machine.current_step(), WorkflowStep::Reviewing);
        let job = repo.snapshot(job_id).unwrap();
        assert_eq!(job.extracted_data.unwrap()["header"]["total"], 120.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_extraction_retries_then_rolls_back() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        let storage = MemoryStorage::new();
        let storage_id = storage.upload("a.pdf", "application/pdf", b"%PDF").await.unwrap();
        {
            let with_files = repo.fetch_with_files(job_id).await.unwrap().unwrap();
            let mut files = with_files.files;
            files[0].storage_id = storage_id;
            repo.seed(with_files.job, files);
        }
        machine = JobWorkflow::load(repo.clone(), job_id, machine.caller)
            .await
            .unwrap();
        machine.accept_analysis(analysis()).await.unwrap();

        let oracle = MockOracle::new();
        for _ in 0..3 {
            oracle.enqueue_extraction_failure("model timeout");
        }

        let err = machine.run_extraction(&oracle, &storage).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(oracle.extract_call_count(), 3);
        // Rolled back so the schema can be adjusted and retried.
        assert_eq!(machine.current_step(), WorkflowStep::Confirming);
        assert_eq!(
            repo.snapshot(job_id).unwrap().compiler_step,
            Some(WorkflowStep::Confirming)
        );
    }

    #[tokio::test]
    async fn test_review_merge_and_document_isolation() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .complete_extraction(json!({
                "documents": [
                    {"header": {"total": 10}, "lineItems": []},
                    {"header": {"total": 20}, "lineItems": []},
                ]
            }))
            .await
            .unwrap();

        machine
            .edit_document(0, json!({"header": {"total": 11}, "lineItems": []}))
            .await
            .unwrap();

        let data = repo.snapshot(job_id).unwrap().extracted_data.unwrap();
        assert_eq!(data["documents"][0]["header"]["total"], 11);
        assert_eq!(data["documents"][1]["header"]["total"], 20);

        assert!(machine
            .edit_document(5, json!({"header": {}}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_review_merge_single_document() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .complete_extraction(json!({
                "header": {"invoiceDate": "2026-03-01", "total": 100},
                "lineItems": [{"quantity": 1}],
            }))
            .await
            .unwrap();

        machine
            .merge_review_edits(&json!({"header": {"total": 99}}))
            .await
            .unwrap();

        let data = repo.snapshot(job_id).unwrap().extracted_data.unwrap();
        assert_eq!(data["header"]["total"], 99);
        // Untouched keys survive the merge.
        assert_eq!(data["header"]["invoiceDate"], "2026-03-01");
        assert_eq!(data["lineItems"][0]["quantity"], 1);
    }

    #[tokio::test]
    async fn test_select_template_overwrites_edits() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .edit_field("total", Some("Grand Total".to_string()), None, None)
            .await
            .unwrap();

        let template = TemplateMatch {
            template_id: Uuid::new_v4(),
            supplier: "Acme".to_string(),
            client_name: None,
            header_fields: vec![field("abn", "ABN")],
            line_item_fields: vec![],
            score: 0.96,
        };
        machine.select_template(&template).await.unwrap();

        let job = repo.snapshot(job_id).unwrap();
        let stored = job.analysis_result.unwrap();
        // Wholesale replacement: the edited field is gone.
        assert!(stored.find_field("total").is_none());
        assert!(stored.find_field("abn").is_some());
        assert_eq!(job.template_found, Some(true));
    }

    #[tokio::test]
    async fn test_resume_prefers_extracted_data() {
        let (mut machine, repo, job_id, compiler) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .complete_extraction(json!({"header": {}, "lineItems": []}))
            .await
            .unwrap();

        // A fresh machine lands at reviewing.
        let reloaded = JobWorkflow::load(repo, job_id, Caller::Compiler(compiler))
            .await
            .unwrap();
        assert_eq!(reloaded.current_step(), WorkflowStep::Reviewing);
    }

    #[tokio::test]
    async fn test_template_request_captures_reviewed_schema() {
        let (mut machine, repo, job_id, compiler) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();

        // No supplier recorded yet.
        assert!(machine.template_request().is_err());

        repo.update_step(
            job_id,
            Caller::Compiler(compiler),
            UpdateStepRequest {
                supplier_name: Some("Acme Pty Ltd".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let machine = JobWorkflow::load(repo, job_id, Caller::Compiler(compiler))
            .await
            .unwrap();

        let req = machine.template_request().unwrap();
        assert_eq!(req.supplier, "Acme Pty Ltd");
        assert_eq!(req.client_id, Some(machine.job().client_id));
        assert_eq!(req.created_by, Some(compiler));
        assert_eq!(req.header_fields.len(), 2);
        assert_eq!(req.line_item_fields.len(), 1);
    }

    #[tokio::test]
    async fn test_match_result_auto_selects_top_match() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine
            .apply_tool_results(&[invocation(
                "m-1",
                ToolOutcome::MatchTemplate {
                    matches: vec![
                        TemplateMatch {
                            template_id: Uuid::new_v4(),
                            supplier: "Acme".to_string(),
                            client_name: None,
                            header_fields: vec![field("total", "Total")],
                            line_item_fields: vec![],
                            score: 0.91,
                        },
                        TemplateMatch {
                            template_id: Uuid::new_v4(),
                            supplier: "Acme Ltd".to_string(),
                            client_name: None,
                            header_fields: vec![field("abn", "ABN")],
                            line_item_fields: vec![],
                            score: 0.85,
                        },
                    ],
                },
            )])
            .await
            .unwrap();

        // The top-ranked schema is seeded and the workflow moves on.
        assert_eq!(machine.last_matches().len(), 2);
        assert_eq!(machine.current_step(), WorkflowStep::Confirming);
        let job = repo.snapshot(job_id).unwrap();
        assert_eq!(job.template_found, Some(true));
        let analysis = job.analysis_result.unwrap();
        assert!(analysis.find_field("total").is_some());
        assert!(analysis.find_field("abn").is_none());
        assert_eq!(job.confirmed_fields.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_result_keeps_existing_schema() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();
        machine
            .apply_tool_results(&[invocation(
                "m-1",
                ToolOutcome::MatchTemplate {
                    matches: vec![TemplateMatch {
                        template_id: Uuid::new_v4(),
                        supplier: "Acme".to_string(),
                        client_name: None,
                        header_fields: vec![field("abn", "ABN")],
                        line_item_fields: vec![],
                        score: 0.91,
                    }],
                },
            )])
            .await
            .unwrap();

        // An analysis already in progress is only annotated, not replaced.
        let job = repo.snapshot(job_id).unwrap();
        assert_eq!(job.template_found, Some(true));
        let stored = job.analysis_result.unwrap();
        assert!(stored.find_field("total").is_some());
        assert!(stored.find_field("abn").is_none());
        assert_eq!(machine.last_matches().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_match_result_records_not_found() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine
            .apply_tool_results(&[invocation(
                "m-1",
                ToolOutcome::MatchTemplate { matches: vec![] },
            )])
            .await
            .unwrap();

        let job = repo.snapshot(job_id).unwrap();
        assert_eq!(job.template_found, Some(false));
        assert!(job.analysis_result.is_none());
    }

    #[tokio::test]
    async fn test_run_extraction_missing_document_rolls_back() {
        let (mut machine, repo, job_id, _) = seeded_workflow().await;
        machine.accept_analysis(analysis()).await.unwrap();

        // The seeded storage_id points at no blob, so resolution fails.
        let storage = MemoryStorage::new();
        let err = machine
            .run_extraction(&MockOracle::new(), &storage)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(machine.current_step(), WorkflowStep::Confirming);
        assert_eq!(
            repo.snapshot(job_id).unwrap().compiler_step,
            Some(WorkflowStep::Confirming)
        );
    }
}
