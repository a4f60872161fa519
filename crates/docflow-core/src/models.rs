//! Core data models for docflow.
//!
//! These types are shared across all docflow crates and represent the
//! core domain entities: jobs, extraction templates, field schemas, and
//! the tool-result payloads produced by the extraction agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Lifecycle status of a job. Transitions are monotonic:
/// `Received → InProgress → Completed`, never reversed through any
/// interactive path. The auto-processing pipeline's failure reset is the
/// single exception and only applies before a compiler is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Received,
    InProgress,
    Completed,
}

impl JobStatus {
    /// Ordering rank used to enforce forward-only transitions.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "RECEIVED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(Self::Received),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Compiler-facing workflow step for a job's extraction lifecycle.
///
/// Forward-only: `selecting → analyzing → confirming → extracting →
/// reviewing → completed`, with two sanctioned reversals: extraction
/// failure falls back to `confirming`, and an explicit user re-analysis
/// restarts from `confirming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStep {
    Selecting,
    Analyzing,
    Confirming,
    Extracting,
    Reviewing,
    Completed,
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selecting => write!(f, "selecting"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Confirming => write!(f, "confirming"),
            Self::Extracting => write!(f, "extracting"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for WorkflowStep {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "selecting" => Ok(Self::Selecting),
            "analyzing" => Ok(Self::Analyzing),
            "confirming" => Ok(Self::Confirming),
            "extracting" => Ok(Self::Extracting),
            "reviewing" => Ok(Self::Reviewing),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid workflow step: {}", s)),
        }
    }
}

/// A unit of work for one client-submitted document set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub client_id: Uuid,
    /// Set exactly once, at acceptance; immutable thereafter.
    pub compiler_id: Option<Uuid>,
    pub status: JobStatus,
    /// Only meaningful while the job is not completed; frozen at
    /// `completed` afterwards.
    pub compiler_step: Option<WorkflowStep>,
    pub deadline: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub analysis_result: Option<AnalysisResult>,
    pub confirmed_fields: Option<Vec<SuggestedField>>,
    pub extracted_data: Option<JsonValue>,
    pub supplier_name: Option<String>,
    pub template_found: Option<bool>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Storage reference of the exported CSV artifact.
    pub output_file_id: Option<String>,
    /// Reply address when the job originated from an inbound email.
    /// Presence triggers a completion notification.
    pub inbound_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A source document attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub id: Uuid,
    pub job_id: Uuid,
    pub file_name: String,
    pub storage_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// A job together with its attached source documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithFiles {
    pub job: Job,
    pub files: Vec<JobFile>,
}

/// Identity of the actor performing a job mutation.
///
/// Compilers may only mutate jobs they are assigned to; the
/// auto-processing pipeline acts with elevated privilege before any
/// compiler is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Compiler(Uuid),
    System,
}

// =============================================================================
// FIELD SCHEMA TYPES
// =============================================================================

/// Value type of an extraction field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Date,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
        }
    }
}

/// Which group of the schema a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldGroup {
    Header,
    LineItem,
}

/// A single extraction field definition.
///
/// `name` is the stable join key between a job's `analysis_result` and
/// its `confirmed_fields`; the remaining attributes are user-editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Result of AI analysis (or a template match) for one job.
///
/// Produced once, then incrementally edited: label/description/required
/// changes made in the confirming step propagate back into these copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
    pub document_type: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AnalysisResult {
    /// Find a field by name across both groups, returning its group.
    pub fn find_field(&self, name: &str) -> Option<(FieldGroup, &SuggestedField)> {
        if let Some(f) = self.header_fields.iter().find(|f| f.name == name) {
            return Some((FieldGroup::Header, f));
        }
        self.line_item_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| (FieldGroup::LineItem, f))
    }

    /// Mutable lookup by name across both groups.
    pub fn find_field_mut(&mut self, name: &str) -> Option<&mut SuggestedField> {
        if let Some(i) = self.header_fields.iter().position(|f| f.name == name) {
            return Some(&mut self.header_fields[i]);
        }
        self.line_item_fields.iter_mut().find(|f| f.name == name)
    }

    /// Union of header and line-item fields, header first.
    pub fn all_fields(&self) -> Vec<SuggestedField> {
        let mut fields = self.header_fields.clone();
        fields.extend(self.line_item_fields.iter().cloned());
        fields
    }
}

/// Field schema handed to the extraction oracle: the confirmed subset of
/// the analysis result, split back into header and line-item groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSchema {
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
}

// =============================================================================
// TEMPLATE TYPES
// =============================================================================

/// A supplier-specific reusable field schema plus its semantic embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    pub id: Uuid,
    /// Templates may be client-scoped or global.
    pub client_id: Option<Uuid>,
    pub supplier: String,
    pub client_name: Option<String>,
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

/// One ranked candidate returned by the template matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub template_id: Uuid,
    pub supplier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
    pub score: f32,
}

impl TemplateMatch {
    /// Build an analysis result from this template's schema.
    pub fn to_analysis_result(&self) -> AnalysisResult {
        AnalysisResult {
            header_fields: self.header_fields.clone(),
            line_item_fields: self.line_item_fields.clone(),
            document_type: "invoice".to_string(),
            confidence: self.score,
            notes: Some(format!("Matched template for {}", self.supplier)),
        }
    }
}

/// Payload for creating or updating a template.
#[derive(Debug, Clone)]
pub struct UpsertTemplateRequest {
    /// If present, patch this template in place. Otherwise find-or-create
    /// by `(client_id, supplier)`.
    pub template_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub supplier: String,
    pub client_name: Option<String>,
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
    pub created_by: Option<Uuid>,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Global processing mode for the auto-processing pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Complete high-confidence jobs without human review.
    #[serde(rename = "auto-process")]
    AutoProcess,
    /// Always hand high-confidence jobs to a compiler for review.
    #[default]
    #[serde(rename = "require-human-review")]
    RequireHumanReview,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoProcess => write!(f, "auto-process"),
            Self::RequireHumanReview => write!(f, "require-human-review"),
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto-process" => Ok(Self::AutoProcess),
            "require-human-review" => Ok(Self::RequireHumanReview),
            _ => Err(format!("Invalid processing mode: {}", s)),
        }
    }
}

/// Typed view of the global key/value settings store.
///
/// Loaded once and injected into the orchestrator rather than fetched
/// ambiently mid-pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub processing_mode: ProcessingMode,
    /// Compiler commission split, percent of job price (0-100).
    pub commission_percent: i64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            processing_mode: ProcessingMode::default(),
            commission_percent: crate::defaults::DEFAULT_COMMISSION_PERCENT,
        }
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Request for creating a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub title: String,
    pub client_id: Uuid,
    pub deadline: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub inbound_email: Option<String>,
    /// `(file_name, storage_id, content_type)` triples for attached documents.
    pub files: Vec<(String, String, String)>,
}

/// Narrow patch for the idempotent "update step" call.
///
/// Only the listed fields are touched; the call is safe to invoke
/// redundantly, which the interactive workflow does on every relevant
/// state change.
#[derive(Debug, Clone, Default)]
pub struct UpdateStepRequest {
    pub compiler_step: Option<WorkflowStep>,
    pub status: Option<JobStatus>,
    pub analysis_result: Option<AnalysisResult>,
    pub confirmed_fields: Option<Vec<SuggestedField>>,
    pub extracted_data: Option<JsonValue>,
    pub supplier_name: Option<String>,
    pub template_found: Option<bool>,
}

/// Request to record a job's final output and mark it completed.
#[derive(Debug, Clone)]
pub struct CompleteJobRequest {
    /// Storage reference of the exported CSV artifact.
    pub output_file_id: String,
    pub header_fields: Vec<SuggestedField>,
    pub line_item_fields: Vec<SuggestedField>,
    pub extracted_data: JsonValue,
}

// =============================================================================
// TOOL RESULT TYPES
// =============================================================================

/// One asynchronous tool invocation reported by the extraction agent,
/// tagged by a stable call id for at-most-once reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub call_id: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

/// Tagged union of recognized tool outcomes.
///
/// Unrecognized tool names are ignored at the dispatch layer, never
/// treated as errors; use [`ToolOutcome::parse`] when decoding raw agent
/// payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "result", rename_all = "camelCase")]
pub enum ToolOutcome {
    AnalyzeInvoice(AnalysisResult),
    ExtractInvoice {
        #[serde(rename = "extractedData")]
        extracted_data: JsonValue,
    },
    MatchTemplate {
        matches: Vec<TemplateMatch>,
    },
}

impl ToolOutcome {
    /// Decode a raw `(tool_name, payload)` pair into a recognized outcome.
    ///
    /// Returns `None` for unknown tool names or payloads that do not match
    /// the recognized schema for the tag.
    pub fn parse(tool_name: &str, payload: &JsonValue) -> Option<Self> {
        match tool_name {
            "analyzeInvoice" => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::AnalyzeInvoice),
            "extractInvoice" => {
                let extracted = payload.get("extractedData")?.clone();
                Some(Self::ExtractInvoice {
                    extracted_data: extracted,
                })
            }
            "matchTemplate" => {
                let matches = payload.get("matches")?.clone();
                serde_json::from_value(matches)
                    .ok()
                    .map(|m| Self::MatchTemplate { matches: m })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, label: &str) -> SuggestedField {
        SuggestedField {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::String,
            description: String::new(),
            required: false,
            example: None,
        }
    }

    #[test]
    fn test_job_status_display_roundtrip() {
        for status in [JobStatus::Received, JobStatus::InProgress, JobStatus::Completed] {
            let s = status.to_string();
            assert_eq!(s.parse::<JobStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_status_rank_monotonic() {
        assert!(JobStatus::Received.rank() < JobStatus::InProgress.rank());
        assert!(JobStatus::InProgress.rank() < JobStatus::Completed.rank());
    }

    #[test]
    fn test_workflow_step_display_roundtrip() {
        for step in [
            WorkflowStep::Selecting,
            WorkflowStep::Analyzing,
            WorkflowStep::Confirming,
            WorkflowStep::Extracting,
            WorkflowStep::Reviewing,
            WorkflowStep::Completed,
        ] {
            let s = step.to_string();
            assert_eq!(s.parse::<WorkflowStep>().unwrap(), step);
        }
    }

    #[test]
    fn test_suggested_field_serializes_type_key() {
        let f = field("invoiceDate", "Invoice Date");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["name"], "invoiceDate");
        // example is omitted when absent
        assert!(json.get("example").is_none());
    }

    #[test]
    fn test_analysis_result_find_field() {
        let ar = AnalysisResult {
            header_fields: vec![field("invoiceDate", "Invoice Date")],
            line_item_fields: vec![field("quantity", "Quantity")],
            document_type: "invoice".to_string(),
            confidence: 0.9,
            notes: None,
        };

        let (group, f) = ar.find_field("quantity").unwrap();
        assert_eq!(group, FieldGroup::LineItem);
        assert_eq!(f.label, "Quantity");

        let (group, _) = ar.find_field("invoiceDate").unwrap();
        assert_eq!(group, FieldGroup::Header);

        assert!(ar.find_field("missing").is_none());
    }

    #[test]
    fn test_analysis_result_all_fields_union() {
        let ar = AnalysisResult {
            header_fields: vec![field("a", "A"), field("b", "B")],
            line_item_fields: vec![field("c", "C")],
            document_type: "invoice".to_string(),
            confidence: 1.0,
            notes: None,
        };
        let names: Vec<String> = ar.all_fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_processing_mode_roundtrip() {
        assert_eq!(
            "auto-process".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::AutoProcess
        );
        assert_eq!(
            "require-human-review".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::RequireHumanReview
        );
        assert!("manual".parse::<ProcessingMode>().is_err());
        assert_eq!(ProcessingMode::default(), ProcessingMode::RequireHumanReview);
    }

    #[test]
    fn test_tool_outcome_parse_analyze() {
        let payload = json!({
            "headerFields": [{"name": "total", "label": "Total", "type": "number", "description": "", "required": true}],
            "lineItemFields": [],
            "documentType": "invoice",
            "confidence": 0.87
        });
        let outcome = ToolOutcome::parse("analyzeInvoice", &payload).unwrap();
        match outcome {
            ToolOutcome::AnalyzeInvoice(ar) => {
                assert_eq!(ar.header_fields[0].name, "total");
                assert_eq!(ar.header_fields[0].field_type, FieldType::Number);
            }
            _ => panic!("Expected AnalyzeInvoice"),
        }
    }

    #[test]
    fn test_tool_outcome_parse_extract() {
        let payload = json!({"extractedData": {"header": {"total": 42}}});
        let outcome = ToolOutcome::parse("extractInvoice", &payload).unwrap();
        match outcome {
            ToolOutcome::ExtractInvoice { extracted_data } => {
                assert_eq!(extracted_data["header"]["total"], 42);
            }
            _ => panic!("Expected ExtractInvoice"),
        }
    }

    #[test]
    fn test_tool_outcome_parse_unrecognized_is_none() {
        assert!(ToolOutcome::parse("summonDragon", &json!({})).is_none());
    }

    #[test]
    fn test_tool_outcome_parse_malformed_payload_is_none() {
        // analyzeInvoice payload missing required keys
        assert!(ToolOutcome::parse("analyzeInvoice", &json!({"nope": 1})).is_none());
        // extractInvoice without extractedData
        assert!(ToolOutcome::parse("extractInvoice", &json!({"data": 1})).is_none());
    }

    #[test]
    fn test_tool_outcome_match_template_equality() {
        let m = TemplateMatch {
            template_id: Uuid::new_v4(),
            supplier: "Acme".to_string(),
            client_name: None,
            header_fields: vec![field("total", "Total")],
            line_item_fields: vec![],
            score: 0.9,
        };
        let a = ToolOutcome::MatchTemplate {
            matches: vec![m.clone()],
        };
        let b = ToolOutcome::MatchTemplate { matches: vec![m] };
        assert_eq!(a, b);
        assert_ne!(a, ToolOutcome::MatchTemplate { matches: vec![] });
    }

    #[test]
    fn test_template_match_to_analysis_result() {
        let m = TemplateMatch {
            template_id: Uuid::new_v4(),
            supplier: "Acme Pty Ltd".to_string(),
            client_name: None,
            header_fields: vec![field("total", "Total")],
            line_item_fields: vec![field("qty", "Qty")],
            score: 0.97,
        };
        let ar = m.to_analysis_result();
        assert_eq!(ar.header_fields.len(), 1);
        assert_eq!(ar.confidence, 0.97);
        assert!(ar.notes.unwrap().contains("Acme"));
    }

    #[test]
    fn test_system_config_default() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.processing_mode, ProcessingMode::RequireHumanReview);
        assert_eq!(cfg.commission_percent, 50);
    }

    #[test]
    fn test_update_step_request_default_is_empty_patch() {
        let req = UpdateStepRequest::default();
        assert!(req.compiler_step.is_none());
        assert!(req.status.is_none());
        assert!(req.analysis_result.is_none());
        assert!(req.confirmed_fields.is_none());
        assert!(req.extracted_data.is_none());
        assert!(req.supplier_name.is_none());
        assert!(req.template_found.is_none());
    }
}
