//! Core traits for docflow abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for job persistence.
///
/// Every write path is a narrow, named patch that only touches the fields
/// it declares. Mutating calls take a [`Caller`]: compilers are rejected
/// for jobs they do not own, while `Caller::System` is the elevated path
/// used by the auto-processing pipeline before any compiler is assigned.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Create a new job (status `Received`, no compiler, no step).
    async fn create(&self, req: CreateJobRequest) -> Result<Uuid>;

    /// Fetch a job by id.
    async fn fetch(&self, id: Uuid) -> Result<Option<Job>>;

    /// Fetch a job together with its attached files.
    async fn fetch_with_files(&self, id: Uuid) -> Result<Option<JobWithFiles>>;

    /// Assign a compiler to a job. Sets `compiler_id` exactly once and
    /// moves status to `InProgress`; fails if already assigned.
    async fn accept(&self, id: Uuid, compiler_id: Uuid) -> Result<()>;

    /// Idempotent narrow patch of workflow state. Enforces status
    /// monotonicity and compiler ownership.
    async fn update_step(&self, id: Uuid, caller: Caller, req: UpdateStepRequest) -> Result<()>;

    /// Record the job's output artifact and mark it completed. Enforces
    /// compiler ownership (system callers bypass, since auto-completed
    /// jobs never had a compiler).
    async fn complete(&self, id: Uuid, caller: Caller, req: CompleteJobRequest) -> Result<()>;

    /// Best-effort failure reset: step `selecting`, status `Received`,
    /// returning the job to the front of the manual queue. Only valid
    /// while no compiler is assigned.
    async fn reset_for_manual(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// TEMPLATE REPOSITORY
// =============================================================================

/// Repository for extraction templates and their embedding index.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Insert a new template with its embedding.
    async fn insert(&self, req: UpsertTemplateRequest, embedding: Vec<f32>) -> Result<Uuid>;

    /// Patch an existing template in place, replacing its embedding.
    async fn update(&self, id: Uuid, req: UpsertTemplateRequest, embedding: Vec<f32>)
        -> Result<()>;

    /// Fetch a template by id.
    async fn get(&self, id: Uuid) -> Result<Option<ExtractionTemplate>>;

    /// Find the canonical template for a `(client_id, supplier)` pair.
    async fn find_by_client_supplier(
        &self,
        client_id: Option<Uuid>,
        supplier: &str,
    ) -> Result<Option<ExtractionTemplate>>;

    /// Nearest-neighbor search over stored template embeddings.
    /// Returns up to `limit` candidates with cosine-similarity scores,
    /// ranked descending. Scores are not threshold-filtered here.
    async fn find_similar(
        &self,
        query: &[f32],
        limit: i64,
    ) -> Result<Vec<(ExtractionTemplate, f32)>>;
}

// =============================================================================
// SETTINGS REPOSITORY
// =============================================================================

/// Generic key/value settings store backing [`SystemConfig`].
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get a setting value by key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a setting value, inserting or overwriting.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl SystemConfig {
    /// Load the typed config from the settings store, writing defaults
    /// for any key that is missing (explicit initialize-defaults
    /// lifecycle; no ad-hoc mid-pipeline reads).
    pub async fn load_or_init(repo: &dyn SettingsRepository) -> Result<Self> {
        let mode = match repo.get(crate::defaults::SETTING_PROCESSING_MODE).await? {
            Some(raw) => raw
                .parse::<ProcessingMode>()
                .map_err(crate::error::Error::Config)?,
            None => {
                let mode = ProcessingMode::default();
                repo.set(
                    crate::defaults::SETTING_PROCESSING_MODE,
                    &mode.to_string(),
                )
                .await?;
                mode
            }
        };

        let commission = match repo.get(crate::defaults::SETTING_COMMISSION_PERCENT).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| crate::error::Error::Config(e.to_string()))?,
            None => {
                let pct = crate::defaults::DEFAULT_COMMISSION_PERCENT;
                repo.set(
                    crate::defaults::SETTING_COMMISSION_PERCENT,
                    &pct.to_string(),
                )
                .await?;
                pct
            }
        };

        Ok(Self {
            processing_mode: mode,
            commission_percent: commission,
        })
    }
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate an embedding for the given text.
    ///
    /// Implementations must return exactly [`crate::defaults::EMBED_DIMENSION`]
    /// components, applying the truncate-longer / reject-shorter rule.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

/// Black-box structured-extraction oracle over a generative model.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Extract structured data from the given documents, constrained to
    /// the given field schema.
    async fn extract(&self, file_urls: &[String], schema: &ExtractionSchema) -> Result<JsonValue>;

    /// Extract just the supplier name, with the output constrained to
    /// `{supplier: string|null}` at temperature 0. `Ok(None)` means the
    /// documents carried no recognizable supplier; this is a designed
    /// outcome, not a fault.
    async fn extract_supplier(&self, file_urls: &[String]) -> Result<Option<String>>;
}

// =============================================================================
// STORAGE
// =============================================================================

/// Object storage for job documents and output artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a blob, returning its storage id.
    async fn upload(&self, file_name: &str, content_type: &str, data: &[u8]) -> Result<String>;

    /// Resolve a storage id to a retrievable URL.
    async fn resolve_url(&self, storage_id: &str) -> Result<String>;
}

// =============================================================================
// NOTIFICATION
// =============================================================================

/// Dispatch for job-completion notifications.
///
/// Fire-and-forget: callers must never let a dispatch failure fail the
/// surrounding completion.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Notify `recipient` that `job_id` completed with artifact `csv_ref`.
    async fn send_completion_notification(
        &self,
        recipient: &str,
        job_id: Uuid,
        csv_ref: &str,
    ) -> Result<()>;
}

/// No-op dispatcher for when notifications aren't needed.
pub struct NoOpDispatcher;

#[async_trait]
impl NotificationDispatcher for NoOpDispatcher {
    async fn send_completion_notification(
        &self,
        _recipient: &str,
        _job_id: Uuid,
        _csv_ref: &str,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapSettings(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl SettingsRepository for MapSettings {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_system_config_initializes_defaults() {
        let repo = MapSettings(Mutex::new(HashMap::new()));
        let cfg = SystemConfig::load_or_init(&repo).await.unwrap();
        assert_eq!(cfg, SystemConfig::default());

        // Defaults were persisted for the next load.
        let stored = repo
            .get(crate::defaults::SETTING_PROCESSING_MODE)
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("require-human-review"));
    }

    #[tokio::test]
    async fn test_system_config_reads_existing_values() {
        let repo = MapSettings(Mutex::new(HashMap::new()));
        repo.set(crate::defaults::SETTING_PROCESSING_MODE, "auto-process")
            .await
            .unwrap();
        repo.set(crate::defaults::SETTING_COMMISSION_PERCENT, "35")
            .await
            .unwrap();

        let cfg = SystemConfig::load_or_init(&repo).await.unwrap();
        assert_eq!(cfg.processing_mode, ProcessingMode::AutoProcess);
        assert_eq!(cfg.commission_percent, 35);
    }

    #[tokio::test]
    async fn test_system_config_rejects_garbage_mode() {
        let repo = MapSettings(Mutex::new(HashMap::new()));
        repo.set(crate::defaults::SETTING_PROCESSING_MODE, "yolo")
            .await
            .unwrap();
        let err = SystemConfig::load_or_init(&repo).await.unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[tokio::test]
    async fn test_noop_dispatcher() {
        let d = NoOpDispatcher;
        d.send_completion_notification("ops@example.com", Uuid::new_v4(), "blob-1")
            .await
            .unwrap();
    }
}
