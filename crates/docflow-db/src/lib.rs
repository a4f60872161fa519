//! # docflow-db
//!
//! PostgreSQL persistence layer for docflow.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for jobs, templates, and settings
//! - Template similarity search with pgvector
//! - Filesystem object storage for documents and CSV artifacts
//! - In-memory repository doubles for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use docflow_db::{create_pool, PgJobRepository};
//! use docflow_core::{CreateJobRequest, JobRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool("postgres://localhost/docflow").await?;
//!     let jobs = PgJobRepository::new(pool);
//!
//!     let job_id = jobs.create(CreateJobRequest {
//!         title: "Invoices March".to_string(),
//!         client_id: uuid::Uuid::new_v4(),
//!         deadline: None,
//!         price: Some(25.0),
//!         inbound_email: None,
//!         files: vec![],
//!     }).await?;
//!
//!     println!("Created job: {}", job_id);
//!     Ok(())
//! }
//! ```
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod settings;
pub mod storage;
pub mod templates;

pub use jobs::PgJobRepository;
pub use memory::{
    cosine_similarity, InMemoryJobRepository, InMemorySettingsRepository,
    InMemoryTemplateRepository, MemoryStorage, RecordingDispatcher,
};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use settings::PgSettingsRepository;
pub use storage::FilesystemStorage;
pub use templates::PgTemplateRepository;
