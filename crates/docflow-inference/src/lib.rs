//! # docflow-inference
//!
//! Embedding and structured-extraction backends for docflow.
//!
//! This crate provides:
//! - OpenAI-compatible embedding backend for template matching
//! - OpenAI-compatible extraction oracle with schema-constrained output
//! - Bounded retry with exponential backoff
//! - Scripted mocks for deterministic tests

pub mod mock;
pub mod openai;
pub mod retry;

pub use mock::{MockEmbeddingBackend, MockOracle, OracleCall};
pub use openai::{OpenAiEmbeddingBackend, OpenAiExtractionOracle};
pub use retry::{with_retry, RetryPolicy};
