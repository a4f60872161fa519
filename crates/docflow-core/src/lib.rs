//! # docflow-core
//!
//! Core types, traits, and abstractions for the docflow extraction
//! pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other docflow crates depend on.

pub mod defaults;
pub mod embedding;
pub mod error;
pub mod fields;
pub mod logging;
pub mod merge;
pub mod models;
pub mod policy;
pub mod resume;
pub mod traits;

// Re-export commonly used types at crate root
pub use embedding::conform_embedding;
pub use error::{Error, Result};
pub use fields::slugify_label;
pub use merge::{merge_extracted, replace_document};
pub use models::*;
pub use resume::resume;
pub use traits::*;

use uuid::Uuid;

/// Generate a new UUIDv7 identifier (time-ordered).
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
