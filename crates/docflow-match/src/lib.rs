//! # docflow-match
//!
//! Embedding-based extraction template matching.
//!
//! Templates are indexed by an embedding of their supplier and client
//! names; matching embeds the query pair, retrieves nearest neighbors,
//! and filters by a similarity floor.

pub mod matcher;

pub use matcher::{embedding_text, TemplateMatcher};
