//! Centralized default constants for the docflow system.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (OpenAI-compatible).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Embedding vector dimension for template matching.
///
/// Vectors longer than this are deterministically truncated to the first
/// `EMBED_DIMENSION` components; shorter vectors are a hard error.
pub const EMBED_DIMENSION: usize = 1536;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// TEMPLATE MATCHING
// =============================================================================

/// Maximum number of nearest-neighbor candidates fetched per match query.
pub const MATCH_CANDIDATE_LIMIT: i64 = 10;

/// Minimum cosine-similarity score for a template to count as a match.
pub const MATCH_SCORE_FLOOR: f32 = 0.80;

/// Minimum best-match score required for unattended auto-processing.
/// Deliberately stricter than `MATCH_SCORE_FLOOR`: a match a human would
/// accept is not automatically a match the pipeline may act on alone.
pub const AUTO_PROCESS_SCORE: f32 = 0.95;

// =============================================================================
// EXTRACTION ORACLE
// =============================================================================

/// Default generation model for structured extraction.
pub const EXTRACT_MODEL: &str = "gpt-4o-mini";

/// Timeout for extraction requests (seconds).
pub const EXTRACT_TIMEOUT_SECS: u64 = 120;

/// Maximum attempts for transient oracle failures.
pub const EXTRACT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay between oracle retries (milliseconds).
/// Doubles per attempt: 2s, 4s, 8s.
pub const EXTRACT_RETRY_BASE_MS: u64 = 2_000;

// =============================================================================
// AUTO-PROCESSING PIPELINE
// =============================================================================

/// Maximum attempts when fetching a freshly created job.
/// Accounts for eventual consistency between job creation and the
/// asynchronous pipeline trigger.
pub const JOB_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay between job-fetch retries (milliseconds).
/// Doubles per attempt: 2s, 4s, 8s.
pub const JOB_FETCH_RETRY_BASE_MS: u64 = 2_000;

// =============================================================================
// SETTINGS KEYS
// =============================================================================

/// Settings key for the global processing mode.
pub const SETTING_PROCESSING_MODE: &str = "processing_mode";

/// Settings key for the compiler commission split (percent, 0-100).
pub const SETTING_COMMISSION_PERCENT: &str = "commission_percent";

/// Default commission split for compilers (percent).
pub const DEFAULT_COMMISSION_PERCENT: i64 = 50;
