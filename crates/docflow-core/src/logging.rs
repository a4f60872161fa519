//! Structured logging schema and field name constants for docflow.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, pipeline outcomes, completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (match candidates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "match", "workflow", "pipeline"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "matcher", "orchestrator", "openai", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "match", "embed", "extract", "complete_job"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being operated on.
pub const JOB_ID: &str = "job_id";

/// Template UUID involved in a match or upsert.
pub const TEMPLATE_ID: &str = "template_id";

/// Supplier name used for a match query.
pub const SUPPLIER: &str = "supplier";

/// Workflow step a job is at or transitioning to.
pub const STEP: &str = "step";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of match candidates returned by a similarity search.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Best similarity score among surviving candidates.
pub const BEST_SCORE: &str = "best_score";

/// Retry attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Pipeline outcome for an orchestration run.
/// Values: "auto_completed", "ready_for_review", "manual_processing"
pub const OUTCOME: &str = "outcome";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
