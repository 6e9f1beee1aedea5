//! Error types for context-wave-core.
//!
//! This module defines the central error type [`EngineError`] used throughout
//! the crate, along with the [`EngineResult<T>`] type alias. Each variant maps
//! to exactly one failure policy: invariant violations are surfaced and never
//! recovered, collaborator failures are recovered locally by the caller, and
//! cancellation discards partial work.

use thiserror::Error;

use crate::types::ContextId;

/// The specific store invariant a rejected write violated.
///
/// Writes fail with exactly one cause; the first violated invariant (checked
/// in declaration order) is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// Abstraction level above the hard cap of 2.
    LevelCap,
    /// Description exceeds the configured code-point bound.
    Description,
    /// An edge endpoint is not a member of the context's node set.
    EdgeEndpoints,
    /// `sources` present on a level-0 context, a source id that does not
    /// exist, or a source whose level is not strictly lower.
    SourceIntegrity,
    /// A same-level context already covers this rule/description text
    /// (Jaccard word overlap above the dedup threshold).
    SemanticDuplicate,
    /// Merged node count above the per-context bound for level >= 1.
    NodeBudget,
    /// A numeric field (intensity, certainty) outside [0, 1] or NaN.
    FieldRange,
    /// Embedding vector length differs from the configured dimension.
    EmbeddingDimension,
}

impl std::fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LevelCap => "level-cap",
            Self::Description => "description",
            Self::EdgeEndpoints => "edge-endpoints",
            Self::SourceIntegrity => "source-integrity",
            Self::SemanticDuplicate => "semantic-duplicate",
            Self::NodeBudget => "node-budget",
            Self::FieldRange => "field-range",
            Self::EmbeddingDimension => "embedding-dimension",
        };
        f.write_str(name)
    }
}

/// Which external collaborator an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    /// Text-to-vector embedder.
    Embedder,
    /// Cluster-to-abstraction generalizer.
    Generalizer,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedder => f.write_str("embedder"),
            Self::Generalizer => f.write_str("generalizer"),
        }
    }
}

/// Top-level error type for engine operations.
///
/// Variants follow the engine's error taxonomy: write-path rejections
/// (`InvariantViolation`, `Conflict`), read-path misses (`NotFound`,
/// `StaleSnapshot`), collaborator trouble (`CollaboratorFailure`,
/// `CollaboratorTimeout`), and control-flow outcomes (`Cancelled`,
/// `BudgetExhausted`).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A write violated a store invariant. Never recovered; the caller must
    /// fix its input.
    #[error("Invariant violation ({which}): {detail}")]
    InvariantViolation {
        /// The invariant that failed.
        which: InvariantKind,
        /// Human-readable detail for diagnostics.
        detail: String,
    },

    /// A requested context does not exist. Never silently returned as an
    /// empty result.
    #[error("Context not found: {id}")]
    NotFound {
        /// The id that missed.
        id: ContextId,
    },

    /// A retrieval candidate references a purged source.
    #[error("Stale snapshot: context {id} references purged source {source_id}")]
    StaleSnapshot {
        /// The candidate holding the dangling reference.
        id: ContextId,
        /// The missing source id.
        source_id: ContextId,
    },

    /// An external collaborator returned an error. Recovered locally:
    /// embedder failure disables the semantic channel for that operation,
    /// generalizer failure leaves the cluster unconsolidated.
    #[error("Collaborator failure ({who}): {detail}")]
    CollaboratorFailure {
        /// Which collaborator failed.
        who: Collaborator,
        /// Failure detail.
        detail: String,
    },

    /// An external collaborator exceeded its per-call deadline. Same policy
    /// as `CollaboratorFailure`.
    #[error("Collaborator timeout ({who}) after {elapsed_ms}ms")]
    CollaboratorTimeout {
        /// Which collaborator timed out.
        who: Collaborator,
        /// The deadline that was exceeded, in milliseconds.
        elapsed_ms: u64,
    },

    /// The operation was cancelled via its cancellation token. Partial work
    /// is discarded; no persisted state is left inconsistent.
    #[error("Operation cancelled")]
    Cancelled,

    /// A consolidation pass ran out of budget. Partial statistics are
    /// returned; the next invocation resumes.
    #[error("Consolidation budget exhausted")]
    BudgetExhausted,

    /// A concurrent write collided on a caller-supplied dedup key.
    #[error("Conflict: dedup key {key:?} already maps to context {existing}")]
    Conflict {
        /// The colliding dedup key.
        key: String,
        /// The context that already owns the key.
        existing: ContextId,
    },

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_display_names_cause() {
        let err = EngineError::InvariantViolation {
            which: InvariantKind::EdgeEndpoints,
            detail: "edge (a -> b) references missing node 'b'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("edge-endpoints"), "got: {}", msg);
        assert!(msg.contains("missing node"), "got: {}", msg);
    }

    #[test]
    fn test_not_found_display() {
        let err = EngineError::NotFound {
            id: ContextId::new(42),
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_collaborator_timeout_display() {
        let err = EngineError::CollaboratorTimeout {
            who: Collaborator::Generalizer,
            elapsed_ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("generalizer"));
        assert!(msg.contains("30000"));
    }
}
