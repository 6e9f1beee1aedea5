//! Resonance scores and their per-channel diagnostics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Collaborator;
use crate::types::{Context, ContextId};

/// Per-channel score breakdown, retained for diagnostics.
///
/// A channel is `None` when it was inactive for the signal/context pair
/// (one side provided no input for it). Active channels hold values in
/// [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelBreakdown {
    /// Node overlap: shared nodes over signal nodes.
    pub node: Option<f32>,
    /// Relation overlap: shared relations over signal relations.
    pub relation: Option<f32>,
    /// Emotion match: exact 1.0, same valence class 0.5, else 0.
    pub emotion: Option<f32>,
    /// Result match: exact 1.0, else 0.
    pub result: Option<f32>,
    /// Semantic similarity: cosine clamped at 0.
    pub semantic: Option<f32>,
    /// Rule-condition hit rate: signal nodes over the context's conditions.
    pub rule: Option<f32>,
    /// Mean over active channels before modifiers.
    pub raw: f32,
    /// Recency suppression multiplier applied.
    pub recency_factor: f32,
    /// Level weighting multiplier applied.
    pub level_factor: f32,
    /// Additive drive-bias bonus applied (0.0 or the configured bonus).
    pub drive_bonus: f32,
}

impl ChannelBreakdown {
    /// Iterate the active channel values.
    pub fn active(&self) -> impl Iterator<Item = f32> + '_ {
        [
            self.node,
            self.relation,
            self.emotion,
            self.result,
            self.semantic,
            self.rule,
        ]
        .into_iter()
        .flatten()
    }

    /// Number of active channels.
    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

/// A scored retrieval candidate.
#[derive(Debug, Clone)]
pub struct ScoredContext {
    /// The candidate context (shared with the snapshot).
    pub context: Arc<Context>,
    /// Final resonance after modifiers, in ~[0, 1.2].
    pub resonance: f32,
    /// Per-channel diagnostics.
    pub channels: ChannelBreakdown,
}

impl ScoredContext {
    /// The candidate's id.
    pub fn id(&self) -> ContextId {
        self.context.id
    }
}

/// Non-fatal events recorded while serving a retrieval.
///
/// Collaborator trouble degrades the retrieval (fewer channels) instead of
/// failing it; these entries are how the degradation surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalDiagnostic {
    /// A collaborator call failed; the affected channel was skipped.
    CollaboratorFailure {
        /// Which collaborator failed.
        who: Collaborator,
        /// Failure detail.
        detail: String,
    },
    /// A collaborator call exceeded its deadline; the affected channel was
    /// skipped.
    CollaboratorTimeout {
        /// Which collaborator timed out.
        who: Collaborator,
        /// The deadline, in milliseconds.
        elapsed_ms: u64,
    },
    /// A candidate referenced a purged source and was ignored.
    StaleCandidate {
        /// The ignored candidate.
        id: ContextId,
        /// The dangling source reference.
        source: ContextId,
    },
}

/// The outcome of one retrieval: the working-memory slate plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Up to K contexts in deterministic order (resonance desc, id asc).
    pub slate: Vec<ScoredContext>,
    /// Non-fatal events observed while serving the retrieval.
    pub diagnostics: Vec<RetrievalDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_channels() {
        let breakdown = ChannelBreakdown {
            node: Some(1.0),
            emotion: Some(0.5),
            ..Default::default()
        };
        assert_eq!(breakdown.active_count(), 2);
        let values: Vec<f32> = breakdown.active().collect();
        assert_eq!(values, vec![1.0, 0.5]);
    }

    #[test]
    fn test_no_active_channels() {
        let breakdown = ChannelBreakdown::default();
        assert_eq!(breakdown.active_count(), 0);
    }
}
