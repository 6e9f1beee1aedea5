//! Domain types for the Context-Wave Memory Engine.

mod context;
mod emotion;
mod resonance;
mod signal;

pub use context::{
    derive_rule_conditions, Context, ContextDraft, ContextId, GraphEdge, GraphNode, Level,
};
pub use emotion::{Emotion, Valence, ALL_EMOTIONS};
pub use resonance::{ChannelBreakdown, Retrieval, RetrievalDiagnostic, ScoredContext};
pub use signal::{DriveBias, Situation, WaveSignal};

use serde::{Deserialize, Serialize};

/// Outcome of an episode or pattern.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Positive,
    Negative,
    Complex,
    Neutral,
    Uncertain,
}

impl Outcome {
    /// Canonical lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Positive => "positive",
            Outcome::Negative => "negative",
            Outcome::Complex => "complex",
            Outcome::Neutral => "neutral",
            Outcome::Uncertain => "uncertain",
        }
    }

    /// Parse a canonical label, case-insensitively; anything unrecognized is
    /// `Uncertain`.
    pub fn from_label(label: &str) -> Outcome {
        match label.trim().to_lowercase().as_str() {
            "positive" => Outcome::Positive,
            "negative" => Outcome::Negative,
            "complex" => Outcome::Complex,
            "neutral" => Outcome::Neutral,
            _ => Outcome::Uncertain,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::Neutral
    }
}
