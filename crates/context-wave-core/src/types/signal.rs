//! Wave signals and the external situation snapshots they are built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Emotion, Level, Outcome};

/// External structured input: a snapshot of the current situation, provided
/// by the caller (orchestrator, brain, tooling).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Situation {
    /// Explicit focus tokens (entity names, topics).
    #[serde(default)]
    pub focus: Vec<String>,
    /// Free-text fields describing the situation; capitalized single-word
    /// tokens and relation keywords are mined from these.
    #[serde(default)]
    pub narrative: String,
    /// Raw reported emotion, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_emotion: Option<String>,
    /// Reported pain intensity in [0, 1], from sensor telemetry.
    #[serde(default)]
    pub pain: f32,
    /// Drive satisfaction levels in [0, 1], keyed by drive name.
    #[serde(default)]
    pub drives: BTreeMap<String, f32>,
    /// Level cap for retrieval; defaults to the top of the hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_level: Option<Level>,
}

impl Situation {
    /// A situation with only free text.
    pub fn from_narrative(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            ..Default::default()
        }
    }
}

/// A hungry drive retained on the signal for downstream weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveBias {
    /// Satisfaction level that made the drive hungry.
    pub satisfaction: f32,
    /// Seed nodes contributed by this drive.
    pub seeds: Vec<String>,
}

/// The canonical query: a structured wave sent through the store.
///
/// Built by the signal builder from a [`Situation`], or constructed directly
/// by callers that already know their query shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveSignal {
    /// Query nodes, deduplicated in stable insertion order and bounded.
    pub nodes: Vec<String>,
    /// Canonical relation labels recognized in the situation.
    pub relations: Vec<String>,
    /// Normalized query emotion; `None` leaves the emotion channel inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    /// Query result; `None` leaves the result channel inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,
    /// Only contexts at or below this level are candidates.
    pub max_level: Level,
    /// Hungry drives and their seed nodes, for the drive-bias bonus.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub drive_bias: BTreeMap<String, DriveBias>,
    /// Optional query embedding; absent skips the semantic channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl WaveSignal {
    /// An empty signal capped at the given level. Scores 0 against every
    /// candidate, which is allowed.
    pub fn at_level(max_level: Level) -> Self {
        Self {
            max_level,
            ..Default::default()
        }
    }

    /// Builder: set query nodes.
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set query relations.
    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set the query emotion.
    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    /// Builder: set the query result.
    pub fn with_result(mut self, result: Outcome) -> Self {
        self.result = Some(result);
        self
    }

    /// Builder: attach a query embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// All drive-bias seed nodes, flattened.
    pub fn drive_seed_nodes(&self) -> impl Iterator<Item = &str> {
        self.drive_bias
            .values()
            .flat_map(|bias| bias.seeds.iter().map(String::as_str))
    }
}
