//! Context: the atomic unit of memory.
//!
//! A context is a mini-graph scene: named nodes, relation edges, an emotion,
//! a result, plus the optional rule the episode teaches. Contexts live at
//! three abstraction levels: episodes (L0), generalizations (L1), and
//! principles (L2). The level cap is structural: higher levels are
//! unrepresentable.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Emotion, Outcome};

/// Stable context identifier, monotonically assigned by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Wrap a raw id value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx:{}", self.0)
    }
}

/// Abstraction level of a context.
///
/// Hard-capped at `Principle` (2): the source history documents an
/// attractor-basin pathology at higher levels, so the cap is encoded in the
/// type rather than checked at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// A single lived episode.
    Episode,
    /// A pattern generalized across episodes.
    Generalization,
    /// A principle generalized across generalizations.
    Principle,
}

impl Level {
    /// Numeric height of this level (0..=2).
    pub fn as_u8(&self) -> u8 {
        match self {
            Level::Episode => 0,
            Level::Generalization => 1,
            Level::Principle => 2,
        }
    }

    /// Convert a numeric level, rejecting anything above the cap.
    pub fn from_u8(raw: u8) -> Option<Level> {
        match raw {
            0 => Some(Level::Episode),
            1 => Some(Level::Generalization),
            2 => Some(Level::Principle),
            _ => None,
        }
    }

    /// The level one step up, or `None` at the cap.
    pub fn next_up(&self) -> Option<Level> {
        match self {
            Level::Episode => Some(Level::Generalization),
            Level::Generalization => Some(Level::Principle),
            Level::Principle => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

impl Default for Level {
    /// Retrieval defaults to the full hierarchy.
    fn default() -> Self {
        Level::Principle
    }
}

/// A named object in a context mini-graph, with an optional role tag
/// ("agent", "target", "tool", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Canonical, case-preserving name.
    pub name: String,
    /// Optional role tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl GraphNode {
    /// A node with no role tag.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
        }
    }

    /// A node with a role tag.
    pub fn with_role(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Some(role.into()),
        }
    }
}

/// A relation between two nodes of the same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Name of the source node.
    pub source: String,
    /// Name of the target node.
    pub target: String,
    /// Relation label ("criticized", "praised", ...).
    pub relation: String,
}

impl GraphEdge {
    /// Construct an edge.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
        }
    }
}

/// A stored context. Immutable once persisted, except for the lazy embedding
/// fill-in, bounded certainty updates during consolidation, and membership in
/// a later context's `sources`, all of which go through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Stable identifier assigned by the store.
    pub id: ContextId,
    /// Free-text summary, bounded in length.
    pub description: String,
    /// Ordered node sequence, deduplicated by name per context.
    pub nodes: Vec<GraphNode>,
    /// Ordered edge sequence; endpoints are members of `nodes`.
    pub edges: Vec<GraphEdge>,
    /// Normalized emotion label.
    pub emotion: Emotion,
    /// Emotional intensity in [0, 1].
    pub intensity: f32,
    /// Outcome of the episode or pattern.
    pub result: Outcome,
    /// Optional free-text teaching extracted from the experience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Token set derived from `rule` at write time; feeds the rule-condition
    /// resonance channel.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub rule_conditions: BTreeSet<String>,
    /// Confidence in the rule/pattern, in [0, 1].
    pub certainty: f32,
    /// Abstraction level.
    pub level: Level,
    /// Ids of the lower-level contexts this one was consolidated from.
    /// Empty for episodes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sources: BTreeSet<ContextId>,
    /// Optional fixed-dimension embedding; absent contexts score 0 on the
    /// semantic channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Monotonic creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Optional logical day coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_day: Option<u32>,
    /// Optional logical cycle coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_cycle: Option<u32>,
}

impl Context {
    /// The set of node names, in node order semantics (set view).
    pub fn node_names(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// The set of relation labels appearing on edges.
    pub fn relations(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|e| e.relation.as_str()).collect()
    }

    /// Case-folded node-name tokens, as used by MMR overlap.
    pub fn folded_node_tokens(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter_map(|n| crate::text::fold_token(&n.name))
            .collect()
    }

    /// Combined rule/description token set, as used by semantic dedup.
    pub fn dedup_tokens(&self) -> BTreeSet<String> {
        crate::text::dedup_tokens(self.rule.as_deref(), &self.description)
    }

    /// Hours elapsed between creation and `now`, clamped at zero.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.created_at).num_seconds().max(0);
        seconds as f64 / 3600.0
    }
}

/// Write-path input: an unvalidated context draft.
///
/// The store normalizes the raw emotion, derives rule conditions, checks
/// every invariant, and assigns the id. Construction is builder-style:
///
/// ```
/// use context_wave_core::types::{ContextDraft, GraphEdge, GraphNode};
///
/// let draft = ContextDraft::new("Egor criticized the retriever code")
///     .with_nodes([
///         GraphNode::with_role("Egor", "agent"),
///         GraphNode::named("retriever"),
///     ])
///     .with_edges([GraphEdge::new("Egor", "retriever", "criticized")])
///     .with_emotion("hurt")
///     .with_intensity(0.6)
///     .with_result_str("negative");
/// assert_eq!(draft.nodes.len(), 2);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDraft {
    /// Free-text summary.
    pub description: String,
    /// Nodes; duplicates by name are collapsed at write time.
    pub nodes: Vec<GraphNode>,
    /// Edges over the node names.
    pub edges: Vec<GraphEdge>,
    /// Raw emotion input, normalized at write time.
    pub emotion: String,
    /// Intensity in [0, 1].
    pub intensity: f32,
    /// Raw result label; unrecognized labels are rejected.
    pub result: Outcome,
    /// Optional rule text.
    pub rule: Option<String>,
    /// Requested level (0 for external writers; 1/2 for the consolidation
    /// path).
    pub level: u8,
    /// Source ids for consolidated contexts.
    pub sources: BTreeSet<ContextId>,
    /// Optional pre-computed embedding.
    pub embedding: Option<Vec<f32>>,
    /// Confidence; defaults to 1.0 when unset.
    pub certainty: Option<f32>,
    /// Optional logical day coordinate.
    pub when_day: Option<u32>,
    /// Optional logical cycle coordinate.
    pub when_cycle: Option<u32>,
    /// Optional caller-supplied dedup key; colliding keys are rejected with
    /// a conflict error.
    pub dedup_key: Option<String>,
}

impl ContextDraft {
    /// Start a draft from a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            emotion: String::new(),
            intensity: 0.5,
            result: Outcome::Neutral,
            ..Default::default()
        }
    }

    /// Set the node sequence.
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = GraphNode>) -> Self {
        self.nodes = nodes.into_iter().collect();
        self
    }

    /// Set the edge sequence.
    pub fn with_edges(mut self, edges: impl IntoIterator<Item = GraphEdge>) -> Self {
        self.edges = edges.into_iter().collect();
        self
    }

    /// Set the raw emotion string.
    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = emotion.into();
        self
    }

    /// Set the intensity.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the result.
    pub fn with_result(mut self, result: Outcome) -> Self {
        self.result = result;
        self
    }

    /// Set the result from its canonical label; unknown labels become
    /// `Uncertain`.
    pub fn with_result_str(mut self, result: &str) -> Self {
        self.result = Outcome::from_label(result);
        self
    }

    /// Set the rule text.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Set the requested level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Set the source ids.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = ContextId>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    /// Attach a pre-computed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the certainty.
    pub fn with_certainty(mut self, certainty: f32) -> Self {
        self.certainty = Some(certainty);
        self
    }

    /// Set the logical time coordinates.
    pub fn with_when(mut self, day: u32, cycle: u32) -> Self {
        self.when_day = Some(day);
        self.when_cycle = Some(cycle);
        self
    }

    /// Set the dedup key.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// Derive rule conditions from rule text: capitalized rule tokens that name
/// one of the context's nodes, plus configured known entities appearing in
/// the rule. The result is always a subset of the node names union the
/// known-entity set.
pub fn derive_rule_conditions(
    rule: Option<&str>,
    node_names: &BTreeSet<&str>,
    known_entities: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut conditions = BTreeSet::new();
    let Some(rule) = rule else {
        return conditions;
    };

    for word in crate::text::capitalized_words(rule) {
        if node_names.contains(word.as_str()) || known_entities.contains(&word) {
            conditions.insert(word);
        }
    }
    // Known entities can appear uncapitalized mid-sentence.
    let lowered = rule.to_lowercase();
    for entity in known_entities {
        if lowered.contains(&entity.to_lowercase()) {
            conditions.insert(entity.clone());
        }
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip_and_cap() {
        assert_eq!(Level::from_u8(0), Some(Level::Episode));
        assert_eq!(Level::from_u8(2), Some(Level::Principle));
        assert_eq!(Level::from_u8(3), None);
        assert_eq!(Level::Principle.next_up(), None);
        assert_eq!(Level::Episode.next_up(), Some(Level::Generalization));
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Generalization.to_string(), "L1");
    }

    #[test]
    fn test_context_id_ordering() {
        assert!(ContextId::new(1) < ContextId::new(2));
        assert_eq!(ContextId::new(7).to_string(), "ctx:7");
    }

    #[test]
    fn test_draft_builder() {
        let draft = ContextDraft::new("demo")
            .with_nodes([GraphNode::named("Egor"), GraphNode::named("code")])
            .with_edges([GraphEdge::new("Egor", "code", "criticized")])
            .with_emotion("hurt")
            .with_level(0)
            .with_dedup_key("episode-17");
        assert_eq!(draft.nodes.len(), 2);
        assert_eq!(draft.edges[0].relation, "criticized");
        assert_eq!(draft.dedup_key.as_deref(), Some("episode-17"));
    }

    #[test]
    fn test_derive_rule_conditions_capitalized_nodes() {
        let names: BTreeSet<&str> = ["Egor", "code"].into_iter().collect();
        let known = BTreeSet::new();
        let conditions = derive_rule_conditions(
            Some("When Egor criticizes code, engage with the substance."),
            &names,
            &known,
        );
        // "Egor" is a capitalized node name; "When" is capitalized but not a
        // node; "code" is a node but never capitalized in the rule.
        assert!(conditions.contains("Egor"));
        assert!(!conditions.contains("When"));
        assert!(!conditions.contains("code"));
    }

    #[test]
    fn test_derive_rule_conditions_known_entities() {
        let names = BTreeSet::new();
        let known: BTreeSet<String> = ["Telegram".to_string()].into_iter().collect();
        let conditions = derive_rule_conditions(
            Some("Always check telegram before replying."),
            &names,
            &known,
        );
        assert!(conditions.contains("Telegram"));
    }

    #[test]
    fn test_derive_rule_conditions_empty_rule() {
        let names: BTreeSet<&str> = ["Egor"].into_iter().collect();
        assert!(derive_rule_conditions(None, &names, &BTreeSet::new()).is_empty());
    }
}
