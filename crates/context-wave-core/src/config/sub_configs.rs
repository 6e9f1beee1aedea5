//! Sub-configuration structures for the engine components.
//!
//! Each component reads exactly one of these structs. The relation keyword
//! table, drive seed map, and known-entity set are configuration data:
//! extending them is a configuration change, not code.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Signal-builder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    /// Drives with satisfaction strictly below this level inject their seed
    /// nodes into the signal.
    pub hunger_threshold: f32,
    /// Upper bound on signal node count; overflow is dropped in stable
    /// insertion order.
    pub max_nodes: usize,
    /// Verb token -> canonical relation label.
    pub relation_keywords: BTreeMap<String, String>,
    /// Drive name -> seed node set injected when the drive is hungry.
    pub drive_seeds: BTreeMap<String, Vec<String>>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        let relations = [
            "criticized",
            "praised",
            "asked",
            "sent",
            "challenged",
            "created",
            "learned",
            "broke",
            "fixed",
        ];
        let relation_keywords = relations
            .iter()
            .map(|verb| (verb.to_string(), verb.to_string()))
            .collect();

        let mut drive_seeds = BTreeMap::new();
        drive_seeds.insert(
            "connection".to_string(),
            vec![
                "Egor".to_string(),
                "Telegram".to_string(),
                "message".to_string(),
            ],
        );
        drive_seeds.insert(
            "creation".to_string(),
            vec![
                "building".to_string(),
                "making".to_string(),
                "writing".to_string(),
            ],
        );

        Self {
            hunger_threshold: 0.3,
            max_nodes: 20,
            relation_keywords,
            drive_seeds,
        }
    }
}

/// Resonance-scorer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Multiplier floor for brand-new contexts (suppresses echoing the
    /// immediate past).
    pub recency_floor: f32,
    /// Hours after which recency suppression fully releases.
    pub recency_window_hours: f32,
    /// Per-level multiplier increment.
    pub level_weight: f32,
    /// Level value cap inside the weighting term.
    pub level_weight_cap: u8,
    /// Additive bonus when a hungry-drive seed node appears in the context.
    pub drive_bonus: f32,
    /// Hard ceiling on final resonance.
    pub max_resonance: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_floor: 0.2,
            recency_window_hours: 24.0,
            level_weight: 0.05,
            level_weight_cap: 3,
            drive_bonus: 0.05,
            max_resonance: 1.2,
        }
    }
}

/// Diversity-selector configuration; per-retrieval options default to these
/// values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Working-memory slate bound K.
    pub working_memory_k: usize,
    /// Pre-selector candidate width.
    pub candidate_width: usize,
    /// Resonance floor; candidates below it are dropped.
    pub resonance_floor: f32,
    /// Maximum pairwise node-set Jaccard overlap inside the slate.
    pub mmr_overlap: f32,
    /// Relaxation step when no candidate satisfies the overlap bound.
    pub mmr_relax_step: f32,
    /// Maximum slate members sharing an emotion first word.
    pub per_emotion_cap: usize,
    /// Guarantee an episode in mixed-level slates.
    pub level_fairness: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            working_memory_k: 7,
            candidate_width: 30,
            resonance_floor: 0.0,
            mmr_overlap: 0.6,
            mmr_relax_step: 0.1,
            per_emotion_cap: 2,
            level_fairness: true,
        }
    }
}

/// Consolidation-pass configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsolidationConfig {
    /// Minimum shared node count linking two contexts into one cluster.
    pub min_overlap: usize,
    /// Clusters smaller than this are discarded.
    pub min_cluster: usize,
    /// Clusters larger than this are re-split with a raised overlap bar.
    pub max_cluster: usize,
    /// Jaccard threshold above which a generalization duplicates an
    /// existing same-level context.
    pub dedup_threshold: f32,
    /// Merged node bound for level >= 1 contexts.
    pub merged_node_cap: usize,
    /// Ceiling on generalized intensity regardless of upstream suggestion.
    pub intensity_cap: f32,
    /// Default certainty for written L1 contexts.
    pub certainty_l1: f32,
    /// Default certainty for written L2 contexts.
    pub certainty_l2: f32,
    /// Consecutive failures after which a cluster signature is quarantined.
    pub quarantine_after: u32,
    /// Bounded certainty reinforcement applied to a context that absorbs a
    /// duplicate cluster.
    pub absorb_reinforcement: f32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_overlap: 4,
            min_cluster: 3,
            max_cluster: 15,
            dedup_threshold: 0.6,
            merged_node_cap: 15,
            intensity_cap: 0.8,
            certainty_l1: 0.6,
            certainty_l2: 0.5,
            quarantine_after: 3,
            absorb_reinforcement: 0.05,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Description bound in Unicode code points.
    pub max_description_chars: usize,
    /// Embedding dimension accepted by the store.
    pub embedding_dimension: usize,
    /// Entities recognized when deriving rule conditions, beyond the
    /// context's own nodes.
    pub known_entities: BTreeSet<String>,
    /// When set, a context may appear in at most one other context's
    /// `sources`.
    pub exclusive_sources: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_description_chars: 300,
            embedding_dimension: 384,
            known_entities: BTreeSet::new(),
            exclusive_sources: false,
        }
    }
}

/// Deadlines for externally-blocking collaborator calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollaboratorConfig {
    /// Per-call embedder deadline, in milliseconds.
    pub embedder_timeout_ms: u64,
    /// Per-call generalizer deadline, in milliseconds.
    pub generalizer_timeout_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            embedder_timeout_ms: 5_000,
            generalizer_timeout_ms: 30_000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            include_location: false,
        }
    }
}

/// One verb-trigger pattern for rule-based experience extraction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionPattern {
    /// Trigger words searched in the experience text.
    pub triggers: Vec<String>,
    /// Role of the edge source among the found entities.
    pub source_role: String,
    /// Role of the edge target among the found entities.
    pub target_role: String,
    /// Relation label for the produced edge.
    pub relation: String,
}

/// Rule-based experience-extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Entity always present in an experience (first-person references
    /// resolve to it).
    pub self_entity: String,
    /// Role assigned to the self entity.
    pub self_role: String,
    /// Known entity name -> role.
    pub entity_roles: BTreeMap<String, String>,
    /// Verb-trigger patterns producing edges between found entities.
    pub action_patterns: Vec<ActionPattern>,
    /// Outcome keywords voting for a positive result.
    pub positive_markers: Vec<String>,
    /// Outcome keywords voting for a negative result.
    pub negative_markers: Vec<String>,
    /// Outcome keywords voting for a complex result.
    pub complex_markers: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let pattern = |triggers: &[&str], src: &str, tgt: &str, relation: &str| ActionPattern {
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            source_role: src.to_string(),
            target_role: tgt.to_string(),
            relation: relation.to_string(),
        };

        Self {
            self_entity: "Self".to_string(),
            self_role: "self".to_string(),
            entity_roles: BTreeMap::new(),
            action_patterns: vec![
                pattern(
                    &["praised", "approved", "liked", "appreciated"],
                    "person",
                    "self",
                    "praised",
                ),
                pattern(
                    &["criticized", "angry", "upset", "scolded"],
                    "person",
                    "self",
                    "criticized",
                ),
                pattern(
                    &["taught", "explained", "showed", "guided"],
                    "person",
                    "self",
                    "taught",
                ),
                pattern(&["apologized", "sorry"], "person", "self", "apologized"),
                pattern(
                    &["wrote", "built", "created", "implemented"],
                    "self",
                    "artifact",
                    "created",
                ),
                pattern(&["broke", "deleted", "crashed"], "self", "artifact", "broke"),
                pattern(&["posted", "published", "shared"], "self", "tool", "posted"),
                pattern(&["tested", "checked", "verified"], "self", "artifact", "tested"),
                pattern(&["fixed", "repaired", "patched"], "self", "artifact", "fixed"),
                pattern(
                    &["refused", "pushed back", "disagreed"],
                    "self",
                    "person",
                    "refused",
                ),
            ],
            positive_markers: ["success", "worked", "done", "fixed", "live"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            negative_markers: ["failed", "error", "broke", "angry", "wrong"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            complex_markers: ["mixed", "complex", "both", "tension"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
