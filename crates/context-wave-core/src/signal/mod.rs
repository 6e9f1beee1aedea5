//! Signal builder: turns an external situation snapshot into a canonical
//! wave signal.
//!
//! The builder is pure: the same snapshot always produces the same signal.
//! Embeddings are attached separately by the engine, since embedding is a
//! collaborator call and may fail without affecting the rest of the signal.

use tracing::debug;

use crate::config::SignalConfig;
use crate::text;
use crate::types::{DriveBias, Emotion, Level, Outcome, Situation, WaveSignal};

/// Pain intensity above which the signal result turns negative. The builder
/// attempts no positive/complex inference.
const PAIN_NEGATIVE_THRESHOLD: f32 = 0.5;

/// Builds [`WaveSignal`]s from [`Situation`] snapshots.
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    config: SignalConfig,
}

impl SignalBuilder {
    /// Create a builder over the given configuration.
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Build the canonical signal for a situation.
    ///
    /// Signal nodes are the union, in stable insertion order, of:
    /// 1. explicit focus tokens,
    /// 2. capitalized single-word tokens mined from the free text,
    /// 3. seed nodes of every drive below the hunger threshold.
    ///
    /// The node set is bounded; overflow is dropped in insertion order.
    pub fn build(&self, situation: &Situation) -> WaveSignal {
        let mut nodes: Vec<String> = Vec::new();
        let push_node = |nodes: &mut Vec<String>, candidate: &str| {
            if nodes.len() >= self.config.max_nodes {
                return;
            }
            if !nodes.iter().any(|n| n == candidate) {
                nodes.push(candidate.to_string());
            }
        };

        for token in &situation.focus {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                push_node(&mut nodes, trimmed);
            }
        }
        for word in text::capitalized_words(&situation.narrative) {
            push_node(&mut nodes, &word);
        }

        let mut drive_bias = std::collections::BTreeMap::new();
        for (drive, satisfaction) in &situation.drives {
            if *satisfaction >= self.config.hunger_threshold {
                continue;
            }
            let Some(seeds) = self.config.drive_seeds.get(drive) else {
                continue;
            };
            for seed in seeds {
                push_node(&mut nodes, seed);
            }
            drive_bias.insert(
                drive.clone(),
                DriveBias {
                    satisfaction: *satisfaction,
                    seeds: seeds.clone(),
                },
            );
        }

        let relations = self.scan_relations(&situation.narrative);

        let emotion = situation
            .reported_emotion
            .as_deref()
            .map(Emotion::normalize)
            .unwrap_or(Emotion::Neutral);

        let result = if situation.pain > PAIN_NEGATIVE_THRESHOLD {
            Outcome::Negative
        } else {
            Outcome::Neutral
        };

        let signal = WaveSignal {
            nodes,
            relations,
            emotion: Some(emotion),
            result: Some(result),
            max_level: situation.max_level.unwrap_or(Level::Principle),
            drive_bias,
            embedding: None,
        };

        debug!(
            nodes = signal.nodes.len(),
            relations = signal.relations.len(),
            emotion = %emotion,
            hungry_drives = signal.drive_bias.len(),
            "Built wave signal"
        );

        signal
    }

    /// Scan the free text against the fixed verb keyword table, returning
    /// canonical relation labels in stable first-hit order.
    fn scan_relations(&self, narrative: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for raw in narrative.split_whitespace() {
            let token = raw
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if let Some(label) = self.config.relation_keywords.get(&token) {
                if !out.iter().any(|r| r == label) {
                    out.push(label.clone());
                }
            }
        }
        out
    }
}
