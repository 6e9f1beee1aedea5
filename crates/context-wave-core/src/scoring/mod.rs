//! Resonance scorer: multi-channel signal/context matching.
//!
//! Scoring one context is a pure function of (context, signal, now). A
//! channel participates only when both sides provide input for it; the raw
//! score is the arithmetic mean over participating channels, then the
//! recency, level, and drive-bias modifiers apply in order.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::store::StoreSnapshot;
use crate::types::{
    ChannelBreakdown, Context, RetrievalDiagnostic, ScoredContext, WaveSignal,
};

/// Cosine similarity of two equal-length vectors; 0.0 on mismatch or zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scores candidates against a wave signal.
#[derive(Debug, Clone)]
pub struct ResonanceScorer {
    config: ScoringConfig,
}

impl ResonanceScorer {
    /// Create a scorer over the given configuration.
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a single candidate. Returns the final resonance and the
    /// per-channel breakdown.
    pub fn score(
        &self,
        signal: &WaveSignal,
        context: &Context,
        now: DateTime<Utc>,
    ) -> (f32, ChannelBreakdown) {
        let mut breakdown = ChannelBreakdown::default();

        let context_nodes = context.node_names();

        if !signal.nodes.is_empty() && !context.nodes.is_empty() {
            let overlap = signal
                .nodes
                .iter()
                .filter(|n| context_nodes.contains(n.as_str()))
                .count();
            breakdown.node = Some(overlap as f32 / signal.nodes.len() as f32);
        }

        if !signal.relations.is_empty() && !context.edges.is_empty() {
            let context_relations = context.relations();
            let overlap = signal
                .relations
                .iter()
                .filter(|r| context_relations.contains(r.as_str()))
                .count();
            breakdown.relation = Some(overlap as f32 / signal.relations.len() as f32);
        }

        if let Some(signal_emotion) = signal.emotion {
            let value = if signal_emotion == context.emotion {
                1.0
            } else if signal_emotion.valence() == context.emotion.valence()
                && matches!(
                    signal_emotion.valence(),
                    crate::types::Valence::Positive | crate::types::Valence::Negative
                )
            {
                0.5
            } else {
                0.0
            };
            breakdown.emotion = Some(value);
        }

        if let Some(signal_result) = signal.result {
            breakdown.result = Some(if signal_result == context.result { 1.0 } else { 0.0 });
        }

        if let (Some(signal_embedding), Some(context_embedding)) =
            (&signal.embedding, &context.embedding)
        {
            breakdown.semantic =
                Some(cosine_similarity(signal_embedding, context_embedding).max(0.0));
        }

        if !signal.nodes.is_empty() && !context.rule_conditions.is_empty() {
            let hits = signal
                .nodes
                .iter()
                .filter(|n| context.rule_conditions.contains(n.as_str()))
                .count();
            breakdown.rule = Some(hits as f32 / context.rule_conditions.len() as f32);
        }

        let active = breakdown.active_count();
        breakdown.raw = if active == 0 {
            0.0
        } else {
            breakdown.active().sum::<f32>() / active as f32
        };

        breakdown.recency_factor = self.recency_factor(context.age_hours(now));
        breakdown.level_factor = 1.0
            + self.config.level_weight
                * (context.level.as_u8().min(self.config.level_weight_cap)) as f32;

        breakdown.drive_bonus = if !signal.drive_bias.is_empty()
            && signal
                .drive_seed_nodes()
                .any(|seed| context_nodes.contains(seed))
        {
            self.config.drive_bonus
        } else {
            0.0
        };

        let resonance = (breakdown.raw * breakdown.recency_factor * breakdown.level_factor
            + breakdown.drive_bonus)
            .min(self.config.max_resonance);

        (resonance, breakdown)
    }

    /// Recency suppression multiplier: the floor for brand-new contexts,
    /// rising linearly to 1.0 across the configured window.
    fn recency_factor(&self, age_hours: f64) -> f32 {
        let floor = self.config.recency_floor;
        let window = self.config.recency_window_hours as f64;
        let progress = (age_hours / window).min(1.0) as f32;
        (floor + (1.0 - floor) * progress).min(1.0)
    }

    /// Bulk-score a snapshot, in candidate order; selection happens
    /// afterwards, never interleaved.
    ///
    /// Candidates referencing a purged source are ignored and recorded as
    /// stale-candidate diagnostics.
    pub fn score_snapshot(
        &self,
        signal: &WaveSignal,
        snapshot: &StoreSnapshot,
        now: DateTime<Utc>,
    ) -> (Vec<ScoredContext>, Vec<RetrievalDiagnostic>) {
        let mut scored = Vec::with_capacity(snapshot.len());
        let mut diagnostics = Vec::new();

        for context in &snapshot.contexts {
            if let Some(missing) = context.sources.iter().find(|s| !snapshot.contains(**s)) {
                diagnostics.push(RetrievalDiagnostic::StaleCandidate {
                    id: context.id,
                    source: *missing,
                });
                continue;
            }

            let (resonance, channels) = self.score(signal, context, now);
            scored.push(ScoredContext {
                context: context.clone(),
                resonance,
                channels,
            });
        }

        scored.sort_by(|a, b| {
            b.resonance
                .partial_cmp(&a.resonance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id().cmp(&b.id()))
        });

        debug!(
            candidates = snapshot.len(),
            scored = scored.len(),
            stale = diagnostics.len(),
            "Scored snapshot"
        );

        (scored, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeSet;

    use crate::types::{
        ContextId, Emotion, GraphEdge, GraphNode, Level, Outcome,
    };

    fn scorer() -> ResonanceScorer {
        ResonanceScorer::new(ScoringConfig::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap()
    }

    fn base_context(age_hours: i64) -> Context {
        Context {
            id: ContextId::new(1),
            description: "Egor criticized the code".to_string(),
            nodes: vec![
                GraphNode::named("Egor"),
                GraphNode::named("Kai"),
                GraphNode::named("code"),
            ],
            edges: vec![GraphEdge::new("Egor", "Kai", "criticized")],
            emotion: Emotion::Hurt,
            intensity: 0.6,
            result: Outcome::Positive,
            rule: None,
            rule_conditions: BTreeSet::new(),
            certainty: 1.0,
            level: Level::Episode,
            sources: BTreeSet::new(),
            embedding: None,
            created_at: now() - Duration::hours(age_hours),
            when_day: None,
            when_cycle: None,
        }
    }

    fn full_signal() -> WaveSignal {
        WaveSignal::at_level(Level::Principle)
            .with_nodes(["Egor", "code"])
            .with_relations(["criticized"])
            .with_emotion(Emotion::Hurt)
            .with_result(Outcome::Positive)
    }

    // =====================================================================
    // Channel math
    // =====================================================================

    #[test]
    fn test_all_channels_match_at_ten_hours() {
        // Four active channels, all 1.0; raw mean 1.0; recency at 10 h is
        // 0.2 + 0.8 * (10/24) = 0.5333; level factor for L0 is 1.0.
        let (resonance, channels) = scorer().score(&full_signal(), &base_context(10), now());
        assert_eq!(channels.node, Some(1.0));
        assert_eq!(channels.relation, Some(1.0));
        assert_eq!(channels.emotion, Some(1.0));
        assert_eq!(channels.result, Some(1.0));
        assert!((channels.raw - 1.0).abs() < 1e-6);
        assert!((resonance - 0.5333).abs() < 0.001, "got {}", resonance);
    }

    #[test]
    fn test_partial_node_overlap() {
        let signal = WaveSignal::at_level(Level::Principle).with_nodes(["Egor", "poem"]);
        let (_, channels) = scorer().score(&signal, &base_context(48), now());
        assert_eq!(channels.node, Some(0.5));
    }

    #[test]
    fn test_inactive_channels_are_skipped() {
        // Signal with nodes only: emotion/result/relation channels inactive.
        let signal = WaveSignal::at_level(Level::Principle).with_nodes(["Egor"]);
        let (_, channels) = scorer().score(&signal, &base_context(48), now());
        assert!(channels.emotion.is_none());
        assert!(channels.result.is_none());
        assert!(channels.relation.is_none());
        assert_eq!(channels.active_count(), 1);
        assert!((channels.raw - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_signal_scores_zero() {
        let signal = WaveSignal::at_level(Level::Principle);
        let (resonance, channels) = scorer().score(&signal, &base_context(48), now());
        assert_eq!(channels.active_count(), 0);
        assert_eq!(resonance, 0.0);
    }

    #[test]
    fn test_emotion_valence_partial_credit() {
        let mut context = base_context(48);
        context.emotion = Emotion::Frustration; // negative, like hurt
        let signal = WaveSignal::at_level(Level::Principle).with_emotion(Emotion::Hurt);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.emotion, Some(0.5));

        context.emotion = Emotion::Joy; // cross-valence
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.emotion, Some(0.0));
    }

    #[test]
    fn test_neutral_and_surprise_match_only_exactly() {
        let mut context = base_context(48);
        context.emotion = Emotion::Surprise;
        let signal = WaveSignal::at_level(Level::Principle).with_emotion(Emotion::Neutral);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.emotion, Some(0.0));

        let signal = WaveSignal::at_level(Level::Principle).with_emotion(Emotion::Surprise);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.emotion, Some(1.0));
    }

    #[test]
    fn test_rule_condition_channel() {
        let mut context = base_context(48);
        context.rule_conditions = ["Egor".to_string(), "Telegram".to_string()]
            .into_iter()
            .collect();
        let signal = WaveSignal::at_level(Level::Principle).with_nodes(["Egor", "poem"]);
        let (_, channels) = scorer().score(&signal, &context, now());
        // One of two conditions hit.
        assert_eq!(channels.rule, Some(0.5));
    }

    #[test]
    fn test_semantic_channel_needs_both_embeddings() {
        let mut context = base_context(48);
        let signal = full_signal().with_embedding(vec![1.0, 0.0, 0.0]);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert!(channels.semantic.is_none());

        context.embedding = Some(vec![1.0, 0.0, 0.0]);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.semantic, Some(1.0));
    }

    #[test]
    fn test_negative_cosine_clamps_to_zero() {
        let mut context = base_context(48);
        context.embedding = Some(vec![-1.0, 0.0]);
        let signal = WaveSignal::at_level(Level::Principle).with_embedding(vec![1.0, 0.0]);
        let (_, channels) = scorer().score(&signal, &context, now());
        assert_eq!(channels.semantic, Some(0.0));
    }

    #[test]
    fn test_structurally_empty_context_can_win_on_emotion() {
        let mut context = base_context(48);
        context.nodes.clear();
        context.edges.clear();
        let signal = WaveSignal::at_level(Level::Principle).with_emotion(Emotion::Hurt);
        let (resonance, channels) = scorer().score(&signal, &context, now());
        assert!(channels.node.is_none());
        assert_eq!(channels.emotion, Some(1.0));
        assert!(resonance > 0.0);
    }

    // =====================================================================
    // Modifiers
    // =====================================================================

    #[test]
    fn test_recency_floor_for_fresh_contexts() {
        let (resonance, channels) = scorer().score(&full_signal(), &base_context(0), now());
        assert!((channels.recency_factor - 0.2).abs() < 1e-6);
        assert!((resonance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_recency_releases_after_window() {
        let (_, channels) = scorer().score(&full_signal(), &base_context(48), now());
        assert!((channels.recency_factor - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_recency_monotone_with_age() {
        // An older context never scores below an otherwise-identical
        // younger one inside the window.
        let s = scorer();
        let mut last = 0.0;
        for hours in [0, 1, 6, 12, 23, 24, 48] {
            let (resonance, _) = s.score(&full_signal(), &base_context(hours), now());
            assert!(
                resonance >= last,
                "resonance fell from {} to {} at {} hours",
                last,
                resonance,
                hours
            );
            last = resonance;
        }
    }

    #[test]
    fn test_level_weighting() {
        let mut context = base_context(48);
        context.level = Level::Principle;
        let (_, channels) = scorer().score(&full_signal(), &context, now());
        assert!((channels.level_factor - 1.10).abs() < 1e-6);

        context.level = Level::Episode;
        let (_, channels) = scorer().score(&full_signal(), &context, now());
        assert!((channels.level_factor - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_drive_bonus_applies_once_and_clamps() {
        let mut signal = full_signal();
        signal.drive_bias.insert(
            "connection".to_string(),
            crate::types::DriveBias {
                satisfaction: 0.1,
                seeds: vec!["Egor".to_string(), "Kai".to_string()],
            },
        );
        let (resonance, channels) = scorer().score(&signal, &base_context(48), now());
        assert!((channels.drive_bonus - 0.05).abs() < 1e-6);
        // raw 1.0 * recency 1.0 * level 1.0 + 0.05
        assert!((resonance - 1.05).abs() < 1e-6);
        assert!(resonance <= 1.2);
    }

    #[test]
    fn test_drive_bonus_skipped_without_seed_hit() {
        let mut signal = full_signal();
        signal.drive_bias.insert(
            "creation".to_string(),
            crate::types::DriveBias {
                satisfaction: 0.1,
                seeds: vec!["writing".to_string()],
            },
        );
        let (_, channels) = scorer().score(&signal, &base_context(48), now());
        assert_eq!(channels.drive_bonus, 0.0);
    }

    // =====================================================================
    // Cosine helper
    // =====================================================================

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }
}
