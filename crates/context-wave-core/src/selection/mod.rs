//! Diversity selector: reduces scored candidates to a bounded, diverse
//! working-memory slate.
//!
//! Four constraints, applied in order: resonance floor, per-emotion cap,
//! MMR over node sets with threshold relaxation, and optional level
//! fairness. Output order is deterministic (resonance desc, id asc).

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::SelectionConfig;
use crate::text;
use crate::types::{Level, ScoredContext};

const EPSILON: f32 = 1e-6;

/// Per-retrieval selection options. Defaults mirror [`SelectionConfig`].
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Pre-selector candidate width.
    pub k_candidates: usize,
    /// Drop candidates with resonance below this floor.
    pub resonance_floor: f32,
    /// Maximum pairwise node-set Jaccard overlap inside the slate.
    pub mmr_overlap: f32,
    /// Maximum slate members sharing an emotion first word.
    pub per_emotion_cap: usize,
    /// Guarantee an episode in mixed-level slates.
    pub level_fairness: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

impl RetrievalOptions {
    /// Derive options from a selection configuration.
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            k_candidates: config.candidate_width,
            resonance_floor: config.resonance_floor,
            mmr_overlap: config.mmr_overlap,
            per_emotion_cap: config.per_emotion_cap,
            level_fairness: config.level_fairness,
        }
    }

    /// Set the resonance floor.
    pub fn with_floor(mut self, floor: f32) -> Self {
        self.resonance_floor = floor;
        self
    }

    /// Set the MMR overlap threshold.
    pub fn with_mmr_overlap(mut self, overlap: f32) -> Self {
        self.mmr_overlap = overlap;
        self
    }

    /// Set the per-emotion cap.
    pub fn with_per_emotion_cap(mut self, cap: usize) -> Self {
        self.per_emotion_cap = cap;
        self
    }

    /// Toggle level fairness.
    pub fn with_level_fairness(mut self, on: bool) -> Self {
        self.level_fairness = on;
        self
    }
}

/// Reduces a scored candidate list to the working-memory slate.
#[derive(Debug, Clone)]
pub struct DiversitySelector {
    config: SelectionConfig,
}

impl DiversitySelector {
    /// Create a selector over the given configuration.
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Select up to `k` contexts from the scored candidates.
    ///
    /// The input is expected in scorer order (resonance desc, id asc); the
    /// selector re-sorts defensively so its output is deterministic for any
    /// input permutation.
    pub fn select(
        &self,
        scored: Vec<ScoredContext>,
        k: usize,
        options: &RetrievalOptions,
    ) -> Vec<ScoredContext> {
        let mut candidates = scored;
        sort_deterministic(&mut candidates);
        candidates.truncate(options.k_candidates);

        // Resonance floor.
        candidates.retain(|c| c.resonance >= options.resonance_floor);
        let survivors = candidates.clone();

        // Per-emotion cap, keyed by the first word of the emotion label.
        let mut capped = apply_emotion_cap(candidates, options.per_emotion_cap);
        sort_deterministic(&mut capped);

        // MMR over folded node-name sets, relaxing the overlap threshold in
        // steps down to zero when nothing qualifies.
        let mut slate = self.apply_mmr(capped, k, options.mmr_overlap);

        if options.level_fairness {
            apply_level_fairness(&mut slate, &survivors);
        }

        sort_deterministic(&mut slate);

        debug!(
            survivors = survivors.len(),
            slate = slate.len(),
            k = k,
            "Selected working-memory slate"
        );

        slate
    }

    fn apply_mmr(
        &self,
        candidates: Vec<ScoredContext>,
        k: usize,
        overlap_threshold: f32,
    ) -> Vec<ScoredContext> {
        let mut pool: Vec<(ScoredContext, BTreeSet<String>)> = candidates
            .into_iter()
            .map(|c| {
                let folded = c.context.folded_node_tokens();
                (c, folded)
            })
            .collect();

        let mut slate: Vec<(ScoredContext, BTreeSet<String>)> = Vec::new();
        let mut tau = overlap_threshold;

        while slate.len() < k && !pool.is_empty() {
            let position = pool.iter().position(|(_, folded)| {
                slate
                    .iter()
                    .all(|(_, picked)| text::jaccard(folded, picked) <= tau + EPSILON)
            });

            match position {
                Some(index) => slate.push(pool.remove(index)),
                None => {
                    if tau <= 0.0 {
                        // Relaxed all the way down and nothing qualifies:
                        // give up on the overlap requirement and take the
                        // strongest remaining candidate.
                        slate.push(pool.remove(0));
                    } else {
                        tau = (tau - self.config.mmr_relax_step).max(0.0);
                    }
                }
            }
        }

        slate.into_iter().map(|(c, _)| c).collect()
    }
}

/// Deterministic ordering: resonance desc, then id asc.
fn sort_deterministic(list: &mut [ScoredContext]) {
    list.sort_by(|a, b| {
        b.resonance
            .partial_cmp(&a.resonance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// First word of the emotion label, the collision key for the cap.
fn emotion_key(candidate: &ScoredContext) -> &str {
    let label = candidate.context.emotion.as_str();
    label.split_whitespace().next().unwrap_or(label)
}

/// Keep at most `cap` candidates per emotion first word. Survivor ties are
/// broken by resonance, then by later creation time.
fn apply_emotion_cap(candidates: Vec<ScoredContext>, cap: usize) -> Vec<ScoredContext> {
    let mut kept: Vec<ScoredContext> = Vec::with_capacity(candidates.len());
    let mut groups: Vec<(String, Vec<ScoredContext>)> = Vec::new();

    for candidate in candidates {
        let key = emotion_key(&candidate).to_string();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(candidate),
            None => groups.push((key, vec![candidate])),
        }
    }

    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            b.resonance
                .partial_cmp(&a.resonance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.context.created_at.cmp(&a.context.created_at))
                .then_with(|| a.id().cmp(&b.id()))
        });
        group.truncate(cap);
        kept.extend(group);
    }

    kept
}

/// Guarantee one episode in the slate when survivors span more than one
/// non-zero level and at least one episode cleared the floor.
fn apply_level_fairness(slate: &mut Vec<ScoredContext>, survivors: &[ScoredContext]) {
    if slate.is_empty() || slate.iter().any(|c| c.context.level == Level::Episode) {
        return;
    }

    let nonzero_levels: BTreeSet<Level> = survivors
        .iter()
        .map(|c| c.context.level)
        .filter(|l| *l != Level::Episode)
        .collect();
    if nonzero_levels.len() <= 1 {
        return;
    }

    let slate_ids: BTreeSet<_> = slate.iter().map(|c| c.id()).collect();
    let best_episode = survivors
        .iter()
        .filter(|c| c.context.level == Level::Episode && !slate_ids.contains(&c.id()))
        .max_by(|a, b| {
            a.resonance
                .partial_cmp(&b.resonance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.id().cmp(&a.id()))
        });

    if let Some(episode) = best_episode {
        // Swap out the weakest slate member.
        if let Some(weakest) = slate
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.resonance
                    .partial_cmp(&b.resonance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id().cmp(&a.id()))
            })
            .map(|(i, _)| i)
        {
            slate[weakest] = episode.clone();
        }
    }
}
