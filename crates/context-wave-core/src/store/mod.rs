//! ContextStore: the persistent holder of contexts and derived indexes.
//!
//! # Architecture
//!
//! ```text
//! ContextStore
//! ├── RwLock<StoreInner>            - one logical lock over everything
//! │   ├── contexts                  - primary table, id -> Arc<Context>
//! │   ├── by_node / by_relation /   - inverted indexes
//! │   │   by_emotion / by_result /
//! │   │   by_rule_condition
//! │   ├── by_level                  - level partition
//! │   ├── by_dedup_key              - caller-supplied dedup keys
//! │   └── source_refs               - reverse `sources` reference counts
//! └── injected Clock                - creation timestamps
//! ```
//!
//! Contexts are shared as `Arc<Context>`: a snapshot clones the `Arc`s, so a
//! retrieval in flight keeps observing the store exactly as it was when the
//! snapshot was taken, while the permitted mutations (embedding fill-in,
//! bounded certainty updates) swap in a fresh `Arc` behind the write lock.
//!
//! Every invariant is checked before any mutation: a rejected write leaves
//! the store byte-identical.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, InvariantKind};
use crate::text;
use crate::traits::Clock;
use crate::types::{Context, ContextDraft, ContextId, Emotion, GraphNode, Level, Outcome};

/// Aggregate store statistics: totals, level distribution, entity and
/// emotion frequencies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Total stored contexts.
    pub total: usize,
    /// Context counts per level (index = level height).
    pub per_level: [usize; 3],
    /// Most frequent entities, descending, capped at ten.
    pub top_entities: Vec<(String, usize)>,
    /// Emotion frequencies, descending.
    pub emotions: Vec<(Emotion, usize)>,
}

/// An immutable view of the store taken at the start of a retrieval.
///
/// Later writes are not observed through it.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Candidate contexts with level at or below the requested cap, in id
    /// order.
    pub contexts: Vec<Arc<Context>>,
    /// Every id stored at snapshot time, for source-integrity checks.
    all_ids: BTreeSet<ContextId>,
}

impl StoreSnapshot {
    /// Whether the given id existed when the snapshot was taken.
    pub fn contains(&self, id: ContextId) -> bool {
        self.all_ids.contains(&id)
    }

    /// Number of candidate contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    contexts: BTreeMap<ContextId, Arc<Context>>,
    by_node: HashMap<String, BTreeSet<ContextId>>,
    by_relation: HashMap<String, BTreeSet<ContextId>>,
    by_emotion: HashMap<Emotion, BTreeSet<ContextId>>,
    by_result: HashMap<Outcome, BTreeSet<ContextId>>,
    by_rule_condition: HashMap<String, BTreeSet<ContextId>>,
    by_level: [BTreeSet<ContextId>; 3],
    by_dedup_key: HashMap<String, ContextId>,
    source_refs: HashMap<ContextId, usize>,
}

/// In-memory context store with inverted indexes and invariant enforcement.
///
/// Safe under concurrent readers with a single writer serialized across any
/// one `put`; the indexes live under the same logical lock as the primary
/// table.
pub struct ContextStore {
    inner: RwLock<StoreInner>,
    clock: Arc<dyn Clock>,
    max_description_chars: usize,
    embedding_dimension: usize,
    known_entities: BTreeSet<String>,
    exclusive_sources: bool,
    dedup_threshold: f32,
    merged_node_cap: usize,
}

impl ContextStore {
    /// Create a store from engine configuration and an injected clock.
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            clock,
            max_description_chars: config.store.max_description_chars,
            embedding_dimension: config.store.embedding_dimension,
            known_entities: config.store.known_entities.clone(),
            exclusive_sources: config.store.exclusive_sources,
            dedup_threshold: config.consolidation.dedup_threshold,
            merged_node_cap: config.consolidation.merged_node_cap,
        }
    }

    fn violation(which: InvariantKind, detail: impl Into<String>) -> EngineError {
        EngineError::InvariantViolation {
            which,
            detail: detail.into(),
        }
    }

    /// Validate and install a draft, returning the assigned id.
    ///
    /// Normalizes the emotion, deduplicates nodes, derives rule conditions,
    /// and checks every invariant before touching any table. The first
    /// violated invariant is reported and the store is left unchanged.
    pub fn put(&self, draft: ContextDraft) -> EngineResult<ContextId> {
        let mut inner = self.inner.write();

        let level = Level::from_u8(draft.level).ok_or_else(|| {
            Self::violation(
                InvariantKind::LevelCap,
                format!("level {} exceeds the cap of 2", draft.level),
            )
        })?;

        if draft.description.chars().count() > self.max_description_chars {
            return Err(Self::violation(
                InvariantKind::Description,
                format!(
                    "description has {} code points, bound is {}",
                    draft.description.chars().count(),
                    self.max_description_chars
                ),
            ));
        }

        if !(0.0..=1.0).contains(&draft.intensity) || draft.intensity.is_nan() {
            return Err(Self::violation(
                InvariantKind::FieldRange,
                format!("intensity {} outside [0, 1]", draft.intensity),
            ));
        }
        let certainty = draft.certainty.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&certainty) || certainty.is_nan() {
            return Err(Self::violation(
                InvariantKind::FieldRange,
                format!("certainty {} outside [0, 1]", certainty),
            ));
        }

        if let Some(embedding) = &draft.embedding {
            if embedding.len() != self.embedding_dimension {
                return Err(Self::violation(
                    InvariantKind::EmbeddingDimension,
                    format!(
                        "expected dimension {}, got {}",
                        self.embedding_dimension,
                        embedding.len()
                    ),
                ));
            }
        }

        // Deduplicate nodes by name, first occurrence keeping its role.
        let mut nodes: Vec<GraphNode> = Vec::with_capacity(draft.nodes.len());
        let mut seen_names = BTreeSet::new();
        for node in draft.nodes {
            if seen_names.insert(node.name.clone()) {
                nodes.push(node);
            }
        }
        let node_names: BTreeSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();

        for edge in &draft.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !node_names.contains(endpoint.as_str()) {
                    return Err(Self::violation(
                        InvariantKind::EdgeEndpoints,
                        format!(
                            "edge ({} -{}-> {}) references missing node '{}'",
                            edge.source, edge.relation, edge.target, endpoint
                        ),
                    ));
                }
            }
        }

        if !draft.sources.is_empty() && level == Level::Episode {
            return Err(Self::violation(
                InvariantKind::SourceIntegrity,
                "sources present on a level-0 context",
            ));
        }
        for source in &draft.sources {
            let stored = inner.contexts.get(source).ok_or_else(|| {
                Self::violation(
                    InvariantKind::SourceIntegrity,
                    format!("source {} does not exist", source),
                )
            })?;
            if stored.level >= level {
                return Err(Self::violation(
                    InvariantKind::SourceIntegrity,
                    format!(
                        "source {} at {} is not strictly below {}",
                        source, stored.level, level
                    ),
                ));
            }
            if self.exclusive_sources && inner.source_refs.get(source).copied().unwrap_or(0) > 0 {
                return Err(Self::violation(
                    InvariantKind::SourceIntegrity,
                    format!("source {} is already consolidated elsewhere", source),
                ));
            }
        }

        if level > Level::Episode && nodes.len() > self.merged_node_cap {
            return Err(Self::violation(
                InvariantKind::NodeBudget,
                format!(
                    "{} merged nodes exceed the bound of {}",
                    nodes.len(),
                    self.merged_node_cap
                ),
            ));
        }

        let emotion = Emotion::normalize(&draft.emotion);

        if level > Level::Episode {
            let draft_tokens = text::dedup_tokens(draft.rule.as_deref(), &draft.description);
            if let Some((existing, overlap)) =
                Self::max_overlap_at_level(&inner, level, &draft_tokens)
            {
                if overlap > self.dedup_threshold {
                    return Err(Self::violation(
                        InvariantKind::SemanticDuplicate,
                        format!(
                            "overlap {:.2} with {} exceeds the dedup threshold",
                            overlap, existing
                        ),
                    ));
                }
            }
        }

        if let Some(key) = &draft.dedup_key {
            if let Some(existing) = inner.by_dedup_key.get(key) {
                return Err(EngineError::Conflict {
                    key: key.clone(),
                    existing: *existing,
                });
            }
        }

        // All checks passed: assign the id and install.
        inner.next_id += 1;
        let id = ContextId::new(inner.next_id);

        let rule_conditions = crate::types::derive_rule_conditions(
            draft.rule.as_deref(),
            &node_names,
            &self.known_entities,
        );

        let context = Arc::new(Context {
            id,
            description: draft.description,
            nodes,
            edges: draft.edges,
            emotion,
            intensity: draft.intensity,
            result: draft.result,
            rule: draft.rule,
            rule_conditions,
            certainty,
            level,
            sources: draft.sources,
            embedding: draft.embedding,
            created_at: self.clock.now(),
            when_day: draft.when_day,
            when_cycle: draft.when_cycle,
        });

        Self::index(&mut inner, &context);
        if let Some(key) = draft.dedup_key {
            inner.by_dedup_key.insert(key, id);
        }
        inner.contexts.insert(id, context.clone());

        debug!(
            id = %id,
            level = %context.level,
            emotion = %context.emotion,
            nodes = context.nodes.len(),
            "Stored context"
        );

        Ok(id)
    }

    fn index(inner: &mut StoreInner, context: &Arc<Context>) {
        let id = context.id;
        for node in &context.nodes {
            inner.by_node.entry(node.name.clone()).or_default().insert(id);
        }
        for edge in &context.edges {
            inner
                .by_relation
                .entry(edge.relation.clone())
                .or_default()
                .insert(id);
        }
        inner.by_emotion.entry(context.emotion).or_default().insert(id);
        inner.by_result.entry(context.result).or_default().insert(id);
        for condition in &context.rule_conditions {
            inner
                .by_rule_condition
                .entry(condition.clone())
                .or_default()
                .insert(id);
        }
        inner.by_level[context.level.as_u8() as usize].insert(id);
        for source in &context.sources {
            *inner.source_refs.entry(*source).or_insert(0) += 1;
        }
    }

    fn unindex(inner: &mut StoreInner, context: &Context) {
        let id = context.id;
        for node in &context.nodes {
            if let Some(set) = inner.by_node.get_mut(&node.name) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_node.remove(&node.name);
                }
            }
        }
        for edge in &context.edges {
            if let Some(set) = inner.by_relation.get_mut(&edge.relation) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_relation.remove(&edge.relation);
                }
            }
        }
        if let Some(set) = inner.by_emotion.get_mut(&context.emotion) {
            set.remove(&id);
        }
        if let Some(set) = inner.by_result.get_mut(&context.result) {
            set.remove(&id);
        }
        for condition in &context.rule_conditions {
            if let Some(set) = inner.by_rule_condition.get_mut(condition) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_rule_condition.remove(condition);
                }
            }
        }
        inner.by_level[context.level.as_u8() as usize].remove(&id);
        for source in &context.sources {
            if let Some(count) = inner.source_refs.get_mut(source) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    inner.source_refs.remove(source);
                }
            }
        }
    }

    fn max_overlap_at_level(
        inner: &StoreInner,
        level: Level,
        tokens: &BTreeSet<String>,
    ) -> Option<(ContextId, f32)> {
        let mut best: Option<(ContextId, f32)> = None;
        for id in &inner.by_level[level.as_u8() as usize] {
            let Some(context) = inner.contexts.get(id) else {
                continue;
            };
            let overlap = text::jaccard(tokens, &context.dedup_tokens());
            match best {
                Some((_, current)) if overlap <= current => {}
                _ => best = Some((*id, overlap)),
            }
        }
        best
    }

    /// Fetch a context by id. A miss is an error, never an empty success.
    pub fn get(&self, id: ContextId) -> EngineResult<Arc<Context>> {
        self.inner
            .read()
            .contexts
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound { id })
    }

    /// Take an immutable snapshot of every context with level at or below
    /// the cap. A retrieval in flight never observes later writes.
    pub fn snapshot(&self, level_cap: Level) -> StoreSnapshot {
        let inner = self.inner.read();
        let contexts = inner
            .contexts
            .values()
            .filter(|c| c.level <= level_cap)
            .cloned()
            .collect();
        StoreSnapshot {
            contexts,
            all_ids: inner.contexts.keys().copied().collect(),
        }
    }

    /// Every stored context with level at or below the cap, in id order.
    pub fn scan(&self, level_cap: Level) -> Vec<Arc<Context>> {
        self.snapshot(level_cap).contexts
    }

    /// Remove every context matching the predicate, cascading through the
    /// indexes.
    ///
    /// Refused when a surviving context would be left referencing a purged
    /// source.
    pub fn purge<F>(&self, predicate: F) -> EngineResult<usize>
    where
        F: Fn(&Context) -> bool,
    {
        let mut inner = self.inner.write();

        let victims: BTreeSet<ContextId> = inner
            .contexts
            .values()
            .filter(|c| predicate(c))
            .map(|c| c.id)
            .collect();
        if victims.is_empty() {
            return Ok(0);
        }

        for context in inner.contexts.values() {
            if victims.contains(&context.id) {
                continue;
            }
            if let Some(source) = context.sources.iter().find(|s| victims.contains(s)) {
                return Err(Self::violation(
                    InvariantKind::SourceIntegrity,
                    format!(
                        "cannot purge {}: referenced as a source by {}",
                        source, context.id
                    ),
                ));
            }
        }

        for id in &victims {
            if let Some(context) = inner.contexts.remove(id) {
                Self::unindex(&mut inner, &context);
            }
        }
        inner.by_dedup_key.retain(|_, id| !victims.contains(id));

        warn!(purged = victims.len(), "Purged contexts");
        Ok(victims.len())
    }

    /// Lazily fill a missing embedding. Returns `false` when the context
    /// already had one (the stored vector is kept).
    pub fn fill_embedding(&self, id: ContextId, embedding: Vec<f32>) -> EngineResult<bool> {
        if embedding.len() != self.embedding_dimension {
            return Err(Self::violation(
                InvariantKind::EmbeddingDimension,
                format!(
                    "expected dimension {}, got {}",
                    self.embedding_dimension,
                    embedding.len()
                ),
            ));
        }

        let mut inner = self.inner.write();
        let context = inner
            .contexts
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound { id })?;
        if context.embedding.is_some() {
            return Ok(false);
        }

        let mut updated = (*context).clone();
        updated.embedding = Some(embedding);
        inner.contexts.insert(id, Arc::new(updated));
        Ok(true)
    }

    /// Apply a bounded certainty update (consolidation only). The result is
    /// clamped to [0, 1]; the new value is returned.
    pub fn reinforce_certainty(&self, id: ContextId, delta: f32) -> EngineResult<f32> {
        let mut inner = self.inner.write();
        let context = inner
            .contexts
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound { id })?;

        let mut updated = (*context).clone();
        updated.certainty = (updated.certainty + delta).clamp(0.0, 1.0);
        let certainty = updated.certainty;
        inner.contexts.insert(id, Arc::new(updated));
        Ok(certainty)
    }

    /// Contexts at the given level not referenced in any stored context's
    /// `sources`, in id order.
    pub fn unconsolidated(&self, level: Level) -> Vec<Arc<Context>> {
        let inner = self.inner.read();
        inner.by_level[level.as_u8() as usize]
            .iter()
            .filter(|id| inner.source_refs.get(id).copied().unwrap_or(0) == 0)
            .filter_map(|id| inner.contexts.get(id).cloned())
            .collect()
    }

    /// The same-level context whose rule/description text overlaps the given
    /// token set most, when that overlap exceeds the dedup threshold.
    pub fn find_semantic_duplicate(
        &self,
        level: Level,
        tokens: &BTreeSet<String>,
    ) -> Option<(ContextId, f32)> {
        let inner = self.inner.read();
        Self::max_overlap_at_level(&inner, level, tokens)
            .filter(|(_, overlap)| *overlap > self.dedup_threshold)
    }

    /// Contexts naming the given node, in id order.
    pub fn contexts_for_node(&self, name: &str) -> Vec<Arc<Context>> {
        let inner = self.inner.read();
        inner
            .by_node
            .get(name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.contexts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Running emotional valence of a node over its most recent `window`
    /// contexts: mean of signed valence weighted by intensity. `None` for a
    /// node the store has never seen.
    pub fn valence_profile(&self, name: &str, window: usize) -> Option<f32> {
        let contexts = self.contexts_for_node(name);
        if contexts.is_empty() || window == 0 {
            return None;
        }
        // Ids are monotonic, so the tail of the id-ordered list is the most
        // recent window.
        let recent = &contexts[contexts.len().saturating_sub(window)..];
        let sum: f32 = recent
            .iter()
            .map(|c| c.emotion.signed_valence() * c.intensity)
            .sum();
        Some(sum / recent.len() as f32)
    }

    /// Aggregate statistics: totals, level distribution, entity and emotion
    /// frequencies.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();

        let mut per_level = [0usize; 3];
        for (i, ids) in inner.by_level.iter().enumerate() {
            per_level[i] = ids.len();
        }

        let mut top_entities: Vec<(String, usize)> = inner
            .by_node
            .iter()
            .map(|(name, ids)| (name.clone(), ids.len()))
            .collect();
        top_entities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_entities.truncate(10);

        let mut emotions: Vec<(Emotion, usize)> = inner
            .by_emotion
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(emotion, ids)| (*emotion, ids.len()))
            .collect();
        emotions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        StoreStats {
            total: inner.contexts.len(),
            per_level,
            top_entities,
            emotions,
        }
    }

    /// Number of stored contexts.
    pub fn len(&self) -> usize {
        self.inner.read().contexts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().contexts.is_empty()
    }
}
