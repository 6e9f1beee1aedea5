//! Consolidator: the off-line pass that clusters unconsolidated contexts
//! and writes higher-level abstractions.
//!
//! # Algorithm
//!
//! 1. Gather the unconsolidated set at each level in {0, 1}.
//! 2. Cluster by node overlap: contexts sharing at least `min_overlap`
//!    nodes are linked; clusters are the connected components. Oversized
//!    components re-split with a raised overlap bar; undersized ones are
//!    discarded.
//! 3. Invoke the external generalizer per surviving cluster, under a
//!    deadline.
//! 4. Dedup the proposal against existing same-level contexts; duplicates
//!    are absorbed into the existing context (whose certainty is
//!    reinforced, the bounded mutation consolidation is allowed).
//! 5. Write the abstraction at level + 1 through the normal put path,
//!    atomically per cluster.
//!
//! Generalizer failures leave the cluster unconsolidated for the next pass;
//! repeated failures on the same cluster signature quarantine it until its
//! membership changes. A second pass over an unchanged store writes nothing:
//! freshly consolidated members are referenced in `sources` and no longer
//! gathered.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CollaboratorConfig, ConsolidationConfig};
use crate::error::{Collaborator, EngineError, EngineResult};
use crate::store::ContextStore;
use crate::traits::{Clock, GeneralizationDraft, GeneralizationRequest, Generalizer};
use crate::types::{Context, ContextDraft, GraphNode, Level};

/// Identity of a cluster: a digest over its sorted member ids. Changing the
/// membership changes the signature, which releases any quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterSignature([u8; 32]);

/// Per-pass resource bound. Unlimited by default.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationBudget {
    /// Maximum clusters attempted in one pass.
    pub max_clusters: Option<usize>,
    /// Wall-clock deadline for the pass.
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
}

impl ConsolidationBudget {
    /// No bound: the pass runs to completion.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Bound the pass by attempted cluster count.
    pub fn clusters(max: usize) -> Self {
        Self {
            max_clusters: Some(max),
            ..Default::default()
        }
    }

    /// Bound the pass by a wall-clock deadline.
    pub fn until(deadline: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            deadline: Some(deadline),
            ..Default::default()
        }
    }
}

/// Outcome of one consolidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationStats {
    /// Clusters attempted (quarantined clusters are skipped, not attempted).
    pub clusters_seen: usize,
    /// New abstractions written.
    pub contexts_written: usize,
    /// Clusters absorbed into an existing same-level context.
    pub contexts_absorbed: usize,
    /// Generalizer failures and timeouts.
    pub failures: usize,
    /// Whether the pass stopped on budget rather than completion.
    pub budget_exhausted: bool,
}

/// Cross-pass consolidation state: failure streaks and quarantined cluster
/// signatures.
#[derive(Debug, Default)]
pub struct ConsolidationState {
    failure_streaks: HashMap<ClusterSignature, u32>,
    quarantined: HashSet<ClusterSignature>,
}

impl ConsolidationState {
    /// Whether a signature is currently quarantined.
    pub fn is_quarantined(&self, signature: &ClusterSignature) -> bool {
        self.quarantined.contains(signature)
    }

    /// Number of quarantined signatures.
    pub fn quarantined_count(&self) -> usize {
        self.quarantined.len()
    }

    fn record_failure(&mut self, signature: ClusterSignature, quarantine_after: u32) -> u32 {
        let streak = self.failure_streaks.entry(signature).or_insert(0);
        *streak += 1;
        if *streak >= quarantine_after {
            self.quarantined.insert(signature);
        }
        *streak
    }

    fn record_success(&mut self, signature: &ClusterSignature) {
        self.failure_streaks.remove(signature);
        self.quarantined.remove(signature);
    }
}

/// Digest the sorted member ids of a cluster.
pub fn cluster_signature(members: &[Arc<Context>]) -> ClusterSignature {
    let mut ids: Vec<u64> = members.iter().map(|c| c.id.raw()).collect();
    ids.sort_unstable();
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.to_be_bytes());
    }
    ClusterSignature(hasher.finalize().into())
}

/// Connected components under the shared-node relation, with oversized
/// components re-split at a raised overlap bar and undersized components
/// discarded. Members inside a cluster and clusters themselves come out in
/// ascending id order.
pub fn cluster_by_overlap(
    contexts: &[Arc<Context>],
    min_overlap: usize,
    min_cluster: usize,
    max_cluster: usize,
) -> Vec<Vec<Arc<Context>>> {
    let components = connected_components(contexts, min_overlap);

    let mut clusters: Vec<Vec<Arc<Context>>> = Vec::new();
    for component in components {
        if component.len() < min_cluster {
            continue;
        }
        if component.len() > max_cluster {
            // Too broad: demand more shared nodes and re-split. Raising the
            // bar eventually exceeds every node set, so this terminates.
            clusters.extend(cluster_by_overlap(
                &component,
                min_overlap + 1,
                min_cluster,
                max_cluster,
            ));
        } else {
            clusters.push(component);
        }
    }

    clusters.sort_by_key(|c| c.first().map(|ctx| ctx.id));
    clusters
}

fn connected_components(contexts: &[Arc<Context>], min_overlap: usize) -> Vec<Vec<Arc<Context>>> {
    let node_sets: Vec<BTreeSet<&str>> = contexts.iter().map(|c| c.node_names()).collect();

    let mut parent: Vec<usize> = (0..contexts.len()).collect();
    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let up = parent[i];
            let root = find(parent, up);
            parent[i] = root;
        }
        parent[i]
    }

    for i in 0..contexts.len() {
        for j in (i + 1)..contexts.len() {
            let shared = node_sets[i].intersection(&node_sets[j]).count();
            if shared >= min_overlap {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut by_root: HashMap<usize, Vec<Arc<Context>>> = HashMap::new();
    for i in 0..contexts.len() {
        let root = find(&mut parent, i);
        by_root.entry(root).or_default().push(contexts[i].clone());
    }

    let mut components: Vec<Vec<Arc<Context>>> = by_root.into_values().collect();
    for component in &mut components {
        component.sort_by_key(|c| c.id);
    }
    components.sort_by_key(|c| c.first().map(|ctx| ctx.id));
    components
}

/// Runs consolidation passes against a store.
pub struct Consolidator {
    config: ConsolidationConfig,
    generalizer_timeout_ms: u64,
}

impl Consolidator {
    /// Create a consolidator from configuration.
    pub fn new(config: ConsolidationConfig, collaborators: &CollaboratorConfig) -> Self {
        Self {
            config,
            generalizer_timeout_ms: collaborators.generalizer_timeout_ms,
        }
    }

    /// Run one consolidation pass.
    ///
    /// Returns partial statistics with `budget_exhausted` set when the
    /// budget runs out; the next invocation resumes where this one stopped,
    /// because consolidated members are no longer gathered. Cancellation
    /// aborts between clusters, never mid-write.
    pub async fn run(
        &self,
        store: &ContextStore,
        generalizer: &dyn Generalizer,
        clock: &dyn Clock,
        state: &mut ConsolidationState,
        budget: &ConsolidationBudget,
        cancel: &CancellationToken,
    ) -> EngineResult<ConsolidationStats> {
        let mut stats = ConsolidationStats::default();

        'levels: for level in [Level::Episode, Level::Generalization] {
            let target = match level.next_up() {
                Some(target) => target,
                None => break,
            };

            let pool = store.unconsolidated(level);
            let clusters = cluster_by_overlap(
                &pool,
                self.config.min_overlap,
                self.config.min_cluster,
                self.config.max_cluster,
            );

            debug!(
                level = %level,
                pool = pool.len(),
                clusters = clusters.len(),
                "Gathered consolidation clusters"
            );

            for members in clusters {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }

                let signature = cluster_signature(&members);
                if state.is_quarantined(&signature) {
                    debug!(members = members.len(), "Skipping quarantined cluster");
                    continue;
                }

                if let Some(max) = budget.max_clusters {
                    if stats.clusters_seen >= max {
                        stats.budget_exhausted = true;
                        break 'levels;
                    }
                }
                if let Some(deadline) = budget.deadline {
                    if clock.now() >= deadline {
                        stats.budget_exhausted = true;
                        break 'levels;
                    }
                }

                stats.clusters_seen += 1;

                let request = build_request(target, &members);
                let draft = match self.call_generalizer(generalizer, request, cancel).await {
                    Ok(draft) => draft,
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(err) => {
                        stats.failures += 1;
                        let streak =
                            state.record_failure(signature, self.config.quarantine_after);
                        warn!(
                            error = %err,
                            streak = streak,
                            "Generalizer failed; cluster stays unconsolidated"
                        );
                        continue;
                    }
                };

                match self.install(store, target, &members, draft) {
                    Ok(Installed::Written(id)) => {
                        state.record_success(&signature);
                        stats.contexts_written += 1;
                        info!(id = %id, target = %target, members = members.len(), "Consolidated cluster");
                    }
                    Ok(Installed::Absorbed(existing)) => {
                        state.record_success(&signature);
                        stats.contexts_absorbed += 1;
                        debug!(existing = %existing, "Cluster absorbed into existing context");
                    }
                    Err(err) => {
                        stats.failures += 1;
                        let streak =
                            state.record_failure(signature, self.config.quarantine_after);
                        warn!(
                            error = %err,
                            streak = streak,
                            "Generalization draft rejected; cluster stays unconsolidated"
                        );
                    }
                }
            }
        }

        info!(
            clusters_seen = stats.clusters_seen,
            written = stats.contexts_written,
            absorbed = stats.contexts_absorbed,
            failures = stats.failures,
            budget_exhausted = stats.budget_exhausted,
            "Consolidation pass complete"
        );

        Ok(stats)
    }

    async fn call_generalizer(
        &self,
        generalizer: &dyn Generalizer,
        request: GeneralizationRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<GeneralizationDraft> {
        let deadline = Duration::from_millis(self.generalizer_timeout_ms);
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = tokio::time::timeout(deadline, generalizer.generalize(request, cancel)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(EngineError::CollaboratorTimeout {
                        who: Collaborator::Generalizer,
                        elapsed_ms: self.generalizer_timeout_ms,
                    }),
                }
            }
        }
    }

    /// Turn a generalizer draft into a stored context, or absorb it into an
    /// existing duplicate. The write is a single `put`: atomic per cluster.
    fn install(
        &self,
        store: &ContextStore,
        target: Level,
        members: &[Arc<Context>],
        draft: GeneralizationDraft,
    ) -> EngineResult<Installed> {
        let tokens = crate::text::dedup_tokens(Some(&draft.rule), &draft.description);
        if let Some((existing, overlap)) = store.find_semantic_duplicate(target, &tokens) {
            debug!(existing = %existing, overlap = overlap, "Duplicate generalization");
            store.reinforce_certainty(existing, self.config.absorb_reinforcement)?;
            return Ok(Installed::Absorbed(existing));
        }

        let nodes = self.merge_nodes(members, draft.nodes);
        let node_names: BTreeSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        let edges = draft
            .edges
            .into_iter()
            .filter(|e| {
                node_names.contains(e.source.as_str()) && node_names.contains(e.target.as_str())
            })
            .collect::<Vec<_>>();

        let default_certainty = match target {
            Level::Generalization => self.config.certainty_l1,
            _ => self.config.certainty_l2,
        };

        let context_draft = ContextDraft::new(draft.description)
            .with_nodes(nodes)
            .with_edges(edges)
            .with_emotion(draft.emotion)
            .with_intensity(draft.intensity.clamp(0.0, self.config.intensity_cap))
            .with_rule(draft.rule)
            .with_level(target.as_u8())
            .with_sources(members.iter().map(|c| c.id))
            .with_certainty(
                draft
                    .certainty
                    .unwrap_or(default_certainty)
                    .clamp(0.0, 1.0),
            );

        match store.put(context_draft) {
            Ok(id) => Ok(Installed::Written(id)),
            Err(EngineError::InvariantViolation {
                which: crate::error::InvariantKind::SemanticDuplicate,
                detail,
            }) => {
                // Raced with another writer; treat as absorbed when the
                // existing duplicate is identifiable, otherwise surface.
                warn!(detail = %detail, "Duplicate detected at write time");
                let (existing, _) = store
                    .find_semantic_duplicate(target, &tokens)
                    .ok_or(EngineError::InvariantViolation {
                        which: crate::error::InvariantKind::SemanticDuplicate,
                        detail,
                    })?;
                store.reinforce_certainty(existing, self.config.absorb_reinforcement)?;
                Ok(Installed::Absorbed(existing))
            }
            Err(err) => Err(err),
        }
    }

    /// Cap the merged node proposal, ranking nodes by how many cluster
    /// members name them, then by proposal order.
    fn merge_nodes(&self, members: &[Arc<Context>], proposed: Vec<GraphNode>) -> Vec<GraphNode> {
        if proposed.len() <= self.config.merged_node_cap {
            return proposed;
        }

        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for member in members {
            for name in member.node_names() {
                *frequency.entry(name).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(usize, GraphNode)> = proposed.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| {
            let fa = frequency.get(a.name.as_str()).copied().unwrap_or(0);
            let fb = frequency.get(b.name.as_str()).copied().unwrap_or(0);
            fb.cmp(&fa).then_with(|| ia.cmp(ib))
        });

        ranked
            .into_iter()
            .take(self.config.merged_node_cap)
            .map(|(_, node)| node)
            .collect()
    }
}

enum Installed {
    Written(crate::types::ContextId),
    Absorbed(crate::types::ContextId),
}

/// Assemble the generalization request for a cluster: member descriptions,
/// non-empty rules, and the node-name union in first-occurrence order.
fn build_request(target: Level, members: &[Arc<Context>]) -> GeneralizationRequest {
    let mut node_union: Vec<String> = Vec::new();
    for member in members {
        for node in &member.nodes {
            if !node_union.iter().any(|n| n == &node.name) {
                node_union.push(node.name.clone());
            }
        }
    }

    GeneralizationRequest {
        target_level: target,
        descriptions: members.iter().map(|c| c.description.clone()).collect(),
        rules: members
            .iter()
            .filter_map(|c| c.rule.clone())
            .filter(|r| !r.is_empty())
            .collect(),
        node_union,
    }
}
