//! Collaborator boundaries: the seams where the engine calls out.
//!
//! The embedder and generalizer are the only suspension points inside the
//! engine; both are async, accept a cancellation token, and run under
//! configurable per-call deadlines. The clock is injected so recency is
//! consistent across components within a single retrieval, and so tests can
//! steer time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::types::{GraphEdge, GraphNode, Level};

/// Text-to-vector embedder.
///
/// Called at write time (when a draft arrives without an embedding) and at
/// signal construction time. Must be idempotent for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-dimension vector.
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> EngineResult<Vec<f32>>;

    /// The dimension of produced vectors.
    fn dimension(&self) -> usize;
}

/// What the consolidator hands to the generalizer: one cluster of same-level
/// contexts, summarized.
#[derive(Debug, Clone)]
pub struct GeneralizationRequest {
    /// Level the produced abstraction will be stored at.
    pub target_level: Level,
    /// Member descriptions, in member-id order.
    pub descriptions: Vec<String>,
    /// Member rules (non-empty ones only), in member-id order.
    pub rules: Vec<String>,
    /// Union of member node names, for grounding the merged node proposal.
    pub node_union: Vec<String>,
}

/// What the generalizer proposes for a cluster.
///
/// The consolidator caps intensity and merged node count regardless of what
/// the draft suggests, and normalizes the emotion.
#[derive(Debug, Clone)]
pub struct GeneralizationDraft {
    /// One-sentence summary of the pattern.
    pub description: String,
    /// The teaching extracted from the cluster.
    pub rule: String,
    /// Proposed merged nodes.
    pub nodes: Vec<GraphNode>,
    /// Proposed edges over the merged nodes.
    pub edges: Vec<GraphEdge>,
    /// Raw proposed emotion.
    pub emotion: String,
    /// Proposed intensity; capped downstream.
    pub intensity: f32,
    /// Proposed certainty; defaults per target level when absent.
    pub certainty: Option<f32>,
}

/// Cluster-to-abstraction generalizer.
///
/// Treated as a possibly-failing side effect: errors and timeouts leave the
/// cluster unconsolidated for a later retry.
#[async_trait]
pub trait Generalizer: Send + Sync {
    /// Produce a generalization draft for one cluster.
    async fn generalize(
        &self,
        request: GeneralizationRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<GeneralizationDraft>;
}

/// Monotonic time source for recency computation.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
