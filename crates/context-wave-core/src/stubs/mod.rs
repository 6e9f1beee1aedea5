//! Stub collaborators for testing.
//!
//! Deterministic stand-ins for the external embedder, generalizer, and
//! clock. The embedder stub hashes content into a seeded, normalized vector
//! so that identical text always embeds identically and different text
//! diverges. Never use a constant vector, or every context would look the
//! same to the semantic channel.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Collaborator, EngineError, EngineResult};
use crate::traits::{Clock, Embedder, GeneralizationDraft, GeneralizationRequest, Generalizer};
use crate::types::GraphNode;

// =========================================================================
// Embedder stubs
// =========================================================================

/// Deterministic hash-based embedder.
///
/// Hashes the input, seeds an LCG, generates a vector in [-1, 1], and
/// normalizes it to unit length.
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    /// Create with the engine's default dimension.
    pub fn new() -> Self {
        Self { dimension: 384 }
    }

    /// Create with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn generate(&self, content: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // LCG step, constants from Knuth MMIX.
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
            vector.push((unit * 2.0 - 1.0) as f32);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str, _cancel: &CancellationToken) -> EngineResult<Vec<f32>> {
        Ok(self.generate(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that always fails.
#[derive(Debug, Default)]
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new() -> Self {
        Self { dimension: 384 }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str, _cancel: &CancellationToken) -> EngineResult<Vec<f32>> {
        Err(EngineError::CollaboratorFailure {
            who: Collaborator::Embedder,
            detail: "stubbed failure".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that never completes, for exercising deadlines.
#[derive(Debug, Default)]
pub struct HangingEmbedder {
    dimension: usize,
}

impl HangingEmbedder {
    pub fn new() -> Self {
        Self { dimension: 384 }
    }
}

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str, _cancel: &CancellationToken) -> EngineResult<Vec<f32>> {
        std::future::pending().await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// =========================================================================
// Generalizer stubs
// =========================================================================

/// Generalizer that derives a draft deterministically from the request.
///
/// The description summarizes the cluster size, the rule names the shared
/// nodes, and the merged node proposal is the node union.
#[derive(Debug, Default)]
pub struct SyntheticGeneralizer;

impl SyntheticGeneralizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generalizer for SyntheticGeneralizer {
    async fn generalize(
        &self,
        request: GeneralizationRequest,
        _cancel: &CancellationToken,
    ) -> EngineResult<GeneralizationDraft> {
        let first = request
            .descriptions
            .first()
            .map(String::as_str)
            .unwrap_or("");
        let shared = request.node_union.join(", ");
        Ok(GeneralizationDraft {
            description: format!(
                "Pattern across {} contexts: {}",
                request.descriptions.len(),
                first
            ),
            rule: format!("Situations involving {} tend to recur together.", shared),
            nodes: request
                .node_union
                .iter()
                .map(|name| GraphNode::named(name.clone()))
                .collect(),
            edges: Vec::new(),
            emotion: "neutral".to_string(),
            intensity: 0.9,
            certainty: None,
        })
    }
}

/// Generalizer replaying a scripted sequence of responses.
///
/// Each call pops the front entry; `Err(detail)` entries become collaborator
/// failures. An exhausted script also fails.
pub struct ScriptedGeneralizer {
    responses: Mutex<VecDeque<Result<GeneralizationDraft, String>>>,
}

impl ScriptedGeneralizer {
    /// Create from a response script.
    pub fn new(responses: impl IntoIterator<Item = Result<GeneralizationDraft, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    /// Remaining scripted responses.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl Generalizer for ScriptedGeneralizer {
    async fn generalize(
        &self,
        _request: GeneralizationRequest,
        _cancel: &CancellationToken,
    ) -> EngineResult<GeneralizationDraft> {
        let next = self.responses.lock().pop_front();
        match next {
            Some(Ok(draft)) => Ok(draft),
            Some(Err(detail)) => Err(EngineError::CollaboratorFailure {
                who: Collaborator::Generalizer,
                detail,
            }),
            None => Err(EngineError::CollaboratorFailure {
                who: Collaborator::Generalizer,
                detail: "script exhausted".to_string(),
            }),
        }
    }
}

/// Generalizer that always fails.
#[derive(Debug, Default)]
pub struct FailingGeneralizer;

#[async_trait]
impl Generalizer for FailingGeneralizer {
    async fn generalize(
        &self,
        _request: GeneralizationRequest,
        _cancel: &CancellationToken,
    ) -> EngineResult<GeneralizationDraft> {
        Err(EngineError::CollaboratorFailure {
            who: Collaborator::Generalizer,
            detail: "stubbed failure".to_string(),
        })
    }
}

// =========================================================================
// Clock stub
// =========================================================================

/// Manually-steered clock for tests.
///
/// Cloning shares the underlying instant, so a test can keep a handle while
/// the engine holds the trait object.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at the given instant.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Start at the wall-clock now.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Advance by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_embedder_is_deterministic() {
        let embedder = StubEmbedder::new();
        let cancel = CancellationToken::new();
        let a = embedder.embed("same text", &cancel).await.expect("embed");
        let b = embedder.embed("same text", &cancel).await.expect("embed");
        assert_eq!(a, b);

        let c = embedder.embed("other text", &cancel).await.expect("embed");
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_stub_embedder_is_normalized() {
        let embedder = StubEmbedder::with_dimension(64);
        let cancel = CancellationToken::new();
        let v = embedder.embed("normalize me", &cancel).await.expect("embed");
        assert_eq!(v.len(), 64);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001, "magnitude {}", magnitude);
    }

    #[tokio::test]
    async fn test_scripted_generalizer_pops_in_order() {
        let generalizer = ScriptedGeneralizer::new([
            Err("first fails".to_string()),
            Ok(GeneralizationDraft {
                description: "ok".to_string(),
                rule: "rule".to_string(),
                nodes: vec![],
                edges: vec![],
                emotion: "neutral".to_string(),
                intensity: 0.5,
                certainty: None,
            }),
        ]);
        let request = GeneralizationRequest {
            target_level: crate::types::Level::Generalization,
            descriptions: vec![],
            rules: vec![],
            node_union: vec![],
        };
        let cancel = CancellationToken::new();

        assert!(generalizer
            .generalize(request.clone(), &cancel)
            .await
            .is_err());
        assert!(generalizer.generalize(request, &cancel).await.is_ok());
        assert_eq!(generalizer.remaining(), 0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::hours(5));
        assert_eq!(clock.now() - start, Duration::hours(5));
    }
}
