//! Shared fixtures for integration tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use context_wave_core::engine::WaveEngine;
use context_wave_core::stubs::{ManualClock, StubEmbedder, SyntheticGeneralizer};
use context_wave_core::traits::{Embedder, Generalizer};
use context_wave_core::types::{ContextDraft, GraphNode};
use context_wave_core::EngineConfig;

/// A manual clock anchored at a fixed instant.
pub fn manual_clock() -> ManualClock {
    ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap())
}

/// Engine with deterministic stub collaborators and the given clock.
pub fn engine(clock: &ManualClock) -> WaveEngine {
    engine_with(
        clock,
        Arc::new(StubEmbedder::new()),
        Arc::new(SyntheticGeneralizer::new()),
    )
}

/// Engine with explicit collaborators.
pub fn engine_with(
    clock: &ManualClock,
    embedder: Arc<dyn Embedder>,
    generalizer: Arc<dyn Generalizer>,
) -> WaveEngine {
    WaveEngine::new(
        EngineConfig::default(),
        embedder,
        generalizer,
        Arc::new(clock.clone()),
    )
}

/// A level-0 draft over named nodes.
pub fn episode(description: &str, nodes: &[&str]) -> ContextDraft {
    ContextDraft::new(description)
        .with_nodes(nodes.iter().map(|n| GraphNode::named(*n)))
        .with_emotion("neutral")
}
