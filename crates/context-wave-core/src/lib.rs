#![deny(deprecated)]

//! Context-Wave Memory Engine
//!
//! A content-addressed associative memory store whose primary operation is
//! wave retrieval: given a heterogeneous query signal, return a small,
//! diverse set of stored contexts ranked by multi-channel resonance, then
//! periodically compact the store by clustering and rule extraction.
//!
//! # Architecture
//!
//! - [`store::ContextStore`] - persistent holder of contexts and inverted
//!   indexes, with invariant enforcement and snapshot-isolated reads.
//! - [`signal::SignalBuilder`] - turns an external situation snapshot into a
//!   canonical wave signal.
//! - [`scoring::ResonanceScorer`] - six-channel resonance with recency,
//!   level, and drive-bias modifiers.
//! - [`selection::DiversitySelector`] - the bounded working-memory slate:
//!   resonance floor, per-emotion cap, MMR over node sets, level fairness.
//! - [`consolidate::Consolidator`] - the off-line pass clustering episodes
//!   into generalizations and principles under strict level caps.
//! - [`engine::WaveEngine`] - the narrow operation surface over all of the
//!   above, with injected collaborators ([`traits::Embedder`],
//!   [`traits::Generalizer`], [`traits::Clock`]).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! use context_wave_core::engine::WaveEngine;
//! use context_wave_core::stubs::{StubEmbedder, SyntheticGeneralizer};
//! use context_wave_core::traits::SystemClock;
//! use context_wave_core::types::{ContextDraft, GraphNode, WaveSignal, Level};
//! use context_wave_core::EngineConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), context_wave_core::EngineError> {
//! let engine = WaveEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(StubEmbedder::new()),
//!     Arc::new(SyntheticGeneralizer::new()),
//!     Arc::new(SystemClock),
//! );
//!
//! let cancel = CancellationToken::new();
//! engine
//!     .write(
//!         ContextDraft::new("Egor praised the new retriever")
//!             .with_nodes([GraphNode::named("Egor"), GraphNode::named("retriever")])
//!             .with_emotion("warmth"),
//!         &cancel,
//!     )
//!     .await?;
//!
//! let signal = WaveSignal::at_level(Level::Principle).with_nodes(["Egor"]);
//! let retrieval = engine.retrieve(&signal, 7, &engine.default_options(), &cancel)?;
//! assert_eq!(retrieval.slate.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod extract;
pub mod scoring;
pub mod selection;
pub mod signal;
pub mod store;
pub mod stubs;
pub mod text;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use engine::WaveEngine;
pub use error::{EngineError, EngineResult};
