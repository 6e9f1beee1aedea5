//! WaveEngine: the narrow operation surface callers see.
//!
//! Owns the store, the pure pipeline stages (signal builder, scorer,
//! selector), and the injected collaborators. The retrieval path runs
//! against an immutable snapshot; writes and consolidation go through the
//! store's single writer. The embedder and generalizer are the only
//! suspension points, always under a deadline and a cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::consolidate::{
    ConsolidationBudget, ConsolidationState, ConsolidationStats, Consolidator,
};
use crate::error::{Collaborator, EngineError, EngineResult};
use crate::extract::{ExperienceExtractor, ExperienceRecord};
use crate::scoring::ResonanceScorer;
use crate::selection::{DiversitySelector, RetrievalOptions};
use crate::signal::SignalBuilder;
use crate::store::{ContextStore, StoreStats};
use crate::traits::{Clock, Embedder, Generalizer};
use crate::types::{
    ContextDraft, ContextId, Retrieval, RetrievalDiagnostic, Situation, WaveSignal,
};

/// The Context-Wave Memory Engine.
pub struct WaveEngine {
    config: EngineConfig,
    store: Arc<ContextStore>,
    embedder: Arc<dyn Embedder>,
    generalizer: Arc<dyn Generalizer>,
    clock: Arc<dyn Clock>,
    signal_builder: SignalBuilder,
    scorer: ResonanceScorer,
    selector: DiversitySelector,
    extractor: ExperienceExtractor,
    consolidator: Consolidator,
    consolidation_state: tokio::sync::Mutex<ConsolidationState>,
}

impl WaveEngine {
    /// Assemble an engine from configuration and injected collaborators.
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        generalizer: Arc<dyn Generalizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(ContextStore::new(&config, clock.clone()));
        Self {
            signal_builder: SignalBuilder::new(config.signal.clone()),
            scorer: ResonanceScorer::new(config.scoring.clone()),
            selector: DiversitySelector::new(config.selection.clone()),
            extractor: ExperienceExtractor::new(config.extract.clone()),
            consolidator: Consolidator::new(config.consolidation.clone(), &config.collaborators),
            consolidation_state: tokio::sync::Mutex::new(ConsolidationState::default()),
            store,
            embedder,
            generalizer,
            clock,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Default retrieval options derived from configuration.
    pub fn default_options(&self) -> RetrievalOptions {
        RetrievalOptions::from_config(&self.config.selection)
    }

    /// Default working-memory bound K.
    pub fn default_k(&self) -> usize {
        self.config.selection.working_memory_k
    }

    /// Write a context draft.
    ///
    /// A draft arriving without an embedding gets one from the embedder;
    /// embedder trouble is recovered locally; the context is stored without
    /// an embedding and simply cannot activate the semantic channel until a
    /// later fill-in.
    pub async fn write(
        &self,
        mut draft: ContextDraft,
        cancel: &CancellationToken,
    ) -> EngineResult<ContextId> {
        if draft.embedding.is_none() && !draft.description.is_empty() {
            match self.embed_text(&draft.description, cancel).await {
                Ok(embedding) => draft.embedding = Some(embedding),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => {
                    warn!(error = %err, "Embedder unavailable; storing without embedding");
                }
            }
        }
        self.store.put(draft)
    }

    /// Draft a context from a completed experience and write it.
    pub async fn write_experience(
        &self,
        record: &ExperienceRecord,
        cancel: &CancellationToken,
    ) -> EngineResult<ContextId> {
        let draft = self.extractor.draft(record);
        self.write(draft, cancel).await
    }

    /// Build the canonical signal for a situation and attach its embedding.
    ///
    /// Embedder trouble disables the semantic channel for this retrieval and
    /// is recorded as a diagnostic; no error surfaces.
    pub async fn build_signal(
        &self,
        situation: &Situation,
        cancel: &CancellationToken,
    ) -> EngineResult<(WaveSignal, Vec<RetrievalDiagnostic>)> {
        let mut signal = self.signal_builder.build(situation);
        let mut diagnostics = Vec::new();

        let text = if situation.narrative.trim().is_empty() {
            situation.focus.join(" ")
        } else {
            situation.narrative.clone()
        };

        if !text.trim().is_empty() {
            match self.embed_text(&text, cancel).await {
                Ok(embedding) => signal.embedding = Some(embedding),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(EngineError::CollaboratorTimeout { who, elapsed_ms }) => {
                    warn!(collaborator = %who, "Embedder timed out; semantic channel inactive");
                    diagnostics.push(RetrievalDiagnostic::CollaboratorTimeout { who, elapsed_ms });
                }
                Err(err) => {
                    warn!(error = %err, "Embedder failed; semantic channel inactive");
                    diagnostics.push(RetrievalDiagnostic::CollaboratorFailure {
                        who: Collaborator::Embedder,
                        detail: err.to_string(),
                    });
                }
            }
        }

        Ok((signal, diagnostics))
    }

    /// Wave retrieval: score a consistent snapshot, then select the slate.
    ///
    /// Deterministic for a fixed snapshot and signal. Cancellation discards
    /// all partial state; no partial slate is ever returned.
    pub fn retrieve(
        &self,
        signal: &WaveSignal,
        k: usize,
        options: &RetrievalOptions,
        cancel: &CancellationToken,
    ) -> EngineResult<Retrieval> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let snapshot = self.store.snapshot(signal.max_level);
        let now = self.clock.now();
        let (scored, diagnostics) = self.scorer.score_snapshot(signal, &snapshot, now);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let slate = self.selector.select(scored, k, options);

        debug!(
            candidates = snapshot.len(),
            slate = slate.len(),
            "Retrieval complete"
        );

        Ok(Retrieval { slate, diagnostics })
    }

    /// Convenience: build the signal for a situation, then retrieve.
    pub async fn retrieve_situation(
        &self,
        situation: &Situation,
        k: usize,
        options: &RetrievalOptions,
        cancel: &CancellationToken,
    ) -> EngineResult<Retrieval> {
        let (signal, mut diagnostics) = self.build_signal(situation, cancel).await?;
        let mut retrieval = self.retrieve(&signal, k, options, cancel)?;
        diagnostics.append(&mut retrieval.diagnostics);
        retrieval.diagnostics = diagnostics;
        Ok(retrieval)
    }

    /// Run one consolidation pass under a budget.
    ///
    /// Passes are serialized with each other; their writes go through the
    /// normal put path and serialize with any other writer. Invoking twice
    /// in succession without new writes yields zero writes on the second
    /// call.
    pub async fn consolidate(
        &self,
        budget: &ConsolidationBudget,
        cancel: &CancellationToken,
    ) -> EngineResult<ConsolidationStats> {
        let mut state = self.consolidation_state.lock().await;
        self.consolidator
            .run(
                &self.store,
                self.generalizer.as_ref(),
                self.clock.as_ref(),
                &mut state,
                budget,
                cancel,
            )
            .await
    }

    /// Aggregate store statistics.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Running emotional valence of an entity over its recent contexts.
    pub fn valence_profile(&self, node: &str, window: usize) -> Option<f32> {
        self.store.valence_profile(node, window)
    }

    /// Embed with the configured deadline, racing cancellation.
    async fn embed_text(&self, text: &str, cancel: &CancellationToken) -> EngineResult<Vec<f32>> {
        let timeout_ms = self.config.collaborators.embedder_timeout_ms;
        let deadline = Duration::from_millis(timeout_ms);

        let embedding = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = tokio::time::timeout(deadline, self.embedder.embed(text, cancel)) => {
                match result {
                    Ok(inner) => inner?,
                    Err(_) => {
                        return Err(EngineError::CollaboratorTimeout {
                            who: Collaborator::Embedder,
                            elapsed_ms: timeout_ms,
                        })
                    }
                }
            }
        };

        if embedding.len() != self.config.store.embedding_dimension {
            return Err(EngineError::CollaboratorFailure {
                who: Collaborator::Embedder,
                detail: format!(
                    "returned dimension {}, expected {}",
                    embedding.len(),
                    self.config.store.embedding_dimension
                ),
            });
        }

        Ok(embedding)
    }
}
