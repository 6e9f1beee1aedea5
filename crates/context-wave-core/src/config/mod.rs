//! Configuration management for the Context-Wave Memory Engine.

mod sub_configs;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub use sub_configs::{
    ActionPattern, CollaboratorConfig, ConsolidationConfig, ExtractConfig, LoggingConfig,
    ScoringConfig, SelectionConfig, SignalConfig, StoreConfig,
};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from files and environment.
    ///
    /// Sources are layered in order:
    /// 1. `config/default.toml` (base settings)
    /// 2. `config/{CONTEXT_WAVE_ENV}.toml` (environment-specific)
    /// 3. Environment variables with a `CONTEXT_WAVE` prefix
    pub fn load() -> EngineResult<Self> {
        let env = std::env::var("CONTEXT_WAVE_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("CONTEXT_WAVE").separator("__"));

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit TOML file.
    pub fn from_file(path: &std::path::Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> EngineResult<()> {
        fn unit_range(name: &str, value: f32) -> EngineResult<()> {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(EngineError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        }

        unit_range("signal.hunger_threshold", self.signal.hunger_threshold)?;
        if self.signal.max_nodes == 0 {
            return Err(EngineError::Config(
                "signal.max_nodes must be greater than 0".into(),
            ));
        }

        unit_range("scoring.recency_floor", self.scoring.recency_floor)?;
        if self.scoring.recency_window_hours <= 0.0 {
            return Err(EngineError::Config(
                "scoring.recency_window_hours must be positive".into(),
            ));
        }
        if self.scoring.max_resonance < 1.0 {
            return Err(EngineError::Config(
                "scoring.max_resonance must be at least 1.0".into(),
            ));
        }

        if self.selection.working_memory_k == 0 {
            return Err(EngineError::Config(
                "selection.working_memory_k must be greater than 0".into(),
            ));
        }
        if self.selection.candidate_width < self.selection.working_memory_k {
            return Err(EngineError::Config(
                "selection.candidate_width must be at least working_memory_k".into(),
            ));
        }
        if self.selection.per_emotion_cap == 0 {
            return Err(EngineError::Config(
                "selection.per_emotion_cap must be greater than 0".into(),
            ));
        }
        unit_range("selection.mmr_overlap", self.selection.mmr_overlap)?;
        if self.selection.mmr_relax_step <= 0.0 {
            return Err(EngineError::Config(
                "selection.mmr_relax_step must be positive".into(),
            ));
        }

        if self.consolidation.min_cluster < 2 {
            return Err(EngineError::Config(
                "consolidation.min_cluster must be at least 2".into(),
            ));
        }
        if self.consolidation.max_cluster < self.consolidation.min_cluster {
            return Err(EngineError::Config(
                "consolidation.max_cluster must be at least min_cluster".into(),
            ));
        }
        if self.consolidation.min_overlap == 0 {
            return Err(EngineError::Config(
                "consolidation.min_overlap must be greater than 0".into(),
            ));
        }
        unit_range("consolidation.dedup_threshold", self.consolidation.dedup_threshold)?;
        unit_range("consolidation.intensity_cap", self.consolidation.intensity_cap)?;
        unit_range("consolidation.certainty_l1", self.consolidation.certainty_l1)?;
        unit_range("consolidation.certainty_l2", self.consolidation.certainty_l2)?;
        if self.consolidation.merged_node_cap == 0 {
            return Err(EngineError::Config(
                "consolidation.merged_node_cap must be greater than 0".into(),
            ));
        }

        if self.store.max_description_chars == 0 {
            return Err(EngineError::Config(
                "store.max_description_chars must be greater than 0".into(),
            ));
        }
        if self.store.embedding_dimension == 0 {
            return Err(EngineError::Config(
                "store.embedding_dimension must be greater than 0".into(),
            ));
        }

        if self.collaborators.embedder_timeout_ms == 0
            || self.collaborators.generalizer_timeout_ms == 0
        {
            return Err(EngineError::Config(
                "collaborator timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
