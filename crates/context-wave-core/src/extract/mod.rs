//! Rule-based experience extraction: drafts a context from a completed
//! experience without calling out to a language model.
//!
//! The cheap fallback path for the write pipeline. A configured entity-role
//! map finds participants, verb-trigger patterns produce edges between
//! role-matched participants, appraisal lines of the form
//! `EMOTION: name | INTENSITY: 0.7 | ...` carry the emotion, and outcome
//! keywords vote on the result.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ExtractConfig;
use crate::types::{ContextDraft, GraphEdge, GraphNode, Outcome};

/// A completed experience: what happened, what the appraisal modules said,
/// what was decided, how it ended.
#[derive(Debug, Clone, Default)]
pub struct ExperienceRecord {
    /// The triggering event.
    pub stimulus: String,
    /// Signals keyed by module name; the `APPRAISER` entry may carry a
    /// structured emotion line.
    pub signals: BTreeMap<String, String>,
    /// The decision taken.
    pub decision: String,
    /// The observed outcome.
    pub outcome: String,
}

/// Drafts contexts from experience records using configured heuristics.
#[derive(Debug, Clone)]
pub struct ExperienceExtractor {
    config: ExtractConfig,
}

impl ExperienceExtractor {
    /// Create an extractor over the given configuration.
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Draft a level-0 context from an experience record.
    pub fn draft(&self, record: &ExperienceRecord) -> ContextDraft {
        let full_text = format!(
            "{} {} {}",
            record.stimulus, record.decision, record.outcome
        )
        .to_lowercase();

        // Participants: configured entities found in the text, plus the
        // self entity whenever first-person words appear (or nothing else
        // was found).
        let mut entities: Vec<(String, String)> = Vec::new();
        for (name, role) in &self.config.entity_roles {
            if full_text.contains(&name.to_lowercase()) {
                entities.push((name.clone(), role.clone()));
            }
        }
        let first_person = full_text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .any(|w| matches!(w, "i" | "my" | "me" | "myself"));
        let has_self = entities.iter().any(|(n, _)| *n == self.config.self_entity);
        if (first_person || entities.is_empty()) && !has_self {
            entities.push((self.config.self_entity.clone(), self.config.self_role.clone()));
        }

        let nodes: Vec<GraphNode> = entities
            .iter()
            .map(|(name, role)| GraphNode::with_role(name.clone(), role.clone()))
            .collect();

        // Edges: trigger words pick a pattern; the first entities carrying
        // the pattern's roles become the endpoints.
        let mut edges: Vec<GraphEdge> = Vec::new();
        for pattern in &self.config.action_patterns {
            if !pattern.triggers.iter().any(|t| full_text.contains(t)) {
                continue;
            }
            let source = entities
                .iter()
                .find(|(_, role)| *role == pattern.source_role)
                .map(|(name, _)| name.clone());
            let target = entities
                .iter()
                .find(|(_, role)| *role == pattern.target_role)
                .map(|(name, _)| name.clone());
            if let (Some(source), Some(target)) = (source, target) {
                if source != target
                    && !edges
                        .iter()
                        .any(|e| e.source == source && e.target == target && e.relation == pattern.relation)
                {
                    edges.push(GraphEdge::new(source, target, pattern.relation.clone()));
                }
            }
        }

        let (emotion, intensity) = parse_appraisal(record.signals.get("APPRAISER"));
        let result = self.infer_result(&record.outcome);

        let description = compose_description(record);

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            emotion = %emotion,
            result = %result,
            "Extracted context draft from experience"
        );

        ContextDraft::new(description)
            .with_nodes(nodes)
            .with_edges(edges)
            .with_emotion(emotion)
            .with_intensity(intensity)
            .with_result(result)
    }

    /// Count outcome keyword votes; ties stay neutral.
    fn infer_result(&self, outcome: &str) -> Outcome {
        let lowered = outcome.to_lowercase();
        let votes = |markers: &[String]| markers.iter().filter(|m| lowered.contains(m.as_str())).count();

        let complex = votes(&self.config.complex_markers);
        if complex > 0 {
            return Outcome::Complex;
        }
        let positive = votes(&self.config.positive_markers);
        let negative = votes(&self.config.negative_markers);
        if negative > positive {
            Outcome::Negative
        } else if positive > negative {
            Outcome::Positive
        } else {
            Outcome::Neutral
        }
    }
}

/// Parse an `EMOTION: name | INTENSITY: 0.7 | ...` appraisal line. Missing
/// or malformed parts fall back to a neutral reading.
fn parse_appraisal(signal: Option<&String>) -> (String, f32) {
    let Some(signal) = signal else {
        return ("neutral".to_string(), 0.5);
    };

    let mut emotion = "neutral".to_string();
    let mut intensity = 0.5;

    for part in signal.split('|') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("EMOTION:") {
            let value = value.trim();
            if !value.is_empty() {
                emotion = value.to_lowercase();
            }
        } else if let Some(value) = part.strip_prefix("INTENSITY:") {
            if let Ok(parsed) = value.trim().parse::<f32>() {
                intensity = parsed.clamp(0.0, 1.0);
            }
        }
    }

    (emotion, intensity)
}

/// Compose a bounded description: stimulus, decision, outcome.
fn compose_description(record: &ExperienceRecord) -> String {
    let clip = |text: &str, at: usize| -> String {
        if text.chars().count() <= at {
            text.to_string()
        } else {
            text.chars().take(at).collect()
        }
    };
    let description = format!(
        "{} -> {} -> {}",
        clip(record.stimulus.trim(), 140),
        clip(record.decision.trim(), 70),
        clip(record.outcome.trim(), 70)
    );
    clip(&description, 300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Emotion;

    fn config_with_entities() -> ExtractConfig {
        let mut config = ExtractConfig::default();
        config.self_entity = "Kai".to_string();
        config.entity_roles.insert("Egor".to_string(), "person".to_string());
        config.entity_roles.insert("Kai".to_string(), "self".to_string());
        config.entity_roles.insert("retriever".to_string(), "artifact".to_string());
        config
    }

    fn record() -> ExperienceRecord {
        let mut signals = BTreeMap::new();
        signals.insert(
            "APPRAISER".to_string(),
            "EMOTION: shame | INTENSITY: 0.7 | REASON: basic mistake".to_string(),
        );
        ExperienceRecord {
            stimulus: "Egor criticized the hardcoded password in the retriever".to_string(),
            signals,
            decision: "I rewrote the history to remove it".to_string(),
            outcome: "Fixed. Verified zero matches.".to_string(),
        }
    }

    #[test]
    fn test_entities_and_self_detection() {
        let extractor = ExperienceExtractor::new(config_with_entities());
        let draft = extractor.draft(&record());
        let names: Vec<&str> = draft.nodes.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"Egor"));
        assert!(names.contains(&"Kai"));
        assert!(names.contains(&"retriever"));
    }

    #[test]
    fn test_edges_from_action_patterns() {
        let extractor = ExperienceExtractor::new(config_with_entities());
        let draft = extractor.draft(&record());
        // "criticized" triggers person -> self; "fixed" triggers
        // self -> artifact.
        assert!(draft
            .edges
            .iter()
            .any(|e| e.source == "Egor" && e.target == "Kai" && e.relation == "criticized"));
        assert!(draft
            .edges
            .iter()
            .any(|e| e.source == "Kai" && e.target == "retriever" && e.relation == "fixed"));
    }

    #[test]
    fn test_appraisal_line_parsing() {
        let extractor = ExperienceExtractor::new(config_with_entities());
        let draft = extractor.draft(&record());
        assert_eq!(draft.emotion, "shame");
        assert!((draft.intensity - 0.7).abs() < 1e-6);
        // The store normalizes "shame" on write.
        assert_eq!(Emotion::normalize(&draft.emotion), Emotion::Hurt);
    }

    #[test]
    fn test_malformed_appraisal_falls_back() {
        let extractor = ExperienceExtractor::new(config_with_entities());
        let mut r = record();
        r.signals.insert("APPRAISER".to_string(), "gibberish".to_string());
        let draft = extractor.draft(&r);
        assert_eq!(draft.emotion, "neutral");
        assert!((draft.intensity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_result_votes() {
        let extractor = ExperienceExtractor::new(config_with_entities());

        let mut r = record();
        r.outcome = "it worked, deploy is live".to_string();
        assert_eq!(extractor.draft(&r).result, Outcome::Positive);

        r.outcome = "failed with an error, everything broke".to_string();
        assert_eq!(extractor.draft(&r).result, Outcome::Negative);

        r.outcome = "mixed results, real tension remains".to_string();
        assert_eq!(extractor.draft(&r).result, Outcome::Complex);

        r.outcome = "nothing notable".to_string();
        assert_eq!(extractor.draft(&r).result, Outcome::Neutral);
    }

    #[test]
    fn test_self_only_when_no_entities_found() {
        let extractor = ExperienceExtractor::new(ExtractConfig::default());
        let r = ExperienceRecord {
            stimulus: "an uneventful tick".to_string(),
            ..Default::default()
        };
        let draft = extractor.draft(&r);
        assert_eq!(draft.nodes.len(), 1);
        assert_eq!(draft.nodes[0].name, "Self");
    }

    #[test]
    fn test_description_is_bounded() {
        let extractor = ExperienceExtractor::new(config_with_entities());
        let r = ExperienceRecord {
            stimulus: "s".repeat(500),
            decision: "d".repeat(500),
            outcome: "o".repeat(500),
            ..Default::default()
        };
        let draft = extractor.draft(&r);
        assert!(draft.description.chars().count() <= 300);
    }
}
