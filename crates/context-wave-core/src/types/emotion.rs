//! Canonical emotion labels and the normalization pipeline.
//!
//! Emotions are a closed enum: free-form phrases never persist. Raw input is
//! normalized in stages (exact match, alias table, compound split scanning
//! for a canonical token, synonym keyword scan) and anything unrecognized
//! collapses to [`Emotion::Neutral`].

use serde::{Deserialize, Serialize};

/// The canonical emotion set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Pride,
    Curiosity,
    Warmth,
    Relief,
    Awe,
    Flow,
    Neutral,
    Frustration,
    Loneliness,
    Hurt,
    Fear,
    Sadness,
    Anger,
    Disgust,
    Surprise,
    Resolve,
    Longing,
}

/// Valence class of an emotion.
///
/// Positive and negative emotions partially match each other within their
/// class during resonance scoring; `Neutral` and `Surprise` each form their
/// own class and only match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
    Surprise,
}

/// Every canonical emotion, in declaration order.
pub const ALL_EMOTIONS: [Emotion; 18] = [
    Emotion::Joy,
    Emotion::Pride,
    Emotion::Curiosity,
    Emotion::Warmth,
    Emotion::Relief,
    Emotion::Awe,
    Emotion::Flow,
    Emotion::Neutral,
    Emotion::Frustration,
    Emotion::Loneliness,
    Emotion::Hurt,
    Emotion::Fear,
    Emotion::Sadness,
    Emotion::Anger,
    Emotion::Disgust,
    Emotion::Surprise,
    Emotion::Resolve,
    Emotion::Longing,
];

/// Alias and synonym table: surface token -> canonical emotion.
///
/// Extends the canonical set with the variants observed in stored raw
/// emotion strings. Compound phrases such as "existential dread" are split
/// and each token scanned against this table, so "dread", "doubt", and
/// "anxiety" all land on `Fear`.
const ALIASES: &[(&str, Emotion)] = &[
    ("happy", Emotion::Joy),
    ("happiness", Emotion::Joy),
    ("satisfaction", Emotion::Joy),
    ("satisfied", Emotion::Joy),
    ("proud", Emotion::Pride),
    ("curious", Emotion::Curiosity),
    ("interest", Emotion::Curiosity),
    ("interested", Emotion::Curiosity),
    ("wonder", Emotion::Curiosity),
    ("warm", Emotion::Warmth),
    ("gratitude", Emotion::Warmth),
    ("grateful", Emotion::Warmth),
    ("love", Emotion::Warmth),
    ("tenderness", Emotion::Warmth),
    ("humbled", Emotion::Warmth),
    ("relieved", Emotion::Relief),
    ("amazement", Emotion::Awe),
    ("amazed", Emotion::Awe),
    ("frustrated", Emotion::Frustration),
    ("lonely", Emotion::Loneliness),
    ("alone", Emotion::Loneliness),
    ("isolation", Emotion::Loneliness),
    ("pain", Emotion::Hurt),
    ("stung", Emotion::Hurt),
    ("wounded", Emotion::Hurt),
    ("shame", Emotion::Hurt),
    ("ashamed", Emotion::Hurt),
    ("guilt", Emotion::Hurt),
    ("embarrassment", Emotion::Hurt),
    ("afraid", Emotion::Fear),
    ("scared", Emotion::Fear),
    ("dread", Emotion::Fear),
    ("doubt", Emotion::Fear),
    ("anxiety", Emotion::Fear),
    ("anxious", Emotion::Fear),
    ("worry", Emotion::Fear),
    ("worried", Emotion::Fear),
    ("terror", Emotion::Fear),
    ("panic", Emotion::Fear),
    ("sad", Emotion::Sadness),
    ("grief", Emotion::Sadness),
    ("sorrow", Emotion::Sadness),
    ("melancholy", Emotion::Sadness),
    ("angry", Emotion::Anger),
    ("rage", Emotion::Anger),
    ("fury", Emotion::Anger),
    ("irritation", Emotion::Anger),
    ("annoyed", Emotion::Anger),
    ("disgusted", Emotion::Disgust),
    ("revulsion", Emotion::Disgust),
    ("surprised", Emotion::Surprise),
    ("shocked", Emotion::Surprise),
    ("shock", Emotion::Surprise),
    ("startled", Emotion::Surprise),
    ("determined", Emotion::Resolve),
    ("determination", Emotion::Resolve),
    ("resolved", Emotion::Resolve),
    ("yearning", Emotion::Longing),
    ("nostalgia", Emotion::Longing),
    ("missing", Emotion::Longing),
    ("calm", Emotion::Neutral),
    ("still", Emotion::Neutral),
    ("settled", Emotion::Neutral),
];

impl Emotion {
    /// Canonical lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Pride => "pride",
            Emotion::Curiosity => "curiosity",
            Emotion::Warmth => "warmth",
            Emotion::Relief => "relief",
            Emotion::Awe => "awe",
            Emotion::Flow => "flow",
            Emotion::Neutral => "neutral",
            Emotion::Frustration => "frustration",
            Emotion::Loneliness => "loneliness",
            Emotion::Hurt => "hurt",
            Emotion::Fear => "fear",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Disgust => "disgust",
            Emotion::Surprise => "surprise",
            Emotion::Resolve => "resolve",
            Emotion::Longing => "longing",
        }
    }

    /// Valence class of this emotion.
    pub fn valence(&self) -> Valence {
        match self {
            Emotion::Joy
            | Emotion::Pride
            | Emotion::Curiosity
            | Emotion::Warmth
            | Emotion::Relief
            | Emotion::Awe
            | Emotion::Flow
            | Emotion::Resolve
            | Emotion::Longing => Valence::Positive,
            Emotion::Frustration
            | Emotion::Loneliness
            | Emotion::Hurt
            | Emotion::Fear
            | Emotion::Sadness
            | Emotion::Anger
            | Emotion::Disgust => Valence::Negative,
            Emotion::Neutral => Valence::Neutral,
            Emotion::Surprise => Valence::Surprise,
        }
    }

    /// Signed valence used by entity-valence profiles: +1 for positive
    /// emotions, -1 for negative ones, 0 for neutral and surprise.
    pub fn signed_valence(&self) -> f32 {
        match self.valence() {
            Valence::Positive => 1.0,
            Valence::Negative => -1.0,
            Valence::Neutral | Valence::Surprise => 0.0,
        }
    }

    /// Exact canonical-label lookup on an already-lowercased token.
    fn from_canonical(token: &str) -> Option<Emotion> {
        ALL_EMOTIONS.iter().copied().find(|e| e.as_str() == token)
    }

    /// Alias-table lookup on an already-lowercased token.
    fn from_alias(token: &str) -> Option<Emotion> {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == token)
            .map(|(_, emotion)| *emotion)
    }

    /// Normalize a raw emotion string to a canonical emotion.
    ///
    /// Pipeline: exact match, then alias table, then a compound split on
    /// whitespace/punctuation scanning for any canonical token, then the
    /// same scan against the alias table, else `Neutral`.
    ///
    /// # Example
    ///
    /// ```
    /// use context_wave_core::types::Emotion;
    ///
    /// assert_eq!(Emotion::normalize("hurt"), Emotion::Hurt);
    /// assert_eq!(Emotion::normalize("Existential dread"), Emotion::Fear);
    /// assert_eq!(Emotion::normalize("quiet flow, almost trance"), Emotion::Flow);
    /// assert_eq!(Emotion::normalize("???"), Emotion::Neutral);
    /// ```
    pub fn normalize(raw: &str) -> Emotion {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return Emotion::Neutral;
        }

        if let Some(emotion) = Self::from_canonical(&lowered) {
            return emotion;
        }
        if let Some(emotion) = Self::from_alias(&lowered) {
            return emotion;
        }

        let tokens: Vec<&str> = lowered
            .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
            .filter(|t| !t.is_empty())
            .collect();

        for token in &tokens {
            if let Some(emotion) = Self::from_canonical(token) {
                return emotion;
            }
        }
        for token in &tokens {
            if let Some(emotion) = Self::from_alias(token) {
                return emotion;
            }
        }

        Emotion::Neutral
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Emotion {
    fn default() -> Self {
        Emotion::Neutral
    }
}
