// ============================================================================
// Sentiment Classification
// ============================================================================
//
// Contract: classify(text) -> POSITIVE | NEGATIVE | NEUTRAL
// - total and deterministic
// - empty / whitespace-only text is NEUTRAL
// - polarity > 0.1 is POSITIVE, polarity < -0.1 is NEGATIVE, anything
//   in between (boundaries included) is NEUTRAL
//
// ============================================================================

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Polarity must exceed this magnitude to leave NEUTRAL
pub const POLARITY_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Map a polarity score in [-1.0, 1.0] onto a label.
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > POLARITY_THRESHOLD {
            Sentiment::Positive
        } else if polarity < -POLARITY_THRESHOLD {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "POSITIVE" => Ok(Sentiment::Positive),
            "NEGATIVE" => Ok(Sentiment::Negative),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            other => anyhow::bail!("unknown sentiment label {:?}", other),
        }
    }
}

/// Maps free text to a sentiment label.
///
/// Implementations are expected to be total. The `Result` exists so that a
/// misbehaving implementation (e.g. a remote model) surfaces as a processing
/// failure instead of a panic.
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Sentiment>;
}

// ============================================================================
// Lexicon classifier
// ============================================================================

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        // positive
        ("love", 0.5),
        ("loved", 0.7),
        ("loves", 0.5),
        ("like", 0.2),
        ("liked", 0.3),
        ("good", 0.7),
        ("great", 0.8),
        ("nice", 0.6),
        ("excellent", 1.0),
        ("amazing", 0.6),
        ("awesome", 1.0),
        ("fantastic", 0.4),
        ("wonderful", 1.0),
        ("perfect", 1.0),
        ("best", 1.0),
        ("better", 0.5),
        ("happy", 0.8),
        ("pleased", 0.5),
        ("satisfied", 0.5),
        ("recommend", 0.4),
        ("recommended", 0.4),
        ("beautiful", 0.85),
        ("fast", 0.2),
        ("easy", 0.43),
        ("sturdy", 0.3),
        ("comfortable", 0.4),
        ("reliable", 0.4),
        ("worth", 0.3),
        ("fine", 0.4),
        ("solid", 0.3),
        ("superb", 1.0),
        ("delighted", 0.7),
        // negative
        ("bad", -0.7),
        ("worse", -0.4),
        ("worst", -1.0),
        ("terrible", -1.0),
        ("awful", -1.0),
        ("horrible", -1.0),
        ("hate", -0.8),
        ("hated", -0.9),
        ("poor", -0.4),
        ("broken", -0.4),
        ("broke", -0.4),
        ("disappointed", -0.75),
        ("disappointing", -0.6),
        ("useless", -0.5),
        ("cheap", -0.2),
        ("slow", -0.3),
        ("waste", -0.2),
        ("refund", -0.2),
        ("defective", -0.6),
        ("angry", -0.5),
        ("annoying", -0.8),
        ("sad", -0.5),
        ("unhappy", -0.6),
        ("flimsy", -0.5),
        ("faulty", -0.5),
        ("garbage", -0.8),
        ("junk", -0.6),
        ("mediocre", -0.3),
    ])
});

static INTENSIFIERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("very", 1.3),
        ("really", 1.2),
        ("extremely", 1.5),
        ("super", 1.3),
        ("so", 1.2),
        ("totally", 1.3),
        ("absolutely", 1.4),
        ("quite", 1.1),
        ("somewhat", 0.7),
        ("slightly", 0.5),
    ])
});

// Apostrophes are stripped during tokenization, so "don't" arrives as "dont"
const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "nor", "hardly", "dont", "doesnt", "didnt", "isnt",
    "arent", "wasnt", "werent", "cant", "couldnt", "wouldnt", "shouldnt", "wont", "havent",
    "hasnt", "aint",
];

/// Scale applied to a negated sentiment word
const NEGATION_FACTOR: f64 = -0.5;

/// Tokens a pending negation survives without meeting a sentiment word
const NEGATION_WINDOW: usize = 3;

/// Dictionary-based classifier.
///
/// Each known word contributes its lexicon score, optionally scaled by a
/// preceding intensifier and flipped by a preceding negation. The polarity
/// of the text is the mean of the contributions, clamped to [-1.0, 1.0].
#[derive(Debug, Default, Clone)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Polarity in [-1.0, 1.0]; 0.0 when no sentiment-bearing word is found.
    pub fn polarity(&self, text: &str) -> f64 {
        let mut scores = Vec::new();
        let mut negation_ttl = 0usize;
        let mut intensity = 1.0;

        for token in tokenize(text) {
            if is_negator(&token) {
                negation_ttl = NEGATION_WINDOW;
                continue;
            }

            if let Some(factor) = INTENSIFIERS.get(token.as_str()) {
                intensity *= factor;
                continue;
            }

            if let Some(score) = LEXICON.get(token.as_str()) {
                let mut value = score * intensity;
                if negation_ttl > 0 {
                    value *= NEGATION_FACTOR;
                }
                scores.push(value.clamp(-1.0, 1.0));
                negation_ttl = 0;
                intensity = 1.0;
                continue;
            }

            negation_ttl = negation_ttl.saturating_sub(1);
            intensity = 1.0;
        }

        if scores.is_empty() {
            return 0.0;
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        mean.clamp(-1.0, 1.0)
    }
}

impl SentimentClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Result<Sentiment> {
        if text.trim().is_empty() {
            return Ok(Sentiment::Neutral);
        }
        Ok(Sentiment::from_polarity(self.polarity(text)))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase().replace('\'', ""))
        .filter(|t| !t.is_empty())
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token)
}
