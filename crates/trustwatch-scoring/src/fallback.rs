//! Lexical fallback scorer for the degraded path.
//!
//! When the classifier is unavailable, mentions are scored from a
//! campaign-domain word lexicon instead of being dropped. The result is a
//! coarse trust score: no bias detection, just keyword-weighted sentiment
//! mapped onto the 0–100 scale.

use std::sync::OnceLock;

use regex::Regex;

/// Campaign-domain word weights.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive, in
/// `[-1.0, 0.0)` are negative. The lexicon sum is clamped to `[-1.0, 1.0]`.
const LEXICON: &[(&str, f64)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("love", 0.5),
    ("loved", 0.5),
    ("best", 0.5),
    ("recommend", 0.4),
    ("quality", 0.3),
    ("reliable", 0.4),
    ("affordable", 0.4),
    ("sustainable", 0.5),
    ("eco-friendly", 0.5),
    ("efficient", 0.4),
    ("innovative", 0.4),
    ("smooth", 0.3),
    ("comfortable", 0.3),
    ("safe", 0.4),
    ("impressive", 0.4),
    // Negative signals
    ("expensive", -0.4),
    ("overpriced", -0.5),
    ("unaffordable", -0.5),
    ("unreliable", -0.6),
    ("recall", -0.7),
    ("breakdown", -0.6),
    ("lawsuit", -0.5),
    ("scam", -0.7),
    ("misleading", -0.6),
    ("dishonest", -0.6),
    ("terrible", -0.6),
    ("worst", -0.6),
    ("bad", -0.4),
    ("problem", -0.3),
    ("concern", -0.3),
    ("warning", -0.4),
    ("overhyped", -0.5),
    ("inconvenient", -0.4),
    ("dangerous", -0.6),
    ("failed", -0.4),
    ("failure", -0.4),
];

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("static regex is valid"))
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex is valid"))
}

/// Strip URLs and HTML tags so markup never matches lexicon words.
fn preprocess(text: &str) -> String {
    let no_urls = url_pattern().replace_all(text, " ");
    let no_tags = tag_pattern().replace_all(&no_urls, " ");
    no_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keyword-weighted sentiment in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f64 {
    let cleaned = preprocess(text);
    let mut score = 0.0_f64;
    for word in cleaned.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
            .to_lowercase();
        for &(lex_word, weight) in LEXICON {
            if w == lex_word {
                score += weight;
                break;
            }
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Fallback trust score in `[0, 100]`: the lexicon score mapped linearly so
/// that neutral text lands at 50.
#[must_use]
pub fn lexical_trust_score(text: &str) -> f64 {
    (50.0 + lexicon_score(text) * 50.0).clamp(0.0, 100.0)
}
