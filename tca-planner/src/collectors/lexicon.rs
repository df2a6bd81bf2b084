//! Keyword-ratio sentiment scorer
//!
//! Offline fallback when no model-backed scorer is injected. Compound score
//! is `(positive - negative) / (positive + negative)` over keyword hits, and
//! 0.0 when the text contains no known keyword.

use super::SentimentScorer;

const POSITIVE: &[&str] = &[
    "excited",
    "amazing",
    "love",
    "awesome",
    "incredible",
    "perfect",
    "masterpiece",
    "brilliant",
    "fantastic",
    "stunning",
    "beautiful",
    "epic",
    "can't wait",
    "cant wait",
    "hyped",
    "legendary",
    "phenomenal",
    "outstanding",
    "breathtaking",
    "chills",
    "great",
];

const NEGATIVE: &[&str] = &[
    "disappointed",
    "boring",
    "bad",
    "terrible",
    "awful",
    "hate",
    "worst",
    "poor",
    "weak",
    "underwhelming",
    "overrated",
    "trash",
    "disaster",
    "mess",
    "flop",
    "waste",
    "slow",
    "worried",
];

#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }
}

fn hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

impl SentimentScorer for LexiconSentiment {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    fn compound(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let positive = hits(&lower, POSITIVE);
        let negative = hits(&lower, NEGATIVE);
        let total = positive + negative;
        if total == 0 {
            0.0
        } else {
            (positive as f64 - negative as f64) / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_text() {
        let scorer = LexiconSentiment::new();
        assert_eq!(scorer.compound("This looks absolutely INCREDIBLE, stunning visuals"), 1.0);
    }

    #[test]
    fn test_negative_text() {
        let scorer = LexiconSentiment::new();
        assert_eq!(scorer.compound("Boring and overrated"), -1.0);
    }

    #[test]
    fn test_mixed_text() {
        let scorer = LexiconSentiment::new();
        // great (+1), worried and slow (-2)
        let score = scorer.compound("Looks great but I'm worried it will be slow");
        assert!((score - (-1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_no_keywords_is_neutral() {
        let scorer = LexiconSentiment::new();
        assert_eq!(scorer.compound("Saw the trailer on Tuesday"), 0.0);
        assert_eq!(scorer.compound(""), 0.0);
    }
}
