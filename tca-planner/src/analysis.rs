//! Signal analysis
//!
//! Pure functions deriving scored metrics from raw collector output:
//! engagement rates, like-weighted comment sentiment, series momentum and
//! spike detection.

use serde::{Deserialize, Serialize};

use crate::collectors::{Comment, EngagementReport, SentimentScorer, SeriesPoint};
use crate::scorer::round_to;

/// Compound scores at or beyond this magnitude are polar
const POLARITY_THRESHOLD: f64 = 0.05;
const EXCERPT_CHARS: usize = 200;
const TOP_EXCERPTS: usize = 3;
const MOMENTUM_WINDOW: usize = 7;
const MIN_MOMENTUM_POINTS: usize = 3;
const MIN_SPIKE_POINTS: usize = 5;

// ============================================================================
// Engagement
// ============================================================================

/// `(likes + comments) / views * 100`; `None` without views
pub fn engagement_rate(report: &EngagementReport) -> Option<f64> {
    if report.view_count == 0 {
        return None;
    }
    let interactions = (report.like_count + report.comment_count) as f64;
    Some(round_to(interactions / report.view_count as f64 * 100.0, 4))
}

// ============================================================================
// Sentiment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POLARITY_THRESHOLD {
            SentimentLabel::Positive
        } else if compound <= -POLARITY_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

/// Like-weighted share of each label, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentExcerpt {
    pub comment_id: String,
    pub excerpt: String,
    pub compound: f64,
    pub like_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total_comments: usize,
    pub analyzed_comments: usize,
    pub overall: SentimentLabel,
    /// Like-weighted mean compound score
    pub average_compound: f64,
    pub distribution: SentimentDistribution,
    pub top_positive: Vec<CommentExcerpt>,
    pub top_negative: Vec<CommentExcerpt>,
    pub scorer: String,
}

/// Score every comment and aggregate, weighting each by `likes + 1`
///
/// Returns `None` when no comment has text to score.
pub fn summarize_sentiment(
    comments: &[Comment],
    scorer: &dyn SentimentScorer,
) -> Option<SentimentSummary> {
    let scored: Vec<(&Comment, f64)> = comments
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| {
            let compound = scorer.compound(&c.text);
            let compound = if compound.is_nan() {
                0.0
            } else {
                compound.clamp(-1.0, 1.0)
            };
            (c, compound)
        })
        .collect();

    if scored.is_empty() {
        return None;
    }

    let mut total_weight = 0.0;
    let mut weighted_compound = 0.0;
    let (mut positive, mut neutral, mut negative) = (0.0, 0.0, 0.0);
    for (comment, compound) in &scored {
        let weight = comment.like_count as f64 + 1.0;
        total_weight += weight;
        weighted_compound += compound * weight;
        match SentimentLabel::from_compound(*compound) {
            SentimentLabel::Positive => positive += weight,
            SentimentLabel::Neutral => neutral += weight,
            SentimentLabel::Negative => negative += weight,
        }
    }

    let average = weighted_compound / total_weight;
    let pct = |w: f64| round_to(w / total_weight * 100.0, 1);

    let mut ranked = scored.clone();
    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.total_cmp(sa)
            .then_with(|| b.like_count.cmp(&a.like_count))
    });
    let top_positive = ranked
        .iter()
        .filter(|(_, s)| SentimentLabel::from_compound(*s) == SentimentLabel::Positive)
        .take(TOP_EXCERPTS)
        .map(|(c, s)| excerpt(c, *s))
        .collect();
    let top_negative = ranked
        .iter()
        .rev()
        .filter(|(_, s)| SentimentLabel::from_compound(*s) == SentimentLabel::Negative)
        .take(TOP_EXCERPTS)
        .map(|(c, s)| excerpt(c, *s))
        .collect();

    Some(SentimentSummary {
        total_comments: comments.len(),
        analyzed_comments: scored.len(),
        overall: SentimentLabel::from_compound(average),
        average_compound: round_to(average, 3),
        distribution: SentimentDistribution {
            positive: pct(positive),
            neutral: pct(neutral),
            negative: pct(negative),
        },
        top_positive,
        top_negative,
        scorer: scorer.name().to_string(),
    })
}

fn excerpt(comment: &Comment, compound: f64) -> CommentExcerpt {
    CommentExcerpt {
        comment_id: comment.comment_id.clone(),
        excerpt: comment.text.chars().take(EXCERPT_CHARS).collect(),
        compound: round_to(compound, 3),
        like_count: comment.like_count,
    }
}

// ============================================================================
// Time series
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumLabel {
    Accelerating,
    Declining,
    Stable,
    GradualChange,
}

impl MomentumLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            MomentumLabel::Accelerating => "accelerating",
            MomentumLabel::Declining => "declining",
            MomentumLabel::Stable => "stable",
            MomentumLabel::GradualChange => "gradual_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Upward,
    Downward,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    pub label: MomentumLabel,
    pub direction: TrendDirection,
    /// Recent vs older window, percent; 0 when the older average is not positive
    pub change_pct: f64,
    pub recent_average: f64,
    pub older_average: f64,
    pub peak: f64,
    pub current: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sorted_values(series: &[SeriesPoint]) -> Vec<f64> {
    let mut points = series.to_vec();
    points.sort_by_key(|p| p.date);
    points
        .into_iter()
        .map(|p| p.value)
        .filter(|v| v.is_finite())
        .collect()
}

/// Compare the last week of a series with the week before it
///
/// With 7-13 points the older window is the first 7; with fewer than 7 the
/// series is split in half. Fewer than 3 points is not enough to judge.
pub fn detect_momentum(series: &[SeriesPoint]) -> Option<Momentum> {
    let values = sorted_values(series);
    let n = values.len();
    if n < MIN_MOMENTUM_POINTS {
        return None;
    }

    let (recent, older) = if n >= 2 * MOMENTUM_WINDOW {
        (
            &values[n - MOMENTUM_WINDOW..],
            &values[n - 2 * MOMENTUM_WINDOW..n - MOMENTUM_WINDOW],
        )
    } else if n >= MOMENTUM_WINDOW {
        (&values[n - MOMENTUM_WINDOW..], &values[..MOMENTUM_WINDOW])
    } else {
        (&values[n / 2..], &values[..n / 2])
    };

    let recent_average = mean(recent);
    let older_average = mean(older);
    let change_pct = if older_average > 0.0 {
        (recent_average - older_average) / older_average * 100.0
    } else {
        0.0
    };

    let label = if change_pct > 15.0 {
        MomentumLabel::Accelerating
    } else if change_pct < -15.0 {
        MomentumLabel::Declining
    } else if change_pct.abs() < 5.0 {
        MomentumLabel::Stable
    } else {
        MomentumLabel::GradualChange
    };

    let first_half = mean(&values[..n / 2]);
    let second_half = mean(&values[n / 2..]);
    let direction = if second_half > first_half * 1.1 {
        TrendDirection::Upward
    } else if second_half < first_half * 0.9 {
        TrendDirection::Downward
    } else {
        TrendDirection::Flat
    };

    Some(Momentum {
        label,
        direction,
        change_pct: round_to(change_pct, 2),
        recent_average: round_to(recent_average, 2),
        older_average: round_to(older_average, 2),
        peak: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        current: values[n - 1],
    })
}

/// Fractional change of a series (0.25 = +25%)
///
/// `None` when momentum cannot be judged or the older window averages zero.
pub fn growth_rate(series: &[SeriesPoint]) -> Option<f64> {
    let momentum = detect_momentum(series)?;
    if momentum.older_average <= 0.0 {
        return None;
    }
    Some(round_to(momentum.change_pct / 100.0, 4))
}

/// Percent change of a series; same windows as [`growth_rate`]
pub fn percent_change(series: &[SeriesPoint]) -> Option<f64> {
    growth_rate(series).map(|g| round_to(g * 100.0, 2))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub point: SeriesPoint,
    /// Standard deviations above the mean
    pub deviation: f64,
    pub pct_above_mean: f64,
}

/// Points at or above `mean + threshold * stdev`, largest first
///
/// Needs at least 5 points and a non-zero spread.
pub fn detect_spikes(series: &[SeriesPoint], threshold: f64) -> Vec<Spike> {
    let points: Vec<SeriesPoint> = series.iter().copied().filter(|p| p.value.is_finite()).collect();
    if points.len() < MIN_SPIKE_POINTS {
        return Vec::new();
    }

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let avg = mean(&values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return Vec::new();
    }

    let cutoff = avg + threshold * stdev;
    let mut spikes: Vec<Spike> = points
        .into_iter()
        .filter(|p| p.value >= cutoff)
        .map(|p| Spike {
            deviation: round_to((p.value - avg) / stdev, 2),
            pct_above_mean: if avg != 0.0 {
                round_to((p.value / avg - 1.0) * 100.0, 1)
            } else {
                0.0
            },
            point: p,
        })
        .collect();
    spikes.sort_by(|a, b| b.point.value.total_cmp(&a.point.value));
    spikes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::LexiconSentiment;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                date: start + Duration::days(i as i64),
                value: *v,
            })
            .collect()
    }

    fn comment(id: &str, text: &str, likes: u64) -> Comment {
        Comment {
            comment_id: id.to_string(),
            text: text.to_string(),
            like_count: likes,
        }
    }

    #[test]
    fn test_engagement_rate() {
        let report = EngagementReport {
            source_ref: "video".to_string(),
            view_count: 10_000,
            like_count: 450,
            comment_count: 50,
            comments: Vec::new(),
            regional_engagement: BTreeMap::new(),
        };
        assert_eq!(engagement_rate(&report), Some(5.0));

        let silent = EngagementReport {
            view_count: 0,
            ..report
        };
        assert_eq!(engagement_rate(&silent), None);
    }

    #[test]
    fn test_sentiment_weighted_by_likes() {
        let comments = vec![
            comment("a", "Amazing, stunning work", 99),
            comment("b", "Boring and terrible", 0),
            comment("c", "Saw it on Tuesday", 0),
            comment("d", "   ", 500),
        ];
        let summary = summarize_sentiment(&comments, &LexiconSentiment::new()).unwrap();

        assert_eq!(summary.total_comments, 4);
        assert_eq!(summary.analyzed_comments, 3);
        // (1.0 * 100 - 1.0 * 1 + 0 * 1) / 102
        assert_eq!(summary.average_compound, 0.971);
        assert_eq!(summary.overall, SentimentLabel::Positive);
        assert_eq!(summary.distribution.positive, 98.0);
        assert_eq!(summary.distribution.negative, 1.0);
        assert_eq!(summary.distribution.neutral, 1.0);
        assert_eq!(summary.top_positive[0].comment_id, "a");
        assert_eq!(summary.top_negative[0].comment_id, "b");
        assert_eq!(summary.scorer, "lexicon");
    }

    #[test]
    fn test_sentiment_without_text_is_none() {
        assert!(summarize_sentiment(&[], &LexiconSentiment::new()).is_none());
        assert!(summarize_sentiment(&[comment("x", "", 3)], &LexiconSentiment::new()).is_none());
    }

    #[test]
    fn test_sentiment_labels_at_threshold() {
        assert_eq!(SentimentLabel::from_compound(0.05), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_compound(0.049), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_compound(-0.05), SentimentLabel::Negative);
    }

    #[test]
    fn test_momentum_uses_last_two_weeks() {
        // 14 points: older week averages 10, recent week averages 13
        let mut values = vec![10.0; 7];
        values.extend(vec![13.0; 7]);
        let momentum = detect_momentum(&series(&values)).unwrap();

        assert_eq!(momentum.change_pct, 30.0);
        assert_eq!(momentum.label, MomentumLabel::Accelerating);
        assert_eq!(momentum.direction, TrendDirection::Upward);
        assert_eq!(momentum.current, 13.0);
        assert_eq!(growth_rate(&series(&values)), Some(0.3));
        assert_eq!(percent_change(&series(&values)), Some(30.0));
    }

    #[test]
    fn test_momentum_short_series_splits_in_half() {
        let momentum = detect_momentum(&series(&[20.0, 20.0, 18.0, 17.0])).unwrap();
        // older [20, 20] = 20, recent [18, 17] = 17.5
        assert_eq!(momentum.change_pct, -12.5);
        assert_eq!(momentum.label, MomentumLabel::GradualChange);
    }

    #[test]
    fn test_momentum_sorts_by_date() {
        let mut points = series(&[10.0, 10.0, 10.0, 20.0, 20.0, 20.0]);
        points.reverse();
        let momentum = detect_momentum(&points).unwrap();
        assert_eq!(momentum.change_pct, 100.0);
        assert_eq!(momentum.current, 20.0);
    }

    #[test]
    fn test_momentum_needs_three_points() {
        assert!(detect_momentum(&series(&[1.0, 2.0])).is_none());
        assert!(growth_rate(&series(&[1.0, 2.0])).is_none());
    }

    #[test]
    fn test_flat_series_is_stable() {
        let momentum = detect_momentum(&series(&[50.0; 10])).unwrap();
        assert_eq!(momentum.label, MomentumLabel::Stable);
        assert_eq!(momentum.direction, TrendDirection::Flat);
    }

    #[test]
    fn test_zero_baseline_has_no_growth_rate() {
        assert!(growth_rate(&series(&[0.0, 0.0, 0.0, 5.0])).is_none());
    }

    #[test]
    fn test_detect_spikes() {
        let spikes = detect_spikes(&series(&[10.0, 11.0, 9.0, 10.0, 10.0, 11.0, 9.0, 40.0]), 2.0);
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].point.value, 40.0);
        assert!(spikes[0].deviation >= 2.0);
    }

    #[test]
    fn test_spikes_need_five_points_and_spread() {
        assert!(detect_spikes(&series(&[1.0, 100.0, 1.0, 1.0]), 2.0).is_empty());
        assert!(detect_spikes(&series(&[5.0; 8]), 2.0).is_empty());
    }
}
