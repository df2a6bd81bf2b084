//! Regional scorer
//!
//! Turns per-region metrics into a ranked, tiered list with budget shares.
//!
//! # Algorithm
//! 1. Each field is normalized to [0, 100] against the largest value of that
//!    field in the run (negative values clamp to 0; a field whose maximum is
//!    not positive contributes 0).
//! 2. A region's total is the weighted mean over the fields it actually has.
//!    Weights of absent fields are redistributed proportionally, so a region
//!    is never penalized for a source that did not report on it.
//! 3. Regions sort by total (desc), then growth (desc, absent last), then
//!    region code (asc).
//! 4. Budget shares are proportional to totals, in tenths of a percent
//!    summing to exactly 100. Shares are floored and the leftover tenths go
//!    to the largest fractional parts, earlier rank first. All-zero totals
//!    split evenly.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::advisory::region_recommendation;
use crate::config::{ScoreWeights, TierBands};
use crate::error::{PlannerError, PlannerResult};
use crate::models::{MetricField, RegionMetric, RegionRanking, ScoreComponent, Tier};

/// Budget shares are computed in tenths of a percent
const SHARE_UNITS: i64 = 1000;

#[derive(Debug, Clone)]
pub struct RegionalScorer {
    weights: ScoreWeights,
    bands: TierBands,
}

impl RegionalScorer {
    pub fn new(weights: ScoreWeights, bands: TierBands) -> PlannerResult<Self> {
        weights.validate()?;
        bands.validate()?;
        Ok(Self { weights, bands })
    }

    /// Tier for a total score
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.bands.a {
            Tier::A
        } else if score >= self.bands.b {
            Tier::B
        } else if score >= self.bands.c {
            Tier::C
        } else {
            Tier::D
        }
    }

    /// Rank regions
    ///
    /// Empty input yields an empty ranking. Duplicate region codes are
    /// rejected.
    pub fn score(&self, metrics: &[RegionMetric]) -> PlannerResult<Vec<RegionRanking>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        for metric in metrics {
            if !seen.insert(&metric.region_code) {
                return Err(PlannerError::InvalidInput(format!(
                    "duplicate region {} in metrics",
                    metric.region_code
                )));
            }
        }

        let maxima = field_maxima(metrics);
        let mut scored: Vec<(RegionRanking, Option<f64>)> = metrics
            .iter()
            .map(|metric| {
                (
                    self.score_region(metric, &maxima),
                    metric.field(MetricField::Growth),
                )
            })
            .collect();

        scored.sort_by(|(a, growth_a), (b, growth_b)| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| compare_growth_desc(*growth_a, *growth_b))
                .then_with(|| a.region_code.cmp(&b.region_code))
        });

        let mut rankings: Vec<RegionRanking> = scored.into_iter().map(|(r, _)| r).collect();
        for (i, ranking) in rankings.iter_mut().enumerate() {
            ranking.rank = i + 1;
        }

        allocate_budget(&mut rankings)?;

        for ranking in &rankings {
            debug!(
                region = %ranking.region_code,
                score = ranking.total_score,
                tier = %ranking.tier,
                budget_pct = ranking.budget_pct,
                "Region scored"
            );
        }

        Ok(rankings)
    }

    fn score_region(
        &self,
        metric: &RegionMetric,
        maxima: &BTreeMap<MetricField, f64>,
    ) -> RegionRanking {
        let present: Vec<(MetricField, f64)> = MetricField::ALL
            .iter()
            .filter_map(|f| metric.field(*f).map(|v| (*f, v)))
            .collect();
        let missing: Vec<MetricField> = MetricField::ALL
            .iter()
            .copied()
            .filter(|f| metric.field(*f).is_none())
            .collect();

        let weight_sum: f64 = present.iter().map(|(f, _)| self.weights.get(*f)).sum();

        let components: Vec<ScoreComponent> = present
            .iter()
            .map(|(field, raw)| {
                let max = maxima.get(field).copied().unwrap_or(0.0);
                let effective_weight = if weight_sum > 0.0 {
                    self.weights.get(*field) / weight_sum
                } else {
                    0.0
                };
                ScoreComponent {
                    field: *field,
                    raw: *raw,
                    normalized: normalize(*raw, max),
                    effective_weight,
                }
            })
            .collect();

        let total: f64 = components
            .iter()
            .map(|c| c.normalized * c.effective_weight)
            .sum();
        let total_score = round_to(total.clamp(0.0, 100.0), 2);
        let tier = self.tier_for(total_score);

        RegionRanking {
            rank: 0,
            region_code: metric.region_code.clone(),
            total_score,
            tier,
            budget_pct: 0.0,
            rationale: rationale(tier, total_score, &components, &missing),
            recommendation: region_recommendation(
                tier,
                &metric.region_code,
                metric.field(MetricField::Growth),
            ),
            components,
            missing_fields: missing,
            evidence_refs: sorted_refs(metric),
        }
    }
}

fn field_maxima(metrics: &[RegionMetric]) -> BTreeMap<MetricField, f64> {
    let mut maxima = BTreeMap::new();
    for field in MetricField::ALL {
        let max = metrics
            .iter()
            .filter_map(|m| m.field(field))
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() {
            maxima.insert(field, max);
        }
    }
    maxima
}

/// Scale `value` into [0, 100] against `max`
fn normalize(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    (value.max(0.0) / max * 100.0).clamp(0.0, 100.0)
}

fn compare_growth_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Split 100% across rankings in tenths of a percent, by largest remainder
fn allocate_budget(rankings: &mut [RegionRanking]) -> PlannerResult<()> {
    if rankings.is_empty() {
        return Ok(());
    }

    let total: f64 = rankings.iter().map(|r| r.total_score).sum();
    let count = rankings.len() as f64;
    let exact: Vec<f64> = rankings
        .iter()
        .map(|r| {
            let share = if total > 0.0 {
                r.total_score / total
            } else {
                1.0 / count
            };
            share * SHARE_UNITS as f64
        })
        .collect();
    let mut units: Vec<i64> = exact.iter().map(|e| e.floor() as i64).collect();

    // Leftover tenths go to the largest fractional parts, earlier rank first
    let leftover = (SHARE_UNITS - units.iter().sum::<i64>()).max(0) as usize;
    let mut order: Vec<usize> = (0..units.len()).collect();
    order.sort_by(|&a, &b| {
        let frac_a = exact[a] - exact[a].floor();
        let frac_b = exact[b] - exact[b].floor();
        frac_b.total_cmp(&frac_a).then(a.cmp(&b))
    });
    for &i in order.iter().cycle().take(leftover) {
        units[i] += 1;
    }

    if units.iter().any(|u| *u < 0) || units.iter().sum::<i64>() != SHARE_UNITS {
        return Err(PlannerError::invariant(
            "scorer",
            format!("budget shares do not sum to 100: {:?}", units),
        ));
    }

    for (ranking, u) in rankings.iter_mut().zip(units) {
        ranking.budget_pct = u as f64 / 10.0;
    }
    Ok(())
}

fn rationale(
    tier: Tier,
    total: f64,
    components: &[ScoreComponent],
    missing: &[MetricField],
) -> String {
    let mut text = format!("Tier {} (score {:.2})", tier, total);
    if components.is_empty() {
        text.push_str(": no signals available");
        return text;
    }

    let parts: Vec<String> = components
        .iter()
        .map(|c| {
            format!(
                "{} {:.1} x {:.2}",
                c.field, c.normalized, c.effective_weight
            )
        })
        .collect();
    text.push_str(": ");
    text.push_str(&parts.join(", "));

    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|f| f.name()).collect();
        text.push_str(&format!(
            "; missing {} (weight redistributed)",
            names.join(", ")
        ));
    }
    text
}

fn sorted_refs(metric: &RegionMetric) -> Vec<crate::ledger::EvidenceId> {
    let mut refs = metric.evidence_refs.clone();
    refs.sort();
    refs.dedup();
    refs
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
