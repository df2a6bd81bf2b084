//! Decision policy configuration
//!
//! The `[policy]` table of the bootstrap TOML file. Every field has a
//! compiled default, so an empty or missing table yields the stock policy:
//!
//! ```toml
//! [policy]
//! duration_weeks = 6
//!
//! [policy.weights]
//! engagement = 0.3
//! interest = 0.3
//! growth = 0.2
//! pageview = 0.2
//!
//! [policy.tier_bands]
//! a = 80.0
//! b = 65.0
//! c = 50.0
//!
//! [policy.deadlines]
//! trend_ms = 10000
//! run_ms = 60000
//! ```
//!
//! Policy is validated once when the pipeline is built; nothing downstream
//! re-checks it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{PlannerError, PlannerResult};
use crate::models::{Intensity, MetricField, Stage};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Complete decision policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Campaign length used when a request does not name one
    pub duration_weeks: u32,
    pub weights: ScoreWeights,
    pub tier_bands: TierBands,
    pub rollout: RolloutPolicy,
    pub deadlines: DeadlinePolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            duration_weeks: 6,
            weights: ScoreWeights::default(),
            tier_bands: TierBands::default(),
            rollout: RolloutPolicy::default(),
            deadlines: DeadlinePolicy::default(),
        }
    }
}

impl PolicyConfig {
    /// Interpret a raw `[policy]` table and validate it
    pub fn from_table(table: &toml::Table) -> PlannerResult<Self> {
        let policy: PolicyConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| PlannerError::InvalidPolicy(e.to_string()))?;
        policy.validate()?;
        debug!(
            duration_weeks = policy.duration_weeks,
            run_deadline_ms = policy.deadlines.run_ms,
            "Policy loaded"
        );
        Ok(policy)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.duration_weeks == 0 {
            return Err(PlannerError::InvalidPolicy(
                "duration_weeks must be at least 1".to_string(),
            ));
        }
        self.weights.validate()?;
        self.tier_bands.validate()?;
        self.rollout.validate()?;
        self.deadlines.validate()
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Relative importance of each metric field; must sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub engagement: f64,
    pub interest: f64,
    pub growth: f64,
    pub pageview: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            engagement: 0.3,
            interest: 0.3,
            growth: 0.2,
            pageview: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, field: MetricField) -> f64 {
        match field {
            MetricField::Engagement => self.engagement,
            MetricField::Interest => self.interest,
            MetricField::Growth => self.growth,
            MetricField::Pageview => self.pageview,
        }
    }

    pub fn validate(&self) -> PlannerResult<()> {
        for field in MetricField::ALL {
            let w = self.get(field);
            if !w.is_finite() || w < 0.0 {
                return Err(PlannerError::InvalidPolicy(format!(
                    "weight for {} must be a non-negative number, got {}",
                    field, w
                )));
            }
        }
        let sum: f64 = MetricField::ALL.iter().map(|f| self.get(*f)).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PlannerError::InvalidPolicy(format!(
                "score weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        Ok(())
    }
}

/// Lower bounds of tiers A, B and C; anything below `c` is tier D
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBands {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            a: 80.0,
            b: 65.0,
            c: 50.0,
        }
    }
}

impl TierBands {
    pub fn validate(&self) -> PlannerResult<()> {
        let ordered = self.a <= 100.0 && self.a > self.b && self.b > self.c && self.c >= 0.0;
        if !ordered {
            return Err(PlannerError::InvalidPolicy(format!(
                "tier bands must satisfy 100 >= a > b > c >= 0, got a={} b={} c={}",
                self.a, self.b, self.c
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Rollout
// ============================================================================

/// Names, budget split and intensity for a plan with a given phase count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseLayout {
    pub names: Vec<String>,
    /// Percent of total budget per phase; sums to 100
    pub budget_split: Vec<f64>,
    pub intensities: Vec<Intensity>,
}

impl PhaseLayout {
    fn new(names: &[&str], budget_split: &[f64], intensities: &[Intensity]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            budget_split: budget_split.to_vec(),
            intensities: intensities.to_vec(),
        }
    }

    pub fn phase_count(&self) -> usize {
        self.names.len()
    }

    fn validate(&self, expected: usize, key: &str) -> PlannerResult<()> {
        if self.names.len() != expected
            || self.budget_split.len() != expected
            || self.intensities.len() != expected
        {
            return Err(PlannerError::InvalidPolicy(format!(
                "rollout.{} must describe exactly {} phase(s)",
                key, expected
            )));
        }
        if self.budget_split.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(PlannerError::InvalidPolicy(format!(
                "rollout.{} budget split contains a negative share",
                key
            )));
        }
        let sum: f64 = self.budget_split.iter().sum();
        if (sum - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(PlannerError::InvalidPolicy(format!(
                "rollout.{} budget split must sum to 100, got {}",
                key, sum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutPolicy {
    /// Campaigns shorter than this many weeks get a single phase
    pub single_phase_below_weeks: u32,
    /// Campaigns shorter than this many weeks get two phases
    pub two_phase_below_weeks: u32,
    pub one_phase: PhaseLayout,
    pub two_phase: PhaseLayout,
    pub three_phase: PhaseLayout,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            single_phase_below_weeks: 2,
            two_phase_below_weeks: 4,
            one_phase: PhaseLayout::new(&["Primary Launch"], &[100.0], &[Intensity::High]),
            two_phase: PhaseLayout::new(
                &["Primary Launch", "Final Push"],
                &[60.0, 40.0],
                &[Intensity::High, Intensity::Medium],
            ),
            three_phase: PhaseLayout::new(
                &["Primary Launch", "Expansion", "Final Push"],
                &[50.0, 30.0, 20.0],
                &[Intensity::High, Intensity::Medium, Intensity::Low],
            ),
        }
    }
}

impl RolloutPolicy {
    /// Phase count for a campaign duration
    pub fn phase_count(&self, duration_weeks: u32) -> usize {
        if duration_weeks < self.single_phase_below_weeks {
            1
        } else if duration_weeks < self.two_phase_below_weeks {
            2
        } else {
            3
        }
    }

    /// Layout for 1, 2 or 3 phases (larger counts use the 3-phase layout)
    pub fn layout(&self, phase_count: usize) -> &PhaseLayout {
        match phase_count {
            0 | 1 => &self.one_phase,
            2 => &self.two_phase,
            _ => &self.three_phase,
        }
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.single_phase_below_weeks > self.two_phase_below_weeks {
            return Err(PlannerError::InvalidPolicy(
                "single_phase_below_weeks must not exceed two_phase_below_weeks".to_string(),
            ));
        }
        self.one_phase.validate(1, "one_phase")?;
        self.two_phase.validate(2, "two_phase")?;
        self.three_phase.validate(3, "three_phase")
    }
}

// ============================================================================
// Deadlines
// ============================================================================

/// Per-stage and overall deadlines in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlinePolicy {
    pub metadata_ms: u64,
    pub engagement_ms: u64,
    pub sentiment_ms: u64,
    pub trend_ms: u64,
    pub pageview_ms: u64,
    pub creative_ms: u64,
    /// Whole-run budget; stages never run past it
    pub run_ms: u64,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            metadata_ms: 15_000,
            engagement_ms: 15_000,
            sentiment_ms: 15_000,
            trend_ms: 15_000,
            pageview_ms: 15_000,
            creative_ms: 15_000,
            run_ms: 60_000,
        }
    }
}

impl DeadlinePolicy {
    /// Deadline for one stage; local stages are bounded by the run deadline only
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let ms = match stage {
            Stage::Metadata => self.metadata_ms,
            Stage::Engagement => self.engagement_ms,
            Stage::Sentiment => self.sentiment_ms,
            Stage::Trend => self.trend_ms,
            Stage::Pageview => self.pageview_ms,
            Stage::Creative => self.creative_ms,
            Stage::Scoring | Stage::Rollout => self.run_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn run(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        let all = [
            ("metadata_ms", self.metadata_ms),
            ("engagement_ms", self.engagement_ms),
            ("sentiment_ms", self.sentiment_ms),
            ("trend_ms", self.trend_ms),
            ("pageview_ms", self.pageview_ms),
            ("creative_ms", self.creative_ms),
            ("run_ms", self.run_ms),
        ];
        if let Some((name, _)) = all.iter().find(|(_, ms)| *ms == 0) {
            return Err(PlannerError::InvalidPolicy(format!(
                "deadlines.{} must be greater than zero",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(content: &str) -> toml::Table {
        content.parse::<toml::Table>().unwrap()
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = PolicyConfig::default();
        policy.validate().unwrap();
        assert_eq!(policy.duration_weeks, 6);
        assert_eq!(policy.rollout.three_phase.budget_split, vec![50.0, 30.0, 20.0]);
    }

    #[test]
    fn test_empty_table_gives_defaults() {
        let policy = PolicyConfig::from_table(&toml::Table::new()).unwrap();
        assert_eq!(policy, PolicyConfig::default());
    }

    #[test]
    fn test_partial_table_overrides_only_named_fields() {
        let policy = PolicyConfig::from_table(&table(
            r#"
            duration_weeks = 8

            [weights]
            engagement = 0.4
            interest = 0.4
            growth = 0.2
            pageview = 0.0

            [deadlines]
            trend_ms = 250
            "#,
        ))
        .unwrap();

        assert_eq!(policy.duration_weeks, 8);
        assert_eq!(policy.weights.engagement, 0.4);
        assert_eq!(policy.weights.pageview, 0.0);
        assert_eq!(policy.deadlines.for_stage(Stage::Trend), Duration::from_millis(250));
        assert_eq!(policy.deadlines.metadata_ms, 15_000);
        assert_eq!(policy.tier_bands, TierBands::default());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = PolicyConfig::from_table(&table(
            r#"
            [weights]
            engagement = 0.9
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidPolicy(_)));
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoreWeights {
            engagement: 1.2,
            interest: -0.2,
            growth: 0.0,
            pageview: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_tier_bands_must_descend() {
        let bands = TierBands {
            a: 60.0,
            b: 65.0,
            c: 50.0,
        };
        assert!(bands.validate().is_err());
    }

    #[test]
    fn test_phase_layout_split_must_sum_to_100() {
        let mut policy = RolloutPolicy::default();
        policy.three_phase.budget_split = vec![50.0, 30.0, 30.0];
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_phase_count_thresholds() {
        let policy = RolloutPolicy::default();
        assert_eq!(policy.phase_count(0), 1);
        assert_eq!(policy.phase_count(1), 1);
        assert_eq!(policy.phase_count(2), 2);
        assert_eq!(policy.phase_count(3), 2);
        assert_eq!(policy.phase_count(4), 3);
        assert_eq!(policy.phase_count(12), 3);
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let err = PolicyConfig::from_table(&table(
            r#"
            [deadlines]
            run_ms = 0
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("deadlines.run_ms"));
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let err = PolicyConfig::from_table(&table("duration_weeks = \"six\"")).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidPolicy(_)));
    }
}
