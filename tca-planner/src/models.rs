//! Campaign data model
//!
//! Everything a run produces is a plain serde value so a finished campaign
//! can be written to disk and read back without the pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::analysis::SentimentSummary;
use crate::collectors::MovieMetadata;
use crate::ledger::{EvidenceId, LedgerSnapshot};

// ============================================================================
// Regions and metrics
// ============================================================================

/// ISO-style region code, always upper-case
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    /// Normalize a caller-supplied code (trimmed, upper-cased)
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Scored metric fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Engagement,
    Interest,
    Growth,
    Pageview,
}

impl MetricField {
    pub const ALL: [MetricField; 4] = [
        MetricField::Engagement,
        MetricField::Interest,
        MetricField::Growth,
        MetricField::Pageview,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricField::Engagement => "engagement",
            MetricField::Interest => "interest",
            MetricField::Growth => "growth",
            MetricField::Pageview => "pageview",
        }
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw signals for one region
///
/// Any field may be absent when its source was skipped or had no data for
/// the region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetric {
    pub region_code: RegionCode,
    pub engagement_score: Option<f64>,
    pub interest_score: Option<f64>,
    /// Fractional change of the interest series (0.25 = +25%)
    pub growth_rate: Option<f64>,
    /// Percent change of the pageview series
    pub pageview_delta: Option<f64>,
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceId>,
}

impl RegionMetric {
    /// Metric with every field absent
    pub fn new(region_code: RegionCode) -> Self {
        Self {
            region_code,
            engagement_score: None,
            interest_score: None,
            growth_rate: None,
            pageview_delta: None,
            evidence_refs: Vec::new(),
        }
    }

    pub fn with_engagement(mut self, value: f64) -> Self {
        self.engagement_score = Some(value);
        self
    }

    pub fn with_interest(mut self, value: f64) -> Self {
        self.interest_score = Some(value);
        self
    }

    pub fn with_growth(mut self, value: f64) -> Self {
        self.growth_rate = Some(value);
        self
    }

    pub fn with_pageview_delta(mut self, value: f64) -> Self {
        self.pageview_delta = Some(value);
        self
    }

    /// Value of a field, ignoring non-finite numbers
    pub fn field(&self, field: MetricField) -> Option<f64> {
        let value = match field {
            MetricField::Engagement => self.engagement_score,
            MetricField::Interest => self.interest_score,
            MetricField::Growth => self.growth_rate,
            MetricField::Pageview => self.pageview_delta,
        };
        value.filter(|v| v.is_finite())
    }
}

// ============================================================================
// Rankings
// ============================================================================

/// Priority tier derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
        };
        f.write_str(s)
    }
}

/// Contribution of one present field to a total score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub field: MetricField,
    pub raw: f64,
    /// Scaled to [0, 100] against the run maximum
    pub normalized: f64,
    /// Weight after redistribution over the present fields
    pub effective_weight: f64,
}

/// Ranked, tiered region with its budget share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRanking {
    /// 1-based position in the ranking
    pub rank: usize,
    pub region_code: RegionCode,
    /// [0, 100], two decimals
    pub total_score: f64,
    pub tier: Tier,
    /// [0, 100], one decimal; shares across a run sum to exactly 100
    pub budget_pct: f64,
    pub rationale: String,
    /// Campaign guidance for this region
    #[serde(default)]
    pub recommendation: String,
    pub components: Vec<ScoreComponent>,
    pub missing_fields: Vec<MetricField>,
    pub evidence_refs: Vec<EvidenceId>,
}

// ============================================================================
// Rollout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intensity::Low => "low",
            Intensity::Medium => "medium",
            Intensity::High => "high",
        };
        f.write_str(s)
    }
}

/// One rollout phase; date range is inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based
    pub index: usize,
    pub name: String,
    pub regions: BTreeSet<RegionCode>,
    pub intensity: Intensity,
    pub budget_pct: f64,
    pub budget_amount: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub evidence_refs: Vec<EvidenceId>,
}

impl Phase {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Dated marker; ordered by date, then label
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Milestone {
    pub date: NaiveDate,
    pub label: String,
}

impl Milestone {
    pub fn new(date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            date,
            label: label.into(),
        }
    }
}

/// Budget allocated to one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAllocation {
    pub region_code: RegionCode,
    pub tier: Tier,
    pub budget_pct: f64,
    pub budget_amount: f64,
    /// The region's recommendation
    #[serde(default)]
    pub justification: String,
}

/// One calendar week of the campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineWeek {
    /// 1-based
    pub week: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weeks_to_release: i64,
    pub phase_index: Option<usize>,
    pub intensity: Option<Intensity>,
    pub active_regions: Vec<RegionCode>,
    pub activities: Vec<String>,
}

/// Everything the rollout planner derives from a ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPlan {
    pub campaign_start: NaiveDate,
    pub release_date: NaiveDate,
    pub phases: Vec<Phase>,
    pub milestones: Vec<Milestone>,
    pub allocations: Vec<RegionAllocation>,
    pub timeline: Vec<TimelineWeek>,
    /// Regions that no phase admits
    pub dropped_regions: Vec<RegionCode>,
    pub strategy: RolloutStrategy,
}

impl RolloutPlan {
    pub fn empty(campaign_start: NaiveDate, release_date: NaiveDate) -> Self {
        Self {
            campaign_start,
            release_date,
            phases: Vec::new(),
            milestones: Vec::new(),
            allocations: Vec::new(),
            timeline: Vec::new(),
            dropped_regions: Vec::new(),
            strategy: RolloutStrategy::default(),
        }
    }
}

/// Suggested channel mix for the regions of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPlan {
    pub tier: Tier,
    pub regions: Vec<RegionCode>,
    pub channels: Vec<String>,
    pub investment_level: String,
}

/// Language group covering the most target regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationPriority {
    pub language: String,
    /// Covered regions in rank order
    pub markets: Vec<RegionCode>,
}

/// Advisory notes on how to run the rollout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutStrategy {
    pub recommendations: Vec<String>,
    /// Regions whose interest is growing fastest, in rank order
    pub growth_markets: Vec<RegionCode>,
    pub localization: Option<LocalizationPriority>,
    pub channels: Vec<ChannelPlan>,
}

// ============================================================================
// Stages and run status
// ============================================================================

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Engagement,
    Sentiment,
    Trend,
    Pageview,
    Scoring,
    Rollout,
    Creative,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Engagement => "engagement",
            Stage::Sentiment => "sentiment",
            Stage::Trend => "trend",
            Stage::Pageview => "pageview",
            Stage::Scoring => "scoring",
            Stage::Rollout => "rollout",
            Stage::Creative => "creative",
        }
    }

    /// A mandatory stage that does not complete fails the whole run
    pub fn is_mandatory(self) -> bool {
        matches!(self, Stage::Metadata | Stage::Rollout)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a stage produced no output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Per-stage deadline elapsed
    Timeout { after_ms: u64 },
    SourceUnavailable { detail: String },
    /// Still rate limited after the retry
    RateLimited { attempts: u32 },
    /// Source answered but had nothing
    Empty,
    /// A stage this one depends on did not complete
    UpstreamSkipped { upstream: Stage },
    /// No provider is configured for the source
    NotConfigured,
    /// Overall run deadline exhausted
    RunDeadline,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Timeout { after_ms } => write!(f, "timeout after {}ms", after_ms),
            SkipReason::SourceUnavailable { detail } => write!(f, "source unavailable: {}", detail),
            SkipReason::RateLimited { attempts } => {
                write!(f, "rate limited ({} attempts)", attempts)
            }
            SkipReason::Empty => f.write_str("source returned no data"),
            SkipReason::UpstreamSkipped { upstream } => {
                write!(f, "upstream stage {} did not complete", upstream)
            }
            SkipReason::NotConfigured => f.write_str("no provider configured"),
            SkipReason::RunDeadline => f.write_str("run deadline exhausted"),
            SkipReason::Cancelled => f.write_str("run cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }
}

/// Terminal state of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub reason: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStage {
    pub stage: Stage,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedDegraded,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedDegraded => "completed_degraded",
            RunStatus::Failed => "failed",
        }
    }
}

// ============================================================================
// Campaign documents
// ============================================================================

/// Request as the pipeline understood it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEcho {
    pub trailer_reference: String,
    pub movie_reference: String,
    pub target_regions: Vec<RegionCode>,
    pub budget: f64,
    pub release_date: NaiveDate,
    pub campaign_start: NaiveDate,
    pub duration_weeks: u32,
}

/// Pointer from a campaign to its evidence ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRef {
    pub run_id: Uuid,
    pub entry_count: usize,
}

/// The decision document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub input_echo: InputEcho,
    pub movie: MovieMetadata,
    pub sentiment: Option<SentimentSummary>,
    pub region_metrics: Vec<RegionMetric>,
    pub region_rankings: Vec<RegionRanking>,
    pub phases: Vec<Phase>,
    pub milestones: Vec<Milestone>,
    pub budget_allocations: Vec<RegionAllocation>,
    pub timeline: Vec<TimelineWeek>,
    pub dropped_regions: Vec<RegionCode>,
    #[serde(default)]
    pub strategy: RolloutStrategy,
    #[serde(default)]
    pub insights: CampaignInsights,
    /// Opaque output of the creative generator
    pub creative_assets: Option<serde_json::Value>,
    pub stage_reports: Vec<StageReport>,
    pub skipped_stages: Vec<SkippedStage>,
    pub evidence_ledger_ref: LedgerRef,
}

/// Headline findings, recommendations and warnings for a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignInsights {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
}

/// A campaign together with the ledger backing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub campaign: Campaign,
    pub evidence_ledger: LedgerSnapshot,
}

/// What is left of a run whose mandatory stage failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialCampaign {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub input_echo: InputEcho,
    pub failed_stage: Stage,
    pub reason: String,
    pub stage_reports: Vec<StageReport>,
    pub skipped_stages: Vec<SkippedStage>,
    pub evidence_ledger: LedgerSnapshot,
}

/// Terminal result of a pipeline run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<CampaignRecord>),
    Failed(Box<PartialCampaign>),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(record) => record.campaign.status,
            RunOutcome::Failed(partial) => partial.status,
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            RunOutcome::Completed(record) => record.campaign.run_id,
            RunOutcome::Failed(partial) => partial.run_id,
        }
    }

    pub fn stage_reports(&self) -> &[StageReport] {
        match self {
            RunOutcome::Completed(record) => &record.campaign.stage_reports,
            RunOutcome::Failed(partial) => &partial.stage_reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_code_normalizes() {
        assert_eq!(RegionCode::new(" gb ").as_str(), "GB");
        assert_eq!(RegionCode::from("us"), RegionCode::new("US"));
        assert_eq!(serde_json::to_string(&RegionCode::new("fr")).unwrap(), "\"FR\"");
    }

    #[test]
    fn test_metric_field_ignores_non_finite() {
        let metric = RegionMetric::new("US".into())
            .with_engagement(f64::NAN)
            .with_interest(42.0);
        assert_eq!(metric.field(MetricField::Engagement), None);
        assert_eq!(metric.field(MetricField::Interest), Some(42.0));
        assert_eq!(metric.field(MetricField::Growth), None);
    }

    #[test]
    fn test_milestones_order_by_date_then_label() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 5, day).unwrap();
        let mut milestones = vec![
            Milestone::new(d(10), "b"),
            Milestone::new(d(3), "z"),
            Milestone::new(d(10), "a"),
        ];
        milestones.sort();
        let labels: Vec<_> = milestones.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_skip_reason_serialization() {
        let json = serde_json::to_value(SkipReason::Timeout { after_ms: 1500 }).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["after_ms"], 1500);

        let json = serde_json::to_value(SkipReason::UpstreamSkipped {
            upstream: Stage::Engagement,
        })
        .unwrap();
        assert_eq!(json["upstream"], "engagement");
    }

    #[test]
    fn test_mandatory_stages() {
        assert!(Stage::Metadata.is_mandatory());
        assert!(Stage::Rollout.is_mandatory());
        assert!(!Stage::Trend.is_mandatory());
        assert!(!Stage::Creative.is_mandatory());
    }

    #[test]
    fn test_run_status_names() {
        assert_eq!(RunStatus::CompletedDegraded.as_str(), "completed_degraded");
        assert_eq!(
            serde_json::to_value(RunStatus::CompletedDegraded).unwrap(),
            "completed_degraded"
        );
    }
}
