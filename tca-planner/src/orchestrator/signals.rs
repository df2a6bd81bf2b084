//! Evidence recording and metric assembly
//!
//! Collector output is written to the ledger as soon as a stage completes,
//! then folded into one `RegionMetric` per target region. Each metric field
//! keeps the evidence ids it was derived from so rankings can be cited field
//! by field.

use chrono::Utc;
use std::collections::BTreeMap;

use crate::analysis::{detect_momentum, detect_spikes, engagement_rate, growth_rate, percent_change};
use crate::collectors::{EngagementReport, MovieMetadata, PageviewReport, TrendReport};
use crate::ledger::{ranking_fact, phase_fact, EvidenceId, EvidenceKind, EvidenceLedger};
use crate::models::{MetricField, Phase, RegionCode, RegionMetric, RegionRanking, Stage};

const MAX_COMMENT_EVIDENCE: usize = 100;
const SPIKE_THRESHOLD: f64 = 2.0;

pub(crate) const MOVIE_TITLE_FACT: &str = "movie/title";
pub(crate) const SENTIMENT_FACT: &str = "sentiment/average_compound";

/// Ledger ids for one engagement report
#[derive(Debug, Clone)]
pub(crate) struct EngagementEvidence {
    pub stats: EvidenceId,
    pub comments: Vec<EvidenceId>,
}

pub(crate) fn record_metadata(ledger: &EvidenceLedger, movie: &MovieMetadata) -> EvidenceId {
    let mut excerpt = format!("Title: {}", movie.title);
    if let Some(date) = movie.release_date {
        excerpt.push_str(&format!("; release {}", date));
    }
    if !movie.genres.is_empty() {
        excerpt.push_str(&format!("; genres {}", movie.genres.join(", ")));
    }
    let id = ledger.record(
        EvidenceKind::Metadata,
        movie.source_ref.clone(),
        excerpt,
        1.0,
        Utc::now(),
    );
    ledger.cite(MOVIE_TITLE_FACT, &[id]);
    id
}

pub(crate) fn record_engagement(
    ledger: &EvidenceLedger,
    report: &EngagementReport,
) -> EngagementEvidence {
    let now = Utc::now();
    let stats = ledger.record(
        EvidenceKind::Metadata,
        report.source_ref.clone(),
        format!(
            "{} views, {} likes, {} comments",
            report.view_count, report.like_count, report.comment_count
        ),
        1.0,
        now,
    );

    let max_likes = report
        .comments
        .iter()
        .map(|c| c.like_count)
        .max()
        .unwrap_or(0) as f64;
    let comments = report
        .comments
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .take(MAX_COMMENT_EVIDENCE)
        .map(|c| {
            ledger.record(
                EvidenceKind::Comment,
                format!("{}#{}", report.source_ref, c.comment_id),
                c.text.chars().take(200).collect::<String>(),
                (c.like_count as f64 + 1.0) / (max_likes + 1.0),
                now,
            )
        })
        .collect();

    EngagementEvidence { stats, comments }
}

pub(crate) fn record_trends(
    ledger: &EvidenceLedger,
    report: &TrendReport,
) -> BTreeMap<RegionCode, EvidenceId> {
    let now = Utc::now();
    report
        .regions
        .iter()
        .map(|(code, interest)| {
            let mut excerpt = format!(
                "Search interest {:.0}/100 over {} data points",
                interest.interest,
                interest.series.len()
            );
            if let Some(momentum) = detect_momentum(&interest.series) {
                excerpt.push_str(&format!(", {}", momentum.label.as_str()));
            }
            let spikes = detect_spikes(&interest.series, SPIKE_THRESHOLD).len();
            if spikes > 0 {
                excerpt.push_str(&format!(", {} spike(s)", spikes));
            }
            let id = ledger.record(
                EvidenceKind::Trend,
                format!("{}:{}:{}", report.source_ref, code, report.keyword),
                excerpt,
                interest.interest / 100.0,
                now,
            );
            (code.clone(), id)
        })
        .collect()
}

pub(crate) fn record_pageviews(
    ledger: &EvidenceLedger,
    report: &PageviewReport,
) -> BTreeMap<RegionCode, EvidenceId> {
    let now = Utc::now();
    report
        .regions
        .iter()
        .map(|(code, series)| {
            let total: f64 = series.iter().map(|p| p.value).sum();
            let id = ledger.record(
                EvidenceKind::Pageview,
                format!("{}:{}:{}", report.source_ref, code, report.article),
                format!("{:.0} views over {} days", total, series.len()),
                1.0,
                now,
            );
            (code.clone(), id)
        })
        .collect()
}

/// Collected signals and their evidence, as far as each stage got
#[derive(Default)]
pub(crate) struct MetricInputs<'a> {
    pub engagement: Option<(&'a EngagementReport, EvidenceId)>,
    pub trends: Option<(&'a TrendReport, &'a BTreeMap<RegionCode, EvidenceId>)>,
    pub pageviews: Option<(&'a PageviewReport, &'a BTreeMap<RegionCode, EvidenceId>)>,
}

pub(crate) type FieldEvidence = BTreeMap<(RegionCode, MetricField), Vec<EvidenceId>>;

/// One metric per region, plus the evidence behind each field
pub(crate) fn assemble_metrics(
    regions: &[RegionCode],
    inputs: &MetricInputs<'_>,
) -> (Vec<RegionMetric>, FieldEvidence) {
    let mut field_evidence = FieldEvidence::new();
    let global_rate = inputs.engagement.and_then(|(report, _)| engagement_rate(report));

    let metrics = regions
        .iter()
        .map(|code| {
            let mut metric = RegionMetric::new(code.clone());
            let mut cite = |field: MetricField, id: EvidenceId| {
                field_evidence
                    .entry((code.clone(), field))
                    .or_default()
                    .push(id);
            };

            if let Some((report, id)) = inputs.engagement {
                let rate = report
                    .regional_engagement
                    .get(code)
                    .copied()
                    .filter(|r| r.is_finite())
                    .or(global_rate);
                if let Some(rate) = rate {
                    metric.engagement_score = Some(rate);
                    cite(MetricField::Engagement, id);
                }
            }

            if let Some((report, ids)) = inputs.trends {
                if let (Some(interest), Some(id)) = (report.regions.get(code), ids.get(code)) {
                    metric.interest_score = Some(interest.interest);
                    cite(MetricField::Interest, *id);
                    if let Some(growth) = growth_rate(&interest.series) {
                        metric.growth_rate = Some(growth);
                        cite(MetricField::Growth, *id);
                    }
                }
            }

            if let Some((report, ids)) = inputs.pageviews {
                if let (Some(series), Some(id)) = (report.regions.get(code), ids.get(code)) {
                    if let Some(delta) = percent_change(series) {
                        metric.pageview_delta = Some(delta);
                        cite(MetricField::Pageview, *id);
                    }
                }
            }

            metric
        })
        .collect::<Vec<_>>();

    let metrics = metrics
        .into_iter()
        .map(|mut metric| {
            let mut refs: Vec<EvidenceId> = field_evidence
                .iter()
                .filter(|((code, _), _)| *code == metric.region_code)
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            refs.sort();
            refs.dedup();
            metric.evidence_refs = refs;
            metric
        })
        .collect();

    (metrics, field_evidence)
}

/// Stage that supplies a metric field
pub(crate) fn source_stage(field: MetricField) -> Stage {
    match field {
        MetricField::Engagement => Stage::Engagement,
        MetricField::Interest | MetricField::Growth => Stage::Trend,
        MetricField::Pageview => Stage::Pageview,
    }
}

/// Cite every ranking field, or say why it has no evidence
pub(crate) fn cite_rankings(
    ledger: &EvidenceLedger,
    rankings: &[RegionRanking],
    field_evidence: &FieldEvidence,
    stage_gaps: &BTreeMap<Stage, String>,
) {
    for ranking in rankings {
        let code = &ranking.region_code;
        for field in MetricField::ALL {
            let fact = ranking_fact(code, field.name());
            match field_evidence.get(&(code.clone(), field)) {
                Some(ids) => ledger.cite(fact, ids),
                None => {
                    let stage = source_stage(field);
                    let reason = match stage_gaps.get(&stage) {
                        Some(gap) => format!("{} stage skipped: {}", stage, gap),
                        None => format!("{} source had no data for {}", stage, code),
                    };
                    ledger.mark_unsupported(fact, reason);
                }
            }
        }

        for fact in ["total_score", "tier", "budget_pct"] {
            ledger.support(
                ranking_fact(code, fact),
                &ranking.evidence_refs,
                "no signals available for region",
            );
        }
    }
}

pub(crate) fn cite_phases(ledger: &EvidenceLedger, phases: &[Phase]) {
    for phase in phases {
        for fact in ["regions", "budget_pct"] {
            ledger.support(
                phase_fact(phase.index, fact),
                &phase.evidence_refs,
                "no signals available for phase regions",
            );
        }
    }
}
