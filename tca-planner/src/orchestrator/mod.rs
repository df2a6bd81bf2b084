//! Campaign pipeline
//!
//! Drives one run from request to campaign:
//!
//! ```text
//! metadata ──┬── engagement ── sentiment ──┬── scoring ── rollout ── creative
//!            └── trend ║ pageview ─────────┘
//! ```
//!
//! Metadata and rollout are mandatory. Every other stage may be skipped
//! (timeout, unavailable source, rate limit, no data, no provider); the run
//! then finishes as `completed_degraded` and the campaign lists what was
//! skipped and why. A metadata failure ends the run with a partial record.
//! Invalid input and broken invariants are returned as errors.

mod signals;
mod stage;

pub use stage::StageOutcome;

use chrono::{Days, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tca_common::events::{EventBus, PipelineEvent};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::advisory::campaign_insights;
use crate::analysis::{engagement_rate, summarize_sentiment, SentimentSummary};
use crate::collectors::{
    CollectorError, EngagementQuery, EngagementReport, MetadataQuery, MovieMetadata,
    PageviewReport, Providers, SignalQuery, TrendReport,
};
use crate::config::PolicyConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::ledger::EvidenceId;
use crate::models::{
    Campaign, CampaignRecord, InputEcho, LedgerRef, PartialCampaign, RegionCode, RegionRanking,
    RunOutcome, RunStatus, SkipReason, SkippedStage, Stage, StageReport, StageStatus,
};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::rollout::RolloutPlanner;
use crate::scorer::RegionalScorer;

use signals::{EngagementEvidence, MetricInputs};
use stage::{RunContext, Timed};

/// Caller input for one run
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignRequest {
    pub trailer_reference: String,
    pub movie_reference: String,
    pub target_regions: Vec<String>,
    pub budget: f64,
    pub release_date: NaiveDate,
    /// Falls back to the policy default
    pub duration_weeks: Option<u32>,
}

impl CampaignRequest {
    pub fn new<I, S>(
        trailer_reference: impl Into<String>,
        movie_reference: impl Into<String>,
        target_regions: I,
        budget: f64,
        release_date: NaiveDate,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trailer_reference: trailer_reference.into(),
            movie_reference: movie_reference.into(),
            target_regions: target_regions.into_iter().map(Into::into).collect(),
            budget,
            release_date,
            duration_weeks: None,
        }
    }

    pub fn with_duration_weeks(mut self, weeks: u32) -> Self {
        self.duration_weeks = Some(weeks);
        self
    }
}

/// Upper-cased, de-duplicated, order-preserving region list
fn normalize_regions(regions: &[String]) -> Vec<RegionCode> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .map(RegionCode::new)
        .filter(|code| !code.as_str().is_empty())
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Signal-aggregation and decision pipeline
pub struct CampaignPipeline {
    policy: PolicyConfig,
    scorer: RegionalScorer,
    planner: RolloutPlanner,
    providers: Providers,
    reporters: Vec<Arc<dyn ProgressReporter>>,
    event_bus: Option<EventBus>,
}

impl CampaignPipeline {
    /// Validate the policy and bind the providers
    pub fn new(policy: PolicyConfig, providers: Providers) -> PlannerResult<Self> {
        policy.validate()?;
        let scorer = RegionalScorer::new(policy.weights.clone(), policy.tier_bands.clone())?;
        let planner = RolloutPlanner::new(policy.rollout.clone())?;
        info!(providers = ?providers.describe(), "Campaign pipeline ready");
        Ok(Self {
            policy,
            scorer,
            planner,
            providers,
            reporters: Vec::new(),
            event_bus: None,
        })
    }

    /// Add a progress callback
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Broadcast run, stage and progress events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub async fn run(&self, request: CampaignRequest) -> PlannerResult<RunOutcome> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run the pipeline; cancelling `cancel` skips every stage not yet done
    pub async fn run_with_cancel(
        &self,
        request: CampaignRequest,
        cancel: CancellationToken,
    ) -> PlannerResult<RunOutcome> {
        let input = self.validate(&request)?;
        let run_id = Uuid::new_v4();
        let ctx = RunContext::new(
            run_id,
            ProgressTracker::new(run_id, self.reporters.clone(), self.event_bus.clone()),
            self.event_bus.clone(),
            self.policy.deadlines.run(),
            cancel,
        );

        info!(
            run_id = %run_id,
            movie = %input.movie_reference,
            regions = input.target_regions.len(),
            campaign_start = %input.campaign_start,
            release_date = %input.release_date,
            "Campaign run started"
        );
        ctx.emit(PipelineEvent::RunStarted {
            run_id,
            movie_reference: input.movie_reference.clone(),
            target_regions: input
                .target_regions
                .iter()
                .map(|r| r.to_string())
                .collect(),
            timestamp: Utc::now(),
        });

        let mut reports: Vec<StageReport> = Vec::new();

        // Metadata (mandatory)
        let metadata = self.fetch_metadata(&ctx, &input).await;
        reports.push(ctx.finish(Stage::Metadata, &metadata));
        let movie = match metadata.outcome {
            StageOutcome::Completed(movie) => movie,
            StageOutcome::Skipped(reason) => {
                return Ok(self.fail(&ctx, input, reports, Stage::Metadata, reason.to_string()))
            }
            StageOutcome::Failed(reason) => {
                return Ok(self.fail(&ctx, input, reports, Stage::Metadata, reason))
            }
        };
        signals::record_metadata(&ctx.ledger, &movie);
        ctx.progress.advance(10, "metadata", &format!("Resolved {}", movie.title));

        // Engagement then sentiment, alongside trend and pageview
        let signal_query = SignalQuery {
            title: movie.title.clone(),
            regions: input.target_regions.clone(),
        };
        let ((engagement, sentiment), (trend, pageview)) = tokio::join!(
            self.engagement_branch(&ctx, &input),
            async {
                tokio::join!(
                    self.fetch_trends(&ctx, &signal_query),
                    self.fetch_pageviews(&ctx, &signal_query)
                )
            }
        );
        reports.push(ctx.finish(Stage::Engagement, &engagement));
        reports.push(ctx.finish(Stage::Sentiment, &sentiment));
        reports.push(ctx.finish(Stage::Trend, &trend));
        reports.push(ctx.finish(Stage::Pageview, &pageview));

        let sentiment_summary = sentiment.outcome.completed().cloned();
        match (&sentiment_summary, engagement.outcome.completed()) {
            (Some(_), Some((_, evidence))) => ctx.ledger.support(
                signals::SENTIMENT_FACT,
                &evidence.comments,
                "no comment evidence recorded",
            ),
            _ => ctx.ledger.mark_unsupported(
                signals::SENTIMENT_FACT,
                format!(
                    "sentiment stage skipped: {}",
                    sentiment.outcome.reason().unwrap_or_default()
                ),
            ),
        }

        // Scoring
        let started = Instant::now();
        let stage_gaps: BTreeMap<Stage, String> = [
            (Stage::Engagement, engagement.outcome.reason()),
            (Stage::Trend, trend.outcome.reason()),
            (Stage::Pageview, pageview.outcome.reason()),
        ]
        .into_iter()
        .filter_map(|(stage, reason)| reason.map(|r| (stage, r)))
        .collect();

        let inputs = MetricInputs {
            engagement: engagement
                .outcome
                .completed()
                .map(|(report, evidence)| (report, evidence.stats)),
            trends: trend.outcome.completed().map(|(report, ids)| (report, ids)),
            pageviews: pageview.outcome.completed().map(|(report, ids)| (report, ids)),
        };
        let (region_metrics, field_evidence) =
            signals::assemble_metrics(&input.target_regions, &inputs);
        let rankings = self.scorer.score(&region_metrics)?;
        signals::cite_rankings(&ctx.ledger, &rankings, &field_evidence, &stage_gaps);
        reports.push(ctx.finish(
            Stage::Scoring,
            &Timed {
                outcome: StageOutcome::Completed(()),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        ));
        ctx.progress.advance(
            70,
            "scoring",
            &format!("Ranked {} regions", rankings.len()),
        );

        // Rollout (mandatory; failures are structural)
        let started = Instant::now();
        let plan = self.planner.plan(
            &rankings,
            input.campaign_start,
            input.release_date,
            input.duration_weeks,
            input.budget,
        )?;
        signals::cite_phases(&ctx.ledger, &plan.phases);
        reports.push(ctx.finish(
            Stage::Rollout,
            &Timed {
                outcome: StageOutcome::Completed(()),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        ));
        ctx.progress.advance(
            85,
            "rollout",
            &format!("Planned {} phases", plan.phases.len()),
        );

        // Creative
        let creative = self
            .generate_creative(&ctx, &movie, &rankings, sentiment_summary.as_ref())
            .await;
        reports.push(ctx.finish(Stage::Creative, &creative));
        ctx.progress.advance(95, "creative", "Creative generation finished");

        let skipped_stages = skipped_from(&[
            (Stage::Engagement, engagement.outcome.skip_reason()),
            (Stage::Sentiment, sentiment.outcome.skip_reason()),
            (Stage::Trend, trend.outcome.skip_reason()),
            (Stage::Pageview, pageview.outcome.skip_reason()),
            (Stage::Creative, creative.outcome.skip_reason()),
        ]);
        let status = if skipped_stages.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedDegraded
        };

        let insights = campaign_insights(
            sentiment_summary.as_ref(),
            engagement
                .outcome
                .completed()
                .and_then(|(report, _)| engagement_rate(report)),
            &rankings,
            &skipped_stages,
        );

        let evidence_ledger = ctx.ledger.snapshot();
        let campaign = Campaign {
            run_id,
            generated_at: Utc::now(),
            status,
            input_echo: input,
            movie,
            sentiment: sentiment_summary,
            region_metrics,
            region_rankings: rankings,
            phases: plan.phases,
            milestones: plan.milestones,
            budget_allocations: plan.allocations,
            timeline: plan.timeline,
            dropped_regions: plan.dropped_regions,
            strategy: plan.strategy,
            insights,
            creative_assets: match creative.outcome {
                StageOutcome::Completed(assets) => Some(assets),
                _ => None,
            },
            stage_reports: reports,
            skipped_stages,
            evidence_ledger_ref: LedgerRef {
                run_id,
                entry_count: evidence_ledger.entries.len(),
            },
        };

        self.finish_run(&ctx, status, &campaign.skipped_stages);
        Ok(RunOutcome::Completed(Box::new(CampaignRecord {
            campaign,
            evidence_ledger,
        })))
    }

    fn validate(&self, request: &CampaignRequest) -> PlannerResult<InputEcho> {
        if !request.budget.is_finite() || request.budget < 0.0 {
            return Err(PlannerError::InvalidInput(format!(
                "budget must be a non-negative amount, got {}",
                request.budget
            )));
        }
        let duration_weeks = request
            .duration_weeks
            .unwrap_or(self.policy.duration_weeks);
        let campaign_start = request
            .release_date
            .checked_sub_days(Days::new(u64::from(duration_weeks) * 7))
            .ok_or_else(|| {
                PlannerError::InvalidInput(format!(
                    "duration_weeks {} reaches before the earliest representable date",
                    duration_weeks
                ))
            })?;
        if request.release_date <= campaign_start {
            return Err(PlannerError::InvalidWindow {
                campaign_start,
                release_date: request.release_date,
            });
        }

        let target_regions = normalize_regions(&request.target_regions);
        if target_regions.is_empty() {
            warn!("No target regions supplied, campaign will have no rankings");
        }

        Ok(InputEcho {
            trailer_reference: request.trailer_reference.clone(),
            movie_reference: request.movie_reference.clone(),
            target_regions,
            budget: request.budget,
            release_date: request.release_date,
            campaign_start,
            duration_weeks,
        })
    }

    async fn fetch_metadata(
        &self,
        ctx: &RunContext,
        input: &InputEcho,
    ) -> Timed<MovieMetadata> {
        let source = &self.providers.metadata;
        let query = &MetadataQuery {
            movie_reference: input.movie_reference.clone(),
        };
        let mut timed = ctx
            .guard(
                Stage::Metadata,
                self.policy.deadlines.for_stage(Stage::Metadata),
                move || source.fetch(query),
            )
            .await;
        timed.outcome = timed.outcome.require();
        timed
    }

    async fn engagement_branch(
        &self,
        ctx: &RunContext,
        input: &InputEcho,
    ) -> (
        Timed<(EngagementReport, EngagementEvidence)>,
        Timed<SentimentSummary>,
    ) {
        let Some(source) = &self.providers.engagement else {
            ctx.progress.advance(35, "engagement", "No engagement source configured");
            return (
                Timed::instant(StageOutcome::Skipped(SkipReason::NotConfigured)),
                Timed::instant(StageOutcome::Skipped(SkipReason::UpstreamSkipped {
                    upstream: Stage::Engagement,
                })),
            );
        };

        let query = &EngagementQuery {
            trailer_reference: input.trailer_reference.clone(),
            regions: input.target_regions.clone(),
        };
        let engagement = ctx
            .guard(
                Stage::Engagement,
                self.policy.deadlines.for_stage(Stage::Engagement),
                move || source.fetch(query),
            )
            .await;

        let Some(report) = engagement.outcome.completed() else {
            ctx.progress.advance(35, "engagement", "Engagement unavailable, sentiment skipped");
            let sentiment = Timed::instant(StageOutcome::Skipped(SkipReason::UpstreamSkipped {
                upstream: Stage::Engagement,
            }));
            return (engagement.map_outcome(|r| (r, empty_evidence())), sentiment);
        };

        let evidence = signals::record_engagement(&ctx.ledger, report);
        ctx.progress.advance(
            25,
            "engagement",
            &format!("Collected {} comments", report.comments.len()),
        );

        let sentiment = self.analyze_sentiment(ctx, report).await;
        let message = match sentiment.outcome.completed() {
            Some(summary) => format!(
                "Sentiment {} over {} comments",
                summary.overall.as_str(),
                summary.analyzed_comments
            ),
            None => "Sentiment unavailable".to_string(),
        };
        ctx.progress.advance(35, "sentiment", &message);

        (engagement.map_outcome(|r| (r, evidence)), sentiment)
    }

    async fn analyze_sentiment(
        &self,
        ctx: &RunContext,
        report: &EngagementReport,
    ) -> Timed<SentimentSummary> {
        let scorer = Arc::clone(&self.providers.sentiment);
        let comments = report.comments.clone();
        ctx.guard(
            Stage::Sentiment,
            self.policy.deadlines.for_stage(Stage::Sentiment),
            || {
                let scorer = Arc::clone(&scorer);
                let comments = comments.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        summarize_sentiment(&comments, scorer.as_ref())
                    })
                    .await
                    .map_err(|e| CollectorError::Unavailable(format!("sentiment task failed: {}", e)))
                }
            },
        )
        .await
    }

    async fn fetch_trends(
        &self,
        ctx: &RunContext,
        query: &SignalQuery,
    ) -> Timed<(TrendReport, BTreeMap<RegionCode, EvidenceId>)> {
        let Some(source) = &self.providers.trend else {
            return Timed::instant(StageOutcome::Skipped(SkipReason::NotConfigured));
        };
        let timed = ctx
            .guard(
                Stage::Trend,
                self.policy.deadlines.for_stage(Stage::Trend),
                move || source.fetch(query),
            )
            .await;
        let timed = timed.map_outcome(|report| {
            let ids = signals::record_trends(&ctx.ledger, &report);
            (report, ids)
        });
        let message = match timed.outcome.completed() {
            Some((_, ids)) => format!("Search interest for {} regions", ids.len()),
            None => "Trend signals unavailable".to_string(),
        };
        ctx.progress.advance(45, "trend", &message);
        timed
    }

    async fn fetch_pageviews(
        &self,
        ctx: &RunContext,
        query: &SignalQuery,
    ) -> Timed<(PageviewReport, BTreeMap<RegionCode, EvidenceId>)> {
        let Some(source) = &self.providers.pageview else {
            return Timed::instant(StageOutcome::Skipped(SkipReason::NotConfigured));
        };
        let timed = ctx
            .guard(
                Stage::Pageview,
                self.policy.deadlines.for_stage(Stage::Pageview),
                move || source.fetch(query),
            )
            .await;
        let timed = timed.map_outcome(|report| {
            let ids = signals::record_pageviews(&ctx.ledger, &report);
            (report, ids)
        });
        let message = match timed.outcome.completed() {
            Some((_, ids)) => format!("Pageviews for {} regions", ids.len()),
            None => "Pageview signals unavailable".to_string(),
        };
        ctx.progress.advance(55, "pageview", &message);
        timed
    }

    async fn generate_creative(
        &self,
        ctx: &RunContext,
        movie: &MovieMetadata,
        rankings: &[RegionRanking],
        sentiment: Option<&SentimentSummary>,
    ) -> Timed<serde_json::Value> {
        let Some(generator) = &self.providers.creative else {
            return Timed::instant(StageOutcome::Skipped(SkipReason::NotConfigured));
        };
        ctx.guard(
            Stage::Creative,
            self.policy.deadlines.for_stage(Stage::Creative),
            move || async move { generator.generate(movie, rankings, sentiment).await.map(Some) },
        )
        .await
    }

    fn fail(
        &self,
        ctx: &RunContext,
        input: InputEcho,
        mut reports: Vec<StageReport>,
        failed_stage: Stage,
        reason: String,
    ) -> RunOutcome {
        // Stages after the failure never ran
        let skipped_stages: Vec<SkippedStage> = [
            Stage::Engagement,
            Stage::Sentiment,
            Stage::Trend,
            Stage::Pageview,
            Stage::Scoring,
            Stage::Rollout,
            Stage::Creative,
        ]
        .into_iter()
        .filter(|stage| *stage > failed_stage)
        .map(|stage| SkippedStage {
            stage,
            reason: SkipReason::UpstreamSkipped {
                upstream: failed_stage,
            },
        })
        .collect();
        for skipped in &skipped_stages {
            reports.push(StageReport {
                stage: skipped.stage,
                status: StageStatus::Skipped,
                reason: Some(skipped.reason.to_string()),
                elapsed_ms: 0,
            });
        }

        self.finish_run(ctx, RunStatus::Failed, &skipped_stages);
        RunOutcome::Failed(Box::new(PartialCampaign {
            run_id: ctx.run_id,
            generated_at: Utc::now(),
            status: RunStatus::Failed,
            input_echo: input,
            failed_stage,
            reason,
            stage_reports: reports,
            skipped_stages,
            evidence_ledger: ctx.ledger.snapshot(),
        }))
    }

    fn finish_run(&self, ctx: &RunContext, status: RunStatus, skipped: &[SkippedStage]) {
        ctx.progress.advance(100, "done", status.as_str());
        let skipped_names: Vec<String> = skipped.iter().map(|s| s.stage.to_string()).collect();
        info!(
            run_id = %ctx.run_id,
            status = status.as_str(),
            skipped = ?skipped_names,
            evidence = ctx.ledger.len(),
            "Campaign run finished"
        );
        ctx.emit(PipelineEvent::RunFinished {
            run_id: ctx.run_id,
            status: status.as_str().to_string(),
            skipped_stages: skipped_names,
            timestamp: Utc::now(),
        });
    }
}

fn empty_evidence() -> EngagementEvidence {
    EngagementEvidence {
        stats: EvidenceId(0),
        comments: Vec::new(),
    }
}

fn skipped_from(outcomes: &[(Stage, Option<&SkipReason>)]) -> Vec<SkippedStage> {
    outcomes
        .iter()
        .filter_map(|(stage, reason)| {
            reason.map(|reason| SkippedStage {
                stage: *stage,
                reason: reason.clone(),
            })
        })
        .collect()
}
