//! Rollout planner
//!
//! Lays a ranked region list out over the window from campaign start to
//! release day: phases with budget splits, dated milestones, per-region
//! allocations and a week-by-week timeline.
//!
//! Phase admission by tier:
//! - Tier A regions launch in phase 1. With no tier A region, the top-ranked
//!   region leads phase 1 instead.
//! - Tiers B and C join from phase 2 (phase 1 in a single-phase plan).
//! - Tier D joins only in the final phase and is dropped from a
//!   single-phase plan.
//!
//! Once admitted, a region stays in every later phase.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::advisory::rollout_strategy;
use crate::config::RolloutPolicy;
use crate::error::{PlannerError, PlannerResult};
use crate::ledger::EvidenceId;
use crate::models::{
    Milestone, Phase, RegionAllocation, RegionCode, RegionRanking, RolloutPlan, Tier,
    TimelineWeek,
};
use crate::scorer::round_to;

const BUDGET_TOLERANCE: f64 = 1e-6;

/// Fixed marketing dates relative to release, kept only when strictly
/// inside the campaign window
const MARKETING_MILESTONES: [(i64, &str); 3] = [
    (28, "Official trailer release"),
    (14, "Ticket pre-sales open"),
    (7, "Premiere event"),
];

#[derive(Debug, Clone)]
pub struct RolloutPlanner {
    policy: RolloutPolicy,
}

impl RolloutPlanner {
    pub fn new(policy: RolloutPolicy) -> PlannerResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Build a plan
    ///
    /// `rankings` must be in rank order. `release_date <= campaign_start`
    /// is an `InvalidWindow` error; an empty ranking gives an empty plan.
    pub fn plan(
        &self,
        rankings: &[RegionRanking],
        campaign_start: NaiveDate,
        release_date: NaiveDate,
        duration_weeks: u32,
        total_budget: f64,
    ) -> PlannerResult<RolloutPlan> {
        if release_date <= campaign_start {
            return Err(PlannerError::InvalidWindow {
                campaign_start,
                release_date,
            });
        }
        if !total_budget.is_finite() || total_budget < 0.0 {
            return Err(PlannerError::InvalidInput(format!(
                "budget must be a non-negative amount, got {}",
                total_budget
            )));
        }
        if rankings.is_empty() {
            debug!("No ranked regions, producing empty rollout plan");
            return Ok(RolloutPlan::empty(campaign_start, release_date));
        }

        let days = (release_date - campaign_start).num_days() + 1;
        let wanted = self.policy.phase_count(duration_weeks);
        let count = wanted.min(days as usize);
        if count < wanted {
            warn!(
                wanted,
                days, "Campaign window shorter than phase count, collapsing phases"
            );
        }

        let windows = phase_windows(campaign_start, days, count);
        let (phases, dropped) = self.build_phases(rankings, &windows, total_budget);
        let milestones = milestones(&phases, campaign_start, release_date);
        let allocations = allocations(rankings, &dropped, total_budget);
        let timeline = timeline(&phases, campaign_start, release_date);
        let strategy = rollout_strategy(rankings, &phases, &dropped);

        let plan = RolloutPlan {
            campaign_start,
            release_date,
            phases,
            milestones,
            allocations,
            timeline,
            dropped_regions: dropped,
            strategy,
        };
        verify(&plan, rankings)?;

        debug!(
            phases = plan.phases.len(),
            milestones = plan.milestones.len(),
            dropped = plan.dropped_regions.len(),
            "Rollout planned"
        );
        Ok(plan)
    }

    fn build_phases(
        &self,
        rankings: &[RegionRanking],
        windows: &[(NaiveDate, NaiveDate)],
        total_budget: f64,
    ) -> (Vec<Phase>, Vec<RegionCode>) {
        let count = windows.len();
        let layout = self.policy.layout(count);

        let mut leaders: Vec<&RegionRanking> =
            rankings.iter().filter(|r| r.tier == Tier::A).collect();
        if leaders.is_empty() {
            leaders.push(&rankings[0]);
        }
        let leader_codes: HashSet<&RegionCode> = leaders.iter().map(|r| &r.region_code).collect();

        let entry_phase = |ranking: &RegionRanking| -> Option<usize> {
            if leader_codes.contains(&ranking.region_code) {
                return Some(0);
            }
            match ranking.tier {
                Tier::A | Tier::B | Tier::C => Some(if count == 1 { 0 } else { 1 }),
                Tier::D if count == 1 => None,
                Tier::D => Some(count - 1),
            }
        };

        let dropped: Vec<RegionCode> = rankings
            .iter()
            .filter(|r| entry_phase(r).is_none())
            .map(|r| r.region_code.clone())
            .collect();

        let phases = windows
            .iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let members: Vec<&RegionRanking> = rankings
                    .iter()
                    .filter(|r| entry_phase(r).is_some_and(|entry| entry <= i))
                    .collect();

                let mut evidence_refs: Vec<EvidenceId> = members
                    .iter()
                    .flat_map(|r| r.evidence_refs.iter().copied())
                    .collect();
                evidence_refs.sort();
                evidence_refs.dedup();

                let budget_pct = layout.budget_split[i];
                Phase {
                    index: i + 1,
                    name: layout.names[i].clone(),
                    regions: members.iter().map(|r| r.region_code.clone()).collect(),
                    intensity: layout.intensities[i],
                    budget_pct,
                    budget_amount: round_to(total_budget * budget_pct / 100.0, 2),
                    start_date: *start,
                    end_date: *end,
                    evidence_refs,
                }
            })
            .collect();

        (phases, dropped)
    }
}

/// Split `days` consecutive days into `count` windows; the last absorbs
/// the remainder
fn phase_windows(start: NaiveDate, days: i64, count: usize) -> Vec<(NaiveDate, NaiveDate)> {
    let count = count.max(1) as i64;
    let base = days / count;
    let remainder = days % count;

    let mut windows = Vec::with_capacity(count as usize);
    let mut cursor = start;
    for i in 0..count {
        let len = if i == count - 1 { base + remainder } else { base };
        let end = cursor + Duration::days(len - 1);
        windows.push((cursor, end));
        cursor = end + Duration::days(1);
    }
    windows
}

fn milestones(phases: &[Phase], campaign_start: NaiveDate, release_date: NaiveDate) -> Vec<Milestone> {
    let mut set = BTreeSet::new();
    set.insert(Milestone::new(campaign_start, "Campaign launch with trailer release"));

    for phase in phases.iter().skip(1) {
        set.insert(Milestone::new(
            phase.start_date,
            format!("Phase {} begins: {}", phase.index, phase.name),
        ));
    }

    for (days_before, label) in MARKETING_MILESTONES {
        let date = release_date - Duration::days(days_before);
        if campaign_start < date && date < release_date {
            set.insert(Milestone::new(date, label));
        }
    }

    set.insert(Milestone::new(release_date, "Release day"));
    set.into_iter().collect()
}

fn allocations(
    rankings: &[RegionRanking],
    dropped: &[RegionCode],
    total_budget: f64,
) -> Vec<RegionAllocation> {
    rankings
        .iter()
        .filter(|r| !dropped.contains(&r.region_code))
        .map(|r| RegionAllocation {
            region_code: r.region_code.clone(),
            tier: r.tier,
            budget_pct: r.budget_pct,
            budget_amount: round_to(total_budget * r.budget_pct / 100.0, 2),
            justification: r.recommendation.clone(),
        })
        .collect()
}

fn timeline(phases: &[Phase], campaign_start: NaiveDate, release_date: NaiveDate) -> Vec<TimelineWeek> {
    let mut weeks = Vec::new();
    let mut cursor = campaign_start;
    let mut week = 1;

    while cursor <= release_date {
        let end = (cursor + Duration::days(6)).min(release_date);
        let weeks_to_release = (release_date - cursor).num_days() / 7;
        let phase = phases.iter().find(|p| p.contains(cursor));

        weeks.push(TimelineWeek {
            week,
            start_date: cursor,
            end_date: end,
            weeks_to_release,
            phase_index: phase.map(|p| p.index),
            intensity: phase.map(|p| p.intensity),
            active_regions: phase
                .map(|p| p.regions.iter().cloned().collect())
                .unwrap_or_default(),
            activities: weekly_activities(weeks_to_release)
                .iter()
                .map(|a| a.to_string())
                .collect(),
        });

        cursor = end + Duration::days(1);
        week += 1;
    }
    weeks
}

fn weekly_activities(weeks_to_release: i64) -> &'static [&'static str] {
    if weeks_to_release >= 6 {
        &[
            "Launch teaser campaign",
            "Build social media presence",
            "Secure media partnerships",
        ]
    } else if weeks_to_release >= 4 {
        &[
            "Release official trailer",
            "Start paid social campaigns",
            "Begin press tour",
        ]
    } else if weeks_to_release >= 2 {
        &[
            "Intensify digital ads",
            "Open ticket pre-sales",
            "Host premiere events",
        ]
    } else {
        &[
            "Final push across all channels",
            "Amplify reviews and testimonials",
            "Drive ticket sales",
        ]
    }
}

fn verify(plan: &RolloutPlan, rankings: &[RegionRanking]) -> PlannerResult<()> {
    let budget: f64 = plan.phases.iter().map(|p| p.budget_pct).sum();
    if (budget - 100.0).abs() > BUDGET_TOLERANCE {
        return Err(PlannerError::invariant(
            "rollout",
            format!("phase budgets sum to {}", budget),
        ));
    }

    let mut expected_start = plan.campaign_start;
    for phase in &plan.phases {
        if phase.start_date != expected_start || phase.end_date < phase.start_date {
            return Err(PlannerError::invariant(
                "rollout",
                format!("phase {} window is not contiguous", phase.index),
            ));
        }
        expected_start = phase.end_date + Duration::days(1);
    }
    if plan.phases.last().map(|p| p.end_date) != Some(plan.release_date) {
        return Err(PlannerError::invariant(
            "rollout",
            "phases do not end on release day",
        ));
    }

    for ranking in rankings {
        let placed = plan
            .phases
            .iter()
            .any(|p| p.regions.contains(&ranking.region_code));
        if !placed && !plan.dropped_regions.contains(&ranking.region_code) {
            return Err(PlannerError::invariant(
                "rollout",
                format!("region {} is neither phased nor dropped", ranking.region_code),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ranking(code: &str, tier: Tier, budget_pct: f64, rank: usize) -> RegionRanking {
        RegionRanking {
            rank,
            region_code: code.into(),
            total_score: match tier {
                Tier::A => 90.0,
                Tier::B => 70.0,
                Tier::C => 55.0,
                Tier::D => 20.0,
            },
            tier,
            budget_pct,
            rationale: String::new(),
            recommendation: "Standard rollout".to_string(),
            components: Vec::new(),
            missing_fields: Vec::new(),
            evidence_refs: vec![EvidenceId(rank as u64)],
        }
    }

    fn mixed() -> Vec<RegionRanking> {
        vec![
            ranking("US", Tier::A, 40.0, 1),
            ranking("GB", Tier::B, 30.0, 2),
            ranking("CA", Tier::C, 20.0, 3),
            ranking("IN", Tier::D, 10.0, 4),
        ]
    }

    fn planner() -> RolloutPlanner {
        RolloutPlanner::new(RolloutPolicy::default()).unwrap()
    }

    fn codes(phase: &Phase) -> Vec<&str> {
        phase.regions.iter().map(|r| r.as_str()).collect()
    }

    #[test]
    fn test_three_phase_plan() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 100_000.0).unwrap();

        assert_eq!(plan.phases.len(), 3);
        assert_eq!(codes(&plan.phases[0]), vec!["US"]);
        assert_eq!(codes(&plan.phases[1]), vec!["CA", "GB", "US"]);
        assert_eq!(codes(&plan.phases[2]), vec!["CA", "GB", "IN", "US"]);

        let names: Vec<&str> = plan.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Primary Launch", "Expansion", "Final Push"]);
        assert_eq!(plan.phases[0].budget_amount, 50_000.0);
        assert_eq!(plan.phases[2].budget_amount, 20_000.0);
        assert!(plan.dropped_regions.is_empty());
    }

    #[test]
    fn test_allocations_carry_justification_and_strategy() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 100_000.0).unwrap();

        assert!(plan
            .allocations
            .iter()
            .all(|a| a.justification == "Standard rollout"));
        assert_eq!(
            plan.strategy.recommendations,
            vec![
                "Phase 1 (2025-05-19 to 2025-06-01): focus on US",
                "Phase 2 (from 2025-06-02): expand to 2 more markets",
                "Phase 3 (from 2025-06-16): expand to 1 more market",
                "Localization priority: English (3 markets)",
            ]
        );
        assert!(plan.strategy.growth_markets.is_empty());
        let tiers: Vec<Tier> = plan.strategy.channels.iter().map(|c| c.tier).collect();
        assert_eq!(tiers, vec![Tier::A, Tier::B, Tier::C]);
    }

    #[test]
    fn test_phases_cover_window_contiguously() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 1.0).unwrap();

        // 43 inclusive days: 14 + 14 + 15
        let lengths: Vec<i64> = plan
            .phases
            .iter()
            .map(|p| (p.end_date - p.start_date).num_days() + 1)
            .collect();
        assert_eq!(lengths, vec![14, 14, 15]);
        assert_eq!(plan.phases[0].start_date, start);
        assert_eq!(plan.phases[2].end_date, release);
        for pair in plan.phases.windows(2) {
            assert_eq!(pair[0].end_date + Duration::days(1), pair[1].start_date);
        }
        let budget: f64 = plan.phases.iter().map(|p| p.budget_pct).sum();
        assert!((budget - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_week_collapses_to_one_phase() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(1);
        let rankings = vec![
            ranking("US", Tier::A, 60.0, 1),
            ranking("GB", Tier::B, 40.0, 2),
        ];
        let plan = planner().plan(&rankings, start, release, 1, 10_000.0).unwrap();

        assert_eq!(plan.phases.len(), 1);
        assert_eq!(codes(&plan.phases[0]), vec!["GB", "US"]);
        assert_eq!(plan.phases[0].budget_pct, 100.0);
        assert_eq!(plan.phases[0].start_date, start);
        assert_eq!(plan.phases[0].end_date, release);
    }

    #[test]
    fn test_single_phase_drops_tier_d() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(1);
        let plan = planner().plan(&mixed(), start, release, 1, 10_000.0).unwrap();

        assert_eq!(codes(&plan.phases[0]), vec!["CA", "GB", "US"]);
        assert_eq!(plan.dropped_regions, vec![RegionCode::new("IN")]);
        assert!(plan
            .allocations
            .iter()
            .all(|a| a.region_code.as_str() != "IN"));
    }

    #[test]
    fn test_two_phase_plan() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(3);
        let plan = planner().plan(&mixed(), start, release, 3, 1000.0).unwrap();

        assert_eq!(plan.phases.len(), 2);
        assert_eq!(codes(&plan.phases[0]), vec!["US"]);
        assert_eq!(codes(&plan.phases[1]), vec!["CA", "GB", "IN", "US"]);
        assert_eq!(plan.phases[0].budget_pct, 60.0);
        assert_eq!(plan.phases[1].name, "Final Push");
    }

    #[test]
    fn test_top_region_leads_without_tier_a() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let rankings = vec![
            ranking("FR", Tier::B, 55.0, 1),
            ranking("DE", Tier::D, 45.0, 2),
        ];
        let plan = planner().plan(&rankings, start, release, 6, 1.0).unwrap();

        assert_eq!(codes(&plan.phases[0]), vec!["FR"]);
        assert_eq!(codes(&plan.phases[1]), vec!["FR"]);
        assert_eq!(codes(&plan.phases[2]), vec!["DE", "FR"]);
    }

    #[test]
    fn test_release_before_start_is_invalid_window() {
        let start = date(2025, 6, 30);
        for release in [start, start - Duration::days(1)] {
            let err = planner().plan(&mixed(), start, release, 6, 1.0).unwrap_err();
            assert!(matches!(err, PlannerError::InvalidWindow { .. }));
        }
    }

    #[test]
    fn test_empty_rankings_give_empty_plan() {
        let release = date(2025, 6, 30);
        let plan = planner()
            .plan(&[], release - Duration::weeks(6), release, 6, 1.0)
            .unwrap();
        assert!(plan.phases.is_empty());
        assert!(plan.milestones.is_empty());
        assert!(plan.timeline.is_empty());
        assert!(plan.strategy.recommendations.is_empty());
    }

    #[test]
    fn test_short_window_caps_phase_count() {
        // Two inclusive days cannot hold three phases
        let start = date(2025, 6, 29);
        let release = date(2025, 6, 30);
        let plan = planner().plan(&mixed(), start, release, 6, 1.0).unwrap();

        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].start_date, start);
        assert_eq!(plan.phases[0].end_date, start);
        assert_eq!(plan.phases[1].end_date, release);
    }

    #[test]
    fn test_milestones_sorted_and_inside_window() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 1.0).unwrap();

        let labels: Vec<&str> = plan.milestones.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Campaign launch with trailer release",
                "Official trailer release",
                "Phase 2 begins: Expansion",
                "Phase 3 begins: Final Push",
                "Ticket pre-sales open",
                "Premiere event",
                "Release day",
            ]
        );
        assert!(plan.milestones.windows(2).all(|w| w[0] <= w[1]));
        assert!(plan
            .milestones
            .iter()
            .all(|m| start <= m.date && m.date <= release));
    }

    #[test]
    fn test_marketing_milestones_outside_window_omitted() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(2);
        let plan = planner().plan(&mixed(), start, release, 2, 1.0).unwrap();

        let labels: Vec<&str> = plan.milestones.iter().map(|m| m.label.as_str()).collect();
        assert!(!labels.contains(&"Official trailer release"));
        // Exactly on campaign start is not strictly inside
        assert!(!labels.contains(&"Ticket pre-sales open"));
        assert!(labels.contains(&"Premiere event"));
    }

    #[test]
    fn test_timeline_weeks() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 1.0).unwrap();

        // 43 days: six full weeks plus release day
        assert_eq!(plan.timeline.len(), 7);
        assert_eq!(plan.timeline[0].weeks_to_release, 6);
        assert_eq!(plan.timeline[0].phase_index, Some(1));
        assert_eq!(plan.timeline[0].activities[0], "Launch teaser campaign");
        let last = plan.timeline.last().unwrap();
        assert_eq!(last.start_date, release);
        assert_eq!(last.end_date, release);
        assert_eq!(last.phase_index, Some(3));
        assert_eq!(last.activities[0], "Final push across all channels");
    }

    #[test]
    fn test_allocations_follow_ranking_shares() {
        let release = date(2025, 6, 30);
        let start = release - Duration::weeks(6);
        let plan = planner().plan(&mixed(), start, release, 6, 250_000.0).unwrap();

        assert_eq!(plan.allocations.len(), 4);
        assert_eq!(plan.allocations[0].budget_amount, 100_000.0);
        assert_eq!(plan.allocations[3].budget_amount, 25_000.0);
    }

    #[test]
    fn test_negative_budget_rejected() {
        let release = date(2025, 6, 30);
        let err = planner()
            .plan(&mixed(), release - Duration::weeks(6), release, 6, -5.0)
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidInput(_)));
    }
}
