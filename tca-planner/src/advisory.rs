//! Advisory text
//!
//! Human-readable guidance layered over the numbers: a recommendation per
//! region, rollout strategy notes, a channel mix per tier and campaign-level
//! insights. Nothing here feeds back into scores, phases or budgets.

use std::collections::HashSet;

use crate::analysis::{SentimentLabel, SentimentSummary};
use crate::models::{
    CampaignInsights, ChannelPlan, LocalizationPriority, MetricField, Phase, RegionCode,
    RegionRanking, RolloutStrategy, SkippedStage, Tier,
};

/// Fractional growth above which a region is worth a test budget
const EMERGING_GROWTH: f64 = 0.2;

/// Fractional growth above which a region is flagged for monitoring
const HIGH_GROWTH: f64 = 0.3;

/// Overall engagement rate, in percent, read as strong organic interest
const HIGH_ENGAGEMENT_PCT: f64 = 5.0;

/// Regions named per strategy line
const LIST_LIMIT: usize = 3;

/// Markets carrying most of the global box office
const MAJOR_MARKETS: [&str; 8] = ["US", "CN", "GB", "JP", "KR", "FR", "DE", "AU"];

/// Language groups; earlier entries win ties
const LANGUAGE_MARKETS: [(&str, &[&str]); 10] = [
    ("English", &["US", "GB", "CA", "AU", "NZ", "IE"]),
    ("Spanish", &["ES", "MX", "AR", "CO", "CL", "PE"]),
    ("French", &["FR", "CA", "BE", "CH", "MA", "DZ"]),
    ("German", &["DE", "AT", "CH"]),
    ("Portuguese", &["BR", "PT"]),
    ("Mandarin", &["CN", "TW", "SG"]),
    ("Hindi", &["IN"]),
    ("Japanese", &["JP"]),
    ("Korean", &["KR"]),
    ("Arabic", &["SA", "EG", "AE", "MA", "DZ"]),
];

const CHANNEL_MIX: [(Tier, &str, &[&str]); 3] = [
    (
        Tier::A,
        "high",
        &[
            "TV spots (prime time)",
            "YouTube pre-roll",
            "Instagram and Facebook ads",
            "Outdoor billboards in major cities",
            "Influencer partnerships",
            "Podcast sponsorships",
        ],
    ),
    (
        Tier::B,
        "medium",
        &[
            "Digital video ads",
            "Social media ads",
            "Streaming platform ads",
            "Local radio spots",
        ],
    ),
    (
        Tier::C,
        "low-medium",
        &[
            "Organic social media",
            "Display ads",
            "Email campaigns",
            "Search engine marketing",
        ],
    ),
];

pub fn is_major_market(region: &RegionCode) -> bool {
    MAJOR_MARKETS.contains(&region.as_str())
}

/// Raw growth the region was scored on, if any
pub fn growth_of(ranking: &RegionRanking) -> Option<f64> {
    ranking
        .components
        .iter()
        .find(|c| c.field == MetricField::Growth)
        .map(|c| c.raw)
}

// ============================================================================
// Per region
// ============================================================================

/// Guidance for one region from its tier, market and growth
pub fn region_recommendation(tier: Tier, region: &RegionCode, growth: Option<f64>) -> String {
    let growing = growth.is_some_and(|g| g > EMERGING_GROWTH);
    let text = match tier {
        Tier::A => "Primary target: allocate 25-35% of budget",
        Tier::B if is_major_market(region) => "Secondary target: allocate 10-20% of budget",
        _ if growing => "Emerging opportunity: test with 5-10% of budget",
        Tier::B | Tier::C => "Standard rollout: organic reach plus targeted ads",
        Tier::D => "Lower priority: consider a later phase",
    };
    text.to_string()
}

// ============================================================================
// Rollout strategy
// ============================================================================

/// Strategy notes for a planned rollout
///
/// `rankings` must be in rank order; `dropped` regions get no channel mix.
pub fn rollout_strategy(
    rankings: &[RegionRanking],
    phases: &[Phase],
    dropped: &[RegionCode],
) -> RolloutStrategy {
    if rankings.is_empty() {
        return RolloutStrategy::default();
    }

    let mut recommendations = Vec::new();
    let mut admitted: HashSet<&RegionCode> = HashSet::new();
    for phase in phases {
        let joining: Vec<&RegionCode> = rankings
            .iter()
            .map(|r| &r.region_code)
            .filter(|code| phase.regions.contains(*code) && !admitted.contains(*code))
            .collect();
        if joining.is_empty() {
            continue;
        }
        if phase.index == 1 {
            recommendations.push(format!(
                "Phase 1 ({} to {}): focus on {}",
                phase.start_date,
                phase.end_date,
                join_codes(joining.iter().copied().take(LIST_LIMIT))
            ));
        } else {
            recommendations.push(format!(
                "Phase {} (from {}): expand to {} more market{}",
                phase.index,
                phase.start_date,
                joining.len(),
                if joining.len() == 1 { "" } else { "s" }
            ));
        }
        admitted.extend(joining);
    }

    let growth_markets: Vec<RegionCode> = rankings
        .iter()
        .filter(|r| growth_of(r).is_some_and(|g| g > HIGH_GROWTH))
        .map(|r| r.region_code.clone())
        .collect();
    if !growth_markets.is_empty() {
        recommendations.push(format!(
            "Monitor high-growth markets: {}",
            join_codes(growth_markets.iter().take(LIST_LIMIT))
        ));
    }

    let localization = localization_priority(rankings);
    match &localization {
        Some(priority) => recommendations.push(format!(
            "Localization priority: {} ({} market{})",
            priority.language,
            priority.markets.len(),
            if priority.markets.len() == 1 { "" } else { "s" }
        )),
        None => recommendations.push("Consider a multi-language approach".to_string()),
    }

    RolloutStrategy {
        recommendations,
        growth_markets,
        localization,
        channels: channel_plans(rankings, dropped),
    }
}

/// Language group with the most target regions
pub fn localization_priority(rankings: &[RegionRanking]) -> Option<LocalizationPriority> {
    let mut best: Option<LocalizationPriority> = None;
    for (language, members) in LANGUAGE_MARKETS {
        let markets: Vec<RegionCode> = rankings
            .iter()
            .filter(|r| members.contains(&r.region_code.as_str()))
            .map(|r| r.region_code.clone())
            .collect();
        let better = match &best {
            Some(current) => markets.len() > current.markets.len(),
            None => !markets.is_empty(),
        };
        if better {
            best = Some(LocalizationPriority {
                language: language.to_string(),
                markets,
            });
        }
    }
    best
}

/// Channel mix for tiers A to C; tiers without regions are left out
pub fn channel_plans(rankings: &[RegionRanking], dropped: &[RegionCode]) -> Vec<ChannelPlan> {
    CHANNEL_MIX
        .iter()
        .filter_map(|(tier, investment, channels)| {
            let regions: Vec<RegionCode> = rankings
                .iter()
                .filter(|r| r.tier == *tier && !dropped.contains(&r.region_code))
                .map(|r| r.region_code.clone())
                .collect();
            if regions.is_empty() {
                return None;
            }
            Some(ChannelPlan {
                tier: *tier,
                regions,
                channels: channels.iter().map(|c| c.to_string()).collect(),
                investment_level: investment.to_string(),
            })
        })
        .collect()
}

fn join_codes<'a>(codes: impl Iterator<Item = &'a RegionCode>) -> String {
    codes.map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Campaign insights
// ============================================================================

/// Headline insights for a finished run
///
/// `engagement_rate` is the overall trailer rate in percent.
pub fn campaign_insights(
    sentiment: Option<&SentimentSummary>,
    engagement_rate: Option<f64>,
    rankings: &[RegionRanking],
    skipped: &[SkippedStage],
) -> CampaignInsights {
    let mut insights = CampaignInsights::default();

    match sentiment.map(|s| (s.overall, s.distribution.positive)) {
        Some((SentimentLabel::Positive, positive)) => insights.key_findings.push(format!(
            "Strong positive sentiment ({:.0}% positive): suited to testimonial marketing",
            positive
        )),
        Some((SentimentLabel::Negative, _)) => insights
            .warnings
            .push("Mixed reception detected: consider addressing audience concerns".to_string()),
        _ => {}
    }

    if let Some(rate) = engagement_rate.filter(|r| *r > HIGH_ENGAGEMENT_PCT) {
        insights.key_findings.push(format!(
            "High engagement rate ({:.1}%): strong organic interest",
            rate
        ));
    }

    if let Some(top) = rankings.first() {
        insights.recommendations.push(format!(
            "Prioritize the {} market: highest potential return",
            top.region_code
        ));
    }
    let emerging: Vec<&RegionCode> = rankings
        .iter()
        .filter(|r| r.tier != Tier::A && growth_of(r).is_some_and(|g| g > EMERGING_GROWTH))
        .map(|r| &r.region_code)
        .collect();
    if !emerging.is_empty() {
        insights.recommendations.push(format!(
            "Test budgets in fast-growing markets: {}",
            join_codes(emerging.into_iter().take(LIST_LIMIT))
        ));
    }

    for stage in skipped {
        insights
            .warnings
            .push(format!("{} stage skipped: {}", stage.stage, stage.reason));
    }

    insights
}
