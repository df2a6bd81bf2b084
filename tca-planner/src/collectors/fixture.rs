//! Offline signal fixtures
//!
//! A `SignalFixture` holds canned responses for every source, either read
//! from a JSON file or built in (`SignalFixture::demo`). It backs the
//! binary's `--fixture` and `--demo` modes so a run needs no network.
//!
//! Sections left out of the file leave the matching source unconfigured.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{
    Collector, CollectorError, Comment, EngagementQuery, EngagementReport, MetadataQuery,
    MovieMetadata, PageviewReport, Providers, RegionInterest, SeriesPoint, SignalQuery,
    TrendReport,
};
use crate::error::{PlannerError, PlannerResult};
use crate::models::RegionCode;

/// Canned responses for each source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalFixture {
    #[serde(default)]
    pub metadata: Option<MovieMetadata>,
    #[serde(default)]
    pub engagement: Option<EngagementReport>,
    #[serde(default)]
    pub trends: Option<TrendReport>,
    #[serde(default)]
    pub pageviews: Option<PageviewReport>,
}

impl SignalFixture {
    /// Read a fixture from a JSON file
    pub fn load(path: &Path) -> tca_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: SignalFixture = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            metadata = fixture.metadata.is_some(),
            engagement = fixture.engagement.is_some(),
            trends = fixture.trends.is_some(),
            pageviews = fixture.pageviews.is_some(),
            "Loaded signal fixture"
        );
        Ok(fixture)
    }

    /// Build providers serving this fixture
    ///
    /// The metadata section is mandatory; other sections are optional.
    pub fn into_providers(self) -> PlannerResult<Providers> {
        if self.metadata.is_none() {
            return Err(PlannerError::InvalidInput(
                "fixture has no metadata section".to_string(),
            ));
        }
        let fixture = Arc::new(self);
        let mut providers = Providers::new(Arc::new(FixtureMetadata(Arc::clone(&fixture))));
        if fixture.engagement.is_some() {
            providers = providers.with_engagement(Arc::new(FixtureEngagement(Arc::clone(&fixture))));
        }
        if fixture.trends.is_some() {
            providers = providers.with_trend(Arc::new(FixtureTrends(Arc::clone(&fixture))));
        }
        if fixture.pageviews.is_some() {
            providers = providers.with_pageview(Arc::new(FixturePageviews(Arc::clone(&fixture))));
        }
        Ok(providers)
    }

    /// Built-in demo data for a fictional release
    ///
    /// Series end on `as_of` and cover the 28 days before it.
    pub fn demo(as_of: NaiveDate) -> Self {
        // (region, interest, daily trend slope, base pageviews, daily pageview slope)
        let regions: [(&str, f64, f64, f64, f64); 7] = [
            ("US", 92.0, 1.2, 48_000.0, 900.0),
            ("GB", 78.0, 0.9, 14_000.0, 260.0),
            ("CA", 71.0, 0.5, 7_500.0, 90.0),
            ("AU", 64.0, 0.6, 5_200.0, 70.0),
            ("IN", 58.0, 1.5, 9_800.0, 310.0),
            ("DE", 49.0, 0.1, 6_100.0, 10.0),
            ("FR", 43.0, -0.2, 4_900.0, -15.0),
        ];

        let series = |base: f64, slope: f64| -> Vec<SeriesPoint> {
            (0..28)
                .map(|i| SeriesPoint {
                    date: as_of - Duration::days(27 - i),
                    value: (base + slope * i as f64).max(0.0),
                })
                .collect()
        };

        let trends = regions
            .iter()
            .map(|(code, interest, slope, _, _)| {
                (
                    RegionCode::new(code),
                    RegionInterest {
                        interest: *interest,
                        series: series(interest - slope * 27.0, *slope),
                    },
                )
            })
            .collect();

        let pageviews = regions
            .iter()
            .map(|(code, _, _, base, slope)| (RegionCode::new(code), series(*base, *slope)))
            .collect();

        let regional_engagement: BTreeMap<RegionCode, f64> = [
            ("US", 2.1),
            ("GB", 1.9),
            ("CA", 1.7),
            ("AU", 1.6),
            ("IN", 2.4),
        ]
        .iter()
        .map(|(code, rate)| (RegionCode::new(code), *rate))
        .collect();

        let comments = [
            ("c-001", "This looks absolutely incredible, the visuals are stunning.", 8_500),
            ("c-002", "Can't wait to see this on the biggest screen possible!", 6_200),
            ("c-003", "The score gives me chills every single time.", 4_800),
            ("c-004", "A masterpiece in the making. Pure epic cinema.", 4_100),
            ("c-005", "Finally a sequel that looks better than the first!", 2_900),
            ("c-006", "Looks great but I'm worried about the pacing.", 450),
            ("c-007", "The first one was a bit slow, hope this is tighter.", 320),
            ("c-008", "Feels overrated already, the marketing is everywhere.", 150),
            ("c-009", "Trailer drops the same day as my birthday.", 40),
        ]
        .iter()
        .map(|(id, text, likes)| Comment {
            comment_id: id.to_string(),
            text: text.to_string(),
            like_count: *likes,
        })
        .collect();

        Self {
            metadata: Some(MovieMetadata {
                source_ref: "demo:movie/starfall-ascension".to_string(),
                title: "Starfall: Ascension".to_string(),
                release_date: None,
                tagline: Some("Every light must fall.".to_string()),
                genres: vec!["Science Fiction".to_string(), "Adventure".to_string()],
                cast: vec!["Mara Ilves".to_string(), "Tobias Renn".to_string()],
                keywords: vec!["space opera".to_string(), "sequel".to_string()],
            }),
            engagement: Some(EngagementReport {
                source_ref: "demo:video/starfall-official-trailer".to_string(),
                view_count: 18_400_000,
                like_count: 402_000,
                comment_count: 11_300,
                comments,
                regional_engagement,
            }),
            trends: Some(TrendReport {
                source_ref: "demo:trends".to_string(),
                keyword: "Starfall Ascension".to_string(),
                regions: trends,
            }),
            pageviews: Some(PageviewReport {
                source_ref: "demo:wiki".to_string(),
                article: "Starfall:_Ascension".to_string(),
                regions: pageviews,
            }),
        }
    }
}

fn only_requested<V: Clone>(
    all: &BTreeMap<RegionCode, V>,
    requested: &[RegionCode],
) -> BTreeMap<RegionCode, V> {
    all.iter()
        .filter(|(code, _)| requested.contains(*code))
        .map(|(code, v)| (code.clone(), v.clone()))
        .collect()
}

struct FixtureMetadata(Arc<SignalFixture>);

#[async_trait]
impl Collector for FixtureMetadata {
    type Query = MetadataQuery;
    type Output = MovieMetadata;

    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(&self, _query: &MetadataQuery) -> Result<Option<MovieMetadata>, CollectorError> {
        Ok(self.0.metadata.clone())
    }
}

struct FixtureEngagement(Arc<SignalFixture>);

#[async_trait]
impl Collector for FixtureEngagement {
    type Query = EngagementQuery;
    type Output = EngagementReport;

    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(
        &self,
        query: &EngagementQuery,
    ) -> Result<Option<EngagementReport>, CollectorError> {
        Ok(self.0.engagement.as_ref().map(|report| EngagementReport {
            regional_engagement: only_requested(&report.regional_engagement, &query.regions),
            ..report.clone()
        }))
    }
}

struct FixtureTrends(Arc<SignalFixture>);

#[async_trait]
impl Collector for FixtureTrends {
    type Query = SignalQuery;
    type Output = TrendReport;

    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(&self, query: &SignalQuery) -> Result<Option<TrendReport>, CollectorError> {
        let Some(report) = &self.0.trends else {
            return Ok(None);
        };
        let regions = only_requested(&report.regions, &query.regions);
        if regions.is_empty() {
            return Ok(None);
        }
        Ok(Some(TrendReport {
            regions,
            ..report.clone()
        }))
    }
}

struct FixturePageviews(Arc<SignalFixture>);

#[async_trait]
impl Collector for FixturePageviews {
    type Query = SignalQuery;
    type Output = PageviewReport;

    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(&self, query: &SignalQuery) -> Result<Option<PageviewReport>, CollectorError> {
        let Some(report) = &self.0.pageviews else {
            return Ok(None);
        };
        let regions = only_requested(&report.regions, &query.regions);
        if regions.is_empty() {
            return Ok(None);
        }
        Ok(Some(PageviewReport {
            regions,
            ..report.clone()
        }))
    }
}
