//! Source interfaces consumed by the pipeline
//!
//! Every external data source sits behind one async `Collector` trait,
//! instantiated per source with a typed query and output. `Ok(None)` means
//! the source answered but had nothing for the query. Sentiment scoring and
//! creative generation are black boxes with their own narrow traits.
//!
//! `Providers` is the set of implementations a pipeline runs with. It is
//! assembled once, before the pipeline is built; a source left as `None`
//! is reported as a skipped stage on every run.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::SentimentSummary;
use crate::models::{RegionCode, RegionRanking};

pub mod fixture;
pub mod lexicon;

pub use fixture::SignalFixture;
pub use lexicon::LexiconSentiment;

/// Collector failure
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl CollectorError {
    /// Failure description without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            CollectorError::Unavailable(detail) => detail.clone(),
            CollectorError::RateLimited {
                retry_after_ms: Some(ms),
            } => format!("rate limited, retry after {}ms", ms),
            CollectorError::RateLimited { retry_after_ms: None } => "rate limited".to_string(),
            CollectorError::Malformed(detail) => format!("malformed response: {}", detail),
        }
    }
}

/// Uniform interface over one external data source
///
/// # Example
/// ```rust,ignore
/// use tca_planner::collectors::{Collector, CollectorError, MetadataQuery, MovieMetadata};
///
/// struct CatalogClient;
///
/// #[async_trait::async_trait]
/// impl Collector for CatalogClient {
///     type Query = MetadataQuery;
///     type Output = MovieMetadata;
///
///     fn name(&self) -> &'static str { "catalog" }
///
///     async fn fetch(&self, query: &MetadataQuery) -> Result<Option<MovieMetadata>, CollectorError> {
///         lookup(&query.movie_reference).await
///     }
/// }
/// ```
#[async_trait]
pub trait Collector: Send + Sync {
    type Query: Send + Sync;
    type Output: Send;

    /// Provider name for provenance
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &Self::Query) -> Result<Option<Self::Output>, CollectorError>;
}

/// Black-box polarity scorer
pub trait SentimentScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compound polarity in [-1, 1]
    fn compound(&self, text: &str) -> f64;
}

/// Black-box creative generator; output is merged into the campaign as-is
#[async_trait]
pub trait CreativeGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        movie: &MovieMetadata,
        rankings: &[RegionRanking],
        sentiment: Option<&SentimentSummary>,
    ) -> Result<serde_json::Value, CollectorError>;
}

// ============================================================================
// Queries and outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataQuery {
    pub movie_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieMetadata {
    /// Provider key or URL the record came from
    pub source_ref: String,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementQuery {
    pub trailer_reference: String,
    pub regions: Vec<RegionCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub text: String,
    #[serde(default)]
    pub like_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementReport {
    pub source_ref: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Engagement rate per region when the provider breaks it down
    #[serde(default)]
    pub regional_engagement: BTreeMap<RegionCode, f64>,
}

/// Query shared by the trend and pageview sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalQuery {
    pub title: String,
    pub regions: Vec<RegionCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInterest {
    /// Search interest, 0-100
    pub interest: f64,
    #[serde(default)]
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub source_ref: String,
    pub keyword: String,
    pub regions: BTreeMap<RegionCode, RegionInterest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageviewReport {
    pub source_ref: String,
    pub article: String,
    /// Daily views per region
    pub regions: BTreeMap<RegionCode, Vec<SeriesPoint>>,
}

// ============================================================================
// Provider set
// ============================================================================

pub type MetadataSource = dyn Collector<Query = MetadataQuery, Output = MovieMetadata>;
pub type EngagementSource = dyn Collector<Query = EngagementQuery, Output = EngagementReport>;
pub type TrendSource = dyn Collector<Query = SignalQuery, Output = TrendReport>;
pub type PageviewSource = dyn Collector<Query = SignalQuery, Output = PageviewReport>;

/// Implementations a pipeline runs with
#[derive(Clone)]
pub struct Providers {
    pub metadata: Arc<MetadataSource>,
    pub engagement: Option<Arc<EngagementSource>>,
    pub trend: Option<Arc<TrendSource>>,
    pub pageview: Option<Arc<PageviewSource>>,
    pub sentiment: Arc<dyn SentimentScorer>,
    pub creative: Option<Arc<dyn CreativeGenerator>>,
}

impl Providers {
    /// Metadata only, lexicon sentiment, nothing else configured
    pub fn new(metadata: Arc<MetadataSource>) -> Self {
        Self {
            metadata,
            engagement: None,
            trend: None,
            pageview: None,
            sentiment: Arc::new(LexiconSentiment::new()),
            creative: None,
        }
    }

    pub fn with_engagement(mut self, source: Arc<EngagementSource>) -> Self {
        self.engagement = Some(source);
        self
    }

    pub fn with_trend(mut self, source: Arc<TrendSource>) -> Self {
        self.trend = Some(source);
        self
    }

    pub fn with_pageview(mut self, source: Arc<PageviewSource>) -> Self {
        self.pageview = Some(source);
        self
    }

    pub fn with_sentiment(mut self, scorer: Arc<dyn SentimentScorer>) -> Self {
        self.sentiment = scorer;
        self
    }

    pub fn with_creative(mut self, generator: Arc<dyn CreativeGenerator>) -> Self {
        self.creative = Some(generator);
        self
    }

    /// Names of the configured providers, for startup logging
    pub fn describe(&self) -> Vec<String> {
        let mut names = vec![format!("metadata={}", self.metadata.name())];
        if let Some(s) = &self.engagement {
            names.push(format!("engagement={}", s.name()));
        }
        if let Some(s) = &self.trend {
            names.push(format!("trend={}", s.name()));
        }
        if let Some(s) = &self.pageview {
            names.push(format!("pageview={}", s.name()));
        }
        names.push(format!("sentiment={}", self.sentiment.name()));
        if let Some(g) = &self.creative {
            names.push(format!("creative={}", g.name()));
        }
        names
    }
}
