use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{CompetitionLevel, CompetitionValue};

/// SERP lookups are batched this many keywords per request
const SERP_BATCH: usize = 3;

/// Domains whose presence in the top 10 signals a hard SERP.
const BIG_BRANDS: &[&str] = &[
    "wikipedia.org",
    "amazon.com",
    "youtube.com",
    "facebook.com",
    "reddit.com",
    "quora.com",
    "pinterest.com",
    "linkedin.com",
    "instagram.com",
    "ebay.com",
    "walmart.com",
    "nytimes.com",
    "forbes.com",
    "medium.com",
    "github.com",
];

/// Volume/CPC/competition data for one keyword
#[derive(Debug, Clone)]
pub struct KeywordMetrics {
    pub keyword: String,
    pub search_volume: u64,
    pub cpc: f64,
    pub competition: f64,
    pub competition_level: CompetitionLevel,
    /// Trailing 12-month monthly search counts
    pub trend: Vec<i64>,
}

/// SERP difficulty for one keyword, 0-100
#[derive(Debug, Clone)]
pub struct SerpResult {
    pub keyword: String,
    pub difficulty: u8,
}

/// Seam over the external metrics provider. All three operations fail
/// with a Provider error which callers must treat as non-fatal.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Batched volume/CPC/competition/trend lookup
    async fn get_volumes(&self, keywords: &[String]) -> PipelineResult<Vec<KeywordMetrics>>;
    /// Keyword-expansion lookup for one seed
    async fn get_suggestions(&self, seed: &str, limit: usize) -> PipelineResult<Vec<KeywordMetrics>>;
    /// Batched organic-SERP difficulty lookup
    async fn get_serp_difficulty(&self, keywords: &[String]) -> PipelineResult<Vec<SerpResult>>;
}

/// HTTP client for the metrics provider API
pub struct MetricsClient {
    client: Client,
    config: MetricsConfig,
}

#[derive(Serialize)]
struct VolumeRequest<'a> {
    keywords: &'a [String],
    location_code: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct SuggestionRequest<'a> {
    keyword: &'a str,
    limit: usize,
    location_code: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct SerpRequest<'a> {
    keyword: &'a str,
    location_code: u32,
    language_code: &'a str,
    depth: u32,
}

#[derive(Deserialize)]
struct ProviderResponse<T> {
    #[serde(default = "Vec::new")]
    tasks: Vec<ProviderTask<T>>,
}

#[derive(Deserialize)]
struct ProviderTask<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

/// One keyword row as returned by the volume endpoint. Competition may
/// arrive as a categorical level or a numeric value.
#[derive(Deserialize)]
pub struct VolumeItem {
    pub keyword: String,
    #[serde(default)]
    pub search_volume: Option<u64>,
    #[serde(default)]
    pub cpc: Option<f64>,
    #[serde(default)]
    pub competition: Option<CompetitionValue>,
    #[serde(default)]
    pub monthly_searches: Option<Vec<MonthlySearch>>,
}

#[derive(Deserialize)]
pub struct MonthlySearch {
    #[serde(default)]
    pub search_volume: i64,
}

#[derive(Deserialize)]
struct SuggestionResult {
    #[serde(default = "Vec::new")]
    items: Vec<SuggestionItem>,
}

#[derive(Deserialize)]
struct SuggestionItem {
    keyword: String,
    #[serde(default)]
    keyword_info: Option<KeywordInfo>,
}

#[derive(Deserialize)]
struct KeywordInfo {
    #[serde(default)]
    search_volume: Option<u64>,
    #[serde(default)]
    cpc: Option<f64>,
    #[serde(default)]
    competition: Option<CompetitionValue>,
    #[serde(default)]
    monthly_searches: Option<Vec<MonthlySearch>>,
}

#[derive(Deserialize)]
struct SerpTaskResult {
    keyword: String,
    #[serde(default = "Vec::new")]
    items: Vec<SerpItem>,
}

/// One SERP entry: an organic result or a feature block
#[derive(Debug, Deserialize)]
pub struct SerpItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub rank_group: Option<u32>,
}

impl MetricsClient {
    pub fn new(config: &MetricsConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn check_credentials(&self, operation: &str) -> PipelineResult<()> {
        if self.config.login.is_empty() || self.config.password.is_empty() {
            return Err(PipelineError::provider(operation, "missing credentials"));
        }
        Ok(())
    }

    /// POST one request carrying `bodies` as the provider's task array
    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        path: &str,
        bodies: &[B],
    ) -> PipelineResult<ProviderResponse<T>> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.login, Some(&self.config.password))
            .json(bodies)
            .send()
            .await
            .map_err(|e| PipelineError::provider(operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::provider(operation, format!("HTTP status {}", status)));
        }

        response
            .json::<ProviderResponse<T>>()
            .await
            .map_err(|e| PipelineError::provider(operation, format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl MetricsProvider for MetricsClient {
    async fn get_volumes(&self, keywords: &[String]) -> PipelineResult<Vec<KeywordMetrics>> {
        self.check_credentials("get_volumes")?;
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let request = VolumeRequest {
            keywords,
            location_code: self.config.location_code,
            language_code: &self.config.language_code,
        };

        let response: ProviderResponse<VolumeItem> = self
            .post("get_volumes", "/keywords_data/google_ads/search_volume/live", &[request])
            .await?;

        let metrics: Vec<KeywordMetrics> = response
            .tasks
            .into_iter()
            .flat_map(|t| t.result)
            .map(metrics_from_volume_item)
            .collect();

        debug!("get_volumes: {} keywords in, {} rows out", keywords.len(), metrics.len());
        Ok(metrics)
    }

    async fn get_suggestions(&self, seed: &str, limit: usize) -> PipelineResult<Vec<KeywordMetrics>> {
        self.check_credentials("get_suggestions")?;

        let request = SuggestionRequest {
            keyword: seed,
            limit,
            location_code: self.config.location_code,
            language_code: &self.config.language_code,
        };

        let response: ProviderResponse<SuggestionResult> = self
            .post("get_suggestions", "/dataforseo_labs/google/keyword_suggestions/live", &[request])
            .await?;

        let metrics: Vec<KeywordMetrics> = response
            .tasks
            .into_iter()
            .flat_map(|t| t.result)
            .flat_map(|r| r.items)
            .map(metrics_from_suggestion_item)
            .collect();

        debug!("get_suggestions(\"{}\"): {} rows", seed, metrics.len());
        Ok(metrics)
    }

    async fn get_serp_difficulty(&self, keywords: &[String]) -> PipelineResult<Vec<SerpResult>> {
        self.check_credentials("get_serp_difficulty")?;
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        // One POST per chunk of 3 keywords, each carrying the chunk's
        // task objects, dispatched concurrently
        let batches = serp_request_batches(keywords, &self.config);
        let futures: Vec<_> = batches.iter().map(|batch| self.serp_post(batch)).collect();

        let mut results = Vec::new();
        let mut failed_chunks = 0usize;
        for outcome in join_all(futures).await {
            match outcome {
                Ok(mut chunk_results) => results.append(&mut chunk_results),
                Err(e) => {
                    warn!("SERP chunk failed: {}", e);
                    failed_chunks += 1;
                }
            }
        }

        if results.is_empty() && failed_chunks > 0 {
            return Err(PipelineError::provider(
                "get_serp_difficulty",
                format!("all {} SERP chunks failed", failed_chunks),
            ));
        }

        Ok(results)
    }
}

impl MetricsClient {
    async fn serp_post(&self, batch: &[SerpRequest<'_>]) -> PipelineResult<Vec<SerpResult>> {
        let response: ProviderResponse<SerpTaskResult> = self
            .post("get_serp_difficulty", "/serp/google/organic/live/advanced", batch)
            .await?;

        Ok(response
            .tasks
            .into_iter()
            .flat_map(|t| t.result)
            .map(|task_result| SerpResult {
                keyword: task_result.keyword,
                difficulty: difficulty_from_items(&task_result.items),
            })
            .collect())
    }
}

/// Group keywords into SERP request bodies, one inner vec per HTTP
/// request, at most 3 task objects each
fn serp_request_batches<'a>(
    keywords: &'a [String],
    config: &'a MetricsConfig,
) -> Vec<Vec<SerpRequest<'a>>> {
    keywords
        .chunks(SERP_BATCH)
        .map(|chunk| {
            chunk
                .iter()
                .map(|keyword| SerpRequest {
                    keyword,
                    location_code: config.location_code,
                    language_code: &config.language_code,
                    depth: 10,
                })
                .collect()
        })
        .collect()
}

fn trailing_trend(monthly: Option<Vec<MonthlySearch>>) -> Vec<i64> {
    let mut trend: Vec<i64> = monthly
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.search_volume)
        .collect();
    if trend.len() > 12 {
        trend = trend.split_off(trend.len() - 12);
    }
    trend
}

/// Normalize one volume-endpoint row into KeywordMetrics
pub fn metrics_from_volume_item(item: VolumeItem) -> KeywordMetrics {
    let (competition, competition_level) = CompetitionValue::normalize(item.competition.as_ref());
    KeywordMetrics {
        keyword: item.keyword,
        search_volume: item.search_volume.unwrap_or(0),
        cpc: item.cpc.unwrap_or(0.0).max(0.0),
        competition,
        competition_level,
        trend: trailing_trend(item.monthly_searches),
    }
}

fn metrics_from_suggestion_item(item: SuggestionItem) -> KeywordMetrics {
    let info = item.keyword_info;
    let (competition, competition_level) =
        CompetitionValue::normalize(info.as_ref().and_then(|i| i.competition.as_ref()));
    KeywordMetrics {
        keyword: item.keyword,
        search_volume: info.as_ref().and_then(|i| i.search_volume).unwrap_or(0),
        cpc: info.as_ref().and_then(|i| i.cpc).unwrap_or(0.0).max(0.0),
        competition,
        competition_level,
        trend: trailing_trend(info.and_then(|i| i.monthly_searches)),
    }
}

/// 0-100 SERP difficulty from the top-10 composition:
/// 8 points per big-brand domain, up to 30 points for overall domain
/// density, 10 points when a featured snippet is present.
pub fn difficulty_from_items(items: &[SerpItem]) -> u8 {
    let top10: Vec<&SerpItem> = items
        .iter()
        .filter(|i| i.item_type == "organic" && i.rank_group.map(|r| r <= 10).unwrap_or(false))
        .collect();

    let big_brands = top10
        .iter()
        .filter(|i| {
            i.domain
                .as_deref()
                .map(|d| BIG_BRANDS.iter().any(|b| d == *b || d.ends_with(&format!(".{}", b))))
                .unwrap_or(false)
        })
        .count() as u32;

    let domain_count = top10.iter().filter(|i| i.domain.is_some()).count() as u32;
    let has_snippet = items.iter().any(|i| i.item_type == "featured_snippet");

    let score = 8 * big_brands + (3 * domain_count).min(30) + if has_snippet { 10 } else { 0 };
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn organic(domain: &str, rank: u32) -> SerpItem {
        SerpItem {
            item_type: "organic".into(),
            domain: Some(domain.into()),
            rank_group: Some(rank),
        }
    }

    #[test]
    fn test_difficulty_empty_serp() {
        assert_eq!(difficulty_from_items(&[]), 0);
    }

    #[test]
    fn test_difficulty_counts_big_brands_and_density() {
        let items = vec![
            organic("wikipedia.org", 1),
            organic("smallblog.example", 2),
            organic("reddit.com", 3),
        ];
        // 2 big brands (16) + 3 domains (9), no snippet
        assert_eq!(difficulty_from_items(&items), 25);
    }

    #[test]
    fn test_difficulty_matches_subdomains() {
        let items = vec![organic("en.wikipedia.org", 1)];
        // 1 big brand (8) + 1 domain (3)
        assert_eq!(difficulty_from_items(&items), 11);
    }

    #[test]
    fn test_difficulty_snippet_bonus() {
        let mut items = vec![organic("smallblog.example", 1)];
        items.push(SerpItem {
            item_type: "featured_snippet".into(),
            domain: None,
            rank_group: None,
        });
        assert_eq!(difficulty_from_items(&items), 3 + 10);
    }

    #[test]
    fn test_difficulty_density_caps_at_30() {
        let items: Vec<SerpItem> = (1..=10).map(|r| organic(&format!("site{}.example", r), r)).collect();
        assert_eq!(difficulty_from_items(&items), 30);
    }

    #[test]
    fn test_difficulty_caps_at_100() {
        let items: Vec<SerpItem> = (1..=10).map(|r| organic("wikipedia.org", r)).collect();
        // 10 big brands (80) + 30 density = 110, capped
        assert_eq!(difficulty_from_items(&items), 100);
    }

    #[test]
    fn test_difficulty_ignores_below_top10() {
        let items = vec![organic("wikipedia.org", 11)];
        assert_eq!(difficulty_from_items(&items), 0);
    }

    #[test]
    fn test_volume_item_with_numeric_competition() {
        let json = r#"{
            "keyword": "app ideas",
            "search_volume": 5000,
            "cpc": 2.0,
            "competition": 0.3,
            "monthly_searches": [{"search_volume": 4000}, {"search_volume": 6000}]
        }"#;
        let item: VolumeItem = serde_json::from_str(json).unwrap();
        let metrics = metrics_from_volume_item(item);
        assert_eq!(metrics.search_volume, 5000);
        assert_eq!(metrics.competition_level, CompetitionLevel::Low);
        assert_eq!(metrics.trend, vec![4000, 6000]);
    }

    #[test]
    fn test_volume_item_with_level_competition() {
        let json = r#"{"keyword": "crm software", "search_volume": 900, "competition": "HIGH"}"#;
        let item: VolumeItem = serde_json::from_str(json).unwrap();
        let metrics = metrics_from_volume_item(item);
        assert_eq!(metrics.competition, 0.85);
        assert_eq!(metrics.competition_level, CompetitionLevel::High);
        assert!(metrics.trend.is_empty());
    }

    #[test]
    fn test_volume_item_unresolvable_defaults() {
        let json = r#"{"keyword": "obscure term"}"#;
        let item: VolumeItem = serde_json::from_str(json).unwrap();
        let metrics = metrics_from_volume_item(item);
        assert_eq!(metrics.search_volume, 0);
        assert_eq!(metrics.cpc, 0.0);
        assert_eq!(metrics.competition, 0.0);
        assert_eq!(metrics.competition_level, CompetitionLevel::Low);
    }

    fn metrics_config() -> MetricsConfig {
        MetricsConfig {
            api_base: "https://provider.example".into(),
            login: "user".into(),
            password: "pass".into(),
            location_code: 2840,
            language_code: "en".into(),
            request_timeout_seconds: 30,
        }
    }

    #[test]
    fn test_serp_batches_three_keywords_per_request() {
        let config = metrics_config();
        let keywords: Vec<String> = (0..15).map(|i| format!("kw {}", i)).collect();

        let batches = serp_request_batches(&keywords, &config);
        // 15 keywords become 5 HTTP requests of 3 task objects each
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.len() == 3));

        // one request body serializes as a task array, not a single task
        let body = serde_json::to_value(&batches[0]).unwrap();
        let tasks = body.as_array().unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0]["keyword"], "kw 0");
        assert_eq!(tasks[2]["keyword"], "kw 2");
    }

    #[test]
    fn test_serp_batches_partial_final_chunk() {
        let config = metrics_config();
        let keywords: Vec<String> = (0..7).map(|i| format!("kw {}", i)).collect();
        let batches = serp_request_batches(&keywords, &config);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_trend_truncated_to_trailing_12_months() {
        let monthly: Vec<MonthlySearch> = (0..18).map(|i| MonthlySearch { search_volume: i }).collect();
        let trend = trailing_trend(Some(monthly));
        assert_eq!(trend.len(), 12);
        assert_eq!(trend[0], 6);
        assert_eq!(trend[11], 17);
    }
}
