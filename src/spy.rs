use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crawler::PageFetcher;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{prompts, ChatCompletion};
use crate::metrics::MetricsProvider;
use crate::models::{EnrichedKeyword, KeywordSource};
use crate::score::opportunity_score;

#[derive(Deserialize)]
struct InferredKeywords {
    #[serde(default)]
    keywords: Vec<String>,
}

/// Crawls competitor sites, asks the LLM which keywords each appears to
/// target, and enriches the accepted ones with one batched volume call.
pub struct CompetitorSpy {
    fetcher: Arc<dyn PageFetcher>,
    llm: Arc<dyn ChatCompletion>,
    metrics: Arc<dyn MetricsProvider>,
}

impl CompetitorSpy {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        llm: Arc<dyn ChatCompletion>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self { fetcher, llm, metrics }
    }

    /// Spy on up to `max_competitors` URLs.
    ///
    /// `existing` is the run-wide dedup set of lowercased keywords; it is
    /// mutated in place as keywords are accepted so a later competitor in
    /// the same call cannot re-introduce a keyword an earlier one already
    /// contributed. A single competitor's crawl or inference failure is
    /// logged and skipped. On volume-lookup failure every inferred
    /// keyword is kept with zero metrics rather than dropped.
    pub async fn spy(
        &self,
        urls: &[String],
        product_context: &str,
        existing: &mut HashSet<String>,
        max_competitors: usize,
    ) -> Vec<EnrichedKeyword> {
        let mut accepted: Vec<String> = Vec::new();

        for url in urls.iter().take(max_competitors) {
            let inferred = match self.infer_for_competitor(url, product_context).await {
                Ok(keywords) => keywords,
                Err(e) => {
                    warn!("Skipping competitor: {}", e);
                    continue;
                }
            };

            let mut new_for_this_competitor = 0usize;
            for keyword in inferred {
                let key = keyword.to_lowercase();
                if existing.insert(key) {
                    accepted.push(keyword);
                    new_for_this_competitor += 1;
                }
            }
            debug!("Competitor {} contributed {} new keywords", url, new_for_this_competitor);
        }

        if accepted.is_empty() {
            return Vec::new();
        }

        // One batched volume call across everything inferred
        let metrics_by_key: HashMap<String, _> = match self.metrics.get_volumes(&accepted).await {
            Ok(rows) => rows.into_iter().map(|m| (m.keyword.to_lowercase(), m)).collect(),
            Err(e) => {
                warn!("Competitor volume lookup failed, keeping {} keywords with zero metrics: {}", accepted.len(), e);
                HashMap::new()
            }
        };

        let keywords: Vec<EnrichedKeyword> = accepted
            .into_iter()
            .map(|keyword| {
                let mut kw = EnrichedKeyword::without_metrics(keyword, KeywordSource::Competitor);
                if let Some(m) = metrics_by_key.get(&kw.dedup_key()) {
                    kw.search_volume = m.search_volume;
                    kw.cpc = m.cpc;
                    kw.competition = m.competition;
                    kw.competition_level = m.competition_level;
                    kw.trend = m.trend.clone();
                    kw.opportunity_score =
                        opportunity_score(m.search_volume, m.competition, m.cpc, None);
                }
                kw
            })
            .collect();

        info!("Competitor spy produced {} keywords", keywords.len());
        keywords
    }

    async fn infer_for_competitor(
        &self,
        url: &str,
        product_context: &str,
    ) -> PipelineResult<Vec<String>> {
        let crawl = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| PipelineError::spy(url, e.to_string()))?;

        let user = prompts::competitor_keywords_user(product_context, url, &crawl.structured_text);
        let raw = self
            .llm
            .complete_json(prompts::competitor_keywords_system(), &user)
            .await
            .map_err(|e| PipelineError::spy(url, e.to_string()))?;

        let parsed: InferredKeywords = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::spy(url, format!("unparseable inference: {}", e)))?;

        Ok(parsed
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{KeywordMetrics, SerpResult};
    use crate::models::{CompetitionLevel, CrawlResult};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FakeFetcher {
        fail_for: Option<String>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> PipelineResult<CrawlResult> {
            if self.fail_for.as_deref() == Some(url) {
                return Err(PipelineError::fetch(url, "connection refused"));
            }
            Ok(CrawlResult {
                url: url.to_string(),
                title: "Rival".into(),
                meta_description: String::new(),
                meta_keywords: vec![],
                headings: vec![],
                paragraphs: vec![],
                links: vec![],
                og_data: BTreeMap::new(),
                structured_text: format!("content of {}", url),
            })
        }
    }

    /// Returns a fixed keyword list per competitor URL embedded in the prompt
    struct FakeLlm;

    #[async_trait]
    impl ChatCompletion for FakeLlm {
        async fn complete_json(&self, _system: &str, user: &str) -> Result<String> {
            if user.contains("rival-a") {
                Ok(r#"{"keywords": ["shared keyword", "rival a feature", "Note Taking Tips"]}"#.into())
            } else {
                Ok(r#"{"keywords": ["shared keyword", "rival b pricing"]}"#.into())
            }
        }
    }

    struct FakeMetrics {
        fail: bool,
    }

    #[async_trait]
    impl MetricsProvider for FakeMetrics {
        async fn get_volumes(&self, keywords: &[String]) -> PipelineResult<Vec<KeywordMetrics>> {
            if self.fail {
                return Err(PipelineError::provider("get_volumes", "outage"));
            }
            Ok(keywords
                .iter()
                .map(|k| KeywordMetrics {
                    keyword: k.clone(),
                    search_volume: 1000,
                    cpc: 1.0,
                    competition: 0.5,
                    competition_level: CompetitionLevel::Medium,
                    trend: vec![],
                })
                .collect())
        }

        async fn get_suggestions(&self, _seed: &str, _limit: usize) -> PipelineResult<Vec<KeywordMetrics>> {
            Ok(Vec::new())
        }

        async fn get_serp_difficulty(&self, _keywords: &[String]) -> PipelineResult<Vec<SerpResult>> {
            Ok(Vec::new())
        }
    }

    fn spy_with(fail_fetch_for: Option<&str>, fail_metrics: bool) -> CompetitorSpy {
        CompetitorSpy::new(
            Arc::new(FakeFetcher { fail_for: fail_fetch_for.map(String::from) }),
            Arc::new(FakeLlm),
            Arc::new(FakeMetrics { fail: fail_metrics }),
        )
    }

    fn urls() -> Vec<String> {
        vec!["https://rival-a.example".into(), "https://rival-b.example".into()]
    }

    #[tokio::test]
    async fn test_dedup_across_competitors_in_one_call() {
        let spy = spy_with(None, false);
        let mut existing = HashSet::new();
        let keywords = spy.spy(&urls(), "ctx", &mut existing, 3).await;

        // "shared keyword" accepted once, from rival-a only
        let shared: Vec<_> = keywords.iter().filter(|k| k.dedup_key() == "shared keyword").collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(keywords.len(), 4);
        assert!(existing.contains("rival b pricing"));
    }

    #[tokio::test]
    async fn test_existing_keywords_filtered_case_insensitively() {
        let spy = spy_with(None, false);
        let mut existing = HashSet::from(["note taking tips".to_string()]);
        let keywords = spy.spy(&urls(), "ctx", &mut existing, 3).await;
        assert!(keywords.iter().all(|k| k.dedup_key() != "note taking tips"));
    }

    #[tokio::test]
    async fn test_one_competitor_failure_does_not_abort_others() {
        let spy = spy_with(Some("https://rival-a.example"), false);
        let mut existing = HashSet::new();
        let keywords = spy.spy(&urls(), "ctx", &mut existing, 3).await;
        let keys: Vec<String> = keywords.iter().map(|k| k.dedup_key()).collect();
        assert!(keys.contains(&"rival b pricing".to_string()));
        assert!(!keys.contains(&"rival a feature".to_string()));
    }

    #[tokio::test]
    async fn test_provider_outage_keeps_keywords_with_zero_metrics() {
        let spy = spy_with(None, true);
        let mut existing = HashSet::new();
        let keywords = spy.spy(&urls(), "ctx", &mut existing, 3).await;
        assert_eq!(keywords.len(), 4);
        for kw in &keywords {
            assert_eq!(kw.search_volume, 0);
            assert_eq!(kw.opportunity_score, 0);
            assert_eq!(kw.competition_level, CompetitionLevel::Unknown);
            assert_eq!(kw.source, KeywordSource::Competitor);
        }
    }

    #[tokio::test]
    async fn test_max_competitors_respected() {
        let spy = spy_with(None, false);
        let mut existing = HashSet::new();
        let keywords = spy.spy(&urls(), "ctx", &mut existing, 1).await;
        // only rival-a visited
        assert!(keywords.iter().all(|k| k.dedup_key() != "rival b pricing"));
    }
}
