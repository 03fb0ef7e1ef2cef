use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::SiteAnalyzer;
use crate::classifier::{ClassifyItem, KeywordClassifier};
use crate::clusters::ClusterBuilder;
use crate::config::PipelineConfig;
use crate::crawler::{self, PageFetcher};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatCompletion;
use crate::metrics::{KeywordMetrics, MetricsProvider};
use crate::models::{
    AnalysisOutcome, AnalysisStats, CrawlResult, EnrichedKeyword, KeywordSource, SiteAnalysis,
};
use crate::score::opportunity_score;
use crate::spy::CompetitorSpy;
use crate::storage::{AnalysisRecord, StorageManager};

/// Seeds fanned out for expansion
const EXPAND_SEED_LIMIT: usize = 5;
/// Seeds below this volume are not worth expanding
const EXPAND_MIN_VOLUME: u64 = 10;
/// Suggestions requested per expanded seed
const SUGGESTIONS_PER_SEED: usize = 20;
/// Keywords sent for SERP difficulty lookup
const SERP_KEYWORD_LIMIT: usize = 15;
/// Keywords below this volume skip the SERP lookup
const SERP_MIN_VOLUME: u64 = 50;

/// Runs one keyword analysis end to end: crawl, site analysis, metric
/// enrichment, expansion, classification, competitor spying, SERP
/// enrichment, scoring, clustering, persistence.
///
/// Only the crawl and the site analysis can fail the run; every later
/// stage degrades and the pipeline still produces a persisted result.
pub struct AnalysisPipeline {
    fetcher: Arc<dyn PageFetcher>,
    llm: Arc<dyn ChatCompletion>,
    metrics: Arc<dyn MetricsProvider>,
    storage: Arc<StorageManager>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        llm: Arc<dyn ChatCompletion>,
        metrics: Arc<dyn MetricsProvider>,
        storage: Arc<StorageManager>,
        config: PipelineConfig,
    ) -> Self {
        Self { fetcher, llm, metrics, storage, config }
    }

    /// Analyze a site for an owner, bounded by the configured wall-clock
    /// budget. `force` bypasses the freshness cache.
    pub async fn run(
        &self,
        owner: &str,
        url: &str,
        force: bool,
    ) -> PipelineResult<AnalysisOutcome> {
        let budget = Duration::from_secs(self.config.time_budget_seconds);
        match tokio::time::timeout(budget, self.run_inner(owner, url, force)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout { seconds: self.config.time_budget_seconds }),
        }
    }

    async fn run_inner(
        &self,
        owner: &str,
        url: &str,
        force: bool,
    ) -> PipelineResult<AnalysisOutcome> {
        let run_started = Instant::now();
        let url = crawler::normalize_url(url)?;

        // Cache check
        if force {
            info!("Cache bypassed for {}", url);
        } else if let Some(id) = self.fresh_cached_analysis(owner, &url).await {
            info!("Serving cached analysis {} for {}", id, url);
            return Ok(AnalysisOutcome::Cached { analysis_id: id });
        }

        // Crawl, fatal on failure
        let stage = Instant::now();
        let crawl = self.fetcher.fetch(&url).await?;
        info!("Crawled {} in {}ms", url, stage.elapsed().as_millis());

        // Site analysis, fatal on failure
        let stage = Instant::now();
        let analysis = SiteAnalyzer::new(self.llm.clone()).analyze(&crawl).await?;
        info!("Analyzed site in {}ms", stage.elapsed().as_millis());

        let product_context =
            format!("{} Target audience: {}", analysis.product_summary, analysis.target_audience);

        // Seed enrichment: one batched volume call, keep seeds on outage
        let stage = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        let mut keywords = self.enrich_seeds(&analysis, &mut seen).await;
        info!("Enriched {} seeds in {}ms", keywords.len(), stage.elapsed().as_millis());

        // Expansion fan-out over the strongest seeds
        let stage = Instant::now();
        let expanded = self.expand_seeds(&keywords, &mut seen).await;
        let expanded_count = expanded.len();
        info!("Expanded into {} new keywords in {}ms", expanded_count, stage.elapsed().as_millis());

        // Classification of the newly discovered keywords
        let stage = Instant::now();
        let mut expanded = expanded;
        self.classify_new(&mut expanded, &product_context).await;
        keywords.append(&mut expanded);
        info!("Classified new keywords in {}ms", stage.elapsed().as_millis());

        // Competitor spying, http(s) targets only
        let stage = Instant::now();
        let competitor_urls: Vec<String> = analysis
            .competitors
            .iter()
            .map(|c| c.url.clone())
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .collect();
        let spy = CompetitorSpy::new(self.fetcher.clone(), self.llm.clone(), self.metrics.clone());
        let mut competitor_keywords = spy
            .spy(&competitor_urls, &product_context, &mut seen, self.config.max_competitors)
            .await;
        let competitor_count = competitor_keywords.len();
        keywords.append(&mut competitor_keywords);
        info!(
            "Spied {} competitors for {} keywords in {}ms",
            competitor_urls.len().min(self.config.max_competitors),
            competitor_count,
            stage.elapsed().as_millis()
        );

        // SERP enrichment and re-scoring
        let stage = Instant::now();
        self.enrich_serp(&mut keywords).await;
        let with_serp_data = keywords.iter().filter(|k| k.serp_difficulty.is_some()).count();
        info!("SERP data attached to {} keywords in {}ms", with_serp_data, stage.elapsed().as_millis());

        // Deterministic final ordering
        keywords.sort_by(|a, b| {
            b.opportunity_score
                .cmp(&a.opportunity_score)
                .then(b.search_volume.cmp(&a.search_volume))
                .then(a.keyword.cmp(&b.keyword))
        });

        // Clustering, best-effort
        let stage = Instant::now();
        let clusters = ClusterBuilder::new(self.llm.clone())
            .build_clusters(&keywords, &product_context)
            .await;
        info!("Clustering finished in {}ms", stage.elapsed().as_millis());

        // Persist
        let analysis_id = Uuid::new_v4().to_string();
        let stage = Instant::now();
        self.persist(&analysis_id, owner, &url, &crawl, &analysis, &keywords, &clusters).await;
        info!("Persisted analysis {} in {}ms", analysis_id, stage.elapsed().as_millis());

        let stats = AnalysisStats {
            total_keywords: keywords.len(),
            with_volume: keywords.iter().filter(|k| k.search_volume > 0).count(),
            expanded: expanded_count,
            from_competitors: competitor_count,
            with_serp_data,
            clusters: clusters.len(),
        };

        self.spawn_snapshot_refresh(url.clone());

        info!(
            "Analysis {} completed in {}ms - keywords={}, clusters={}",
            analysis_id,
            run_started.elapsed().as_millis(),
            stats.total_keywords,
            stats.clusters
        );

        Ok(AnalysisOutcome::Fresh { analysis_id, stats })
    }

    /// A cached analysis id if one exists inside the freshness window.
    /// Lookup errors count as a cache miss.
    async fn fresh_cached_analysis(&self, owner: &str, url: &str) -> Option<String> {
        match self.storage.latest_analysis(owner, url).await {
            Ok(Some((id, created_at))) => {
                let age = Utc::now() - created_at;
                if age < ChronoDuration::hours(self.config.cache_freshness_hours) {
                    Some(id)
                } else {
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Build enriched keywords from the analysis seeds with one batched
    /// volume call. On provider failure every seed is kept with zero
    /// metrics; the LLM-assigned tags survive either way.
    async fn enrich_seeds(
        &self,
        analysis: &SiteAnalysis,
        seen: &mut HashSet<String>,
    ) -> Vec<EnrichedKeyword> {
        let mut unique_seeds = Vec::new();
        for seed in &analysis.seed_keywords {
            if seen.insert(seed.keyword.to_lowercase()) {
                unique_seeds.push(seed);
            }
        }

        let names: Vec<String> = unique_seeds.iter().map(|s| s.keyword.clone()).collect();
        let mut by_key: HashMap<String, KeywordMetrics> = match self.metrics.get_volumes(&names).await
        {
            Ok(rows) => rows.into_iter().map(|m| (m.keyword.to_lowercase(), m)).collect(),
            Err(e) => {
                warn!("Seed volume lookup failed, keeping {} seeds with zero metrics: {}", names.len(), e);
                HashMap::new()
            }
        };

        unique_seeds
            .into_iter()
            .map(|seed| {
                let mut kw = match by_key.remove(&seed.keyword.to_lowercase()) {
                    Some(m) => enriched_from_metrics(seed.keyword.clone(), m, KeywordSource::Seed),
                    None => EnrichedKeyword::without_metrics(
                        seed.keyword.clone(),
                        KeywordSource::Seed,
                    ),
                };
                kw.intent = seed.intent;
                kw.relevance = seed.relevance;
                kw.category = seed.category;
                kw
            })
            .collect()
    }

    /// Fan out suggestion lookups over the strongest seeds. A failed
    /// seed contributes nothing; results merge sequentially through the
    /// shared dedup set.
    async fn expand_seeds(
        &self,
        keywords: &[EnrichedKeyword],
        seen: &mut HashSet<String>,
    ) -> Vec<EnrichedKeyword> {
        let mut candidates: Vec<(&str, u64)> = keywords
            .iter()
            .filter(|k| k.source == KeywordSource::Seed && k.search_volume >= EXPAND_MIN_VOLUME)
            .map(|k| (k.keyword.as_str(), k.search_volume))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        candidates.truncate(EXPAND_SEED_LIMIT);

        let lookups = candidates
            .iter()
            .map(|(seed, _)| self.metrics.get_suggestions(seed, SUGGESTIONS_PER_SEED));
        let results = join_all(lookups).await;

        let mut expanded = Vec::new();
        for ((seed, _), result) in candidates.iter().zip(results) {
            let suggestions = match result {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Expansion of seed '{}' failed: {}", seed, e);
                    continue;
                }
            };
            for m in suggestions {
                if seen.insert(m.keyword.to_lowercase()) {
                    expanded.push(enriched_from_metrics(
                        m.keyword.clone(),
                        m,
                        KeywordSource::Expanded,
                    ));
                }
            }
        }
        expanded
    }

    /// Tag newly discovered keywords; keywords a failed batch misses
    /// keep their defaults.
    async fn classify_new(&self, expanded: &mut [EnrichedKeyword], product_context: &str) {
        if expanded.is_empty() {
            return;
        }
        let items: Vec<ClassifyItem> = expanded
            .iter()
            .map(|k| ClassifyItem {
                keyword: k.keyword.clone(),
                search_volume: k.search_volume,
                cpc: k.cpc,
            })
            .collect();

        let tags =
            KeywordClassifier::new(self.llm.clone()).classify(&items, product_context).await;
        for kw in expanded.iter_mut() {
            if let Some(tag) = tags.get(&kw.dedup_key()) {
                kw.intent = tag.intent;
                kw.relevance = tag.relevance;
                kw.category = tag.category;
            }
        }
    }

    /// Look up SERP difficulty for the strongest keywords and re-score
    /// every keyword the lookup covered.
    async fn enrich_serp(&self, keywords: &mut [EnrichedKeyword]) {
        let mut candidates: Vec<(&str, i64)> = keywords
            .iter()
            .filter(|k| k.search_volume >= SERP_MIN_VOLUME)
            .map(|k| (k.keyword.as_str(), k.opportunity_score))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        candidates.truncate(SERP_KEYWORD_LIMIT);

        if candidates.is_empty() {
            return;
        }
        let names: Vec<String> = candidates.iter().map(|(k, _)| k.to_string()).collect();

        let difficulties: HashMap<String, u8> = match self.metrics.get_serp_difficulty(&names).await
        {
            Ok(rows) => rows.into_iter().map(|r| (r.keyword.to_lowercase(), r.difficulty)).collect(),
            Err(e) => {
                warn!("SERP lookup failed, scores keep their metric-only value: {}", e);
                return;
            }
        };

        for kw in keywords.iter_mut() {
            if let Some(&difficulty) = difficulties.get(&kw.dedup_key()) {
                kw.serp_difficulty = Some(difficulty);
                kw.opportunity_score = opportunity_score(
                    kw.search_volume,
                    kw.competition,
                    kw.cpc,
                    Some(difficulty),
                );
            }
        }
    }

    /// Write everything. Persistence never fails the run: each failed
    /// piece is logged and the rest continues.
    async fn persist(
        &self,
        analysis_id: &str,
        owner: &str,
        url: &str,
        crawl: &CrawlResult,
        analysis: &SiteAnalysis,
        keywords: &[EnrichedKeyword],
        clusters: &[crate::models::KeywordCluster],
    ) {
        let record = AnalysisRecord {
            id: analysis_id.to_string(),
            owner: owner.to_string(),
            url: url.to_string(),
            site_title: crawl.title.clone(),
            site_description: crawl.meta_description.clone(),
            product_summary: analysis.product_summary.clone(),
            target_audience: analysis.target_audience.clone(),
            content_angles: analysis.content_angles.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.storage.insert_analysis(&record).await {
            warn!("Analysis record not persisted: {}", e);
        }

        let written = self.storage.insert_keywords(analysis_id, keywords).await;
        if written < keywords.len() {
            warn!("Persisted {}/{} keywords", written, keywords.len());
        }

        if let Err(e) = self.storage.insert_competitors(analysis_id, &analysis.competitors).await {
            warn!("Competitors not persisted: {}", e);
        }
        if let Err(e) = self.storage.insert_clusters(analysis_id, clusters).await {
            warn!("Clusters not persisted: {}", e);
        }
    }

    /// Detached re-crawl that refreshes the stored page snapshot. Never
    /// awaited; failure is only logged.
    fn spawn_snapshot_refresh(&self, url: String) {
        let fetcher = self.fetcher.clone();
        let storage = self.storage.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&url).await {
                Ok(crawl) => {
                    if let Err(e) = storage.upsert_site_page(&crawl).await {
                        warn!("Snapshot refresh for {} not stored: {}", url, e);
                    }
                }
                Err(e) => warn!("Snapshot refresh crawl for {} failed: {}", url, e),
            }
        });
    }
}

fn enriched_from_metrics(
    keyword: String,
    m: KeywordMetrics,
    source: KeywordSource,
) -> EnrichedKeyword {
    let mut kw = EnrichedKeyword::without_metrics(keyword, source);
    kw.search_volume = m.search_volume;
    kw.cpc = m.cpc;
    kw.competition = m.competition;
    kw.competition_level = m.competition_level;
    kw.trend = m.trend;
    kw.opportunity_score = opportunity_score(kw.search_volume, kw.competition, kw.cpc, None);
    kw
}
