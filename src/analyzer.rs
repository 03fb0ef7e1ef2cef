use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::llm::{prompts, ChatCompletion};
use crate::models::{CrawlResult, SiteAnalysis};

/// Advisory cardinality bounds from the analysis schema. Responses
/// outside these are accepted, only logged.
const SEED_BOUNDS: (usize, usize) = (50, 80);
const COMPETITOR_BOUNDS: (usize, usize) = (5, 10);
const ANGLE_BOUNDS: (usize, usize) = (15, 25);

/// Turns crawled page content into a product summary, seed keywords,
/// competitors and content angles via one LLM call. Failure here is
/// fatal: without a site analysis there are no keywords to expand.
pub struct SiteAnalyzer {
    llm: Arc<dyn ChatCompletion>,
}

impl SiteAnalyzer {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    pub async fn analyze(&self, crawl: &CrawlResult) -> PipelineResult<SiteAnalysis> {
        let user = prompts::site_analysis_user(&crawl.url, &crawl.structured_text);

        let raw = self
            .llm
            .complete_json(prompts::site_analysis_system(), &user)
            .await
            .map_err(|e| PipelineError::analysis(e.to_string()))?;

        let analysis: SiteAnalysis = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::analysis(format!("schema violation: {}", e)))?;

        if analysis.seed_keywords.is_empty() {
            return Err(PipelineError::analysis("analysis returned no seed keywords"));
        }

        check_advisory_bounds("seed_keywords", analysis.seed_keywords.len(), SEED_BOUNDS);
        check_advisory_bounds("competitors", analysis.competitors.len(), COMPETITOR_BOUNDS);
        check_advisory_bounds("content_angles", analysis.content_angles.len(), ANGLE_BOUNDS);

        info!(
            "Site analysis completed - seeds={}, competitors={}, angles={}",
            analysis.seed_keywords.len(),
            analysis.competitors.len(),
            analysis.content_angles.len()
        );

        Ok(analysis)
    }
}

fn check_advisory_bounds(field: &str, count: usize, (min, max): (usize, usize)) {
    if count < min || count > max {
        warn!("Analysis {} count {} outside advisory bounds {}-{}", field, count, min, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlResult, Heading};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct CannedLlm {
        response: String,
    }

    #[async_trait]
    impl ChatCompletion for CannedLlm {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn sample_crawl() -> CrawlResult {
        CrawlResult {
            url: "https://acme.example".into(),
            title: "Acme Notes".into(),
            meta_description: "Notes with AI".into(),
            meta_keywords: vec![],
            headings: vec![Heading { level: 1, text: "Acme".into() }],
            paragraphs: vec!["Research notes, organized.".into()],
            links: vec![],
            og_data: BTreeMap::new(),
            structured_text: "# Acme Notes".into(),
        }
    }

    fn valid_analysis_json() -> String {
        let seeds: Vec<String> = (0..5)
            .map(|i| {
                format!(
                    r#"{{"keyword": "note app {}", "intent": "informational", "relevance": "high", "category": "niche"}}"#,
                    i
                )
            })
            .collect();
        format!(
            r#"{{
                "product_summary": "A note app.",
                "target_audience": "Researchers.",
                "seed_keywords": [{}],
                "competitors": [{{"name": "Rival", "url": "https://rival.example", "reason": "same space"}}],
                "content_angles": ["How to organize notes"]
            }}"#,
            seeds.join(",")
        )
    }

    #[tokio::test]
    async fn test_analyze_parses_valid_response() {
        let analyzer = SiteAnalyzer::new(Arc::new(CannedLlm { response: valid_analysis_json() }));
        let analysis = analyzer.analyze(&sample_crawl()).await.unwrap();
        assert_eq!(analysis.seed_keywords.len(), 5);
        assert_eq!(analysis.competitors.len(), 1);
        assert_eq!(analysis.product_summary, "A note app.");
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_seed_list() {
        let response = r#"{
            "product_summary": "x", "target_audience": "y",
            "seed_keywords": [], "competitors": [], "content_angles": []
        }"#;
        let analyzer = SiteAnalyzer::new(Arc::new(CannedLlm { response: response.into() }));
        let err = analyzer.analyze(&sample_crawl()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.category(), "analysis");
    }

    #[tokio::test]
    async fn test_analyze_rejects_malformed_json() {
        let analyzer = SiteAnalyzer::new(Arc::new(CannedLlm { response: "not json".into() }));
        let err = analyzer.analyze(&sample_crawl()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
