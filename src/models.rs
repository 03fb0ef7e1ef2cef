use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search intent assigned to a keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Informational,
    Commercial,
    Transactional,
    Navigational,
}

impl Default for Intent {
    fn default() -> Self {
        Intent::Informational
    }
}

/// How relevant a keyword is to the analyzed product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Default for Relevance {
    fn default() -> Self {
        Relevance::Medium
    }
}

/// Structural category of a keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    Broad,
    Niche,
    Question,
    Comparison,
}

impl Default for KeywordCategory {
    fn default() -> Self {
        KeywordCategory::Broad
    }
}

/// Categorical competition level reported by the metrics provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
    Unknown,
}

/// Where a keyword entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordSource {
    Seed,
    Expanded,
    Competitor,
}

/// Estimated ranking difficulty of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterDifficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for ClusterDifficulty {
    fn default() -> Self {
        ClusterDifficulty::Medium
    }
}

/// A heading extracted from a crawled page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// A link extracted from a crawled page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Structured content of one crawled page. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub meta_keywords: Vec<String>,
    pub headings: Vec<Heading>,
    /// Capped at 30 entries to bound downstream payload size
    pub paragraphs: Vec<String>,
    /// Capped at 50 entries
    pub links: Vec<Link>,
    pub og_data: BTreeMap<String, String>,
    /// Markdown-like flattening of the page, used as LLM input
    pub structured_text: String,
}

/// A seed keyword produced by the LLM site analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedKeyword {
    pub keyword: String,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub relevance: Relevance,
    #[serde(default)]
    pub category: KeywordCategory,
}

/// A competitor identified by the site analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub url: String,
    pub reason: String,
}

/// Output of the LLM site analysis. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteAnalysis {
    pub product_summary: String,
    pub target_audience: String,
    pub seed_keywords: Vec<SeedKeyword>,
    pub competitors: Vec<Competitor>,
    pub content_angles: Vec<String>,
}

/// The pipeline's working unit: a keyword with metrics and score attached.
///
/// Identity within one analysis run is the lowercased keyword string,
/// unique across all sources. Mutated in place only to attach SERP
/// difficulty and recompute the score during SERP enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedKeyword {
    pub keyword: String,
    pub intent: Intent,
    pub relevance: Relevance,
    pub category: KeywordCategory,
    pub search_volume: u64,
    pub cpc: f64,
    pub competition: f64,
    pub competition_level: CompetitionLevel,
    /// 12-month trailing monthly search counts, possibly empty
    pub trend: Vec<i64>,
    pub opportunity_score: i64,
    pub serp_difficulty: Option<u8>,
    pub source: KeywordSource,
}

impl EnrichedKeyword {
    /// Case-insensitive deduplication key
    pub fn dedup_key(&self) -> String {
        self.keyword.to_lowercase()
    }

    /// A keyword with no provider data: zero metrics, Unknown level, score 0
    pub fn without_metrics(keyword: String, source: KeywordSource) -> Self {
        Self {
            keyword,
            intent: Intent::default(),
            relevance: Relevance::default(),
            category: KeywordCategory::default(),
            search_volume: 0,
            cpc: 0.0,
            competition: 0.0,
            competition_level: CompetitionLevel::Unknown,
            trend: Vec::new(),
            opportunity_score: 0,
            serp_difficulty: None,
            source,
        }
    }
}

/// A topical group of keywords backing one candidate article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCluster {
    pub topic: String,
    pub article_title: String,
    /// Must reference an EnrichedKeyword by keyword string
    pub pillar_keyword: String,
    pub supporting_keywords: Vec<String>,
    pub search_intent: Intent,
    pub difficulty: ClusterDifficulty,
    /// Pillar volume plus the sum of supporting keyword volumes
    pub total_volume: u64,
    /// The pillar keyword's competition value
    pub avg_competition: f64,
}

/// Competition as it arrives from the provider: either a categorical
/// level or a numeric value in [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompetitionValue {
    Numeric(f64),
    Level(CompetitionLevel),
}

impl CompetitionValue {
    /// Normalize into a (numeric in [0,1], level) pair.
    ///
    /// A bare level maps to its midpoint (LOW 0.2, MEDIUM 0.5, HIGH 0.85);
    /// a bare number maps to a level by thresholds (<0.33 LOW, <0.66
    /// MEDIUM, else HIGH). `None` input defaults to (0.0, LOW).
    pub fn normalize(value: Option<&CompetitionValue>) -> (f64, CompetitionLevel) {
        match value {
            Some(CompetitionValue::Numeric(n)) => {
                let n = n.clamp(0.0, 1.0);
                let level = if n < 0.33 {
                    CompetitionLevel::Low
                } else if n < 0.66 {
                    CompetitionLevel::Medium
                } else {
                    CompetitionLevel::High
                };
                (n, level)
            }
            Some(CompetitionValue::Level(level)) => {
                let n = match level {
                    CompetitionLevel::Low => 0.2,
                    CompetitionLevel::Medium => 0.5,
                    CompetitionLevel::High => 0.85,
                    CompetitionLevel::Unknown => 0.0,
                };
                let level = if matches!(level, CompetitionLevel::Unknown) {
                    CompetitionLevel::Low
                } else {
                    *level
                };
                (n, level)
            }
            None => (0.0, CompetitionLevel::Low),
        }
    }
}

/// Partial-degradation statistics returned with a fresh analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_keywords: usize,
    pub with_volume: usize,
    pub expanded: usize,
    pub from_competitors: usize,
    pub with_serp_data: usize,
    pub clusters: usize,
}

/// Caller-visible result of an analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    /// A prior analysis younger than the freshness window was served
    Cached { analysis_id: String },
    /// A full pipeline run completed
    Fresh { analysis_id: String, stats: AnalysisStats },
}

impl AnalysisOutcome {
    pub fn analysis_id(&self) -> &str {
        match self {
            AnalysisOutcome::Cached { analysis_id } => analysis_id,
            AnalysisOutcome::Fresh { analysis_id, .. } => analysis_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_is_case_insensitive() {
        let a = EnrichedKeyword::without_metrics("App Ideas".to_string(), KeywordSource::Seed);
        let b = EnrichedKeyword::without_metrics("app ideas".to_string(), KeywordSource::Expanded);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_competition_normalize_from_level() {
        let (n, level) = CompetitionValue::normalize(Some(&CompetitionValue::Level(CompetitionLevel::Low)));
        assert_eq!((n, level), (0.2, CompetitionLevel::Low));
        let (n, level) = CompetitionValue::normalize(Some(&CompetitionValue::Level(CompetitionLevel::Medium)));
        assert_eq!((n, level), (0.5, CompetitionLevel::Medium));
        let (n, level) = CompetitionValue::normalize(Some(&CompetitionValue::Level(CompetitionLevel::High)));
        assert_eq!((n, level), (0.85, CompetitionLevel::High));
    }

    #[test]
    fn test_competition_normalize_from_numeric() {
        assert_eq!(
            CompetitionValue::normalize(Some(&CompetitionValue::Numeric(0.1))).1,
            CompetitionLevel::Low
        );
        assert_eq!(
            CompetitionValue::normalize(Some(&CompetitionValue::Numeric(0.5))).1,
            CompetitionLevel::Medium
        );
        assert_eq!(
            CompetitionValue::normalize(Some(&CompetitionValue::Numeric(0.9))).1,
            CompetitionLevel::High
        );
        // Out-of-range values are clamped into [0,1]
        assert_eq!(
            CompetitionValue::normalize(Some(&CompetitionValue::Numeric(3.0))).0,
            1.0
        );
    }

    #[test]
    fn test_competition_normalize_unresolvable() {
        assert_eq!(CompetitionValue::normalize(None), (0.0, CompetitionLevel::Low));
    }

    #[test]
    fn test_competition_value_deserializes_both_shapes() {
        let numeric: CompetitionValue = serde_json::from_str("0.42").unwrap();
        assert!(matches!(numeric, CompetitionValue::Numeric(n) if (n - 0.42).abs() < 1e-9));

        let level: CompetitionValue = serde_json::from_str("\"HIGH\"").unwrap();
        assert!(matches!(level, CompetitionValue::Level(CompetitionLevel::High)));
    }

    #[test]
    fn test_without_metrics_defaults() {
        let kw = EnrichedKeyword::without_metrics("rust seo".into(), KeywordSource::Competitor);
        assert_eq!(kw.search_volume, 0);
        assert_eq!(kw.cpc, 0.0);
        assert_eq!(kw.competition, 0.0);
        assert_eq!(kw.competition_level, CompetitionLevel::Unknown);
        assert_eq!(kw.opportunity_score, 0);
        assert!(kw.serp_difficulty.is_none());
        assert_eq!(kw.source, KeywordSource::Competitor);
    }
}
