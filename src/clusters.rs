use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::{prompts, ChatCompletion};
use crate::models::{ClusterDifficulty, EnrichedKeyword, Intent, KeywordCluster, Relevance};

/// Fewest eligible keywords worth clustering
const MIN_ELIGIBLE: usize = 5;
/// Most keywords sent to the model
const MAX_CLUSTER_INPUT: usize = 150;

/// Slim keyword view serialized into the clustering prompt
#[derive(Serialize)]
struct ClusterInput<'a> {
    keyword: &'a str,
    search_volume: u64,
    cpc: f64,
    competition: f64,
    opportunity_score: i64,
    intent: Intent,
    relevance: Relevance,
}

#[derive(Deserialize)]
struct RawCluster {
    topic: String,
    article_title: String,
    pillar_keyword: String,
    #[serde(default)]
    supporting_keywords: Vec<String>,
    #[serde(default)]
    search_intent: Intent,
    #[serde(default)]
    difficulty: ClusterDifficulty,
}

#[derive(Deserialize)]
struct ClusterResponse {
    #[serde(default)]
    clusters: Vec<RawCluster>,
}

/// Groups scored keywords into topical article clusters via one LLM call.
/// Clustering is best-effort: any failure yields an empty cluster list.
pub struct ClusterBuilder {
    llm: Arc<dyn ChatCompletion>,
}

impl ClusterBuilder {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    /// Build clusters from keywords already sorted by opportunity score.
    ///
    /// Only keywords with volume or high relevance are eligible, capped
    /// at the top 150. Fewer than 5 eligible keywords skips clustering.
    /// Model output is validated against the input set: clusters with an
    /// unknown or already-claimed pillar are dropped, supporting keywords
    /// outside the input or claimed by an earlier cluster are stripped,
    /// and volume/competition figures come from the scored keywords
    /// rather than the model.
    pub async fn build_clusters(
        &self,
        keywords: &[EnrichedKeyword],
        product_context: &str,
    ) -> Vec<KeywordCluster> {
        let eligible: Vec<&EnrichedKeyword> = keywords
            .iter()
            .filter(|k| k.search_volume > 0 || k.relevance == Relevance::High)
            .take(MAX_CLUSTER_INPUT)
            .collect();

        if eligible.len() < MIN_ELIGIBLE {
            info!("Skipping clustering: only {} eligible keywords", eligible.len());
            return Vec::new();
        }

        let inputs: Vec<ClusterInput<'_>> = eligible
            .iter()
            .map(|k| ClusterInput {
                keyword: &k.keyword,
                search_volume: k.search_volume,
                cpc: k.cpc,
                competition: k.competition,
                opportunity_score: k.opportunity_score,
                intent: k.intent,
                relevance: k.relevance,
            })
            .collect();

        let keywords_json = match serde_json::to_string(&inputs) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cluster input serialization failed: {}", e);
                return Vec::new();
            }
        };

        let user = prompts::cluster_user(product_context, &keywords_json);
        let raw = match self.llm.complete_json(prompts::cluster_system(), &user).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}", PipelineError::cluster(e.to_string()));
                return Vec::new();
            }
        };

        let response: ClusterResponse = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("{}", PipelineError::cluster(format!("unparseable response: {}", e)));
                return Vec::new();
            }
        };

        let clusters = validate_clusters(response.clusters, &eligible);
        info!("Built {} keyword clusters", clusters.len());
        clusters
    }
}

/// Enforce one-cluster-per-keyword and derive volume/competition from the
/// scored set.
fn validate_clusters(
    raw: Vec<RawCluster>,
    eligible: &[&EnrichedKeyword],
) -> Vec<KeywordCluster> {
    let by_key: HashMap<String, &EnrichedKeyword> =
        eligible.iter().map(|k| (k.dedup_key(), *k)).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut clusters = Vec::new();

    for cluster in raw {
        let pillar_key = cluster.pillar_keyword.to_lowercase();
        let pillar = match by_key.get(&pillar_key) {
            Some(kw) if !claimed.contains(&pillar_key) => *kw,
            Some(_) => {
                debug!("Dropping cluster '{}': pillar already claimed", cluster.topic);
                continue;
            }
            None => {
                debug!("Dropping cluster '{}': pillar not in keyword set", cluster.topic);
                continue;
            }
        };
        claimed.insert(pillar_key.clone());

        let mut supporting = Vec::new();
        let mut supporting_volume = 0u64;
        for keyword in cluster.supporting_keywords {
            let key = keyword.to_lowercase();
            if key == pillar_key || claimed.contains(&key) {
                continue;
            }
            match by_key.get(&key) {
                Some(kw) => {
                    supporting_volume += kw.search_volume;
                    claimed.insert(key);
                    supporting.push(kw.keyword.clone());
                }
                None => {
                    debug!("Stripping invented supporting keyword '{}'", keyword);
                }
            }
        }

        clusters.push(KeywordCluster {
            topic: cluster.topic,
            article_title: cluster.article_title,
            pillar_keyword: pillar.keyword.clone(),
            supporting_keywords: supporting,
            search_intent: cluster.search_intent,
            difficulty: cluster.difficulty,
            total_volume: pillar.search_volume + supporting_volume,
            avg_competition: pillar.competition,
        });
    }

    clusters
}
