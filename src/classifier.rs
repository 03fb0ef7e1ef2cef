use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{prompts, ChatCompletion};
use crate::models::{Intent, KeywordCategory, Relevance};

/// Keywords per LLM call, bounding prompt size
const BATCH_SIZE: usize = 80;

/// Intent/relevance/category tags for one keyword
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub keyword: String,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub relevance: Relevance,
    #[serde(default)]
    pub category: KeywordCategory,
}

/// One keyword handed to the classifier with its metric context
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyItem {
    pub keyword: String,
    pub search_volume: u64,
    pub cpc: f64,
}

#[derive(Deserialize)]
struct ClassificationResponse {
    #[serde(default)]
    classifications: Vec<Classification>,
}

/// Batches newly discovered keywords through the LLM to assign
/// intent/relevance/category tags.
pub struct KeywordClassifier {
    llm: Arc<dyn ChatCompletion>,
}

impl KeywordClassifier {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    /// Classify keywords in batches of 80, merging partial results.
    ///
    /// A failed batch drops only its own classifications; callers fall
    /// back to default tags for keywords missing from the returned map.
    /// The map is keyed by lowercased keyword.
    pub async fn classify(
        &self,
        items: &[ClassifyItem],
        product_context: &str,
    ) -> HashMap<String, Classification> {
        let mut merged = HashMap::new();

        for (batch_idx, batch) in items.chunks(BATCH_SIZE).enumerate() {
            let batch_json = match serde_json::to_string(batch) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Classification batch {} serialization failed: {}", batch_idx, e);
                    continue;
                }
            };

            let user = prompts::classification_user(product_context, &batch_json);
            let raw = match self.llm.complete_json(prompts::classification_system(), &user).await {
                Ok(raw) => raw,
                Err(e) => {
                    let err =
                        PipelineError::classification(format!("batch {}: {}", batch_idx, e));
                    warn!("{} ({} keywords fall back to defaults)", err, batch.len());
                    continue;
                }
            };

            match serde_json::from_str::<ClassificationResponse>(&raw) {
                Ok(response) => {
                    debug!(
                        "Classification batch {} returned {} tags for {} keywords",
                        batch_idx,
                        response.classifications.len(),
                        batch.len()
                    );
                    for c in response.classifications {
                        merged.insert(c.keyword.to_lowercase(), c);
                    }
                }
                Err(e) => {
                    let err = PipelineError::classification(format!(
                        "batch {} returned unparseable JSON: {}",
                        batch_idx, e
                    ));
                    warn!("{}", err);
                }
            }
        }

        merged
    }
}
