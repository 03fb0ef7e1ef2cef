//! Prompt templates for the pipeline's LLM calls. Every prompt pins the
//! exact JSON shape the caller deserializes.

/// System prompt for the site analysis call
pub fn site_analysis_system() -> &'static str {
    r#"You are an SEO strategist. You are given the extracted text of a website and must produce a keyword research foundation for it.

Respond with a single JSON object with exactly these keys:
- "product_summary": 2-3 sentence description of what the site offers
- "target_audience": 1-2 sentence description of who it is for
- "seed_keywords": 50-80 objects, each {"keyword": string, "intent": "informational"|"commercial"|"transactional"|"navigational", "relevance": "high"|"medium"|"low", "category": "broad"|"niche"|"question"|"comparison"}
- "competitors": 5-10 objects, each {"name": string, "url": string, "reason": string}
- "content_angles": 15-25 article title strings

Spread seed keywords across all four categories. Keywords must be realistic search queries, lowercase, no punctuation beyond spaces and hyphens. Output only the JSON object."#
}

/// User prompt for the site analysis call
pub fn site_analysis_user(url: &str, structured_text: &str) -> String {
    format!("Website URL: {}\n\nExtracted site content:\n\n{}", url, structured_text)
}

/// System prompt for batch keyword classification
pub fn classification_system() -> &'static str {
    r#"You classify search keywords for an SEO pipeline.

You are given a product context and a list of keywords with their search volume and CPC. For each keyword assign:
- "intent": "informational"|"commercial"|"transactional"|"navigational"
- "relevance": "high"|"medium"|"low" (relevance to the described product)
- "category": "broad"|"niche"|"question"|"comparison"

Respond with a single JSON object: {"classifications": [{"keyword": string, "intent": ..., "relevance": ..., "category": ...}, ...]} covering every input keyword exactly once. Output only the JSON object."#
}

/// User prompt for one classification batch
pub fn classification_user(product_context: &str, batch_json: &str) -> String {
    format!("Product context: {}\n\nKeywords to classify:\n{}", product_context, batch_json)
}

/// System prompt for competitor keyword inference
pub fn competitor_keywords_system() -> &'static str {
    r#"You analyze a competitor's website content and infer which search keywords the competitor appears to target.

Respond with a single JSON object: {"keywords": [string, ...]} containing 20-40 keywords. Keywords must be realistic search queries a user would type, lowercase, specific to the competitor's content, and plausibly relevant to the product context you are given. Output only the JSON object."#
}

/// User prompt for competitor keyword inference
pub fn competitor_keywords_user(product_context: &str, competitor_url: &str, content: &str) -> String {
    format!(
        "Product context: {}\n\nCompetitor URL: {}\n\nCompetitor site content:\n\n{}",
        product_context, competitor_url, content
    )
}

/// System prompt for topical clustering
pub fn cluster_system() -> &'static str {
    r#"You group SEO keywords into topical clusters, each backing one article.

You are given scored keywords as JSON. Produce 10-25 clusters ordered by ranking potential. Every keyword belongs to at most one cluster; the pillar is the highest-opportunity keyword of its group.

Respond with a single JSON object: {"clusters": [{"topic": string, "article_title": string, "pillar_keyword": string, "supporting_keywords": [string, ...], "search_intent": "informational"|"commercial"|"transactional"|"navigational", "difficulty": "easy"|"medium"|"hard"}, ...]}. Use only keywords from the input; never invent keywords. Output only the JSON object."#
}

/// User prompt for the clustering call
pub fn cluster_user(product_context: &str, keywords_json: &str) -> String {
    format!("Product context: {}\n\nScored keywords:\n{}", product_context, keywords_json)
}
