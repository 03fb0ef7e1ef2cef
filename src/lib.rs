//! keyscout - keyword discovery and opportunity scoring
//!
//! This library turns a website URL into a ranked set of content
//! opportunities:
//! - Crawl the site and extract structured text
//! - Derive seed keywords through an LLM site analysis
//! - Enrich keywords with search volume / competition data
//! - Expand the set via suggestions and competitor analysis
//! - Score every keyword and group the best ones into article clusters

pub mod analyzer;
pub mod classifier;
pub mod clusters;
pub mod config;
pub mod crawler;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod score;
pub mod spy;
pub mod storage;

// Re-export main types for convenience
pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::models::{AnalysisOutcome, AnalysisStats, EnrichedKeyword, KeywordCluster};
pub use crate::pipeline::AnalysisPipeline;
