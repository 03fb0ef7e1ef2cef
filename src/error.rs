use thiserror::Error;

/// Error types for the analysis pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Stage 1: crawling the target site
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    // Stage 2: LLM site analysis
    #[error("Site analysis failed: {reason}")]
    Analysis { reason: String },

    // Metrics provider (volumes, suggestions, SERP)
    #[error("Provider error during {operation}: {reason}")]
    Provider { operation: String, reason: String },

    // LLM keyword classification
    #[error("Classification failed: {reason}")]
    Classification { reason: String },

    // Competitor spying
    #[error("Competitor spy failed for {url}: {reason}")]
    Spy { url: String, reason: String },

    // LLM clustering
    #[error("Clustering failed: {reason}")]
    Cluster { reason: String },

    // Persistence
    #[error("Persist failed for {entity}: {reason}")]
    Persist { entity: String, reason: String },

    // Wall-clock budget exceeded
    #[error("Analysis exceeded the {seconds}s time budget")]
    Timeout { seconds: u64 },
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a fetch error
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch { url: url.into(), reason: reason.into() }
    }

    /// Create a site analysis error
    pub fn analysis(reason: impl Into<String>) -> Self {
        Self::Analysis { reason: reason.into() }
    }

    /// Create a metrics provider error
    pub fn provider(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider { operation: operation.into(), reason: reason.into() }
    }

    /// Create a classification error
    pub fn classification(reason: impl Into<String>) -> Self {
        Self::Classification { reason: reason.into() }
    }

    /// Create a competitor spy error
    pub fn spy(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spy { url: url.into(), reason: reason.into() }
    }

    /// Create a clustering error
    pub fn cluster(reason: impl Into<String>) -> Self {
        Self::Cluster { reason: reason.into() }
    }

    /// Create a persistence error
    pub fn persist(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persist { entity: entity.into(), reason: reason.into() }
    }

    /// Whether this error aborts the whole pipeline.
    ///
    /// Only crawl and site-analysis failures (and the wall-clock budget)
    /// are fatal; every later stage degrades to a documented default.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Fetch { .. } | Self::Analysis { .. } | Self::Timeout { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Fetch { .. } => "fetch",
            Self::Analysis { .. } => "analysis",
            Self::Provider { .. } => "provider",
            Self::Classification { .. } => "classification",
            Self::Spy { .. } => "spy",
            Self::Cluster { .. } => "cluster",
            Self::Persist { .. } => "persist",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Result type alias for the pipeline
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::fetch("https://example.com", "timeout").is_fatal());
        assert!(PipelineError::analysis("empty response").is_fatal());
        assert!(PipelineError::config("missing api key").is_fatal());
        assert!(PipelineError::Timeout { seconds: 300 }.is_fatal());

        assert!(!PipelineError::provider("get_volumes", "503").is_fatal());
        assert!(!PipelineError::classification("bad json").is_fatal());
        assert!(!PipelineError::spy("https://rival.com", "blocked").is_fatal());
        assert!(!PipelineError::cluster("bad json").is_fatal());
        assert!(!PipelineError::persist("keywords", "disk full").is_fatal());
    }

    #[test]
    fn test_category() {
        assert_eq!(PipelineError::provider("get_volumes", "x").category(), "provider");
        assert_eq!(PipelineError::fetch("u", "x").category(), "fetch");
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::fetch("https://example.com", "status 404");
        let text = err.to_string();
        assert!(text.contains("https://example.com"));
        assert!(text.contains("404"));
    }
}
