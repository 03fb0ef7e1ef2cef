use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub metrics: MetricsConfig,
    pub crawler: CrawlerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub request_timeout_seconds: u64,
}

/// External keyword-metrics provider (volumes, suggestions, SERP)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub api_base: String,
    pub login: String,
    pub password: String,
    /// Provider location code; 2840 is the broad US market
    pub location_code: u32,
    pub language_code: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Freshness window: a prior analysis younger than this is served
    /// from cache instead of re-run
    pub cache_freshness_hours: i64,
    /// How many competitor sites to spy on per run
    pub max_competitors: usize,
    /// Hard wall-clock budget for one analysis run
    pub time_budget_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = get_data_directory();

        Self {
            database: DatabaseConfig {
                path: data_dir.join("keyscout.db"),
            },
            llm: LlmConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.4,
                max_tokens: 8192,
                request_timeout_seconds: 120,
            },
            metrics: MetricsConfig {
                api_base: "https://api.dataforseo.com/v3".to_string(),
                login: String::new(),
                password: String::new(),
                location_code: 2840,
                language_code: "en".to_string(),
                request_timeout_seconds: 60,
            },
            crawler: CrawlerConfig {
                request_timeout_seconds: 15,
                user_agent: "Mozilla/5.0 (compatible; KeyscoutBot/0.1; +https://github.com/pavanepour-k/keyscout)".to_string(),
            },
            pipeline: PipelineConfig {
                cache_freshness_hours: 24,
                max_competitors: 3,
                time_budget_seconds: 300,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it with
    /// defaults when missing
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            let mut config = Self::default();
            ConfigOverrides::apply(&mut config);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: AppConfig = toml::from_str(&content)?;

        ConfigOverrides::apply(&mut config);
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_path = get_config_path();

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&config_path, content).await?;

        info!("Configuration saved to: {}", config_path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Crawler request_timeout_seconds must be > 0"));
        }

        if self.crawler.user_agent.trim().is_empty() {
            return Err(anyhow::anyhow!("Crawler user_agent must not be empty"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!("LLM temperature must be between 0.0 and 2.0"));
        }

        if self.llm.max_tokens == 0 {
            return Err(anyhow::anyhow!("LLM max_tokens must be > 0"));
        }

        if self.pipeline.cache_freshness_hours <= 0 {
            return Err(anyhow::anyhow!("Pipeline cache_freshness_hours must be > 0"));
        }

        if self.pipeline.time_budget_seconds == 0 {
            return Err(anyhow::anyhow!("Pipeline time_budget_seconds must be > 0"));
        }

        Ok(())
    }
}

/// Get the default data directory
fn get_data_directory() -> PathBuf {
    directories::ProjectDirs::from("com", "keyscout", "keyscout")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("data"))
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "keyscout", "keyscout")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration.
    ///
    /// Credentials are expected to arrive this way in deployments rather
    /// than living in the config file.
    pub fn apply(config: &mut AppConfig) {
        if let Ok(db_path) = std::env::var("KS_DB_PATH") {
            config.database.path = PathBuf::from(db_path);
        }

        if let Ok(api_base) = std::env::var("KS_LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(api_key) = std::env::var("KS_LLM_API_KEY") {
            config.llm.api_key = api_key;
        }

        if let Ok(model) = std::env::var("KS_LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(login) = std::env::var("KS_METRICS_LOGIN") {
            config.metrics.login = login;
        }

        if let Ok(password) = std::env::var("KS_METRICS_PASSWORD") {
            config.metrics.password = password;
        }

        if let Ok(api_base) = std::env::var("KS_METRICS_API_BASE") {
            config.metrics.api_base = api_base;
        }

        if let Ok(log_level) = std::env::var("KS_LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }
}
