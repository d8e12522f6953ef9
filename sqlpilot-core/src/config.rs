//! Agent configuration.
//!
//! [`AgentConfig`] carries every tunable of the query pipeline. Defaults are
//! usable as-is; [`AgentConfig::from_env`] overlays `SQLPILOT_*` environment
//! variables and picks API keys up from `OPENAI_API_KEY` / `QDRANT_API_KEY`.
//!
//! # Security
//! API keys are held in [`Zeroizing`] buffers, skipped by serde and omitted
//! from `Debug` output.

use crate::adapters::ConnectionConfig;
use crate::error::SqlPilotError;
use crate::llm::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

/// Similarity-search settings for schema retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of index matches requested per question
    pub top_k: usize,
    /// Matches scoring below this are discarded
    pub min_score: f32,
    /// Cap on tables pulled into one context
    pub max_tables: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            min_score: 0.3,
            max_tables: 10,
        }
    }
}

/// Chat-completion settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Cooldown applied to rate-limited calls without a `retry-after` header
    pub rate_limit_cooldown: Duration,
    #[serde(skip)]
    pub api_key: Option<Zeroizing<String>>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
            rate_limit_cooldown: Duration::from_secs(60),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("rate_limit_cooldown", &self.rate_limit_cooldown)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Embedding model settings. The LLM API key is reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Where schema embeddings are stored.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorStoreConfig {
    /// Process-local index, rebuilt every session
    #[default]
    Memory,
    /// Qdrant over its REST API
    Qdrant {
        url: String,
        #[serde(skip)]
        api_key: Option<Zeroizing<String>>,
    },
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "Memory"),
            Self::Qdrant { url, api_key } => f
                .debug_struct("Qdrant")
                .field("url", url)
                .field("api_key", &api_key.as_ref().map(|_| "****"))
                .finish(),
        }
    }
}

/// Connection circuit-breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time an open circuit rejects calls before allowing a retry
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Top-level configuration for a [`crate::QueryOrchestrator`].
///
/// # Example
/// ```rust
/// use sqlpilot_core::config::AgentConfig;
///
/// let config = AgentConfig::default();
/// assert_eq!(config.max_correction_attempts, 3);
/// assert_eq!(config.default_row_limit, 100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum SQL executions per question, corrections included
    pub max_correction_attempts: u32,
    /// Row cap injected into non-aggregate queries
    pub default_row_limit: u32,
    /// Per-statement command timeout
    pub query_timeout: Duration,
    /// Re-runs allowed for transient engine errors inside one execution
    pub max_transient_retries: u32,
    /// Cap on one-hop neighbours pulled into a fallback context
    pub max_fallback_neighbors: usize,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_correction_attempts: 3,
            default_row_limit: 100,
            query_timeout: Duration::from_secs(30),
            max_transient_retries: 3,
            max_fallback_neighbors: 10,
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AgentConfig {
    /// Builds a configuration from defaults overlaid with environment variables.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("SQLPILOT_MAX_CORRECTION_ATTEMPTS") {
            config.max_correction_attempts = v;
        }
        if let Some(v) = env_parse("SQLPILOT_ROW_LIMIT") {
            config.default_row_limit = v;
        }
        if let Some(secs) = env_parse::<u64>("SQLPILOT_QUERY_TIMEOUT_SECS") {
            config.query_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = env_parse("SQLPILOT_MAX_TRANSIENT_RETRIES") {
            config.max_transient_retries = v;
        }
        if let Some(v) = env_parse("SQLPILOT_MAX_FALLBACK_NEIGHBORS") {
            config.max_fallback_neighbors = v;
        }
        if let Some(v) = env_parse("SQLPILOT_TOP_K") {
            config.retrieval.top_k = v;
        }
        if let Some(v) = env_parse("SQLPILOT_MIN_SCORE") {
            config.retrieval.min_score = v;
        }
        if let Some(v) = env_parse("SQLPILOT_MAX_TABLES") {
            config.retrieval.max_tables = v;
        }

        if let Some(v) = env_string("SQLPILOT_LLM_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = env_string("SQLPILOT_LLM_BASE_URL").or_else(|| env_string("OPENAI_BASE_URL")) {
            config.embedding.base_url = v.clone();
            config.llm.base_url = v;
        }
        if let Some(v) = env_parse("SQLPILOT_LLM_TEMPERATURE") {
            config.llm.temperature = v;
        }
        if let Some(secs) = env_parse::<u64>("SQLPILOT_RATE_LIMIT_COOLDOWN_SECS") {
            config.llm.rate_limit_cooldown = Duration::from_secs(secs);
        }
        config.llm.api_key = env_string("OPENAI_API_KEY").map(Zeroizing::new);

        if let Some(v) = env_string("SQLPILOT_EMBEDDING_MODEL") {
            config.embedding.model = v;
        }

        if let Some(url) = env_string("SQLPILOT_QDRANT_URL") {
            config.vector_store = VectorStoreConfig::Qdrant {
                url,
                api_key: env_string("QDRANT_API_KEY").map(Zeroizing::new),
            };
        }

        config
    }

    /// Validates configuration values.
    ///
    /// # Errors
    /// Returns a configuration error for zero attempts, limits or timeouts and
    /// for a `min_score` outside `[0, 1]`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_correction_attempts == 0 {
            return Err(SqlPilotError::configuration(
                "max_correction_attempts must be greater than 0",
            ));
        }

        if self.default_row_limit == 0 {
            return Err(SqlPilotError::configuration(
                "default_row_limit must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(SqlPilotError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.retrieval.top_k == 0 || self.retrieval.max_tables == 0 {
            return Err(SqlPilotError::configuration(
                "retrieval top_k and max_tables must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(SqlPilotError::configuration(
                "retrieval min_score must be between 0.0 and 1.0",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 || self.circuit_breaker.reset_timeout.is_zero()
        {
            return Err(SqlPilotError::configuration(
                "circuit breaker threshold and reset timeout must be greater than 0",
            ));
        }

        if let VectorStoreConfig::Qdrant { url, .. } = &self.vector_store {
            url::Url::parse(url).map_err(|e| {
                SqlPilotError::configuration(format!("Invalid Qdrant URL: {}", e))
            })?;
        }

        Ok(())
    }

    /// Connection settings for adapters created under this configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default().with_query_timeout(self.query_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_k, 20);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.llm.rate_limit_cooldown, Duration::from_secs(60));
        assert!(matches!(config.vector_store, VectorStoreConfig::Memory));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = AgentConfig {
            max_correction_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            default_row_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            query_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overlays_defaults() {
        temp_env::with_vars(
            [
                ("SQLPILOT_MAX_CORRECTION_ATTEMPTS", Some("5")),
                ("SQLPILOT_ROW_LIMIT", Some("25")),
                ("SQLPILOT_QUERY_TIMEOUT_SECS", Some("not-a-number")),
                ("SQLPILOT_QDRANT_URL", Some("http://localhost:6333")),
                ("OPENAI_API_KEY", Some("sk-test-secret")),
                ("QDRANT_API_KEY", None),
            ],
            || {
                let config = AgentConfig::from_env();
                assert_eq!(config.max_correction_attempts, 5);
                assert_eq!(config.default_row_limit, 25);
                assert_eq!(config.query_timeout, Duration::from_secs(30));
                assert!(matches!(config.vector_store, VectorStoreConfig::Qdrant { .. }));
                assert_eq!(
                    config.llm.api_key.as_deref().map(String::as_str),
                    Some("sk-test-secret")
                );
            },
        );
    }

    #[test]
    fn test_debug_redacts_api_keys() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-very-secret")),
                ("SQLPILOT_QDRANT_URL", Some("http://qdrant:6333")),
                ("QDRANT_API_KEY", Some("qdrant-secret")),
            ],
            || {
                let config = AgentConfig::from_env();
                let debug = format!("{:?}", config);
                assert!(!debug.contains("sk-very-secret"));
                assert!(!debug.contains("qdrant-secret"));

                let json = serde_json::to_string(&config).expect("serializes");
                assert!(!json.contains("sk-very-secret"));
            },
        );
    }
}
