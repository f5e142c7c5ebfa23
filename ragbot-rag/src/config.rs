//! Configuration for retrieval and context assembly.

use std::str::FromStr;
use std::time::Duration;

use ragbot_core::{RagError, Result, SizeMetric};
use serde::{Deserialize, Serialize};

/// What to do when retrieval found candidates but none fit the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoContextPolicy {
    /// Generate from the query alone.
    #[default]
    ProceedEmpty,
    /// End the request with a `NoContextFit` error.
    Fail,
}

impl FromStr for NoContextPolicy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proceed-empty" => Ok(Self::ProceedEmpty),
            "fail" => Ok(Self::Fail),
            other => Err(RagError::Config(format!(
                "unknown no-context policy '{other}' (expected 'proceed-empty' or 'fail')"
            ))),
        }
    }
}

/// Configuration parameters for retrieval and context assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum size of the assembled context, in `size_metric` units.
    pub context_budget: usize,
    /// How chunk text is measured against `context_budget`.
    pub size_metric: SizeMetric,
    /// Number of top results to request from the store.
    pub top_k: usize,
    /// Minimum relevance score; results below it are dropped.
    pub min_relevance: f32,
    /// Number of handles in each resource pool.
    pub pool_size: usize,
    /// How long a request may wait for a pool slot.
    #[serde(with = "duration_ms")]
    pub acquire_timeout: Duration,
    pub no_context_policy: NoContextPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            context_budget: 4000,
            size_metric: SizeMetric::Chars,
            top_k: 10,
            min_relevance: 0.0,
            pool_size: 4,
            acquire_timeout: Duration::from_secs(5),
            no_context_policy: NoContextPolicy::ProceedEmpty,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a validated config from `RAGBOT_*` environment variables,
    /// falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(v) = lookup("RAGBOT_CONTEXT_BUDGET") {
            builder = builder.context_budget(parse_var("RAGBOT_CONTEXT_BUDGET", &v)?);
        }
        if let Some(v) = lookup("RAGBOT_TOP_K") {
            builder = builder.top_k(parse_var("RAGBOT_TOP_K", &v)?);
        }
        if let Some(v) = lookup("RAGBOT_MIN_RELEVANCE") {
            builder = builder.min_relevance(parse_var("RAGBOT_MIN_RELEVANCE", &v)?);
        }
        if let Some(v) = lookup("RAGBOT_POOL_SIZE") {
            builder = builder.pool_size(parse_var("RAGBOT_POOL_SIZE", &v)?);
        }
        if let Some(v) = lookup("RAGBOT_ACQUIRE_TIMEOUT_MS") {
            let ms: u64 = parse_var("RAGBOT_ACQUIRE_TIMEOUT_MS", &v)?;
            builder = builder.acquire_timeout(Duration::from_millis(ms));
        }
        if let Some(v) = lookup("RAGBOT_NO_CONTEXT_POLICY") {
            builder = builder.no_context_policy(v.parse()?);
        }
        builder.build()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| RagError::Config(format!("{key} has invalid value '{value}'")))
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn context_budget(mut self, budget: usize) -> Self {
        self.config.context_budget = budget;
        self
    }

    pub fn size_metric(mut self, metric: SizeMetric) -> Self {
        self.config.size_metric = metric;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn min_relevance(mut self, score: f32) -> Self {
        self.config.min_relevance = score;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    pub fn no_context_policy(mut self, policy: NoContextPolicy) -> Self {
        self.config.no_context_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `context_budget == 0`
    /// - `top_k == 0`
    /// - `min_relevance` is outside `[0, 1]`
    /// - `pool_size == 0`
    /// - `acquire_timeout` is zero
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.context_budget == 0 {
            return Err(RagError::Config("context_budget must be greater than zero".to_string()));
        }
        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&config.min_relevance) {
            return Err(RagError::Config(format!(
                "min_relevance ({}) must be within [0, 1]",
                config.min_relevance
            )));
        }
        if config.pool_size == 0 {
            return Err(RagError::Config("pool_size must be greater than zero".to_string()));
        }
        if config.acquire_timeout.is_zero() {
            return Err(RagError::Config("acquire_timeout must be non-zero".to_string()));
        }
        Ok(config)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
