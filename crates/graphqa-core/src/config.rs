//! Configuration management for graphqa.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GRAPHQA__SECTION__KEY`)
//! 2. Legacy variables (`NEO4J_URI`, `NEO4J_USERNAME`, `NEO4J_PASSWORD`,
//!    `LLM_BINDING_HOST`, `LLM_MODEL`)
//! 3. Config file (`graphqa.toml`)
//! 4. Defaults

use serde::Deserialize;

use crate::error::CoreError;

/// Legacy environment variables and the config keys they set.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("NEO4J_URI", "neo4j.uri"),
    ("NEO4J_USERNAME", "neo4j.user"),
    ("NEO4J_PASSWORD", "neo4j.password"),
    ("LLM_BINDING_HOST", "llm.host"),
    ("LLM_MODEL", "llm.model"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

/// Connection settings for the graph database.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default = "default_neo4j_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Settings for the inference endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// Base URL of the Ollama-compatible server.
    #[serde(default = "default_llm_host")]
    pub host: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds; must be non-zero.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which part of the graph grounds an answer.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    /// Label of the node whose text grounds the prompt.
    #[serde(default = "default_grounding_label")]
    pub grounding_label: String,

    /// Property holding the grounding text.
    #[serde(default = "default_grounding_field")]
    pub grounding_field: String,

    /// Skip retrieval when the grounding label is absent from the schema.
    #[serde(default = "default_true")]
    pub schema_gate: bool,

    /// Label searched for entities named in the question. Disabled when unset.
    #[serde(default)]
    pub entity_label: Option<String>,

    #[serde(default = "default_entity_field")]
    pub entity_field: String,

    /// Maximum keywords extracted from one question.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Maximum hits per keyword search.
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,

    /// Number of nodes listed per label by `inspect`.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "password".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_fetch_size() -> usize {
    256
}

fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_grounding_label() -> String {
    "Policy".to_string()
}

fn default_grounding_field() -> String {
    "content".to_string()
}

fn default_entity_field() -> String {
    "name".to_string()
}

fn default_max_keywords() -> usize {
    6
}

fn default_keyword_limit() -> usize {
    5
}

fn default_sample_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: default_neo4j_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            model: default_llm_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            grounding_label: default_grounding_label(),
            grounding_field: default_grounding_field(),
            schema_gate: true,
            entity_label: None,
            entity_field: default_entity_field(),
            max_keywords: default_max_keywords(),
            keyword_limit: default_keyword_limit(),
            sample_limit: default_sample_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `<file_prefix>.toml` (optional) and the process
    /// environment.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::load_with(file_prefix, vars)
    }

    /// Load configuration against an explicit snapshot of environment
    /// variables.
    pub fn load_with(file_prefix: &str, vars: config::Map<String, String>) -> Result<Self, CoreError> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .source(Some(legacy_vars(&vars))),
            )
            .add_source(
                config::Environment::with_prefix("GRAPHQA")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.neo4j.uri.trim().is_empty() {
            return Err(CoreError::InvalidConfig("neo4j.uri cannot be empty".into()));
        }
        if self.llm.host.trim().is_empty() {
            return Err(CoreError::InvalidConfig("llm.host cannot be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(CoreError::InvalidConfig("llm.model cannot be empty".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "llm.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.retrieval.grounding_label.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "retrieval.grounding_label cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Rename the set, non-empty legacy variables to `SECTION__KEY` form.
fn legacy_vars(vars: &config::Map<String, String>) -> config::Map<String, String> {
    LEGACY_ENV
        .iter()
        .filter_map(|(var, key)| {
            let value = vars.get(*var).filter(|v| !v.is_empty())?;
            tracing::debug!(var, key, "Applying legacy environment variable");
            Some((key.replace('.', "__"), value.clone()))
        })
        .collect()
}
