//! Runtime configuration.
//!
//! Everything is read from environment variables (the binary loads `.env`
//! first). Each setting has a default; command-line flags override after
//! loading. Secrets are only ever read from the environment.

use std::path::PathBuf;
use std::time::Duration;

pub const DOGRAPH_LLM_BACKEND_ENV: &str = "DOGRAPH_LLM_BACKEND";
pub const DOGRAPH_ROUTER_MODEL_ENV: &str = "DOGRAPH_ROUTER_MODEL";
pub const DOGRAPH_ANSWER_MODEL_ENV: &str = "DOGRAPH_ANSWER_MODEL";
pub const DOGRAPH_PLANNER_MODEL_ENV: &str = "DOGRAPH_PLANNER_MODEL";
pub const DOGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "DOGRAPH_LLM_TIMEOUT_SECS";
pub const DOGRAPH_LLM_MAX_OUTPUT_TOKENS_ENV: &str = "DOGRAPH_LLM_MAX_OUTPUT_TOKENS";
pub const DOGRAPH_QUERY_TOP_K_ENV: &str = "DOGRAPH_QUERY_TOP_K";
pub const DOGRAPH_HISTORY_WINDOW_ENV: &str = "DOGRAPH_HISTORY_WINDOW";
pub const DOGRAPH_STATIC_DIR_ENV: &str = "DOGRAPH_STATIC_DIR";
pub const DOGRAPH_RETENTION_SECS_ENV: &str = "DOGRAPH_RETENTION_SECS";

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

pub const NEO4J_URI_ENV: &str = "NEO4J_URI";
pub const NEO4J_USERNAME_ENV: &str = "NEO4J_USERNAME";
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";
pub const NEO4J_DATABASE_ENV: &str = "NEO4J_DATABASE";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_NEO4J_URI: &str = "http://localhost:7474";

const DEFAULT_ROUTER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANSWER_MODEL: &str = "gpt-4o";
const DEFAULT_PLANNER_MODEL: &str = "o1-preview";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LLM_MAX_OUTPUT_TOKENS: u32 = 4096;
const DEFAULT_QUERY_TOP_K: usize = 300;
const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_RETENTION_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name}={value:?} ({expected})")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{backend} backend requires {name} (set it in the environment or .env)")]
    MissingSecret {
        backend: &'static str,
        name: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackendKind {
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmBackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "ollama" | "local" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub anthropic_version: String,
    /// `None` disables the per-request timeout.
    pub timeout: Option<Duration>,
    pub max_output_tokens: u32,
}

impl LlmConfig {
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        let name = match self.backend {
            LlmBackendKind::OpenAi => OPENAI_API_KEY_ENV,
            LlmBackendKind::Anthropic => ANTHROPIC_API_KEY_ENV,
            LlmBackendKind::Ollama => return Ok(""),
        };
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingSecret {
                backend: self.backend.as_str(),
                name,
            })
    }
}

/// Model used for each of the three reasoning roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoles {
    /// Cheap classifier + Cypher generation.
    pub router: String,
    /// Summarizes graph query results.
    pub answer: String,
    /// Free-form planning over the conversation history.
    pub planner: String,
}

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub models: ModelRoles,
    pub neo4j: Neo4jConfig,
    pub query_top_k: usize,
    pub history_window: usize,
    pub static_dir: PathBuf,
    pub retention: Duration,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests use a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = match get(DOGRAPH_LLM_BACKEND_ENV) {
            None => LlmBackendKind::OpenAi,
            Some(v) => LlmBackendKind::parse(&v).ok_or(ConfigError::Invalid {
                name: DOGRAPH_LLM_BACKEND_ENV,
                value: v,
                expected: "openai|anthropic|ollama",
            })?,
        };
        let (base_url, api_key) = match backend {
            LlmBackendKind::OpenAi => (
                normalize_base_url(
                    &get(OPENAI_BASE_URL_ENV).unwrap_or_default(),
                    DEFAULT_OPENAI_BASE_URL,
                    "https",
                ),
                get(OPENAI_API_KEY_ENV),
            ),
            LlmBackendKind::Anthropic => (
                normalize_base_url(
                    &get(ANTHROPIC_BASE_URL_ENV).unwrap_or_default(),
                    DEFAULT_ANTHROPIC_BASE_URL,
                    "https",
                ),
                get(ANTHROPIC_API_KEY_ENV),
            ),
            LlmBackendKind::Ollama => (
                normalize_base_url(
                    &get(OLLAMA_HOST_ENV).unwrap_or_default(),
                    DEFAULT_OLLAMA_HOST,
                    "http",
                ),
                None,
            ),
        };

        let timeout_secs = parse_number(
            get(DOGRAPH_LLM_TIMEOUT_SECS_ENV),
            DOGRAPH_LLM_TIMEOUT_SECS_ENV,
            DEFAULT_LLM_TIMEOUT_SECS,
            "integer seconds, 0 disables",
        )?;
        let max_output_tokens = parse_number(
            get(DOGRAPH_LLM_MAX_OUTPUT_TOKENS_ENV),
            DOGRAPH_LLM_MAX_OUTPUT_TOKENS_ENV,
            DEFAULT_LLM_MAX_OUTPUT_TOKENS,
            "integer tokens, e.g. 4096",
        )?;

        let llm = LlmConfig {
            backend,
            base_url,
            api_key,
            anthropic_version: get(ANTHROPIC_VERSION_ENV)
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            max_output_tokens: max_output_tokens.max(1),
        };

        let models = ModelRoles {
            router: get(DOGRAPH_ROUTER_MODEL_ENV).unwrap_or_else(|| DEFAULT_ROUTER_MODEL.to_string()),
            answer: get(DOGRAPH_ANSWER_MODEL_ENV).unwrap_or_else(|| DEFAULT_ANSWER_MODEL.to_string()),
            planner: get(DOGRAPH_PLANNER_MODEL_ENV)
                .unwrap_or_else(|| DEFAULT_PLANNER_MODEL.to_string()),
        };

        let neo4j = Neo4jConfig {
            uri: get(NEO4J_URI_ENV).unwrap_or_else(|| DEFAULT_NEO4J_URI.to_string()),
            username: get(NEO4J_USERNAME_ENV).unwrap_or_else(|| "neo4j".to_string()),
            password: get(NEO4J_PASSWORD_ENV),
            database: get(NEO4J_DATABASE_ENV).unwrap_or_else(|| "neo4j".to_string()),
        };

        let query_top_k = parse_number(
            get(DOGRAPH_QUERY_TOP_K_ENV),
            DOGRAPH_QUERY_TOP_K_ENV,
            DEFAULT_QUERY_TOP_K,
            "positive integer record limit",
        )?;
        let history_window = parse_number(
            get(DOGRAPH_HISTORY_WINDOW_ENV),
            DOGRAPH_HISTORY_WINDOW_ENV,
            DEFAULT_HISTORY_WINDOW,
            "integer number of exchanges",
        )?;
        let retention_secs = parse_number(
            get(DOGRAPH_RETENTION_SECS_ENV),
            DOGRAPH_RETENTION_SECS_ENV,
            DEFAULT_RETENTION_SECS,
            "integer seconds",
        )?;

        Ok(Self {
            llm,
            models,
            neo4j,
            query_top_k: query_top_k.max(1),
            history_window,
            static_dir: get(DOGRAPH_STATIC_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            retention: Duration::from_secs(retention_secs),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            value: v,
            expected,
        }),
    }
}

/// Trim, default, add a scheme when missing, drop trailing slashes.
pub fn normalize_base_url(base_url: &str, default: &str, scheme: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = default.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("{scheme}://{host}");
    }
    host.trim_end_matches('/').to_string()
}
