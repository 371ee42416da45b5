use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString, IntoEnumIterator};

use crate::error::{HubError, Result};
use crate::types::{AgentId, AgentProfile, IntentKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub dispatcher: DispatcherConfig,
    pub intake: IntakeConfig,
    pub logging: LoggingConfig,
    pub agents: Vec<AgentProfile>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            dispatcher: DispatcherConfig::default(),
            intake: IntakeConfig::default(),
            logging: LoggingConfig::default(),
            agents: default_agents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Value expected in the `X-API-Key` header; `None` disables auth
    pub api_key: Option<String>,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key: None,
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub max_connections: u32,
    pub cache_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            max_connections: 10,
            cache_ttl_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenRouter,
    OpenAi,
}

impl LlmProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on the transcript carried between sequential agents
    pub max_context_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: None,
            api_key: None,
            timeout_secs: 60,
            max_context_chars: 12_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl LlmConfig {
    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }
}

/// Retry policy for upstream LLM calls.
///
/// Attempt `n` (1-based) that fails with a retryable error sleeps
/// `initial_backoff_ms * 2^(n-1)`, capped at `max_backoff_ms`, before the
/// next attempt. `max_attempts = 1` disables retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Run orchestration on background workers; inline when false
    pub enabled: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Per-room broadcast buffer for WebSocket fan-out
    pub event_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 4,
            queue_capacity: 256,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Mailgun webhook signing key; every payload is rejected when unset
    pub signing_key: Option<String>,
    /// Maximum accepted webhook timestamp age, 0 disables the check
    pub max_age_secs: u64,
    pub routes: IntakeRoutes,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            max_age_secs: 900,
            routes: IntakeRoutes::default(),
        }
    }
}

/// Default agent set per classified email intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeRoutes {
    pub bug_report: Vec<AgentId>,
    pub feature_request: Vec<AgentId>,
    pub question: Vec<AgentId>,
    pub general: Vec<AgentId>,
}

impl Default for IntakeRoutes {
    fn default() -> Self {
        Self {
            bug_report: builtin_ids(&["bug_01", "coding_01"]),
            feature_request: builtin_ids(&["planning_01", "coding_01"]),
            question: builtin_ids(&["research_01"]),
            general: builtin_ids(&["planning_01"]),
        }
    }
}

impl IntakeRoutes {
    pub fn agents_for(&self, intent: IntentKind) -> &[AgentId] {
        match intent {
            IntentKind::BugReport => &self.bug_report,
            IntentKind::FeatureRequest => &self.feature_request,
            IntentKind::Question => &self.question,
            IntentKind::General => &self.general,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn builtin_ids(ids: &[&str]) -> Vec<AgentId> {
    ids.iter().filter_map(|id| AgentId::parse(*id).ok()).collect()
}

fn builtin_agent(
    id: &str,
    display_name: &str,
    capabilities: &[&str],
    system_prompt: &str,
) -> Option<AgentProfile> {
    Some(AgentProfile {
        id: AgentId::parse(id).ok()?,
        display_name: display_name.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        model: "openai/gpt-4o-mini".to_string(),
        system_prompt: system_prompt.to_string(),
        temperature: 0.7,
    })
}

fn default_agents() -> Vec<AgentProfile> {
    [
        builtin_agent(
            "bug_01",
            "Bug Hunter",
            &["debugging", "triage"],
            "You reproduce and diagnose software defects. Identify the most likely root cause.",
        ),
        builtin_agent(
            "coding_01",
            "Code Smith",
            &["coding", "refactoring"],
            "You write and fix code. Propose a concrete patch.",
        ),
        builtin_agent(
            "planning_01",
            "Planner",
            &["planning", "decomposition"],
            "You break requests into clear, ordered implementation steps.",
        ),
        builtin_agent(
            "writing_01",
            "Writer",
            &["documentation", "summaries"],
            "You write concise documentation and user-facing summaries.",
        ),
        builtin_agent(
            "research_01",
            "Researcher",
            &["research", "questions"],
            "You answer questions accurately and cite the reasoning behind the answer.",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

impl SystemConfig {
    /// Parse a TOML document without validating it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// File (when present) + process environment + validation
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) if Path::new(p).exists() => {
                let content = std::fs::read_to_string(p)?;
                Self::from_toml_str(&content)?
            }
            Some(p) => {
                tracing::warn!(path = %p, "Configuration file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.storage.redis_url = Some(url);
        }
        if let Some(key) = lookup(self.llm.provider.api_key_env()) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = lookup("MAILGUN_SIGNING_KEY") {
            self.intake.signing_key = Some(key);
        }
        if let Some(key) = lookup("AGENT_HUB_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(host) = lookup("AGENT_HUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("AGENT_HUB_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(flag) = lookup("AGENT_HUB_ENABLE_WORKERS").and_then(|v| parse_flag(&v)) {
            self.dispatcher.enabled = flag;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |details: String| Err(HubError::ConfigValidation { details });

        if self.server.port == 0 {
            return fail("server.port must be non-zero".into());
        }
        if self.dispatcher.workers == 0 {
            return fail("dispatcher.workers must be at least 1".into());
        }
        if self.dispatcher.queue_capacity == 0 {
            return fail("dispatcher.queue_capacity must be at least 1".into());
        }
        if self.dispatcher.event_buffer == 0 {
            return fail("dispatcher.event_buffer must be at least 1".into());
        }
        if self.llm.retry.max_attempts == 0 {
            return fail("llm.retry.max_attempts must be at least 1".into());
        }
        if self.llm.max_context_chars == 0 {
            return fail("llm.max_context_chars must be at least 1".into());
        }
        if self.agents.is_empty() {
            return fail("at least one agent must be configured".into());
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.clone()) {
                return fail(format!("duplicate agent id '{}'", agent.id));
            }
            if !(0.0..=2.0).contains(&agent.temperature) {
                return fail(format!(
                    "agent '{}' temperature {} outside [0, 2]",
                    agent.id, agent.temperature
                ));
            }
            if agent.model.trim().is_empty() {
                return fail(format!("agent '{}' has no model", agent.id));
            }
        }

        for intent in IntentKind::iter() {
            let agents = self.intake.routes.agents_for(intent);
            if agents.is_empty() {
                return fail(format!("intake route '{}' has no agents", intent));
            }
            if let Some(unknown) = agents.iter().find(|id| !seen.contains(*id)) {
                return fail(format!(
                    "intake route '{}' references unknown agent '{}'",
                    intent, unknown
                ));
            }
        }

        Ok(())
    }

    /// Level handed to the tracing subscriber: an explicit override (CLI
    /// flag) beats `[logging] level`. `RUST_LOG` still wins over both.
    pub fn log_level<'a>(&'a self, cli_override: Option<&'a str>) -> &'a str {
        cli_override
            .filter(|level| !level.trim().is_empty())
            .unwrap_or(&self.logging.level)
    }

    pub fn agent_profile(&self, id: &AgentId) -> Option<&AgentProfile> {
        self.agents.iter().find(|agent| &agent.id == id)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
