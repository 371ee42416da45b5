use agent_hub_common::config::{LlmProvider, SystemConfig};
use agent_hub_common::types::{AgentId, IntentKind};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 9000
api_key = "secret"

[storage]
database_url = "postgresql://localhost/agent_hub"
redis_url = "redis://localhost:6379"
cache_ttl_secs = 10

[llm]
provider = "openai"
timeout_secs = 30
max_context_chars = 4000

[llm.retry]
max_attempts = 5
initial_backoff_ms = 100
max_backoff_ms = 1000

[dispatcher]
enabled = false
workers = 2

[intake]
signing_key = "mailgun-key"

[intake.routes]
bug_report = ["triage"]
feature_request = ["triage"]
question = ["triage"]
general = ["triage"]

[[agents]]
id = "triage"
display_name = "Triage"
capabilities = ["debugging"]
model = "gpt-4o-mini"
system_prompt = "You triage incoming work"
temperature = 0.3
"#;

#[test]
fn test_config_load_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("agent-hub.toml");
    fs::write(&config_path, FULL_CONFIG).unwrap();

    let config = SystemConfig::from_file(config_path.to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.api_key.as_deref(), Some("secret"));
    assert_eq!(config.llm.provider, LlmProvider::OpenAi);
    assert_eq!(config.llm.endpoint(), "https://api.openai.com/v1");
    assert_eq!(config.llm.retry.max_attempts, 5);
    assert!(!config.dispatcher.enabled);
    assert_eq!(config.agents.len(), 1);
    assert_eq!(config.agents[0].id.as_str(), "triage");
    assert_eq!(
        config.intake.routes.agents_for(IntentKind::BugReport),
        &[AgentId::parse("triage").unwrap()]
    );
}

#[test]
fn test_defaults_are_valid() {
    let config = SystemConfig::default();
    config.validate().unwrap();

    assert_eq!(config.agents.len(), 5);
    assert!(config.dispatcher.enabled);
    assert_eq!(config.llm.endpoint(), "https://openrouter.ai/api/v1");
}

#[test]
fn test_config_validation_invalid_temperature() {
    let config_content = r#"
[[agents]]
id = "hot"
display_name = "Hot"
model = "gpt-4o"
temperature = 3.0

[intake.routes]
bug_report = ["hot"]
feature_request = ["hot"]
question = ["hot"]
general = ["hot"]
"#;

    let config = SystemConfig::from_toml_str(config_content).unwrap();
    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("temperature"));
}

#[test]
fn test_config_validation_route_to_unknown_agent() {
    let config_content = r#"
[[agents]]
id = "only_one"
display_name = "Only"
model = "gpt-4o"
"#;

    // default routes reference the built-in agents, which are replaced here
    let config = SystemConfig::from_toml_str(config_content).unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("unknown agent"), "{}", err);
}

#[test]
fn test_config_validation_duplicate_agent() {
    let mut config = SystemConfig::default();
    let duplicate = config.agents[0].clone();
    config.agents.push(duplicate);

    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("duplicate agent id"));
}

#[test]
fn test_config_validation_zero_workers() {
    let mut config = SystemConfig::default();
    config.dispatcher.workers = 0;

    assert!(config.validate().unwrap_err().to_string().contains("workers"));
}

#[test]
fn test_invalid_agent_id_rejected_at_parse_time() {
    let config_content = r#"
[[agents]]
id = "Bug Hunter"
display_name = "Bug Hunter"
model = "gpt-4o"
"#;

    assert!(SystemConfig::from_toml_str(config_content).is_err());
}

#[test]
fn test_environment_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgresql://db/hub"),
        ("REDIS_URL", "redis://cache:6379"),
        ("OPENROUTER_API_KEY", "or-key"),
        ("MAILGUN_SIGNING_KEY", "mg-key"),
        ("AGENT_HUB_API_KEY", "api-key"),
        ("AGENT_HUB_PORT", "9999"),
        ("AGENT_HUB_ENABLE_WORKERS", "false"),
    ]);

    let mut config = SystemConfig::default();
    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.storage.database_url.as_deref(), Some("postgresql://db/hub"));
    assert_eq!(config.storage.redis_url.as_deref(), Some("redis://cache:6379"));
    assert_eq!(config.llm.api_key.as_deref(), Some("or-key"));
    assert_eq!(config.intake.signing_key.as_deref(), Some("mg-key"));
    assert_eq!(config.server.api_key.as_deref(), Some("api-key"));
    assert_eq!(config.server.port, 9999);
    assert!(!config.dispatcher.enabled);
}

#[test]
fn test_get_agent_profile() {
    let config = SystemConfig::default();

    assert!(config.agent_profile(&AgentId::parse("bug_01").unwrap()).is_some());
    assert!(config.agent_profile(&AgentId::parse("nonexistent").unwrap()).is_none());
}

#[test]
fn test_log_level_falls_back_to_config() {
    let config = SystemConfig::from_toml_str("[logging]\nlevel = \"debug\"\n").unwrap();

    assert_eq!(config.log_level(None), "debug");
    assert_eq!(config.log_level(Some("")), "debug");
    assert_eq!(config.log_level(Some("warn")), "warn");
    assert_eq!(SystemConfig::default().log_level(None), "info");
}
