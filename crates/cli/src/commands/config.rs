use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use estimator_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the source of every value
/// (flag > env > file > default). Secrets are redacted.
pub fn run(options: LoadOptions, flagged: &[&str]) -> CommandResult {
    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure("config", &error),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let api_key = config
        .service
        .api_key
        .as_ref()
        .map_or_else(|| "<unset>".to_string(), |key| redact_token(key.expose_secret()));

    let fields = [
        ("service.base_url", "ESTIMATOR_SERVICE_BASE_URL", config.service.base_url.clone()),
        (
            "service.timeout_secs",
            "ESTIMATOR_SERVICE_TIMEOUT_SECS",
            config.service.timeout_secs.to_string(),
        ),
        ("service.api_key", "ESTIMATOR_SERVICE_API_KEY", api_key),
        (
            "server.bind_address",
            "ESTIMATOR_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "ESTIMATOR_SERVER_PORT", config.server.port.to_string()),
        (
            "server.output_dir",
            "ESTIMATOR_SERVER_OUTPUT_DIR",
            config.server.output_dir.display().to_string(),
        ),
        (
            "server.graceful_shutdown_secs",
            "ESTIMATOR_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "interactive.max_questions",
            "ESTIMATOR_INTERACTIVE_MAX_QUESTIONS",
            config.interactive.max_questions.to_string(),
        ),
        (
            "pricing.default_region",
            "ESTIMATOR_PRICING_DEFAULT_REGION",
            config.pricing.default_region.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "pricing.policy_path",
            "ESTIMATOR_PRICING_POLICY_PATH",
            config
                .pricing
                .policy_path
                .as_ref()
                .map_or_else(|| "<builtin>".to_string(), |path| path.display().to_string()),
        ),
        ("logging.level", "ESTIMATOR_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "ESTIMATOR_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let entries: Vec<ConfigEntry> = fields
        .into_iter()
        .map(|(key, env_key, value)| ConfigEntry {
            key,
            value,
            source: field_source(
                key,
                env_key,
                flagged,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        })
        .collect();

    CommandResult::success(
        "config",
        "effective config (source precedence: flag > env > file > default)",
        Some(json!({ "entries": entries })),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("estimator.toml"), PathBuf::from("config/estimator.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    flagged: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if flagged.contains(&key_path) {
        return "flag".to_string();
    }

    // The logging keys also honour the short ESTIMATOR_LOG_* spellings.
    let short_key = env_key.replace("_LOGGING_", "_LOG_");
    let set_key = [env_key, short_key.as_str()].into_iter().find(|key| env::var_os(key).is_some());
    if let Some(found) = set_key {
        return format!("env ({found})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
