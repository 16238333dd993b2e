use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub interactive: InteractiveConfig,
    pub pricing: PricingConfig,
    pub logging: LoggingConfig,
}

/// Where the orchestrator sends requests.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct InteractiveConfig {
    pub max_questions: usize,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub default_region: Option<String>,
    pub policy_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub output_dir: Option<PathBuf>,
    pub max_questions: Option<usize>,
    pub default_region: Option<String>,
    pub policy_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                timeout_secs: 60,
                api_key: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                output_dir: PathBuf::from("output"),
                graceful_shutdown_secs: 15,
            },
            interactive: InteractiveConfig { max_questions: 5 },
            pricing: PricingConfig { default_region: None, policy_path: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("estimator.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Socket address the reference service listens on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(service) = patch.service {
            if let Some(base_url) = service.base_url {
                self.service.base_url = base_url;
            }
            if let Some(timeout_secs) = service.timeout_secs {
                self.service.timeout_secs = timeout_secs;
            }
            if let Some(api_key) = service.api_key {
                self.service.api_key = Some(secret_value(api_key));
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(output_dir) = server.output_dir {
                self.server.output_dir = output_dir;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(interactive) = patch.interactive {
            if let Some(max_questions) = interactive.max_questions {
                self.interactive.max_questions = max_questions;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(default_region) = pricing.default_region {
                self.pricing.default_region = Some(default_region);
            }
            if let Some(policy_path) = pricing.policy_path {
                self.pricing.policy_path = Some(policy_path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ESTIMATOR_SERVICE_BASE_URL") {
            self.service.base_url = value;
        }
        if let Some(value) = read_env("ESTIMATOR_SERVICE_TIMEOUT_SECS") {
            self.service.timeout_secs = parse_u64("ESTIMATOR_SERVICE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ESTIMATOR_SERVICE_API_KEY") {
            self.service.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("ESTIMATOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ESTIMATOR_SERVER_PORT") {
            self.server.port = parse_u16("ESTIMATOR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ESTIMATOR_SERVER_OUTPUT_DIR") {
            self.server.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("ESTIMATOR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ESTIMATOR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ESTIMATOR_INTERACTIVE_MAX_QUESTIONS") {
            self.interactive.max_questions =
                parse_usize("ESTIMATOR_INTERACTIVE_MAX_QUESTIONS", &value)?;
        }

        if let Some(value) = read_env("ESTIMATOR_PRICING_DEFAULT_REGION") {
            self.pricing.default_region = Some(value);
        }
        if let Some(value) = read_env("ESTIMATOR_PRICING_POLICY_PATH") {
            self.pricing.policy_path = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("ESTIMATOR_LOGGING_LEVEL").or_else(|| read_env("ESTIMATOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ESTIMATOR_LOGGING_FORMAT").or_else(|| read_env("ESTIMATOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.service.base_url = base_url;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.service.timeout_secs = timeout_secs;
        }
        if let Some(api_key) = overrides.api_key {
            self.service.api_key = Some(secret_value(api_key));
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.server.output_dir = output_dir;
        }
        if let Some(max_questions) = overrides.max_questions {
            self.interactive.max_questions = max_questions;
        }
        if let Some(default_region) = overrides.default_region {
            self.pricing.default_region = Some(default_region);
        }
        if let Some(policy_path) = overrides.policy_path {
            self.pricing.policy_path = Some(policy_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_service(&self.service)?;
        validate_server(&self.server)?;
        validate_interactive(&self.interactive)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("estimator.toml"), PathBuf::from("config/estimator.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_service(service: &ServiceConfig) -> Result<(), ConfigError> {
    let base_url = service.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "service.base_url must start with http:// or https://".to_string(),
        ));
    }

    if service.timeout_secs == 0 || service.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "service.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    let blank_key =
        service.api_key.as_ref().is_some_and(|value| value.expose_secret().trim().is_empty());
    if blank_key {
        return Err(ConfigError::Validation(
            "service.api_key must not be blank when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address is required".to_string()));
    }

    if server.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("server.output_dir is required".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_interactive(interactive: &InteractiveConfig) -> Result<(), ConfigError> {
    if !(1..=20).contains(&interactive.max_questions) {
        return Err(ConfigError::Validation(
            "interactive.max_questions must be in range 1..=20".to_string(),
        ));
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.default_region.as_ref().is_some_and(|region| region.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "pricing.default_region must not be blank when set".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    service: Option<ServicePatch>,
    server: Option<ServerPatch>,
    interactive: Option<InteractivePatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicePatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    output_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct InteractivePatch {
    max_questions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    default_region: Option<String>,
    policy_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
