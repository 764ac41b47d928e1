// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for loopmon.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Parse YAML (through the `config` crate), TOML or JSON
//! 4. Apply `LOOPMON_*` and `OPCUA_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! LOOPMON_LOG_LEVEL=debug
//! LOOPMON_LOG_FORMAT=json
//! LOOPMON_SINK=stdout
//! OPCUA_MAX_RETRY=0
//! OPCUA_PUBLISHING_INTERVAL=500
//! OPCUA_SAMPLING_INTERVAL=100
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, LogLevel, LoopmonConfig, SinkKind};

/// Default prefix for loader-level overrides.
pub const DEFAULT_ENV_PREFIX: &str = "LOOPMON";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Where placeholder and override values are looked up.
#[derive(Debug, Clone, Default)]
enum EnvSource {
    /// The process environment.
    #[default]
    Process,
    /// A fixed set of variables.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

/// Configuration loader for loopmon.
///
/// # Examples
///
/// ```no_run
/// use loopmon_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("loopmon.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether placeholders and overrides are applied.
    resolve_env_vars: bool,

    env: EnvSource,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            env: EnvSource::Process,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholder resolution and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = EnvSource::Fixed(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is chosen by extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<LoopmonConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let config = self.process(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        info!(
            servers = config.servers.len(),
            tags = config.tag_count(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<LoopmonConfig> {
        self.process(content, format)
    }

    fn process(&self, content: &str, format: ConfigFormat) -> ConfigResult<LoopmonConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        let mut config: LoopmonConfig = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        debug!(format = format.extension(), "Configuration validated");
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    /// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
    ///
    /// An unset variable with no default is an error.
    fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name.trim(), Some(default)),
                None => (var_content.trim(), None),
            };

            match (self.env.get(var_name), default_value) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => {
                    warn!(variable = var_name, "Environment variable not set");
                    return Err(ConfigError::env_var_not_found(var_name));
                }
            }
        }

        Ok(result)
    }

    fn apply_env_overrides(&self, config: &mut LoopmonConfig) -> ConfigResult<()> {
        let var = |suffix: &str| format!("{}_{}", self.env_prefix, suffix);
        let read = |name: &str| self.env.get(name).filter(|v| !v.trim().is_empty());

        let name = var("LOG_LEVEL");
        if let Some(value) = read(&name) {
            config.logging.level = parse_log_level(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, "expected trace|debug|info|warn|error"))?;
        }

        let name = var("LOG_FORMAT");
        if let Some(value) = read(&name) {
            config.logging.format = parse_log_format(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, "expected text|json|compact"))?;
        }

        let name = var("SINK");
        if let Some(value) = read(&name) {
            config.sink.kind = parse_sink_kind(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, "expected tracing|stdout"))?;
        }

        let lookup = |name: &str| self.env.get(name);
        config.opcua.apply_overrides_from(lookup)?;

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_log_level(value: &str) -> Option<LogLevel> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

fn parse_log_format(value: &str) -> Option<LogFormat> {
    match value.trim().to_lowercase().as_str() {
        "text" | "pretty" => Some(LogFormat::Text),
        "json" => Some(LogFormat::Json),
        "compact" => Some(LogFormat::Compact),
        _ => None,
    }
}

fn parse_sink_kind(value: &str) -> Option<SinkKind> {
    match value.trim().to_lowercase().as_str() {
        "tracing" | "log" => Some(SinkKind::Tracing),
        "stdout" => Some(SinkKind::Stdout),
        _ => None,
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
///
/// ```no_run
/// use loopmon_config::loader::load_config;
///
/// let config = load_config("loopmon.yaml").unwrap();
/// ```
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<LoopmonConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<LoopmonConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use loopmon_opcua::{NodeId, SecurityMode, SecurityPolicy};
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
opcua:
  default_sampling_interval: 250ms
  reconnect:
    base_delay: 2s
    max_delay: 1m
    max_retry_attempts: 0

servers:
  - name: plc-1
    endpoint_url: opc.tcp://plc-1:4840
    security_mode: None
    security_policy: None
    tags:
      - node_id: ns=2;s=Line1.Temperature
      - node_id: ns=2;i=1001
        sampling_interval: 50ms
        queue_size: 10
  - name: plc-2
    endpoint_url: opc.tcp://plc-2:4840
    username: operator
    password: ${PLC2_PASSWORD:changeme}

sink:
  kind: stdout
  capacity: 64

logging:
  level: debug
  format: json
"#;

    fn isolated() -> ConfigLoader {
        ConfigLoader::new().with_environment(Vec::<(String, String)>::new())
    }

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(".yaml", YAML);
        let config = isolated().load(file.path()).unwrap();

        assert_eq!(config.opcua.default_sampling_interval, Duration::from_millis(250));
        assert_eq!(config.opcua.reconnect.base_delay, Duration::from_secs(2));
        assert_eq!(config.opcua.reconnect.max_retry_attempts, 0);
        assert_eq!(config.opcua.default_queue_size, 100);

        assert_eq!(config.servers.len(), 2);
        let plc1 = &config.servers[0];
        assert_eq!(plc1.security_mode, SecurityMode::None);
        assert_eq!(plc1.security_policy, SecurityPolicy::None);
        assert_eq!(plc1.tags[1].parse_node_id().unwrap(), NodeId::numeric(2, 1001));
        assert_eq!(plc1.tags[1].sampling_interval, Some(Duration::from_millis(50)));
        assert_eq!(plc1.tags[1].queue_size, Some(10));

        let plc2 = config.server("plc-2").unwrap();
        assert_eq!(plc2.password.as_deref(), Some("changeme"));
        assert_eq!(plc2.security_mode, SecurityMode::SignAndEncrypt);

        assert_eq!(config.sink.kind, SinkKind::Stdout);
        assert_eq!(config.sink.capacity, 64);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[opcua.subscription]
publishing_interval = "500ms"

[[servers]]
name = "plc-1"
endpoint_url = "opc.tcp://plc-1:4840"

[[servers.tags]]
node_id = "ns=2;s=Line1.Pressure"
"#;
        let file = write_temp(".toml", toml);
        let config = isolated().load(file.path()).unwrap();
        assert_eq!(
            config.opcua.subscription.publishing_interval,
            Duration::from_millis(500)
        );
        assert_eq!(config.tag_count(), 1);
    }

    #[test]
    fn test_load_json() {
        let json = r#"{
            "servers": [
                { "name": "plc-1", "endpoint_url": "opc.tcp://plc-1:4840", "tags": [] }
            ],
            "logging": { "format": "compact" }
        }"#;
        let config = isolated().load_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = isolated().load_from_str("", ConfigFormat::Yaml).unwrap();
        assert!(config.servers.is_empty());
        assert_eq!(config.opcua.reconnect.max_retry_attempts, 10);
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("loopmon.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("loopmon.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("loopmon.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("loopmon.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("loopmon.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("loopmon")).is_err());
    }

    #[test]
    fn test_env_placeholder_resolution() {
        let loader = isolated().with_environment([("PLC_HOST", "10.0.0.5")]);
        let resolved = loader
            .resolve_env_placeholders("url: opc.tcp://${PLC_HOST}:${PLC_PORT:4840}")
            .unwrap();
        assert_eq!(resolved, "url: opc.tcp://10.0.0.5:4840");
    }

    #[test]
    fn test_env_placeholder_missing_without_default() {
        let err = isolated()
            .resolve_env_placeholders("password: ${PLC_PASSWORD}")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound { ref name } if name == "PLC_PASSWORD"));
    }

    #[test]
    fn test_unterminated_placeholder_kept() {
        let resolved = isolated().resolve_env_placeholders("a: ${OPEN").unwrap();
        assert_eq!(resolved, "a: ${OPEN");
    }

    #[test]
    fn test_env_overrides() {
        let loader = isolated().with_environment([
            ("LOOPMON_LOG_LEVEL", "warn"),
            ("LOOPMON_LOG_FORMAT", "compact"),
            ("LOOPMON_SINK", "tracing"),
            ("OPCUA_MAX_RETRY", "3"),
            ("OPCUA_SAMPLING_INTERVAL", "75"),
            ("PLC2_PASSWORD", "s3cret"),
        ]);
        let config = loader.load_from_str(YAML, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.sink.kind, SinkKind::Tracing);
        assert_eq!(config.opcua.reconnect.max_retry_attempts, 3);
        assert_eq!(config.opcua.default_sampling_interval, Duration::from_millis(75));
        assert_eq!(config.servers[1].password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_env_override() {
        let loader = isolated().with_environment([("LOOPMON_LOG_LEVEL", "loud")]);
        let err = loader.load_from_str("", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

        let loader = isolated().with_environment([("OPCUA_MAX_RETRY", "many")]);
        let err = loader.load_from_str("", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Manager(_)));
    }

    #[test]
    fn test_custom_prefix() {
        let loader = ConfigLoader::builder()
            .env_prefix("PLANT")
            .build()
            .with_environment([("PLANT_LOG_LEVEL", "trace"), ("LOOPMON_LOG_LEVEL", "error")]);
        let config = loader.load_from_str("", ConfigFormat::Yaml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_env_resolution_disabled() {
        let loader = ConfigLoader::builder()
            .resolve_env_vars(false)
            .build()
            .with_environment([("LOOPMON_LOG_LEVEL", "trace")]);
        let config = loader
            .load_from_str("logging:\n  level: info\n", ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_loader_setters() {
        let config = ConfigLoader::new()
            .with_env_prefix("PLANT")
            .with_environment([("PLANT_SINK", "stdout")])
            .load_from_str("", ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.sink.kind, SinkKind::Stdout);

        let config = ConfigLoader::new()
            .with_env_vars(false)
            .with_environment([("LOOPMON_SINK", "stdout")])
            .load_from_str("", ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.sink.kind, SinkKind::Tracing);
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = write_temp(".json", "{ not json");
        let err = isolated().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{ "servers": [], "plugins": {} }"#;
        assert!(isolated().load_from_str(json, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_validation_runs_after_load() {
        let json = r#"{ "servers": [
            { "name": "a", "endpoint_url": "opc.tcp://plc:4840" },
            { "name": "b", "endpoint_url": "opc.tcp://plc:4840" }
        ] }"#;
        let err = isolated().load_from_str(json, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEndpoint { .. }));
    }

    #[test]
    fn test_file_not_found() {
        let result = isolated().load("/nonexistent/path/loopmon.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_log_level("WARNING"), Some(LogLevel::Warn));
        assert_eq!(parse_log_level("invalid"), None);
        assert_eq!(parse_log_format("pretty"), Some(LogFormat::Text));
        assert_eq!(parse_sink_kind("STDOUT"), Some(SinkKind::Stdout));
        assert_eq!(parse_sink_kind("kafka"), None);
    }
}
