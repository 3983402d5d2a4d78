use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub commerce: CommerceConfig,
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub access_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct CommerceConfig {
    pub base_url: String,
    pub access_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub max_concurrency: usize,
    pub min_gap_ms: u64,
    pub batch_page_size: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub log_level: Option<String>,
    pub crm_base_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub commerce_base_url: Option<String>,
    pub commerce_access_token: Option<String>,
    pub gateway_max_concurrency: Option<usize>,
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
            crm: CrmConfig {
                base_url: "https://api.hubapi.com".to_string(),
                access_token: String::new().into(),
            },
            commerce: CommerceConfig {
                base_url: String::new(),
                access_token: String::new().into(),
            },
            gateway: GatewayConfig { max_concurrency: 8, min_gap_ms: 3000, batch_page_size: 100 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8090,
                health_check_port: 8091,
                graceful_shutdown_secs: 15,
            },
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    commerce: Option<CommercePatch>,
    gateway: Option<GatewayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommercePatch {
    base_url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    max_concurrency: Option<usize>,
    min_gap_ms: Option<u64>,
    batch_page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("quotelink.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(crm_access_token_value) = crm.access_token {
                self.crm.access_token = secret_value(crm_access_token_value);
            }
        }

        if let Some(commerce) = patch.commerce {
            if let Some(base_url) = commerce.base_url {
                self.commerce.base_url = base_url;
            }
            if let Some(commerce_access_token_value) = commerce.access_token {
                self.commerce.access_token = secret_value(commerce_access_token_value);
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(max_concurrency) = gateway.max_concurrency {
                self.gateway.max_concurrency = max_concurrency;
            }
            if let Some(min_gap_ms) = gateway.min_gap_ms {
                self.gateway.min_gap_ms = min_gap_ms;
            }
            if let Some(batch_page_size) = gateway.batch_page_size {
                self.gateway.batch_page_size = batch_page_size;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("QUOTELINK_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("QUOTELINK_CRM_ACCESS_TOKEN") {
            self.crm.access_token = secret_value(value);
        }

        if let Some(value) = read_env("QUOTELINK_COMMERCE_BASE_URL") {
            self.commerce.base_url = value;
        }
        if let Some(value) = read_env("QUOTELINK_COMMERCE_ACCESS_TOKEN") {
            self.commerce.access_token = secret_value(value);
        }

        if let Some(value) = read_env("QUOTELINK_GATEWAY_MAX_CONCURRENCY") {
            self.gateway.max_concurrency =
                parse_usize("QUOTELINK_GATEWAY_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("QUOTELINK_GATEWAY_MIN_GAP_MS") {
            self.gateway.min_gap_ms = parse_u64("QUOTELINK_GATEWAY_MIN_GAP_MS", &value)?;
        }
        if let Some(value) = read_env("QUOTELINK_GATEWAY_BATCH_PAGE_SIZE") {
            self.gateway.batch_page_size =
                parse_usize("QUOTELINK_GATEWAY_BATCH_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("QUOTELINK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUOTELINK_SERVER_PORT") {
            self.server.port = parse_u16("QUOTELINK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUOTELINK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("QUOTELINK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("QUOTELINK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QUOTELINK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("QUOTELINK_LOGGING_LEVEL").or_else(|| read_env("QUOTELINK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUOTELINK_LOGGING_FORMAT").or_else(|| read_env("QUOTELINK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(crm_access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(crm_access_token);
        }
        if let Some(commerce_base_url) = overrides.commerce_base_url {
            self.commerce.base_url = commerce_base_url;
        }
        if let Some(commerce_access_token) = overrides.commerce_access_token {
            self.commerce.access_token = secret_value(commerce_access_token);
        }
        if let Some(max_concurrency) = overrides.gateway_max_concurrency {
            self.gateway.max_concurrency = max_concurrency;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_commerce(&self.commerce)?;
        validate_gateway(&self.gateway)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("quotelink.toml"), PathBuf::from("config/quotelink.toml")]
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

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    let base_url = crm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must be an http(s) URL".to_string(),
        ));
    }

    if crm.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required. Create a private app access token in the CRM developer settings".to_string(),
        ));
    }

    Ok(())
}

fn validate_commerce(commerce: &CommerceConfig) -> Result<(), ConfigError> {
    let base_url = commerce.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "commerce.base_url must be an http(s) URL (your store's admin API endpoint)"
                .to_string(),
        ));
    }

    if commerce.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "commerce.access_token is required. Create an admin API access token for the store"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.max_concurrency == 0 || gateway.max_concurrency > 64 {
        return Err(ConfigError::Validation(
            "gateway.max_concurrency must be in range 1..=64".to_string(),
        ));
    }

    if gateway.min_gap_ms < 100 || gateway.min_gap_ms > 60_000 {
        return Err(ConfigError::Validation(
            "gateway.min_gap_ms must be in range 100..=60000".to_string(),
        ));
    }

    if gateway.batch_page_size == 0 || gateway.batch_page_size > 100 {
        return Err(ConfigError::Validation(
            "gateway.batch_page_size must be in range 1..=100 (provider batch limit)".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 || server.graceful_shutdown_secs > 300 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    let level = logging.level.trim().to_ascii_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of trace|debug|info|warn|error, got `{}`",
            logging.level
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            crm_access_token: Some("pat-na1-demo".to_string()),
            commerce_base_url: Some("https://demo-store.example.com".to_string()),
            commerce_access_token: Some("shpat-demo".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_pass_validation_once_tokens_are_supplied() {
        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("config should load");

        assert_eq!(config.crm.base_url, "https://api.hubapi.com");
        assert_eq!(config.gateway.max_concurrency, 8);
        assert_eq!(config.gateway.min_gap_ms, 3000);
        assert_eq!(config.gateway.batch_page_size, 100);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn missing_crm_token_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                commerce_base_url: Some("https://demo-store.example.com".to_string()),
                commerce_access_token: Some("shpat-demo".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let error = result.expect_err("should fail validation");
        assert!(matches!(error, ConfigError::Validation(_)));
        assert!(error.to_string().contains("crm.access_token"));
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[crm]
access_token = "pat-na1-from-file"

[commerce]
base_url = "https://store.example.com"
access_token = "shpat-from-file"

[gateway]
max_concurrency = 4
min_gap_ms = 500

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("config should load");

        assert_eq!(config.crm.access_token.expose_secret(), "pat-na1-from-file");
        assert_eq!(config.commerce.base_url, "https://store.example.com");
        assert_eq!(config.gateway.max_concurrency, 4);
        assert_eq!(config.gateway.min_gap_ms, 500);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn env_interpolation_resolves_placeholders() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[crm]
access_token = "${{QUOTELINK_TEST_INTERPOLATED_TOKEN}}"

[commerce]
base_url = "https://store.example.com"
access_token = "shpat-demo"
"#
        )
        .expect("write config");

        std::env::set_var("QUOTELINK_TEST_INTERPOLATED_TOKEN", "pat-na1-interp");
        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("config should load");
        std::env::remove_var("QUOTELINK_TEST_INTERPOLATED_TOKEN");

        assert_eq!(config.crm.access_token.expose_secret(), "pat-na1-interp");
    }

    #[test]
    fn out_of_range_gateway_settings_are_rejected() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                gateway_max_concurrency: Some(0),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        });

        let error = result.expect_err("should fail validation");
        assert!(error.to_string().contains("gateway.max_concurrency"));
    }
}
