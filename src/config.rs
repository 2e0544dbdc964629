use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_CHANNEL_API_BASE_URL: &str = "https://graph.facebook.com/v19.0";
const DEFAULT_STALE_MESSAGE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ITEM_NAME_PREFIX: &str = "Order";

/// Path suffixes the gateway calls back on; each one is served by its own handler.
pub const WEBHOOK_PATH: &str = "/webhook";
pub const PAYMENT_RETURN_PATH: &str = "/payment_return";
pub const PAYMENT_CANCEL_PATH: &str = "/payment_canceled";
pub const PAYMENT_NOTIFY_PATH: &str = "/payment_notify";

const GATEWAY_PROCESS_PATH: &str = "/eng/process";
const GATEWAY_VALIDATE_PATH: &str = "/eng/query/validate";

/// Application configuration, loaded once at startup and shared read-only.
#[derive(Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    pub environment: String,

    /// Server host address
    pub host: String,

    /// Listening port
    #[validate(custom = "validate_port")]
    pub port: u16,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    // ========== Chat channel ==========
    /// Token echoed by the provider during the subscription handshake
    #[validate(length(min = 1))]
    pub verify_token: String,

    /// App secret used to sign inbound event bodies (`X-Hub-Signature-256`)
    #[validate(length(min = 1))]
    pub channel_app_secret: String,

    /// Bearer token for the outbound messaging API
    #[validate(length(min = 1))]
    pub channel_api_token: String,

    /// Sending phone number id on the messaging API
    #[validate(length(min = 1))]
    pub phone_id: String,

    /// Business phone number the channel delivers to; events for other numbers are ignored
    #[validate(length(min = 1))]
    pub host_number: String,

    /// Base URL of the messaging API
    #[serde(default = "default_channel_api_base_url")]
    #[validate(url)]
    pub channel_api_base_url: String,

    /// Events older than this are acknowledged and dropped
    #[serde(default = "default_stale_message_timeout_secs")]
    pub stale_message_timeout_secs: u64,

    // ========== Database ==========
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    // ========== Payment gateway ==========
    /// Externally reachable base URL of this service
    #[validate(url)]
    pub homebase_url: String,

    #[validate(length(min = 1))]
    pub merchant_id: String,

    #[validate(length(min = 1))]
    pub merchant_key: String,

    /// Shared passphrase salted into gateway signatures
    #[validate(length(min = 1))]
    pub passphrase: String,

    /// Gateway host, e.g. `https://sandbox.payfast.co.za`
    #[validate(url)]
    pub gateway_host: String,

    /// Bound on the server-to-server confirmation call (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 30))]
    pub gateway_timeout_secs: u64,

    /// Literal placed in front of the order id in the gateway item name
    #[serde(default = "default_item_name_prefix")]
    #[validate(length(min = 1))]
    pub item_name_prefix: String,
}

impl AppConfig {
    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn stale_message_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_message_timeout_secs)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Hosted checkout page the user is sent to
    pub fn gateway_process_url(&self) -> String {
        format!("{}{}", self.gateway_host.trim_end_matches('/'), GATEWAY_PROCESS_PATH)
    }

    /// Endpoint that confirms a notification really came from the gateway
    pub fn gateway_validate_url(&self) -> String {
        format!("{}{}", self.gateway_host.trim_end_matches('/'), GATEWAY_VALIDATE_PATH)
    }

    /// Merchant identity and callback base used by the checkout handoff
    pub fn merchant(&self) -> MerchantConfig {
        MerchantConfig {
            merchant_id: self.merchant_id.clone(),
            merchant_key: self.merchant_key.clone(),
            homebase_url: self.homebase_url.clone(),
            item_name_prefix: self.item_name_prefix.clone(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("verify_token", &REDACTED)
            .field("channel_app_secret", &REDACTED)
            .field("channel_api_token", &REDACTED)
            .field("phone_id", &self.phone_id)
            .field("host_number", &self.host_number)
            .field("channel_api_base_url", &self.channel_api_base_url)
            .field("stale_message_timeout_secs", &self.stale_message_timeout_secs)
            .field("database_url", &REDACTED)
            .field("auto_migrate", &self.auto_migrate)
            .field("homebase_url", &self.homebase_url)
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &REDACTED)
            .field("passphrase", &REDACTED)
            .field("gateway_host", &self.gateway_host)
            .field("gateway_timeout_secs", &self.gateway_timeout_secs)
            .field("item_name_prefix", &self.item_name_prefix)
            .finish_non_exhaustive()
    }
}

/// Merchant settings consumed by the checkout builder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    pub homebase_url: String,
    pub item_name_prefix: String,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_channel_api_base_url() -> String {
    DEFAULT_CHANNEL_API_BASE_URL.to_string()
}

fn default_stale_message_timeout_secs() -> u64 {
    DEFAULT_STALE_MESSAGE_TIMEOUT_SECS
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_item_name_prefix() -> String {
    DEFAULT_ITEM_NAME_PREFIX.to_string()
}

fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        let mut err = ValidationError::new("port");
        err.message = Some("port must be set to a non-zero value (APP__PORT)".into());
        return Err(err);
    }
    Ok(())
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("chatpay_bridge={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults for non-secret settings
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
///
/// Secrets, merchant identity and the listening port have no defaults: a missing one
/// fails here with the setting named, and the process refuses to start.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    load_from(builder, &run_env)
}

/// Applies defaults to a prepared source stack, then deserializes and validates it.
pub fn load_from(
    sources: config::ConfigBuilder<config::builder::DefaultState>,
    run_env: &str,
) -> Result<AppConfig, AppConfigError> {
    let config = sources
        .set_default("environment", run_env)?
        .set_default("host", "0.0.0.0")?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        error!("Configuration is incomplete: {}", e);
        AppConfigError::Load(e)
    })?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
