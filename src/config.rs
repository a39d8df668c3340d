use config::{Case, Config, ConfigError, Environment, File};
use serde::Deserialize;

/// One year
const MAX_TTL_MINUTES: u64 = 525_600;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database URL (SQLite connection string)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory served under /static and /
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// API key for admin endpoints (optional - if not set, no auth required)
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Azure OpenAI connection settings
    pub openai: OpenAiConfig,

    /// Per-user quota policy
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Upload relay limits
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Vector store purge job
    #[serde(default)]
    pub purge: PurgeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    /// Resource endpoint, e.g. https://my-resource.openai.azure.com
    pub endpoint: String,

    pub api_key: String,

    /// Chat completion deployment name
    pub deployment: String,

    #[serde(default = "default_chat_api_version")]
    pub chat_api_version: String,

    /// API version used for files and vector stores
    #[serde(default = "default_files_api_version")]
    pub files_api_version: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Which record store backs the quota ledger
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    #[serde(default)]
    pub backend: QuotaBackend,

    /// Metered operations allowed per period
    #[serde(default = "default_quota_limit")]
    pub limit: u64,

    /// Rolling period length in days
    #[serde(default = "default_period_days")]
    pub period_days: u32,

    /// Conditional write attempts before failing closed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout applied to each individual store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            backend: QuotaBackend::default(),
            limit: default_quota_limit(),
            period_days: default_period_days(),
            max_attempts: default_max_attempts(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Maximum length of the base64 payload of a data URL
    #[serde(default = "default_max_encoded_bytes")]
    pub max_encoded_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_encoded_bytes: default_max_encoded_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurgeConfig {
    /// Whether the purge job is scheduled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (seconds resolution)
    #[serde(default = "default_purge_cron")]
    pub cron: String,

    /// IANA timezone for the cron schedule
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Vector stores older than this are deleted
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Only stores whose name starts with this prefix are touched
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_purge_cron(),
            timezone: default_timezone(),
            ttl_minutes: default_ttl_minutes(),
            name_prefix: default_name_prefix(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_url() -> String {
    "sqlite:data/chatgate.db".to_string()
}

fn default_static_dir() -> String {
    "wwwroot".to_string()
}

fn default_chat_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_files_api_version() -> String {
    "2024-05-01-preview".to_string()
}

fn default_system_prompt() -> String {
    "You are LAIER, a legal assistant specialised in Spanish law.".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_quota_limit() -> u64 {
    600
}

fn default_period_days() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_max_encoded_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_purge_cron() -> String {
    "0 */15 * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_ttl_minutes() -> u64 {
    60
}

fn default_name_prefix() -> String {
    crate::uploads::VECTOR_STORE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port())?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config.local").required(false))
            // CHATGATE_OPENAI__API_KEY -> openai.api_key
            .add_source(
                Environment::with_prefix("CHATGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .convert_case(Case::Snake)
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota.limit == 0 {
            return Err(ConfigError::Message(
                "quota.limit must be greater than zero".to_string(),
            ));
        }
        if self.quota.period_days == 0 || self.quota.period_days > 3_650 {
            return Err(ConfigError::Message(
                "quota.period_days must be between 1 and 3650".to_string(),
            ));
        }
        if self.quota.max_attempts == 0 {
            return Err(ConfigError::Message(
                "quota.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.quota.store_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "quota.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.openai.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "openai.endpoint must not be empty".to_string(),
            ));
        }
        if self.purge.ttl_minutes == 0 || self.purge.ttl_minutes > MAX_TTL_MINUTES {
            return Err(ConfigError::Message(format!(
                "purge.ttl_minutes must be between 1 and {}",
                MAX_TTL_MINUTES
            )));
        }
        if self.purge.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Message(format!(
                "purge.timezone is not a valid IANA timezone: {}",
                self.purge.timezone
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(endpoint: &str) -> AppConfig {
    AppConfig {
        host: default_host(),
        port: default_port(),
        database_url: "sqlite::memory:".to_string(),
        static_dir: default_static_dir(),
        admin_api_key: None,
        openai: OpenAiConfig {
            endpoint: endpoint.to_string(),
            api_key: "test-key".to_string(),
            deployment: "gpt-test".to_string(),
            chat_api_version: default_chat_api_version(),
            files_api_version: default_files_api_version(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
        },
        quota: QuotaConfig::default(),
        uploads: UploadConfig::default(),
        purge: PurgeConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = test_config("https://example.openai.azure.com");
        assert!(config.validate().is_ok());
        assert_eq!(config.quota.limit, 600);
        assert_eq!(config.quota.period_days, 30);
        assert_eq!(config.quota.max_attempts, 3);
        assert_eq!(config.purge.name_prefix, "vs-");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = test_config("https://example.openai.azure.com");
        config.quota.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = test_config("https://example.openai.azure.com");
        config.quota.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_purge_ttl_bounds() {
        let mut config = test_config("https://example.openai.azure.com");
        config.purge.ttl_minutes = 0;
        assert!(config.validate().is_err());

        config.purge.ttl_minutes = u64::MAX;
        assert!(config.validate().is_err());

        config.purge.ttl_minutes = MAX_TTL_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let mut config = test_config("https://example.openai.azure.com");
        config.purge.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_deserializes_lowercase() {
        let backend: QuotaBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(backend, QuotaBackend::Memory);
    }
}
