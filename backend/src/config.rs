use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub max_upload_mb: u64,
    pub allowed_image_types: Vec<String>,
}

impl StorageConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

/// One configured LLM provider entry. `kind` selects the adapter
/// (`openai`, `gemini`, or any other value, which falls back to the
/// generic OpenAI-compatible chat adapter).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
    pub name: String,
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_provider_kind() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub providers: Vec<LlmProviderConfig>,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub text_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub vision_timeout_secs: u64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub job_timeout_secs: u64,
    pub guardrail_min_bytes: u64,
    pub guardrail_min_width: u32,
    pub guardrail_min_height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration with environment variable override support.
    ///
    /// Loading order:
    /// 1. Load from config.toml file
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_STORAGE_UPLOAD_DIR / APP_STORAGE_MAX_UPLOAD_MB
    /// - APP_LOG_LEVEL
    /// - APP_PIPELINE_JOB_TIMEOUT_SECS (accepts "10m", "600")
    /// - ANALYZER_URL: optional override for an out-of-process analyzer;
    ///   unset means the pipeline runs in-process.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(dir) = std::env::var("APP_STORAGE_UPLOAD_DIR") {
            self.storage.upload_dir = dir;
            tracing::info!("Override storage.upload_dir from env: {}", self.storage.upload_dir);
        }

        if let Ok(mb) = std::env::var("APP_STORAGE_MAX_UPLOAD_MB")
            && let Ok(mb) = mb.parse()
        {
            self.storage.max_upload_mb = mb;
            tracing::info!("Override storage.max_upload_mb from env: {}", mb);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(timeout) = std::env::var("APP_PIPELINE_JOB_TIMEOUT_SECS") {
            match parse_duration_to_secs(&timeout) {
                Ok(val) => {
                    self.pipeline.job_timeout_secs = val;
                    tracing::info!(
                        "Override pipeline.job_timeout_secs from env: {}",
                        self.pipeline.job_timeout_secs
                    );
                }
                Err(e) => tracing::warn!(
                    "Invalid APP_PIPELINE_JOB_TIMEOUT_SECS '{}': {} (keep {})",
                    timeout,
                    e,
                    self.pipeline.job_timeout_secs
                ),
            }
        }

        if let Ok(mb) = std::env::var("MAX_UPLOAD_SIZE_MB")
            && let Ok(mb) = mb.parse()
        {
            self.storage.max_upload_mb = mb;
            tracing::info!("Override storage.max_upload_mb from env MAX_UPLOAD_SIZE_MB: {}", mb);
        }

        if let Ok(types) = std::env::var("ALLOWED_IMAGE_TYPES") {
            self.storage.allowed_image_types =
                types.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            tracing::info!("Override storage.allowed_image_types from env ALLOWED_IMAGE_TYPES");
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.backend = "redis".to_string();
            tracing::info!("REDIS_URL set; cache.backend selected as redis-backed ({})", url.len());
        }

        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.cors.allowed_origins =
                origins.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            tracing::info!("Override cors.allowed_origins from env CORS_ORIGINS");
        }

        if std::env::var("ANALYZER_URL").is_ok() {
            tracing::info!(
                "ANALYZER_URL is set but this build runs the pipeline in-process; ignoring"
            );
        }

        if let Ok(temp) = std::env::var("LLM_TEMPERATURE")
            && let Ok(temp) = temp.parse()
        {
            self.llm.temperature = temp;
            tracing::info!("Override llm.temperature from env LLM_TEMPERATURE: {}", temp);
        }

        if let Ok(model) = std::env::var("PRIMARY_MODEL") {
            if let Some(provider) = self.llm.providers.iter_mut().find(|p| p.name == "primary") {
                provider.model = Some(model.clone());
                tracing::info!("Override primary provider model from env PRIMARY_MODEL: {}", model);
            }
        }

        if let Ok(model) = std::env::var("FALLBACK_MODEL") {
            if let Some(provider) = self.llm.providers.iter_mut().find(|p| p.name == "fallback") {
                provider.model = Some(model.clone());
                tracing::info!("Override fallback provider model from env FALLBACK_MODEL: {}", model);
            }
        }
    }

    /// Validate configuration.
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.storage.max_upload_mb == 0 {
            anyhow::bail!("storage.max_upload_mb must be > 0");
        }

        if self.pipeline.job_timeout_secs == 0 {
            anyhow::bail!("pipeline.job_timeout_secs must be > 0");
        }

        if self.server.worker_count == 0 {
            anyhow::bail!("server.worker_count must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, worker_count: 2 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/threat-modeling.db".to_string() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "data/uploads".to_string(),
            max_upload_mb: 10,
            allowed_image_types: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            text_timeout_secs: 60,
            vision_timeout_secs: 120,
            temperature: 0.2,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { backend: "memory".to_string(), ttl_secs: 3600 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 600,
            guardrail_min_bytes: 256,
            guardrail_min_width: 32,
            guardrail_min_height: 32,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: vec!["*".to_string()] }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,threat_modeling=debug".to_string(),
            file: Some("logs/threat-modeling.log".to_string()),
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        config.validate().expect("defaults must be valid");
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_human_duration_strings() {
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_to_secs("600").unwrap(), 600);
    }
}
