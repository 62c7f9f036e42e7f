use anyhow::{bail, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Adjustments made while loading, logged once the logger is up
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    /// Empty means "read OPENAI_API_KEY"
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// None = no cap on generated tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub ttl_minutes: u64,
    /// 0 disables the background sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 60,
            sweep_interval_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,chat_dag_server=debug".to_string(),
            format: "pretty".to_string(),
            directory: "logs".to_string(),
        }
    }
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.finalize(std::env::var("OPENAI_API_KEY").ok())
    }

    /// Build settings from an in-memory TOML document (no env layering)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.finalize(None)
    }

    fn finalize(mut self, env_api_key: Option<String>) -> Result<Self> {
        if self.llm.api_key.trim().is_empty() {
            match env_api_key.filter(|k| !k.trim().is_empty()) {
                Some(key) => self.llm.api_key = key,
                None => bail!(
                    "LLM API key not found: set llm.api_key in config/settings.toml or OPENAI_API_KEY"
                ),
            }
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            self.warnings.push(format!(
                "llm.temperature {} outside [0, 1], falling back to {}",
                self.llm.temperature, DEFAULT_TEMPERATURE
            ));
            self.llm.temperature = DEFAULT_TEMPERATURE;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [database]
        url = "postgres://localhost/chat"
        pool_max_size = 5
        pool_timeout_seconds = 10

        [llm]
        base_url = "https://api.openai.com"
        api_key = "sk-test"
        model = "gpt-3.5-turbo"
        timeout_seconds = 30
    "#;

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_toml_str(BASE).unwrap();
        assert_eq!(settings.cache.ttl_minutes, 60);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(settings.llm.temperature, 0.7);
        assert!(settings.llm.max_tokens.is_none());
        assert_eq!(settings.logging.format, "pretty");
        assert!(settings.warnings.is_empty());
    }

    #[test]
    fn test_out_of_range_temperature_falls_back() {
        let toml = BASE.replace("timeout_seconds = 30", "timeout_seconds = 30\ntemperature = 1.5");
        let settings = Settings::from_toml_str(&toml).unwrap();
        assert_eq!(settings.llm.temperature, 0.7);
        assert_eq!(
            settings.warnings,
            vec!["llm.temperature 1.5 outside [0, 1], falling back to 0.7".to_string()]
        );
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let toml = BASE.replace("api_key = \"sk-test\"", "");
        assert!(Settings::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_api_key_from_environment_fallback() {
        let toml = BASE.replace("api_key = \"sk-test\"", "api_key = \"\"");
        let config = Config::builder()
            .add_source(File::from_str(&toml, FileFormat::Toml))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        let settings = settings.finalize(Some("sk-env".to_string())).unwrap();
        assert_eq!(settings.llm.api_key, "sk-env");
    }
}
