//! Configuration loaded from a TOML file and `AEGIS__`-prefixed environment,
//! plus plain-env credential helpers for the backends and knowledge vendors.

use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_privacy_mode() -> String {
    "local".to_string()
}

/// Global application configuration (gateway + core wiring).
///
/// Precedence: env `AEGIS_CONFIG` path > `config/gateway.toml` > defaults,
/// then `AEGIS__`-prefixed environment variables on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity, shown in status output.
    pub app_name: String,
    /// HTTP listener host.
    pub host: String,
    /// HTTP listener port.
    pub port: u16,
    /// Directory for the SQLite database (memory + knowledge + thunks).
    pub storage_path: String,
    /// Local model runtime base URL (OpenAI-free, privacy-first default).
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    /// Starting privacy mode: "local" (default), "hybrid", or "cloud".
    #[serde(default = "default_privacy_mode")]
    pub privacy_mode: String,
    /// Auto-approve cloud requests (pre-consented non-interactive contexts
    /// such as an MCP adapter). Default false.
    #[serde(default)]
    pub auto_confirm_cloud: bool,
    /// Enable the knowledge pre-lookup pipeline. Default true.
    #[serde(default = "default_true")]
    pub auto_lookup: bool,
}

fn default_true() -> bool {
    true
}

impl CoreConfig {
    /// Load config from file and environment. `HOST`/`PORT` plain env vars
    /// override the listener address for container deployments.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("AEGIS_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Aegis Gateway")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000_i64)?
            .set_default("storage_path", "./data")?
            .set_default("local_base_url", default_local_base_url())?
            .set_default("privacy_mode", "local")?
            .set_default("auto_confirm_cloud", false)?
            .set_default("auto_lookup", true)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("AEGIS").separator("__"))
            .build()?;

        let mut cfg: Self = built.try_deserialize()?;
        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                cfg.host = host;
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            cfg.port = port;
        }
        Ok(cfg)
    }

    /// Path of the single SQLite file under `storage_path`.
    pub fn db_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage_path).join("aegis_memory.db")
    }
}

/// Reads a non-empty environment variable.
pub(crate) fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Credentials for cloud model backends and knowledge vendors. All optional;
/// a missing key simply leaves that backend or provider unavailable.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub newsapi_key: Option<String>,
    pub polygon_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub open_weather_key: Option<String>,
    pub nvd_api_key: Option<String>,
    pub github_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: env_opt_string("ANTHROPIC_API_KEY"),
            openai_api_key: env_opt_string("OPENAI_API_KEY"),
            groq_api_key: env_opt_string("GROQ_API_KEY"),
            google_api_key: env_opt_string("GOOGLE_API_KEY"),
            newsapi_key: env_opt_string("NEWSAPI_KEY"),
            polygon_api_key: env_opt_string("POLYGON_API_KEY"),
            alpha_vantage_api_key: env_opt_string("ALPHA_VANTAGE_API_KEY"),
            open_weather_key: env_opt_string("OPEN_WEATHER_KEY")
                .or_else(|| env_opt_string("OPENWEATHERMAP_API_KEY")),
            nvd_api_key: env_opt_string("NVD_API_KEY"),
            github_token: env_opt_string("GITHUB_TOKEN"),
        }
    }

    /// True when at least one cloud backend credential is present.
    pub fn has_any_cloud_key(&self) -> bool {
        self.anthropic_api_key.is_some()
            || self.openai_api_key.is_some()
            || self.groq_api_key.is_some()
            || self.google_api_key.is_some()
    }
}
