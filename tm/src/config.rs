//! tripmate configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main tripmate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Place search provider
    pub places: PlacesConfig,

    /// Forecast function
    pub weather: WeatherConfig,

    /// Rain alternative proposal tuning
    pub proposal: ProposalConfig,

    /// Parking lookup tuning
    pub parking: ParkingConfig,

    /// Chat orchestration
    pub chat: ChatConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripmate.yml
        let local_config = PathBuf::from(".tripmate.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripmate/tripmate.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripmate").join("tripmate.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Read a secret from the named environment variable
fn read_env_key(var: &str, what: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(eyre::eyre!("{} not found. Set the {} environment variable.", what, var)),
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    pub fn get_api_key(&self) -> Result<String> {
        read_env_key(&self.api_key_env, "LLM API key")
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 256,
            timeout_ms: 30_000,
        }
    }
}

/// Place search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacesConfig {
    /// Environment variable containing the Google Maps API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Maps API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Result language
    pub language: String,

    /// Region bias
    pub region: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl PlacesConfig {
    pub fn get_api_key(&self) -> Result<String> {
        read_env_key(&self.api_key_env, "Places API key")
    }
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: "https://maps.googleapis.com/maps/api".to_string(),
            language: "ko".to_string(),
            region: "kr".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Forecast function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// URL of the forecast function; weather is treated as unavailable when unset
    #[serde(rename = "function-url")]
    pub function_url: Option<String>,

    /// Environment variable holding a bearer token for a private function
    #[serde(rename = "token-env")]
    pub token_env: Option<String>,

    /// Forecast grid X
    pub nx: i32,

    /// Forecast grid Y
    pub ny: i32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            function_url: None,
            token_env: None,
            nx: 92,
            ny: 131,
            timeout_ms: 20_000,
        }
    }
}

/// Rain alternative proposal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Alternatives proposed per exposed stop
    #[serde(rename = "top-n")]
    pub top_n: usize,

    /// Search radius around the exposed stop
    #[serde(rename = "radius-km")]
    pub radius_km: f64,

    /// Drop alternatives farther than this
    #[serde(rename = "max-distance-km")]
    pub max_distance_km: Option<f64>,

    /// Title/description keywords that mark a stop as already indoor
    #[serde(rename = "indoor-keywords")]
    pub indoor_keywords: Vec<String>,

    /// Keywords searched to find indoor-leaning alternatives
    #[serde(rename = "search-keywords")]
    pub search_keywords: Vec<String>,

    /// Never replace the first stop (the trip's starting point)
    #[serde(rename = "protect-first-stop")]
    pub protect_first_stop: bool,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            radius_km: 5.0,
            max_distance_km: None,
            indoor_keywords: [
                "역", "터미널", "정거장", "환승", "공항", "항만", "박물관", "미술관", "과학관", "도서관", "쇼핑몰",
                "아쿠아리움", "전시장", "컨벤션", "센터", "체육관", "공연장", "영화관", "갤러리",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            search_keywords: [
                "박물관", "미술관", "갤러리", "과학관", "전시", "아쿠아리움", "카페", "실내 체험",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            protect_first_stop: true,
        }
    }
}

/// Parking lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingConfig {
    /// Parking lots kept per stop
    #[serde(rename = "top-n")]
    pub top_n: usize,

    /// Search radius around each stop
    #[serde(rename = "radius-km")]
    pub radius_km: f64,

    /// Search keyword
    pub keyword: String,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            radius_km: 1.5,
            keyword: "공영주차장".to_string(),
        }
    }
}

/// Chat orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Upper bound on any single adapter call made during a chat turn
    #[serde(rename = "adapter-timeout-ms")]
    pub adapter_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_ms: 15_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.proposal.top_n, 3);
        assert_eq!(config.proposal.radius_km, 5.0);
        assert!(config.proposal.protect_first_stop);
        assert_eq!(config.parking.top_n, 3);
        assert_eq!(config.weather.nx, 92);
        assert_eq!(config.weather.ny, 131);
        assert!(config.weather.function_url.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  model: claude-haiku
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 128
  timeout-ms: 60000

weather:
  function-url: https://example.com/crawl_weather
  nx: 60
  ny: 127

proposal:
  top-n: 5
  max-distance-km: 3.0
  search-keywords: [museum, cafe]

chat:
  adapter-timeout-ms: 2000

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 128);
        assert_eq!(config.weather.function_url.as_deref(), Some("https://example.com/crawl_weather"));
        assert_eq!(config.weather.nx, 60);
        assert_eq!(config.proposal.top_n, 5);
        assert_eq!(config.proposal.max_distance_km, Some(3.0));
        assert_eq!(config.proposal.search_keywords, vec!["museum", "cafe"]);
        assert_eq!(config.chat.adapter_timeout_ms, 2000);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
parking:
  top-n: 1
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.parking.top_n, 1);

        // Defaults for unspecified
        assert_eq!(config.parking.keyword, "공영주차장");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.proposal.top_n, 3);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proposal:\n  top-n: 2").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.proposal.top_n, 2);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/tripmate.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_api_key_env() {
        let config = LlmConfig {
            api_key_env: "TRIPMATE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = config.get_api_key().unwrap_err();
        assert!(err.to_string().contains("TRIPMATE_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
