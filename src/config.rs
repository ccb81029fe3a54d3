//! Configuration management for llm-council

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CouncilError;
use crate::llm::BackendId;

const DEFAULT_COUNCIL: [&str; 2] = ["gpt-5", "gpt-5-mini"];
const FALLBACK_CHAIRMAN: &str = "gpt-5";
const FALLBACK_TITLE_MODEL: &str = "gpt-5-mini";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider configurations
    pub providers: HashMap<String, ProviderConfig>,

    /// Provider used for backend ids without a `provider/` prefix
    pub default_provider: String,

    /// Council membership and dispatch settings
    pub council: CouncilConfig,

    /// Conversation storage settings
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,

    /// API key (can be env var reference like $OPENAI_API_KEY)
    pub api_key: String,

    /// Whether this provider is enabled
    pub enabled: bool,

    /// Whether the provider honours a per-request timeout
    #[serde(default = "default_true")]
    pub supports_timeout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Backends queried for every prompt
    pub members: Vec<String>,

    /// Backend that synthesizes the final answer (defaults to the first member)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chairman: Option<String>,

    /// Backend that generates conversation titles (defaults to the first member)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_model: Option<String>,

    /// Per-backend request timeout in seconds
    pub timeout_secs: u64,

    /// How repeated members are handled within one dispatch
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Query every entry; later results replace earlier ones.
    #[default]
    Overwrite,
    /// Query each backend once.
    Deduplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory conversations are written to by the surrounding application
    pub data_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();

        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                api_key: "$OPENAI_API_KEY".to_string(),
                enabled: true,
                supports_timeout: true,
            },
        );

        providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                endpoint: "https://api.anthropic.com/v1".to_string(),
                api_key: "$ANTHROPIC_API_KEY".to_string(),
                enabled: false,
                supports_timeout: true,
            },
        );

        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                endpoint: "http://localhost:11434/v1".to_string(),
                api_key: String::new(),
                enabled: false,
                supports_timeout: true,
            },
        );

        Self {
            providers,
            default_provider: "openai".to_string(),
            council: CouncilConfig {
                members: DEFAULT_COUNCIL.iter().map(|m| m.to_string()).collect(),
                chairman: None,
                title_model: None,
                timeout_secs: 120,
                duplicates: DuplicatePolicy::Overwrite,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("data/conversations"),
            },
        }
    }
}

impl Config {
    /// Load config from file or create default, then apply environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("llm-council")
            .join("config.toml")
    }

    /// Apply `COUNCIL_MODELS`, `CHAIRMAN_MODEL` and `TITLE_MODEL` overrides
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.council.members =
            parse_models_env(lookup("COUNCIL_MODELS").as_deref(), &self.council.members);

        if let Some(chairman) = lookup("CHAIRMAN_MODEL") {
            self.council.chairman = Some(chairman);
        }
        if let Some(title_model) = lookup("TITLE_MODEL") {
            self.council.title_model = Some(title_model);
        }
    }

    /// Reject settings the dispatcher cannot work with
    pub fn validate(&self) -> crate::error::Result<()> {
        let named = self
            .council
            .members
            .iter()
            .chain(self.council.chairman.iter())
            .chain(self.council.title_model.iter());
        for id in named {
            if id.trim().is_empty() {
                return Err(CouncilError::InvalidBackend(id.clone()));
            }
        }

        if self.council.timeout_secs == 0 {
            return Err(CouncilError::Config(
                "council.timeout_secs must be positive".to_string(),
            ));
        }

        if !self.providers.contains_key(&self.default_provider) {
            return Err(CouncilError::Config(format!(
                "default provider {:?} is not configured",
                self.default_provider
            )));
        }

        Ok(())
    }

    pub fn council_members(&self) -> Vec<BackendId> {
        self.council
            .members
            .iter()
            .map(|m| BackendId::new(m.as_str()))
            .collect()
    }

    pub fn chairman(&self) -> BackendId {
        self.council
            .chairman
            .clone()
            .or_else(|| self.council.members.first().cloned())
            .unwrap_or_else(|| FALLBACK_CHAIRMAN.to_string())
            .into()
    }

    pub fn title_model(&self) -> BackendId {
        self.council
            .title_model
            .clone()
            .or_else(|| self.council.members.first().cloned())
            .unwrap_or_else(|| FALLBACK_TITLE_MODEL.to_string())
            .into()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.council.timeout_secs)
    }

    /// Resolve API key from config (handles env var references)
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        self.providers.get(provider).and_then(|p| {
            if let Some(var) = p.api_key.strip_prefix('$') {
                std::env::var(var).ok()
            } else if p.api_key.is_empty() {
                None
            } else {
                Some(p.api_key.clone())
            }
        })
    }
}

/// Parse a model list given as comma-separated names or a JSON array.
/// Unset or blank values keep `default`.
pub fn parse_models_env(value: Option<&str>, default: &[String]) -> Vec<String> {
    let raw = match value.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return default.to_vec(),
    };

    if raw.starts_with('[') {
        if let Ok(models) = serde_json::from_str::<Vec<String>>(raw) {
            return models
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
    }

    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        vec!["a".to_string()]
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.default_provider, "openai");
        assert!(config.providers.contains_key("openai"));
        assert!(config.providers.contains_key("anthropic"));
        assert!(config.providers.contains_key("ollama"));

        // Only OpenAI is enabled by default
        assert!(config.providers.get("openai").unwrap().enabled);
        assert!(!config.providers.get("anthropic").unwrap().enabled);
        assert!(!config.providers.get("ollama").unwrap().enabled);

        assert_eq!(config.council.members, vec!["gpt-5", "gpt-5-mini"]);
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.council.duplicates, DuplicatePolicy::Overwrite);
        assert_eq!(config.storage.data_dir, PathBuf::from("data/conversations"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chairman_and_title_default_to_first_member() {
        let mut config = Config::default();
        config.council.members = vec!["claude".to_string(), "gpt-5".to_string()];

        assert_eq!(config.chairman(), BackendId::new("claude"));
        assert_eq!(config.title_model(), BackendId::new("claude"));
    }

    #[test]
    fn test_chairman_fallback_with_empty_council() {
        let mut config = Config::default();
        config.council.members.clear();

        assert_eq!(config.chairman(), BackendId::new("gpt-5"));
        assert_eq!(config.title_model(), BackendId::new("gpt-5-mini"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "COUNCIL_MODELS" => Some("x, y ,z".to_string()),
            "CHAIRMAN_MODEL" => Some("judge".to_string()),
            _ => None,
        });

        assert_eq!(config.council.members, vec!["x", "y", "z"]);
        assert_eq!(config.chairman(), BackendId::new("judge"));
        assert_eq!(config.title_model(), BackendId::new("x"));
    }

    #[test]
    fn test_parse_models_env_unset_or_blank() {
        assert_eq!(parse_models_env(None, &defaults()), defaults());
        assert_eq!(parse_models_env(Some(""), &defaults()), defaults());
        assert_eq!(parse_models_env(Some("   "), &defaults()), defaults());
    }

    #[test]
    fn test_parse_models_env_comma_list() {
        assert_eq!(
            parse_models_env(Some("gpt-5, ,claude-sonnet,"), &defaults()),
            vec!["gpt-5", "claude-sonnet"]
        );
    }

    #[test]
    fn test_parse_models_env_json_list() {
        assert_eq!(
            parse_models_env(Some(r#"["gpt-5", " ollama/llama3.2 "]"#), &defaults()),
            vec!["gpt-5", "ollama/llama3.2"]
        );
    }

    #[test]
    fn test_validate_rejects_empty_member() {
        let mut config = Config::default();
        config.council.members.push("  ".to_string());

        assert!(matches!(
            config.validate(),
            Err(CouncilError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.council.timeout_secs = 0;

        assert!(matches!(config.validate(), Err(CouncilError::Config(_))));
    }

    #[test]
    fn test_resolve_api_key_empty() {
        let config = Config::default();

        // Ollama has empty API key
        assert!(config.resolve_api_key("ollama").is_none());
    }

    #[test]
    fn test_resolve_api_key_env_var() {
        let mut config = Config::default();

        std::env::set_var("LLM_COUNCIL_TEST_API_KEY", "test_value");
        config.providers.get_mut("ollama").unwrap().api_key =
            "$LLM_COUNCIL_TEST_API_KEY".to_string();

        assert_eq!(
            config.resolve_api_key("ollama"),
            Some("test_value".to_string())
        );

        std::env::remove_var("LLM_COUNCIL_TEST_API_KEY");
    }

    #[test]
    fn test_resolve_api_key_direct() {
        let mut config = Config::default();

        config.providers.get_mut("ollama").unwrap().api_key = "direct_key".to_string();

        assert_eq!(
            config.resolve_api_key("ollama"),
            Some("direct_key".to_string())
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[providers"));
        assert!(toml_str.contains("default_provider"));
        assert!(toml_str.contains("[council]"));
        assert!(toml_str.contains("[storage]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.council.members, config.council.members);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = std::env::temp_dir().join(format!("llm-council-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        let config = Config::load(path.to_str()).unwrap();
        assert!(path.exists());
        assert_eq!(config.council.timeout_secs, 120);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
