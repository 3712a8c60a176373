//! Layered configuration for gvr.
//!
//! Sources, lowest precedence first: compiled defaults, an optional TOML file,
//! then `GVR__`-prefixed environment variables (`GVR__SCORING__GRAPH=0.5`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gvr_index::{ChunkingPolicy, EngineConfig, IndexOptions, ScoringWeights, DEFAULT_DIMENSIONS};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "gvr.toml";

/// Environment prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "GVR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GvrConfig {
    pub scoring: ScoringWeights,
    pub chunking: ChunkingPolicy,
    pub embeddings: EmbeddingsConfig,
    pub query: QueryConfig,
    pub index: IndexOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsProvider {
    /// Deterministic hash-seeded vectors, no network
    #[default]
    Mock,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingsProvider,
    pub dimensions: usize,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// May reference environment variables, e.g. `${OPENAI_API_KEY}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingsProvider::Mock,
            dimensions: DEFAULT_DIMENSIONS,
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub timeout_ms: u64,
    pub max_connected_files: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_connected_files: 5,
        }
    }
}

/// Values that parse but cannot drive the engine.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scoring.{name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f32 },

    #[error("embeddings.dimensions must be greater than zero")]
    ZeroDimensions,

    #[error("chunking.chunk_overlap ({overlap}) must be smaller than chunking.max_chunk_size ({max})")]
    OverlapTooLarge { overlap: usize, max: usize },

    #[error("chunking.min_chunk_size ({min}) exceeds chunking.max_chunk_size ({max})")]
    MinAboveMax { min: usize, max: usize },

    #[error("query.timeout_ms must be greater than zero")]
    ZeroTimeout,
}

impl GvrConfig {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist. Without one, `./gvr.toml`
    /// is tried first, then `~/.config/gvr/config.toml`; a missing file falls
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).context("Failed to encode default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        let file = match path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if !expanded.is_file() {
                    anyhow::bail!("Config file not found: {}", expanded.display());
                }
                Some(expanded)
            }
            None => Self::discover(),
        };
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml));
        }

        let mut config: Self = builder
            .add_source(env.separator("__").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.embeddings.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    /// First existing default config location.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        dirs::home_dir()
            .map(|home| home.join(".config").join("gvr").join("config.toml"))
            .filter(|p| p.is_file())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [
            ("semantic", self.scoring.semantic),
            ("graph", self.scoring.graph),
            ("focus", self.scoring.focus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if self.embeddings.dimensions == 0 {
            return Err(ConfigError::ZeroDimensions);
        }
        let chunking = &self.chunking;
        if chunking.chunk_overlap >= chunking.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: chunking.chunk_overlap,
                max: chunking.max_chunk_size,
            });
        }
        if chunking.min_chunk_size > chunking.max_chunk_size {
            return Err(ConfigError::MinAboveMax {
                min: chunking.min_chunk_size,
                max: chunking.max_chunk_size,
            });
        }
        if self.query.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            weights: self.scoring,
            timeout: Duration::from_millis(self.query.timeout_ms),
            max_connected_files: self.query.max_connected_files,
            ..EngineConfig::default()
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

impl EmbeddingsConfig {
    /// Expand `$VAR` / `${VAR}` references in the endpoint settings.
    fn expand_env(&mut self) -> Result<()> {
        for (name, value) in [("api_key", &mut self.api_key), ("base_url", &mut self.base_url)] {
            if let Some(raw) = value.as_deref() {
                let expanded = shellexpand::env(raw)
                    .with_context(|| format!("embeddings.{} references an unset variable", name))?;
                *value = Some(expanded.into_owned());
            }
        }
        Ok(())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand config path {}", raw))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("gvr.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GvrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring, ScoringWeights::default());
        assert_eq!(config.embeddings.dimensions, 384);
        assert_eq!(config.embeddings.provider, EmbeddingsProvider::Mock);
        assert_eq!(config.query.timeout_ms, 5000);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[scoring]
graph = 0.5

[chunking]
max_chunk_size = 256

[embeddings]
provider = "http"
dimensions = 1536
"#,
        );

        let config = GvrConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.scoring.graph, 0.5);
        assert_eq!(config.scoring.semantic, 0.6);
        assert_eq!(config.chunking.max_chunk_size, 256);
        assert_eq!(config.chunking.chunk_overlap, 64);
        assert_eq!(config.embeddings.provider, EmbeddingsProvider::Http);
        assert_eq!(config.embeddings.dimensions, 1536);
        assert_eq!(config.index, IndexOptions::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[query]\ntimeout_ms = 100\n");

        let config = GvrConfig::load_with_env(
            Some(&path),
            env(&[("GVR__QUERY__TIMEOUT_MS", "250"), ("GVR__SCORING__FOCUS", "0.4")]),
        )
        .unwrap();
        assert_eq!(config.query.timeout_ms, 250);
        assert_eq!(config.scoring.focus, 0.4);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = GvrConfig::load_with_env(Some(&missing), env(&[])).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[scoring]\ngraph = -1.0\n");
        let err = GvrConfig::load_with_env(Some(&path), env(&[])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidWeight {
                name: "graph",
                value: -1.0
            })
        );
    }

    #[test]
    fn test_validate_chunking_and_dimensions() {
        let mut config = GvrConfig::default();
        config.chunking.chunk_overlap = config.chunking.max_chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverlapTooLarge { .. })
        ));

        let mut config = GvrConfig::default();
        config.chunking.min_chunk_size = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::MinAboveMax { .. })));

        let mut config = GvrConfig::default();
        config.embeddings.dimensions = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDimensions));

        let mut config = GvrConfig::default();
        config.scoring.semantic = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeight { name: "semantic", .. })
        ));
    }

    #[test]
    fn test_api_key_env_expansion() {
        std::env::set_var("GVR_TEST_EMBEDDINGS_KEY", "sk-test");
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[embeddings]\nprovider = \"http\"\napi_key = \"${GVR_TEST_EMBEDDINGS_KEY}\"\n",
        );

        let config = GvrConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.embeddings.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_unset_api_key_variable_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[embeddings]\napi_key = \"${GVR_TEST_DEFINITELY_UNSET_VAR}\"\n",
        );
        assert!(GvrConfig::load_with_env(Some(&path), env(&[])).is_err());
    }

    #[test]
    fn test_engine_config_from_settings() {
        let mut config = GvrConfig::default();
        config.query.timeout_ms = 1200;
        config.query.max_connected_files = 3;
        config.scoring.graph = 0.9;

        let engine = config.engine_config();
        assert_eq!(engine.timeout, Duration::from_millis(1200));
        assert_eq!(engine.max_connected_files, 3);
        assert_eq!(engine.weights.graph, 0.9);
        assert_eq!(engine.over_fetch, EngineConfig::default().over_fetch);
    }

    #[test]
    fn test_to_toml_reloads() {
        let mut config = GvrConfig::default();
        config.scoring.graph = 0.25;
        config.embeddings.base_url = Some("http://localhost:8080/v1".to_string());

        let text = config.to_toml().unwrap();
        assert!(text.contains("[scoring]"));

        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &text);
        let reloaded = GvrConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_serializes_to_json() {
        let value = serde_json::to_value(GvrConfig::default()).unwrap();
        assert_eq!(value["embeddings"]["provider"], "mock");
        assert_eq!(value["query"]["max_connected_files"], 5);
    }
}
