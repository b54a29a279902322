//! Bridge settings, read from `~/.luascript/luascript.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Interpreter-facing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Diagnostics default for units that do not set `debug` themselves.
    #[serde(default)]
    pub debug: bool,
    /// Base for relative `src` and `config` URLs.
    #[serde(default)]
    pub page_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("luascript/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Key-value storage. No `path` means an in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            namespace: default_namespace(),
        }
    }
}

/// Asset files. No `dir` means a temporary directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Where `doc_save` writes. Defaults to the user's download directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl DocumentsConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

impl BridgeConfig {
    /// Loads `~/.luascript/luascript.toml` if it exists.
    pub fn load() -> Self {
        Self::load_from(config_dir().join("luascript.toml"))
    }

    /// Loads from an explicit path. Missing, unreadable or invalid files fall
    /// back to defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".luascript")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert!(!config.runtime.debug);
        assert_eq!(config.network.timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.namespace, "default");
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn parses_partial_file() {
        let config = BridgeConfig::parse(
            r#"
            [runtime]
            debug = true
            page_url = "https://example.com/app/"

            [storage]
            path = "/tmp/ls.db"
            "#,
        )
        .unwrap();
        assert!(config.runtime.debug);
        assert_eq!(
            config.runtime.page_url.as_deref(),
            Some("https://example.com/app/")
        );
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/ls.db")));
        assert_eq!(config.storage.namespace, "default");
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_from(dir.path().join("nope.toml"));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("luascript.toml");
        std::fs::write(&path, "[runtime\ndebug = ").unwrap();
        assert_eq!(BridgeConfig::load_from(&path), BridgeConfig::default());
    }

    #[test]
    fn explicit_documents_dir_wins() {
        let config = DocumentsConfig {
            dir: Some(PathBuf::from("/srv/out")),
        };
        assert_eq!(config.output_dir(), PathBuf::from("/srv/out"));
    }
}
