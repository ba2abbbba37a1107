use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a setting came from, shown by `config show`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A setting paired with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Credentials for the document server. Sync is off until all three are set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Document service URL (e.g., "https://sync.example.com")
    pub server_url: Option<String>,
    /// API key for authentication, never printed
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Account whose document is synced
    pub user_id: Option<String>,
    /// Push after every change and pull before every command (default: false)
    #[serde(default)]
    pub auto_sync: bool,
}

impl SyncConfig {
    /// True once a document can be fetched and written for `user_id`.
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some() && self.user_id.is_some()
    }
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local store
    pub data_dir: ConfigValue<PathBuf>,
    /// The YAML file that was read, when one existed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

/// On-disk shape of `config.yaml`; every key is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Reads `config_path` (or the default path) and applies `POMOQUEST_*`
    /// overrides on top.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Relative to the file, not the working directory.
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        if let Some(dir) = env("POMOQUEST_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(url) = env("POMOQUEST_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Some(key) = env("POMOQUEST_API_KEY") {
            sync.api_key = Some(key);
        }
        if let Some(user_id) = env("POMOQUEST_USER_ID") {
            sync.user_id = Some(user_id);
        }

        Ok(Self {
            data_dir,
            config_file,
            sync,
        })
    }

    /// `pomoquest` under the platform config dir.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pomoquest")
    }

    /// Where the aggregate, the unsynced-write slot and the legacy keys
    /// live unless `data_dir` says otherwise.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pomoquest")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert!(config.data_dir.value.ends_with("pomoquest"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(!config.sync.is_configured());
        assert!(!config.sync.auto_sync);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /custom/data").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  server_url: https://sync.example.com").unwrap();
        writeln!(file, "  api_key: secret").unwrap();
        writeln!(file, "  user_id: ada").unwrap();
        writeln!(file, "  auto_sync: true").unwrap();

        let config = Config::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/data"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
        assert!(config.sync.is_configured());
        assert!(config.sync.auto_sync);
    }

    #[test]
    fn test_relative_data_dir_resolved_against_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "data_dir: data\n").unwrap();

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("data"));
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "data_dir: /from/file\nsync:\n  server_url: https://file.example.com\n",
        )
        .unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("POMOQUEST_DATA_DIR", "/from/env"),
            ("POMOQUEST_SYNC_URL", "https://env.example.com"),
            ("POMOQUEST_API_KEY", "key"),
            ("POMOQUEST_USER_ID", "ada"),
        ]);
        let config = Config::load_with_env(Some(config_path), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.data_dir.value, PathBuf::from("/from/env"));
        assert_eq!(config.data_dir.source, ConfigSource::Environment);
        assert_eq!(
            config.sync.server_url.as_deref(),
            Some("https://env.example.com")
        );
        assert!(config.sync.is_configured());
    }

    #[test]
    fn test_partial_sync_credentials_not_configured() {
        let sync = SyncConfig {
            server_url: Some("https://sync.example.com".to_string()),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(!sync.is_configured());
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load_with_env(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = Config {
            data_dir: ConfigValue::new(PathBuf::from("/data"), ConfigSource::Default),
            config_file: None,
            sync: SyncConfig {
                api_key: Some("secret".to_string()),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"source\":\"default\""));
    }
}
