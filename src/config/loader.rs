//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::types::MonitorConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader with the default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(".claude-watch.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("claude-watch").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a loader for one explicit file.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load the first config file found, or defaults when there is none.
    ///
    /// Environment overrides are applied in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<MonitorConfig, ConfigError> {
        let config = match self.find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                MonitorConfig::default()
            }
        };
        Ok(config.with_env_overrides())
    }

    fn load_from_path(path: &Path) -> Result<MonitorConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_paths() {
        let loader = ConfigLoader::new();
        assert!(loader.search_paths()[0].ends_with(".claude-watch.toml"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let loader = ConfigLoader::with_path(PathBuf::from("/nonexistent/claude-watch.toml"));
        let config = loader.load().unwrap();
        assert_eq!(config.max_buffered_events, 10_000);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "cleanup_dead_sessions = false\nmax_buffered_events = 50\n",
        )
        .unwrap();

        let config = ConfigLoader::with_path(path).load().unwrap();
        assert!(!config.cleanup_dead_sessions);
        assert_eq!(config.max_buffered_events, 50);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "telemetry = \"maybe\"").unwrap();

        let err = ConfigLoader::with_path(path.clone()).load().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
