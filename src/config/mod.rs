use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the application config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "pointmesh.yaml";

/// Prefix of environment overrides, e.g. `POINTMESH__RENDER__TARGET_FPS=30`.
pub const ENV_PREFIX: &str = "POINTMESH";

const ENV_SEPARATOR: &str = "__";

/// Loads the [`AppConfig`] handed to both pipelines at construction.
///
/// Values come from, in increasing priority: built-in defaults, `pointmesh.yaml` in the
/// config directory, then `POINTMESH__SECTION__KEY` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a ConfigManager rooted at `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Read environment overrides under a different prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Whether the YAML file exists. Callers that load before logging is set up
    /// check this afterwards to report the fallback to defaults.
    pub fn has_config_file(&self) -> bool {
        self.config_path.is_file()
    }

    /// Load the layered configuration.
    ///
    /// A missing file is not an error: defaults plus environment overrides are used.
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.has_config_file() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::new(self.config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Write `config` as YAML, replacing any existing file.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Write the default config unless a file already exists. Returns whether one was
    /// written.
    pub fn ensure_default_config(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }
        self.save_config(&AppConfig::default())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> ConfigManager {
        let dir = Utf8Path::from_path(temp_dir.path()).unwrap().join("config");
        // unique prefix so ambient POINTMESH__* variables never leak into unit tests
        ConfigManager::new(dir)
            .unwrap()
            .with_env_prefix("POINTMESH_UNIT_TEST_UNSET")
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.config_dir().exists());
        assert_eq!(manager.config_path().file_name(), Some(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = manager(&temp_dir).load_config().unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        let mut config = AppConfig::default();
        config.render.target_fps = 24;
        config.render.settings.show_mesh = true;
        config.logging.debug = true;
        manager.save_config(&config).unwrap();

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.render.target_fps, 24);
        assert!(loaded.render.settings.show_mesh);
        assert!(loaded.logging.debug);
    }

    #[test]
    fn test_has_config_file_tracks_written_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(!manager.has_config_file());
        manager.load_config().unwrap();
        // loading defaults does not create the file
        assert!(!manager.has_config_file());
        manager.ensure_default_config().unwrap();
        assert!(manager.has_config_file());
    }

    #[test]
    fn test_ensure_default_config_only_writes_once() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.ensure_default_config().unwrap());
        assert!(!manager.ensure_default_config().unwrap());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::write(manager.config_path(), "render: [not, a, map]").unwrap();
        assert!(manager.load_config().is_err());
    }
}
