use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::fs;

/// File name of the configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "quickprompt.yaml";

/// Prefix of environment variables overriding the file, e.g.
/// `QUICKPROMPT_SESSION__TITLE` or `QUICKPROMPT_LOGGING__DEBUG_MODE`
pub const ENV_PREFIX: &str = "QUICKPROMPT";

/// Configuration manager for loading and saving `quickprompt.yaml`.
///
/// Loading layers, from lowest to highest priority:
/// - Built-in defaults
/// - The YAML file (optional)
/// - `QUICKPROMPT_*` environment variables, with `__` separating nested keys
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the configuration file (e.g., "QuickPrompt Data")
    ///
    /// # Returns
    /// A new ConfigManager instance; the directory is created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration from the file and the process environment.
    ///
    /// # Returns
    /// The merged AppConfig; defaults fill anything not set
    pub fn load(&self) -> Result<AppConfig> {
        self.load_with_env(None)
    }

    /// Load with `env` standing in for the process environment.
    ///
    /// `None` reads the real environment.
    pub fn load_with_env(&self, env: Option<HashMap<String, String>>) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The AppConfig to save
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmitPolicy;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.config_path().ends_with(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let loaded = manager.load_with_env(Some(HashMap::new())).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_load_save_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = AppConfig::default();
        config.session.title = "Reaction test".to_string();
        config.session.submit_policy = SubmitPolicy::LastWins;
        manager.save(&config).unwrap();

        let loaded = manager.load_with_env(Some(HashMap::new())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_environment_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager.save(&AppConfig::default()).unwrap();

        let env = HashMap::from([
            ("QUICKPROMPT_SESSION__MIN_WIDTH".to_string(), "1024".to_string()),
            ("QUICKPROMPT_LOGGING__DEBUG_MODE".to_string(), "true".to_string()),
        ]);
        let loaded = manager.load_with_env(Some(env)).unwrap();

        assert_eq!(loaded.session.min_width, 1024);
        assert_eq!(loaded.session.min_height, 400);
        assert!(loaded.logging.debug_mode);
    }
}
