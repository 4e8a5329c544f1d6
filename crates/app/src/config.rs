use anyhow::{bail, Context};
use directories::ProjectDirs;
use saim_assistant::ReconnectPolicy;
use saim_categorize::CategorizerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Remote validator; the built-in rule-based one is used when unset.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 3_000,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
        }
    }
}

impl ValidationConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnect_attempts, self.reconnect_base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizationConfig {
    pub exception_threshold: f32,
    pub pattern_window: usize,
}

impl Default for CategorizationConfig {
    fn default() -> Self {
        let defaults = CategorizerSettings::default();
        Self {
            exception_threshold: defaults.exception_threshold,
            pattern_window: defaults.pattern_window,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Remote chart generator; the template is used when unset.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaimConfig {
    /// Where the database lives. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    pub database: String,
    pub user_id: String,
    pub log_filter: String,
    pub validation: ValidationConfig,
    pub categorization: CategorizationConfig,
    pub chart: ChartConfig,
}

impl Default for SaimConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: "saim.db".to_string(),
            user_id: "local".to_string(),
            log_filter: "saim=info".to_string(),
            validation: ValidationConfig::default(),
            categorization: CategorizationConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}

impl SaimConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: SaimConfig = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `explicit` if given, else `config.toml` in the platform config
    /// directory if it exists, else the defaults. A missing explicit file
    /// is an error.
    pub fn load(explicit: Option<&Path>, dirs: Option<&ProjectDirs>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match dirs.map(|d| d.config_dir().join(CONFIG_FILE)) {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.categorization.exception_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("categorization.exception_threshold must be between 0 and 1, got {threshold}");
        }
        if self.categorization.pattern_window == 0 {
            bail!("categorization.pattern_window must be at least 1");
        }
        if self.database.trim().is_empty() {
            bail!("database file name must not be empty");
        }
        if self.user_id.trim().is_empty() {
            bail!("user_id must not be empty");
        }
        Ok(())
    }

    pub fn database_path(&self, dirs: Option<&ProjectDirs>) -> anyhow::Result<PathBuf> {
        let dir = match (&self.data_dir, dirs) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dirs)) => dirs.data_dir().to_path_buf(),
            (None, None) => bail!("No data directory configured and no platform default available"),
        };
        Ok(dir.join(&self.database))
    }

    pub fn categorizer(&self) -> CategorizerSettings {
        CategorizerSettings {
            exception_threshold: self.categorization.exception_threshold,
            pattern_window: self.categorization.pattern_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SaimConfig::from_toml("").unwrap();
        assert_eq!(config, SaimConfig::default());
        assert_eq!(config.validation.timeout(), Duration::from_millis(3_000));
        assert_eq!(config.categorizer().pattern_window, 50);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SaimConfig::from_toml(
            r#"
            user_id = "dana"
            data_dir = "/tmp/saim"

            [validation]
            endpoint = "http://localhost:8000/validate-input"
            timeout_ms = 500

            [categorization]
            exception_threshold = 0.75
            "#,
        )
        .unwrap();
        assert_eq!(config.user_id, "dana");
        assert_eq!(config.validation.max_reconnect_attempts, 5);
        assert_eq!(config.categorization.pattern_window, 50);
        assert_eq!(config.chart.endpoint, None);
        assert_eq!(
            config.database_path(None).unwrap(),
            PathBuf::from("/tmp/saim/saim.db")
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(SaimConfig::from_toml("[categorization]\nexception_threshold = 1.5").is_err());
        assert!(SaimConfig::from_toml("[categorization]\npattern_window = 0").is_err());
        assert!(SaimConfig::from_toml("user_id = \"\"").is_err());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saim.toml");
        std::fs::write(&path, "log_filter = \"saim=debug\"\n").unwrap();
        let config = SaimConfig::load(Some(&path), None).unwrap();
        assert_eq!(config.log_filter, "saim=debug");

        assert!(SaimConfig::load(Some(&dir.path().join("missing.toml")), None).is_err());
        assert_eq!(SaimConfig::load(None, None).unwrap(), SaimConfig::default());
    }
}
