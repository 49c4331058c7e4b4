/// CLI configuration
use crate::error::{CliError, Result};
use cadence_playback::PlaybackConfig;
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationSettings {
    /// Media milliseconds per wall-clock millisecond
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
        }
    }
}

fn default_speed() -> f64 {
    1.0
}

impl CliConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; otherwise `cadence.toml` is read if
    /// present. `CADENCE_*` variables override the file, with `__` between
    /// nested keys (`CADENCE_PLAYBACK__POLL_INTERVAL_MS=250`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) if !path.exists() => {
                return Err(CliError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if config_path.exists() {
                    settings = settings.add_source(config::File::from(config_path));
                }
            }
        }

        Self::from_builder(settings)
    }

    fn from_builder(settings: ConfigBuilder<DefaultState>) -> Result<Self> {
        // Override with environment variables (prefixed with CADENCE_)
        let settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.playback
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        if !self.simulation.speed.is_finite() || self.simulation.speed <= 0.0 {
            return Err(CliError::Config(
                "simulation.speed must be a positive number".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_playback::RepeatMode;
    use config::{File, FileFormat};
    use std::io::Write;

    fn from_toml(text: &str) -> Result<CliConfig> {
        CliConfig::from_builder(
            config::Config::builder().add_source(File::from_str(text, FileFormat::Toml)),
        )
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.playback, PlaybackConfig::default());
        assert_eq!(config.simulation.speed, 1.0);
        config.validate().unwrap();
    }

    #[test]
    fn file_overrides_playback_settings() {
        let config = from_toml(
            r#"
            [playback]
            poll_interval_ms = 250
            repeat = "all"
            shuffle = true
            shuffle_seed = 42

            [simulation]
            speed = 8.0
            "#,
        )
        .unwrap();

        assert_eq!(config.playback.poll_interval_ms, 250);
        assert_eq!(config.playback.repeat, RepeatMode::All);
        assert!(config.playback.shuffle);
        assert_eq!(config.playback.shuffle_seed, Some(42));
        // Unset keys keep their defaults
        assert_eq!(config.playback.failure_retry_delay_ms, 1000);
        assert_eq!(config.simulation.speed, 8.0);
    }

    #[test]
    fn unknown_repeat_mode_is_rejected() {
        assert!(from_toml("[playback]\nrepeat = \"forever\"").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = CliConfig::default();
        config.simulation.speed = 0.0;
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        let mut config = CliConfig::default();
        config.playback.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[playback]\nfailure_retry_delay_ms = 50").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.playback.failure_retry_delay_ms, 50);
    }

    #[test]
    fn load_rejects_missing_explicit_file() {
        let result = CliConfig::load(Some(Path::new("/nonexistent/cadence.toml")));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
