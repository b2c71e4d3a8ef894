use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::cleanup::CleanupConfig;
use crate::error::{PulseError, Result};
use crate::media::MediaConfig;
use crate::scoring::{FeedConfig, FeedPipeline};
use crate::user::ActivityConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/pulse.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub activity: ActivityConfig,
    pub feed: FeedConfig,
    pub media: MediaConfig,
    pub cleanup: CleanupConfig,
    pub store: StoreConfig,
}

impl PulseConfig {
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = path.or_else(default_config_path);
        let mut config = match config_path.as_ref() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| PulseError::Config(format!("failed to read config: {}", err)))?;
                toml::from_str(&contents)
                    .map_err(|err| PulseError::Config(format!("failed to parse config: {}", err)))?
            }
            _ => PulseConfig::default(),
        };

        config.apply_env_overrides();
        Ok((config, config_path))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    PulseError::Config(format!("failed to create config dir: {}", err))
                })?;
            }
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| PulseError::Config(format!("failed to serialize config: {}", err)))?;
        std::fs::write(path, payload)
            .map_err(|err| PulseError::Config(format!("failed to write config: {}", err)))?;
        Ok(())
    }

    pub fn pipeline(&self) -> FeedPipeline {
        FeedPipeline::from_config(&self.feed)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_var("PULSE_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(cloud_name) = non_empty_var("PULSE_CLOUD_NAME") {
            self.media.cloud_name = cloud_name;
        }
        if let Some(preset) = non_empty_var("PULSE_UPLOAD_PRESET") {
            self.media.upload_preset = preset;
        }
        if let Some(api_base) = non_empty_var("PULSE_MEDIA_API_BASE") {
            self.media.api_base = api_base;
        }
        if let Some(hours) = non_empty_var("PULSE_MEDIA_RETENTION_HOURS") {
            if let Ok(value) = hours.parse::<u64>() {
                self.media.retention_hours = Some(value);
            }
        }
        if let Some(minutes) = non_empty_var("PULSE_CLEANUP_INTERVAL_MINUTES") {
            if let Ok(value) = minutes.parse::<u64>() {
                self.cleanup.interval_minutes = value;
            }
        }
        if let Some(offset) = non_empty_var("PULSE_DAY_OFFSET_MINUTES") {
            if let Ok(value) = offset.parse::<i32>() {
                self.activity.day_offset_minutes = value;
            }
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn default_config_path() -> Option<PathBuf> {
    non_empty_var("PULSE_CONFIG_PATH")
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/pulse.toml")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PulseConfig = toml::from_str(
            r#"
            [activity]
            daily_bonus = 25

            [feed.boosts]
            pulse_legend = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.activity.daily_bonus, 25);
        assert_eq!(config.activity.signup_bonus, 20);
        assert_eq!(config.activity.decay_after_days, 14);
        assert_eq!(config.feed.boosts.pulse_legend, 50);
        assert_eq!(config.feed.boosts.influencer, 10);
        assert_eq!(config.feed.weights.like, 2);
        assert_eq!(config.cleanup.interval_minutes, 10);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/pulse.toml");
        let mut config = PulseConfig::default();
        config.media.retention_hours = Some(72);
        config.activity.day_offset_minutes = -300;
        config.write(&path).unwrap();

        let (loaded, loaded_path) = PulseConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded_path, Some(path));
        assert_eq!(loaded.activity.day_offset_minutes, -300);
        assert_eq!(loaded.feed.weights.comment, 1);
    }
}
