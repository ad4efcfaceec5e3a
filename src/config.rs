use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, ensure};
use chrono::NaiveTime;
use chrono_tz::Tz;
use log::LevelFilter;
use serde::Deserialize;
use serde_yaml::Deserializer;
use url::Url;

const APP_NAME: &str = "surfsnatch";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    pub photos_dir: PathBuf,
    pub timezone: Tz,
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,
    pub feed: FeedConfig,
    #[serde(default)]
    pub forecast: Option<ForecastConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: Url,
    #[serde(deserialize_with = "hh_mm")]
    pub publish_time: NaiveTime,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    pub api_url: Url,
    pub api_key: String,
    #[serde(default)]
    pub spot_ids: Vec<i64>,
    #[serde(deserialize_with = "hh_mm")]
    pub publish_time: NaiveTime,
    pub poll_interval_seconds: u64,
}

pub struct EnsureOutcome {
    pub path: PathBuf,
    pub created: bool,
}

const TEMPLATE: &str = r#"# surfsnatch config (YAML)
# All keys are required unless marked optional.

db_path: "/path/to/surfsnatch.sqlite3"
photos_dir: "/path/to/public/photos"

# IANA zone the publisher lives in. Report dates and publish times use it.
timezone: "Australia/Sydney"

# Optional: error, warn, info, debug, trace (default info)
log_level: "info"

feed:
  url: "http://rastasurfboards.com.au/?feed=rss2"
  # Local time the daily report usually goes up
  publish_time: "08:30"
  # How long to wait between polls once the report is due but hasn't shown up
  poll_interval_seconds: 300

# Optional: omit to disable forecasts
forecast:
  api_url: "https://magicseaweed.com/api"
  api_key: "<your forecast API key>"
  spot_ids:
    - 169
  publish_time: "06:00"
  poll_interval_seconds: 900
"#;

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn hh_mm<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| serde::de::Error::custom(format!("expected HH:MM, got {raw:?}: {e}")))
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl ForecastConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Config {
    pub fn ensure_user_config() -> Result<EnsureOutcome> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME);

        if let Some(path) = xdg_dirs.find_config_file(CONFIG_FILE) {
            return Ok(EnsureOutcome {
                path,
                created: false,
            });
        }

        let config_path = xdg_dirs
            .place_config_file(CONFIG_FILE)
            .context("Cannot create configuration directory")?;
        let mut config_file = File::create(&config_path)?;
        config_file.write_all(TEMPLATE.as_bytes())?;

        Ok(EnsureOutcome {
            path: config_path,
            created: true,
        })
    }

    pub fn get_user_config() -> Result<Config> {
        let path = xdg::BaseDirectories::with_prefix(APP_NAME)
            .find_config_file(CONFIG_FILE)
            .ok_or_else(|| anyhow!("Could not find {} in the XDG config dirs", CONFIG_FILE))?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Config> {
        let deserializer = Deserializer::from_str(raw);
        let config: Config = serde_path_to_error::deserialize(deserializer)
            .map_err(|e| anyhow!("at `{}`: {}", e.path(), e.inner()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.feed.poll_interval_seconds > 0,
            "feed.poll_interval_seconds must be greater than zero"
        );
        if let Some(forecast) = &self.forecast {
            ensure!(
                forecast.poll_interval_seconds > 0,
                "forecast.poll_interval_seconds must be greater than zero"
            );
            ensure!(!forecast.api_key.trim().is_empty(), "forecast.api_key is empty");
        }
        Ok(())
    }
}
