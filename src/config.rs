use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{Error, Result, MAX_RETRY, MAX_WAIT, TA_WEBPAGE};

pub const DEFAULT_CONFIG_FILE: &str = "scraper.toml";
const ENV_PREFIX: &str = "TA_SCRAPER";

/// Run settings, loaded once at startup.
///
/// Sources in increasing priority: built-in defaults, an optional TOML file and
/// `TA_SCRAPER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub review_file: String,
    pub place_file: String,
    pub url_file: String,
    pub log_file: String,
    pub base_url: String,
    pub max_wait_secs: u64,
    /// Not wired into any retry loop yet.
    pub max_retry: u32,
    pub settle_millis: u64,
    pub headless: bool,
    pub accept_language: String,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = Config::builder()
            .set_default("output_dir", "data")?
            .set_default("review_file", "reviews.csv")?
            .set_default("place_file", "places.csv")?
            .set_default("url_file", "urls.txt")?
            .set_default("log_file", "ta-scraper.log")?
            .set_default("base_url", TA_WEBPAGE)?
            .set_default("max_wait_secs", MAX_WAIT as i64)?
            .set_default("max_retry", i64::from(MAX_RETRY))?
            .set_default("settle_millis", 2000_i64)?
            .set_default("headless", true)?
            .set_default("accept_language", "en_GB")?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("review_file", &self.review_file),
            ("place_file", &self.place_file),
            ("url_file", &self.url_file),
            ("log_file", &self.log_file),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidSetting {
                    key,
                    reason: "file name must not be empty".into(),
                });
            }
        }
        if self.max_wait_secs == 0 {
            return Err(Error::InvalidSetting {
                key: "max_wait_secs",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn review_path(&self) -> PathBuf {
        self.output_dir.join(&self.review_file)
    }

    pub fn place_path(&self) -> PathBuf {
        self.output_dir.join(&self.place_file)
    }

    pub fn url_path(&self) -> PathBuf {
        self.output_dir.join(&self.url_file)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        // An explicit path is required to exist.
        assert!(Settings::load(Some(missing.as_path())).is_err());

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "# empty").unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.max_wait(), Duration::from_secs(MAX_WAIT));
        assert_eq!(settings.max_retry, MAX_RETRY);
        assert_eq!(settings.review_path(), PathBuf::from("data/reviews.csv"));
        assert_eq!(settings.base_url, TA_WEBPAGE);
        assert!(settings.headless);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "output_dir = \"out\"\nplace_file = \"rome.csv\"\nsettle_millis = 0"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.place_path(), PathBuf::from("out/rome.csv"));
        assert_eq!(settings.settle(), Duration::ZERO);
        assert_eq!(settings.url_file, "urls.txt");
    }

    #[test]
    fn zero_wait_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_wait_secs = 0").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSetting {
                key: "max_wait_secs",
                ..
            }
        ));
    }
}
