use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::poller::PollConfig;

const ENV_CONFIG_DIR: &str = "VALWATCH_CONFIG_DIR";
/// Upper bound on attempts per request.
const MAX_RETRY_ATTEMPTS: u8 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub articles: ArticleSettings,
    pub threads: ThreadSettings,
    pub poll: PollSettings,
    pub storage: StorageSettings,
}

/// Where the news listing lives and the markers used to pick the patch notes out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleSettings {
    pub page_url: String,
    pub site_origin: String,
    /// Substring of the anchor's `aria-label`.
    pub label_marker: String,
    pub title_marker: String,
    pub media_marker: String,
    pub date_marker: String,
    /// Characters between the start of the JSON object and the title marker.
    pub blob_lead: usize,
    /// Characters from the start of the date marker to the end of the JSON object.
    pub blob_tail: usize,
    pub check_hours: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    pub api_base: String,
    pub subreddit: String,
    pub query: String,
    pub batch_limit: usize,
    pub comment_limit: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub check_hours: Vec<u32>,
    pub layout: ThreadLayout,
}

/// Line positions of a post-match thread body.
///
/// Everything the parser assumes about where a field sits is listed here, so a
/// change in the post template is an edit to this table rather than to the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadLayout {
    pub delimiter: String,
    pub score_line: usize,
    pub score_width: usize,
    pub link_line: usize,
    pub maps_start: usize,
    pub bold_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub tick_minutes: u64,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub article_store: String,
    pub thread_store: String,
}

impl Default for ArticleSettings {
    fn default() -> Self {
        Self {
            page_url: "https://playvalorant.com/en-us/news/".into(),
            site_origin: "https://playvalorant.com".into(),
            label_marker: "Patch Notes".into(),
            title_marker: "VALORANT Patch Notes".into(),
            media_marker: r#""media":{"#.into(),
            date_marker: "publishDate".into(),
            blob_lead: 10,
            blob_tail: 41,
            check_hours: vec![11, 16],
        }
    }
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            api_base: "https://www.reddit.com".into(),
            subreddit: "ValorantCompetitive".into(),
            query: r#"flair:"Post-Match Thread""#.into(),
            batch_limit: 10,
            comment_limit: 3,
            include: vec!["Americas".into(), "Masters".into(), "Champions".into()],
            exclude: vec!["EMEA".into(), "Pacific".into(), "China".into()],
            check_hours: vec![0, 8, 12, 16, 20, 23],
            layout: ThreadLayout::default(),
        }
    }
}

impl Default for ThreadLayout {
    fn default() -> Self {
        Self {
            delimiter: "---".into(),
            score_line: 0,
            score_width: 5,
            link_line: 2,
            maps_start: 7,
            bold_marker: "**".into(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            tick_minutes: 30,
            request_timeout_seconds: 10,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            article_store: "last_patchnote.json".into(),
            thread_store: "posted_threads.json".into(),
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.tick_minutes.max(1) * 60),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            max_retries: self.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS),
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }
}

impl WatchConfig {
    /// `$VALWATCH_CONFIG_DIR`, else `<config dir>/valwatch`, else `./valwatch`.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("valwatch")
    }

    /// Loads the configuration, falling back to (and writing out) the defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not load config, using defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save(path) {
                    warn!(error = %save_err, path = %path.display(), "could not write default config");
                }
                default_config
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: WatchConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn article_store_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.storage.article_store)
    }

    pub fn thread_store_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.storage.thread_store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let json = r#"{ "threads": { "include": ["Masters"] }, "poll": { "tick_minutes": 5 } }"#;
        let cfg: WatchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.threads.include, vec!["Masters".to_string()]);
        assert_eq!(cfg.threads.exclude.len(), 3);
        assert_eq!(cfg.threads.layout, ThreadLayout::default());
        assert_eq!(cfg.poll.tick_minutes, 5);
        assert_eq!(cfg.articles.blob_lead, 10);
    }

    #[test]
    fn poll_settings_never_produce_zero_interval() {
        let settings = PollSettings {
            tick_minutes: 0,
            retry_attempts: 0,
            ..PollSettings::default()
        };
        let cfg = settings.to_poll_config();
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.max_retries, 1);
    }

    #[test]
    fn retry_attempts_are_capped() {
        let settings = PollSettings {
            retry_attempts: 200,
            ..PollSettings::default()
        };
        assert_eq!(settings.to_poll_config().max_retries, MAX_RETRY_ATTEMPTS);
    }

    #[test]
    fn load_writes_defaults_when_missing() {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "valwatch_cfg_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = dir.join("config.json");

        let cfg = WatchConfig::load(&path);
        assert_eq!(cfg.articles.check_hours, vec![11, 16]);
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
