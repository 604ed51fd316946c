use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

/// Environment variables checked, in order, when `[api] key` is empty.
const KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const CONFIG_FILE: &str = "folio.toml";

/// `<config_dir>/folio`, where the config and preference files live by default.
pub fn config_directory() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("folio"))
}

#[derive(Deserialize, Clone, Default, Debug)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_stream_model")]
    pub stream_model: String,
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds between polls of a long-running video operation.
    #[serde(default = "default_video_poll_secs")]
    pub video_poll_secs: u64,
    /// Give up on a video operation after this many seconds.
    #[serde(default = "default_video_timeout_secs")]
    pub video_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_secs(self.video_poll_secs.max(1))
    }

    pub fn video_deadline(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }
}

/// Initial prompt text for each panel.
#[derive(Deserialize, Clone, Debug)]
pub struct PromptConfig {
    #[serde(default = "default_bio_prompt")]
    pub bio: String,
    #[serde(default = "default_video_prompt")]
    pub video: String,
    #[serde(default = "default_stream_prompt")]
    pub stream: String,
    #[serde(default = "default_analysis_prompt")]
    pub analysis: String,
    #[serde(default = "default_edit_prompt")]
    pub edit: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    /// Override log directory. Default: "logs/" under the config directory.
    pub directory: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    pub fn log_directory(&self) -> Option<PathBuf> {
        if let Some(ref custom) = self.directory {
            return Some(PathBuf::from(custom));
        }
        config_directory().map(|d| d.join("logs"))
    }
}

#[derive(Deserialize, Clone, Default, Debug)]
pub struct PreferencesConfig {
    /// Override the persisted preference file.
    pub path: Option<String>,
}

impl PreferencesConfig {
    pub fn file(&self) -> Option<PathBuf> {
        if let Some(ref custom) = self.path {
            return Some(PathBuf::from(custom));
        }
        config_directory().map(|d| d.join("preferences.toml"))
    }
}

fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_text_model() -> String { "gemini-2.5-flash".into() }
fn default_stream_model() -> String { "gemini-flash-lite-latest".into() }
fn default_analysis_model() -> String { "gemini-2.5-pro".into() }
fn default_image_model() -> String { "gemini-2.5-flash-image".into() }
fn default_video_model() -> String { "veo-3.0-fast-generate-001".into() }
fn default_max_tokens() -> u32 { 1024 }
fn default_timeout_secs() -> u64 { 120 }
fn default_video_poll_secs() -> u64 { 10 }
fn default_video_timeout_secs() -> u64 { 600 }

fn default_bio_prompt() -> String {
    "Summarize my background in cybersecurity, AI agents, and education outreach. \
     Tone: confident, human."
        .into()
}
fn default_video_prompt() -> String {
    "A neon hologram of a cat driving a cyberpunk car at top speed".into()
}
fn default_stream_prompt() -> String { "Tell me a very short cyberpunk story.".into() }
fn default_analysis_prompt() -> String { "Summarize the main events in this video.".into() }
fn default_edit_prompt() -> String { "Add a retro, grainy film filter.".into() }

fn default_logging_enabled() -> bool { true }
fn default_log_level() -> String { "info".into() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            base_url: default_base_url(),
            text_model: default_text_model(),
            stream_model: default_stream_model(),
            analysis_model: default_analysis_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            video_poll_secs: default_video_poll_secs(),
            video_timeout_secs: default_video_timeout_secs(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            bio: default_bio_prompt(),
            video: default_video_prompt(),
            stream: default_stream_prompt(),
            analysis: default_analysis_prompt(),
            edit: default_edit_prompt(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: None,
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load `folio.toml` from `path`, or from the config directory when no path
    /// is given. A missing or broken file yields defaults; the key may still
    /// come from the environment.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => config_directory().map(|d| d.join(CONFIG_FILE)),
        };

        let mut config = match config_path {
            Some(ref p) => Self::read(p),
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn read(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                info!("{} not found, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Fill an empty key from the environment. `lookup` is `std::env::var` outside tests.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if !self.api.key.trim().is_empty() {
            return;
        }
        if let Some(key) = KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|v| !v.trim().is_empty())
        {
            self.api.key = key.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.api.text_model, "gemini-2.5-flash");
        assert_eq!(config.api.video_poll_secs, 10);
        assert!(config.prompts.stream.contains("cyberpunk"));
        assert!(config.logging.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [api]
            key = "abc"
            stream_model = "gemini-2.0-flash-lite"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.key, "abc");
        assert_eq!(config.api.stream_model, "gemini-2.0-flash-lite");
        assert_eq!(config.api.analysis_model, "gemini-2.5-pro");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn env_key_fills_only_an_empty_key() {
        let mut config = Config::default();
        config.apply_env(|name| (name == "API_KEY").then(|| " from-env ".to_string()));
        assert_eq!(config.api.key, "from-env");

        let mut config = Config::parse("[api]\nkey = \"file\"").unwrap();
        config.apply_env(|_| Some("env".into()));
        assert_eq!(config.api.key, "file");
    }

    #[test]
    fn gemini_key_wins_over_generic_key() {
        let mut config = Config::default();
        config.apply_env(|name| Some(name.to_lowercase()));
        assert_eq!(config.api.key, "gemini_api_key");
    }

    #[test]
    fn load_falls_back_on_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "[api\nkey = ").unwrap();
        let config = Config::load(Some(&path));
        assert_eq!(config.api.base_url, default_base_url());
    }

    #[test]
    fn poll_interval_never_zero() {
        let mut api = ApiConfig::default();
        api.video_poll_secs = 0;
        assert_eq!(api.video_poll_interval(), Duration::from_secs(1));
    }
}
