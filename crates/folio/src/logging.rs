use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::LoggingConfig;

const LOG_FILE: &str = "folio.log";

/// Set up tracing-subscriber. With logging enabled and a resolvable directory,
/// events go to `folio.log` there; otherwise to stderr.
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);

    let dir = config
        .enabled
        .then(|| config.log_directory())
        .flatten()
        .filter(|d| fs::create_dir_all(d).is_ok());

    match dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = tracing_subscriber::fmt()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_max_level(level)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(level)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    }
}

/// Plain-text transcript of one session's panel exchanges.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    /// Create `sessions/<label>_<timestamp>.txt` under the configured log directory.
    /// None when logging is disabled or the file cannot be created.
    pub fn create(config: &LoggingConfig, label: &str) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Self::create_in(&config.log_directory()?.join("sessions"), label)
    }

    pub fn create_in(dir: &Path, label: &str) -> Option<Self> {
        fs::create_dir_all(dir).ok()?;

        let slug = label
            .replace(' ', "-")
            .replace(|c: char| !c.is_alphanumeric() && c != '-', "");
        let slug = if slug.is_empty() { "session".to_string() } else { slug };

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("{slug}_{timestamp}.txt"));

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .ok()?;

        let header = format!(
            "=== Folio - Session Log ===\nCommand: {label}\nDate: {}\n===========================\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        file.write_all(header.as_bytes()).ok()?;

        Some(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one prompt/result pair.
    pub fn log_exchange(&self, panel: &str, prompt: &str, result: &str) {
        let mut file = match OpenOptions::new().append(true).open(&self.path) {
            Ok(f) => f,
            Err(_) => return, // a broken transcript must not fail the interaction
        };

        let now = Local::now().format("%H:%M:%S");
        let entry = format!("[{now}] {panel} prompt:\n{prompt}\n\n[{now}] {panel} result:\n{result}\n\n");

        let _ = file.write_all(entry.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_log_writes_header_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create_in(dir.path(), "stream panel!").unwrap();
        log.log_exchange("stream", "short story", "Once upon a time.");

        let name = log.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("stream-panel_"));

        let text = fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("=== Folio - Session Log ==="));
        assert!(text.contains("stream prompt:\nshort story"));
        assert!(text.contains("stream result:\nOnce upon a time."));
    }

    #[test]
    fn disabled_logging_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            enabled: false,
            directory: Some(dir.path().to_string_lossy().into_owned()),
            level: "info".into(),
        };
        assert!(SessionLog::create(&config, "bio").is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
