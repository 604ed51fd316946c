use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PreferenceError;

const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown theme '{other}' (expected dark or light)")),
        }
    }
}

// --- Storage ---

/// Durable string key/value storage.
pub trait PreferenceStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// Preferences kept as a flat toml table on disk.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, PreferenceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(PreferenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| PreferenceError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl PreferenceStorage for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.read()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut values = self.read()?;
        values.insert(key.to_string(), value.to_string());
        let text = toml::to_string(&values)?;

        let io_err = |source| PreferenceError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, text).map_err(io_err)
    }
}

/// Non-durable storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

impl PreferenceStorage for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// --- Store ---

/// The display-mode preference. Created once at startup and handed to
/// whatever renders; the only writers are `toggle` and `set`.
#[derive(Debug)]
pub struct ThemeStore<S: PreferenceStorage> {
    storage: S,
    current: Theme,
}

impl<S: PreferenceStorage> ThemeStore<S> {
    /// Persisted value, else the OS hint, else dark.
    pub fn init(storage: S, os_hint: Option<Theme>) -> Self {
        let persisted = match storage.get(THEME_KEY) {
            Ok(Some(value)) => match value.parse::<Theme>() {
                Ok(theme) => Some(theme),
                Err(e) => {
                    warn!("Ignoring persisted theme: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read theme preference: {e}");
                None
            }
        };

        let current = persisted.or(os_hint).unwrap_or_default();
        debug!("Theme {current} (persisted: {persisted:?}, os hint: {os_hint:?})");
        Self { storage, current }
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn toggle(&mut self) -> Result<Theme, PreferenceError> {
        self.set(self.current.toggled())
    }

    /// Switch to `theme` and persist it. The in-memory value changes even if
    /// persisting fails.
    pub fn set(&mut self, theme: Theme) -> Result<Theme, PreferenceError> {
        self.current = theme;
        self.storage.set(THEME_KEY, theme.as_str())?;
        info!("Theme set to {theme}");
        Ok(theme)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Terminal background hint from `COLORFGBG` ("fg;bg", ANSI color indices).
pub fn os_theme_hint() -> Option<Theme> {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|value| parse_colorfgbg(&value))
}

fn parse_colorfgbg(value: &str) -> Option<Theme> {
    let bg: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    match bg {
        0..=6 | 8 => Some(Theme::Dark),
        7 | 9..=15 => Some(Theme::Light),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_light_wins_over_os_hint() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("prefs").join("preferences.toml");

        let mut store = ThemeStore::init(FilePreferences::new(&file), None);
        assert_eq!(store.current(), Theme::Dark);
        store.set(Theme::Light).unwrap();

        // reload
        let store = ThemeStore::init(FilePreferences::new(&file), Some(Theme::Dark));
        assert_eq!(store.current(), Theme::Light);
    }

    #[test]
    fn os_hint_used_without_persisted_value() {
        let store = ThemeStore::init(MemoryPreferences::default(), Some(Theme::Dark));
        assert_eq!(store.current(), Theme::Dark);
        let store = ThemeStore::init(MemoryPreferences::default(), Some(Theme::Light));
        assert_eq!(store.current(), Theme::Light);
    }

    #[test]
    fn init_does_not_persist() {
        let store = ThemeStore::init(MemoryPreferences::default(), Some(Theme::Light));
        assert_eq!(store.storage().get(THEME_KEY).unwrap(), None);
    }

    #[test]
    fn toggle_persists_each_change() {
        let mut store = ThemeStore::init(MemoryPreferences::default(), None);
        assert_eq!(store.toggle().unwrap(), Theme::Light);
        assert_eq!(store.storage().get(THEME_KEY).unwrap().as_deref(), Some("light"));
        assert_eq!(store.toggle().unwrap(), Theme::Dark);
        assert_eq!(store.storage().get(THEME_KEY).unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn file_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("preferences.toml");
        std::fs::write(&file, "font = \"serif\"\n").unwrap();

        let mut prefs = FilePreferences::new(&file);
        prefs.set(THEME_KEY, "light").unwrap();
        assert_eq!(prefs.get("font").unwrap().as_deref(), Some("serif"));
        assert_eq!(prefs.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn corrupt_file_falls_back_to_hint() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("preferences.toml");
        std::fs::write(&file, "theme = [").unwrap();
        assert!(matches!(
            FilePreferences::new(&file).get(THEME_KEY),
            Err(PreferenceError::Parse { .. })
        ));
        let store = ThemeStore::init(FilePreferences::new(&file), Some(Theme::Light));
        assert_eq!(store.current(), Theme::Light);
    }

    #[test]
    fn colorfgbg_background_decides() {
        assert_eq!(parse_colorfgbg("15;0"), Some(Theme::Dark));
        assert_eq!(parse_colorfgbg("0;15"), Some(Theme::Light));
        assert_eq!(parse_colorfgbg("12;default;7"), Some(Theme::Light));
        assert_eq!(parse_colorfgbg("default"), None);
    }

    #[test]
    fn theme_parses_case_insensitively() {
        assert_eq!("LIGHT".parse::<Theme>().unwrap(), Theme::Light);
        assert!("blue".parse::<Theme>().is_err());
    }
}
