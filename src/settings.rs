// Import necessary libraries and modules for file I/O and serialization.
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::preferences::Theme;

pub const SETTINGS_FILE: &str = "settings.json";

// Root of everything the binary writes: ~/sheetkeeper/data, or ./data without a home dir.
pub fn data_root() -> PathBuf {
    dir::home_dir()
        .into_iter()
        .next()
        .map(|home| home.join("sheetkeeper").join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

// Define a structure to hold application settings with serde support.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,       // Where documents, preferences and the log live.
    pub history_limit: usize,    // How many rolls the history view shows.
    pub log_level: String,       // Any `log` level name; unknown names mean "debug".
    pub default_theme: Theme,    // Used until the user picks one.
}

// Implement the Default trait for Settings to provide a method to create default settings.
impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: data_root(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_level: "debug".to_string(),
            default_theme: Theme::Dark,
        }
    }
}

impl Settings {
    // Load settings from the default file path, falling back to defaults when there is none yet.
    pub fn load() -> io::Result<Self> {
        Self::load_or_default(data_root().join(SETTINGS_FILE))
    }

    // A missing file is created with the defaults so there is something to edit.
    pub fn load_or_default(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No settings at {}, writing defaults", path.display());
            let settings = Self::default();
            settings.save_to_file(path)?;
            return Ok(settings);
        }
        Self::load_settings_from_file(path)
    }

    // Load settings from a specified file path.
    pub fn load_settings_from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&data)?;
        settings.history_limit = settings.history_limit.max(1);
        Ok(settings)
    }

    // Save current settings to a specified file path.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?; // Create the directory if it doesn't exist.
        }
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Debug)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}
