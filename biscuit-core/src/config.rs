use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the extension catalog lives and how fast it is materialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtensionsSettings {
    pub repo_url: String,
    pub list_file: String,
    /// Interval between UI-thread poll ticks.
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ExtensionsSettings {
    fn default() -> Self {
        ExtensionsSettings {
            repo_url: String::from(
                "https://raw.githubusercontent.com/tomlin7/biscuit-extensions/main/",
            ),
            list_file: String::from("extensions.json"),
            poll_interval_ms: 5,
            request_timeout_secs: 30,
        }
    }
}

impl ExtensionsSettings {
    /// Full URL of the catalog document.
    pub fn list_url(&self) -> String {
        if self.repo_url.ends_with('/') {
            format!("{}{}", self.repo_url, self.list_file)
        } else {
            format!("{}/{}", self.repo_url, self.list_file)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    /// `bash`, `zsh`, `fish`, `cmd`, `powershell`, or a path. `None` picks
    /// the platform default.
    pub shell: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub working_directory: Option<String>,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        TerminalSettings {
            shell: None,
            cols: 120,
            rows: 30,
            working_directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerSettings {
    pub ignore_dirs: Vec<String>,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        ExplorerSettings {
            ignore_dirs: [
                ".git",
                "__pycache__",
                ".pytest_cache",
                "node_modules",
                "debug",
                "dist",
                "build",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Application settings, persisted to `~/.config/biscuit/settings.json`.
///
/// `#[serde(default)]` fills in any field missing from an older file, so new
/// settings can be added without breaking existing configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Short-circuits every network and worker-spawning entry point. Set by
    /// test harnesses and by users who run without connectivity.
    pub offline_mode: bool,
    pub extensions: ExtensionsSettings,
    pub terminal: TerminalSettings,
    pub explorer: ExplorerSettings,
}

pub fn settings_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join("biscuit").join("settings.json"));
        }
    }
    dirs::config_dir().map(|dir| dir.join("biscuit").join("settings.json"))
}

/// Load settings from the default location. Never fails.
pub fn load() -> Settings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => Settings::default(),
    }
}

pub fn load_from(path: &Path) -> Settings {
    let contents = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Settings::default(),
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Invalid settings at {}: {}", path.display(), e);
            Settings::default()
        }
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path().ok_or("Unable to determine config directory")?;
    save_to(settings, &path)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
