use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::event::DaemonEvent;

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
/// Sampling intervals offered by the tray menu's radio group.
pub const INTERVAL_CHOICES_MS: [u64; 2] = [1000, 500];
/// Intervals below this are raised to it; sysinfo cannot measure shorter windows.
pub const MIN_INTERVAL_MS: u64 = 100;
pub const DEFAULT_FONT_FILE: &str = "arial.ttf";
pub const DEFAULT_FONT_DIR_ENV: &str = "WINDIR";

/// Root configuration structure. Deserialized from `<app data>/cpuglyph/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
    #[serde(default)]
    pub glyph: GlyphConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Length of one CPU measurement window in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

/// Converts a millisecond count into the sampling window, raised to
/// [`MIN_INTERVAL_MS`] if smaller.
pub fn effective_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_INTERVAL_MS))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatesConfig {
    /// Hours of the local day (0-23) at which an update check fires once.
    /// An empty list disables scheduled checks.
    #[serde(default)]
    pub check_hours: Vec<u32>,
    #[serde(default)]
    pub pip: EcosystemConfig,
    #[serde(default)]
    pub choco: EcosystemConfig,
}

/// Settings for one package ecosystem's outdated-package probe.
#[derive(Debug, Clone, Deserialize)]
pub struct EcosystemConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Program and arguments that list outdated packages. Falls back to the
    /// ecosystem's stock command when unset.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Package names that never count as an available upgrade.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Only count upgrades that keep the major version.
    #[serde(default)]
    pub ignore_breaking_changes: bool,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            ignore: Vec::new(),
            ignore_breaking_changes: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlyphConfig {
    /// Font file name looked up under `$<font_dir_env>/Fonts/`.
    #[serde(default = "default_font_file")]
    pub font_file: String,
    #[serde(default = "default_font_dir_env")]
    pub font_dir_env: String,
    /// Absolute font path; skips the environment lookup when set.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            font_file: default_font_file(),
            font_dir_env: default_font_dir_env(),
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_power_list")]
    pub list_command: Vec<String>,
    /// The profile id is appended as the final argument.
    #[serde(default = "default_power_set")]
    pub set_command: Vec<String>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            list_command: default_power_list(),
            set_command: default_power_set(),
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("failed to create config watcher: {e}");
            return;
        }
    };

    // Editors save by writing a new file and renaming it, so watch the directory.
    let Some(watch_dir) = path.parent().map(Path::to_path_buf) else {
        error!("config path {} has no parent directory", path.display());
        return;
    };

    if let Err(e) = std::fs::create_dir_all(&watch_dir) {
        warn!("cannot create config directory {}: {e}", watch_dir.display());
    }
    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("failed to watch config directory: {e}");
        return;
    }
    debug!("watching {} for config changes", watch_dir.display());

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("failed to reload config: {e:#}"),
            }
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_font_file() -> String {
    DEFAULT_FONT_FILE.to_string()
}

fn default_font_dir_env() -> String {
    DEFAULT_FONT_DIR_ENV.to_string()
}

fn default_power_list() -> Vec<String> {
    argv(&["powercfg", "/list"])
}

fn default_power_set() -> Vec<String> {
    argv(&["powercfg", "/setactive"])
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_values() {
        let c = Config::default();
        assert_eq!(c.sampling.interval_ms, DEFAULT_INTERVAL_MS);
        assert!(c.updates.check_hours.is_empty());
        assert!(c.updates.pip.command.is_none());
        assert!(c.updates.choco.command.is_none());
        assert!(c.updates.pip.enabled);
        assert!(!c.updates.choco.ignore_breaking_changes);
        assert_eq!(c.glyph.font_file, DEFAULT_FONT_FILE);
        assert_eq!(c.power.list_command, ["powercfg", "/list"]);
    }

    #[test]
    fn default_interval_is_a_menu_choice() {
        assert!(INTERVAL_CHOICES_MS.contains(&DEFAULT_INTERVAL_MS));
    }

    // ── interval ──────────────────────────────────────────────────────────────

    #[test]
    fn interval_passes_through_normal_values() {
        assert_eq!(effective_interval(500), Duration::from_millis(500));
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        assert_eq!(effective_interval(0), Duration::from_millis(MIN_INTERVAL_MS));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.sampling.interval_ms, DEFAULT_INTERVAL_MS);
        assert!(config.updates.check_hours.is_empty());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[sampling]
interval_ms = 500

[updates]
check_hours = [9, 17]

[updates.pip]
ignore = ["setuptools"]
ignore_breaking_changes = true

[updates.choco]
enabled = false
command = ["choco", "outdated", "-r", "--ignore-pinned"]

[glyph]
font_path = "/usr/share/fonts/DejaVuSans.ttf"
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.sampling.interval_ms, 500);
        assert_eq!(config.updates.check_hours, [9, 17]);
        assert_eq!(config.updates.pip.ignore, ["setuptools"]);
        assert!(config.updates.pip.ignore_breaking_changes);
        assert!(!config.updates.choco.enabled);
        assert_eq!(
            config.updates.choco.command,
            Some(argv(&["choco", "outdated", "-r", "--ignore-pinned"]))
        );
        assert_eq!(
            config.glyph.font_path.as_deref(),
            Some(Path::new("/usr/share/fonts/DejaVuSans.ttf"))
        );
    }

    #[test]
    fn partial_ecosystem_table_keeps_enabled_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[updates.pip]\nignore = [\"pip\"]\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert!(config.updates.pip.enabled);
        assert_eq!(config.updates.pip.ignore, ["pip"]);
        assert!(config.updates.pip.command.is_none());
        assert!(!config.updates.pip.ignore_breaking_changes);
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sampling]\ninterval_ms = 250\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.sampling.interval_ms, 250);
        assert_eq!(config.glyph.font_dir_env, DEFAULT_FONT_DIR_ENV);
        assert_eq!(config.power.set_command, ["powercfg", "/setactive"]);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
