use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Runtime status written by the daemon to `<app data>/cpuglyph/status.toml`.
/// Mirrors what the tray shows so other tools can read it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrayStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Whether the tray icon is currently shown.
    pub icon_visible: bool,
    /// Most recent CPU reading, once one has been taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<u8>,
    /// Colour tier of the glyph currently shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glyph_tier: Option<String>,
    /// Whether the dark glyph palette is in use.
    pub dark_glyphs: bool,
    /// Current sampling interval in milliseconds.
    pub interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_power_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<NotificationRecord>,
}

/// A notification the tray posted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationRecord {
    pub title: String,
    pub message: String,
    /// RFC 3339 local timestamp.
    pub posted_at: String,
}

impl TrayStatus {
    /// Constructs the initial status on daemon startup.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            icon_visible: false,
            cpu_percent: None,
            glyph_tier: None,
            dark_glyphs: false,
            interval_ms,
            active_power_profile: None,
            last_notification: None,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged; a status write never stops the daemon.
pub fn write_status(path: &Path, status: &TrayStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("failed to write status file: {e}");
            }
        }
        Err(e) => warn!("failed to serialize status: {e}"),
    }
}
