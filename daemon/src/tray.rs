/// The tray surface: icon, context menu and notification popups.
///
/// The event loop talks to the tray only through [`TraySurface`]. The shipped
/// implementation, [`HeadlessTray`], posts desktop notifications and mirrors
/// the icon and menu state into the status file.
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::INTERVAL_CHOICES_MS;
use crate::event::DaemonEvent;
use crate::glyph::GlyphImage;
use crate::power::PowerProfiles;
use crate::status::{self, NotificationRecord, TrayStatus};

/// An action the user picked from the tray menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    SetInterval(u64),
    SetPowerProfile(String),
    CheckForUpdates,
    Exit,
}

impl MenuCommand {
    /// Parses a console command: `interval <ms>`, `profile <id>`, `check` or `exit`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("interval", Some(ms)) => MenuCommand::SetInterval(ms.parse().ok()?),
            ("profile", Some(id)) => MenuCommand::SetPowerProfile(id.to_lowercase()),
            ("check", None) => MenuCommand::CheckForUpdates,
            ("exit" | "quit", None) => MenuCommand::Exit,
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }
}

/// Forwards menu commands typed on stdin to the event loop, standing in for
/// menu clicks when no tray toolkit is attached. Ends quietly at end of input.
pub async fn read_console_commands(tx: mpsc::Sender<DaemonEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match MenuCommand::parse(&line) {
                Some(command) => {
                    if tx.send(DaemonEvent::Menu(command)).await.is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("unknown command {line:?} (try: interval <ms>, profile <id>, check, exit)"),
            },
            Ok(None) => break,
            Err(e) => {
                debug!("console input closed: {e}");
                break;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Radio {
        label: String,
        checked: bool,
        command: MenuCommand,
    },
    Action {
        label: String,
        command: MenuCommand,
    },
    Separator,
}

fn interval_label(ms: u64) -> String {
    if ms % 1000 == 0 {
        format!("{} s", ms / 1000)
    } else {
        format!("{} s", ms as f64 / 1000.0)
    }
}

/// Builds the context menu: power profiles, the interval radio group, then
/// the fixed actions.
pub fn build_menu(power: &PowerProfiles, interval_ms: u64) -> Vec<MenuEntry> {
    let mut entries: Vec<MenuEntry> = power
        .profiles()
        .iter()
        .map(|p| MenuEntry::Radio {
            label: p.display_name.clone(),
            checked: power.active() == Some(p.id.as_str()),
            command: MenuCommand::SetPowerProfile(p.id.clone()),
        })
        .collect();
    if !entries.is_empty() {
        entries.push(MenuEntry::Separator);
    }

    entries.extend(INTERVAL_CHOICES_MS.iter().map(|&ms| MenuEntry::Radio {
        label: format!("Refresh every {}", interval_label(ms)),
        checked: ms == interval_ms,
        command: MenuCommand::SetInterval(ms),
    }));
    entries.push(MenuEntry::Separator);
    entries.push(MenuEntry::Action {
        label: "Search for updates".to_string(),
        command: MenuCommand::CheckForUpdates,
    });
    entries.push(MenuEntry::Action {
        label: "Exit".to_string(),
        command: MenuCommand::Exit,
    });
    entries
}

pub trait TraySurface {
    /// Replaces the icon image.
    fn set_icon(&mut self, icon: &GlyphImage);
    /// Replaces the context menu.
    fn set_menu(&mut self, entries: Vec<MenuEntry>);
    /// Shows a transient popup.
    fn notify(&mut self, message: &str, title: &str);
    /// Removes the icon from the notification area.
    fn hide(&mut self);
}

/// Delivers notification popups.
pub trait Notifier {
    fn post(&self, message: &str, title: &str) -> Result<()>;
}

/// Desktop notifications through the platform notification service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn post(&self, message: &str, title: &str) -> Result<()> {
        notify_rust::Notification::new()
            .summary(title)
            .body(message)
            .appname("cpuglyph")
            .show()
            .map_err(|e| anyhow!("notification failed: {e}"))?;
        Ok(())
    }
}

/// A tray with no widget toolkit behind it.
pub struct HeadlessTray<N: Notifier = DesktopNotifier> {
    notifier: N,
    status_path: PathBuf,
    status: TrayStatus,
    icon: Option<GlyphImage>,
    menu: Vec<MenuEntry>,
}

impl<N: Notifier> HeadlessTray<N> {
    pub fn new(notifier: N, status_path: PathBuf, interval_ms: u64) -> Self {
        Self {
            notifier,
            status_path,
            status: TrayStatus::new(interval_ms),
            icon: None,
            menu: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> &TrayStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn icon(&self) -> Option<&GlyphImage> {
        self.icon.as_ref()
    }

    #[cfg(test)]
    pub fn menu(&self) -> &[MenuEntry] {
        &self.menu
    }

    fn flush_status(&self) {
        status::write_status(&self.status_path, &self.status);
    }
}

impl<N: Notifier> TraySurface for HeadlessTray<N> {
    fn set_icon(&mut self, icon: &GlyphImage) {
        let changed = self
            .icon
            .as_ref()
            .map_or(true, |shown| (shown.percentage, shown.dark_mode) != (icon.percentage, icon.dark_mode));
        self.status.icon_visible = true;
        self.status.cpu_percent = Some(icon.percentage);
        self.status.glyph_tier = Some(icon.tier.name().to_string());
        self.status.dark_glyphs = icon.dark_mode;
        self.icon = Some(icon.clone());
        if changed {
            self.flush_status();
        }
    }

    fn set_menu(&mut self, entries: Vec<MenuEntry>) {
        for entry in &entries {
            if let MenuEntry::Radio {
                checked: true,
                command,
                ..
            } = entry
            {
                match command {
                    MenuCommand::SetInterval(ms) => self.status.interval_ms = *ms,
                    MenuCommand::SetPowerProfile(id) => {
                        self.status.active_power_profile = Some(id.clone())
                    }
                    _ => {}
                }
            }
        }
        if self.menu == entries {
            return;
        }
        debug!("tray menu has {} entries", entries.len());
        self.menu = entries;
        self.flush_status();
    }

    fn notify(&mut self, message: &str, title: &str) {
        info!("{title}: {message}");
        if let Err(e) = self.notifier.post(message, title) {
            warn!("{e:#}");
        }
        self.status.last_notification = Some(NotificationRecord {
            title: title.to_string(),
            message: message.to_string(),
            posted_at: chrono::Local::now().to_rfc3339(),
        });
        self.flush_status();
    }

    fn hide(&mut self) {
        self.icon = None;
        self.status.icon_visible = false;
        self.flush_status();
        debug!("tray icon released");
    }
}
