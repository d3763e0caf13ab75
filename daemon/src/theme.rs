/// System theme tracking.
///
/// The dark-mode flag is written only by the theme listener and read only by
/// the render path. A theme-change notification inverts the flag rather than
/// assigning the reported mode, so a missed or duplicated notification leaves
/// the glyph colours inverted until the next change.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `true` selects the dark glyph palette, which is what a light taskbar needs.
#[derive(Debug, Default)]
pub struct ThemeState {
    dark: AtomicBool,
}

impl ThemeState {
    /// Initial palette for a detected system appearance. Unknown means dark
    /// system chrome, the common default.
    pub fn for_appearance(appearance: Option<Appearance>) -> Self {
        Self::new(appearance == Some(Appearance::Light))
    }

    pub fn new(dark: bool) -> Self {
        Self {
            dark: AtomicBool::new(dark),
        }
    }

    pub fn is_dark(&self) -> bool {
        self.dark.load(Ordering::Acquire)
    }

    /// Inverts the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.dark.fetch_xor(true, Ordering::AcqRel)
    }
}

/// Theme reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Light,
    Dark,
}

/// Reads the current system appearance. `None` when the platform does not say.
pub fn detect() -> Option<Appearance> {
    match dark_light::detect() {
        Ok(dark_light::Mode::Dark) => Some(Appearance::Dark),
        Ok(dark_light::Mode::Light) => Some(Appearance::Light),
        Ok(dark_light::Mode::Unspecified) => None,
        Err(e) => {
            debug!("theme detection failed: {e}");
            None
        }
    }
}

/// Turns a stream of appearance readings into change notifications.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Appearance>,
}

impl ChangeDetector {
    pub fn new(initial: Option<Appearance>) -> Self {
        Self { last: initial }
    }

    /// Returns `true` when `reading` differs from the previous known reading.
    /// Unknown readings are ignored.
    pub fn observe(&mut self, reading: Option<Appearance>) -> bool {
        let Some(reading) = reading else {
            return false;
        };
        let changed = self.last.is_some_and(|last| last != reading);
        self.last = Some(reading);
        changed
    }
}

/// Polls the system appearance every `poll` and toggles `state` once per change.
pub async fn watch_theme(state: Arc<ThemeState>, initial: Option<Appearance>, poll: Duration) {
    let mut detector = ChangeDetector::new(initial);
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let reading = match tokio::task::spawn_blocking(detect).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("theme detection task failed: {e}");
                continue;
            }
        };
        if detector.observe(reading) {
            let dark = state.toggle();
            info!("system theme changed; dark glyphs {}", if dark { "on" } else { "off" });
        }
    }
}
