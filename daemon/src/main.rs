mod cli;
mod config;
mod event;
mod external;
mod glyph;
mod paths;
mod power;
mod sampler;
mod schedule;
mod status;
mod theme;
mod tray;
mod updates;

use anyhow::{Context, Result};
use chrono::Timelike;
use clap::Parser;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cli::Args;
use crate::config::Config;
use crate::event::DaemonEvent;
use crate::glyph::{FontSource, GlyphRenderer};
use crate::power::PowerProfiles;
use crate::sampler::Sampler;
use crate::schedule::HourSchedule;
use crate::theme::ThemeState;
use crate::tray::{DesktopNotifier, HeadlessTray, MenuCommand, TraySurface};
use crate::updates::{Ecosystem, ExternalTools, OutdatedSource, UpdateChecker, UpdateFlags};

/// How often the wall clock is compared against the configured check hours.
/// Independent of the sampling interval.
const SCHEDULE_TICK: Duration = Duration::from_secs(30);
const THEME_POLL: Duration = Duration::from_secs(2);

/// State owned by the event loop. Worker tasks only see the shared flags and
/// the theme state through their narrow set/get methods.
struct Daemon<T: TraySurface, S: OutdatedSource> {
    config: Config,
    interval_ms: u64,
    schedule: HourSchedule,
    checker: UpdateChecker,
    source: Arc<S>,
    flags: Arc<UpdateFlags>,
    theme: Arc<ThemeState>,
    renderer: GlyphRenderer,
    power: PowerProfiles,
    tray: T,
}

impl<T: TraySurface, S: OutdatedSource> Daemon<T, S> {
    fn interval(&self) -> Duration {
        config::effective_interval(self.interval_ms)
    }

    /// Posts one notification per raised update flag and lowers it.
    fn drain_updates(&mut self) {
        for ecosystem in Ecosystem::ALL {
            if self.flags.take(ecosystem) {
                let (message, title) = ecosystem.notification();
                self.tray.notify(message, title);
            }
        }
    }

    /// Spawns an update check without waiting for it. Results arrive through
    /// the flags and are reported by the next [`Self::drain_updates`].
    fn start_check(&self) {
        info!("checking for package upgrades");
        let checker = self.checker.clone();
        let source = Arc::clone(&self.source);
        let flags = Arc::clone(&self.flags);
        tokio::spawn(async move {
            let report = checker.check_all(source, flags).await;
            debug!("update check finished: {report:?}");
        });
    }

    /// Feeds the current hour to the schedule; starts a check when a latch fires.
    fn on_clock(&mut self, hour: u32) -> bool {
        let fire = self.schedule.observe(hour);
        if fire {
            debug!("scheduled check for hour {hour}");
            self.start_check();
        }
        fire
    }

    /// Renders `percentage` with the current palette and shows it.
    fn publish(&mut self, percentage: u8) -> Result<()> {
        let icon = self.renderer.render(percentage, self.theme.is_dark())?;
        self.tray.set_icon(&icon);
        Ok(())
    }

    fn refresh_menu(&mut self) {
        let menu = tray::build_menu(&self.power, self.interval_ms);
        self.tray.set_menu(menu);
    }

    fn handle_menu(&mut self, command: MenuCommand) -> ControlFlow<()> {
        match command {
            MenuCommand::SetInterval(ms) => {
                info!("sampling interval set to {ms} ms");
                self.interval_ms = ms;
                self.refresh_menu();
            }
            MenuCommand::SetPowerProfile(id) => {
                if self.power.activate(&self.config.power, &id) {
                    self.refresh_menu();
                }
            }
            MenuCommand::CheckForUpdates => self.start_check(),
            MenuCommand::Exit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn apply_config(&mut self, config: Config) {
        info!("config reloaded");
        self.interval_ms = config.sampling.interval_ms;
        self.schedule.reconfigure(&config.updates.check_hours);
        self.checker = UpdateChecker::from_config(&config.updates);
        self.config = config;
        self.refresh_menu();
    }

    /// Runs until an exit command, Ctrl+C, or every event sender is gone, then
    /// releases the tray icon.
    async fn run(mut self, mut events: mpsc::Receiver<DaemonEvent>, mut sampler: Sampler) -> Result<()> {
        let mut clock = interval(SCHEDULE_TICK);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.drain_updates();

            tokio::select! {
                event = events.recv() => match event {
                    Some(DaemonEvent::Menu(command)) => {
                        if self.handle_menu(command).is_break() {
                            break;
                        }
                    }
                    Some(DaemonEvent::ConfigReloaded(config)) => self.apply_config(config),
                    Some(DaemonEvent::Shutdown) | None => break,
                },
                _ = clock.tick() => {
                    self.on_clock(chrono::Local::now().hour());
                }
                reading = sampler.sample(self.interval()) => match reading {
                    Ok(percentage) => {
                        if let Err(e) = self.publish(percentage) {
                            self.tray.hide();
                            return Err(e);
                        }
                    }
                    Err(e) => debug!("skipping frame: {e:#}"),
                },
            }
        }

        info!("shutting down");
        self.tray.hide();
        Ok(())
    }
}

/// Initializes the tracing subscriber with the requested level.
fn setup_logging(args: &Args) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(args.log_level))
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {e}");
    }
}

async fn run(args: Args) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let (config_path, data_dir) = match &args.config {
        Some(path) => {
            // The watcher reports absolute paths, so compare against one.
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()
                    .context("cannot resolve the config path")?
                    .join(path)
            };
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => {
            let dir = paths::app_data_dir()?;
            (paths::config_file_path(&dir), dir)
        }
    };
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("{e:#}; using defaults");
        Config::default()
    });

    // ── Power profiles ────────────────────────────────────────────────────────
    let power = PowerProfiles::new(power::list_profiles(&config.power).await);
    if args.list_profiles {
        for p in power.profiles() {
            let marker = if p.is_active { " *" } else { "" };
            println!("{}  {}{marker}", p.id, p.display_name);
        }
        return Ok(());
    }

    // ── Theme ─────────────────────────────────────────────────────────────────
    let appearance = tokio::task::spawn_blocking(theme::detect)
        .await
        .unwrap_or(None);
    let theme = Arc::new(ThemeState::for_appearance(appearance));

    // ── Tray ──────────────────────────────────────────────────────────────────
    let interval_ms = args.interval_ms.unwrap_or(config.sampling.interval_ms);
    let status_path = paths::status_file_path(&data_dir);
    let mut renderer = GlyphRenderer::new(FontSource::from_config(&config.glyph));
    // No glyph, no tray: a missing font stops the daemon here.
    let first_frame = renderer
        .render(0, theme.is_dark())
        .context("cannot render the tray glyph")?;
    let mut tray = HeadlessTray::new(DesktopNotifier, status_path, interval_ms);
    tray.set_icon(&first_frame);

    let mut daemon = Daemon {
        schedule: HourSchedule::new(&config.updates.check_hours),
        checker: UpdateChecker::from_config(&config.updates),
        config,
        interval_ms,
        source: Arc::new(ExternalTools),
        flags: Arc::new(UpdateFlags::default()),
        theme: Arc::clone(&theme),
        renderer,
        power,
        tray,
    };
    daemon.refresh_menu();
    if daemon.schedule.is_empty() {
        info!("no check hours configured; scheduled update checks are off");
    }

    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(theme::watch_theme(theme, appearance, THEME_POLL));
    tokio::spawn(tray::read_console_commands(event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    if args.check_now {
        daemon.start_check();
    }

    info!("cpuglyph v{} started", env!("CARGO_PKG_VERSION"));
    daemon.run(event_rx, Sampler::new()).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(&args);

    match run(args).await {
        // The console reader may be parked in a blocking stdin read that the
        // runtime cannot cancel, so leave without waiting for it.
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}
