use crate::config::Config;
use crate::tray::MenuCommand;

pub enum DaemonEvent {
    /// A tray menu entry was activated.
    Menu(MenuCommand),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; release the tray icon and exit.
    Shutdown,
}
