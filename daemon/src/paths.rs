/// Canonical file paths for cpuglyph data files.
///
/// Both files live under `<app data>/cpuglyph/`:
///   - config.toml  Written by the user, read (and watched) by the daemon.
///   - status.toml  Written by the daemon on every icon refresh.
///
/// The app data directory is `%APPDATA%` on Windows and `$XDG_CONFIG_HOME`
/// (falling back to `$HOME/.config`) elsewhere.
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "cpuglyph";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the cpuglyph application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    resolve_app_data_dir(|name| std::env::var_os(name).map(PathBuf::from))
}

fn resolve_app_data_dir(var: impl Fn(&str) -> Option<PathBuf>) -> Result<PathBuf> {
    let base = if cfg!(windows) {
        var("APPDATA")
    } else {
        var("XDG_CONFIG_HOME")
            .filter(|p| p.is_absolute())
            .or_else(|| var("HOME").map(|home| home.join(".config")))
    };
    match base {
        Some(base) => Ok(base.join(APP_DIR_NAME)),
        None => bail!("cannot locate an application data directory (APPDATA / XDG_CONFIG_HOME / HOME unset)"),
    }
}

/// Returns the full path to the config file inside `dir`.
pub fn config_file_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file inside `dir`.
pub fn status_file_path(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_status_share_same_parent_dir() {
        let dir = PathBuf::from("/tmp/cpuglyph");
        let config = config_file_path(&dir);
        let status = status_file_path(&dir);
        assert_eq!(config.parent(), status.parent());
        assert_eq!(config.file_name().unwrap(), CONFIG_FILE_NAME);
        assert_eq!(status.file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[cfg(not(windows))]
    #[test]
    fn xdg_config_home_takes_precedence() {
        let dir = resolve_app_data_dir(|name| match name {
            "XDG_CONFIG_HOME" => Some(PathBuf::from("/xdg")),
            "HOME" => Some(PathBuf::from("/home/u")),
            _ => None,
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/cpuglyph"));
    }

    #[cfg(not(windows))]
    #[test]
    fn relative_xdg_config_home_is_ignored() {
        let dir = resolve_app_data_dir(|name| match name {
            "XDG_CONFIG_HOME" => Some(PathBuf::from("relative")),
            "HOME" => Some(PathBuf::from("/home/u")),
            _ => None,
        })
        .unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.config/cpuglyph"));
    }

    #[test]
    fn missing_variables_are_an_error() {
        assert!(resolve_app_data_dir(|_| None).is_err());
    }

    #[cfg(windows)]
    #[test]
    fn app_data_dir_is_inside_appdata() {
        let dir = resolve_app_data_dir(|name| {
            (name == "APPDATA").then(|| PathBuf::from(r"C:\Users\u\AppData\Roaming"))
        })
        .unwrap();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }
}
