//! XDG Base Directory and application-specific path resolution, built on
//! `directories-next`.
//!
//! Application directories are derived from the `org` / `NovaDE` / `NovaDE`
//! project triple, e.g. `~/.config/NovaDE/NovaDE` on Linux.

use directories_next::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

use crate::error::{ConfigError, CoreError};

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "NovaDE";
const APPLICATION: &str = "NovaDE";

/// Environment variable overriding the system-wide configuration file.
pub const SYSTEM_CONFIG_ENV: &str = "NOVADE_SYSTEM_CONFIG_PATH";
const DEFAULT_SYSTEM_CONFIG_PATH: &str = "/etc/novade/config.toml";

/// `$XDG_STATE_HOME`, falling back to `$HOME/.local/state` on Linux and to
/// the local data directory elsewhere.
pub fn get_state_base_dir() -> Result<PathBuf, CoreError> {
    BaseDirs::new()
        .map(|dirs| {
            #[cfg(target_os = "linux")]
            {
                match std::env::var("XDG_STATE_HOME") {
                    Ok(state_home) if !state_home.is_empty() => PathBuf::from(state_home),
                    _ => dirs.home_dir().join(".local/state"),
                }
            }
            #[cfg(not(target_os = "linux"))]
            {
                dirs.data_local_dir().to_path_buf()
            }
        })
        .ok_or_else(|| {
            CoreError::Config(ConfigError::DirectoryUnavailable { dir_type: "State Base".to_string() })
        })
}

/// e.g. `~/.config/NovaDE/NovaDE`.
pub fn get_app_config_dir() -> Result<PathBuf, CoreError> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| {
            CoreError::Config(ConfigError::DirectoryUnavailable { dir_type: "App Config".to_string() })
        })
}

/// e.g. `~/.local/state/NovaDE/NovaDE`. Relative log file paths resolve
/// here.
pub fn get_app_state_dir() -> Result<PathBuf, CoreError> {
    get_state_base_dir().map(|base_state| base_state.join(ORGANIZATION).join(APPLICATION))
}

/// The system-wide configuration file, `/etc/novade/config.toml` unless
/// [`SYSTEM_CONFIG_ENV`] names another one.
pub fn get_system_config_path_with_override() -> Result<PathBuf, CoreError> {
    match std::env::var(SYSTEM_CONFIG_ENV) {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(PathBuf::from(DEFAULT_SYSTEM_CONFIG_PATH)),
    }
}
