//! Cross-platform path utilities for GridWatch.
//!
//! Single source of truth for where GridWatch keeps its logs and its
//! configuration file.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/gridwatch` | `~/.config/gridwatch` |
//! | macOS    | `~/Library/Application Support/gridwatch` | Same as data dir |
//! | Windows  | `%APPDATA%/gridwatch` | Same as data dir |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "gridwatch";

/// Raw sensor readings, one JSON object per line.
const INPUT_LOG_NAME: &str = "input.jsonl";

/// Classified events, one JSON object per line.
const EVENT_LOG_NAME: &str = "events.jsonl";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Create `dir` (and its parents) if missing.
///
/// On Unix a freshly created directory gets mode 0o700.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Create the parent directory of `path` if missing.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Get the application data directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = data_dir_path()?;
    ensure_dir(&data_dir)?;
    Ok(data_dir)
}

/// Where the application data directory lives, without touching the
/// filesystem.
pub fn data_dir_path() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    Ok(base_dir.join(APP_NAME))
}

/// Get the configuration directory, creating it if needed.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/gridwatch`
/// - **macOS/Windows**: config lives with data
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Default location of `config.toml`.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Default location of the raw sensor input log.
///
/// The directory is created by whichever stage first writes the log.
pub fn get_input_log_path() -> Result<PathBuf> {
    Ok(data_dir_path()?.join(INPUT_LOG_NAME))
}

/// Default location of the classified event log.
pub fn get_event_log_path() -> Result<PathBuf> {
    Ok(data_dir_path()?.join(EVENT_LOG_NAME))
}
