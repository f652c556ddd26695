//! Cross-platform path utilities for speechport.
//!
//! Single source of truth for where the exporter looks for its configuration
//! file and where downloaded models are cached.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/speechport` | `~/.config/speechport` |
//! | macOS    | `~/Library/Application Support/speechport` | Same as data dir |
//! | Windows  | `%APPDATA%/speechport` | Same as data dir |

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

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Application identifier used in path construction.
const APP_NAME: &str = "speechport";

/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Subdirectory of the output directory that receives the graph.
pub const ARTIFACT_SUBDIR: &str = "onnx";

/// File name of the published graph.
pub const ARTIFACT_FILE_NAME: &str = "model.onnx";

/// Create `dir` (and parents) if missing, owner-only on Unix.
///
/// # Errors
/// Returns an error if the path exists but is not a directory, or if it
/// cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(PathError::NotADirectory(dir.to_path_buf()).into());
        }
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

/// Get the application data directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory without creating it.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/speechport`
/// - **macOS/Windows**: config lives with data
pub fn config_dir_path() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        Ok(config_base.join(APP_NAME))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
        Ok(base_dir.join(APP_NAME))
    }
}

/// Default location of the TOML configuration file.
///
/// The file is optional; callers fall back to defaults when it is absent.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir_path()?.join(CONFIG_FILE_NAME))
}

/// Get the models cache directory (`<data_dir>/models`), creating it if needed.
pub fn get_models_dir() -> Result<PathBuf> {
    let models_dir = get_data_dir()?.join("models");
    ensure_dir(&models_dir)?;
    Ok(models_dir)
}

/// Path the graph artifact is published to: `<output_dir>/onnx/model.onnx`.
pub fn artifact_path(output_dir: &Path) -> PathBuf {
    output_dir.join(ARTIFACT_SUBDIR).join(ARTIFACT_FILE_NAME)
}
