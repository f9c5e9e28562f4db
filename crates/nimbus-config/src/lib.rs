//! Region file discovery and loading
//!
//! A region file lists the provider regions a caller operates in, with their
//! credentials, rate limits and poll budgets. See [`regions`] for the format.

pub mod error;
pub mod regions;

pub use error::*;
pub use regions::{DEFAULT_ACCESS_KEY_ENV, DEFAULT_SECRET_KEY_ENV, RegionEntry, RegionFile};

use nimbus_cloud::RegionContext;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "NIMBUS_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "nimbus.local.yaml",
    ".nimbus.local.yaml",
    "nimbus.yaml",
    ".nimbus.yaml",
];

/// Global region file location (`~/.config/nimbus/nimbus.yaml`)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nimbus").join("nimbus.yaml"))
}

/// Locate the region file
///
/// Search order:
/// 1. `NIMBUS_CONFIG_PATH`
/// 2. current directory: nimbus.local.yaml, .nimbus.local.yaml, nimbus.yaml, .nimbus.yaml
/// 3. `./.nimbus/` with the same candidates
/// 4. `~/.config/nimbus/nimbus.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;

    if let Some(path) = first_candidate(&current_dir) {
        return Ok(path);
    }

    let nimbus_dir = current_dir.join(".nimbus");
    if nimbus_dir.is_dir()
        && let Some(path) = first_candidate(&nimbus_dir)
    {
        return Ok(path);
    }

    if let Some(global) = global_config_path()
        && global.exists()
    {
        return Ok(global);
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn first_candidate(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Load and resolve every region in the file at `path`
pub fn load_regions_from(path: &Path) -> Result<Vec<RegionContext>> {
    let regions = RegionFile::from_path(path)?.resolve()?;
    tracing::debug!(path = %path.display(), count = regions.len(), "loaded regions");
    Ok(regions)
}

/// Discover the region file and load it
pub fn load_regions() -> Result<Vec<RegionContext>> {
    load_regions_from(&find_config_file()?)
}
