//! XDG directory lookup for the engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use xdg::BaseDirectories;

const APP_NAME: &str = "scriptgrab";

fn base_dirs() -> BaseDirectories {
    BaseDirectories::with_prefix(APP_NAME)
}

/// Return the XDG config directory (no creation - config may not exist).
/// `~/.config/scriptgrab/`
pub fn config_dir() -> Result<PathBuf> {
    base_dirs()
        .get_config_home()
        .context("Could not determine config directory (HOME not set?)")
}

/// Return the XDG data directory (created on first model download).
/// `~/.local/share/scriptgrab/`
pub fn data_dir() -> Result<PathBuf> {
    base_dirs()
        .get_data_home()
        .context("Could not determine data directory (HOME not set?)")
}
