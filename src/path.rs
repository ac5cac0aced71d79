// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations of the dotfile repository, the stage, and the
//! configuration files that dotstage reads.

use std::path::PathBuf;

/// Relative path of tag configuration, from either `$HOME` or the top-level
/// of the dotfile repository.
pub const TAG_CONFIG_RELATIVE_PATH: &str = ".config/dotstage/tags.conf";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to dotfile repository.
///
/// Uses `~/repositories/dotfiles`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_repository_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join("repositories").join("dotfiles"))
}

/// Determine default absolute path to stage directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/dotstage/stage`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_stage_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("dotstage").join("stage"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to tag configuration file.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_tag_config_path() -> Result<PathBuf> {
    home_dir().map(|path| path.join(TAG_CONFIG_RELATIVE_PATH))
}

/// Determine absolute path to optional settings file.
///
/// Uses `$XDG_CONFIG_HOME/dotstage/settings.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn settings_file_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("dotstage").join("settings.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
