// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! All paths dotstage works with are resolved once at startup into a
//! [`Settings`] value that is handed to every collaborator. Sources are
//! applied in the following order, later sources winning:
//!
//! 1. Built-in defaults, see [`crate::path`].
//! 2. Optional settings file at `$XDG_CONFIG_HOME/dotstage/settings.toml`.
//! 3. Environment variables `DOTSTAGE_REPO`, `DOTSTAGE_STAGE`, and
//!    `DOTSTAGE_TAG_CONF`.
//! 4. Command line overrides.

use crate::path::{
    default_repository_dir, default_stage_dir, default_tag_config_path, settings_file_path,
    NoWayHome, TAG_CONFIG_RELATIVE_PATH,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Environment variable overriding dotfile repository path.
pub const REPO_ENV: &str = "DOTSTAGE_REPO";

/// Environment variable overriding stage path.
pub const STAGE_ENV: &str = "DOTSTAGE_STAGE";

/// Environment variable overriding tag configuration path.
pub const TAG_CONF_ENV: &str = "DOTSTAGE_TAG_CONF";

/// Settings file layout.
///
/// Every key is optional. Values go through shell expansion, so `~` and
/// `$VAR` can be used.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SettingsFile {
    /// Path to dotfile repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,

    /// Path to stage directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PathBuf>,

    /// Path to tag configuration file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_config: Option<PathBuf>,
}

impl SettingsFile {
    /// Load settings file if it exists.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if existing file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings file at {:?}", path.display());
            return Ok(None);
        }

        debug!("load settings from {:?}", path.display());
        let content = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        content.parse().map(Some)
    }
}

impl FromStr for SettingsFile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let file: SettingsFile = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        Ok(Self {
            repository: file.repository.map(expand_path).transpose()?,
            stage: file.stage.map(expand_path).transpose()?,
            tag_config: file.tag_config.map(expand_path).transpose()?,
        })
    }
}

impl Display for SettingsFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Command line overrides of settings.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Overrides {
    pub repository: Option<PathBuf>,
    pub stage: Option<PathBuf>,
    pub tag_config: Option<PathBuf>,

    /// Read tag configuration from dotfile repository instead of `$HOME`.
    pub bootstrap: bool,
}

/// Resolved path settings.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// Dotfile repository holding generic dotfiles.
    pub repository: PathBuf,

    /// Stage directory holding specialized dotfiles of this host.
    pub stage: PathBuf,

    /// Tag configuration file.
    pub tag_config: PathBuf,
}

impl Settings {
    /// Built-in default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if home directory cannot be
    ///   determined.
    pub fn defaults() -> Result<Self> {
        Ok(Self {
            repository: default_repository_dir()?,
            stage: default_stage_dir()?,
            tag_config: default_tag_config_path()?,
        })
    }

    /// Resolve settings from every source.
    ///
    /// Reads the settings file at its default location if present.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if any source cannot be read or expanded.
    pub fn load(overrides: Overrides) -> Result<Self> {
        let file = SettingsFile::load(settings_file_path()?)?;
        Self::resolve(file, overrides)
    }

    /// Resolve settings from defaults, given settings file, environment, and
    /// command line overrides.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if a source cannot be expanded.
    pub fn resolve(file: Option<SettingsFile>, overrides: Overrides) -> Result<Self> {
        let mut settings = Self::defaults()?;

        if let Some(file) = file {
            settings.apply(file.repository, file.stage, file.tag_config);
        }

        settings.apply(
            env_path(REPO_ENV)?,
            env_path(STAGE_ENV)?,
            env_path(TAG_CONF_ENV)?,
        );

        settings.apply(overrides.repository, overrides.stage, overrides.tag_config);
        if overrides.bootstrap {
            settings.tag_config = settings.repository_tag_config();
        }

        debug!("using dotfile repository at {:?}", settings.repository.display());
        debug!("using stage at {:?}", settings.stage.display());
        debug!("using tag configuration at {:?}", settings.tag_config.display());

        Ok(settings)
    }

    /// Path to tag configuration tracked inside dotfile repository.
    pub fn repository_tag_config(&self) -> PathBuf {
        self.repository.join(TAG_CONFIG_RELATIVE_PATH)
    }

    fn apply(
        &mut self,
        repository: Option<PathBuf>,
        stage: Option<PathBuf>,
        tag_config: Option<PathBuf>,
    ) {
        if let Some(repository) = repository {
            self.repository = repository;
        }

        if let Some(stage) = stage {
            self.stage = stage;
        }

        if let Some(tag_config) = tag_config {
            self.tag_config = tag_config;
        }
    }
}

fn env_path(key: &str) -> Result<Option<PathBuf>> {
    match std::env::var_os(key) {
        Some(value) if !value.is_empty() => expand_path(PathBuf::from(value)).map(Some),
        _ => Ok(None),
    }
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned();

    Ok(PathBuf::from(expanded))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file cannot be read.
    #[error("failed to read settings file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Default paths cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah/blah")])]
    fn deserialize_settings_file() -> anyhow::Result<()> {
        let result: SettingsFile = indoc! {r#"
            repository = "$BLAH/dotfiles"
            tag_config = "/etc/tags.conf"
        "#}
        .parse()?;

        let expect = SettingsFile {
            repository: Some("/home/blah/blah/dotfiles".into()),
            stage: None,
            tag_config: Some("/etc/tags.conf".into()),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_settings_file() {
        let result = SettingsFile {
            repository: Some("/srv/dotfiles".into()),
            stage: Some("/srv/stage".into()),
            tag_config: None,
        }
        .to_string();

        let expect = indoc! {r#"
            repository = "/srv/dotfiles"
            stage = "/srv/stage"
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn reject_unknown_value_types() {
        let result = "repository = 42".parse::<SettingsFile>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[sealed_test(env = [("HOME", "/home/user"), ("XDG_DATA_HOME", "/home/user/.local/share")])]
    fn defaults_without_overrides() -> anyhow::Result<()> {
        let result = Settings::resolve(None, Overrides::default())?;
        let expect = Settings {
            repository: "/home/user/repositories/dotfiles".into(),
            stage: "/home/user/.local/share/dotstage/stage".into(),
            tag_config: "/home/user/.config/dotstage/tags.conf".into(),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [
        ("HOME", "/home/user"),
        ("XDG_DATA_HOME", "/home/user/.local/share"),
        ("DOTSTAGE_STAGE", "~/stage"),
        ("DOTSTAGE_TAG_CONF", "/etc/dotstage/tags.conf")
    ])]
    fn environment_beats_settings_file() -> anyhow::Result<()> {
        let file = SettingsFile {
            repository: Some("/srv/dotfiles".into()),
            stage: Some("/srv/stage".into()),
            tag_config: None,
        };
        let result = Settings::resolve(Some(file), Overrides::default())?;
        let expect = Settings {
            repository: "/srv/dotfiles".into(),
            stage: "/home/user/stage".into(),
            tag_config: "/etc/dotstage/tags.conf".into(),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [
        ("HOME", "/home/user"),
        ("XDG_DATA_HOME", "/home/user/.local/share"),
        ("DOTSTAGE_REPO", "/env/dotfiles"),
        ("DOTSTAGE_TAG_CONF", "/env/tags.conf")
    ])]
    fn command_line_and_bootstrap_win() -> anyhow::Result<()> {
        let overrides = Overrides {
            repository: Some("/cli/dotfiles".into()),
            bootstrap: true,
            ..Default::default()
        };
        let result = Settings::resolve(None, overrides)?;
        assert_eq!(result.repository, PathBuf::from("/cli/dotfiles"));
        assert_eq!(
            result.tag_config,
            PathBuf::from("/cli/dotfiles/.config/dotstage/tags.conf")
        );

        Ok(())
    }
}
