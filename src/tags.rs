// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host tag configuration.
//!
//! Each host selects the tag blocks that apply to it through a set of tags.
//! The mapping from host name to tags lives in a plain text file with one
//! host per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! laptop: work gui
//! server: headless
//! ```

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Set of tags enabled for a host.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    /// Construct new tag set.
    pub fn new(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(tags.into_iter().map(Into::into).collect())
    }

    /// Check if tag set contains target tag.
    pub fn contains(&self, tag: impl AsRef<str>) -> bool {
        self.0.contains(tag.as_ref())
    }

    /// Check if any of the given tags is in the set.
    pub fn intersects(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.0.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Display for TagSet {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.iter().collect::<Vec<_>>().join(" "))
    }
}

/// Parsed tag configuration file.
///
/// Entries keep file order. When a host is listed twice, the first entry
/// wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagConfig {
    hosts: Vec<(String, TagSet)>,
}

impl TagConfig {
    /// Load tag configuration from file.
    ///
    /// # Errors
    ///
    /// - Return [`TagConfigError::Read`] if file cannot be read.
    /// - Return [`TagConfigError::Malformed`] if a line cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load tag configuration from {:?}", path.display());
        let content = read_to_string(path).map_err(|err| TagConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        content.parse()
    }

    /// Initial tag configuration for a fresh repository.
    ///
    /// Gives the host a single tag named after itself. Starts with a comment
    /// so the file can itself be specialized like any other dotfile.
    pub fn initial(host: impl AsRef<str>) -> String {
        format!("# hostname: tag tag ...\n{0}: {0}\n", host.as_ref())
    }

    /// Lookup tags for target host.
    ///
    /// # Errors
    ///
    /// - Return [`TagConfigError::UnknownHost`] if host has no entry.
    pub fn tags_for(&self, host: impl AsRef<str>) -> Result<TagSet> {
        let host = host.as_ref();
        let tags = self
            .hosts
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, tags)| tags.clone())
            .ok_or_else(|| TagConfigError::UnknownHost(host.to_string()))?;
        debug!("found tags for {host}: {tags}");

        Ok(tags)
    }

    /// List configured host names in file order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|(name, _)| name.as_str())
    }
}

impl FromStr for TagConfig {
    type Err = TagConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut hosts: Vec<(String, TagSet)> = Vec::new();
        for (index, line) in data.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let malformed = || TagConfigError::Malformed {
                line: index + 1,
                content: line.to_string(),
            };
            let (host, tags) = trimmed.split_once(':').ok_or_else(malformed)?;
            let host = host.trim();
            if host.is_empty() || host.contains(char::is_whitespace) {
                return Err(malformed());
            }

            if hosts.iter().any(|(name, _)| name == host) {
                debug!("ignore duplicate entry for {host} at line {}", index + 1);
                continue;
            }

            hosts.push((host.to_string(), TagSet::new(tags.split_whitespace())));
        }

        Ok(Self { hosts })
    }
}

/// Determine host name of current machine.
///
/// # Errors
///
/// - Return [`TagConfigError::Hostname`] if host name is not valid UTF-8.
pub fn local_hostname() -> Result<String> {
    gethostname::gethostname()
        .into_string()
        .map_err(TagConfigError::Hostname)
}

/// Tag configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum TagConfigError {
    /// Tag configuration file cannot be read.
    #[error("failed to read tag configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Line does not follow `hostname: tag tag ...` layout.
    #[error("malformed tag configuration at line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    /// No entry exists for host.
    #[error("no tags configured for host {0:?}")]
    UnknownHost(String),

    /// Host name cannot be represented as UTF-8.
    #[error("host name {0:?} is not valid UTF-8")]
    Hostname(std::ffi::OsString),
}

/// Friendly result alias :3
type Result<T, E = TagConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_tag_configuration() -> anyhow::Result<()> {
        let config: TagConfig = indoc! {r#"
            # machines
            laptop: work gui

            server:headless
            bare:
            laptop: ignored
        "#}
        .parse()?;

        assert_eq!(config.hosts().collect::<Vec<_>>(), vec!["laptop", "server", "bare"]);
        assert_eq!(config.tags_for("laptop")?, TagSet::new(["gui", "work"]));
        assert_eq!(config.tags_for("server")?, TagSet::new(["headless"]));
        assert!(config.tags_for("bare")?.is_empty());

        Ok(())
    }

    #[test]
    fn unknown_host() -> anyhow::Result<()> {
        let config: TagConfig = "laptop: work".parse()?;
        let result = config.tags_for("desktop");
        assert!(matches!(result, Err(TagConfigError::UnknownHost(host)) if host == "desktop"));

        Ok(())
    }

    #[test]
    fn malformed_lines() {
        let result = "laptop: work\nno colon here\n".parse::<TagConfig>();
        assert!(matches!(result, Err(TagConfigError::Malformed { line: 2, .. })));

        let result = ": orphan".parse::<TagConfig>();
        assert!(matches!(result, Err(TagConfigError::Malformed { line: 1, .. })));

        let result = "two words: tag".parse::<TagConfig>();
        assert!(matches!(result, Err(TagConfigError::Malformed { line: 1, .. })));
    }

    #[test]
    fn initial_configuration_round_trips() -> anyhow::Result<()> {
        let config: TagConfig = TagConfig::initial("box").parse()?;
        assert_eq!(config.tags_for("box")?, TagSet::new(["box"]));

        Ok(())
    }

    #[test]
    fn tag_set_display_is_sorted() {
        let tags = TagSet::new(["work", "gui", "work"]);
        assert_eq!(tags.to_string(), "gui work");
        assert!(tags.contains("gui"));
        assert!(tags.intersects(&["nope".into(), "work".into()]));
        assert!(!tags.intersects(&[]));
    }
}
