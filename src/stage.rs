// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stage management.
//!
//! Generic dotfiles live in the dotfile repository. Their specialized
//! renderings for the current host live in the __stage__, a plain directory
//! that mirrors the layout of the repository. Files on stage are symlinked into
//! the user's home directory, so editing `~/.bashrc` edits the staged file.
//!
//! ```text
//! repository/.bashrc  --specialize-->  stage/.bashrc  <--symlink--  ~/.bashrc
//! repository/.bashrc  <--generalize--  stage/.bashrc
//! ```
//!
//! # Atomicity
//!
//! Every transformation reads and filters the whole source file before the
//! destination is touched. A malformed file leaves its destination exactly as
//! it was.

use crate::{
    config::Settings,
    filter::{FilterError, Mode, TagFilter},
    tags::TagSet,
};

use ignore::WalkBuilder;
use mkdirp::mkdirp;
use std::{
    fs::{copy, read_to_string, remove_dir_all, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Outcome of a symlink request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// New symlink was created.
    Created,

    /// Something already exists at the link path, nothing was done.
    Exists,
}

/// Manage dotfiles between repository, stage, and home directory.
#[derive(Debug, Clone)]
pub struct Manager {
    settings: Settings,
    tags: TagSet,
    home: PathBuf,
}

impl Manager {
    /// Construct new manager.
    pub fn new(settings: Settings, tags: TagSet, home: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            tags,
            home: home.into(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Absolute path of dotfile in repository.
    pub fn repo_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.settings.repository.join(rel)
    }

    /// Absolute path of dotfile on stage.
    pub fn stage_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.settings.stage.join(rel)
    }

    /// Absolute path of dotfile in home directory.
    pub fn home_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.home.join(rel)
    }

    /// Specialize dotfile from repository onto stage.
    ///
    /// Comments out tag blocks that do not apply to the active tag set.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::Read`] if repository file cannot be read.
    /// - Return [`StageError::Filter`] if repository file is malformed.
    /// - Return [`StageError::Write`] if stage file cannot be written.
    #[instrument(skip(self, rel), fields(rel = %rel.as_ref().display()), level = "debug")]
    pub fn specialize(&self, rel: impl AsRef<Path>) -> Result<()> {
        info!("specialize {}", rel.as_ref().display());
        let content = self.render(Mode::Specialize, &self.repo_path(&rel))?;
        write_file(&self.stage_path(&rel), content)
    }

    /// Generalize dotfile from stage back into repository.
    ///
    /// Uncomments every tag block branch.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::NotManaged`] if dotfile is not on stage.
    /// - Return [`StageError::Filter`] if stage file is malformed.
    /// - Return [`StageError::Write`] if repository file cannot be written.
    #[instrument(skip(self, rel), fields(rel = %rel.as_ref().display()), level = "debug")]
    pub fn generalize(&self, rel: impl AsRef<Path>) -> Result<()> {
        info!("generalize {}", rel.as_ref().display());
        let staged = self.stage_path(&rel);
        if !staged.is_file() {
            return Err(StageError::NotManaged(rel.as_ref().to_path_buf()));
        }

        let content = self.render(Mode::Generalize, &staged)?;
        write_file(&self.repo_path(&rel), content)
    }

    /// Specialize every dotfile in repository.
    ///
    /// Skips the `.git` directory, the stage if it lives inside the
    /// repository, and the tag configuration in use. Returns the relative
    /// paths that were specialized.
    ///
    /// # Errors
    ///
    /// - Return [`StageError`] on the first file that fails.
    pub fn specialize_all(&self) -> Result<Vec<PathBuf>> {
        info!("specialize all dotfiles");
        let skip = vec![self.settings.stage.clone(), self.settings.tag_config.clone()];
        let files = walk_files(&self.settings.repository, skip)?;
        for rel in &files {
            self.specialize(rel)?;
        }

        Ok(files)
    }

    /// Generalize every dotfile on stage.
    ///
    /// # Errors
    ///
    /// - Return [`StageError`] on the first file that fails.
    pub fn generalize_all(&self) -> Result<Vec<PathBuf>> {
        info!("generalize all dotfiles");
        let files = self.staged_files()?;
        for rel in &files {
            self.generalize(rel)?;
        }

        Ok(files)
    }

    /// Symlink staged dotfile into home directory.
    ///
    /// Does nothing if anything already exists at the link path. Creates
    /// missing parent directories.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::Link`] if symlink cannot be created.
    pub fn link(&self, rel: impl AsRef<Path>) -> Result<LinkOutcome> {
        let link = self.home_path(&rel);
        let target = self.stage_path(&rel);
        if link.symlink_metadata().is_ok() {
            debug!("{:?} already exists", link.display());
            return Ok(LinkOutcome::Exists);
        }

        make_parent(&link)?;
        info!("create symlink {} -> {}", link.display(), target.display());
        symlink(&target, &link).map_err(|err| StageError::Link {
            source: err,
            link: link.clone(),
            target: target.clone(),
        })?;

        Ok(LinkOutcome::Created)
    }

    /// Symlink every staged dotfile into home directory.
    ///
    /// # Errors
    ///
    /// - Return [`StageError`] if stage cannot be walked or a link fails.
    pub fn link_all(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for rel in self.staged_files()? {
            if self.link(&rel)? == LinkOutcome::Created {
                created.push(rel);
            }
        }

        Ok(created)
    }

    /// Start managing dotfile from home directory.
    ///
    /// Moves the file onto stage, links it back into place, and writes its
    /// generic form into the repository. The file is validated first, so a
    /// malformed file is never moved.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::AlreadyLinked`] if home path is a symlink.
    /// - Return [`StageError::Filter`] if file is malformed.
    /// - Return [`StageError::Move`] if file cannot be moved onto stage.
    #[instrument(skip(self, rel), fields(rel = %rel.as_ref().display()), level = "debug")]
    pub fn add(&self, rel: impl AsRef<Path>) -> Result<()> {
        let home = self.home_path(&rel);
        let metadata = home.symlink_metadata().map_err(|err| StageError::Read {
            source: err,
            path: home.clone(),
        })?;
        if metadata.file_type().is_symlink() {
            return Err(StageError::AlreadyLinked(home));
        }

        let generic = self.render(Mode::Generalize, &home)?;
        let staged = self.stage_path(&rel);
        make_parent(&staged)?;
        info!("move {} => {}", home.display(), staged.display());
        move_file(&home, &staged)?;
        self.link(&rel)?;
        write_file(&self.repo_path(&rel), generic)
    }

    /// Stop managing dotfile on this host.
    ///
    /// Removes the symlink from the home directory and the file from stage.
    /// The generic file in the repository is kept. Missing pieces are
    /// reported as warnings.
    ///
    /// # Errors
    ///
    /// - Return [`StageError::Remove`] if an existing file cannot be removed.
    #[instrument(skip(self, rel), fields(rel = %rel.as_ref().display()), level = "debug")]
    pub fn remove(&self, rel: impl AsRef<Path>) -> Result<()> {
        info!("remove {} and its symlink", rel.as_ref().display());
        let link = self.home_path(&rel);
        match link.symlink_metadata() {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                remove_file(&link).map_err(|err| StageError::Remove {
                    source: err,
                    path: link.clone(),
                })?;
            }
            Ok(_) => warn!("{:?} is not a symlink, leaving it alone", link.display()),
            Err(_) => warn!("symlink for {:?} not found", rel.as_ref().display()),
        }

        let staged = self.stage_path(&rel);
        match remove_file(&staged) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("{:?} is not on stage", rel.as_ref().display());
            }
            Err(err) => {
                return Err(StageError::Remove {
                    source: err,
                    path: staged,
                })
            }
        }

        Ok(())
    }

    /// Remove every staged dotfile with its symlink, then the stage itself.
    ///
    /// # Errors
    ///
    /// - Return [`StageError`] if stage cannot be walked or cleared.
    pub fn clean(&self) -> Result<()> {
        let stage = &self.settings.stage;
        if !stage.exists() {
            warn!("stage {:?} does not exist", stage.display());
            return Ok(());
        }

        info!("clean stage {}", stage.display());
        for rel in self.staged_files()? {
            self.remove(rel)?;
        }

        remove_dir_all(stage).map_err(|err| StageError::Remove {
            source: err,
            path: stage.clone(),
        })
    }

    /// Relative paths of every file on stage, empty if stage does not exist.
    fn staged_files(&self) -> Result<Vec<PathBuf>> {
        let stage = &self.settings.stage;
        if !stage.exists() {
            warn!("stage {:?} does not exist", stage.display());
            return Ok(Vec::new());
        }

        walk_files(stage, Vec::new())
    }

    fn render(&self, mode: Mode, source: &Path) -> Result<String> {
        let content = read_to_string(source).map_err(|err| StageError::Read {
            source: err,
            path: source.to_path_buf(),
        })?;

        let lines = split_lines(&content);
        let filtered = TagFilter::new(&self.tags)
            .apply(mode, lines.iter().map(|(body, _)| *body))
            .map_err(|err| StageError::Filter {
                source: err,
                path: source.to_path_buf(),
            })?;

        Ok(join_lines(filtered, lines.iter().map(|(_, ending)| *ending)))
    }
}

/// Split text into line bodies paired with their own terminators.
///
/// The last line has an empty terminator if the text does not end with a
/// newline.
fn split_lines(text: &str) -> Vec<(&str, &str)> {
    text.split_inclusive('\n')
        .map(|line| {
            let body = line
                .strip_suffix("\r\n")
                .or_else(|| line.strip_suffix('\n'))
                .unwrap_or(line);
            (body, &line[body.len()..])
        })
        .collect()
}

/// Re-attach original terminators to filtered lines.
fn join_lines<'a>(lines: Vec<String>, endings: impl Iterator<Item = &'a str>) -> String {
    lines
        .into_iter()
        .zip(endings)
        .map(|(line, ending)| line + ending)
        .collect()
}

fn walk_files(root: &Path, skip: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.file_name() != ".git" && !skip.iter().any(|path| path == entry.path())
        })
        .build();

    for entry in walker {
        let entry = entry.map_err(|err| StageError::Walk {
            source: err,
            path: root.to_path_buf(),
        })?;

        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn write_file(path: &Path, content: String) -> Result<()> {
    make_parent(path)?;
    write(path, content).map_err(|err| StageError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

fn make_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp(parent).map_err(|err| StageError::Write {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    let moved = rename(from, to).or_else(|err| {
        // INVARIANT: Fall back to copy and delete across file systems.
        debug!("rename failed ({err}), copy instead");
        copy(from, to).and_then(|_| remove_file(from))
    });

    moved.map_err(|err| StageError::Move {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Stage management error types.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Dotfile contains malformed tag blocks.
    #[error("malformed tag blocks in {:?}", path.display())]
    Filter {
        #[source]
        source: FilterError,
        path: PathBuf,
    },

    /// Dotfile cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Dotfile or its parent directory cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to create symlink {:?} -> {:?}", link.display(), target.display())]
    Link {
        #[source]
        source: std::io::Error,
        link: PathBuf,
        target: PathBuf,
    },

    /// Dotfile cannot be moved onto stage.
    #[error("failed to move {:?} to {:?}", from.display(), to.display())]
    Move {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Dotfile, symlink, or stage cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory cannot be walked.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: ignore::Error,
        path: PathBuf,
    },

    /// Dotfile is not on stage.
    #[error("{:?} is not on stage, add it with `dotstage add` first", .0.display())]
    NotManaged(PathBuf),

    /// Dotfile in home directory is already a symlink.
    #[error("{:?} is already a symlink", .0.display())]
    AlreadyLinked(PathBuf),
}

/// Friendly result alias :3
type Result<T, E = StageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("#a\nb\n", vec![("#a", "\n"), ("b", "\n")]; "trailing newline")]
    #[test_case("#a\nb", vec![("#a", "\n"), ("b", "")]; "no trailing newline")]
    #[test_case("#a\r\nb\r\n", vec![("#a", "\r\n"), ("b", "\r\n")]; "crlf")]
    #[test_case("#a\r\nb\nc\r\n", vec![("#a", "\r\n"), ("b", "\n"), ("c", "\r\n")]; "mixed")]
    #[test_case("#a\n\n", vec![("#a", "\n"), ("", "\n")]; "blank last line")]
    #[test_case("", vec![]; "empty")]
    #[test]
    fn split_lines_keeps_own_terminators(text: &str, expect: Vec<(&str, &str)>) {
        use pretty_assertions::assert_eq;
        assert_eq!(split_lines(text), expect);
    }

    #[test]
    fn join_lines_restores_text() {
        let text = "#a\r\nb\nc";
        let lines = split_lines(text);
        let bodies = lines.iter().map(|(body, _)| body.to_string()).collect();
        assert_eq!(join_lines(bodies, lines.iter().map(|(_, ending)| *ending)), text);
    }
}
