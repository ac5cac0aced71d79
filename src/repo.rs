// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile repository.
//!
//! The dotfile repository is an ordinary Git repository holding the generic
//! form of every managed dotfile, along with the tag configuration that maps
//! hosts to tags. Generalizing a dotfile writes into the repository's working
//! tree, and these helpers turn such writes into commits.
//!
//! Synchronization with a remote is simple. Pulling only ever
//! fast-forwards, and pushing only ever pushes the current branch. Anything
//! that needs conflict resolution is left to the user through the Git
//! passthrough.

use crate::tags::TagConfig;

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, FetchOptions, Index, Oid, PushOptions, RemoteCallbacks, Repository, Signature,
    StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use mkdirp::mkdirp;
use std::{
    ffi::OsString,
    fs::write,
    path::{Path, PathBuf},
    process::Command,
    time,
};
use tracing::{debug, info, instrument};

const REMOTE: &str = "origin";

/// Git repository holding generic dotfiles.
pub struct DotfileRepo {
    repository: Repository,
}

impl std::fmt::Debug for DotfileRepo {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("DotfileRepo")
            .field("path", &self.repository.path())
            .finish()
    }
}

impl DotfileRepo {
    /// Initialize dotfile repository.
    ///
    /// Creates the repository if needed. If the tag configuration does not
    /// exist yet, writes an initial one that gives the host a tag named after
    /// itself, and commits it.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    /// - Return [`RepoError::Write`] if tag configuration cannot be written.
    #[instrument(skip(path, tag_config, host), level = "debug")]
    pub fn init(
        path: impl AsRef<Path>,
        tag_config: impl AsRef<Path>,
        host: impl AsRef<str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let repository = match Repository::open(path) {
            Ok(repository) => repository,
            Err(_) => {
                info!("initialize repository in {}", path.display());
                Repository::init(path)?
            }
        };
        let repo = Self { repository };

        let full_path = path.join(&tag_config);
        if !full_path.is_file() {
            info!("create initial tag configuration");
            if let Some(parent) = full_path.parent() {
                mkdirp(parent).map_err(|err| RepoError::Write {
                    source: err,
                    path: parent.to_path_buf(),
                })?;
            }
            write(&full_path, TagConfig::initial(host)).map_err(|err| RepoError::Write {
                source: err,
                path: full_path.clone(),
            })?;
            repo.add(tag_config)?;
        }

        Ok(repo)
    }

    /// Open existing dotfile repository.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NotARepository`] if path holds no repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("open repository {:?}", path.as_ref().display());
        let repository = Repository::open(path.as_ref()).map_err(|err| RepoError::NotARepository {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        Ok(Self { repository })
    }

    /// Clone dotfile repository from remote.
    ///
    /// The progress of the clone is displayed through a progress bar. If
    /// credentials are required, the user is prompted for them with the
    /// progress bar suspended.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    /// - Return [`RepoError::IndicatifStyleTemplate`] if progress bar style
    ///   is invalid.
    pub fn try_clone(
        url: impl AsRef<str>,
        path: impl AsRef<Path>,
        bar: ProgressBar,
    ) -> Result<Self> {
        info!("clone {} into {}", url.as_ref(), path.as_ref().display());
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.as_ref().to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let repository = RepoBuilder::new()
            .fetch_options(fo)
            .clone(url.as_ref(), path.as_ref())?;
        prompter.bar.finish_and_clear();

        Ok(Self { repository })
    }

    /// Absolute path to working tree.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Bare`] if repository has no working tree.
    pub fn workdir(&self) -> Result<&Path> {
        self.repository
            .workdir()
            .ok_or_else(|| RepoError::Bare(self.repository.path().to_path_buf()))
    }

    /// Commit new dotfile.
    ///
    /// Returns `false` without committing if the dotfile is already tracked.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    pub fn add(&self, rel: impl AsRef<Path>) -> Result<bool> {
        let rel = rel.as_ref();
        if self.repository.index()?.get_path(rel, 0).is_some() {
            debug!("{} is already tracked, skip commit", rel.display());
            return Ok(false);
        }

        info!("commit {}", rel.display());
        self.commit_path(rel, &format!("Add {}", rel.display()))?;
        Ok(true)
    }

    /// Commit changes to dotfile.
    ///
    /// Uses `Update <path>` unless a message is given. Returns `false`
    /// without committing if the dotfile has not changed.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    pub fn update(&self, rel: impl AsRef<Path>, message: Option<&str>) -> Result<bool> {
        let rel = rel.as_ref();
        if self.repository.status_file(rel)?.is_empty() {
            debug!("{} has not changed, skip commit", rel.display());
            return Ok(false);
        }

        info!("commit {}", rel.display());
        let message = match message {
            Some(message) => message.to_string(),
            None => format!("Update {}", rel.display()),
        };
        self.commit_path(rel, &message)?;
        Ok(true)
    }

    /// Commit removal of dotfile.
    ///
    /// The dotfile is untracked, but left in the working tree. Returns `false`
    /// without committing if the dotfile was never tracked.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    pub fn remove(&self, rel: impl AsRef<Path>) -> Result<bool> {
        let rel = rel.as_ref();
        let mut index = self.repository.index()?;
        if index.get_path(rel, 0).is_none() {
            debug!("{} is not tracked, skip commit", rel.display());
            return Ok(false);
        }

        info!("commit removal of {}", rel.display());
        index.remove_path(rel)?;
        index.write()?;
        self.commit_index(&mut index, &format!("Remove {}", rel.display()))?;

        Ok(true)
    }

    /// Fast-forward current branch from remote.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::RemoteSyncFailed`] if fetch fails, if the
    ///   branches have diverged, or if tracked files have uncommitted changes.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self) -> Result<()> {
        let branch = self.current_branch()?;
        info!("pull {branch} from {REMOTE}");

        let authenticator = GitAuthenticator::default().set_prompter(IndicatifPrompter::hidden());
        let config = Config::open_default()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);

        let mut remote = self.repository.find_remote(REMOTE)?;
        remote
            .fetch(&[branch.as_str()], Some(&mut fo), None)
            .map_err(|err| RepoError::RemoteSyncFailed(err.message().to_string()))?;

        let fetch_head = self.repository.find_reference("FETCH_HEAD")?;
        let fetched = self.repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repository.merge_analysis(&[&fetched])?;

        if analysis.is_up_to_date() {
            info!("already up to date");
            return Ok(());
        }

        if !analysis.is_fast_forward() {
            return Err(RepoError::RemoteSyncFailed(format!(
                "{branch} has diverged from {REMOTE}/{branch}, cannot fast-forward"
            )));
        }

        let dirty = self.dirty_paths()?;
        if !dirty.is_empty() {
            return Err(RepoError::RemoteSyncFailed(format!(
                "uncommitted changes would be overwritten: {}",
                dirty.join(", ")
            )));
        }

        // INVARIANT: Update working tree before moving the branch.
        let target = self.repository.find_commit(fetched.id())?;
        self.repository
            .checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;

        let refname = format!("refs/heads/{branch}");
        let mut reference = self.repository.find_reference(&refname)?;
        reference.set_target(fetched.id(), "pull: fast-forward")?;
        self.repository.set_head(&refname)?;

        Ok(())
    }

    /// Push current branch to remote.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::RemoteSyncFailed`] if the remote rejects the
    ///   push.
    #[instrument(skip(self), level = "debug")]
    pub fn push(&self) -> Result<()> {
        let branch = self.current_branch()?;
        info!("push {branch} to {REMOTE}");

        let authenticator = GitAuthenticator::default().set_prompter(IndicatifPrompter::hidden());
        let config = Config::open_default()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.push_update_reference(|refname, status| match status {
            Some(message) => Err(git2::Error::from_str(&format!(
                "{refname} rejected: {message}"
            ))),
            None => Ok(()),
        });
        let mut po = PushOptions::new();
        po.remote_callbacks(rc);

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let mut remote = self.repository.find_remote(REMOTE)?;
        remote
            .push(&[refspec.as_str()], Some(&mut po))
            .map_err(|err| RepoError::RemoteSyncFailed(err.message().to_string()))?;

        Ok(())
    }

    /// Run Git binary inside the working tree.
    ///
    /// Blocks until Git exits. Standard streams are inherited, so Git can
    /// interact with the user directly.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Syscall`] if Git cannot be run, or exits with
    ///   failure.
    pub fn gitcall(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Result<()> {
        let args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
        debug!("execute git {args:?}");
        let status = Command::new("git")
            .arg("-C")
            .arg(self.workdir()?)
            .args(&args)
            .spawn()?
            .wait()?;

        if !status.success() {
            return Err(RepoError::Syscall(std::io::Error::other(format!(
                "git {args:?} failed with {status}"
            ))));
        }

        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repository.head()?;
        if !head.is_branch() {
            return Err(RepoError::DetachedHead);
        }

        head.shorthand()
            .map(str::to_string)
            .ok_or(RepoError::DetachedHead)
    }

    /// Tracked paths with staged or unstaged modifications.
    fn dirty_paths(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.repository.statuses(Some(&mut opts))?;

        Ok(statuses
            .iter()
            .filter(|entry| !entry.status().is_empty())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect())
    }

    fn commit_path(&self, rel: &Path, message: &str) -> Result<Oid> {
        let mut index = self.repository.index()?;
        index.add_path(rel)?;
        index.write()?;
        self.commit_index(&mut index, message)
    }

    fn commit_index(&self, index: &mut Index, message: &str) -> Result<Oid> {
        // INVARIANT: Always use new tree produced by index after staging.
        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;

        // INVARIANT: Always append to current HEAD if it exists.
        let signature = self.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repository.head().ok().and_then(|head| head.target()) {
            parents.push(self.repository.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        Ok(self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?)
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repository.signature() {
            Ok(signature) => Ok(signature),
            Err(_) => {
                debug!("no git identity configured, use fallback signature");
                Ok(Signature::now("dotstage", "dotstage@localhost")?)
            }
        }
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Construct authenticator without visible progress.
    pub fn hidden() -> Self {
        Self::new(ProgressBar::hidden())
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Dotfile repository error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Path does not hold a Git repository.
    #[error("{:?} is not a git repository, run `dotstage init` to create it", path.display())]
    NotARepository {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Repository has no working tree.
    #[error("repository {:?} is bare", .0.display())]
    Bare(PathBuf),

    /// HEAD does not point to a branch.
    #[error("HEAD is not on a branch")]
    DetachedHead,

    /// Pull or push could not complete.
    #[error("failed to sync with remote: {0}")]
    RemoteSyncFailed(String),

    /// File in working tree cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = RepoError> = std::result::Result<T, E>;
