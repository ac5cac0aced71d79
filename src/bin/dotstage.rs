// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstage::{
    config::{Overrides, Settings},
    path::{home_dir, TAG_CONFIG_RELATIVE_PATH},
    repo::DotfileRepo,
    stage::{LinkOutcome, Manager},
    tags::{local_hostname, TagConfig},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::{ffi::OsString, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  dotstage [options] <dotstage-command>\n  dotstage [options] <git-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let global = self.global;
        match self.command {
            Command::Specialize(opts) => run_specialize(&global, opts),
            Command::Generalize(opts) => run_generalize(&global, opts),
            Command::Link(opts) => run_link(&global, opts),
            Command::Add(opts) => run_add(&global, opts),
            Command::Remove(opts) => run_remove(&global, opts),
            Command::Clean => run_clean(&global),
            Command::Init => run_init(&global),
            Command::Clone(opts) => run_clone(&global, opts),
            Command::Pull(opts) => run_pull(&global, opts),
            Command::Push => run_push(&global),
            Command::Git(opts) => run_git(&global, opts),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct GlobalOptions {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read tag configuration from the dotfile repository instead of $HOME.
    #[arg(short, long, global = true)]
    pub bootstrap: bool,

    /// Path to dotfile repository [env: DOTSTAGE_REPO].
    #[arg(long, global = true, value_name = "path")]
    pub repository: Option<PathBuf>,

    /// Path to stage directory [env: DOTSTAGE_STAGE].
    #[arg(long, global = true, value_name = "path")]
    pub stage: Option<PathBuf>,

    /// Path to tag configuration [env: DOTSTAGE_TAG_CONF].
    #[arg(long, global = true, value_name = "path")]
    pub tag_config: Option<PathBuf>,

    /// Host name to select tags for instead of this machine's.
    #[arg(long, global = true, value_name = "hostname")]
    pub host: Option<String>,
}

impl GlobalOptions {
    fn settings(&self) -> Result<Settings> {
        Ok(Settings::load(Overrides {
            repository: self.repository.clone(),
            stage: self.stage.clone(),
            tag_config: self.tag_config.clone(),
            bootstrap: self.bootstrap,
        })?)
    }

    fn host(&self) -> Result<String> {
        match &self.host {
            Some(host) => Ok(host.clone()),
            None => Ok(local_hostname()?),
        }
    }

    fn manager(&self) -> Result<Manager> {
        let settings = self.settings()?;
        if !settings.repository.exists() {
            bail!(
                "dotfile repository {:?} does not exist, run `dotstage init` or `dotstage clone`",
                settings.repository.display()
            );
        }

        let tags = TagConfig::load(&settings.tag_config)
            .with_context(|| {
                format!(
                    "use --bootstrap to read {TAG_CONFIG_RELATIVE_PATH} from the dotfile \
                     repository, or set DOTSTAGE_TAG_CONF to override the default path"
                )
            })?
            .tags_for(self.host()?)?;
        info!("using tags: {tags}");

        Ok(Manager::new(settings, tags, home_dir()?))
    }

    fn repo(&self) -> Result<DotfileRepo> {
        Ok(DotfileRepo::open(self.settings()?.repository)?)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Specialize dotfiles from the repository onto the stage.
    #[command(override_usage = "dotstage specialize [options] (<file>... | --all)")]
    Specialize(SpecializeOptions),

    /// Generalize dotfiles from the stage back into the repository.
    #[command(override_usage = "dotstage generalize [options] (<file>... | --all)")]
    Generalize(GeneralizeOptions),

    /// Symlink staged dotfiles into the home directory.
    #[command(override_usage = "dotstage link [options] (<file>... | --all)")]
    Link(LinkOptions),

    /// Move dotfiles from the home directory onto the stage.
    #[command(override_usage = "dotstage add [options] <file>...")]
    Add(AddOptions),

    /// Remove dotfiles from the stage along with their symlinks.
    #[command(override_usage = "dotstage remove [options] <file>...")]
    Remove(RemoveOptions),

    /// Remove all symlinks and clear the stage.
    Clean,

    /// Initialize dotfile repository with a tag configuration.
    Init,

    /// Clone dotfile repository from remote.
    #[command(override_usage = "dotstage clone [options] <url>")]
    Clone(CloneOptions),

    /// Fast-forward dotfile repository from remote.
    Pull(PullOptions),

    /// Push dotfile repository to remote.
    Push,

    /// Run Git binary directly in the dotfile repository.
    #[command(external_subcommand)]
    Git(Vec<OsString>),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SpecializeOptions {
    /// Dotfiles to specialize, relative to the home directory.
    #[arg(value_name = "file", required_unless_present = "all")]
    pub files: Vec<PathBuf>,

    /// Specialize every dotfile in the repository.
    #[arg(short, long, conflicts_with = "files")]
    pub all: bool,

    /// Symlink specialized dotfiles into the home directory.
    #[arg(short, long)]
    pub link: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GeneralizeOptions {
    /// Dotfiles to generalize, relative to the home directory.
    #[arg(value_name = "file", required_unless_present = "all")]
    pub files: Vec<PathBuf>,

    /// Generalize every dotfile on stage.
    #[arg(short, long, conflicts_with = "files")]
    pub all: bool,

    /// Commit changed dotfiles to the repository.
    #[arg(short, long)]
    pub commit: bool,

    /// Commit message to use instead of the default.
    #[arg(short, long, value_name = "message", requires = "commit")]
    pub message: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LinkOptions {
    /// Staged dotfiles to symlink, relative to the home directory.
    #[arg(value_name = "file", required_unless_present = "all")]
    pub files: Vec<PathBuf>,

    /// Symlink every dotfile on stage.
    #[arg(short, long, conflicts_with = "files")]
    pub all: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Dotfiles to add, relative to the home directory.
    #[arg(required = true, value_name = "file")]
    pub files: Vec<PathBuf>,

    /// Commit added dotfiles to the repository.
    #[arg(short, long)]
    pub commit: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Dotfiles to remove, relative to the home directory.
    #[arg(required = true, value_name = "file")]
    pub files: Vec<PathBuf>,

    /// Commit removal of dotfiles from the repository.
    #[arg(short, long)]
    pub commit: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// URL of remote to clone from.
    #[arg(required = true, value_name = "url")]
    pub url: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PullOptions {
    /// Specialize and link every dotfile after pulling.
    #[arg(short, long)]
    pub specialize: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let default_level = if cli.global.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_specialize(global: &GlobalOptions, opts: SpecializeOptions) -> Result<()> {
    let manager = global.manager()?;
    let files = if opts.all {
        manager.specialize_all()?
    } else {
        for rel in &opts.files {
            manager.specialize(rel)?;
        }
        opts.files
    };

    if opts.link {
        for rel in files {
            manager.link(rel)?;
        }
    }

    Ok(())
}

fn run_generalize(global: &GlobalOptions, opts: GeneralizeOptions) -> Result<()> {
    let manager = global.manager()?;
    let files = if opts.all {
        manager.generalize_all()?
    } else {
        for rel in &opts.files {
            manager.generalize(rel)?;
        }
        opts.files
    };

    if opts.commit {
        let repo = global.repo()?;
        for rel in files {
            repo.update(rel, opts.message.as_deref())?;
        }
    }

    Ok(())
}

fn run_link(global: &GlobalOptions, opts: LinkOptions) -> Result<()> {
    let manager = global.manager()?;
    if opts.all {
        let created = manager.link_all()?;
        info!("created {} symlinks", created.len());
        return Ok(());
    }

    for rel in opts.files {
        if manager.link(&rel)? == LinkOutcome::Exists {
            info!("{} already exists in home directory", rel.display());
        }
    }

    Ok(())
}

fn run_add(global: &GlobalOptions, opts: AddOptions) -> Result<()> {
    let manager = global.manager()?;
    let repo = if opts.commit { Some(global.repo()?) } else { None };
    for rel in opts.files {
        manager.add(&rel)?;
        if let Some(repo) = &repo {
            repo.add(&rel)?;
        }
    }

    Ok(())
}

fn run_remove(global: &GlobalOptions, opts: RemoveOptions) -> Result<()> {
    let manager = global.manager()?;
    let repo = if opts.commit { Some(global.repo()?) } else { None };
    for rel in opts.files {
        manager.remove(&rel)?;
        if let Some(repo) = &repo {
            repo.remove(&rel)?;
        }
    }

    Ok(())
}

fn run_clean(global: &GlobalOptions) -> Result<()> {
    global.manager()?.clean()?;
    Ok(())
}

fn run_init(global: &GlobalOptions) -> Result<()> {
    let settings = global.settings()?;
    DotfileRepo::init(&settings.repository, TAG_CONFIG_RELATIVE_PATH, global.host()?)?;
    Ok(())
}

fn run_clone(global: &GlobalOptions, opts: CloneOptions) -> Result<()> {
    let settings = global.settings()?;
    DotfileRepo::try_clone(opts.url, &settings.repository, ProgressBar::new(0))?;
    Ok(())
}

fn run_pull(global: &GlobalOptions, opts: PullOptions) -> Result<()> {
    global.repo()?.pull()?;
    if opts.specialize {
        let manager = global.manager()?;
        manager.specialize_all()?;
        manager.link_all()?;
    }

    Ok(())
}

fn run_push(global: &GlobalOptions) -> Result<()> {
    global.repo()?.push()?;
    Ok(())
}

fn run_git(global: &GlobalOptions, opts: Vec<OsString>) -> Result<()> {
    global.repo()?.gitcall(opts)?;
    Ok(())
}
