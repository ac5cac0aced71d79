// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-host dotfile management through tag blocks.
//!
//! Generic dotfiles are kept in a Git repository. Sections that only apply to
//! some hosts are wrapped in tag blocks. Each host renders its own
//! __specialized__ copy of every dotfile onto a __stage__ directory by
//! commenting out blocks that do not match its tags, and symlinks the staged
//! files into its home directory. Edits made on a host are folded back into
//! the repository by __generalizing__ the staged file.
//!
//! - [`filter`]: tag-block parsing and the two filtering directions.
//! - [`tags`]: host to tag mapping.
//! - [`config`]: path settings.
//! - [`stage`]: file management between repository, stage, and home.
//! - [`repo`]: Git operations on the dotfile repository.

pub mod config;
pub mod filter;
pub mod path;
pub mod repo;
pub mod stage;
pub mod tags;

pub use filter::{FilterError, Mode, TagFilter};
pub use stage::Manager;
pub use tags::{TagConfig, TagSet};
