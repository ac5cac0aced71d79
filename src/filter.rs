// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tag-block filtering.
//!
//! Dotfiles kept in the repository are __generic__: every host-specific
//! section is visible and uncommented, so the file can be edited with proper
//! syntax highlighting. Each host works with a __specialized__ rendering of
//! that file, where the sections that do not apply to the host are commented
//! out. The filter converts between the two forms.
//!
//! # Tag Blocks
//!
//! Sections are delimited by __directives__. A directive is a line that starts
//! with the file's comment marker written twice, directly followed by one of
//! three keywords:
//!
//! ```text
//! #!/bin/sh
//! ##only work laptop
//! export EDITOR=code
//! ##not work
//! export EDITOR=vim
//! ##end
//! ```
//!
//! - `only <tags>` activates the following lines if the host has any of the
//!   listed tags.
//! - `not <tags>` activates the following lines if the host has none of the
//!   listed tags.
//! - `end` closes the block.
//!
//! Blocks do not nest. A second `only` or `not` before `end` switches to a new
//! branch of the same block, which gives if/else chains.
//!
//! # Comment Marker
//!
//! The comment marker is taken from the first line of the file, which must
//! therefore be a comment. Shebang lines count: `#!/bin/sh` yields `#`.
//!
//! # Suppression
//!
//! An inactive line is __suppressed__ by prepending the comment marker at
//! column zero. Removing exactly one leading marker reverses suppression.
//! Because of this, a comment at column zero inside a block cannot be told
//! apart from a suppressed line. Indent comments inside blocks.

use crate::tags::TagSet;

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::debug;

/// Direction of a filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Generic to specific: comment out inactive branches.
    Specialize,

    /// Specific to generic: uncomment every branch.
    Generalize,
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Specialize => fmt.write_str("specialize"),
            Self::Generalize => fmt.write_str("generalize"),
        }
    }
}

/// Comment-start sequence of a managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentMarker(String);

impl CommentMarker {
    /// Construct comment marker from explicit sequence.
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Identify comment marker from the first line of a file.
    ///
    /// Takes the first whitespace separated token of the line, and keeps the
    /// leading run of its first character. That character must be ASCII
    /// punctuation. Returns `None` for blank lines, or lines that do not start
    /// with a comment.
    pub fn identify(first_line: &str) -> Option<Self> {
        let token = first_line.split_whitespace().next()?;
        let lead = token.chars().next()?;
        if !lead.is_ascii_punctuation() {
            return None;
        }

        let len = token.chars().take_while(|c| *c == lead).count();
        Some(Self(token[..len].to_string()))
    }

    /// Treat comment marker as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn suppress(&self, line: &str) -> String {
        if line.starts_with(self.as_str()) {
            return line.to_string();
        }

        format!("{}{line}", self.0)
    }

    fn unsuppress<'a>(&self, line: &'a str) -> &'a str {
        line.strip_prefix(self.as_str()).unwrap_or(line)
    }
}

impl Display for CommentMarker {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Keyword of a tag-block directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Only,
    Not,
    End,
}

/// Parsed tag-block directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub tags: Vec<String>,
}

/// A single input line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Tag-block directive. Never commented out, never treated as content.
    Directive(Directive),

    /// Ordinary content, possibly carrying a suppression marker.
    Content { text: &'a str, suppressed: bool },
}

impl<'a> Line<'a> {
    /// Classify a raw line under given comment marker.
    ///
    /// A line is a directive candidate when, after leading whitespace, it
    /// starts with the doubled comment marker followed by a lowercase ASCII
    /// letter. A doubled marker followed by `only`, `not`, or `end` in any
    /// other letter case is a mistyped directive. Anything else is content.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError::UnknownDirective`] if a directive candidate
    ///   does not name `only`, `not`, or `end`, or names one of them in the
    ///   wrong letter case.
    pub fn parse(marker: &CommentMarker, raw: &'a str, line: usize) -> Result<Self> {
        let content = Self::Content {
            text: raw,
            suppressed: raw.starts_with(marker.as_str()),
        };

        let Some(body) = raw
            .trim_start()
            .strip_prefix(marker.as_str())
            .and_then(|rest| rest.strip_prefix(marker.as_str()))
        else {
            return Ok(content);
        };

        let split = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        let (keyword, args) = body.split_at(split);
        let bounded = args.is_empty() || args.starts_with(char::is_whitespace);

        if !body.starts_with(|c: char| c.is_ascii_lowercase()) {
            let lowered = keyword.to_ascii_lowercase();
            if bounded && matches!(lowered.as_str(), "only" | "not" | "end") {
                return Err(FilterError::UnknownDirective {
                    line,
                    keyword: keyword.to_string(),
                });
            }

            return Ok(content);
        }

        // INVARIANT: Keyword ends at whitespace or end of line.
        if !bounded {
            let word = body.split_whitespace().next().unwrap_or(body);
            return Err(FilterError::UnknownDirective {
                line,
                keyword: word.to_string(),
            });
        }

        let kind = match keyword {
            "only" => DirectiveKind::Only,
            "not" => DirectiveKind::Not,
            "end" => DirectiveKind::End,
            _ => {
                return Err(FilterError::UnknownDirective {
                    line,
                    keyword: keyword.to_string(),
                })
            }
        };

        Ok(Self::Directive(Directive {
            kind,
            tags: args.split_whitespace().map(str::to_string).collect(),
        }))
    }
}

/// Block state machine of a single filtering pass.
///
/// Records which branch of a block the pass is in, whether that branch is
/// suppressed for the active tag set, and the line that opened the block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    #[default]
    Outside,
    InOnlyBranch { suppress: bool, opened_at: usize },
    InNotBranch { suppress: bool, opened_at: usize },
}

impl BlockState {
    /// Advance state machine by one directive.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError::StrayEnd`] if `end` appears outside a block.
    pub fn transition(self, directive: &Directive, tags: &TagSet, line: usize) -> Result<Self> {
        let opened_at = self.opened_at().unwrap_or(line);
        let next = match directive.kind {
            DirectiveKind::Only => {
                let suppress = !tags.intersects(&directive.tags);
                debug!(
                    "line {line}: only [{}] -> suppress = {suppress}",
                    directive.tags.join(", ")
                );
                Self::InOnlyBranch {
                    suppress,
                    opened_at,
                }
            }
            DirectiveKind::Not => {
                let suppress = tags.intersects(&directive.tags);
                debug!(
                    "line {line}: not [{}] -> suppress = {suppress}",
                    directive.tags.join(", ")
                );
                Self::InNotBranch {
                    suppress,
                    opened_at,
                }
            }
            DirectiveKind::End => {
                if self == Self::Outside {
                    return Err(FilterError::StrayEnd { line });
                }
                debug!("line {line}: end of block opened at line {opened_at}");
                Self::Outside
            }
        };

        Ok(next)
    }

    /// Check if current branch is suppressed.
    pub fn suppress(&self) -> bool {
        match self {
            Self::Outside => false,
            Self::InOnlyBranch { suppress, .. } | Self::InNotBranch { suppress, .. } => *suppress,
        }
    }

    /// Line of directive that opened current block, if any.
    pub fn opened_at(&self) -> Option<usize> {
        match self {
            Self::Outside => None,
            Self::InOnlyBranch { opened_at, .. } | Self::InNotBranch { opened_at, .. } => {
                Some(*opened_at)
            }
        }
    }
}

/// Tag-block filter bound to an active tag set.
///
/// Holds no state between passes, so one filter can be applied to any number
/// of files in sequence.
#[derive(Debug, Clone, Copy)]
pub struct TagFilter<'t> {
    tags: &'t TagSet,
}

impl<'t> TagFilter<'t> {
    /// Construct new filter for active tag set.
    pub fn new(tags: &'t TagSet) -> Self {
        Self { tags }
    }

    /// Comment out branches inactive for the active tag set.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError`] on malformed input.
    pub fn specialize<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
        self.apply(Mode::Specialize, lines)
    }

    /// Uncomment every branch of every block.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError`] on malformed input.
    pub fn generalize<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
        self.apply(Mode::Generalize, lines)
    }

    /// Run one filtering pass over a sequence of lines.
    ///
    /// Lines are given without their terminators. Output has exactly one line
    /// per input line. Empty input produces empty output.
    ///
    /// # Errors
    ///
    /// - Return [`FilterError::FirstLineNotComment`] if the first line does
    ///   not start with a comment.
    /// - Return [`FilterError::UnknownDirective`] if a directive names an
    ///   unknown keyword.
    /// - Return [`FilterError::StrayEnd`] if `end` has no open block.
    /// - Return [`FilterError::UnterminatedBlock`] if input ends inside a
    ///   block.
    pub fn apply<'a>(
        &self,
        mode: Mode,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>> {
        let mut lines = lines.into_iter().peekable();
        let Some(first) = lines.peek() else {
            return Ok(Vec::new());
        };

        let marker =
            CommentMarker::identify(first).ok_or(FilterError::FirstLineNotComment { line: 1 })?;
        debug!("identified comment marker {marker:?}");

        let mut state = BlockState::Outside;
        let mut output = Vec::new();
        for (index, raw) in lines.enumerate() {
            let line = index + 1;
            match Line::parse(&marker, raw, line)? {
                Line::Directive(directive) => {
                    state = state.transition(&directive, self.tags, line)?;
                    output.push(raw.to_string());
                }
                Line::Content { text, .. } if state == BlockState::Outside => {
                    output.push(text.to_string());
                }
                Line::Content { text, suppressed } => {
                    let rendered = match mode {
                        Mode::Specialize if state.suppress() => marker.suppress(text),
                        Mode::Specialize | Mode::Generalize if suppressed => {
                            marker.unsuppress(text).to_string()
                        }
                        _ => text.to_string(),
                    };
                    output.push(rendered);
                }
            }
        }

        if let Some(line) = state.opened_at() {
            return Err(FilterError::UnterminatedBlock { line });
        }

        Ok(output)
    }
}

/// Malformed tag-block input.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Input ends while a block is still open.
    #[error("block opened at line {line} is never closed with 'end'")]
    UnterminatedBlock { line: usize },

    /// Doubled comment marker followed by an unknown keyword.
    #[error("unknown directive '{keyword}' at line {line}")]
    UnknownDirective { line: usize, keyword: String },

    /// An `end` directive with no open block.
    #[error("'end' without open block at line {line}")]
    StrayEnd { line: usize },

    /// First line of input is not a comment.
    #[error("first line must be a comment to identify the comment marker (line {line})")]
    FirstLineNotComment { line: usize },
}

impl FilterError {
    /// Line at which the error was detected.
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedBlock { line }
            | Self::UnknownDirective { line, .. }
            | Self::StrayEnd { line }
            | Self::FirstLineNotComment { line } => *line,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = FilterError> = std::result::Result<T, E>;
