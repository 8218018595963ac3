// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use thiserror::Error;

/// Structured failures surfaced by tool operations.
///
/// These are returned as values, rendered into the tool output text; no
/// layer unwinds through another.  Non-fatal conditions (indent warnings,
/// syntax diagnostics) are not errors and travel in the success text.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Denied by the active mode.  `rule` names the policy that fired.
    #[error("operation forbidden by the active mode (rule: {rule})")]
    Forbidden { rule: String },

    /// Write or edit on a file whose current content the agent has not
    /// seen.  Covers both never-read and read-then-changed-on-disk.
    #[error("{path} must be read before it can be modified: {detail}")]
    NotRead { path: PathBuf, detail: String },

    /// WriteIfEmpty on an existing, non-empty file.
    #[error("{path} already exists and is not empty; read it and use FileEdit instead")]
    FileExists { path: PathBuf },

    /// A search block matched nothing acceptable.  `closest` carries the
    /// best near-miss so the caller can correct its block.
    #[error("search block #{index} matched nothing in the file\n{closest}")]
    NoMatch { index: usize, closest: String },

    /// A search block matched several places and ordering could not pick
    /// one.  Offsets are 1-based line numbers of every candidate.
    #[error("search block #{index} is ambiguous; it matches at lines {offsets:?}")]
    Ambiguous { index: usize, offsets: Vec<usize> },

    /// The search/replace payload itself does not parse.
    #[error("malformed search/replace payload: {0}")]
    MalformedEdit(String),

    /// The shell already has a pending command.
    #[error("a command is already running; current screen:\n{screen}")]
    Busy { screen: String },

    /// The wait heuristic gave up without reaching a prompt.
    #[error("shell did not return to a prompt")]
    StillRunning,

    /// The shell child is gone.
    #[error("shell process is dead; reinitialize with type=reset_shell")]
    ShellDead,

    /// A read range like `:12-5` or `:0-` that cannot be honoured.
    #[error("invalid line range {spec:?} for {path}")]
    BadRange { path: String, spec: String },

    /// TaskStore lookup miss.
    #[error("no saved task with id {0:?}")]
    NoSuchTask(String),

    #[error("{0}")]
    Io(String),
}

impl ToolError {
    pub fn io(context: &str, e: std::io::Error) -> Self {
        ToolError::Io(format!("{context}: {e}"))
    }
}

impl From<deckhand_term::TermError> for ToolError {
    fn from(e: deckhand_term::TermError) -> Self {
        match e {
            deckhand_term::TermError::ShellDead => ToolError::ShellDead,
            deckhand_term::TermError::StillRunning => ToolError::StillRunning,
            other => ToolError::Io(other.to_string()),
        }
    }
}

impl From<deckhand_term::ShellError> for ToolError {
    fn from(e: deckhand_term::ShellError) -> Self {
        match e {
            deckhand_term::ShellError::Busy { screen } => ToolError::Busy { screen },
            deckhand_term::ShellError::Term(t) => t.into(),
            other => ToolError::Io(other.to_string()),
        }
    }
}
