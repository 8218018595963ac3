// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failures of the terminal session itself.
#[derive(Debug, Error)]
pub enum TermError {
    /// The shell child exited or the PTY closed.  Every operation fails
    /// with this until the session is restarted.
    #[error("shell process is dead; restart the shell to continue")]
    ShellDead,

    /// `interrupt` could not bring the shell back to a prompt.
    #[error("command still running; interrupt did not reach a prompt")]
    StillRunning,

    /// The shell did not present a prompt within the startup budget.
    #[error("shell did not become ready: {0}")]
    StartupTimeout(String),

    #[error("pty: {0}")]
    Pty(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the command state machine layered on the terminal.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A command is already pending.  Carries the current rendered screen
    /// so the caller can see what the running command is doing.
    #[error("a command is already running")]
    Busy { screen: String },

    /// `status_check` while no command is pending.
    #[error("no command is running")]
    NoPending,

    /// `run` refuses embedded unescaped newlines; multi-line input must go
    /// through `send_text`.
    #[error("command contains an unescaped newline; use send_text for multi-line input")]
    MultiLine,

    #[error(transparent)]
    Term(#[from] TermError),
}
