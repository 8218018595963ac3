// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Persistent interactive terminal for a single workspace.
//!
//! One PTY child runs the user's shell.  Raw output is fed through a VT100
//! emulator so callers always see the *rendered* screen (progress bars,
//! REPL redraws and cursor games resolve to stable text).  Command
//! completion is detected through a sentinel embedded in the prompt, which
//! also carries the exit status and working directory of the shell.

mod error;
mod pty;
mod screen;
mod sentinel;
mod session;
mod shell;

pub use error::{ShellError, TermError};
pub use screen::Screen;
pub use sentinel::{PromptMark, Sentinel};
pub use session::{PollResult, SpecialKey, Terminal};
pub use shell::{CommandOutcome, CommandStatus, Shell};
