// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Shared engine state.
//!
//! Created once by the engine and handed to every tool as
//! `Arc<Mutex<AgentState>>`.  Holding the lock for the duration of each
//! tool call is what serialises the protocol: no two tool bodies ever
//! interleave.

use std::path::PathBuf;
use std::sync::Arc;

use deckhand_config::Config;
use deckhand_term::Shell;
use tokio::sync::Mutex;

use crate::ledger::ReadLedger;
use crate::mode::Mode;
use crate::taskstore::TaskStore;

pub type SharedState = Arc<Mutex<AgentState>>;

pub struct AgentState {
    pub config: Config,
    pub workspace: PathBuf,
    pub mode: Mode,
    pub ledger: ReadLedger,
    pub shell: Option<Shell>,
    pub task_store: TaskStore,
    /// Set by the first successful Initialize; gates every other tool.
    pub initialized: bool,
}

impl AgentState {
    pub fn new(config: Config) -> Self {
        let task_store = TaskStore::new(config.tasks.root.clone());
        Self {
            config,
            workspace: PathBuf::new(),
            mode: Mode::Unrestricted,
            ledger: ReadLedger::new(),
            shell: None,
            task_store,
            initialized: false,
        }
    }

    pub fn shared(config: Config) -> SharedState {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Current working directory: the shell's view wins, the workspace is
    /// the fallback before the shell exists.
    pub fn cwd(&self) -> PathBuf {
        self.shell
            .as_ref()
            .and_then(|s| s.cwd())
            .unwrap_or_else(|| self.workspace.clone())
    }

    /// Footer appended to every tool result: cwd plus shell status as
    /// observed after the operation.
    pub fn status_footer(&self) -> String {
        let status = match &self.shell {
            Some(shell) => shell.status_line(),
            None => "shell not started".to_string(),
        };
        format!("\n\n---\ncwd = {}\nshell status = {}", self.cwd().display(), status)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
