// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub read: ReadConfig,
    #[serde(default)]
    pub repomap: RepoMapConfig,
    #[serde(default)]
    pub tasks: TaskStoreConfig,
}

/// Geometry and timing of the persistent terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Virtual screen rows.  Large by default so scrolled-off output of a
    /// single command stays addressable without a scrollback buffer.
    #[serde(default = "default_rows")]
    pub rows: u16,
    /// Virtual screen columns.
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Shell executable.  When unset, `$SHELL` is used if it looks like a
    /// bash-compatible shell, falling back to `/bin/bash`.
    #[serde(default)]
    pub shell: Option<String>,
    /// Internal polling quantum of the command wait loop, in milliseconds.
    #[serde(default = "default_poll_quantum_ms")]
    pub poll_quantum_ms: u64,
    /// How many quiet quanta in a row count as "output has gone stale" once
    /// the caller's deadline has passed.
    #[serde(default = "default_fresh_quanta")]
    pub fresh_quanta: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            shell: None,
            poll_quantum_ms: default_poll_quantum_ms(),
            fresh_quanta: default_fresh_quanta(),
        }
    }
}

/// Budgets applied to file reads returned to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Token budget shared by one batch of file reads.  Files that do not
    /// fit are chunked; only the first chunk is returned.
    #[serde(default = "default_read_tokens")]
    pub max_tokens: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self { max_tokens: default_read_tokens() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMapConfig {
    /// Token ceiling for the rendered repository map.
    #[serde(default = "default_repomap_tokens")]
    pub max_tokens: usize,
    /// Files larger than this are never content-scanned for references.
    #[serde(default = "default_scan_bytes")]
    pub max_scan_bytes: u64,
}

impl Default for RepoMapConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_repomap_tokens(),
            max_scan_bytes: default_scan_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStoreConfig {
    /// Directory holding saved task snapshots.
    /// Default: `<data dir>/deckhand/tasks`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_rows() -> u16 {
    500
}
fn default_cols() -> u16 {
    160
}
fn default_poll_quantum_ms() -> u64 {
    100
}
fn default_fresh_quanta() -> u32 {
    4
}
fn default_read_tokens() -> usize {
    8000
}
fn default_repomap_tokens() -> usize {
    2048
}
fn default_scan_bytes() -> u64 {
    65536
}

// ── Operating modes ───────────────────────────────────────────────────────────

/// Boundary name of an operating mode.
///
/// `wcgw` is the unrestricted mode; `architect` is read-only analysis;
/// `code_writer` limits mutation to configured globs and commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    Wcgw,
    Architect,
    CodeWriter,
}

/// Either the sentinel string "all" or an explicit pattern list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedItems {
    All(String),
    List(Vec<String>),
}

impl AllowedItems {
    pub fn all() -> Self {
        AllowedItems::All("all".to_string())
    }

    /// True when every item is allowed.  Any string value is accepted as the
    /// sentinel; "all" is the canonical spelling.
    pub fn is_all(&self) -> bool {
        matches!(self, AllowedItems::All(_))
    }

    pub fn patterns(&self) -> &[String] {
        match self {
            AllowedItems::All(_) => &[],
            AllowedItems::List(items) => items,
        }
    }
}

impl Default for AllowedItems {
    fn default() -> Self {
        AllowedItems::all()
    }
}

/// Policy payload accompanying `mode_name = code_writer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeWriterConfig {
    #[serde(default)]
    pub allowed_globs: AllowedItems,
    #[serde(default)]
    pub allowed_commands: AllowedItems,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.terminal.rows, 500);
        assert_eq!(cfg.terminal.cols, 160);
        assert_eq!(cfg.terminal.poll_quantum_ms, 100);
        assert_eq!(cfg.terminal.fresh_quanta, 4);
        assert_eq!(cfg.read.max_tokens, 8000);
        assert_eq!(cfg.repomap.max_tokens, 2048);
        assert!(cfg.tasks.root.is_none());
    }

    #[test]
    fn mode_name_round_trips_snake_case() {
        let m: ModeName = serde_yaml::from_str("code_writer").unwrap();
        assert_eq!(m, ModeName::CodeWriter);
        assert_eq!(serde_yaml::to_string(&ModeName::Wcgw).unwrap().trim(), "wcgw");
    }

    #[test]
    fn allowed_items_accepts_sentinel_and_list() {
        let a: AllowedItems = serde_yaml::from_str("all").unwrap();
        assert!(a.is_all());
        let b: AllowedItems = serde_yaml::from_str("[\"src/**\", \"tests/**\"]").unwrap();
        assert!(!b.is_all());
        assert_eq!(b.patterns().len(), 2);
    }

    #[test]
    fn code_writer_config_defaults_to_all() {
        let cfg: CodeWriterConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.allowed_globs.is_all());
        assert!(cfg.allowed_commands.is_all());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg: Config = serde_yaml::from_str("terminal:\n  cols: 80").unwrap();
        assert_eq!(cfg.terminal.cols, 80);
        assert_eq!(cfg.terminal.rows, 500);
        assert_eq!(cfg.read.max_tokens, 8000);
    }
}
