// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Shell-and-file agent engine.
//!
//! A chat model drives one developer workstation through six tools:
//! Initialize, BashCommand, ReadFiles, WriteIfEmpty, FileEdit and
//! ContextSave.  The engine owns a persistent PTY shell, a read-before-
//! write ledger over file contents, a glob-gated mode policy, and
//! token-budgeted reads and repository maps.  Transport to the model
//! client is the host's problem; everything here is plain text in, plain
//! text out.

pub mod builtin;
pub mod edit;
pub mod engine;
pub mod error;
pub mod fileio;
pub mod ledger;
pub mod mode;
pub mod registry;
pub mod repomap;
pub mod state;
pub mod syntax;
pub mod taskstore;
pub mod tokenizer;
pub mod tool;

pub use engine::Engine;
pub use error::ToolError;
pub use ledger::{sha256_hex, FileRecord, ReadLedger};
pub use mode::Mode;
pub use registry::{ToolRegistry, ToolSchema};
pub use state::{AgentState, SharedState};
pub use taskstore::{TaskSnapshot, TaskStore};
pub use tool::{Tool, ToolCall, ToolOutput};
