// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! The engine binds the six boundary tools to one shared session state.
//!
//! Hosts call [`Engine::dispatch`] one tool call at a time; the shared
//! state mutex serialises everything behind it, so a host that does issue
//! concurrent calls still gets strictly ordered effects.

use deckhand_config::Config;

use crate::builtin::{
    BashCommandTool, ContextSaveTool, FileEditTool, InitializeTool, ReadFilesTool,
    WriteIfEmptyTool,
};
use crate::registry::{ToolRegistry, ToolSchema};
use crate::state::{AgentState, SharedState};
use crate::tool::{ToolCall, ToolOutput};

pub struct Engine {
    state: SharedState,
    registry: ToolRegistry,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let state = AgentState::shared(config);
        let mut registry = ToolRegistry::new();
        registry.register(InitializeTool::new(state.clone()));
        registry.register(BashCommandTool::new(state.clone()));
        registry.register(ReadFilesTool::new(state.clone()));
        registry.register(WriteIfEmptyTool::new(state.clone()));
        registry.register(FileEditTool::new(state.clone()));
        registry.register(ContextSaveTool::new(state.clone()));
        Self { state, registry }
    }

    /// Schemas for the host to advertise to its model client.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Execute one tool call.  Every result, success or error, ends with
    /// the current working directory and shell status.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        if call.name != "Initialize" {
            let state = self.state.lock().await;
            if !state.initialized {
                let mut out = ToolOutput::err(
                    &call.id,
                    "session not initialized; call Initialize with type=first_call",
                );
                out.content.push_str(&state.status_footer());
                return out;
            }
        }

        let mut out = self.registry.execute(call).await;
        let footer = self.state.lock().await.status_footer();
        out.content.push_str(&footer);
        out
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
