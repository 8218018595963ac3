// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::state::SharedState;
use crate::taskstore::{collect_files, TaskSnapshot};
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct ContextSaveArgs {
    id: String,
    project_root_path: String,
    description: String,
    relevant_file_globs: Vec<String>,
}

pub struct ContextSaveTool {
    state: SharedState,
}

impl ContextSaveTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for ContextSaveTool {
    fn name(&self) -> &str {
        "ContextSave"
    }

    fn description(&self) -> &str {
        "Checkpoint the current task: a description plus the full content of \
         every file matching the globs, bundled under the given id.  Resume \
         later by passing the id as task_id_to_resume to Initialize.  An \
         existing snapshot with the same id is overwritten."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Client-chosen snapshot id" },
                "project_root_path": { "type": "string" },
                "description": {
                    "type": "string",
                    "description": "Task state, objectives, anything needed to resume"
                },
                "relevant_file_globs": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Workspace-relative globs, e.g. src/**"
                }
            },
            "required": ["id", "project_root_path", "description", "relevant_file_globs"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: ContextSaveArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        debug!(id = %args.id, globs = ?args.relevant_file_globs, "ContextSave");

        let workspace = PathBuf::from(&args.project_root_path);
        if !workspace.is_dir() {
            return ToolOutput::err(
                &call.id,
                format!("project_root_path {} is not a directory", workspace.display()),
            );
        }
        let files = collect_files(&workspace, &args.relevant_file_globs);
        let snapshot = TaskSnapshot {
            id: args.id.clone(),
            workspace,
            description: args.description,
            files,
        };

        let state = self.state.lock().await;
        match state.task_store.save(&snapshot) {
            Ok(path) => ToolOutput::ok(
                &call.id,
                format!(
                    "saved task {:?} ({} file(s)) to {}",
                    snapshot.id,
                    snapshot.files.len(),
                    path.display()
                ),
            ),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
