// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::fileio;
use crate::state::SharedState;
use crate::syntax;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct WriteIfEmptyArgs {
    file_path: String,
    file_content: String,
}

pub struct WriteIfEmptyTool {
    state: SharedState,
}

impl WriteIfEmptyTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for WriteIfEmptyTool {
    fn name(&self) -> &str {
        "WriteIfEmpty"
    }

    fn description(&self) -> &str {
        "Create a new file (parent directories are created as needed).\n\
         Refuses to touch a file that already exists with content; use \
         FileEdit for those.  The written content is syntax-checked and any \
         diagnostics are appended to the result."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Absolute path" },
                "file_content": { "type": "string" }
            },
            "required": ["file_path", "file_content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: WriteIfEmptyArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        debug!(path = %args.file_path, bytes = args.file_content.len(), "WriteIfEmpty");

        let mut guard = self.state.lock().await;
        let workspace = guard.workspace.clone();
        let state = &mut *guard;
        match fileio::write_if_empty(
            &mut state.ledger,
            &state.mode,
            &workspace,
            &args.file_path,
            &args.file_content,
        ) {
            Ok((path, diags)) => {
                let mut text = format!(
                    "created {} ({} bytes)",
                    path.display(),
                    args.file_content.len()
                );
                if !diags.is_empty() {
                    text.push('\n');
                    text.push_str(&syntax::render(&diags));
                }
                ToolOutput::ok(&call.id, text)
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_require_both_fields() {
        assert!(serde_json::from_value::<WriteIfEmptyArgs>(json!({"file_path": "/a"})).is_err());
        let a: WriteIfEmptyArgs =
            serde_json::from_value(json!({"file_path": "/a", "file_content": "x"})).unwrap();
        assert_eq!(a.file_path, "/a");
    }
}
