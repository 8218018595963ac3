// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::fileio;
use crate::state::SharedState;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct ReadFilesArgs {
    file_paths: Vec<String>,
    #[serde(default)]
    show_line_numbers_reason: Option<String>,
}

pub struct ReadFilesTool {
    state: SharedState,
}

impl ReadFilesTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &str {
        "ReadFiles"
    }

    fn description(&self) -> &str {
        "Read one or more files.  Paths may carry a line range suffix: \
         /a/b.rs:10-40, :10- (to end), :-40 (from start).\n\
         The batch shares a token budget; files that do not fit are chunked \
         and the remaining ranges are listed so you can fetch them next.\n\
         Reading a file is what makes it editable: FileEdit and WriteIfEmpty \
         verify you have seen the current content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Absolute paths, optional :start-end suffix"
                },
                "show_line_numbers_reason": {
                    "type": "string",
                    "description": "Non-empty to prefix each line with its 1-based number"
                }
            },
            "required": ["file_paths"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: ReadFilesArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        let numbered = args
            .show_line_numbers_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());

        debug!(count = args.file_paths.len(), numbered, "ReadFiles");

        let mut guard = self.state.lock().await;
        let max_tokens = guard.config.read.max_tokens;
        let workspace = guard.workspace.clone();
        let state = &mut *guard;
        match fileio::read_files(
            &mut state.ledger,
            &state.mode,
            &workspace,
            &args.file_paths,
            numbered,
            max_tokens,
        ) {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_and_without_reason() {
        let a: ReadFilesArgs =
            serde_json::from_value(json!({"file_paths": ["/a", "/b:1-3"]})).unwrap();
        assert_eq!(a.file_paths.len(), 2);
        assert!(a.show_line_numbers_reason.is_none());

        let a: ReadFilesArgs = serde_json::from_value(
            json!({"file_paths": ["/a"], "show_line_numbers_reason": "edit targeting"}),
        )
        .unwrap();
        assert_eq!(a.show_line_numbers_reason.as_deref(), Some("edit targeting"));
    }

    #[test]
    fn missing_file_paths_is_a_parse_error() {
        assert!(serde_json::from_value::<ReadFilesArgs>(json!({})).is_err());
    }
}
