// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::edit;
use crate::error::ToolError;
use crate::fileio;
use crate::ledger::sha256_hex;
use crate::state::SharedState;
use crate::syntax;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct FileEditArgs {
    file_path: String,
    file_edit_using_search_replace_blocks: String,
}

pub struct FileEditTool {
    state: SharedState,
}

impl FileEditTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "FileEdit"
    }

    fn description(&self) -> &str {
        "Edit an existing file with ordered SEARCH/REPLACE blocks:\n\
         <<<<<<< SEARCH\n\
         exact lines currently in the file\n\
         =======\n\
         replacement lines\n\
         >>>>>>> REPLACE\n\
         Blocks apply top to bottom.  SEARCH must match character for \
         character; small indentation drift is tolerated and reported.  The \
         file must have been read this session (ReadFiles) and be unchanged \
         on disk since.  Either every block applies or the file is untouched."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Absolute path" },
                "file_edit_using_search_replace_blocks": {
                    "type": "string",
                    "description": "One or more SEARCH/REPLACE blocks, concatenated"
                }
            },
            "required": ["file_path", "file_edit_using_search_replace_blocks"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: FileEditArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        debug!(path = %args.file_path, "FileEdit");

        let mut guard = self.state.lock().await;
        let workspace = guard.workspace.clone();
        let state = &mut *guard;

        match apply_edit(
            state,
            &workspace,
            &args.file_path,
            &args.file_edit_using_search_replace_blocks,
        ) {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

fn apply_edit(
    state: &mut crate::state::AgentState,
    workspace: &Path,
    raw_path: &str,
    payload: &str,
) -> Result<String, ToolError> {
    let path = fileio::resolve(Path::new(raw_path), workspace);
    state.mode.check_path_mutation(&path, workspace)?;

    let bytes = std::fs::read(&path).map_err(|e| ToolError::NotRead {
        path: path.clone(),
        detail: format!("file is not readable ({e}); use WriteIfEmpty to create new files"),
    })?;
    let current_hash = sha256_hex(&bytes);

    // Read-before-write barrier.
    if !state.ledger.is_current(&path, &current_hash) {
        let detail = if state.ledger.get(&path).is_some() {
            "the file changed on disk after it was last read; read it again".to_string()
        } else {
            "it has not been read in this session".to_string()
        };
        return Err(ToolError::NotRead { path, detail });
    }

    let content = String::from_utf8_lossy(&bytes).into_owned();
    let blocks = edit::parse_blocks(payload)?;
    let outcome = edit::apply_blocks(&content, &blocks)?;

    atomic_write(&path, &outcome.content)?;
    state.ledger.note_write(
        &path,
        sha256_hex(outcome.content.as_bytes()),
        outcome.content.lines().count(),
    );

    let mut text = format!(
        "applied {} block(s): {}",
        outcome.applied.len(),
        outcome
            .applied
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for warning in &outcome.warnings {
        text.push('\n');
        text.push_str(warning);
    }
    let diags = syntax::check(&path, &outcome.content);
    if !diags.is_empty() {
        text.push('\n');
        text.push_str(&syntax::render(&diags));
    }
    Ok(text)
}

/// Write via a temp file in the same directory, then rename into place.
fn atomic_write(path: &Path, content: &str) -> Result<(), ToolError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(d) => tempfile::NamedTempFile::new_in(d),
        None => tempfile::NamedTempFile::new(),
    }
    .map_err(|e| ToolError::io("creating temp file", e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| ToolError::io("writing temp file", e))?;
    tmp.flush().map_err(|e| ToolError::io("flushing temp file", e))?;
    tmp.persist(path)
        .map_err(|e| ToolError::Io(format!("replacing {}: {}", path.display(), e.error)))?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
