// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use deckhand_config::{CodeWriterConfig, ModeName};
use deckhand_term::Shell;

use crate::error::ToolError;
use crate::ledger::sha256_hex;
use crate::mode::Mode;
use crate::state::{AgentState, SharedState};
use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::{fileio, repomap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InitType {
    FirstCall,
    UserAskedModeChange,
    ResetShell,
    UserAskedChangeWorkspace,
}

#[derive(Debug, Deserialize)]
struct InitializeArgs {
    #[serde(rename = "type")]
    init_type: InitType,
    any_workspace_path: String,
    initial_files_to_read: Vec<String>,
    task_id_to_resume: String,
    mode_name: ModeName,
    #[serde(default)]
    code_writer_config: Option<CodeWriterConfig>,
}

pub struct InitializeTool {
    state: SharedState,
}

impl InitializeTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for InitializeTool {
    fn name(&self) -> &str {
        "Initialize"
    }

    fn description(&self) -> &str {
        "Set up (or re-configure) the session: workspace, mode, shell.\n\
         type = first_call | user_asked_mode_change | reset_shell | \
         user_asked_change_workspace.\n\
         Returns the workspace path, the mode policy, a map of important \
         files, the contents of initial_files_to_read, and the saved \
         description when task_id_to_resume names a ContextSave snapshot.\n\
         reset_shell is the escape hatch for a stuck command: it interrupts, \
         tears the terminal down and starts a fresh one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["first_call", "user_asked_mode_change",
                             "reset_shell", "user_asked_change_workspace"]
                },
                "any_workspace_path": {
                    "type": "string",
                    "description": "Workspace directory (a file path selects its parent)"
                },
                "initial_files_to_read": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "task_id_to_resume": { "type": "string" },
                "mode_name": {
                    "type": "string",
                    "enum": ["wcgw", "architect", "code_writer"]
                },
                "code_writer_config": {
                    "type": "object",
                    "description": "allowed_globs / allowed_commands, each \"all\" or a list"
                }
            },
            "required": ["type", "any_workspace_path", "initial_files_to_read",
                         "task_id_to_resume", "mode_name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: InitializeArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        debug!(init_type = ?args.init_type, workspace = %args.any_workspace_path, "Initialize");

        let mut state = self.state.lock().await;
        match initialize(&mut state, args).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

async fn initialize(state: &mut AgentState, args: InitializeArgs) -> Result<String, ToolError> {
    // ── Workspace resolution ──────────────────────────────────────────────
    let mut initial_files = args.initial_files_to_read.clone();
    let mut workspace = if args.any_workspace_path.is_empty() {
        state.workspace.clone()
    } else {
        expand_home(&args.any_workspace_path)
    };
    if workspace.as_os_str().is_empty() {
        return Err(ToolError::Io(
            "any_workspace_path is required on the first call".to_string(),
        ));
    }
    if workspace.is_file() {
        initial_files.push(workspace.display().to_string());
        workspace = workspace
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or(workspace);
    }
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace)
            .map_err(|e| ToolError::io("creating workspace directory", e))?;
    }
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    // ── Task resume (may override the workspace) ──────────────────────────
    let resumed = if args.task_id_to_resume.is_empty() {
        None
    } else {
        Some(state.task_store.load(&args.task_id_to_resume)?)
    };
    let workspace = match &resumed {
        Some(snap) if snap.workspace.is_dir() => snap
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| snap.workspace.clone()),
        Some(snap) => {
            warn!(ws = %snap.workspace.display(), "resumed workspace missing, keeping requested one");
            workspace
        }
        None => workspace,
    };

    // ── Mode and ledger ───────────────────────────────────────────────────
    state.mode = Mode::from_parts(args.mode_name, args.code_writer_config.clone());
    state.ledger.clear();
    let workspace_changed = state.workspace != workspace;
    state.workspace = workspace.clone();

    if let Some(snap) = &resumed {
        for (path, content) in &snap.files {
            state.ledger.note_read(
                path,
                sha256_hex(content.as_bytes()),
                (1, content.lines().count().max(1)),
                content.lines().count(),
            );
        }
    }

    // ── Shell lifecycle ───────────────────────────────────────────────────
    match args.init_type {
        InitType::ResetShell => {
            if let Some(shell) = state.shell.as_mut() {
                if shell.interrupt().await.is_err() {
                    warn!("reset_shell: interrupt failed, killing outright");
                }
                shell.kill();
            }
            state.shell = None;
        }
        InitType::UserAskedModeChange => {
            if let Some(shell) = state.shell.as_mut() {
                if shell.is_pending() && shell.interrupt().await.is_err() {
                    warn!("mode change: pending command would not stop");
                }
            }
        }
        _ => {}
    }

    let needs_shell = state
        .shell
        .as_ref()
        .map(|s| s.is_dead())
        .unwrap_or(true);
    if needs_shell {
        let shell = Shell::start(&workspace, &state.config.terminal)
            .await
            .map_err(ToolError::from)?;
        state.shell = Some(shell);
    } else if workspace_changed {
        // Same shell, new workspace: point it there if nothing is running.
        if let Some(shell) = state.shell.as_mut() {
            if !shell.is_pending() {
                let cd = format!("cd {}", shell_quote(&workspace.display().to_string()));
                let _ = shell.run(&cd, Duration::from_secs(2)).await;
            }
        }
    }

    // ── Repo map + initial reads ──────────────────────────────────────────
    let map = repomap::build(
        &workspace,
        state.config.repomap.max_tokens,
        state.config.repomap.max_scan_bytes,
    );

    let files_text = if initial_files.is_empty() {
        String::new()
    } else {
        let max_tokens = state.config.read.max_tokens;
        let state = &mut *state;
        fileio::read_files(
            &mut state.ledger,
            &state.mode,
            &workspace,
            &initial_files,
            false,
            max_tokens,
        )?
    };

    state.initialized = true;

    // ── Result document ───────────────────────────────────────────────────
    let mut out = format!("workspace = {}\n{}\n", workspace.display(), state.mode.summary());
    out.push_str("\n# workspace map\n");
    out.push_str(&map);
    out.push('\n');
    if !files_text.is_empty() {
        out.push_str("\n# requested files\n");
        out.push_str(&files_text);
        out.push('\n');
    }
    if let Some(snap) = &resumed {
        out.push_str(&format!(
            "\n# resumed task {:?} ({} file(s) loaded into the read ledger)\n",
            args.task_id_to_resume,
            snap.files.len()
        ));
        out.push_str(&snap.description);
        out.push('\n');
    }
    Ok(out)
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> InitializeArgs {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn init_type_names_parse() {
        let a = args(json!({
            "type": "first_call",
            "any_workspace_path": "/w",
            "initial_files_to_read": [],
            "task_id_to_resume": "",
            "mode_name": "wcgw"
        }));
        assert_eq!(a.init_type, InitType::FirstCall);
        assert_eq!(a.mode_name, ModeName::Wcgw);

        let a = args(json!({
            "type": "reset_shell",
            "any_workspace_path": "",
            "initial_files_to_read": [],
            "task_id_to_resume": "",
            "mode_name": "architect"
        }));
        assert_eq!(a.init_type, InitType::ResetShell);
    }

    #[test]
    fn code_writer_config_is_accepted() {
        let a = args(json!({
            "type": "user_asked_mode_change",
            "any_workspace_path": "/w",
            "initial_files_to_read": [],
            "task_id_to_resume": "",
            "mode_name": "code_writer",
            "code_writer_config": {
                "allowed_globs": ["src/**"],
                "allowed_commands": "all"
            }
        }));
        let cfg = a.code_writer_config.unwrap();
        assert!(!cfg.allowed_globs.is_all());
        assert!(cfg.allowed_commands.is_all());
    }

    #[test]
    fn unknown_mode_name_is_rejected() {
        let v = json!({
            "type": "first_call",
            "any_workspace_path": "/w",
            "initial_files_to_read": [],
            "task_id_to_resume": "",
            "mode_name": "yolo"
        });
        assert!(serde_json::from_value::<InitializeArgs>(v).is_err());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/plain/path"), "'/plain/path'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/a/b"), PathBuf::from("/a/b"));
    }
}
