// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use deckhand_term::{CommandOutcome, CommandStatus, SpecialKey};

use crate::error::ToolError;
use crate::state::SharedState;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Wait applied when the caller supplies none for command/status actions.
const DEFAULT_WAIT_SECS: f64 = 5.0;

#[derive(Debug, Deserialize)]
struct BashCommandArgs {
    action_json: Action,
    #[serde(default)]
    wait_for_seconds: Option<f64>,
}

/// Exactly one of five shapes; the JSON keys disambiguate.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Action {
    Command {
        command: String,
    },
    StatusCheck {
        status_check: bool,
    },
    SendText {
        send_text: String,
    },
    SendSpecials {
        send_specials: Vec<String>,
    },
    SendAscii {
        send_ascii: Vec<u8>,
    },
}

pub struct BashCommandTool {
    state: SharedState,
}

impl BashCommandTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for BashCommandTool {
    fn name(&self) -> &str {
        "BashCommand"
    }

    fn description(&self) -> &str {
        "Run a command in the persistent shell, or interact with whatever is \
         already running.\n\
         action_json is exactly one of:\n\
         - {\"command\": \"...\"}           start a command (one-liner only)\n\
         - {\"status_check\": true}         poll a still-running command\n\
         - {\"send_text\": \"...\"}         type literal text (no newline added)\n\
         - {\"send_specials\": [\"Enter\"]}  press keys: Enter, Key-up, Key-down,\n\
           Key-left, Key-right, Ctrl-c, Ctrl-d\n\
         - {\"send_ascii\": [10]}           send raw byte codes\n\
         Only one command runs at a time; a second submission returns the \
         current screen instead of interfering.  wait_for_seconds bounds how \
         long this call waits before handing partial output back."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action_json": {
                    "type": "object",
                    "description": "One of {command}, {status_check}, {send_text}, \
                                    {send_specials}, {send_ascii}"
                },
                "wait_for_seconds": {
                    "type": "number",
                    "description": "Seconds to wait for output before returning"
                }
            },
            "required": ["action_json"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: BashCommandArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let mut state = self.state.lock().await;
        let mode = state.mode.clone();
        let Some(shell) = state.shell.as_mut() else {
            return ToolOutput::err(&call.id, "shell not started; call Initialize first");
        };

        let wait = args.wait_for_seconds.map(secs);
        let result: Result<CommandOutcome, ToolError> = match &args.action_json {
            Action::Command { command } => {
                debug!(%command, "BashCommand: command");
                match mode.check_command(command) {
                    Ok(()) => shell
                        .run(command, wait.unwrap_or_else(|| secs(DEFAULT_WAIT_SECS)))
                        .await
                        .map_err(Into::into),
                    Err(e) => Err(e),
                }
            }
            Action::StatusCheck { .. } => {
                debug!("BashCommand: status_check");
                shell
                    .status_check(wait.unwrap_or_else(|| secs(DEFAULT_WAIT_SECS)))
                    .await
                    .map_err(Into::into)
            }
            Action::SendText { send_text } => {
                debug!(len = send_text.len(), "BashCommand: send_text");
                match mode.check_interaction() {
                    Ok(()) => shell.send_text(send_text, wait).await.map_err(Into::into),
                    Err(e) => Err(e),
                }
            }
            Action::SendSpecials { send_specials } => {
                debug!(?send_specials, "BashCommand: send_specials");
                match mode.check_interaction() {
                    Ok(()) => match parse_specials(send_specials) {
                        Ok(keys) => shell.send_specials(&keys, wait).await.map_err(Into::into),
                        Err(e) => Err(ToolError::Io(e)),
                    },
                    Err(e) => Err(e),
                }
            }
            Action::SendAscii { send_ascii } => {
                debug!(count = send_ascii.len(), "BashCommand: send_ascii");
                match mode.check_interaction() {
                    Ok(()) => shell.send_ascii(send_ascii, wait).await.map_err(Into::into),
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(outcome) => ToolOutput::ok(&call.id, render_outcome(&outcome)),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.clamp(0.0, 3600.0))
}

fn parse_specials(names: &[String]) -> Result<Vec<SpecialKey>, String> {
    names.iter().map(|n| n.parse::<SpecialKey>()).collect()
}

fn render_outcome(outcome: &CommandOutcome) -> String {
    let mut text = outcome.output.clone();
    if let CommandStatus::Running { streaming } = outcome.status {
        if !text.is_empty() {
            text.push('\n');
        }
        if streaming {
            text.push_str("(still running, output streaming; poll with status_check)");
        } else {
            text.push_str("(still running; poll with status_check)");
        }
    }
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
