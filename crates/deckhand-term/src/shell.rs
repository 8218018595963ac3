// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use deckhand_config::TerminalConfig;
use tracing::debug;

use crate::error::{ShellError, TermError};
use crate::session::{SpecialKey, Terminal};

/// Completion state reported with every shell interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The prompt came back; `code` is the exit status from the sentinel.
    Exited { code: i32 },
    /// Still running.  `streaming` is set when output was arriving right up
    /// to the deadline, as opposed to the command having gone quiet.
    Running { streaming: bool },
}

/// Output plus status plus the cwd observed from the latest prompt.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub output: String,
    pub status: CommandStatus,
    pub cwd: Option<PathBuf>,
}

/// The one-in-flight command state machine over [`Terminal`].
///
/// Exactly one command may be pending at any time; every entry point that
/// could start a second one refuses with `Busy` instead of interfering.
pub struct Shell {
    term: Terminal,
    pending: Option<Pending>,
    quantum: Duration,
    fresh_quanta: u32,
    last_exit: Option<i32>,
}

#[derive(Debug)]
struct Pending {
    command: String,
    started: Instant,
}

impl Shell {
    pub async fn start(cwd: &Path, cfg: &TerminalConfig) -> Result<Self, TermError> {
        let term = Terminal::start(cwd, cfg).await?;
        Ok(Self {
            term,
            pending: None,
            quantum: Duration::from_millis(cfg.poll_quantum_ms.max(10)),
            fresh_quanta: cfg.fresh_quanta.max(1),
            last_exit: None,
        })
    }

    /// Submit a command and wait per the heuristic.
    ///
    /// Multi-line input is rejected (use `send_text` for heredocs); a
    /// pending command yields `Busy` with the current screen snapshot.
    pub async fn run(&mut self, command: &str, wait: Duration) -> Result<CommandOutcome, ShellError> {
        if self.pending.is_some() {
            return Err(ShellError::Busy { screen: self.term.screen_text() });
        }
        if has_unescaped_newline(command) {
            return Err(ShellError::MultiLine);
        }
        debug!(%command, "running shell command");
        self.term.send_text(&format!("{command}\n")).map_err(|e| self.on_term_err(e))?;
        self.pending = Some(Pending { command: command.to_string(), started: Instant::now() });
        self.wait_for_output(wait, true).await
    }

    /// Re-enter the wait heuristic without sending anything.
    pub async fn status_check(&mut self, wait: Duration) -> Result<CommandOutcome, ShellError> {
        if self.pending.is_none() {
            return Err(ShellError::NoPending);
        }
        self.wait_for_output(wait, false).await
    }

    /// Write literal text (no newline appended).
    pub async fn send_text(
        &mut self,
        text: &str,
        wait: Option<Duration>,
    ) -> Result<CommandOutcome, ShellError> {
        self.term.send_text(text).map_err(|e| self.on_term_err(e))?;
        self.after_send(wait).await
    }

    pub async fn send_specials(
        &mut self,
        keys: &[SpecialKey],
        wait: Option<Duration>,
    ) -> Result<CommandOutcome, ShellError> {
        self.term.send_specials(keys).map_err(|e| self.on_term_err(e))?;
        self.after_send(wait).await
    }

    pub async fn send_ascii(
        &mut self,
        codes: &[u8],
        wait: Option<Duration>,
    ) -> Result<CommandOutcome, ShellError> {
        self.term.send_ascii(codes).map_err(|e| self.on_term_err(e))?;
        self.after_send(wait).await
    }

    /// Interrupt whatever is running; clears the pending command on success.
    pub async fn interrupt(&mut self) -> Result<(), TermError> {
        match self.term.interrupt().await {
            Ok(()) => {
                self.pending = None;
                Ok(())
            }
            Err(e) => {
                if matches!(e, TermError::ShellDead) {
                    self.pending = None;
                }
                Err(e)
            }
        }
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), TermError> {
        self.term.resize(rows, cols)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cwd(&self) -> Option<PathBuf> {
        self.term.last_mark().map(|m| m.cwd.clone())
    }

    pub fn is_dead(&self) -> bool {
        self.term.is_dead()
    }

    /// One-line status used to suffix every tool result.
    pub fn status_line(&self) -> String {
        if self.term.is_dead() {
            return "shell is dead; reinitialize with type=reset_shell".to_string();
        }
        match &self.pending {
            Some(p) => format!(
                "still running: {:?} ({}s elapsed)",
                p.command,
                p.started.elapsed().as_secs()
            ),
            None => match self.last_exit {
                Some(code) => format!("exited {code}"),
                None => "idle".to_string(),
            },
        }
    }

    pub fn kill(&mut self) {
        self.term.kill();
        self.pending = None;
    }

    async fn after_send(&mut self, wait: Option<Duration>) -> Result<CommandOutcome, ShellError> {
        match wait {
            Some(w) => self.wait_for_output(w, true).await,
            None => Ok(CommandOutcome {
                output: String::new(),
                status: match self.pending {
                    Some(_) => CommandStatus::Running { streaming: false },
                    None => CommandStatus::Exited { code: self.last_exit.unwrap_or(0) },
                },
                cwd: self.cwd(),
            }),
        }
    }

    /// The wait heuristic.
    ///
    /// Polls at the configured quantum.  Returns on idle; after the
    /// caller's deadline it returns immediately when output is actively
    /// streaming, and otherwise grants a short freshness window in case
    /// the prompt is about to land before giving up for this call.
    ///
    /// `require_change` guards the just-sent race: immediately after input
    /// is written the screen still shows the previous bare prompt, so idle
    /// must not be trusted until the screen has visibly reacted.
    async fn wait_for_output(
        &mut self,
        wait: Duration,
        require_change: bool,
    ) -> Result<CommandOutcome, ShellError> {
        let deadline = Instant::now() + wait;
        let fresh_window = self.quantum * self.fresh_quanta;
        let mut output = String::new();
        let mut seen_change = false;
        let mut last_activity = Instant::now();

        loop {
            let poll = match self.term.poll(self.quantum).await {
                Ok(p) => p,
                Err(e) => return Err(self.on_term_err(e).into()),
            };
            if poll.changed {
                seen_change = true;
                last_activity = Instant::now();
            }
            if !poll.delta.is_empty() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&poll.delta);
            }

            if poll.idle && (seen_change || !require_change) {
                let mark = self.term.last_mark();
                let code = mark.map(|m| m.exit_code).unwrap_or(0);
                let cwd = mark.map(|m| m.cwd.clone());
                self.pending = None;
                self.last_exit = Some(code);
                return Ok(CommandOutcome {
                    output,
                    status: CommandStatus::Exited { code },
                    cwd,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                if poll.changed {
                    // Continuous streaming past the deadline: hand back what
                    // we have and let the caller poll again.
                    return Ok(self.still_running(output, true));
                }
                if now.duration_since(last_activity) >= fresh_window {
                    return Ok(self.still_running(output, false));
                }
            }
        }
    }

    fn still_running(&self, output: String, streaming: bool) -> CommandOutcome {
        CommandOutcome {
            output,
            status: CommandStatus::Running { streaming },
            cwd: self.cwd(),
        }
    }

    fn on_term_err(&mut self, e: TermError) -> TermError {
        if matches!(e, TermError::ShellDead) {
            self.pending = None;
        }
        e
    }
}

/// True when `s` contains a newline not preceded by a backslash.
fn has_unescaped_newline(s: &str) -> bool {
    let bytes = s.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' && (i == 0 || bytes[i - 1] != b'\\') {
            return true;
        }
    }
    false
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_config::TerminalConfig;

    fn cfg() -> TerminalConfig {
        TerminalConfig {
            rows: 50,
            cols: 120,
            shell: Some("/bin/bash".to_string()),
            ..TerminalConfig::default()
        }
    }

    async fn shell() -> (tempfile::TempDir, Shell) {
        let dir = tempfile::tempdir().unwrap();
        let sh = Shell::start(&dir.path().canonicalize().unwrap(), &cfg())
            .await
            .unwrap();
        (dir, sh)
    }

    // ── Newline policy ────────────────────────────────────────────────────────

    #[test]
    fn unescaped_newline_detection() {
        assert!(has_unescaped_newline("echo a\necho b"));
        assert!(!has_unescaped_newline("echo a\\\necho b"));
        assert!(!has_unescaped_newline("echo one-liner"));
        assert!(has_unescaped_newline("\n"));
    }

    #[tokio::test]
    async fn run_rejects_multiline_command() {
        let (_d, mut sh) = shell().await;
        let err = sh
            .run("echo a\necho b", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::MultiLine));
        assert!(!sh.is_pending());
        sh.kill();
    }

    // ── Quick commands ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn quick_command_exits_zero() {
        let (_d, mut sh) = shell().await;
        let out = sh
            .run("echo fast_$((2*21))", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.output.contains("fast_42"), "{}", out.output);
        assert_eq!(out.status, CommandStatus::Exited { code: 0 });
        assert!(out.cwd.is_some());
        assert!(!sh.is_pending());
        sh.kill();
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let (_d, mut sh) = shell().await;
        let out = sh.run("exit 3", Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.status, CommandStatus::Exited { code: 3 });
        sh.kill();
    }

    #[tokio::test]
    async fn cwd_tracks_cd(){
        let (_d, mut sh) = shell().await;
        let out = sh.run("cd /tmp", Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.cwd.as_deref(), Some(Path::new("/tmp")));
        sh.kill();
    }

    // ── One-in-flight invariant ───────────────────────────────────────────────

    #[tokio::test]
    async fn second_run_while_pending_is_busy_with_snapshot() {
        let (_d, mut sh) = shell().await;
        let out = sh
            .run("echo first; sleep 30", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(out.status, CommandStatus::Running { .. }));
        assert!(sh.is_pending());

        let err = sh.run("echo second", Duration::ZERO).await.unwrap_err();
        match err {
            ShellError::Busy { screen } => {
                assert!(screen.contains("first"), "snapshot missing output: {screen}")
            }
            other => panic!("expected Busy, got {other:?}"),
        }
        sh.interrupt().await.unwrap();
        sh.kill();
    }

    // ── Streaming + status_check (long-running command scenario) ─────────────

    #[tokio::test]
    async fn streaming_command_returns_partial_then_finishes() {
        let (_d, mut sh) = shell().await;
        let out = sh
            .run(
                "for i in 1 2 3; do echo tick_$i; sleep 1; done",
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(matches!(out.status, CommandStatus::Running { .. }), "{:?}", out.status);
        assert!(out.output.contains("tick_1"), "partial output: {}", out.output);

        let rest = sh.status_check(Duration::from_secs(10)).await.unwrap();
        assert_eq!(rest.status, CommandStatus::Exited { code: 0 });
        assert!(rest.output.contains("tick_3"), "rest: {}", rest.output);
        assert!(!sh.is_pending());
        sh.kill();
    }

    #[tokio::test]
    async fn status_check_without_pending_command_fails() {
        let (_d, mut sh) = shell().await;
        let err = sh.status_check(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ShellError::NoPending));
        sh.kill();
    }

    // ── Interactive input ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_text_feeds_a_waiting_reader() {
        let (_d, mut sh) = shell().await;
        let out = sh
            .run("read -r reply; echo got:$reply", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(out.status, CommandStatus::Running { .. }));

        let fin = sh
            .send_text("hello\n", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(matches!(fin.status, CommandStatus::Exited { .. }), "{:?}", fin.status);
        assert!(fin.output.contains("got:hello"), "{}", fin.output);
        sh.kill();
    }

    #[tokio::test]
    async fn ctrl_c_special_is_a_keystroke_not_an_interrupt() {
        let (_d, mut sh) = shell().await;
        let _ = sh.run("sleep 30", Duration::from_secs(1)).await.unwrap();
        let out = sh
            .send_specials(&[SpecialKey::CtrlC], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        // The keystroke lands at the child like any other byte; bash ends
        // the sleep and prompts again.
        assert!(matches!(out.status, CommandStatus::Exited { .. }), "{:?}", out.status);
        sh.kill();
    }

    #[tokio::test]
    async fn send_ascii_round_trip() {
        let (_d, mut sh) = shell().await;
        // "echo hi" followed by newline, as raw codes.
        let codes: Vec<u8> = b"echo ascii_$((5+5))\n".to_vec();
        let out = sh
            .send_ascii(&codes, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(out.output.contains("ascii_10"), "{}", out.output);
        sh.kill();
    }

    // ── Interrupt ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn interrupt_clears_pending_and_shell_survives() {
        let (_d, mut sh) = shell().await;
        let _ = sh.run("sleep 100", Duration::from_secs(1)).await.unwrap();
        assert!(sh.is_pending());
        sh.interrupt().await.unwrap();
        assert!(!sh.is_pending());

        let out = sh.run("echo ok_$((3*3))", Duration::from_secs(10)).await.unwrap();
        assert!(out.output.contains("ok_9"), "{}", out.output);
        assert_eq!(out.status, CommandStatus::Exited { code: 0 });
        sh.kill();
    }

    // ── Status line ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn status_line_reflects_state() {
        let (_d, mut sh) = shell().await;
        assert_eq!(sh.status_line(), "idle");
        let _ = sh.run("echo x", Duration::from_secs(10)).await.unwrap();
        assert_eq!(sh.status_line(), "exited 0");
        let _ = sh.run("sleep 30", Duration::from_secs(1)).await.unwrap();
        assert!(sh.status_line().contains("still running"), "{}", sh.status_line());
        sh.interrupt().await.unwrap();
        sh.kill();
    }
}
