// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use deckhand_config::TerminalConfig;
use tracing::{debug, warn};

use crate::error::TermError;
use crate::pty::PtyProcess;
use crate::screen::Screen;
use crate::sentinel::{PromptMark, Sentinel};

/// Budget for the shell to present its first prompt after spawn.
const STARTUP_BUDGET: Duration = Duration::from_secs(10);

/// How long `interrupt` waits for a prompt after each Ctrl-C.
const INTERRUPT_BUDGET: Duration = Duration::from_millis(1500);

/// Symbolic keys accepted over the interaction surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Enter,
    KeyUp,
    KeyDown,
    KeyLeft,
    KeyRight,
    CtrlC,
    CtrlD,
}

impl SpecialKey {
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            SpecialKey::Enter => b"\n",
            SpecialKey::KeyUp => b"\x1b[A",
            SpecialKey::KeyDown => b"\x1b[B",
            SpecialKey::KeyRight => b"\x1b[C",
            SpecialKey::KeyLeft => b"\x1b[D",
            SpecialKey::CtrlC => b"\x03",
            SpecialKey::CtrlD => b"\x04",
        }
    }
}

impl FromStr for SpecialKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enter" => Ok(SpecialKey::Enter),
            "Key-up" => Ok(SpecialKey::KeyUp),
            "Key-down" => Ok(SpecialKey::KeyDown),
            "Key-left" => Ok(SpecialKey::KeyLeft),
            "Key-right" => Ok(SpecialKey::KeyRight),
            "Ctrl-c" => Ok(SpecialKey::CtrlC),
            "Ctrl-d" => Ok(SpecialKey::CtrlD),
            other => Err(format!(
                "unknown special key {other:?}; expected one of \
                 Enter, Key-up, Key-down, Key-left, Key-right, Ctrl-c, Ctrl-d"
            )),
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Rendered, sentinel-stripped text that changed since the last poll.
    pub delta: String,
    /// Whether the rendered screen changed at all, prompt rows included.
    /// A freshly echoed command changes only its (stripped) prompt row, so
    /// `delta` alone under-reports activity.
    pub changed: bool,
    /// The shell is sitting at a bare prompt.
    pub idle: bool,
}

/// The persistent terminal session: one PTY child, one virtual screen.
pub struct Terminal {
    pty: PtyProcess,
    screen: Screen,
    sentinel: Sentinel,
    last_mark: Option<PromptMark>,
    dead: bool,
}

impl Terminal {
    /// Spawn the shell in `cwd` and wait for the first sentinel prompt.
    ///
    /// The configured shell wins; otherwise `$SHELL` is honoured when it is
    /// bash-compatible (the sentinel rides on `PROMPT_COMMAND`/`PS1`), with
    /// `/bin/bash` as the fallback.
    pub async fn start(cwd: &Path, cfg: &TerminalConfig) -> Result<Self, TermError> {
        let program = cfg
            .shell
            .clone()
            .or_else(preferred_shell)
            .unwrap_or_else(|| "/bin/bash".to_string());

        let env = vec![
            ("TERM".to_string(), "xterm-256color".to_string()),
            ("PAGER".to_string(), "cat".to_string()),
            ("GIT_PAGER".to_string(), "cat".to_string()),
        ];
        let mut pty = PtyProcess::spawn(&program, cwd, &env, cfg.rows, cfg.cols)?;
        let sentinel = Sentinel::new();
        pty.write_all(format!(" {}\n", sentinel.init_statement()).as_bytes())?;

        let mut term = Self {
            pty,
            screen: Screen::new(cfg.rows, cfg.cols),
            sentinel,
            last_mark: None,
            dead: false,
        };

        let deadline = Instant::now() + STARTUP_BUDGET;
        loop {
            let poll = term.poll(Duration::from_millis(100)).await?;
            if poll.idle {
                break;
            }
            if Instant::now() >= deadline {
                return Err(TermError::StartupTimeout(format!(
                    "{program} produced no prompt"
                )));
            }
        }
        // Discard startup noise so the first command's output starts clean.
        let _ = term.screen.take_delta();
        debug!(%program, "terminal ready");
        Ok(term)
    }

    /// Drain available output for up to `max_wait`.
    ///
    /// Returns as soon as a burst of output has been consumed, or when the
    /// wait elapses with nothing to read.  The returned delta is rendered,
    /// sentinel-stripped text.
    pub async fn poll(&mut self, max_wait: Duration) -> Result<PollResult, TermError> {
        if self.dead {
            return Err(TermError::ShellDead);
        }
        let deadline = Instant::now() + max_wait;
        let tick = Duration::from_millis(10);
        let mut saw_output = false;
        loop {
            match self.pty.read_available() {
                Ok(bytes) if !bytes.is_empty() => {
                    saw_output = true;
                    self.screen.feed(&bytes);
                    // Keep draining the burst without sleeping.
                }
                Ok(_) => {
                    if saw_output || Instant::now() >= deadline {
                        break;
                    }
                    tokio::time::sleep(tick).await;
                }
                Err(TermError::ShellDead) => {
                    warn!("shell child terminated");
                    self.dead = true;
                    return Err(TermError::ShellDead);
                }
                Err(e) => return Err(e),
            }
        }

        let raw_delta = self.screen.take_delta();
        let delta = self.sentinel.strip(&raw_delta);
        let idle = match self.screen.last_non_empty_row() {
            Some(row) => {
                let is_prompt = self.sentinel.is_prompt_row(&row);
                if is_prompt {
                    if let Some(mark) = self.sentinel.parse(&row) {
                        self.last_mark = Some(mark);
                    }
                }
                is_prompt
            }
            None => false,
        };
        Ok(PollResult { delta, changed: !raw_delta.is_empty(), idle })
    }

    /// Write literal bytes to the PTY master.  No newline is added.
    pub fn send_text(&mut self, text: &str) -> Result<(), TermError> {
        self.ensure_alive()?;
        self.pty.write_all(text.as_bytes())
    }

    pub fn send_specials(&mut self, keys: &[SpecialKey]) -> Result<(), TermError> {
        self.ensure_alive()?;
        let mut bytes = Vec::new();
        for key in keys {
            bytes.extend_from_slice(key.bytes());
        }
        self.pty.write_all(&bytes)
    }

    pub fn send_ascii(&mut self, codes: &[u8]) -> Result<(), TermError> {
        self.ensure_alive()?;
        self.pty.write_all(codes)
    }

    /// Ctrl-C, wait for a prompt, Ctrl-C again if needed.
    pub async fn interrupt(&mut self) -> Result<(), TermError> {
        for attempt in 0..2 {
            self.send_specials(&[SpecialKey::CtrlC])?;
            let deadline = Instant::now() + INTERRUPT_BUDGET;
            while Instant::now() < deadline {
                let poll = self.poll(Duration::from_millis(100)).await?;
                if poll.idle {
                    return Ok(());
                }
            }
            if attempt == 0 {
                warn!("interrupt: still busy after Ctrl-C, sending again");
            }
        }
        Err(TermError::StillRunning)
    }

    /// Resize the PTY and the virtual screen together.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), TermError> {
        self.ensure_alive()?;
        self.pty.resize(rows, cols)?;
        self.screen.resize(rows, cols);
        Ok(())
    }

    /// Current rendered screen with sentinel chrome removed.
    pub fn screen_text(&self) -> String {
        self.sentinel.strip(&self.screen.rendered())
    }

    pub fn last_mark(&self) -> Option<&PromptMark> {
        self.last_mark.as_ref()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Tear the child down.  Restarting means constructing a new Terminal.
    pub fn kill(&mut self) {
        self.pty.kill();
        self.dead = true;
    }

    fn ensure_alive(&mut self) -> Result<(), TermError> {
        if self.dead || !self.pty.is_alive() {
            self.dead = true;
            return Err(TermError::ShellDead);
        }
        Ok(())
    }
}

/// `$SHELL` when it names bash, else `None`.  The sentinel prompt relies
/// on `PROMPT_COMMAND`/`PS1` expansion, which plain `sh` implementations
/// (dash) do not perform.
fn preferred_shell() -> Option<String> {
    let shell = std::env::var("SHELL").ok()?;
    let name = Path::new(&shell).file_name()?.to_str()?;
    (name == "bash").then_some(shell)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
