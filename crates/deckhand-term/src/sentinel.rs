// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use regex::Regex;

/// Prefix shared by every sentinel line.  The full form is
/// `__WCGW_END__<nonce>__<exit>__<pwd>__` and is emitted by the shell as
/// part of its prompt, so "the sentinel is the last row" means "the shell
/// is at a prompt".
const MARKER: &str = "__WCGW_END__";

/// Exit status and working directory carried by a sentinel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMark {
    pub exit_code: i32,
    pub cwd: PathBuf,
}

/// Per-session prompt sentinel.
///
/// The nonce makes the marker unique per terminal so that output which
/// happens to *print* a sentinel-shaped string (e.g. `cat` of a log from
/// another session) cannot spoof idleness.
pub struct Sentinel {
    prefix: String,
    /// Matches a row that is exactly a prompt: sentinel and nothing else.
    /// A row with typed-but-pending input after the prompt must NOT match,
    /// otherwise a command would look finished the moment it is echoed.
    row_re: Regex,
}

impl Sentinel {
    pub fn new() -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self::with_nonce(&nonce[..12])
    }

    pub fn with_nonce(nonce: &str) -> Self {
        let prefix = format!("{MARKER}{nonce}__");
        let row_re = Regex::new(&format!(r"^{}(\d+)__(.*)__\s*$", regex::escape(&prefix)))
            .expect("sentinel regex is static");
        Self { prefix, row_re }
    }

    /// One-shot shell statement establishing the sentinel prompt.
    ///
    /// `PROMPT_COMMAND` captures `$?` before the prompt is drawn; `PS1`
    /// starts with a newline so the sentinel always begins in column zero.
    pub fn init_statement(&self) -> String {
        format!(
            "export PROMPT_COMMAND='DECKHAND_EC=$?'; \
             export PS1='\\n{prefix}${{DECKHAND_EC}}__${{PWD}}__ '; \
             export PS2=''; \
             bind 'set enable-bracketed-paste off' 2>/dev/null",
            prefix = self.prefix
        )
    }

    /// True when `row` is a bare prompt row (idle shell).
    pub fn is_prompt_row(&self, row: &str) -> bool {
        self.row_re.is_match(row)
    }

    /// Parse exit status and cwd out of a bare prompt row.
    pub fn parse(&self, row: &str) -> Option<PromptMark> {
        let caps = self.row_re.captures(row)?;
        let exit_code: i32 = caps.get(1)?.as_str().parse().ok()?;
        let cwd = PathBuf::from(caps.get(2)?.as_str());
        Some(PromptMark { exit_code, cwd })
    }

    /// Remove every prompt line from `text`.  Rows beginning with the
    /// sentinel are prompt chrome (possibly with echoed input after it),
    /// not command output, and must never reach the caller.
    pub fn strip(&self, text: &str) -> String {
        text.lines()
            .filter(|l| !l.trim_start().starts_with(&self.prefix))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
