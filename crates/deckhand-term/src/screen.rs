// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use vt100::Parser;

/// Virtual screen fed by raw PTY bytes.
///
/// All text handed back to callers comes from the emulator's rendered
/// buffer, never from the byte stream: ANSI colours, cursor movement and
/// in-place line rewrites are resolved before anything is returned.
pub struct Screen {
    parser: Parser,
    /// Rendered lines as of the previous `take_delta` call.
    last_lines: Vec<String>,
}

impl Screen {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: Parser::new(rows, cols, 0),
            last_lines: Vec::new(),
        }
    }

    /// Feed raw bytes from the PTY master into the emulator.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows, cols);
    }

    /// Rendered screen text: rows right-trimmed, trailing blank rows dropped.
    pub fn rendered_lines(&self) -> Vec<String> {
        let contents = self.parser.screen().contents();
        let mut lines: Vec<String> = contents
            .lines()
            .map(|l| l.trim_end().to_string())
            .collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    pub fn rendered(&self) -> String {
        self.rendered_lines().join("\n")
    }

    pub fn last_non_empty_row(&self) -> Option<String> {
        self.rendered_lines()
            .into_iter()
            .rev()
            .find(|l| !l.trim().is_empty())
    }

    /// Text that changed since the previous call.
    ///
    /// Lines are compared from the top; everything after the longest common
    /// prefix is returned.  A rewrite of an existing line (progress bars)
    /// therefore re-emits that line instead of producing garbage deltas.
    pub fn take_delta(&mut self) -> String {
        let new_lines = self.rendered_lines();
        let common = self
            .last_lines
            .iter()
            .zip(new_lines.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let delta = new_lines[common..].join("\n");
        self.last_lines = new_lines;
        delta
    }

    /// Forget the delta baseline so the next `take_delta` re-emits the whole
    /// screen.  Used after a restart.
    pub fn reset_delta(&mut self) {
        self.last_lines.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_renders_verbatim() {
        let mut s = Screen::new(24, 80);
        s.feed(b"hello\r\nworld\r\n");
        assert_eq!(s.rendered(), "hello\nworld");
    }

    #[test]
    fn ansi_colour_codes_are_resolved() {
        let mut s = Screen::new(24, 80);
        s.feed(b"\x1b[31mred\x1b[0m text\r\n");
        assert_eq!(s.rendered(), "red text");
    }

    #[test]
    fn carriage_return_rewrites_line() {
        let mut s = Screen::new(24, 80);
        s.feed(b"progress 10%\rprogress 99%");
        assert_eq!(s.rendered(), "progress 99%");
    }

    #[test]
    fn delta_returns_only_new_lines() {
        let mut s = Screen::new(24, 80);
        s.feed(b"one\r\n");
        assert_eq!(s.take_delta(), "one");
        s.feed(b"two\r\n");
        assert_eq!(s.take_delta(), "two");
    }

    #[test]
    fn delta_reemits_rewritten_line() {
        let mut s = Screen::new(24, 80);
        s.feed(b"building 10%");
        assert_eq!(s.take_delta(), "building 10%");
        s.feed(b"\rbuilding 80%");
        assert_eq!(s.take_delta(), "building 80%");
    }

    #[test]
    fn delta_empty_when_nothing_changed() {
        let mut s = Screen::new(24, 80);
        s.feed(b"stable\r\n");
        let _ = s.take_delta();
        assert_eq!(s.take_delta(), "");
    }

    #[test]
    fn last_non_empty_row_skips_blanks() {
        let mut s = Screen::new(24, 80);
        s.feed(b"top\r\n\r\n\r\n");
        assert_eq!(s.last_non_empty_row().as_deref(), Some("top"));
    }

    #[test]
    fn reset_delta_reemits_screen() {
        let mut s = Screen::new(24, 80);
        s.feed(b"line\r\n");
        let _ = s.take_delta();
        s.reset_delta();
        assert_eq!(s.take_delta(), "line");
    }
}
