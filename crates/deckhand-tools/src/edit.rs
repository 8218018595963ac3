// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! SEARCH/REPLACE block engine.
//!
//! Blocks apply strictly top-to-bottom and never backtrack past text an
//! earlier block produced.  Matching escalates: exact, then whitespace
//! tolerant (recording the indent shift), then a best-effort "closest
//! candidate" report for the failure message.  One bad block fails the
//! whole call; the file is written only when every block landed.

use similar::{ChangeTag, TextDiff};

use crate::error::ToolError;

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// Candidates below this similarity are not worth reporting as "closest".
const REPORT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBlock {
    pub search: Vec<String>,
    pub replace: Vec<String>,
}

/// Result of a fully applied edit payload.
#[derive(Debug)]
pub struct EditOutcome {
    pub content: String,
    /// 1-based indexes of the applied blocks, in order.
    pub applied: Vec<usize>,
    /// Non-fatal indent warnings, one per tolerantly-matched block.
    pub warnings: Vec<String>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse the delimited payload into ordered blocks.
pub fn parse_blocks(payload: &str) -> Result<Vec<EditBlock>, ToolError> {
    enum State {
        Outside,
        InSearch,
        InReplace,
    }
    let mut state = State::Outside;
    let mut blocks = Vec::new();
    let mut search: Vec<String> = Vec::new();
    let mut replace: Vec<String> = Vec::new();

    for (no, line) in payload.lines().enumerate() {
        let marker = line.trim_end();
        match state {
            State::Outside => {
                if marker == SEARCH_MARKER {
                    state = State::InSearch;
                } else if !marker.trim().is_empty() {
                    return Err(ToolError::MalformedEdit(format!(
                        "line {}: expected {SEARCH_MARKER:?}, found {marker:?}",
                        no + 1
                    )));
                }
            }
            State::InSearch => {
                if marker == DIVIDER_MARKER {
                    state = State::InReplace;
                } else if marker == SEARCH_MARKER || marker == REPLACE_MARKER {
                    return Err(ToolError::MalformedEdit(format!(
                        "line {}: unexpected {marker:?} inside a SEARCH body",
                        no + 1
                    )));
                } else {
                    search.push(line.to_string());
                }
            }
            State::InReplace => {
                if marker == REPLACE_MARKER {
                    if search.is_empty() {
                        return Err(ToolError::MalformedEdit(format!(
                            "block #{}: empty SEARCH body",
                            blocks.len() + 1
                        )));
                    }
                    blocks.push(EditBlock {
                        search: std::mem::take(&mut search),
                        replace: std::mem::take(&mut replace),
                    });
                    state = State::Outside;
                } else if marker == SEARCH_MARKER || marker == DIVIDER_MARKER {
                    return Err(ToolError::MalformedEdit(format!(
                        "line {}: unexpected {marker:?} inside a REPLACE body",
                        no + 1
                    )));
                } else {
                    replace.push(line.to_string());
                }
            }
        }
    }

    match state {
        State::Outside if !blocks.is_empty() => Ok(blocks),
        State::Outside => Err(ToolError::MalformedEdit(
            "no SEARCH/REPLACE blocks found".to_string(),
        )),
        _ => Err(ToolError::MalformedEdit(
            "unterminated block: missing marker".to_string(),
        )),
    }
}

// ── Matching helpers ──────────────────────────────────────────────────────────

/// Similarity ratio in [0,1] using character-level diff (2×matches / total).
fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    let matching: usize = diff
        .iter_all_changes()
        .filter(|c| c.tag() == ChangeTag::Equal)
        .map(|c| c.value().len())
        .sum();
    (matching * 2) as f64 / total as f64
}

/// Minimum leading-whitespace count across non-empty lines.
fn common_indent(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0)
}

/// Strip `indent` leading characters from every line (trim fully if shorter).
fn strip_indent(lines: &[&str], indent: usize) -> Vec<String> {
    lines
        .iter()
        .map(|l| {
            if l.len() >= indent {
                l[indent..].to_string()
            } else {
                l.trim_start().to_string()
            }
        })
        .collect()
}

/// Shift leading whitespace on `line` by `delta` spaces.
fn adjust_indent(line: &str, delta: i64) -> String {
    if delta == 0 || line.trim().is_empty() {
        return line.to_string();
    }
    if delta > 0 {
        format!("{}{line}", " ".repeat(delta as usize))
    } else {
        let remove = (-delta) as usize;
        let available = line.len() - line.trim_start().len();
        line[remove.min(available)..].to_string()
    }
}

enum Match {
    Exact(usize),
    Tolerant { pos: usize, delta: i64 },
}

/// Locate `search` in `file_lines`, never before `min_line`-respecting
/// ordering when several candidates exist.
fn locate(
    file_lines: &[String],
    search: &[String],
    min_line: usize,
    block_index: usize,
) -> Result<Match, ToolError> {
    let n = search.len();
    if n > file_lines.len() {
        return Err(no_match(file_lines, search, block_index));
    }
    let file_refs: Vec<&str> = file_lines.iter().map(String::as_str).collect();
    let search_refs: Vec<&str> = search.iter().map(String::as_str).collect();

    // Exact.
    let exact: Vec<usize> = (0..=(file_refs.len() - n))
        .filter(|&i| file_refs[i..i + n] == search_refs[..])
        .collect();
    match exact.len() {
        1 => return Ok(Match::Exact(exact[0])),
        0 => {}
        _ => {
            // Edits proceed top-to-bottom; prefer the first candidate at or
            // after the end of the last applied block.
            if let Some(&pos) = exact.iter().find(|&&p| p >= min_line) {
                return Ok(Match::Exact(pos));
            }
            return Err(ToolError::Ambiguous {
                index: block_index,
                offsets: exact.iter().map(|p| p + 1).collect(),
            });
        }
    }

    // Whitespace tolerant: trailing whitespace ignored, common leading
    // indent normalised on both sides.
    let search_stripped: Vec<&str> = search_refs.iter().map(|l| l.trim_end()).collect();
    let search_indent = common_indent(&search_stripped);
    let norm_search = strip_indent(&search_stripped, search_indent);

    let tolerant: Vec<(usize, i64)> = (0..=(file_refs.len() - n))
        .filter_map(|i| {
            let win: Vec<&str> = file_refs[i..i + n].iter().map(|l| l.trim_end()).collect();
            let win_indent = common_indent(&win);
            let norm_win = strip_indent(&win, win_indent);
            if norm_win == norm_search {
                Some((i, win_indent as i64 - search_indent as i64))
            } else {
                None
            }
        })
        .collect();
    match tolerant.len() {
        1 => {
            let (pos, delta) = tolerant[0];
            return Ok(Match::Tolerant { pos, delta });
        }
        0 => {}
        _ => {
            if let Some(&(pos, delta)) = tolerant.iter().find(|(p, _)| *p >= min_line) {
                return Ok(Match::Tolerant { pos, delta });
            }
            return Err(ToolError::Ambiguous {
                index: block_index,
                offsets: tolerant.iter().map(|(p, _)| p + 1).collect(),
            });
        }
    }

    Err(no_match(file_lines, search, block_index))
}

/// Build the `NoMatch` error with the closest candidate window attached.
fn no_match(file_lines: &[String], search: &[String], block_index: usize) -> ToolError {
    let n = search.len().max(1);
    let joined = search.join("\n");
    let file_refs: Vec<&str> = file_lines.iter().map(String::as_str).collect();

    let mut best: Option<(f64, usize)> = None;
    if file_refs.len() >= n {
        for i in 0..=(file_refs.len() - n) {
            let ratio = similarity_ratio(&joined, &file_refs[i..i + n].join("\n"));
            if ratio > REPORT_THRESHOLD && best.map(|(r, _)| ratio > r).unwrap_or(true) {
                best = Some((ratio, i));
            }
        }
    }

    let closest = match best {
        Some((ratio, i)) => {
            let mut text = format!(
                "closest candidate at lines {}-{} ({:.0}% similar):\n",
                i + 1,
                i + n,
                ratio * 100.0
            );
            for line in &file_refs[i..i + n] {
                text.push_str(&format!("  |{line}|\n"));
            }
            text.push_str("re-read the file, fix the SEARCH body, and retry");
            text
        }
        None => "no similar text found; re-read the file".to_string(),
    };
    ToolError::NoMatch { index: block_index, closest }
}

// ── Application ───────────────────────────────────────────────────────────────

/// Apply every block in order.  All-or-nothing: the first failing block
/// aborts and the original content is untouched.
pub fn apply_blocks(content: &str, blocks: &[EditBlock]) -> Result<EditOutcome, ToolError> {
    let had_trailing_newline = content.ends_with('\n') || content.is_empty();
    let mut file_lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut applied = Vec::new();
    let mut warnings = Vec::new();
    let mut min_line = 0usize;

    for (idx, block) in blocks.iter().enumerate() {
        let block_no = idx + 1;
        match locate(&file_lines, &block.search, min_line, block_no)? {
            Match::Exact(pos) => {
                let end = pos + block.search.len();
                file_lines.splice(pos..end, block.replace.iter().cloned());
                min_line = pos + block.replace.len();
            }
            Match::Tolerant { pos, delta } => {
                let end = pos + block.search.len();
                let replacement: Vec<String> = block
                    .replace
                    .iter()
                    .map(|l| adjust_indent(l, delta))
                    .collect();
                let replace_len = replacement.len();
                file_lines.splice(pos..end, replacement);
                min_line = pos + replace_len;
                if delta != 0 {
                    warnings.push(format!(
                        "block #{block_no}: matched with whitespace tolerance; replacement \
                         re-indented by {delta:+} spaces"
                    ));
                } else {
                    warnings.push(format!(
                        "block #{block_no}: matched ignoring trailing whitespace"
                    ));
                }
            }
        }
        applied.push(block_no);
    }

    let mut new_content = file_lines.join("\n");
    if had_trailing_newline && !new_content.is_empty() {
        new_content.push('\n');
    }
    Ok(EditOutcome { content: new_content, applied, warnings })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
