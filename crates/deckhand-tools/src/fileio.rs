// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! File reading with a shared token budget, and create-only writes.
//!
//! Reads are the only doorway into the write barrier: what gets returned
//! here is what the ledger records, and only ledger-current files may be
//! edited later.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ToolError;
use crate::ledger::{sha256_hex, ReadLedger};
use crate::mode::Mode;
use crate::syntax;
use crate::tokenizer::count_tokens;

/// Minimum leftover budget worth spending on another file; below this the
/// file is advertised instead of truncated into uselessness.
const MIN_CHUNK_TOKENS: usize = 32;

/// A `path:range` argument, range part optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub path: PathBuf,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

/// Split `raw` into path and optional `:start-end` / `:start-` / `:-end`
/// suffix.  A lone `:N` means the single line N.
pub fn parse_path_spec(raw: &str) -> Result<PathSpec, ToolError> {
    if let Some((path_part, suffix)) = raw.rsplit_once(':') {
        if !path_part.is_empty() && looks_like_range(suffix) {
            let (start, end) = parse_range(path_part, suffix)?;
            return Ok(PathSpec { path: PathBuf::from(path_part), start, end });
        }
    }
    Ok(PathSpec { path: PathBuf::from(raw), start: None, end: None })
}

fn looks_like_range(suffix: &str) -> bool {
    !suffix.is_empty()
        && suffix.chars().all(|c| c.is_ascii_digit() || c == '-')
        && suffix.chars().filter(|c| *c == '-').count() <= 1
}

fn parse_range(path: &str, suffix: &str) -> Result<(Option<usize>, Option<usize>), ToolError> {
    let bad = || ToolError::BadRange { path: path.to_string(), spec: format!(":{suffix}") };
    let (start, end) = match suffix.split_once('-') {
        None => {
            let n: usize = suffix.parse().map_err(|_| bad())?;
            (Some(n), Some(n))
        }
        Some((s, e)) => {
            let start = if s.is_empty() {
                None
            } else {
                Some(s.parse().map_err(|_| bad())?)
            };
            let end = if e.is_empty() {
                None
            } else {
                Some(e.parse().map_err(|_| bad())?)
            };
            (start, end)
        }
    };
    if start == Some(0) || end == Some(0) {
        return Err(bad());
    }
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(bad());
        }
    }
    if start.is_none() && end.is_none() {
        return Err(bad());
    }
    Ok((start, end))
}

/// Read a batch of files under a shared token budget.
///
/// Files that do not fit are cut into line chunks; the first chunk is
/// returned and the remaining ranges are advertised at the end of the
/// result so the caller can fetch them explicitly.
pub fn read_files(
    ledger: &mut ReadLedger,
    mode: &Mode,
    workspace: &Path,
    raw_paths: &[String],
    show_line_numbers: bool,
    max_tokens: usize,
) -> Result<String, ToolError> {
    let mut remaining = max_tokens;
    let mut sections: Vec<String> = Vec::new();
    let mut advertised: Vec<String> = Vec::new();

    for raw in raw_paths {
        let spec = parse_path_spec(raw)?;
        let path = resolve(&spec.path, workspace);

        if mode.confines_reads_to_workspace() && !path.starts_with(workspace) {
            return Err(ToolError::Forbidden {
                rule: "code_writer.workspace-only-reads".to_string(),
            });
        }

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                sections.push(format!("=== {} ===\nerror: {e}", path.display()));
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let hash = sha256_hex(&bytes);
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let start = spec.start.unwrap_or(1);
        let end = spec.end.unwrap_or(total.max(1)).min(total.max(1));
        if total > 0 && start > total {
            return Err(ToolError::BadRange {
                path: path.display().to_string(),
                spec: format!(":{start}-{end} (file has {total} lines)"),
            });
        }

        if total == 0 {
            ledger.note_read(&path, hash, (1, 1), 0);
            sections.push(format!("=== {} ===\n(empty file)", path.display()));
            continue;
        }

        let selected = &lines[start - 1..end];

        if remaining < MIN_CHUNK_TOKENS {
            advertised.push(format!("{}:{}-{}", path.display(), start, end));
            continue;
        }

        // Take lines until the budget would be exceeded; always at least one.
        let mut used = 0usize;
        let mut taken = 0usize;
        for line in selected {
            let cost = count_tokens(line) + 1;
            if taken > 0 && used + cost > remaining {
                break;
            }
            used += cost;
            taken += 1;
        }
        let last_shown = start + taken - 1;
        remaining = remaining.saturating_sub(used);

        let body = render_lines(&selected[..taken], start, show_line_numbers);
        let header = if start == 1 && last_shown == total {
            format!("=== {} ===", path.display())
        } else {
            format!("=== {}:{}-{} (of {} lines) ===", path.display(), start, last_shown, total)
        };
        sections.push(format!("{header}\n{body}"));

        // Advertise the rest of the requested range in chunks the size of
        // what was shown.
        if last_shown < end {
            let chunk = taken.max(1);
            let mut next = last_shown + 1;
            while next <= end {
                let stop = (next + chunk - 1).min(end);
                advertised.push(format!("{}:{}-{}", path.display(), next, stop));
                next = stop + 1;
            }
        }

        ledger.note_read(&path, hash, (start, last_shown), total);
        debug!(path = %path.display(), start, last_shown, total, "read recorded");
    }

    let mut out = sections.join("\n\n");
    if !advertised.is_empty() {
        out.push_str("\n\nnot returned (token budget); fetch with ReadFiles:\n");
        for ad in &advertised {
            out.push_str(&format!("  {ad}\n"));
        }
    }
    Ok(out)
}

fn render_lines(lines: &[&str], first_line_no: usize, numbered: bool) -> String {
    if numbered {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{} | {}", first_line_no + i, l))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        lines.join("\n")
    }
}

/// Create a file that does not yet exist (or is empty).
///
/// Returns the success message; syntax diagnostics are appended by the
/// caller-facing tool.
pub fn write_if_empty(
    ledger: &mut ReadLedger,
    mode: &Mode,
    workspace: &Path,
    raw_path: &str,
    content: &str,
) -> Result<(PathBuf, Vec<syntax::Diagnostic>), ToolError> {
    let path = resolve(Path::new(raw_path), workspace);
    mode.check_path_mutation(&path, workspace)?;

    match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > 0 => {
            return Err(ToolError::FileExists { path });
        }
        _ => {}
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ToolError::io("creating parent directories", e))?;
        }
    }
    std::fs::write(&path, content).map_err(|e| ToolError::io("writing file", e))?;

    ledger.note_write(&path, sha256_hex(content.as_bytes()), content.lines().count());
    let diags = syntax::check(&path, content);
    debug!(path = %path.display(), bytes = content.len(), "file created");
    Ok((path, diags))
}

/// Absolute paths pass through (symlinks resolved when possible); relative
/// paths are anchored at the workspace.
pub fn resolve(path: &Path, workspace: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    };
    joined.canonicalize().unwrap_or(joined)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
