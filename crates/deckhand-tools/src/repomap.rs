// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Token-budgeted map of the important files in a workspace.
//!
//! Ranking is deliberately cheap: conventional-root boosts plus a lexical
//! reference scan (files whose stem other small files mention score
//! higher).  No language-aware resolution, no disk mutation; the rendered
//! tree is the only output.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::debug;

use crate::tokenizer::count_tokens;

/// Hard cap on files considered; keeps the scan bounded on huge trees.
const MAX_FILES: usize = 2000;

/// Manifest / build files that anchor a project.
const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml", "package.json", "pyproject.toml", "setup.py", "go.mod",
    "Makefile", "CMakeLists.txt", "build.gradle", "pom.xml", "Gemfile",
    "Dockerfile", "docker-compose.yml",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "ts", "tsx", "js", "jsx", "go", "c", "h", "cpp", "hpp",
    "java", "rb", "sh", "sql", "proto",
];

#[derive(Debug)]
struct Candidate {
    rel: PathBuf,
    score: f64,
}

/// Build the map for `root`, spending at most `max_tokens` tokens.
pub fn build(root: &Path, max_tokens: usize, max_scan_bytes: u64) -> String {
    let files = collect_files(root);
    if files.is_empty() {
        return format!("{} (no files)", root.display());
    }
    let references = scan_references(root, &files, max_scan_bytes);

    let mut candidates: Vec<Candidate> = files
        .iter()
        .map(|rel| Candidate { score: score(rel, &references), rel: rel.clone() })
        .collect();
    // Deterministic: score descending, then path ascending.
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.rel.cmp(&b.rel))
    });

    render(root, &candidates, max_tokens)
}

/// Gitignore-aware, sorted, bounded file listing (workspace-relative).
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();
    for entry in walker.flatten() {
        if files.len() >= MAX_FILES {
            break;
        }
        if entry.file_type().is_some_and(|t| t.is_file()) {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    debug!(root = %root.display(), count = files.len(), "repo map scan");
    files
}

/// Count, per file stem, how many *other* small files mention it.
fn scan_references(
    root: &Path,
    files: &[PathBuf],
    max_scan_bytes: u64,
) -> HashMap<String, usize> {
    let stems: HashSet<String> = files
        .iter()
        .filter_map(|f| f.file_stem().and_then(|s| s.to_str()))
        .filter(|s| s.len() >= 3)
        .map(|s| s.to_string())
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for file in files {
        let abs = root.join(file);
        let small = std::fs::metadata(&abs)
            .map(|m| m.len() <= max_scan_bytes)
            .unwrap_or(false);
        if !small {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&abs) else {
            continue;
        };
        let own_stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let mentioned: HashSet<&str> = content
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|tok| tok.len() >= 3 && *tok != own_stem && stems.contains(*tok))
            .collect();
        for tok in mentioned {
            *counts.entry(tok.to_string()).or_default() += 1;
        }
    }
    counts
}

fn score(rel: &Path, references: &HashMap<String, usize>) -> f64 {
    let name = rel.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let stem = rel.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let ext = rel.extension().and_then(|e| e.to_str()).unwrap_or("");
    let depth = rel.components().count();

    let mut score = 1.0;
    if MANIFEST_NAMES.contains(&name) {
        score += 5.0;
    }
    if name.to_ascii_lowercase().starts_with("readme") {
        score += 4.0;
    }
    if SOURCE_EXTENSIONS.contains(&ext) {
        score += 1.0;
    }
    // Conventional top-level source roots.
    if let Some(first) = rel.components().next() {
        let first = first.as_os_str().to_string_lossy();
        if matches!(first.as_ref(), "src" | "lib" | "app" | "cmd" | "include") {
            score += 2.0;
        }
    }
    // Entry points are disproportionately informative.
    if matches!(stem, "main" | "lib" | "mod" | "index" | "__init__") {
        score += 1.0;
    }
    // Deep files matter less.
    score -= 0.25 * depth.saturating_sub(1) as f64;
    // Referenced-by-name boost, capped so one hub file cannot drown the rest.
    let refs = references.get(stem).copied().unwrap_or(0);
    score += 0.5 * refs.min(10) as f64;
    score
}

/// Render the selected files as an indented tree, stopping before the
/// budget is exceeded.
fn render(root: &Path, ranked: &[Candidate], max_tokens: usize) -> String {
    let header = format!("{}", root.display());
    let mut used = count_tokens(&header);
    let mut selected: Vec<&Path> = Vec::new();

    // Select by rank first, charging roughly one line per file.
    for cand in ranked {
        let line = cand.rel.display().to_string();
        let cost = count_tokens(&line) + 1;
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        selected.push(&cand.rel);
    }

    // Tree-render in path order; re-count exactly and truncate on budget.
    let mut tree: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for path in &selected {
        let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tree.entry(dir).or_default().push(name);
    }

    let mut out = header;
    let mut total = count_tokens(&out);
    'outer: for (dir, names) in &tree {
        if !dir.as_os_str().is_empty() {
            let dir_line = format!("\n  {}/", dir.display());
            let cost = count_tokens(&dir_line);
            if total + cost > max_tokens {
                break;
            }
            total += cost;
            out.push_str(&dir_line);
        }
        let indent = if dir.as_os_str().is_empty() { "  " } else { "    " };
        for name in names {
            let line = format!("\n{indent}{name}");
            let cost = count_tokens(&line);
            if total + cost > max_tokens {
                break 'outer;
            }
            total += cost;
            out.push_str(&line);
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::write(root.join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        std::fs::write(root.join("README.md"), "# x\n").unwrap();
        std::fs::write(root.join("src/main.rs"), "mod engine;\nfn main() {}\n").unwrap();
        std::fs::write(root.join("src/engine.rs"), "pub fn run() {}\n").unwrap();
        std::fs::write(root.join("target/debug/junk.txt"), "build artifact\n").unwrap();
        std::fs::write(root.join(".gitignore"), "target/\n").unwrap();
        dir
    }

    #[test]
    fn gitignored_files_are_excluded() {
        let dir = fixture();
        let map = build(dir.path(), 2048, 65536);
        assert!(!map.contains("junk.txt"), "{map}");
    }

    #[test]
    fn manifests_and_sources_are_included() {
        let dir = fixture();
        let map = build(dir.path(), 2048, 65536);
        assert!(map.contains("Cargo.toml"), "{map}");
        assert!(map.contains("main.rs"), "{map}");
        assert!(map.contains("README.md"), "{map}");
    }

    #[test]
    fn output_respects_token_budget() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..100 {
            std::fs::write(
                dir.path().join(format!("file_with_a_long_name_{i}.rs")),
                "pub fn x() {}\n",
            )
            .unwrap();
        }
        for budget in [64, 256, 1024] {
            let map = build(dir.path(), budget, 65536);
            assert!(
                count_tokens(&map) <= budget,
                "budget {budget} exceeded: {} tokens",
                count_tokens(&map)
            );
        }
    }

    #[test]
    fn referenced_files_outrank_unreferenced_ones() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // "engine" is referenced by two other files; "orphan" by none.
        std::fs::write(root.join("engine.rs"), "pub fn run() {}\n").unwrap();
        std::fs::write(root.join("orphan.rs"), "pub fn unused() {}\n").unwrap();
        std::fs::write(root.join("a.rs"), "use engine;\n").unwrap();
        std::fs::write(root.join("b.rs"), "engine::run();\n").unwrap();
        let refs = scan_references(root, &collect_files(root), 65536);
        assert!(refs.get("engine").copied().unwrap_or(0) >= 2);
        assert_eq!(refs.get("orphan").copied().unwrap_or(0), 0);

        let eng = score(Path::new("engine.rs"), &refs);
        let orp = score(Path::new("orphan.rs"), &refs);
        assert!(eng > orp, "engine={eng} orphan={orp}");
    }

    #[test]
    fn determinism_same_input_same_output() {
        let dir = fixture();
        let a = build(dir.path(), 1024, 65536);
        let b = build(dir.path(), 1024, 65536);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_workspace_renders_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let map = build(dir.path(), 1024, 65536);
        assert!(map.contains("no files"), "{map}");
    }

    #[test]
    fn tiny_budget_still_emits_header_only() {
        let dir = fixture();
        let map = build(dir.path(), 8, 65536);
        assert!(count_tokens(&map) <= 8 + count_tokens(&dir.path().display().to_string()));
    }
}
