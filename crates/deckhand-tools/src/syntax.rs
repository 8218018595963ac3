// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Post-write syntax checking.
//!
//! The grammar is picked from the file extension; parsing never fails the
//! operation — diagnostics ride along with the successful result.  A file
//! type with no compiled-in grammar yields no diagnostics at all.

use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Node, Parser};

/// Upper bound on reported diagnostics per check; the rest is summarised.
const MAX_DIAGNOSTICS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    pub snippet: String,
}

/// Parse `source` with the grammar matching `path`'s extension and collect
/// error locations.  Empty result means "no grammar" or "no errors".
pub fn check(path: &Path, source: &str) -> Vec<Diagnostic> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let Some(language) = language_for(&ext) else {
        return Vec::new();
    };

    let mut parser = Parser::new();
    if parser.set_language(&language).is_err() {
        return Vec::new();
    }
    let Some(tree) = parser.parse(source, None) else {
        return Vec::new();
    };

    let mut diags = Vec::new();
    let lines: Vec<&str> = source.lines().collect();
    collect_errors(tree.root_node(), &lines, &mut diags);
    debug!(path = %path.display(), count = diags.len(), "syntax check");
    diags
}

/// Render diagnostics the way they are appended to tool results.
pub fn render(diags: &[Diagnostic]) -> String {
    if diags.is_empty() {
        return String::new();
    }
    let mut out = String::from("syntax errors detected:\n");
    for d in diags.iter().take(MAX_DIAGNOSTICS) {
        out.push_str(&format!("  line {}, col {}: {}\n", d.line, d.column, d.snippet));
    }
    if diags.len() > MAX_DIAGNOSTICS {
        out.push_str(&format!("  (+{} more)\n", diags.len() - MAX_DIAGNOSTICS));
    }
    out
}

fn collect_errors(node: Node, lines: &[&str], out: &mut Vec<Diagnostic>) {
    if !node.has_error() {
        return;
    }
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        let snippet = lines
            .get(pos.row)
            .map(|l| l.trim().chars().take(80).collect::<String>())
            .unwrap_or_default();
        out.push(Diagnostic { line: pos.row + 1, column: pos.column + 1, snippet });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_errors(child, lines, out);
    }
}

fn language_for(ext: &str) -> Option<Language> {
    let lang: Language = match ext {
        "sh" | "bash" => tree_sitter_bash::LANGUAGE.into(),
        "py" | "pyi" => tree_sitter_python::LANGUAGE.into(),
        "js" | "mjs" | "cjs" | "jsx" => tree_sitter_javascript::LANGUAGE.into(),
        "ts" | "mts" | "cts" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "tsx" => tree_sitter_typescript::LANGUAGE_TSX.into(),
        "go" => tree_sitter_go::LANGUAGE.into(),
        "rs" => tree_sitter_rust::LANGUAGE.into(),
        "c" | "h" => tree_sitter_c::LANGUAGE.into(),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => tree_sitter_cpp::LANGUAGE.into(),
        "java" => tree_sitter_java::LANGUAGE.into(),
        "json" => tree_sitter_json::LANGUAGE.into(),
        _ => return None,
    };
    Some(lang)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_python_has_no_diagnostics() {
        let diags = check(Path::new("a.py"), "def f():\n    return 1\n");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn broken_python_reports_location() {
        let diags = check(Path::new("a.py"), "def f(:\n    return 1\n");
        assert!(!diags.is_empty());
        assert_eq!(diags[0].line, 1);
    }

    #[test]
    fn broken_json_is_caught() {
        let diags = check(Path::new("cfg.json"), "{\"a\": 1,}");
        assert!(!diags.is_empty());
    }

    #[test]
    fn valid_rust_has_no_diagnostics() {
        let diags = check(Path::new("m.rs"), "fn main() { let x = 1; }\n");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn broken_rust_is_caught() {
        let diags = check(Path::new("m.rs"), "fn main( { let x = ; }\n");
        assert!(!diags.is_empty());
    }

    #[test]
    fn unknown_extension_yields_empty() {
        assert!(check(Path::new("notes.txt"), "anything {{{").is_empty());
        assert!(check(Path::new("data.yaml"), "key: [unclosed").is_empty());
        assert!(check(Path::new("noext"), "x").is_empty());
    }

    #[test]
    fn broken_bash_is_caught() {
        let diags = check(Path::new("run.sh"), "if [ -f x ]; then\necho hi\n");
        assert!(!diags.is_empty());
    }

    #[test]
    fn render_empty_is_empty_string() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn render_caps_output_and_counts_rest() {
        let diags: Vec<Diagnostic> = (1..=8)
            .map(|i| Diagnostic { line: i, column: 1, snippet: format!("bad {i}") })
            .collect();
        let text = render(&diags);
        assert!(text.contains("line 1"));
        assert!(text.contains("(+3 more)"));
        assert!(!text.contains("bad 7"));
    }

    #[test]
    fn columns_are_one_based() {
        let diags = check(Path::new("x.json"), "[1, ]");
        assert!(!diags.is_empty());
        assert!(diags[0].column >= 1);
    }
}
