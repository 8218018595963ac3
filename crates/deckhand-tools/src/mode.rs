// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Mode policy: a pure decision from (mode, operation, target) to allow or
//! deny.  Checked before every mutating operation and before every shell
//! command; deny carries the rule name that fired.

use std::path::Path;

use deckhand_config::{AllowedItems, CodeWriterConfig, ModeName};
use regex::Regex;

use crate::error::ToolError;

/// Commands whose first token is considered read-only in architect mode.
/// Everything not listed is denied by default.
const READ_ONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "less", "more", "grep", "rg", "ack", "find",
    "fd", "pwd", "echo", "printf", "wc", "stat", "file", "du", "df", "ps",
    "env", "printenv", "which", "whereis", "whoami", "id", "date", "uname",
    "tree", "sort", "uniq", "cut", "diff", "cmp", "md5sum", "sha256sum",
    "readlink", "realpath", "basename", "dirname", "type", "man", "help",
];

/// `git` is allowed in architect mode only with an inspection subcommand.
const READ_ONLY_GIT_SUBCOMMANDS: &[&str] = &[
    "status", "log", "diff", "show", "branch", "remote", "blame", "describe",
    "shortlog", "rev-parse", "ls-files",
];

/// Resolved operating mode of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Unrestricted,
    Architect,
    CodeWriter(CodeWriterConfig),
}

impl Mode {
    pub fn from_parts(name: ModeName, cw: Option<CodeWriterConfig>) -> Self {
        match name {
            ModeName::Wcgw => Mode::Unrestricted,
            ModeName::Architect => Mode::Architect,
            ModeName::CodeWriter => Mode::CodeWriter(cw.unwrap_or_default()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Unrestricted => "wcgw",
            Mode::Architect => "architect",
            Mode::CodeWriter(_) => "code_writer",
        }
    }

    /// Human-readable policy summary included in Initialize results.
    pub fn summary(&self) -> String {
        match self {
            Mode::Unrestricted => "mode: wcgw (no restrictions)".to_string(),
            Mode::Architect => {
                "mode: architect (read-only; file mutation disabled, shell limited to \
                 inspection commands)"
                    .to_string()
            }
            Mode::CodeWriter(cfg) => {
                let globs = describe_items(&cfg.allowed_globs);
                let commands = describe_items(&cfg.allowed_commands);
                format!("mode: code_writer (writable globs: {globs}; allowed commands: {commands})")
            }
        }
    }

    /// May `command` be submitted to the shell?
    pub fn check_command(&self, command: &str) -> Result<(), ToolError> {
        match self {
            Mode::Unrestricted => Ok(()),
            Mode::Architect => check_read_only_command(command),
            Mode::CodeWriter(cfg) => {
                if cfg.allowed_commands.is_all() {
                    return Ok(());
                }
                let hit = cfg
                    .allowed_commands
                    .patterns()
                    .iter()
                    .any(|p| glob_matches_path(p, command.trim()));
                if hit {
                    Ok(())
                } else {
                    Err(ToolError::Forbidden {
                        rule: "code_writer.allowed_commands".to_string(),
                    })
                }
            }
        }
    }

    /// May raw interactive input (text, keys, ascii) be injected?
    ///
    /// Architect denies: keystrokes reaching an interactive program are
    /// writes the allowlist cannot inspect.
    pub fn check_interaction(&self) -> Result<(), ToolError> {
        match self {
            Mode::Architect => Err(ToolError::Forbidden {
                rule: "architect.no-interactive-input".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// May `path` be created or modified?
    pub fn check_path_mutation(&self, path: &Path, workspace: &Path) -> Result<(), ToolError> {
        match self {
            Mode::Unrestricted => Ok(()),
            Mode::Architect => Err(ToolError::Forbidden {
                rule: "architect.no-file-mutation".to_string(),
            }),
            Mode::CodeWriter(cfg) => {
                if cfg.allowed_globs.is_all() {
                    return Ok(());
                }
                let abs = path.to_string_lossy();
                let rel = path
                    .strip_prefix(workspace)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| abs.to_string());
                let hit = cfg
                    .allowed_globs
                    .patterns()
                    .iter()
                    .any(|p| glob_matches_path(p, &abs) || glob_matches_path(p, &rel));
                if hit {
                    Ok(())
                } else {
                    Err(ToolError::Forbidden {
                        rule: "code_writer.allowed_globs".to_string(),
                    })
                }
            }
        }
    }

    /// True when reads must be confined to the workspace (restricted
    /// code_writer globs).
    pub fn confines_reads_to_workspace(&self) -> bool {
        matches!(self, Mode::CodeWriter(cfg) if !cfg.allowed_globs.is_all())
    }
}

fn describe_items(items: &AllowedItems) -> String {
    if items.is_all() {
        "all".to_string()
    } else {
        items.patterns().join(", ")
    }
}

fn check_read_only_command(command: &str) -> Result<(), ToolError> {
    let mut tokens = command.split_whitespace();
    let first = tokens.next().unwrap_or("");
    if first == "git" {
        let sub = tokens.next().unwrap_or("");
        if READ_ONLY_GIT_SUBCOMMANDS.contains(&sub) {
            return Ok(());
        }
        return Err(ToolError::Forbidden {
            rule: format!("architect.read-only-commands (git {sub})"),
        });
    }
    if READ_ONLY_COMMANDS.contains(&first) {
        Ok(())
    } else {
        Err(ToolError::Forbidden {
            rule: format!("architect.read-only-commands ({first})"),
        })
    }
}

/// Convert a simple shell glob pattern to a [`Regex`] and test `input`.
/// Only `*` (match anything, including `/`) and `?` (one char) are special.
pub(crate) fn glob_matches_path(pattern: &str, input: &str) -> bool {
    glob_to_regex(pattern).is_some_and(|re| re.is_match(input))
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                // Collapse `**` to one any-match; both cross separators.
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                re.push_str(".*");
            }
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_config::AllowedItems;

    fn code_writer(globs: &[&str], commands: &[&str]) -> Mode {
        Mode::CodeWriter(CodeWriterConfig {
            allowed_globs: if globs.is_empty() {
                AllowedItems::all()
            } else {
                AllowedItems::List(globs.iter().map(|s| s.to_string()).collect())
            },
            allowed_commands: if commands.is_empty() {
                AllowedItems::all()
            } else {
                AllowedItems::List(commands.iter().map(|s| s.to_string()).collect())
            },
        })
    }

    // ── Unrestricted ──────────────────────────────────────────────────────────

    #[test]
    fn unrestricted_allows_everything() {
        let m = Mode::Unrestricted;
        assert!(m.check_command("rm -rf build").is_ok());
        assert!(m.check_path_mutation(Path::new("/w/a.txt"), Path::new("/w")).is_ok());
        assert!(m.check_interaction().is_ok());
    }

    // ── Architect ─────────────────────────────────────────────────────────────

    #[test]
    fn architect_allows_inspection_commands() {
        let m = Mode::Architect;
        assert!(m.check_command("ls -la /tmp").is_ok());
        assert!(m.check_command("grep -rn main src").is_ok());
        assert!(m.check_command("cat README.md").is_ok());
    }

    #[test]
    fn architect_denies_mutating_commands_with_rule() {
        let m = Mode::Architect;
        let err = m.check_command("rm -rf /").unwrap_err();
        match err {
            ToolError::Forbidden { rule } => {
                assert!(rule.contains("read-only"), "{rule}")
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
        assert!(m.check_command("cargo build").is_err());
        assert!(m.check_command("touch x").is_err());
    }

    #[test]
    fn architect_git_inspection_only() {
        let m = Mode::Architect;
        assert!(m.check_command("git status").is_ok());
        assert!(m.check_command("git log --oneline").is_ok());
        assert!(m.check_command("git push origin main").is_err());
        assert!(m.check_command("git commit -m x").is_err());
    }

    #[test]
    fn architect_denies_file_mutation_and_interaction() {
        let m = Mode::Architect;
        assert!(m.check_path_mutation(Path::new("/w/a"), Path::new("/w")).is_err());
        assert!(m.check_interaction().is_err());
    }

    // ── CodeWriter globs ──────────────────────────────────────────────────────

    #[test]
    fn code_writer_all_globs_allows_any_path() {
        let m = code_writer(&[], &[]);
        assert!(m.check_path_mutation(Path::new("/anywhere/x"), Path::new("/w")).is_ok());
        assert!(!m.confines_reads_to_workspace());
    }

    #[test]
    fn code_writer_glob_list_gates_paths() {
        let m = code_writer(&["src/**"], &[]);
        assert!(m.check_path_mutation(Path::new("/w/src/main.rs"), Path::new("/w")).is_ok());
        let err = m
            .check_path_mutation(Path::new("/w/README.md"), Path::new("/w"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Forbidden { ref rule } if rule.contains("allowed_globs")));
        assert!(m.confines_reads_to_workspace());
    }

    #[test]
    fn code_writer_glob_matches_absolute_pattern_too() {
        let m = code_writer(&["/w/docs/*.md"], &[]);
        assert!(m.check_path_mutation(Path::new("/w/docs/guide.md"), Path::new("/w")).is_ok());
        assert!(m.check_path_mutation(Path::new("/w/docs/sub/x.md"), Path::new("/w")).is_err());
    }

    // ── CodeWriter commands ───────────────────────────────────────────────────

    #[test]
    fn code_writer_command_list_gates_commands() {
        let m = code_writer(&[], &["cargo *", "ls*"]);
        assert!(m.check_command("cargo test").is_ok());
        assert!(m.check_command("ls -la").is_ok());
        assert!(m.check_command("rm x").is_err());
    }

    #[test]
    fn code_writer_all_commands_allows_any() {
        let m = code_writer(&["src/**"], &[]);
        assert!(m.check_command("anything at all").is_ok());
    }

    // ── Glob translation ──────────────────────────────────────────────────────

    #[test]
    fn glob_star_crosses_separators() {
        assert!(glob_matches_path("src/*", "src/a/b/c.rs"));
        assert!(glob_matches_path("src/**", "src/a/b/c.rs"));
        assert!(!glob_matches_path("src/*", "tests/a.rs"));
    }

    #[test]
    fn glob_question_mark_single_char() {
        assert!(glob_matches_path("a?c", "abc"));
        assert!(!glob_matches_path("a?c", "abbc"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        assert!(glob_matches_path("a.b", "a.b"));
        assert!(!glob_matches_path("a.b", "axb"));
    }

    // ── Construction / naming ─────────────────────────────────────────────────

    #[test]
    fn from_parts_maps_names() {
        assert_eq!(Mode::from_parts(ModeName::Wcgw, None), Mode::Unrestricted);
        assert_eq!(Mode::from_parts(ModeName::Architect, None), Mode::Architect);
        assert!(matches!(
            Mode::from_parts(ModeName::CodeWriter, None),
            Mode::CodeWriter(_)
        ));
    }

    #[test]
    fn summary_names_the_mode() {
        assert!(Mode::Unrestricted.summary().contains("wcgw"));
        assert!(Mode::Architect.summary().contains("read-only"));
        assert!(code_writer(&["src/**"], &[]).summary().contains("src/**"));
    }
}
