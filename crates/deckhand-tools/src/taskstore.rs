// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! On-disk task snapshots: description plus a bundle of project files,
//! keyed by a client-chosen id.  One snapshot is one UTF-8 document.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ToolError;

/// File sections open with `=== <absolute-path> ===` on its own line.
const FILE_DELIM_OPEN: &str = "=== ";
const FILE_DELIM_CLOSE: &str = " ===";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: String,
    pub workspace: PathBuf,
    pub description: String,
    pub files: Vec<(PathBuf, String)>,
}

/// Snapshot storage rooted at one directory; ids map to files, same id
/// overwrites.
#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        let root = root.unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("deckhand")
                .join("tasks")
        });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, ToolError> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(ToolError::Io(format!("invalid task id {id:?}")));
        }
        Ok(self.root.join(format!("{id}.task")))
    }

    pub fn save(&self, snapshot: &TaskSnapshot) -> Result<PathBuf, ToolError> {
        let path = self.path_for(&snapshot.id)?;
        std::fs::create_dir_all(&self.root)
            .map_err(|e| ToolError::io("creating task store", e))?;

        let mut doc = String::new();
        doc.push_str(&format!("# task: {}\n", snapshot.id));
        doc.push_str(&format!("# workspace: {}\n", snapshot.workspace.display()));
        doc.push_str(&snapshot.description);
        if !snapshot.description.ends_with('\n') {
            doc.push('\n');
        }
        for (file_path, content) in &snapshot.files {
            doc.push_str(&format!(
                "{FILE_DELIM_OPEN}{}{FILE_DELIM_CLOSE}\n",
                file_path.display()
            ));
            doc.push_str(content);
            if !content.ends_with('\n') {
                doc.push('\n');
            }
        }

        std::fs::write(&path, &doc).map_err(|e| ToolError::io("writing task snapshot", e))?;
        debug!(id = %snapshot.id, path = %path.display(), files = snapshot.files.len(), "task saved");
        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<TaskSnapshot, ToolError> {
        let path = self.path_for(id)?;
        let doc = std::fs::read_to_string(&path)
            .map_err(|_| ToolError::NoSuchTask(id.to_string()))?;
        parse_snapshot(id, &doc)
    }
}

fn parse_snapshot(id: &str, doc: &str) -> Result<TaskSnapshot, ToolError> {
    let mut lines = doc.lines();
    let header_id = lines
        .next()
        .and_then(|l| l.strip_prefix("# task: "))
        .ok_or_else(|| ToolError::Io(format!("task {id:?}: missing id header")))?;
    let workspace = lines
        .next()
        .and_then(|l| l.strip_prefix("# workspace: "))
        .ok_or_else(|| ToolError::Io(format!("task {id:?}: missing workspace header")))?;

    let mut description = String::new();
    let mut files: Vec<(PathBuf, String)> = Vec::new();
    let mut current: Option<(PathBuf, String)> = None;

    for line in lines {
        if let Some(inner) = line
            .strip_prefix(FILE_DELIM_OPEN)
            .and_then(|r| r.strip_suffix(FILE_DELIM_CLOSE))
        {
            if let Some(done) = current.take() {
                files.push(done);
            }
            current = Some((PathBuf::from(inner), String::new()));
        } else if let Some((_, content)) = current.as_mut() {
            content.push_str(line);
            content.push('\n');
        } else {
            description.push_str(line);
            description.push('\n');
        }
    }
    if let Some(done) = current.take() {
        files.push(done);
    }

    Ok(TaskSnapshot {
        id: header_id.to_string(),
        workspace: PathBuf::from(workspace),
        description: description.trim_end().to_string(),
        files,
    })
}

/// Collect workspace files matching any of `globs` (relative patterns),
/// full content, no token budget.
pub fn collect_files(workspace: &Path, globs: &[String]) -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    for entry in WalkDir::new(workspace)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name().to_str() != Some(".git"))
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(workspace) else {
            continue;
        };
        let rel_str = rel.to_string_lossy();
        if globs.iter().any(|g| crate::mode::glob_matches_path(g, &rel_str)) {
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                out.push((entry.path().to_path_buf(), content));
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(Some(dir.path().join("tasks")));
        (dir, store)
    }

    fn sample(id: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: id.to_string(),
            workspace: PathBuf::from("/w"),
            description: "refactor the parser\nthen run tests".to_string(),
            files: vec![
                (PathBuf::from("/w/src/lib.rs"), "pub fn f() {}\n".to_string()),
                (PathBuf::from("/w/notes.md"), "todo list\n".to_string()),
            ],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_d, store) = store();
        store.save(&sample("t1")).unwrap();
        let loaded = store.load("t1").unwrap();
        assert_eq!(loaded, sample("t1"));
    }

    #[test]
    fn missing_id_is_no_such_task() {
        let (_d, store) = store();
        assert!(matches!(store.load("nope"), Err(ToolError::NoSuchTask(_))));
    }

    #[test]
    fn same_id_overwrites() {
        let (_d, store) = store();
        store.save(&sample("t1")).unwrap();
        let mut second = sample("t1");
        second.description = "changed".to_string();
        second.files.clear();
        store.save(&second).unwrap();
        let loaded = store.load("t1").unwrap();
        assert_eq!(loaded.description, "changed");
        assert!(loaded.files.is_empty());
    }

    #[test]
    fn snapshot_without_files_round_trips() {
        let (_d, store) = store();
        let snap = TaskSnapshot {
            id: "bare".to_string(),
            workspace: PathBuf::from("/w"),
            description: "just words".to_string(),
            files: vec![],
        };
        store.save(&snap).unwrap();
        assert_eq!(store.load("bare").unwrap(), snap);
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let (_d, store) = store();
        assert!(store.save(&sample("../escape")).is_err());
        assert!(store.load("a/b").is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn document_layout_is_stable() {
        let (_d, store) = store();
        let path = store.save(&sample("t1")).unwrap();
        let doc = std::fs::read_to_string(path).unwrap();
        assert!(doc.starts_with("# task: t1\n# workspace: /w\n"));
        assert!(doc.contains("=== /w/src/lib.rs ===\n"));
        assert!(doc.contains("pub fn f() {}\n"));
    }

    #[test]
    fn collect_files_honours_globs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::create_dir_all(ws.join("src")).unwrap();
        std::fs::write(ws.join("src/a.rs"), "a\n").unwrap();
        std::fs::write(ws.join("src/b.txt"), "b\n").unwrap();
        std::fs::write(ws.join("top.rs"), "t\n").unwrap();

        let collected = collect_files(ws, &["src/*.rs".to_string()]);
        let names: Vec<String> = collected
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.rs"]);
    }

    #[test]
    fn collect_files_multiple_globs_union() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::write(ws.join("a.rs"), "a\n").unwrap();
        std::fs::write(ws.join("b.md"), "b\n").unwrap();
        std::fs::write(ws.join("c.py"), "c\n").unwrap();

        let collected = collect_files(ws, &["*.rs".to_string(), "*.md".to_string()]);
        assert_eq!(collected.len(), 2);
    }
}
