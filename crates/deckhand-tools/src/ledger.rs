// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! The read-before-write barrier.
//!
//! Every file content returned to the agent is fingerprinted here.  A path
//! is write-eligible only while the on-disk bytes still hash to what the
//! agent last saw; anything else forces a fresh read first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// What the agent has seen of one file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// sha256 of the full content bytes at the time they were shown.
    pub hash: String,
    /// 1-based inclusive line ranges returned so far, unioned per read.
    pub ranges: Vec<(usize, usize)>,
    pub total_lines: usize,
}

impl FileRecord {
    /// Fraction of the file the agent has seen, in percent.
    pub fn percent_read(&self) -> f64 {
        if self.total_lines == 0 {
            return 100.0;
        }
        let mut seen = vec![false; self.total_lines];
        for (start, end) in &self.ranges {
            for line in *start..=(*end).min(self.total_lines) {
                seen[line - 1] = true;
            }
        }
        let count = seen.iter().filter(|s| **s).count();
        count as f64 * 100.0 / self.total_lines as f64
    }
}

/// Session-scoped map of path → last-shown fingerprint.
#[derive(Debug, Default)]
pub struct ReadLedger {
    files: HashMap<PathBuf, FileRecord>,
}

impl ReadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `range` of the file was returned with content hashing to
    /// `hash`.  A changed hash resets the range union: the agent is looking
    /// at a different file now.
    pub fn note_read(
        &mut self,
        path: &Path,
        hash: String,
        range: (usize, usize),
        total_lines: usize,
    ) {
        match self.files.get_mut(path) {
            Some(rec) if rec.hash == hash => {
                rec.ranges.push(range);
                rec.total_lines = total_lines;
            }
            _ => {
                self.files.insert(
                    path.to_path_buf(),
                    FileRecord { hash, ranges: vec![range], total_lines },
                );
            }
        }
    }

    /// Record a write performed by the engine itself; the new content is by
    /// definition fully known.
    pub fn note_write(&mut self, path: &Path, hash: String, total_lines: usize) {
        self.files.insert(
            path.to_path_buf(),
            FileRecord {
                hash,
                ranges: vec![(1, total_lines.max(1))],
                total_lines,
            },
        );
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// True when the recorded hash matches `current_hash`.
    pub fn is_current(&self, path: &Path, current_hash: &str) -> bool {
        self.files
            .get(path)
            .is_some_and(|rec| rec.hash == current_hash)
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Hex-encoded sha256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
