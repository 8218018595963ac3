// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Token counting for every budget in the engine.
//!
//! One fixed BPE vocabulary (o200k), built once per process.  Building the
//! encoder costs tens of milliseconds, so it sits behind a `OnceLock`.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| tiktoken_rs::o200k_base().ok()).as_ref()
}

/// Number of tokens in `text`.
///
/// Falls back to a bytes/4 estimate if the vocabulary cannot be built;
/// budgets then remain enforced, just coarsely.
pub fn count_tokens(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len().div_ceil(4),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn counts_grow_with_text() {
        let short = count_tokens("hello world");
        let long = count_tokens(&"hello world ".repeat(50));
        assert!(short >= 1);
        assert!(long > short * 10);
    }

    #[test]
    fn count_is_deterministic() {
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(count_tokens(text), count_tokens(text));
    }

    #[test]
    fn code_is_denser_than_one_token_per_char() {
        let text = "let result = compute(input);";
        assert!(count_tokens(text) < text.len());
    }
}
