//! Code-block extraction and per-block output truncation.
//!
//! The driver LLM's reply is prose interspersed with fenced code blocks
//! (`` ```repl `` or `` ```python ``). This module finds those blocks in
//! source order and truncates execution output to a fixed character
//! budget with a calibrated advisory, the forcing function that steers
//! the model toward `llm_query` delegation instead of trying to hold an
//! entire document in one execution result.

use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:repl|python)\n(.*?)```").expect("valid fence regex")
    })
}

/// Extract fenced `repl`/`python` code blocks from `text`, in source
/// order. Unfenced prose is ignored. Returns an empty vector if there are
/// no fenced blocks at all.
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    fence_re()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// The exact advisory text appended when output is truncated. Preserving
/// this string verbatim matters: it becomes part of the prompt corpus the
/// model learns from mid-conversation (it is what teaches the model to
/// reach for `llm_query`).
fn advisory(max_chars: usize, original_len: usize) -> String {
    format!(
        "[Output truncated to {max_chars} of {original_len} characters. Use llm_query() to analyze content you cannot see.]"
    )
}

/// Truncate `output` to `max_chars` characters, appending the advisory if
/// truncation occurred. Returns `output` unchanged when it already fits.
pub fn truncate_code_output(output: &str, max_chars: usize) -> String {
    let original_len = output.chars().count();
    if original_len <= max_chars {
        return output.to_string();
    }
    let prefix: String = output.chars().take(max_chars).collect();
    format!("{prefix}{}", advisory(max_chars, original_len))
}

/// Default per-block truncation budget, calibrated so that at moderate
/// context sizes the full document no longer fits in a single echo.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 20_000;

#[cfg(test)]
mod tests {
    use super::*;

    /// P4: extraction is ordered and counts match fenced regions.
    #[test]
    fn test_extract_ordered() {
        let text = "intro\n```repl\nprint(1)\n```\nmiddle\n```python\nprint(2)\n```\nend";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks, vec!["print(1)\n", "print(2)\n"]);
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_code_blocks("just prose, no fences").is_empty());
    }

    #[test]
    fn test_extract_single_repl_block() {
        let text = "```repl\nFINAL(\"42\")\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("FINAL(\"42\")"));
    }

    /// P5: truncation contract.
    #[test]
    fn test_truncate_unchanged_when_within_budget() {
        let s = "short output";
        assert_eq!(truncate_code_output(s, 1000), s);
    }

    #[test]
    fn test_truncate_contract() {
        let s = "x".repeat(25_000);
        let n = 20_000;
        let truncated = truncate_code_output(&s, n);
        let expected_advisory = advisory(n, 25_000);
        assert!(truncated.contains(&expected_advisory));
        assert_eq!(truncated.len(), n + expected_advisory.len());
        assert!(truncated.contains("25000"));
        assert!(truncated.contains("20000"));
    }
}
