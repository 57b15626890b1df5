//! Large-text normalization for model outputs.

/// Marker inserted where the middle of an oversized text was dropped.
pub const COMPACTION_MARKER: &str = "\n...\n";

/// Bound the memory held by very large model outputs.
///
/// Text longer than `max_len` characters keeps its first `max_len / 2` and
/// last `max_len - max_len / 2` characters around a compaction marker (an
/// odd budget gives the tail the extra character); runs of whitespace then
/// collapse to single spaces. Output for oversized input is always shorter
/// than the input.
pub fn normalize_large_text(text: &str, max_len: usize) -> String {
    let char_count = text.chars().count();

    let compacted = if char_count > max_len {
        let head_len = max_len / 2;
        let tail_len = max_len - head_len;
        let head: String = text.chars().take(head_len).collect();
        let tail: String = text.chars().skip(char_count - tail_len).collect();
        format!("{head}{COMPACTION_MARKER}{tail}")
    } else {
        text.to_string()
    };

    compacted.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_only_normalizes_whitespace() {
        assert_eq!(
            normalize_large_text("a  quick\n\nbrown\tfox", 200_000),
            "a quick brown fox"
        );
    }

    #[test]
    fn oversized_text_is_compacted() {
        let input = "x".repeat(400_000);
        let output = normalize_large_text(&input, 200_000);

        assert!(output.len() < input.len());
        assert!(output.starts_with(&"x".repeat(100_000)));
        assert!(output.ends_with(&"x".repeat(100_000)));
        // The marker survives as the single whitespace-normalized separator
        assert!(output.contains("x ... x"));
    }

    #[test]
    fn boundary_length_is_untouched() {
        let input = "y".repeat(1000);
        assert_eq!(normalize_large_text(&input, 1000), input);
    }

    #[test]
    fn odd_budget_gives_tail_the_extra_character() {
        let input = format!("{}{}", "h".repeat(50), "t".repeat(50));
        let output = normalize_large_text(&input, 11);
        assert_eq!(output, format!("{} ... {}", "h".repeat(5), "t".repeat(6)));
    }

    #[test]
    fn multibyte_input_splits_on_character_boundaries() {
        let input = "汉".repeat(100);
        let output = normalize_large_text(&input, 10);
        assert!(output.starts_with(&"汉".repeat(5)));
        assert!(output.ends_with(&"汉".repeat(5)));
    }
}
