/// Split text into word tokens on runs of whitespace. Never yields an empty token.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

/// Number of tokens `tokenize` would produce, without allocating them.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters of `text`, for log lines and tables.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_collapses_whitespace_runs() {
        assert_eq!(
            tokenize("  alpha \t beta\n\ngamma  "),
            vec!["alpha", "beta", "gamma"]
        );
    }

    #[test]
    fn test_tokenize_empty_and_blank() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \n\t ").is_empty());
    }

    #[test]
    fn test_tokenize_unicode_whitespace() {
        // no-break space and ideographic space both separate words
        assert_eq!(tokenize("one\u{00A0}two\u{3000}three"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_word_count_agrees_with_tokenize() {
        let samples = [
            "",
            "single",
            "two words",
            "  leading and trailing  ",
            "tabs\tand\nnewlines\r\nmixed",
            "Welcome to SpeedRead! This uses RSVP (Rapid Serial Visual Presentation).",
        ];
        for s in samples {
            assert_eq!(word_count(s), tokenize(s).len(), "mismatch for {s:?}");
        }
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
        assert_eq!(preview("", 3), "");
    }
}
