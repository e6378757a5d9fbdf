// ============================================================
// Layer 4 — Utterance Preprocessor
// ============================================================
// Cleans a single utterance before tokenisation.
//
// Chat logs and subtitle dumps often carry:
//   - Non-breaking / zero-width spaces and byte order marks
//   - Tabs and stray control characters
//   - Runs of spaces from alignment
//
// An utterance is one line, so every kind of whitespace collapses
// into a single space and the result is trimmed.

use crate::domain::dialogue::DialoguePair;

pub struct Preprocessor {
    /// Lower-case the text before it reaches the vocabulary
    lowercase: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self { lowercase: true }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn clean(&self, text: &str) -> String {
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;

        for c in text.chars() {
            let c = match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_whitespace() || c.is_control() => ' ',
                c => c,
            };

            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                if self.lowercase {
                    out.extend(c.to_lowercase());
                } else {
                    out.push(c);
                }
                last_space = false;
            }
        }

        out.trim_end().to_string()
    }

    pub fn clean_pair(&self, pair: DialoguePair) -> DialoguePair {
        DialoguePair::new(self.clean(&pair.query), self.clean(&pair.reply))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello   world"), "hello world");
    }

    #[test]
    fn test_trims_edges() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  hello world  "), "hello world");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hello\x01world\tagain"), "hello world again");
    }

    #[test]
    fn test_lowercases_by_default() {
        assert_eq!(Preprocessor::new().clean("Hi THERE"), "hi there");
        assert_eq!(Preprocessor::new().with_lowercase(false).clean("Hi"), "Hi");
    }

    #[test]
    fn test_unicode_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("a\u{00A0}\u{200B}b"), "a b");
    }

    #[test]
    fn test_clean_pair_cleans_both_sides() {
        let pair = Preprocessor::new().clean_pair(DialoguePair::new(" Hi  you ", "\tBYE"));
        assert_eq!(pair, DialoguePair::new("hi you", "bye"));
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(Preprocessor::new().clean(""), "");
    }
}
