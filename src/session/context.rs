//! The growing text context
//!
//! Lengths are counted in characters, the unit every threshold uses. The store
//! is owned by the loop actor; observers only ever see published snapshots.

use std::sync::Arc;

/// Appended after every generated fragment
pub const SEPARATOR: &str = "\n";

/// Single mutable text buffer holding everything the next generation sees
#[derive(Debug, Clone)]
pub struct ContextStore {
    text: String,
    /// Cached `text.chars().count()`
    chars: usize,
}

impl ContextStore {
    pub fn new(seed: impl Into<String>) -> Self {
        let text = seed.into();
        let chars = text.chars().count();
        Self { text, chars }
    }

    /// Append generated text plus the separator; returns the new length.
    pub fn append(&mut self, generated: &str) -> usize {
        self.push(generated);
        self.push(SEPARATOR);
        self.chars
    }

    /// Append text verbatim, without a separator.
    pub fn append_raw(&mut self, text: &str) -> usize {
        self.push(text);
        self.chars
    }

    fn push(&mut self, text: &str) {
        self.text.push_str(text);
        self.chars += text.chars().count();
    }

    /// Replace the whole context (compression only).
    pub fn replace(&mut self, text: String) {
        self.chars = text.chars().count();
        self.text = text;
    }

    pub fn current_length(&self) -> usize {
        self.chars
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Last `n` characters.
    pub fn tail(&self, n: usize) -> &str {
        tail_chars(&self.text, n)
    }

    /// Immutable copy for observers
    pub fn snapshot(&self) -> Arc<str> {
        Arc::from(self.text.as_str())
    }
}

/// Last `n` characters of `text`, on a char boundary.
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_adds_separator() {
        let mut store = ContextStore::new("abc");
        let len = store.append("defg");
        assert_eq!(len, 3 + 4 + SEPARATOR.len());
        assert_eq!(store.as_str(), "abcdefg\n");
        assert_eq!(store.current_length(), len);
    }

    #[test]
    fn test_lengths_are_characters() {
        let mut store = ContextStore::new("思考");
        store.append("流れ");
        assert_eq!(store.current_length(), 5);
        assert_eq!(store.tail(3), "流れ\n");
    }

    #[test]
    fn test_tail_longer_than_text() {
        let store = ContextStore::new("short");
        assert_eq!(store.tail(100), "short");
        assert_eq!(store.tail(0), "");
        assert_eq!(store.tail(2), "rt");
    }

    #[test]
    fn test_replace_resets_length() {
        let mut store = ContextStore::new("a".repeat(100));
        store.replace("tiny".to_string());
        assert_eq!(store.current_length(), 4);
        assert_eq!(&*store.snapshot(), "tiny");
    }

    #[test]
    fn test_append_raw_has_no_separator() {
        let mut store = ContextStore::new("a");
        assert_eq!(store.append_raw("b"), 2);
        assert_eq!(store.as_str(), "ab");
    }
}
