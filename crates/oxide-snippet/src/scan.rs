//! Placeholder scanning.
//!
//! Counts positional `?` placeholders in SQL text while skipping string
//! literals, quoted identifiers and comments, so that a `?` inside `'...'`
//! is not mistaken for a parameter slot.

/// A scanner over SQL text that finds positional placeholders.
pub struct PlaceholderScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PlaceholderScanner<'a> {
    /// Creates a new scanner for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skips a quoted section. A doubled closing quote is an escaped quote.
    fn skip_quoted(&mut self, close: char) {
        while let Some(c) = self.advance() {
            if c == close {
                if self.peek() == Some(close) {
                    self.advance();
                } else {
                    return;
                }
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
        }
    }

    /// Consumes the input and returns the number of placeholders.
    ///
    /// `?NNN` (numbered) placeholders count once each, like plain `?`.
    #[must_use]
    pub fn count(mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.advance() {
            match c {
                '\'' => self.skip_quoted('\''),
                '"' => self.skip_quoted('"'),
                '`' => self.skip_quoted('`'),
                '[' => self.skip_quoted(']'),
                '-' if self.peek() == Some('-') => self.skip_line_comment(),
                '/' if self.peek() == Some('*') => {
                    self.advance();
                    self.skip_block_comment();
                }
                '?' => {
                    count += 1;
                    while self.peek().is_some_and(|d| d.is_ascii_digit()) {
                        self.advance();
                    }
                }
                _ => {}
            }
        }
        count
    }
}

/// Counts the positional placeholders in `text`.
#[must_use]
pub fn count_placeholders(text: &str) -> usize {
    PlaceholderScanner::new(text).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_placeholders() {
        assert_eq!(count_placeholders("a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("SELECT 1"), 0);
    }

    #[test]
    fn test_placeholder_in_string_literal_ignored() {
        assert_eq!(count_placeholders("name = '?' AND id = ?"), 1);
        assert_eq!(count_placeholders("name = 'it''s ?' AND id = ?"), 1);
    }

    #[test]
    fn test_placeholder_in_quoted_identifier_ignored() {
        assert_eq!(count_placeholders(r#"SELECT "a?" FROM t WHERE x = ?"#), 1);
    }

    #[test]
    fn test_placeholder_in_comments_ignored() {
        assert_eq!(count_placeholders("x = ? -- y = ?\n AND z = ?"), 2);
        assert_eq!(count_placeholders("x = ? /* ? ? */"), 1);
    }

    #[test]
    fn test_numbered_placeholder() {
        assert_eq!(count_placeholders("x = ?1 OR y = ?2"), 2);
    }
}
