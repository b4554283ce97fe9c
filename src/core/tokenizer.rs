//! Splits a raw input line into tokens.
//!
//! Whitespace outside of quotes separates tokens. A token that starts with
//! `"` or `'` runs to the matching quote; the quotes are stripped and the
//! content is taken verbatim. Quotes that appear in the middle of a word are
//! ordinary characters.

use crate::errors::{Error, Result};

/// Upper bound on the number of tokens accepted in one line.
pub const MAX_TOKENS: usize = 64;

const BACKGROUND_MARKER: char = '&';

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    pub fn word<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` if the token is the unquoted operator `op`.
    pub fn is_operator(&self, op: &str) -> bool {
        !self.quoted && self.text == op
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// The tokens of one input line, with the background marker removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenizedLine {
    pub tokens: Vec<Token>,
    pub background: bool,
}

pub fn tokenize(line: &str) -> Result<TokenizedLine> {
    tokenize_with_limit(line, MAX_TOKENS)
}

pub fn tokenize_with_limit(line: &str, max_tokens: usize) -> Result<TokenizedLine> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    loop {
        while let Some(&(_, c)) = chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            chars.next();
        }

        let (start, first) = match chars.next() {
            Some(next) => next,
            None => break,
        };

        let token = if first == '"' || first == '\'' {
            let mut text = String::new();
            let mut closed = false;
            for (_, c) in &mut chars {
                if c == first {
                    closed = true;
                    break;
                }
                text.push(c);
            }

            if !closed {
                return Err(Error::unterminated_quote(first));
            }
            Token::quoted(text)
        } else {
            let mut end = line.len();
            while let Some(&(i, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = i;
                    break;
                }
                chars.next();
            }
            Token::word(&line[start..end])
        };

        if tokens.len() == max_tokens {
            return Err(Error::too_many_arguments(max_tokens));
        }
        tokens.push(token);
    }

    let background = strip_background_marker(&mut tokens);
    Ok(TokenizedLine { tokens, background })
}

/// Removes standalone `&` tokens and a `&` glued to the end of the last
/// word. Returns `true` if any marker was found.
fn strip_background_marker(tokens: &mut Vec<Token>) -> bool {
    let before = tokens.len();
    tokens.retain(|t| !t.is_operator("&"));
    let mut background = tokens.len() != before;

    if let Some(last) = tokens.last_mut() {
        if !last.quoted && last.text.len() > 1 && last.text.ends_with(BACKGROUND_MARKER) {
            last.text.pop();
            background = true;
        }
    }

    background
}
