use crate::error::{LockstepError, Result};
use crate::types::Action;

//=============================================================================
// Lexer (Tokenizer)
//=============================================================================

/// Token types for the history lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Operation letter outside brackets: r, w or c
    Action(Action),
    /// Transaction number
    Number(String),
    /// Resource name (lowercase letters inside brackets)
    Name(String),
    LeftBracket,  // [
    RightBracket, // ]
    /// One or more whitespace characters between operations
    Separator,

    // End of input
    Eof,
}

/// A token together with the byte offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Lexer state
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    in_brackets: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0, in_brackets: false }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    /// Text of the whitespace-delimited chunk around `position`, for error messages
    fn chunk_at(&self, position: usize) -> &'a str {
        let start = self.input[..position]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let end = self.input[position..]
            .find(char::is_whitespace)
            .map(|i| position + i)
            .unwrap_or(self.input.len());
        &self.input[start..end]
    }

    pub fn next_token(&mut self) -> Result<Spanned> {
        let position = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Spanned { token: Token::Eof, position }),
        };

        if c.is_whitespace() {
            if self.in_brackets {
                return Err(LockstepError::syntax(position, self.chunk_at(position), "unterminated resource name"));
            }
            self.read_while(char::is_whitespace);
            return Ok(Spanned { token: Token::Separator, position });
        }

        if c.is_ascii_digit() {
            let num = self.read_while(|c| c.is_ascii_digit());
            return Ok(Spanned { token: Token::Number(num), position });
        }

        let token = match c {
            '[' if !self.in_brackets => {
                self.advance();
                self.in_brackets = true;
                Token::LeftBracket
            }
            ']' if self.in_brackets => {
                self.advance();
                self.in_brackets = false;
                Token::RightBracket
            }
            c if self.in_brackets && c.is_ascii_lowercase() => {
                Token::Name(self.read_while(|c| c.is_ascii_lowercase()))
            }
            c => match Action::from_char(c) {
                Some(action) if !self.in_brackets => {
                    self.advance();
                    Token::Action(action)
                }
                _ => {
                    return Err(LockstepError::syntax(
                        position,
                        self.chunk_at(position),
                        format!("unexpected character '{}'", c),
                    ))
                }
            },
        };
        Ok(Spanned { token, position })
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_lexer_basic() {
        let tokens = kinds("r1[x] c1");
        assert_eq!(tokens[0], Token::Action(Action::Read));
        assert_eq!(tokens[1], Token::Number("1".into()));
        assert_eq!(tokens[2], Token::LeftBracket);
        assert_eq!(tokens[3], Token::Name("x".into()));
        assert_eq!(tokens[4], Token::RightBracket);
        assert_eq!(tokens[5], Token::Separator);
        assert_eq!(tokens[6], Token::Action(Action::Commit));
        assert_eq!(tokens[7], Token::Number("1".into()));
        assert_eq!(tokens[8], Token::Eof);
    }

    #[test]
    fn test_lexer_letters_inside_brackets_are_names() {
        // 'c' and 'r' are resource names here, not actions
        let tokens = kinds("w12[acct]");
        assert_eq!(tokens[1], Token::Number("12".into()));
        assert_eq!(tokens[3], Token::Name("acct".into()));
    }

    #[test]
    fn test_lexer_collapses_whitespace() {
        let tokens = kinds("c1 \t\n c2");
        assert_eq!(tokens[2], Token::Separator);
        assert_eq!(tokens[3], Token::Action(Action::Commit));
    }

    #[test]
    fn test_lexer_positions() {
        let tokens = Lexer::new("r1[x]  w2[y]").tokenize().unwrap();
        let w = tokens.iter().find(|s| s.token == Token::Action(Action::Write)).unwrap();
        assert_eq!(w.position, 7);
    }

    #[test]
    fn test_lexer_rejects_unknown_action() {
        let err = Lexer::new("r1[x] x2[y]").tokenize().unwrap_err();
        match err {
            LockstepError::Syntax { position, token, .. } => {
                assert_eq!(position, 6);
                assert_eq!(token, "x2[y]");
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_lexer_error_after_multibyte_whitespace() {
        // U+3000 is three bytes long
        let err = Lexer::new("r1[x]\u{3000}q1").tokenize().unwrap_err();
        match err {
            LockstepError::Syntax { position, token, .. } => {
                assert_eq!(position, 8);
                assert_eq!(token, "q1");
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_lexer_rejects_uppercase_resource() {
        assert!(Lexer::new("r1[X]").tokenize().is_err());
    }

    #[test]
    fn test_lexer_rejects_whitespace_inside_brackets() {
        assert!(Lexer::new("r1[x y]").tokenize().is_err());
    }
}
