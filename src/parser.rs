//! History parser for Lockstep
//!
//! Turns a textual interleaved history such as `r1[x] w2[y] c1` into the
//! ordered list of operations the scheduler consumes. Grammar, one operation
//! per whitespace-separated token:
//! - `r<digits>[<lowercase>]` read
//! - `w<digits>[<lowercase>]` write
//! - `c<digits>` commit
//!
//! Any malformed token rejects the whole history.

use crate::error::{LockstepError, Result};
use crate::lexer::{Lexer, Spanned, Token};
use crate::types::{Action, Operation, TxnId};

//=============================================================================
// Parser
//=============================================================================

/// History parser
pub struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Parse a history string into operations, in input order
    pub fn parse(history: &'a str) -> Result<Vec<Operation>> {
        let tokens = Lexer::new(history).tokenize()?;
        let mut parser = Parser { input: history, tokens, pos: 0 };
        parser.parse_history()
    }

    fn peek(&self) -> &Spanned {
        // tokenize() always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Whitespace-delimited text starting at `position`
    fn token_text(&self, position: usize) -> &'a str {
        let rest = &self.input[position..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        &rest[..end]
    }

    fn error(&self, start: usize, message: impl Into<String>) -> LockstepError {
        LockstepError::syntax(start, self.token_text(start), message)
    }

    fn parse_history(&mut self) -> Result<Vec<Operation>> {
        let mut operations = Vec::new();
        loop {
            match self.peek().token {
                Token::Separator => self.advance(),
                Token::Eof => break,
                _ => {
                    let seq = operations.len();
                    operations.push(self.parse_operation(seq)?);
                }
            }
        }
        Ok(operations)
    }

    fn parse_operation(&mut self, seq: usize) -> Result<Operation> {
        let start = self.peek().position;
        let action = match self.peek().token {
            Token::Action(action) => action,
            _ => return Err(self.error(start, "expected 'r', 'w' or 'c'")),
        };
        self.advance();

        let txn_id = self.parse_txn_id(start)?;

        let resource = match action {
            Action::Commit => None,
            Action::Read | Action::Write => Some(self.parse_resource(start)?),
        };

        // The operation must end at a separator or end of input
        match self.peek().token {
            Token::Separator | Token::Eof => {}
            _ => return Err(self.error(start, "unexpected trailing characters")),
        }

        Ok(Operation { seq, txn_id, action, resource })
    }

    fn parse_txn_id(&mut self, start: usize) -> Result<TxnId> {
        let digits = match &self.peek().token {
            Token::Number(digits) => digits.clone(),
            _ => return Err(self.error(start, "expected transaction number")),
        };
        self.advance();
        digits
            .parse::<TxnId>()
            .map_err(|_| self.error(start, "transaction number out of range"))
    }

    fn parse_resource(&mut self, start: usize) -> Result<String> {
        if self.peek().token != Token::LeftBracket {
            return Err(self.error(start, "expected '[' followed by a resource name"));
        }
        self.advance();

        let name = match &self.peek().token {
            Token::Name(name) => name.clone(),
            _ => return Err(self.error(start, "expected lowercase resource name")),
        };
        self.advance();

        if self.peek().token != Token::RightBracket {
            return Err(self.error(start, "expected ']'"));
        }
        self.advance();
        Ok(name)
    }
}
