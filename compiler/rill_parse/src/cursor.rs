//! Token cursor with trivia handling.
//!
//! Comments are always skipped. Newlines are skipped only when the current
//! parse context says so; in statement position they are real boundaries.

use rill_ir::{Region, Token, TokenKind, TokenList};

/// Read position into a `TokenList`.
pub(crate) struct Cursor<'a> {
    tokens: &'a TokenList,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tokens: &'a TokenList) -> Self {
        Cursor { tokens, pos: 0 }
    }

    /// Index of the next unconsumed token (for bounded lookahead scans).
    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Raw token at an absolute index, clamped to `EndOfFile`.
    pub(crate) fn token_at(&self, index: usize) -> Token {
        if index < self.tokens.len() {
            self.tokens.get(index)
        } else {
            self.tokens.get(self.tokens.len() - 1)
        }
    }

    fn skip_index(&self, mut index: usize, skip_newlines: bool) -> usize {
        while index < self.tokens.len() {
            match self.tokens.get(index).kind {
                TokenKind::Comment => index += 1,
                TokenKind::Newline if skip_newlines => index += 1,
                _ => break,
            }
        }
        index.min(self.tokens.len() - 1)
    }

    /// Next significant token without consuming it.
    pub(crate) fn peek(&self, skip_newlines: bool) -> Token {
        self.token_at(self.skip_index(self.pos, skip_newlines))
    }

    /// Significant token after the next one.
    pub(crate) fn peek2(&self, skip_newlines: bool) -> Token {
        let first = self.skip_index(self.pos, skip_newlines);
        self.token_at(self.skip_index(first + 1, skip_newlines))
    }

    /// Consume and return the next significant token.
    pub(crate) fn advance(&mut self, skip_newlines: bool) -> Token {
        let index = self.skip_index(self.pos, skip_newlines);
        let token = self.token_at(index);
        if !matches!(token.kind, TokenKind::EndOfFile) {
            self.pos = index + 1;
        } else {
            self.pos = index;
        }
        token
    }

    /// Consume the next significant token if it matches `kind` exactly.
    pub(crate) fn eat(&mut self, kind: TokenKind, skip_newlines: bool) -> Option<Token> {
        if self.peek(skip_newlines).kind == kind {
            Some(self.advance(skip_newlines))
        } else {
            None
        }
    }

    /// Whether the next significant token matches `kind`.
    pub(crate) fn at(&self, kind: TokenKind, skip_newlines: bool) -> bool {
        self.peek(skip_newlines).kind == kind
    }

    /// Region of the next significant token.
    pub(crate) fn peek_region(&self, skip_newlines: bool) -> Region {
        self.peek(skip_newlines).region
    }

    /// Whether the cursor is at the end of the stream.
    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(true).kind, TokenKind::EndOfFile)
    }

    /// Consume tokens until a statement boundary: a newline at bracket depth
    /// zero, a closing bracket this scan did not open, or end of file.
    ///
    /// This is the parser's error-recovery resynchronization point.
    pub(crate) fn recover_to_stmt_boundary(&mut self) {
        let mut depth: u32 = 0;
        loop {
            let token = self.peek(false);
            match token.kind {
                TokenKind::EndOfFile => return,
                TokenKind::Newline if depth == 0 => return,
                TokenKind::OpenRound | TokenKind::OpenSquare | TokenKind::OpenCurly => {
                    depth += 1;
                }
                TokenKind::CloseRound | TokenKind::CloseSquare | TokenKind::CloseCurly => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance(false);
        }
    }
}
