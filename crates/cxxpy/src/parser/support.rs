//! Token buffering, checkpoints and small parsing helpers.

use super::Parser;
use crate::error::{Coord, LexError, SyntaxError, TranslateError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::scope::ScopeTracker;

pub(crate) type PResult<T> = Result<T, TranslateError>;

/// Lazily filled token buffer over a [`Lexer`].
///
/// Tokens are pulled on demand and kept so that a [`Checkpoint`] can rewind
/// the cursor. A `>>` closing two template argument lists is split in place;
/// the split log lets a rewind undo it.
pub(crate) struct TokenStream {
    lexer: Lexer,
    buffer: Vec<Token>,
    cursor: usize,
    splits: Vec<usize>,
    lex_errors: Vec<LexError>,
    pub(crate) scopes: ScopeTracker,
}

/// Saved stream state for speculative parsing.
#[derive(Clone)]
pub(crate) struct Checkpoint {
    cursor: usize,
    splits: usize,
    scopes: ScopeTracker,
    template_frames: usize,
}

impl TokenStream {
    pub(crate) fn new(text: &str, scopes: ScopeTracker) -> Self {
        Self {
            lexer: Lexer::new(text),
            buffer: Vec::new(),
            cursor: 0,
            splits: Vec::new(),
            lex_errors: Vec::new(),
            scopes,
        }
    }

    fn fill(&mut self, index: usize) {
        while self.buffer.len() <= index {
            if self.buffer.last().is_some_and(|t| t.is(TokenKind::Eof)) {
                let eof = self.buffer[self.buffer.len() - 1].clone();
                self.buffer.push(eof);
                continue;
            }
            match self.lexer.next_token() {
                Ok(token) => self.buffer.push(token),
                Err(err) => self.lex_errors.push(err),
            }
        }
    }

    pub(crate) fn peek_at(&mut self, offset: usize) -> &Token {
        let index = self.cursor + offset;
        self.fill(index);
        &self.buffer[index]
    }

    pub(crate) fn peek(&mut self) -> &Token {
        self.peek_at(0)
    }

    pub(crate) fn kind_at(&mut self, offset: usize) -> TokenKind {
        self.peek_at(offset).kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is(TokenKind::Eof) {
            self.cursor += 1;
        }
        token
    }

    /// Turn the `>>` under the cursor into two `>` tokens.
    pub(crate) fn split_shr(&mut self) {
        let index = self.cursor;
        self.fill(index);
        let token = &self.buffer[index];
        if !token.is(TokenKind::Shr) {
            return;
        }
        let (line, column) = (token.line, token.column);
        self.buffer[index] = Token::new(TokenKind::Gt, ">", line, column);
        self.buffer
            .insert(index + 1, Token::new(TokenKind::Gt, ">", line, column + 1));
        self.splits.push(index);
    }

    pub(crate) fn checkpoint(&self, template_frames: usize) -> Checkpoint {
        Checkpoint {
            cursor: self.cursor,
            splits: self.splits.len(),
            scopes: self.scopes.clone(),
            template_frames,
        }
    }

    /// Rewind to `checkpoint`, returning the template frame depth to restore.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) -> usize {
        while self.splits.len() > checkpoint.splits {
            if let Some(index) = self.splits.pop() {
                let first = &self.buffer[index];
                let merged = Token::new(TokenKind::Shr, ">>", first.line, first.column);
                self.buffer.remove(index + 1);
                self.buffer[index] = merged;
            }
        }
        self.cursor = checkpoint.cursor;
        self.scopes = checkpoint.scopes;
        checkpoint.template_frames
    }

    pub(crate) fn first_lex_error(&self) -> Option<&LexError> {
        self.lex_errors.first()
    }
}

impl Parser<'_> {
    pub(crate) fn peek(&mut self) -> &Token {
        self.tokens.peek()
    }

    pub(crate) fn kind(&mut self) -> TokenKind {
        self.tokens.kind_at(0)
    }

    pub(crate) fn kind_at(&mut self, offset: usize) -> TokenKind {
        self.tokens.kind_at(offset)
    }

    pub(crate) fn check(&mut self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        self.tokens.advance()
    }

    /// Consume the next token if it has the given kind.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> PResult<String> {
        Ok(self.expect(TokenKind::Identifier, "an identifier")?.lexeme)
    }

    /// Closing `>` of a template argument list, splitting `>>` if needed.
    pub(crate) fn expect_template_close(&mut self) -> PResult<()> {
        if self.check(TokenKind::Shr) {
            self.tokens.split_shr();
        }
        self.expect(TokenKind::Gt, "`>`").map(|_| ())
    }

    pub(crate) fn coord(&mut self) -> Coord {
        let token = self.tokens.peek();
        let (line, column) = (token.line, token.column);
        Coord::new(self.file.clone(), line, Some(column))
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) -> TranslateError {
        SyntaxError {
            message: message.into(),
            coord: self.coord(),
        }
        .into()
    }

    pub(crate) fn unexpected(&mut self, expected: &str) -> TranslateError {
        let found = self.peek().clone();
        let message = if found.is(TokenKind::Eof) {
            format!("expected {}, found end of input", expected)
        } else {
            format!("expected {}, found `{}`", expected, found.lexeme)
        };
        self.error(message)
    }

    /// Run `rule` speculatively; on failure rewind everything it consumed.
    pub(crate) fn try_parse<T>(&mut self, rule: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
        let checkpoint = self.tokens.checkpoint(self.template_frames.len());
        let flags = (self.in_template_args, self.pending_template, self.context);
        match rule(self) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::trace!("speculative parse rewound: {}", err);
                let depth = self.tokens.restore(checkpoint);
                self.template_frames.truncate(depth);
                (self.in_template_args, self.pending_template, self.context) = flags;
                None
            }
        }
    }

    /// Skip a bracketed group starting at the current opening token.
    pub(crate) fn skip_balanced(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                TokenKind::Eof => return Err(self.unexpected("a closing bracket")),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to and past the next `;` at bracket depth zero, or past a
    /// brace-delimited body if one comes first.
    pub(crate) fn skip_declaration(&mut self) -> PResult<()> {
        loop {
            match self.kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::LBrace => {
                    self.skip_balanced()?;
                    self.eat(TokenKind::Semicolon);
                    return Ok(());
                }
                TokenKind::LParen | TokenKind::LBracket => self.skip_balanced()?,
                TokenKind::Eof => return Err(self.unexpected("`;`")),
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn push_scope(&mut self) {
        self.tokens.scopes.push_scope();
    }

    pub(crate) fn pop_scope(&mut self) -> PResult<()> {
        let coord = self.coord();
        self.tokens
            .scopes
            .pop_scope()
            .map_err(|source| TranslateError::Scope { coord, source })
    }

    pub(crate) fn declare_type(&mut self, name: &str) -> PResult<()> {
        let coord = self.coord();
        self.tokens
            .scopes
            .declare_type(name)
            .map_err(|source| TranslateError::Scope { coord, source })
    }

    pub(crate) fn declare_value(&mut self, name: &str) -> PResult<()> {
        let coord = self.coord();
        self.tokens
            .scopes
            .declare_non_type(name)
            .map_err(|source| TranslateError::Scope { coord, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_undone_by_restore() {
        let mut stream = TokenStream::new("a >> b", ScopeTracker::new());
        stream.advance();
        let checkpoint = stream.checkpoint(0);
        stream.split_shr();
        assert_eq!(stream.advance().kind, TokenKind::Gt);
        assert_eq!(stream.advance().kind, TokenKind::Gt);
        stream.restore(checkpoint);
        assert_eq!(stream.advance().kind, TokenKind::Shr);
        assert_eq!(stream.advance().lexeme, "b");
    }

    #[test]
    fn eof_repeats() {
        let mut stream = TokenStream::new("x", ScopeTracker::new());
        stream.advance();
        assert!(stream.advance().is(TokenKind::Eof));
        assert!(stream.peek_at(3).is(TokenKind::Eof));
    }

    #[test]
    fn lex_errors_are_collected() {
        let mut stream = TokenStream::new("a @ b", ScopeTracker::new());
        while !stream.advance().is(TokenKind::Eof) {}
        assert!(stream.first_lex_error().is_some());
    }
}
