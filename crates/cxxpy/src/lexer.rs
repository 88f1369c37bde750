//! Tokenizer for preprocessed C++ source.
//!
//! The lexer is pull-based: [`Lexer::next_token`] produces one token at a time
//! and can be restarted on new text with [`Lexer::reset`]. Literals are kept
//! verbatim in the token lexeme; the writer decides how to re-emit them.

use crate::error::LexError;
use serde::Serialize;

/// Every kind of token the grammar distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Keywords
    Auto,
    Bool,
    Break,
    Case,
    Catch,
    Char,
    Class,
    Const,
    ConstCast,
    Constexpr,
    Continue,
    Default,
    Delete,
    Do,
    Double,
    DynamicCast,
    Else,
    Enum,
    Explicit,
    Extern,
    False,
    Float,
    For,
    Friend,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Mutable,
    Namespace,
    New,
    Noexcept,
    Nullptr,
    Operator,
    Private,
    Protected,
    Public,
    Register,
    ReinterpretCast,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    StaticAssert,
    StaticCast,
    Struct,
    Switch,
    Template,
    This,
    Throw,
    True,
    Try,
    Typedef,
    Typename,
    Union,
    Unsigned,
    Using,
    Virtual,
    Void,
    Volatile,
    WcharT,
    While,

    // Literals and names
    Identifier,
    IntLiteral,
    FloatLiteral,
    CharLiteral,
    StringLiteral,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Arrow,
    ArrowStar,
    Dot,
    DotStar,
    ColonColon,
    Question,
    Colon,
    Semicolon,
    Comma,
    Ellipsis,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    /// Builtin type keywords that can start a type specifier.
    pub fn is_primitive_type(self) -> bool {
        matches!(
            self,
            TokenKind::Auto
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Double
                | TokenKind::Float
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Short
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Void
                | TokenKind::WcharT
        )
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral
                | TokenKind::FloatLiteral
                | TokenKind::CharLiteral
                | TokenKind::StringLiteral
        )
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("auto", TokenKind::Auto),
    ("bool", TokenKind::Bool),
    ("break", TokenKind::Break),
    ("case", TokenKind::Case),
    ("catch", TokenKind::Catch),
    ("char", TokenKind::Char),
    ("class", TokenKind::Class),
    ("const", TokenKind::Const),
    ("const_cast", TokenKind::ConstCast),
    ("constexpr", TokenKind::Constexpr),
    ("continue", TokenKind::Continue),
    ("default", TokenKind::Default),
    ("delete", TokenKind::Delete),
    ("do", TokenKind::Do),
    ("double", TokenKind::Double),
    ("dynamic_cast", TokenKind::DynamicCast),
    ("else", TokenKind::Else),
    ("enum", TokenKind::Enum),
    ("explicit", TokenKind::Explicit),
    ("extern", TokenKind::Extern),
    ("false", TokenKind::False),
    ("float", TokenKind::Float),
    ("for", TokenKind::For),
    ("friend", TokenKind::Friend),
    ("goto", TokenKind::Goto),
    ("if", TokenKind::If),
    ("inline", TokenKind::Inline),
    ("int", TokenKind::Int),
    ("long", TokenKind::Long),
    ("mutable", TokenKind::Mutable),
    ("namespace", TokenKind::Namespace),
    ("new", TokenKind::New),
    ("noexcept", TokenKind::Noexcept),
    ("nullptr", TokenKind::Nullptr),
    ("operator", TokenKind::Operator),
    ("private", TokenKind::Private),
    ("protected", TokenKind::Protected),
    ("public", TokenKind::Public),
    ("register", TokenKind::Register),
    ("reinterpret_cast", TokenKind::ReinterpretCast),
    ("return", TokenKind::Return),
    ("short", TokenKind::Short),
    ("signed", TokenKind::Signed),
    ("sizeof", TokenKind::Sizeof),
    ("static", TokenKind::Static),
    ("static_assert", TokenKind::StaticAssert),
    ("static_cast", TokenKind::StaticCast),
    ("struct", TokenKind::Struct),
    ("switch", TokenKind::Switch),
    ("template", TokenKind::Template),
    ("this", TokenKind::This),
    ("throw", TokenKind::Throw),
    ("true", TokenKind::True),
    ("try", TokenKind::Try),
    ("typedef", TokenKind::Typedef),
    ("typename", TokenKind::Typename),
    ("union", TokenKind::Union),
    ("unsigned", TokenKind::Unsigned),
    ("using", TokenKind::Using),
    ("virtual", TokenKind::Virtual),
    ("void", TokenKind::Void),
    ("volatile", TokenKind::Volatile),
    ("wchar_t", TokenKind::WcharT),
    ("while", TokenKind::While),
];

/// Longest operators first so that prefix matching is greedy.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("->*", TokenKind::ArrowStar),
    ("...", TokenKind::Ellipsis),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpAssign),
    ("|=", TokenKind::PipeAssign),
    ("^=", TokenKind::CaretAssign),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::LtEq),
    (">=", TokenKind::GtEq),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("->", TokenKind::Arrow),
    (".*", TokenKind::DotStar),
    ("::", TokenKind::ColonColon),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("=", TokenKind::Assign),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("!", TokenKind::Bang),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    (".", TokenKind::Dot),
    ("?", TokenKind::Question),
    (":", TokenKind::Colon),
    (";", TokenKind::Semicolon),
    (",", TokenKind::Comma),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
];

/// A lexeme with its kind and where it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Pull-based lexer over a source string.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Restart the lexer on new text.
    pub fn reset(&mut self, source: &str) {
        *self = Self::new(source);
    }

    /// Pull the next token. Returns an `Eof` token forever once exhausted.
    ///
    /// An unrecognised character is reported as a [`LexError`] after it has
    /// been skipped, so calling again continues with the following input.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let (line, column) = (self.line, self.column);
        let Some(ch) = self.peek(0) else {
            return Ok(Token::new(TokenKind::Eof, "", line, column));
        };

        if let Some(token) = self.lex_prefixed_literal(line, column) {
            return token;
        }

        if is_ident_start(ch) {
            return Ok(self.lex_identifier(line, column));
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek(1).is_some_and(|c| c.is_ascii_digit())) {
            return Ok(self.lex_number(line, column));
        }

        if ch == '"' || ch == '\'' {
            return self.lex_quoted(String::new(), line, column);
        }

        for (text, kind) in OPERATORS {
            if self.starts_with(text) {
                for _ in 0..text.chars().count() {
                    self.bump();
                }
                return Ok(Token::new(*kind, *text, line, column));
            }
        }

        self.bump();
        Err(LexError {
            message: format!("unexpected character {:?}", ch),
            line,
            column,
        })
    }

    /// Lex the whole input, collecting errors alongside the tokens.
    pub fn tokenize(source: &str) -> (Vec<Token>, Vec<LexError>) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            match lexer.next_token() {
                Ok(token) => {
                    let done = token.is(TokenKind::Eof);
                    tokens.push(token);
                    if done {
                        break;
                    }
                }
                Err(err) => errors.push(err),
            }
        }
        (tokens, errors)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, expected)| self.peek(i) == Some(expected))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek(0) {
            if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Encoding prefixes (`L"..."`, `u8"..."`) glue onto the literal.
    fn lex_prefixed_literal(&mut self, line: usize, column: usize) -> Option<Result<Token, LexError>> {
        for prefix in ["u8", "L", "u", "U"] {
            let len = prefix.len();
            if self.starts_with(prefix) && matches!(self.peek(len), Some('"') | Some('\'')) {
                for _ in 0..len {
                    self.bump();
                }
                return Some(self.lex_quoted(prefix.to_string(), line, column));
            }
        }
        None
    }

    fn lex_identifier(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.peek(0) {
            if is_ident_continue(ch) {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = KEYWORDS
            .iter()
            .find(|(word, _)| *word == text)
            .map(|(_, kind)| *kind)
            .unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, line, column)
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        let mut is_float = false;

        let radix_prefix = self.peek(0) == Some('0')
            && matches!(self.peek(1), Some('x') | Some('X') | Some('b') | Some('B'));
        if radix_prefix {
            text.push(self.bump().unwrap_or('0'));
            text.push(self.bump().unwrap_or('x'));
            while let Some(ch) = self.peek(0) {
                if ch.is_ascii_hexdigit() || ch == '\'' {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        } else {
            while let Some(ch) = self.peek(0) {
                if ch.is_ascii_digit() || ch == '\'' {
                    text.push(ch);
                    self.bump();
                } else if ch == '.' && !is_float {
                    is_float = true;
                    text.push(ch);
                    self.bump();
                } else if matches!(ch, 'e' | 'E') {
                    let signed = matches!(self.peek(1), Some('+') | Some('-'));
                    let digit_at = if signed { 2 } else { 1 };
                    if !self.peek(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                        break;
                    }
                    is_float = true;
                    for _ in 0..digit_at {
                        text.push(self.bump().unwrap_or('e'));
                    }
                } else {
                    break;
                }
            }
        }

        while let Some(ch) = self.peek(0) {
            let suffix = if is_float {
                matches!(ch, 'f' | 'F' | 'l' | 'L')
            } else {
                matches!(ch, 'u' | 'U' | 'l' | 'L')
            };
            if suffix {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Token::new(kind, text, line, column)
    }

    /// Character or string literal. Escapes are validated, not decoded.
    fn lex_quoted(&mut self, mut text: String, line: usize, column: usize) -> Result<Token, LexError> {
        let quote = self.bump().unwrap_or('"');
        text.push(quote);
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(LexError {
                        message: "unterminated literal".into(),
                        line,
                        column,
                    });
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    self.lex_escape(&mut text, line, column)?;
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                    if ch == quote {
                        break;
                    }
                }
            }
        }
        let kind = if quote == '"' {
            TokenKind::StringLiteral
        } else {
            TokenKind::CharLiteral
        };
        Ok(Token::new(kind, text, line, column))
    }

    fn lex_escape(&mut self, text: &mut String, line: usize, column: usize) -> Result<(), LexError> {
        let bad = |what: &str| LexError {
            message: format!("malformed {} escape", what),
            line,
            column,
        };
        match self.peek(0) {
            Some(ch @ ('\'' | '"' | '?' | '\\' | 'a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v')) => {
                text.push(ch);
                self.bump();
            }
            Some(ch @ '0'..='7') => {
                text.push(ch);
                self.bump();
                for _ in 0..2 {
                    match self.peek(0) {
                        Some(d @ '0'..='7') => {
                            text.push(d);
                            self.bump();
                        }
                        _ => break,
                    }
                }
            }
            Some('x') => {
                text.push('x');
                self.bump();
                let mut digits = 0;
                while let Some(d) = self.peek(0).filter(|c| c.is_ascii_hexdigit()) {
                    text.push(d);
                    self.bump();
                    digits += 1;
                }
                if digits == 0 {
                    return Err(bad("hex"));
                }
            }
            Some(u @ ('u' | 'U')) => {
                text.push(u);
                self.bump();
                let width = if u == 'u' { 4 } else { 8 };
                for _ in 0..width {
                    match self.peek(0).filter(|c| c.is_ascii_hexdigit()) {
                        Some(d) => {
                            text.push(d);
                            self.bump();
                        }
                        None => return Err(bad("universal character")),
                    }
                }
            }
            _ => return Err(bad("character")),
        }
        Ok(())
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::tokenize(source);
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_do_not_shadow_longer_identifiers() {
        assert_eq!(
            kinds("int integer classy class"),
            vec![
                TokenKind::Int,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Class,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_match_longest_prefix() {
        assert_eq!(
            kinds(">>= >> > ->* -> :: :"),
            vec![
                TokenKind::ShrAssign,
                TokenKind::Shr,
                TokenKind::Gt,
                TokenKind::ArrowStar,
                TokenKind::Arrow,
                TokenKind::ColonColon,
                TokenKind::Colon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn integer_forms_are_kept_verbatim() {
        let (tokens, _) = Lexer::tokenize("0x1Fu 017 0b101 42UL 0");
        let lexemes: Vec<_> = tokens
            .iter()
            .filter(|t| t.is(TokenKind::IntLiteral))
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(lexemes, vec!["0x1Fu", "017", "0b101", "42UL", "0"]);
    }

    #[test]
    fn float_forms() {
        let (tokens, _) = Lexer::tokenize("1.5 2e10 3.0f .5 1e-3L");
        assert!(
            tokens[..5]
                .iter()
                .all(|t| t.is(TokenKind::FloatLiteral))
        );
        assert_eq!(tokens[4].lexeme, "1e-3L");
    }

    #[test]
    fn escapes_are_matched_but_not_decoded() {
        let (tokens, errors) = Lexer::tokenize(r#""a\tb\x41\101é" '\n' L"w""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].lexeme, r#""a\tb\x41\101é""#);
        assert_eq!(tokens[1].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[2].lexeme, "L\"w\"");
    }

    #[test]
    fn unknown_character_is_skipped_and_reported() {
        let mut lexer = Lexer::new("a @ b");
        assert_eq!(lexer.next_token().unwrap().lexeme, "a");
        let err = lexer.next_token().unwrap_err();
        assert_eq!((err.line, err.column), (1, 3));
        assert_eq!(lexer.next_token().unwrap().lexeme, "b");
    }

    #[test]
    fn newlines_only_advance_line_counter() {
        let (tokens, _) = Lexer::tokenize("a\n\n  b");
        assert_eq!((tokens[1].line, tokens[1].column), (3, 3));
    }

    #[test]
    fn reset_restarts_on_new_text() {
        let mut lexer = Lexer::new("x");
        lexer.next_token().unwrap();
        lexer.reset("y");
        assert_eq!(lexer.next_token().unwrap().lexeme, "y");
    }
}
