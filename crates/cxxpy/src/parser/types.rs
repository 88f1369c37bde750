//! Type specifiers, declarators and parameter lists.

use super::Parser;
use super::support::PResult;
use crate::error::{Coord, SyntaxError};
use crate::lexer::TokenKind;
use crate::model::{DeclId, Expr, ParamSpec, PrimitiveType};

/// Storage-class and function specifiers preceding a declaration.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Specifiers {
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_extern: bool,
    pub is_typedef: bool,
    pub is_friend: bool,
}

/// A parsed type, reduced to what translation needs.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeSpec {
    /// Source spelling, used for signatures.
    pub text: String,
    pub primitive: Option<PrimitiveType>,
    /// Raw scoped name of a user-defined type.
    pub named: Option<String>,
    /// Class or enumeration defined inline by this specifier.
    pub defined: Option<DeclId>,
}

impl TypeSpec {
    fn primitive(text: String, primitive: Option<PrimitiveType>) -> Self {
        Self {
            text,
            primitive,
            ..Self::default()
        }
    }

    pub fn named(raw: String) -> Self {
        Self {
            text: raw.clone(),
            named: Some(raw),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NameKind {
    Ident(String),
    Destructor(String),
    Operator(String),
    Conversion(Option<PrimitiveType>),
}

/// Possibly qualified declarator id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeclaratorName {
    /// Leading segments; a leading `::` is an empty first segment.
    pub scope: Vec<String>,
    pub base: NameKind,
}

impl DeclaratorName {
    pub fn ident(&self) -> Option<&str> {
        match &self.base {
            NameKind::Ident(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FunctionSuffix {
    pub params: Vec<ParamSpec>,
}

#[derive(Debug, Clone)]
pub(crate) struct Declarator {
    pub name: Option<DeclaratorName>,
    pub indirect: bool,
    pub arrays: Vec<Option<Expr>>,
    pub function: Option<FunctionSuffix>,
    pub coord: Coord,
}

/// How strictly a parenthesised group must look like parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamMode {
    /// Unknown identifiers count as types when a declarator follows.
    Lenient,
    /// Every parameter must start with a known type (block scope).
    Strict,
}

fn primitive_of(words: &[TokenKind]) -> Option<PrimitiveType> {
    if words.contains(&TokenKind::Void) {
        Some(PrimitiveType::Void)
    } else if words.contains(&TokenKind::Bool) {
        Some(PrimitiveType::Bool)
    } else if words.contains(&TokenKind::Float) || words.contains(&TokenKind::Double) {
        Some(PrimitiveType::Float)
    } else if words == [TokenKind::Char] || words == [TokenKind::WcharT] {
        Some(PrimitiveType::Char)
    } else if words == [TokenKind::Auto] {
        None
    } else {
        Some(PrimitiveType::Int)
    }
}

/// Tokens that may follow a type when a declarator comes next.
fn starts_declarator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Star
            | TokenKind::Amp
            | TokenKind::AndAnd
            | TokenKind::Tilde
            | TokenKind::Operator
            | TokenKind::ColonColon
    )
}

impl Parser<'_> {
    pub(crate) fn parse_specifiers(&mut self) -> Specifiers {
        let mut specs = Specifiers::default();
        loop {
            match self.kind() {
                TokenKind::Static => specs.is_static = true,
                TokenKind::Virtual => specs.is_virtual = true,
                TokenKind::Typedef => specs.is_typedef = true,
                TokenKind::Friend => specs.is_friend = true,
                TokenKind::Extern if self.kind_at(1) != TokenKind::StringLiteral => {
                    specs.is_extern = true
                }
                TokenKind::Inline
                | TokenKind::Explicit
                | TokenKind::Constexpr
                | TokenKind::Mutable
                | TokenKind::Register => {}
                _ => return specs,
            }
            self.advance();
        }
    }

    fn skip_cv(&mut self) {
        while matches!(self.kind(), TokenKind::Const | TokenKind::Volatile) {
            self.advance();
        }
    }

    /// Type specifier at the current position. Class and enum definitions
    /// are handled by the declaration parser before this is reached.
    pub(crate) fn parse_type_spec(&mut self, mode: ParamMode) -> PResult<TypeSpec> {
        self.skip_cv();
        self.eat(TokenKind::Typename);
        let kind = self.kind();
        let spec = if kind.is_primitive_type() {
            let mut words = Vec::new();
            let mut text = Vec::new();
            while self.kind().is_primitive_type() || self.check(TokenKind::Const) {
                let token = self.advance();
                if token.is(TokenKind::Const) {
                    continue;
                }
                words.push(token.kind);
                text.push(token.lexeme);
            }
            TypeSpec::primitive(text.join(" "), primitive_of(&words))
        } else if matches!(
            kind,
            TokenKind::Class | TokenKind::Struct | TokenKind::Union | TokenKind::Enum
        ) {
            self.advance();
            let (_, raw) = self.parse_qualified_type_name()?;
            TypeSpec::named(raw)
        } else if matches!(kind, TokenKind::Identifier | TokenKind::ColonColon) {
            let coord = self.coord();
            let (segments, raw) = self.parse_qualified_type_name()?;
            if let [single] = segments.as_slice() {
                if let Some(primitive) = self.primitive_alias(single) {
                    self.skip_cv();
                    return Ok(TypeSpec::primitive(raw, Some(primitive)));
                }
            }
            if mode == ParamMode::Strict && !self.is_type_name(&segments) {
                return Err(SyntaxError {
                    message: format!("`{}` does not name a type", raw),
                    coord,
                }
                .into());
            }
            TypeSpec::named(raw)
        } else {
            return Err(self.unexpected("a type"));
        };
        self.skip_cv();
        Ok(spec)
    }

    /// `a::b<T>::C` in type position. Returns the segments (template
    /// arguments dropped) and the raw scoped name.
    pub(crate) fn parse_qualified_type_name(&mut self) -> PResult<(Vec<String>, String)> {
        let mut segments = Vec::new();
        if self.eat(TokenKind::ColonColon) {
            segments.push(String::new());
        }
        loop {
            segments.push(self.expect_identifier()?);
            if self.check(TokenKind::Lt) {
                self.parse_template_args()?;
            }
            if self.check(TokenKind::ColonColon) && self.kind_at(1) == TokenKind::Identifier {
                self.advance();
                continue;
            }
            break;
        }
        let raw = segments.join("::");
        Ok((segments, raw))
    }

    /// `< arg, ... >`; arguments are parsed and discarded.
    pub(crate) fn parse_template_args(&mut self) -> PResult<()> {
        self.expect(TokenKind::Lt, "`<`")?;
        let saved = std::mem::replace(&mut self.in_template_args, true);
        let result = self.parse_template_arg_list();
        self.in_template_args = saved;
        result?;
        self.expect_template_close()
    }

    fn parse_template_arg_list(&mut self) -> PResult<()> {
        if matches!(self.kind(), TokenKind::Gt | TokenKind::Shr) {
            return Ok(());
        }
        loop {
            let as_type = self.try_parse(|p| {
                p.parse_type_spec(ParamMode::Lenient)?;
                p.parse_abstract_declarator()?;
                if matches!(
                    p.kind(),
                    TokenKind::Comma | TokenKind::Gt | TokenKind::Shr | TokenKind::Ellipsis
                ) {
                    Ok(())
                } else {
                    Err(p.unexpected("`,` or `>`"))
                }
            });
            if as_type.is_none() {
                self.parse_expression()?;
            }
            self.eat(TokenKind::Ellipsis);
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    /// Pointer and reference operators with no name (`int *`, `Foo &`).
    pub(crate) fn parse_abstract_declarator(&mut self) -> PResult<bool> {
        let mut indirect = false;
        while matches!(self.kind(), TokenKind::Star | TokenKind::Amp | TokenKind::AndAnd) {
            self.advance();
            self.skip_cv();
            indirect = true;
        }
        while self.check(TokenKind::LBracket) {
            self.skip_balanced()?;
        }
        Ok(indirect)
    }

    /// Type name in an expression context: type specifier plus abstract
    /// declarator, as in casts and `new`.
    pub(crate) fn parse_type_id(&mut self, mode: ParamMode) -> PResult<(TypeSpec, bool)> {
        let spec = self.parse_type_spec(mode)?;
        let indirect = self.parse_abstract_declarator()?;
        Ok((spec, indirect))
    }

    /// Look ahead over `::a::b<...>::c` starting `offset` tokens ahead
    /// without consuming. Returns the segments and the offset just past.
    pub(crate) fn scan_qualified(&mut self, offset: usize) -> Option<(Vec<String>, usize)> {
        let mut i = offset;
        let mut segments = Vec::new();
        if self.kind_at(i) == TokenKind::ColonColon {
            segments.push(String::new());
            i += 1;
        }
        loop {
            if self.kind_at(i) != TokenKind::Identifier {
                return None;
            }
            segments.push(self.tokens.peek_at(i).lexeme.clone());
            i += 1;
            if self.kind_at(i) == TokenKind::Lt && (segments.len() > 1 || self.is_type_or_template(&segments)) {
                i = self.scan_angles(i)?;
            }
            if self.kind_at(i) == TokenKind::ColonColon && self.kind_at(i + 1) == TokenKind::Identifier {
                i += 1;
                continue;
            }
            return Some((segments, i));
        }
    }

    fn is_type_or_template(&self, segments: &[String]) -> bool {
        self.is_template_name(segments) || self.is_type_name(segments)
    }

    /// Skip a balanced `<...>` in lookahead; `None` if it does not close.
    pub(crate) fn scan_angles(&mut self, mut i: usize) -> Option<usize> {
        let mut depth = 0i32;
        loop {
            match self.kind_at(i) {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => depth -= 1,
                TokenKind::Shr => depth -= 2,
                TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof => {
                    return None;
                }
                _ => {}
            }
            i += 1;
            if depth <= 0 {
                return Some(i);
            }
        }
    }

    /// Full declarator: pointer operators, a (possibly qualified) name,
    /// array and function suffixes.
    pub(crate) fn parse_declarator(&mut self, mode: ParamMode) -> PResult<Declarator> {
        let coord = self.coord();
        let mut indirect = false;
        loop {
            match self.kind() {
                TokenKind::Star | TokenKind::Amp | TokenKind::AndAnd => {
                    self.advance();
                    self.skip_cv();
                    indirect = true;
                }
                _ => break,
            }
        }

        // Function pointer: `(*name)(params)`.
        if self.check(TokenKind::LParen)
            && matches!(self.kind_at(1), TokenKind::Star | TokenKind::Amp)
        {
            self.advance();
            let inner = self.parse_declarator(mode)?;
            self.expect(TokenKind::RParen, "`)`")?;
            if self.check(TokenKind::LParen) {
                self.skip_balanced()?;
            }
            return Ok(Declarator {
                indirect: true,
                function: None,
                ..inner
            });
        }

        let name = match self.kind() {
            TokenKind::Identifier | TokenKind::ColonColon | TokenKind::Tilde | TokenKind::Operator => {
                Some(self.parse_declarator_name()?)
            }
            _ => None,
        };

        let mut arrays = Vec::new();
        while self.eat(TokenKind::LBracket) {
            if self.eat(TokenKind::RBracket) {
                arrays.push(None);
            } else {
                let size = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "`]`")?;
                arrays.push(Some(size));
            }
        }

        let mut function = None;
        if arrays.is_empty() && self.check(TokenKind::LParen) {
            function = self.try_parse(|p| p.parse_function_suffix(mode));
            if function.is_none() && mode == ParamMode::Lenient {
                function = self.try_parse(|p| p.parse_knr_suffix());
            }
        }

        Ok(Declarator {
            name,
            indirect,
            arrays,
            function,
            coord,
        })
    }

    fn parse_declarator_name(&mut self) -> PResult<DeclaratorName> {
        let mut scope = Vec::new();
        if self.eat(TokenKind::ColonColon) {
            scope.push(String::new());
        }
        loop {
            match self.kind() {
                TokenKind::Tilde => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    return Ok(DeclaratorName {
                        scope,
                        base: NameKind::Destructor(name),
                    });
                }
                TokenKind::Operator => {
                    self.advance();
                    let base = self.parse_operator_name()?;
                    return Ok(DeclaratorName { scope, base });
                }
                _ => {}
            }
            let name = self.expect_identifier()?;
            if self.check(TokenKind::Lt)
                && (self.is_template_name(std::slice::from_ref(&name)) || self.kind_is_scope_after_angles())
            {
                self.parse_template_args()?;
            }
            if self.check(TokenKind::ColonColon) {
                self.advance();
                scope.push(name);
                continue;
            }
            return Ok(DeclaratorName {
                scope,
                base: NameKind::Ident(name),
            });
        }
    }

    /// `Foo<T>::` ahead: template arguments followed by a scope separator.
    fn kind_is_scope_after_angles(&mut self) -> bool {
        self.scan_angles(0)
            .is_some_and(|end| self.kind_at(end) == TokenKind::ColonColon)
    }

    fn parse_operator_name(&mut self) -> PResult<NameKind> {
        let token = self.advance();
        let symbol = match token.kind {
            TokenKind::LParen => {
                self.expect(TokenKind::RParen, "`)`")?;
                "()".to_string()
            }
            TokenKind::LBracket => {
                self.expect(TokenKind::RBracket, "`]`")?;
                "[]".to_string()
            }
            TokenKind::New | TokenKind::Delete => {
                let mut text = token.lexeme.clone();
                if self.eat(TokenKind::LBracket) {
                    self.expect(TokenKind::RBracket, "`]`")?;
                    text.push_str("[]");
                }
                text
            }
            kind if kind.is_primitive_type() || kind == TokenKind::Identifier || kind == TokenKind::Const => {
                // Conversion operator: the type is the name.
                let mut words = vec![token.kind];
                while self.kind().is_primitive_type() || self.check(TokenKind::Const) {
                    words.push(self.advance().kind);
                }
                while self.check(TokenKind::ColonColon) || self.check(TokenKind::Identifier) {
                    self.advance();
                }
                self.parse_abstract_declarator()?;
                words.retain(|k| *k != TokenKind::Const);
                let primitive = if words.iter().all(|k| k.is_primitive_type()) {
                    primitive_of(&words)
                } else {
                    None
                };
                return Ok(NameKind::Conversion(primitive));
            }
            TokenKind::Eof => return Err(self.unexpected("an operator")),
            _ => token.lexeme.clone(),
        };
        Ok(NameKind::Operator(symbol))
    }

    /// `( params ) qualifiers`.
    fn parse_function_suffix(&mut self, mode: ParamMode) -> PResult<FunctionSuffix> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if self.check(TokenKind::Void) && self.kind_at(1) == TokenKind::RParen {
            self.advance();
        }
        if !self.check(TokenKind::RParen) {
            loop {
                if self.eat(TokenKind::Ellipsis) {
                    break;
                }
                params.push(self.parse_parameter(mode)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        self.parse_function_qualifiers()?;
        Ok(FunctionSuffix { params })
    }

    fn parse_function_qualifiers(&mut self) -> PResult<()> {
        loop {
            match self.kind() {
                TokenKind::Const | TokenKind::Volatile | TokenKind::Amp | TokenKind::AndAnd => {
                    self.advance();
                }
                TokenKind::Noexcept | TokenKind::Throw => {
                    self.advance();
                    if self.check(TokenKind::LParen) {
                        self.skip_balanced()?;
                    }
                }
                TokenKind::Identifier
                    if matches!(self.peek().lexeme.as_str(), "override" | "final") =>
                {
                    self.advance();
                }
                TokenKind::Arrow => {
                    self.advance();
                    self.parse_type_id(ParamMode::Lenient)?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_parameter(&mut self, mode: ParamMode) -> PResult<ParamSpec> {
        let coord = self.coord();
        self.parse_specifiers();
        let lone_unknown = matches!(self.kind(), TokenKind::Identifier)
            && matches!(
                self.kind_at(1),
                TokenKind::Comma | TokenKind::RParen | TokenKind::Assign
            );
        let spec = self.parse_type_spec(mode)?;
        if lone_unknown && spec.primitive.is_none() {
            let known = spec
                .named
                .as_ref()
                .is_some_and(|name| self.is_type_name(&[name.clone()]));
            if !known {
                return Err(self.error(format!("`{}` is not a parameter type", spec.text)));
            }
        }
        if mode == ParamMode::Lenient
            && spec.named.is_some()
            && !starts_declarator(self.kind())
            && !matches!(
                self.kind(),
                TokenKind::Comma | TokenKind::RParen | TokenKind::Assign | TokenKind::LBracket | TokenKind::LParen
            )
        {
            return Err(self.unexpected("a parameter declarator"));
        }
        let declarator = self.parse_declarator(ParamMode::Lenient)?;
        let name = declarator.name.as_ref().and_then(|n| n.ident()).map(str::to_string);
        let mut type_name = spec.text.clone();
        if declarator.indirect {
            type_name.push('*');
        }
        for _ in &declarator.arrays {
            type_name.push_str("[]");
        }
        let default = if self.eat(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(ParamSpec {
            name,
            type_name,
            default,
            coord,
        })
    }

    /// Old-style definition: `f(a, b) int a; char *b; {`. Only accepted
    /// when the declaration list is followed by a body.
    fn parse_knr_suffix(&mut self) -> PResult<FunctionSuffix> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut names = Vec::new();
        loop {
            let coord = self.coord();
            names.push((self.expect_identifier()?, coord));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        let mut types = std::collections::HashMap::new();
        while !self.check(TokenKind::LBrace) {
            self.parse_specifiers();
            let spec = self.parse_type_spec(ParamMode::Lenient)?;
            loop {
                let declarator = self.parse_declarator(ParamMode::Strict)?;
                let name = declarator
                    .name
                    .as_ref()
                    .and_then(|n| n.ident())
                    .map(str::to_string)
                    .ok_or_else(|| self.unexpected("a parameter name"))?;
                let mut type_name = spec.text.clone();
                if declarator.indirect {
                    type_name.push('*');
                }
                types.insert(name, type_name);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semicolon, "`;`")?;
        }
        let params = names
            .into_iter()
            .map(|(name, coord)| ParamSpec {
                type_name: types.remove(&name).unwrap_or_else(|| "int".to_string()),
                name: Some(name),
                default: None,
                coord,
            })
            .collect();
        Ok(FunctionSuffix { params })
    }
}
