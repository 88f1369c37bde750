//! Declarations at namespace, class and linkage-block scope.

use super::Parser;
use super::support::PResult;
use super::types::{Declarator, DeclaratorName, FunctionSuffix, NameKind, ParamMode, Specifiers, TypeSpec};
use crate::error::{Coord, TranslateError, UnresolvedNameError};
use crate::lexer::TokenKind;
use crate::model::{
    Attribute, BinaryOp, Class, ClassKind, DeclId, DeclKind, Enumeration, Expr, FunctionSpec, Lookup,
    MemberInit, PrimitiveType, Variable, split_scoped,
};

/// What follows a function declarator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Declaration,
    Pure,
    Defaulted,
    Deleted,
    Body,
}

/// Python special method for a member operator with `arity` explicit
/// parameters.
fn dunder(symbol: &str, arity: usize) -> Option<&'static str> {
    Some(match (symbol, arity) {
        ("+", 0) => "__pos__",
        ("-", 0) => "__neg__",
        ("~", 0) => "__invert__",
        ("+", _) => "__add__",
        ("-", _) => "__sub__",
        ("*", 1) => "__mul__",
        ("/", _) => "__truediv__",
        ("%", _) => "__mod__",
        ("==", _) => "__eq__",
        ("!=", _) => "__ne__",
        ("<", _) => "__lt__",
        ("<=", _) => "__le__",
        (">", _) => "__gt__",
        (">=", _) => "__ge__",
        ("[]", _) => "__getitem__",
        ("()", _) => "__call__",
        ("<<", _) => "__lshift__",
        (">>", _) => "__rshift__",
        ("&", 1) => "__and__",
        ("|", _) => "__or__",
        ("^", _) => "__xor__",
        ("+=", _) => "__iadd__",
        ("-=", _) => "__isub__",
        ("*=", _) => "__imul__",
        ("/=", _) => "__itruediv__",
        ("%=", _) => "__imod__",
        ("<<=", _) => "__ilshift__",
        (">>=", _) => "__irshift__",
        ("&=", _) => "__iand__",
        ("|=", _) => "__ior__",
        ("^=", _) => "__ixor__",
        _ => return None,
    })
}

impl Parser<'_> {
    /// Declarations up to (not including) `end`.
    pub(crate) fn parse_declaration_seq(&mut self, end: TokenKind) -> PResult<()> {
        while !self.check(end) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            self.parse_declaration()?;
        }
        Ok(())
    }

    pub(crate) fn parse_declaration(&mut self) -> PResult<()> {
        match self.kind() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::Inline if self.kind_at(1) == TokenKind::Namespace => {
                self.advance();
                self.parse_namespace()
            }
            TokenKind::Using => self.parse_using(),
            TokenKind::Template => self.parse_template(),
            TokenKind::StaticAssert => self.skip_declaration(),
            TokenKind::Extern if self.kind_at(1) == TokenKind::StringLiteral => self.parse_linkage(),
            TokenKind::Public | TokenKind::Private | TokenKind::Protected
                if self.kind_at(1) == TokenKind::Colon =>
            {
                self.advance();
                self.advance();
                Ok(())
            }
            _ => self.parse_simple_declaration(),
        }
    }

    fn parse_namespace(&mut self) -> PResult<()> {
        let coord = self.coord();
        self.expect(TokenKind::Namespace, "`namespace`")?;
        let mut names = Vec::new();
        while self.check(TokenKind::Identifier) {
            names.push(self.advance().lexeme);
            if !self.eat(TokenKind::ColonColon) {
                break;
            }
            self.eat(TokenKind::Inline);
        }
        if self.check(TokenKind::Assign) {
            tracing::debug!("{}: namespace alias ignored", coord);
            return self.skip_declaration();
        }
        if self.model.module(self.context).is_none() {
            return Err(self.error("namespace definition is not allowed here"));
        }
        let mut module = self.context;
        for name in &names {
            module = self.model.add_module(module, name, coord.clone());
        }
        self.expect(TokenKind::LBrace, "`{`")?;
        self.push_scope();
        let saved = std::mem::replace(&mut self.context, module);
        let result = self.parse_declaration_seq(TokenKind::RBrace);
        self.context = saved;
        result?;
        self.expect(TokenKind::RBrace, "`}`")?;
        self.pop_scope()
    }

    fn parse_using(&mut self) -> PResult<()> {
        let coord = self.coord();
        self.expect(TokenKind::Using, "`using`")?;
        if self.check(TokenKind::Identifier) && self.kind_at(1) == TokenKind::Assign {
            let name_coord = self.coord();
            let name = self.advance().lexeme;
            self.advance();
            let spec = self.parse_decl_type()?;
            let indirect = self.parse_abstract_declarator()?;
            let declarator = Declarator {
                name: Some(DeclaratorName {
                    scope: Vec::new(),
                    base: NameKind::Ident(name),
                }),
                indirect,
                arrays: Vec::new(),
                function: None,
                coord: name_coord,
            };
            self.commit_typedef(&spec, &declarator)?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            return Ok(());
        }
        tracing::debug!("{}: using-declaration ignored", coord);
        self.skip_declaration()
    }

    fn parse_template(&mut self) -> PResult<()> {
        let coord = self.coord();
        self.expect(TokenKind::Template, "`template`")?;
        if !self.check(TokenKind::Lt) {
            tracing::debug!("{}: explicit instantiation ignored", coord);
            return self.skip_declaration();
        }
        self.advance();
        if self.eat(TokenKind::Gt) {
            tracing::debug!("{}: explicit specialisation ignored", coord);
            return self.skip_declaration();
        }
        let params = self.parse_template_params()?;
        self.expect_template_close()?;
        self.template_frames.push(params);
        self.pending_template = true;
        let result = self.parse_declaration();
        self.template_frames.pop();
        self.pending_template = false;
        result
    }

    fn parse_template_params(&mut self) -> PResult<Vec<String>> {
        let mut params = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Typename | TokenKind::Class => {
                    self.advance();
                    self.eat(TokenKind::Ellipsis);
                    if self.check(TokenKind::Identifier) {
                        params.push(self.advance().lexeme);
                    }
                    if self.eat(TokenKind::Assign) {
                        let saved = std::mem::replace(&mut self.in_template_args, true);
                        let result = self.parse_type_id(ParamMode::Lenient);
                        self.in_template_args = saved;
                        result?;
                    }
                }
                TokenKind::Template => {
                    self.advance();
                    self.expect(TokenKind::Lt, "`<`")?;
                    self.parse_template_params()?;
                    self.expect_template_close()?;
                    if !(self.eat(TokenKind::Class) || self.eat(TokenKind::Typename)) {
                        return Err(self.unexpected("`class`"));
                    }
                    if self.check(TokenKind::Identifier) {
                        params.push(self.advance().lexeme);
                    }
                }
                _ => {
                    self.parse_type_spec(ParamMode::Lenient)?;
                    self.eat(TokenKind::Ellipsis);
                    self.parse_declarator(ParamMode::Lenient)?;
                    if self.eat(TokenKind::Assign) {
                        let saved = std::mem::replace(&mut self.in_template_args, true);
                        let result = self.parse_conditional_expression();
                        self.in_template_args = saved;
                        result?;
                    }
                }
            }
            if !self.eat(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    fn parse_linkage(&mut self) -> PResult<()> {
        self.advance();
        self.advance();
        if self.eat(TokenKind::LBrace) {
            self.parse_declaration_seq(TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace, "`}`")?;
            Ok(())
        } else {
            self.parse_declaration()
        }
    }

    fn parse_simple_declaration(&mut self) -> PResult<()> {
        let start = self.coord();
        let specs = self.parse_specifiers();
        if specs.is_friend {
            tracing::debug!("{}: friend declaration ignored", start);
            return self.skip_declaration();
        }
        if self.at_special_member() {
            return self.parse_special_member(specs);
        }
        let spec = self.parse_decl_type()?;
        if self.eat(TokenKind::Semicolon) {
            if let Some(id) = spec.defined {
                self.finish_bare_definition(id);
            }
            return Ok(());
        }
        self.parse_init_declarators(specs, &spec)
    }

    /// `struct { ... };` with no declarators.
    fn finish_bare_definition(&mut self, id: DeclId) {
        if self.model.name(id).is_some() || self.model.class(id).is_none() {
            return;
        }
        if self.model.class(self.context).is_some() {
            self.model.dissolve_anonymous(id);
        } else {
            tracing::warn!("{}: anonymous class is never used", self.model.get(id).coord);
        }
    }

    /// Type of a declaration, including inline class and enum definitions.
    pub(crate) fn parse_decl_type(&mut self) -> PResult<TypeSpec> {
        let spec = match self.kind() {
            TokenKind::Class | TokenKind::Struct | TokenKind::Union => self.parse_class_specifier()?,
            TokenKind::Enum => self.parse_enum_specifier()?,
            _ => return self.parse_type_spec(ParamMode::Lenient),
        };
        while matches!(self.kind(), TokenKind::Const | TokenKind::Volatile) {
            self.advance();
        }
        Ok(spec)
    }

    fn parse_init_declarators(&mut self, specs: Specifiers, spec: &TypeSpec) -> PResult<()> {
        loop {
            let declarator = self.parse_declarator(ParamMode::Lenient)?;
            if specs.is_typedef {
                self.commit_typedef(spec, &declarator)?;
            } else if let Some(suffix) = declarator.function.clone() {
                if self.parse_function_rest(specs, spec, &declarator, &suffix)? {
                    return Ok(());
                }
            } else {
                self.parse_variable(specs, spec, &declarator)?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(())
    }

    /// Constructor, destructor or conversion operator: no leading type.
    fn at_special_member(&mut self) -> bool {
        match self.kind() {
            TokenKind::Tilde | TokenKind::Operator => true,
            TokenKind::Identifier | TokenKind::ColonColon => {
                let Some((segments, end)) = self.scan_qualified(0) else {
                    return false;
                };
                match self.kind_at(end) {
                    TokenKind::LParen => {
                        if let [single] = segments.as_slice() {
                            self.model.class(self.context).is_some()
                                && self.model.name(self.context) == Some(single.as_str())
                        } else {
                            let n = segments.len();
                            segments[n - 1] == segments[n - 2]
                        }
                    }
                    TokenKind::ColonColon => matches!(
                        self.kind_at(end + 1),
                        TokenKind::Tilde | TokenKind::Operator
                    ),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn parse_special_member(&mut self, specs: Specifiers) -> PResult<()> {
        let declarator = self.parse_declarator(ParamMode::Lenient)?;
        let Some(suffix) = declarator.function.clone() else {
            return Err(self.unexpected("a parameter list"));
        };
        if !self.parse_function_rest(specs, &TypeSpec::default(), &declarator, &suffix)? {
            self.expect(TokenKind::Semicolon, "`;`")?;
        }
        Ok(())
    }

    /// Everything after a function declarator. Returns whether a body was
    /// consumed, which ends the declaration.
    fn parse_function_rest(
        &mut self,
        specs: Specifiers,
        spec: &TypeSpec,
        declarator: &Declarator,
        suffix: &FunctionSuffix,
    ) -> PResult<bool> {
        let tail = self.parse_function_tail()?;
        let target = self.commit_function(specs, spec, declarator, suffix, tail)?;
        if tail != Tail::Body {
            return Ok(false);
        }
        match target {
            Some(id) => self.parse_function_definition(id)?,
            None => {
                if self.check(TokenKind::Colon) {
                    self.parse_member_initializers()?;
                }
                self.skip_balanced()?;
            }
        }
        Ok(true)
    }

    fn parse_function_tail(&mut self) -> PResult<Tail> {
        match self.kind() {
            TokenKind::Assign => {
                self.advance();
                let token = self.advance();
                match token.kind {
                    TokenKind::IntLiteral if token.lexeme == "0" => Ok(Tail::Pure),
                    TokenKind::Default => Ok(Tail::Defaulted),
                    TokenKind::Delete => Ok(Tail::Deleted),
                    _ => Err(self.error(format!(
                        "expected `0`, `default` or `delete`, found `{}`",
                        token.lexeme
                    ))),
                }
            }
            TokenKind::Colon | TokenKind::LBrace => Ok(Tail::Body),
            TokenKind::Try => Err(TranslateError::unsupported("function try block", self.coord())),
            _ => Ok(Tail::Declaration),
        }
    }

    /// Declaration context named by a qualified declarator's scope.
    fn declaration_owner(&mut self, name: &DeclaratorName, coord: &Coord) -> PResult<DeclId> {
        if name.scope.is_empty() {
            return Ok(self.context);
        }
        match self.model.lookup_qualified(self.context, &name.scope) {
            Ok(Lookup::Decl(id)) => Ok(id),
            Ok(Lookup::Enumerator { .. }) => Err(self.error("enumerator used as a scope")),
            Err(missing) => Err(UnresolvedNameError {
                name: name.scope.join("::"),
                segment: missing.0,
                coord: coord.clone(),
            }
            .into()),
        }
    }

    fn commit_function(
        &mut self,
        specs: Specifiers,
        spec: &TypeSpec,
        declarator: &Declarator,
        suffix: &FunctionSuffix,
        tail: Tail,
    ) -> PResult<Option<DeclId>> {
        let coord = declarator.coord.clone();
        let Some(name) = declarator.name.clone() else {
            return Err(self.error("expected a function name"));
        };
        if tail == Tail::Deleted {
            tracing::debug!("{}: deleted function skipped", coord);
            return Ok(None);
        }
        let owner = self.declaration_owner(&name, &coord)?;
        let fspec = FunctionSpec {
            params: suffix.params.clone(),
            return_type: spec.text.clone(),
            is_static: specs.is_static,
            is_virtual: specs.is_virtual || tail == Tail::Pure,
            is_pure: tail == Tail::Pure,
            has_body: tail == Tail::Body,
        };
        match self.model.kind(owner) {
            DeclKind::Class(_) => self.commit_member_function(owner, &name, &fspec, tail, coord),
            DeclKind::Module(_) => match &name.base {
                NameKind::Ident(ident) => {
                    let ident = ident.clone();
                    if name.scope.is_empty() {
                        self.declare_value(&ident)?;
                    }
                    self.note_template(&ident);
                    Ok(Some(self.model.add_function(owner, &ident, &fspec, coord)))
                }
                NameKind::Operator(symbol) => {
                    tracing::warn!("{}: free function operator{} skipped", coord, symbol);
                    Ok(None)
                }
                NameKind::Conversion(_) => {
                    tracing::warn!("{}: conversion operator outside a class skipped", coord);
                    Ok(None)
                }
                NameKind::Destructor(class) => {
                    Err(self.error(format!("destructor `~{}` declared outside its class", class)))
                }
            },
            _ if fspec.has_body => Err(self.error("function definition is not allowed here")),
            _ => {
                tracing::debug!("{}: local function declaration ignored", coord);
                Ok(None)
            }
        }
    }

    fn commit_member_function(
        &mut self,
        class: DeclId,
        name: &DeclaratorName,
        fspec: &FunctionSpec,
        tail: Tail,
        coord: Coord,
    ) -> PResult<Option<DeclId>> {
        let class_name = self.model.name(class).map(str::to_string);
        match &name.base {
            NameKind::Ident(ident) if class_name.as_deref() == Some(ident.as_str()) => {
                if tail == Tail::Defaulted {
                    return Ok(None);
                }
                Ok(Some(self.model.add_constructor(class, fspec, coord)))
            }
            NameKind::Destructor(_) => {
                if tail == Tail::Defaulted {
                    return Ok(None);
                }
                Ok(Some(self.model.add_destructor(class, fspec, coord)?))
            }
            NameKind::Ident(ident) => {
                if tail == Tail::Defaulted {
                    return Ok(None);
                }
                let ident = ident.clone();
                if name.scope.is_empty() {
                    self.declare_value(&ident)?;
                }
                self.note_template(&ident);
                Ok(Some(self.model.add_method(class, &ident, fspec, coord)))
            }
            NameKind::Operator(symbol) => match dunder(symbol, fspec.params.len()) {
                Some(method) => Ok(Some(self.model.add_method(class, method, fspec, coord))),
                None if symbol == "=" => {
                    tracing::warn!("{}: assignment operator skipped", coord);
                    Ok(None)
                }
                None => Err(TranslateError::unsupported(format!("operator{}", symbol), coord)),
            },
            NameKind::Conversion(primitive) => {
                let method = match primitive {
                    Some(PrimitiveType::Int) => "__int__",
                    Some(PrimitiveType::Float) => "__float__",
                    Some(PrimitiveType::Bool) => "__bool__",
                    _ => return Err(TranslateError::unsupported("conversion operator", coord)),
                };
                Ok(Some(self.model.add_method(class, method, fspec, coord)))
            }
        }
    }

    /// Member initialisers and body of a committed function.
    fn parse_function_definition(&mut self, function: DeclId) -> PResult<()> {
        let saved = std::mem::replace(&mut self.context, function);
        let result = self.parse_function_definition_in(function);
        self.context = saved;
        result
    }

    fn parse_function_definition_in(&mut self, function: DeclId) -> PResult<()> {
        if self.check(TokenKind::Colon) {
            let inits = self.parse_member_initializers()?;
            if !matches!(self.model.kind(function), DeclKind::Constructor(_)) {
                return Err(self.error("member initialisers outside a constructor"));
            }
            self.model.set_initializers(function, inits);
        }
        self.expect(TokenKind::LBrace, "`{`")?;
        self.push_scope();
        let params: Vec<String> = self
            .model
            .function(function)
            .map(|f| {
                f.parameters
                    .iter()
                    .filter_map(|p| self.model.name(*p).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        for param in &params {
            self.declare_value(param)?;
        }
        let body = self.parse_block_items()?;
        self.expect(TokenKind::RBrace, "`}`")?;
        self.pop_scope()?;
        self.model.set_statements(function, body);
        Ok(())
    }

    fn parse_member_initializers(&mut self) -> PResult<Vec<MemberInit>> {
        self.expect(TokenKind::Colon, "`:`")?;
        let mut inits = Vec::new();
        loop {
            let coord = self.coord();
            let (_, name) = self.parse_qualified_type_name()?;
            let args = if self.eat(TokenKind::LBrace) {
                self.parse_expression_list(TokenKind::RBrace)?
            } else {
                self.expect(TokenKind::LParen, "`(`")?;
                self.parse_expression_list(TokenKind::RParen)?
            };
            self.eat(TokenKind::Ellipsis);
            inits.push(MemberInit { name, args, coord });
            if !self.eat(TokenKind::Comma) {
                return Ok(inits);
            }
        }
    }

    /// Variable or attribute declarator at namespace or class scope.
    fn parse_variable(&mut self, specs: Specifiers, spec: &TypeSpec, declarator: &Declarator) -> PResult<()> {
        let Some(name) = declarator.name.clone() else {
            if self.eat(TokenKind::Colon) {
                self.parse_conditional_expression()?;
                return Ok(());
            }
            return Err(self.unexpected("a declarator name"));
        };
        let Some(ident) = name.ident().map(str::to_string) else {
            return Err(self.error("expected a variable name"));
        };
        if self.eat(TokenKind::Colon) {
            self.parse_conditional_expression()?;
        }
        let explicit = self.parse_explicit_initializer(spec)?;
        let coord = declarator.coord.clone();
        let owner = self.declaration_owner(&name, &coord)?;

        if !name.scope.is_empty() {
            // Out-of-line definition of a static member or namespace variable.
            if let Some(existing) = self.model.kind(owner).members().and_then(|m| m.get(&ident)) {
                if let Some(value) = explicit {
                    self.model.set_value(existing, value);
                }
                return Ok(());
            }
        } else {
            self.declare_value(&ident)?;
        }

        let value = match explicit {
            Some(value) => Some(value),
            None => self.default_value(spec, declarator),
        };
        match self.model.kind(owner) {
            DeclKind::Class(_) => {
                let attribute = Attribute {
                    value,
                    is_static: specs.is_static,
                };
                self.model.add_attribute(owner, &ident, attribute, coord);
            }
            DeclKind::Module(_) => {
                if specs.is_extern && value.is_none() {
                    tracing::debug!("{}: extern declaration of `{}` ignored", coord, ident);
                    return Ok(());
                }
                let variable = Variable { value, is_alias: false };
                self.model
                    .add_declaration(owner, Some(&ident), DeclKind::Variable(variable), coord);
            }
            _ => return Err(self.error("variable declaration is not allowed here")),
        }
        Ok(())
    }

    /// `= value`, `{ ... }` or `( args )` after a declarator.
    pub(crate) fn parse_explicit_initializer(&mut self, spec: &TypeSpec) -> PResult<Option<Expr>> {
        if self.eat(TokenKind::Assign) {
            if self.eat(TokenKind::LBrace) {
                let items = self.parse_expression_list(TokenKind::RBrace)?;
                return Ok(Some(self.construct(spec, items, true)));
            }
            return Ok(Some(self.parse_expression()?));
        }
        if self.eat(TokenKind::LBrace) {
            let items = self.parse_expression_list(TokenKind::RBrace)?;
            return Ok(Some(self.construct(spec, items, true)));
        }
        if self.eat(TokenKind::LParen) {
            let args = self.parse_expression_list(TokenKind::RParen)?;
            return Ok(Some(self.construct(spec, args, false)));
        }
        Ok(None)
    }

    /// Value of `T x(args)` / `T x{args}`.
    fn construct(&mut self, spec: &TypeSpec, args: Vec<Expr>, braced: bool) -> Expr {
        match (&spec.primitive, &spec.named) {
            (Some(_), _) | (None, None) if !braced || args.len() <= 1 => {
                args.into_iter().next().unwrap_or_else(Expr::none)
            }
            (None, Some(raw)) if self.names_class(raw) => {
                let coord = self.coord();
                let class = self.type_expr(raw.clone(), coord);
                Expr::invoke(class, args)
            }
            _ if braced => Expr::List(args),
            _ => args.into_iter().next().unwrap_or_else(Expr::none),
        }
    }

    /// Initial value of a declarator without an initialiser.
    pub(crate) fn default_value(&mut self, spec: &TypeSpec, declarator: &Declarator) -> Option<Expr> {
        if let Some(first) = declarator.arrays.first() {
            return first
                .clone()
                .map(|size| Expr::binary(Expr::List(vec![Expr::none()]), BinaryOp::Mul, size));
        }
        if declarator.indirect {
            return None;
        }
        let raw = spec.named.clone()?;
        if !self.names_class(&raw) {
            return None;
        }
        let class = self.type_expr(raw, declarator.coord.clone());
        Some(Expr::invoke(class, Vec::new()))
    }

    /// Whether `raw` names a class (or class alias) in the model.
    fn names_class(&self, raw: &str) -> bool {
        let segments = split_scoped(raw);
        match self.model.lookup_qualified(self.context, &segments) {
            Ok(Lookup::Decl(id)) => match self.model.kind(id) {
                DeclKind::Class(_) => true,
                DeclKind::Variable(v) => v.is_alias,
                _ => false,
            },
            _ => false,
        }
    }

    pub(crate) fn commit_typedef(&mut self, spec: &TypeSpec, declarator: &Declarator) -> PResult<()> {
        let Some(name) = declarator.name.as_ref().and_then(|n| n.ident()).map(str::to_string) else {
            return Err(self.error("expected a typedef name"));
        };
        self.declare_type(&name)?;
        let plain = !declarator.indirect && declarator.arrays.is_empty() && declarator.function.is_none();
        if !plain {
            return Ok(());
        }
        if let Some(primitive) = spec.primitive {
            self.add_alias(&name, primitive);
            return Ok(());
        }
        if let Some(id) = spec.defined {
            if self.model.name(id).is_none() {
                self.model.name_anonymous(id, &name);
                return Ok(());
            }
        }
        if self.at_block_scope() {
            return Ok(());
        }
        let Some(raw) = spec.named.clone() else {
            return Ok(());
        };
        if raw == name {
            return Ok(());
        }
        let target = match self.model.lookup_qualified(self.context, &split_scoped(&raw)) {
            Ok(Lookup::Decl(id)) => Some(id),
            _ => None,
        };
        let is_type = target.is_some_and(|id| {
            matches!(self.model.kind(id), DeclKind::Class(_) | DeclKind::Enumeration(_))
                || matches!(self.model.kind(id), DeclKind::Variable(v) if v.is_alias)
        });
        if is_type {
            let value = self.type_expr(raw, declarator.coord.clone());
            let alias = Variable {
                value: Some(value),
                is_alias: true,
            };
            self.model.add_declaration(
                self.context,
                Some(&name),
                DeclKind::Variable(alias),
                declarator.coord.clone(),
            );
        }
        Ok(())
    }

    pub(crate) fn parse_class_specifier(&mut self) -> PResult<TypeSpec> {
        let coord = self.coord();
        let key = self.advance();
        let kind = match key.kind {
            TokenKind::Struct => ClassKind::Struct,
            TokenKind::Union => ClassKind::Union,
            _ => ClassKind::Class,
        };
        let mut segments = None;
        if matches!(self.kind(), TokenKind::Identifier | TokenKind::ColonColon) {
            let mut names = Vec::new();
            if self.eat(TokenKind::ColonColon) {
                names.push(String::new());
            }
            loop {
                names.push(self.expect_identifier()?);
                if self.check(TokenKind::ColonColon) && self.kind_at(1) == TokenKind::Identifier {
                    self.advance();
                    continue;
                }
                break;
            }
            if self.check(TokenKind::Lt) {
                self.parse_template_args()?;
                if matches!(self.kind(), TokenKind::LBrace | TokenKind::Colon) {
                    tracing::debug!("{}: class template specialisation ignored", coord);
                    while !self.check(TokenKind::LBrace) {
                        if self.check(TokenKind::Eof) {
                            return Err(self.unexpected("`{`"));
                        }
                        self.advance();
                    }
                    self.skip_balanced()?;
                    self.pending_template = false;
                    return Ok(TypeSpec::named(names.join("::")));
                }
            }
            segments = Some(names);
        }
        if self.check(TokenKind::Identifier) && self.peek().lexeme == "final" {
            self.advance();
        }

        let mut bases = Vec::new();
        if self.check(TokenKind::Colon) {
            let clause = self.try_parse(|p| {
                let bases = p.parse_base_clause()?;
                if p.check(TokenKind::LBrace) {
                    Ok(bases)
                } else {
                    Err(p.unexpected("`{`"))
                }
            });
            match clause {
                Some(found) => bases = found,
                // A bit-field of elaborated type: `struct S : 3`.
                None => return self.elaborated(segments),
            }
        }
        if !self.check(TokenKind::LBrace) {
            return self.elaborated(segments);
        }
        self.define_class(kind, segments, bases, coord)
    }

    fn elaborated(&mut self, segments: Option<Vec<String>>) -> PResult<TypeSpec> {
        let Some(segments) = segments else {
            return Err(self.unexpected("a class name"));
        };
        if let [name] = segments.as_slice() {
            if self.check(TokenKind::Semicolon) {
                self.declare_type(name)?;
            }
        }
        self.pending_template = false;
        Ok(TypeSpec::named(segments.join("::")))
    }

    fn parse_base_clause(&mut self) -> PResult<Vec<(String, Coord)>> {
        self.expect(TokenKind::Colon, "`:`")?;
        let mut bases = Vec::new();
        loop {
            while matches!(
                self.kind(),
                TokenKind::Public | TokenKind::Protected | TokenKind::Private | TokenKind::Virtual
            ) {
                self.advance();
            }
            let coord = self.coord();
            let (_, raw) = self.parse_qualified_type_name()?;
            self.eat(TokenKind::Ellipsis);
            bases.push((raw, coord));
            if !self.eat(TokenKind::Comma) {
                return Ok(bases);
            }
        }
    }

    fn define_class(
        &mut self,
        kind: ClassKind,
        segments: Option<Vec<String>>,
        bases: Vec<(String, Coord)>,
        coord: Coord,
    ) -> PResult<TypeSpec> {
        let (owner, name) = match segments {
            Some(mut segments) if segments.len() > 1 => {
                let name = segments.pop();
                let scope = DeclaratorName {
                    scope: segments,
                    base: NameKind::Ident(String::new()),
                };
                (self.declaration_owner(&scope, &coord)?, name)
            }
            Some(mut segments) => (self.context, segments.pop()),
            None => (self.context, None),
        };
        if self.model.function(owner).is_some() {
            return Err(TranslateError::unsupported("local class definition", coord));
        }
        let id = self.model.add_declaration(
            owner,
            name.as_deref(),
            DeclKind::Class(Class::new(kind)),
            coord,
        );
        match &name {
            Some(name) => {
                self.declare_type(name)?;
                self.note_template(name);
            }
            None => self.pending_template = false,
        }

        let saved = std::mem::replace(&mut self.context, owner);
        let mut bases = bases.into_iter();
        if let Some((raw, base_coord)) = bases.next() {
            let superclass = self.type_expr(raw, base_coord);
            self.model.set_superclass(id, superclass);
        }
        for (raw, base_coord) in bases {
            tracing::warn!("{}: additional base class `{}` dropped", base_coord, raw);
        }

        self.context = id;
        self.expect(TokenKind::LBrace, "`{`")?;
        self.push_scope();
        let result = self.parse_declaration_seq(TokenKind::RBrace);
        self.context = saved;
        result?;
        self.expect(TokenKind::RBrace, "`}`")?;
        self.pop_scope()?;
        Ok(TypeSpec {
            text: name.clone().unwrap_or_default(),
            named: name,
            defined: Some(id),
            primitive: None,
        })
    }

    pub(crate) fn parse_enum_specifier(&mut self) -> PResult<TypeSpec> {
        let coord = self.coord();
        self.expect(TokenKind::Enum, "`enum`")?;
        let scoped = self.eat(TokenKind::Class) || self.eat(TokenKind::Struct);
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };
        if self.check(TokenKind::Colon) {
            // Underlying type, unless this is a bit-field.
            self.try_parse(|p| {
                p.advance();
                p.parse_type_spec(ParamMode::Lenient)?;
                if matches!(p.kind(), TokenKind::LBrace | TokenKind::Semicolon) {
                    Ok(())
                } else {
                    Err(p.unexpected("`{`"))
                }
            });
        }
        if !self.check(TokenKind::LBrace) {
            let Some(name) = name else {
                return Err(self.unexpected("an enumeration name"));
            };
            if self.check(TokenKind::Semicolon) {
                self.declare_type(&name)?;
            }
            return Ok(TypeSpec::named(name));
        }
        if self.model.function(self.context).is_some() {
            return Err(TranslateError::unsupported("local enumeration", coord));
        }
        let id = self.model.add_declaration(
            self.context,
            name.as_deref(),
            DeclKind::Enumeration(Enumeration::new(scoped)),
            coord,
        );
        if let Some(name) = &name {
            self.declare_type(name)?;
        }
        self.advance();
        self.push_scope();
        let saved = std::mem::replace(&mut self.context, id);
        let result = self.parse_enumerators(id);
        self.context = saved;
        let names = result?;
        self.expect(TokenKind::RBrace, "`}`")?;
        self.pop_scope()?;
        if !scoped {
            for enumerator in &names {
                self.declare_value(enumerator)?;
            }
        }
        Ok(TypeSpec {
            text: name.clone().unwrap_or_default(),
            named: name,
            defined: Some(id),
            primitive: None,
        })
    }

    fn parse_enumerators(&mut self, enumeration: DeclId) -> PResult<Vec<String>> {
        let mut names = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let coord = self.coord();
            let name = self.expect_identifier()?;
            let value = if self.eat(TokenKind::Assign) {
                Some(self.parse_conditional_expression()?)
            } else {
                None
            };
            self.model.add_enumerator(enumeration, &name, value, coord);
            self.declare_value(&name)?;
            names.push(name);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::parser::parse;

    fn parsed(text: &str) -> Model {
        let mut model = Model::new("test");
        parse(&mut model, "test.cpp", text).unwrap();
        model
    }

    #[test]
    fn operator_symbols_map_to_special_methods() {
        assert_eq!(dunder("-", 0), Some("__neg__"));
        assert_eq!(dunder("-", 1), Some("__sub__"));
        assert_eq!(dunder("[]", 1), Some("__getitem__"));
        assert_eq!(dunder("*", 0), None);
    }

    #[test]
    fn namespaces_become_modules() {
        let model = parsed("namespace bar { namespace foo { class Outer { class Inner {}; }; } }");
        let foo = model.module_by_path("bar.foo").unwrap();
        assert!(model.module(foo).unwrap().members.get("Outer").is_some());
    }

    #[test]
    fn nested_namespace_shorthand() {
        let model = parsed("namespace a::b { int x; }");
        assert!(model.module_by_path("a.b").is_some());
    }

    #[test]
    fn anonymous_namespace_uses_enclosing_module() {
        let model = parsed("namespace { int hidden = 1; }");
        assert!(model.module(model.root()).unwrap().members.get("hidden").is_some());
    }

    #[test]
    fn static_member_definition_sets_value() {
        let model = parsed("class Foo { static int count; }; int Foo::count = 3;");
        let foo = model.module(model.root()).unwrap().members.get("Foo").unwrap();
        let count = model.class(foo).unwrap().members.get("count").unwrap();
        assert!(matches!(model.kind(count), DeclKind::Attribute(a) if a.is_static && a.value.is_some()));
    }

    #[test]
    fn anonymous_union_members_join_the_class() {
        let model = parsed("struct V { union { int i; float f; }; };");
        let v = model.module(model.root()).unwrap().members.get("V").unwrap();
        let members = &model.class(v).unwrap().members;
        assert!(members.get("i").is_some() && members.get("f").is_some());
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn pure_virtual_and_deleted_members() {
        let model = parsed("class Shape { virtual double area() const = 0; Shape(const Shape&) = delete; };");
        let shape = model.module(model.root()).unwrap().members.get("Shape").unwrap();
        let class = model.class(shape).unwrap();
        assert!(class.constructors.is_empty());
        let area = class.members.get("area").unwrap();
        assert!(model.function(area).unwrap().is_pure);
    }

    #[test]
    fn multiple_bases_keep_the_first() {
        let model = parsed("class A {}; class B {}; class C : public A, private B {};");
        let c = model.module(model.root()).unwrap().members.get("C").unwrap();
        let Some(Expr::Variable(base)) = &model.class(c).unwrap().superclass else {
            panic!("expected a superclass");
        };
        assert_eq!(base.raw, "A");
    }

    #[test]
    fn unknown_scope_in_definition_is_unresolved() {
        let mut model = Model::new("test");
        let err = parse(&mut model, "t.cpp", "void Nope::run() {}").unwrap_err();
        assert!(matches!(err, TranslateError::Unresolved(_)));
    }

    #[test]
    fn try_block_is_unsupported() {
        let mut model = Model::new("test");
        let err = parse(&mut model, "t.cpp", "void f() try {} catch (...) {}").unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }));
    }
}
