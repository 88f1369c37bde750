//! Statements inside function bodies.

use super::Parser;
use super::support::PResult;
use super::types::ParamMode;
use crate::error::{Coord, TranslateError};
use crate::lexer::TokenKind;
use crate::model::{Block, Expr, Stmt, SwitchCase};

/// A local variable parsed but not yet entered into the model.
#[derive(Debug, Clone)]
pub(crate) struct LocalDecl {
    name: String,
    value: Option<Expr>,
    coord: Coord,
}

fn into_block(stmt: Stmt) -> Block {
    match stmt {
        Stmt::Block(block) => block,
        other => vec![other],
    }
}

/// Case group a new label joins: consecutive labels share one body.
fn open_case(cases: &mut Vec<SwitchCase>, coord: Coord) -> &mut SwitchCase {
    if cases.last().is_none_or(|case| !case.body.is_empty()) {
        cases.push(SwitchCase {
            labels: Vec::new(),
            is_default: false,
            body: Vec::new(),
            coord,
        });
    }
    let last = cases.len() - 1;
    &mut cases[last]
}

impl Parser<'_> {
    /// Statements up to the closing `}` of the current block.
    pub(crate) fn parse_block_items(&mut self) -> PResult<Block> {
        let mut block = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            // Empty statements and declarations that bind nothing (typedefs,
            // function declarations at block scope) leave no trace.
            match self.parse_statement()? {
                Stmt::Block(inner) if inner.is_empty() => {}
                stmt => block.push(stmt),
            }
        }
        Ok(block)
    }

    pub(crate) fn parse_statement(&mut self) -> PResult<Stmt> {
        let coord = self.coord();
        match self.kind() {
            TokenKind::LBrace => {
                self.advance();
                self.push_scope();
                let block = self.parse_block_items()?;
                self.expect(TokenKind::RBrace, "`}`")?;
                self.pop_scope()?;
                Ok(Stmt::Block(block))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = into_block(self.parse_statement()?);
                Ok(Stmt::While { condition, body })
            }
            TokenKind::Do => {
                self.advance();
                let body = into_block(self.parse_statement()?);
                self.expect(TokenKind::While, "`while`")?;
                let condition = self.parse_condition()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::DoWhile { body, condition })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Continue)
            }
            TokenKind::Return => {
                self.advance();
                let value = self.parse_optional_expression()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Return(value))
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_optional_expression()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Throw(value))
            }
            TokenKind::Delete => {
                self.advance();
                if self.eat(TokenKind::LBracket) {
                    self.expect(TokenKind::RBracket, "`]`")?;
                }
                let target = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Delete(target))
            }
            TokenKind::Goto => Err(TranslateError::unsupported("goto", coord)),
            TokenKind::Try => Err(TranslateError::unsupported("try block", coord)),
            TokenKind::Case | TokenKind::Default => Err(self.error("case label outside a switch")),
            TokenKind::Identifier if self.kind_at(1) == TokenKind::Colon => {
                Err(TranslateError::unsupported("label", coord))
            }
            TokenKind::Typedef | TokenKind::Using | TokenKind::StaticAssert => {
                self.parse_declaration()?;
                Ok(Stmt::Block(Vec::new()))
            }
            TokenKind::Class | TokenKind::Struct | TokenKind::Union | TokenKind::Enum => {
                let locals = self.parse_block_declaration()?;
                self.commit_locals(locals)
            }
            _ => {
                if self.looks_like_declaration() {
                    if let Some(locals) = self.try_parse(|p| p.parse_block_declaration()) {
                        return self.commit_locals(locals);
                    }
                }
                self.parse_expression_statement()
            }
        }
    }

    fn parse_optional_expression(&mut self) -> PResult<Option<Expr>> {
        if self.check(TokenKind::Semicolon) {
            Ok(None)
        } else {
            self.parse_expression().map(Some)
        }
    }

    /// Parenthesised condition of `if`, `while` and `switch`.
    fn parse_condition(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "`(`")?;
        if self.looks_like_declaration() {
            let declares = self.try_parse(|p| {
                p.parse_specifiers();
                p.parse_type_spec(ParamMode::Strict)?;
                p.parse_declarator(ParamMode::Strict)?;
                p.expect(TokenKind::Assign, "`=`")
            });
            if declares.is_some() {
                return Err(TranslateError::unsupported(
                    "declaration in a condition",
                    self.coord(),
                ));
            }
        }
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::If, "`if`")?;
        self.eat(TokenKind::Constexpr);
        let condition = self.parse_condition()?;
        let if_true = into_block(self.parse_statement()?);
        let if_false = if self.eat(TokenKind::Else) {
            Some(into_block(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            if_true,
            if_false,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::For, "`for`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        self.push_scope();
        let stmt = self.parse_for_rest()?;
        self.pop_scope()?;
        Ok(stmt)
    }

    fn parse_for_rest(&mut self) -> PResult<Stmt> {
        if let Some((name, iterable, coord)) = self.try_parse(|p| p.parse_range_for_head()) {
            self.model.add_local(self.context, &name, coord);
            self.declare_value(&name)?;
            let body = into_block(self.parse_statement()?);
            return Ok(Stmt::ForEach {
                name,
                iterable,
                body,
            });
        }

        let init = if self.eat(TokenKind::Semicolon) {
            Vec::new()
        } else {
            let locals = if self.looks_like_declaration() {
                self.try_parse(|p| p.parse_block_declaration())
            } else {
                None
            };
            match locals {
                Some(locals) => into_block(self.commit_locals(locals)?),
                None => into_block(self.parse_expression_statement()?),
            }
        };
        let condition = self.parse_optional_expression()?;
        self.expect(TokenKind::Semicolon, "`;`")?;
        let mut update = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                update.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        let body = into_block(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    /// `T name : iterable )` of a range-based for.
    fn parse_range_for_head(&mut self) -> PResult<(String, Expr, Coord)> {
        self.parse_specifiers();
        self.parse_type_spec(ParamMode::Lenient)?;
        let declarator = self.parse_declarator(ParamMode::Strict)?;
        let Some(name) = declarator.name.as_ref().and_then(|n| n.ident()).map(str::to_string) else {
            return Err(self.unexpected("a loop variable"));
        };
        self.expect(TokenKind::Colon, "`:`")?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)`")?;
        Ok((name, iterable, declarator.coord))
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Switch, "`switch`")?;
        let subject = self.parse_condition()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        self.push_scope();
        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let coord = self.coord();
            match self.kind() {
                TokenKind::Case => {
                    self.advance();
                    let label = self.parse_conditional_expression()?;
                    self.expect(TokenKind::Colon, "`:`")?;
                    open_case(&mut cases, coord).labels.push(label);
                }
                TokenKind::Default => {
                    self.advance();
                    self.expect(TokenKind::Colon, "`:`")?;
                    open_case(&mut cases, coord).is_default = true;
                }
                TokenKind::Eof => return Err(self.unexpected("`}`")),
                _ => {
                    let stmt = self.parse_statement()?;
                    match cases.last_mut() {
                        Some(case) => case.body.push(stmt),
                        None => {
                            return Err(TranslateError::unsupported("statement before the first case", coord));
                        }
                    }
                }
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        self.pop_scope()?;
        Ok(Stmt::Switch { subject, cases })
    }

    /// Cheap lookahead deciding whether to attempt a declaration.
    pub(crate) fn looks_like_declaration(&mut self) -> bool {
        let kind = self.kind();
        if kind.is_primitive_type()
            || matches!(
                kind,
                TokenKind::Static
                    | TokenKind::Const
                    | TokenKind::Constexpr
                    | TokenKind::Register
                    | TokenKind::Volatile
                    | TokenKind::Extern
                    | TokenKind::Inline
                    | TokenKind::Mutable
                    | TokenKind::Typename
            )
        {
            return true;
        }
        let Some((segments, end)) = self.scan_qualified(0) else {
            return false;
        };
        if self.is_type_name(&segments) {
            return true;
        }
        match self.kind_at(end) {
            TokenKind::Identifier => true,
            TokenKind::Lt => self
                .scan_angles(end)
                .is_some_and(|after| self.kind_at(after) == TokenKind::Identifier),
            _ => false,
        }
    }

    /// Declaration statement; the model is left untouched.
    fn parse_block_declaration(&mut self) -> PResult<Vec<LocalDecl>> {
        let specs = self.parse_specifiers();
        let spec = self.parse_decl_type()?;
        if specs.is_static {
            tracing::debug!("{}: static local treated as an ordinary local", self.coord());
        }
        let mut locals = Vec::new();
        if self.eat(TokenKind::Semicolon) {
            return Ok(locals);
        }
        loop {
            let declarator = self.parse_declarator(ParamMode::Strict)?;
            if declarator.function.is_some() {
                tracing::debug!("{}: local function declaration ignored", declarator.coord);
            } else {
                let Some(name) = declarator.name.as_ref().and_then(|n| n.ident()).map(str::to_string)
                else {
                    return Err(self.unexpected("a variable name"));
                };
                let value = match self.parse_explicit_initializer(&spec)? {
                    Some(value) => Some(value),
                    None => self.default_value(&spec, &declarator),
                };
                locals.push(LocalDecl {
                    name,
                    value,
                    coord: declarator.coord,
                });
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(locals)
    }

    fn commit_locals(&mut self, locals: Vec<LocalDecl>) -> PResult<Stmt> {
        let mut stmts = Vec::with_capacity(locals.len());
        for local in locals {
            self.model.add_local(self.context, &local.name, local.coord);
            self.declare_value(&local.name)?;
            stmts.push(Stmt::Variable {
                name: local.name,
                value: local.value,
            });
        }
        Ok(match stmts.len() {
            1 => stmts.remove(0),
            _ => Stmt::Block(stmts),
        })
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let mut exprs = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma) {
            exprs.push(self.parse_expression()?);
        }
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(match exprs.len() {
            1 => Stmt::Expr(exprs.remove(0)),
            _ => Stmt::Block(exprs.into_iter().map(Stmt::Expr).collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TranslateError;
    use crate::model::{Expr, Model, Stmt};
    use crate::parser::parse;

    fn body(text: &str) -> Vec<Stmt> {
        let mut model = Model::new("test");
        parse(&mut model, "test.cpp", text).unwrap();
        let f = model.module(model.root()).unwrap().members.get("f").unwrap();
        model.function(f).unwrap().statements.clone().unwrap()
    }

    fn failure(text: &str) -> TranslateError {
        let mut model = Model::new("test");
        parse(&mut model, "test.cpp", text).unwrap_err()
    }

    #[test]
    fn switch_groups_fallthrough_labels() {
        let stmts = body("void f(int x) { switch (x) { case 1: case 2: x = 0; break; default: break; } }");
        let Stmt::Switch { cases, .. } = &stmts[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].labels.len(), 2);
        assert!(cases[1].is_default);
    }

    #[test]
    fn range_for_becomes_foreach() {
        let stmts = body("void f(int v) { for (int x : v) { x = 1; } }");
        assert!(matches!(&stmts[0], Stmt::ForEach { name, .. } if name == "x"));
    }

    #[test]
    fn counting_for_keeps_its_parts() {
        let stmts = body("void f() { for (int i = 0; i < 10; ++i) {} }");
        let Stmt::For { init, condition, update, .. } = &stmts[0] else {
            panic!("expected for");
        };
        assert!(matches!(&init[0], Stmt::Variable { name, .. } if name == "i"));
        assert!(condition.is_some());
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn multiple_declarators_in_one_statement() {
        let stmts = body("void f() { int a = 1, b; }");
        let Stmt::Block(group) = &stmts[0] else {
            panic!("expected a declaration group");
        };
        assert!(matches!(&group[1], Stmt::Variable { name, value: None } if name == "b"));
    }

    #[test]
    fn array_local_gets_a_list() {
        let stmts = body("void f() { int buf[4]; }");
        assert!(matches!(&stmts[0], Stmt::Variable { value: Some(Expr::Binary { .. }), .. }));
    }

    #[test]
    fn goto_and_labels_are_unsupported() {
        assert!(matches!(failure("void f() { goto out; }"), TranslateError::Unsupported { .. }));
        assert!(matches!(failure("void f() { out: return; }"), TranslateError::Unsupported { .. }));
    }

    #[test]
    fn local_class_is_unsupported() {
        assert!(matches!(failure("void f() { struct P { int x; }; }"), TranslateError::Unsupported { .. }));
    }

    #[test]
    fn declaration_in_condition_is_unsupported() {
        assert!(matches!(failure("void f() { if (int x = 1) {} }"), TranslateError::Unsupported { .. }));
    }
}
