//! Expressions, by precedence climbing.

use super::Parser;
use super::support::PResult;
use super::types::{ParamMode, TypeSpec};
use crate::error::TranslateError;
use crate::lexer::TokenKind;
use crate::model::{AssignOp, BinaryOp, Expr, LiteralKind, PrimitiveType, UnaryOp};

/// Operator found between two operands.
#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Assign(AssignOp),
    Conditional,
}

const PREFIX_BP: u8 = 25;

/// Left and right binding power of an infix operator.
fn infix_binding(kind: TokenKind) -> Option<(u8, u8, Infix)> {
    use BinaryOp::*;
    let assign = |op: Option<BinaryOp>| Some((2, 1, Infix::Assign(AssignOp(op))));
    let binary = |l: u8, op: BinaryOp| Some((l, l + 1, Infix::Binary(op)));
    match kind {
        TokenKind::Assign => assign(None),
        TokenKind::PlusAssign => assign(Some(Add)),
        TokenKind::MinusAssign => assign(Some(Sub)),
        TokenKind::StarAssign => assign(Some(Mul)),
        TokenKind::SlashAssign => assign(Some(Div)),
        TokenKind::PercentAssign => assign(Some(Mod)),
        TokenKind::AmpAssign => assign(Some(BitAnd)),
        TokenKind::PipeAssign => assign(Some(BitOr)),
        TokenKind::CaretAssign => assign(Some(BitXor)),
        TokenKind::ShlAssign => assign(Some(Shl)),
        TokenKind::ShrAssign => assign(Some(Shr)),
        TokenKind::Question => Some((4, 3, Infix::Conditional)),
        TokenKind::OrOr => binary(5, Or),
        TokenKind::AndAnd => binary(7, And),
        TokenKind::Pipe => binary(9, BitOr),
        TokenKind::Caret => binary(11, BitXor),
        TokenKind::Amp => binary(13, BitAnd),
        TokenKind::EqEq => binary(15, Eq),
        TokenKind::NotEq => binary(15, Ne),
        TokenKind::Lt => binary(17, Lt),
        TokenKind::Gt => binary(17, Gt),
        TokenKind::LtEq => binary(17, Le),
        TokenKind::GtEq => binary(17, Ge),
        TokenKind::Shl => binary(19, Shl),
        TokenKind::Shr => binary(19, Shr),
        TokenKind::Plus => binary(21, Add),
        TokenKind::Minus => binary(21, Sub),
        TokenKind::Star => binary(23, Mul),
        TokenKind::Slash => binary(23, Div),
        TokenKind::Percent => binary(23, Mod),
        _ => None,
    }
}

/// Tokens that can begin the operand of a C-style cast.
fn starts_operand(kind: TokenKind) -> bool {
    kind.is_literal()
        || kind.is_primitive_type()
        || matches!(
            kind,
            TokenKind::Identifier
                | TokenKind::ColonColon
                | TokenKind::LParen
                | TokenKind::This
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Nullptr
                | TokenKind::Bang
                | TokenKind::Tilde
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Star
                | TokenKind::Amp
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
                | TokenKind::Sizeof
                | TokenKind::New
                | TokenKind::StaticCast
                | TokenKind::DynamicCast
                | TokenKind::ReinterpretCast
                | TokenKind::ConstCast
        )
}

/// Conversion to `spec`; pointer, class and `void` casts keep the operand.
fn cast_to(spec: &TypeSpec, indirect: bool, operand: Expr) -> Expr {
    match spec.primitive {
        Some(PrimitiveType::Void) | None => operand,
        _ if indirect => operand,
        Some(kind) => Expr::Cast {
            kind,
            operand: Box::new(operand),
        },
    }
}

impl Parser<'_> {
    /// Assignment expression (no comma operator).
    pub(crate) fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_expr_bp(0)
    }

    /// Conditional expression: everything but assignment.
    pub(crate) fn parse_conditional_expression(&mut self) -> PResult<Expr> {
        self.parse_expr_bp(3)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let kind = self.kind();
            if self.in_template_args
                && matches!(kind, TokenKind::Gt | TokenKind::Shr | TokenKind::GtEq | TokenKind::ShrAssign)
            {
                break;
            }
            let Some((l_bp, r_bp, infix)) = infix_binding(kind) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.advance();
            lhs = match infix {
                Infix::Binary(op) => {
                    let rhs = self.parse_expr_bp(r_bp)?;
                    Expr::binary(lhs, op, rhs)
                }
                Infix::Conditional => {
                    let if_true = self.parse_expr_bp(0)?;
                    self.expect(TokenKind::Colon, "`:`")?;
                    let if_false = self.parse_expr_bp(r_bp)?;
                    Expr::Conditional {
                        condition: Box::new(lhs),
                        if_true: Box::new(if_true),
                        if_false: Box::new(if_false),
                    }
                }
                Infix::Assign(op) => {
                    let value = if self.eat(TokenKind::LBrace) {
                        Expr::List(self.parse_expression_list(TokenKind::RBrace)?)
                    } else {
                        self.parse_expr_bp(r_bp)?
                    };
                    Expr::Assign {
                        op,
                        target: Box::new(lhs),
                        value: Box::new(value),
                    }
                }
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let coord = self.coord();
        let op = match self.kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::Amp => UnaryOp::AddressOf,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = self.advance().is(TokenKind::PlusPlus);
                let target = self.parse_unary()?;
                return Ok(Expr::IncDec {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            TokenKind::Sizeof => return self.parse_sizeof(),
            TokenKind::New => return self.parse_new(),
            TokenKind::Delete => return Err(TranslateError::unsupported("delete expression", coord)),
            TokenKind::Throw => return Err(TranslateError::unsupported("throw expression", coord)),
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_expr_bp(PREFIX_BP)?;
        Ok(Expr::unary(op, operand))
    }

    fn parse_sizeof(&mut self) -> PResult<Expr> {
        let coord = self.coord();
        self.expect(TokenKind::Sizeof, "`sizeof`")?;
        self.eat(TokenKind::Ellipsis);
        let as_type = self.check(TokenKind::LParen)
            && self
                .try_parse(|p| {
                    p.advance();
                    p.parse_type_id(ParamMode::Strict)?;
                    p.expect(TokenKind::RParen, "`)`")
                })
                .is_some();
        if !as_type {
            self.parse_unary()?;
        }
        Ok(Expr::Sizeof(coord))
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        let coord = self.coord();
        self.expect(TokenKind::New, "`new`")?;
        if self.check(TokenKind::LParen) {
            return Err(TranslateError::unsupported("placement new", coord));
        }
        let spec = self.parse_type_spec(ParamMode::Lenient)?;
        while self.eat(TokenKind::Star) {}
        if self.eat(TokenKind::LBracket) {
            let size = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "`]`")?;
            return Ok(Expr::binary(Expr::List(vec![Expr::none()]), BinaryOp::Mul, size));
        }
        let args = if self.eat(TokenKind::LParen) {
            self.parse_expression_list(TokenKind::RParen)?
        } else if self.eat(TokenKind::LBrace) {
            self.parse_expression_list(TokenKind::RBrace)?
        } else {
            Vec::new()
        };
        match (spec.primitive, spec.named) {
            (None, Some(raw)) => {
                let class = self.type_expr(raw, coord);
                Ok(Expr::new_object(class, args))
            }
            _ => Ok(args.into_iter().next().unwrap_or_else(Expr::none)),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let coord = self.coord();
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_expression_list(TokenKind::RParen)?;
                    expr = Expr::invoke(expr, args);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let saved = std::mem::replace(&mut self.in_template_args, false);
                    let index = self.parse_expression();
                    self.in_template_args = saved;
                    let index = index?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    expr = Expr::Subscript {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    self.advance();
                    self.eat(TokenKind::Template);
                    match self.kind() {
                        TokenKind::Identifier => {
                            let name = self.advance().lexeme;
                            if self.check(TokenKind::Lt) && self.template_args_follow() {
                                self.parse_template_args()?;
                            }
                            expr = Expr::attribute(expr, name);
                        }
                        TokenKind::Tilde => {
                            return Err(TranslateError::unsupported("explicit destructor call", coord));
                        }
                        TokenKind::Operator => {
                            return Err(TranslateError::unsupported("explicit operator call", coord));
                        }
                        _ => return Err(self.unexpected("a member name")),
                    }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let increment = self.advance().is(TokenKind::PlusPlus);
                    expr = Expr::IncDec {
                        increment,
                        prefix: false,
                        target: Box::new(expr),
                    };
                }
                TokenKind::DotStar | TokenKind::ArrowStar => {
                    return Err(TranslateError::unsupported("pointer to member", coord));
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to and including `close`.
    pub(crate) fn parse_expression_list(&mut self, close: TokenKind) -> PResult<Vec<Expr>> {
        let saved = std::mem::replace(&mut self.in_template_args, false);
        let result = self.parse_expression_list_in(close);
        self.in_template_args = saved;
        result
    }

    fn parse_expression_list_in(&mut self, close: TokenKind) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            let item = if self.eat(TokenKind::LBrace) {
                Expr::List(self.parse_expression_list(TokenKind::RBrace)?)
            } else {
                self.parse_expression()?
            };
            self.eat(TokenKind::Ellipsis);
            items.push(item);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let what = if close == TokenKind::RParen { "`)`" } else { "`}`" };
        self.expect(close, what)?;
        Ok(items)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let coord = self.coord();
        let kind = self.kind();
        match kind {
            TokenKind::IntLiteral => Ok(Expr::literal(LiteralKind::Int, self.advance().lexeme)),
            TokenKind::FloatLiteral => Ok(Expr::literal(LiteralKind::Float, self.advance().lexeme)),
            TokenKind::CharLiteral => Ok(Expr::literal(LiteralKind::Char, self.advance().lexeme)),
            TokenKind::StringLiteral => {
                let mut parts = Vec::new();
                while self.check(TokenKind::StringLiteral) {
                    parts.push(self.advance().lexeme);
                }
                Ok(Expr::literal(LiteralKind::String, parts.join(" ")))
            }
            TokenKind::True | TokenKind::False => Ok(Expr::literal(LiteralKind::Bool, self.advance().lexeme)),
            TokenKind::Nullptr => {
                self.advance();
                Ok(Expr::none())
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::SelfRef)
            }
            TokenKind::LParen => self.parse_paren_or_cast(),
            TokenKind::LBrace => {
                self.advance();
                Ok(Expr::List(self.parse_expression_list(TokenKind::RBrace)?))
            }
            TokenKind::StaticCast
            | TokenKind::DynamicCast
            | TokenKind::ReinterpretCast
            | TokenKind::ConstCast => {
                self.advance();
                self.expect(TokenKind::Lt, "`<`")?;
                let saved = std::mem::replace(&mut self.in_template_args, true);
                let target = self.parse_type_id(ParamMode::Lenient);
                self.in_template_args = saved;
                let (spec, indirect) = target?;
                self.expect_template_close()?;
                self.expect(TokenKind::LParen, "`(`")?;
                let operand = self.parse_expression_list(TokenKind::RParen)?;
                let Some(operand) = operand.into_iter().next() else {
                    return Err(self.error("cast needs an operand"));
                };
                Ok(cast_to(&spec, indirect, operand))
            }
            kind if kind.is_primitive_type() => {
                let spec = self.parse_type_spec(ParamMode::Lenient)?;
                self.functional_cast(spec.primitive)
            }
            TokenKind::Identifier | TokenKind::ColonColon => self.parse_id_expression(),
            TokenKind::LBracket => Err(TranslateError::unsupported("lambda", coord)),
            TokenKind::Operator => Err(TranslateError::unsupported("operator name", coord)),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `int(x)`, `double{x}` and the value-initialising `int()`.
    fn functional_cast(&mut self, primitive: Option<PrimitiveType>) -> PResult<Expr> {
        let args = if self.eat(TokenKind::LParen) {
            self.parse_expression_list(TokenKind::RParen)?
        } else if self.eat(TokenKind::LBrace) {
            self.parse_expression_list(TokenKind::RBrace)?
        } else {
            return Err(self.unexpected("`(`"));
        };
        let mut args = args.into_iter();
        Ok(match (primitive, args.next()) {
            (Some(PrimitiveType::Void) | None, Some(operand)) => operand,
            (Some(kind), Some(operand)) => Expr::Cast {
                kind,
                operand: Box::new(operand),
            },
            (Some(kind), None) => Expr::invoke(Expr::PrimitiveType(kind), Vec::new()),
            (None, None) => Expr::none(),
        })
    }

    fn parse_paren_or_cast(&mut self) -> PResult<Expr> {
        if self.cast_ahead() {
            if let Some(expr) = self.try_parse(|p| p.parse_c_cast()) {
                return Ok(expr);
            }
        }
        self.expect(TokenKind::LParen, "`(`")?;
        let saved = std::mem::replace(&mut self.in_template_args, false);
        let inner = self.parse_expression();
        self.in_template_args = saved;
        let inner = inner?;
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(Expr::Parens(Box::new(inner)))
    }

    /// A type name right after `(`, so this may be a C-style cast.
    fn cast_ahead(&mut self) -> bool {
        let next = self.kind_at(1);
        if next.is_primitive_type()
            || matches!(
                next,
                TokenKind::Const
                    | TokenKind::Volatile
                    | TokenKind::Typename
                    | TokenKind::Struct
                    | TokenKind::Class
                    | TokenKind::Union
                    | TokenKind::Enum
            )
        {
            return true;
        }
        match self.scan_qualified(1) {
            Some((segments, end)) => {
                self.is_type_name(&segments)
                    && matches!(
                        self.kind_at(end),
                        TokenKind::RParen | TokenKind::Star | TokenKind::Amp
                    )
            }
            None => false,
        }
    }

    fn parse_c_cast(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "`(`")?;
        let (spec, indirect) = self.parse_type_id(ParamMode::Strict)?;
        self.expect(TokenKind::RParen, "`)`")?;
        if !starts_operand(self.kind()) {
            return Err(self.unexpected("a cast operand"));
        }
        let operand = self.parse_expr_bp(PREFIX_BP)?;
        Ok(cast_to(&spec, indirect, operand))
    }

    /// Whether `<` after the last consumed name opens template arguments.
    fn template_args_follow(&mut self) -> bool {
        self.scan_angles(0).is_some_and(|end| {
            matches!(
                self.kind_at(end),
                TokenKind::LParen | TokenKind::ColonColon | TokenKind::LBrace
            )
        })
    }

    fn parse_id_expression(&mut self) -> PResult<Expr> {
        let coord = self.coord();
        let mut segments = Vec::new();
        if self.eat(TokenKind::ColonColon) {
            segments.push(String::new());
        }
        loop {
            segments.push(self.expect_identifier()?);
            if self.check(TokenKind::Lt)
                && (segments.len() > 1 || self.is_template_name(&segments) || self.is_type_name(&segments))
                && self.template_args_follow()
            {
                self.parse_template_args()?;
            }
            if self.check(TokenKind::ColonColon) && self.kind_at(1) == TokenKind::Identifier {
                self.advance();
                continue;
            }
            break;
        }

        if let [single] = segments.as_slice() {
            if single == "NULL" {
                return Ok(Expr::none());
            }
            if let Some(primitive) = self.primitive_alias(single) {
                if matches!(self.kind(), TokenKind::LParen | TokenKind::LBrace) {
                    return self.functional_cast(Some(primitive));
                }
            }
        }

        let is_type = self.is_type_name(&segments);
        let expr = self.type_expr(segments.join("::"), coord);
        if is_type && self.eat(TokenKind::LBrace) {
            let args = self.parse_expression_list(TokenKind::RBrace)?;
            return Ok(Expr::invoke(expr, args));
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{BinaryOp, Expr, Model, PrimitiveType, Stmt, UnaryOp};
    use crate::parser::parse;

    /// The expression of `return <text>;` inside a function.
    fn expr(prelude: &str, text: &str) -> Expr {
        let mut model = Model::new("test");
        let source = format!("{} int f(int a, int b, int c) {{ return {}; }}", prelude, text);
        parse(&mut model, "test.cpp", &source).unwrap();
        let f = model.module(model.root()).unwrap().members.get("f").unwrap();
        match &model.function(f).unwrap().statements.as_ref().unwrap()[0] {
            Stmt::Return(Some(e)) => e.clone(),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let Expr::Binary { op, right, .. } = expr("", "a + b * c") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let Expr::Binary { left, .. } = expr("", "a - b - c") else {
            panic!("expected binary");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let Expr::Assign { value, .. } = expr("", "a = b = c") else {
            panic!("expected assignment");
        };
        assert!(matches!(*value, Expr::Assign { .. }));
    }

    #[test]
    fn conditional_nests_to_the_right() {
        let Expr::Conditional { if_false, .. } = expr("", "a ? b : c ? a : b") else {
            panic!("expected conditional");
        };
        assert!(matches!(*if_false, Expr::Conditional { .. }));
    }

    #[test]
    fn c_style_cast_to_primitive() {
        assert!(matches!(expr("", "(double)a"), Expr::Cast { kind: PrimitiveType::Float, .. }));
    }

    #[test]
    fn parenthesised_value_is_not_a_cast() {
        assert!(matches!(expr("", "(a) - b"), Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn named_casts() {
        assert!(matches!(expr("", "static_cast<int>(a)"), Expr::Cast { kind: PrimitiveType::Int, .. }));
        assert!(matches!(expr("class Foo {};", "(int)reinterpret_cast<Foo*>(a)"), Expr::Cast { .. }));
    }

    #[test]
    fn null_spellings() {
        assert_eq!(expr("", "NULL"), Expr::none());
        assert_eq!(expr("", "nullptr"), Expr::none());
    }

    #[test]
    fn adjacent_strings_are_joined() {
        let Expr::Literal(literal) = expr("", "\"ab\" \"cd\"") else {
            panic!("expected literal");
        };
        assert_eq!(literal.text, "\"ab\" \"cd\"");
    }

    #[test]
    fn new_array_is_a_list() {
        assert!(matches!(expr("", "new int[a]"), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn new_object_keeps_arguments() {
        let Expr::New { args, .. } = expr("class Foo {};", "new Foo(a, b)") else {
            panic!("expected new");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn prefix_binds_tighter_than_binary() {
        assert!(matches!(expr("", "-a * b"), Expr::Binary { op: BinaryOp::Mul, .. }));
        assert!(matches!(expr("", "!a"), Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn template_call_drops_arguments() {
        let e = expr("template <class T> T id(T x) { return x; }", "id<int>(a)");
        assert!(matches!(e, Expr::Invoke { .. }));
    }

    #[test]
    fn scoped_names_are_types() {
        let e = expr("namespace n { int v = 1; }", "n::v");
        assert!(matches!(e, Expr::Type(name) if name.raw == "n::v"));
    }
}
