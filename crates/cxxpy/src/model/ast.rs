//! Statement and expression nodes of the target-language model.
//!
//! Nodes are plain owned trees. Names that need resolution carry a
//! [`NameRef`]; the resolver records its answer in a side table keyed by
//! [`RefId`] instead of mutating the node.

use super::DeclId;
use crate::error::Coord;

/// Identity of a name reference, key of the resolution side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub u32);

/// A name as written in the source, pending resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NameRef {
    pub id: RefId,
    /// Raw scoped name, segments separated by `::`.
    pub raw: String,
    /// Innermost declaration context the name appeared in.
    pub scope: DeclId,
    pub coord: Coord,
}

impl NameRef {
    /// Last path segment.
    pub fn base_name(&self) -> &str {
        self.raw.rsplit("::").next().unwrap_or(&self.raw)
    }

    pub fn is_qualified(&self) -> bool {
        self.raw.contains("::")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Int,
    Float,
    Char,
    String,
    Bool,
    Null,
}

/// Literal kept verbatim from the source token(s).
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
}

impl Literal {
    pub fn new(kind: LiteralKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn null() -> Self {
        Self::new(LiteralKind::Null, "nullptr")
    }

    pub fn int(value: i64) -> Self {
        Self::new(LiteralKind::Int, value.to_string())
    }
}

/// Builtin types that map onto a Python conversion function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Int,
    Float,
    Bool,
    Char,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Deref,
    AddressOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Plain or compound assignment; `Some(op)` is `op=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignOp(pub Option<BinaryOp>);

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    /// Unqualified name.
    Variable(NameRef),
    /// Scoped name (`a::b::C`).
    Type(NameRef),
    PrimitiveType(PrimitiveType),
    SelfRef,
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Parens(Box<Expr>),
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Cast {
        kind: PrimitiveType,
        operand: Box<Expr>,
    },
    Invoke {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        class: Box<Expr>,
        args: Vec<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Sizeof(Coord),
}

impl Expr {
    pub fn literal(kind: LiteralKind, text: impl Into<String>) -> Self {
        Expr::Literal(Literal::new(kind, text))
    }

    pub fn none() -> Self {
        Expr::Literal(Literal::null())
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::int(value))
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn attribute(object: Expr, name: impl Into<String>) -> Self {
        Expr::Attribute {
            object: Box::new(object),
            name: name.into(),
        }
    }

    pub fn invoke(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Invoke {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn new_object(class: Expr, args: Vec<Expr>) -> Self {
        Expr::New {
            class: Box::new(class),
            args,
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            op: AssignOp(None),
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Visit every name reference in evaluation order.
    pub fn walk_names<'a>(&'a self, visit: &mut dyn FnMut(&'a NameRef)) {
        match self {
            Expr::Variable(name) | Expr::Type(name) => visit(name),
            Expr::Literal(_) | Expr::PrimitiveType(_) | Expr::SelfRef | Expr::Sizeof(_) => {}
            Expr::List(items) => items.iter().for_each(|e| e.walk_names(visit)),
            Expr::Attribute { object, .. } => object.walk_names(visit),
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => operand.walk_names(visit),
            Expr::Parens(inner) => inner.walk_names(visit),
            Expr::Binary { left, right, .. } => {
                left.walk_names(visit);
                right.walk_names(visit);
            }
            Expr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                condition.walk_names(visit);
                if_true.walk_names(visit);
                if_false.walk_names(visit);
            }
            Expr::Subscript { object, index } => {
                object.walk_names(visit);
                index.walk_names(visit);
            }
            Expr::Invoke { callee, args } => {
                callee.walk_names(visit);
                args.iter().for_each(|e| e.walk_names(visit));
            }
            Expr::New { class, args } => {
                class.walk_names(visit);
                args.iter().for_each(|e| e.walk_names(visit));
            }
            Expr::Assign { target, value, .. } => {
                target.walk_names(visit);
                value.walk_names(visit);
            }
            Expr::IncDec { target, .. } => target.walk_names(visit),
        }
    }
}

/// Statement list of a block or function body.
pub type Block = Vec<Stmt>;

/// One `case` group of a switch; `labels` empty means `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub labels: Vec<Expr>,
    pub is_default: bool,
    pub body: Block,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Return(Option<Expr>),
    If {
        condition: Expr,
        if_true: Block,
        /// Either a plain block or a single nested `If` (else-if chain).
        if_false: Option<Block>,
    },
    Block(Block),
    /// Local variable declaration with its initial value.
    Variable {
        name: String,
        value: Option<Expr>,
    },
    Expr(Expr),
    While {
        condition: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        condition: Expr,
    },
    For {
        init: Block,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Block,
    },
    /// Range-based `for (T name : iterable)`.
    ForEach {
        name: String,
        iterable: Expr,
        body: Block,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Throw(Option<Expr>),
    Delete(Expr),
}

impl Stmt {
    /// Visit every expression, including those in nested statements.
    pub fn walk_exprs<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        match self {
            Stmt::Return(value) | Stmt::Throw(value) => {
                if let Some(e) = value {
                    visit(e);
                }
            }
            Stmt::If {
                condition,
                if_true,
                if_false,
            } => {
                visit(condition);
                walk_block(if_true, visit);
                if let Some(block) = if_false {
                    walk_block(block, visit);
                }
            }
            Stmt::Block(block) => walk_block(block, visit),
            Stmt::Variable { value, .. } => {
                if let Some(e) = value {
                    visit(e);
                }
            }
            Stmt::Expr(e) | Stmt::Delete(e) => visit(e),
            Stmt::While { condition, body } | Stmt::DoWhile { body, condition } => {
                visit(condition);
                walk_block(body, visit);
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                walk_block(init, visit);
                if let Some(e) = condition {
                    visit(e);
                }
                update.iter().for_each(|e| visit(e));
                walk_block(body, visit);
            }
            Stmt::ForEach { iterable, body, .. } => {
                visit(iterable);
                walk_block(body, visit);
            }
            Stmt::Switch { subject, cases } => {
                visit(subject);
                for case in cases {
                    case.labels.iter().for_each(|e| visit(e));
                    walk_block(&case.body, visit);
                }
            }
            Stmt::Break | Stmt::Continue => {}
        }
    }
}

pub fn walk_block<'a>(block: &'a [Stmt], visit: &mut dyn FnMut(&'a Expr)) {
    for stmt in block {
        stmt.walk_exprs(visit);
    }
}
