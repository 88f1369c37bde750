//! Python writer for the declarative model.
//!
//! Renders one module: imports first, then declarations in source order,
//! then the entry-point guard for the root module's `main`.

use super::writer::CodeWriter;
use crate::error::{Coord, TranslateError};
use crate::model::{
    AssignOp, BinaryOp, DeclId, DeclKind, EnumValue, Enumeration, Expr, Function, Literal,
    LiteralKind, MemberInit, Model, NameRef, PrimitiveType, Stmt, SwitchCase, UnaryOp,
};
use crate::resolve::{Binding, Resolutions};
use crate::traits::Writer;
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Static instance of the Python writer.
pub static PYTHON_WRITER: PythonWriterImpl = PythonWriterImpl;

/// Python writer implementing the Writer trait.
pub struct PythonWriterImpl;

impl Writer for PythonWriterImpl {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extension(&self) -> &'static str {
        "py"
    }

    fn write(&self, model: &Model, resolutions: &Resolutions, module: DeclId) -> Result<String, TranslateError> {
        PythonWriter::emit(model, resolutions, module)
    }
}

/// Python operator precedence, loosest first.
mod prec {
    pub const LOWEST: u8 = 0;
    pub const TERNARY: u8 = 1;
    pub const OR: u8 = 2;
    pub const AND: u8 = 3;
    pub const NOT: u8 = 4;
    pub const COMPARE: u8 = 5;
    pub const BIT_OR: u8 = 6;
    pub const BIT_XOR: u8 = 7;
    pub const BIT_AND: u8 = 8;
    pub const SHIFT: u8 = 9;
    pub const ADD: u8 = 10;
    pub const MUL: u8 = 11;
    pub const UNARY: u8 = 12;
    pub const PRIMARY: u8 = 14;
}

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in",
    "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with",
    "yield",
];

/// Identifier safe for Python: keywords get a trailing underscore.
pub fn py_name(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

fn dotted(name: &str) -> String {
    name.split('.').map(py_name).collect::<Vec<_>>().join(".")
}

fn binary_info(op: BinaryOp) -> (&'static str, u8) {
    match op {
        BinaryOp::Add => ("+", prec::ADD),
        BinaryOp::Sub => ("-", prec::ADD),
        BinaryOp::Mul => ("*", prec::MUL),
        BinaryOp::Div => ("/", prec::MUL),
        BinaryOp::Mod => ("%", prec::MUL),
        BinaryOp::Shl => ("<<", prec::SHIFT),
        BinaryOp::Shr => (">>", prec::SHIFT),
        BinaryOp::BitAnd => ("&", prec::BIT_AND),
        BinaryOp::BitOr => ("|", prec::BIT_OR),
        BinaryOp::BitXor => ("^", prec::BIT_XOR),
        BinaryOp::Eq => ("==", prec::COMPARE),
        BinaryOp::Ne => ("!=", prec::COMPARE),
        BinaryOp::Lt => ("<", prec::COMPARE),
        BinaryOp::Le => ("<=", prec::COMPARE),
        BinaryOp::Gt => (">", prec::COMPARE),
        BinaryOp::Ge => (">=", prec::COMPARE),
        BinaryOp::And => ("and", prec::AND),
        BinaryOp::Or => ("or", prec::OR),
    }
}

fn primitive_name(kind: PrimitiveType) -> &'static str {
    match kind {
        PrimitiveType::Int => "int",
        PrimitiveType::Float => "float",
        PrimitiveType::Bool => "bool",
        PrimitiveType::Char => "str",
        PrimitiveType::Void => "None",
    }
}

/// Integer literal: suffixes stripped, C octal to `0o`, separators to `_`.
fn int_literal(text: &str) -> String {
    let digits = text
        .trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z'])
        .replace('\'', "_");
    let lower = digits.to_ascii_lowercase();
    if lower.starts_with("0x") || lower.starts_with("0b") {
        return digits;
    }
    match digits.strip_prefix('0') {
        Some(rest) if !rest.is_empty() => {
            let trimmed = rest.trim_start_matches(['0', '_']);
            format!("0o{}", if trimmed.is_empty() { "0" } else { trimmed })
        }
        _ => digits,
    }
}

fn float_literal(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let body = if lower.starts_with("0x") {
        text
    } else {
        text.trim_end_matches(['f', 'F', 'l', 'L'])
    };
    body.replace('\'', "_")
}

/// Char and string literals: encoding prefixes dropped, escapes verbatim.
fn quoted_literal(text: &str) -> String {
    let mut out = String::new();
    let mut quote = None;
    let mut escaped = false;
    for ch in text.chars() {
        match quote {
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                ' ' => out.push(ch),
                _ => {}
            },
            Some(q) => {
                out.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
        }
    }
    out
}

fn literal(lit: &Literal) -> String {
    match lit.kind {
        LiteralKind::Int => int_literal(&lit.text),
        LiteralKind::Float => float_literal(&lit.text),
        LiteralKind::Char | LiteralKind::String => quoted_literal(&lit.text),
        LiteralKind::Bool => String::from(if lit.text == "true" { "True" } else { "False" }),
        LiteralKind::Null => "None".to_string(),
    }
}

/// Visit `expr` and every expression nested in it.
fn each_subexpr<'e>(expr: &'e Expr, visit: &mut dyn FnMut(&'e Expr)) {
    visit(expr);
    match expr {
        Expr::Literal(_)
        | Expr::Variable(_)
        | Expr::Type(_)
        | Expr::PrimitiveType(_)
        | Expr::SelfRef
        | Expr::Sizeof(_) => {}
        Expr::List(items) => items.iter().for_each(|e| each_subexpr(e, visit)),
        Expr::Attribute { object, .. } => each_subexpr(object, visit),
        Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => each_subexpr(operand, visit),
        Expr::Parens(inner) => each_subexpr(inner, visit),
        Expr::Binary { left, right, .. } => {
            each_subexpr(left, visit);
            each_subexpr(right, visit);
        }
        Expr::Conditional {
            condition,
            if_true,
            if_false,
        } => {
            each_subexpr(condition, visit);
            each_subexpr(if_true, visit);
            each_subexpr(if_false, visit);
        }
        Expr::Subscript { object, index } => {
            each_subexpr(object, visit);
            each_subexpr(index, visit);
        }
        Expr::Invoke { callee, args } => {
            each_subexpr(callee, visit);
            args.iter().for_each(|e| each_subexpr(e, visit));
        }
        Expr::New { class, args } => {
            each_subexpr(class, visit);
            args.iter().for_each(|e| each_subexpr(e, visit));
        }
        Expr::Assign { target, value, .. } => {
            each_subexpr(target, visit);
            each_subexpr(value, visit);
        }
        Expr::IncDec { target, .. } => each_subexpr(target, visit),
    }
}

/// Assignment target with pointer operators and parentheses peeled off.
fn target_name(expr: &Expr) -> Option<&NameRef> {
    match expr {
        Expr::Variable(name) | Expr::Type(name) => Some(name),
        Expr::Parens(inner) => target_name(inner),
        Expr::Unary {
            op: UnaryOp::Deref | UnaryOp::AddressOf,
            operand,
        } => target_name(operand),
        _ => None,
    }
}

fn is_terminal(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Break | Stmt::Continue | Stmt::Return(_) | Stmt::Throw(_)
    )
}

/// Enclosing construct, for lowering `break` and `continue`.
#[derive(Clone, Copy)]
enum Frame<'a> {
    Loop,
    /// Counting `for` lowered to `while`: updates replay before `continue`.
    For(&'a [Expr]),
    /// `do ... while`: the condition is checked before `continue`.
    DoWhile(&'a Expr),
    Switch,
}

/// `for` loop recognised as a `range` iteration.
struct Counting {
    var: String,
    start: String,
    end: String,
    step: i64,
}

/// Emits one module of the model as Python source code.
pub struct PythonWriter<'a> {
    model: &'a Model,
    resolutions: &'a Resolutions,
    out: CodeWriter,
    /// Declaration being rendered, for diagnostics.
    coord: Coord,
    frames: Vec<Frame<'a>>,
}

impl<'a> PythonWriter<'a> {
    pub fn new(model: &'a Model, resolutions: &'a Resolutions) -> Self {
        Self {
            model,
            resolutions,
            out: CodeWriter::new(),
            coord: model.get(model.root()).coord.clone(),
            frames: Vec::new(),
        }
    }

    /// Emit `module` to Python source.
    pub fn emit(model: &'a Model, resolutions: &'a Resolutions, module: DeclId) -> Result<String, TranslateError> {
        let mut writer = Self::new(model, resolutions);
        writer.write_module(module)?;
        Ok(writer.out.finish())
    }

    fn unsupported(&self, kind: &str) -> TranslateError {
        TranslateError::unsupported(kind, self.coord.clone())
    }

    /// Blank-line separation before the next sibling: two blank lines at
    /// module level, one inside a class.
    fn separate(&mut self) {
        if self.out.depth() == 0 {
            self.out.clear_major_block();
        } else {
            self.out.clear_minor_block();
        }
    }

    fn write_module(&mut self, id: DeclId) -> Result<(), TranslateError> {
        let model = self.model;
        let Some(module) = model.module(id) else {
            return Err(TranslateError::UnknownModule(model.module_path(id).to_string()));
        };
        for (path, symbols) in &module.imports {
            if symbols.is_empty() {
                self.out.line(&format!("import {}", path));
            } else {
                let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
                self.out.line(&format!("from {} import {}", path, symbols.join(", ")));
            }
        }
        for member in module.members.iter() {
            self.write_declaration(member)?;
        }
        if id == model.root() {
            self.write_main_guard(id);
        }
        Ok(())
    }

    fn write_main_guard(&mut self, module: DeclId) {
        let model = self.model;
        let main = model.module(module).and_then(|m| m.members.get("main"));
        let Some(DeclKind::Function(f)) = main.map(|id| model.kind(id)) else {
            return;
        };
        if f.statements.is_none() {
            return;
        }
        self.out.clear_major_block();
        self.out.line("if __name__ == \"__main__\":");
        self.out.start_block();
        if f.parameters.is_empty() {
            self.out.line("sys.exit(main())");
        } else {
            self.out.line("sys.exit(main(len(sys.argv), sys.argv))");
        }
        self.out.end_block();
    }

    /// Module- or class-level declaration.
    fn write_declaration(&mut self, id: DeclId) -> Result<(), TranslateError> {
        let model = self.model;
        let decl = model.get(id);
        self.coord = decl.coord.clone();
        let name = decl.name.as_deref();
        match &decl.kind {
            DeclKind::Class(_) => {
                self.separate();
                self.write_class(id)
            }
            DeclKind::Enumeration(e) => match name {
                Some(name) => {
                    self.separate();
                    self.write_enumeration(name, e)
                }
                None => {
                    for enumerator in &e.enumerators {
                        self.separate();
                        let value = self.enum_value(&enumerator.resolved)?;
                        self.out.line(&format!("{} = {}", py_name(&enumerator.name), value));
                    }
                    Ok(())
                }
            },
            DeclKind::Function(f) => match (&f.statements, name) {
                (Some(_), Some(name)) => {
                    self.separate();
                    self.write_function(name, f, false)
                }
                _ => {
                    tracing::debug!("{}: `{}` has no body, skipped", self.coord, name.unwrap_or_default());
                    Ok(())
                }
            },
            DeclKind::Variable(v) => {
                self.separate();
                self.write_assignment(name.unwrap_or_default(), v.value.as_ref())
            }
            DeclKind::Attribute(a) if a.is_static => {
                self.separate();
                self.write_assignment(name.unwrap_or_default(), a.value.as_ref())
            }
            _ => Ok(()),
        }
    }

    fn write_assignment(&mut self, name: &str, value: Option<&Expr>) -> Result<(), TranslateError> {
        let value = match value {
            Some(value) => self.expr(value, prec::LOWEST)?,
            None => "None".to_string(),
        };
        self.out.line(&format!("{} = {}", py_name(name), value));
        Ok(())
    }

    fn enum_value(&self, value: &EnumValue) -> Result<String, TranslateError> {
        Ok(match value {
            EnumValue::Int(v) => v.to_string(),
            EnumValue::Expr(expr) => self.expr(expr, prec::LOWEST)?,
            EnumValue::Offset { base, offset } => format!("{} + {}", py_name(base), offset),
        })
    }

    fn write_enumeration(&mut self, name: &str, enumeration: &Enumeration) -> Result<(), TranslateError> {
        self.out.line(&format!("class {}(Enum):", py_name(name)));
        self.out.start_block();
        for enumerator in &enumeration.enumerators {
            let value = self.enum_value(&enumerator.resolved)?;
            self.out.line(&format!("{} = {}", py_name(&enumerator.name), value));
        }
        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        Ok(())
    }

    fn write_class(&mut self, id: DeclId) -> Result<(), TranslateError> {
        let model = self.model;
        let Some(class) = model.class(id) else {
            return Ok(());
        };
        let name = py_name(model.name(id).unwrap_or_default());
        match &class.superclass {
            Some(base) => {
                let base = self.expr(base, prec::LOWEST)?;
                self.out.line(&format!("class {}({}):", name, base));
            }
            None => self.out.line(&format!("class {}:", name)),
        }
        self.out.start_block();

        for member in class.members.iter() {
            if !matches!(model.kind(member), DeclKind::Method(_)) {
                self.write_declaration(member)?;
            }
        }
        self.coord = model.get(id).coord.clone();
        self.write_constructors(id)?;
        if let Some(destructor) = class.destructor {
            if let Some(f) = model.function(destructor) {
                if f.statements.is_some() {
                    self.coord = model.get(destructor).coord.clone();
                    self.separate();
                    self.write_method("__del__", f, None)?;
                }
            }
        }
        for member in class.members.iter() {
            let DeclKind::Method(f) = model.kind(member) else {
                continue;
            };
            let method_name = model.name(member).unwrap_or_default();
            self.coord = model.get(member).coord.clone();
            if f.statements.is_none() && !f.is_pure {
                tracing::debug!("{}: method `{}` has no body, skipped", self.coord, method_name);
                continue;
            }
            self.separate();
            self.write_function(method_name, f, true)?;
        }

        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        Ok(())
    }

    /// `__init__`; several arities dispatch on `len(args)` to `_init_<n>`.
    fn write_constructors(&mut self, class: DeclId) -> Result<(), TranslateError> {
        let model = self.model;
        let Some(c) = model.class(class) else {
            return Ok(());
        };
        let mut by_arity: Vec<(usize, DeclId)> = Vec::new();
        for ctor in c.constructors.values() {
            let arity = model.function(*ctor).map_or(0, |f| f.parameters.len());
            if let Some(slot) = by_arity.iter_mut().find(|(a, _)| *a == arity) {
                tracing::warn!(
                    "{}: several constructors of `{}` take {} arguments, keeping the last",
                    model.get(*ctor).coord,
                    model.name(class).unwrap_or_default(),
                    arity
                );
                slot.1 = *ctor;
            } else {
                by_arity.push((arity, *ctor));
            }
        }
        by_arity.sort_by_key(|(arity, _)| *arity);

        match by_arity.as_slice() {
            [] => {
                if self.has_attribute_defaults(class) {
                    self.separate();
                    self.out.line("def __init__(self):");
                    self.out.start_block();
                    self.write_init_prelude(class, &[])?;
                    self.out.end_block();
                }
            }
            [(_, ctor)] => {
                if let Some(f) = model.function(*ctor) {
                    self.coord = model.get(*ctor).coord.clone();
                    self.separate();
                    self.write_method("__init__", f, Some(class))?;
                }
            }
            _ => {
                self.separate();
                self.out.line("def __init__(self, *args):");
                self.out.start_block();
                for (index, (arity, _)) in by_arity.iter().enumerate() {
                    let keyword = if index == 0 { "if" } else { "elif" };
                    self.out.line(&format!("{} len(args) == {}:", keyword, arity));
                    self.out.start_block();
                    self.out.line(&format!("self._init_{}(*args)", arity));
                    self.out.end_block();
                }
                let arities: Vec<String> = by_arity.iter().map(|(a, _)| a.to_string()).collect();
                let (last, rest) = arities.split_last().map_or(("", &[][..]), |(l, r)| (l.as_str(), r));
                self.out.line("else:");
                self.out.start_block();
                self.out.line(&format!(
                    "raise TypeError(\"{}() takes {} or {} arguments\")",
                    py_name(model.name(class).unwrap_or_default()),
                    rest.join(", "),
                    last
                ));
                self.out.end_block();
                self.out.end_block();
                for (arity, ctor) in &by_arity {
                    if let Some(f) = model.function(*ctor) {
                        self.coord = model.get(*ctor).coord.clone();
                        self.separate();
                        self.write_method(&format!("_init_{}", arity), f, Some(class))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn has_attribute_defaults(&self, class: DeclId) -> bool {
        self.model.class(class).is_some_and(|c| {
            c.members
                .iter()
                .any(|m| matches!(self.model.kind(m), DeclKind::Attribute(a) if !a.is_static && a.value.is_some()))
        })
    }

    /// Base-class call, attribute defaults and member initialisers.
    fn write_init_prelude(&mut self, class: DeclId, inits: &'a [MemberInit]) -> Result<(), TranslateError> {
        let model = self.model;
        let Some(c) = model.class(class) else {
            return Ok(());
        };
        let base_name = match &c.superclass {
            Some(Expr::Variable(name) | Expr::Type(name)) => Some(name.base_name()),
            _ => None,
        };
        let (base_inits, member_inits): (Vec<&MemberInit>, Vec<&MemberInit>) = inits
            .iter()
            .partition(|init| Some(split_base(&init.name)) == base_name);
        if let Some(init) = base_inits.last() {
            let args = self.args(&init.args)?;
            self.out.line(&format!("super().__init__({})", args));
        } else if c.superclass.is_some() {
            self.out.line("super().__init__()");
        }
        for member in c.members.iter() {
            let DeclKind::Attribute(a) = model.kind(member) else {
                continue;
            };
            let name = model.name(member).unwrap_or_default();
            if a.is_static || member_inits.iter().any(|init| init.name == name) {
                continue;
            }
            if let Some(value) = &a.value {
                let value = self.expr(value, prec::LOWEST)?;
                self.out.line(&format!("self.{} = {}", py_name(name), value));
            }
        }
        for init in member_inits {
            let default = c
                .members
                .get(&init.name)
                .and_then(|m| match model.kind(m) {
                    DeclKind::Attribute(a) => a.value.as_ref(),
                    _ => None,
                });
            let value = match (init.args.as_slice(), default) {
                ([], Some(default)) => self.expr(default, prec::LOWEST)?,
                ([], None) => "None".to_string(),
                ([single], _) => self.expr(single, prec::LOWEST)?,
                (args, Some(Expr::Invoke { callee, .. })) => {
                    format!("{}({})", self.expr(callee, prec::PRIMARY)?, self.args(args)?)
                }
                (args, _) => format!("({})", self.args(args)?),
            };
            self.out.line(&format!("self.{} = {}", py_name(&init.name), value));
        }
        Ok(())
    }

    /// Free function or method. Methods take `self` unless static.
    fn write_function(&mut self, name: &str, f: &'a Function, is_method: bool) -> Result<(), TranslateError> {
        if is_method && f.is_static {
            self.out.line("@staticmethod");
        }
        self.write_def(&py_name(name), f, is_method && !f.is_static)?;
        self.out.start_block();
        match &f.statements {
            Some(body) => {
                self.write_globals(body);
                self.statements(body)?;
            }
            None => self.out.line("raise NotImplementedError()"),
        }
        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        Ok(())
    }

    /// Constructor (with its prelude) or destructor.
    fn write_method(&mut self, name: &str, f: &'a Function, init_of: Option<DeclId>) -> Result<(), TranslateError> {
        self.write_def(name, f, true)?;
        self.out.start_block();
        if let Some(class) = init_of {
            self.write_init_prelude(class, &f.initializers)?;
        }
        if let Some(body) = &f.statements {
            self.write_globals(body);
            self.statements(body)?;
        }
        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        Ok(())
    }

    fn write_def(&mut self, name: &str, f: &Function, receiver: bool) -> Result<(), TranslateError> {
        let mut params = Vec::new();
        if receiver {
            params.push("self".to_string());
        }
        for param in &f.parameters {
            let decl = self.model.get(*param);
            let mut text = py_name(decl.name.as_deref().unwrap_or_default());
            if let DeclKind::Parameter(p) = &decl.kind {
                if let Some(default) = &p.default {
                    let _ = write!(text, "={}", self.expr(default, prec::LOWEST)?);
                }
            }
            params.push(text);
        }
        self.out.line(&format!("def {}({}):", name, params.join(", ")));
        Ok(())
    }

    /// `global` declaration for module variables the body assigns.
    fn write_globals(&mut self, body: &'a [Stmt]) {
        let mut names = BTreeSet::new();
        crate::model::walk_block(body, &mut |expr| {
            each_subexpr(expr, &mut |e| {
                let target = match e {
                    Expr::Assign { target, .. } | Expr::IncDec { target, .. } => target,
                    _ => return,
                };
                if let Some(name) = target_name(target) {
                    if let Some(r) = self.resolutions.get(name.id) {
                        if r.binding == Binding::Global {
                            names.insert(py_name(&r.name));
                        }
                    }
                }
            })
        });
        if !names.is_empty() {
            let names: Vec<String> = names.into_iter().collect();
            self.out.line(&format!("global {}", names.join(", ")));
        }
    }

    fn statements(&mut self, body: &'a [Stmt]) -> Result<(), TranslateError> {
        for stmt in body {
            self.statement(stmt)?;
        }
        Ok(())
    }

    /// Indented block; `pass` when nothing was written.
    fn block(&mut self, body: &'a [Stmt]) -> Result<(), TranslateError> {
        self.out.start_block();
        self.statements(body)?;
        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        Ok(())
    }

    fn statement(&mut self, stmt: &'a Stmt) -> Result<(), TranslateError> {
        match stmt {
            Stmt::Return(None) => self.out.line("return"),
            Stmt::Return(Some(value)) => {
                let value = self.expr(value, prec::LOWEST)?;
                self.out.line(&format!("return {}", value));
            }
            Stmt::If {
                condition,
                if_true,
                if_false,
            } => self.write_if(condition, if_true, if_false.as_deref())?,
            Stmt::Block(body) => self.statements(body)?,
            Stmt::Variable { name, value } => self.write_assignment(name, value.as_ref())?,
            Stmt::Expr(expr) => self.expression_statement(expr)?,
            Stmt::While { condition, body } => {
                let condition = self.expr(condition, prec::LOWEST)?;
                self.out.line(&format!("while {}:", condition));
                self.loop_body(Frame::Loop, body)?;
            }
            Stmt::DoWhile { body, condition } => {
                self.out.line("while True:");
                self.frames.push(Frame::DoWhile(condition));
                self.out.start_block();
                self.statements(body)?;
                self.write_loop_exit(condition)?;
                self.out.end_block();
                self.frames.pop();
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => self.write_for(init, condition.as_ref(), update, body)?,
            Stmt::ForEach { name, iterable, body } => {
                let iterable = self.expr(iterable, prec::LOWEST)?;
                self.out.line(&format!("for {} in {}:", py_name(name), iterable));
                self.loop_body(Frame::Loop, body)?;
            }
            Stmt::Switch { subject, cases } => self.write_switch(subject, cases)?,
            Stmt::Break => {
                if matches!(self.frames.last(), Some(Frame::Switch)) {
                    return Err(self.unsupported("break inside a switch branch"));
                }
                self.out.line("break");
            }
            Stmt::Continue => self.write_continue()?,
            Stmt::Throw(None) => self.out.line("raise"),
            Stmt::Throw(Some(value)) => {
                let value = self.expr(value, prec::LOWEST)?;
                self.out.line(&format!("raise {}", value));
            }
            Stmt::Delete(target) => {
                let deletable = target_name(target).is_some()
                    || matches!(target, Expr::Attribute { .. } | Expr::Subscript { .. });
                if deletable {
                    let target = self.expr(target, prec::LOWEST)?;
                    self.out.line(&format!("del {}", target));
                } else {
                    self.expression_statement(target)?;
                }
            }
        }
        Ok(())
    }

    fn loop_body(&mut self, frame: Frame<'a>, body: &'a [Stmt]) -> Result<(), TranslateError> {
        self.frames.push(frame);
        let result = self.block(body);
        self.frames.pop();
        result
    }

    fn write_if(&mut self, condition: &'a Expr, if_true: &'a [Stmt], if_false: Option<&'a [Stmt]>) -> Result<(), TranslateError> {
        let condition = self.expr(condition, prec::LOWEST)?;
        self.out.line(&format!("if {}:", condition));
        self.block(if_true)?;
        let mut rest = if_false;
        while let Some(branch) = rest {
            match branch {
                [] => break,
                [Stmt::If {
                    condition,
                    if_true,
                    if_false,
                }] => {
                    let condition = self.expr(condition, prec::LOWEST)?;
                    self.out.line(&format!("elif {}:", condition));
                    self.block(if_true)?;
                    rest = if_false.as_deref();
                }
                body => {
                    self.out.line("else:");
                    self.block(body)?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn write_loop_exit(&mut self, condition: &Expr) -> Result<(), TranslateError> {
        let condition = self.expr(condition, prec::NOT)?;
        self.out.line(&format!("if not {}:", condition));
        self.out.start_block();
        self.out.line("break");
        self.out.end_block();
        Ok(())
    }

    fn write_continue(&mut self) -> Result<(), TranslateError> {
        let frame = self
            .frames
            .iter()
            .rev()
            .find(|f| !matches!(f, Frame::Switch))
            .copied();
        match frame {
            Some(Frame::For(updates)) => {
                for update in updates {
                    self.expression_statement(update)?;
                }
            }
            Some(Frame::DoWhile(condition)) => self.write_loop_exit(condition)?,
            _ => {}
        }
        self.out.line("continue");
        Ok(())
    }

    fn write_for(
        &mut self,
        init: &'a [Stmt],
        condition: Option<&'a Expr>,
        update: &'a [Expr],
        body: &'a [Stmt],
    ) -> Result<(), TranslateError> {
        if let Some(counting) = self.counting(init, condition, update, body)? {
            let range = match (counting.step, counting.start.as_str()) {
                (1, "0") => counting.end,
                (1, start) => format!("{}, {}", start, counting.end),
                (step, start) => format!("{}, {}, {}", start, counting.end, step),
            };
            self.out.line(&format!("for {} in range({}):", counting.var, range));
            return self.loop_body(Frame::Loop, body);
        }
        self.statements(init)?;
        let condition = match condition {
            Some(condition) => self.expr(condition, prec::LOWEST)?,
            None => "True".to_string(),
        };
        self.out.line(&format!("while {}:", condition));
        self.frames.push(Frame::For(update));
        self.out.start_block();
        self.statements(body)?;
        if !body.last().is_some_and(is_terminal) {
            for expr in update {
                self.expression_statement(expr)?;
            }
        }
        if self.out.at_block_start() {
            self.out.line("pass");
        }
        self.out.end_block();
        self.frames.pop();
        Ok(())
    }

    /// Recognise `for (i = a; i < b; i++)` and its variants.
    fn counting(
        &self,
        init: &[Stmt],
        condition: Option<&Expr>,
        update: &[Expr],
        body: &[Stmt],
    ) -> Result<Option<Counting>, TranslateError> {
        let (var, start) = match init {
            [Stmt::Variable {
                name,
                value: Some(start),
            }] => (py_name(name), start),
            [Stmt::Expr(Expr::Assign {
                op: AssignOp(None),
                target,
                value,
            })] if matches!(**target, Expr::Variable(_)) => (self.expr(target, prec::PRIMARY)?, &**value),
            _ => return Ok(None),
        };
        let Some(Expr::Binary { op, left, right }) = condition else {
            return Ok(None);
        };
        if !matches!(**left, Expr::Variable(_)) || self.expr(left, prec::PRIMARY)? != var {
            return Ok(None);
        }
        let is_var = |e: &Expr| self.expr(e, prec::PRIMARY).ok().as_deref() == Some(var.as_str());
        let step = match update {
            [Expr::IncDec { increment, target, .. }] if is_var(target) => {
                if *increment { 1 } else { -1 }
            }
            [Expr::Assign {
                op: AssignOp(Some(op @ (BinaryOp::Add | BinaryOp::Sub))),
                target,
                value,
            }] if is_var(target) => {
                let Expr::Literal(Literal {
                    kind: LiteralKind::Int,
                    text,
                }) = &**value
                else {
                    return Ok(None);
                };
                let Some(k) = crate::model::parse_int_literal(text).filter(|k| *k > 0) else {
                    return Ok(None);
                };
                if *op == BinaryOp::Add { k } else { -k }
            }
            _ => return Ok(None),
        };
        let inclusive = match (op, step > 0) {
            (BinaryOp::Lt, true) | (BinaryOp::Gt, false) => false,
            (BinaryOp::Le, true) | (BinaryOp::Ge, false) => true,
            _ => return Ok(None),
        };
        let mut assigned = false;
        crate::model::walk_block(body, &mut |expr| {
            each_subexpr(expr, &mut |e| {
                if let Expr::Assign { target, .. } | Expr::IncDec { target, .. } = e {
                    if is_var(target) {
                        assigned = true;
                    }
                }
            })
        });
        if assigned {
            return Ok(None);
        }
        let end = if !inclusive {
            self.expr(right, prec::LOWEST)?
        } else {
            let adjust = if step > 0 { 1 } else { -1 };
            match &**right {
                Expr::Literal(Literal {
                    kind: LiteralKind::Int,
                    text,
                }) if crate::model::parse_int_literal(text).is_some() => {
                    let bound = crate::model::parse_int_literal(text).unwrap_or_default();
                    (bound + adjust).to_string()
                }
                bound => {
                    let bound = self.expr(bound, prec::ADD)?;
                    if adjust > 0 {
                        format!("{} + 1", bound)
                    } else {
                        format!("{} - 1", bound)
                    }
                }
            }
        };
        Ok(Some(Counting {
            var,
            start: self.expr(start, prec::LOWEST)?,
            end,
            step,
        }))
    }

    /// `switch` as an `if`/`elif` chain; `default` becomes the final `else`.
    fn write_switch(&mut self, subject: &'a Expr, cases: &'a [SwitchCase]) -> Result<(), TranslateError> {
        let subject = self.expr(subject, prec::COMPARE + 1)?;
        let (defaults, labelled): (Vec<&SwitchCase>, Vec<&SwitchCase>) =
            cases.iter().partition(|case| case.is_default);
        for (index, case) in cases.iter().enumerate() {
            let falls_through = index + 1 < cases.len()
                && !case.body.is_empty()
                && !case.body.last().is_some_and(is_terminal);
            if falls_through {
                tracing::warn!("{}: switch case falls through; translated without fallthrough", case.coord);
            }
        }
        for (index, case) in labelled.iter().copied().enumerate() {
            let mut tests = Vec::new();
            for label in &case.labels {
                tests.push(format!("{} == {}", subject, self.expr(label, prec::COMPARE + 1)?));
            }
            let keyword = if index == 0 { "if" } else { "elif" };
            self.out.line(&format!("{} {}:", keyword, tests.join(" or ")));
            self.switch_body(&case.body)?;
        }
        if let Some(default) = defaults.last().copied() {
            if labelled.is_empty() {
                self.frames.push(Frame::Switch);
                let result = self.statements(strip_break(&default.body));
                self.frames.pop();
                result?;
            } else {
                self.out.line("else:");
                self.switch_body(&default.body)?;
            }
        }
        Ok(())
    }

    fn switch_body(&mut self, body: &'a [Stmt]) -> Result<(), TranslateError> {
        self.frames.push(Frame::Switch);
        let result = self.block(strip_break(body));
        self.frames.pop();
        result
    }

    fn expression_statement(&mut self, expr: &'a Expr) -> Result<(), TranslateError> {
        match expr {
            Expr::Parens(inner) => self.expression_statement(inner),
            Expr::Assign {
                op: AssignOp(None),
                target,
                value,
            } => {
                let mut targets = vec![self.expr(target, prec::PRIMARY)?];
                let mut value: &Expr = value;
                while let Expr::Assign {
                    op: AssignOp(None),
                    target,
                    value: inner,
                } = value
                {
                    targets.push(self.expr(target, prec::PRIMARY)?);
                    value = &**inner;
                }
                let value = self.expr(value, prec::LOWEST)?;
                self.out.line(&format!("{} = {}", targets.join(" = "), value));
                Ok(())
            }
            Expr::Assign {
                op: AssignOp(Some(op)),
                target,
                value,
            } => {
                let (symbol, _) = binary_info(*op);
                let target = self.expr(target, prec::PRIMARY)?;
                let value = self.expr(value, prec::LOWEST)?;
                self.out.line(&format!("{} {}= {}", target, symbol, value));
                Ok(())
            }
            Expr::IncDec { increment, target, .. } => {
                let target = self.expr(target, prec::PRIMARY)?;
                let op = if *increment { "+=" } else { "-=" };
                self.out.line(&format!("{} {} 1", target, op));
                Ok(())
            }
            other => {
                let text = self.expr(other, prec::LOWEST)?;
                self.out.line(&text);
                Ok(())
            }
        }
    }

    fn args(&self, args: &[Expr]) -> Result<String, TranslateError> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.expr(arg, prec::TERNARY)?);
        }
        Ok(parts.join(", "))
    }

    fn name(&self, name: &NameRef) -> String {
        match self.resolutions.get(name.id) {
            Some(r) if r.binding == Binding::Member => format!("self.{}", py_name(&r.name)),
            Some(r) => dotted(&r.name),
            None => dotted(&name.raw.replace("::", ".")),
        }
    }

    fn is_unbound_method(&self, callee: &Expr) -> bool {
        match callee {
            Expr::Variable(name) | Expr::Type(name) => self
                .resolutions
                .get(name.id)
                .is_some_and(|r| r.binding == Binding::UnboundMethod),
            _ => false,
        }
    }

    /// Walrus form of an assignment used as a value; only plain names can
    /// be targets.
    fn walrus(&self, target: &Expr, value: String) -> Result<String, TranslateError> {
        let simple = target_name(target).is_some_and(|name| {
            self.resolutions
                .get(name.id)
                .is_none_or(|r| !matches!(r.binding, Binding::Member | Binding::Declared | Binding::Module))
        });
        if !simple {
            return Err(self.unsupported("assignment inside an expression"));
        }
        let target = self.expr(target, prec::PRIMARY)?;
        Ok(format!("({} := {})", target, value))
    }

    /// Render `expr`, parenthesised when it binds looser than `min`.
    fn expr(&self, expr: &Expr, min: u8) -> Result<String, TranslateError> {
        let (text, own) = match expr {
            Expr::Literal(lit) => (literal(lit), prec::PRIMARY),
            Expr::List(items) => (format!("[{}]", self.args(items)?), prec::PRIMARY),
            Expr::Variable(name) | Expr::Type(name) => (self.name(name), prec::PRIMARY),
            Expr::PrimitiveType(kind) => (primitive_name(*kind).to_string(), prec::PRIMARY),
            Expr::SelfRef => ("self".to_string(), prec::PRIMARY),
            Expr::Attribute { object, name } => (
                format!("{}.{}", self.expr(object, prec::PRIMARY)?, py_name(name)),
                prec::PRIMARY,
            ),
            Expr::Unary {
                op: UnaryOp::Deref | UnaryOp::AddressOf,
                operand,
            } => return self.expr(operand, min),
            Expr::Unary { op: UnaryOp::Not, operand } => {
                (format!("not {}", self.expr(operand, prec::NOT)?), prec::NOT)
            }
            Expr::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    _ => "~",
                };
                (format!("{}{}", symbol, self.expr(operand, prec::UNARY)?), prec::UNARY)
            }
            Expr::Binary { op, left, right } => {
                let (symbol, own) = binary_info(*op);
                // Python chains comparisons, so neither side may be one.
                let left_min = if own == prec::COMPARE { own + 1 } else { own };
                (
                    format!(
                        "{} {} {}",
                        self.expr(left, left_min)?,
                        symbol,
                        self.expr(right, own + 1)?
                    ),
                    own,
                )
            }
            Expr::Conditional {
                condition,
                if_true,
                if_false,
            } => (
                format!(
                    "{} if {} else {}",
                    self.expr(if_true, prec::OR)?,
                    self.expr(condition, prec::OR)?,
                    self.expr(if_false, prec::TERNARY)?
                ),
                prec::TERNARY,
            ),
            Expr::Parens(inner) => (format!("({})", self.expr(inner, prec::LOWEST)?), prec::PRIMARY),
            Expr::Subscript { object, index } => (
                format!(
                    "{}[{}]",
                    self.expr(object, prec::PRIMARY)?,
                    self.expr(index, prec::LOWEST)?
                ),
                prec::PRIMARY,
            ),
            Expr::Cast { kind, operand } => {
                let function = match kind {
                    PrimitiveType::Char => "chr",
                    PrimitiveType::Void => return self.expr(operand, min),
                    other => primitive_name(*other),
                };
                (format!("{}({})", function, self.expr(operand, prec::LOWEST)?), prec::PRIMARY)
            }
            Expr::Invoke { callee, args } => {
                let callee_text = self.expr(callee, prec::PRIMARY)?;
                let mut args = self.args(args)?;
                if self.is_unbound_method(callee) {
                    args = if args.is_empty() { "self".to_string() } else { format!("self, {}", args) };
                }
                (format!("{}({})", callee_text, args), prec::PRIMARY)
            }
            Expr::New { class, args } => (
                format!("{}({})", self.expr(class, prec::PRIMARY)?, self.args(args)?),
                prec::PRIMARY,
            ),
            Expr::Assign { op, target, value } => {
                let value = match op.0 {
                    None => self.expr(value, prec::TERNARY)?,
                    Some(op) => {
                        let (symbol, own) = binary_info(op);
                        format!(
                            "{} {} {}",
                            self.expr(target, own)?,
                            symbol,
                            self.expr(value, own + 1)?
                        )
                    }
                };
                (self.walrus(target, value)?, prec::PRIMARY)
            }
            Expr::IncDec {
                increment,
                prefix,
                target,
            } => {
                let (symbol, undo) = if *increment { ("+", "-") } else { ("-", "+") };
                let value = format!("{} {} 1", self.expr(target, prec::ADD)?, symbol);
                let walrus = self.walrus(target, value)?;
                if *prefix {
                    (walrus, prec::PRIMARY)
                } else {
                    (format!("{} {} 1", walrus, undo), prec::ADD)
                }
            }
            Expr::Sizeof(coord) => return Err(TranslateError::unsupported("sizeof", coord.clone())),
        };
        if own < min {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }
}

/// Case body without its closing `break`.
fn strip_break(body: &[Stmt]) -> &[Stmt] {
    match body.split_last() {
        Some((Stmt::Break, rest)) => rest,
        _ => body,
    }
}

/// Last segment of a possibly qualified initialiser name.
fn split_base(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolve::resolve;

    fn render(text: &str) -> String {
        let mut model = Model::new("main");
        parse(&mut model, "test.cpp", text).unwrap();
        let mut table = Resolutions::default();
        resolve(&mut model, &mut table).unwrap();
        PythonWriter::emit(&model, &table, model.root()).unwrap()
    }

    fn render_err(text: &str) -> TranslateError {
        let mut model = Model::new("main");
        parse(&mut model, "test.cpp", text).unwrap();
        let mut table = Resolutions::default();
        resolve(&mut model, &mut table).unwrap();
        PythonWriter::emit(&model, &table, model.root()).unwrap_err()
    }

    #[test]
    fn literals() {
        assert_eq!(int_literal("0755"), "0o755");
        assert_eq!(int_literal("0"), "0");
        assert_eq!(int_literal("42ul"), "42");
        assert_eq!(int_literal("0xFFu"), "0xFF");
        assert_eq!(int_literal("1'000"), "1_000");
        assert_eq!(float_literal("1.5f"), "1.5");
        assert_eq!(float_literal("2e10"), "2e10");
        assert_eq!(quoted_literal("L\"wide\""), "\"wide\"");
        assert_eq!(quoted_literal("\"a\" u8\"b\""), "\"a\" \"b\"");
        assert_eq!(quoted_literal("'\\''"), "'\\''");
    }

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(py_name("lambda"), "lambda_");
        assert_eq!(py_name("value"), "value");
        assert_eq!(dotted("a.from"), "a.from_");
    }

    #[test]
    fn function_with_minimal_parentheses() {
        let out = render("int f(int a, int b) { return (a + b) * 2 - a * b; }");
        assert_eq!(out, "def f(a, b):\n    return (a + b) * 2 - a * b\n");
    }

    #[test]
    fn precedence_is_recomputed_for_python() {
        let out = render("int f(int a, int b) { return a & b == 1 || !a && b; }");
        assert_eq!(out, "def f(a, b):\n    return a & (b == 1) or not a and b\n");
    }

    #[test]
    fn conditional_and_casts() {
        let out = render("double f(int a) { return a > 0 ? (double)a : static_cast<int>(a); }");
        assert_eq!(out, "def f(a):\n    return float(a) if a > 0 else int(a)\n");
    }

    #[test]
    fn counting_for_becomes_range() {
        let out = render("int f(int n) { int s = 0; for (int i = 0; i < n; i++) { s += i; } return s; }");
        assert_eq!(
            out,
            "def f(n):\n    s = 0\n    for i in range(n):\n        s += i\n    return s\n"
        );
    }

    #[test]
    fn other_for_loops_become_while() {
        let out = render(
            "void f(int n) { for (int i = n; i > 1; i /= 2) { if (i == 3) continue; g(i); } }",
        );
        assert_eq!(
            out,
            "def f(n):\n    i = n\n    while i > 1:\n        if i == 3:\n            i /= 2\n            continue\n        g(i)\n        i /= 2\n"
        );
    }

    #[test]
    fn do_while_checks_at_the_end() {
        let out = render("void f(int x) { do { x--; } while (x > 0); }");
        assert_eq!(
            out,
            "def f(x):\n    while True:\n        x -= 1\n        if not x > 0:\n            break\n"
        );
    }

    #[test]
    fn switch_becomes_if_chain() {
        let out = render(
            "int f(int x) { switch (x) { case 1: case 2: return 10; default: return 0; case 3: x = 4; break; } return x; }",
        );
        assert_eq!(
            out,
            "def f(x):\n    if x == 1 or x == 2:\n        return 10\n    elif x == 3:\n        x = 4\n    else:\n        return 0\n    return x\n"
        );
    }

    #[test]
    fn else_if_chains_use_elif() {
        let out = render("int f(int x) { if (x < 0) return -1; else if (x == 0) return 0; else return 1; }");
        assert_eq!(
            out,
            "def f(x):\n    if x < 0:\n        return -1\n    elif x == 0:\n        return 0\n    else:\n        return 1\n"
        );
    }

    #[test]
    fn assigned_globals_are_declared() {
        let out = render("int counter = 0;\nvoid bump() { counter++; }\nint peek() { return counter; }");
        assert_eq!(
            out,
            "counter = 0\n\n\ndef bump():\n    global counter\n    counter += 1\n\n\ndef peek():\n    return counter\n"
        );
    }

    #[test]
    fn class_members_and_methods() {
        let out = render(
            "class Counter {\npublic:\n  static int instances;\n  Counter() : m_n(0) {}\n  ~Counter() { instances--; }\n  void add(int k) { m_n += k; }\n  static int count() { return instances; }\nprivate:\n  int m_n;\n};\nint Counter::instances = 0;",
        );
        assert_eq!(
            out,
            "class Counter:\n    instances = 0\n\n    def __init__(self):\n        self.m_n = 0\n\n    def __del__(self):\n        Counter.instances -= 1\n\n    def add(self, k):\n        self.m_n += k\n\n    @staticmethod\n    def count():\n        return Counter.instances\n"
        );
    }

    #[test]
    fn several_constructors_dispatch_on_arity() {
        let out = render("class P { int x; public: P() : x(0) {} P(int v) : x(v) {} };");
        assert_eq!(
            out,
            "class P:\n    def __init__(self, *args):\n        if len(args) == 0:\n            self._init_0(*args)\n        elif len(args) == 1:\n            self._init_1(*args)\n        else:\n            raise TypeError(\"P() takes 0 or 1 arguments\")\n\n    def _init_0(self):\n        self.x = 0\n\n    def _init_1(self, v):\n        self.x = v\n"
        );
    }

    #[test]
    fn subclass_calls_base() {
        let out = render(
            "class A { public: A(int v) {} virtual int run() = 0; static int size() { return 2; } };\nclass B : public A { public: B() : A(1) {} int run() { return A::size(); } };",
        );
        assert!(out.contains("class B(A):\n    def __init__(self):\n        super().__init__(1)\n"));
        assert!(out.contains("    def run(self):\n        raise NotImplementedError()\n"));
        assert!(out.contains("return A.size()"));
    }

    #[test]
    fn function_declaration_body_renders_pass() {
        let out = render("class U {}; class T {}; void f() { T x(U()); }");
        assert!(out.ends_with("def f():\n    pass\n"), "{}", out);
    }

    #[test]
    fn consecutive_globals_are_separated() {
        let out = render("int a = 1;\nint b = 2;");
        assert_eq!(out, "a = 1\n\n\nb = 2\n");
    }

    #[test]
    fn main_gets_an_entry_guard() {
        let out = render("int main() { return 0; }");
        assert_eq!(
            out,
            "import sys\n\n\ndef main():\n    return 0\n\n\nif __name__ == \"__main__\":\n    sys.exit(main())\n"
        );
    }

    #[test]
    fn pointer_operators_are_erased() {
        let out = render("struct N { int v; N *next; };\nint f(N *n) { return n->next->v + (*n).v; }");
        assert!(out.contains("return n.next.v + (n).v"));
    }

    #[test]
    fn sizeof_is_unsupported() {
        let err = render_err("int f() { return sizeof(int); }");
        assert!(matches!(err, TranslateError::Unsupported { .. }));
    }

    #[test]
    fn nested_break_in_switch_is_unsupported() {
        let err = render_err("void f(int x) { switch (x) { case 1: if (x) break; x = 2; break; } }");
        assert!(matches!(err, TranslateError::Unsupported { .. }));
    }
}
