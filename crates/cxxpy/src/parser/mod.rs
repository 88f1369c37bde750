//! Recursive-descent parser for the supported C++ subset.
//!
//! The parser pulls tokens lazily from a [`TokenStream`], classifies names
//! through the [`ScopeTracker`] (falling back to the model for qualified
//! names) and backtracks with [`Parser::try_parse`] where the grammar is
//! ambiguous. Builder actions on the [`Model`] run only once a rule has
//! committed, so a rewound speculation never leaves a trace in the model.

mod decls;
mod exprs;
mod stmts;
mod support;
mod types;

use crate::error::{Coord, TranslateError};
use crate::model::{DeclId, Expr, Model, NameRef, PrimitiveType};
use crate::scope::ScopeTracker;
use std::collections::{HashMap, HashSet};
use support::TokenStream;

/// Name classification that outlives a single file.
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    pub scopes: ScopeTracker,
    /// `typedef unsigned int uint;` style aliases of builtin types.
    aliases: HashMap<String, PrimitiveType>,
    /// Names declared under a `template <...>` head.
    templates: HashSet<String>,
}

pub struct Parser<'m> {
    pub(crate) tokens: TokenStream,
    pub(crate) model: &'m mut Model,
    pub(crate) file: String,
    /// Innermost declaration context new declarations go into.
    pub(crate) context: DeclId,
    /// Parameter names of enclosing `template <...>` heads.
    pub(crate) template_frames: Vec<Vec<String>>,
    /// Set while parsing the declaration under a template head.
    pub(crate) pending_template: bool,
    /// Set while parsing template arguments, where `>` closes the list.
    pub(crate) in_template_args: bool,
    aliases: HashMap<String, PrimitiveType>,
    templates: HashSet<String>,
}

impl<'m> Parser<'m> {
    pub fn new(model: &'m mut Model, filename: &str, text: &str, state: ParserState) -> Self {
        let context = model.root();
        Self {
            tokens: TokenStream::new(text, state.scopes),
            model,
            file: filename.to_string(),
            context,
            template_frames: Vec::new(),
            pending_template: false,
            in_template_args: false,
            aliases: state.aliases,
            templates: state.templates,
        }
    }

    /// Parse the whole translation unit into the model's root module.
    ///
    /// A lexical error anywhere in the file fails the parse even when the
    /// grammar recovered from it.
    pub fn parse_translation_unit(mut self) -> Result<ParserState, TranslateError> {
        let result = self.parse_declaration_seq(crate::lexer::TokenKind::Eof);
        if let Some(err) = self.tokens.first_lex_error() {
            return Err(TranslateError::Lex {
                file: self.file.clone(),
                source: err.clone(),
            });
        }
        result?;
        Ok(ParserState {
            scopes: self.tokens.scopes,
            aliases: self.aliases,
            templates: self.templates,
        })
    }

    /// Whether a (possibly qualified) name denotes a type here.
    pub(crate) fn is_type_name(&self, segments: &[String]) -> bool {
        if let [name] = segments {
            if self.template_frames.iter().any(|frame| frame.contains(name))
                || self.aliases.contains_key(name)
            {
                return true;
            }
            if let Some(is_type) = self.tokens.scopes.classify(name) {
                return is_type;
            }
        }
        self.model.names_type(self.context, segments)
    }

    pub(crate) fn is_template_name(&self, segments: &[String]) -> bool {
        segments
            .last()
            .is_some_and(|last| self.templates.contains(last))
    }

    pub(crate) fn primitive_alias(&self, name: &str) -> Option<PrimitiveType> {
        self.aliases.get(name).copied()
    }

    pub(crate) fn add_alias(&mut self, name: &str, primitive: PrimitiveType) {
        self.aliases.insert(name.to_string(), primitive);
    }

    /// Record that `name` was declared under a template head.
    pub(crate) fn note_template(&mut self, name: &str) {
        if std::mem::take(&mut self.pending_template) {
            self.templates.insert(name.to_string());
        }
    }

    pub(crate) fn name_ref(&mut self, raw: String, coord: Coord) -> NameRef {
        NameRef {
            id: self.model.fresh_ref(),
            raw,
            scope: self.context,
            coord,
        }
    }

    /// Reference to a type by raw name: scoped names become `Expr::Type`.
    pub(crate) fn type_expr(&mut self, raw: String, coord: Coord) -> Expr {
        let qualified = raw.contains("::");
        let name = self.name_ref(raw, coord);
        if qualified {
            Expr::Type(name)
        } else {
            Expr::Variable(name)
        }
    }

    /// Whether declarations here go into a function body.
    pub(crate) fn at_block_scope(&self) -> bool {
        self.model.function(self.context).is_some()
    }
}

/// Parse one preprocessed file into `model`.
pub fn parse(model: &mut Model, filename: &str, text: &str) -> Result<(), TranslateError> {
    Parser::new(model, filename, text, ParserState::default())
        .parse_translation_unit()
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeclKind, Stmt};

    fn parsed(text: &str) -> Model {
        let mut model = Model::new("test");
        parse(&mut model, "test.cpp", text).unwrap();
        model
    }

    fn body(model: &Model, name: &str) -> Vec<Stmt> {
        let id = model.module(model.root()).unwrap().members.get(name).unwrap();
        model.function(id).unwrap().statements.clone().unwrap()
    }

    #[test]
    fn pointer_declaration_vs_multiplication() {
        let model = parsed("class T {}; void f(int a, int b) { T * x; a * b; }");
        let stmts = body(&model, "f");
        assert!(matches!(&stmts[0], Stmt::Variable { name, .. } if name == "x"));
        assert!(matches!(&stmts[1], Stmt::Expr(Expr::Binary { .. })));
    }

    #[test]
    fn most_vexing_parse_declares_a_function() {
        for decl in ["T x(U());", "T x(U);", "T x(int);"] {
            let model = parsed(&format!("class U {{}}; class T {{}}; void f() {{ {} }}", decl));
            assert_eq!(body(&model, "f"), Vec::<Stmt>::new(), "{}", decl);
        }
    }

    #[test]
    fn empty_statements_leave_no_trace() {
        let model = parsed("void f(int a) { ; {} a = 1; }");
        assert_eq!(body(&model, "f").len(), 1);
    }

    #[test]
    fn constructor_arguments_make_a_variable() {
        let model = parsed("class T { public: T(int a) {} }; void f(int y) { T x(y); }");
        let stmts = body(&model, "f");
        assert!(matches!(&stmts[0], Stmt::Variable { name, value: Some(Expr::Invoke { .. }) } if name == "x"));
    }

    #[test]
    fn nested_template_arguments_split_shift() {
        let model = parsed("template <class T> class Box {}; Box<Box<int>> b; int c = 8 >> 1;");
        let root = model.module(model.root()).unwrap();
        assert!(root.members.get("b").is_some());
        assert!(root.members.get("c").is_some());
    }

    #[test]
    fn less_than_is_not_a_template() {
        let model = parsed("int f(int a, int b) { return a < b; }");
        assert!(matches!(
            &body(&model, "f")[0],
            Stmt::Return(Some(Expr::Binary { .. }))
        ));
    }

    #[test]
    fn bitfields_and_base_clauses() {
        let model = parsed("struct A { unsigned flag : 1; }; struct B : public A { int x; };");
        let root = model.module(model.root()).unwrap();
        let b = root.members.get("B").unwrap();
        assert!(model.class(b).unwrap().superclass.is_some());
        let a = root.members.get("A").unwrap();
        assert!(model.class(a).unwrap().members.get("flag").is_some());
    }

    #[test]
    fn knr_parameters_are_recognised() {
        let model = parsed("int add(a, b) int a; int b; { return a + b; }");
        let id = model.module(model.root()).unwrap().members.get("add").unwrap();
        let f = model.function(id).unwrap();
        let names: Vec<_> = f.parameters.iter().map(|p| model.name(*p).unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn dangling_else_binds_to_inner_if() {
        let model = parsed("void f(int a, int b) { if (a) if (b) a = 1; else a = 2; }");
        let Stmt::If { if_true, if_false, .. } = &body(&model, "f")[0] else {
            panic!("expected if");
        };
        assert!(if_false.is_none());
        assert!(matches!(&if_true[0], Stmt::If { if_false: Some(_), .. }));
    }

    #[test]
    fn out_of_line_method_attaches_body() {
        let model = parsed("class Foo { void run(int x); }; void Foo::run(int y) { y = 1; }");
        let foo = model.module(model.root()).unwrap().members.get("Foo").unwrap();
        let run = model.class(foo).unwrap().members.get("run").unwrap();
        let f = model.function(run).unwrap();
        assert_eq!(model.name(f.parameters[0]), Some("y"));
        assert_eq!(f.statements.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn syntax_error_carries_position() {
        let mut model = Model::new("test");
        let err = parse(&mut model, "bad.cpp", "int x = ;").unwrap_err();
        assert_eq!(err.coord().map(|c| c.line), Some(1));
        assert!(matches!(err, TranslateError::Syntax(_)));
    }

    #[test]
    fn lex_error_fails_the_parse() {
        let mut model = Model::new("test");
        let err = parse(&mut model, "bad.cpp", "int x = 1; @").unwrap_err();
        assert!(matches!(err, TranslateError::Lex { .. }));
    }

    #[test]
    fn typedef_of_class_becomes_alias() {
        let model = parsed("class Foo {}; typedef Foo Bar; typedef struct { int a; } Point;");
        let root = model.module(model.root()).unwrap();
        let bar = root.members.get("Bar").unwrap();
        assert!(matches!(model.kind(bar), DeclKind::Variable(v) if v.is_alias));
        let point = root.members.get("Point").unwrap();
        assert!(model.class(point).is_some());
    }
}
