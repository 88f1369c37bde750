//! Snapshot tests for the lexer and the Python writer.
//!
//! These tests verify that lexing and emission produce expected output.
//! Run `cargo insta review` to update snapshots after intentional changes.

use cxxpy::{DeclId, Lexer, TokenKind, TranslationContext, translate};

fn python(code: &str) -> String {
    translate("main", &[("test.cpp", code)]).expect("translation failed")
}

fn context(files: &[(&str, &str)]) -> TranslationContext {
    let mut context = TranslationContext::new("main");
    for (name, text) in files {
        context.parse_source(name, text).expect("parse failed");
    }
    context.resolve().expect("resolve failed");
    context
}

// ============================================================================
// Lexer Snapshots - verify tokens are correct
// ============================================================================

mod lexer {
    use super::*;

    #[test]
    fn longest_operator_and_literal() {
        let (tokens, errors) = Lexer::tokenize("x >>= 0x1F;");
        assert!(errors.is_empty());
        let tokens: Vec<_> = tokens.into_iter().filter(|t| !t.is(TokenKind::Eof)).collect();
        insta::assert_json_snapshot!(tokens, @r#"
        [
          {
            "kind": "Identifier",
            "lexeme": "x",
            "line": 1,
            "column": 1
          },
          {
            "kind": "ShrAssign",
            "lexeme": ">>=",
            "line": 1,
            "column": 3
          },
          {
            "kind": "IntLiteral",
            "lexeme": "0x1F",
            "line": 1,
            "column": 7
          },
          {
            "kind": "Semicolon",
            "lexeme": ";",
            "line": 1,
            "column": 11
          }
        ]
        "#);
    }
}

// ============================================================================
// Writer Snapshots - verify emitted Python is correct
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn unscoped_enum() {
        insta::assert_snapshot!(python("enum Bar { TOP, RIGHT, BOTTOM, LEFT };"), @r"
        from enum import Enum


        class Bar(Enum):
            TOP = 0
            RIGHT = 1
            BOTTOM = 2
            LEFT = 3
        ");
    }

    #[test]
    fn constructor_assigns_member() {
        insta::assert_snapshot!(python("class Foo { int m_x; Foo(int x) { this->m_x = x; } };"), @r"
        class Foo:
            def __init__(self, x):
                self.m_x = x
        ");
    }

    #[test]
    fn nested_class_from_namespace() {
        let out = python(
            "namespace bar { namespace foo { class Outer { public: class Inner {}; }; } }\n\
             bar::foo::Outer::Inner *make() { return new bar::foo::Outer::Inner(); }",
        );
        insta::assert_snapshot!(out, @r"
        from bar.foo import Outer


        def make():
            return Outer.Inner()
        ");
    }

    #[test]
    fn out_of_line_constructor_merges() {
        let ctx = context(&[(
            "foo.cpp",
            "class Foo { public: Foo(int x); int m_x; };\nFoo::Foo(int x) { m_x = x; }",
        )]);
        let model = ctx.model();
        let class: DeclId = model
            .module(model.root())
            .and_then(|m| m.members.get("Foo"))
            .expect("class Foo");
        let constructors = &model.class(class).expect("a class").constructors;
        assert_eq!(constructors.len(), 1);
        let ctor = constructors.values().next().copied().expect("one constructor");
        let function = model.function(ctor).expect("constructor body");
        assert_eq!(function.parameters.len(), 1);
        assert!(function.statements.is_some());
        insta::assert_snapshot!(ctx.render("main").unwrap(), @r"
        class Foo:
            def __init__(self, x):
                self.m_x = x
        ");
    }
}

mod properties {
    use super::*;

    #[test]
    fn rendering_is_deterministic() {
        let ctx = context(&[(
            "a.cpp",
            "namespace geo { struct P { int x; int y; }; }\nint area(geo::P p) { return p.x * p.y; }",
        )]);
        let first = ctx.render("main").unwrap();
        let second = ctx.render("main").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn one_import_per_foreign_symbol() {
        let out = python(
            "namespace shapes { class Circle {}; class Square {}; }\n\
             shapes::Circle *a() { return new shapes::Circle(); }\n\
             shapes::Circle *b() { return new shapes::Circle(); }\n\
             shapes::Square *c() { return new shapes::Square(); }",
        );
        assert_eq!(out.matches("import").count(), 1);
        assert!(out.starts_with("from shapes import Circle, Square\n"));
        assert!(out.contains("return Circle()"));
        assert!(out.contains("return Square()"));
    }

    #[test]
    fn same_module_references_need_no_import() {
        let out = python("class A {};\nA *make() { return new A(); }");
        assert!(!out.contains("import"));
    }

    #[test]
    fn blank_lines_between_declarations() {
        let out = python(
            "int limit = 3;\nint scale = 2;\nclass Box {\npublic:\n  int w;\n  int area() { return w * w; }\n  int twice() { return area() * 2; }\n};\nint f() { return limit; }",
        );
        insta::assert_snapshot!(out, @r"
        limit = 3


        scale = 2


        class Box:
            def area(self):
                return self.w * self.w

            def twice(self):
                return self.area() * 2


        def f():
            return limit
        ");
    }

    #[test]
    fn data_members_without_initializers_leave_no_trace() {
        insta::assert_snapshot!(python("struct P { int x; int y; };"), @r"
        class P:
            pass
        ");
        let out = python("class Pair { int a; int b; public: int sum() { return a + b; } };");
        insta::assert_snapshot!(out, @r"
        class Pair:
            def sum(self):
                return self.a + self.b
        ");
    }

    #[test]
    fn enum_numbering_follows_previous_value() {
        let out = python("enum E { A, B = 5, C, D = B * 2, F };");
        assert!(out.contains("class E(Enum):\n    A = 0\n    B = 5\n    C = 6\n    D = 10\n    F = 11\n"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut ctx = context(&[(
            "a.cpp",
            "namespace n { class C {}; }\nn::C *g() { return new n::C(); }",
        )]);
        let before = ctx.render("main").unwrap();
        assert_eq!(ctx.resolve().unwrap(), 0);
        assert_eq!(ctx.render("main").unwrap(), before);
    }
}

mod errors {
    use super::*;
    use cxxpy::TranslateError;

    #[test]
    fn syntax_error_has_position() {
        let err = translate("main", &[("bad.cpp", "int f( {")]).unwrap_err();
        let coord = err.coord().expect("a position");
        assert_eq!(coord.file, "bad.cpp");
        assert_eq!(coord.line, 1);
    }

    #[test]
    fn unresolved_scope_is_reported() {
        let err = translate("main", &[("a.cpp", "int f() { return nowhere::x; }")]).unwrap_err();
        assert!(matches!(err, TranslateError::Unresolved(_)));
    }

    #[test]
    fn lex_error_names_the_file() {
        let err = translate("main", &[("a.cpp", "int x = 1 @ 2;")]).unwrap_err();
        assert!(matches!(err, TranslateError::Lex { ref file, .. } if file == "a.cpp"));
    }
}
