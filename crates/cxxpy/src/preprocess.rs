//! Minimal text-to-text preprocessor run before lexing.
//!
//! Handles line splices, comments, conditional directives and object-like
//! `#define`s. `#include` and `#pragma` are dropped. Every input line maps to
//! exactly one output line so diagnostics keep their line numbers.

use crate::error::{Coord, PreprocessError};
use crate::model::parse_int_literal;
use std::collections::{BTreeMap, HashSet};

/// Macro table: name -> replacement text.
pub type Defines = BTreeMap<String, String>;

const MAX_EXPANSION_DEPTH: usize = 32;

/// One open `#if` group.
#[derive(Debug, Clone, Copy)]
struct Conditional {
    /// Lines in the current branch are kept.
    active: bool,
    /// Some branch of this group has already been taken.
    taken: bool,
    /// The enclosing group is active.
    outer: bool,
    seen_else: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    defines: Defines,
    /// Function-like macros: known for `defined`, never expanded.
    function_like: HashSet<String>,
}

impl Preprocessor {
    pub fn new(defines: Defines) -> Self {
        Self {
            defines,
            function_like: HashSet::new(),
        }
    }

    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    /// Preprocess one file. Definitions persist into later files.
    pub fn run(&mut self, filename: &str, text: &str) -> Result<String, PreprocessError> {
        let text = strip_comments(&splice_lines(text));
        let mut stack: Vec<Conditional> = Vec::new();
        let mut out = String::with_capacity(text.len());
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let coord = Coord::new(filename, index + 1, None);
            let active = stack.last().is_none_or(|c| c.active);
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(directive.trim(), &mut stack, active, &coord)?;
                continue;
            }
            if active {
                out.push_str(&self.expand(line, &mut Vec::new()));
            }
        }
        if !stack.is_empty() {
            let line = text.split('\n').count();
            return Err(PreprocessError {
                message: "unterminated conditional directive".to_string(),
                coord: Coord::new(filename, line, None),
            });
        }
        Ok(out)
    }

    fn directive(
        &mut self,
        directive: &str,
        stack: &mut Vec<Conditional>,
        active: bool,
        coord: &Coord,
    ) -> Result<(), PreprocessError> {
        let (name, rest) = match directive.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
            Some(end) => (&directive[..end], directive[end..].trim()),
            None => (directive, ""),
        };
        let error = |message: String| PreprocessError {
            message,
            coord: coord.clone(),
        };
        match name {
            "if" | "ifdef" | "ifndef" => {
                let value = if !active {
                    false
                } else {
                    match name {
                        "ifdef" => self.is_defined(macro_name(rest).ok_or_else(|| error("`#ifdef` needs a name".into()))?),
                        "ifndef" => !self.is_defined(macro_name(rest).ok_or_else(|| error("`#ifndef` needs a name".into()))?),
                        _ => self.evaluate(rest, coord)? != 0,
                    }
                };
                stack.push(Conditional {
                    active: value,
                    taken: value,
                    outer: active,
                    seen_else: false,
                });
            }
            "elif" => {
                let Some(top) = stack.last().copied() else {
                    return Err(error("`#elif` without `#if`".into()));
                };
                if top.seen_else {
                    return Err(error("`#elif` after `#else`".into()));
                }
                let value = top.outer && !top.taken && self.evaluate(rest, coord)? != 0;
                if let Some(top) = stack.last_mut() {
                    top.active = value;
                    top.taken |= value;
                }
            }
            "else" => {
                let Some(top) = stack.last_mut() else {
                    return Err(error("`#else` without `#if`".into()));
                };
                if top.seen_else {
                    return Err(error("duplicate `#else`".into()));
                }
                top.seen_else = true;
                top.active = top.outer && !top.taken;
                top.taken = true;
            }
            "endif" => {
                if stack.pop().is_none() {
                    return Err(error("`#endif` without `#if`".into()));
                }
            }
            _ if !active => {}
            "define" => self.define(rest).map_err(error)?,
            "undef" => {
                let name = macro_name(rest).ok_or_else(|| error("`#undef` needs a name".into()))?;
                self.defines.remove(name);
                self.function_like.remove(name);
            }
            "include" | "pragma" | "line" | "ident" | "" => {
                tracing::debug!("{}: ignoring `#{}`", coord, directive);
            }
            "warning" => tracing::warn!("{}: #warning {}", coord, rest),
            "error" => return Err(error(format!("#error {}", rest))),
            other => return Err(error(format!("unknown directive `#{}`", other))),
        }
        Ok(())
    }

    fn define(&mut self, rest: &str) -> Result<(), String> {
        let name = macro_name(rest).ok_or_else(|| "`#define` needs a name".to_string())?;
        let after = &rest[name.len()..];
        if after.starts_with('(') {
            tracing::debug!("function-like macro `{}` is not expanded", name);
            self.function_like.insert(name.to_string());
            return Ok(());
        }
        self.defines.insert(name.to_string(), after.trim().to_string());
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name) || self.function_like.contains(name)
    }

    /// Replace object-like macros outside literals. `active` holds the
    /// macros being expanded, which are not expanded again.
    fn expand(&self, line: &str, active: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(line.len());
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '"' || ch == '\'' {
                let end = literal_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            } else if ch.is_ascii_digit() {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '\'')) {
                    i += 1;
                }
                out.extend(&chars[start..i]);
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                match self.defines.get(&ident) {
                    Some(value) if !active.contains(&ident) && active.len() < MAX_EXPANSION_DEPTH => {
                        active.push(ident);
                        let expanded = self.expand(value, active);
                        active.pop();
                        out.push_str(&expanded);
                    }
                    _ => out.push_str(&ident),
                }
            } else {
                out.push(ch);
                i += 1;
            }
        }
        out
    }

    /// Value of a `#if` / `#elif` expression.
    fn evaluate(&self, text: &str, coord: &Coord) -> Result<i64, PreprocessError> {
        let tokens = tokenize(text).map_err(|message| PreprocessError {
            message,
            coord: coord.clone(),
        })?;
        let mut eval = Evaluator {
            preprocessor: self,
            tokens,
            pos: 0,
            depth: 0,
            coord,
        };
        let value = eval.conditional()?;
        if eval.pos < eval.tokens.len() {
            return Err(eval.error("trailing tokens in `#if` expression"));
        }
        Ok(value)
    }
}

/// Leading identifier of `text`.
fn macro_name(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let name = &text[..end];
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok.then_some(name)
}

/// Index just past the char or string literal starting at `start`.
fn literal_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Join backslash-continued lines. The removed newlines are re-emitted after
/// the logical line so later lines keep their numbers.
fn splice_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut owed = 0;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if matches!(chars.peek(), Some('\n')) => {
                chars.next();
                owed += 1;
            }
            '\\' if matches!(chars.peek(), Some('\r')) => {
                chars.next();
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                owed += 1;
            }
            '\r' => {}
            '\n' => {
                out.push('\n');
                for _ in 0..owed {
                    out.push('\n');
                }
                owed = 0;
            }
            _ => out.push(ch),
        }
    }
    for _ in 0..owed {
        out.push('\n');
    }
    out
}

/// Remove `//` and `/* */` comments outside literals. A block comment
/// becomes one space plus the newlines it spanned.
fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1)) {
            ('\'', _) if i > 0 && chars[i - 1].is_ascii_digit() => {
                // Digit separator.
                out.push('\'');
                i += 1;
            }
            ('"' | '\'', _) => {
                // Literals never span lines.
                let end = literal_end(&chars, i);
                let line_end = chars[i..].iter().position(|c| *c == '\n').map_or(chars.len(), |p| i + p);
                let end = end.min(line_end);
                out.extend(&chars[i..end]);
                i = end;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                out.push(' ');
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            (ch, _) => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum PpToken {
    Number(i64),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "!", "~", "-", "+", "*", "/", "%", "<", ">", "&",
    "^", "|", "?", ":", "(", ")",
];

fn tokenize(text: &str) -> Result<Vec<PpToken>, String> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();
    while let Some(ch) = rest.chars().next() {
        if ch.is_ascii_digit() {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '\''))
                .unwrap_or(rest.len());
            let value = parse_int_literal(&rest[..end])
                .ok_or_else(|| format!("invalid number `{}` in `#if`", &rest[..end]))?;
            tokens.push(PpToken::Number(value));
            rest = &rest[end..];
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            tokens.push(PpToken::Ident(rest[..end].to_string()));
            rest = &rest[end..];
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(PpToken::Op(*op));
            rest = &rest[op.len()..];
        } else {
            return Err(format!("unexpected `{}` in `#if`", ch));
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

fn binding_power(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | "<=" | ">" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

/// Precedence-climbing evaluator for `#if` expressions.
struct Evaluator<'p> {
    preprocessor: &'p Preprocessor,
    tokens: Vec<PpToken>,
    pos: usize,
    depth: usize,
    coord: &'p Coord,
}

impl Evaluator<'_> {
    fn error(&self, message: &str) -> PreprocessError {
        PreprocessError {
            message: message.to_string(),
            coord: self.coord.clone(),
        }
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(PpToken::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), PreprocessError> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}` in `#if` expression", op)))
        }
    }

    fn conditional(&mut self) -> Result<i64, PreprocessError> {
        let condition = self.binary(0)?;
        if self.peek_op() != Some("?") {
            return Ok(condition);
        }
        self.pos += 1;
        let if_true = self.conditional()?;
        self.expect_op(":")?;
        let if_false = self.conditional()?;
        Ok(if condition != 0 { if_true } else { if_false })
    }

    fn binary(&mut self, min: u8) -> Result<i64, PreprocessError> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_op() {
            let Some(bp) = binding_power(op) else {
                break;
            };
            if bp <= min {
                break;
            }
            self.pos += 1;
            let right = self.binary(bp)?;
            left = self.apply(op, left, right)?;
        }
        Ok(left)
    }

    fn apply(&self, op: &str, l: i64, r: i64) -> Result<i64, PreprocessError> {
        Ok(match op {
            "||" => i64::from(l != 0 || r != 0),
            "&&" => i64::from(l != 0 && r != 0),
            "|" => l | r,
            "^" => l ^ r,
            "&" => l & r,
            "==" => i64::from(l == r),
            "!=" => i64::from(l != r),
            "<" => i64::from(l < r),
            "<=" => i64::from(l <= r),
            ">" => i64::from(l > r),
            ">=" => i64::from(l >= r),
            "<<" => l.wrapping_shl(r as u32),
            ">>" => l.wrapping_shr(r as u32),
            "+" => l.wrapping_add(r),
            "-" => l.wrapping_sub(r),
            "*" => l.wrapping_mul(r),
            "/" | "%" if r == 0 => return Err(self.error("division by zero in `#if` expression")),
            "/" => l.wrapping_div(r),
            _ => l.wrapping_rem(r),
        })
    }

    fn unary(&mut self) -> Result<i64, PreprocessError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("incomplete `#if` expression"))?;
        self.pos += 1;
        match token {
            PpToken::Number(value) => Ok(value),
            PpToken::Op("!") => Ok(i64::from(self.unary()? == 0)),
            PpToken::Op("~") => Ok(!self.unary()?),
            PpToken::Op("-") => Ok(self.unary()?.wrapping_neg()),
            PpToken::Op("+") => self.unary(),
            PpToken::Op("(") => {
                let value = self.conditional()?;
                self.expect_op(")")?;
                Ok(value)
            }
            PpToken::Ident(name) if name == "defined" => {
                let parens = self.peek_op() == Some("(");
                if parens {
                    self.pos += 1;
                }
                let Some(PpToken::Ident(target)) = self.tokens.get(self.pos).cloned() else {
                    return Err(self.error("`defined` needs a macro name"));
                };
                self.pos += 1;
                if parens {
                    self.expect_op(")")?;
                }
                Ok(i64::from(self.preprocessor.is_defined(&target)))
            }
            PpToken::Ident(name) if name == "true" => Ok(1),
            PpToken::Ident(name) => self.macro_value(&name),
            PpToken::Op(op) => Err(self.error(&format!("unexpected `{}` in `#if` expression", op))),
        }
    }

    /// A macro evaluates to its expansion; an unknown name is zero.
    fn macro_value(&self, name: &str) -> Result<i64, PreprocessError> {
        let Some(value) = self.preprocessor.defines.get(name) else {
            return Ok(0);
        };
        if value.trim().is_empty() || self.depth >= MAX_EXPANSION_DEPTH {
            return Ok(0);
        }
        let tokens = tokenize(value).map_err(|message| self.error(&message))?;
        let mut nested = Evaluator {
            preprocessor: self.preprocessor,
            tokens,
            pos: 0,
            depth: self.depth + 1,
            coord: self.coord,
        };
        nested.conditional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, defines: &[(&str, &str)]) -> String {
        let defines = defines
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Preprocessor::new(defines).run("t.cpp", text).unwrap()
    }

    #[test]
    fn comments_are_removed_keeping_lines() {
        let out = run("int a; // one\n/* two\nthree */ int b;\nchar *s = \"// not\";", &[]);
        assert_eq!(out, "int a; \n \n int b;\nchar *s = \"// not\";");
    }

    #[test]
    fn splices_keep_line_numbers() {
        let out = run("int \\\nx;\nint y;", &[]);
        assert_eq!(out, "int x;\n\nint y;");
    }

    #[test]
    fn conditionals_select_branches() {
        let text = "#ifdef FAST\nint fast;\n#elif LEVEL > 2\nint high;\n#else\nint low;\n#endif";
        assert_eq!(run(text, &[("FAST", "")]), "\nint fast;\n\n\n\n\n");
        assert_eq!(run(text, &[("LEVEL", "3")]), "\n\n\nint high;\n\n\n");
        assert_eq!(run(text, &[]), "\n\n\n\n\nint low;\n");
    }

    #[test]
    fn nested_inactive_groups_stay_inactive() {
        let text = "#if 0\n#if 1\nint a;\n#else\nint b;\n#endif\n#endif\nint c;";
        assert_eq!(run(text, &[]), "\n\n\n\n\n\n\nint c;");
    }

    #[test]
    fn object_like_defines_expand() {
        let out = run("#define SIZE (N * 2)\n#define N 4\nint a[SIZE]; char c = 'N'; int N2;", &[]);
        assert_eq!(out, "\n\nint a[(4 * 2)]; char c = 'N'; int N2;");
    }

    #[test]
    fn self_referential_defines_stop() {
        let out = run("#define X X + 1\nint y = X;", &[]);
        assert_eq!(out, "\nint y = X + 1;");
    }

    #[test]
    fn defined_operator_and_arithmetic() {
        let text = "#if defined(A) && !defined B && (1 << 3) == 8\nyes\n#endif";
        assert_eq!(run(text, &[("A", "1")]), "\nyes\n");
    }

    #[test]
    fn function_like_macros_are_known_but_not_expanded() {
        let out = run("#define MAX(a, b) a\n#ifdef MAX\nint m = MAX(1, 2);\n#endif", &[]);
        assert_eq!(out, "\n\nint m = MAX(1, 2);\n");
    }

    #[test]
    fn includes_are_dropped() {
        assert_eq!(run("#include <vector>\nint a;", &[]), "\nint a;");
    }

    #[test]
    fn unbalanced_directives_fail() {
        let mut pp = Preprocessor::default();
        let err = pp.run("t.cpp", "#if 1\nint a;").unwrap_err();
        assert_eq!(err.coord.line, 2);
        assert!(pp.run("t.cpp", "#endif").is_err());
        assert!(pp.run("t.cpp", "#if 1\n#else\n#else\n#endif").is_err());
    }

    #[test]
    fn error_directive_fails_only_when_active() {
        let mut pp = Preprocessor::default();
        assert!(pp.run("t.cpp", "#if 0\n#error nope\n#endif").is_ok());
        let err = pp.run("t.cpp", "#error broken").unwrap_err();
        assert!(err.message.contains("broken"));
    }
}
