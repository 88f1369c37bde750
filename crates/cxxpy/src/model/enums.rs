//! Enumerations and the enumerator numbering law.

use super::ast::{BinaryOp, Expr, LiteralKind, UnaryOp};
use crate::error::Coord;

/// Value an enumerator ends up with.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumValue {
    /// Folded to a constant.
    Int(i64),
    /// Kept symbolic; rendered as written.
    Expr(Expr),
    /// `base + offset`, following a symbolic enumerator.
    Offset { base: String, offset: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enumerator {
    pub name: String,
    /// Initialiser as written, if any.
    pub value: Option<Expr>,
    pub resolved: EnumValue,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enumeration {
    /// `enum class`; enumerators are not visible in the enclosing scope.
    pub scoped: bool,
    pub enumerators: Vec<Enumerator>,
}

impl Enumeration {
    pub fn new(scoped: bool) -> Self {
        Self {
            scoped,
            enumerators: Vec::new(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.enumerators.iter().position(|e| e.name == name)
    }

    /// Append an enumerator. Without an initialiser it is the previous
    /// value plus one, or zero when first.
    pub fn push(&mut self, name: &str, value: Option<Expr>, coord: Coord) {
        let resolved = match &value {
            Some(expr) => match self.fold(expr) {
                Some(v) => EnumValue::Int(v),
                None => EnumValue::Expr(expr.clone()),
            },
            None => match self.enumerators.last() {
                None => EnumValue::Int(0),
                Some(prev) => match &prev.resolved {
                    EnumValue::Int(v) => EnumValue::Int(v.wrapping_add(1)),
                    EnumValue::Expr(_) => EnumValue::Offset {
                        base: prev.name.clone(),
                        offset: 1,
                    },
                    EnumValue::Offset { base, offset } => EnumValue::Offset {
                        base: base.clone(),
                        offset: offset + 1,
                    },
                },
            },
        };
        self.enumerators.push(Enumerator {
            name: name.to_string(),
            value,
            resolved,
            coord,
        });
    }

    /// Constant-fold an initialiser against the enumerators seen so far.
    fn fold(&self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::Literal(lit) => match lit.kind {
                LiteralKind::Int => parse_int_literal(&lit.text),
                LiteralKind::Char => char_value(&lit.text),
                LiteralKind::Bool => Some(i64::from(lit.text == "true")),
                _ => None,
            },
            Expr::Variable(name) | Expr::Type(name) => {
                let index = self.index_of(name.base_name())?;
                match self.enumerators[index].resolved {
                    EnumValue::Int(v) => Some(v),
                    _ => None,
                }
            }
            Expr::Parens(inner) | Expr::Cast { operand: inner, .. } => self.fold(inner),
            Expr::Unary { op, operand } => {
                let v = self.fold(operand)?;
                match op {
                    UnaryOp::Neg => v.checked_neg(),
                    UnaryOp::Plus => Some(v),
                    UnaryOp::BitNot => Some(!v),
                    UnaryOp::Not => Some(i64::from(v == 0)),
                    UnaryOp::Deref | UnaryOp::AddressOf => None,
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.fold(left)?;
                let r = self.fold(right)?;
                match op {
                    BinaryOp::Add => l.checked_add(r),
                    BinaryOp::Sub => l.checked_sub(r),
                    BinaryOp::Mul => l.checked_mul(r),
                    BinaryOp::Div => l.checked_div(r),
                    BinaryOp::Mod => l.checked_rem(r),
                    BinaryOp::Shl => u32::try_from(r).ok().and_then(|r| l.checked_shl(r)),
                    BinaryOp::Shr => u32::try_from(r).ok().and_then(|r| l.checked_shr(r)),
                    BinaryOp::BitAnd => Some(l & r),
                    BinaryOp::BitOr => Some(l | r),
                    BinaryOp::BitXor => Some(l ^ r),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Parse a C integer literal: radix prefixes, digit separators, suffixes.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let digits: String = text
        .trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z'])
        .chars()
        .filter(|c| *c != '\'')
        .collect();
    let lower = digits.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else if lower.len() > 1 && lower.starts_with('0') {
        i64::from_str_radix(&lower[1..], 8).ok()
    } else {
        lower.parse().ok()
    }
}

fn char_value(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    match (chars.next()?, chars.next()) {
        ('\\', Some(escaped)) => match escaped {
            'n' => Some(10),
            't' => Some(9),
            'r' => Some(13),
            '0' => Some(0),
            '\\' => Some(92),
            '\'' => Some(39),
            '"' => Some(34),
            _ => None,
        },
        (c, None) => Some(c as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeclId, NameRef, RefId};

    fn coord() -> Coord {
        Coord::new("e.cpp", 1, None)
    }

    fn name(raw: &str) -> Expr {
        Expr::Variable(NameRef {
            id: RefId(0),
            raw: raw.to_string(),
            scope: DeclId::from_raw(0),
            coord: coord(),
        })
    }

    #[test]
    fn implicit_values_count_from_previous() {
        let mut e = Enumeration::new(false);
        e.push("A", None, coord());
        e.push("B", Some(Expr::int(5)), coord());
        e.push("C", None, coord());
        let values: Vec<_> = e.enumerators.iter().map(|e| e.resolved.clone()).collect();
        assert_eq!(
            values,
            vec![EnumValue::Int(0), EnumValue::Int(5), EnumValue::Int(6)]
        );
    }

    #[test]
    fn folds_references_to_earlier_enumerators() {
        let mut e = Enumeration::new(false);
        e.push("A", Some(Expr::literal(LiteralKind::Int, "0x10")), coord());
        e.push("B", Some(Expr::binary(name("A"), BinaryOp::Shl, Expr::int(1))), coord());
        assert_eq!(e.enumerators[1].resolved, EnumValue::Int(32));
    }

    #[test]
    fn symbolic_values_continue_as_offsets() {
        let mut e = Enumeration::new(false);
        e.push("A", Some(name("SOMETHING")), coord());
        e.push("B", None, coord());
        e.push("C", None, coord());
        assert!(matches!(e.enumerators[0].resolved, EnumValue::Expr(_)));
        assert_eq!(
            e.enumerators[2].resolved,
            EnumValue::Offset {
                base: "A".into(),
                offset: 2
            }
        );
    }

    #[test]
    fn int_literal_forms() {
        assert_eq!(parse_int_literal("42u"), Some(42));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("1'000'000"), Some(1_000_000));
        assert_eq!(parse_int_literal("0"), Some(0));
    }
}
