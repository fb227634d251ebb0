//! Gatelock Script — expression grammar for logic rules.
//!
//! Rule text is a boolean expression over bare identifiers (items, settings,
//! events), helper calls, `(Item, count)` tuples, and comparisons. This crate
//! owns the grammar and the untyped expression tree; it knows nothing about
//! worlds, items, or search. Resolving what an identifier *means* is the
//! engine compiler's job.

use std::fmt;

pub mod parser;

pub use parser::{ParseError, parse_rule};

/// Comparison operators accepted between two literal-ish operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Membership test: `'forest' in dungeon_shortcuts`.
    In,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Parsed rule expression.
///
/// Same-operator logical chains are flattened: `a && b && c` is one
/// [`Expr::All`] with three operands, and redundant parentheses around a
/// same-operator subchain are absorbed. The [`Display`] impl renders a
/// canonical form of the expression; two expressions with equal canonical
/// text are structurally equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Number(i64),
    /// Quoted string literal (quotes stripped).
    Str(String),
    /// Bare identifier: item alias, setting name, helper, or event.
    Ident(String),
    /// Helper or state-query call: `has_any_of(A, B)`, `here(...)`.
    Call { name: String, args: Vec<Expr> },
    /// `(Item, count)` shorthand.
    Tuple(Box<Expr>, Box<Expr>),
    /// `!operand`.
    Not(Box<Expr>),
    /// `lhs op rhs`.
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `||` chain, two or more operands.
    Any(Vec<Expr>),
    /// `&&` chain, two or more operands.
    All(Vec<Expr>),
}

impl Expr {
    /// Precedence rank used by the canonical printer. Higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Any(_) => 1,
            Expr::All(_) => 2,
            Expr::Cmp { .. } => 3,
            Expr::Not(_) => 4,
            _ => 5,
        }
    }

    fn fmt_child(&self, child: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() <= self.precedence() && child.precedence() < 5 {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }

    fn fmt_chain(&self, operands: &[Expr], sep: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            self.fmt_child(operand, f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "'{s}'"),
            Expr::Ident(name) => f.write_str(name),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Tuple(item, count) => write!(f, "({item}, {count})"),
            Expr::Not(inner) => {
                f.write_str("!")?;
                self.fmt_child(inner, f)
            }
            Expr::Cmp { op, lhs, rhs } => {
                self.fmt_child(lhs, f)?;
                write!(f, " {op} ")?;
                self.fmt_child(rhs, f)
            }
            Expr::Any(operands) => self.fmt_chain(operands, " || ", f),
            Expr::All(operands) => self.fmt_chain(operands, " && ", f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_display_flattens_chains() {
        let expr = parse_rule("Sword && (Shield && Nuts) || Slingshot").unwrap();
        assert_eq!(
            expr.to_string(),
            "Sword && Shield && Nuts || Slingshot".to_string()
        );
    }

    #[test]
    fn canonical_display_keeps_needed_parens() {
        let expr = parse_rule("Sword && (Shield || Nuts)").unwrap();
        assert_eq!(expr.to_string(), "Sword && (Shield || Nuts)");
        let reparsed = parse_rule(&expr.to_string()).unwrap();
        assert_eq!(reparsed, expr);
    }

    #[test]
    fn display_tuple_and_call() {
        let expr = parse_rule("(Progressive_Wallet, 2) || has_any_of(A, B)").unwrap();
        assert_eq!(expr.to_string(), "(Progressive_Wallet, 2) || has_any_of(A, B)");
    }
}
