//! Pest-backed parser that lowers rule text into [`Expr`] trees.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use crate::{CmpOp, Expr};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct RuleParser;

/// Errors produced while parsing rule text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The grammar rejected the text outright.
    #[error("rule syntax error: {0}")]
    Syntax(String),
    /// The grammar accepted the text but the parse tree had an unexpected
    /// shape. Indicates a grammar/builder mismatch, not bad input.
    #[error("unexpected parse shape: {0}")]
    Shape(&'static str),
}

/// Parse one rule expression. Trailing `#` comments and surrounding
/// whitespace are ignored by the grammar.
pub fn parse_rule(text: &str) -> Result<Expr, ParseError> {
    let mut pairs =
        RuleParser::parse(Rule::rule_text, text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    let expr = pairs.next().ok_or(ParseError::Shape("empty rule"))?;
    build_expr(expr)
}

fn build_expr(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => build_chain(pair, true),
        Rule::and_chain => build_chain(pair, false),
        Rule::cmp_expr => build_cmp(pair),
        Rule::unary => build_unary(pair),
        Rule::call => build_call(pair),
        Rule::tuple_or_group => build_tuple_or_group(pair),
        Rule::boolean => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::number => pair
            .as_str()
            .parse()
            .map(Expr::Number)
            .map_err(|_| ParseError::Shape("integer out of range")),
        Rule::string => {
            let raw = pair.as_str();
            Ok(Expr::Str(raw[1..raw.len() - 1].to_string()))
        }
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        _ => Err(ParseError::Shape("unexpected rule in expression")),
    }
}

/// Build an `||` or `&&` chain, flattening nested same-operator chains so a
/// parenthesized subchain does not change the tree.
fn build_chain(pair: Pair<'_, Rule>, any: bool) -> Result<Expr, ParseError> {
    let mut operands: Vec<Expr> = Vec::new();
    for inner in pair.into_inner() {
        let child = build_expr(inner)?;
        match child {
            Expr::Any(sub) if any => operands.extend(sub),
            Expr::All(sub) if !any => operands.extend(sub),
            other => operands.push(other),
        }
    }
    match operands.len() {
        0 => Err(ParseError::Shape("empty logical chain")),
        1 => Ok(operands.pop().ok_or(ParseError::Shape("empty logical chain"))?),
        _ if any => Ok(Expr::Any(operands)),
        _ => Ok(Expr::All(operands)),
    }
}

fn build_cmp(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let lhs = build_expr(inner.next().ok_or(ParseError::Shape("comparison without lhs"))?)?;
    let Some(op_pair) = inner.next() else {
        return Ok(lhs);
    };
    let op = match op_pair.as_str().trim() {
        "==" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        "<" => CmpOp::Lt,
        "<=" => CmpOp::Le,
        ">" => CmpOp::Gt,
        ">=" => CmpOp::Ge,
        "in" => CmpOp::In,
        _ => return Err(ParseError::Shape("unknown comparison operator")),
    };
    let rhs = build_expr(inner.next().ok_or(ParseError::Shape("comparison without rhs"))?)?;
    Ok(Expr::Cmp {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::Shape("empty unary"))?;
    if first.as_rule() == Rule::not_op {
        let operand = build_expr(inner.next().ok_or(ParseError::Shape("dangling negation"))?)?;
        Ok(Expr::Not(Box::new(operand)))
    } else {
        build_expr(first)
    }
}

fn build_call(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or(ParseError::Shape("call without name"))?
        .as_str()
        .to_string();
    let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Call { name, args })
}

fn build_tuple_or_group(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let first = build_expr(inner.next().ok_or(ParseError::Shape("empty parentheses"))?)?;
    match inner.next() {
        Some(second) => Ok(Expr::Tuple(
            Box::new(first),
            Box::new(build_expr(second)?),
        )),
        None => Ok(first),
    }
}
