//! Executable form of a compiled rule.
//!
//! Compilation lowers rule text into a small op tree of inventory queries,
//! logical combinators, residual comparisons, and time-of-day checks. Trees
//! are shared behind [`std::rc::Rc`] so the memo cache can hand the same
//! compiled rule to many spots.

use std::rc::Rc;

use gatelock_script::CmpOp;

use crate::error::SearchError;
use crate::ids::{RegionId, WorldId};
use crate::region::TimeOfDay;
use crate::state::WorldState;

/// Search age. Rules may compare `age` against `'child'` / `'adult'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    Child,
    Adult,
}

impl Age {
    pub fn as_str(self) -> &'static str {
        match self {
            Age::Child => "child",
            Age::Adult => "adult",
        }
    }
}

/// Evaluation-time bindings: which body is walking, which spot's rule is
/// being asked, and an explicit time-of-day constraint (empty = unconstrained).
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub age: Age,
    /// World and parent region of the spot under evaluation.
    pub spot: Option<(WorldId, RegionId)>,
    pub tod: TimeOfDay,
}

impl Context {
    pub fn new(age: Age) -> Self {
        Context {
            age,
            spot: None,
            tod: TimeOfDay::empty(),
        }
    }

    pub fn at(age: Age, world: WorldId, region: RegionId) -> Self {
        Context {
            age,
            spot: Some((world, region)),
            tod: TimeOfDay::empty(),
        }
    }

    pub fn with_tod(mut self, tod: TimeOfDay) -> Self {
        self.tod = tod;
        self
    }
}

/// Callback a time-of-day check uses to ask the search whether a region is
/// reachable with a specific ToD bit. Evaluation outside a search (tests,
/// standalone folding) uses [`NoReach`].
pub trait RegionReach {
    fn can_reach_tod(
        &mut self,
        world: WorldId,
        region: RegionId,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError>;
}

/// Answers "no" to every reachability question.
pub struct NoReach;

impl RegionReach for NoReach {
    fn can_reach_tod(
        &mut self,
        _world: WorldId,
        _region: RegionId,
        _age: Age,
        _tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        Ok(false)
    }
}

/// Literal or inventory-derived operand of a residual comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Num(i64),
    Str(String),
    Bool(bool),
    List(Vec<String>),
    /// `item_count(X)` at evaluation time.
    ItemCount(String),
    /// `count_of(X, Y, ...)` at evaluation time.
    CountOf(Vec<String>),
    /// The evaluating age as `'child'` / `'adult'`.
    Age,
}

/// One node of the lowered rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Const(bool),
    Has { item: String, count: u32 },
    HasAnyOf(Vec<String>),
    HasAllOf(Vec<String>),
    Not(Box<RuleNode>),
    All(Vec<RuleNode>),
    Any(Vec<RuleNode>),
    Compare { op: CmpOp, lhs: ValueNode, rhs: ValueNode },
    /// Time-of-day gate. Passes when the explicit ToD constraint carries the
    /// bit, or (absent a constraint) when the fallback items are all held or
    /// the spot's region is reachable with the bit.
    AtTod { bit: TimeOfDay, fallback: Vec<String> },
}

/// A shared, immutable compiled rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule(Rc<RuleNode>);

impl CompiledRule {
    pub fn new(node: RuleNode) -> Self {
        CompiledRule(Rc::new(node))
    }

    pub fn const_rule(value: bool) -> Self {
        CompiledRule::new(RuleNode::Const(value))
    }

    pub fn node(&self) -> &RuleNode {
        &self.0
    }

    /// Constant outcome, if folding proved one.
    pub fn as_const(&self) -> Option<bool> {
        match *self.0 {
            RuleNode::Const(value) => Some(value),
            _ => None,
        }
    }

    /// True when both handles share one tree (the memo cache hit).
    pub fn ptr_eq(a: &CompiledRule, b: &CompiledRule) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn evaluate(
        &self,
        state: &WorldState,
        reach: &mut dyn RegionReach,
        ctx: &Context,
    ) -> Result<bool, SearchError> {
        eval_node(&self.0, state, reach, ctx)
    }
}

fn eval_node(
    node: &RuleNode,
    state: &WorldState,
    reach: &mut dyn RegionReach,
    ctx: &Context,
) -> Result<bool, SearchError> {
    match node {
        RuleNode::Const(value) => Ok(*value),
        RuleNode::Has { item, count } => Ok(state.has(item, *count)),
        RuleNode::HasAnyOf(items) => Ok(state.has_any_of(items.iter().map(String::as_str))),
        RuleNode::HasAllOf(items) => Ok(state.has_all_of(items.iter().map(String::as_str))),
        RuleNode::Not(inner) => Ok(!eval_node(inner, state, reach, ctx)?),
        RuleNode::All(operands) => {
            for operand in operands {
                if !eval_node(operand, state, reach, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        RuleNode::Any(operands) => {
            for operand in operands {
                if eval_node(operand, state, reach, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        RuleNode::Compare { op, lhs, rhs } => Ok(eval_compare(*op, lhs, rhs, state, ctx)),
        RuleNode::AtTod { bit, fallback } => {
            if !ctx.tod.is_empty() {
                return Ok(ctx.tod.intersects(*bit));
            }
            if !fallback.is_empty() && state.has_all_of(fallback.iter().map(String::as_str)) {
                return Ok(true);
            }
            let (world, region) = ctx.spot.ok_or(SearchError::MissingSpot)?;
            reach.can_reach_tod(world, region, ctx.age, *bit)
        }
    }
}

/// Resolved comparison operand.
enum Resolved<'a> {
    Num(i64),
    Str(&'a str),
    Bool(bool),
    List(&'a [String]),
}

fn resolve_value<'a>(value: &'a ValueNode, state: &WorldState, ctx: &Context) -> Resolved<'a> {
    match value {
        ValueNode::Num(n) => Resolved::Num(*n),
        ValueNode::Str(s) => Resolved::Str(s),
        ValueNode::Bool(b) => Resolved::Bool(*b),
        ValueNode::List(items) => Resolved::List(items),
        ValueNode::ItemCount(item) => Resolved::Num(i64::from(state.item_count(item))),
        ValueNode::CountOf(items) => {
            Resolved::Num(i64::from(state.count_of(items.iter().map(String::as_str))))
        }
        ValueNode::Age => Resolved::Str(ctx.age.as_str()),
    }
}

/// Compare two resolved operands. Type-mismatched equality is false rather
/// than an error; ordering between non-numbers is false.
pub(crate) fn compare_values(op: CmpOp, lhs: &ValueNode, rhs: &ValueNode) -> bool {
    // Literal-only entry point used by the compiler's constant folder.
    let state = WorldState::new(0);
    let ctx = Context::new(Age::Adult);
    eval_compare(op, lhs, rhs, &state, &ctx)
}

fn eval_compare(op: CmpOp, lhs: &ValueNode, rhs: &ValueNode, state: &WorldState, ctx: &Context) -> bool {
    let lhs = resolve_value(lhs, state, ctx);
    let rhs = resolve_value(rhs, state, ctx);
    match (op, &lhs, &rhs) {
        (CmpOp::In, Resolved::Str(needle), Resolved::List(haystack)) => {
            haystack.iter().any(|entry| entry == needle)
        }
        (CmpOp::In, ..) => false,
        (_, Resolved::Num(a), Resolved::Num(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::In => false,
        },
        (CmpOp::Eq, Resolved::Str(a), Resolved::Str(b)) => a == b,
        (CmpOp::Ne, Resolved::Str(a), Resolved::Str(b)) => a != b,
        (CmpOp::Eq, Resolved::Bool(a), Resolved::Bool(b)) => a == b,
        (CmpOp::Ne, Resolved::Bool(a), Resolved::Bool(b)) => a != b,
        (CmpOp::Eq, ..) => false,
        (CmpOp::Ne, ..) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn ctx() -> Context {
        Context::new(Age::Adult)
    }

    #[test]
    fn has_nodes_query_the_inventory() {
        let mut state = WorldState::new(0);
        state.collect(&Item::new("Bow", 0, true));
        let rule = CompiledRule::new(RuleNode::Has {
            item: "Bow".into(),
            count: 1,
        });
        assert!(rule.evaluate(&state, &mut NoReach, &ctx()).unwrap());
        let rule = CompiledRule::new(RuleNode::Has {
            item: "Bow".into(),
            count: 2,
        });
        assert!(!rule.evaluate(&state, &mut NoReach, &ctx()).unwrap());
    }

    #[test]
    fn logical_nodes_short_circuit() {
        let state = WorldState::new(0);
        let rule = CompiledRule::new(RuleNode::Any(vec![
            RuleNode::Const(true),
            // Would error if evaluated: no spot context for the ToD check.
            RuleNode::AtTod {
                bit: TimeOfDay::DAY,
                fallback: vec![],
            },
        ]));
        assert!(rule.evaluate(&state, &mut NoReach, &ctx()).unwrap());
    }

    #[test]
    fn age_comparison_tracks_context() {
        let state = WorldState::new(0);
        let rule = CompiledRule::new(RuleNode::Compare {
            op: CmpOp::Eq,
            lhs: ValueNode::Age,
            rhs: ValueNode::Str("adult".into()),
        });
        assert!(rule.evaluate(&state, &mut NoReach, &Context::new(Age::Adult)).unwrap());
        assert!(!rule.evaluate(&state, &mut NoReach, &Context::new(Age::Child)).unwrap());
    }

    #[test]
    fn explicit_tod_bypasses_reach() {
        let state = WorldState::new(0);
        let rule = CompiledRule::new(RuleNode::AtTod {
            bit: TimeOfDay::DAY,
            fallback: vec![],
        });
        let day = Context::new(Age::Child).with_tod(TimeOfDay::DAY);
        let night = Context::new(Age::Child).with_tod(TimeOfDay::DAMPE);
        assert!(rule.evaluate(&state, &mut NoReach, &day).unwrap());
        assert!(!rule.evaluate(&state, &mut NoReach, &night).unwrap());
    }

    #[test]
    fn tod_fallback_items_substitute_for_reach() {
        let mut state = WorldState::new(0);
        let rule = CompiledRule::new(RuleNode::AtTod {
            bit: TimeOfDay::DAMPE,
            fallback: vec!["Ocarina".into(), "Suns Song".into()],
        });
        let ctx = Context::at(Age::Adult, 0, RegionId(0));
        assert!(!rule.evaluate(&state, &mut NoReach, &ctx).unwrap());
        state.collect(&Item::new("Ocarina", 0, true));
        state.collect(&Item::new("Suns Song", 0, true));
        assert!(rule.evaluate(&state, &mut NoReach, &ctx).unwrap());
    }

    #[test]
    fn tod_without_spot_is_an_invariant_error() {
        let state = WorldState::new(0);
        let rule = CompiledRule::new(RuleNode::AtTod {
            bit: TimeOfDay::DAY,
            fallback: vec![],
        });
        assert!(matches!(
            rule.evaluate(&state, &mut NoReach, &ctx()),
            Err(SearchError::MissingSpot)
        ));
    }

    #[test]
    fn membership_and_mismatch_comparisons() {
        let list = ValueNode::List(vec!["forest".into(), "fire".into()]);
        assert!(compare_values(CmpOp::In, &ValueNode::Str("forest".into()), &list));
        assert!(!compare_values(CmpOp::In, &ValueNode::Str("water".into()), &list));
        // Type mismatch: equality is false, inequality true.
        assert!(!compare_values(CmpOp::Eq, &ValueNode::Num(1), &ValueNode::Str("1".into())));
        assert!(compare_values(CmpOp::Ne, &ValueNode::Num(1), &ValueNode::Str("1".into())));
    }
}
