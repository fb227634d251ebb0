//! Logic rule compiler.
//!
//! Turns rule text into [`CompiledRule`] trees. Identifiers resolve in a
//! fixed order: builtins, then aliases, then escaped item names, then world
//! properties and settings (inlined as literals), then state-query helpers,
//! and finally unresolved names become implicit events (underscores read as
//! spaces). `here(...)` / `at(...)` subrule bodies are carved out during
//! compilation and queued for a second pass that plants them as internal
//! event locations.

pub mod aliases;
pub mod rule;

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use gatelock_script::{Expr, parse_rule};
use log::debug;

pub use aliases::{Alias, AliasRegistry};
pub use rule::{Age, CompiledRule, Context, NoReach, RegionReach, RuleNode, ValueNode};

use crate::error::CompileError;
use crate::item::ItemRegistry;
use crate::region::TimeOfDay;
use crate::settings::{SettingValue, Settings};

/// Aliases may expand to other aliases; past this depth we assume a cycle.
const MAX_ALIAS_DEPTH: u32 = 32;

/// Starting time-of-day values that count as "began at night".
const NIGHT_STARTS: [&str; 4] = ["sunset", "evening", "midnight", "witching-hour"];

/// The spot whose rule is being compiled.
#[derive(Debug, Clone, Copy)]
pub struct SpotCx<'a> {
    pub name: &'a str,
    /// Name of the spot's parent region; `here(...)` targets it.
    pub region: &'a str,
    /// True for night-gated token locations.
    pub night_token: bool,
}

/// Frozen world configuration visible to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct WorldCx<'a> {
    pub settings: &'a Settings,
    pub properties: &'a Settings,
    /// When false, every time-of-day check folds to true.
    pub ensure_tod_access: bool,
    /// Items that let the player pass time at will; the fallback for
    /// day/night checks before ToD reachability is computed.
    pub time_pass_items: &'a [String],
    /// Night token locations demand the time-pass items outright.
    pub night_tokens_need_items: bool,
}

/// Compilation result: the rule plus its folded constant flags.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub rule: CompiledRule,
    pub always: bool,
    pub never: bool,
}

impl Compiled {
    fn from_rule(rule: CompiledRule) -> Self {
        let constant = rule.as_const();
        Compiled {
            always: constant == Some(true),
            never: constant == Some(false),
            rule,
        }
    }
}

/// A `here()`/`at()` body waiting for the second compilation pass.
#[derive(Debug, Clone)]
pub struct SubruleRequest {
    /// Region the subrule evaluates in.
    pub target: String,
    /// Synthetic event name the call site was rewritten to.
    pub name: String,
    pub expr: Expr,
}

pub struct RuleCompiler {
    aliases: Rc<AliasRegistry>,
    items: Rc<ItemRegistry>,
    /// Event names any compiled rule referenced.
    events: HashSet<String>,
    /// Per target region: canonical subrule text -> synthetic event name.
    replaced: HashMap<String, HashMap<String, String>>,
    delayed: VecDeque<SubruleRequest>,
    /// Memo keyed by trimmed rule text. Rules containing subrule calls are
    /// never cached, and lowering marks `spot_sensitive` when the output
    /// depended on the spot kind; those results stay out of the memo too.
    cache: HashMap<String, CompiledRule>,
    spot_sensitive: bool,
}

impl RuleCompiler {
    pub fn new(aliases: Rc<AliasRegistry>, items: Rc<ItemRegistry>) -> Self {
        RuleCompiler {
            aliases,
            items,
            events: HashSet::new(),
            replaced: HashMap::new(),
            delayed: VecDeque::new(),
            cache: HashMap::new(),
            spot_sensitive: false,
        }
    }

    /// Compile one rule string for a spot.
    pub fn compile(
        &mut self,
        text: &str,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> Result<Compiled, CompileError> {
        let trimmed = text.trim();
        // Substring test is deliberately loose; a false positive only skips
        // the memo for that rule.
        let cacheable = !trimmed.contains("here(") && !trimmed.contains("at(");
        if cacheable {
            if let Some(rule) = self.cache.get(trimmed) {
                return Ok(Compiled::from_rule(rule.clone()));
            }
        }
        let expr = parse_rule(trimmed).map_err(|e| CompileError::Syntax {
            spot: spot.name.to_string(),
            rule: trimmed.to_string(),
            message: e.to_string(),
        })?;
        self.spot_sensitive = false;
        let node = self.lower_bool(&expr, spot, world, 0)?;
        let rule = CompiledRule::new(node);
        if cacheable && !self.spot_sensitive {
            self.cache.insert(trimmed.to_string(), rule.clone());
        }
        Ok(Compiled::from_rule(rule))
    }

    /// Compile an already-parsed expression. Used by the second pass on
    /// subrule bodies; bypasses the memo.
    pub fn compile_expr(
        &mut self,
        expr: &Expr,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> Result<Compiled, CompileError> {
        let node = self.lower_bool(expr, spot, world, 0)?;
        Ok(Compiled::from_rule(CompiledRule::new(node)))
    }

    pub fn pop_delayed(&mut self) -> Option<SubruleRequest> {
        self.delayed.pop_front()
    }

    pub fn has_delayed(&self) -> bool {
        !self.delayed.is_empty()
    }

    /// Every event name rules referenced so far.
    pub fn referenced_events(&self) -> &HashSet<String> {
        &self.events
    }

    fn lower_bool(
        &mut self,
        expr: &Expr,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
        depth: u32,
    ) -> Result<RuleNode, CompileError> {
        match expr {
            Expr::Bool(value) => Ok(RuleNode::Const(*value)),
            // A bare number in boolean position is truthy iff nonzero; shows
            // up when a count-valued setting gates a rule on its own.
            Expr::Number(n) => Ok(RuleNode::Const(*n != 0)),
            Expr::Str(name) => Ok(RuleNode::Has {
                item: name.clone(),
                count: 1,
            }),
            Expr::Ident(name) => self.resolve_bool_ident(name, spot, world, depth),
            Expr::Call { name, args } => self.lower_call(name, args, spot, world, depth),
            Expr::Tuple(item, count) => self.lower_tuple(item, count, spot, world),
            Expr::Not(inner) => match self.lower_bool(inner, spot, world, depth)? {
                RuleNode::Const(value) => Ok(RuleNode::Const(!value)),
                node => Ok(RuleNode::Not(Box::new(node))),
            },
            Expr::Cmp { op, lhs, rhs } => {
                let lhs = self.lower_value(lhs, spot, world)?;
                let rhs = self.lower_value(rhs, spot, world)?;
                if value_is_literal(&lhs) && value_is_literal(&rhs) {
                    Ok(RuleNode::Const(rule::compare_values(*op, &lhs, &rhs)))
                } else {
                    Ok(RuleNode::Compare { op: *op, lhs, rhs })
                }
            }
            Expr::Any(operands) => self.lower_chain(true, operands, spot, world, depth),
            Expr::All(operands) => self.lower_chain(false, operands, spot, world, depth),
        }
    }

    /// Resolve a bare identifier in boolean position.
    fn resolve_bool_ident(
        &mut self,
        name: &str,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
        depth: u32,
    ) -> Result<RuleNode, CompileError> {
        match name {
            "at_day" => return Ok(self.lower_tod(TimeOfDay::DAY, true, spot, world)),
            "at_night" => return Ok(self.lower_tod(TimeOfDay::DAMPE, true, spot, world)),
            "at_dampe_time" => return Ok(self.lower_tod(TimeOfDay::DAMPE, false, spot, world)),
            "had_night_start" => {
                let night = world
                    .settings
                    .text("starting_tod")
                    .is_some_and(|tod| NIGHT_STARTS.contains(&tod));
                return Ok(RuleNode::Const(night));
            }
            "here" | "at" | "has" | "has_any_of" | "has_all_of" | "count_of" | "item_count" => {
                return Err(CompileError::Invalid {
                    spot: spot.name.to_string(),
                    message: format!("helper `{name}` requires arguments"),
                });
            }
            _ => {}
        }
        if let Some(alias) = self.aliases.get(name).cloned() {
            if alias.arity() != 0 {
                return Err(CompileError::Arity {
                    name: name.to_string(),
                    expected: alias.arity(),
                    got: 0,
                    spot: spot.name.to_string(),
                });
            }
            return self.lower_alias_body(name, &alias.expand(&[]), spot, world, depth);
        }
        if let Some(item) = self.items.unescape(name) {
            return Ok(RuleNode::Has {
                item: item.to_string(),
                count: 1,
            });
        }
        if let Some(value) = lookup_config(world, name) {
            return self.literal_to_bool(name, value, spot);
        }
        // Unknown name: an implicit event, underscores standing for spaces.
        let event = name.replace('_', " ");
        self.events.insert(event.clone());
        Ok(RuleNode::Has {
            item: event,
            count: 1,
        })
    }

    /// An inlined setting/property used directly as a condition.
    fn literal_to_bool(
        &self,
        name: &str,
        value: &SettingValue,
        spot: &SpotCx<'_>,
    ) -> Result<RuleNode, CompileError> {
        match value {
            SettingValue::Bool(b) => Ok(RuleNode::Const(*b)),
            SettingValue::Number(n) => Ok(RuleNode::Const(*n != 0)),
            SettingValue::Text(_) | SettingValue::List(_) => Err(CompileError::Invalid {
                spot: spot.name.to_string(),
                message: format!("setting `{name}` is not a boolean; compare it instead"),
            }),
        }
    }

    fn lower_call(
        &mut self,
        name: &str,
        args: &[Expr],
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
        depth: u32,
    ) -> Result<RuleNode, CompileError> {
        match name {
            "here" => {
                let [body] = args else {
                    return Err(CompileError::Arity {
                        name: name.to_string(),
                        expected: 1,
                        got: args.len(),
                        spot: spot.name.to_string(),
                    });
                };
                Ok(self.extract_subrule(spot.region, body))
            }
            "at" => {
                let [target, body] = args else {
                    return Err(CompileError::Arity {
                        name: name.to_string(),
                        expected: 2,
                        got: args.len(),
                        spot: spot.name.to_string(),
                    });
                };
                let Expr::Str(target) = target else {
                    return Err(CompileError::Invalid {
                        spot: spot.name.to_string(),
                        message: "at() needs a quoted region name first".into(),
                    });
                };
                Ok(self.extract_subrule(target, body))
            }
            // ToD helpers take no meaningful arguments in call form.
            "at_day" => Ok(self.lower_tod(TimeOfDay::DAY, true, spot, world)),
            "at_night" => Ok(self.lower_tod(TimeOfDay::DAMPE, true, spot, world)),
            "at_dampe_time" => Ok(self.lower_tod(TimeOfDay::DAMPE, false, spot, world)),
            "has" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(CompileError::Arity {
                        name: name.to_string(),
                        expected: 2,
                        got: args.len(),
                        spot: spot.name.to_string(),
                    });
                }
                let item = self.item_arg(&args[0], spot)?;
                let count = match args.get(1) {
                    Some(arg) => self.count_arg(arg, spot, world)?,
                    None => 1,
                };
                Ok(RuleNode::Has { item, count })
            }
            "has_any_of" | "has_all_of" => {
                let items = args
                    .iter()
                    .map(|arg| self.item_arg(arg, spot))
                    .collect::<Result<Vec<_>, _>>()?;
                if items.is_empty() {
                    return Err(CompileError::Arity {
                        name: name.to_string(),
                        expected: 1,
                        got: 0,
                        spot: spot.name.to_string(),
                    });
                }
                if name == "has_any_of" {
                    Ok(RuleNode::HasAnyOf(items))
                } else {
                    Ok(RuleNode::HasAllOf(items))
                }
            }
            "count_of" | "item_count" => Err(CompileError::Invalid {
                spot: spot.name.to_string(),
                message: format!("`{name}` yields a number; compare it against something"),
            }),
            _ => {
                let Some(alias) = self.aliases.get(name).cloned() else {
                    return Err(CompileError::Invalid {
                        spot: spot.name.to_string(),
                        message: format!("no such helper or state query `{name}`"),
                    });
                };
                if alias.arity() != args.len() {
                    return Err(CompileError::Arity {
                        name: name.to_string(),
                        expected: alias.arity(),
                        got: args.len(),
                        spot: spot.name.to_string(),
                    });
                }
                let rendered: Vec<String> = args.iter().map(Expr::to_string).collect();
                self.lower_alias_body(name, &alias.expand(&rendered), spot, world, depth)
            }
        }
    }

    fn lower_alias_body(
        &mut self,
        name: &str,
        body: &str,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
        depth: u32,
    ) -> Result<RuleNode, CompileError> {
        if depth >= MAX_ALIAS_DEPTH {
            return Err(CompileError::AliasDepth {
                name: name.to_string(),
                spot: spot.name.to_string(),
            });
        }
        let expr = parse_rule(body).map_err(|e| CompileError::Syntax {
            spot: spot.name.to_string(),
            rule: body.to_string(),
            message: format!("while expanding alias `{name}`: {e}"),
        })?;
        self.lower_bool(&expr, spot, world, depth + 1)
    }

    fn lower_tuple(
        &mut self,
        item: &Expr,
        count: &Expr,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> Result<RuleNode, CompileError> {
        let item = self.item_arg(item, spot)?;
        let count = self.count_arg(count, spot, world)?;
        Ok(RuleNode::Has { item, count })
    }

    /// An item-name argument: a quoted string, or an identifier resolved via
    /// the escaped-name index. Names unknown to the catalog are treated as
    /// events.
    fn item_arg(&mut self, expr: &Expr, spot: &SpotCx<'_>) -> Result<String, CompileError> {
        let name = match expr {
            Expr::Str(s) => s.clone(),
            Expr::Ident(name) => match self.items.unescape(name) {
                Some(item) => item.to_string(),
                None => name.replace('_', " "),
            },
            other => {
                return Err(CompileError::Invalid {
                    spot: spot.name.to_string(),
                    message: format!("`{other}` is not an item name"),
                });
            }
        };
        if !self.items.contains(&name) {
            self.events.insert(name.clone());
        }
        Ok(name)
    }

    /// A count argument: a number literal or a numeric setting/property.
    fn count_arg(
        &mut self,
        expr: &Expr,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> Result<u32, CompileError> {
        let number = match expr {
            Expr::Number(n) => *n,
            Expr::Ident(name) => match lookup_config(world, name) {
                Some(SettingValue::Number(n)) => *n,
                _ => {
                    return Err(CompileError::Invalid {
                        spot: spot.name.to_string(),
                        message: format!("`{name}` is not a numeric setting"),
                    });
                }
            },
            other => {
                return Err(CompileError::Invalid {
                    spot: spot.name.to_string(),
                    message: format!("`{other}` is not a count"),
                });
            }
        };
        u32::try_from(number).map_err(|_| CompileError::Invalid {
            spot: spot.name.to_string(),
            message: format!("count {number} out of range"),
        })
    }

    /// A comparison operand.
    fn lower_value(
        &mut self,
        expr: &Expr,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> Result<ValueNode, CompileError> {
        match expr {
            Expr::Number(n) => Ok(ValueNode::Num(*n)),
            Expr::Str(s) => Ok(ValueNode::Str(s.clone())),
            Expr::Bool(b) => Ok(ValueNode::Bool(*b)),
            Expr::Ident(name) => {
                if name == "age" {
                    return Ok(ValueNode::Age);
                }
                if let Some(value) = lookup_config(world, name) {
                    return Ok(match value {
                        SettingValue::Bool(b) => ValueNode::Bool(*b),
                        SettingValue::Number(n) => ValueNode::Num(*n),
                        SettingValue::Text(s) => ValueNode::Str(s.clone()),
                        SettingValue::List(v) => ValueNode::List(v.clone()),
                    });
                }
                if let Some(item) = self.items.unescape(name) {
                    return Ok(ValueNode::Str(item.to_string()));
                }
                // A bare word in literal position compares as its own text,
                // so `bridge == medallions` reads naturally.
                Ok(ValueNode::Str(name.clone()))
            }
            Expr::Call { name, args } => match name.as_str() {
                "item_count" => {
                    let [item] = args.as_slice() else {
                        return Err(CompileError::Arity {
                            name: name.clone(),
                            expected: 1,
                            got: args.len(),
                            spot: spot.name.to_string(),
                        });
                    };
                    Ok(ValueNode::ItemCount(self.item_arg(item, spot)?))
                }
                "count_of" => {
                    let items = args
                        .iter()
                        .map(|arg| self.item_arg(arg, spot))
                        .collect::<Result<Vec<_>, _>>()?;
                    if items.is_empty() {
                        return Err(CompileError::Arity {
                            name: name.clone(),
                            expected: 1,
                            got: 0,
                            spot: spot.name.to_string(),
                        });
                    }
                    Ok(ValueNode::CountOf(items))
                }
                _ => Err(CompileError::Invalid {
                    spot: spot.name.to_string(),
                    message: format!("`{name}(...)` cannot appear in a comparison"),
                }),
            },
            other => Err(CompileError::Invalid {
                spot: spot.name.to_string(),
                message: format!("`{other}` cannot appear in a comparison"),
            }),
        }
    }

    /// Lower an `||`/`&&` chain: fold constants, stop at a proven
    /// short-circuit, and batch plain single-item checks into one
    /// deduplicated any-of/all-of query.
    fn lower_chain(
        &mut self,
        any: bool,
        operands: &[Expr],
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
        depth: u32,
    ) -> Result<RuleNode, CompileError> {
        let short = any;
        let mut items: Vec<String> = Vec::new();
        let mut rest: Vec<RuleNode> = Vec::new();
        for operand in operands {
            let node = self.lower_bool(operand, spot, world, depth)?;
            match node {
                RuleNode::Const(value) if value == short => return Ok(RuleNode::Const(value)),
                RuleNode::Const(_) => {}
                RuleNode::Has { item, count: 1 } => {
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
                RuleNode::HasAnyOf(list) if any => {
                    for item in list {
                        if !items.contains(&item) {
                            items.push(item);
                        }
                    }
                }
                RuleNode::HasAllOf(list) if !any => {
                    for item in list {
                        if !items.contains(&item) {
                            items.push(item);
                        }
                    }
                }
                node => rest.push(node),
            }
        }
        let batched = match items.len() {
            0 => None,
            1 => items.pop().map(|item| RuleNode::Has { item, count: 1 }),
            _ if any => Some(RuleNode::HasAnyOf(items)),
            _ => Some(RuleNode::HasAllOf(items)),
        };
        let mut nodes: Vec<RuleNode> = batched.into_iter().chain(rest).collect();
        if nodes.is_empty() {
            // Every operand folded away without short-circuiting.
            Ok(RuleNode::Const(!short))
        } else if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else if any {
            Ok(RuleNode::Any(nodes))
        } else {
            Ok(RuleNode::All(nodes))
        }
    }

    /// Lower `at_day` / `at_night` / `at_dampe_time`.
    fn lower_tod(
        &mut self,
        bit: TimeOfDay,
        with_fallback: bool,
        spot: &SpotCx<'_>,
        world: &WorldCx<'_>,
    ) -> RuleNode {
        if !world.ensure_tod_access {
            return RuleNode::Const(true);
        }
        if bit == TimeOfDay::DAMPE && with_fallback && world.night_tokens_need_items {
            // The lowering now depends on the spot kind; keep the result
            // out of the text-keyed memo.
            self.spot_sensitive = true;
            if spot.night_token {
                // Token at night with the restriction on: demand the
                // time-pass items outright rather than waiting for night
                // access.
                return match world.time_pass_items {
                    [] => RuleNode::Const(true),
                    [only] => RuleNode::Has {
                        item: only.clone(),
                        count: 1,
                    },
                    items => RuleNode::HasAllOf(items.to_vec()),
                };
            }
        }
        let fallback = if with_fallback {
            world.time_pass_items.to_vec()
        } else {
            Vec::new()
        };
        RuleNode::AtTod { bit, fallback }
    }

    /// Replace a `here()`/`at()` body with a synthetic event check and queue
    /// the body for the second pass. Identical bodies aimed at the same
    /// region share one event.
    fn extract_subrule(&mut self, target: &str, body: &Expr) -> RuleNode {
        let canonical = body.to_string();
        let entry = self.replaced.entry(target.to_string()).or_default();
        if let Some(existing) = entry.get(&canonical) {
            return RuleNode::Has {
                item: existing.clone(),
                count: 1,
            };
        }
        let name = format!("{target} Subrule {}", entry.len() + 1);
        entry.insert(canonical, name.clone());
        debug!("deferred subrule `{name}` for region `{target}`");
        self.delayed.push_back(SubruleRequest {
            target: target.to_string(),
            name: name.clone(),
            expr: body.clone(),
        });
        RuleNode::Has {
            item: name,
            count: 1,
        }
    }
}

fn lookup_config<'a>(world: &WorldCx<'a>, name: &str) -> Option<&'a SettingValue> {
    world
        .properties
        .get(name)
        .or_else(|| world.settings.get(name))
}

fn value_is_literal(value: &ValueNode) -> bool {
    matches!(
        value,
        ValueNode::Num(_) | ValueNode::Str(_) | ValueNode::Bool(_) | ValueNode::List(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use crate::state::WorldState;

    struct Fixture {
        settings: Settings,
        properties: Settings,
        time_pass_items: Vec<String>,
        ensure_tod_access: bool,
        night_tokens_need_items: bool,
    }

    impl Fixture {
        fn new() -> Self {
            let mut settings = Settings::new();
            settings.set_bool("open_forest", true);
            settings.set_bool("fix_broken_drops", false);
            settings.set_number("trial_count", 3);
            settings.set_text("bridge", "medallions");
            settings.set_list("dungeon_shortcuts", ["forest"]);
            Fixture {
                settings,
                properties: Settings::new(),
                time_pass_items: vec!["Ocarina".into(), "Suns Song".into()],
                ensure_tod_access: true,
                night_tokens_need_items: false,
            }
        }

        fn cx(&self) -> WorldCx<'_> {
            WorldCx {
                settings: &self.settings,
                properties: &self.properties,
                ensure_tod_access: self.ensure_tod_access,
                time_pass_items: &self.time_pass_items,
                night_tokens_need_items: self.night_tokens_need_items,
            }
        }
    }

    fn items() -> Rc<ItemRegistry> {
        Rc::new(
            [
                ("Kokiri Sword", ItemKind::Advancement),
                ("Deku Shield", ItemKind::Advancement),
                ("Slingshot", ItemKind::Advancement),
                ("Bow", ItemKind::Advancement),
                ("Progressive Wallet", ItemKind::Advancement),
                ("Ocarina", ItemKind::Advancement),
                ("Suns Song", ItemKind::Advancement),
                ("Gerudo's Card", ItemKind::Advancement),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn aliases() -> Rc<AliasRegistry> {
        let mut registry = AliasRegistry::new();
        registry.insert("is_adult", "age == 'adult'").unwrap();
        registry
            .insert("can_shoot", "Slingshot || (is_adult && Bow)")
            .unwrap();
        registry
            .insert("can_use(item)", "item && is_adult")
            .unwrap();
        Rc::new(registry)
    }

    fn compiler() -> RuleCompiler {
        RuleCompiler::new(aliases(), items())
    }

    fn spot() -> SpotCx<'static> {
        SpotCx {
            name: "Test Location",
            region: "Test Region",
            night_token: false,
        }
    }

    fn compile(text: &str) -> Compiled {
        let fixture = Fixture::new();
        compiler()
            .compile(text, &spot(), &fixture.cx())
            .unwrap_or_else(|e| panic!("compile failed for {text:?}: {e}"))
    }

    fn eval(compiled: &Compiled, state: &WorldState) -> bool {
        let ctx = Context::at(Age::Adult, 0, crate::ids::RegionId(0));
        compiled.rule.evaluate(state, &mut NoReach, &ctx).unwrap()
    }

    #[test]
    fn escaped_item_name_becomes_has() {
        let compiled = compile("Kokiri_Sword");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Kokiri Sword".into(),
                count: 1,
            }
        );
    }

    #[test]
    fn tuple_is_has_with_count() {
        let compiled = compile("(Progressive_Wallet, 2)");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Progressive Wallet".into(),
                count: 2,
            }
        );
    }

    #[test]
    fn tuple_count_from_setting() {
        let compiled = compile("(Kokiri_Sword, trial_count)");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Kokiri Sword".into(),
                count: 3,
            }
        );
    }

    #[test]
    fn settings_inline_as_constants() {
        assert!(compile("open_forest").always);
        assert!(compile("fix_broken_drops").never);
    }

    #[test]
    fn folding_propagates_short_circuits() {
        assert!(compile("open_forest || Kokiri_Sword").always);
        assert!(compile("fix_broken_drops && Kokiri_Sword").never);
        // Neutral constants fold away entirely.
        let compiled = compile("open_forest && Kokiri_Sword");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Kokiri Sword".into(),
                count: 1,
            }
        );
    }

    #[test]
    fn comparisons_of_literals_fold() {
        assert!(compile("bridge == 'medallions'").always);
        assert!(compile("bridge == 'stones'").never);
        assert!(compile("'forest' in dungeon_shortcuts").always);
        assert!(compile("'fire' in dungeon_shortcuts").never);
        assert!(compile("trial_count >= 2").always);
    }

    #[test]
    fn bare_word_compares_as_text() {
        assert!(compile("bridge == medallions").always);
    }

    #[test]
    fn age_comparison_stays_runtime() {
        let compiled = compile("age == 'adult'");
        let state = WorldState::new(0);
        assert!(!compiled.always && !compiled.never);
        assert!(eval(&compiled, &state));
    }

    #[test]
    fn alias_chain_expands() {
        let compiled = compile("can_shoot");
        let mut state = WorldState::new(0);
        assert!(!eval(&compiled, &state));
        state.collect(&crate::item::Item::new("Bow", 0, true));
        assert!(eval(&compiled, &state));
    }

    #[test]
    fn parameterized_alias_binds_arguments() {
        let compiled = compile("can_use(Bow)");
        let mut state = WorldState::new(0);
        state.collect(&crate::item::Item::new("Bow", 0, true));
        assert!(eval(&compiled, &state));
    }

    #[test]
    fn alias_arity_mismatch_is_an_error() {
        let fixture = Fixture::new();
        let err = compiler()
            .compile("can_use(Bow, Slingshot)", &spot(), &fixture.cx())
            .unwrap_err();
        assert!(matches!(err, CompileError::Arity { .. }));
    }

    #[test]
    fn alias_cycle_is_caught() {
        let mut registry = AliasRegistry::new();
        registry.insert("loop_a", "loop_b").unwrap();
        registry.insert("loop_b", "loop_a").unwrap();
        let mut compiler = RuleCompiler::new(Rc::new(registry), items());
        let fixture = Fixture::new();
        let err = compiler.compile("loop_a", &spot(), &fixture.cx()).unwrap_err();
        assert!(matches!(err, CompileError::AliasDepth { .. }));
    }

    #[test]
    fn logical_chains_batch_and_dedup() {
        let compiled = compile("Kokiri_Sword || Slingshot || Bow || Slingshot");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::HasAnyOf(vec![
                "Kokiri Sword".into(),
                "Slingshot".into(),
                "Bow".into(),
            ])
        );
        let compiled = compile("Kokiri_Sword && Deku_Shield");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::HasAllOf(vec!["Kokiri Sword".into(), "Deku Shield".into()])
        );
    }

    #[test]
    fn mixed_chain_keeps_non_item_operands() {
        let compiled = compile("Kokiri_Sword && Deku_Shield && age == 'adult'");
        match compiled.rule.node() {
            RuleNode::All(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert!(matches!(nodes[0], RuleNode::HasAllOf(_)));
                assert!(matches!(nodes[1], RuleNode::Compare { .. }));
            }
            other => panic!("expected All, got {other:?}"),
        }
    }

    #[test]
    fn unknown_identifier_becomes_event() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        let compiled = compiler
            .compile("Showed_Mido_Sword_and_Shield", &spot(), &fixture.cx())
            .unwrap();
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Showed Mido Sword and Shield".into(),
                count: 1,
            }
        );
        assert!(compiler
            .referenced_events()
            .contains("Showed Mido Sword and Shield"));
    }

    #[test]
    fn memo_returns_shared_tree() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        let first = compiler
            .compile("Kokiri_Sword || Slingshot", &spot(), &fixture.cx())
            .unwrap();
        let other_spot = SpotCx {
            name: "Another Location",
            region: "Elsewhere",
            night_token: false,
        };
        let second = compiler
            .compile("Kokiri_Sword || Slingshot", &other_spot, &fixture.cx())
            .unwrap();
        assert!(CompiledRule::ptr_eq(&first.rule, &second.rule));
    }

    #[test]
    fn subrule_calls_bypass_the_memo() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        let first = compiler
            .compile("here(Kokiri_Sword)", &spot(), &fixture.cx())
            .unwrap();
        let other_spot = SpotCx {
            name: "Another Location",
            region: "Elsewhere",
            night_token: false,
        };
        let second = compiler
            .compile("here(Kokiri_Sword)", &other_spot, &fixture.cx())
            .unwrap();
        assert!(!CompiledRule::ptr_eq(&first.rule, &second.rule));
    }

    #[test]
    fn here_defers_a_subrule() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        let compiled = compiler
            .compile("here(Kokiri_Sword && Deku_Shield)", &spot(), &fixture.cx())
            .unwrap();
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Test Region Subrule 1".into(),
                count: 1,
            }
        );
        let request = compiler.pop_delayed().expect("queued subrule");
        assert_eq!(request.target, "Test Region");
        assert_eq!(request.name, "Test Region Subrule 1");
    }

    #[test]
    fn identical_subrules_share_one_event() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        compiler
            .compile("here(Slingshot)", &spot(), &fixture.cx())
            .unwrap();
        compiler
            .compile("here(Slingshot)", &spot(), &fixture.cx())
            .unwrap();
        compiler
            .compile("here(Bow)", &spot(), &fixture.cx())
            .unwrap();
        assert!(compiler.pop_delayed().is_some_and(|r| r.name == "Test Region Subrule 1"));
        assert!(compiler.pop_delayed().is_some_and(|r| r.name == "Test Region Subrule 2"));
        assert!(compiler.pop_delayed().is_none());
    }

    #[test]
    fn at_targets_a_named_region() {
        let fixture = Fixture::new();
        let mut compiler = compiler();
        compiler
            .compile("at('Castle Grounds', Kokiri_Sword)", &spot(), &fixture.cx())
            .unwrap();
        let request = compiler.pop_delayed().expect("queued subrule");
        assert_eq!(request.target, "Castle Grounds");
        assert_eq!(request.name, "Castle Grounds Subrule 1");
    }

    #[test]
    fn tod_checks_lower_to_gates() {
        let compiled = compile("at_day");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::AtTod {
                bit: TimeOfDay::DAY,
                fallback: vec!["Ocarina".into(), "Suns Song".into()],
            }
        );
        let compiled = compile("at_dampe_time");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::AtTod {
                bit: TimeOfDay::DAMPE,
                fallback: vec![],
            }
        );
    }

    #[test]
    fn tod_disabled_folds_to_true() {
        let mut fixture = Fixture::new();
        fixture.ensure_tod_access = false;
        let compiled = compiler()
            .compile("at_night", &spot(), &fixture.cx())
            .unwrap();
        assert!(compiled.always);
    }

    #[test]
    fn night_token_restriction_demands_time_pass_items() {
        let mut fixture = Fixture::new();
        fixture.night_tokens_need_items = true;
        let token_spot = SpotCx {
            name: "Tree Token",
            region: "Test Region",
            night_token: true,
        };
        let compiled = compiler()
            .compile("at_night", &token_spot, &fixture.cx())
            .unwrap();
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::HasAllOf(vec!["Ocarina".into(), "Suns Song".into()])
        );
        // Non-token spots keep the normal gate.
        let compiled = compiler()
            .compile("at_night", &spot(), &fixture.cx())
            .unwrap();
        assert!(matches!(*compiled.rule.node(), RuleNode::AtTod { .. }));
    }

    #[test]
    fn night_token_rules_are_not_shared_through_the_memo() {
        let mut fixture = Fixture::new();
        fixture.night_tokens_need_items = true;
        let token_spot = SpotCx {
            name: "Tree Token",
            region: "Test Region",
            night_token: true,
        };
        // One compiler for both spot kinds: the chest's lowering must not
        // be served to the token, nor the token's to a later chest.
        let mut compiler = compiler();
        let chest = compiler.compile("at_night", &spot(), &fixture.cx()).unwrap();
        assert!(matches!(*chest.rule.node(), RuleNode::AtTod { .. }));
        let token = compiler
            .compile("at_night", &token_spot, &fixture.cx())
            .unwrap();
        assert_eq!(
            *token.rule.node(),
            RuleNode::HasAllOf(vec!["Ocarina".into(), "Suns Song".into()])
        );
        let chest_again = compiler.compile("at_night", &spot(), &fixture.cx()).unwrap();
        assert!(matches!(*chest_again.rule.node(), RuleNode::AtTod { .. }));
    }

    #[test]
    fn had_night_start_folds_from_settings() {
        let mut fixture = Fixture::new();
        fixture.settings.set_text("starting_tod", "midnight");
        assert!(
            compiler()
                .compile("had_night_start", &spot(), &fixture.cx())
                .unwrap()
                .always
        );
        fixture.settings.set_text("starting_tod", "morning");
        assert!(
            compiler()
                .compile("had_night_start", &spot(), &fixture.cx())
                .unwrap()
                .never
        );
    }

    #[test]
    fn helper_without_arguments_is_rejected() {
        let fixture = Fixture::new();
        let err = compiler().compile("has", &spot(), &fixture.cx()).unwrap_err();
        assert!(matches!(err, CompileError::Invalid { .. }));
    }

    #[test]
    fn unknown_helper_is_rejected() {
        let fixture = Fixture::new();
        let err = compiler()
            .compile("summon_dragon(Bow)", &spot(), &fixture.cx())
            .unwrap_err();
        assert!(matches!(err, CompileError::Invalid { .. }));
    }

    #[test]
    fn syntax_errors_name_the_spot() {
        let fixture = Fixture::new();
        let err = compiler()
            .compile("Sword &&", &spot(), &fixture.cx())
            .unwrap_err();
        match err {
            CompileError::Syntax { spot, .. } => assert_eq!(spot, "Test Location"),
            other => panic!("expected syntax error, got {other}"),
        }
    }

    #[test]
    fn item_count_comparison() {
        let compiled = compile("item_count(Bow) >= 2");
        let mut state = WorldState::new(0);
        state.collect(&crate::item::Item::new("Bow", 0, true));
        assert!(!eval(&compiled, &state));
        state.collect(&crate::item::Item::new("Bow", 0, true));
        assert!(eval(&compiled, &state));
    }

    #[test]
    fn string_literal_in_boolean_position_is_a_has() {
        let compiled = compile("'Kokiri Sword'");
        assert_eq!(
            *compiled.rule.node(),
            RuleNode::Has {
                item: "Kokiri Sword".into(),
                count: 1,
            }
        );
    }
}
