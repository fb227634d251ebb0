//! Entrances: directed, rule-bearing edges between regions.

use crate::compiler::CompiledRule;
use crate::ids::{EntranceId, RegionId};

/// A directed edge. `connected` is `None` while the edge is detached by
/// entrance shuffle; a detached edge parks in the search queue instead of
/// failing.
#[derive(Debug, Clone)]
pub struct Entrance {
    pub name: String,
    pub parent: RegionId,
    pub connected: Option<RegionId>,
    /// Declared destination name, resolved to `connected` at build time.
    pub target_name: Option<String>,
    /// Shuffle pool tag from the declaration, if any.
    pub pool: Option<String>,
    pub rule: Option<CompiledRule>,
    pub rule_text: String,
    /// Opposite direction of a two-way pair.
    pub reverse: Option<EntranceId>,
    /// For a shuffled edge: the vanilla entrance this one stands in for.
    pub replaces: Option<EntranceId>,
    /// Root-attached proxy created by `assume_reachable`.
    pub assumed: Option<EntranceId>,
    pub always: bool,
    pub never: bool,
}

impl Entrance {
    pub fn new(name: impl Into<String>, parent: RegionId) -> Self {
        Entrance {
            name: name.into(),
            parent,
            connected: None,
            target_name: None,
            pool: None,
            rule: None,
            rule_text: String::new(),
            reverse: None,
            replaces: None,
            assumed: None,
            always: false,
            never: false,
        }
    }
}
