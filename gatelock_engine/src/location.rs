//! Locations: item placement points attached to regions.

use serde::Deserialize;

use crate::compiler::CompiledRule;
use crate::ids::RegionId;
use crate::item::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    #[default]
    Chest,
    Event,
    Shop,
    Drop,
    /// Night-gated collectible; subject to the no-night-tokens setting.
    Token,
}

/// Sphere value for a location no sweep has collected yet.
pub const SPHERE_UNREACHED: i32 = -1;

#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub parent: RegionId,
    pub kind: LocationType,
    pub rule: Option<CompiledRule>,
    pub rule_text: String,
    pub item: Option<Item>,
    /// Event locations synthesized at build time; never filled.
    pub internal: bool,
    /// Item is fixed and must not be moved by fill.
    pub locked: bool,
    pub always: bool,
    pub never: bool,
    /// Sphere index assigned by `collect_spheres`; -1 for pseudo-starting
    /// items and anything not yet collected.
    pub sphere: i32,
}

impl Location {
    pub fn new(name: impl Into<String>, parent: RegionId, kind: LocationType) -> Self {
        Location {
            name: name.into(),
            parent,
            kind,
            rule: None,
            rule_text: String::new(),
            item: None,
            internal: false,
            locked: false,
            always: false,
            never: false,
            sphere: SPHERE_UNREACHED,
        }
    }

    pub fn holds_advancement(&self) -> bool {
        self.item.as_ref().is_some_and(|item| item.advancement)
    }
}
