//! Regions: the nodes of the traversal graph.

use bitflags::bitflags;
use serde::Deserialize;

use crate::ids::{EntranceId, LocationId};

bitflags! {
    /// Time-of-day bitmask. Empty means "no particular time".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TimeOfDay: u8 {
        const DAY = 1;
        const DAMPE = 2;
        const ALL = Self::DAY.bits() | Self::DAMPE.bits();
    }
}

impl TimeOfDay {
    /// Parse a declaration value like `"day"`, `"dampe"`, or `"all"`.
    pub fn parse_name(name: &str) -> Option<TimeOfDay> {
        match name.to_ascii_lowercase().as_str() {
            "day" => Some(TimeOfDay::DAY),
            "dampe" | "night" => Some(TimeOfDay::DAMPE),
            "all" => Some(TimeOfDay::ALL),
            "none" => Some(TimeOfDay::empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    #[default]
    Overworld,
    Interior,
    Dungeon,
    Grotto,
}

/// One graph node. Exits, entrances, and locations are arena ids into the
/// owning world.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub kind: RegionType,
    pub dungeon: Option<String>,
    pub hint_name: Option<String>,
    /// Time-of-day bits this region feeds back to Root when reached.
    pub provides_time: TimeOfDay,
    pub exits: Vec<EntranceId>,
    pub entrances: Vec<EntranceId>,
    pub locations: Vec<LocationId>,
}

impl Region {
    pub fn new(name: impl Into<String>, kind: RegionType) -> Self {
        Region {
            name: name.into(),
            kind,
            dungeon: None,
            hint_name: None,
            provides_time: TimeOfDay::empty(),
            exits: Vec::new(),
            entrances: Vec::new(),
            locations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tod_names() {
        assert_eq!(TimeOfDay::parse_name("day"), Some(TimeOfDay::DAY));
        assert_eq!(TimeOfDay::parse_name("DAMPE"), Some(TimeOfDay::DAMPE));
        assert_eq!(TimeOfDay::parse_name("all"), Some(TimeOfDay::ALL));
        assert_eq!(TimeOfDay::parse_name("dusk"), None);
    }

    #[test]
    fn all_covers_every_bit() {
        assert!(TimeOfDay::ALL.contains(TimeOfDay::DAY | TimeOfDay::DAMPE));
    }
}
