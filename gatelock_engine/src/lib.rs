//! Gatelock Engine — logic-rule compilation and reachability search for
//! randomized world graphs.
//!
//! A world is a graph of regions joined by rule-bearing entrances, with
//! item-bearing locations hanging off the regions. Rules are authored in the
//! Gatelock DSL (see `gatelock_script`), compiled once per world against its
//! frozen settings, and evaluated millions of times during fill. The
//! [`Search`] type answers the questions fill and spoiler generation ask:
//! what is reachable with this inventory, in what sphere order, and at what
//! time of day.
//!
//! Typical use: build an [`ItemRegistry`] and [`AliasRegistry`], feed region
//! declarations through a [`WorldBuilder`], then drive a [`Search`] over the
//! finished worlds.

pub mod compiler;
pub mod entrance;
pub mod error;
pub mod ids;
pub mod item;
pub mod location;
pub mod region;
pub mod search;
pub mod settings;
pub mod state;
pub mod world;

pub use compiler::{
    Age, AliasRegistry, Compiled, CompiledRule, Context, NoReach, RegionReach, RuleCompiler,
    RuleNode, SpotCx, ValueNode, WorldCx,
};
pub use entrance::Entrance;
pub use error::{BuildError, CompileError, GraphError, SearchError};
pub use ids::{EntranceId, LocationId, RegionId, Spot, WorldId};
pub use item::{Item, ItemInfo, ItemKind, ItemRegistry, escape_name};
pub use location::{Location, LocationType, SPHERE_UNREACHED};
pub use region::{Region, RegionType, TimeOfDay};
pub use search::{ReachableLocations, Search};
pub use settings::{SettingValue, Settings};
pub use state::WorldState;
pub use world::{
    EventDef, ExitDef, LocationDef, ROOT_EXITS_REGION, ROOT_REGION, RegionDef, World, WorldBuilder,
};
