//! Arena handles for graph nodes.
//!
//! Regions, entrances, and locations live in per-world arenas on [`crate::World`];
//! these ids index into them. An id is only meaningful paired with the world
//! that produced it.

/// Index of a world within a multiworld batch.
pub type WorldId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntranceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(pub(crate) usize);

/// Either kind of rule-bearing spot on the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spot {
    Entrance(EntranceId),
    Location(LocationId),
}
