//! Error taxonomy for rule compilation, graph surgery, and search.

use thiserror::Error;

/// Raised while turning rule text into an executable predicate.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error in rule for `{spot}`: {message} (rule: {rule})")]
    Syntax {
        spot: String,
        rule: String,
        message: String,
    },
    #[error("helper `{name}` expects {expected} argument(s), got {got} (at `{spot}`)")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
        spot: String,
    },
    #[error("invalid rule for `{spot}`: {message}")]
    Invalid { spot: String, message: String },
    #[error("alias expansion too deep at `{name}` (at `{spot}`); alias cycle?")]
    AliasDepth { name: String, spot: String },
    #[error("rules reference events that nothing produces: {0:?}")]
    UnresolvedEvents(Vec<String>),
}

/// Raised by graph lookups and surgery on malformed input.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no region named `{0}`")]
    UnknownRegion(String),
    #[error("no entrance named `{0}`")]
    UnknownEntrance(String),
    #[error("no location named `{0}`")]
    UnknownLocation(String),
    #[error("entrance `{0}` is already disconnected")]
    AlreadyDisconnected(String),
    #[error("entrance `{entrance}` missing from entrance list of `{region}`")]
    NotInEntranceList { entrance: String, region: String },
    #[error("location `{0}` already holds an item")]
    LocationOccupied(String),
    #[error("world {0} has no Root region")]
    MissingRoot(usize),
    #[error("bad region declaration: {0}")]
    Declaration(String),
}

/// Internal invariant violations surfaced during search. These indicate a
/// bug in world construction, not an unbeatable seed.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("spot `{0}` reached search with no compiled rule")]
    MissingRule(String),
    #[error("time-of-day check evaluated without a spot context")]
    MissingSpot,
    #[error("subrule `{0}` resolved twice; cyclic here()/at() chain?")]
    SubruleCycle(String),
}

/// Anything that can go wrong while building a world from declarations.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("bad region declaration json: {0}")]
    Json(#[from] serde_json::Error),
}
