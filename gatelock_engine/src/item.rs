//! Item catalog and per-world item instances.

use std::collections::HashMap;

use crate::ids::WorldId;

/// Broad classification used by fill and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Can gate progression; tracked by the search inventory.
    Advancement,
    /// Must be placed but never gates anything.
    Priority,
    /// Pure filler.
    Junk,
}

/// Static facts about one item name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    pub kind: ItemKind,
}

impl ItemInfo {
    pub fn advancement(&self) -> bool {
        self.kind == ItemKind::Advancement
    }
}

/// Catalog of every real (non-event) item name, with a side index from
/// rule-safe escaped names back to the display name.
#[derive(Debug, Default, Clone)]
pub struct ItemRegistry {
    items: HashMap<String, ItemInfo>,
    escaped: HashMap<String, String>,
}

/// Rewrite an item name into the identifier form rule text uses: whitespace
/// becomes `_`, and `' ( ) [ ] -` are dropped.
pub fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_whitespace() {
            escaped.push('_');
        } else if !matches!(ch, '\'' | '(' | ')' | '[' | ']' | '-') {
            escaped.push(ch);
        }
    }
    escaped
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, kind: ItemKind) {
        let name = name.into();
        self.escaped.insert(escape_name(&name), name.clone());
        self.items.insert(name, ItemInfo { kind });
    }

    pub fn get(&self, name: &str) -> Option<&ItemInfo> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Resolve a rule identifier to the item name it escapes, if any.
    pub fn unescape(&self, escaped: &str) -> Option<&str> {
        self.escaped.get(escaped).map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, ItemKind)> for ItemRegistry {
    fn from_iter<T: IntoIterator<Item = (K, ItemKind)>>(iter: T) -> Self {
        let mut registry = ItemRegistry::new();
        for (name, kind) in iter {
            registry.register(name, kind);
        }
        registry
    }
}

/// One placeable item instance, bound to the world whose logic it counts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub world: WorldId,
    pub advancement: bool,
    /// Synthetic token produced by an event location, never placed by fill.
    pub event: bool,
}

impl Item {
    pub fn new(name: impl Into<String>, world: WorldId, advancement: bool) -> Self {
        Item {
            name: name.into(),
            world,
            advancement,
            event: false,
        }
    }

    pub fn event(name: impl Into<String>, world: WorldId) -> Self {
        Item {
            name: name.into(),
            world,
            advancement: true,
            event: true,
        }
    }
}
