//! Per-world search inventory.

use std::collections::HashMap;

use crate::ids::WorldId;
use crate::item::Item;

/// Multiset of collected advancement items (events included) for one world.
/// Junk never lands here, so rules only ever see progression.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub world: WorldId,
    prog_items: HashMap<String, u32>,
}

impl WorldState {
    pub fn new(world: WorldId) -> Self {
        WorldState {
            world,
            prog_items: HashMap::new(),
        }
    }

    pub fn has(&self, item: &str, count: u32) -> bool {
        self.item_count(item) >= count
    }

    pub fn has_any_of<'a, I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        items.into_iter().any(|item| self.has(item, 1))
    }

    pub fn has_all_of<'a, I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        items.into_iter().all(|item| self.has(item, 1))
    }

    /// Total copies held across the given names.
    pub fn count_of<'a, I>(&self, items: I) -> u32
    where
        I: IntoIterator<Item = &'a str>,
    {
        items.into_iter().map(|item| self.item_count(item)).sum()
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.prog_items.get(item).copied().unwrap_or(0)
    }

    /// Add one copy. Non-advancement items are ignored; rules cannot see them.
    pub fn collect(&mut self, item: &Item) {
        if item.advancement {
            *self.prog_items.entry(item.name.clone()).or_insert(0) += 1;
        }
    }

    /// Remove one copy, dropping the entry at zero.
    pub fn remove(&mut self, item: &Item) {
        if let Some(count) = self.prog_items.get_mut(&item.name) {
            *count -= 1;
            if *count == 0 {
                self.prog_items.remove(&item.name);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prog_items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> Item {
        Item::new(name, 0, true)
    }

    #[test]
    fn collect_counts_duplicates() {
        let mut state = WorldState::new(0);
        state.collect(&item("Progressive Wallet"));
        state.collect(&item("Progressive Wallet"));
        assert!(state.has("Progressive Wallet", 2));
        assert!(!state.has("Progressive Wallet", 3));
        assert_eq!(state.item_count("Progressive Wallet"), 2);
    }

    #[test]
    fn junk_is_invisible() {
        let mut state = WorldState::new(0);
        state.collect(&Item::new("Heart Container", 0, false));
        assert!(!state.has("Heart Container", 1));
        assert!(state.is_empty());
    }

    #[test]
    fn any_and_all_semantics() {
        let mut state = WorldState::new(0);
        state.collect(&item("Bow"));
        assert!(state.has_any_of(["Bow", "Slingshot"]));
        assert!(!state.has_all_of(["Bow", "Slingshot"]));
        state.collect(&item("Slingshot"));
        assert!(state.has_all_of(["Bow", "Slingshot"]));
        // Vacuous cases.
        assert!(!state.has_any_of(std::iter::empty::<&str>()));
        assert!(state.has_all_of(std::iter::empty::<&str>()));
    }

    #[test]
    fn count_of_sums_across_names() {
        let mut state = WorldState::new(0);
        state.collect(&item("Fire Medallion"));
        state.collect(&item("Water Medallion"));
        state.collect(&item("Water Medallion"));
        assert_eq!(state.count_of(["Fire Medallion", "Water Medallion"]), 3);
    }

    #[test]
    fn remove_undoes_collect() {
        let mut state = WorldState::new(0);
        let sword = item("Kokiri Sword");
        state.collect(&sword);
        state.collect(&sword);
        state.remove(&sword);
        assert!(state.has("Kokiri Sword", 1));
        state.remove(&sword);
        assert!(state.is_empty());
        // Removing what we never had is a no-op.
        state.remove(&sword);
        assert!(state.is_empty());
    }
}
