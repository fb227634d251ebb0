//! Sphere-based reachability search.
//!
//! A [`Search`] owns the worlds and one inventory per world. Region
//! discovery is monotone: each `next_sphere` pass drains a shared entrance
//! stack, parking edges whose rules fail for retry once the inventory grows.
//! Time-of-day access is tracked per (world, age, region) and computed
//! lazily when a rule first asks for a bit.

use std::collections::{HashMap, HashSet};
use std::mem;

use log::debug;

use crate::compiler::{Age, CompiledRule, Context, RegionReach};
use crate::error::{GraphError, SearchError};
use crate::ids::{EntranceId, LocationId, RegionId, Spot, WorldId};
use crate::item::Item;
use crate::location::SPHERE_UNREACHED;
use crate::region::TimeOfDay;
use crate::state::WorldState;
use crate::world::World;

/// Frontier and visited bookkeeping for one age.
#[derive(Debug, Default)]
struct AgeCache {
    /// Entrances whose rules have not passed yet, across all worlds.
    queue: Vec<(WorldId, EntranceId)>,
    /// Per world: regions reached.
    visited: Vec<HashSet<RegionId>>,
    /// Per world: time-of-day bits available in each reached region.
    tod: Vec<HashMap<RegionId, TimeOfDay>>,
}

impl AgeCache {
    fn new(worlds: usize) -> Self {
        AgeCache {
            queue: Vec::new(),
            visited: vec![HashSet::new(); worlds],
            tod: vec![HashMap::new(); worlds],
        }
    }
}

/// Disjoint view over a search used while a rule is being evaluated: shared
/// worlds and inventories, mutable ToD caches. Lets a rule's time-of-day
/// check recursively prove region access without aliasing the inventory it
/// is reading.
struct ReachView<'a> {
    worlds: &'a [World],
    states: &'a [WorldState],
    child: &'a mut AgeCache,
    adult: &'a mut AgeCache,
}

impl ReachView<'_> {
    fn cache_mut(&mut self, age: Age) -> &mut AgeCache {
        match age {
            Age::Child => &mut *self.child,
            Age::Adult => &mut *self.adult,
        }
    }

    fn can_reach(
        &mut self,
        world: WorldId,
        region: RegionId,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        let cache = self.cache_mut(age);
        if !cache.visited[world].contains(&region) {
            return Ok(false);
        }
        if tod.is_empty() {
            return Ok(true);
        }
        let have = cache.tod[world]
            .get(&region)
            .copied()
            .unwrap_or(TimeOfDay::empty());
        if have.contains(tod) {
            return Ok(true);
        }
        self.expand_tod(world, region, age, tod)
    }

    /// Flood the requested ToD bit outward from every visited region that
    /// already has it, re-running entrance rules under the ToD constraint.
    /// Only visited regions participate; discovery stays with the sphere
    /// pass.
    fn expand_tod(
        &mut self,
        world: WorldId,
        goal: RegionId,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        let worlds = self.worlds;
        let states = self.states;
        let mut queue: Vec<EntranceId> = {
            let cache = self.cache_mut(age);
            let tods = &cache.tod[world];
            cache.visited[world]
                .iter()
                .filter(|region| {
                    tods.get(region)
                        .copied()
                        .unwrap_or(TimeOfDay::empty())
                        .intersects(tod)
                })
                .flat_map(|region| worlds[world].region(*region).exits.iter().copied())
                .collect()
        };
        let mut index = 0;
        while index < queue.len() {
            let id = queue[index];
            index += 1;
            let entrance = worlds[world].entrance(id);
            let Some(target) = entrance.connected else {
                continue;
            };
            let current = {
                let cache = self.cache_mut(age);
                if !cache.visited[world].contains(&target) {
                    continue;
                }
                let current = cache.tod[world]
                    .get(&target)
                    .copied()
                    .unwrap_or(TimeOfDay::empty());
                if current.contains(tod) {
                    continue;
                }
                current
            };
            let rule = entrance
                .rule
                .clone()
                .ok_or_else(|| SearchError::MissingRule(entrance.name.clone()))?;
            let ctx = Context::at(age, world, entrance.parent).with_tod(tod);
            if rule.evaluate(&states[world], self, &ctx)? {
                self.cache_mut(age).tod[world].insert(target, current | tod);
                if target == goal {
                    return Ok(true);
                }
                queue.extend(worlds[world].region(target).exits.iter().copied());
            }
        }
        Ok(false)
    }
}

impl RegionReach for ReachView<'_> {
    fn can_reach_tod(
        &mut self,
        world: WorldId,
        region: RegionId,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        self.can_reach(world, region, age, tod)
    }
}

pub struct Search {
    worlds: Vec<World>,
    states: Vec<WorldState>,
    roots: Vec<RegionId>,
    child: AgeCache,
    adult: AgeCache,
    visited_locations: Vec<HashSet<LocationId>>,
    spheres: Vec<Vec<(WorldId, LocationId)>>,
}

impl Search {
    /// Seed a search: each world's Root is visited for both ages and its
    /// exits form the initial frontier.
    pub fn new(worlds: Vec<World>) -> Result<Self, GraphError> {
        let mut roots = Vec::with_capacity(worlds.len());
        for world in &worlds {
            roots.push(world.root()?);
        }
        let count = worlds.len();
        let mut child = AgeCache::new(count);
        let mut adult = AgeCache::new(count);
        for (index, world) in worlds.iter().enumerate() {
            let root = roots[index];
            for cache in [&mut child, &mut adult] {
                cache.visited[index].insert(root);
                cache.tod[index].insert(root, TimeOfDay::empty());
                cache
                    .queue
                    .extend(world.region(root).exits.iter().map(|e| (index, *e)));
            }
        }
        Ok(Search {
            states: (0..count).map(WorldState::new).collect(),
            visited_locations: vec![HashSet::new(); count],
            spheres: Vec::new(),
            worlds,
            roots,
            child,
            adult,
        })
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn world(&self, id: WorldId) -> &World {
        &self.worlds[id]
    }

    pub fn world_mut(&mut self, id: WorldId) -> &mut World {
        &mut self.worlds[id]
    }

    pub fn into_worlds(self) -> Vec<World> {
        self.worlds
    }

    pub fn state(&self, world: WorldId) -> &WorldState {
        &self.states[world]
    }

    /// Add an item to the inventory of the world it counts for.
    pub fn collect(&mut self, item: &Item) {
        self.states[item.world].collect(item);
    }

    pub fn collect_all<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Item>,
    {
        for item in items {
            self.collect(item);
        }
    }

    /// Remove one copy. Regions already discovered stay discovered; start a
    /// fresh search to re-derive reachability from the smaller inventory.
    pub fn uncollect(&mut self, item: &Item) {
        self.states[item.world].remove(item);
    }

    fn cache(&self, age: Age) -> &AgeCache {
        match age {
            Age::Child => &self.child,
            Age::Adult => &self.adult,
        }
    }

    fn cache_mut(&mut self, age: Age) -> &mut AgeCache {
        match age {
            Age::Child => &mut self.child,
            Age::Adult => &mut self.adult,
        }
    }

    /// Evaluate a compiled rule against one world's inventory, letting its
    /// ToD checks consult and extend the ToD caches.
    fn eval(
        &mut self,
        world: WorldId,
        rule: &CompiledRule,
        ctx: &Context,
    ) -> Result<bool, SearchError> {
        let states = &self.states;
        let mut view = ReachView {
            worlds: &self.worlds,
            states,
            child: &mut self.child,
            adult: &mut self.adult,
        };
        rule.evaluate(&states[world], &mut view, ctx)
    }

    /// One expansion pass for both ages, adult first.
    pub fn next_sphere(&mut self) -> Result<(), SearchError> {
        self.expand_age(Age::Adult)?;
        self.expand_age(Age::Child)
    }

    fn expand_age(&mut self, age: Age) -> Result<(), SearchError> {
        let mut stack = mem::take(&mut self.cache_mut(age).queue);
        let mut failed: Vec<(WorldId, EntranceId)> = Vec::new();
        while let Some((world, id)) = stack.pop() {
            let (target, rule, ctx) = {
                let entrance = self.worlds[world].entrance(id);
                let Some(target) = entrance.connected else {
                    // Detached by shuffle; park until something reconnects it.
                    failed.push((world, id));
                    continue;
                };
                if self.cache(age).visited[world].contains(&target) {
                    continue;
                }
                let rule = entrance
                    .rule
                    .clone()
                    .ok_or_else(|| SearchError::MissingRule(entrance.name.clone()))?;
                (target, rule, Context::at(age, world, entrance.parent))
            };
            if self.eval(world, &rule, &ctx)? {
                let provides = self.worlds[world].region(target).provides_time;
                let root = self.roots[world];
                let cache = self.cache_mut(age);
                cache.visited[world].insert(target);
                *cache.tod[world].entry(target).or_insert(TimeOfDay::empty()) |= provides;
                if !provides.is_empty() {
                    let root_tod = cache.tod[world]
                        .get(&root)
                        .copied()
                        .unwrap_or(TimeOfDay::empty());
                    if !root_tod.contains(provides) {
                        // New time bits reach everything via Root: retry this
                        // world's failed entrances within the same pass.
                        cache.tod[world].insert(root, root_tod | provides);
                        let mut kept = Vec::with_capacity(failed.len());
                        for parked in failed.drain(..) {
                            if parked.0 == world {
                                stack.push(parked);
                            } else {
                                kept.push(parked);
                            }
                        }
                        failed = kept;
                    }
                }
                stack.extend(
                    self.worlds[world]
                        .region(target)
                        .exits
                        .iter()
                        .map(|e| (world, *e)),
                );
            } else {
                failed.push((world, id));
            }
        }
        self.cache_mut(age).queue = failed;
        Ok(())
    }

    /// Is `region` reachable for `age`, optionally at a given time of day?
    /// Pass `TimeOfDay::empty()` for "any time".
    pub fn can_reach(
        &mut self,
        world: WorldId,
        region: RegionId,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        let states = &self.states;
        let mut view = ReachView {
            worlds: &self.worlds,
            states,
            child: &mut self.child,
            adult: &mut self.adult,
        };
        view.can_reach(world, region, age, tod)
    }

    /// Region already discovered for this age? Never triggers expansion.
    pub fn reached_region(&self, world: WorldId, region: RegionId, age: Age) -> bool {
        self.cache(age).visited[world].contains(&region)
    }

    /// Evaluate one spot's rule under an explicit age and ToD constraint.
    /// Does not check that the spot's region has been reached.
    pub fn spot_access(
        &mut self,
        world: WorldId,
        spot: Spot,
        age: Age,
        tod: TimeOfDay,
    ) -> Result<bool, SearchError> {
        let (parent, rule) = match spot {
            Spot::Entrance(id) => {
                let entrance = self.worlds[world].entrance(id);
                let rule = entrance
                    .rule
                    .clone()
                    .ok_or_else(|| SearchError::MissingRule(entrance.name.clone()))?;
                (entrance.parent, rule)
            }
            Spot::Location(id) => {
                let location = self.worlds[world].location(id);
                let rule = location
                    .rule
                    .clone()
                    .ok_or_else(|| SearchError::MissingRule(location.name.clone()))?;
                (location.parent, rule)
            }
        };
        let ctx = Context::at(age, world, parent).with_tod(tod);
        self.eval(world, &rule, &ctx)
    }

    /// Location already yielded by a sweep?
    pub fn visited(&self, world: WorldId, location: LocationId) -> bool {
        self.visited_locations[world].contains(&location)
    }

    /// All locations currently holding advancement items, in world order.
    pub fn progression_locations(&self) -> Vec<(WorldId, LocationId)> {
        let mut out = Vec::new();
        for (index, world) in self.worlds.iter().enumerate() {
            for (id, location) in world.locations() {
                if location.holds_advancement() {
                    out.push((index, id));
                }
            }
        }
        out
    }

    /// Mark every skipped location visited and collect its item into the
    /// starting inventory (sphere -1).
    pub fn collect_pseudo_starting_items(&mut self) {
        for world in 0..self.worlds.len() {
            let skipped = self.worlds[world].skipped_locations.clone();
            for location in skipped {
                self.visited_locations[world].insert(location);
                self.worlds[world].location_mut(location).sphere = SPHERE_UNREACHED;
                self.collect_item_at(world, location);
            }
        }
    }

    fn collect_item_at(&mut self, world: WorldId, location: LocationId) {
        if let Some(item) = self.worlds[world].location(location).item.clone() {
            self.states[item.world].collect(&item);
        }
    }

    /// Sweep until the fixpoint, marking every reachable candidate visited
    /// without touching any inventory. Defaults to all advancement-bearing
    /// locations.
    pub fn visit_locations(
        &mut self,
        candidates: Option<Vec<(WorldId, LocationId)>>,
    ) -> Result<(), SearchError> {
        let candidates = candidates.unwrap_or_else(|| self.progression_locations());
        let mut sweep = ReachableLocations::new(candidates);
        while sweep.next_in(self)?.is_some() {}
        Ok(())
    }

    /// Sweep until the fixpoint, collecting every reachable candidate's item
    /// as it is found. Defaults to all advancement-bearing locations.
    pub fn collect_locations(
        &mut self,
        candidates: Option<Vec<(WorldId, LocationId)>>,
    ) -> Result<(), SearchError> {
        let candidates = candidates.unwrap_or_else(|| self.progression_locations());
        let mut sweep = ReachableLocations::new(candidates);
        while let Some((world, location)) = sweep.next_in(self)? {
            self.collect_item_at(world, location);
        }
        Ok(())
    }

    /// Partition progression into spheres: within each round, sweep with a
    /// frozen inventory, then collect everything found at once. Terminates
    /// when a round collects nothing.
    pub fn collect_spheres(&mut self) -> Result<(), SearchError> {
        self.collect_pseudo_starting_items();
        let candidates = self.progression_locations();
        loop {
            let mut sweep = ReachableLocations::new(candidates.clone());
            let mut collected = Vec::new();
            while let Some(spot) = sweep.next_in(self)? {
                collected.push(spot);
            }
            if collected.is_empty() {
                break;
            }
            let sphere = self.spheres.len() as i32;
            debug!("sphere {sphere}: {} locations", collected.len());
            for &(world, location) in &collected {
                self.worlds[world].location_mut(location).sphere = sphere;
                self.collect_item_at(world, location);
            }
            self.spheres.push(collected);
        }
        Ok(())
    }

    /// Spheres produced by [`Search::collect_spheres`].
    pub fn spheres(&self) -> &[Vec<(WorldId, LocationId)>] {
        &self.spheres
    }
}

/// Restartable sweep over candidate locations. Each pass starts with one
/// expansion, then yields every unvisited candidate whose rule passes (adult
/// tried before child); passes repeat until one yields nothing. The sweep
/// holds no borrow of the search, so callers may collect items between
/// yields.
pub struct ReachableLocations {
    candidates: Vec<(WorldId, LocationId)>,
    cursor: usize,
    progressed: bool,
}

impl ReachableLocations {
    pub fn new(candidates: Vec<(WorldId, LocationId)>) -> Self {
        ReachableLocations {
            candidates,
            cursor: 0,
            progressed: false,
        }
    }

    pub fn next_in(
        &mut self,
        search: &mut Search,
    ) -> Result<Option<(WorldId, LocationId)>, SearchError> {
        loop {
            if self.cursor == 0 {
                search.next_sphere()?;
            }
            while self.cursor < self.candidates.len() {
                let (world, location) = self.candidates[self.cursor];
                self.cursor += 1;
                if search.visited_locations[world].contains(&location) {
                    continue;
                }
                let (parent, rule) = {
                    let spot = search.worlds[world].location(location);
                    let rule = spot
                        .rule
                        .clone()
                        .ok_or_else(|| SearchError::MissingRule(spot.name.clone()))?;
                    (spot.parent, rule)
                };
                for age in [Age::Adult, Age::Child] {
                    if !search.cache(age).visited[world].contains(&parent) {
                        continue;
                    }
                    let ctx = Context::at(age, world, parent);
                    if search.eval(world, &rule, &ctx)? {
                        search.visited_locations[world].insert(location);
                        self.progressed = true;
                        return Ok(Some((world, location)));
                    }
                }
            }
            if !self.progressed {
                return Ok(None);
            }
            self.progressed = false;
            self.cursor = 0;
        }
    }
}
