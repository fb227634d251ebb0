//! World graph: arena-backed regions, entrances, and locations, plus the
//! builder that assembles one world from region declarations.
//!
//! A world always has a `Root` region (the search origin) and a `Root Exits`
//! region that hosts the proxy edges `assume_reachable` creates during
//! entrance shuffle.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::compiler::{AliasRegistry, CompiledRule, RuleCompiler, SpotCx, WorldCx};
use crate::entrance::Entrance;
use crate::error::{BuildError, CompileError, GraphError, SearchError};
use crate::ids::{EntranceId, LocationId, RegionId, WorldId};
use crate::item::{Item, ItemRegistry};
use crate::location::{Location, LocationType};
use crate::region::{Region, TimeOfDay};
use crate::settings::Settings;

pub const ROOT_REGION: &str = "Root";
pub const ROOT_EXITS_REGION: &str = "Root Exits";

/// One fully built world. Graph surgery (shuffle rewiring) and item
/// placement mutate it between searches; rules are already compiled.
#[derive(Debug, Clone)]
pub struct World {
    pub id: WorldId,
    pub settings: Settings,
    pub properties: Settings,
    pub ensure_tod_access: bool,
    pub time_pass_items: Vec<String>,
    regions: Vec<Region>,
    entrances: Vec<Entrance>,
    locations: Vec<Location>,
    region_index: HashMap<String, RegionId>,
    /// Locations whose items the player starts with (sphere -1).
    pub skipped_locations: Vec<LocationId>,
    /// Names of every event item this world produces.
    pub event_items: HashSet<String>,
}

impl World {
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.0]
    }

    pub fn entrance(&self, id: EntranceId) -> &Entrance {
        &self.entrances[id.0]
    }

    pub fn entrance_mut(&mut self, id: EntranceId) -> &mut Entrance {
        &mut self.entrances[id.0]
    }

    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id.0]
    }

    pub fn location_mut(&mut self, id: LocationId) -> &mut Location {
        &mut self.locations[id.0]
    }

    pub fn region_id(&self, name: &str) -> Result<RegionId, GraphError> {
        self.region_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownRegion(name.to_string()))
    }

    pub fn root(&self) -> Result<RegionId, GraphError> {
        self.region_index
            .get(ROOT_REGION)
            .copied()
            .ok_or(GraphError::MissingRoot(self.id))
    }

    pub fn find_entrance(&self, name: &str) -> Result<EntranceId, GraphError> {
        self.entrances
            .iter()
            .position(|e| e.name == name)
            .map(EntranceId)
            .ok_or_else(|| GraphError::UnknownEntrance(name.to_string()))
    }

    pub fn find_location(&self, name: &str) -> Result<LocationId, GraphError> {
        self.locations
            .iter()
            .position(|l| l.name == name)
            .map(LocationId)
            .ok_or_else(|| GraphError::UnknownLocation(name.to_string()))
    }

    pub fn regions(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().enumerate().map(|(i, r)| (RegionId(i), r))
    }

    pub fn entrances(&self) -> impl Iterator<Item = (EntranceId, &Entrance)> {
        self.entrances
            .iter()
            .enumerate()
            .map(|(i, e)| (EntranceId(i), e))
    }

    pub fn locations(&self) -> impl Iterator<Item = (LocationId, &Location)> {
        self.locations
            .iter()
            .enumerate()
            .map(|(i, l)| (LocationId(i), l))
    }

    /// Attach a detached entrance to a target region.
    pub fn connect(&mut self, entrance: EntranceId, target: RegionId) {
        self.entrances[entrance.0].connected = Some(target);
        self.regions[target.0].entrances.push(entrance);
    }

    /// Detach an entrance from its target, returning the old target.
    pub fn disconnect(&mut self, entrance: EntranceId) -> Result<RegionId, GraphError> {
        let target = self.entrances[entrance.0]
            .connected
            .ok_or_else(|| GraphError::AlreadyDisconnected(self.entrances[entrance.0].name.clone()))?;
        let position = self.regions[target.0]
            .entrances
            .iter()
            .position(|e| *e == entrance)
            .ok_or_else(|| GraphError::NotInEntranceList {
                entrance: self.entrances[entrance.0].name.clone(),
                region: self.regions[target.0].name.clone(),
            })?;
        self.entrances[entrance.0].connected = None;
        self.regions[target.0].entrances.remove(position);
        Ok(target)
    }

    /// Pair two entrances as the directions of one two-way connection.
    pub fn bind_two_way(&mut self, forward: EntranceId, reverse: EntranceId) {
        self.entrances[forward.0].reverse = Some(reverse);
        self.entrances[reverse.0].reverse = Some(forward);
    }

    /// Detach an entrance and stand in an always-true proxy from `Root Exits`
    /// to its target, so the target stays reachable while shuffle decides
    /// where the entrance really leads. Idempotent per entrance.
    pub fn assume_reachable(&mut self, entrance: EntranceId) -> Result<EntranceId, GraphError> {
        if let Some(proxy) = self.entrances[entrance.0].assumed {
            return Ok(proxy);
        }
        let target = self.entrances[entrance.0]
            .connected
            .ok_or_else(|| GraphError::AlreadyDisconnected(self.entrances[entrance.0].name.clone()))?;
        let root_exits = self.region_id(ROOT_EXITS_REGION)?;
        let proxy = EntranceId(self.entrances.len());
        let mut edge = Entrance::new(
            format!("Root -> {}", self.regions[target.0].name),
            root_exits,
        );
        edge.rule = Some(CompiledRule::const_rule(true));
        edge.rule_text = "true".into();
        edge.always = true;
        edge.replaces = Some(entrance);
        debug!(
            "assuming `{}` reachable via proxy `{}`",
            self.entrances[entrance.0].name, edge.name
        );
        self.entrances.push(edge);
        self.regions[root_exits.0].exits.push(proxy);
        self.connect(proxy, target);
        self.entrances[entrance.0].assumed = Some(proxy);
        self.disconnect(entrance)?;
        Ok(proxy)
    }

    /// Place an item; a location holds at most one.
    pub fn fill_location(&mut self, location: LocationId, item: Item) -> Result<(), GraphError> {
        let slot = &mut self.locations[location.0];
        if slot.item.is_some() {
            return Err(GraphError::LocationOccupied(slot.name.clone()));
        }
        slot.item = Some(item);
        Ok(())
    }

    /// Take the item back out, unless the placement is locked.
    pub fn clear_location(&mut self, location: LocationId) -> Option<Item> {
        let slot = &mut self.locations[location.0];
        if slot.locked { None } else { slot.item.take() }
    }

    /// Flag a location's item as part of the starting inventory.
    pub fn mark_skipped(&mut self, location: LocationId) {
        if !self.skipped_locations.contains(&location) {
            self.skipped_locations.push(location);
        }
    }
}

/// Region declaration, the unit of the world-graph feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionDef {
    pub region_name: String,
    #[serde(default)]
    pub region_type: Option<crate::region::RegionType>,
    #[serde(default)]
    pub dungeon: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    /// Shorthand for providing every time-of-day bit.
    #[serde(default)]
    pub time_passes: bool,
    #[serde(default)]
    pub provides_time: Option<String>,
    #[serde(default)]
    pub locations: Vec<LocationDef>,
    #[serde(default)]
    pub events: Vec<EventDef>,
    #[serde(default)]
    pub exits: Vec<ExitDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationDef {
    pub name: String,
    /// Missing rule means unconditionally accessible.
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: LocationType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDef {
    pub name: String,
    #[serde(default)]
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitDef {
    pub to: String,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
}

/// Frozen configuration shared by every rule compiled for one world.
struct BuildConfig {
    settings: Settings,
    properties: Settings,
    ensure_tod_access: bool,
    time_pass_items: Vec<String>,
    night_tokens_need_items: bool,
}

impl BuildConfig {
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

/// Assembles a [`World`] from declarations: compiles every rule, links
/// declared exits, resolves deferred subrules, and validates that every
/// referenced event is produced somewhere.
pub struct WorldBuilder {
    id: WorldId,
    config: BuildConfig,
    compiler: RuleCompiler,
    items: Rc<ItemRegistry>,
    regions: Vec<Region>,
    entrances: Vec<Entrance>,
    locations: Vec<Location>,
    region_index: HashMap<String, RegionId>,
    event_items: HashSet<String>,
}

impl WorldBuilder {
    pub fn new(
        id: WorldId,
        settings: Settings,
        properties: Settings,
        aliases: Rc<AliasRegistry>,
        items: Rc<ItemRegistry>,
    ) -> Self {
        let config = BuildConfig {
            ensure_tod_access: settings.bool_or("ensure_tod_access", true),
            night_tokens_need_items: settings.bool_or("no_night_tokens_without_time_items", false),
            time_pass_items: properties
                .list("time_pass_items")
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            settings,
            properties,
        };
        WorldBuilder {
            id,
            config,
            compiler: RuleCompiler::new(aliases, items.clone()),
            items,
            regions: Vec::new(),
            entrances: Vec::new(),
            locations: Vec::new(),
            region_index: HashMap::new(),
            event_items: HashSet::new(),
        }
    }

    /// Feed one region declaration. Redeclaring a region merges into it;
    /// duplicate location/exit names within the world are skipped with a
    /// warning.
    pub fn add_region(&mut self, def: RegionDef) -> Result<(), BuildError> {
        let RegionDef {
            region_name,
            region_type,
            dungeon,
            hint,
            time_passes,
            provides_time,
            locations,
            events,
            exits,
        } = def;
        let region = match self.region_index.get(&region_name) {
            Some(id) => {
                warn!("region `{region_name}` declared more than once; merging");
                *id
            }
            None => {
                let id = RegionId(self.regions.len());
                let mut region = Region::new(&region_name, region_type.unwrap_or_default());
                region.dungeon = dungeon;
                region.hint_name = hint;
                region.provides_time = if time_passes {
                    TimeOfDay::ALL
                } else if let Some(name) = &provides_time {
                    TimeOfDay::parse_name(name).ok_or_else(|| {
                        GraphError::Declaration(format!(
                            "region `{region_name}` provides unknown time of day `{name}`"
                        ))
                    })?
                } else {
                    TimeOfDay::empty()
                };
                self.regions.push(region);
                self.region_index.insert(region_name.clone(), id);
                id
            }
        };
        for location in locations {
            self.add_location(region, location)?;
        }
        for event in events {
            self.add_event(region, event)?;
        }
        for exit in exits {
            self.add_exit(region, exit)?;
        }
        Ok(())
    }

    /// Feed a JSON array of region declarations.
    pub fn add_regions_json(&mut self, json: &str) -> Result<(), BuildError> {
        let defs: Vec<RegionDef> = serde_json::from_str(json)?;
        for def in defs {
            self.add_region(def)?;
        }
        Ok(())
    }

    fn add_location(&mut self, region: RegionId, def: LocationDef) -> Result<(), BuildError> {
        if self.locations.iter().any(|l| l.name == def.name) {
            warn!("location `{}` declared more than once; keeping the first", def.name);
            return Ok(());
        }
        let rule_text = def.rule.unwrap_or_else(|| "true".to_string());
        let spot = SpotCx {
            name: &def.name,
            region: &self.regions[region.0].name,
            night_token: def.kind == LocationType::Token,
        };
        let compiled = self.compiler.compile(&rule_text, &spot, &self.config.cx())?;
        let id = LocationId(self.locations.len());
        let mut location = Location::new(def.name, region, def.kind);
        location.rule = Some(compiled.rule);
        location.rule_text = rule_text;
        location.always = compiled.always;
        location.never = compiled.never;
        self.locations.push(location);
        self.regions[region.0].locations.push(id);
        Ok(())
    }

    /// A declared event: an internal, locked location yielding the event item.
    fn add_event(&mut self, region: RegionId, def: EventDef) -> Result<(), BuildError> {
        let name = format!("{} from {}", def.name, self.regions[region.0].name);
        if self.locations.iter().any(|l| l.name == name) {
            warn!("event location `{name}` declared more than once; keeping the first");
            return Ok(());
        }
        let rule_text = def.rule.unwrap_or_else(|| "true".to_string());
        let spot = SpotCx {
            name: &name,
            region: &self.regions[region.0].name,
            night_token: false,
        };
        let compiled = self.compiler.compile(&rule_text, &spot, &self.config.cx())?;
        let id = LocationId(self.locations.len());
        let mut location = Location::new(name, region, LocationType::Event);
        location.rule = Some(compiled.rule);
        location.rule_text = rule_text;
        location.always = compiled.always;
        location.never = compiled.never;
        location.internal = true;
        location.locked = true;
        location.item = Some(Item::event(def.name.clone(), self.id));
        self.locations.push(location);
        self.regions[region.0].locations.push(id);
        self.event_items.insert(def.name);
        Ok(())
    }

    fn add_exit(&mut self, region: RegionId, def: ExitDef) -> Result<(), BuildError> {
        let name = format!("{} -> {}", self.regions[region.0].name, def.to);
        if self.entrances.iter().any(|e| e.name == name) {
            warn!("exit `{name}` declared more than once; keeping the first");
            return Ok(());
        }
        let rule_text = def.rule.unwrap_or_else(|| "true".to_string());
        let spot = SpotCx {
            name: &name,
            region: &self.regions[region.0].name,
            night_token: false,
        };
        let compiled = self.compiler.compile(&rule_text, &spot, &self.config.cx())?;
        let id = EntranceId(self.entrances.len());
        let mut entrance = Entrance::new(name, region);
        entrance.target_name = Some(def.to);
        entrance.pool = def.pool;
        entrance.rule = Some(compiled.rule);
        entrance.rule_text = rule_text;
        entrance.always = compiled.always;
        entrance.never = compiled.never;
        self.entrances.push(entrance);
        self.regions[region.0].exits.push(id);
        Ok(())
    }

    /// Finish the world: materialize `Root Exits`, link declared exits,
    /// resolve deferred subrules, and validate event references.
    pub fn finish(mut self) -> Result<World, BuildError> {
        let root = *self
            .region_index
            .get(ROOT_REGION)
            .ok_or(GraphError::MissingRoot(self.id))?;
        self.ensure_root_exits(root);
        self.link_declared_exits()?;
        self.resolve_subrules()?;
        self.validate_events()?;
        info!(
            "world {} built: {} regions, {} entrances, {} locations",
            self.id,
            self.regions.len(),
            self.entrances.len(),
            self.locations.len()
        );
        Ok(World {
            id: self.id,
            settings: self.config.settings,
            properties: self.config.properties,
            ensure_tod_access: self.config.ensure_tod_access,
            time_pass_items: self.config.time_pass_items,
            regions: self.regions,
            entrances: self.entrances,
            locations: self.locations,
            region_index: self.region_index,
            skipped_locations: Vec::new(),
            event_items: self.event_items,
        })
    }

    /// Guarantee the `Root Exits` staging region and the edge into it.
    fn ensure_root_exits(&mut self, root: RegionId) {
        if !self.region_index.contains_key(ROOT_EXITS_REGION) {
            let id = RegionId(self.regions.len());
            self.regions
                .push(Region::new(ROOT_EXITS_REGION, Default::default()));
            self.region_index.insert(ROOT_EXITS_REGION.to_string(), id);
        }
        let already_linked = self
            .entrances
            .iter()
            .any(|e| e.parent == root && e.target_name.as_deref() == Some(ROOT_EXITS_REGION));
        if !already_linked {
            let id = EntranceId(self.entrances.len());
            let mut entrance = Entrance::new(
                format!("{ROOT_REGION} -> {ROOT_EXITS_REGION}"),
                root,
            );
            entrance.target_name = Some(ROOT_EXITS_REGION.to_string());
            entrance.rule = Some(CompiledRule::const_rule(true));
            entrance.rule_text = "true".into();
            entrance.always = true;
            self.entrances.push(entrance);
            self.regions[root.0].exits.push(id);
        }
    }

    fn link_declared_exits(&mut self) -> Result<(), BuildError> {
        for index in 0..self.entrances.len() {
            if self.entrances[index].connected.is_some() {
                continue;
            }
            let Some(target_name) = self.entrances[index].target_name.clone() else {
                continue;
            };
            let target = *self
                .region_index
                .get(&target_name)
                .ok_or_else(|| GraphError::UnknownRegion(target_name.clone()))?;
            self.entrances[index].connected = Some(target);
            self.regions[target.0].entrances.push(EntranceId(index));
        }
        Ok(())
    }

    /// Second compilation pass: each deferred `here()`/`at()` body becomes an
    /// event location in its target region. Bodies may defer further
    /// subrules; a synthetic name coming around twice means a cycle.
    fn resolve_subrules(&mut self) -> Result<(), BuildError> {
        let mut resolved: HashSet<String> = HashSet::new();
        while let Some(request) = self.compiler.pop_delayed() {
            if !resolved.insert(request.name.clone()) {
                return Err(SearchError::SubruleCycle(request.name).into());
            }
            let region = *self
                .region_index
                .get(&request.target)
                .ok_or_else(|| GraphError::UnknownRegion(request.target.clone()))?;
            let spot = SpotCx {
                name: &request.name,
                region: &request.target,
                night_token: false,
            };
            let compiled = self
                .compiler
                .compile_expr(&request.expr, &spot, &self.config.cx())?;
            if compiled.never {
                debug!("subrule `{}` can never be satisfied", request.name);
                continue;
            }
            let id = LocationId(self.locations.len());
            let mut location = Location::new(request.name.clone(), region, LocationType::Event);
            location.rule = Some(compiled.rule);
            location.rule_text = request.expr.to_string();
            location.always = compiled.always;
            location.internal = true;
            location.locked = true;
            location.item = Some(Item::event(request.name.clone(), self.id));
            self.locations.push(location);
            self.regions[region.0].locations.push(id);
            self.event_items.insert(request.name);
        }
        Ok(())
    }

    /// Every event some rule references must be produced by this world.
    fn validate_events(&self) -> Result<(), BuildError> {
        let mut missing: Vec<String> = self
            .compiler
            .referenced_events()
            .iter()
            .filter(|event| !self.event_items.contains(*event) && !self.items.contains(event))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            Err(CompileError::UnresolvedEvents(missing).into())
        }
    }
}
