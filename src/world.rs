// Copyright 2025 the lattice-ecs contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The central world: entity storage, the archetype graph and orchestration.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt::Write as _;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, IdList};
use crate::batch::Batch;
use crate::bitset::BitSet;
use crate::cache::{CacheEntry, FilterCache};
use crate::component::{Comp, Component, ComponentId};
use crate::entity::{Entity, EntityLocation};
use crate::event::{EntityEvent, Listener};
use crate::filter::Filter;
use crate::mask::Mask;
use crate::node::Node;
use crate::pool::{BitPool, EntityPool};
use crate::query::{BatchArchetypes, Query};
use crate::registry::ComponentRegistry;
use crate::resources::{ResourceId, Resources};
use crate::stats::{ArchetypeStats, EntityStats, NodeStats, WorldStats};

/// World construction options.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Row growth quantum for archetypes and the entity index. Must be at
    /// least 1. Defaults to 128.
    pub capacity_increment: u32,
    /// Row growth quantum for relation archetypes. Zero means "use
    /// `capacity_increment`".
    pub relation_capacity_increment: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity_increment: 128,
            relation_capacity_increment: 0,
        }
    }
}

/// Manages world locks by mask bits.
///
/// The lock state lives in interior-mutable cells so queries can acquire and
/// release locks through a shared world reference. The number of
/// simultaneous locks is limited to 128.
struct LockMask {
    locks: Cell<Mask>,
    pool: RefCell<BitPool>,
}

impl LockMask {
    fn new() -> Self {
        Self {
            locks: Cell::new(Mask::ZERO),
            pool: RefCell::new(BitPool::default()),
        }
    }

    fn lock(&self) -> u8 {
        let bit = self.pool.borrow_mut().get();
        let mut locks = self.locks.get();
        locks.set(ComponentId::new(bit), true);
        self.locks.set(locks);
        bit
    }

    fn unlock(&self, bit: u8) {
        let mut locks = self.locks.get();
        if !locks.get(ComponentId::new(bit)) {
            panic!("unbalanced unlock");
        }
        locks.set(ComponentId::new(bit), false);
        self.locks.set(locks);
        self.pool.borrow_mut().recycle(bit);
    }

    fn is_locked(&self) -> bool {
        !self.locks.get().is_zero()
    }

    fn reset(&self) {
        self.locks.set(Mask::ZERO);
        self.pool.borrow_mut().reset();
    }
}

/// The central type holding entity and component data, as well as resources.
///
/// The world provides entity creation and removal, component addition,
/// removal and exchange, entity relations, filtered [queries](World::query),
/// [cached filters](World::register_filter) and [batch](World::batch)
/// operations.
///
/// Structural mutations panic while any query lock is held; in-place value
/// writes via [`set`](World::set) are always allowed.
pub struct World {
    config: Config,
    pub(crate) registry: ComponentRegistry,
    entity_pool: EntityPool,
    /// Location of every entity, indexed by entity ID. Slot 0 is reserved.
    entities: Vec<EntityLocation>,
    /// Marks entity IDs that are currently relation targets.
    target_entities: BitSet,
    /// The archetype graph. Append-only.
    pub(crate) nodes: Vec<Node>,
    /// Arena of all archetypes, relation and non-relation alike. Append-only;
    /// retired relation archetypes are deactivated in place and reused.
    pub(crate) archetypes: Vec<Archetype>,
    /// Nodes whose mask contains a relation component.
    relation_nodes: Vec<u32>,
    locks: LockMask,
    pub(crate) filter_cache: FilterCache,
    listener: Option<Listener>,
    resources: Resources,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a world from a configuration.
    ///
    /// Panics when `capacity_increment` is zero.
    pub fn with_config(mut config: Config) -> Self {
        if config.capacity_increment < 1 {
            panic!("invalid capacity_increment in config, must be positive");
        }
        if config.relation_capacity_increment < 1 {
            config.relation_capacity_increment = config.capacity_increment;
        }

        let mut world = Self {
            config,
            registry: ComponentRegistry::new(),
            entity_pool: EntityPool::new(config.capacity_increment),
            entities: vec![EntityLocation::EMPTY],
            target_entities: BitSet::default(),
            nodes: Vec::new(),
            archetypes: Vec::new(),
            relation_nodes: Vec::new(),
            locks: LockMask::new(),
            filter_cache: FilterCache::new(),
            listener: None,
            resources: Resources::new(),
        };

        // Bootstrap the empty-mask root node and its archetype. The root
        // archetype is always arena index 0.
        let root = world.create_node(Mask::ZERO, None);
        world.create_archetype(root, Entity::ZERO, false);
        world
    }

    /// Returns the ID for a component type, registering it if needed.
    ///
    /// Panics past 128 registered component types.
    pub fn component_id<T: Component>(&mut self) -> ComponentId {
        self.registry.component_id::<T>()
    }

    /// Returns the ID for a resource type, registering it if needed.
    pub fn resource_id<T: 'static>(&mut self) -> ResourceId {
        self.resources.resource_id::<T>()
    }

    /// The `TypeId` registered for a component ID, if the ID is in use.
    pub fn component_type(&self, id: ComponentId) -> Option<TypeId> {
        self.registry.component_type(id)
    }

    // ------------------------------------------------------------------
    // Entity API
    // ------------------------------------------------------------------

    /// Returns a new or recycled entity with the given components attached.
    ///
    /// Panics when called on a locked world.
    pub fn new_entity(&mut self, ids: &[ComponentId]) -> Entity {
        self.check_locked();

        #[cfg(feature = "profiling")]
        let span = info_span!("world.new_entity", components = ids.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut arch = 0;
        if !ids.is_empty() {
            arch = self.find_or_create_archetype(0, ids, &[], Entity::ZERO);
        }

        let entity = self.create_entity(arch);
        self.notify_created(entity, arch, ids);
        entity
    }

    /// Returns a new or recycled entity with the given component values
    /// assigned.
    ///
    /// Panics when called on a locked world.
    pub fn new_entity_with(&mut self, comps: &[Comp<'_>]) -> Entity {
        self.check_locked();

        if comps.is_empty() {
            return self.new_entity(&[]);
        }

        let ids: IdList = comps.iter().map(|c| c.id).collect();
        let arch = self.find_or_create_archetype(0, &ids, &[], Entity::ZERO);

        let entity = self.create_entity_with(arch, comps);
        self.notify_created(entity, arch, &ids);
        entity
    }

    /// Creates an entity with a relation component and a target entity.
    ///
    /// `relation` must be among `ids`. Panics when called on a locked world,
    /// or when `target` is dead.
    pub fn new_entity_target(
        &mut self,
        relation: ComponentId,
        target: Entity,
        ids: &[ComponentId],
    ) -> Entity {
        self.check_locked();

        if !target.is_zero() && !self.entity_pool.alive(target) {
            panic!("can't make a dead entity a relation target");
        }

        let mut arch = 0;
        if !ids.is_empty() {
            arch = self.find_or_create_archetype(0, ids, &[], target);
        }
        self.check_relation(arch, relation);

        let entity = self.create_entity(arch);
        if !target.is_zero() {
            self.target_entities.set(target.id, true);
        }
        self.notify_created(entity, arch, ids);
        entity
    }

    /// Creates an entity with a relation target and component values.
    pub fn new_entity_target_with(
        &mut self,
        relation: ComponentId,
        target: Entity,
        comps: &[Comp<'_>],
    ) -> Entity {
        self.check_locked();

        if !target.is_zero() && !self.entity_pool.alive(target) {
            panic!("can't make a dead entity a relation target");
        }

        let ids: IdList = comps.iter().map(|c| c.id).collect();
        let mut arch = 0;
        if !ids.is_empty() {
            arch = self.find_or_create_archetype(0, &ids, &[], target);
        }
        self.check_relation(arch, relation);

        let entity = self.create_entity_with(arch, comps);
        if !target.is_zero() {
            self.target_entities.set(target.id, true);
        }
        self.notify_created(entity, arch, &ids);
        entity
    }

    /// Removes an entity, making its handle eligible for recycling.
    ///
    /// Panics when called on a locked world or for a dead entity.
    pub fn remove_entity(&mut self, entity: Entity) {
        self.check_locked();

        if !self.entity_pool.alive(entity) {
            panic!("can't remove a dead entity");
        }

        let loc = self.entities[entity.id as usize];
        let old_arch = loc.arch;

        if self.listener.is_some() {
            let arch = &self.archetypes[old_arch as usize];
            let event = EntityEvent {
                entity,
                old_mask: arch.mask,
                new_mask: Mask::ZERO,
                added: IdList::new(),
                removed: self.nodes[arch.node as usize].ids.clone(),
                current: IdList::new(),
                added_removed: -1,
                old_target: arch.relation_target,
                new_target: Entity::ZERO,
                target_changed: false,
            };
            self.notify(&event);
        }

        let swapped = self.archetypes[old_arch as usize].remove(loc.row);

        self.entity_pool.recycle(entity);

        if swapped {
            let swap_entity = self.archetypes[old_arch as usize].entity(loc.row);
            self.entities[swap_entity.id as usize].row = loc.row;
        }

        if self.target_entities.get(entity.id) {
            self.cleanup_archetypes(entity);
            self.target_entities.set(entity.id, false);
        }

        self.cleanup_archetype(old_arch);
    }

    /// Whether the entity is still alive.
    pub fn alive(&self, entity: Entity) -> bool {
        self.entity_pool.alive(entity)
    }

    /// The component mask of an entity. Panics for dead entities.
    pub fn mask(&self, entity: Entity) -> Mask {
        if !self.entity_pool.alive(entity) {
            panic!("can't get mask for a dead entity");
        }
        let loc = self.entities[entity.id as usize];
        self.archetypes[loc.arch as usize].mask
    }

    /// Whether an entity has the given component. Panics for dead entities.
    pub fn has(&self, entity: Entity, id: ComponentId) -> bool {
        if !self.entity_pool.alive(entity) {
            panic!("can't check for component of a dead entity");
        }
        self.has_unchecked(entity, id)
    }

    /// Like [`has`](World::has), without the liveness check. Only valid for
    /// entities known to be alive.
    pub fn has_unchecked(&self, entity: Entity, id: ComponentId) -> bool {
        let loc = self.entities[entity.id as usize];
        self.archetypes[loc.arch as usize].has(id)
    }

    /// Pointer to the given component of an entity, or null when the entity
    /// has no such component.
    ///
    /// The pointer is valid until the next structural mutation or column
    /// growth. Panics for dead entities.
    pub fn get(&self, entity: Entity, id: ComponentId) -> *mut u8 {
        if !self.entity_pool.alive(entity) {
            panic!("can't get component of a dead entity");
        }
        self.get_unchecked(entity, id)
    }

    /// Like [`get`](World::get), without the liveness check. Only valid for
    /// entities known to be alive.
    pub fn get_unchecked(&self, entity: Entity, id: ComponentId) -> *mut u8 {
        let loc = self.entities[entity.id as usize];
        self.archetypes[loc.arch as usize].get(loc.row, id)
    }

    /// Adds components to an entity.
    ///
    /// Panics when called on a locked world, for a dead entity, or when a
    /// component is already present.
    pub fn add(&mut self, entity: Entity, ids: &[ComponentId]) {
        self.exchange(entity, ids, &[]);
    }

    /// Removes components from an entity.
    ///
    /// Panics when called on a locked world, for a dead entity, or when a
    /// component is not present.
    pub fn remove(&mut self, entity: Entity, ids: &[ComponentId]) {
        self.exchange(entity, &[], ids);
    }

    /// Adds components with values to an entity.
    pub fn assign(&mut self, entity: Entity, comps: &[Comp<'_>]) {
        if comps.is_empty() {
            panic!("no components given to assign");
        }
        let ids: IdList = comps.iter().map(|c| c.id).collect();
        self.exchange(entity, &ids, &[]);
        for comp in comps {
            self.copy_to(entity, comp.id, comp.bytes);
        }
    }

    /// Overwrites a component value of an entity by byte copy.
    ///
    /// Changes no masks, so it is permitted while queries are open. Returns a
    /// pointer to the written cell. Panics for dead entities and for
    /// components the entity does not have.
    pub fn set(&self, entity: Entity, id: ComponentId, bytes: &[u8]) -> *mut u8 {
        self.copy_to(entity, id, bytes)
    }

    /// Adds and removes components in one structural pass.
    ///
    /// Panics when called on a locked world, for a dead entity, for added
    /// components already present or removed components not present, and
    /// when the exchange would give the entity a second relation component.
    pub fn exchange(&mut self, entity: Entity, add: &[ComponentId], rem: &[ComponentId]) {
        self.check_locked();

        #[cfg(feature = "profiling")]
        let span = info_span!("world.exchange", added = add.len(), removed = rem.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        if !self.entity_pool.alive(entity) {
            panic!("can't exchange components on a dead entity");
        }
        if add.is_empty() && rem.is_empty() {
            return;
        }

        let loc = self.entities[entity.id as usize];
        let old_arch_idx = loc.arch;
        let old_mask = self.archetypes[old_arch_idx as usize].mask;
        let old_target = self.archetypes[old_arch_idx as usize].relation_target;
        let new_mask = self.exchange_mask(old_mask, add, rem);

        let old_node = self.archetypes[old_arch_idx as usize].node;
        let old_ids = self.nodes[old_node as usize].ids.clone();

        // A removed relation resolves to the zero target inside the graph
        // traversal; otherwise the old target carries over.
        let new_arch_idx = self.find_or_create_archetype(old_arch_idx, add, rem, old_target);
        if new_arch_idx == old_arch_idx {
            // add and remove cancelled out
            return;
        }
        let new_row = self.archetypes[new_arch_idx as usize].alloc(entity);

        {
            let old_arch = &self.archetypes[old_arch_idx as usize];
            let new_arch = &self.archetypes[new_arch_idx as usize];
            for &id in &old_ids {
                if new_mask.get(id) {
                    unsafe {
                        new_arch.set_from_ptr(new_row, id, old_arch.get(loc.row, id));
                    }
                }
            }
        }

        let swapped = self.archetypes[old_arch_idx as usize].remove(loc.row);
        if swapped {
            let swap_entity = self.archetypes[old_arch_idx as usize].entity(loc.row);
            self.entities[swap_entity.id as usize].row = loc.row;
        }
        self.entities[entity.id as usize] = EntityLocation {
            arch: new_arch_idx,
            row: new_row,
        };

        self.cleanup_archetype(old_arch_idx);

        if self.listener.is_some() {
            let new_arch = &self.archetypes[new_arch_idx as usize];
            let event = EntityEvent {
                entity,
                old_mask,
                new_mask: new_arch.mask,
                added: add.iter().copied().collect(),
                removed: rem.iter().copied().collect(),
                current: self.nodes[new_arch.node as usize].ids.clone(),
                added_removed: 0,
                old_target,
                new_target: new_arch.relation_target,
                target_changed: false,
            };
            self.notify(&event);
        }
    }

    // ------------------------------------------------------------------
    // Relation API
    // ------------------------------------------------------------------

    /// The relation target of an entity.
    ///
    /// Panics for dead entities and when `id` is not the entity's relation
    /// component.
    pub fn get_relation(&self, entity: Entity, id: ComponentId) -> Entity {
        if !self.entity_pool.alive(entity) {
            panic!("can't get relation of a dead entity");
        }
        let loc = self.entities[entity.id as usize];
        self.check_relation(loc.arch, id);
        self.archetypes[loc.arch as usize].relation_target
    }

    /// Like [`get_relation`](World::get_relation), without the liveness and
    /// relation checks.
    pub fn get_relation_unchecked(&self, entity: Entity, _id: ComponentId) -> Entity {
        let loc = self.entities[entity.id as usize];
        self.archetypes[loc.arch as usize].relation_target
    }

    /// Sets the relation target of an entity, moving it to the archetype for
    /// the new target. Setting the current target is a no-op.
    ///
    /// Panics when called on a locked world, for a dead entity or target, and
    /// when `id` is not the entity's relation component.
    pub fn set_relation(&mut self, entity: Entity, id: ComponentId, target: Entity) {
        self.check_locked();

        if !self.entity_pool.alive(entity) {
            panic!("can't set relation for a dead entity");
        }
        if !target.is_zero() && !self.entity_pool.alive(target) {
            panic!("can't make a dead entity a relation target");
        }

        let loc = self.entities[entity.id as usize];
        self.check_relation(loc.arch, id);

        let old_arch_idx = loc.arch;
        let old_target = self.archetypes[old_arch_idx as usize].relation_target;
        if old_target == target {
            return;
        }

        let node = self.archetypes[old_arch_idx as usize].node;
        let new_arch_idx = match self.nodes[node as usize].get_archetype(target) {
            Some(arch) => arch,
            None => self.create_archetype(node, target, true),
        };

        let new_row = self.archetypes[new_arch_idx as usize].alloc(entity);
        let old_ids = self.nodes[node as usize].ids.clone();
        {
            let old_arch = &self.archetypes[old_arch_idx as usize];
            let new_arch = &self.archetypes[new_arch_idx as usize];
            for &id in &old_ids {
                unsafe {
                    new_arch.set_from_ptr(new_row, id, old_arch.get(loc.row, id));
                }
            }
        }

        let swapped = self.archetypes[old_arch_idx as usize].remove(loc.row);
        if swapped {
            let swap_entity = self.archetypes[old_arch_idx as usize].entity(loc.row);
            self.entities[swap_entity.id as usize].row = loc.row;
        }
        self.entities[entity.id as usize] = EntityLocation {
            arch: new_arch_idx,
            row: new_row,
        };
        if !target.is_zero() {
            self.target_entities.set(target.id, true);
        }

        self.cleanup_archetype(old_arch_idx);

        if self.listener.is_some() {
            let arch = &self.archetypes[new_arch_idx as usize];
            let event = EntityEvent {
                entity,
                old_mask: arch.mask,
                new_mask: arch.mask,
                added: IdList::new(),
                removed: IdList::new(),
                current: self.nodes[arch.node as usize].ids.clone(),
                added_removed: 0,
                old_target,
                new_target: arch.relation_target,
                target_changed: true,
            };
            self.notify(&event);
        }
    }

    // ------------------------------------------------------------------
    // Queries, filters, batches
    // ------------------------------------------------------------------

    /// Creates a query iterator over all entities matching the filter.
    ///
    /// Locks the world until the query finishes iteration, is
    /// [closed](Query::close) or dropped. At most 128 queries can be open at
    /// the same time.
    pub fn query(&self, filter: &Filter) -> Query<'_> {
        let lock = self.lock();
        if let Filter::Cached(cached) = filter {
            // validate the handle up front
            let _ = self.filter_cache.get(cached);
            return Query::new_cached(self, (*cached.filter).clone(), cached.id, lock);
        }
        Query::new_nodes(self, filter.clone(), lock)
    }

    /// Registers a filter with the world's filter cache and returns the
    /// cached filter to query with.
    ///
    /// The set of matching archetypes is maintained incrementally, so cached
    /// queries skip graph traversal. Panics when passed an already-cached
    /// filter.
    pub fn register_filter(&mut self, filter: Filter) -> Filter {
        let archetypes = self.matching_archetypes(&filter);
        Filter::Cached(self.filter_cache.register(filter, archetypes))
    }

    /// Releases a cached filter, returning the original filter.
    ///
    /// Panics when the filter is not cached or unknown.
    pub fn unregister_filter(&mut self, filter: &Filter) -> Filter {
        match filter {
            Filter::Cached(cached) => self.filter_cache.unregister(cached),
            _ => panic!("filter is not registered, can't unregister"),
        }
    }

    /// The cache entry of a cached filter. Panics for unknown handles.
    pub fn cache_entry(&self, filter: &Filter) -> &CacheEntry {
        match filter {
            Filter::Cached(cached) => self.filter_cache.get(cached),
            _ => panic!("filter is not registered"),
        }
    }

    /// Creates a batch-operation helper for manipulating many entities in one
    /// structural pass.
    pub fn batch(&mut self) -> Batch<'_> {
        Batch::new(self)
    }

    /// World resources: data unique to the world rather than to an entity.
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Mutable access to the world resources.
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// Sets or clears the listener called on every entity change.
    ///
    /// The listener runs under a transient lock and must not mutate the
    /// world structurally.
    pub fn set_listener(&mut self, listener: Option<Listener>) {
        self.listener = listener;
    }

    /// Whether any query lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locks.is_locked()
    }

    /// Locks the world and returns the lock bit for later unlocking.
    pub fn lock(&self) -> u8 {
        self.locks.lock()
    }

    /// Releases a lock bit. Panics when the bit is not held.
    pub fn unlock(&self, bit: u8) {
        self.locks.unlock(bit);
    }

    /// Removes all entities and resources.
    ///
    /// Keeps nodes, component registrations, cached filters and non-relation
    /// archetypes (truncated to zero rows); retires relation archetypes with
    /// a nonzero target. Panics on a locked world.
    pub fn reset(&mut self) {
        self.check_locked();

        self.entities.truncate(1);
        self.target_entities.reset();
        self.entity_pool.reset();
        self.locks.reset();
        self.resources.reset();

        for node_index in 0..self.nodes.len() {
            let arch_list = self.nodes[node_index].archetypes.clone();
            for arch in arch_list {
                if !self.archetypes[arch as usize].is_active() {
                    continue;
                }
                let retire = self.archetypes[arch as usize].relation.is_some()
                    && !self.archetypes[arch as usize].relation_target.is_zero();
                if retire {
                    self.remove_archetype(arch);
                } else {
                    self.archetypes[arch as usize].reset();
                }
            }
        }
    }

    /// Reports statistics for inspecting the world.
    pub fn stats(&self) -> WorldStats {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut active_node_count = 0;
        for node in &self.nodes {
            if node.is_active {
                active_node_count += 1;
            }
            let archetypes = node
                .archetypes
                .iter()
                .map(|&a| {
                    let arch = &self.archetypes[a as usize];
                    ArchetypeStats {
                        is_active: arch.is_active(),
                        size: arch.len() as usize,
                        capacity: arch.cap() as usize,
                        memory: arch.memory(),
                    }
                })
                .collect();
            nodes.push(NodeStats {
                is_active: node.is_active,
                has_relation: node.has_relation(),
                components: node.ids.len(),
                archetypes,
            });
        }

        WorldStats {
            entities: EntityStats {
                used: self.entity_pool.len(),
                total: self.entity_pool.total(),
                recycled: self.entity_pool.available(),
                capacity: self.entity_pool.capacity(),
            },
            component_count: self.registry.len(),
            nodes,
            active_node_count,
            cached_filter_count: self.filter_cache.len(),
            locked: self.is_locked(),
        }
    }

    /// Renders the node and archetype structure, for diagnostics.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let ids: Vec<usize> = node.ids.iter().map(|id| id.index()).collect();
            if !node.is_active {
                let _ = writeln!(out, "Node {:?} (inactive)", ids);
                continue;
            }
            let _ = writeln!(
                out,
                "Node {:?} ({} arch), relation: {}",
                ids,
                node.archetypes.len(),
                node.has_relation()
            );
            for &a in &node.archetypes {
                let arch = &self.archetypes[a as usize];
                if arch.is_active() {
                    let _ = writeln!(
                        out,
                        "   Arch {:?} ({} entities)",
                        arch.relation_target,
                        arch.len()
                    );
                } else {
                    let _ = writeln!(out, "   Arch (inactive)");
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_locked(&self) {
        if self.is_locked() {
            panic!("attempt to modify a locked world");
        }
    }

    /// Calls the listener under a transient lock.
    fn notify(&self, event: &EntityEvent) {
        if let Some(listener) = &self.listener {
            let lock = self.lock();
            listener(event);
            self.unlock(lock);
        }
    }

    fn notify_created(&self, entity: Entity, arch: u32, added: &[ComponentId]) {
        if self.listener.is_none() {
            return;
        }
        let arch = &self.archetypes[arch as usize];
        let event = EntityEvent {
            entity,
            old_mask: Mask::ZERO,
            new_mask: arch.mask,
            added: added.iter().copied().collect(),
            removed: IdList::new(),
            current: self.nodes[arch.node as usize].ids.clone(),
            added_removed: 1,
            old_target: Entity::ZERO,
            new_target: arch.relation_target,
            target_changed: false,
        };
        self.notify(&event);
    }

    /// Creates an entity and adds it to the given archetype.
    fn create_entity(&mut self, arch: u32) -> Entity {
        let entity = self.entity_pool.get();
        let row = self.archetypes[arch as usize].alloc(entity);
        if entity.id as usize == self.entities.len() {
            self.entities.push(EntityLocation { arch, row });
        } else {
            self.entities[entity.id as usize] = EntityLocation { arch, row };
            self.target_entities.set(entity.id, false);
        }
        entity
    }

    /// Creates an entity with component values, in one archetype insertion.
    fn create_entity_with(&mut self, arch: u32, comps: &[Comp<'_>]) -> Entity {
        let entity = self.entity_pool.get();
        let row = self.archetypes[arch as usize].add(entity, comps);
        if entity.id as usize == self.entities.len() {
            self.entities.push(EntityLocation { arch, row });
        } else {
            self.entities[entity.id as usize] = EntityLocation { arch, row };
            self.target_entities.set(entity.id, false);
        }
        entity
    }

    /// Creates `count` entities in the given archetype, growing storage once.
    pub(crate) fn create_entities(&mut self, arch: u32, count: u32) {
        let start = self.archetypes[arch as usize].len();
        self.archetypes[arch as usize].alloc_n(count);

        for i in 0..count {
            let entity = self.entity_pool.get();
            self.archetypes[arch as usize].set_entity(start + i, entity);
            let loc = EntityLocation {
                arch,
                row: start + i,
            };
            if entity.id as usize == self.entities.len() {
                self.entities.push(loc);
            } else {
                self.entities[entity.id as usize] = loc;
                self.target_entities.set(entity.id, false);
            }
        }
    }

    /// Byte-copies a component value into an entity's cell.
    fn copy_to(&self, entity: Entity, id: ComponentId, bytes: &[u8]) -> *mut u8 {
        if !self.has(entity, id) {
            panic!(
                "can't copy component {} into entity that has no such component",
                self.registry.type_name(id)
            );
        }
        let loc = self.entities[entity.id as usize];
        self.archetypes[loc.arch as usize].set(loc.row, id, bytes)
    }

    /// Applies additions and removals to a mask, panicking on duplicates and
    /// absentees.
    pub(crate) fn exchange_mask(
        &self,
        mut mask: Mask,
        add: &[ComponentId],
        rem: &[ComponentId],
    ) -> Mask {
        for &id in add {
            if mask.get(id) {
                panic!(
                    "entity already has component of type {}, can't add",
                    self.registry.type_name(id)
                );
            }
            mask.set(id, true);
        }
        for &id in rem {
            if !mask.get(id) {
                panic!(
                    "entity does not have a component of type {}, can't remove",
                    self.registry.type_name(id)
                );
            }
            mask.set(id, false);
        }
        mask
    }

    /// Finds the destination archetype for an exchange by traversing the
    /// archetype graph from `start`'s node, extending the graph as needed.
    /// Creates the destination archetype if not already present.
    pub(crate) fn find_or_create_archetype(
        &mut self,
        start: u32,
        add: &[ComponentId],
        rem: &[ComponentId],
        target: Entity,
    ) -> u32 {
        let mut curr = self.archetypes[start as usize].node;
        let mut mask = self.archetypes[start as usize].mask;
        let mut relation = self.archetypes[start as usize].relation;

        for &id in rem {
            mask.set(id, false);
            if self.registry.is_relation.get(id) {
                relation = None;
            }
            curr = match self.nodes[curr as usize].transition_remove.get(id) {
                Some(next) => next,
                None => {
                    let next = self.find_or_create_node(mask, relation);
                    self.nodes[next as usize].transition_add.set(id, curr);
                    self.nodes[curr as usize].transition_remove.set(id, next);
                    next
                }
            };
        }

        for &id in add {
            mask.set(id, true);
            if self.registry.is_relation.get(id) {
                if relation.is_some() {
                    panic!("entity already has a relation component");
                }
                relation = Some(id);
            }
            curr = match self.nodes[curr as usize].transition_add.get(id) {
                Some(next) => next,
                None => {
                    let next = self.find_or_create_node(mask, relation);
                    self.nodes[next as usize].transition_remove.set(id, curr);
                    self.nodes[curr as usize].transition_add.set(id, next);
                    next
                }
            };
        }

        // A removed relation routes to the zero target.
        let target = if self.nodes[curr as usize].has_relation() {
            target
        } else {
            Entity::ZERO
        };

        match self.nodes[curr as usize].get_archetype(target) {
            Some(arch) => arch,
            None => self.create_archetype(curr, target, true),
        }
    }

    /// Finds a node by mask, creating it when the mask is not yet in the
    /// graph.
    fn find_or_create_node(&mut self, mask: Mask, relation: Option<ComponentId>) -> u32 {
        if let Some(node) = self.find_node(mask) {
            return node;
        }
        self.create_node(mask, relation)
    }

    /// Searches for a node by mask. Nodes are few relative to archetypes, so
    /// a linear scan suffices.
    fn find_node(&self, mask: Mask) -> Option<u32> {
        self.nodes
            .iter()
            .position(|n| n.mask == mask)
            .map(|i| i as u32)
    }

    fn create_node(&mut self, mask: Mask, relation: Option<ComponentId>) -> u32 {
        let relations_in_mask = mask
            .ids()
            .filter(|&id| self.registry.is_relation.get(id))
            .count();
        if relations_in_mask > 1 {
            panic!("node can't have multiple relation components");
        }

        let capacity_increment = if relation.is_some() {
            self.config.relation_capacity_increment
        } else {
            self.config.capacity_increment
        };

        let index = self.nodes.len() as u32;
        self.nodes.push(Node::new(mask, relation, capacity_increment));
        if relation.is_some() {
            self.relation_nodes.push(index);
        }
        index
    }

    /// Creates an archetype under the given node, preferring to reactivate a
    /// retired slot on relation nodes. Activates the node and updates the
    /// filter cache.
    pub(crate) fn create_archetype(&mut self, node: u32, target: Entity, for_storage: bool) -> u32 {
        let mask = self.nodes[node as usize].mask;
        let relation = self.nodes[node as usize].relation;
        let capacity_increment = self.nodes[node as usize].capacity_increment;

        if relation.is_some() {
            let reusable = self.nodes[node as usize]
                .archetypes
                .iter()
                .position(|&a| !self.archetypes[a as usize].is_active());
            if let Some(pos) = reusable {
                let arch = self.nodes[node as usize].archetypes[pos];
                self.archetypes[arch as usize].activate(target, pos as i32);
                self.nodes[node as usize].by_target.insert(target, arch);
                self.nodes[node as usize].is_active = true;
                self.filter_cache.add_archetype(arch, &mask, target);
                return arch;
            }
        }

        let components: Vec<_> = self.nodes[node as usize]
            .ids
            .iter()
            .map(|&id| (id, *self.registry.type_info(id)))
            .collect();

        let arch = self.archetypes.len() as u32;
        let position = self.nodes[node as usize].archetypes.len() as i32;
        self.archetypes.push(Archetype::new(
            node,
            mask,
            &components,
            relation,
            target,
            capacity_increment,
            for_storage,
            position,
        ));
        self.nodes[node as usize].archetypes.push(arch);
        if relation.is_some() {
            self.nodes[node as usize].by_target.insert(target, arch);
        }
        self.nodes[node as usize].is_active = true;
        self.filter_cache.add_archetype(arch, &mask, target);
        arch
    }

    /// All active archetypes matching the filter, in node order.
    pub(crate) fn matching_archetypes(&self, filter: &Filter) -> Vec<u32> {
        if let Filter::Cached(cached) = filter {
            return self.filter_cache.get(cached).archetypes.clone();
        }

        let mut arches = Vec::new();
        for node in &self.nodes {
            if !node.is_active || !node.matches(filter) {
                continue;
            }
            if let Some(target) = filter.relation_target() {
                if let Some(&arch) = node.by_target.get(&target) {
                    arches.push(arch);
                }
                continue;
            }
            for &arch in &node.archetypes {
                if self.archetypes[arch as usize].is_active() {
                    arches.push(arch);
                }
            }
        }
        arches
    }

    pub(crate) fn check_relation(&self, arch: u32, id: ComponentId) {
        if self.archetypes[arch as usize].relation != Some(id) {
            self.relation_panic(arch, id);
        }
    }

    fn relation_panic(&self, arch: u32, id: ComponentId) -> ! {
        if !self.archetypes[arch as usize].has(id) {
            panic!(
                "entity does not have relation component {}",
                self.registry.type_name(id)
            );
        }
        panic!("not a relation component: {}", self.registry.type_name(id));
    }

    /// Retires the archetype if it is empty and relates to a dead target.
    pub(crate) fn cleanup_archetype(&mut self, arch: u32) {
        let archetype = &self.archetypes[arch as usize];
        if archetype.len() > 0 || archetype.relation.is_none() {
            return;
        }
        let target = archetype.relation_target;
        if target.is_zero() || self.entity_pool.alive(target) {
            return;
        }
        self.remove_archetype(arch);
    }

    /// Retires every empty archetype whose relation target is the given
    /// entity.
    pub(crate) fn cleanup_archetypes(&mut self, target: Entity) {
        for i in 0..self.relation_nodes.len() {
            let node = self.relation_nodes[i];
            if let Some(&arch) = self.nodes[node as usize].by_target.get(&target) {
                if self.archetypes[arch as usize].len() == 0 {
                    self.remove_archetype(arch);
                }
            }
        }
    }

    /// Deactivates a relation archetype and evicts it from its node's target
    /// map and the filter cache. Its storage is retained for reuse.
    fn remove_archetype(&mut self, arch: u32) {
        let node = self.archetypes[arch as usize].node;
        let target = self.archetypes[arch as usize].relation_target;
        self.nodes[node as usize].by_target.remove(&target);
        self.archetypes[arch as usize].deactivate();
        self.filter_cache.remove_archetype(arch);
    }

    // ------------------------------------------------------------------
    // Batch internals (invoked through `Batch`)
    // ------------------------------------------------------------------

    pub(crate) fn exchange_batch(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        rem: &[ComponentId],
    ) {
        let mut batch = BatchArchetypes::new(
            add.iter().copied().collect(),
            rem.iter().copied().collect(),
        );
        self.exchange_batch_no_notify(filter, add, rem, &mut batch);
        if self.listener.is_some() {
            self.notify_batch(&batch);
        }
    }

    pub(crate) fn exchange_batch_q(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        rem: &[ComponentId],
    ) -> Query<'_> {
        let mut batch = BatchArchetypes::new(
            add.iter().copied().collect(),
            rem.iter().copied().collect(),
        );
        self.exchange_batch_no_notify(filter, add, rem, &mut batch);
        let lock = self.lock();
        Query::new_batch(self, batch, lock)
    }

    fn exchange_batch_no_notify(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        rem: &[ComponentId],
        batch: &mut BatchArchetypes,
    ) {
        self.check_locked();

        if add.is_empty() && rem.is_empty() {
            return;
        }

        let arches = self.matching_archetypes(filter);
        let lengths: Vec<u32> = arches
            .iter()
            .map(|&a| self.archetypes[a as usize].len())
            .collect();

        for (i, &arch) in arches.iter().enumerate() {
            let len = lengths[i];
            if len == 0 {
                continue;
            }
            let (new_arch, start) = self.exchange_arch(arch, len, add, rem);
            let end = self.archetypes[new_arch as usize].len();
            batch.add(new_arch, Some(arch), start, end);
        }
    }

    /// Moves all rows of one archetype to the exchange destination. Returns
    /// the destination and the start row of the moved span.
    fn exchange_arch(
        &mut self,
        old_idx: u32,
        old_len: u32,
        add: &[ComponentId],
        rem: &[ComponentId],
    ) -> (u32, u32) {
        let old_mask = self.archetypes[old_idx as usize].mask;
        let new_mask = self.exchange_mask(old_mask, add, rem);
        let old_node = self.archetypes[old_idx as usize].node;
        let old_ids = self.nodes[old_node as usize].ids.clone();
        let target = self.archetypes[old_idx as usize].relation_target;

        let new_idx = self.find_or_create_archetype(old_idx, add, rem, target);
        if new_idx == old_idx {
            // add and remove cancelled out
            return (old_idx, 0);
        }
        let start = self.archetypes[new_idx as usize].len();
        self.archetypes[new_idx as usize].alloc_n(old_len);

        for i in 0..old_len {
            let row = start + i;
            let entity = self.archetypes[old_idx as usize].entity(i);
            self.archetypes[new_idx as usize].set_entity(row, entity);
            self.entities[entity.id as usize] = EntityLocation { arch: new_idx, row };
        }

        {
            let old_arch = &self.archetypes[old_idx as usize];
            let new_arch = &self.archetypes[new_idx as usize];
            for i in 0..old_len {
                for &id in &old_ids {
                    if new_mask.get(id) {
                        unsafe {
                            new_arch.set_from_ptr(start + i, id, old_arch.get(i, id));
                        }
                    }
                }
            }
        }

        self.archetypes[old_idx as usize].reset();
        self.cleanup_archetype(old_idx);

        (new_idx, start)
    }

    pub(crate) fn set_relation_batch(&mut self, filter: &Filter, id: ComponentId, target: Entity) {
        let mut batch = BatchArchetypes::new(IdList::new(), IdList::new());
        self.set_relation_batch_no_notify(filter, id, target, &mut batch);
        if self.listener.is_some() {
            self.notify_batch(&batch);
        }
    }

    pub(crate) fn set_relation_batch_q(
        &mut self,
        filter: &Filter,
        id: ComponentId,
        target: Entity,
    ) -> Query<'_> {
        let mut batch = BatchArchetypes::new(IdList::new(), IdList::new());
        self.set_relation_batch_no_notify(filter, id, target, &mut batch);
        let lock = self.lock();
        Query::new_batch(self, batch, lock)
    }

    fn set_relation_batch_no_notify(
        &mut self,
        filter: &Filter,
        id: ComponentId,
        target: Entity,
        batch: &mut BatchArchetypes,
    ) {
        self.check_locked();

        if !target.is_zero() && !self.entity_pool.alive(target) {
            panic!("can't make a dead entity a relation target");
        }

        let arches = self.matching_archetypes(filter);
        let lengths: Vec<u32> = arches
            .iter()
            .map(|&a| self.archetypes[a as usize].len())
            .collect();

        for (i, &arch) in arches.iter().enumerate() {
            let len = lengths[i];
            if len == 0 {
                continue;
            }
            let (new_arch, start, end) = self.set_relation_arch(arch, len, id, target);
            batch.add(new_arch, Some(arch), start, end);
        }
    }

    /// Moves all rows of one archetype to the archetype for the new relation
    /// target. Returns the destination and the moved span.
    fn set_relation_arch(
        &mut self,
        old_idx: u32,
        old_len: u32,
        id: ComponentId,
        target: Entity,
    ) -> (u32, u32, u32) {
        self.check_relation(old_idx, id);

        if self.archetypes[old_idx as usize].relation_target == target {
            return (old_idx, 0, old_len);
        }

        let node = self.archetypes[old_idx as usize].node;
        let old_ids = self.nodes[node as usize].ids.clone();

        let new_idx = match self.nodes[node as usize].get_archetype(target) {
            Some(arch) => arch,
            None => self.create_archetype(node, target, true),
        };

        let start = self.archetypes[new_idx as usize].len();
        self.archetypes[new_idx as usize].alloc_n(old_len);

        for i in 0..old_len {
            let row = start + i;
            let entity = self.archetypes[old_idx as usize].entity(i);
            self.archetypes[new_idx as usize].set_entity(row, entity);
            self.entities[entity.id as usize] = EntityLocation { arch: new_idx, row };
        }

        {
            let old_arch = &self.archetypes[old_idx as usize];
            let new_arch = &self.archetypes[new_idx as usize];
            for i in 0..old_len {
                for &comp in &old_ids {
                    unsafe {
                        new_arch.set_from_ptr(start + i, comp, old_arch.get(i, comp));
                    }
                }
            }
        }

        if !target.is_zero() {
            self.target_entities.set(target.id, true);
        }

        self.archetypes[old_idx as usize].reset();
        self.cleanup_archetype(old_idx);

        let end = self.archetypes[new_idx as usize].len();
        (new_idx, start, end)
    }

    /// Removes and recycles all entities matching the filter. Returns the
    /// number of removed entities.
    pub(crate) fn remove_entities(&mut self, filter: &Filter) -> usize {
        self.check_locked();

        let lock = self.lock();
        let mut count = 0;

        let arches = self.matching_archetypes(filter);
        for arch in arches {
            let len = self.archetypes[arch as usize].len();
            if len == 0 {
                continue;
            }
            count += len as usize;

            for row in 0..len {
                let entity = self.archetypes[arch as usize].entity(row);
                if self.listener.is_some() {
                    let archetype = &self.archetypes[arch as usize];
                    let event = EntityEvent {
                        entity,
                        old_mask: archetype.mask,
                        new_mask: Mask::ZERO,
                        added: IdList::new(),
                        removed: self.nodes[archetype.node as usize].ids.clone(),
                        current: IdList::new(),
                        added_removed: -1,
                        old_target: archetype.relation_target,
                        new_target: Entity::ZERO,
                        target_changed: false,
                    };
                    self.notify(&event);
                }

                if self.target_entities.get(entity.id) {
                    self.cleanup_archetypes(entity);
                    self.target_entities.set(entity.id, false);
                }

                self.entity_pool.recycle(entity);
            }

            self.archetypes[arch as usize].reset();
            self.cleanup_archetype(arch);
        }

        self.unlock(lock);
        count
    }

    pub(crate) fn new_entities(
        &mut self,
        count: u32,
        relation: Option<ComponentId>,
        target: Entity,
        ids: &[ComponentId],
    ) -> (u32, u32) {
        let (arch, start) = self.new_entities_no_notify(count, relation, target, ids);

        if self.listener.is_some() {
            for i in 0..count {
                let entity = self.archetypes[arch as usize].entity(start + i);
                self.notify_created(entity, arch, ids);
            }
        }

        (arch, start)
    }

    pub(crate) fn new_entities_q(
        &mut self,
        count: u32,
        relation: Option<ComponentId>,
        target: Entity,
        ids: &[ComponentId],
    ) -> Query<'_> {
        let (arch, start) = self.new_entities_no_notify(count, relation, target, ids);
        let lock = self.lock();

        let mut batch =
            BatchArchetypes::new(self.nodes[self.archetypes[arch as usize].node as usize].ids.clone(), IdList::new());
        let end = self.archetypes[arch as usize].len();
        batch.add(arch, None, start, end);
        Query::new_batch(self, batch, lock)
    }

    pub(crate) fn new_entities_with(
        &mut self,
        count: u32,
        relation: Option<ComponentId>,
        target: Entity,
        comps: &[Comp<'_>],
    ) -> (u32, u32) {
        let ids: IdList = comps.iter().map(|c| c.id).collect();
        let (arch, start) = self.new_entities_no_notify(count, relation, target, &ids);

        self.write_batch_values(arch, start, count, comps);

        if self.listener.is_some() {
            for i in 0..count {
                let entity = self.archetypes[arch as usize].entity(start + i);
                self.notify_created(entity, arch, &ids);
            }
        }

        (arch, start)
    }

    pub(crate) fn new_entities_with_q(
        &mut self,
        count: u32,
        relation: Option<ComponentId>,
        target: Entity,
        comps: &[Comp<'_>],
    ) -> Query<'_> {
        let ids: IdList = comps.iter().map(|c| c.id).collect();
        let (arch, start) = self.new_entities_no_notify(count, relation, target, &ids);
        self.write_batch_values(arch, start, count, comps);

        let lock = self.lock();
        let mut batch =
            BatchArchetypes::new(self.nodes[self.archetypes[arch as usize].node as usize].ids.clone(), IdList::new());
        let end = self.archetypes[arch as usize].len();
        batch.add(arch, None, start, end);
        Query::new_batch(self, batch, lock)
    }

    fn new_entities_no_notify(
        &mut self,
        count: u32,
        relation: Option<ComponentId>,
        target: Entity,
        ids: &[ComponentId],
    ) -> (u32, u32) {
        self.check_locked();

        if count < 1 {
            panic!("can only create a positive number of entities");
        }
        if !target.is_zero() && !self.entity_pool.alive(target) {
            panic!("can't make a dead entity a relation target");
        }

        let mut arch = 0;
        if !ids.is_empty() {
            arch = self.find_or_create_archetype(0, ids, &[], target);
        }
        if let Some(relation) = relation {
            self.check_relation(arch, relation);
            if !target.is_zero() {
                self.target_entities.set(target.id, true);
            }
        }

        let start = self.archetypes[arch as usize].len();
        self.create_entities(arch, count);

        (arch, start)
    }

    fn write_batch_values(&self, arch: u32, start: u32, count: u32, comps: &[Comp<'_>]) {
        let archetype = &self.archetypes[arch as usize];
        for i in 0..count {
            for comp in comps {
                archetype.set(start + i, comp.id, comp.bytes);
            }
        }
    }

    /// Notifies the listener for every entity span recorded by a batch.
    pub(crate) fn notify_batch(&self, batch: &BatchArchetypes) {
        if self.listener.is_none() {
            return;
        }
        for i in 0..batch.len() {
            let arch = &self.archetypes[batch.arches[i] as usize];
            let mut event = EntityEvent {
                entity: Entity::ZERO,
                old_mask: Mask::ZERO,
                new_mask: arch.mask,
                added: batch.added.clone(),
                removed: batch.removed.clone(),
                current: self.nodes[arch.node as usize].ids.clone(),
                added_removed: 1,
                old_target: Entity::ZERO,
                new_target: arch.relation_target,
                target_changed: false,
            };
            if let Some(old_idx) = batch.old_arches[i] {
                let old = &self.archetypes[old_idx as usize];
                event.old_mask = old.mask;
                event.added_removed = 0;
                event.old_target = old.relation_target;
                event.target_changed = event.old_mask == event.new_mask;
            }
            for row in batch.starts[i]..batch.ends[i] {
                event.entity = arch.entity(row);
                self.notify(&event);
            }
        }
    }
}
