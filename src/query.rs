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

//! Iteration over entities matching a filter.

use crate::archetype::{Archetype, IdList};
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::filter::Filter;
use crate::mask::Mask;
use crate::world::World;

/// Row spans produced by a batch operation: for every affected destination
/// archetype, the contiguous range of freshly written rows and the source
/// archetype the rows came from.
pub(crate) struct BatchArchetypes {
    pub arches: Vec<u32>,
    pub starts: Vec<u32>,
    pub ends: Vec<u32>,
    pub old_arches: Vec<Option<u32>>,
    pub added: IdList,
    pub removed: IdList,
}

impl BatchArchetypes {
    pub fn new(added: IdList, removed: IdList) -> Self {
        Self {
            arches: Vec::new(),
            starts: Vec::new(),
            ends: Vec::new(),
            old_arches: Vec::new(),
            added,
            removed,
        }
    }

    pub fn add(&mut self, arch: u32, old_arch: Option<u32>, start: u32, end: u32) {
        self.arches.push(arch);
        self.old_arches.push(old_arch);
        self.starts.push(start);
        self.ends.push(end);
    }

    pub fn len(&self) -> usize {
        self.arches.len()
    }
}

enum Mode {
    /// Walk all graph nodes, filtering by mask.
    Nodes,
    /// Iterate the pre-resolved archetype list of a cached filter.
    Cached(u32),
    /// Iterate the row spans recorded by a batch operation.
    Batch(BatchArchetypes),
}

/// An iterator over the entities matching a [`Filter`].
///
/// Queries hold one of the world's 128 lock bits for their lifetime;
/// structural world mutations panic while any query is open. The lock is
/// released when iteration finishes, on [`close`](Query::close), or when the
/// query is dropped.
///
/// ```
/// # use bytemuck::{Pod, Zeroable};
/// # use lattice_ecs::{Component, Filter, World};
/// # #[repr(C)]
/// # #[derive(Clone, Copy, Zeroable, Pod)]
/// # struct Position { x: f32, y: f32 }
/// # impl Component for Position {}
/// # let mut world = World::new();
/// # let pos_id = world.component_id::<Position>();
/// # world.new_entity(&[pos_id]);
/// let mut query = world.query(&Filter::all(&[pos_id]));
/// while query.next() {
///     let pos = unsafe { &mut *(query.get(pos_id) as *mut Position) };
///     pos.x += 1.0;
/// }
/// ```
pub struct Query<'w> {
    world: &'w World,
    filter: Filter,
    mode: Mode,
    node_index: i32,
    arch_index: i32,
    /// Node whose archetype list is being walked (relation nodes without a
    /// target restriction).
    in_node: Option<u32>,
    /// Arena index of the archetype currently being iterated.
    current: u32,
    entity_index: u32,
    entity_index_max: u32,
    count: i64,
    lock: u8,
    closed: bool,
}

impl<'w> Query<'w> {
    pub(crate) fn new_nodes(world: &'w World, filter: Filter, lock: u8) -> Self {
        Self::new(world, filter, Mode::Nodes, lock)
    }

    pub(crate) fn new_cached(world: &'w World, filter: Filter, id: u32, lock: u8) -> Self {
        Self::new(world, filter, Mode::Cached(id), lock)
    }

    pub(crate) fn new_batch(world: &'w World, batch: BatchArchetypes, lock: u8) -> Self {
        Self::new(world, Filter::All(Mask::ZERO), Mode::Batch(batch), lock)
    }

    fn new(world: &'w World, filter: Filter, mode: Mode, lock: u8) -> Self {
        Self {
            world,
            filter,
            mode,
            node_index: -1,
            arch_index: -1,
            in_node: None,
            current: u32::MAX,
            entity_index: 0,
            entity_index_max: 0,
            count: -1,
            lock,
            closed: false,
        }
    }

    /// Proceeds to the next entity. Returns `false` when no entity is left,
    /// closing the query.
    #[inline]
    pub fn next(&mut self) -> bool {
        self.check_open();
        if self.entity_index < self.entity_index_max {
            self.entity_index += 1;
            return true;
        }
        self.next_archetype()
    }

    /// Advances the iterator by `step` entities, possibly crossing archetype
    /// boundaries. `step(1)` is equivalent to [`next`](Query::next).
    ///
    /// Panics for a zero step.
    pub fn step(&mut self, step: usize) -> bool {
        self.check_open();
        if step == 0 {
            panic!("step size must be positive");
        }
        let mut step = step as u32;
        loop {
            let (remaining, ok) = self.step_archetype(step);
            if ok {
                return true;
            }
            if !self.next_archetype() {
                return false;
            }
            if remaining == 0 {
                return true;
            }
            step = remaining;
        }
    }

    /// Counts the entities matching this query.
    ///
    /// Walks the candidate archetypes on the first call and memoizes the
    /// result. Does not close the query.
    pub fn count(&mut self) -> usize {
        self.check_open();
        if self.count >= 0 {
            return self.count as usize;
        }
        let count = self.count_entities();
        self.count = count as i64;
        count
    }

    /// The entity at the iterator's position.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.arch().entity(self.entity_index)
    }

    /// Whether the current entity has the given component.
    #[inline]
    pub fn has(&self, id: ComponentId) -> bool {
        self.arch().has(id)
    }

    /// Pointer to the given component of the current entity.
    ///
    /// Null when the entity has no such component. Valid for the current
    /// iteration step only.
    #[inline]
    pub fn get(&self, id: ComponentId) -> *mut u8 {
        self.arch().get(self.entity_index, id)
    }

    /// The component mask of the current entity's archetype.
    #[inline]
    pub fn mask(&self) -> Mask {
        self.arch().mask
    }

    /// The relation target of the current entity.
    ///
    /// Panics when `id` is not the entity's relation component.
    pub fn relation(&self, id: ComponentId) -> Entity {
        let arch = self.arch();
        if arch.relation != Some(id) {
            panic!(
                "entity has no component {}, or it is not a relation component",
                self.world.registry.type_name(id)
            );
        }
        arch.relation_target
    }

    /// The relation target of the current entity, without checking that `id`
    /// is the entity's relation component.
    pub fn relation_unchecked(&self, _id: ComponentId) -> Entity {
        self.arch().relation_target
    }

    /// Closes the query and releases the world lock.
    ///
    /// Called automatically when iteration finishes; needed only when
    /// breaking out of iteration early. Panics when already closed.
    pub fn close(&mut self) {
        if self.closed {
            panic!("query is already closed");
        }
        self.close_internal();
    }

    #[inline]
    fn arch(&self) -> &Archetype {
        &self.world.archetypes[self.current as usize]
    }

    #[inline]
    fn check_open(&self) {
        if self.closed {
            panic!("query is closed");
        }
    }

    fn close_internal(&mut self) {
        self.closed = true;
        self.world.unlock(self.lock);
        if let Mode::Batch(batch) = &self.mode {
            self.world.notify_batch(batch);
        }
    }

    fn set_archetype(&mut self, arch: u32, start: u32, max: u32) {
        self.current = arch;
        self.entity_index = start;
        self.entity_index_max = max;
    }

    fn step_archetype(&mut self, step: u32) -> (u32, bool) {
        self.entity_index = self.entity_index.saturating_add(step);
        if self.entity_index <= self.entity_index_max {
            return (0, true);
        }
        (self.entity_index - self.entity_index_max - 1, false)
    }

    fn next_archetype(&mut self) -> bool {
        match self.mode {
            Mode::Nodes => self.next_node_or_archetype(),
            Mode::Cached(_) => self.next_archetype_cached(),
            Mode::Batch(_) => self.next_archetype_batch(),
        }
    }

    fn next_archetype_cached(&mut self) -> bool {
        let Mode::Cached(id) = self.mode else {
            unreachable!()
        };
        let entry = self.world.filter_cache.entry_by_id(id);
        let len = entry.archetypes.len() as i32;
        while self.arch_index < len - 1 {
            self.arch_index += 1;
            let arch = entry.archetypes[self.arch_index as usize];
            let arch_len = self.world.archetypes[arch as usize].len();
            if arch_len == 0 {
                continue;
            }
            self.set_archetype(arch, 0, arch_len - 1);
            return true;
        }
        self.close_internal();
        false
    }

    fn next_archetype_batch(&mut self) -> bool {
        loop {
            self.arch_index += 1;
            let span = match &self.mode {
                Mode::Batch(batch) => {
                    let i = self.arch_index as usize;
                    if i >= batch.len() {
                        None
                    } else {
                        Some((batch.arches[i], batch.starts[i], batch.ends[i]))
                    }
                }
                _ => unreachable!(),
            };
            match span {
                None => {
                    self.close_internal();
                    return false;
                }
                Some((_, start, end)) if start == end => continue,
                Some((arch, start, end)) => {
                    self.set_archetype(arch, start, end - 1);
                    return true;
                }
            }
        }
    }

    fn next_node_or_archetype(&mut self) -> bool {
        if let Some(node) = self.in_node {
            if self.next_archetype_in_node(node) {
                return true;
            }
        }
        self.next_node()
    }

    fn next_archetype_in_node(&mut self, node: u32) -> bool {
        let arches = &self.world.nodes[node as usize].archetypes;
        let len = arches.len() as i32;
        while self.arch_index < len - 1 {
            self.arch_index += 1;
            let arch = arches[self.arch_index as usize];
            let archetype = &self.world.archetypes[arch as usize];
            if !archetype.is_active() || archetype.len() == 0 {
                continue;
            }
            self.set_archetype(arch, 0, archetype.len() - 1);
            return true;
        }
        false
    }

    fn next_node(&mut self) -> bool {
        self.in_node = None;
        let len = self.world.nodes.len() as i32;
        while self.node_index < len - 1 {
            self.node_index += 1;
            let node = &self.world.nodes[self.node_index as usize];
            if !node.is_active || !node.matches(&self.filter) {
                continue;
            }

            if !node.has_relation() {
                // An active non-relation node always has its one archetype.
                let arch = node.archetypes[0];
                let arch_len = self.world.archetypes[arch as usize].len();
                if arch_len > 0 {
                    self.set_archetype(arch, 0, arch_len - 1);
                    return true;
                }
                continue;
            }

            if let Some(target) = self.filter.relation_target() {
                if let Some(&arch) = node.by_target.get(&target) {
                    let arch_len = self.world.archetypes[arch as usize].len();
                    if arch_len > 0 {
                        self.set_archetype(arch, 0, arch_len - 1);
                        return true;
                    }
                }
                continue;
            }

            let node_index = self.node_index as u32;
            self.in_node = Some(node_index);
            self.arch_index = -1;
            if self.next_archetype_in_node(node_index) {
                return true;
            }
            self.in_node = None;
        }
        self.close_internal();
        false
    }

    fn count_entities(&self) -> usize {
        match self.mode {
            Mode::Batch(ref batch) => (0..batch.len())
                .map(|i| (batch.ends[i] - batch.starts[i]) as usize)
                .sum(),
            Mode::Cached(id) => {
                let entry = self.world.filter_cache.entry_by_id(id);
                entry
                    .archetypes
                    .iter()
                    .map(|&a| self.world.archetypes[a as usize].len() as usize)
                    .sum()
            }
            Mode::Nodes => {
                let mut count = 0;
                for node in &self.world.nodes {
                    if !node.is_active || !node.matches(&self.filter) {
                        continue;
                    }
                    if !node.has_relation() {
                        count += self.world.archetypes[node.archetypes[0] as usize].len() as usize;
                        continue;
                    }
                    if let Some(target) = self.filter.relation_target() {
                        if let Some(&arch) = node.by_target.get(&target) {
                            count += self.world.archetypes[arch as usize].len() as usize;
                        }
                        continue;
                    }
                    for &arch in &node.archetypes {
                        count += self.world.archetypes[arch as usize].len() as usize;
                    }
                }
                count
            }
        }
    }
}

impl Drop for Query<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.close_internal();
        }
    }
}
