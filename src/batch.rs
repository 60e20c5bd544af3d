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

//! Batch operations over all entities matching a filter.

use crate::component::{Comp, ComponentId};
use crate::entity::Entity;
use crate::filter::Filter;
use crate::query::Query;
use crate::world::World;

/// Helper for manipulating large numbers of entities in one structural pass,
/// which is much faster than handling them one by one.
///
/// Created through [`World::batch`]. Every operation selects the archetypes
/// matching a filter and drains each source archetype in a single move. The
/// `*_q` variants return a [`Query`] restricted to the affected entities, so
/// the caller can initialize or inspect them under the acquired world lock.
pub struct Batch<'w> {
    world: &'w mut World,
}

impl<'w> Batch<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self { world }
    }

    /// Adds components to all entities matching the filter.
    pub fn add(self, filter: &Filter, ids: &[ComponentId]) {
        self.world.exchange_batch(filter, ids, &[]);
    }

    /// Adds components to all entities matching the filter, returning a
    /// query over the affected entities.
    pub fn add_q(self, filter: &Filter, ids: &[ComponentId]) -> Query<'w> {
        self.world.exchange_batch_q(filter, ids, &[])
    }

    /// Removes components from all entities matching the filter.
    pub fn remove(self, filter: &Filter, ids: &[ComponentId]) {
        self.world.exchange_batch(filter, &[], ids);
    }

    /// Removes components from all entities matching the filter, returning a
    /// query over the affected entities.
    pub fn remove_q(self, filter: &Filter, ids: &[ComponentId]) -> Query<'w> {
        self.world.exchange_batch_q(filter, &[], ids)
    }

    /// Adds and removes components on all entities matching the filter.
    /// A call with empty `add` and `rem` is a no-op.
    pub fn exchange(self, filter: &Filter, add: &[ComponentId], rem: &[ComponentId]) {
        self.world.exchange_batch(filter, add, rem);
    }

    /// Adds and removes components on all entities matching the filter,
    /// returning a query over the affected entities.
    pub fn exchange_q(
        self,
        filter: &Filter,
        add: &[ComponentId],
        rem: &[ComponentId],
    ) -> Query<'w> {
        self.world.exchange_batch_q(filter, add, rem)
    }

    /// Sets the relation target of all entities matching the filter.
    pub fn set_relation(self, filter: &Filter, id: ComponentId, target: Entity) {
        self.world.set_relation_batch(filter, id, target);
    }

    /// Sets the relation target of all entities matching the filter,
    /// returning a query over the affected entities.
    pub fn set_relation_q(
        self,
        filter: &Filter,
        id: ComponentId,
        target: Entity,
    ) -> Query<'w> {
        self.world.set_relation_batch_q(filter, id, target)
    }

    /// Removes and recycles all entities matching the filter. Returns the
    /// number of removed entities.
    pub fn remove_entities(self, filter: &Filter) -> usize {
        self.world.remove_entities(filter)
    }

    /// Creates `count` entities with the given components.
    pub fn new_entities(self, count: u32, ids: &[ComponentId]) {
        self.world.new_entities(count, None, Entity::ZERO, ids);
    }

    /// Creates `count` entities with the given components, returning a query
    /// over them.
    pub fn new_entities_q(self, count: u32, ids: &[ComponentId]) -> Query<'w> {
        self.world.new_entities_q(count, None, Entity::ZERO, ids)
    }

    /// Creates `count` entities with a relation component targeting `target`.
    pub fn new_entities_target(
        self,
        count: u32,
        relation: ComponentId,
        target: Entity,
        ids: &[ComponentId],
    ) {
        self.world.new_entities(count, Some(relation), target, ids);
    }

    /// Creates `count` entities with a relation target, returning a query
    /// over them.
    pub fn new_entities_target_q(
        self,
        count: u32,
        relation: ComponentId,
        target: Entity,
        ids: &[ComponentId],
    ) -> Query<'w> {
        self.world.new_entities_q(count, Some(relation), target, ids)
    }

    /// Creates `count` entities, all initialized with the given component
    /// values.
    pub fn new_entities_with(self, count: u32, comps: &[Comp<'_>]) {
        self.world
            .new_entities_with(count, None, Entity::ZERO, comps);
    }

    /// Creates `count` entities with component values, returning a query
    /// over them.
    pub fn new_entities_with_q(self, count: u32, comps: &[Comp<'_>]) -> Query<'w> {
        self.world.new_entities_with_q(count, None, Entity::ZERO, comps)
    }
}
