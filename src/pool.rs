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

//! Pools for recycling entity handles, lock bits and small integer IDs.

use crate::entity::Entity;
use crate::mask::MAX_COMPONENTS;

/// Allocates and recycles generational entity handles.
///
/// Backed by a dense list of handles indexed by entity ID. Recycled slots
/// form a LIFO freelist embedded in the list itself: a recycled slot's `id`
/// field is repurposed as the link to the next free slot. Slot 0 is pinned at
/// generation `u16::MAX` so the reserved zero handle never matches a live one.
pub(crate) struct EntityPool {
    entities: Vec<Entity>,
    next: u32,
    available: u32,
}

impl EntityPool {
    pub fn new(capacity_increment: u32) -> Self {
        let mut entities = Vec::with_capacity(capacity_increment as usize);
        entities.push(Entity::new(0, u16::MAX));
        Self {
            entities,
            next: 0,
            available: 0,
        }
    }

    /// Returns a fresh or recycled entity.
    pub fn get(&mut self) -> Entity {
        if self.available == 0 {
            return self.get_new();
        }
        let curr = self.next;
        let slot = &mut self.entities[curr as usize];
        self.next = slot.id;
        slot.id = curr;
        self.available -= 1;
        *slot
    }

    fn get_new(&mut self) -> Entity {
        let entity = Entity::new(self.entities.len() as u32, 0);
        self.entities.push(entity);
        entity
    }

    /// Hands an entity back for recycling, incrementing its generation.
    ///
    /// Panics when passed the reserved zero entity or a dead handle.
    pub fn recycle(&mut self, entity: Entity) {
        if entity.id == 0 {
            panic!("can't recycle the reserved zero entity");
        }
        let slot = &mut self.entities[entity.id as usize];
        if slot.gen != entity.gen {
            panic!("can't recycle a dead entity");
        }
        slot.gen = slot.gen.wrapping_add(1);
        slot.id = self.next;
        self.next = entity.id;
        self.available += 1;
    }

    /// Whether the handle refers to a live entity.
    #[inline]
    pub fn alive(&self, entity: Entity) -> bool {
        entity.gen == self.entities[entity.id as usize].gen
    }

    /// Number of entities currently in use.
    pub fn len(&self) -> usize {
        self.entities.len() - 1 - self.available as usize
    }

    /// Number of entity slots ever created.
    pub fn total(&self) -> usize {
        self.entities.len() - 1
    }

    /// Number of recycled slots waiting for reuse.
    pub fn available(&self) -> usize {
        self.available as usize
    }

    /// Reserved slot capacity.
    pub fn capacity(&self) -> usize {
        self.entities.capacity()
    }

    /// Drops all recycled state; the next entity handed out is `(1, 0)`.
    pub fn reset(&mut self) {
        self.entities.truncate(1);
        self.next = 0;
        self.available = 0;
    }

    #[cfg(test)]
    pub fn slot(&self, id: u32) -> Entity {
        self.entities[id as usize]
    }
}

/// A stack of free bits in `[0, MAX_COMPONENTS)`, used for world lock bits.
///
/// Guarantees that all bits handed out at any one time are distinct. Panics
/// on exhaustion.
pub(crate) struct BitPool {
    bits: [u8; MAX_COMPONENTS],
    length: u16,
    available: u8,
}

impl Default for BitPool {
    fn default() -> Self {
        Self {
            bits: [0; MAX_COMPONENTS],
            length: 0,
            available: 0,
        }
    }
}

impl BitPool {
    /// Returns the next free bit.
    pub fn get(&mut self) -> u8 {
        if self.available == 0 {
            if self.length as usize >= MAX_COMPONENTS {
                panic!("ran out of the maximum of {} bits", MAX_COMPONENTS);
            }
            let bit = self.length as u8;
            self.length += 1;
            return bit;
        }
        self.available -= 1;
        self.bits[self.available as usize]
    }

    /// Hands a bit back for reuse.
    pub fn recycle(&mut self, bit: u8) {
        self.bits[self.available as usize] = bit;
        self.available += 1;
    }

    /// Forgets all handed-out and recycled bits.
    pub fn reset(&mut self) {
        self.length = 0;
        self.available = 0;
    }
}

/// Allocates and recycles `u32` IDs, with an embedded LIFO freelist like
/// [`EntityPool`]. Used for filter-cache IDs.
pub(crate) struct IntPool {
    pool: Vec<u32>,
    next: u32,
    available: u32,
    capacity_increment: usize,
}

impl IntPool {
    pub fn new(capacity_increment: usize) -> Self {
        Self {
            pool: Vec::with_capacity(capacity_increment),
            next: 0,
            available: 0,
            capacity_increment,
        }
    }

    pub fn get(&mut self) -> u32 {
        if self.available == 0 {
            return self.get_new();
        }
        let curr = self.next;
        self.next = self.pool[curr as usize];
        self.pool[curr as usize] = curr;
        self.available -= 1;
        curr
    }

    fn get_new(&mut self) -> u32 {
        let value = self.pool.len() as u32;
        if self.pool.len() == self.pool.capacity() {
            self.pool.reserve_exact(self.capacity_increment);
        }
        self.pool.push(value);
        value
    }

    pub fn recycle(&mut self, value: u32) {
        self.pool[value as usize] = self.next;
        self.next = value;
        self.available += 1;
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.pool.clear();
        self.next = 0;
        self.available = 0;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pool.len()
    }
}
