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

//! Entity identifiers and location metadata.

/// A lightweight, generational entity handle.
///
/// Entities are meant to be stored and passed by value. Handle equality
/// requires both the ID and the generation to match, so a handle that was
/// removed and whose ID slot was recycled compares unequal to its successor.
///
/// The zero handle is reserved and never alive; see [`Entity::ZERO`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Entity {
    pub(crate) id: u32,
    pub(crate) gen: u16,
}

impl Entity {
    /// The reserved zero entity. Never alive.
    pub const ZERO: Entity = Entity { id: 0, gen: 0 };

    pub(crate) fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }

    /// Whether this is the reserved zero entity.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.id == 0 && self.gen == 0
    }

    /// The raw slot index of this handle.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The generation of this handle.
    pub fn generation(&self) -> u16 {
        self.gen
    }
}

/// Location of an alive entity: the archetype that stores it and its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntityLocation {
    pub arch: u32,
    pub row: u32,
}

impl EntityLocation {
    pub const EMPTY: EntityLocation = EntityLocation { arch: 0, row: 0 };
}
