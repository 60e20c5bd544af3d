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

//! World-global keyed singletons.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

use crate::mask::MAX_COMPONENTS;

/// Identifier of a registered resource type.
///
/// Assigned in registration order, independent of component IDs. At most
/// [`MAX_COMPONENTS`] resource types can be registered per world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u8);

impl ResourceId {
    /// The raw index of this ID.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Keyed storage for world-global values, at most one per resource ID.
///
/// Resources are data unique to the world rather than attached to an entity.
/// Registrations survive [`World::reset`](crate::world::World::reset); the
/// stored values do not.
#[derive(Default)]
pub struct Resources {
    ids: FxHashMap<TypeId, ResourceId>,
    storage: Vec<Option<Box<dyn Any>>>,
}

impl Resources {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the ID for a resource type, registering it if needed.
    pub fn resource_id<T: 'static>(&mut self) -> ResourceId {
        if let Some(&id) = self.ids.get(&TypeId::of::<T>()) {
            return id;
        }
        let index = self.ids.len();
        if index >= MAX_COMPONENTS {
            panic!("maximum of {} resource types exceeded", MAX_COMPONENTS);
        }
        let id = ResourceId(index as u8);
        self.ids.insert(TypeId::of::<T>(), id);
        self.storage.push(None);
        id
    }

    /// Adds a resource value. Panics when a value for the type is already
    /// present.
    pub fn add<T: 'static>(&mut self, value: T) -> ResourceId {
        let id = self.resource_id::<T>();
        let slot = &mut self.storage[id.index()];
        if slot.is_some() {
            panic!("resource was already added, can't add it twice");
        }
        *slot = Some(Box::new(value));
        id
    }

    /// The resource value for a type, if present.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        let id = self.ids.get(&TypeId::of::<T>())?;
        self.storage[id.index()]
            .as_ref()
            .and_then(|v| v.downcast_ref())
    }

    /// Mutable access to the resource value for a type, if present.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let id = self.ids.get(&TypeId::of::<T>())?;
        self.storage[id.index()]
            .as_mut()
            .and_then(|v| v.downcast_mut())
    }

    /// Removes and returns the resource value for a type. Panics when there
    /// is no such resource.
    pub fn remove<T: 'static>(&mut self) -> T {
        let taken = self
            .ids
            .get(&TypeId::of::<T>())
            .and_then(|id| self.storage[id.index()].take())
            .unwrap_or_else(|| panic!("no resource of this type to remove"));
        *taken.downcast().expect("resource slot holds wrong type")
    }

    /// Whether a value for the type is present.
    pub fn has<T: 'static>(&self) -> bool {
        self.ids
            .get(&TypeId::of::<T>())
            .is_some_and(|id| self.storage[id.index()].is_some())
    }

    /// Whether a value for the ID is present.
    pub fn has_id(&self, id: ResourceId) -> bool {
        self.storage
            .get(id.index())
            .is_some_and(Option::is_some)
    }

    /// Removes all values, keeping registrations.
    pub(crate) fn reset(&mut self) {
        for slot in &mut self.storage {
            *slot = None;
        }
    }
}
