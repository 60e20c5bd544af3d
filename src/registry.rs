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

//! Component type registration.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::component::{Component, ComponentId};
use crate::mask::{Mask, MAX_COMPONENTS};
use crate::util::align_to;

/// Metadata recorded for a registered component type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeInfo {
    pub type_id: TypeId,
    /// Element size in bytes. Always a multiple of `align`; may be zero for
    /// tag components.
    pub size: usize,
    pub align: usize,
    pub name: &'static str,
}

impl TypeInfo {
    fn of<T: Component>() -> Self {
        let align = std::mem::align_of::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            size: align_to(std::mem::size_of::<T>(), align),
            align,
            name: std::any::type_name::<T>(),
        }
    }
}

/// Keeps track of component IDs.
///
/// IDs are assigned in registration order and are never reused. Registration
/// past [`MAX_COMPONENTS`] panics.
pub(crate) struct ComponentRegistry {
    components: FxHashMap<TypeId, ComponentId>,
    types: Vec<TypeInfo>,
    pub used: Mask,
    pub is_relation: Mask,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: FxHashMap::default(),
            types: Vec::new(),
            used: Mask::ZERO,
            is_relation: Mask::ZERO,
        }
    }

    /// Returns the ID for a component type, registering it if needed.
    pub fn component_id<T: Component>(&mut self) -> ComponentId {
        if let Some(&id) = self.components.get(&TypeId::of::<T>()) {
            return id;
        }
        self.register::<T>()
    }

    fn register<T: Component>(&mut self) -> ComponentId {
        let index = self.components.len();
        if index >= MAX_COMPONENTS {
            panic!("maximum of {} component types exceeded", MAX_COMPONENTS);
        }
        let id = ComponentId::new(index as u8);
        self.components.insert(TypeId::of::<T>(), id);
        self.types.push(TypeInfo::of::<T>());
        self.used.set(id, true);
        if T::IS_RELATION {
            self.is_relation.set(id, true);
        }
        id
    }

    /// Metadata of a registered ID. Panics for unassigned IDs.
    #[inline]
    pub fn type_info(&self, id: ComponentId) -> &TypeInfo {
        &self.types[id.index()]
    }

    /// The `TypeId` registered for an ID, if the ID is in use.
    pub fn component_type(&self, id: ComponentId) -> Option<TypeId> {
        if self.used.get(id) {
            Some(self.types[id.index()].type_id)
        } else {
            None
        }
    }

    /// Human-readable type name for panic messages.
    pub fn type_name(&self, id: ComponentId) -> &'static str {
        if self.used.get(id) {
            self.types[id.index()].name
        } else {
            "<unregistered>"
        }
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.components.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable, Pod)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable, Pod)]
    struct Tag;
    impl Component for Tag {}

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable, Pod)]
    struct ChildOf;
    impl Component for ChildOf {
        const IS_RELATION: bool = true;
    }

    #[test]
    fn test_registration() {
        let mut registry = ComponentRegistry::new();

        let pos = registry.component_id::<Position>();
        let tag = registry.component_id::<Tag>();
        let rel = registry.component_id::<ChildOf>();

        assert_eq!(pos, ComponentId::new(0));
        assert_eq!(tag, ComponentId::new(1));
        assert_eq!(rel, ComponentId::new(2));

        // repeated registration returns the same ID
        assert_eq!(registry.component_id::<Position>(), pos);
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.type_info(pos).size, 8);
        assert_eq!(registry.type_info(tag).size, 0);

        assert!(!registry.is_relation.get(pos));
        assert!(registry.is_relation.get(rel));

        assert_eq!(
            registry.component_type(pos),
            Some(TypeId::of::<Position>())
        );
        assert_eq!(registry.component_type(ComponentId::new(3)), None);
    }
}
