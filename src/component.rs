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

//! Component identifiers and the untyped component value carrier.

use bytemuck::Pod;

/// Identifier of a registered component type.
///
/// IDs are assigned by the [`World`](crate::world::World) on first use of a
/// type, in registration order, and stay fixed for the world's lifetime.
/// At most [`MAX_COMPONENTS`](crate::mask::MAX_COMPONENTS) types can be
/// registered per world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Creates a component ID from a raw index.
    ///
    /// Mostly useful in tests; regular code obtains IDs from
    /// [`World::component_id`](crate::world::World::component_id).
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// The raw index of this ID.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Marker trait for component types.
///
/// Components are plain data: they must be [`Pod`], so the storage layer can
/// move them by byte copy and release them by zeroing, without drop glue.
///
/// A component type declares itself a *relation* component by overriding
/// [`IS_RELATION`](Component::IS_RELATION). An entity holding a relation
/// component is additionally associated with a target entity; see
/// [`World::set_relation`](crate::world::World::set_relation).
///
/// # Example
/// ```
/// use bytemuck::{Pod, Zeroable};
/// use lattice_ecs::Component;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Zeroable, Pod)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Position {}
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Zeroable, Pod)]
/// struct ChildOf;
///
/// impl Component for ChildOf {
///     const IS_RELATION: bool = true;
/// }
/// ```
pub trait Component: Pod + 'static {
    /// Whether this component carries an entity relation.
    const IS_RELATION: bool = false;
}

/// An untyped component value: an ID paired with the raw bytes of one value.
///
/// Used by [`World::new_entity_with`](crate::world::World::new_entity_with)
/// and [`World::assign`](crate::world::World::assign) to pass component data
/// through the type-erased core.
#[derive(Debug, Clone, Copy)]
pub struct Comp<'a> {
    pub(crate) id: ComponentId,
    pub(crate) bytes: &'a [u8],
}

impl<'a> Comp<'a> {
    /// Wraps a component value for untyped transfer.
    pub fn new<T: Component>(id: ComponentId, value: &'a T) -> Self {
        Self {
            id,
            bytes: bytemuck::bytes_of(value),
        }
    }

    /// The component ID this value belongs to.
    pub fn id(&self) -> ComponentId {
        self.id
    }
}
