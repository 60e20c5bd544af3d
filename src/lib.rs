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

//! An archetype-graph ECS with entity relations.
//!
//! Entities are lightweight generational handles; their components live in
//! columnar archetypes, one per unique component composition. Archetypes are
//! connected into a graph with precomputed add/remove transitions, so moving
//! an entity between compositions is a couple of indexed lookups. Relation
//! components additionally partition archetypes by a target entity, which
//! makes "all children of X"-style queries O(1) to dispatch.
//!
//! The core is type-erased: component data is moved as raw bytes addressed
//! by [`ComponentId`], and components must be [`bytemuck::Pod`]. Typed
//! wrappers are intentionally out of scope.
//!
//! ```
//! use bytemuck::{Pod, Zeroable};
//! use lattice_ecs::{Component, Filter, World};
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Zeroable, Pod)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//! impl Component for Position {}
//!
//! let mut world = World::new();
//! let pos_id = world.component_id::<Position>();
//!
//! let entity = world.new_entity(&[pos_id]);
//!
//! let mut query = world.query(&Filter::all(&[pos_id]));
//! while query.next() {
//!     assert_eq!(query.entity(), entity);
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod component;
pub mod entity;
pub mod event;
pub mod filter;
pub mod mask;
pub mod query;
pub mod resources;
pub mod stats;
pub mod world;

mod archetype;
mod bitset;
mod id_map;
mod node;
mod pool;
mod registry;
mod util;

// Re-exports for convenience
pub use batch::Batch;
pub use cache::CacheEntry;
pub use component::{Comp, Component, ComponentId};
pub use entity::Entity;
pub use event::{EntityEvent, Listener};
pub use filter::{CachedFilter, Filter};
pub use mask::{Mask, MAX_COMPONENTS};
pub use query::Query;
pub use resources::{ResourceId, Resources};
pub use world::{Config, World};
