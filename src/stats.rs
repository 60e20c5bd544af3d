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

//! Inspection statistics for a [`World`](crate::world::World).

/// Entity pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStats {
    /// Entities currently alive.
    pub used: usize,
    /// Entity slots ever created.
    pub total: usize,
    /// Recycled slots waiting for reuse.
    pub recycled: usize,
    /// Reserved slot capacity.
    pub capacity: usize,
}

/// Statistics for one archetype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchetypeStats {
    /// Whether the archetype is active (deactivated relation archetypes are
    /// retained for reuse).
    pub is_active: bool,
    /// Current number of entities.
    pub size: usize,
    /// Allocated rows.
    pub capacity: usize,
    /// Approximate reserved memory in bytes.
    pub memory: usize,
}

/// Statistics for one archetype-graph node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Whether any archetype was ever created under this node.
    pub is_active: bool,
    /// Whether the node's mask contains a relation component.
    pub has_relation: bool,
    /// Number of component types in the node's mask.
    pub components: usize,
    /// Per-archetype statistics, in node list order.
    pub archetypes: Vec<ArchetypeStats>,
}

/// A snapshot of world-level statistics.
#[derive(Debug, Clone, Default)]
pub struct WorldStats {
    /// Entity pool statistics.
    pub entities: EntityStats,
    /// Number of registered component types.
    pub component_count: usize,
    /// Per-node statistics, in creation order.
    pub nodes: Vec<NodeStats>,
    /// Number of nodes with at least one archetype ever created.
    pub active_node_count: usize,
    /// Number of registered cached filters.
    pub cached_filter_count: usize,
    /// Whether any query lock is currently held.
    pub locked: bool,
}
