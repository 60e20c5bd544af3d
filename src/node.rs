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

//! Nodes of the archetype graph.

use ahash::AHashMap;

use crate::archetype::IdList;
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::filter::Filter;
use crate::id_map::IdMap;
use crate::mask::Mask;

/// A vertex of the archetype graph: one unique component mask.
///
/// Nodes own precomputed transitions to neighboring masks (add one component,
/// remove one component) and the archetypes storing entities of their mask —
/// exactly one for non-relation nodes, one per distinct relation target for
/// relation nodes. Nodes are created on demand and never destroyed.
pub(crate) struct Node {
    pub mask: Mask,
    /// Component IDs of the mask, ascending. Canonical iteration order for
    /// column copies.
    pub ids: IdList,
    /// The node's relation component, if the mask contains one.
    pub relation: Option<ComponentId>,
    /// Row growth quantum for this node's archetypes.
    pub capacity_increment: u32,
    /// Destination node when a component is added, keyed by component ID.
    pub transition_add: IdMap<u32>,
    /// Destination node when a component is removed, keyed by component ID.
    pub transition_remove: IdMap<u32>,
    /// Arena indices of this node's archetypes. Deactivated relation
    /// archetypes stay listed for later reuse.
    pub archetypes: Vec<u32>,
    /// Relation target to archetype, for relation nodes.
    pub by_target: AHashMap<Entity, u32>,
    /// Whether any archetype was ever created under this node. Never reverts.
    pub is_active: bool,
}

impl Node {
    pub fn new(mask: Mask, relation: Option<ComponentId>, capacity_increment: u32) -> Self {
        let ids: IdList = mask.ids().collect();
        Self {
            mask,
            ids,
            relation,
            capacity_increment,
            transition_add: IdMap::new(),
            transition_remove: IdMap::new(),
            archetypes: Vec::new(),
            by_target: AHashMap::new(),
            is_active: false,
        }
    }

    #[inline]
    pub fn has_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// The archetype for the given relation target. For non-relation nodes
    /// the target is ignored and the single archetype is returned.
    pub fn get_archetype(&self, target: Entity) -> Option<u32> {
        if self.has_relation() {
            self.by_target.get(&target).copied()
        } else {
            self.archetypes.first().copied()
        }
    }

    /// Whether the node's mask satisfies the filter. The relation-target
    /// restriction of relation filters is applied by the caller.
    #[inline]
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches(&self.mask)
    }
}
