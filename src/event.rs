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

//! Structural-change notifications.

use crate::archetype::IdList;
use crate::entity::Entity;
use crate::mask::Mask;

/// Describes one structural change to an entity, delivered to the world's
/// listener callback.
///
/// The listener runs under a transient world lock, so it cannot perform
/// structural mutations itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEvent {
    /// The affected entity.
    pub entity: Entity,
    /// Component mask before the change.
    pub old_mask: Mask,
    /// Component mask after the change.
    pub new_mask: Mask,
    /// IDs added by the change.
    pub added: IdList,
    /// IDs removed by the change.
    pub removed: IdList,
    /// IDs of the entity after the change, ascending.
    pub current: IdList,
    /// `+1` when the entity was created, `-1` when it was removed, `0` for
    /// composition or relation-target changes.
    pub added_removed: i8,
    /// Relation target before the change (zero when none).
    pub old_target: Entity,
    /// Relation target after the change (zero when none).
    pub new_target: Entity,
    /// Whether the change was a pure relation retarget.
    pub target_changed: bool,
}

impl EntityEvent {
    /// Whether this event reports entity creation.
    pub fn entity_added(&self) -> bool {
        self.added_removed > 0
    }

    /// Whether this event reports entity removal.
    pub fn entity_removed(&self) -> bool {
        self.added_removed < 0
    }
}

/// The world's listener callback type.
pub type Listener = Box<dyn Fn(&EntityEvent)>;

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn event(added_removed: i8) -> EntityEvent {
        EntityEvent {
            entity: Entity::ZERO,
            old_mask: Mask::ZERO,
            new_mask: Mask::ZERO,
            added: SmallVec::new(),
            removed: SmallVec::new(),
            current: SmallVec::new(),
            added_removed,
            old_target: Entity::ZERO,
            new_target: Entity::ZERO,
            target_changed: false,
        }
    }

    #[test]
    fn test_added_removed() {
        assert!(!event(0).entity_added());
        assert!(!event(0).entity_removed());

        assert!(event(1).entity_added());
        assert!(!event(1).entity_removed());

        assert!(!event(-1).entity_added());
        assert!(event(-1).entity_removed());
    }
}
