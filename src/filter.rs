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

//! Filters for selecting archetypes by component composition.

use crate::component::ComponentId;
use crate::entity::Entity;
use crate::mask::Mask;

/// A predicate over component [`Mask`]s, used to filter
/// [`Query`](crate::query::Query) iteration.
///
/// Build filters with [`Filter::all`] and refine them with
/// [`without`](Filter::without), [`exclusive`](Filter::exclusive) and
/// [`relation`](Filter::relation). Register frequently used filters with
/// [`World::register_filter`](crate::world::World::register_filter) to get a
/// [`Cached`](Filter::Cached) filter whose matching archetypes are maintained
/// incrementally.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches masks that contain all included IDs.
    All(Mask),
    /// Matches masks that contain all included and none of the excluded IDs.
    Without { include: Mask, exclude: Mask },
    /// Matches only masks exactly equal to the included IDs.
    Exclusive(Mask),
    /// Restricts an inner filter to archetypes with the given relation target.
    Relation { filter: Box<Filter>, target: Entity },
    /// A registered filter; see [`CachedFilter`].
    Cached(CachedFilter),
}

/// Handle to a filter registered with the world's filter cache.
///
/// Carries the cache slot ID and the original filter. Obtained from
/// [`World::register_filter`](crate::world::World::register_filter), wrapped
/// in [`Filter::Cached`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFilter {
    pub(crate) id: u32,
    pub(crate) filter: Box<Filter>,
}

impl Filter {
    /// A filter matching all masks that contain the given IDs.
    ///
    /// `Filter::all(&[])` matches every mask.
    pub fn all(ids: &[ComponentId]) -> Filter {
        Filter::All(Mask::from_ids(ids))
    }

    /// Excludes masks containing any of the given IDs.
    pub fn without(self, ids: &[ComponentId]) -> Filter {
        let exclude = Mask::from_ids(ids);
        match self {
            Filter::All(include) => Filter::Without { include, exclude },
            Filter::Without {
                include,
                exclude: old,
            } => {
                let mut merged = old;
                for id in exclude.ids() {
                    merged.set(id, true);
                }
                Filter::Without {
                    include,
                    exclude: merged,
                }
            }
            other => panic!("can't add exclusions to filter {:?}", other),
        }
    }

    /// Restricts the filter to masks exactly equal to the included IDs.
    pub fn exclusive(self) -> Filter {
        match self {
            Filter::All(include) => Filter::Exclusive(include),
            other => panic!("can't make filter {:?} exclusive", other),
        }
    }

    /// Restricts `filter` to archetypes whose relation target is `target`.
    pub fn relation(filter: Filter, target: Entity) -> Filter {
        Filter::Relation {
            filter: Box::new(filter),
            target,
        }
    }

    /// Whether the filter matches the given mask.
    ///
    /// Relation targets are not part of the mask; the target restriction of
    /// [`Filter::Relation`] is applied by the query engine on top of this.
    pub fn matches(&self, mask: &Mask) -> bool {
        match self {
            Filter::All(include) => include.matches(mask),
            Filter::Without { include, exclude } => {
                include.matches(mask) && !exclude.intersects(mask)
            }
            Filter::Exclusive(include) => include == mask,
            Filter::Relation { filter, .. } => filter.matches(mask),
            Filter::Cached(cached) => cached.filter.matches(mask),
        }
    }

    /// The relation target restriction, if this is a relation filter.
    pub(crate) fn relation_target(&self) -> Option<Entity> {
        match self {
            Filter::Relation { target, .. } => Some(*target),
            Filter::Cached(cached) => cached.filter.relation_target(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u8) -> ComponentId {
        ComponentId::new(index)
    }

    fn mask(ids: &[u8]) -> Mask {
        Mask::from_ids(&ids.iter().map(|&i| id(i)).collect::<Vec<_>>())
    }

    #[test]
    fn test_all() {
        let filter = Filter::all(&[id(1), id(2)]);

        assert!(filter.matches(&mask(&[1, 2])));
        assert!(filter.matches(&mask(&[1, 2, 3])));
        assert!(!filter.matches(&mask(&[1])));

        assert!(Filter::all(&[]).matches(&Mask::ZERO));
        assert!(Filter::all(&[]).matches(&mask(&[5])));
    }

    #[test]
    fn test_without() {
        let filter = Filter::all(&[id(1), id(2), id(3)]).without(&[id(4)]);

        assert!(filter.matches(&mask(&[1, 2, 3])));
        assert!(filter.matches(&mask(&[1, 2, 3, 5])));
        assert!(!filter.matches(&mask(&[1, 2])));
        assert!(!filter.matches(&mask(&[1, 2, 3, 4])));

        let extended = filter.without(&[id(5)]);
        assert!(!extended.matches(&mask(&[1, 2, 3, 5])));
    }

    #[test]
    fn test_exclusive() {
        let filter = Filter::all(&[id(1), id(2)]).exclusive();

        assert!(filter.matches(&mask(&[1, 2])));
        assert!(!filter.matches(&mask(&[1, 2, 3])));
        assert!(!filter.matches(&mask(&[1])));
    }

    #[test]
    fn test_relation() {
        let target = Entity::new(5, 0);
        let filter = Filter::relation(Filter::all(&[id(1)]), target);

        // mask matching is delegated to the inner filter
        assert!(filter.matches(&mask(&[1, 2])));
        assert!(!filter.matches(&mask(&[2])));
        assert_eq!(filter.relation_target(), Some(target));
        assert_eq!(Filter::all(&[]).relation_target(), None);
    }
}
