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

//! Incrementally maintained filter-to-archetype cache.

use crate::entity::Entity;
use crate::filter::{CachedFilter, Filter};
use crate::mask::Mask;
use crate::pool::IntPool;

/// A registered filter together with the archetypes currently matching it.
pub struct CacheEntry {
    pub(crate) filter: Filter,
    pub(crate) archetypes: Vec<u32>,
}

impl CacheEntry {
    /// The filter this entry was registered with.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Number of archetypes currently matching the filter.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }
}

/// Tracks which archetypes match each registered filter.
///
/// Membership changes only on archetype creation, reactivation and
/// retirement — never on row-level changes — so queries over cached filters
/// skip graph traversal entirely.
pub(crate) struct FilterCache {
    entries: Vec<Option<CacheEntry>>,
    ids: IntPool,
}

impl FilterCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            ids: IntPool::new(16),
        }
    }

    /// Registers a filter; `archetypes` are the currently matching ones.
    /// Panics when passed an already-cached filter.
    pub fn register(&mut self, filter: Filter, archetypes: Vec<u32>) -> CachedFilter {
        if matches!(filter, Filter::Cached(_)) {
            panic!("filter is already registered, can't register");
        }
        let id = self.ids.get();
        let cached = CachedFilter {
            id,
            filter: Box::new(filter.clone()),
        };
        if self.entries.len() <= id as usize {
            self.entries.resize_with(id as usize + 1, || None);
        }
        self.entries[id as usize] = Some(CacheEntry { filter, archetypes });
        cached
    }

    /// Releases a registered filter, returning the original filter.
    /// Panics for unknown handles.
    pub fn unregister(&mut self, cached: &CachedFilter) -> Filter {
        let entry = self
            .entries
            .get_mut(cached.id as usize)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("no filter registered with this ID, can't unregister"));
        self.ids.recycle(cached.id);
        entry.filter
    }

    /// The entry for a registered filter. Panics for unknown handles.
    pub fn get(&self, cached: &CachedFilter) -> &CacheEntry {
        self.entry_by_id(cached.id)
    }

    /// The entry for a raw filter ID. Panics for unknown IDs.
    pub fn entry_by_id(&self, id: u32) -> &CacheEntry {
        self.entries
            .get(id as usize)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("no filter registered with this ID"))
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Records a created or reactivated archetype in every matching entry.
    pub fn add_archetype(&mut self, index: u32, mask: &Mask, target: Entity) {
        for entry in self.entries.iter_mut().flatten() {
            if !entry.filter.matches(mask) {
                continue;
            }
            if let Some(required) = entry.filter.relation_target() {
                if required != target {
                    continue;
                }
            }
            entry.archetypes.push(index);
        }
    }

    /// Evicts a retired archetype from every entry containing it.
    pub fn remove_archetype(&mut self, index: u32) {
        for entry in self.entries.iter_mut().flatten() {
            if let Some(pos) = entry.archetypes.iter().position(|&a| a == index) {
                entry.archetypes.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;

    fn id(index: u8) -> ComponentId {
        ComponentId::new(index)
    }

    #[test]
    fn test_register_unregister() {
        let mut cache = FilterCache::new();

        let f1 = cache.register(Filter::all(&[id(0)]), vec![1, 2]);
        let f2 = cache.register(Filter::all(&[id(1)]), vec![2]);
        assert_eq!(f1.id, 0);
        assert_eq!(f2.id, 1);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.get(&f1).archetype_count(), 2);
        assert_eq!(cache.get(&f2).archetype_count(), 1);

        let original = cache.unregister(&f1);
        assert_eq!(original, Filter::all(&[id(0)]));
        assert_eq!(cache.len(), 1);

        // the freed ID is recycled
        let f3 = cache.register(Filter::all(&[id(2)]), vec![]);
        assert_eq!(f3.id, 0);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_register_cached() {
        let mut cache = FilterCache::new();
        let cached = cache.register(Filter::all(&[id(0)]), vec![]);
        cache.register(Filter::Cached(cached), vec![]);
    }

    #[test]
    #[should_panic(expected = "can't unregister")]
    fn test_unregister_unknown() {
        let mut cache = FilterCache::new();
        let cached = cache.register(Filter::all(&[id(0)]), vec![]);
        cache.unregister(&cached);
        cache.unregister(&cached);
    }

    #[test]
    fn test_incremental_maintenance() {
        let mut cache = FilterCache::new();
        let target = Entity::new(9, 0);

        let plain = cache.register(Filter::all(&[id(0)]), vec![]);
        let related =
            cache.register(Filter::relation(Filter::all(&[id(0)]), target), vec![]);

        let mask = Mask::from_ids(&[id(0), id(1)]);
        cache.add_archetype(7, &mask, Entity::ZERO);
        cache.add_archetype(8, &mask, target);

        assert_eq!(cache.get(&plain).archetypes, vec![7, 8]);
        assert_eq!(cache.get(&related).archetypes, vec![8]);

        cache.remove_archetype(8);
        assert_eq!(cache.get(&plain).archetypes, vec![7]);
        assert_eq!(cache.get(&related).archetypes, Vec::<u32>::new());

        // non-matching mask is ignored
        cache.add_archetype(9, &Mask::from_ids(&[id(1)]), Entity::ZERO);
        assert_eq!(cache.get(&plain).archetypes, vec![7]);
    }
}
