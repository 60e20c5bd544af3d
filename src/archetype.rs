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

//! Columnar archetype storage.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use smallvec::SmallVec;

use crate::component::{Comp, ComponentId};
use crate::entity::Entity;
use crate::id_map::IdMap;
use crate::mask::Mask;
use crate::registry::TypeInfo;
use crate::util::required_capacity;

/// A type-erased component column: a manually managed, properly aligned
/// buffer of `item_size`-byte elements.
///
/// Capacity is tracked by the owning [`Archetype`]; the buffer is always
/// fully zero-initialized beyond the live rows, so newly allocated rows start
/// out zeroed. Only components with nonzero size get a column.
struct Column {
    data: NonNull<u8>,
    item_size: usize,
    align: usize,
}

impl Column {
    fn new(item_size: usize, align: usize, capacity: u32) -> Self {
        debug_assert!(item_size > 0);
        let data = unsafe { Self::alloc_buffer(item_size, align, capacity) };
        Self {
            data,
            item_size,
            align,
        }
    }

    unsafe fn alloc_buffer(item_size: usize, align: usize, capacity: u32) -> NonNull<u8> {
        let layout = Layout::from_size_align(item_size * capacity as usize, align)
            .expect("invalid column layout");
        let ptr = alloc_zeroed(layout);
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    /// Pointer to the element at `row`.
    #[inline]
    fn ptr(&self, row: u32) -> *mut u8 {
        unsafe { self.data.as_ptr().add(row as usize * self.item_size) }
    }

    /// Reallocates the buffer from `old_cap` to `new_cap` rows, copying all
    /// existing elements. Invalidates outstanding pointers into the column.
    unsafe fn grow(&mut self, old_cap: u32, new_cap: u32) {
        let new_data = Self::alloc_buffer(self.item_size, self.align, new_cap);
        std::ptr::copy_nonoverlapping(
            self.data.as_ptr(),
            new_data.as_ptr(),
            old_cap as usize * self.item_size,
        );
        self.release(old_cap);
        self.data = new_data;
    }

    /// Copies the element at `from` over the element at `to`.
    #[inline]
    unsafe fn copy_row(&self, from: u32, to: u32) {
        std::ptr::copy_nonoverlapping(self.ptr(from), self.ptr(to), self.item_size);
    }

    /// Zeroes `count` elements starting at `start`.
    #[inline]
    fn zero_rows(&self, start: u32, count: u32) {
        unsafe {
            std::ptr::write_bytes(self.ptr(start), 0, count as usize * self.item_size);
        }
    }

    unsafe fn release(&mut self, capacity: u32) {
        let layout = Layout::from_size_align_unchecked(
            self.item_size * capacity as usize,
            self.align,
        );
        dealloc(self.data.as_ptr(), layout);
    }
}

/// A row set of entities sharing one component mask (and, under a relation
/// node, one relation target).
///
/// Stores one entity column plus one [`Column`] per nonzero-sized component.
/// Rows are dense: removal swap-fills from the last row.
pub(crate) struct Archetype {
    pub node: u32,
    pub mask: Mask,
    pub relation: Option<ComponentId>,
    pub relation_target: Entity,
    /// Position in the owning node's archetype list, or `-1` when the
    /// archetype is deactivated and eligible for reuse with a new target.
    pub index: i32,
    entities: Vec<Entity>,
    columns: Vec<Column>,
    /// Component ID to position in `columns`.
    indices: IdMap<u32>,
    /// Number of component types in the mask, including zero-sized ones.
    comp_count: usize,
    cap: u32,
    capacity_increment: u32,
}

impl Archetype {
    /// Creates storage for the given components, which must be in ascending
    /// ID order. Placeholder archetypes (`for_storage == false`) start with
    /// capacity 1, populatable ones with the node's capacity increment.
    pub fn new(
        node: u32,
        mask: Mask,
        components: &[(ComponentId, TypeInfo)],
        relation: Option<ComponentId>,
        relation_target: Entity,
        capacity_increment: u32,
        for_storage: bool,
        index: i32,
    ) -> Self {
        let cap = if for_storage { capacity_increment } else { 1 };

        let mut columns = Vec::new();
        let mut indices = IdMap::new();
        for &(id, info) in components {
            if info.size == 0 {
                continue;
            }
            indices.set(id, columns.len() as u32);
            columns.push(Column::new(info.size, info.align, cap));
        }

        Self {
            node,
            mask,
            relation,
            relation_target,
            index,
            entities: Vec::with_capacity(cap as usize),
            columns,
            indices,
            comp_count: components.len(),
            cap,
            capacity_increment,
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.entities.len() as u32
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    #[inline]
    pub fn entity(&self, row: u32) -> Entity {
        self.entities[row as usize]
    }

    pub fn set_entity(&mut self, row: u32, entity: Entity) {
        self.entities[row as usize] = entity;
    }

    #[inline]
    pub fn has(&self, id: ComponentId) -> bool {
        self.mask.get(id)
    }

    pub fn is_active(&self) -> bool {
        self.index >= 0
    }

    /// Appends `entity` and returns its row. The row's component bytes are
    /// zeroed; the caller sets values as needed.
    pub fn alloc(&mut self, entity: Entity) -> u32 {
        let row = self.len();
        self.extend(1);
        self.entities.push(entity);
        row
    }

    /// Bulk-appends `count` zero rows, growing at most once. Entities must be
    /// filled in with [`set_entity`](Archetype::set_entity).
    pub fn alloc_n(&mut self, count: u32) {
        self.extend(count);
        let new_len = self.entities.len() + count as usize;
        self.entities.resize(new_len, Entity::ZERO);
    }

    /// Appends an entity with component values; `comps` must cover exactly
    /// the archetype's component types.
    pub fn add(&mut self, entity: Entity, comps: &[Comp<'_>]) -> u32 {
        if comps.len() != self.comp_count {
            panic!(
                "invalid number of components: got {}, archetype has {}",
                comps.len(),
                self.comp_count
            );
        }
        let row = self.alloc(entity);
        for comp in comps {
            self.set(row, comp.id, comp.bytes);
        }
        row
    }

    /// Removes the row, swap-filling from the last row. Returns whether a
    /// swap happened (i.e. the removed row was not the last). The vacated
    /// last row is zeroed.
    pub fn remove(&mut self, row: u32) -> bool {
        let last = self.len() - 1;
        let swapped = row != last;
        self.entities.swap_remove(row as usize);
        if swapped {
            for column in &self.columns {
                unsafe {
                    column.copy_row(last, row);
                }
            }
        }
        self.zero_all(last);
        swapped
    }

    /// Pointer to the component cell at `row`.
    ///
    /// Returns null when the archetype has no such component; for zero-sized
    /// components, a dangling well-aligned pointer. The pointer is valid
    /// until the next column growth or structural mutation of the archetype.
    #[inline]
    pub fn get(&self, row: u32, id: ComponentId) -> *mut u8 {
        if !self.mask.get(id) {
            return std::ptr::null_mut();
        }
        match self.indices.get(id) {
            Some(column) => self.columns[column as usize].ptr(row),
            None => NonNull::<u128>::dangling().as_ptr() as *mut u8,
        }
    }

    /// Overwrites the component cell at `row` with the given bytes.
    ///
    /// Writes go through the column's raw buffer, so this is callable through
    /// a shared reference and legal while queries are open.
    pub fn set(&self, row: u32, id: ComponentId, bytes: &[u8]) -> *mut u8 {
        if !self.mask.get(id) {
            panic!("archetype has no component of the given ID");
        }
        match self.indices.get(id) {
            Some(column) => {
                let column = &self.columns[column as usize];
                assert_eq!(
                    bytes.len(),
                    column.item_size,
                    "component value has wrong size"
                );
                let dst = column.ptr(row);
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, column.item_size);
                }
                dst
            }
            None => NonNull::<u128>::dangling().as_ptr() as *mut u8,
        }
    }

    /// Overwrites the component cell at `row` from a raw source cell of the
    /// same component type (typically in another archetype).
    ///
    /// # Safety
    /// `src` must point to at least the component's registered size in bytes
    /// and must not alias the destination cell.
    pub unsafe fn set_from_ptr(&self, row: u32, id: ComponentId, src: *const u8) {
        if let Some(column) = self.indices.get(id) {
            let column = &self.columns[column as usize];
            std::ptr::copy_nonoverlapping(src, column.ptr(row), column.item_size);
        }
    }

    /// Zeroes every component cell of a row.
    pub fn zero_all(&self, row: u32) {
        for column in &self.columns {
            column.zero_rows(row, 1);
        }
    }

    /// Grows storage so that `additional` more rows fit. Capacity is rounded
    /// up to the node's capacity increment. Growth invalidates all
    /// outstanding pointers into the columns.
    pub fn extend(&mut self, additional: u32) {
        let required = self.len() + additional;
        if self.cap >= required {
            return;
        }
        let new_cap = required_capacity(required, self.capacity_increment);
        for column in &mut self.columns {
            unsafe {
                column.grow(self.cap, new_cap);
            }
        }
        self.entities.reserve(new_cap as usize - self.entities.len());
        self.cap = new_cap;
    }

    /// Removes all rows, zeroing their component bytes. Keeps the reserved
    /// memory.
    pub fn reset(&mut self) {
        let len = self.len();
        if len == 0 {
            return;
        }
        self.entities.clear();
        for column in &mut self.columns {
            column.zero_rows(0, len);
        }
    }

    /// Deactivates the archetype for later reuse with another target.
    pub fn deactivate(&mut self) {
        self.reset();
        self.index = -1;
    }

    /// Reactivates a deactivated archetype for a new relation target.
    pub fn activate(&mut self, target: Entity, index: i32) {
        self.index = index;
        self.relation_target = target;
    }

    /// Estimated memory held by this archetype's buffers, in bytes.
    pub fn memory(&self) -> usize {
        let per_row: usize = self.columns.iter().map(|c| c.item_size).sum();
        self.cap as usize * (std::mem::size_of::<Entity>() + per_row)
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for column in &mut self.columns {
            unsafe {
                column.release(self.cap);
            }
        }
    }
}

/// The ordered component IDs of a node or archetype.
pub(crate) type IdList = SmallVec<[ComponentId; 8]>;
