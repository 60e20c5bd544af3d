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

//! Compact sparse map from component IDs to values.

use crate::component::ComponentId;
use crate::mask::Mask;

const NUM_CHUNKS: usize = 8;
const CHUNK_SIZE: usize = 16;

/// Maps component IDs (`0..128`) to values of type `T`.
///
/// Memory-efficient lookup structure: keys live in 8 chunks of 16 slots that
/// are allocated lazily and freed when their last key is removed. A lookup is
/// one mask test plus two indexed fetches.
pub(crate) struct IdMap<T> {
    chunks: [Option<Box<[T; CHUNK_SIZE]>>; NUM_CHUNKS],
    used: Mask,
    chunk_used: [u8; NUM_CHUNKS],
}

impl<T: Copy + Default> IdMap<T> {
    pub fn new() -> Self {
        Self {
            chunks: std::array::from_fn(|_| None),
            used: Mask::ZERO,
            chunk_used: [0; NUM_CHUNKS],
        }
    }

    /// Returns the value at the given key, if present.
    #[inline]
    pub fn get(&self, id: ComponentId) -> Option<T> {
        if !self.used.get(id) {
            return None;
        }
        let index = id.index();
        Some(self.chunks[index / CHUNK_SIZE].as_ref().unwrap()[index % CHUNK_SIZE])
    }

    /// Returns a mutable reference to the value at the given key, if present.
    #[allow(dead_code)]
    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut T> {
        if !self.used.get(id) {
            return None;
        }
        let index = id.index();
        Some(&mut self.chunks[index / CHUNK_SIZE].as_mut().unwrap()[index % CHUNK_SIZE])
    }

    /// Sets the value at the given key, allocating its chunk if necessary.
    pub fn set(&mut self, id: ComponentId, value: T) {
        let index = id.index();
        let chunk = index / CHUNK_SIZE;
        let slot = self.chunks[chunk].get_or_insert_with(|| Box::new([T::default(); CHUNK_SIZE]));
        slot[index % CHUNK_SIZE] = value;
        if !self.used.get(id) {
            self.used.set(id, true);
            self.chunk_used[chunk] += 1;
        }
    }

    /// Removes the value at the given key, de-allocating an emptied chunk.
    #[allow(dead_code)]
    pub fn remove(&mut self, id: ComponentId) {
        if !self.used.get(id) {
            return;
        }
        let chunk = id.index() / CHUNK_SIZE;
        self.used.set(id, false);
        self.chunk_used[chunk] -= 1;
        if self.chunk_used[chunk] == 0 {
            self.chunks[chunk] = None;
        }
    }
}
