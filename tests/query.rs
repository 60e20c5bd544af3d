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

//! Query iteration, filtering, stepping and lock lifetime.

use bytemuck::{Pod, Zeroable};
use lattice_ecs::{Comp, Component, Filter, Mask, World};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
struct Velocity {
    x: f64,
    y: f64,
}
impl Component for Velocity {}

fn read<T: Component>(ptr: *mut u8) -> T {
    assert!(!ptr.is_null());
    unsafe { *(ptr as *const T) }
}

/// 5 entities with `(Position)`, 5 with `(Position, Velocity)`, 3 with
/// `(Velocity)`; `Position.x` enumerates creation order within the filter
/// `all(Position)`.
fn populated_world() -> (World, lattice_ecs::ComponentId, lattice_ecs::ComponentId) {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    for i in 0..5 {
        world.new_entity_with(&[Comp::new(pos, &Position { x: i as f64, y: 0.0 })]);
    }
    for i in 5..10 {
        world.new_entity_with(&[
            Comp::new(pos, &Position { x: i as f64, y: 0.0 }),
            Comp::new(vel, &Velocity { x: 1.0, y: 0.0 }),
        ]);
    }
    for _ in 0..3 {
        world.new_entity(&[vel]);
    }

    (world, pos, vel)
}

#[test]
fn test_count_equals_iteration() {
    let (world, pos, vel) = populated_world();

    for filter in [
        Filter::all(&[]),
        Filter::all(&[pos]),
        Filter::all(&[vel]),
        Filter::all(&[pos, vel]),
        Filter::all(&[pos]).without(&[vel]),
        Filter::all(&[pos]).exclusive(),
    ] {
        let count = world.query(&filter).count();
        let mut iterated = 0;
        let mut query = world.query(&filter);
        while query.next() {
            iterated += 1;
        }
        assert_eq!(count, iterated, "count mismatch for {:?}", filter);
    }
}

#[test]
fn test_iteration_values() {
    let (world, pos, vel) = populated_world();

    let mut query = world.query(&Filter::all(&[pos]));
    let mut expected = 0.0;
    while query.next() {
        let p = read::<Position>(query.get(pos));
        assert_eq!(p.x, expected);
        assert_eq!(query.has(pos), true);
        assert_eq!(query.has(vel), expected >= 5.0);
        assert!(query.mask().get(pos));
        expected += 1.0;
    }
    assert_eq!(expected, 10.0);
}

#[test]
fn test_filter_variants() {
    let (world, pos, vel) = populated_world();

    assert_eq!(world.query(&Filter::all(&[])).count(), 13);
    assert_eq!(world.query(&Filter::all(&[pos])).count(), 10);
    assert_eq!(world.query(&Filter::all(&[pos]).without(&[vel])).count(), 5);
    assert_eq!(world.query(&Filter::all(&[pos]).exclusive()).count(), 5);
    assert_eq!(world.query(&Filter::all(&[vel]).exclusive()).count(), 3);
    assert_eq!(world.query(&Filter::all(&[pos, vel])).count(), 5);
}

#[test]
fn test_write_through_query() {
    let (world, pos, _) = populated_world();

    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {
        let p = unsafe { &mut *(query.get(pos) as *mut Position) };
        p.y = p.x * 2.0;
    }

    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {
        let p = read::<Position>(query.get(pos));
        assert_eq!(p.y, p.x * 2.0);
    }
}

#[test]
fn test_set_during_iteration() {
    let (world, pos, _) = populated_world();

    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {
        let entity = query.entity();
        world.set(entity, pos, bytemuck::bytes_of(&Position { x: -1.0, y: 0.0 }));
    }

    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {
        assert_eq!(read::<Position>(query.get(pos)).x, -1.0);
    }
}

#[test]
fn test_step() {
    let (world, pos, _) = populated_world();

    // step(1) behaves exactly like next()
    let mut q1 = world.query(&Filter::all(&[pos]));
    let mut q2 = world.query(&Filter::all(&[pos]));
    while q1.next() {
        assert!(q2.step(1));
        assert_eq!(q1.entity(), q2.entity());
    }
    assert!(!q2.step(1));

    // stepping across the archetype boundary
    let mut query = world.query(&Filter::all(&[pos]));
    assert!(query.step(6));
    assert_eq!(read::<Position>(query.get(pos)).x, 5.0);
    assert!(query.step(4));
    assert_eq!(read::<Position>(query.get(pos)).x, 9.0);
    assert!(!query.step(1));

    // stepping past the end
    let mut query = world.query(&Filter::all(&[pos]));
    assert!(!query.step(11));
}

#[test]
#[should_panic(expected = "step size must be positive")]
fn test_step_zero() {
    let (world, pos, _) = populated_world();
    let mut query = world.query(&Filter::all(&[pos]));
    query.step(0);
}

#[test]
fn test_query_lock_lifetime() {
    let (world, pos, _) = populated_world();

    assert!(!world.is_locked());
    {
        let mut query = world.query(&Filter::all(&[pos]));
        query.next();
        assert!(world.is_locked());
        query.close();
        assert!(!world.is_locked());
    }

    // natural exhaustion closes the query
    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {}
    assert!(!world.is_locked());

    // dropping an open query releases the lock
    {
        let mut query = world.query(&Filter::all(&[pos]));
        query.next();
        assert!(world.is_locked());
    }
    assert!(!world.is_locked());

    // count does not close the query
    let mut query = world.query(&Filter::all(&[pos]));
    assert_eq!(query.count(), 10);
    assert!(world.is_locked());
    assert!(query.next());
    query.close();
}

#[test]
fn test_nested_queries() {
    let (world, pos, vel) = populated_world();

    let mut outer = world.query(&Filter::all(&[pos]));
    let mut pairs = 0;
    while outer.next() {
        let mut inner = world.query(&Filter::all(&[vel]));
        while inner.next() {
            pairs += 1;
        }
    }
    assert_eq!(pairs, 10 * 8);
    assert!(!world.is_locked());
}

#[test]
#[should_panic(expected = "already closed")]
fn test_double_close() {
    let (world, pos, _) = populated_world();
    let mut query = world.query(&Filter::all(&[pos]));
    query.close();
    query.close();
}

#[test]
#[should_panic(expected = "query is closed")]
fn test_use_after_close() {
    let (world, pos, _) = populated_world();
    let mut query = world.query(&Filter::all(&[pos]));
    query.close();
    query.next();
}

#[test]
#[should_panic(expected = "query is closed")]
fn test_use_after_exhaustion() {
    let (world, pos, _) = populated_world();
    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {}
    query.next();
}

#[test]
fn test_query_empty_world() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();

    let mut query = world.query(&Filter::all(&[pos]));
    assert_eq!(query.count(), 0);
    assert!(!query.next());
    assert!(!world.is_locked());
}

#[test]
fn test_query_skips_emptied_archetypes() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    let e1 = world.new_entity(&[pos]);
    world.new_entity(&[pos, vel]);

    // empty the (Position) archetype; iteration must skip it
    world.add(e1, &[vel]);

    let mut query = world.query(&Filter::all(&[pos]));
    let mut count = 0;
    while query.next() {
        assert_eq!(query.mask(), Mask::from_ids(&[pos, vel]));
        count += 1;
    }
    assert_eq!(count, 2);
}

#[test]
fn test_mask_filter_on_query() {
    let (world, pos, vel) = populated_world();

    let without = Filter::all(&[pos]).without(&[vel]);
    let mut query = world.query(&without);
    while query.next() {
        assert!(!query.has(vel));
    }

    let exclusive = Filter::all(&[vel]).exclusive();
    let mut query = world.query(&exclusive);
    while query.next() {
        assert_eq!(query.mask(), Mask::from_ids(&[vel]));
    }
}
