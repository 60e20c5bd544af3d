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

//! Batch structural operations.

use bytemuck::{Pod, Zeroable};
use lattice_ecs::{Comp, Component, Entity, Filter, World};

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

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
struct ChildOf;
impl Component for ChildOf {
    const IS_RELATION: bool = true;
}

#[test]
fn test_new_entities() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    world.batch().new_entities(100, &[pos, vel]);

    assert_eq!(world.query(&Filter::all(&[pos, vel])).count(), 100);
    assert_eq!(world.stats().entities.used, 100);
}

#[test]
fn test_new_entities_q() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();

    let mut query = world.batch().new_entities_q(50, &[pos]);
    assert_eq!(query.count(), 50);
    let mut initialized = 0;
    while query.next() {
        let p = unsafe { &mut *(query.get(pos) as *mut Position) };
        p.x = 100.0;
        initialized += 1;
    }
    assert_eq!(initialized, 50);
    drop(query);
    assert!(!world.is_locked());

    let mut query = world.query(&Filter::all(&[pos]));
    while query.next() {
        assert_eq!(unsafe { *(query.get(pos) as *const Position) }.x, 100.0);
    }
}

#[test]
fn test_new_entities_with_values() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();

    world
        .batch()
        .new_entities_with(10, &[Comp::new(pos, &Position { x: 7.0, y: 8.0 })]);

    let mut query = world.query(&Filter::all(&[pos]));
    let mut count = 0;
    while query.next() {
        assert_eq!(
            unsafe { *(query.get(pos) as *const Position) },
            Position { x: 7.0, y: 8.0 }
        );
        count += 1;
    }
    assert_eq!(count, 10);
    drop(query);

    let mut query = world
        .batch()
        .new_entities_with_q(5, &[Comp::new(pos, &Position { x: 1.0, y: 2.0 })]);
    assert_eq!(query.count(), 5);
    while query.next() {
        assert_eq!(
            unsafe { *(query.get(pos) as *const Position) },
            Position { x: 1.0, y: 2.0 }
        );
    }
}

#[test]
fn test_batch_add_remove() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    world.batch().new_entities(100, &[pos]);

    world.batch().add(&Filter::all(&[pos]), &[vel]);
    assert_eq!(world.query(&Filter::all(&[pos, vel])).count(), 100);

    world.batch().remove(&Filter::all(&[pos, vel]), &[vel]);
    assert_eq!(world.query(&Filter::all(&[pos, vel])).count(), 0);
    assert_eq!(world.query(&Filter::all(&[pos])).count(), 100);
}

#[test]
fn test_batch_add_q() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    world.batch().new_entities(100, &[pos]);

    let mut query = world.batch().add_q(&Filter::all(&[pos]), &[vel]);
    assert_eq!(query.count(), 100);
    while query.next() {
        assert!(query.has(pos));
        assert!(query.has(vel));
        let v = unsafe { &mut *(query.get(vel) as *mut Velocity) };
        v.x = 1.0;
    }
    drop(query);
    assert!(!world.is_locked());
}

#[test]
fn test_batch_exchange() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    world.batch().new_entities(100, &[pos]);

    let mut query = world
        .batch()
        .exchange_q(&Filter::all(&[pos]), &[vel], &[pos]);
    assert_eq!(query.count(), 100);
    while query.next() {
        assert!(query.has(vel));
        assert!(!query.has(pos));
    }
    drop(query);

    // exchanging nothing is a no-op
    world.batch().exchange(&Filter::all(&[vel]), &[], &[]);
    assert_eq!(world.query(&Filter::all(&[vel])).count(), 100);
}

#[test]
fn test_batch_preserves_values_and_locations() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    let entities: Vec<Entity> = (0..50)
        .map(|i| {
            world.new_entity_with(&[Comp::new(pos, &Position { x: i as f64, y: 0.0 })])
        })
        .collect();

    world.batch().add(&Filter::all(&[pos]), &[vel]);

    for (i, &e) in entities.iter().enumerate() {
        let p = unsafe { *(world.get(e, pos) as *const Position) };
        assert_eq!(p.x, i as f64);
        assert!(world.has(e, vel));
    }
}

#[test]
fn test_remove_entities() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    world.batch().new_entities(100, &[pos]);
    world.batch().new_entities(30, &[pos, vel]);

    let removed = world.batch().remove_entities(&Filter::all(&[pos]).exclusive());
    assert_eq!(removed, 100);
    assert_eq!(world.query(&Filter::all(&[pos])).count(), 30);
    assert_eq!(world.stats().entities.used, 30);

    let removed = world.batch().remove_entities(&Filter::all(&[]));
    assert_eq!(removed, 30);
    assert_eq!(world.query(&Filter::all(&[])).count(), 0);
}

#[test]
fn test_batch_set_relation() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let rel = world.component_id::<ChildOf>();

    let t1 = world.new_entity(&[pos]);
    let t2 = world.new_entity(&[pos]);
    let t3 = world.new_entity(&[pos]);

    world.batch().new_entities_target(100, rel, t1, &[rel]);
    world.batch().new_entities_target(100, rel, t2, &[rel]);
    world.batch().new_entities_target(100, rel, t3, &[rel]);

    // retarget t2's children to t1
    let filter = Filter::relation(Filter::all(&[rel]), t2);
    let mut query = world.batch().set_relation_q(&filter, rel, t1);
    assert_eq!(query.count(), 100);
    let mut count = 0;
    while query.next() {
        assert_eq!(query.relation(rel), t1);
        count += 1;
    }
    assert_eq!(count, 100);
    drop(query);

    // retarget everything to t3
    let mut query = world.batch().set_relation_q(&Filter::all(&[rel]), rel, t3);
    assert_eq!(query.count(), 300);
    count = 0;
    while query.next() {
        assert_eq!(query.relation(rel), t3);
        count += 1;
    }
    assert_eq!(count, 300);
    drop(query);

    // clear all targets
    let filter = Filter::relation(Filter::all(&[rel]), t3);
    let mut query = world.batch().set_relation_q(&filter, rel, Entity::ZERO);
    assert_eq!(query.count(), 300);
    while query.next() {
        assert!(query.relation(rel).is_zero());
    }
}

#[test]
#[should_panic(expected = "dead entity a relation target")]
fn test_batch_set_relation_dead_target() {
    let mut world = World::new();
    let rel = world.component_id::<ChildOf>();

    let target = world.new_entity(&[]);
    world.batch().new_entities_target(10, rel, target, &[rel]);
    world.remove_entity(target);

    // children archetype is non-empty, so the archetype survived;
    // retargeting to the dead entity must panic
    world.batch().set_relation(&Filter::all(&[rel]), rel, target);
}

#[test]
fn test_remove_entities_with_relations() {
    let mut world = World::new();
    let rot = world.component_id::<Position>();
    let rel = world.component_id::<ChildOf>();

    let t1 = world.new_entity(&[]);
    let t2 = world.new_entity(&[]);

    world.batch().new_entities_target(10, rel, t1, &[rot, rel]);
    world.batch().new_entities_target(10, rel, t2, &[rot, rel]);

    let filter = Filter::relation(Filter::all(&[rot, rel]), t1);
    assert_eq!(world.batch().remove_entities(&filter), 10);

    let filter = Filter::relation(Filter::all(&[rot, rel]), t2);
    assert_eq!(world.batch().remove_entities(&filter), 10);

    world.batch().remove_entities(&Filter::all(&[]));

    assert_eq!(world.query(&Filter::all(&[])).count(), 0);
    assert_eq!(world.stats().entities.used, 0);
}

#[test]
fn test_new_entities_target_q() {
    let mut world = World::new();
    let rel = world.component_id::<ChildOf>();

    let target = world.new_entity(&[]);
    let mut query = world.batch().new_entities_target_q(20, rel, target, &[rel]);
    assert_eq!(query.count(), 20);
    while query.next() {
        assert_eq!(query.relation(rel), target);
    }
    drop(query);

    assert_eq!(
        world
            .query(&Filter::relation(Filter::all(&[rel]), target))
            .count(),
        20
    );
}

#[test]
fn test_batch_reuses_recycled_entities() {
    let mut world = World::new();
    let pos = world.component_id::<Position>();

    world.batch().new_entities(10, &[pos]);
    world.batch().remove_entities(&Filter::all(&[pos]));
    world.batch().new_entities(10, &[pos]);

    let stats = world.stats();
    assert_eq!(stats.entities.used, 10);
    // recycled slots were reused, no new ones created
    assert_eq!(stats.entities.total, 10);
}
