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

//! Benchmarks for the hot paths: creation, iteration, exchange.

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lattice_ecs::{Comp, Component, Filter, World};

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct Velocity {
    x: f64,
    y: f64,
}
impl Component for Velocity {}

const N: u32 = 10_000;

fn populated() -> World {
    let mut world = World::new();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();
    world.batch().new_entities(N, &[pos, vel]);
    world
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_10k_entities", |b| {
        let mut world = World::new();
        let pos = world.component_id::<Position>();
        let vel = world.component_id::<Velocity>();
        b.iter(|| {
            for _ in 0..N {
                black_box(world.new_entity(&[pos, vel]));
            }
            world.batch().remove_entities(&Filter::all(&[]));
        });
    });

    c.bench_function("create_10k_entities_batch", |b| {
        let mut world = World::new();
        let pos = world.component_id::<Position>();
        let vel = world.component_id::<Velocity>();
        b.iter(|| {
            world.batch().new_entities(N, &[pos, vel]);
            world.batch().remove_entities(&Filter::all(&[]));
        });
    });
}

fn bench_iterate(c: &mut Criterion) {
    let mut world = populated();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();

    c.bench_function("iterate_10k", |b| {
        let filter = Filter::all(&[pos, vel]);
        b.iter(|| {
            let mut query = world.query(&filter);
            while query.next() {
                let p = unsafe { &mut *(query.get(pos) as *mut Position) };
                let v = unsafe { &*(query.get(vel) as *const Velocity) };
                p.x += v.x;
                p.y += v.y;
            }
        });
    });

    let cached = world.register_filter(Filter::all(&[pos, vel]));
    c.bench_function("iterate_10k_cached", |b| {
        b.iter(|| {
            let mut query = world.query(&cached);
            while query.next() {
                let p = unsafe { &mut *(query.get(pos) as *mut Position) };
                p.x += 1.0;
            }
        });
    });

    c.bench_function("count_10k", |b| {
        let filter = Filter::all(&[pos]);
        b.iter(|| black_box(world.query(&filter).count()));
    });
}

fn bench_exchange(c: &mut Criterion) {
    c.bench_function("exchange_1k", |b| {
        let mut world = World::new();
        let pos = world.component_id::<Position>();
        let vel = world.component_id::<Velocity>();
        let entities: Vec<_> = (0..1_000)
            .map(|_| world.new_entity_with(&[Comp::new(pos, &Position { x: 0.0, y: 0.0 })]))
            .collect();
        b.iter(|| {
            for &e in &entities {
                world.exchange(e, &[vel], &[pos]);
            }
            for &e in &entities {
                world.exchange(e, &[pos], &[vel]);
            }
        });
    });
}

criterion_group!(benches, bench_create, bench_iterate, bench_exchange);
criterion_main!(benches);
