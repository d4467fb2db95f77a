use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chrono::Utc;

use wego::core::score::contention_score;
use wego::game::resolve::{plan_resolution, resolve_turn};
use wego::game::state::{CountryId, Order, OrderId, OrderStatus, OrderType, ProvinceId, Turn};
use wego::MemoryStore;
use wego::TurnStore;

/// `countries` countries each claiming `targets` provinces out of a shared pool.
fn claims(turn: &Turn, countries: usize, targets: usize) -> Vec<Order> {
    let mut orders = Vec::with_capacity(countries * targets);
    for c in 0..countries {
        for t in 0..targets {
            orders.push(Order {
                id: OrderId::generate(),
                turn_id: turn.id,
                country_id: CountryId::new(format!("country-{c:02}")),
                order_type: OrderType::ClaimTarget,
                target_id: ProvinceId::new(format!("p{:03}", (c * 7 + t) % (targets * 2))),
                secondary_target_id: None,
                status: OrderStatus::Planned,
            });
        }
    }
    orders
}

fn bench_score(c: &mut Criterion) {
    c.bench_function("contention_score", |b| {
        b.iter(|| contention_score(black_box("a3f9c2"), black_box("country-07"), black_box("p042")))
    });
}

fn bench_plan(c: &mut Criterion) {
    let now = Utc::now();
    let turn = Turn::open(1, "bench-seed".into(), now, now);

    let mut group = c.benchmark_group("plan_resolution");
    for countries in [2usize, 8, 32] {
        let orders = claims(&turn, countries, 20);
        group.bench_with_input(BenchmarkId::from_parameter(countries), &orders, |b, orders| {
            b.iter(|| plan_resolution(black_box(&turn), black_box(orders)))
        });
    }
    group.finish();
}

fn bench_resolve_turn(c: &mut Criterion) {
    let now = Utc::now();
    let turn = Turn::open(1, "bench-seed".into(), now, now);
    let mut store = MemoryStore::new();
    store.insert_turn(&turn).unwrap();
    for order in claims(&turn, 16, 20) {
        store.upsert_order(&order).unwrap();
    }

    // Re-resolving is idempotent, so the same store is reused.
    c.bench_function("resolve_turn_16x20", |b| {
        b.iter(|| resolve_turn(black_box(&mut store), black_box(&turn), 1).unwrap())
    });
}

criterion_group!(benches, bench_score, bench_plan, bench_resolve_turn);
criterion_main!(benches);
