// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the storefront engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded ledger operations and checkout
//! - Order cancellation with stock restore
//! - Parallel checkout under varying contention
//! - Scaling with number of threads

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use storefront_core::{NewProduct, OrderLine, ProductId, ShippingInfo, Shop, UserId};

// =============================================================================
// Helper Functions
// =============================================================================

fn shop_with_products(count: u32, stock: u32) -> (Shop, Vec<ProductId>) {
    let shop = Shop::new();
    let ids = (0..count)
        .map(|i| {
            shop.add_product(
                NewProduct::new(format!("P{i}"), format!("SKU-{i}"), Decimal::new(1999, 2))
                    .with_stock(stock),
            )
            .unwrap()
        })
        .collect();
    (shop, ids)
}

fn shipping() -> ShippingInfo {
    ShippingInfo::new("12 Market Street, Springfield")
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_reserve_release(c: &mut Criterion) {
    let (shop, ids) = shop_with_products(1, 1_000);
    let id = ids[0];

    c.bench_function("reserve_release", |b| {
        b.iter(|| {
            shop.inventory().reserve(black_box(id), 1).unwrap();
            shop.inventory().release(black_box(id), 1).unwrap();
        })
    });
}

fn bench_checkout_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout_lines");

    for lines in [1u32, 5, 20].iter() {
        group.throughput(Throughput::Elements(u64::from(*lines)));
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, &lines| {
            let (shop, ids) = shop_with_products(lines, u32::MAX);
            let order: Vec<OrderLine> = ids.iter().map(|&id| OrderLine::new(id, 1)).collect();
            b.iter(|| {
                shop.place_order(UserId(1), black_box(&order), shipping())
                    .unwrap();
            })
        });
    }
    group.finish();
}

fn bench_checkout_then_cancel(c: &mut Criterion) {
    let (shop, ids) = shop_with_products(3, 10);
    let order: Vec<OrderLine> = ids.iter().map(|&id| OrderLine::new(id, 2)).collect();

    c.bench_function("checkout_then_cancel", |b| {
        b.iter(|| {
            let placed = shop.place_order(UserId(1), &order, shipping()).unwrap();
            shop.cancel(black_box(placed.id())).unwrap();
        })
    });
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_orders = 10_000u32;

    // Fewer products = more threads competing for the same stock rows
    for num_products in [1u32, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(u64::from(total_orders)));
        group.bench_with_input(
            BenchmarkId::new("products", num_products),
            num_products,
            |b, &num_products| {
                b.iter(|| {
                    let (shop, ids) = shop_with_products(num_products, total_orders);
                    let shop = Arc::new(shop);

                    (0..total_orders).into_par_iter().for_each(|i| {
                        let id = ids[(i % num_products) as usize];
                        shop.place_order(UserId(i), &[OrderLine::new(id, 1)], shipping())
                            .unwrap();
                    });

                    black_box(&shop);
                })
            },
        );
    }
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_orders = 20_000u32;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(u64::from(total_orders)));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    let (shop, ids) = shop_with_products(100, total_orders);

                    pool.install(|| {
                        (0..total_orders).into_par_iter().for_each(|i| {
                            let lines = [
                                OrderLine::new(ids[(i % 100) as usize], 1),
                                OrderLine::new(ids[((i + 37) % 100) as usize], 1),
                            ];
                            shop.place_order(UserId(i), &lines, shipping()).unwrap();
                        });
                    });

                    black_box(&shop);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_checkout_lines,
    bench_checkout_then_cancel,
    bench_contention,
    bench_thread_scaling,
);
criterion_main!(benches);
