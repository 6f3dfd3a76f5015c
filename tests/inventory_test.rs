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

//! Integration tests for the inventory ledger.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use storefront_core::{
    CategoryId, NewProduct, ProductFilter, ProductId, Shop, StockAdjustment, StockLevel,
    StockShortfall, StoreError,
};

fn shop_with_stock(quantity: u32) -> (Shop, ProductId) {
    let shop = Shop::new();
    let id = shop
        .add_product(NewProduct::new("Lamp", "LAMP-1", dec!(40.00)).with_stock(quantity))
        .unwrap();
    (shop, id)
}

fn level(shop: &Shop, id: ProductId) -> (u32, u32) {
    let StockLevel {
        quantity, reserved, ..
    } = shop.inventory().level(id).unwrap();
    (quantity, reserved)
}

// === Ledger Scenarios ===

#[test]
fn reserve_confirm_restore_scenario() {
    let (shop, id) = shop_with_stock(10);
    let inventory = shop.inventory();

    inventory.reserve(id, 5).unwrap();
    assert_eq!(level(&shop, id), (10, 5));
    assert_eq!(inventory.available(id), 5);

    inventory.confirm(id, 5).unwrap();
    assert_eq!(level(&shop, id), (5, 0));

    inventory.restore(id, 5).unwrap();
    assert_eq!(level(&shop, id), (10, 0));
}

#[test]
fn reserve_then_release_round_trip() {
    let (shop, id) = shop_with_stock(4);
    shop.inventory().reserve(id, 3).unwrap();
    shop.inventory().release(id, 3).unwrap();
    assert_eq!(level(&shop, id), (4, 0));
}

#[test]
fn reserve_beyond_available_reports_shortfall() {
    let (shop, id) = shop_with_stock(3);
    shop.inventory().reserve(id, 2).unwrap();

    let result = shop.inventory().reserve(id, 2);

    assert_eq!(
        result,
        Err(StoreError::InsufficientStock(vec![StockShortfall {
            product_id: id,
            requested: 2,
            available: 1,
        }]))
    );
    assert_eq!(level(&shop, id), (3, 2));
}

#[test]
fn release_and_confirm_need_reservations() {
    let (shop, id) = shop_with_stock(10);
    shop.inventory().reserve(id, 1).unwrap();

    assert!(matches!(
        shop.inventory().release(id, 2),
        Err(StoreError::InvalidReleaseAmount { reserved: 1, .. })
    ));
    assert!(matches!(
        shop.inventory().confirm(id, 2),
        Err(StoreError::InvalidConfirmAmount { reserved: 1, .. })
    ));
    assert_eq!(level(&shop, id), (10, 1));
}

#[test]
fn zero_amounts_are_rejected() {
    let (shop, id) = shop_with_stock(10);
    assert_eq!(shop.inventory().reserve(id, 0), Err(StoreError::InvalidQuantity));
    assert_eq!(shop.inventory().restore(id, 0), Err(StoreError::InvalidQuantity));
}

#[test]
fn unknown_product_has_no_stock_row() {
    let shop = Shop::new();
    assert_eq!(
        shop.inventory().reserve(ProductId(9), 1),
        Err(StoreError::StockNotFound(ProductId(9)))
    );
    assert_eq!(shop.inventory().available(ProductId(9)), 0);
    assert!(shop.inventory().level(ProductId(9)).is_none());
}

// === Adjustments ===

#[test]
fn adjustments_respect_reservations() {
    let (shop, id) = shop_with_stock(10);
    shop.inventory().reserve(id, 4).unwrap();

    let level = shop
        .inventory()
        .adjust(id, StockAdjustment::Add(5))
        .unwrap();
    assert_eq!((level.quantity, level.available), (15, 11));

    let level = shop
        .inventory()
        .adjust(id, StockAdjustment::Subtract(100))
        .unwrap();
    assert_eq!((level.quantity, level.reserved, level.available), (4, 4, 0));

    assert_eq!(
        shop.inventory().adjust(id, StockAdjustment::Set(3)),
        Err(StoreError::InvalidAdjustment {
            product_id: id,
            requested: 3,
            reserved: 4,
        })
    );

    let level = shop
        .inventory()
        .adjust(id, StockAdjustment::Set(20))
        .unwrap();
    assert_eq!(level.available, 16);
}

#[test]
fn low_stock_lists_active_products_at_or_below_threshold() {
    let shop = Shop::new();
    let plenty = shop
        .add_product(NewProduct::new("Rope", "R-1", dec!(3)).with_stock(50))
        .unwrap();
    let few = shop
        .add_product(NewProduct::new("Hook", "H-1", dec!(1)).with_stock(5))
        .unwrap();
    let retired = shop
        .add_product(NewProduct::new("Net", "N-1", dec!(9)).with_stock(0))
        .unwrap();
    shop.set_active(retired, false).unwrap();

    let low: Vec<ProductId> = shop
        .low_stock(storefront_core::DEFAULT_LOW_STOCK_THRESHOLD)
        .into_iter()
        .map(|(product, _)| product.id)
        .collect();

    assert_eq!(low, vec![few]);
    assert!(!low.contains(&plenty));
}

// === Browsing ===

#[test]
fn browse_filters_on_stock_category_and_activity() {
    let shop = Shop::new();
    let lamp = shop
        .add_product(
            NewProduct::new("Desk Lamp", "LAMP-1", dec!(40))
                .in_category(CategoryId(1))
                .with_stock(3),
        )
        .unwrap();
    let shade = shop
        .add_product(NewProduct::new("Lamp Shade", "SHD-1", dec!(15)).in_category(CategoryId(1)))
        .unwrap();
    let rug = shop
        .add_product(
            NewProduct::new("Rug", "RUG-1", dec!(90))
                .in_category(CategoryId(2))
                .with_stock(1),
        )
        .unwrap();
    shop.inventory().reserve(rug, 1).unwrap();

    let ids = |products: Vec<storefront_core::Product>| -> Vec<ProductId> {
        products.into_iter().map(|p| p.id).collect()
    };

    assert_eq!(ids(shop.in_stock()), vec![lamp]);
    assert_eq!(ids(shop.browse(&ProductFilter::default())), vec![lamp, shade, rug]);
    assert_eq!(
        ids(shop.browse(&ProductFilter::default().search("lamp").in_stock())),
        vec![lamp]
    );
    assert_eq!(
        ids(shop.browse(&ProductFilter::default().in_category(CategoryId(1)))),
        vec![lamp, shade]
    );

    shop.set_active(lamp, false).unwrap();
    assert!(shop.browse(&ProductFilter::default().search("lamp").in_stock()).is_empty());
    assert_eq!(ids(shop.in_stock()), vec![lamp]);
}

// === Concurrency ===

#[test]
fn concurrent_reserves_never_oversell() {
    let (shop, id) = shop_with_stock(100);
    let shop = Arc::new(shop);
    let granted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let shop = Arc::clone(&shop);
            let granted = Arc::clone(&granted);
            thread::spawn(move || {
                for _ in 0..20 {
                    if shop.inventory().reserve(id, 1).is_ok() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(granted.load(Ordering::SeqCst), 100);
    assert_eq!(level(&shop, id), (100, 100));
    assert_eq!(shop.inventory().available(id), 0);
}
