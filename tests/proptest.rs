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

//! Property-based tests for the inventory ledger and checkout.
//!
//! These tests verify invariants that should hold for any sequence of
//! ledger operations or orders, accepted or rejected.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use storefront_core::{
    NewProduct, OrderLine, OrderStatus, ProductId, ShippingInfo, Shop, Stock, StockAdjustment,
    StoreError, UserId,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum LedgerOp {
    Reserve(u32),
    Release(u32),
    Confirm(u32),
    Restore(u32),
    Adjust(StockAdjustment),
}

fn arb_amount() -> impl Strategy<Value = u32> {
    0u32..=20
}

fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        arb_amount().prop_map(LedgerOp::Reserve),
        arb_amount().prop_map(LedgerOp::Release),
        arb_amount().prop_map(LedgerOp::Confirm),
        arb_amount().prop_map(LedgerOp::Restore),
        arb_amount().prop_map(|n| LedgerOp::Adjust(StockAdjustment::Set(n))),
        arb_amount().prop_map(|n| LedgerOp::Adjust(StockAdjustment::Add(n))),
        arb_amount().prop_map(|n| LedgerOp::Adjust(StockAdjustment::Subtract(n))),
    ]
}

fn apply(stock: &Stock, op: &LedgerOp) -> Result<(), StoreError> {
    match *op {
        LedgerOp::Reserve(n) => stock.reserve(n),
        LedgerOp::Release(n) => stock.release(n),
        LedgerOp::Confirm(n) => stock.confirm(n),
        LedgerOp::Restore(n) => stock.restore(n),
        LedgerOp::Adjust(adjustment) => stock.adjust(adjustment),
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Reserved never exceeds quantity, whatever is attempted.
    #[test]
    fn reserved_never_exceeds_quantity(
        initial in 0u32..=50,
        ops in prop::collection::vec(arb_ledger_op(), 1..40),
    ) {
        let stock = Stock::new(ProductId(1), initial);

        for op in &ops {
            let _ = apply(&stock, op);
            let level = stock.level();
            prop_assert!(level.reserved <= level.quantity);
            prop_assert_eq!(level.available, level.quantity - level.reserved);
        }
    }

    /// A rejected operation leaves the row exactly as it was.
    #[test]
    fn rejected_operations_change_nothing(
        initial in 0u32..=50,
        ops in prop::collection::vec(arb_ledger_op(), 1..40),
    ) {
        let stock = Stock::new(ProductId(1), initial);

        for op in &ops {
            let before = stock.level();
            if apply(&stock, op).is_err() {
                prop_assert_eq!(stock.level(), before);
            }
        }
    }

    /// Reserving then releasing the same amount is a no-op.
    #[test]
    fn reserve_release_round_trip(initial in 1u32..=100, amount in 1u32..=100) {
        prop_assume!(amount <= initial);
        let stock = Stock::new(ProductId(1), initial);

        stock.reserve(amount).unwrap();
        stock.release(amount).unwrap();

        prop_assert_eq!(stock.quantity(), initial);
        prop_assert_eq!(stock.reserved(), 0);
    }

    /// Reserving then confirming deducts exactly the amount.
    #[test]
    fn reserve_confirm_deducts(initial in 1u32..=100, amount in 1u32..=100) {
        prop_assume!(amount <= initial);
        let stock = Stock::new(ProductId(1), initial);

        stock.reserve(amount).unwrap();
        stock.confirm(amount).unwrap();

        prop_assert_eq!(stock.quantity(), initial - amount);
        prop_assert_eq!(stock.reserved(), 0);
    }
}

// =============================================================================
// Checkout Invariant Tests
// =============================================================================

#[derive(Debug, Clone)]
enum ShopOp {
    Order(Vec<(usize, u32)>),
    Cancel(usize),
}

fn arb_shop_op() -> impl Strategy<Value = ShopOp> {
    prop_oneof![
        3 => prop::collection::vec((0usize..3, 1u32..=4), 1..4).prop_map(ShopOp::Order),
        1 => (0usize..20).prop_map(ShopOp::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// On-hand stock plus units held by live orders always equals the
    /// initial stock, and order totals match their items.
    #[test]
    fn stock_is_conserved_across_orders_and_cancellations(
        initial in prop::collection::vec(0u32..=10, 3),
        ops in prop::collection::vec(arb_shop_op(), 1..30),
    ) {
        let shop = Shop::new();
        let ids: Vec<ProductId> = initial
            .iter()
            .enumerate()
            .map(|(i, &quantity)| {
                shop.add_product(
                    NewProduct::new(format!("P{i}"), format!("SKU-{i}"), Decimal::from(i + 1))
                        .with_stock(quantity),
                )
                .unwrap()
            })
            .collect();
        let mut placed = Vec::new();

        for op in &ops {
            match op {
                ShopOp::Order(lines) => {
                    let lines: Vec<OrderLine> = lines
                        .iter()
                        .map(|&(index, quantity)| OrderLine::new(ids[index], quantity))
                        .collect();
                    let result = shop.place_order(
                        UserId(1),
                        &lines,
                        ShippingInfo::new("12 Market Street, Springfield"),
                    );
                    match result {
                        Ok(order) => placed.push(order.id()),
                        Err(e) => prop_assert!(matches!(e, StoreError::InsufficientStock(_))),
                    }
                }
                ShopOp::Cancel(index) => {
                    if let Some(&id) = placed.get(*index) {
                        let _ = shop.cancel(id);
                    }
                }
            }
        }

        let mut held: HashMap<ProductId, u32> = HashMap::new();
        for order in shop.orders() {
            let items_total: Decimal = order.items().iter().map(|item| item.subtotal()).sum();
            prop_assert_eq!(order.total_amount(), items_total);
            if order.status() == OrderStatus::Completed {
                for item in order.items() {
                    *held.entry(item.product_id()).or_default() += item.quantity();
                }
            }
        }
        for (id, &start) in ids.iter().zip(&initial) {
            let level = shop.inventory().level(*id).unwrap();
            prop_assert_eq!(level.reserved, 0);
            prop_assert_eq!(level.quantity + held.get(id).copied().unwrap_or(0), start);
        }
    }
}
