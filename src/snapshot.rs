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

//! Persisted storefront state.
//!
//! A [`Snapshot`] is a flat, table-shaped export of everything a [`Shop`]
//! holds: products, stock rows, transactions and transaction items.
//! Hydration validates the rows before anything is built, so a shop is never
//! created from an inconsistent snapshot.

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::catalog::Product;
use crate::checkout::{PaymentMethod, ShippingInfo};
use crate::engine::Shop;
use crate::inventory::StagedRows;
use crate::order::{Order, OrderItem, OrderStatus};
use crate::order_number::OrderNumber;
use crate::stock::Stock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub products: Vec<Product>,
    pub product_stocks: Vec<StockRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub transaction_items: Vec<TransactionItemRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub reserved_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: OrderId,
    pub transaction_number: OrderNumber,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub address: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItemRecord {
    pub transaction_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidSnapshot(message.into())
}

impl Shop {
    /// Exports the current state.
    ///
    /// Rows are ordered by id. Every stock row is locked while the stock
    /// levels, the product list and the set of orders are read; checkout
    /// registers its order before releasing its rows, so the export never
    /// pairs sold stock with a missing order. A status change still in
    /// flight may land between the stock read and the order read, so a
    /// snapshot meant to balance stock against order history exactly should
    /// be taken while no transitions run.
    pub fn snapshot(&self) -> Snapshot {
        let rows = self.inventory.all_rows();
        let (levels, products, handles) = {
            let staged = StagedRows::lock(&rows);
            (staged.levels(), self.catalog.products(), self.order_handles())
        };

        // Rows of products removed before the locks were taken.
        let known: HashSet<ProductId> = products.iter().map(|product| product.id).collect();
        let product_stocks = levels
            .into_iter()
            .filter(|level| known.contains(&level.product_id))
            .map(|level| StockRecord {
                product_id: level.product_id,
                quantity: level.quantity,
                reserved_quantity: level.reserved,
            })
            .collect();

        let mut orders: Vec<Order> = handles.iter().map(|handle| handle.lock().clone()).collect();
        orders.sort_by_key(Order::id);
        let transaction_items = orders
            .iter()
            .flat_map(|order| {
                order.items().iter().map(|item| TransactionItemRecord {
                    transaction_id: order.id(),
                    product_id: item.product_id(),
                    quantity: item.quantity(),
                    price: item.unit_price(),
                    subtotal: item.subtotal(),
                })
            })
            .collect();
        let transactions = orders
            .into_iter()
            .map(|order| TransactionRecord {
                id: order.id(),
                transaction_number: *order.number(),
                user_id: order.user_id(),
                total_amount: order.total_amount(),
                status: order.status(),
                address: order.address().to_owned(),
                payment_method: order.payment_method(),
                notes: order.notes().map(str::to_owned),
                created_at: order.created_at(),
            })
            .collect();

        Snapshot {
            products,
            product_stocks,
            transactions,
            transaction_items,
        }
    }

    /// Builds a shop from persisted rows, using the system clock for new
    /// orders.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidSnapshot`] when the rows are inconsistent:
    /// duplicate ids, SKUs or order numbers, a stock row with more reserved
    /// than on hand, rows referencing unknown products or transactions, or
    /// totals that do not match their items.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        Self::from_snapshot_with_clock(snapshot, Utc::now)
    }

    pub fn from_snapshot_with_clock(
        snapshot: Snapshot,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Result<Self, StoreError> {
        let shop = Shop::with_clock(clock);

        for product in snapshot.products {
            shop.catalog.insert(product).map_err(|e| match e {
                StoreError::DuplicateSku(sku) => invalid(format!("duplicate SKU {sku}")),
                other => other,
            })?;
        }

        for record in snapshot.product_stocks {
            if shop.catalog.get(record.product_id).is_none() {
                return Err(invalid(format!(
                    "stock row for unknown product {}",
                    record.product_id
                )));
            }
            shop.inventory.insert(Stock::with_reserved(
                record.product_id,
                record.quantity,
                record.reserved_quantity,
            )?)?;
        }

        let mut items: BTreeMap<OrderId, Vec<OrderItem>> = BTreeMap::new();
        for record in snapshot.transaction_items {
            if shop.catalog.get(record.product_id).is_none() {
                return Err(invalid(format!(
                    "transaction {} references unknown product {}",
                    record.transaction_id, record.product_id
                )));
            }
            if record.quantity == 0 {
                return Err(invalid(format!(
                    "transaction {} has an item with zero quantity",
                    record.transaction_id
                )));
            }
            let item = OrderItem::new(record.product_id, record.quantity, record.price);
            if item.subtotal() != record.subtotal {
                return Err(invalid(format!(
                    "transaction {} item subtotal {} does not match {} x {}",
                    record.transaction_id, record.subtotal, record.quantity, record.price
                )));
            }
            items.entry(record.transaction_id).or_default().push(item);
        }

        let mut max_id = 0;
        for record in snapshot.transactions {
            let order = Order::with_status(
                record.id,
                record.transaction_number,
                record.user_id,
                record.status,
                ShippingInfo {
                    address: record.address,
                    payment_method: record.payment_method,
                    notes: record.notes,
                },
                record.created_at,
                items.remove(&record.id).unwrap_or_default(),
            );
            if order.total_amount() != record.total_amount {
                return Err(invalid(format!(
                    "transaction {} total {} does not match item sum {}",
                    record.transaction_number,
                    record.total_amount,
                    order.total_amount()
                )));
            }
            if shop.orders.contains_key(&record.id) {
                return Err(invalid(format!("duplicate transaction id {}", record.id)));
            }
            shop.order_numbers
                .claim(record.transaction_number, record.id)?;
            for item in order.items() {
                shop.ordered_products.insert(item.product_id());
            }
            max_id = max_id.max(record.id.0);
            shop.orders.insert(record.id, Arc::new(Mutex::new(order)));
        }

        if let Some(orphan) = items.keys().next() {
            return Err(invalid(format!("items reference unknown transaction {orphan}")));
        }

        shop.next_order_id.store(max_id + 1, Ordering::SeqCst);
        info!(
            products = shop.catalog.len(),
            orders = shop.orders.len(),
            "storefront state loaded"
        );
        Ok(shop)
    }
}
