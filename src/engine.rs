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

//! Storefront engine.
//!
//! The [`Shop`] is the central component: it owns the catalog, the
//! inventory ledger and the orders, and it is the only place where orders
//! are created ([`Shop::place_order`]) or change status
//! ([`Shop::transition`]).
//!
//! # Lock Order
//!
//! 1. An order's mutex.
//! 2. Stock rows, in ascending product id.
//! 3. Map shard locks, never held while waiting on anything else.
//!
//! Every operation acquires locks in this order, which rules out deadlock.

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::catalog::{Catalog, NewProduct, Product, ProductFilter};
use crate::inventory::{Inventory, StagedRows};
use crate::order::{Order, OrderStatus};
use crate::order_number::{OrderNumber, OrderNumberSequence};
use crate::stock::{Stock, StockLevel};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tracing::{error, info, warn};

/// Source of order timestamps.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Threshold of [`Shop::low_stock`] used by the admin dashboard.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 5;

/// Storefront engine managing products, stock and orders.
///
/// # Invariants
///
/// - `0 <= reserved <= quantity` for every stock row.
/// - An order's total equals the sum of its item subtotals.
/// - Order numbers are unique.
/// - A status change and its stock side effect commit together or not at all.
pub struct Shop {
    pub(crate) catalog: Catalog,
    pub(crate) inventory: Inventory,
    /// Orders indexed by id. Each order has its own mutex.
    pub(crate) orders: DashMap<OrderId, Arc<Mutex<Order>>>,
    /// Products referenced by at least one order line. Checkout adds to it
    /// while it still holds the product's stock row.
    pub(crate) ordered_products: DashSet<ProductId>,
    pub(crate) order_numbers: OrderNumberSequence,
    pub(crate) next_order_id: AtomicU64,
    pub(crate) clock: Clock,
}

impl Shop {
    /// Creates an empty shop stamping orders with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Shop {
            catalog: Catalog::new(),
            inventory: Inventory::new(),
            orders: DashMap::new(),
            ordered_products: DashSet::new(),
            order_numbers: OrderNumberSequence::new(),
            next_order_id: AtomicU64::new(1),
            clock: Box::new(clock),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // === Catalog ===

    /// Adds a product together with its stock row.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateSku`] - SKU already in use.
    /// - [`StoreError::InvalidPrice`] - Negative price or cost.
    pub fn add_product(&self, new: NewProduct) -> Result<ProductId, StoreError> {
        let id = self.catalog.add(&new)?;
        self.inventory.insert(Stock::new(id, new.initial_quantity))?;
        info!(product_id = %id, sku = %new.sku, quantity = new.initial_quantity, "product added");
        Ok(id)
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.catalog.get(id)
    }

    pub fn set_price(&self, id: ProductId, price: Decimal) -> Result<(), StoreError> {
        self.catalog.set_price(id, price)
    }

    /// Activates or retires a product. Retired products stay in order history.
    pub fn set_active(&self, id: ProductId, active: bool) -> Result<(), StoreError> {
        self.catalog.set_active(id, active)
    }

    /// Deletes a product and its stock row.
    ///
    /// The stock row stays locked from the history check until both entries
    /// are gone. Checkout records its products under the same lock, so an
    /// order committed concurrently is either seen here or finds the product
    /// missing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ProductHasOrderHistory`] - An order line references it.
    /// - [`StoreError::ProductInactiveOrMissing`] - Unknown product.
    pub fn remove_product(&self, id: ProductId) -> Result<Product, StoreError> {
        let stock = self.inventory.get(id);
        let _row = stock.as_ref().map(|stock| stock.lock());

        if self.ordered_products.contains(&id) {
            warn!(product_id = %id, "product with order history kept");
            return Err(StoreError::ProductHasOrderHistory(id));
        }
        let product = self
            .catalog
            .remove(id)
            .ok_or(StoreError::ProductInactiveOrMissing(id))?;
        self.inventory.remove(id);
        info!(product_id = %id, "product removed");
        Ok(product)
    }

    /// Active products whose available stock is at most `threshold`.
    pub fn low_stock(&self, threshold: u32) -> Vec<(Product, StockLevel)> {
        self.catalog
            .products()
            .into_iter()
            .filter(|product| product.is_active)
            .filter_map(|product| {
                let level = self.inventory.level(product.id)?;
                (level.available <= threshold).then_some((product, level))
            })
            .collect()
    }

    /// Products with available stock, in ascending id order.
    pub fn in_stock(&self) -> Vec<Product> {
        self.browse(&ProductFilter::default().include_inactive().in_stock())
    }

    /// Products matching `filter`, in ascending id order.
    pub fn browse(&self, filter: &ProductFilter) -> Vec<Product> {
        // Stock is read after the catalog walk so no shard lock is held
        // while a row is locked.
        let mut products = self.catalog.filtered(|product| filter.matches(product));
        if filter.in_stock {
            products.retain(|product| self.inventory.available(product.id) > 0);
        }
        products
    }

    // === Orders ===

    /// Clones the order's handle so the map shard is released before the
    /// order mutex is taken.
    fn order_handle(&self, id: OrderId) -> Option<Arc<Mutex<Order>>> {
        self.orders.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn order_handles(&self) -> Vec<Arc<Mutex<Order>>> {
        self.orders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.order_handle(id).map(|handle| handle.lock().clone())
    }

    pub fn order_by_number(&self, number: &OrderNumber) -> Option<Order> {
        self.order(self.order_numbers.order_id(number)?)
    }

    /// All orders in ascending id order.
    pub fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .order_handles()
            .iter()
            .map(|handle| handle.lock().clone())
            .collect();
        orders.sort_by_key(Order::id);
        orders
    }

    pub fn orders_for_user(&self, user_id: UserId) -> Vec<Order> {
        self.orders()
            .into_iter()
            .filter(|order| order.user_id() == user_id)
            .collect()
    }

    /// Moves an order to `to`, applying the transition's stock side effect.
    ///
    /// The order mutex is held for the whole transition and every affected
    /// stock row is locked; status and stock change together or not at all.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OrderNotFound`] - Unknown order.
    /// - [`StoreError::IllegalStatusTransition`] - Not permitted from the current status.
    /// - [`StoreError::InvalidReleaseAmount`] - Reservations are missing for a release.
    /// - [`StoreError::StockNotFound`] - An item's stock row is gone.
    pub fn transition(&self, order_id: OrderId, to: OrderStatus) -> Result<Order, StoreError> {
        let handle = self
            .order_handle(order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let mut order = handle.lock();
        let from = order.status();

        let effect = from.transition_to(to).inspect_err(|e| {
            warn!(order_number = %order.number(), error = %e, "status change refused");
        })?;

        let ids = if effect.touches_stock() {
            order.product_ids()
        } else {
            Vec::new()
        };
        let (rows, missing) = self.inventory.rows(&ids);
        if let Some(&product_id) = missing.first() {
            return Err(StoreError::StockNotFound(product_id));
        }

        let mut staged = StagedRows::lock(&rows);
        let mut draft = order.clone();
        apply_transition(&mut staged, &mut draft, to).inspect_err(|e| {
            error!(order_number = %order.number(), %from, %to, error = %e, "status change rolled back");
        })?;
        staged.commit();
        *order = draft;

        info!(order_number = %order.number(), %from, %to, "order status changed");
        Ok(order.clone())
    }

    /// Cancels an order; shorthand for a transition to `Cancelled`.
    pub fn cancel(&self, order_id: OrderId) -> Result<Order, StoreError> {
        self.transition(order_id, OrderStatus::Cancelled)
    }
}

impl Default for Shop {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the state machine to a staged order: checks the transition, runs
/// its stock side effect for every item on the staged rows, then sets the
/// new status. Nothing is visible until the caller commits.
pub(crate) fn apply_transition(
    staged: &mut StagedRows<'_>,
    order: &mut Order,
    to: OrderStatus,
) -> Result<(), StoreError> {
    let effect = order.status().transition_to(to)?;
    if effect.touches_stock() {
        for item in order.items() {
            let row = staged.draft_or_missing(item.product_id())?;
            effect.apply(row, item.quantity())?;
        }
    }
    order.set_status(to);
    Ok(())
}
