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

//! # Storefront Core
//!
//! This library provides the transactional core of an online store: a stock
//! ledger with reservations, session carts, atomic checkout and an order
//! status state machine with stock side effects.
//!
//! ## Core Components
//!
//! - [`Shop`]: Central engine owning the catalog, inventory and orders
//! - [`Inventory`]: Per-product stock rows with reserve, release, confirm and restore
//! - [`Carts`]: Session carts validated against live stock, backed by a [`CartStore`]
//! - [`OrderStatus`]: Order lifecycle and its single transition table
//! - [`StoreError`]: Error types for every rejected operation
//!
//! ## Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use storefront_core::{NewProduct, OrderLine, OrderStatus, ShippingInfo, Shop, UserId};
//!
//! let shop = Shop::new();
//! let mug = shop
//!     .add_product(NewProduct::new("Mug", "MUG-1", dec!(8.50)).with_stock(10))
//!     .unwrap();
//!
//! // Place and complete an order in one step
//! let order = shop
//!     .place_order(
//!         UserId(1),
//!         &[OrderLine::new(mug, 2)],
//!         ShippingInfo::new("12 Market Street, Springfield"),
//!     )
//!     .unwrap();
//! assert_eq!(order.status(), OrderStatus::Completed);
//! assert_eq!(order.total_amount(), dec!(17.00));
//! assert_eq!(shop.inventory().available(mug), 8);
//!
//! // Cancelling a completed order puts the goods back
//! shop.cancel(order.id()).unwrap();
//! assert_eq!(shop.inventory().available(mug), 10);
//! ```
//!
//! ## Thread Safety
//!
//! Every operation takes `&self`; a [`Shop`] is shared across threads behind
//! an `Arc`. Stock rows are locked individually and multi-row work locks rows
//! in ascending product order, so concurrent checkouts never oversell and
//! never deadlock.

mod base;
mod cart;
pub mod catalog;
mod checkout;
mod engine;
pub mod error;
pub mod inventory;
pub mod order;
mod order_number;
mod snapshot;
pub mod stats;
pub mod stock;

pub use base::{CategoryId, OrderId, ProductId, SessionId, UserId};
pub use cart::{Cart, CartEntry, CartLine, CartStore, Carts, CheckoutIssue, MemoryCartStore};
pub use catalog::{Catalog, NewProduct, Product, ProductFilter};
pub use checkout::{OrderLine, PaymentMethod, ShippingInfo};
pub use engine::{Clock, DEFAULT_LOW_STOCK_THRESHOLD, Shop};
pub use error::{StockShortfall, StoreError};
pub use inventory::Inventory;
pub use order::{Order, OrderItem, OrderStatus, StockEffect};
pub use order_number::{OrderNumber, OrderNumberSequence};
pub use snapshot::{Snapshot, StockRecord, TransactionItemRecord, TransactionRecord};
pub use stats::{
    BestSeller, CategoryPerformance, DailySales, DateRange, MonthlySales, PeriodSales,
    ProductSales, SalesOverview, SalesReport, TransactionReport, UserStats, YearlySales,
};
pub use stock::{Stock, StockAdjustment, StockLevel};
