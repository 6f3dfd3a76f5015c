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

//! Error types for catalog, ledger, cart and order processing.

use crate::base::{OrderId, ProductId};
use crate::order::OrderStatus;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One line that could not be covered by available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

impl fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product {} (requested {}, available {})",
            self.product_id, self.requested, self.available
        )
    }
}

fn join_shortfalls(lines: &[StockShortfall]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storefront processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// One or more lines exceed available stock. Recoverable by the buyer.
    #[error("insufficient stock: {}", join_shortfalls(.0))]
    InsufficientStock(Vec<StockShortfall>),

    /// Order status change not permitted from the current state
    #[error("cannot transition order from {from} to {to}")]
    IllegalStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Release of more units than are reserved; indicates a caller bug
    #[error("cannot release {requested} units of product {product_id}: only {reserved} reserved")]
    InvalidReleaseAmount {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    /// Confirmation of more units than are reserved; indicates a caller bug
    #[error("cannot confirm {requested} units of product {product_id}: only {reserved} reserved")]
    InvalidConfirmAmount {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    /// Product is unknown or no longer purchasable
    #[error("product {0} is inactive or missing")]
    ProductInactiveOrMissing(ProductId),

    /// Quantity is zero
    #[error("invalid quantity (must be positive)")]
    InvalidQuantity,

    /// Product has no stock row
    #[error("stock not found for product {0}")]
    StockNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),

    /// Checkout requested with no lines
    #[error("order has no lines")]
    EmptyOrder,

    #[error("invalid shipping information: {0}")]
    InvalidShippingInfo(String),

    #[error("invalid price {0} (must not be negative)")]
    InvalidPrice(rust_decimal::Decimal),

    #[error("duplicate SKU {0}")]
    DuplicateSku(String),

    /// Product is referenced by order history and cannot be deleted
    #[error("product {0} has order history")]
    ProductHasOrderHistory(ProductId),

    /// Stock adjustment would drop quantity below the reserved amount
    #[error("cannot set product {product_id} stock to {requested}: {reserved} reserved")]
    InvalidAdjustment {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StoreError {
    /// Shortcut for the single-line shortfall raised by the ledger.
    pub fn insufficient(product_id: ProductId, requested: u32, available: u32) -> Self {
        Self::InsufficientStock(vec![StockShortfall {
            product_id,
            requested,
            available,
        }])
    }

    /// Ledger consistency violations. These point at a caller bug rather
    /// than a buyer-recoverable condition.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidReleaseAmount { .. } | Self::InvalidConfirmAmount { .. }
        )
    }
}
