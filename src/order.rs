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

//! Orders and their status state machine.
//!
//! ```text
//!   Pending ──► Processing ──► Completed
//!      │             │             │
//!      │             │ release     │ restore
//!      ▼             ▼             ▼
//!   Cancelled ◄──────┴─────────────┘
//! ```
//!
//! [`OrderStatus::transition_to`] is the only place that decides whether a
//! status change is legal and which stock side effect it carries.

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::checkout::{PaymentMethod, ShippingInfo};
use crate::order_number::OrderNumber;
use crate::stock::StockRow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

/// Stock side effect attached to a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Give back reservations held by the order.
    Release,
    /// Put sold goods back on hand.
    Restore,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Checks a status change and returns the stock side effect it carries.
    ///
    /// | From | To | Effect |
    /// |------|----|--------|
    /// | Pending | Processing | none |
    /// | Pending | Cancelled | none |
    /// | Processing | Completed | none |
    /// | Processing | Cancelled | release |
    /// | Completed | Cancelled | restore |
    ///
    /// # Errors
    ///
    /// [`StoreError::IllegalStatusTransition`] for every other pair.
    pub fn transition_to(self, to: OrderStatus) -> Result<StockEffect, StoreError> {
        use OrderStatus::*;

        match (self, to) {
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Completed) => {
                Ok(StockEffect::None)
            }
            (Processing, Cancelled) => Ok(StockEffect::Release),
            (Completed, Cancelled) => Ok(StockEffect::Restore),
            (from, to) => Err(StoreError::IllegalStatusTransition { from, to }),
        }
    }

    /// Completed and Cancelled orders never move forward again. A completed
    /// order can still be cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown order status {s:?}"))
    }
}

impl StockEffect {
    pub fn touches_stock(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub(crate) fn apply(self, row: &mut StockRow, amount: u32) -> Result<(), StoreError> {
        match self {
            Self::None => Ok(()),
            Self::Release => row.release(amount),
            Self::Restore => row.restore(amount),
        }
    }
}

/// One order line, priced at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    product_id: ProductId,
    quantity: u32,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl OrderItem {
    /// Builds a line and computes `subtotal = quantity * unit_price`.
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            subtotal: Decimal::from(quantity) * unit_price,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }
}

/// A placed order with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    number: OrderNumber,
    user_id: UserId,
    status: OrderStatus,
    total_amount: Decimal,
    address: String,
    payment_method: PaymentMethod,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    const MONEY_PRECISION: u32 = 2;

    /// Creates a `Processing` order; the total is derived from `items`.
    pub(crate) fn new(
        id: OrderId,
        number: OrderNumber,
        user_id: UserId,
        shipping: ShippingInfo,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Self {
        Self::with_status(
            id,
            number,
            user_id,
            OrderStatus::Processing,
            shipping,
            created_at,
            items,
        )
    }

    /// Rebuilds a persisted order in whatever status it was stored with.
    pub(crate) fn with_status(
        id: OrderId,
        number: OrderNumber,
        user_id: UserId,
        status: OrderStatus,
        shipping: ShippingInfo,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Self {
        let total_amount = items.iter().map(OrderItem::subtotal).sum();
        Self {
            id,
            number,
            user_id,
            status,
            total_amount,
            address: shipping.address,
            payment_method: shipping.payment_method,
            notes: shipping.notes,
            created_at,
            items,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> &OrderNumber {
        &self.number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Sum of item subtotals.
    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(OrderItem::quantity).sum()
    }

    /// Distinct products of the order in ascending id order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.items.iter().map(OrderItem::product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

impl Serialize for Order {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Order", 10)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("transaction_number", &self.number)?;
        state.serialize_field("user_id", &self.user_id)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field(
            "total_amount",
            &self.total_amount.round_dp(Order::MONEY_PRECISION),
        )?;
        state.serialize_field("address", &self.address)?;
        state.serialize_field("payment_method", &self.payment_method)?;
        state.serialize_field("notes", &self.notes)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.serialize_field("items", &self.items)?;
        state.end()
    }
}
