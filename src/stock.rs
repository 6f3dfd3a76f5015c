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

//! Stock rows.
//!
//! A [`Stock`] is the one-to-one inventory record of a product. It tracks
//! the total on-hand `quantity` and the `reserved` part claimed by in-flight
//! orders:
//!
//! ```text
//!   reserve(n)   reserved += n                (needs available >= n)
//!   release(n)   reserved -= n                (needs reserved >= n)
//!   confirm(n)   quantity -= n, reserved -= n (needs reserved >= n)
//!   restore(n)   quantity += n                (sold goods come back)
//! ```
//!
//! `0 <= reserved <= quantity` holds after every operation.
//!
//! # Example
//!
//! ```
//! use storefront_core::{ProductId, Stock};
//!
//! let stock = Stock::new(ProductId(1), 10);
//! stock.reserve(4).unwrap();
//! assert_eq!(stock.available(), 6);
//! ```

use crate::StoreError;
use crate::base::ProductId;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

/// Admin stock correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "quantity", rename_all = "lowercase")]
pub enum StockAdjustment {
    /// Overwrite the on-hand quantity.
    Set(u32),
    Add(u32),
    /// Remove units, never dipping into the reserved part.
    Subtract(u32),
}

/// Point-in-time view of a stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
}

/// Row data guarded by the [`Stock`] mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StockRow {
    pub(crate) product_id: ProductId,
    pub(crate) quantity: u32,
    pub(crate) reserved: u32,
}

impl StockRow {
    fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            reserved: 0,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.reserved <= self.quantity,
            "Invariant violated: reserved {} exceeds quantity {} for product {}",
            self.reserved,
            self.quantity,
            self.product_id
        );
    }

    pub(crate) fn available(&self) -> u32 {
        self.quantity - self.reserved
    }

    pub(crate) fn level(&self) -> StockLevel {
        StockLevel {
            product_id: self.product_id,
            quantity: self.quantity,
            reserved: self.reserved,
            available: self.available(),
        }
    }

    /// Claims `amount` units for an in-flight order.
    pub(crate) fn reserve(&mut self, amount: u32) -> Result<(), StoreError> {
        if amount == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        if self.available() < amount {
            return Err(StoreError::insufficient(
                self.product_id,
                amount,
                self.available(),
            ));
        }
        self.reserved += amount;
        self.assert_invariants();
        Ok(())
    }

    /// Drops a claim without touching the on-hand quantity.
    pub(crate) fn release(&mut self, amount: u32) -> Result<(), StoreError> {
        if amount == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        if self.reserved < amount {
            return Err(StoreError::InvalidReleaseAmount {
                product_id: self.product_id,
                requested: amount,
                reserved: self.reserved,
            });
        }
        self.reserved -= amount;
        self.assert_invariants();
        Ok(())
    }

    /// Turns a claim into a permanent deduction.
    pub(crate) fn confirm(&mut self, amount: u32) -> Result<(), StoreError> {
        if amount == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        if self.reserved < amount {
            return Err(StoreError::InvalidConfirmAmount {
                product_id: self.product_id,
                requested: amount,
                reserved: self.reserved,
            });
        }
        self.quantity -= amount;
        self.reserved -= amount;
        self.assert_invariants();
        Ok(())
    }

    /// Puts previously confirmed units back on hand.
    pub(crate) fn restore(&mut self, amount: u32) -> Result<(), StoreError> {
        if amount == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        self.quantity = self
            .quantity
            .checked_add(amount)
            .ok_or(StoreError::InvalidQuantity)?;
        self.assert_invariants();
        Ok(())
    }

    pub(crate) fn adjust(&mut self, adjustment: StockAdjustment) -> Result<(), StoreError> {
        match adjustment {
            StockAdjustment::Set(quantity) => {
                if quantity < self.reserved {
                    return Err(StoreError::InvalidAdjustment {
                        product_id: self.product_id,
                        requested: quantity,
                        reserved: self.reserved,
                    });
                }
                self.quantity = quantity;
            }
            StockAdjustment::Add(amount) => {
                self.quantity = self
                    .quantity
                    .checked_add(amount)
                    .ok_or(StoreError::InvalidQuantity)?;
            }
            StockAdjustment::Subtract(amount) => {
                self.quantity = self.quantity.saturating_sub(amount).max(self.reserved);
            }
        }
        self.assert_invariants();
        Ok(())
    }
}

/// Inventory record of one product.
#[derive(Debug)]
pub struct Stock {
    inner: Mutex<StockRow>,
}

impl Stock {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            inner: Mutex::new(StockRow::new(product_id, quantity)),
        }
    }

    /// Rebuilds a persisted row that already carries reservations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSnapshot`] if `reserved > quantity`.
    pub fn with_reserved(
        product_id: ProductId,
        quantity: u32,
        reserved: u32,
    ) -> Result<Self, StoreError> {
        if reserved > quantity {
            return Err(StoreError::InvalidSnapshot(format!(
                "product {product_id} has {reserved} reserved of {quantity}"
            )));
        }
        Ok(Self {
            inner: Mutex::new(StockRow {
                product_id,
                quantity,
                reserved,
            }),
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.inner.lock().product_id
    }

    pub fn quantity(&self) -> u32 {
        self.inner.lock().quantity
    }

    pub fn reserved(&self) -> u32 {
        self.inner.lock().reserved
    }

    /// Returns `quantity - reserved`.
    pub fn available(&self) -> u32 {
        self.inner.lock().available()
    }

    /// Reads all figures under one lock acquisition.
    pub fn level(&self) -> StockLevel {
        self.inner.lock().level()
    }

    /// # Errors
    ///
    /// [`StoreError::InsufficientStock`] if fewer than `amount` units are available.
    pub fn reserve(&self, amount: u32) -> Result<(), StoreError> {
        self.inner.lock().reserve(amount)
    }

    /// # Errors
    ///
    /// [`StoreError::InvalidReleaseAmount`] if fewer than `amount` units are reserved.
    pub fn release(&self, amount: u32) -> Result<(), StoreError> {
        self.inner.lock().release(amount)
    }

    /// # Errors
    ///
    /// [`StoreError::InvalidConfirmAmount`] if fewer than `amount` units are reserved.
    pub fn confirm(&self, amount: u32) -> Result<(), StoreError> {
        self.inner.lock().confirm(amount)
    }

    pub fn restore(&self, amount: u32) -> Result<(), StoreError> {
        self.inner.lock().restore(amount)
    }

    pub fn adjust(&self, adjustment: StockAdjustment) -> Result<(), StoreError> {
        self.inner.lock().adjust(adjustment)
    }

    /// Locks the row for a multi-row unit of work.
    pub(crate) fn lock(&self) -> MutexGuard<'_, StockRow> {
        self.inner.lock()
    }
}
