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

//! Checkout: turns order lines into a completed order in one unit of work.

use crate::StoreError;
use crate::base::{OrderId, ProductId, UserId};
use crate::engine::{Shop, apply_transition};
use crate::error::StockShortfall;
use crate::inventory::StagedRows;
use crate::order::{Order, OrderItem, OrderStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

const ADDRESS_MIN_CHARS: usize = 10;
const ADDRESS_MAX_CHARS: usize = 500;
const NOTES_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
}

/// Delivery details supplied by the buyer at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ShippingInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            payment_method: PaymentMethod::CashOnDelivery,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// # Errors
    ///
    /// [`StoreError::InvalidShippingInfo`] when the address is not 10 to 500
    /// characters long or the notes exceed 1000 characters.
    pub fn validate(&self) -> Result<(), StoreError> {
        let address = self.address.trim().chars().count();
        if address < ADDRESS_MIN_CHARS {
            return Err(StoreError::InvalidShippingInfo(format!(
                "address must be at least {ADDRESS_MIN_CHARS} characters"
            )));
        }
        if address > ADDRESS_MAX_CHARS {
            return Err(StoreError::InvalidShippingInfo(format!(
                "address must be at most {ADDRESS_MAX_CHARS} characters"
            )));
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > NOTES_MAX_CHARS {
                return Err(StoreError::InvalidShippingInfo(format!(
                    "notes must be at most {NOTES_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

/// A requested product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Merges duplicate lines; result is keyed by product in ascending order.
fn merge_lines(lines: &[OrderLine]) -> Result<BTreeMap<ProductId, u32>, StoreError> {
    if lines.is_empty() {
        return Err(StoreError::EmptyOrder);
    }
    let mut merged = BTreeMap::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        let quantity: &mut u32 = merged.entry(line.product_id).or_default();
        *quantity = quantity
            .checked_add(line.quantity)
            .ok_or(StoreError::InvalidQuantity)?;
    }
    Ok(merged)
}

impl Shop {
    /// Places an order for `lines` and completes it.
    ///
    /// Every touched stock row stays locked from validation until commit, so
    /// a concurrent checkout cannot take units between the check and the
    /// reservation. On any error no order exists and no row has changed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidShippingInfo`] - Address or notes rejected.
    /// - [`StoreError::EmptyOrder`] - No lines.
    /// - [`StoreError::InvalidQuantity`] - A zero quantity line.
    /// - [`StoreError::ProductInactiveOrMissing`] - A product cannot be bought.
    /// - [`StoreError::InsufficientStock`] - Lists every short line.
    pub fn place_order(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
        shipping: ShippingInfo,
    ) -> Result<Order, StoreError> {
        shipping.validate()?;
        let merged = merge_lines(lines)?;

        let ids: Vec<ProductId> = merged.keys().copied().collect();
        let (rows, missing) = self.inventory.rows(&ids);
        let staged = StagedRows::lock(&rows);

        // Read under the row locks: a product removed concurrently is gone
        // from the catalog by the time its row is released.
        let mut items = Vec::with_capacity(merged.len());
        for (&product_id, &quantity) in &merged {
            let product = self.catalog.purchasable(product_id)?;
            items.push(OrderItem::new(product_id, quantity, product.price));
        }

        let shortfalls: Vec<StockShortfall> = merged
            .iter()
            .filter_map(|(&product_id, &requested)| {
                let available = if missing.contains(&product_id) {
                    0
                } else {
                    staged.available(product_id)
                };
                (available < requested).then_some(StockShortfall {
                    product_id,
                    requested,
                    available,
                })
            })
            .collect();
        if !shortfalls.is_empty() {
            debug!(%user_id, lines = shortfalls.len(), "checkout rejected for insufficient stock");
            return Err(StoreError::InsufficientStock(shortfalls));
        }

        self.commit_order(staged, user_id, shipping, items)
    }

    /// Numbers a new order, completes it on the staged rows and commits.
    ///
    /// On error the staged rows are dropped untouched and the order number
    /// is freed.
    fn commit_order(
        &self,
        mut staged: StagedRows<'_>,
        user_id: UserId,
        shipping: ShippingInfo,
        items: Vec<OrderItem>,
    ) -> Result<Order, StoreError> {
        let id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let created_at = self.now();
        let number = self.order_numbers.next(created_at.date_naive(), id);

        let order = Order::new(id, number, user_id, shipping, created_at, items);
        let order = match complete(&mut staged, order) {
            Ok(order) => order,
            Err(e) => {
                self.order_numbers.release(&number);
                warn!(order_number = %number, error = %e, "checkout rolled back");
                return Err(e);
            }
        };

        for item in order.items() {
            self.ordered_products.insert(item.product_id());
        }
        self.orders
            .insert(order.id(), Arc::new(Mutex::new(order.clone())));
        staged.commit();

        info!(
            order_number = %order.number(),
            %user_id,
            total = %order.total_amount(),
            items = order.item_count(),
            "order placed"
        );
        Ok(order)
    }
}

/// Reserves and confirms every item on the staged rows, then moves the
/// order to `Completed`.
fn complete(staged: &mut StagedRows<'_>, mut order: Order) -> Result<Order, StoreError> {
    for item in order.items() {
        staged
            .draft_or_missing(item.product_id())?
            .reserve(item.quantity())?;
    }
    for item in order.items() {
        staged
            .draft_or_missing(item.product_id())?
            .confirm(item.quantity())?;
    }
    apply_transition(staged, &mut order, OrderStatus::Completed)?;
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewProduct;
    use crate::order_number::OrderNumber;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn shipping_info_accepts_reasonable_address() {
        let shipping = ShippingInfo::new("12 Market Street, Springfield").with_notes("ring twice");
        assert!(shipping.validate().is_ok());
    }

    #[test]
    fn short_address_is_rejected() {
        let result = ShippingInfo::new("  Main St ").validate();
        assert!(matches!(result, Err(StoreError::InvalidShippingInfo(_))));
    }

    #[test]
    fn long_address_and_notes_are_rejected() {
        let long = ShippingInfo::new("a".repeat(501));
        assert!(matches!(
            long.validate(),
            Err(StoreError::InvalidShippingInfo(_))
        ));

        let chatty = ShippingInfo::new("12 Market Street").with_notes("n".repeat(1001));
        assert!(matches!(
            chatty.validate(),
            Err(StoreError::InvalidShippingInfo(_))
        ));
    }

    #[test]
    fn payment_method_defaults_when_missing_from_json() {
        let shipping: ShippingInfo =
            serde_json::from_str(r#"{"address":"12 Market Street"}"#).unwrap();
        assert_eq!(shipping.payment_method, PaymentMethod::CashOnDelivery);
        assert_eq!(shipping.notes, None);
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let merged = merge_lines(&[
            OrderLine::new(ProductId(2), 1),
            OrderLine::new(ProductId(1), 4),
            OrderLine::new(ProductId(2), 2),
        ])
        .unwrap();
        assert_eq!(
            merged.into_iter().collect::<Vec<_>>(),
            vec![(ProductId(1), 4), (ProductId(2), 3)]
        );
    }

    #[test]
    fn empty_and_zero_lines_are_rejected() {
        assert_eq!(merge_lines(&[]), Err(StoreError::EmptyOrder));
        assert_eq!(
            merge_lines(&[OrderLine::new(ProductId(1), 0)]),
            Err(StoreError::InvalidQuantity)
        );
    }

    #[test]
    fn failure_while_reserving_rolls_back_everything() {
        let shop = Shop::with_clock(|| Utc.with_ymd_and_hms(2025, 10, 19, 14, 0, 0).unwrap());
        let ids: Vec<ProductId> = ["A", "B", "C"]
            .into_iter()
            .map(|sku| {
                shop.add_product(NewProduct::new(sku, sku, dec!(1)).with_stock(5))
                    .unwrap()
            })
            .collect();
        let items: Vec<OrderItem> = ids
            .iter()
            .map(|&id| OrderItem::new(id, 2, dec!(1)))
            .collect();

        let (rows, missing) = shop.inventory.rows(&ids);
        assert!(missing.is_empty());
        let mut staged = StagedRows::lock(&rows);
        // Last row drained between validation and reservation.
        staged.draft(ids[2]).unwrap().quantity = 0;

        let result = shop.commit_order(
            staged,
            UserId(1),
            ShippingInfo::new("12 Market Street"),
            items,
        );

        assert!(matches!(result, Err(StoreError::InsufficientStock(_))));
        assert!(shop.orders().is_empty());
        for &id in &ids {
            let level = shop.inventory().level(id).unwrap();
            assert_eq!((level.quantity, level.reserved), (5, 0));
        }
        let day = NaiveDate::from_ymd_opt(2025, 10, 19).unwrap();
        assert_eq!(shop.order_numbers.order_id(&OrderNumber::new(day, 1)), None);
        assert!(!shop.ordered_products.contains(&ids[0]));

        let next = shop
            .place_order(
                UserId(1),
                &[OrderLine::new(ids[0], 1)],
                ShippingInfo::new("12 Market Street"),
            )
            .unwrap();
        assert_eq!(next.number().to_string(), "TXN-20251019-0002");
    }
}
