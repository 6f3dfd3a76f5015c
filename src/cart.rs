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

//! Session shopping carts.
//!
//! A cart maps products to desired quantities for one browsing session and
//! keeps the product name and price seen when the line was added. Carts are
//! advisory: nothing is reserved until checkout, which re-validates every
//! line against live stock.

use crate::StoreError;
use crate::base::{ProductId, SessionId, UserId};
use crate::catalog::Product;
use crate::checkout::{OrderLine, ShippingInfo};
use crate::engine::Shop;
use crate::order::Order;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One cart line with its add-time snapshot of name and price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    /// Informational; checkout charges the price current at checkout.
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<ProductId, CartLine>,
}

impl Cart {
    pub fn get(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.get(&product_id)
    }

    /// Lines in ascending product order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of snapshot subtotals.
    pub fn total(&self) -> Decimal {
        self.lines.values().map(CartLine::subtotal).sum()
    }

    /// Total units across lines.
    pub fn item_count(&self) -> u32 {
        self.lines.values().map(|line| line.quantity).sum()
    }

    fn order_lines(&self) -> Vec<OrderLine> {
        self.lines
            .values()
            .map(|line| OrderLine::new(line.product_id, line.quantity))
            .collect()
    }
}

/// Session-scoped cart storage.
///
/// Implementations only store and fetch; every rule lives in [`Carts`].
pub trait CartStore: Send + Sync {
    /// The session's cart, empty if none was saved.
    fn load(&self, session: &SessionId) -> Cart;

    fn save(&self, session: &SessionId, cart: Cart);

    fn forget(&self, session: &SessionId);
}

/// In-process cart storage.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    carts: DashMap<SessionId, Cart>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions holding a cart.
    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }
}

impl CartStore for MemoryCartStore {
    fn load(&self, session: &SessionId) -> Cart {
        self.carts
            .get(session)
            .map(|cart| cart.value().clone())
            .unwrap_or_default()
    }

    fn save(&self, session: &SessionId, cart: Cart) {
        if cart.is_empty() {
            self.carts.remove(session);
        } else {
            self.carts.insert(session.clone(), cart);
        }
    }

    fn forget(&self, session: &SessionId) {
        self.carts.remove(session);
    }
}

/// A line that exceeds what can currently be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutIssue {
    pub requested: u32,
    pub available: u32,
}

/// A cart line resolved against the live catalog and inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub line: CartLine,
    /// `None` once the product has been deleted.
    pub product: Option<Product>,
    pub available: u32,
    pub in_stock: bool,
}

/// Cart operations for all sessions, validated against a [`Shop`].
pub struct Carts<S = MemoryCartStore> {
    shop: Arc<Shop>,
    store: S,
}

impl Carts<MemoryCartStore> {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self::with_store(shop, MemoryCartStore::new())
    }
}

impl<S: CartStore> Carts<S> {
    pub fn with_store(shop: Arc<Shop>, store: S) -> Self {
        Self { shop, store }
    }

    pub fn shop(&self) -> &Shop {
        &self.shop
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cart(&self, session: &SessionId) -> Cart {
        self.store.load(session)
    }

    /// Units buyable right now; zero for inactive or deleted products.
    fn buyable(&self, product_id: ProductId) -> u32 {
        match self.shop.catalog.get(product_id) {
            Some(product) if product.is_active => self.shop.inventory.available(product_id),
            _ => 0,
        }
    }

    /// Adds `quantity` units on top of what the cart already holds.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidQuantity`] - Zero quantity.
    /// - [`StoreError::ProductInactiveOrMissing`] - Product cannot be bought.
    /// - [`StoreError::InsufficientStock`] - The combined quantity exceeds availability.
    pub fn add(
        &self,
        session: &SessionId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, StoreError> {
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }
        let product = self.shop.catalog.purchasable(product_id)?;
        let mut cart = self.store.load(session);

        let existing = cart.get(product_id).map_or(0, |line| line.quantity);
        let requested = existing
            .checked_add(quantity)
            .ok_or(StoreError::InvalidQuantity)?;
        let available = self.shop.inventory.available(product_id);
        if available < requested {
            debug!(%session, %product_id, requested, available, "cart add rejected");
            return Err(StoreError::insufficient(product_id, requested, available));
        }

        let line = CartLine {
            product_id,
            name: product.name,
            quantity: requested,
            unit_price: product.price,
        };
        cart.lines.insert(product_id, line.clone());
        self.store.save(session, cart);
        Ok(line)
    }

    /// Replaces a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotInCart`] - No line for the product.
    /// - [`StoreError::ProductInactiveOrMissing`] - Product cannot be bought.
    /// - [`StoreError::InsufficientStock`] - `quantity` exceeds availability.
    pub fn set_quantity(
        &self,
        session: &SessionId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<CartLine>, StoreError> {
        let mut cart = self.store.load(session);
        if !cart.lines.contains_key(&product_id) {
            return Err(StoreError::NotInCart(product_id));
        }
        if quantity == 0 {
            cart.lines.remove(&product_id);
            self.store.save(session, cart);
            return Ok(None);
        }

        self.shop.catalog.purchasable(product_id)?;
        let available = self.shop.inventory.available(product_id);
        if available < quantity {
            return Err(StoreError::insufficient(product_id, quantity, available));
        }

        let line = cart
            .lines
            .get_mut(&product_id)
            .ok_or(StoreError::NotInCart(product_id))?;
        line.quantity = quantity;
        let line = line.clone();
        self.store.save(session, cart);
        Ok(Some(line))
    }

    /// Drops a line. Removing an absent product is not an error.
    pub fn remove(&self, session: &SessionId, product_id: ProductId) {
        let mut cart = self.store.load(session);
        if cart.lines.remove(&product_id).is_some() {
            self.store.save(session, cart);
        }
    }

    pub fn clear(&self, session: &SessionId) {
        self.store.forget(session);
    }

    /// Lines that cannot be bought as they stand, keyed by product. An
    /// empty map means the cart is eligible for checkout.
    pub fn validate_for_checkout(&self, session: &SessionId) -> BTreeMap<ProductId, CheckoutIssue> {
        self.store
            .load(session)
            .lines()
            .filter_map(|line| {
                let available = self.buyable(line.product_id);
                (line.quantity > available).then_some((
                    line.product_id,
                    CheckoutIssue {
                        requested: line.quantity,
                        available,
                    },
                ))
            })
            .collect()
    }

    /// Cart lines with live product details and availability.
    pub fn materialize(&self, session: &SessionId) -> Vec<CartEntry> {
        self.store
            .load(session)
            .lines()
            .map(|line| {
                let product = self.shop.catalog.get(line.product_id);
                let available = self.shop.inventory.available(line.product_id);
                let in_stock = product.as_ref().is_some_and(|p| p.is_active) && available > 0;
                CartEntry {
                    line: line.clone(),
                    product,
                    available,
                    in_stock,
                }
            })
            .collect()
    }

    pub fn total(&self, session: &SessionId) -> Decimal {
        self.store.load(session).total()
    }

    pub fn item_count(&self, session: &SessionId) -> u32 {
        self.store.load(session).item_count()
    }

    pub fn is_empty(&self, session: &SessionId) -> bool {
        self.store.load(session).is_empty()
    }

    /// Places an order for the whole cart and empties it.
    ///
    /// The cart is left untouched when the order fails.
    ///
    /// # Errors
    ///
    /// [`StoreError::EmptyOrder`] for an empty cart, otherwise whatever
    /// [`Shop::place_order`] reports.
    pub fn checkout(
        &self,
        session: &SessionId,
        user_id: UserId,
        shipping: ShippingInfo,
    ) -> Result<Order, StoreError> {
        let cart = self.store.load(session);
        if cart.is_empty() {
            return Err(StoreError::EmptyOrder);
        }
        let order = self
            .shop
            .place_order(user_id, &cart.order_lines(), shipping)?;
        self.store.forget(session);
        info!(%session, order_number = %order.number(), "cart checked out");
        Ok(order)
    }
}
