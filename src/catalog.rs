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

//! Product catalog.
//!
//! Products are kept in a [`DashMap`] keyed by id, with a second map acting
//! as the unique SKU index. The stock row of a product lives in the
//! [`Inventory`](crate::Inventory), not here.

use crate::StoreError;
use crate::base::{CategoryId, ProductId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub cost_price: Option<Decimal>,
    pub sku: String,
    pub is_active: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

impl Product {
    /// `price - cost_price`, or zero when the cost is unknown.
    pub fn profit_amount(&self) -> Decimal {
        self.cost_price
            .map_or(Decimal::ZERO, |cost| self.price - cost)
    }

    /// `term` must already be lowercase.
    fn matches_term(&self, term: &str) -> bool {
        self.name.to_lowercase().contains(term)
            || self.sku.to_lowercase().contains(term)
            || self
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(term))
    }

    /// Profit as a percentage of the price.
    pub fn profit_margin(&self) -> Decimal {
        match self.cost_price {
            Some(cost) if self.price > Decimal::ZERO => {
                (self.price - cost) / self.price * Decimal::ONE_HUNDRED
            }
            _ => Decimal::ZERO,
        }
    }
}

/// Input for [`Shop::add_product`](crate::Shop::add_product).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub cost_price: Option<Decimal>,
    pub sku: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Units on hand when the stock row is created.
    #[serde(default)]
    pub initial_quantity: u32,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            cost_price: None,
            sku: sku.into(),
            category_id: None,
            initial_quantity: 0,
        }
    }

    pub fn with_cost(mut self, cost_price: Decimal) -> Self {
        self.cost_price = Some(cost_price);
        self
    }

    pub fn with_stock(mut self, quantity: u32) -> Self {
        self.initial_quantity = quantity;
        self
    }

    pub fn in_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Storefront browsing criteria for [`Shop::browse`](crate::Shop::browse).
///
/// The default lists every active product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name, description or SKU.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Only products with available stock.
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductFilter {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn in_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn in_stock(mut self) -> Self {
        self.in_stock = true;
        self
    }

    pub fn include_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    /// Checks the catalog fields; stock is checked by the caller.
    pub(crate) fn matches(&self, product: &Product) -> bool {
        (self.include_inactive || product.is_active)
            && self
                .category_id
                .is_none_or(|category_id| product.category_id == Some(category_id))
            && self
                .search
                .as_deref()
                .is_none_or(|term| product.matches_term(&term.to_lowercase()))
    }
}

#[derive(Debug)]
pub struct Catalog {
    products: DashMap<ProductId, Product>,
    /// Unique SKU index.
    skus: DashMap<String, ProductId>,
    next_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            skus: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Adds an active product and returns its id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateSku`] - SKU already in use.
    /// - [`StoreError::InvalidPrice`] - Negative price or cost.
    pub(crate) fn add(&self, new: &NewProduct) -> Result<ProductId, StoreError> {
        check_price(new.price)?;
        if let Some(cost) = new.cost_price {
            check_price(cost)?;
        }

        match self.skus.entry(new.sku.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateSku(new.sku.clone())),
            Entry::Vacant(entry) => {
                let id = ProductId(self.next_id.fetch_add(1, Ordering::SeqCst));
                entry.insert(id);
                self.products.insert(
                    id,
                    Product {
                        id,
                        name: new.name.clone(),
                        description: new.description.clone(),
                        price: new.price,
                        cost_price: new.cost_price,
                        sku: new.sku.clone(),
                        is_active: true,
                        category_id: new.category_id,
                    },
                );
                Ok(id)
            }
        }
    }

    /// Inserts a persisted product under its own id.
    pub(crate) fn insert(&self, product: Product) -> Result<(), StoreError> {
        if self.products.contains_key(&product.id) {
            return Err(StoreError::InvalidSnapshot(format!(
                "duplicate product id {}",
                product.id
            )));
        }
        match self.skus.entry(product.sku.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateSku(product.sku)),
            Entry::Vacant(entry) => {
                entry.insert(product.id);
                self.next_id
                    .fetch_max(product.id.0.saturating_add(1), Ordering::SeqCst);
                self.products.insert(product.id, product);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&self, id: ProductId) -> Option<Product> {
        let (_, product) = self.products.remove(&id)?;
        self.skus.remove(&product.sku);
        Some(product)
    }

    pub fn get(&self, id: ProductId) -> Option<Product> {
        self.products.get(&id).map(|entry| entry.value().clone())
    }

    pub fn by_sku(&self, sku: &str) -> Option<Product> {
        let id = *self.skus.get(sku)?.value();
        self.get(id)
    }

    /// Returns the product if it exists and is active.
    ///
    /// # Errors
    ///
    /// [`StoreError::ProductInactiveOrMissing`] otherwise.
    pub fn purchasable(&self, id: ProductId) -> Result<Product, StoreError> {
        self.get(id)
            .filter(|product| product.is_active)
            .ok_or(StoreError::ProductInactiveOrMissing(id))
    }

    /// All products in ascending id order.
    pub fn products(&self) -> Vec<Product> {
        self.filtered(|_| true)
    }

    /// Products whose name, description or SKU contains `term`, ignoring
    /// case. Inactive products are included.
    pub fn search(&self, term: &str) -> Vec<Product> {
        let term = term.to_lowercase();
        self.filtered(|product| product.matches_term(&term))
    }

    pub fn by_category(&self, category_id: CategoryId) -> Vec<Product> {
        self.filtered(|product| product.category_id == Some(category_id))
    }

    /// Products matching `keep`, in ascending id order.
    pub(crate) fn filtered(&self, keep: impl Fn(&Product) -> bool) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        products.sort_by_key(|product| product.id);
        products
    }

    pub(crate) fn set_price(&self, id: ProductId, price: Decimal) -> Result<(), StoreError> {
        check_price(price)?;
        let mut product = self
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductInactiveOrMissing(id))?;
        product.price = price;
        Ok(())
    }

    pub(crate) fn set_active(&self, id: ProductId, active: bool) -> Result<(), StoreError> {
        let mut product = self
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductInactiveOrMissing(id))?;
        product.is_active = active;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn check_price(price: Decimal) -> Result<(), StoreError> {
    if price < Decimal::ZERO {
        return Err(StoreError::InvalidPrice(price));
    }
    Ok(())
}
