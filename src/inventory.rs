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

//! Inventory ledger.
//!
//! The [`Inventory`] owns one [`Stock`] row per product. Single-row
//! operations lock just that row. Multi-row units of work (checkout, order
//! cancellation) go through [`StagedRows`]: every touched row is locked in
//! ascending [`ProductId`] order, changes are made on copies, and the copies
//! are written back only by [`StagedRows::commit`]. Dropping a `StagedRows`
//! without committing leaves every row untouched.
//!
//! # Thread Safety
//!
//! Rows are shared as `Arc<Stock>`. The map shard lock is released before a
//! row mutex is taken, so map access never waits on a row held by a unit of
//! work.

use crate::StoreError;
use crate::base::ProductId;
use crate::stock::{Stock, StockAdjustment, StockLevel, StockRow};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::MutexGuard;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug)]
pub struct Inventory {
    stocks: DashMap<ProductId, Arc<Stock>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            stocks: DashMap::new(),
        }
    }

    fn row(&self, product_id: ProductId) -> Result<Arc<Stock>, StoreError> {
        self.stocks
            .get(&product_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::StockNotFound(product_id))
    }

    /// Claims `amount` units for an in-flight order.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InsufficientStock`] - Fewer than `amount` units available.
    /// - [`StoreError::StockNotFound`] - Product has no stock row.
    pub fn reserve(&self, product_id: ProductId, amount: u32) -> Result<(), StoreError> {
        let result = self.row(product_id)?.reserve(amount);
        if let Err(e) = &result {
            debug!(%product_id, amount, error = %e, "reservation rejected");
        }
        result
    }

    /// Gives back `amount` reserved units.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidReleaseAmount`] if fewer than `amount` units are reserved.
    pub fn release(&self, product_id: ProductId, amount: u32) -> Result<(), StoreError> {
        let result = self.row(product_id)?.release(amount);
        log_violation(&result);
        result
    }

    /// Turns `amount` reserved units into sold units.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfirmAmount`] if fewer than `amount` units are reserved.
    pub fn confirm(&self, product_id: ProductId, amount: u32) -> Result<(), StoreError> {
        let result = self.row(product_id)?.confirm(amount);
        log_violation(&result);
        result
    }

    /// Returns `amount` previously sold units to stock.
    pub fn restore(&self, product_id: ProductId, amount: u32) -> Result<(), StoreError> {
        self.row(product_id)?.restore(amount)
    }

    /// Applies an admin stock correction.
    pub fn adjust(
        &self,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<StockLevel, StoreError> {
        let stock = self.row(product_id)?;
        let mut row = stock.lock();
        row.adjust(adjustment)?;
        debug!(%product_id, ?adjustment, quantity = row.quantity, "stock adjusted");
        Ok(row.level())
    }

    pub fn level(&self, product_id: ProductId) -> Option<StockLevel> {
        self.row(product_id).ok().map(|stock| stock.level())
    }

    /// Units a buyer can still claim; zero without a stock row.
    pub fn available(&self, product_id: ProductId) -> u32 {
        self.level(product_id).map_or(0, |level| level.available)
    }

    /// All stock levels in ascending product order.
    pub fn levels(&self) -> Vec<StockLevel> {
        self.all_rows().iter().map(|stock| stock.level()).collect()
    }

    /// Every row in ascending product order, ready for [`StagedRows::lock`].
    pub(crate) fn all_rows(&self) -> Vec<Arc<Stock>> {
        let mut rows: Vec<Arc<Stock>> = self
            .stocks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        rows.sort_by_key(|stock| stock.product_id());
        rows
    }

    pub(crate) fn insert(&self, stock: Stock) -> Result<(), StoreError> {
        let product_id = stock.product_id();
        match self.stocks.entry(product_id) {
            Entry::Occupied(_) => Err(StoreError::InvalidSnapshot(format!(
                "duplicate stock row for product {product_id}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(stock));
                Ok(())
            }
        }
    }

    pub(crate) fn get(&self, product_id: ProductId) -> Option<Arc<Stock>> {
        self.row(product_id).ok()
    }

    pub(crate) fn remove(&self, product_id: ProductId) {
        self.stocks.remove(&product_id);
    }

    /// Fetches the rows of `ids`, which must be sorted and unique.
    ///
    /// Returns the rows found (in the same order) and the ids without a row.
    pub(crate) fn rows(&self, ids: &[ProductId]) -> (Vec<Arc<Stock>>, Vec<ProductId>) {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in ids {
            match self.row(id) {
                Ok(stock) => found.push(stock),
                Err(_) => missing.push(id),
            }
        }
        (found, missing)
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

fn log_violation(result: &Result<(), StoreError>) {
    if let Err(e) = result {
        if e.is_consistency_violation() {
            error!(error = %e, "stock ledger consistency violation");
        }
    }
}

/// Locked stock rows with staged, uncommitted changes.
pub(crate) struct StagedRows<'a> {
    guards: Vec<MutexGuard<'a, StockRow>>,
    drafts: Vec<StockRow>,
}

impl<'a> StagedRows<'a> {
    /// Locks `rows` in order. Callers pass rows sorted by product id so every
    /// unit of work acquires locks in the same global order.
    pub(crate) fn lock(rows: &'a [Arc<Stock>]) -> Self {
        let guards: Vec<MutexGuard<'a, StockRow>> = rows.iter().map(|stock| stock.lock()).collect();
        debug_assert!(
            guards
                .windows(2)
                .all(|pair| pair[0].product_id < pair[1].product_id),
            "stock rows must be locked in ascending product order"
        );
        let drafts = guards.iter().map(|guard| **guard).collect();
        Self { guards, drafts }
    }

    /// Staged copy of a locked row.
    pub(crate) fn draft(&mut self, product_id: ProductId) -> Option<&mut StockRow> {
        let index = self
            .drafts
            .binary_search_by_key(&product_id, |row| row.product_id)
            .ok()?;
        self.drafts.get_mut(index)
    }

    /// Units available on the staged copy; zero for a row not locked here.
    pub(crate) fn available(&self, product_id: ProductId) -> u32 {
        self.drafts
            .binary_search_by_key(&product_id, |row| row.product_id)
            .map_or(0, |index| self.drafts[index].available())
    }

    /// Same as [`draft`](Self::draft) but reports a missing row as an error.
    pub(crate) fn draft_or_missing(
        &mut self,
        product_id: ProductId,
    ) -> Result<&mut StockRow, StoreError> {
        self.draft(product_id)
            .ok_or(StoreError::StockNotFound(product_id))
    }

    /// Levels of the staged rows in product order.
    pub(crate) fn levels(&self) -> Vec<StockLevel> {
        self.drafts.iter().map(StockRow::level).collect()
    }

    /// Writes every staged row back and releases the locks.
    pub(crate) fn commit(mut self) {
        for (guard, draft) in self.guards.iter_mut().zip(&self.drafts) {
            **guard = *draft;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory_with(rows: &[(u32, u32)]) -> Inventory {
        let inventory = Inventory::new();
        for &(id, quantity) in rows {
            inventory.insert(Stock::new(ProductId(id), quantity)).unwrap();
        }
        inventory
    }

    #[test]
    fn unknown_product_has_no_stock() {
        let inventory = Inventory::new();
        assert_eq!(
            inventory.reserve(ProductId(1), 1),
            Err(StoreError::StockNotFound(ProductId(1)))
        );
        assert_eq!(inventory.available(ProductId(1)), 0);
    }

    #[test]
    fn duplicate_row_is_rejected() {
        let inventory = inventory_with(&[(1, 5)]);
        assert!(inventory.insert(Stock::new(ProductId(1), 3)).is_err());
    }

    #[test]
    fn staged_changes_are_invisible_until_commit() {
        let inventory = inventory_with(&[(1, 10), (2, 10)]);
        let (rows, missing) = inventory.rows(&[ProductId(1), ProductId(2)]);
        assert!(missing.is_empty());

        let mut staged = StagedRows::lock(&rows);
        staged.draft(ProductId(1)).unwrap().reserve(4).unwrap();
        staged.draft(ProductId(2)).unwrap().reserve(6).unwrap();
        staged.commit();

        assert_eq!(inventory.available(ProductId(1)), 6);
        assert_eq!(inventory.available(ProductId(2)), 4);
    }

    #[test]
    fn dropped_stage_leaves_rows_untouched() {
        let inventory = inventory_with(&[(1, 10), (2, 10)]);
        let (rows, _) = inventory.rows(&[ProductId(1), ProductId(2)]);
        {
            let mut staged = StagedRows::lock(&rows);
            staged.draft(ProductId(1)).unwrap().reserve(4).unwrap();
            assert!(staged.draft(ProductId(2)).unwrap().reserve(11).is_err());
        }
        assert_eq!(inventory.level(ProductId(1)).unwrap().reserved, 0);
        assert_eq!(inventory.level(ProductId(2)).unwrap().reserved, 0);
    }

    #[test]
    fn rows_reports_missing_ids() {
        let inventory = inventory_with(&[(1, 10)]);
        let (rows, missing) = inventory.rows(&[ProductId(1), ProductId(2)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(missing, vec![ProductId(2)]);
    }

    #[test]
    fn draft_or_missing_reports_unlocked_rows() {
        let inventory = inventory_with(&[(1, 10)]);
        let (rows, _) = inventory.rows(&[ProductId(1)]);
        let mut staged = StagedRows::lock(&rows);
        assert_eq!(
            staged.draft_or_missing(ProductId(5)).map(|_| ()),
            Err(StoreError::StockNotFound(ProductId(5)))
        );
    }

    #[test]
    fn levels_are_sorted() {
        let inventory = inventory_with(&[(3, 1), (1, 2), (2, 3)]);
        let ids: Vec<u32> = inventory.levels().iter().map(|l| l.product_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
