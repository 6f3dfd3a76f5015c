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

//! Human-readable order numbers with a per-day sequence.
//!
//! Numbers look like `TXN-20251019-0042`. Uniqueness does not rely on the
//! per-day counter alone: every number is also claimed in a unique index,
//! and a number that is already taken is skipped.

use crate::StoreError;
use crate::base::OrderId;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Human-readable order identifier, `TXN-YYYYMMDD-NNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber {
    date: NaiveDate,
    sequence: u32,
}

impl OrderNumber {
    pub const PREFIX: &'static str = "TXN";

    pub fn new(date: NaiveDate, sequence: u32) -> Self {
        Self { date, sequence }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            Self::PREFIX,
            self.date.format("%Y%m%d"),
            self.sequence
        )
    }
}

impl FromStr for OrderNumber {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidSnapshot(format!("malformed order number {s:?}"));

        let mut parts = s.splitn(3, '-');
        if parts.next() != Some(Self::PREFIX) {
            return Err(invalid());
        }
        let date = parts
            .next()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
            .ok_or_else(invalid)?;
        let sequence = parts
            .next()
            .filter(|n| n.len() >= 4)
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(invalid)?;

        Ok(Self::new(date, sequence))
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.to_string()
    }
}

/// Issues order numbers and enforces their uniqueness.
///
/// Combines a per-day counter with a [`DashMap`] unique index mapping each
/// issued number to its order. All operations are safe for concurrent
/// access; the entry API makes check-and-insert atomic.
#[derive(Debug)]
pub struct OrderNumberSequence {
    /// Last sequence handed out per calendar day.
    days: DashMap<NaiveDate, u32>,

    /// Unique index of issued numbers.
    issued: DashMap<OrderNumber, OrderId>,
}

impl OrderNumberSequence {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            issued: DashMap::new(),
        }
    }

    /// Issues the next number for `date` and binds it to `order_id`.
    ///
    /// Sequences are monotonic per day. A number that is already present in
    /// the index (for example one loaded from persisted rows) is skipped.
    pub fn next(&self, date: NaiveDate, order_id: OrderId) -> OrderNumber {
        loop {
            // The day entry is released before the unique index is touched.
            let sequence = {
                let mut last = self.days.entry(date).or_insert(0);
                *last += 1;
                *last
            };
            let number = OrderNumber::new(date, sequence);

            match self.issued.entry(number) {
                Entry::Occupied(_) => {
                    debug!(order_number = %number, "order number taken, retrying");
                }
                Entry::Vacant(entry) => {
                    entry.insert(order_id);
                    return number;
                }
            }
        }
    }

    /// Registers an existing number, advancing its day past it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSnapshot`] if the number is already taken.
    pub fn claim(&self, number: OrderNumber, order_id: OrderId) -> Result<(), StoreError> {
        match self.issued.entry(number) {
            Entry::Occupied(_) => Err(StoreError::InvalidSnapshot(format!(
                "duplicate order number {number}"
            ))),
            Entry::Vacant(entry) => {
                let mut last = self.days.entry(number.date()).or_insert(0);
                *last = (*last).max(number.sequence());
                entry.insert(order_id);
                Ok(())
            }
        }
    }

    /// Frees a number whose order was rolled back. The day counter is not
    /// rewound, so the number is never reissued.
    pub fn release(&self, number: &OrderNumber) {
        self.issued.remove(number);
    }

    /// Looks up the order that owns `number`.
    pub fn order_id(&self, number: &OrderNumber) -> Option<OrderId> {
        self.issued.get(number).map(|entry| *entry.value())
    }
}

impl Default for OrderNumberSequence {
    fn default() -> Self {
        Self::new()
    }
}
