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

//! Sales statistics over order history.
//!
//! Figures are computed from order history at call time; nothing is cached.
//! Only `Completed` orders count as sales. The conversion rate compares them
//! with every order created in the same range, and the
//! [`TransactionReport`] covers orders of every status.

use crate::base::{CategoryId, OrderId, ProductId, UserId};
use crate::catalog::Product;
use crate::engine::Shop;
use crate::order::{Order, OrderItem, OrderStatus};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Share of an item's subtotal counted as profit when the product has no
/// cost price.
pub const PROFIT_FALLBACK_RATE: Decimal = dec!(0.7);

/// Days covered by [`DateRange::default`].
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days up to `end`.
    pub fn last_days(end: DateTime<Utc>, days: i64) -> Self {
        Self::new(end - Duration::days(days), end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::last_days(Utc::now(), DEFAULT_RANGE_DAYS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SalesOverview {
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    /// Percent of revenue.
    pub profit_margin: Decimal,
    pub completed_orders: usize,
    pub average_order_value: Decimal,
    pub items_sold: u64,
    pub customers: usize,
    /// Completed orders as a percent of all orders created in the range.
    pub conversion_rate: Decimal,
}

/// Figures for one calendar period: a day, a month or a year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodSales {
    pub revenue: Decimal,
    pub orders: usize,
    pub average_order_value: Decimal,
    pub customers: usize,
    pub items_sold: u64,
    pub profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub sales: PeriodSales,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySales {
    pub year: i32,
    /// 1 to 12.
    pub month: u32,
    #[serde(flatten)]
    pub sales: PeriodSales,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearlySales {
    pub year: i32,
    #[serde(flatten)]
    pub sales: PeriodSales,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestSeller {
    pub product_id: ProductId,
    /// Empty once the product has been deleted.
    pub name: String,
    pub quantity: u64,
    pub revenue: Decimal,
    /// Distinct orders containing the product.
    pub orders: usize,
    pub average_price: Decimal,
    pub profit: Decimal,
}

/// Sales of one product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryPerformance {
    pub category_id: CategoryId,
    pub quantity: u64,
    pub revenue: Decimal,
    /// Distinct orders with at least one item of the category.
    pub orders: usize,
    /// Mean unit price over the category's order lines.
    pub average_price: Decimal,
    pub customers: usize,
    pub profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub range: DateRange,
    pub overview: SalesOverview,
    /// One entry per day with sales, oldest first.
    pub daily: Vec<DailySales>,
    /// One entry per month with sales, oldest first.
    pub monthly: Vec<MonthlySales>,
    pub top_by_quantity: Vec<BestSeller>,
    pub top_by_revenue: Vec<BestSeller>,
    /// Highest revenue first. Products without a category are left out.
    pub categories: Vec<CategoryPerformance>,
}

/// Quantity and revenue of one product over orders of any status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    /// Empty once the product has been deleted.
    pub name: String,
    pub quantity: u64,
    pub revenue: Decimal,
}

/// Admin overview of every order created in a range, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReport {
    pub range: DateRange,
    pub total_orders: usize,
    pub total_revenue: Decimal,
    pub by_status: BTreeMap<OrderStatus, usize>,
    pub revenue_by_date: BTreeMap<NaiveDate, Decimal>,
    /// Highest revenue first.
    pub top_products: Vec<ProductSales>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub total_orders: usize,
    /// Sum over every order regardless of status.
    pub total_amount: Decimal,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Mean total of completed orders.
    pub average_order_value: Decimal,
}

/// Profit of one sold line. Uses the order-time price against the product's
/// cost, or the fallback rate when the cost is unknown.
pub fn item_profit(item: &OrderItem, product: Option<&Product>) -> Decimal {
    match product.and_then(|p| p.cost_price) {
        Some(cost) => (item.unit_price() - cost) * Decimal::from(item.quantity()),
        None => item.subtotal() * PROFIT_FALLBACK_RATE,
    }
}

fn mean(sum: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole * Decimal::ONE_HUNDRED
    }
}

/// Running totals of one period.
#[derive(Default)]
struct PeriodAccumulator {
    revenue: Decimal,
    orders: usize,
    customers: BTreeSet<UserId>,
    items_sold: u64,
    profit: Decimal,
}

impl PeriodAccumulator {
    fn add(&mut self, order: &Order, items_sold: u64, profit: Decimal) {
        self.revenue += order.total_amount();
        self.orders += 1;
        self.customers.insert(order.user_id());
        self.items_sold += items_sold;
        self.profit += profit;
    }

    fn finish(self) -> PeriodSales {
        PeriodSales {
            revenue: self.revenue,
            orders: self.orders,
            average_order_value: mean(self.revenue, self.orders),
            customers: self.customers.len(),
            items_sold: self.items_sold,
            profit: self.profit,
        }
    }
}

#[derive(Default)]
struct ProductAccumulator {
    quantity: u64,
    revenue: Decimal,
    orders: usize,
    profit: Decimal,
}

#[derive(Default)]
struct CategoryAccumulator {
    quantity: u64,
    revenue: Decimal,
    orders: BTreeSet<OrderId>,
    price_sum: Decimal,
    lines: usize,
    customers: BTreeSet<UserId>,
    profit: Decimal,
}

impl Shop {
    fn product_index(&self) -> HashMap<ProductId, Product> {
        self.catalog
            .products()
            .into_iter()
            .map(|product| (product.id, product))
            .collect()
    }

    /// Sales report over completed orders created within `range`.
    ///
    /// `limit` caps each best-seller list.
    pub fn sales_report(&self, range: DateRange, limit: usize) -> SalesReport {
        let products = self.product_index();

        let in_range: Vec<Order> = self
            .orders()
            .into_iter()
            .filter(|order| range.contains(order.created_at()))
            .collect();
        let created = in_range.len();
        let completed: Vec<&Order> = in_range
            .iter()
            .filter(|order| order.status() == OrderStatus::Completed)
            .collect();

        let mut overview = SalesOverview::default();
        let mut customers = BTreeSet::new();
        let mut days: BTreeMap<NaiveDate, PeriodAccumulator> = BTreeMap::new();
        let mut months: BTreeMap<(i32, u32), PeriodAccumulator> = BTreeMap::new();
        let mut sellers: BTreeMap<ProductId, ProductAccumulator> = BTreeMap::new();
        let mut categories: BTreeMap<CategoryId, CategoryAccumulator> = BTreeMap::new();

        for order in &completed {
            customers.insert(order.user_id());
            overview.total_revenue += order.total_amount();

            let mut items_sold = 0;
            let mut order_profit = Decimal::ZERO;
            let mut seen = BTreeSet::new();
            for item in order.items() {
                let product = products.get(&item.product_id());
                let profit = item_profit(item, product);
                let quantity = u64::from(item.quantity());
                items_sold += quantity;
                order_profit += profit;

                let seller = sellers.entry(item.product_id()).or_default();
                seller.quantity += quantity;
                seller.revenue += item.subtotal();
                seller.profit += profit;
                if seen.insert(item.product_id()) {
                    seller.orders += 1;
                }

                if let Some(category_id) = product.and_then(|p| p.category_id) {
                    let category = categories.entry(category_id).or_default();
                    category.quantity += quantity;
                    category.revenue += item.subtotal();
                    category.orders.insert(order.id());
                    category.price_sum += item.unit_price();
                    category.lines += 1;
                    category.customers.insert(order.user_id());
                    category.profit += profit;
                }
            }

            overview.items_sold += items_sold;
            overview.total_profit += order_profit;
            let date = order.created_at().date_naive();
            days.entry(date)
                .or_default()
                .add(order, items_sold, order_profit);
            months
                .entry((date.year(), date.month()))
                .or_default()
                .add(order, items_sold, order_profit);
        }

        overview.completed_orders = completed.len();
        overview.customers = customers.len();
        overview.average_order_value = mean(overview.total_revenue, completed.len());
        overview.profit_margin = percent(overview.total_profit, overview.total_revenue);
        overview.conversion_rate =
            percent(Decimal::from(completed.len()), Decimal::from(created));

        let daily = days
            .into_iter()
            .map(|(date, day)| DailySales {
                date,
                sales: day.finish(),
            })
            .collect();
        let monthly = months
            .into_iter()
            .map(|((year, month), period)| MonthlySales {
                year,
                month,
                sales: period.finish(),
            })
            .collect();

        let sellers: Vec<BestSeller> = sellers
            .into_iter()
            .map(|(product_id, seller)| BestSeller {
                product_id,
                name: product_name(&products, product_id),
                quantity: seller.quantity,
                revenue: seller.revenue,
                orders: seller.orders,
                average_price: if seller.quantity == 0 {
                    Decimal::ZERO
                } else {
                    seller.revenue / Decimal::from(seller.quantity)
                },
                profit: seller.profit,
            })
            .collect();

        let mut top_by_quantity = sellers.clone();
        top_by_quantity.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then(a.product_id.cmp(&b.product_id))
        });
        top_by_quantity.truncate(limit);

        let mut top_by_revenue = sellers;
        top_by_revenue.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then(a.product_id.cmp(&b.product_id))
        });
        top_by_revenue.truncate(limit);

        let mut categories: Vec<CategoryPerformance> = categories
            .into_iter()
            .map(|(category_id, category)| CategoryPerformance {
                category_id,
                quantity: category.quantity,
                revenue: category.revenue,
                orders: category.orders.len(),
                average_price: mean(category.price_sum, category.lines),
                customers: category.customers.len(),
                profit: category.profit,
            })
            .collect();
        categories.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then(a.category_id.cmp(&b.category_id))
        });

        SalesReport {
            range,
            overview,
            daily,
            monthly,
            top_by_quantity,
            top_by_revenue,
            categories,
        }
    }

    /// Completed sales per calendar year over all time, oldest first.
    pub fn yearly_sales(&self) -> Vec<YearlySales> {
        let products = self.product_index();
        let mut years: BTreeMap<i32, PeriodAccumulator> = BTreeMap::new();

        for order in self.orders() {
            if order.status() != OrderStatus::Completed {
                continue;
            }
            let items_sold = order
                .items()
                .iter()
                .map(|item| u64::from(item.quantity()))
                .sum();
            let profit = order
                .items()
                .iter()
                .map(|item| item_profit(item, products.get(&item.product_id())))
                .sum();
            years
                .entry(order.created_at().year())
                .or_default()
                .add(&order, items_sold, profit);
        }

        years
            .into_iter()
            .map(|(year, period)| YearlySales {
                year,
                sales: period.finish(),
            })
            .collect()
    }

    /// Every order created within `range`, whatever its status.
    ///
    /// `limit` caps the product list.
    pub fn transaction_report(&self, range: DateRange, limit: usize) -> TransactionReport {
        let products = self.product_index();
        let mut report = TransactionReport {
            range,
            total_orders: 0,
            total_revenue: Decimal::ZERO,
            by_status: BTreeMap::new(),
            revenue_by_date: BTreeMap::new(),
            top_products: Vec::new(),
        };
        let mut sales: BTreeMap<ProductId, (u64, Decimal)> = BTreeMap::new();

        for order in self.orders() {
            if !range.contains(order.created_at()) {
                continue;
            }
            report.total_orders += 1;
            report.total_revenue += order.total_amount();
            *report.by_status.entry(order.status()).or_default() += 1;
            *report
                .revenue_by_date
                .entry(order.created_at().date_naive())
                .or_default() += order.total_amount();

            for item in order.items() {
                let (quantity, revenue) = sales.entry(item.product_id()).or_default();
                *quantity += u64::from(item.quantity());
                *revenue += item.subtotal();
            }
        }

        let mut top_products: Vec<ProductSales> = sales
            .into_iter()
            .map(|(product_id, (quantity, revenue))| ProductSales {
                product_id,
                name: product_name(&products, product_id),
                quantity,
                revenue,
            })
            .collect();
        top_products.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then(a.product_id.cmp(&b.product_id))
        });
        top_products.truncate(limit);
        report.top_products = top_products;
        report
    }

    /// Order counts and amounts of one user over all time.
    pub fn user_stats(&self, user_id: UserId) -> UserStats {
        let orders = self.orders_for_user(user_id);
        let count = |status: OrderStatus| orders.iter().filter(|o| o.status() == status).count();

        let completed_total: Decimal = orders
            .iter()
            .filter(|o| o.status() == OrderStatus::Completed)
            .map(Order::total_amount)
            .sum();
        let completed = count(OrderStatus::Completed);

        UserStats {
            user_id,
            total_orders: orders.len(),
            total_amount: orders.iter().map(Order::total_amount).sum(),
            pending: count(OrderStatus::Pending),
            processing: count(OrderStatus::Processing),
            completed,
            cancelled: count(OrderStatus::Cancelled),
            average_order_value: mean(completed_total, completed),
        }
    }
}

fn product_name(products: &HashMap<ProductId, Product>, id: ProductId) -> String {
    products
        .get(&id)
        .map(|p| p.name.clone())
        .unwrap_or_default()
}
