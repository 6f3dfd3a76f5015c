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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use storefront_core::{
    Carts, DEFAULT_LOW_STOCK_THRESHOLD, NewProduct, OrderId, OrderStatus, ProductId, SessionId,
    ShippingInfo, Shop, Snapshot, StockAdjustment, StoreError, UserId,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Storefront - Replay storefront operations from a CSV file
///
/// Applies catalog, cart, checkout and order status operations to a shop and
/// writes the resulting stock levels to stdout.
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Replays storefront operations and reports stock levels", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,session,user,product,quantity,price,sku,name,order,status,address
    /// Example: cargo run -- operations.csv > stock.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON snapshot to start from instead of an empty shop
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Write the final state as a JSON snapshot
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,

    /// Flag products with at most this many units available
    #[arg(long, value_name = "UNITS", default_value_t = DEFAULT_LOW_STOCK_THRESHOLD)]
    low_stock: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storefront_core=info,storefront=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let shop = match &args.state {
        Some(path) => match load_state(path) {
            Ok(shop) => shop,
            Err(e) => {
                eprintln!("Error loading state '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Shop::new(),
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let carts = Carts::new(Arc::new(shop));
    if let Err(e) = process_operations(&carts, BufReader::new(file)) {
        eprintln!("Error processing operations: {}", e);
        process::exit(1);
    }

    if let Some(path) = &args.save {
        if let Err(e) = save_state(carts.shop(), path) {
            eprintln!("Error saving state '{}': {}", path.display(), e);
            process::exit(1);
        }
    }

    if let Err(e) = write_stock_report(carts.shop(), args.low_stock, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn load_state(path: &Path) -> Result<Shop, Box<dyn std::error::Error>> {
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Ok(Shop::from_snapshot(snapshot)?)
}

fn save_state(shop: &Shop, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &shop.snapshot())?;
    writer.flush()?;
    info!(path = %path.display(), "state saved");
    Ok(())
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, session, user, product, quantity, price, sku, name, order, status, address`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    user: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    product: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<Decimal>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    order: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// One replayable storefront operation.
#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Product(NewProduct),
    Restock {
        product_id: ProductId,
        quantity: u32,
    },
    Add {
        session: SessionId,
        product_id: ProductId,
        quantity: u32,
    },
    Set {
        session: SessionId,
        product_id: ProductId,
        quantity: u32,
    },
    Remove {
        session: SessionId,
        product_id: ProductId,
    },
    Checkout {
        session: SessionId,
        user_id: UserId,
        shipping: ShippingInfo,
    },
    Status {
        order_id: OrderId,
        status: OrderStatus,
    },
    Cancel {
        order_id: OrderId,
    },
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

impl CsvRecord {
    /// Converts CSV record to an Operation.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let session = present(self.session).map(SessionId::new);
        let product_id = self.product.map(ProductId);

        match self.op.to_lowercase().as_str() {
            "product" => {
                let new = NewProduct::new(present(self.name)?, present(self.sku)?, self.price?)
                    .with_stock(self.quantity.unwrap_or(0));
                Some(Operation::Product(new))
            }
            "restock" => Some(Operation::Restock {
                product_id: product_id?,
                quantity: self.quantity?,
            }),
            "add" => Some(Operation::Add {
                session: session?,
                product_id: product_id?,
                quantity: self.quantity?,
            }),
            "set" => Some(Operation::Set {
                session: session?,
                product_id: product_id?,
                quantity: self.quantity?,
            }),
            "remove" => Some(Operation::Remove {
                session: session?,
                product_id: product_id?,
            }),
            "checkout" => Some(Operation::Checkout {
                session: session?,
                user_id: UserId(self.user?),
                shipping: ShippingInfo::new(present(self.address)?),
            }),
            "status" => Some(Operation::Status {
                order_id: OrderId(self.order?),
                status: present(self.status)?.parse().ok()?,
            }),
            "cancel" => Some(Operation::Cancel {
                order_id: OrderId(self.order?),
            }),
            _ => None,
        }
    }
}

fn apply(carts: &Carts, operation: Operation) -> Result<(), StoreError> {
    let shop = carts.shop();
    match operation {
        Operation::Product(new) => {
            shop.add_product(new)?;
        }
        Operation::Restock {
            product_id,
            quantity,
        } => {
            shop.inventory()
                .adjust(product_id, StockAdjustment::Add(quantity))?;
        }
        Operation::Add {
            session,
            product_id,
            quantity,
        } => {
            carts.add(&session, product_id, quantity)?;
        }
        Operation::Set {
            session,
            product_id,
            quantity,
        } => {
            carts.set_quantity(&session, product_id, quantity)?;
        }
        Operation::Remove {
            session,
            product_id,
        } => carts.remove(&session, product_id),
        Operation::Checkout {
            session,
            user_id,
            shipping,
        } => {
            carts.checkout(&session, user_id, shipping)?;
        }
        Operation::Status { order_id, status } => {
            shop.transition(order_id, status)?;
        }
        Operation::Cancel { order_id } => {
            shop.cancel(order_id)?;
        }
    }
    Ok(())
}

/// Replays operations from a CSV reader against `carts` and its shop.
///
/// Rows are streamed one at a time. Malformed rows and rejected operations
/// are logged and skipped; they never stop the replay.
///
/// # CSV Format
///
/// Expected columns: `op, session, user, product, quantity, price, sku, name, order, status, address`
/// - `op`: product, restock, add, set, remove, checkout, status or cancel
/// - Remaining columns are read only by the operations that need them
///
/// # Example
///
/// ```csv
/// op,session,user,product,quantity,price,sku,name,order,status,address
/// product,,,,10,8.50,MUG-1,Mug,,,
/// add,s1,,1,2,,,,,,
/// checkout,s1,7,,,,,,,,12 Market Street
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header cannot be read.
fn process_operations<R: Read>(carts: &Carts, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(operation) = record.into_operation() else {
            warn!(line, "skipping incomplete operation");
            continue;
        };
        debug!(line, ?operation, "applying operation");
        if let Err(e) = apply(carts, operation) {
            warn!(line, error = %e, "operation rejected");
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StockReportRow {
    product: ProductId,
    sku: String,
    name: String,
    quantity: u32,
    reserved: u32,
    available: u32,
    active: bool,
    low_stock: bool,
}

/// Writes one row per product with its stock figures.
///
/// # CSV Format
///
/// Columns: `product, sku, name, quantity, reserved, available, active, low_stock`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_stock_report<W: Write>(shop: &Shop, low_stock: u32, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for product in shop.catalog().products() {
        let Some(level) = shop.inventory().level(product.id) else {
            continue;
        };
        wtr.serialize(StockReportRow {
            product: product.id,
            active: product.is_active,
            low_stock: product.is_active && level.available <= low_stock,
            sku: product.sku,
            name: product.name,
            quantity: level.quantity,
            reserved: level.reserved,
            available: level.available,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "op,session,user,product,quantity,price,sku,name,order,status,address\n";

    fn replay(rows: &str) -> Carts {
        let carts = Carts::new(Arc::new(Shop::new()));
        process_operations(&carts, Cursor::new(format!("{HEADER}{rows}"))).unwrap();
        carts
    }

    #[test]
    fn parse_product_creation() {
        let carts = replay("product,,,,10,8.50,MUG-1,Mug,,,\n");

        let product = carts.shop().product(ProductId(1)).unwrap();
        assert_eq!(product.price, dec!(8.50));
        assert_eq!(carts.shop().inventory().available(ProductId(1)), 10);
    }

    #[test]
    fn parse_cart_and_checkout() {
        let carts = replay(
            "product,,,,10,8.50,MUG-1,Mug,,,\n\
             add,s1,,1,2,,,,,,\n\
             add,s1,,1,1,,,,,,\n\
             checkout,s1,7,,,,,,,,12 Market Street\n",
        );

        let orders = carts.shop().orders_for_user(UserId(7));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].total_amount(), dec!(25.50));
        assert_eq!(carts.shop().inventory().available(ProductId(1)), 7);
        assert!(carts.is_empty(&SessionId::new("s1")));
    }

    #[test]
    fn parse_cancel_restores_stock() {
        let carts = replay(
            "product,,,,5,1.00,A,A,,,\n\
             add,s1,,1,5,,,,,,\n\
             checkout,s1,1,,,,,,,,12 Market Street\n\
             cancel,,,,,,,,1,,\n",
        );

        assert_eq!(carts.shop().inventory().available(ProductId(1)), 5);
        let order = carts.shop().order(OrderId(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn parse_with_whitespace() {
        let carts = replay(" product , , , , 3 , 2.00 , B-1 , Bolt , , , \n");
        assert_eq!(carts.shop().inventory().available(ProductId(1)), 3);
    }

    #[test]
    fn rejected_operations_are_skipped() {
        let carts = replay(
            "product,,,,1,1.00,A,A,,,\n\
             add,s1,,1,2,,,,,,\n\
             bogus,row,data,here\n\
             restock,,,1,4,,,,,,\n\
             status,,,,,,,,1,COMPLETED,\n",
        );

        assert!(carts.is_empty(&SessionId::new("s1")));
        assert_eq!(carts.shop().inventory().available(ProductId(1)), 5);
    }

    #[test]
    fn write_stock_report_to_csv() {
        let carts = replay(
            "product,,,,10,1.00,A-1,Anchor,,,\n\
             product,,,,2,1.00,B-1,Buoy,,,\n",
        );

        let mut output = Vec::new();
        write_stock_report(carts.shop(), 5, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("product,sku,name,quantity,reserved,available,active,low_stock")
        );
        assert_eq!(lines.next(), Some("1,A-1,Anchor,10,0,10,true,false"));
        assert_eq!(lines.next(), Some("2,B-1,Buoy,2,0,2,true,true"));
    }
}
