//! # Seed Data Generator
//!
//! Populates the database with apparel variants for development.
//!
//! ## Usage
//! ```bash
//! # Every product × size × color combination (default)
//! cargo run -p stockroom-db --bin seed
//!
//! # Cap the number of variants
//! cargo run -p stockroom-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom.db
//! ```
//!
//! ## Generated Variants
//! Each variant has:
//! - Product reference: `{CODE}` (e.g. `TEE-CREW`)
//! - Size and color
//! - Unique 13-digit barcode
//! - Price: product base price + size surcharge
//! - Stock: 0 - 40 units (fabric by the metre gets fractional stock)

use std::env;
use stockroom_core::{Money, Quantity};
use stockroom_db::{Database, DbConfig, NewVariant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (product code, base price in cents, sold by the metre)
const PRODUCTS: &[(&str, i64, bool)] = &[
    ("TEE-CREW", 1499, false),
    ("TEE-VNECK", 1599, false),
    ("POLO-PIQUE", 2999, false),
    ("HOODIE-ZIP", 4999, false),
    ("SWEAT-CREW", 3999, false),
    ("JEANS-SLIM", 5999, false),
    ("JEANS-STRAIGHT", 5999, false),
    ("CHINO-REG", 4499, false),
    ("JACKET-DENIM", 7999, false),
    ("FABRIC-LINEN", 1250, true),
    ("FABRIC-DENIM", 990, true),
];

/// (size, surcharge in cents)
const SIZES: &[(&str, i64)] = &[
    ("XS", 0),
    ("S", 0),
    ("M", 0),
    ("L", 100),
    ("XL", 200),
    ("XXL", 300),
];

const COLORS: &[&str] = &["Black", "White", "Navy", "Heather Grey", "Olive"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = usize::MAX;
    let mut db_path = String::from("./stockroom_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Maximum number of variants (default: all)");
                println!("  -d, --db <PATH>    Database file path (default: ./stockroom_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.variants().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has variants; skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0usize;
    let mut seq = 0usize;

    'outer: for (product, base_price, by_metre) in PRODUCTS {
        // Fabric has no sizes
        let sizes: &[(&str, i64)] = if *by_metre { &[("", 0)] } else { SIZES };

        for (size, surcharge) in sizes {
            for color in COLORS {
                if generated >= count {
                    break 'outer;
                }
                seq += 1;

                let new = generate_variant(product, *base_price, *by_metre, size, *surcharge, color, seq);
                if let Err(e) = db.variants().insert(&new).await {
                    warn!(barcode = %new.barcode, error = %e, "Failed to insert variant");
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    info!(generated, "Seeding in progress");
                }
            }
        }
    }

    info!(generated, elapsed = ?start.elapsed(), "Seed complete");
    Ok(())
}

/// Builds one variant with deterministic pseudo-random stock.
fn generate_variant(
    product: &str,
    base_price: i64,
    by_metre: bool,
    size: &str,
    surcharge: i64,
    color: &str,
    seq: usize,
) -> NewVariant {
    // 13 digits, unique per seq
    let barcode = format!("200{:010}", seq);

    let stock = if by_metre {
        // 0.000 - 39.750 metres in quarter-metre steps
        Quantity::from_milli(((seq * 37) % 160) as i64 * 250)
    } else {
        Quantity::from_units(((seq * 13) % 41) as i64)
    };

    let mut new = NewVariant::new(product, barcode, Money::from_cents(base_price + surcharge))
        .color(color)
        .stock(stock);
    if !size.is_empty() {
        new = new.size(size);
    }
    new
}
