//! # Seed Data Generator
//!
//! Populates the database with a demo store for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default demo store
//! cargo run -p shopfront-db --bin seed
//!
//! # Specify database path and store id
//! cargo run -p shopfront-db --bin seed -- --db ./data/shopfront.db --store demo
//! ```
//!
//! ## Generated Data
//! - One store (EUR) with an `apparel` and a `home` category
//! - Products with size/color variants at 19% and 7% tax
//! - A product-level attached discount (in-store only)
//! - Codes: `SUMMER10` (everything, 100 uses), `TEES25` (apparel category)
//!   and `MUGLOVE` (one variant, single use)
//! - One customer
//!
//! Ids are fixed so the sample requests under `demos/` resolve against it.

use std::env;

use shopfront_core::{Availability, DirectDiscount, DiscountCode, DiscountRate};
use shopfront_db::{Database, DbConfig, NewDiscount, NewProduct, NewVariant};

/// (product id, category, name, [(variant id, sku, size, color, price cents, tax bps, stock)])
type SeedProduct = (
    &'static str,
    &'static str,
    &'static str,
    &'static [(&'static str, &'static str, &'static str, &'static str, i64, u32, i64)],
);

const PRODUCTS: &[SeedProduct] = &[
    (
        "tee",
        "apparel",
        "Organic Tee",
        &[
            ("tee-s-black", "TEE-S-BLK", "S", "black", 2000, 1900, 25),
            ("tee-m-black", "TEE-M-BLK", "M", "black", 2000, 1900, 40),
            ("tee-l-white", "TEE-L-WHT", "L", "white", 2200, 1900, 12),
        ],
    ),
    (
        "hoodie",
        "apparel",
        "Zip Hoodie",
        &[
            ("hoodie-m-grey", "HOOD-M-GRY", "M", "grey", 5900, 1900, 8),
            ("hoodie-l-grey", "HOOD-L-GRY", "L", "grey", 5900, 1900, 1),
        ],
    ),
    (
        "mug",
        "home",
        "Stoneware Mug",
        &[("mug-red", "MUG-RED", "350ml", "red", 1200, 1900, 60)],
    ),
    (
        "cookbook",
        "home",
        "Weeknight Cookbook",
        &[("cookbook-hc", "BOOK-HC", "hardcover", "n/a", 2999, 700, 15)],
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./shopfront_dev.db");
    let mut store_id = String::from("demo");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Shopfront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./shopfront_dev.db)");
                println!("  -s, --store <ID>     Store id to create (default: demo)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Shopfront Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Store:    {}", store_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let catalog = db.catalog();
    if catalog.store_currency(&store_id).await?.is_some() {
        println!("⚠ Store '{}' already exists", store_id);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    catalog.insert_store(&store_id, "Demo Shop", "EUR").await?;
    for (category_id, name) in [("apparel", "Apparel"), ("home", "Home & Kitchen")] {
        catalog
            .insert_category(&scoped(&store_id, category_id), &store_id, None, name)
            .await?;
    }
    println!("✓ Store and categories");

    let mut variants = 0;
    for (product_id, category, name, product_variants) in PRODUCTS {
        catalog
            .insert_product(&NewProduct {
                id: scoped(&store_id, product_id),
                store_id: store_id.clone(),
                category_id: Some(scoped(&store_id, category)),
                name: name.to_string(),
            })
            .await?;

        for (variant_id, sku, size, color, price, tax_bps, stock) in product_variants.iter() {
            let mut variant = NewVariant::new(
                scoped(&store_id, variant_id),
                scoped(&store_id, product_id),
                *sku,
                *price,
                *tax_bps,
                *stock,
            );
            variant.options.insert("size".to_string(), size.to_string());
            variant.options.insert("color".to_string(), color.to_string());
            catalog.insert_variant(&variant).await?;
            variants += 1;
        }
    }
    println!("✓ {} products, {} variants", PRODUCTS.len(), variants);

    let discounts = db.discounts();
    discounts
        .insert_discount(&NewDiscount {
            store_id: store_id.clone(),
            discount: DirectDiscount {
                id: scoped(&store_id, "hoodie-instore-15"),
                product_id: Some(scoped(&store_id, "hoodie")),
                variant_id: None,
                rate: DiscountRate::from_bps(1500)?,
                availability: Availability {
                    available_online: false,
                    ..Availability::always()
                },
            },
        })
        .await?;

    let codes = [
        DiscountCode {
            id: scoped(&store_id, "code-summer10"),
            code: "SUMMER10".to_string(),
            rate: DiscountRate::from_bps(1000)?,
            availability: Availability::always(),
            usage_limit: Some(100),
            used_count: 0,
            variant_ids: vec![],
            product_ids: vec![],
            category_id: None,
        },
        DiscountCode {
            id: scoped(&store_id, "code-tees25"),
            code: "TEES25".to_string(),
            rate: DiscountRate::from_bps(2500)?,
            availability: Availability::always(),
            usage_limit: None,
            used_count: 0,
            variant_ids: vec![],
            product_ids: vec![],
            category_id: Some(scoped(&store_id, "apparel")),
        },
        DiscountCode {
            id: scoped(&store_id, "code-muglove"),
            code: "MUGLOVE".to_string(),
            rate: DiscountRate::from_bps(5000)?,
            availability: Availability::always(),
            usage_limit: Some(1),
            used_count: 0,
            variant_ids: vec![scoped(&store_id, "mug-red")],
            product_ids: vec![],
            category_id: None,
        },
    ];
    for code in &codes {
        discounts.insert_code(&store_id, code).await?;
    }
    println!("✓ 1 attached discount, {} codes", codes.len());

    catalog
        .insert_customer(&scoped(&store_id, "customer-ada"), &store_id, "Ada Lovelace")
        .await?;
    println!("✓ 1 customer");

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Ids are global across stores, so prefix everything with the store id.
fn scoped(store_id: &str, id: &str) -> String {
    format!("{}-{}", store_id, id)
}
