//! # Settle CLI
//!
//! Settles one order from a JSON request file.
//!
//! ## Usage
//! ```bash
//! cargo run -p shopfront-settle --bin settle -- \
//!     --db ./shopfront_dev.db --request demos/settle_in_store.json
//! ```
//!
//! Prints the persisted order as JSON on stdout. On failure prints
//! `{ "kind": ..., "message": ... }` and exits with status 1.
//! Logs go to stderr.

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use shopfront_db::{Database, DbConfig};
use shopfront_settle::{init_tracing, ConfigError, SettleRequest, SettlementConfig, SettlementService};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = env::var("SHOPFRONT_DB_PATH").ok();
    let mut request_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--request" | "-r" => {
                if i + 1 < args.len() {
                    request_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Shopfront Settle");
                println!();
                println!("Usage: settle --db <PATH> --request <FILE>");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file (or SHOPFRONT_DB_PATH)");
                println!("  -r, --request <FILE>   JSON settle request, '-' for stdin");
                println!("  -h, --help             Show this help message");
                return Ok(ExitCode::SUCCESS);
            }
            _ => {}
        }
        i += 1;
    }

    let db_path = db_path.ok_or_else(|| ConfigError::MissingRequired("--db".to_string()))?;
    let request_path =
        request_path.ok_or_else(|| ConfigError::MissingRequired("--request".to_string()))?;

    let raw = if request_path == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading request from stdin")?
    } else {
        std::fs::read_to_string(&request_path)
            .with_context(|| format!("reading request file {}", request_path))?
    };
    let request: SettleRequest =
        serde_json::from_str(&raw).context("request is not a valid settle request")?;

    let config = SettlementConfig::load()?;
    let db = Database::new(DbConfig::new(&db_path)).await?;
    let service = SettlementService::new(db.clone(), config);

    let outcome = service.settle_order(request).await;
    db.close().await;

    match outcome {
        Ok(order) => {
            println!("{}", serde_json::to_string_pretty(&order)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.to_response())?);
            Ok(ExitCode::FAILURE)
        }
    }
}
