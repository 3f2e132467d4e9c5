//! # shopfront-settle: Order Settlement
//!
//! Converts a validated cart into a persisted, paid order and mutates
//! inventory accordingly, or fails without touching anything.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller (web checkout, POS terminal, `settle` CLI)                      │
//! │       │                                                                 │
//! │       │  SettleRequest { store, channel, cart, payments, code, ... }    │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │             shopfront-settle (THIS CRATE)                         │  │
//! │  │                                                                   │  │
//! │  │   SettlementService::settle_order ── SettlementConfig (env)       │  │
//! │  │        │                    │                                     │  │
//! │  │        ▼                    ▼                                     │  │
//! │  │   shopfront-core        shopfront-db                              │  │
//! │  │   (discounts, pricing,  (snapshots, code lookup,                  │  │
//! │  │    payments, stages)     atomic commit)                           │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Order | SettlementError { kind, message }                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopfront_settle::{SettleRequest, SettlementConfig, SettlementService};
//! use shopfront_core::{CartLine, Channel, PaymentTender};
//!
//! let service = SettlementService::new(db, SettlementConfig::from_env());
//! let order = service
//!     .settle_order(
//!         SettleRequest::new("store-1", Channel::InStore, vec![CartLine::new("p1", "v1", 2)])
//!             .with_payments(vec![PaymentTender::cash(20000)]),
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::{ConfigError, SettlementConfig};
pub use error::{ErrorKind, ErrorResponse, SettlementError};
pub use service::{SettleRequest, SettlementService};

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=shopfront_settle=trace` - Show trace for this crate only
/// - Default: INFO, DEBUG for shopfront crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shopfront=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
