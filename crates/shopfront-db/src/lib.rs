//! # shopfront-db: Database Layer for Shopfront
//!
//! SQLite storage for the catalog settlement reads from and the orders it
//! writes, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Shopfront Data Flow                                │
//! │                                                                         │
//! │  SettlementService::settle_order                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  shopfront-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │   │   │
//! │  │   │               │    │ Catalog        │    │ 001_catalog  │   │   │
//! │  │   │ SqlitePool    │◄───│ Discount       │    │ 002_discounts│   │   │
//! │  │   │ WAL + busy    │    │ Order (commit) │    │ 003_orders   │   │   │
//! │  │   │ timeout       │    │ Notification   │    │ 004_outbox   │   │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopfront_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("shopfront.db")).await?;
//!
//! let code = db.discounts().find_code("store-1", "summer10").await?;
//! let order = db.orders().get_by_id("store-1", "order-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::{CatalogRepository, NewProduct, NewVariant};
pub use repository::discount::{DiscountRepository, NewDiscount};
pub use repository::notification::{NotificationEntry, NotificationRepository};
pub use repository::order::{NewOrder, OrderRepository};
