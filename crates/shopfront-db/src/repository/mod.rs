//! # Repository Module
//!
//! Database repositories for Shopfront settlement.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SettlementService                                                      │
//! │       │                                                                 │
//! │       │  db.catalog().load_snapshots(store, cart, channel, now)         │
//! │       │  db.discounts().find_code(store, "summer10")                    │
//! │       │  db.orders().commit(new_order)                                  │
//! │       ▼                                                                 │
//! │  CatalogRepository       - variant snapshots, attached discounts       │
//! │  DiscountRepository      - discount codes and their targets            │
//! │  OrderRepository         - atomic commit, order reads                  │
//! │  NotificationRepository  - outbox drain                                 │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod discount;
pub mod notification;
pub mod order;
