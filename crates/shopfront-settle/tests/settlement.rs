//! End-to-end settlement tests against real SQLite databases.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use shopfront_core::{
    Availability, CartLine, Channel, DirectDiscount, DiscountCode, DiscountRate,
    DiscountRejection, DiscountSource, FixedClock, Order, OrderDiscount, OrderStatus,
    PaymentState, PaymentStatus, PaymentTender,
};
use shopfront_db::{Database, DbConfig, NewDiscount, NewProduct, NewVariant};
use shopfront_settle::{ErrorKind, SettleRequest, SettlementConfig, SettlementError, SettlementService};

// =============================================================================
// Fixtures
// =============================================================================

const STORE: &str = "s1";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
}

async fn seed(db: &Database) {
    let catalog = db.catalog();
    catalog.insert_store(STORE, "Shop One", "EUR").await.unwrap();
    catalog.insert_store("s2", "Shop Two", "EUR").await.unwrap();
    catalog.insert_category("apparel", STORE, None, "Apparel").await.unwrap();
    catalog.insert_customer("ada", STORE, "Ada").await.unwrap();

    for (id, category, name) in [
        ("p1", None, "Mug"),
        ("p2", Some("apparel"), "Tee"),
        ("p3", None, "Lamp"),
    ] {
        catalog
            .insert_product(&NewProduct {
                id: id.to_string(),
                store_id: STORE.to_string(),
                category_id: category.map(str::to_string),
                name: name.to_string(),
            })
            .await
            .unwrap();
    }
    catalog
        .insert_product(&NewProduct {
            id: "other-p".to_string(),
            store_id: "s2".to_string(),
            category_id: None,
            name: "Foreign".to_string(),
        })
        .await
        .unwrap();

    let mut mug = NewVariant::new("v1", "p1", "MUG-RED", 10000, 1900, 10);
    mug.options.insert("color".to_string(), "red".to_string());
    catalog.insert_variant(&mug).await.unwrap();
    catalog
        .insert_variant(&NewVariant::new("v2", "p1", "MUG-BLUE", 5000, 1900, 3))
        .await
        .unwrap();
    catalog
        .insert_variant(&NewVariant::new("t1", "p2", "TEE-M", 2000, 1900, 20))
        .await
        .unwrap();
    catalog
        .insert_variant(&NewVariant::new("l1", "p3", "LAMP", 15000, 1900, 5))
        .await
        .unwrap();
    catalog
        .insert_variant(&NewVariant::new("other-v", "other-p", "FOREIGN", 1000, 1900, 5))
        .await
        .unwrap();
}

fn code(id: &str, text: &str, bps: u32) -> DiscountCode {
    DiscountCode {
        id: id.to_string(),
        code: text.to_string(),
        rate: DiscountRate::from_bps(bps).unwrap(),
        availability: Availability::always(),
        usage_limit: None,
        used_count: 0,
        variant_ids: vec![],
        product_ids: vec![],
        category_id: None,
    }
}

async fn service() -> SettlementService {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    SettlementService::with_clock(
        db,
        SettlementConfig::default(),
        Arc::new(FixedClock::new(now())),
    )
}

fn line(product: &str, variant: &str, quantity: i64) -> CartLine {
    CartLine::new(product, variant, quantity)
}

async fn stock(service: &SettlementService, variant: &str) -> i64 {
    service.database().catalog().inventory_of(variant).await.unwrap()
}

async fn order_count(service: &SettlementService) -> i64 {
    service.database().orders().count_for_store(STORE).await.unwrap()
}

/// Balance and tax identity hold for every committed order.
fn assert_identities(order: &Order) {
    let paid: i64 = order.payments.iter().map(|p| p.amount_cents).sum();
    assert!((paid - order.total_cents).abs() <= 1, "balance: {} vs {}", paid, order.total_cents);
    assert!(
        (order.subtotal_excl_tax_cents + order.tax_cents - order.total_cents).abs() <= 1,
        "tax identity"
    );
    for line in &order.lines {
        assert!(line.discount_bps <= 10_000);
        assert_eq!(line.line_excl_tax_cents + line.line_tax_cents, line.line_total_cents);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_plain_cash_order() {
    let service = service().await;

    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p1", "v1", 2)])
                .with_payments(vec![PaymentTender::cash(20000)])
                .with_operator("op-7"),
        )
        .await
        .unwrap();

    assert_eq!(order.subtotal_excl_tax_cents, 16807);
    assert_eq!(order.tax_cents, 3193);
    assert_eq!(order.total_cents, 20000);
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.order_number, "20240615-0001");
    assert_eq!(order.operator_id.as_deref(), Some("op-7"));
    assert_eq!(order.currency, "EUR");
    assert_eq!(order.lines[0].options.get("color").map(String::as_str), Some("red"));
    assert_identities(&order);

    assert_eq!(stock(&service, "v1").await, 8);
}

#[tokio::test]
async fn test_code_for_all_products() {
    let service = service().await;
    service
        .database()
        .discounts()
        .insert_code(STORE, &code("c-all", "ALL10", 1000))
        .await
        .unwrap();

    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 2)])
                .with_payments(vec![PaymentTender::card(18000)])
                .with_discount_code(" all10 "),
        )
        .await
        .unwrap();

    assert_eq!(order.total_cents, 18000);
    assert_eq!(order.subtotal_excl_tax_cents, 15126);
    assert_eq!(order.tax_cents, 2874);
    assert_eq!(order.discount_total_cents, 2000);
    assert_eq!(order.discount_code.as_deref(), Some("ALL10"));
    assert_eq!(order.lines[0].discount_source, DiscountSource::Code);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_identities(&order);

    assert_eq!(service.database().discounts().used_count("c-all").await.unwrap(), 1);
}

#[tokio::test]
async fn test_insufficient_inventory_leaves_store_untouched() {
    let service = service().await;

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p1", "v2", 5)])
                .with_payments(vec![PaymentTender::cash(25000)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientInventory);
    assert_eq!(err.shortfall(), 2);
    assert!(matches!(
        &err,
        SettlementError::InsufficientInventory { variant_id, available: 3, requested: 5, .. }
            if variant_id == "v2"
    ));
    assert_eq!(stock(&service, "v2").await, 3);
    assert_eq!(order_count(&service).await, 0);
}

#[tokio::test]
async fn test_cash_and_check_payments() {
    let service = service().await;

    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p3", "l1", 1)]).with_payments(
                vec![PaymentTender::cash(10000), PaymentTender::check(5000, "000123")],
            ),
        )
        .await
        .unwrap();

    assert_eq!(order.total_cents, 15000);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payments.len(), 2);
    assert_eq!(order.payments[1].state, PaymentState::Received);
    assert_eq!(order.payments[1].check_number.as_deref(), Some("000123"));
    assert_identities(&order);

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p3", "l1", 1)]).with_payments(
                vec![PaymentTender::cash(10000), PaymentTender::check(4000, "000124")],
            ),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PaymentMismatch);
    assert_eq!(err.to_response().delta_cents, Some(1000));
    assert_eq!(stock(&service, "l1").await, 4);
    assert_eq!(order_count(&service).await, 1);
}

#[tokio::test]
async fn test_code_scoped_to_other_variant() {
    let service = service().await;
    let mut scoped = code("c-v1", "REDONLY", 1500);
    scoped.variant_ids = vec!["v1".to_string()];
    service.database().discounts().insert_code(STORE, &scoped).await.unwrap();

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v2", 1)])
                .with_payments(vec![PaymentTender::card(5000)])
                .with_discount_code("REDONLY"),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SettlementError::DiscountInvalid {
            code: "REDONLY".to_string(),
            reason: DiscountRejection::NotApplicable,
        }
    );
    assert_eq!(stock(&service, "v2").await, 3);
    assert_eq!(service.database().discounts().used_count("c-v1").await.unwrap(), 0);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_inventory_conservation() {
    let service = service().await;
    let before_v1 = stock(&service, "v1").await;
    let before_t1 = stock(&service, "t1").await;

    let carts = [
        vec![line("p1", "v1", 2), line("p2", "t1", 3)],
        vec![line("p2", "t1", 1), line("p2", "t1", 4)],
        vec![line("p1", "v1", 1)],
    ];

    let mut ordered_v1 = 0;
    let mut ordered_t1 = 0;
    for cart in carts {
        let order = service
            .settle_order(SettleRequest::new(STORE, Channel::InStore, cart).with_payment(
                PaymentTender {
                    amount_cents: None,
                    ..PaymentTender::card(0)
                },
            ))
            .await
            .unwrap();
        assert_identities(&order);
        for l in &order.lines {
            match l.variant_id.as_str() {
                "v1" => ordered_v1 += l.quantity,
                "t1" => ordered_t1 += l.quantity,
                other => panic!("unexpected variant {}", other),
            }
        }
    }

    assert_eq!(before_v1 - stock(&service, "v1").await, ordered_v1);
    assert_eq!(before_t1 - stock(&service, "t1").await, ordered_t1);
    assert_eq!(ordered_t1, 8);
}

#[tokio::test]
async fn test_duplicate_cart_lines_are_merged_before_stock_check() {
    let service = service().await;

    let err = service
        .settle_order(
            SettleRequest::new(
                STORE,
                Channel::InStore,
                vec![line("p1", "v2", 2), line("p1", "v2", 2)],
            )
            .with_payments(vec![PaymentTender::cash(20000)]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SettlementError::InsufficientInventory { requested: 4, available: 3, .. }
    ));
}

#[tokio::test]
async fn test_full_discount_accepts_no_payments() {
    let service = service().await;
    service
        .database()
        .discounts()
        .insert_code(STORE, &code("c-free", "FREE", 10_000))
        .await
        .unwrap();

    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
                .with_payments(vec![])
                .with_discount_code("FREE"),
        )
        .await
        .unwrap();

    assert_eq!(order.total_cents, 0);
    assert_eq!(order.tax_cents, 0);
    assert!(order.payments.is_empty());
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(stock(&service, "v1").await, 9);
}

#[tokio::test]
async fn test_failed_resubmission_changes_nothing() {
    let service = service().await;
    let mut limited = code("c-once", "ONCE", 1000);
    limited.usage_limit = Some(5);
    service.database().discounts().insert_code(STORE, &limited).await.unwrap();

    let request = SettleRequest::new(
        STORE,
        Channel::InStore,
        vec![line("p1", "v1", 1), line("p1", "v2", 9)],
    )
    .with_payments(vec![PaymentTender::cash(100000)])
    .with_discount_code("ONCE");

    let first = service.settle_order(request.clone()).await.unwrap_err();
    let snapshot = (
        stock(&service, "v1").await,
        stock(&service, "v2").await,
        order_count(&service).await,
        service.database().notifications().count_pending().await.unwrap(),
        service.database().discounts().used_count("c-once").await.unwrap(),
    );

    let second = service.settle_order(request).await.unwrap_err();
    assert_eq!(first, second);
    assert_eq!(
        snapshot,
        (
            stock(&service, "v1").await,
            stock(&service, "v2").await,
            order_count(&service).await,
            service.database().notifications().count_pending().await.unwrap(),
            service.database().discounts().used_count("c-once").await.unwrap(),
        )
    );
    assert_eq!(snapshot, (10, 3, 0, 0, 0));
}

// =============================================================================
// Discounts
// =============================================================================

#[tokio::test]
async fn test_attached_discount_beats_code_without_stacking() {
    let service = service().await;
    service
        .database()
        .discounts()
        .insert_discount(&NewDiscount {
            store_id: STORE.to_string(),
            discount: DirectDiscount {
                id: "d-mug".to_string(),
                product_id: Some("p1".to_string()),
                variant_id: None,
                rate: DiscountRate::from_bps(2000).unwrap(),
                availability: Availability::always(),
            },
        })
        .await
        .unwrap();
    service
        .database()
        .discounts()
        .insert_code(STORE, &code("c-all", "ALL10", 1000))
        .await
        .unwrap();

    let order = service
        .settle_order(
            SettleRequest::new(
                STORE,
                Channel::Online,
                vec![line("p1", "v1", 1), line("p2", "t1", 1)],
            )
            .with_payments(vec![PaymentTender::card(9800)])
            .with_discount_code("ALL10"),
        )
        .await
        .unwrap();

    // Mug: 100.00 - 20% = 80.00, tee: 20.00 - 10% = 18.00
    assert_eq!(order.lines[0].discount_source, DiscountSource::Product);
    assert_eq!(order.lines[0].line_total_cents, 8000);
    assert_eq!(order.lines[1].discount_source, DiscountSource::Code);
    assert_eq!(order.lines[1].line_total_cents, 1800);
    assert_eq!(order.total_cents, 9800);
    assert_identities(&order);
}

#[tokio::test]
async fn test_in_store_discount_applies_to_phone_orders() {
    let service = service().await;
    service
        .database()
        .discounts()
        .insert_discount(&NewDiscount {
            store_id: STORE.to_string(),
            discount: DirectDiscount {
                id: "d-tee".to_string(),
                product_id: None,
                variant_id: Some("t1".to_string()),
                rate: DiscountRate::from_bps(5000).unwrap(),
                availability: Availability {
                    available_online: false,
                    ..Availability::always()
                },
            },
        })
        .await
        .unwrap();

    let phone = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Phone, vec![line("p2", "t1", 1)])
                .with_payments(vec![PaymentTender::card(1000)]),
        )
        .await
        .unwrap();
    assert_eq!(phone.total_cents, 1000);
    assert_eq!(phone.status, OrderStatus::Pending);

    let online = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p2", "t1", 1)])
                .with_payments(vec![PaymentTender::card(2000)]),
        )
        .await
        .unwrap();
    assert_eq!(online.total_cents, 2000);
}

#[tokio::test]
async fn test_expired_and_unknown_codes() {
    let service = service().await;
    let mut expired = code("c-old", "SPRING", 1000);
    expired.availability.valid_to = Some(now() - Duration::days(1));
    service.database().discounts().insert_code(STORE, &expired).await.unwrap();

    let request = |code: &str| {
        SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
            .with_payments(vec![PaymentTender::card(10000)])
            .with_discount_code(code)
    };

    let err = service.settle_order(request("spring")).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::DiscountInvalid { reason: DiscountRejection::Expired { .. }, .. }
    ));

    let err = service.settle_order(request("NOPE")).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::DiscountInvalid { reason: DiscountRejection::NotFound, .. }
    ));
}

#[tokio::test]
async fn test_exhausted_code_is_rejected() {
    let service = service().await;
    let mut once = code("c-once", "ONCE", 1000);
    once.usage_limit = Some(1);
    service.database().discounts().insert_code(STORE, &once).await.unwrap();

    let request = SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
        .with_payments(vec![PaymentTender::card(9000)])
        .with_discount_code("ONCE");

    service.settle_order(request.clone()).await.unwrap();
    let err = service.settle_order(request).await.unwrap_err();

    assert!(matches!(
        err,
        SettlementError::DiscountInvalid {
            reason: DiscountRejection::UsageExhausted { limit: 1 },
            ..
        }
    ));
    assert_eq!(service.database().discounts().used_count("c-once").await.unwrap(), 1);
    assert_eq!(stock(&service, "v1").await, 9);
}

#[tokio::test]
async fn test_category_code() {
    let service = service().await;
    let mut apparel = code("c-app", "TEES25", 2500);
    apparel.category_id = Some("apparel".to_string());
    service.database().discounts().insert_code(STORE, &apparel).await.unwrap();

    let order = service
        .settle_order(
            SettleRequest::new(
                STORE,
                Channel::Online,
                vec![line("p1", "v1", 1), line("p2", "t1", 2)],
            )
            .with_payments(vec![PaymentTender::card(13000)])
            .with_discount_code("tees25"),
        )
        .await
        .unwrap();

    assert_eq!(order.lines[0].discount_source, DiscountSource::None);
    assert_eq!(order.lines[1].line_total_cents, 3000);
    assert_eq!(order.total_cents, 13000);
}

#[tokio::test]
async fn test_order_level_discount() {
    let service = service().await;

    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p1", "v1", 1)])
                .with_payment(PaymentTender {
                    amount_cents: None,
                    ..PaymentTender::cash(0)
                })
                .with_order_discount(OrderDiscount::Percent { bps: 1000 }),
        )
        .await
        .unwrap();

    assert!(order.total_cents < 10000);
    assert_eq!(order.order_discount.as_deref(), Some("10.00% off"));
    assert_eq!(order.payments[0].amount_cents, order.total_cents);
    assert_identities(&order);
}

// =============================================================================
// Request Validation
// =============================================================================

#[tokio::test]
async fn test_invalid_requests() {
    let service = service().await;

    let err = service
        .settle_order(SettleRequest::new(STORE, Channel::Online, vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 0)])
                .with_payments(vec![]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
                .with_payment(PaymentTender::card(10000))
                .with_payments(vec![PaymentTender::card(10000)]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p3", "l1", 1)])
                .with_payments(vec![PaymentTender::check(15000, "  ")]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    assert_eq!(order_count(&service).await, 0);
}

#[tokio::test]
async fn test_overflowing_payment_amounts_are_rejected() {
    let service = service().await;

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p3", "l1", 1)])
                .with_payments(vec![PaymentTender::card(i64::MAX), PaymentTender::card(1)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(order_count(&service).await, 0);
    assert_eq!(stock(&service, "l1").await, 5);
}

#[tokio::test]
async fn test_not_found_cases() {
    let service = service().await;
    let pay = || vec![PaymentTender::card(1000)];

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("other-p", "other-v", 1)])
                .with_payments(pay()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
                .with_payments(vec![PaymentTender::card(10000)])
                .with_customer("nobody"),
        )
        .await
        .unwrap_err();
    assert_eq!(err, SettlementError::not_found("Customer", "nobody"));

    let err = service
        .settle_order(
            SettleRequest::new("s9", Channel::Online, vec![line("p1", "v1", 1)])
                .with_payments(pay()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, SettlementError::not_found("Store", "s9"));

    let err = service.get_order(STORE, "missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_request_json_shape() {
    let json = r#"{
        "storeId": "s1",
        "channel": "in_store",
        "cart": [{ "productId": "p1", "variantId": "v1", "quantity": 2 }],
        "payments": [
            { "method": "cash", "amountCents": 20000, "cashGivenCents": 25000 }
        ],
        "customerId": "ada",
        "idempotencyKey": "till-3-0042"
    }"#;
    let request: SettleRequest = serde_json::from_str(json).unwrap();

    let service = service().await;
    let order = service.settle_order(request).await.unwrap();

    assert_eq!(order.customer_id.as_deref(), Some("ada"));
    assert_eq!(order.payments[0].cash_change_cents, Some(5000));
    assert_eq!(order.idempotency_key.as_deref(), Some("till-3-0042"));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_idempotency_key_replay() {
    let service = service().await;
    let request = SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
        .with_payments(vec![PaymentTender::card(10000)])
        .with_idempotency_key("checkout-abc");

    let first = service.settle_order(request.clone()).await.unwrap();
    let second = service.settle_order(request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(order_count(&service).await, 1);
    assert_eq!(stock(&service, "v1").await, 9);
    assert_eq!(service.database().notifications().count_pending().await.unwrap(), 1);
}

#[tokio::test]
async fn test_order_survives_catalog_changes() {
    let service = service().await;
    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p1", "v1", 1)])
                .with_payments(vec![PaymentTender::cash(10000)]),
        )
        .await
        .unwrap();

    service.database().catalog().set_variant_price("v1", 12000).await.unwrap();
    service.database().catalog().delete_product("p1").await.unwrap();

    let reloaded = service.get_order(STORE, &order.id).await.unwrap();
    assert_eq!(reloaded, order);
    assert_eq!(reloaded.lines[0].unit_price_cents, 10000);
    assert_eq!(reloaded.lines[0].sku, "MUG-RED");
}

#[tokio::test]
async fn test_lines_and_payments_are_write_once() {
    let service = service().await;
    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::InStore, vec![line("p1", "v1", 1)])
                .with_payments(vec![PaymentTender::cash(10000)]),
        )
        .await
        .unwrap();

    let update = sqlx_update(&service, "UPDATE order_lines SET unit_price_cents = 1").await;
    assert!(update.is_err());
    let delete = sqlx_update(&service, "DELETE FROM payments").await;
    assert!(delete.is_err());

    assert_eq!(service.get_order(STORE, &order.id).await.unwrap(), order);
}

async fn sqlx_update(service: &SettlementService, sql: &str) -> Result<(), String> {
    sqlx::query(sql)
        .execute(service.database().pool())
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[tokio::test]
async fn test_one_notification_per_order() {
    let service = service().await;
    let order = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p2", "t1", 1)])
                .with_payments(vec![PaymentTender::card(2000)])
                .with_customer("ada"),
        )
        .await
        .unwrap();

    let entries = service
        .database()
        .notifications()
        .for_entity(&order.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, "ORDER_PLACED");

    let payload: serde_json::Value = serde_json::from_str(&entries[0].payload).unwrap();
    assert_eq!(payload["orderNumber"], order.order_number);
    assert_eq!(payload["totalCents"], 2000);
    assert_eq!(payload["customerId"], "ada");
}

#[tokio::test]
async fn test_currency_mismatch_is_rejected() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    let config = SettlementConfig {
        currency: "USD".to_string(),
        ..SettlementConfig::default()
    };
    let service = SettlementService::with_clock(db, config, Arc::new(FixedClock::new(now())));

    let err = service
        .settle_order(
            SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v1", 1)])
                .with_payments(vec![PaymentTender::card(10000)]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

// =============================================================================
// Concurrency
// =============================================================================

async fn file_service(dir: &tempfile::TempDir) -> SettlementService {
    let config = DbConfig::new(dir.path().join("shopfront.db")).max_connections(8);
    let db = Database::new(config).await.unwrap();
    seed(&db).await;
    SettlementService::with_clock(
        db,
        SettlementConfig::default(),
        Arc::new(FixedClock::new(now())),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(file_service(&dir).await);

    // v2 has 3 in stock; 8 carts of 1 race for it.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .settle_order(
                    SettleRequest::new(STORE, Channel::Online, vec![line("p1", "v2", 1)])
                        .with_payments(vec![PaymentTender::card(5000)]),
                )
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                won += 1;
                assert_identities(&order);
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::InsufficientInventory),
        }
    }

    assert_eq!(won, 3);
    assert_eq!(stock(&service, "v2").await, 0);
    assert_eq!(order_count(&service).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_get_distinct_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(file_service(&dir).await);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .settle_order(
                    SettleRequest::new(STORE, Channel::InStore, vec![line("p2", "t1", 1)])
                        .with_payments(vec![PaymentTender::cash(2000)]),
                )
                .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().order_number);
    }
    numbers.sort();
    numbers.dedup();

    assert_eq!(numbers.len(), 6);
    assert_eq!(numbers[5], "20240615-0006");
    assert_eq!(stock(&service, "t1").await, 14);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_with_same_key_return_one_order() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(file_service(&dir).await);

    // l1 holds a single unit, so the slower duplicate always loses on stock.
    for round in 0..10 {
        sqlx_update(&service, "UPDATE variants SET inventory_on_hand = 1 WHERE id = 'l1'")
            .await
            .unwrap();
        let key = format!("checkout-{}", round);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let request = SettleRequest::new(STORE, Channel::Online, vec![line("p3", "l1", 1)])
                .with_payments(vec![PaymentTender::card(15000)])
                .with_idempotency_key(key.clone());
            handles.push(tokio::spawn(async move { service.settle_order(request).await }));
        }

        let mut orders = Vec::new();
        for handle in handles {
            orders.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(orders[0], orders[1], "round {}", round);
        assert_eq!(orders[0].idempotency_key.as_deref(), Some(key.as_str()));
        assert_eq!(stock(&service, "l1").await, 0);
    }

    assert_eq!(order_count(&service).await, 10);
}
