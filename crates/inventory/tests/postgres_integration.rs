//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{
    CartItem, IdempotencyKey, OrderPayload, PayloadError, ProductId, RestockLine, SagaId, UserId,
};
use inventory::{
    ApplyOutcome, CartStore, FinalizationEngine, InventoryError, Ledger, PostgresLedger, Product,
    ReservationEngine,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh ledger with its own pool, cleared tables and two products:
/// #1 with 5 units and #2 with 3 units.
async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders, cart, products, processed_requests RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    let ledger = PostgresLedger::new(pool);
    ledger.put_product(Product::new(1, 5)).await.unwrap();
    ledger.put_product(Product::new(2, 3)).await.unwrap();
    ledger
}

async fn fill_cart(ledger: &PostgresLedger, user: i64, lines: &[(i64, i64)]) {
    let cart = CartStore::new(ledger.clone());
    for &(product, quantity) in lines {
        cart.add_to_cart(UserId::new(user), ProductId::new(product), quantity)
            .await
            .unwrap();
    }
}

async fn stock(ledger: &PostgresLedger, product: i64) -> i64 {
    ledger
        .product(ProductId::new(product))
        .await
        .unwrap()
        .unwrap()
        .quantity
}

fn order(user: i64, cart: Vec<CartItem>) -> OrderPayload {
    OrderPayload::new(user, "buyer@example.com", cart)
}

#[tokio::test]
#[serial]
async fn place_and_compensate_round_trip() {
    let ledger = get_test_ledger().await;
    fill_cart(&ledger, 7, &[(1, 2)]).await;
    let engine = ReservationEngine::new(ledger.clone());
    let order = order(7, vec![CartItem::new(1, 2)]).with_saga(SagaId::new());

    engine.place(&order, None).await.unwrap();
    assert_eq!(ledger.order_lines(UserId::new(7)).await.unwrap().len(), 1);
    assert!(ledger.cart_lines(UserId::new(7)).await.unwrap().is_empty());
    assert_eq!(stock(&ledger, 1).await, 5);

    engine.compensate_place(&order, None).await.unwrap();
    assert!(ledger.order_lines(UserId::new(7)).await.unwrap().is_empty());
    let cart = ledger.cart_lines(UserId::new(7)).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 2);
    assert_eq!(stock(&ledger, 1).await, 5);
}

#[tokio::test]
#[serial]
async fn place_rolls_back_every_line_on_insufficient_stock() {
    let ledger = get_test_ledger().await;
    fill_cart(&ledger, 7, &[(1, 2), (2, 3)]).await;
    let engine = ReservationEngine::new(ledger.clone());

    let err = engine
        .place(&order(7, vec![CartItem::new(1, 2), CartItem::new(2, 10)]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::InsufficientStock { available: 3, .. }));
    assert!(ledger.order_lines(UserId::new(7)).await.unwrap().is_empty());
    assert_eq!(ledger.cart_lines(UserId::new(7)).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn finalize_and_compensate_round_trip() {
    let ledger = get_test_ledger().await;
    fill_cart(&ledger, 7, &[(1, 2)]).await;
    let engine = FinalizationEngine::new(ledger.clone());
    let order = order(7, vec![CartItem::new(1, 2)]);

    engine.finalize(&order, None).await.unwrap();
    assert_eq!(stock(&ledger, 1).await, 3);
    assert!(ledger.cart_lines(UserId::new(7)).await.unwrap().is_empty());

    engine
        .compensate_finalize(&order.restock_lines(), None)
        .await
        .unwrap();
    assert_eq!(stock(&ledger, 1).await, 5);
    assert_eq!(ledger.cart_lines(UserId::new(7)).await.unwrap()[0].quantity, 2);
}

#[tokio::test]
#[serial]
async fn idempotency_key_is_claimed_once() {
    let ledger = get_test_ledger().await;
    let engine = FinalizationEngine::new(ledger.clone());
    let order = order(7, vec![CartItem::new(1, 1)]);
    let key = IdempotencyKey::for_step(SagaId::new(), "finalize_order");

    assert_eq!(engine.finalize(&order, Some(&key)).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(engine.finalize(&order, Some(&key)).await.unwrap(), ApplyOutcome::Duplicate);
    assert_eq!(stock(&ledger, 1).await, 4);
}

#[tokio::test]
#[serial]
async fn failed_transaction_does_not_consume_key() {
    let ledger = get_test_ledger().await;
    let engine = FinalizationEngine::new(ledger.clone());
    let key = IdempotencyKey::new("retry-me");

    let too_many = order(7, vec![CartItem::new(2, 4)]);
    assert!(engine.finalize(&too_many, Some(&key)).await.is_err());

    let fits = order(7, vec![CartItem::new(2, 3)]);
    assert_eq!(engine.finalize(&fits, Some(&key)).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(stock(&ledger, 2).await, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_finalizes_never_oversell() {
    let ledger = get_test_ledger().await;
    let engine = Arc::new(FinalizationEngine::new(ledger.clone()));

    let handles: Vec<_> = (0..6)
        .map(|user| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .finalize(&order(user, vec![CartItem::new(2, 1)]), None)
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(stock(&ledger, 2).await, 0);
}

#[tokio::test]
#[serial]
async fn row_lock_blocks_second_writer_until_commit() {
    let ledger = get_test_ledger().await;

    let mut first = ledger.begin().await.unwrap();
    first.lock_product(ProductId::new(1)).await.unwrap();

    let contender = ledger.clone();
    let waiter = tokio::spawn(async move {
        let mut second = contender.begin().await.unwrap();
        second.lock_product(ProductId::new(1)).await.unwrap()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    first.adjust_stock(ProductId::new(1), -1).await.unwrap();
    first.commit().await.unwrap();

    assert_eq!(waiter.await.unwrap(), 4);
}

#[tokio::test]
#[serial]
async fn cancel_cart_clears_only_that_user() {
    let ledger = get_test_ledger().await;
    fill_cart(&ledger, 1, &[(1, 1), (2, 1)]).await;
    fill_cart(&ledger, 2, &[(1, 1)]).await;

    let cart = CartStore::new(ledger.clone());
    assert_eq!(cart.cancel_cart(UserId::new(1)).await.unwrap(), 2);
    assert!(cart.get_cart(UserId::new(1)).await.unwrap().is_empty());
    assert_eq!(cart.get_cart(UserId::new(2)).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn unknown_product_cannot_be_added_to_cart() {
    let ledger = get_test_ledger().await;
    let cart = CartStore::new(ledger);
    let err = cart
        .add_to_cart(UserId::new(1), ProductId::new(99), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::ProductNotFound(_)));
}

#[tokio::test]
#[serial]
async fn stock_overflow_is_rejected_as_invalid() {
    let ledger = get_test_ledger().await;
    let finalization = FinalizationEngine::new(ledger.clone());
    let line = RestockLine {
        user_id: UserId::new(1),
        email_id: "user1@example.com".into(),
        product_id: ProductId::new(1),
        quantity: i64::MAX,
    };

    let err = finalization
        .compensate_finalize(&[line], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::Validation(PayloadError::QuantityOverflow(_))
    ));
    assert!(err.is_client_error());
    assert_eq!(
        ledger.product(ProductId::new(1)).await.unwrap().unwrap().quantity,
        5
    );
}
