//! PostgreSQL integration tests
//!
//! These tests need Docker and share one PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{OrderId, Page};
use domain::{
    Location, Money, NewNotificationLog, NewOrder, NewPayment, NewReservation, NewShipment, Order,
    OrderStatus, PaymentStatus, ReservationStatus, ShipmentStatus,
};
use store::{
    NotificationRepository, OrderRepository, PaymentRepository, PostgresStore, ProductRepository,
    ReservationRepository, ShipmentRepository, StoreError,
};
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

            let store = PostgresStore::connect(&connection_string, 1).await.unwrap();
            store.run_migrations().await.unwrap();
            store.pool().close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE orders, products, stock_reservations, released_orders, payments, shipments, notification_logs RESTART IDENTITY",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn order_round_trip_and_conditional_update() {
    let store = get_test_store().await;
    let order = Order::create(NewOrder::new("c1", "Widget", 2, 20.0)).unwrap();
    OrderRepository::create(&store, &order).await.unwrap();

    let loaded = OrderRepository::get(&store, order.id).await.unwrap().unwrap();
    assert_eq!(loaded.total_price, Money::from_cents(2000));
    assert_eq!(loaded.status, OrderStatus::Pending);

    assert!(
        OrderRepository::update_status(&store, order.id, OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap()
    );
    assert!(
        !OrderRepository::update_status(
            &store,
            order.id,
            OrderStatus::Pending,
            OrderStatus::Cancelled
        )
        .await
        .unwrap()
    );

    let listed = store.list_by_customer("c1", Page::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn product_name_is_unique_and_stock_non_negative() {
    let store = get_test_store().await;
    let product = ProductRepository::create(&store, "Widget", 5).await.unwrap();

    let err = ProductRepository::create(&store, "Widget", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    assert_eq!(store.adjust_stock(product.id, -2).await.unwrap(), 3);
    let err = store.adjust_stock(product.id, -10).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store.find_by_name("Widget").await.unwrap().unwrap();
    assert_eq!(found.stock, 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn one_reservation_payment_and_shipment_per_order() {
    let store = get_test_store().await;
    let product = ProductRepository::create(&store, "Widget", 5).await.unwrap();
    let order_id = OrderId::new();

    let reservation = NewReservation {
        order_id,
        product_id: product.id,
        quantity: 2,
    };
    let created = ReservationRepository::create(&store, reservation).await.unwrap();
    assert_eq!(created.status, ReservationStatus::Reserved);
    assert!(matches!(
        ReservationRepository::create(&store, reservation).await,
        Err(StoreError::Conflict(_))
    ));

    let payment = NewPayment::new(order_id, Money::from_cents(2000)).unwrap();
    let mut payment = PaymentRepository::create(&store, payment).await.unwrap();
    payment.confirm(chrono::Utc::now()).unwrap();
    assert!(
        PaymentRepository::update_status(&store, &payment, PaymentStatus::Pending)
            .await
            .unwrap()
    );
    let loaded = PaymentRepository::get_by_order(&store, order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, PaymentStatus::Completed);
    assert!(loaded.paid_at.is_some());

    let shipment = NewShipment::new(order_id, "Auto-Assigned").unwrap();
    let shipment = ShipmentRepository::create(&store, shipment).await.unwrap();
    assert!(
        ShipmentRepository::update_status(
            &store,
            shipment.id,
            ShipmentStatus::PickingUp,
            ShipmentStatus::OnTheWay
        )
        .await
        .unwrap()
    );
    store
        .update_location(shipment.id, Location::new(-6.2, 106.8).unwrap())
        .await
        .unwrap();
    let loaded = ShipmentRepository::get(&store, shipment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.current_lat, -6.2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn notification_logs_newest_first() {
    let store = get_test_store().await;
    for event_type in ["order.created", "stock.reserved"] {
        store
            .append(NewNotificationLog::for_event(event_type, "o-1", "{}"))
            .await
            .unwrap();
    }

    let recent = store.recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event_type, "stock.reserved");
    assert_eq!(store.by_order("o-1").await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn release_marker_is_idempotent() {
    let store = get_test_store().await;
    let order_id = OrderId::new();
    assert!(!store.is_released(order_id).await.unwrap());

    store.mark_released(order_id).await.unwrap();
    store.mark_released(order_id).await.unwrap();
    assert!(store.is_released(order_id).await.unwrap());
    assert!(!store.is_released(OrderId::new()).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn oversized_value_is_not_transient() {
    let store = get_test_store().await;
    let log = NewNotificationLog {
        event_type: "order.teleported".to_string(),
        order_id: "x".repeat(200),
        payload: "{}".to_string(),
        message: "Event: order.teleported".to_string(),
    };

    let err = store.append(log).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
    assert!(!err.is_transient());
}
