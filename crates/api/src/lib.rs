//! HTTP front end and process wiring for the logistics saga services.
//!
//! One binary runs any subset of the services (see [`ServiceKind`]). Each
//! running service binds its queues on start-up and gets its routes mounted;
//! the rest of the process never touches another service's state.

pub mod config;
pub mod error;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_bus::{BackgroundPublisher, EventBus};
use hub::{Broadcaster, HubHandle};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{DeliveryService, InventoryService, NotificationService, OrderService, PaymentService};
use store::{
    InMemoryInventoryRepository, InMemoryNotificationRepository, InMemoryOrderRepository,
    InMemoryPaymentRepository, InMemoryShipmentRepository, NotificationRepository,
    OrderRepository, PaymentRepository, PostgresStore, ProductRepository, ReservationRepository,
    ShipmentRepository,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ServiceKind};

/// The bus and one repository per service.
#[derive(Clone)]
pub struct Backends {
    pub bus: Arc<dyn EventBus>,
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub shipments: Arc<dyn ShipmentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Backends {
    /// Repositories kept in process memory.
    pub fn in_memory(bus: Arc<dyn EventBus>) -> Self {
        let inventory = Arc::new(InMemoryInventoryRepository::new());
        Self {
            bus,
            orders: Arc::new(InMemoryOrderRepository::new()),
            products: inventory.clone(),
            reservations: inventory,
            payments: Arc::new(InMemoryPaymentRepository::new()),
            shipments: Arc::new(InMemoryShipmentRepository::new()),
            notifications: Arc::new(InMemoryNotificationRepository::new()),
        }
    }

    /// Repositories backed by one PostgreSQL pool.
    pub fn postgres(bus: Arc<dyn EventBus>, store: PostgresStore) -> Self {
        let store = Arc::new(store);
        Self {
            bus,
            orders: store.clone(),
            products: store.clone(),
            reservations: store.clone(),
            payments: store.clone(),
            shipments: store.clone(),
            notifications: store,
        }
    }
}

/// The services this process runs, plus what they share.
#[derive(Clone)]
pub struct AppState {
    pub service: ServiceKind,
    pub publisher: BackgroundPublisher,
    pub hub: HubHandle,
    pub orders: Option<Arc<OrderService>>,
    pub inventory: Option<Arc<InventoryService>>,
    pub payments: Option<Arc<PaymentService>>,
    pub delivery: Option<Arc<DeliveryService>>,
    pub notifications: Option<Arc<NotificationService>>,
}

/// Builds the services selected by `service` and binds their queues.
pub async fn start(
    service: ServiceKind,
    backends: Backends,
    hub: HubHandle,
) -> saga::Result<AppState> {
    let Backends {
        bus,
        orders,
        products,
        reservations,
        payments,
        shipments,
        notifications,
    } = backends;
    let publisher = BackgroundPublisher::new(Arc::clone(&bus));

    let mut state = AppState {
        service,
        publisher: publisher.clone(),
        hub: hub.clone(),
        orders: None,
        inventory: None,
        payments: None,
        delivery: None,
        notifications: None,
    };

    if service.runs(ServiceKind::Order) {
        let svc = Arc::new(OrderService::new(orders, publisher.clone()));
        svc.start_listening(bus.as_ref()).await?;
        state.orders = Some(svc);
    }
    if service.runs(ServiceKind::Inventory) {
        let svc = Arc::new(InventoryService::new(
            products,
            reservations,
            publisher.clone(),
        ));
        svc.start_listening(bus.as_ref()).await?;
        state.inventory = Some(svc);
    }
    if service.runs(ServiceKind::Payment) {
        let svc = Arc::new(PaymentService::new(payments, publisher.clone()));
        svc.start_listening(bus.as_ref()).await?;
        state.payments = Some(svc);
    }
    if service.runs(ServiceKind::Delivery) {
        let svc = Arc::new(DeliveryService::new(shipments));
        svc.start_listening(bus.as_ref()).await?;
        state.delivery = Some(svc);
    }
    if service.runs(ServiceKind::Notification) {
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(hub);
        let svc = Arc::new(NotificationService::new(notifications, broadcaster));
        svc.start_listening(bus.as_ref()).await?;
        state.notifications = Some(svc);
    }

    tracing::info!(service = %service, "services listening");
    Ok(state)
}

/// Creates the router for the running services.
pub fn create_app(state: &AppState, metrics_handle: PrometheusHandle) -> Router {
    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(routes::health::HealthState {
            service: state.service,
            hub: state.hub.clone(),
        });

    let mut app = health_router.merge(routes::metrics::router(metrics_handle));
    if let Some(orders) = &state.orders {
        app = app.merge(routes::orders::router(Arc::clone(orders)));
    }
    if let Some(inventory) = &state.inventory {
        app = app.merge(routes::products::router(Arc::clone(inventory)));
    }
    if let Some(payments) = &state.payments {
        app = app.merge(routes::payments::router(Arc::clone(payments)));
    }
    if let Some(delivery) = &state.delivery {
        app = app.merge(routes::shipments::router(Arc::clone(delivery)));
    }
    if let Some(notifications) = &state.notifications {
        app = app
            .merge(routes::logs::router(Arc::clone(notifications)))
            .merge(routes::ws::router(state.hub.clone()));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
}
