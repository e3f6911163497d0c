//! In-memory repositories for tests and broker-less deployments.
//!
//! Every repository carries two failure switches, `set_fail_on_create` and
//! `set_fail_on_update`, which make the matching writes fail with
//! [`StoreError::Unavailable`] so error paths can be driven deterministically.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{LogId, OrderId, Page, PaymentId, ProductId, ReservationId, ShipmentId};
use domain::{
    Location, NewNotificationLog, NewPayment, NewReservation, NewShipment, NotificationLog, Order,
    OrderStatus, Payment, PaymentStatus, Product, ReservationStatus, Shipment, ShipmentStatus,
    StockReservation,
};
use tokio::sync::RwLock;

use crate::repository::{
    NotificationRepository, OrderRepository, PaymentRepository, ProductRepository,
    ReservationRepository, ShipmentRepository,
};
use crate::{Result, StoreError};

#[derive(Default)]
struct Faults {
    fail_on_create: AtomicBool,
    fail_on_update: AtomicBool,
}

impl Faults {
    fn on_create(&self, entity: &str) -> Result<()> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected {entity} create failure")));
        }
        Ok(())
    }

    fn on_update(&self, entity: &str) -> Result<()> {
        if self.fail_on_update.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected {entity} update failure")));
        }
        Ok(())
    }
}

/// Monotonic row id source, starting at 1 like a database sequence.
#[derive(Default)]
struct Sequence(AtomicU64);

impl Sequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

macro_rules! fault_switches {
    ($($repo:ident),* $(,)?) => {
        $(
            impl $repo {
                pub fn new() -> Self {
                    Self::default()
                }

                /// Makes every subsequent create fail until switched off.
                pub fn set_fail_on_create(&self, fail: bool) {
                    self.faults.fail_on_create.store(fail, Ordering::SeqCst);
                }

                /// Makes every subsequent update fail until switched off.
                pub fn set_fail_on_update(&self, fail: bool) {
                    self.faults.fail_on_update.store(fail, Ordering::SeqCst);
                }
            }
        )*
    };
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset_usize())
        .take(page.limit_usize())
        .collect()
}

// --- Orders ---

#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    faults: Arc<Faults>,
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<()> {
        self.faults.on_create("order")?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_by_customer(&self, customer_id: &str, page: Page) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching.into_iter(), page))
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        self.faults.on_update("order")?;
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }
}

// --- Inventory ---

#[derive(Default)]
struct InventoryTables {
    products: BTreeMap<ProductId, Product>,
    reservations: BTreeMap<ReservationId, StockReservation>,
    released: BTreeSet<OrderId>,
}

/// Products and reservations, both owned by the inventory service.
#[derive(Clone, Default)]
pub struct InMemoryInventoryRepository {
    tables: Arc<RwLock<InventoryTables>>,
    product_ids: Arc<Sequence>,
    reservation_ids: Arc<Sequence>,
    faults: Arc<Faults>,
}

impl InMemoryInventoryRepository {
    /// Current stock of a product, for assertions.
    pub async fn stock_of(&self, name: &str) -> Option<u32> {
        let tables = self.tables.read().await;
        tables
            .products
            .values()
            .find(|p| p.name == name)
            .map(|p| p.stock)
    }

    /// Number of reservations ever recorded.
    pub async fn reservation_count(&self) -> usize {
        self.tables.read().await.reservations.len()
    }
}

#[async_trait]
impl ProductRepository for InMemoryInventoryRepository {
    async fn create(&self, name: &str, stock: u32) -> Result<Product> {
        self.faults.on_create("product")?;
        let mut tables = self.tables.write().await;
        if tables.products.values().any(|p| p.name == name) {
            return Err(StoreError::Conflict(format!("product {name} already exists")));
        }
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(self.product_ids.next()),
            name: name.to_string(),
            stock,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.values().find(|p| p.name == name).cloned())
    }

    async fn list(&self, page: Page) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(paginate(tables.products.values().cloned(), page))
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        self.faults.on_update("product")?;
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        let stock = i64::from(product.stock) + delta;
        let stock = u32::try_from(stock).map_err(|_| {
            StoreError::Conflict(format!(
                "stock of {} cannot change by {delta} from {}",
                product.name, product.stock
            ))
        })?;
        product.stock = stock;
        product.updated_at = Utc::now();
        Ok(stock)
    }
}

#[async_trait]
impl ReservationRepository for InMemoryInventoryRepository {
    async fn create(&self, reservation: NewReservation) -> Result<StockReservation> {
        self.faults.on_create("reservation")?;
        let mut tables = self.tables.write().await;
        if tables
            .reservations
            .values()
            .any(|r| r.order_id == reservation.order_id)
        {
            return Err(StoreError::Conflict(format!(
                "order {} already has a reservation",
                reservation.order_id
            )));
        }
        let now = Utc::now();
        let row = StockReservation {
            id: ReservationId::new(self.reservation_ids.next()),
            order_id: reservation.order_id,
            product_id: reservation.product_id,
            quantity: reservation.quantity,
            status: ReservationStatus::Reserved,
            created_at: now,
            updated_at: now,
        };
        tables.reservations.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<StockReservation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reservations
            .values()
            .find(|r| r.order_id == order_id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        self.faults.on_update("reservation")?;
        let mut tables = self.tables.write().await;
        let reservation = tables
            .reservations
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("reservation", id))?;
        if reservation.status != from {
            return Ok(false);
        }
        reservation.status = to;
        reservation.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_released(&self, order_id: OrderId) -> Result<()> {
        self.faults.on_update("reservation")?;
        self.tables.write().await.released.insert(order_id);
        Ok(())
    }

    async fn is_released(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.tables.read().await.released.contains(&order_id))
    }
}

// --- Payments ---

#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<BTreeMap<PaymentId, Payment>>>,
    ids: Arc<Sequence>,
    faults: Arc<Faults>,
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        self.faults.on_create("payment")?;
        let mut payments = self.payments.write().await;
        if payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        let row = Payment::open(PaymentId::new(self.ids.next()), payment);
        payments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.values().find(|p| p.order_id == order_id).cloned())
    }

    async fn update_status(&self, payment: &Payment, from: PaymentStatus) -> Result<bool> {
        self.faults.on_update("payment")?;
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(&payment.id)
            .ok_or_else(|| StoreError::not_found("payment", payment.id))?;
        if stored.status != from {
            return Ok(false);
        }
        stored.status = payment.status;
        stored.paid_at = payment.paid_at;
        stored.failure_reason = payment.failure_reason.clone();
        stored.updated_at = payment.updated_at;
        Ok(true)
    }
}

// --- Shipments ---

#[derive(Clone, Default)]
pub struct InMemoryShipmentRepository {
    shipments: Arc<RwLock<BTreeMap<ShipmentId, Shipment>>>,
    ids: Arc<Sequence>,
    faults: Arc<Faults>,
}

#[async_trait]
impl ShipmentRepository for InMemoryShipmentRepository {
    async fn create(&self, shipment: NewShipment) -> Result<Shipment> {
        self.faults.on_create("shipment")?;
        let mut shipments = self.shipments.write().await;
        if shipments.values().any(|s| s.order_id == shipment.order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} already has a shipment",
                shipment.order_id
            )));
        }
        let row = Shipment::open(ShipmentId::new(self.ids.next()), shipment);
        shipments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        Ok(self.shipments.read().await.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        let shipments = self.shipments.read().await;
        Ok(shipments.values().find(|s| s.order_id == order_id).cloned())
    }

    async fn update_status(
        &self,
        id: ShipmentId,
        from: ShipmentStatus,
        to: ShipmentStatus,
    ) -> Result<bool> {
        self.faults.on_update("shipment")?;
        let mut shipments = self.shipments.write().await;
        let shipment = shipments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("shipment", id))?;
        if shipment.status != from {
            return Ok(false);
        }
        shipment.status = to;
        shipment.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_location(&self, id: ShipmentId, location: Location) -> Result<()> {
        self.faults.on_update("shipment")?;
        let mut shipments = self.shipments.write().await;
        let shipment = shipments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("shipment", id))?;
        shipment.move_to(location);
        Ok(())
    }
}

// --- Notification log ---

#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    logs: Arc<RwLock<Vec<NotificationLog>>>,
    ids: Arc<Sequence>,
    faults: Arc<Faults>,
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn append(&self, log: NewNotificationLog) -> Result<NotificationLog> {
        self.faults.on_create("notification log")?;
        let row = NotificationLog {
            id: LogId::new(self.ids.next()),
            event_type: log.event_type,
            order_id: log.order_id,
            payload: log.payload,
            message: log.message,
            created_at: Utc::now(),
        };
        self.logs.write().await.push(row.clone());
        Ok(row)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<NotificationLog>> {
        let logs = self.logs.read().await;
        Ok(logs.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn by_order(&self, order_id: &str) -> Result<Vec<NotificationLog>> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .rev()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }
}

fault_switches!(
    InMemoryOrderRepository,
    InMemoryInventoryRepository,
    InMemoryPaymentRepository,
    InMemoryShipmentRepository,
    InMemoryNotificationRepository,
);
