//! Repository traits, one per owning service.
//!
//! Status updates are conditional: they take the status the caller last saw
//! and return `false` without writing if the row has moved on since. That is
//! what keeps concurrent handlers for the same order from overwriting each
//! other.

use async_trait::async_trait;
use common::{OrderId, Page, PaymentId, ProductId, ReservationId, ShipmentId};
use domain::{
    Location, NewNotificationLog, NewPayment, NewReservation, NewShipment, NotificationLog, Order,
    OrderStatus, Payment, PaymentStatus, Product, ReservationStatus, Shipment, ShipmentStatus,
    StockReservation,
};

use crate::Result;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders of one customer, newest first.
    async fn list_by_customer(&self, customer_id: &str, page: Page) -> Result<Vec<Order>>;

    /// Sets the status if it is still `from`.
    async fn update_status(&self, id: OrderId, from: OrderStatus, to: OrderStatus)
    -> Result<bool>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts a product. Fails with `Conflict` if the name is taken.
    async fn create(&self, name: &str, stock: u32) -> Result<Product>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>>;

    /// Products ordered by id.
    async fn list(&self, page: Page) -> Result<Vec<Product>>;

    /// Adds `delta` to the stock and returns the new value.
    ///
    /// Fails with `Conflict` if the result would be negative, leaving the
    /// stock unchanged.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Records a RESERVED reservation. Fails with `Conflict` if the order
    /// already has one.
    async fn create(&self, reservation: NewReservation) -> Result<StockReservation>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<StockReservation>>;

    async fn update_status(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool>;

    /// Remembers that the order's stock was released, whether or not it
    /// had a reservation yet. Idempotent.
    async fn mark_released(&self, order_id: OrderId) -> Result<()>;

    async fn is_released(&self, order_id: OrderId) -> Result<bool>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Records a PENDING payment. Fails with `Conflict` if the order already
    /// has one.
    async fn create(&self, payment: NewPayment) -> Result<Payment>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Writes the status, `paid_at` and failure reason of `payment` if the
    /// stored status is still `from`.
    async fn update_status(&self, payment: &Payment, from: PaymentStatus) -> Result<bool>;
}

#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    /// Records a PICKING_UP shipment at the origin. Fails with `Conflict` if
    /// the order already has one.
    async fn create(&self, shipment: NewShipment) -> Result<Shipment>;

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>>;

    async fn update_status(
        &self,
        id: ShipmentId,
        from: ShipmentStatus,
        to: ShipmentStatus,
    ) -> Result<bool>;

    /// Moves the courier. Fails with `NotFound` for unknown shipments.
    async fn update_location(&self, id: ShipmentId, location: Location) -> Result<()>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn append(&self, log: NewNotificationLog) -> Result<NotificationLog>;

    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<NotificationLog>>;

    /// Newest first.
    async fn by_order(&self, order_id: &str) -> Result<Vec<NotificationLog>>;
}
