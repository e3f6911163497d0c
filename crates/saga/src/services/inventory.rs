//! Inventory service: products, stock reservations and the one compensating
//! step in the saga.

use std::sync::Arc;

use common::{OrderId, Page, ProductId};
use domain::{
    DomainError, NewProduct, NewReservation, Product, ReservationStatus, Status, StockReservation,
};
use event_bus::{
    BackgroundPublisher, EventBus, OrderCancelled, OrderCreated, PaymentSuccess, StockFailed,
    StockReserved,
};
use store::{ProductRepository, ReservationRepository, StoreError};

use crate::error::{Result, SagaError};
use crate::handler::on_event;

pub const QUEUE_ORDER_CREATED: &str = "inventory.order.created";
pub const QUEUE_PAYMENT_SUCCESS: &str = "inventory.payment.success";
pub const QUEUE_ORDER_CANCELLED: &str = "inventory.order.cancelled";

/// What happened to a reservation request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    /// Stock was taken and the reservation recorded.
    Reserved(StockReservation),
    /// The order already had a reservation; stock was left alone.
    AlreadyReserved(StockReservation),
    /// Stock was left alone and `stock.failed` was published.
    Rejected { reason: String },
    /// The order was cancelled first. Nothing stays reserved and nothing is
    /// published.
    Released,
}

/// Result of moving a reservation out of RESERVED.
enum Settlement {
    NoReservation,
    /// Already CONFIRMED or RELEASED; left as it was.
    Unchanged(StockReservation),
    Settled(StockReservation),
}

impl Settlement {
    fn into_reservation(self) -> Option<StockReservation> {
        match self {
            Settlement::NoReservation => None,
            Settlement::Unchanged(r) | Settlement::Settled(r) => Some(r),
        }
    }
}

#[derive(Clone)]
pub struct InventoryService {
    products: Arc<dyn ProductRepository>,
    reservations: Arc<dyn ReservationRepository>,
    publisher: BackgroundPublisher,
}

impl InventoryService {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        reservations: Arc<dyn ReservationRepository>,
        publisher: BackgroundPublisher,
    ) -> Self {
        Self {
            products,
            reservations,
            publisher,
        }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let (name, stock) = input.validate()?;
        let product = self.products.create(&name, stock).await?;
        tracing::info!(product_id = %product.id, stock, "product created");
        Ok(product)
    }

    pub async fn list_products(&self, page: Page) -> Result<Vec<Product>> {
        Ok(self.products.list(page).await?)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.products
            .get(id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", id))
    }

    pub async fn reservation_for_order(&self, order_id: OrderId) -> Result<StockReservation> {
        self.reservations
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| SagaError::not_found("reservation", order_id))
    }

    /// Takes stock for an order and records the reservation.
    ///
    /// Not enough stock (or no such product) leaves stock untouched and
    /// publishes `stock.failed`. If the reservation cannot be written after
    /// the stock was taken, the stock is put back before the error is
    /// returned.
    ///
    /// An order whose cancellation was handled first is never reserved. The
    /// release marker is checked again after the reservation is written, so
    /// a cancellation racing this call still gets the stock back.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id, item = %order.item_name))]
    pub async fn reserve_stock(&self, order: &OrderCreated) -> Result<ReserveOutcome> {
        if self.reservations.is_released(order.order_id).await? {
            return self.drop_released(order.order_id).await;
        }

        if let Some(existing) = self.reservations.get_by_order(order.order_id).await? {
            tracing::debug!(
                reservation_id = %existing.id,
                status = %existing.status,
                "order already has a reservation"
            );
            if existing.status != ReservationStatus::Released {
                self.publish_reserved(&existing);
            }
            return Ok(ReserveOutcome::AlreadyReserved(existing));
        }

        let Some(product) = self.products.find_by_name(&order.item_name).await? else {
            return Ok(self.reject(order, format!("product {} not found", order.item_name)));
        };

        if let Err(e) = product.stock_after_reserving(order.quantity) {
            return match e {
                DomainError::InsufficientStock { .. } => Ok(self.reject(order, e.to_string())),
                other => Err(other.into()),
            };
        }

        let remaining = match self
            .products
            .adjust_stock(product.id, -i64::from(order.quantity))
            .await
        {
            Ok(remaining) => remaining,
            // Someone else took the stock since we looked.
            Err(StoreError::Conflict(reason)) => return Ok(self.reject(order, reason)),
            Err(e) => return Err(e.into()),
        };

        let request = NewReservation {
            order_id: order.order_id,
            product_id: product.id,
            quantity: order.quantity,
        };
        let reservation = match self.reservations.create(request).await {
            Ok(reservation) => reservation,
            Err(e) => {
                tracing::warn!(error = %e, "reservation write failed, restoring stock");
                self.restore_stock(&product, order.quantity).await?;
                return Err(e.into());
            }
        };

        if self.reservations.is_released(order.order_id).await? {
            return self.drop_released(order.order_id).await;
        }

        metrics::counter!("saga_stock_reservations_total", "outcome" => "reserved").increment(1);
        tracing::info!(
            reservation_id = %reservation.id,
            product_id = %product.id,
            quantity = order.quantity,
            remaining,
            "stock reserved"
        );
        self.publish_reserved(&reservation);
        Ok(ReserveOutcome::Reserved(reservation))
    }

    async fn restore_stock(&self, product: &Product, quantity: u32) -> Result<()> {
        match self
            .products
            .adjust_stock(product.id, i64::from(quantity))
            .await
        {
            Ok(stock) => {
                metrics::counter!("saga_compensations_total", "outcome" => "restored")
                    .increment(1);
                tracing::info!(product_id = %product.id, stock, "stock restored");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("saga_compensations_total", "outcome" => "failed").increment(1);
                tracing::error!(
                    product_id = %product.id,
                    quantity,
                    error = %e,
                    "failed to restore stock, product is under-counted"
                );
                Err(SagaError::CompensationFailed {
                    step: "restore_stock",
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Gives back anything reserved for a cancelled order.
    async fn drop_released(&self, order_id: OrderId) -> Result<ReserveOutcome> {
        metrics::counter!("saga_stock_reservations_total", "outcome" => "released").increment(1);
        tracing::info!("order was cancelled, not reserving stock");
        self.return_reserved_stock(order_id).await?;
        Ok(ReserveOutcome::Released)
    }

    fn reject(&self, order: &OrderCreated, reason: String) -> ReserveOutcome {
        metrics::counter!("saga_stock_reservations_total", "outcome" => "rejected").increment(1);
        tracing::info!(reason = %reason, "stock reservation rejected");
        self.publisher.spawn(StockFailed {
            order_id: order.order_id,
            item_name: order.item_name.clone(),
            reason: reason.clone(),
        });
        ReserveOutcome::Rejected { reason }
    }

    fn publish_reserved(&self, reservation: &StockReservation) {
        self.publisher.spawn(StockReserved {
            order_id: reservation.order_id,
            product_id: reservation.product_id,
            quantity: reservation.quantity,
            reservation_id: reservation.id,
        });
    }

    /// RESERVED -> CONFIRMED once the order is paid.
    ///
    /// Returns `None` when the order has no reservation, and the reservation
    /// unchanged when it has already left RESERVED.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_reservation(&self, order_id: OrderId) -> Result<Option<StockReservation>> {
        Ok(self
            .settle_reservation(order_id, ReservationStatus::Confirmed)
            .await?
            .into_reservation())
    }

    /// RESERVED -> RELEASED, returning the reserved quantity to stock.
    ///
    /// The order is marked released first, so an `order.created` delivered
    /// after its cancellation takes no stock. Returns `None` when nothing had
    /// been reserved yet.
    #[tracing::instrument(skip(self))]
    pub async fn release_reservation(&self, order_id: OrderId) -> Result<Option<StockReservation>> {
        self.reservations.mark_released(order_id).await?;
        self.return_reserved_stock(order_id).await
    }

    async fn return_reserved_stock(&self, order_id: OrderId) -> Result<Option<StockReservation>> {
        let reservation = match self
            .settle_reservation(order_id, ReservationStatus::Released)
            .await?
        {
            Settlement::Settled(reservation) => reservation,
            other => return Ok(other.into_reservation()),
        };

        if let Err(e) = self
            .products
            .adjust_stock(reservation.product_id, i64::from(reservation.quantity))
            .await
        {
            // Put the reservation back so a redelivery releases it again.
            self.reservations
                .update_status(
                    reservation.id,
                    ReservationStatus::Released,
                    ReservationStatus::Reserved,
                )
                .await?;
            return Err(e.into());
        }

        tracing::info!(
            product_id = %reservation.product_id,
            quantity = reservation.quantity,
            "reserved stock returned"
        );
        Ok(Some(reservation))
    }

    /// Moves the order's reservation from RESERVED to `next`, if it is still
    /// RESERVED.
    async fn settle_reservation(
        &self,
        order_id: OrderId,
        next: ReservationStatus,
    ) -> Result<Settlement> {
        let Some(mut reservation) = self.reservations.get_by_order(order_id).await? else {
            tracing::debug!("order has no reservation");
            return Ok(Settlement::NoReservation);
        };
        if reservation.status != ReservationStatus::Reserved {
            tracing::debug!(status = %reservation.status, "reservation already settled");
            return Ok(Settlement::Unchanged(reservation));
        }

        reservation.transition(next)?;
        let written = self
            .reservations
            .update_status(reservation.id, ReservationStatus::Reserved, next)
            .await?;
        if !written {
            return Err(SagaError::Concurrent {
                entity: ReservationStatus::ENTITY,
                key: reservation.id.to_string(),
            });
        }
        tracing::info!(reservation_id = %reservation.id, status = %next, "reservation settled");
        Ok(Settlement::Settled(reservation))
    }

    /// Binds the inventory service's queues.
    pub async fn start_listening(self: &Arc<Self>, bus: &dyn EventBus) -> Result<()> {
        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_ORDER_CREATED,
            "order.created",
            on_event(QUEUE_ORDER_CREATED, move |event: OrderCreated| {
                let svc = Arc::clone(&svc);
                async move { svc.reserve_stock(&event).await.map(drop) }
            }),
        )
        .await?;

        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_PAYMENT_SUCCESS,
            "payment.success",
            on_event(QUEUE_PAYMENT_SUCCESS, move |event: PaymentSuccess| {
                let svc = Arc::clone(&svc);
                async move { svc.confirm_reservation(event.order_id).await.map(drop) }
            }),
        )
        .await?;

        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_ORDER_CANCELLED,
            "order.cancelled",
            on_event(QUEUE_ORDER_CANCELLED, move |event: OrderCancelled| {
                let svc = Arc::clone(&svc);
                async move { svc.release_reservation(event.order_id).await.map(drop) }
            }),
        )
        .await?;

        tracing::info!("inventory service listening for order.created, payment.success, order.cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryEventBus;
    use store::InMemoryInventoryRepository;

    async fn service(stock: i64) -> (InventoryService, InMemoryInventoryRepository) {
        let repo = InMemoryInventoryRepository::new();
        let publisher = BackgroundPublisher::new(Arc::new(InMemoryEventBus::new()));
        let svc = InventoryService::new(Arc::new(repo.clone()), Arc::new(repo.clone()), publisher);
        svc.create_product(NewProduct::new("Widget", stock))
            .await
            .unwrap();
        (svc, repo)
    }

    fn created(quantity: u32) -> OrderCreated {
        OrderCreated {
            order_id: OrderId::new(),
            customer_id: "c1".to_string(),
            item_name: "Widget".to_string(),
            quantity,
            total_price: 20.0,
        }
    }

    #[tokio::test]
    async fn test_reserve_takes_stock() {
        let (svc, repo) = service(5).await;
        let outcome = svc.reserve_stock(&created(2)).await.unwrap();

        let ReserveOutcome::Reserved(reservation) = outcome else {
            panic!("expected a reservation, got {outcome:?}");
        };
        assert_eq!(reservation.quantity, 2);
        assert_eq!(reservation.status, ReservationStatus::Reserved);
        assert_eq!(repo.stock_of("Widget").await, Some(3));
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_untouched() {
        let (svc, repo) = service(1).await;
        let outcome = svc.reserve_stock(&created(2)).await.unwrap();

        assert!(matches!(outcome, ReserveOutcome::Rejected { .. }));
        assert_eq!(repo.stock_of("Widget").await, Some(1));
        assert_eq!(repo.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_product_is_rejected() {
        let (svc, _) = service(5).await;
        let mut order = created(1);
        order.item_name = "Gadget".to_string();

        let outcome = svc.reserve_stock(&order).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_failed_reservation_write_restores_stock() {
        let (svc, repo) = service(5).await;
        repo.set_fail_on_create(true);

        let err = svc.reserve_stock(&created(2)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.stock_of("Widget").await, Some(5));
        assert_eq!(repo.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_redelivered_order_does_not_take_stock_twice() {
        let (svc, repo) = service(5).await;
        let order = created(2);

        svc.reserve_stock(&order).await.unwrap();
        let again = svc.reserve_stock(&order).await.unwrap();

        assert!(matches!(again, ReserveOutcome::AlreadyReserved(_)));
        assert_eq!(repo.stock_of("Widget").await, Some(3));
        assert_eq!(repo.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_returns_stock_once() {
        let (svc, repo) = service(5).await;
        let order = created(2);
        svc.reserve_stock(&order).await.unwrap();

        let released = svc.release_reservation(order.order_id).await.unwrap().unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
        assert_eq!(repo.stock_of("Widget").await, Some(5));

        svc.release_reservation(order.order_id).await.unwrap();
        assert_eq!(repo.stock_of("Widget").await, Some(5));
    }

    #[tokio::test]
    async fn test_cancel_before_create_takes_no_stock() {
        let (svc, repo) = service(10).await;
        let order = created(3);

        assert_eq!(svc.release_reservation(order.order_id).await.unwrap(), None);
        let outcome = svc.reserve_stock(&order).await.unwrap();

        assert_eq!(outcome, ReserveOutcome::Released);
        assert_eq!(repo.stock_of("Widget").await, Some(10));
        assert_eq!(repo.reservation_count().await, 0);

        // Redelivery of the late order.created changes nothing.
        assert_eq!(svc.reserve_stock(&order).await.unwrap(), ReserveOutcome::Released);
        assert_eq!(repo.stock_of("Widget").await, Some(10));
    }

    #[tokio::test]
    async fn test_released_reservation_is_not_reserved_again() {
        let (svc, repo) = service(5).await;
        let order = created(2);
        svc.reserve_stock(&order).await.unwrap();
        svc.release_reservation(order.order_id).await.unwrap();

        let again = svc.reserve_stock(&order).await.unwrap();
        assert_eq!(again, ReserveOutcome::Released);
        assert_eq!(repo.stock_of("Widget").await, Some(5));
        assert_eq!(repo.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn test_confirmed_reservation_is_not_released() {
        let (svc, repo) = service(5).await;
        let order = created(2);
        svc.reserve_stock(&order).await.unwrap();

        let confirmed = svc.confirm_reservation(order.order_id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);

        let after = svc.release_reservation(order.order_id).await.unwrap().unwrap();
        assert_eq!(after.status, ReservationStatus::Confirmed);
        assert_eq!(repo.stock_of("Widget").await, Some(3));
    }

    #[tokio::test]
    async fn test_confirm_without_reservation_is_noop() {
        let (svc, _) = service(5).await;
        assert_eq!(svc.confirm_reservation(OrderId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_product_validation_and_uniqueness() {
        let (svc, _) = service(5).await;

        let err = svc.create_product(NewProduct::new("", 1)).await.unwrap_err();
        assert!(err.is_validation());
        let err = svc.create_product(NewProduct::new("Bolt", -1)).await.unwrap_err();
        assert!(err.is_validation());
        let err = svc
            .create_product(NewProduct::new("Widget", 1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
