//! Order service: owns orders and reacts to payment and stock outcomes.

use std::sync::Arc;

use common::{OrderId, Page};
use domain::{NewOrder, Order, OrderStatus, Status};
use event_bus::{
    BackgroundPublisher, EventBus, OrderCancelled, OrderCreated, PaymentFailed, PaymentSuccess,
    StockFailed,
};
use store::OrderRepository;

use crate::error::{Result, SagaError};
use crate::handler::on_event;

pub const QUEUE_PAYMENT_SUCCESS: &str = "order.payment.success";
pub const QUEUE_PAYMENT_FAILED: &str = "order.payment.failed";
pub const QUEUE_STOCK_FAILED: &str = "order.stock.failed";

/// Whether an event-driven transition changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The entity was already where the event would have put it.
    AlreadyApplied,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    publisher: BackgroundPublisher,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>, publisher: BackgroundPublisher) -> Self {
        Self { orders, publisher }
    }

    /// Creates a PENDING order and announces it with `order.created`.
    ///
    /// The event is published in the background; the order is returned as
    /// soon as it is stored.
    #[tracing::instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_order(&self, input: NewOrder) -> Result<Order> {
        let order = Order::create(input)?;
        self.orders.create(&order).await?;

        self.publisher.spawn(OrderCreated {
            order_id: order.id,
            customer_id: order.customer_id.clone(),
            item_name: order.item_name.clone(),
            quantity: order.quantity,
            total_price: order.total_price.as_decimal(),
        });

        metrics::counter!("saga_orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, item = %order.item_name, quantity = order.quantity, "order created");
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(id)
            .await?
            .ok_or_else(|| SagaError::not_found("order", id))
    }

    /// Orders of one customer, newest first.
    pub async fn orders_for_customer(&self, customer_id: &str, page: Page) -> Result<Vec<Order>> {
        Ok(self.orders.list_by_customer(customer_id, page).await?)
    }

    /// Moves an order to `next` on behalf of an operator.
    ///
    /// Cancelling this way also publishes `order.cancelled`.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut order = self.get_order(id).await?;
        let from = order.status;
        order.transition(next)?;
        self.store_transition(&order, from).await?;

        if next == OrderStatus::Cancelled {
            self.publisher.spawn(OrderCancelled { order_id: id });
        }
        tracing::info!(order_id = %id, from = %from, to = %next, "order status updated");
        Ok(order)
    }

    /// `payment.success`: PENDING -> PAID. Already PAID or SHIPPED is a no-op.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_success(&self, event: PaymentSuccess) -> Result<Outcome> {
        let mut order = self.get_order(event.order_id).await?;
        if matches!(order.status, OrderStatus::Paid | OrderStatus::Shipped) {
            tracing::debug!(status = %order.status, "duplicate payment.success ignored");
            return Ok(Outcome::AlreadyApplied);
        }

        let from = order.status;
        order.transition(OrderStatus::Paid)?;
        self.store_transition(&order, from).await?;
        tracing::info!(payment_id = %event.payment_id, "order paid");
        Ok(Outcome::Applied)
    }

    /// `payment.failed`: cancels the order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_failed(&self, event: PaymentFailed) -> Result<Outcome> {
        self.cancel(event.order_id, &event.reason).await
    }

    /// `stock.failed`: cancels the order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_stock_failed(&self, event: StockFailed) -> Result<Outcome> {
        self.cancel(event.order_id, &event.reason).await
    }

    async fn cancel(&self, id: OrderId, reason: &str) -> Result<Outcome> {
        let mut order = self.get_order(id).await?;
        if order.status == OrderStatus::Cancelled {
            tracing::debug!("order already cancelled");
            return Ok(Outcome::AlreadyApplied);
        }

        let from = order.status;
        order.transition(OrderStatus::Cancelled)?;
        self.store_transition(&order, from).await?;
        self.publisher.spawn(OrderCancelled { order_id: id });
        tracing::info!(from = %from, reason, "order cancelled");
        Ok(Outcome::Applied)
    }

    async fn store_transition(&self, order: &Order, from: OrderStatus) -> Result<()> {
        let written = self
            .orders
            .update_status(order.id, from, order.status)
            .await?;
        if !written {
            return Err(SagaError::Concurrent {
                entity: OrderStatus::ENTITY,
                key: order.id.to_string(),
            });
        }
        Ok(())
    }

    /// Binds the order service's queues.
    pub async fn start_listening(self: &Arc<Self>, bus: &dyn EventBus) -> Result<()> {
        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_PAYMENT_SUCCESS,
            "payment.success",
            on_event(QUEUE_PAYMENT_SUCCESS, move |event: PaymentSuccess| {
                let svc = Arc::clone(&svc);
                async move { svc.on_payment_success(event).await.map(drop) }
            }),
        )
        .await?;

        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_PAYMENT_FAILED,
            "payment.failed",
            on_event(QUEUE_PAYMENT_FAILED, move |event: PaymentFailed| {
                let svc = Arc::clone(&svc);
                async move { svc.on_payment_failed(event).await.map(drop) }
            }),
        )
        .await?;

        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_STOCK_FAILED,
            "stock.failed",
            on_event(QUEUE_STOCK_FAILED, move |event: StockFailed| {
                let svc = Arc::clone(&svc);
                async move { svc.on_stock_failed(event).await.map(drop) }
            }),
        )
        .await?;

        tracing::info!("order service listening for payment.success, payment.failed, stock.failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PaymentId;
    use event_bus::InMemoryEventBus;
    use store::InMemoryOrderRepository;

    fn service() -> (OrderService, InMemoryOrderRepository) {
        let repo = InMemoryOrderRepository::new();
        let publisher = BackgroundPublisher::new(Arc::new(InMemoryEventBus::new()));
        (OrderService::new(Arc::new(repo.clone()), publisher), repo)
    }

    fn widget_order() -> NewOrder {
        NewOrder::new("c1", "Widget", 2, 20.0)
    }

    fn paid(order_id: OrderId) -> PaymentSuccess {
        PaymentSuccess {
            order_id,
            payment_id: PaymentId::new(1),
            amount: 20.0,
        }
    }

    #[tokio::test]
    async fn test_create_order_is_pending() {
        let (svc, _) = service();
        let order = svc.create_order(widget_order()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(svc.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_invalid_order_is_not_stored() {
        let (svc, _) = service();
        let err = svc
            .create_order(NewOrder::new("c1", "Widget", 0, 20.0))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(
            svc.orders_for_customer("c1", Page::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_payment_success_twice_transitions_once() {
        let (svc, _) = service();
        let order = svc.create_order(widget_order()).await.unwrap();

        let first = svc.on_payment_success(paid(order.id)).await.unwrap();
        let second = svc.on_payment_success(paid(order.id)).await.unwrap();

        assert_eq!(first, Outcome::Applied);
        assert_eq!(second, Outcome::AlreadyApplied);
        assert_eq!(svc.get_order(order.id).await.unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_payment_after_cancel_is_rejected_not_retried() {
        let (svc, _) = service();
        let order = svc.create_order(widget_order()).await.unwrap();
        svc.on_stock_failed(StockFailed {
            order_id: order.id,
            item_name: "Widget".to_string(),
            reason: "out of stock".to_string(),
        })
        .await
        .unwrap();

        let err = svc.on_payment_success(paid(order.id)).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_operator_cannot_move_shipped_order_back() {
        let (svc, _) = service();
        let order = svc.create_order(widget_order()).await.unwrap();
        svc.update_order_status(order.id, OrderStatus::Paid)
            .await
            .unwrap();
        svc.update_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        let err = svc
            .update_order_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let (svc, repo) = service();
        let order = svc.create_order(widget_order()).await.unwrap();
        repo.set_fail_on_update(true);

        let err = svc.on_payment_success(paid(order.id)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (svc, _) = service();
        let err = svc.get_order(OrderId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
