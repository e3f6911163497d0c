//! Payment service: opens a payment per order and settles it on request.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, PaymentId};
use domain::{Money, NewPayment, Payment, PaymentStatus, Status, ValidationError};
use event_bus::{BackgroundPublisher, EventBus, OrderCreated, PaymentFailed, PaymentSuccess};
use store::PaymentRepository;

use crate::error::{Result, SagaError};
use crate::handler::on_event;

pub const QUEUE_ORDER_CREATED: &str = "payment.order.created";

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    publisher: BackgroundPublisher,
}

impl PaymentService {
    pub fn new(payments: Arc<dyn PaymentRepository>, publisher: BackgroundPublisher) -> Self {
        Self {
            payments,
            publisher,
        }
    }

    /// Opens a PENDING payment for an order.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(&self, order_id: OrderId, amount: f64) -> Result<Payment> {
        let amount = Money::from_decimal(amount).ok_or(ValidationError::NotPositive {
            field: "amount",
            value: amount,
        })?;
        let payment = self
            .payments
            .create(NewPayment::new(order_id, amount)?)
            .await?;
        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment opened");
        Ok(payment)
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| SagaError::not_found("payment", id))
    }

    pub async fn payment_for_order(&self, order_id: OrderId) -> Result<Payment> {
        self.payments
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| SagaError::not_found("payment", order_id))
    }

    /// `order.created`: opens the payment unless the order already has one.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_order_created(&self, event: OrderCreated) -> Result<Option<Payment>> {
        if let Some(existing) = self.payments.get_by_order(event.order_id).await? {
            tracing::debug!(payment_id = %existing.id, "order already has a payment");
            return Ok(None);
        }
        self.create_payment(event.order_id, event.total_price)
            .await
            .map(Some)
    }

    /// PENDING -> COMPLETED, then publishes `payment.success`.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, id: PaymentId) -> Result<Payment> {
        let mut payment = self.get_payment(id).await?;
        payment.confirm(Utc::now())?;
        self.store_transition(&payment).await?;

        self.publisher.spawn(PaymentSuccess {
            order_id: payment.order_id,
            payment_id: payment.id,
            amount: payment.amount.as_decimal(),
        });
        tracing::info!(order_id = %payment.order_id, amount = %payment.amount, "payment completed");
        Ok(payment)
    }

    /// PENDING -> FAILED, then publishes `payment.failed`.
    #[tracing::instrument(skip(self))]
    pub async fn fail_payment(&self, id: PaymentId, reason: &str) -> Result<Payment> {
        let mut payment = self.get_payment(id).await?;
        payment.fail(reason, Utc::now())?;
        self.store_transition(&payment).await?;

        self.publisher.spawn(PaymentFailed {
            order_id: payment.order_id,
            payment_id: payment.id,
            reason: reason.to_string(),
        });
        tracing::info!(order_id = %payment.order_id, "payment failed");
        Ok(payment)
    }

    async fn store_transition(&self, payment: &Payment) -> Result<()> {
        if !self
            .payments
            .update_status(payment, PaymentStatus::Pending)
            .await?
        {
            return Err(SagaError::Concurrent {
                entity: PaymentStatus::ENTITY,
                key: payment.id.to_string(),
            });
        }
        Ok(())
    }

    /// Binds the payment service's queue.
    pub async fn start_listening(self: &Arc<Self>, bus: &dyn EventBus) -> Result<()> {
        let svc = Arc::clone(self);
        bus.subscribe(
            QUEUE_ORDER_CREATED,
            "order.created",
            on_event(QUEUE_ORDER_CREATED, move |event: OrderCreated| {
                let svc = Arc::clone(&svc);
                async move { svc.on_order_created(event).await.map(drop) }
            }),
        )
        .await?;

        tracing::info!("payment service listening for order.created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryEventBus;
    use store::InMemoryPaymentRepository;

    fn service() -> PaymentService {
        let publisher = BackgroundPublisher::new(Arc::new(InMemoryEventBus::new()));
        PaymentService::new(Arc::new(InMemoryPaymentRepository::new()), publisher)
    }

    fn created(order_id: OrderId) -> OrderCreated {
        OrderCreated {
            order_id,
            customer_id: "c1".to_string(),
            item_name: "Widget".to_string(),
            quantity: 2,
            total_price: 20.0,
        }
    }

    #[tokio::test]
    async fn test_confirm_sets_paid_at_once() {
        let svc = service();
        let payment = svc.create_payment(OrderId::new(), 20.0).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let confirmed = svc.confirm_payment(payment.id).await.unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Completed);
        assert!(confirmed.paid_at.is_some());

        let err = svc.confirm_payment(payment.id).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            svc.get_payment(payment.id).await.unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_fail_keeps_reason() {
        let svc = service();
        let payment = svc.create_payment(OrderId::new(), 5.5).await.unwrap();

        let failed = svc.fail_payment(payment.id, "card declined").await.unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
        assert!(svc.confirm_payment(payment.id).await.is_err());
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let svc = service();
        let err = svc.create_payment(OrderId::new(), 0.0).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_redelivered_order_created_opens_one_payment() {
        let svc = service();
        let order_id = OrderId::new();

        let first = svc.on_order_created(created(order_id)).await.unwrap();
        let second = svc.on_order_created(created(order_id)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(
            svc.payment_for_order(order_id).await.unwrap().id,
            first.unwrap().id
        );
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let svc = service();
        assert!(svc.confirm_payment(PaymentId::new(42)).await.unwrap_err().is_not_found());
    }
}
