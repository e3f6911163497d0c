//! Delivery service: opens a shipment once an order is paid and tracks it.

use std::sync::Arc;

use common::{OrderId, ShipmentId};
use domain::{Location, NewShipment, Shipment, ShipmentStatus, Status};
use event_bus::{EventBus, PaymentSuccess};
use store::ShipmentRepository;

use crate::error::{Result, SagaError};
use crate::handler::on_event;

pub const QUEUE_PAYMENT_SUCCESS: &str = "delivery.payment.success";

/// Courier recorded on shipments opened by the saga.
pub const AUTO_ASSIGNED_COURIER: &str = "Auto-Assigned";

/// Shipment lifecycle changes are driven by operators and couriers, so this
/// service publishes nothing.
#[derive(Clone)]
pub struct DeliveryService {
    shipments: Arc<dyn ShipmentRepository>,
}

impl DeliveryService {
    pub fn new(shipments: Arc<dyn ShipmentRepository>) -> Self {
        Self { shipments }
    }

    /// Opens a PICKING_UP shipment at the origin.
    #[tracing::instrument(skip(self))]
    pub async fn create_shipment(&self, order_id: OrderId, courier_name: &str) -> Result<Shipment> {
        let shipment = self
            .shipments
            .create(NewShipment::new(order_id, courier_name)?)
            .await?;
        tracing::info!(shipment_id = %shipment.id, "shipment created");
        Ok(shipment)
    }

    pub async fn get_shipment(&self, id: ShipmentId) -> Result<Shipment> {
        self.shipments
            .get(id)
            .await?
            .ok_or_else(|| SagaError::not_found("shipment", id))
    }

    pub async fn shipment_for_order(&self, order_id: OrderId) -> Result<Shipment> {
        self.shipments
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| SagaError::not_found("shipment", order_id))
    }

    /// Advances the shipment one step. Skips and reversals are rejected.
    #[tracing::instrument(skip(self))]
    pub async fn update_shipment_status(
        &self,
        id: ShipmentId,
        next: ShipmentStatus,
    ) -> Result<Shipment> {
        let mut shipment = self.get_shipment(id).await?;
        let from = shipment.status;
        shipment.advance(next)?;

        if !self.shipments.update_status(id, from, next).await? {
            return Err(SagaError::Concurrent {
                entity: ShipmentStatus::ENTITY,
                key: id.to_string(),
            });
        }
        tracing::info!(order_id = %shipment.order_id, from = %from, to = %next, "shipment advanced");
        Ok(shipment)
    }

    /// Records the courier's position.
    #[tracing::instrument(skip(self))]
    pub async fn update_location(&self, id: ShipmentId, lat: f64, long: f64) -> Result<Shipment> {
        let location = Location::new(lat, long)?;
        let mut shipment = self.get_shipment(id).await?;
        self.shipments.update_location(id, location).await?;
        shipment.move_to(location);
        Ok(shipment)
    }

    /// `payment.success`: opens the shipment unless the order already has one.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_success(&self, event: PaymentSuccess) -> Result<Option<Shipment>> {
        if let Some(existing) = self.shipments.get_by_order(event.order_id).await? {
            tracing::debug!(shipment_id = %existing.id, "order already has a shipment");
            return Ok(None);
        }
        self.create_shipment(event.order_id, AUTO_ASSIGNED_COURIER)
            .await
            .map(Some)
    }

    /// Binds the delivery service's queue.
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

        tracing::info!("delivery service listening for payment.success");
        Ok(())
    }
}
