use async_trait::async_trait;
use common::{LogId, OrderId, Page, PaymentId, ProductId, ReservationId, ShipmentId};
use domain::{
    Location, Money, NewNotificationLog, NewPayment, NewReservation, NewShipment, NotificationLog,
    Order, OrderStatus, Payment, PaymentStatus, Product, ReservationStatus, Shipment,
    ShipmentStatus, Status, StockReservation,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::repository::{
    NotificationRepository, OrderRepository, PaymentRepository, ProductRepository,
    ReservationRepository, ShipmentRepository,
};
use crate::{Result, StoreError};

/// PostgreSQL-backed implementation of every repository.
///
/// Each service still only sees the traits it owns; sharing one pool is a
/// deployment convenience, not shared state between services.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    async fn exists(&self, table: &'static str, id: i64) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)");
        Ok(sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Resolves a conditional update that touched no row into `false`, or
    /// `NotFound` if the row is missing altogether.
    async fn settle_conditional(
        &self,
        rows_affected: u64,
        entity: &'static str,
        table: &'static str,
        id: i64,
    ) -> Result<bool> {
        if rows_affected > 0 {
            return Ok(true);
        }
        if self.exists(table, id).await? {
            Ok(false)
        } else {
            Err(StoreError::not_found(entity, id))
        }
    }
}

fn map_write_error(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_check_violation())
    {
        return StoreError::Conflict(what());
    }
    StoreError::Database(e)
}

fn row_id(id: u64) -> i64 {
    id as i64
}

fn to_u32(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn to_u64(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn status<S>(row: &PgRow) -> Result<S>
where
    S: std::str::FromStr<Err = domain::ValidationError>,
{
    let raw: String = row.try_get("status")?;
    raw.parse()
        .map_err(|e: domain::ValidationError| StoreError::Corrupt(e.to_string()))
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: row.try_get("customer_id")?,
        item_name: row.try_get("item_name")?,
        quantity: to_u32(&row, "quantity")?,
        total_price: Money::from_cents(row.try_get("total_price_cents")?),
        status: status(&row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(to_u64(&row, "id")?),
        name: row.try_get("name")?,
        stock: to_u32(&row, "stock")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_reservation(row: PgRow) -> Result<StockReservation> {
    Ok(StockReservation {
        id: ReservationId::new(to_u64(&row, "id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::new(to_u64(&row, "product_id")?),
        quantity: to_u32(&row, "quantity")?,
        status: status(&row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::new(to_u64(&row, "id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        status: status(&row)?,
        paid_at: row.try_get("paid_at")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_shipment(row: PgRow) -> Result<Shipment> {
    Ok(Shipment {
        id: ShipmentId::new(to_u64(&row, "id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        courier_name: row.try_get("courier_name")?,
        current_lat: row.try_get("current_lat")?,
        current_long: row.try_get("current_long")?,
        status: status(&row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_log(row: PgRow) -> Result<NotificationLog> {
    Ok(NotificationLog {
        id: LogId::new(to_u64(&row, "id")?),
        event_type: row.try_get("event_type")?,
        order_id: row.try_get("order_id")?,
        payload: row.try_get("payload")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

const ORDER_COLUMNS: &str =
    "id, customer_id, item_name, quantity, total_price_cents, status, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, stock, created_at, updated_at";
const RESERVATION_COLUMNS: &str =
    "id, order_id, product_id, quantity, status, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, order_id, amount_cents, status, paid_at, failure_reason, created_at, updated_at";
const SHIPMENT_COLUMNS: &str =
    "id, order_id, courier_name, current_lat, current_long, status, created_at, updated_at";
const LOG_COLUMNS: &str = "id, event_type, order_id, payload, message, created_at";

#[async_trait]
impl OrderRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, item_name, quantity, total_price_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.customer_id)
        .bind(&order.item_name)
        .bind(i64::from(order.quantity))
        .bind(order.total_price.cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("order {} already exists", order.id)))?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn list_by_customer(&self, customer_id: &str, page: Page) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %id, from = %from, to = %to))]
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
        )
        .bind(id.as_uuid())
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match OrderRepository::get(self, id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("order", id)),
        }
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(name = %name, stock = stock))]
    async fn create(&self, name: &str, stock: u32) -> Result<Product> {
        let sql = format!(
            "INSERT INTO products (name, stock) VALUES ($1, $2) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(i64::from(stock))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("product {name} already exists")))?;
        row_to_product(row)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(row_id(id.get()))
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_product).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_product).transpose()
    }

    async fn list(&self, page: Page) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query(&sql)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_product).collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(product_id = %id, delta = delta))]
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        let row = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 RETURNING stock",
        )
        .bind(row_id(id.get()))
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("stock of product {id} cannot change by {delta}")))?
        .ok_or_else(|| StoreError::not_found("product", id))?;
        to_u32(&row, "stock")
    }
}

#[async_trait]
impl ReservationRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(order_id = %reservation.order_id))]
    async fn create(&self, reservation: NewReservation) -> Result<StockReservation> {
        let sql = format!(
            "INSERT INTO stock_reservations (order_id, product_id, quantity, status) \
             VALUES ($1, $2, $3, $4) RETURNING {RESERVATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(reservation.order_id.as_uuid())
            .bind(row_id(reservation.product_id.get()))
            .bind(i64::from(reservation.quantity))
            .bind(ReservationStatus::Reserved.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_write_error(e, || {
                    format!("order {} already has a reservation", reservation.order_id)
                })
            })?;
        row_to_reservation(row)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<StockReservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_reservation).transpose()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %id, from = %from, to = %to))]
    async fn update_status(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE stock_reservations SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
        )
        .bind(row_id(id.get()))
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        self.settle_conditional(
            result.rows_affected(),
            "reservation",
            "stock_reservations",
            row_id(id.get()),
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(order_id = %order_id))]
    async fn mark_released(&self, order_id: OrderId) -> Result<()> {
        sqlx::query(
            "INSERT INTO released_orders (order_id) VALUES ($1) ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_released(&self, order_id: OrderId) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM released_orders WHERE order_id = $1)",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(order_id = %payment.order_id))]
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let sql = format!(
            "INSERT INTO payments (order_id, amount_cents, status) VALUES ($1, $2, $3) \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(payment.order_id.as_uuid())
            .bind(payment.amount.cents())
            .bind(PaymentStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_write_error(e, || {
                    format!("order {} already has a payment", payment.order_id)
                })
            })?;
        row_to_payment(row)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(row_id(id.get()))
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_payment).transpose()
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_payment).transpose()
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(payment_id = %payment.id, from = %from, to = %payment.status)
    )]
    async fn update_status(&self, payment: &Payment, from: PaymentStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, paid_at = $3, failure_reason = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(row_id(payment.id.get()))
        .bind(payment.status.as_str())
        .bind(payment.paid_at)
        .bind(payment.failure_reason.as_deref())
        .bind(payment.updated_at)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        self.settle_conditional(
            result.rows_affected(),
            "payment",
            "payments",
            row_id(payment.id.get()),
        )
        .await
    }
}

#[async_trait]
impl ShipmentRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(order_id = %shipment.order_id))]
    async fn create(&self, shipment: NewShipment) -> Result<Shipment> {
        let sql = format!(
            "INSERT INTO shipments (order_id, courier_name, current_lat, current_long, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SHIPMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(shipment.order_id.as_uuid())
            .bind(&shipment.courier_name)
            .bind(Location::ORIGIN.lat)
            .bind(Location::ORIGIN.long)
            .bind(ShipmentStatus::PickingUp.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_write_error(e, || {
                    format!("order {} already has a shipment", shipment.order_id)
                })
            })?;
        row_to_shipment(row)
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(row_id(id.get()))
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_shipment).transpose()
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_shipment).transpose()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %id, from = %from, to = %to))]
    async fn update_status(
        &self,
        id: ShipmentId,
        from: ShipmentStatus,
        to: ShipmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shipments SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
        )
        .bind(row_id(id.get()))
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        self.settle_conditional(result.rows_affected(), "shipment", "shipments", row_id(id.get()))
            .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %id))]
    async fn update_location(&self, id: ShipmentId, location: Location) -> Result<()> {
        let result = sqlx::query(
            "UPDATE shipments SET current_lat = $2, current_long = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(row_id(id.get()))
        .bind(location.lat)
        .bind(location.long)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("shipment", id));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(event_type = %log.event_type))]
    async fn append(&self, log: NewNotificationLog) -> Result<NotificationLog> {
        let sql = format!(
            "INSERT INTO notification_logs (event_type, order_id, payload, message) \
             VALUES ($1, $2, $3, $4) RETURNING {LOG_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&log.event_type)
            .bind(&log.order_id)
            .bind(&log.payload)
            .bind(&log.message)
            .fetch_one(&self.pool)
            .await?;
        row_to_log(row)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<NotificationLog>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM notification_logs ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_log).collect()
    }

    async fn by_order(&self, order_id: &str) -> Result<Vec<NotificationLog>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM notification_logs WHERE order_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_log).collect()
    }
}
