use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderStatusType},
    traits::SettlementDbError,
};

/// Inserts a paid order. A second order with the same `order_id` fails with
/// [`SettlementDbError::OrderAlreadyExists`].
pub async fn insert_order(
    order: &NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementDbError> {
    let result = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                total_price,
                currency,
                status,
                paid_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(order.total_price)
    .bind(&order.currency)
    .bind(OrderStatusType::Paid)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            debug!("🗃️ Order {} inserted with id {}", order.order_id, order.id);
            Ok(order)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SettlementDbError::OrderAlreadyExists(order.order_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn insert_items(
    order_id: &OrderId,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<(), SettlementDbError> {
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, vendor_id, product, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5);
            "#,
        )
        .bind(order_id)
        .bind(item.vendor_id)
        .bind(&item.product)
        .bind(item.unit_price)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }
    trace!("🗃️ {} line items stored for order {order_id}", items.len());
    Ok(())
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Moves a `Paid` order to `Refunded`. Returns `None` if the order does not exist or has already been refunded; it is
/// up to the caller to tell the two apart.
pub async fn mark_refunded(
    order_id: &OrderId,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = $1, refund_reason = $2, refunded_at = $3, updated_at = $3
            WHERE order_id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(OrderStatusType::Refunded)
    .bind(reason)
    .bind(now)
    .bind(order_id.as_str())
    .bind(OrderStatusType::Paid)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
