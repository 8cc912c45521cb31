use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Cents, Payout, TransferAction, TransferLogEntry},
    payout_objects::TransferLogFilter,
};

/// Appends an entry for `payout` to the transfer log.
pub async fn log_action(
    payout: &Payout,
    action: TransferAction,
    amount: Cents,
    message: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO transfer_log (payout_id, vendor_id, order_id, action, amount, rail_transfer_id, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
        "#,
    )
    .bind(payout.id)
    .bind(payout.vendor_id)
    .bind(&payout.order_id)
    .bind(action)
    .bind(amount)
    .bind(payout.rail_transfer_id.as_deref())
    .bind(message)
    .bind(now)
    .execute(conn)
    .await?;
    trace!("🗃️ Transfer log: payout #{} {action} {amount}", payout.id);
    Ok(())
}

pub async fn fetch_transfer_log(
    filter: TransferLogFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransferLogEntry>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM transfer_log WHERE 1 = 1");
    if let Some(vendor_id) = filter.vendor_id {
        builder.push(" AND vendor_id = ").push_bind(vendor_id);
    }
    if let Some(payout_id) = filter.payout_id {
        builder.push(" AND payout_id = ").push_bind(payout_id);
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND created_at <= ").push_bind(until);
    }
    builder.push(" ORDER BY id");
    let entries = builder.build_query_as::<TransferLogEntry>().fetch_all(conn).await?;
    Ok(entries)
}
