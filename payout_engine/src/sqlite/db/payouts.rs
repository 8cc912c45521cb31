//! Payout rows. The status-changing functions here all take the status the payout is expected to be in and only touch
//! the row if it still is, so the caller learns about a lost race instead of overwriting someone else's transition.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{Cents, NewPayout, OrderId, Payout, PayoutStatus},
    payout_objects::{Pagination, PaymentStats, PayoutQueryFilter},
    traits::SettlementDbError,
};

pub async fn insert_payout(
    payout: NewPayout,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let payout: Payout = sqlx::query_as(
        r#"
            INSERT INTO payouts (
                order_id,
                vendor_id,
                amount,
                gross_amount,
                processing_fee,
                transfer_fee,
                sale_date,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(payout.order_id)
    .bind(payout.vendor_id)
    .bind(payout.amount)
    .bind(payout.gross_amount)
    .bind(payout.processing_fee)
    .bind(payout.transfer_fee)
    .bind(payout.sale_date)
    .bind(PayoutStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Payout #{} of {} created for vendor #{}", payout.id, payout.amount, payout.vendor_id);
    Ok(payout)
}

/// Creates the debt entry that claws back the given paid payout. The entry's amount is the negated payout amount.
pub async fn insert_debt_entry(
    original: &Payout,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let result = sqlx::query_as::<_, Payout>(
        r#"
            INSERT INTO payouts (
                order_id,
                vendor_id,
                amount,
                sale_date,
                status,
                is_refund_debt,
                refunded_payout_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, TRUE, $6, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(&original.order_id)
    .bind(original.vendor_id)
    .bind(-original.amount)
    .bind(now)
    .bind(PayoutStatus::Pending)
    .bind(original.id)
    .fetch_one(conn)
    .await;
    match result {
        Ok(debt) => Ok(debt),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(SettlementDbError::InvariantViolation(format!(
            "payout #{} already has a debt entry",
            original.id
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(payout_id).fetch_optional(conn).await?;
    Ok(payout)
}

pub async fn fetch_payouts_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    let payouts = sqlx::query_as("SELECT * FROM payouts WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(payouts)
}

pub async fn fetch_eligible_payouts(
    sold_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    let payouts = sqlx::query_as(
        r#"
            SELECT * FROM payouts
            WHERE status = $1 AND is_refund_debt = FALSE AND sale_date <= $2
            ORDER BY sale_date, id;
        "#,
    )
    .bind(PayoutStatus::Pending)
    .bind(sold_before)
    .fetch_all(conn)
    .await?;
    Ok(payouts)
}

pub async fn fetch_stuck_payouts(
    not_updated_since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    let payouts = sqlx::query_as(
        "SELECT * FROM payouts WHERE status = $1 AND is_refund_debt = FALSE AND updated_at <= $2 ORDER BY updated_at, id",
    )
    .bind(PayoutStatus::Processing)
    .bind(not_updated_since)
    .fetch_all(conn)
    .await?;
    Ok(payouts)
}

/// Takes the write lock on a non-debt payout, provided it is still in the `expected` status. This is the first
/// statement of every status transition, so that competing transitions queue up behind each other rather than
/// deadlocking.
///
/// Returns the payout on success. Otherwise, works out why the claim failed and returns the matching error.
pub async fn claim(
    payout_id: i64,
    expected: PayoutStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let claimed: Option<Payout> = sqlx::query_as(
        "UPDATE payouts SET updated_at = $1 WHERE id = $2 AND status = $3 AND is_refund_debt = FALSE RETURNING *",
    )
    .bind(now)
    .bind(payout_id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(payout) = claimed {
        return Ok(payout);
    }
    match fetch_payout(payout_id, conn).await? {
        None => Err(SettlementDbError::PayoutNotFound(payout_id)),
        Some(p) if p.is_refund_debt => Err(SettlementDbError::InvariantViolation(format!(
            "payout #{payout_id} is a refund debt entry and cannot be settled directly"
        ))),
        Some(p) => {
            debug!("🗃️ Payout #{payout_id} is {} but {expected} was expected", p.status);
            Err(SettlementDbError::StatusConflict { payout_id, expected, actual: p.status })
        },
    }
}

pub async fn mark_processing(
    payout_id: i64,
    debt_offset: Cents,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let payout: Payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = $1,
                debt_offset = $2,
                attempts = attempts + 1,
                updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(PayoutStatus::Processing)
    .bind(debt_offset)
    .bind(now)
    .bind(payout_id)
    .fetch_one(conn)
    .await?;
    Ok(payout)
}

/// The outcome of a settled payout, as written to its row.
pub struct PaidDetails<'a> {
    pub rail_transfer_id: Option<&'a str>,
    pub note: Option<&'a str>,
    pub debt_offset: Cents,
}

pub async fn mark_paid(
    payout_id: i64,
    details: PaidDetails<'_>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let payout: Payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = $1,
                rail_transfer_id = $2,
                note = COALESCE($3, note),
                debt_offset = $4,
                failure_reason = NULL,
                payment_date = $5,
                updated_at = $5
            WHERE id = $6
            RETURNING *;
        "#,
    )
    .bind(PayoutStatus::Paid)
    .bind(details.rail_transfer_id)
    .bind(details.note)
    .bind(details.debt_offset)
    .bind(now)
    .bind(payout_id)
    .fetch_one(conn)
    .await?;
    Ok(payout)
}

pub async fn mark_failed(
    payout_id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, SettlementDbError> {
    let payout: Payout = sqlx::query_as(
        r#"
            UPDATE payouts SET status = $1, failure_reason = $2, debt_offset = 0, updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(PayoutStatus::Failed)
    .bind(reason)
    .bind(now)
    .bind(payout_id)
    .fetch_one(conn)
    .await?;
    Ok(payout)
}

pub async fn delete_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<(), SettlementDbError> {
    let result = sqlx::query("DELETE FROM payouts WHERE id = $1 AND status != $2")
        .bind(payout_id)
        .bind(PayoutStatus::Paid)
        .execute(conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(SettlementDbError::InvariantViolation(format!("payout #{payout_id} could not be removed")));
    }
    Ok(())
}

/// Marks every open debt entry of the vendor as `paid`. Called once the vendor's debt balance is back to zero.
pub async fn settle_open_debts(
    vendor_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    let settled = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = $1,
                payment_date = $2,
                updated_at = $2,
                note = 'Recovered from subsequent earnings'
            WHERE vendor_id = $3 AND is_refund_debt = TRUE AND status = $4
            RETURNING *;
        "#,
    )
    .bind(PayoutStatus::Paid)
    .bind(now)
    .bind(vendor_id)
    .bind(PayoutStatus::Pending)
    .fetch_all(conn)
    .await?;
    Ok(settled)
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: PayoutQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(vendor_id) = filter.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if let Some(order_id) = filter.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if let Some(statuses) = filter.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        let mut first = true;
        for status in statuses {
            if !first {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
            first = false;
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = filter.since {
        where_clause.push("sale_date >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("sale_date <= ");
        where_clause.push_bind_unseparated(until);
    }
    if let Some(debt) = filter.refund_debt {
        where_clause.push("is_refund_debt = ");
        where_clause.push_bind_unseparated(debt);
    }
}

/// Fetches payouts according to the criteria in the `PayoutQueryFilter`, newest sale first.
pub async fn search_payouts(
    filter: PayoutQueryFilter,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM payouts");
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY sale_date DESC, id DESC LIMIT ");
    builder.push_bind(pagination.count());
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let payouts = builder.build_query_as::<Payout>().fetch_all(conn).await?;
    Ok(payouts)
}

pub async fn count_payouts(filter: PayoutQueryFilter, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM payouts");
    push_filter(&mut builder, filter);
    let (count,): (i64,) = builder.build_query_as().fetch_one(conn).await?;
    Ok(count)
}

#[derive(sqlx::FromRow)]
struct StatusTotals {
    status: PayoutStatus,
    n: i64,
    amount: i64,
    transferred: i64,
    recovered: i64,
}

pub async fn payment_stats(conn: &mut SqliteConnection) -> Result<PaymentStats, sqlx::Error> {
    let totals: Vec<StatusTotals> = sqlx::query_as(
        r#"
            SELECT
                status,
                COUNT(*) AS n,
                COALESCE(SUM(amount), 0) AS amount,
                COALESCE(SUM(CASE WHEN rail_transfer_id IS NOT NULL THEN amount - debt_offset ELSE 0 END), 0) AS transferred,
                COALESCE(SUM(debt_offset), 0) AS recovered
            FROM payouts
            WHERE is_refund_debt = FALSE
            GROUP BY status;
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut stats = PaymentStats::default();
    for row in totals {
        let amount = Cents::from(row.amount);
        match row.status {
            PayoutStatus::Pending => {
                stats.pending_count = row.n;
                stats.pending_amount = amount;
            },
            PayoutStatus::Processing => {
                stats.processing_count = row.n;
                stats.processing_amount = amount;
            },
            PayoutStatus::Paid => {
                stats.paid_count = row.n;
                stats.paid_amount = amount;
                stats.transferred_amount = Cents::from(row.transferred);
                stats.debt_recovered = Cents::from(row.recovered);
            },
            PayoutStatus::Failed => {
                stats.failed_count = row.n;
                stats.failed_amount = amount;
            },
        }
    }
    let (debt, vendors_with_debt): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(debt_balance), 0), COALESCE(SUM(CASE WHEN debt_balance > 0 THEN 1 ELSE 0 END), 0) FROM \
         vendors",
    )
    .fetch_one(conn)
    .await?;
    stats.outstanding_debt = Cents::from(debt);
    stats.vendors_with_debt = vendors_with_debt;
    Ok(stats)
}
