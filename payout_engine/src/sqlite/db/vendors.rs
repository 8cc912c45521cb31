use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Cents, NewVendor, Vendor},
    traits::SettlementDbError,
};

pub async fn insert_vendor(
    vendor: NewVendor,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vendor, SettlementDbError> {
    let vendor: Vendor = sqlx::query_as(
        r#"
            INSERT INTO vendors (name, email, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING *;
        "#,
    )
    .bind(vendor.name)
    .bind(vendor.email)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Vendor #{} [{}] created", vendor.id, vendor.name);
    Ok(vendor)
}

pub async fn fetch_vendor(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Option<Vendor>, sqlx::Error> {
    let vendor = sqlx::query_as("SELECT * FROM vendors WHERE id = $1").bind(vendor_id).fetch_optional(conn).await?;
    Ok(vendor)
}

pub async fn fetch_vendors(conn: &mut SqliteConnection) -> Result<Vec<Vendor>, sqlx::Error> {
    let vendors = sqlx::query_as("SELECT * FROM vendors ORDER BY id").fetch_all(conn).await?;
    Ok(vendors)
}

pub async fn link_rail_account(
    vendor_id: i64,
    rail_account_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vendor, SettlementDbError> {
    let vendor: Option<Vendor> =
        sqlx::query_as("UPDATE vendors SET rail_account_id = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(rail_account_id)
            .bind(now)
            .bind(vendor_id)
            .fetch_optional(conn)
            .await?;
    vendor.ok_or(SettlementDbError::VendorNotFound(vendor_id))
}

/// Applies signed deltas to the vendor's three balance fields and returns the updated vendor.
///
/// The table's CHECK constraints stop any balance from going negative. If one would, the whole statement fails with
/// [`SettlementDbError::InvariantViolation`] and the caller's transaction must be abandoned.
pub async fn adjust_balances(
    vendor_id: i64,
    pending_delta: Cents,
    paid_delta: Cents,
    debt_delta: Cents,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vendor, SettlementDbError> {
    let result = sqlx::query_as::<_, Vendor>(
        r#"
            UPDATE vendors SET
                pending_earnings = pending_earnings + $1,
                paid_earnings = paid_earnings + $2,
                debt_balance = debt_balance + $3,
                updated_at = $4
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(pending_delta)
    .bind(paid_delta)
    .bind(debt_delta)
    .bind(now)
    .bind(vendor_id)
    .fetch_optional(conn)
    .await;
    let vendor = match result {
        Ok(Some(v)) => v,
        Ok(None) => return Err(SettlementDbError::VendorNotFound(vendor_id)),
        Err(sqlx::Error::Database(e)) if e.message().contains("CHECK constraint") => {
            error!(
                "🗃️ Balance adjustment for vendor #{vendor_id} (pending {pending_delta}, paid {paid_delta}, debt \
                 {debt_delta}) would leave a negative balance"
            );
            return Err(SettlementDbError::InvariantViolation(format!(
                "balance adjustment would make a balance of vendor #{vendor_id} negative"
            )));
        },
        Err(e) => return Err(e.into()),
    };
    trace!(
        "🗃️ Vendor #{vendor_id} balances: pending {}, paid {}, debt {}",
        vendor.pending_earnings,
        vendor.paid_earnings,
        vendor.debt_balance
    );
    Ok(vendor)
}
