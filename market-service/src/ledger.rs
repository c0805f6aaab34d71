use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamp};
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::info;

use crate::db::DbConn;
use crate::models::*;
use crate::schema::*;
use shared::*;

// All writes to a listing's available quantity live in this module.

/// Atomically subtracts `qty` if at least that much is available. The check
/// and the subtraction are one conditional UPDATE, so two concurrent debits
/// can never both pass the check on the same units. Returns false when the
/// claim matched no row (insufficient stock).
pub async fn debit(conn: &mut DbConn, listing_id: i64, qty: i64) -> MarketResult<bool> {
    let updated = diesel::update(
        listings::table
            .filter(listings::id.eq(listing_id))
            .filter(listings::quantity.ge(qty)),
    )
    .set(listings::quantity.eq(listings::quantity - qty))
    .execute(conn)
    .await?;
    Ok(updated == 1)
}

/// Returns `qty` to the listing. Invoked at most once per booking
/// termination, inside the transaction that claimed the status transition.
pub async fn credit(conn: &mut DbConn, listing_id: i64, qty: i64) -> MarketResult<()> {
    let updated = diesel::update(listings::table.filter(listings::id.eq(listing_id)))
        .set(listings::quantity.eq(listings::quantity + qty))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(MarketError::NotFound {
            entity: "listing",
            id: listing_id,
        });
    }
    Ok(())
}

pub async fn insert_listing(conn: &mut DbConn, row: NewListingRow) -> MarketResult<Listing> {
    let row = diesel::insert_into(listings::table)
        .values(&row)
        .returning(listings::all_columns)
        .get_result::<ListingRow>(conn)
        .await?;
    Ok(row.into())
}

/// Direct owner/admin edit. The audit row capturing the pre-edit price and
/// quantity is appended in the same transaction as the overwrite; the
/// history table is append-only.
pub async fn overwrite(
    conn: &mut DbConn,
    edited_by: i64,
    listing_id: i64,
    update: StockOverwrite,
) -> MarketResult<Listing> {
    let now = Utc::now().naive_utc();
    let row = conn
        .transaction::<Option<ListingRow>, MarketError, _>(|conn| {
            Box::pin(async move {
                // The audit insert reads the pre-edit values in the same
                // statement that writes them, so the transaction opens with
                // a write and the captured old values are exact even under
                // concurrent edits.
                let audited = listings::table
                    .filter(listings::id.eq(listing_id))
                    .select((
                        listings::id,
                        edited_by.into_sql::<BigInt>(),
                        listings::price,
                        update.price.into_sql::<BigInt>(),
                        listings::quantity,
                        update.quantity.into_sql::<BigInt>(),
                        now.into_sql::<Timestamp>(),
                    ))
                    .insert_into(stock_history::table)
                    .into_columns((
                        stock_history::listing_id,
                        stock_history::edited_by,
                        stock_history::old_price,
                        stock_history::new_price,
                        stock_history::old_quantity,
                        stock_history::new_quantity,
                        stock_history::changed_at,
                    ))
                    .execute(conn)
                    .await?;
                if audited == 0 {
                    return Ok(None);
                }

                let row = diesel::update(listings::table.filter(listings::id.eq(listing_id)))
                    .set((
                        listings::price.eq(update.price),
                        listings::quantity.eq(update.quantity),
                        listings::condition.eq(update.condition),
                        listings::bag_type.eq(update.bag_type),
                        listings::deduction.eq(update.deduction),
                    ))
                    .returning(listings::all_columns)
                    .get_result::<ListingRow>(conn)
                    .await?;
                Ok(Some(row))
            })
        })
        .await?;

    let row = row.ok_or(MarketError::NotFound {
        entity: "listing",
        id: listing_id,
    })?;
    info!("Listing {} overwritten by actor {}", listing_id, edited_by);
    Ok(row.into())
}

/// Admin-only adjustment of the deduction field alone; no audit entry, the
/// history captures price/quantity edits only.
pub async fn set_deduction(conn: &mut DbConn, listing_id: i64, deduction: i64) -> MarketResult<()> {
    let updated = diesel::update(listings::table.filter(listings::id.eq(listing_id)))
        .set(listings::deduction.eq(deduction))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(MarketError::NotFound {
            entity: "listing",
            id: listing_id,
        });
    }
    Ok(())
}
