use chrono::Utc;
use diesel::dsl::case_when;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::info;

use crate::db::{DbConn, DbPool};
use crate::ledger;
use crate::models::*;
use crate::schema::*;
use shared::*;

fn pool_error<E: std::fmt::Display>(e: E) -> MarketError {
    MarketError::Pool(e.to_string())
}

// Millers act on their own listings; admins act on any.
fn require_listing_authority(
    actor: &ActorContext,
    owner_id: i64,
    action: &'static str,
) -> MarketResult<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Miller if actor.actor_id == owner_id => Ok(()),
        _ => Err(MarketError::Unauthorized {
            actor: actor.actor_id,
            action,
        }),
    }
}

async fn booking_with_owner(
    conn: &mut DbConn,
    booking_id: i64,
) -> MarketResult<(BookingRow, i64)> {
    bookings::table
        .inner_join(listings::table)
        .filter(bookings::id.eq(booking_id))
        .select((bookings::all_columns, listings::owner_id))
        .first::<(BookingRow, i64)>(conn)
        .await
        .optional()?
        .ok_or(MarketError::NotFound {
            entity: "booking",
            id: booking_id,
        })
}

async fn booking_status(conn: &mut DbConn, booking_id: i64) -> MarketResult<BookingStatus> {
    let raw = bookings::table
        .filter(bookings::id.eq(booking_id))
        .select(bookings::status)
        .first::<String>(conn)
        .await
        .optional()?
        .ok_or(MarketError::NotFound {
            entity: "booking",
            id: booking_id,
        })?;
    BookingStatus::parse(&raw).ok_or_else(|| {
        MarketError::Data(format!(
            "unrecognized booking status {raw:?} on booking {booking_id}"
        ))
    })
}

pub struct ListingHandler {
    pool: DbPool,
}

impl ListingHandler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_listing(
        &self,
        actor: &ActorContext,
        new: NewListing,
    ) -> MarketResult<Listing> {
        if actor.role != Role::Miller {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "create listings",
            });
        }
        if new.quantity < 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("listing quantity must not be negative, got {}", new.quantity),
            });
        }
        if new.price < 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("listing price must not be negative, got {}", new.price),
            });
        }

        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let listing = ledger::insert_listing(
            &mut conn,
            NewListingRow {
                owner_id: actor.actor_id,
                commodity: new.commodity,
                quantity: new.quantity,
                price: new.price,
                condition: new.condition,
                bag_type: new.bag_type,
                deduction: new.deduction,
                created_at: Utc::now().naive_utc(),
            },
        )
        .await?;

        info!(
            "Listing {} created by miller {}: {} x{}",
            listing.id, actor.actor_id, listing.commodity, listing.quantity
        );
        Ok(listing)
    }

    pub async fn overwrite_stock(
        &self,
        actor: &ActorContext,
        listing_id: i64,
        update: StockOverwrite,
    ) -> MarketResult<Listing> {
        if update.quantity < 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!(
                    "listing quantity must not be negative, got {}",
                    update.quantity
                ),
            });
        }
        if update.price < 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("listing price must not be negative, got {}", update.price),
            });
        }

        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = listings::table
            .filter(listings::id.eq(listing_id))
            .first::<ListingRow>(&mut conn)
            .await
            .optional()?
            .ok_or(MarketError::NotFound {
                entity: "listing",
                id: listing_id,
            })?;
        require_listing_authority(actor, row.owner_id, "edit this listing")?;

        if let Some(staff) = actor.delegated_from {
            info!(
                "Stock edit on listing {} submitted by staff {} for owner {}",
                listing_id, staff, actor.actor_id
            );
        }
        ledger::overwrite(&mut conn, actor.actor_id, listing_id, update).await
    }

    pub async fn set_deduction(
        &self,
        actor: &ActorContext,
        listing_id: i64,
        deduction: i64,
    ) -> MarketResult<()> {
        if !actor.is_admin() {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "adjust deductions",
            });
        }
        if deduction < 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("deduction must not be negative, got {deduction}"),
            });
        }

        let mut conn = self.pool.get().await.map_err(pool_error)?;
        ledger::set_deduction(&mut conn, listing_id, deduction).await?;
        info!(
            "Deduction on listing {} set to {} by admin {}",
            listing_id, deduction, actor.actor_id
        );
        Ok(())
    }

    pub async fn market(&self) -> MarketResult<Vec<Listing>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let rows = listings::table
            .filter(listings::quantity.gt(0))
            .order(listings::created_at.desc())
            .load::<ListingRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn history(
        &self,
        actor: &ActorContext,
        listing_id: i64,
    ) -> MarketResult<Vec<StockEdit>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = listings::table
            .filter(listings::id.eq(listing_id))
            .first::<ListingRow>(&mut conn)
            .await
            .optional()?
            .ok_or(MarketError::NotFound {
                entity: "listing",
                id: listing_id,
            })?;
        require_listing_authority(actor, row.owner_id, "view this listing's edit history")?;

        let rows = stock_history::table
            .filter(stock_history::listing_id.eq(listing_id))
            .order(stock_history::changed_at.desc())
            .load::<StockEditRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

pub struct BookingHandler {
    pool: DbPool,
}

impl BookingHandler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        actor: &ActorContext,
        listing_id: i64,
        qty: i64,
    ) -> MarketResult<Booking> {
        if actor.role != Role::Buyer {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "create bookings",
            });
        }
        if qty <= 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("booking quantity must be positive, got {qty}"),
            });
        }

        let mut conn = self.pool.get().await.map_err(pool_error)?;

        // Listings are never deleted, so a failed debit claim below can
        // only mean insufficient stock.
        let listing = listings::table
            .filter(listings::id.eq(listing_id))
            .first::<ListingRow>(&mut conn)
            .await
            .optional()?
            .ok_or(MarketError::NotFound {
                entity: "listing",
                id: listing_id,
            })?;
        let available = listing.quantity;
        let buyer_id = actor.actor_id;

        let row = conn
            .transaction::<BookingRow, MarketError, _>(|conn| {
                Box::pin(async move {
                    // Debit first: the identifier must not be minted unless
                    // the debit succeeds, and the write claims the store's
                    // write lock so identifier allocation is serialized.
                    if !ledger::debit(conn, listing_id, qty).await? {
                        return Err(MarketError::InsufficientStock {
                            listing_id,
                            requested: qty,
                            available,
                        });
                    }

                    let existing: Vec<String> = bookings::table
                        .select(bookings::order_id)
                        .load(conn)
                        .await?;
                    let order_id = next_order_id(existing.iter().map(String::as_str));

                    let new_booking = NewBookingRow {
                        order_id: order_id.into_string(),
                        listing_id,
                        buyer_id,
                        quantity: qty,
                        status: BookingStatus::Pending.as_str().to_string(),
                        loaded_qty: 0,
                        loading_status: LoadingStatus::Pending.as_str().to_string(),
                        truck_status: TruckStatus::Pending.as_str().to_string(),
                        created_at: Utc::now().naive_utc(),
                    };
                    let row = diesel::insert_into(bookings::table)
                        .values(&new_booking)
                        .returning(bookings::all_columns)
                        .get_result::<BookingRow>(conn)
                        .await?;
                    Ok(row)
                })
            })
            .await?;

        info!(
            "Booking {} created: {} x{} on listing {} for buyer {}",
            row.id, row.order_id, qty, listing_id, buyer_id
        );
        Booking::try_from(row)
    }

    pub async fn approve(&self, actor: &ActorContext, booking_id: i64) -> MarketResult<Booking> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (row, owner_id) = booking_with_owner(&mut conn, booking_id).await?;
        require_listing_authority(actor, owner_id, "approve this booking")?;

        let booking = Booking::try_from(row)?;
        if !booking.status.can_transition_to(BookingStatus::Approved) {
            return Err(MarketError::InvalidStateTransition {
                booking_id,
                operation: "approve",
                state: booking.status.as_str(),
            });
        }

        // The precondition rides in the WHERE clause, so a racing
        // transition cannot double-apply.
        let claimed = diesel::update(
            bookings::table
                .filter(bookings::id.eq(booking_id))
                .filter(bookings::status.eq(BookingStatus::Pending.as_str())),
        )
        .set((
            bookings::status.eq(BookingStatus::Approved.as_str()),
            bookings::decision_at.eq(Some(Utc::now().naive_utc())),
        ))
        .returning(bookings::all_columns)
        .get_result::<BookingRow>(&mut conn)
        .await
        .optional()?;

        match claimed {
            Some(row) => {
                info!("Booking {} approved by actor {}", booking_id, actor.actor_id);
                Booking::try_from(row)
            }
            None => {
                let state = booking_status(&mut conn, booking_id).await?;
                Err(MarketError::InvalidStateTransition {
                    booking_id,
                    operation: "approve",
                    state: state.as_str(),
                })
            }
        }
    }

    pub async fn decline(
        &self,
        actor: &ActorContext,
        booking_id: i64,
        reason: Option<String>,
    ) -> MarketResult<Booking> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (row, owner_id) = booking_with_owner(&mut conn, booking_id).await?;
        require_listing_authority(actor, owner_id, "decline this booking")?;

        let booking = Booking::try_from(row)?;
        if !booking.status.can_transition_to(BookingStatus::Declined) {
            return Err(MarketError::InvalidStateTransition {
                booking_id,
                operation: "decline",
                state: booking.status.as_str(),
            });
        }

        let reason = reason.unwrap_or_else(|| "Not specified".to_string());
        let now = Utc::now().naive_utc();
        let claimed = conn
            .transaction::<Option<BookingRow>, MarketError, _>(|conn| {
                Box::pin(async move {
                    // Status claim first, credit second: the claim enforces
                    // the at-most-once credit and the transaction keeps the
                    // pair atomic.
                    let claimed = diesel::update(
                        bookings::table
                            .filter(bookings::id.eq(booking_id))
                            .filter(bookings::status.eq(BookingStatus::Pending.as_str())),
                    )
                    .set((
                        bookings::status.eq(BookingStatus::Declined.as_str()),
                        bookings::reason.eq(Some(reason)),
                        bookings::decision_at.eq(Some(now)),
                    ))
                    .returning(bookings::all_columns)
                    .get_result::<BookingRow>(conn)
                    .await
                    .optional()?;

                    let row = match claimed {
                        Some(row) => row,
                        None => return Ok(None),
                    };
                    ledger::credit(conn, row.listing_id, row.quantity).await?;
                    Ok(Some(row))
                })
            })
            .await?;

        match claimed {
            Some(row) => {
                info!(
                    "Booking {} declined by actor {}; {} units credited back to listing {}",
                    booking_id, actor.actor_id, row.quantity, row.listing_id
                );
                Booking::try_from(row)
            }
            None => {
                let state = booking_status(&mut conn, booking_id).await?;
                Err(MarketError::InvalidStateTransition {
                    booking_id,
                    operation: "decline",
                    state: state.as_str(),
                })
            }
        }
    }

    pub async fn cancel(&self, actor: &ActorContext, booking_id: i64) -> MarketResult<Booking> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (row, _owner_id) = booking_with_owner(&mut conn, booking_id).await?;

        // Only the buyer who created the booking may cancel it.
        if actor.role != Role::Buyer || row.buyer_id != actor.actor_id {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "cancel this booking",
            });
        }

        let booking = Booking::try_from(row)?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(MarketError::InvalidStateTransition {
                booking_id,
                operation: "cancel",
                state: booking.status.as_str(),
            });
        }

        let buyer_id = actor.actor_id;
        let now = Utc::now().naive_utc();
        let claimed = conn
            .transaction::<Option<BookingRow>, MarketError, _>(|conn| {
                Box::pin(async move {
                    let claimed = diesel::update(
                        bookings::table
                            .filter(bookings::id.eq(booking_id))
                            .filter(bookings::buyer_id.eq(buyer_id))
                            .filter(bookings::status.eq(BookingStatus::Pending.as_str())),
                    )
                    .set((
                        bookings::status.eq(BookingStatus::Cancelled.as_str()),
                        bookings::decision_at.eq(Some(now)),
                    ))
                    .returning(bookings::all_columns)
                    .get_result::<BookingRow>(conn)
                    .await
                    .optional()?;

                    let row = match claimed {
                        Some(row) => row,
                        None => return Ok(None),
                    };
                    ledger::credit(conn, row.listing_id, row.quantity).await?;
                    Ok(Some(row))
                })
            })
            .await?;

        match claimed {
            Some(row) => {
                info!(
                    "Booking {} cancelled by buyer {}; {} units credited back to listing {}",
                    booking_id, buyer_id, row.quantity, row.listing_id
                );
                Booking::try_from(row)
            }
            None => {
                let state = booking_status(&mut conn, booking_id).await?;
                Err(MarketError::InvalidStateTransition {
                    booking_id,
                    operation: "cancel",
                    state: state.as_str(),
                })
            }
        }
    }

    /// Accumulates physically loaded quantity. The accumulator saturates at
    /// the booked quantity and the loading status is derived in the same
    /// UPDATE; concurrent increments serialize at the store, and a completed
    /// accumulator never reads back as partial. Approval status is
    /// deliberately not consulted.
    pub async fn record_loading(
        &self,
        actor: &ActorContext,
        booking_id: i64,
        increment: i64,
    ) -> MarketResult<Booking> {
        if increment <= 0 {
            return Err(MarketError::InvalidQuantity {
                reason: format!("loading increment must be positive, got {increment}"),
            });
        }

        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (_, owner_id) = booking_with_owner(&mut conn, booking_id).await?;
        require_listing_authority(actor, owner_id, "record loading for this booking")?;

        let now = Utc::now().naive_utc();
        let row = diesel::update(bookings::table.filter(bookings::id.eq(booking_id)))
            .set((
                bookings::loaded_qty.eq(case_when(
                    (bookings::loaded_qty + increment).ge(bookings::quantity),
                    bookings::quantity,
                )
                .otherwise(bookings::loaded_qty + increment)),
                bookings::loading_status.eq(case_when(
                    (bookings::loaded_qty + increment).ge(bookings::quantity),
                    LoadingStatus::Completed.as_str().into_sql::<Text>(),
                )
                .otherwise(LoadingStatus::Partial.as_str())),
                bookings::truck_status.eq(case_when(
                    (bookings::loaded_qty + increment).ge(bookings::quantity),
                    TruckStatus::Loaded.as_str().into_sql::<Text>(),
                )
                .otherwise(bookings::truck_status)),
                // Stamped only on the transition into completed; later
                // clamped increments leave it untouched.
                bookings::loaded_at.eq(case_when(
                    (bookings::loaded_qty + increment)
                        .ge(bookings::quantity)
                        .and(bookings::loading_status.ne(LoadingStatus::Completed.as_str())),
                    Some(now),
                )
                .otherwise(bookings::loaded_at)),
            ))
            .returning(bookings::all_columns)
            .get_result::<BookingRow>(&mut conn)
            .await
            .optional()?
            .ok_or(MarketError::NotFound {
                entity: "booking",
                id: booking_id,
            })?;

        info!(
            "Booking {} loading at {}/{} ({})",
            booking_id, row.loaded_qty, row.quantity, row.loading_status
        );
        Booking::try_from(row)
    }

    pub async fn attach_bill(
        &self,
        actor: &ActorContext,
        booking_id: i64,
        document_ref: String,
    ) -> MarketResult<Booking> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (row, owner_id) = booking_with_owner(&mut conn, booking_id).await?;
        if actor.role != Role::Miller || actor.actor_id != owner_id {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "attach a bill to this booking",
            });
        }

        let booking = Booking::try_from(row)?;
        if !booking.loading_status.is_complete() {
            return Err(MarketError::InvalidStateTransition {
                booking_id,
                operation: "attach a bill",
                state: booking.loading_status.as_str(),
            });
        }

        // Loading completion is monotone, so the precondition cannot be
        // un-met between the check and the write.
        let row = diesel::update(bookings::table.filter(bookings::id.eq(booking_id)))
            .set(bookings::bill_document.eq(Some(document_ref)))
            .returning(bookings::all_columns)
            .get_result::<BookingRow>(&mut conn)
            .await?;

        info!(
            "Bill attached to booking {} by miller {}",
            booking_id, actor.actor_id
        );
        Booking::try_from(row)
    }

    pub async fn invoice(
        &self,
        actor: &ActorContext,
        booking_id: i64,
    ) -> MarketResult<InvoiceView> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let (brow, lrow) = bookings::table
            .inner_join(listings::table)
            .filter(bookings::id.eq(booking_id))
            .select((bookings::all_columns, listings::all_columns))
            .first::<(BookingRow, ListingRow)>(&mut conn)
            .await
            .optional()?
            .ok_or(MarketError::NotFound {
                entity: "booking",
                id: booking_id,
            })?;

        let booking = Booking::try_from(brow)?;
        if booking.buyer_id != actor.actor_id {
            return Err(MarketError::Unauthorized {
                actor: actor.actor_id,
                action: "view this invoice",
            });
        }
        if !booking.loading_status.is_complete() {
            return Err(MarketError::InvoiceNotReady { booking_id });
        }

        let listing: Listing = lrow.into();
        let gross = booking.quantity.checked_mul(listing.price).ok_or_else(|| {
            MarketError::Data(format!(
                "invoice gross amount overflows for booking {booking_id}"
            ))
        })?;
        let net = gross.checked_sub(listing.deduction).ok_or_else(|| {
            MarketError::Data(format!(
                "invoice net amount overflows for booking {booking_id}"
            ))
        })?;
        Ok(InvoiceView {
            booking_id: booking.id,
            order_id: booking.order_id,
            commodity: listing.commodity,
            quantity: booking.quantity,
            unit_price: listing.price,
            gross_amount: gross,
            deduction: listing.deduction,
            net_amount: net,
            buyer_id: booking.buyer_id,
            owner_id: listing.owner_id,
            loaded_at: booking.loaded_at,
        })
    }

    pub async fn bookings_for(&self, actor: &ActorContext) -> MarketResult<Vec<BookingView>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let rows: Vec<(BookingRow, String)> = match actor.role {
            Role::Buyer => {
                bookings::table
                    .inner_join(listings::table)
                    .filter(bookings::buyer_id.eq(actor.actor_id))
                    .order(bookings::created_at.desc())
                    .select((bookings::all_columns, listings::commodity))
                    .load(&mut conn)
                    .await?
            }
            Role::Miller => {
                bookings::table
                    .inner_join(listings::table)
                    .filter(listings::owner_id.eq(actor.actor_id))
                    .order(bookings::created_at.desc())
                    .select((bookings::all_columns, listings::commodity))
                    .load(&mut conn)
                    .await?
            }
            Role::Admin => {
                bookings::table
                    .inner_join(listings::table)
                    .order(bookings::created_at.desc())
                    .select((bookings::all_columns, listings::commodity))
                    .load(&mut conn)
                    .await?
            }
            Role::Farmer => {
                return Err(MarketError::Unauthorized {
                    actor: actor.actor_id,
                    action: "list bookings",
                })
            }
        };

        rows.into_iter()
            .map(|(brow, commodity)| {
                let booking = Booking::try_from(brow)?;
                let remaining = booking.remaining();
                Ok(BookingView {
                    booking,
                    commodity,
                    remaining,
                })
            })
            .collect()
    }
}
