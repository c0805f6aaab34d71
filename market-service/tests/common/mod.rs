#![allow(dead_code)]

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tempfile::NamedTempFile;

use market_service::db::{self, DbPool};
use market_service::handlers::ListingHandler;
use market_service::models::BookingRow;
use market_service::schema::{bookings, listings};
use shared::*;

pub struct TestDb {
    pub pool: DbPool,
    _file: NamedTempFile,
}

/// Fresh migrated store on a throwaway file, removed when the test ends.
pub async fn setup() -> TestDb {
    let file = NamedTempFile::new().unwrap();
    let url = file.path().to_str().unwrap().to_string();
    db::run_migrations(&url).unwrap();
    let pool = db::connect(&url).await.unwrap();
    TestDb { pool, _file: file }
}

pub fn miller(id: i64) -> ActorContext {
    ActorContext::new(id, Role::Miller)
}

pub fn buyer(id: i64) -> ActorContext {
    ActorContext::new(id, Role::Buyer)
}

pub fn farmer(id: i64) -> ActorContext {
    ActorContext::new(id, Role::Farmer)
}

pub fn admin(id: i64) -> ActorContext {
    ActorContext::new(id, Role::Admin)
}

pub fn wheat(quantity: i64, price: i64) -> NewListing {
    NewListing {
        commodity: "wheat".to_string(),
        quantity,
        price,
        condition: "dry".to_string(),
        bag_type: "jute 50kg".to_string(),
        deduction: 0,
    }
}

pub async fn seed_listing(pool: &DbPool, owner: i64, quantity: i64, price: i64) -> Listing {
    ListingHandler::new(pool.clone())
        .create_listing(&miller(owner), wheat(quantity, price))
        .await
        .unwrap()
}

pub async fn listing_quantity(pool: &DbPool, listing_id: i64) -> i64 {
    let mut conn = pool.get().await.unwrap();
    listings::table
        .filter(listings::id.eq(listing_id))
        .select(listings::quantity)
        .first::<i64>(&mut conn)
        .await
        .unwrap()
}

pub async fn fetch_booking(pool: &DbPool, booking_id: i64) -> Booking {
    let mut conn = pool.get().await.unwrap();
    let row = bookings::table
        .filter(bookings::id.eq(booking_id))
        .first::<BookingRow>(&mut conn)
        .await
        .unwrap();
    Booking::try_from(row).unwrap()
}

/// Stored (loading_status, truck_status) text, unparsed.
pub async fn loading_status_text(pool: &DbPool, booking_id: i64) -> (String, String) {
    let mut conn = pool.get().await.unwrap();
    bookings::table
        .filter(bookings::id.eq(booking_id))
        .select((bookings::loading_status, bookings::truck_status))
        .first::<(String, String)>(&mut conn)
        .await
        .unwrap()
}
