use chrono::NaiveDateTime;
use diesel::prelude::*;
use shared::*;

#[derive(Debug, Clone, Queryable)]
pub struct ListingRow {
    pub id: i64,
    pub owner_id: i64,
    pub commodity: String,
    pub quantity: i64,
    pub price: i64,
    pub condition: String,
    pub bag_type: String,
    pub deduction: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::listings)]
pub struct NewListingRow {
    pub owner_id: i64,
    pub commodity: String,
    pub quantity: i64,
    pub price: i64,
    pub condition: String,
    pub bag_type: String,
    pub deduction: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable)]
pub struct BookingRow {
    pub id: i64,
    pub order_id: String,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    pub status: String,
    pub reason: Option<String>,
    pub decision_at: Option<NaiveDateTime>,
    pub loaded_qty: i64,
    pub loading_status: String,
    pub truck_status: String,
    pub loaded_at: Option<NaiveDateTime>,
    pub bill_document: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBookingRow {
    pub order_id: String,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    pub status: String,
    pub loaded_qty: i64,
    pub loading_status: String,
    pub truck_status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable)]
pub struct StockEditRow {
    pub id: i64,
    pub listing_id: i64,
    pub edited_by: i64,
    pub old_price: i64,
    pub new_price: i64,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub changed_at: NaiveDateTime,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            commodity: row.commodity,
            quantity: row.quantity,
            price: row.price,
            condition: row.condition,
            bag_type: row.bag_type,
            deduction: row.deduction,
            created_at: row.created_at,
        }
    }
}

// Stored status text is parsed strictly: a row carrying text outside the
// closed enums is corrupt, and guessing a status could authorize an
// invalid transition.
impl TryFrom<BookingRow> for Booking {
    type Error = MarketError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status).ok_or_else(|| {
            MarketError::Data(format!(
                "unrecognized booking status {:?} on booking {}",
                row.status, row.id
            ))
        })?;
        let loading_status = LoadingStatus::parse(&row.loading_status).ok_or_else(|| {
            MarketError::Data(format!(
                "unrecognized loading status {:?} on booking {}",
                row.loading_status, row.id
            ))
        })?;
        let truck_status = TruckStatus::parse(&row.truck_status).ok_or_else(|| {
            MarketError::Data(format!(
                "unrecognized truck status {:?} on booking {}",
                row.truck_status, row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            order_id: OrderId::from(row.order_id),
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            quantity: row.quantity,
            status,
            reason: row.reason,
            decision_at: row.decision_at,
            loaded_qty: row.loaded_qty,
            loading_status,
            truck_status,
            loaded_at: row.loaded_at,
            bill_document: row.bill_document,
            created_at: row.created_at,
        })
    }
}

impl From<StockEditRow> for StockEdit {
    fn from(row: StockEditRow) -> Self {
        Self {
            id: row.id,
            listing_id: row.listing_id,
            edited_by: row.edited_by,
            old_price: row.old_price,
            new_price: row.new_price,
            old_quantity: row.old_quantity,
            new_quantity: row.new_quantity,
            changed_at: row.changed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn booking_row() -> BookingRow {
        BookingRow {
            id: 1,
            order_id: "S10001".into(),
            listing_id: 7,
            buyer_id: 3,
            quantity: 5,
            status: "pending".into(),
            reason: None,
            decision_at: None,
            loaded_qty: 0,
            loading_status: "pending".into(),
            truck_status: "pending".into(),
            loaded_at: None,
            bill_document: None,
            created_at: NaiveDate::from_ymd_opt(2026, 7, 14)
                .unwrap()
                .and_hms_opt(9, 21, 0)
                .unwrap(),
        }
    }

    #[test]
    fn booking_row_converts_to_domain() {
        let booking = Booking::try_from(booking_row()).unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.loading_status, LoadingStatus::Pending);
        assert_eq!(booking.order_id.suffix(), Some(10001));
        assert_eq!(booking.remaining(), 5);
    }

    #[test]
    fn unknown_status_text_is_a_data_error() {
        let mut row = booking_row();
        row.status = "shipped".into();
        assert!(matches!(
            Booking::try_from(row),
            Err(MarketError::Data(_))
        ));
    }

    #[test]
    fn unknown_loading_text_is_a_data_error() {
        let mut row = booking_row();
        row.loading_status = "half".into();
        assert!(matches!(
            Booking::try_from(row),
            Err(MarketError::Data(_))
        ));
    }
}
