pub mod error;
pub mod order_id;
pub mod status;

pub use error::{MarketError, MarketResult};
pub use order_id::{next_order_id, OrderId, ORDER_ID_BASE};
pub use status::{BookingStatus, LoadingStatus, TruckStatus};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Miller,
    Buyer,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "farmer" => Some(Role::Farmer),
            "miller" => Some(Role::Miller),
            "buyer" => Some(Role::Buyer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Who is performing an operation. `actor_id` is the already-resolved
/// effective owner id: staff acting for a parent account are resolved
/// upstream, with their own id carried in `delegated_from` for log
/// attribution only. Never read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: i64,
    pub role: Role,
    pub delegated_from: Option<i64>,
}

impl ActorContext {
    pub fn new(actor_id: i64, role: Role) -> Self {
        ActorContext {
            actor_id,
            role,
            delegated_from: None,
        }
    }

    pub fn delegated(actor_id: i64, role: Role, delegated_from: i64) -> Self {
        ActorContext {
            actor_id,
            role,
            delegated_from: Some(delegated_from),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub order_id: OrderId,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub decision_at: Option<NaiveDateTime>,
    pub loaded_qty: i64,
    pub loading_status: LoadingStatus,
    pub truck_status: TruckStatus,
    pub loaded_at: Option<NaiveDateTime>,
    pub bill_document: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Booking {
    /// Quantity still to be physically loaded.
    pub fn remaining(&self) -> i64 {
        self.quantity - self.loaded_qty
    }
}

/// Payload for putting a new lot on the market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub commodity: String,
    pub quantity: i64,
    pub price: i64,
    pub condition: String,
    pub bag_type: String,
    #[serde(default)]
    pub deduction: i64,
}

/// A full stock edit as submitted by the owning miller or an admin; every
/// field of the listing except identity and creation time is overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockOverwrite {
    pub price: i64,
    pub quantity: i64,
    pub condition: String,
    pub bag_type: String,
    pub deduction: i64,
}

/// One append-only audit entry for a direct stock edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEdit {
    pub id: i64,
    pub listing_id: i64,
    pub edited_by: i64,
    pub old_price: i64,
    pub new_price: i64,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub changed_at: NaiveDateTime,
}

/// Dashboard row: a booking joined with its listing's commodity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
    pub booking: Booking,
    pub commodity: String,
    pub remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceView {
    pub booking_id: i64,
    pub order_id: OrderId,
    pub commodity: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub gross_amount: i64,
    pub deduction: i64,
    pub net_amount: i64,
    pub buyer_id: i64,
    pub owner_id: i64,
    pub loaded_at: Option<NaiveDateTime>,
}
