use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::handlers::{BookingHandler, ListingHandler};
use shared::*;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub listing_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadingRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct AttachBillRequest {
    pub document: String,
}

#[derive(Debug, Deserialize)]
pub struct SetDeductionRequest {
    pub deduction: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadActorHeader(&'static str),
    Market(MarketError),
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        ApiError::Market(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadActorHeader(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            ApiError::Market(e) => match &e {
                MarketError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                MarketError::Unauthorized { .. } => (StatusCode::FORBIDDEN, e.to_string()),
                MarketError::InsufficientStock { .. }
                | MarketError::InvalidStateTransition { .. }
                | MarketError::InvoiceNotReady { .. } => (StatusCode::CONFLICT, e.to_string()),
                MarketError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
                MarketError::Storage(_) | MarketError::Pool(_) | MarketError::Data(_) => {
                    tracing::error!("Request failed: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    )
                }
            },
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// The gateway in front of this service authenticates users and forwards the
// resolved identity in headers. `x-actor-id` is the effective owner id;
// staff acting for a parent account carry their own id in
// `x-delegated-from`.
fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    let actor_id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(ApiError::BadActorHeader(
            "missing or malformed x-actor-id header",
        ))?;
    let role = headers
        .get("x-actor-role")
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .ok_or(ApiError::BadActorHeader(
            "missing or malformed x-actor-role header",
        ))?;
    let actor = match headers.get("x-delegated-from") {
        None => ActorContext::new(actor_id, role),
        Some(v) => {
            let staff = v
                .to_str()
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or(ApiError::BadActorHeader("malformed x-delegated-from header"))?;
            ActorContext::delegated(actor_id, role, staff)
        }
    };
    Ok(actor)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/listings", post(create_listing).get(market))
        .route("/listings/:id/stock", put(overwrite_stock))
        .route("/listings/:id/deduction", put(set_deduction))
        .route("/listings/:id/history", get(listing_history))
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id/approve", post(approve_booking))
        .route("/bookings/:id/decline", post(decline_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/loading", post(record_loading))
        .route("/bookings/:id/bill", post(attach_bill))
        .route("/bookings/:id/invoice", get(invoice))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewListing>,
) -> Result<Json<Listing>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let listing = ListingHandler::new(state.pool)
        .create_listing(&actor, request)
        .await?;
    Ok(Json(listing))
}

pub async fn market(State(state): State<AppState>) -> Result<Json<Vec<Listing>>, ApiError> {
    let listings = ListingHandler::new(state.pool).market().await?;
    Ok(Json(listings))
}

pub async fn overwrite_stock(
    State(state): State<AppState>,
    Path(listing_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<StockOverwrite>,
) -> Result<Json<Listing>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let listing = ListingHandler::new(state.pool)
        .overwrite_stock(&actor, listing_id, request)
        .await?;
    Ok(Json(listing))
}

pub async fn set_deduction(
    State(state): State<AppState>,
    Path(listing_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<SetDeductionRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    ListingHandler::new(state.pool)
        .set_deduction(&actor, listing_id, request.deduction)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn listing_history(
    State(state): State<AppState>,
    Path(listing_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<StockEdit>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let edits = ListingHandler::new(state.pool)
        .history(&actor, listing_id)
        .await?;
    Ok(Json(edits))
}

pub async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .create(&actor, request.listing_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let bookings = BookingHandler::new(state.pool).bookings_for(&actor).await?;
    Ok(Json(bookings))
}

pub async fn approve_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .approve(&actor, booking_id)
        .await?;
    Ok(Json(booking))
}

pub async fn decline_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<DeclineRequest>,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .decline(&actor, booking_id, request.reason)
        .await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .cancel(&actor, booking_id)
        .await?;
    Ok(Json(booking))
}

pub async fn record_loading(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<LoadingRequest>,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .record_loading(&actor, booking_id, request.quantity)
        .await?;
    Ok(Json(booking))
}

pub async fn attach_bill(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<AttachBillRequest>,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let booking = BookingHandler::new(state.pool)
        .attach_bill(&actor, booking_id, request.document)
        .await?;
    Ok(Json(booking))
}

pub async fn invoice(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<InvoiceView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let invoice = BookingHandler::new(state.pool)
        .invoice(&actor, booking_id)
        .await?;
    Ok(Json(invoice))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn actor_headers_resolve_to_a_context() {
        let actor =
            actor_from_headers(&headers(&[("x-actor-id", "7"), ("x-actor-role", "miller")]))
                .unwrap();
        assert_eq!(actor.actor_id, 7);
        assert_eq!(actor.role, Role::Miller);
        assert_eq!(actor.delegated_from, None);
    }

    #[test]
    fn delegated_header_is_carried_through() {
        let actor = actor_from_headers(&headers(&[
            ("x-actor-id", "7"),
            ("x-actor-role", "miller"),
            ("x-delegated-from", "31"),
        ]))
        .unwrap();
        assert_eq!(actor.delegated_from, Some(31));
    }

    #[test]
    fn missing_or_unknown_role_is_rejected() {
        assert!(actor_from_headers(&headers(&[("x-actor-id", "7")])).is_err());
        assert!(actor_from_headers(&headers(&[
            ("x-actor-id", "7"),
            ("x-actor-role", "auditor"),
        ]))
        .is_err());
    }
}
