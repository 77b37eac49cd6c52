//! REST adapter over the engine's `place`/`cancel` contracts plus the account
//! admin and read paths.
//!
//! The authenticated account id arrives in the `x-account-id` header, supplied
//! by the identity collaborator in front of this service; the core trusts it
//! without re-validating credentials. Uses Extension for state so the router
//! is `Router<()>` and works with `into_make_service()`.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{CancelError, PlaceError};
use crate::intake::PlaceRequest;
use crate::types::{AccountId, InstrumentId, OrderId, OrderKind, Side};

/// Shared app state: one engine per process.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Builds the REST router over an engine.
pub fn create_router(engine: Arc<Engine>) -> Router<()> {
    let state = AppState { engine };
    Router::new()
        .route("/health", get(health))
        .route("/instruments", post(register_instrument))
        .route("/orders", post(place_order).get(list_orders))
        .route("/orders/cancel", post(cancel_order))
        .route("/accounts/deposit", post(deposit))
        .route("/accounts/grant", post(grant_shares))
        .route("/accounts/portfolio", get(portfolio))
        .route("/trades", get(list_trades))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn account_from(headers: &HeaderMap) -> Result<AccountId, Response> {
    headers
        .get("x-account-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .map(AccountId)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "missing or invalid x-account-id header" })),
            )
                .into_response()
        })
}

#[derive(serde::Deserialize)]
struct RegisterInstrumentRequest {
    instrument: u64,
}

async fn register_instrument(
    Extension(state): Extension<AppState>,
    Json(body): Json<RegisterInstrumentRequest>,
) -> Response {
    let created = state.engine.register_instrument(InstrumentId(body.instrument));
    (StatusCode::OK, Json(serde_json::json!({ "created": created }))).into_response()
}

#[derive(serde::Deserialize)]
struct OrderRequest {
    instrument: u64,
    side: Side,
    kind: OrderKind,
    quantity: u64,
    price: Option<Decimal>,
}

async fn place_order(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(body): Json<OrderRequest>,
) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let request = PlaceRequest {
        account,
        instrument: InstrumentId(body.instrument),
        side: body.side,
        kind: body.kind,
        quantity: body.quantity,
        price: body.price,
    };
    match state.engine.place(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => {
            let status = match err {
                PlaceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
        }
    }
}

#[derive(serde::Deserialize)]
struct CancelRequest {
    order_id: u64,
}

async fn cancel_order(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(body): Json<CancelRequest>,
) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    match state.engine.cancel(account, OrderId(body.order_id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "cancelled": true })),
        )
            .into_response(),
        Err(err) => {
            let status = match err {
                CancelError::NotFound(_) => StatusCode::NOT_FOUND,
                CancelError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::CONFLICT,
            };
            (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
        }
    }
}

async fn list_orders(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    (StatusCode::OK, Json(state.engine.orders_for(account))).into_response()
}

#[derive(serde::Deserialize)]
struct DepositRequest {
    amount: Decimal,
}

async fn deposit(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(body): Json<DepositRequest>,
) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    match state.engine.deposit(account, body.amount) {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({ "balance": balance })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
struct GrantRequest {
    instrument: u64,
    quantity: u64,
}

async fn grant_shares(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(body): Json<GrantRequest>,
) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let instrument = InstrumentId(body.instrument);
    state.engine.grant_shares(account, instrument, body.quantity);
    let held = state.engine.positions(account).get(&instrument).copied().unwrap_or(0);
    (StatusCode::OK, Json(serde_json::json!({ "quantity": held }))).into_response()
}

async fn portfolio(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    let account = match account_from(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let positions: Vec<serde_json::Value> = state
        .engine
        .positions(account)
        .into_iter()
        .map(|(instrument, quantity)| {
            serde_json::json!({ "instrument": instrument.0, "quantity": quantity })
        })
        .collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "balance": state.engine.balance(account),
            "positions": positions,
        })),
    )
        .into_response()
}

async fn list_trades(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, Json(state.engine.trades())).into_response()
}
