use axum::{extract::State, http::StatusCode, Json};
use tower_sessions::Session;

use crate::auth::validate_session;
use crate::db::AppState;
use crate::error::Error;
use crate::ledger;
use crate::models::{BuyRequest, Portfolio, SellRequest};

/// Buy shares at the quoted price in the request body. Returns the updated
/// portfolio. The ledger rejects malformed, unfunded, or unknown-account
/// orders before touching any state.
#[axum::debug_handler]
pub async fn buy_stock(
    State(state): State<AppState>,
    session: Session,
    Json(order): Json<BuyRequest>,
) -> Result<(StatusCode, Json<Portfolio>), Error> {
    let user = validate_session(session).await?;

    let mut conn = state.db.0.lock().await;
    let portfolio = ledger::buy(
        &mut conn,
        &user.id,
        &order.symbol,
        order.name.as_deref(),
        order.shares,
        order.price,
    )?;

    Ok((StatusCode::CREATED, Json(portfolio)))
}

/// Sell shares at the quoted price in the request body. Returns the updated
/// portfolio.
pub async fn sell_stock(
    State(state): State<AppState>,
    session: Session,
    Json(order): Json<SellRequest>,
) -> Result<(StatusCode, Json<Portfolio>), Error> {
    let user = validate_session(session).await?;

    let mut conn = state.db.0.lock().await;
    let portfolio = ledger::sell(&mut conn, &user.id, &order.symbol, order.shares, order.price)?;

    Ok((StatusCode::CREATED, Json(portfolio)))
}
