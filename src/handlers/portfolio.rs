use axum::{extract::State, http::StatusCode, Json};
use tower_sessions::Session;

use crate::auth::validate_session;
use crate::db::AppState;
use crate::error::Error;
use crate::ledger;
use crate::models::{Portfolio, PortfolioView, Transaction};
use crate::valuation::enrich_portfolio;

/// The raw ledger snapshot: holdings at cost, no live quotes.
pub async fn get_portfolio(
    session: Session,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Portfolio>), Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    let portfolio = ledger::portfolio(&conn, &user.id)?;

    Ok((StatusCode::OK, Json(portfolio)))
}

/// The display snapshot: holdings valued against live quotes, degrading
/// per symbol when a quote is unavailable. The database lock is released
/// before any quote request goes out.
pub async fn get_enriched_portfolio(
    session: Session,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<PortfolioView>), Error> {
    let user = validate_session(session).await?;

    let portfolio = {
        let conn = state.db.0.lock().await;
        ledger::portfolio(&conn, &user.id)?
    };

    let view = enrich_portfolio(&portfolio, state.quotes.as_ref()).await;

    Ok((StatusCode::OK, Json(view)))
}

/// Full trade history for the session user, most recent first.
pub async fn get_transaction_history(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Transaction>>), Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    let transactions = ledger::transactions(&conn, &user.id)?;

    Ok((StatusCode::OK, Json(transactions)))
}
