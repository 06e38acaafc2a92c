use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use tower_sessions::Session;

use crate::auth::validate_session;
use crate::db::AppState;
use crate::error::Error;
use crate::quotes::{Quote, SymbolInfo};

/// Search for tradable symbols by ticker or company name.
pub async fn search_stocks(
    State(state): State<AppState>,
    session: Session,
    Path(query): Path<String>,
) -> Result<(StatusCode, Json<Vec<SymbolInfo>>), Error> {
    validate_session(session).await?;

    let results = state.quotes.search(&query).await?;
    Ok((StatusCode::OK, Json(results)))
}

/// Current quote for one symbol.
pub async fn get_stock(
    State(state): State<AppState>,
    session: Session,
    Path(symbol): Path<String>,
) -> Result<(StatusCode, Json<Quote>), Error> {
    validate_session(session).await?;

    let quote = state.quotes.quote(&symbol).await?;
    Ok((StatusCode::OK, Json(quote)))
}
