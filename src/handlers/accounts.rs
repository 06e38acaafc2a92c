use axum::{extract::State, http::StatusCode, Json};
use tower_sessions::Session;

use crate::auth::validate_session;
use crate::db::AppState;
use crate::error::Error;
use crate::ledger;
use crate::models::Account;

#[axum::debug_handler]
/// Gets the session user's account.
pub async fn get_account(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Account>), Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    let account = ledger::account(&conn, &user.id)?;

    Ok((StatusCode::OK, Json(account)))
}
