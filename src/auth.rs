use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::db::AppState;
use crate::error::Error;

const SESSION_KEY: &str = "SESSION";

/// The authenticated user stored in the session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

/// Log in (or sign up) with a username. First login creates the account
/// with the configured starting cash and a Default watchlist.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, Json<SessionUser>), Error> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(Error::InvalidOrder("username is required".to_string()));
    }
    let user = SessionUser {
        id: username.to_lowercase(),
        username: username.to_string(),
    };

    {
        let conn = state.db.0.lock().await;
        let created = conn.execute(
            "INSERT OR IGNORE INTO accounts (id, cash) VALUES (?1, ?2)",
            params![user.id, state.starting_cash],
        )?;
        if created > 0 {
            tracing::info!("created account for {}", user.id);
            conn.execute(
                "INSERT INTO watchlists (id, user_id, name) VALUES (?1, ?2, 'Default')",
                params![Uuid::new_v4().to_string(), user.id],
            )?;
        }
    }

    session.insert(SESSION_KEY, user.clone()).await?;

    Ok((StatusCode::OK, Json(user)))
}

/// Logout by flushing the session.
pub async fn logout(session: Session) -> Result<StatusCode, Error> {
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get the logged-in user from the session.
pub async fn get_user_data(session: Session) -> Result<(StatusCode, Json<SessionUser>), Error> {
    let user = validate_session(session).await?;
    Ok((StatusCode::OK, Json(user)))
}

/// Validate the session and return the user if logged in.
pub async fn validate_session(session: Session) -> Result<SessionUser, Error> {
    let user: SessionUser = session.get(SESSION_KEY).await?.unwrap_or_default();
    if user.id.is_empty() {
        return Err(Error::Unauthorized);
    }
    Ok(user)
}
