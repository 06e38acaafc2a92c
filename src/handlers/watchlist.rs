use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::validate_session;
use crate::db::AppState;
use crate::error::Error;
use crate::models::{WatchedStock, Watchlist};

#[derive(Debug, Deserialize)]
pub struct CreateWatchlistRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStockRequest {
    pub symbol: String,
    pub name: Option<String>,
}

/// All of the user's watchlists with their stocks.
pub async fn get_watchlists(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Watchlist>>), Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    let lists = list_watchlists(&conn, &user.id)?;

    Ok((StatusCode::OK, Json(lists)))
}

pub async fn create_watchlist(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateWatchlistRequest>,
) -> Result<(StatusCode, Json<Watchlist>), Error> {
    let user = validate_session(session).await?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidOrder("watchlist name is required".to_string()));
    }

    let conn = state.db.0.lock().await;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO watchlists (id, user_id, name) VALUES (?1, ?2, ?3)",
        params![id, user.id, name],
    )?;

    Ok((
        StatusCode::CREATED,
        Json(Watchlist {
            id,
            name: name.to_string(),
            stocks: Vec::new(),
        }),
    ))
}

/// Add a stock to a watchlist. Duplicates within one list are rejected.
pub async fn add_stock(
    State(state): State<AppState>,
    session: Session,
    Path(list_id): Path<String>,
    Json(req): Json<AddStockRequest>,
) -> Result<(StatusCode, Json<Watchlist>), Error> {
    let user = validate_session(session).await?;

    let symbol = req.symbol.trim();
    if symbol.is_empty() {
        return Err(Error::InvalidOrder("stock symbol is required".to_string()));
    }

    let conn = state.db.0.lock().await;
    require_owned(&conn, &user.id, &list_id)?;

    let already_watched: Option<String> = conn
        .query_row(
            "SELECT symbol FROM watchlist_stocks WHERE watchlist_id = ?1 AND symbol = ?2",
            params![list_id, symbol],
            |row| row.get(0),
        )
        .optional()?;
    if already_watched.is_some() {
        return Err(Error::InvalidOrder(
            "stock already in watchlist".to_string(),
        ));
    }

    conn.execute(
        "INSERT INTO watchlist_stocks (watchlist_id, symbol, name, added_on)
         VALUES (?1, ?2, ?3, ?4)",
        params![list_id, symbol, req.name.as_deref().unwrap_or(symbol), Utc::now()],
    )?;

    let list = fetch_watchlist(&conn, &user.id, &list_id)?
        .ok_or_else(|| Error::NotFound("watchlist not found".to_string()))?;
    Ok((StatusCode::OK, Json(list)))
}

pub async fn remove_stock(
    State(state): State<AppState>,
    session: Session,
    Path((list_id, symbol)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Watchlist>), Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    require_owned(&conn, &user.id, &list_id)?;

    let removed = conn.execute(
        "DELETE FROM watchlist_stocks WHERE watchlist_id = ?1 AND symbol = ?2",
        params![list_id, symbol],
    )?;
    if removed == 0 {
        return Err(Error::NotFound("stock not found in watchlist".to_string()));
    }

    let list = fetch_watchlist(&conn, &user.id, &list_id)?
        .ok_or_else(|| Error::NotFound("watchlist not found".to_string()))?;
    Ok((StatusCode::OK, Json(list)))
}

/// Delete a watchlist. The Default list is permanent.
pub async fn delete_watchlist(
    State(state): State<AppState>,
    session: Session,
    Path(list_id): Path<String>,
) -> Result<StatusCode, Error> {
    let user = validate_session(session).await?;

    let conn = state.db.0.lock().await;
    let name: String = conn
        .query_row(
            "SELECT name FROM watchlists WHERE id = ?1 AND user_id = ?2",
            params![list_id, user.id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound("watchlist not found".to_string()))?;

    if name == "Default" {
        return Err(Error::InvalidOrder(
            "cannot delete the default watchlist".to_string(),
        ));
    }

    conn.execute(
        "DELETE FROM watchlist_stocks WHERE watchlist_id = ?1",
        [&list_id],
    )?;
    conn.execute("DELETE FROM watchlists WHERE id = ?1", [&list_id])?;

    Ok(StatusCode::NO_CONTENT)
}

fn require_owned(conn: &Connection, user_id: &str, list_id: &str) -> Result<(), Error> {
    conn.query_row(
        "SELECT id FROM watchlists WHERE id = ?1 AND user_id = ?2",
        params![list_id, user_id],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .map(|_| ())
    .ok_or_else(|| Error::NotFound("watchlist not found".to_string()))
}

fn list_watchlists(conn: &Connection, user_id: &str) -> Result<Vec<Watchlist>, Error> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM watchlists WHERE user_id = ?1 ORDER BY rowid")?;
    let lists = stmt
        .query_map([user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::with_capacity(lists.len());
    for (id, name) in lists {
        let stocks = fetch_stocks(conn, &id)?;
        result.push(Watchlist { id, name, stocks });
    }
    Ok(result)
}

fn fetch_watchlist(
    conn: &Connection,
    user_id: &str,
    list_id: &str,
) -> Result<Option<Watchlist>, Error> {
    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT id, name FROM watchlists WHERE id = ?1 AND user_id = ?2",
            params![list_id, user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((id, name)) = found else {
        return Ok(None);
    };

    let stocks = fetch_stocks(conn, &id)?;
    Ok(Some(Watchlist { id, name, stocks }))
}

fn fetch_stocks(conn: &Connection, list_id: &str) -> Result<Vec<WatchedStock>, Error> {
    let mut stmt = conn.prepare(
        "SELECT symbol, name, added_on FROM watchlist_stocks
         WHERE watchlist_id = ?1 ORDER BY rowid",
    )?;
    let stocks = stmt
        .query_map([list_id], |row| {
            Ok(WatchedStock {
                symbol: row.get(0)?,
                name: row.get(1)?,
                added_on: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stocks)
}
