use std::sync::Arc;
use tokio::sync::Mutex;

use crate::quotes::QuoteSource;

/// Shared SQLite handle. All ledger mutations go through this single
/// connection, so trades for any user are serialized behind the mutex and
/// committed inside SQL transactions.
#[derive(Clone)]
pub struct DatabasePool(pub Arc<Mutex<rusqlite::Connection>>);

impl DatabasePool {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }
}

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabasePool,
    pub quotes: Arc<dyn QuoteSource>,
    pub starting_cash: f64,
}

pub fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            cash REAL NOT NULL
        )",
        [],
    )?;

    // One row per user, created lazily on the first buy.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS portfolios (
            user_id TEXT PRIMARY KEY,
            total_invested REAL NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES accounts(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS holdings (
            user_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            shares INTEGER NOT NULL,
            average_price REAL NOT NULL,
            purchase_date TEXT NOT NULL,
            PRIMARY KEY (user_id, symbol),
            FOREIGN KEY (user_id) REFERENCES portfolios(user_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            trade_type TEXT NOT NULL,
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL,
            price REAL NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES accounts(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS watchlists (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES accounts(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS watchlist_stocks (
            watchlist_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            added_on TEXT NOT NULL,
            PRIMARY KEY (watchlist_id, symbol),
            FOREIGN KEY (watchlist_id) REFERENCES watchlists(id)
        )",
        [],
    )?;

    Ok(())
}
