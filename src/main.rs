mod auth;
mod db;
mod error;
mod finnhub;
mod handlers;
mod ledger;
mod models;
mod quotes;
mod valuation;

use std::sync::Arc;

use crate::auth::{get_user_data, login, logout};
use crate::db::{AppState, DatabasePool};
use crate::finnhub::FinnhubQuoteSource;
use crate::handlers::{
    accounts::get_account,
    portfolio::{get_enriched_portfolio, get_portfolio, get_transaction_history},
    stocks::{get_stock, search_stocks},
    trading::{buy_stock, sell_stock},
    watchlist::{add_stock, create_watchlist, delete_watchlist, get_watchlists, remove_stock},
};
use crate::quotes::{QuoteSource, StaticQuoteSource};
use axum::http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE};
use axum::http::HeaderValue;
use axum::{
    routing::{delete, get, post},
    Router,
};
use reqwest::Method;
use rusqlite::Connection;
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_rusqlite_store::RusqliteStore;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument
    let args: Vec<String> = std::env::args().collect();
    let mut log_level = Level::INFO;
    if args.len() >= 2 {
        log_level = match args[1].as_str() {
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    // Initalize dotenv so we can read .env file
    dotenv::dotenv().ok();

    let db_path = dotenv::var("DB_PATH").unwrap_or_else(|_| ".".to_string());

    // Initialize our session store as a SQLite database
    let conn = Connection::open(format!("{}{}", db_path, "/sessions.db"))?;
    let session_store = RusqliteStore::new(conn.into());
    session_store.migrate().await?;

    // Start a task to delete expired sessions every 5 seconds
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(5)),
    );

    // Create session layer with some configuration
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/");

    let origin = dotenv::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

    // Initialize CORS layer
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE])
        .allow_headers(vec![ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE]);

    // Ledger database
    let pool = DatabasePool::new(&format!("{}{}", db_path, "/papertrade.db"))?;

    // Quote source: live when an API key is configured, fixtures otherwise
    let quotes: Arc<dyn QuoteSource> = match dotenv::var("FINNHUB_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::info!("Quotes served live from Finnhub");
            Arc::new(FinnhubQuoteSource::new(key))
        }
        _ => {
            tracing::info!("FINNHUB_API_KEY not set, serving fixture quotes");
            Arc::new(StaticQuoteSource)
        }
    };

    let starting_cash = dotenv::var("STARTING_CASH")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(100_000.0);

    let state = AppState {
        db: pool,
        quotes,
        starting_cash,
    };

    // Build application with routes
    let app = Router::new()
        // Account routes
        .route("/account", get(get_account))
        // Trading routes
        .route("/buy", post(buy_stock))
        .route("/sell", post(sell_stock))
        .route("/portfolio", get(get_portfolio))
        .route("/portfolio/enriched", get(get_enriched_portfolio))
        .route("/transactions", get(get_transaction_history))
        // Stock lookup routes
        .route("/stocks/search/:query", get(search_stocks))
        .route("/stocks/:symbol", get(get_stock))
        // Watchlist routes
        .route("/watchlists", get(get_watchlists).post(create_watchlist))
        .route("/watchlists/:id/add", post(add_stock))
        .route("/watchlists/:id/remove/:symbol", delete(remove_stock))
        .route("/watchlists/:id", delete(delete_watchlist))
        // Auth routes
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/user", get(get_user_data))
        // Database app state
        .with_state(state)
        // Session, CORS, and tracing layers
        .layer(session_layer)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        );

    // Run server
    let port = dotenv::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    deletion_task.await??;

    Ok(())
}
