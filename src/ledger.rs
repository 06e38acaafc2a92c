use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Account, Holding, Portfolio, TradeType, Transaction};

/// Execute a buy order. Validation happens before any read or write; the
/// cash debit, holding update, portfolio bump, and transaction record all
/// commit together or not at all.
pub fn buy(
    conn: &mut Connection,
    user_id: &str,
    symbol: &str,
    name: Option<&str>,
    shares: i64,
    price: f64,
) -> Result<Portfolio, Error> {
    validate_order(shares, price)?;
    let total_cost = shares as f64 * price;
    let now = Utc::now();

    let tx = conn.transaction()?;

    let cash: f64 = tx
        .query_row("SELECT cash FROM accounts WHERE id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("account {user_id} not found")))?;

    if cash < total_cost {
        return Err(Error::InsufficientFunds);
    }

    tx.execute(
        "UPDATE accounts SET cash = cash - ?1 WHERE id = ?2",
        params![total_cost, user_id],
    )?;

    // The portfolio row appears on the user's first buy.
    tx.execute(
        "INSERT INTO portfolios (user_id, total_invested, last_updated) VALUES (?1, 0, ?2)
         ON CONFLICT(user_id) DO NOTHING",
        params![user_id, now],
    )?;

    let held: Option<(i64, f64)> = tx
        .query_row(
            "SELECT shares, average_price FROM holdings WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match held {
        Some((old_shares, old_avg)) => {
            // Weighted average: total dollars invested over total shares
            // held, not a plain mean of the prices paid. Computed here in
            // f64 rather than in integer SQL arithmetic so repeated partial
            // buys don't drift. `purchase_date` stays as it was.
            let new_shares = old_shares + shares;
            let new_avg = (old_shares as f64 * old_avg + total_cost) / new_shares as f64;
            tx.execute(
                "UPDATE holdings SET shares = ?1, average_price = ?2
                 WHERE user_id = ?3 AND symbol = ?4",
                params![new_shares, new_avg, user_id, symbol],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO holdings (user_id, symbol, name, shares, average_price, purchase_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id, symbol, name.unwrap_or(symbol), shares, price, now],
            )?;
        }
    }

    tx.execute(
        "UPDATE portfolios SET total_invested = total_invested + ?1, last_updated = ?2
         WHERE user_id = ?3",
        params![total_cost, now, user_id],
    )?;

    record_trade(&tx, user_id, TradeType::Buy, symbol, shares, price, total_cost, now)?;

    let portfolio = fetch_portfolio(&tx, user_id)?
        .ok_or_else(|| Error::NotFound(format!("portfolio for {user_id} not found")))?;
    tx.commit()?;

    Ok(portfolio)
}

/// Execute a sell order. Selling the entire position deletes the holding;
/// a partial sell decrements shares and leaves the average price of the
/// remainder untouched. `total_invested` is never reduced.
pub fn sell(
    conn: &mut Connection,
    user_id: &str,
    symbol: &str,
    shares: i64,
    price: f64,
) -> Result<Portfolio, Error> {
    validate_order(shares, price)?;
    let sale_amount = shares as f64 * price;
    let now = Utc::now();

    let tx = conn.transaction()?;

    let has_portfolio: Option<String> = tx
        .query_row(
            "SELECT user_id FROM portfolios WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    if has_portfolio.is_none() {
        return Err(Error::NotFound(format!("portfolio for {user_id} not found")));
    }

    let held: i64 = tx
        .query_row(
            "SELECT shares FROM holdings WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("no holding in {symbol}")))?;

    if held < shares {
        return Err(Error::InsufficientShares);
    }

    let credited = tx.execute(
        "UPDATE accounts SET cash = cash + ?1 WHERE id = ?2",
        params![sale_amount, user_id],
    )?;
    if credited == 0 {
        return Err(Error::NotFound(format!("account {user_id} not found")));
    }

    if held == shares {
        tx.execute(
            "DELETE FROM holdings WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
        )?;
    } else {
        tx.execute(
            "UPDATE holdings SET shares = shares - ?1 WHERE user_id = ?2 AND symbol = ?3",
            params![shares, user_id, symbol],
        )?;
    }

    tx.execute(
        "UPDATE portfolios SET last_updated = ?1 WHERE user_id = ?2",
        params![now, user_id],
    )?;

    record_trade(&tx, user_id, TradeType::Sell, symbol, shares, price, sale_amount, now)?;

    let portfolio = fetch_portfolio(&tx, user_id)?
        .ok_or_else(|| Error::NotFound(format!("portfolio for {user_id} not found")))?;
    tx.commit()?;

    Ok(portfolio)
}

pub fn account(conn: &Connection, user_id: &str) -> Result<Account, Error> {
    conn.query_row(
        "SELECT id, cash FROM accounts WHERE id = ?1",
        [user_id],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                cash_balance: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("account {user_id} not found")))
}

/// Raw portfolio snapshot, without live quotes.
pub fn portfolio(conn: &Connection, user_id: &str) -> Result<Portfolio, Error> {
    fetch_portfolio(conn, user_id)?
        .ok_or_else(|| Error::NotFound(format!("portfolio for {user_id} not found")))
}

/// Transaction history, most recent first. Unknown users get an empty list.
pub fn transactions(conn: &Connection, user_id: &str) -> Result<Vec<Transaction>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id, trade_type, symbol, shares, price, amount, date
         FROM transactions
         WHERE user_id = ?1
         ORDER BY date DESC, rowid DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(Transaction {
                id: row.get(0)?,
                user: user_id.to_string(),
                trade_type: row.get(1)?,
                symbol: row.get(2)?,
                shares: row.get(3)?,
                price: row.get(4)?,
                amount: row.get(5)?,
                date: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn fetch_portfolio(conn: &Connection, user_id: &str) -> Result<Option<Portfolio>, Error> {
    let meta: Option<(f64, DateTime<Utc>)> = conn
        .query_row(
            "SELECT total_invested, last_updated FROM portfolios WHERE user_id = ?1",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((total_invested, last_updated)) = meta else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT symbol, name, shares, average_price, purchase_date
         FROM holdings
         WHERE user_id = ?1
         ORDER BY rowid",
    )?;
    let holdings = stmt
        .query_map([user_id], |row| {
            Ok(Holding {
                symbol: row.get(0)?,
                name: row.get(1)?,
                shares: row.get(2)?,
                average_price: row.get(3)?,
                purchase_date: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Portfolio {
        user: user_id.to_string(),
        holdings,
        total_invested,
        last_updated,
    }))
}

#[allow(clippy::too_many_arguments)]
fn record_trade(
    conn: &Connection,
    user_id: &str,
    trade_type: TradeType,
    symbol: &str,
    shares: i64,
    price: f64,
    amount: f64,
    date: DateTime<Utc>,
) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO transactions (id, user_id, trade_type, symbol, shares, price, amount, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            Uuid::new_v4().to_string(),
            user_id,
            trade_type,
            symbol,
            shares,
            price,
            amount,
            date
        ],
    )?;
    Ok(())
}

fn validate_order(shares: i64, price: f64) -> Result<(), Error> {
    if shares <= 0 {
        return Err(Error::InvalidOrder(
            "shares must be a positive whole number".to_string(),
        ));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::InvalidOrder(
            "price must be a positive number".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DatabasePool};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn seed_account(conn: &Connection, user: &str, cash: f64) {
        conn.execute(
            "INSERT INTO accounts (id, cash) VALUES (?1, ?2)",
            params![user, cash],
        )
        .unwrap();
    }

    /// Everything observable about a user's ledger state, for
    /// before/after comparisons around rejected orders.
    fn snapshot(conn: &Connection, user: &str) -> (Account, Option<Portfolio>, Vec<Transaction>) {
        (
            account(conn, user).unwrap(),
            fetch_portfolio(conn, user).unwrap(),
            transactions(conn, user).unwrap(),
        )
    }

    #[test]
    fn first_buy_creates_portfolio_and_holding() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);

        let p = buy(&mut conn, "alice", "AAPL", Some("Apple Inc."), 10, 100.0).unwrap();

        assert_eq!(p.holdings.len(), 1);
        assert_eq!(p.holdings[0].symbol, "AAPL");
        assert_eq!(p.holdings[0].name, "Apple Inc.");
        assert_eq!(p.holdings[0].shares, 10);
        assert_eq!(p.holdings[0].average_price, 100.0);
        assert_eq!(p.total_invested, 1000.0);
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 9000.0);
    }

    #[test]
    fn portfolio_is_missing_until_first_buy() {
        let conn = test_conn();
        seed_account(&conn, "alice", 1000.0);
        assert!(matches!(
            portfolio(&conn, "alice"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn repeat_buy_recomputes_weighted_average() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);

        buy(&mut conn, "alice", "AAPL", None, 10, 100.0).unwrap();
        let p = buy(&mut conn, "alice", "AAPL", None, 10, 200.0).unwrap();

        assert_eq!(p.holdings.len(), 1);
        assert_eq!(p.holdings[0].shares, 20);
        assert_eq!(p.holdings[0].average_price, 150.0);
    }

    #[test]
    fn average_price_equals_invested_over_shares_across_many_buys() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 100_000.0);

        let lots: &[(i64, f64)] = &[(3, 10.5), (7, 11.25), (5, 9.8), (1, 14.0), (13, 10.05)];
        let mut invested = 0.0;
        let mut total_shares = 0;
        let mut p = None;
        for &(shares, price) in lots {
            invested += shares as f64 * price;
            total_shares += shares;
            p = Some(buy(&mut conn, "alice", "TSLA", None, shares, price).unwrap());
        }

        let holding = &p.unwrap().holdings[0];
        assert_eq!(holding.shares, total_shares);
        let expected = invested / total_shares as f64;
        assert!((holding.average_price - expected).abs() < 1e-9);
    }

    #[test]
    fn repeat_buy_keeps_purchase_date() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);

        let first = buy(&mut conn, "alice", "AAPL", None, 5, 100.0).unwrap();
        let original_date = first.holdings[0].purchase_date;
        let second = buy(&mut conn, "alice", "AAPL", None, 5, 120.0).unwrap();

        assert_eq!(second.holdings[0].purchase_date, original_date);
    }

    #[test]
    fn buy_without_account_is_not_found() {
        let mut conn = test_conn();
        assert!(matches!(
            buy(&mut conn, "ghost", "AAPL", None, 1, 100.0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn overdrawing_buy_is_rejected_without_mutation() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 1000.0);
        buy(&mut conn, "alice", "AAPL", None, 5, 100.0).unwrap();

        let before = snapshot(&conn, "alice");
        let result = buy(&mut conn, "alice", "MSFT", None, 100, 100.0);

        assert!(matches!(result, Err(Error::InsufficientFunds)));
        assert_eq!(snapshot(&conn, "alice"), before);
    }

    #[test]
    fn invalid_orders_are_rejected_before_any_mutation() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 1000.0);

        let before = snapshot(&conn, "alice");
        for (shares, price) in [(0, 100.0), (-5, 100.0), (5, 0.0), (5, -1.0), (5, f64::NAN)] {
            assert!(matches!(
                buy(&mut conn, "alice", "AAPL", None, shares, price),
                Err(Error::InvalidOrder(_))
            ));
            assert!(matches!(
                sell(&mut conn, "alice", "AAPL", shares, price),
                Err(Error::InvalidOrder(_))
            ));
        }
        assert_eq!(snapshot(&conn, "alice"), before);
    }

    #[test]
    fn partial_sell_reduces_shares_and_keeps_average() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);
        buy(&mut conn, "alice", "AAPL", None, 10, 100.0).unwrap();

        let p = sell(&mut conn, "alice", "AAPL", 4, 150.0).unwrap();

        assert_eq!(p.holdings.len(), 1);
        assert_eq!(p.holdings[0].shares, 6);
        assert_eq!(p.holdings[0].average_price, 100.0);
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 9600.0);
    }

    #[test]
    fn selling_everything_removes_the_holding() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);
        buy(&mut conn, "alice", "AAPL", None, 10, 100.0).unwrap();

        let p = sell(&mut conn, "alice", "AAPL", 10, 120.0).unwrap();

        assert!(p.holdings.is_empty());
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 10_200.0);
    }

    #[test]
    fn sell_does_not_reduce_total_invested() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);
        buy(&mut conn, "alice", "AAPL", None, 10, 100.0).unwrap();

        let p = sell(&mut conn, "alice", "AAPL", 10, 120.0).unwrap();

        assert_eq!(p.total_invested, 1000.0);
    }

    #[test]
    fn overselling_is_rejected_without_mutation() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);
        buy(&mut conn, "alice", "AAPL", None, 10, 100.0).unwrap();

        let before = snapshot(&conn, "alice");
        let result = sell(&mut conn, "alice", "AAPL", 11, 100.0);

        assert!(matches!(result, Err(Error::InsufficientShares)));
        assert_eq!(snapshot(&conn, "alice"), before);
    }

    #[test]
    fn selling_an_unheld_symbol_is_not_found() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 10_000.0);

        // No portfolio at all yet.
        assert!(matches!(
            sell(&mut conn, "alice", "AAPL", 1, 100.0),
            Err(Error::NotFound(_))
        ));

        // Portfolio exists but the symbol is not held.
        buy(&mut conn, "alice", "MSFT", None, 1, 100.0).unwrap();
        assert!(matches!(
            sell(&mut conn, "alice", "AAPL", 1, 100.0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn buy_then_sell_round_trip_balances_cash_and_audit_log() {
        let mut conn = test_conn();
        seed_account(&conn, "alice", 1100.0);

        let p = buy(&mut conn, "alice", "AAPL", Some("Apple Inc."), 5, 100.0).unwrap();
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 600.0);
        assert_eq!(p.holdings[0].shares, 5);
        assert_eq!(p.holdings[0].average_price, 100.0);

        let p = buy(&mut conn, "alice", "AAPL", None, 5, 120.0).unwrap();
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 0.0);
        assert_eq!(p.holdings[0].shares, 10);
        assert_eq!(p.holdings[0].average_price, 110.0);

        let p = sell(&mut conn, "alice", "AAPL", 10, 130.0).unwrap();
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 1300.0);
        assert!(p.holdings.is_empty());

        // Most recent first, amounts matching each executed trade.
        let log = transactions(&conn, "alice").unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].trade_type, TradeType::Sell);
        assert_eq!(log[0].amount, 1300.0);
        assert_eq!(log[1].trade_type, TradeType::Buy);
        assert_eq!(log[1].amount, 600.0);
        assert_eq!(log[2].trade_type, TradeType::Buy);
        assert_eq!(log[2].amount, 500.0);
        assert!(log.iter().all(|t| t.symbol == "AAPL"));
    }

    #[test]
    fn transactions_for_unknown_user_are_empty() {
        let conn = test_conn();
        assert!(transactions(&conn, "ghost").unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_buys_cannot_jointly_overdraw() {
        let pool = DatabasePool::open_in_memory().unwrap();
        {
            let conn = pool.0.lock().await;
            seed_account(&conn, "alice", 1000.0);
        }

        // Each buy costs 600; the account can only fund one of them.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = pool.0.lock().await;
                buy(&mut conn, "alice", "AAPL", None, 6, 100.0)
            }));
        }

        let mut successes = 0;
        let mut rejections = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::InsufficientFunds) => rejections += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(rejections, 1);
        let conn = pool.0.lock().await;
        assert_eq!(account(&conn, "alice").unwrap().cash_balance, 400.0);
        assert_eq!(transactions(&conn, "alice").unwrap().len(), 1);
    }
}
