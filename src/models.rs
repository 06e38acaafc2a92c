use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Account represents a user's brokerage account.
/// Cash is the only balance; it never goes negative after a committed trade.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub cash_balance: f64,
}

/// A position in a single symbol. Holdings with zero shares are deleted,
/// never stored, so presence alone answers "does the user hold X".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub average_price: f64,
    pub purchase_date: DateTime<Utc>,
}

/// A user's portfolio: insertion-ordered holdings plus lifetime capital
/// deployed. `total_invested` only ever grows; sells do not reduce it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub user: String,
    pub holdings: Vec<Holding>,
    pub total_invested: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeType::Buy => "Buy",
            TradeType::Sell => "Sell",
        }
    }
}

impl ToSql for TradeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TradeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "Buy" => Ok(TradeType::Buy),
            "Sell" => Ok(TradeType::Sell),
            other => Err(FromSqlError::Other(
                format!("unknown trade type: {other}").into(),
            )),
        }
    }
}

/// Immutable audit record of one executed trade. Appended on every
/// committed buy/sell, never updated or deleted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

/// Body of POST /buy. `name` falls back to the symbol when omitted.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    pub symbol: String,
    pub name: Option<String>,
    pub shares: i64,
    pub price: f64,
}

/// Body of POST /sell.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SellRequest {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
}

/// A holding enriched with a live quote for display.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingView {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub average_price: f64,
    pub purchase_date: DateTime<Utc>,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pl: f64,
    pub pl_percent: f64,
    pub allocation: f64,
}

/// Display-ready portfolio snapshot produced by the valuation layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub user: String,
    pub holdings: Vec<HoldingView>,
    pub total_invested: f64,
    pub total_market_value: f64,
    pub last_updated: DateTime<Utc>,
}

/// A stock saved to a watchlist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchedStock {
    pub symbol: String,
    pub name: String,
    pub added_on: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub id: String,
    pub name: String,
    pub stocks: Vec<WatchedStock>,
}
