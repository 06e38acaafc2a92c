use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A quote for one symbol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

/// A symbol search hit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
}

/// Where quotes come from. Injected into the app state so handlers and the
/// valuation layer don't care whether prices are live or fixtures.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote, Error>;
    async fn search(&self, query: &str) -> Result<Vec<SymbolInfo>, Error>;
}

lazy_static::lazy_static! {
    static ref FIXTURE_QUOTES: Vec<(&'static str, &'static str, f64)> = vec![
        ("AAPL", "Apple Inc.", 189.50),
        ("MSFT", "Microsoft Corporation", 415.20),
        ("GOOGL", "Alphabet Inc.", 162.75),
        ("AMZN", "Amazon.com Inc.", 183.40),
        ("TSLA", "Tesla Inc.", 244.10),
        ("META", "Meta Platforms Inc.", 502.30),
        ("NVDA", "NVIDIA Corporation", 121.85),
        ("NFLX", "Netflix Inc.", 645.90),
        ("DIS", "The Walt Disney Company", 101.15),
        ("JPM", "JPMorgan Chase & Co.", 198.65),
    ];
}

/// Fixture-backed source: a fixed symbol table with fixed prices. Serves
/// the demo deployment (no API key) and the tests.
pub struct StaticQuoteSource;

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<Quote, Error> {
        let wanted = symbol.to_uppercase();
        FIXTURE_QUOTES
            .iter()
            .find(|(sym, _, _)| *sym == wanted)
            .map(|(sym, name, price)| Quote {
                symbol: (*sym).to_string(),
                name: (*name).to_string(),
                price: *price,
            })
            .ok_or(Error::QuoteUnavailable(wanted))
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolInfo>, Error> {
        let wanted = query.to_uppercase();
        Ok(FIXTURE_QUOTES
            .iter()
            .filter(|(sym, name, _)| {
                sym.contains(&wanted) || name.to_uppercase().contains(&wanted)
            })
            .map(|(sym, name, _)| SymbolInfo {
                symbol: (*sym).to_string(),
                name: (*name).to_string(),
            })
            .collect())
    }
}
