use futures_util::future::join_all;

use crate::models::{HoldingView, Portfolio, PortfolioView};
use crate::quotes::QuoteSource;

/// Enrich a raw portfolio snapshot with live quotes. Quote lookups fan out
/// concurrently and fail independently: a holding whose quote is
/// unavailable is valued at its average price (zero unrealized P/L) so one
/// bad symbol never sinks the whole view. Read-only with respect to the
/// ledger.
///
/// Money values are rounded to cents and percentages to two decimals here,
/// once; callers get display-ready numbers.
pub async fn enrich_portfolio(portfolio: &Portfolio, quotes: &dyn QuoteSource) -> PortfolioView {
    let fetched = join_all(
        portfolio
            .holdings
            .iter()
            .map(|holding| quotes.quote(&holding.symbol)),
    )
    .await;

    let mut priced = Vec::with_capacity(portfolio.holdings.len());
    let mut total_market_value = 0.0;
    for (holding, result) in portfolio.holdings.iter().zip(fetched) {
        let current_price = match result {
            Ok(quote) => quote.price,
            Err(e) => {
                tracing::debug!("degrading {} to cost basis: {}", holding.symbol, e);
                holding.average_price
            }
        };
        let market_value = holding.shares as f64 * current_price;
        total_market_value += market_value;
        priced.push((holding, current_price, market_value));
    }

    let holdings = priced
        .into_iter()
        .map(|(holding, current_price, market_value)| {
            let cost_basis = holding.shares as f64 * holding.average_price;
            let allocation = if total_market_value > 0.0 {
                market_value / total_market_value * 100.0
            } else {
                0.0
            };
            HoldingView {
                symbol: holding.symbol.clone(),
                name: holding.name.clone(),
                shares: holding.shares,
                average_price: holding.average_price,
                purchase_date: holding.purchase_date,
                current_price,
                market_value: round2(market_value),
                unrealized_pl: round2(market_value - cost_basis),
                pl_percent: round2(
                    (current_price - holding.average_price) / holding.average_price * 100.0,
                ),
                allocation: round2(allocation),
            }
        })
        .collect();

    PortfolioView {
        user: portfolio.user.clone(),
        holdings,
        total_invested: portfolio.total_invested,
        total_market_value: round2(total_market_value),
        last_updated: portfolio.last_updated,
    }
}

/// Two-decimal rounding, used for both cents and percentages.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Holding;
    use crate::quotes::StaticQuoteSource;
    use chrono::Utc;

    fn holding(symbol: &str, shares: i64, average_price: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            shares,
            average_price,
            purchase_date: Utc::now(),
        }
    }

    fn portfolio(holdings: Vec<Holding>) -> Portfolio {
        Portfolio {
            user: "alice".to_string(),
            holdings,
            total_invested: 0.0,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn computes_market_value_and_unrealized_pl() {
        // AAPL is quoted at 189.50 by the fixture source.
        let p = portfolio(vec![holding("AAPL", 10, 150.0)]);
        let view = enrich_portfolio(&p, &StaticQuoteSource).await;

        let h = &view.holdings[0];
        assert_eq!(h.current_price, 189.50);
        assert_eq!(h.market_value, 1895.0);
        assert_eq!(h.unrealized_pl, 395.0);
        assert_eq!(h.pl_percent, 26.33);
        assert_eq!(h.allocation, 100.0);
        assert_eq!(view.total_market_value, 1895.0);
    }

    #[tokio::test]
    async fn unknown_symbol_degrades_to_cost_basis() {
        let p = portfolio(vec![holding("ZZZZ", 10, 50.0)]);
        let view = enrich_portfolio(&p, &StaticQuoteSource).await;

        let h = &view.holdings[0];
        assert_eq!(h.current_price, 50.0);
        assert_eq!(h.market_value, 500.0);
        assert_eq!(h.unrealized_pl, 0.0);
        assert_eq!(h.pl_percent, 0.0);
    }

    #[tokio::test]
    async fn one_bad_quote_does_not_sink_the_snapshot() {
        let p = portfolio(vec![holding("AAPL", 10, 150.0), holding("ZZZZ", 2, 50.0)]);
        let view = enrich_portfolio(&p, &StaticQuoteSource).await;

        assert_eq!(view.holdings.len(), 2);
        assert_eq!(view.holdings[0].market_value, 1895.0);
        assert_eq!(view.holdings[1].market_value, 100.0);
        assert_eq!(view.total_market_value, 1995.0);
    }

    #[tokio::test]
    async fn allocations_sum_to_one_hundred() {
        let p = portfolio(vec![
            holding("AAPL", 10, 150.0),
            holding("MSFT", 5, 400.0),
            holding("DIS", 20, 90.0),
        ]);
        let view = enrich_portfolio(&p, &StaticQuoteSource).await;

        let sum: f64 = view.holdings.iter().map(|h| h.allocation).sum();
        assert!((sum - 100.0).abs() < 0.05);
        assert!(view.holdings.iter().all(|h| h.allocation > 0.0));
    }

    #[tokio::test]
    async fn empty_portfolio_enriches_to_empty_view() {
        let p = portfolio(vec![]);
        let view = enrich_portfolio(&p, &StaticQuoteSource).await;

        assert!(view.holdings.is_empty());
        assert_eq!(view.total_market_value, 0.0);
    }
}
