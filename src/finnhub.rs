use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::Error;
use crate::quotes::{Quote, QuoteSource, SymbolInfo};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Quote payload returned by Finnhub. `c` is the current price.
#[derive(Deserialize, Clone)]
struct FinnhubQuote {
    c: f64,
}

#[derive(Deserialize)]
struct FinnhubProfile {
    name: Option<String>,
}

#[derive(Deserialize)]
struct FinnhubSearchResponse {
    result: Vec<FinnhubSearchHit>,
}

#[derive(Deserialize)]
struct FinnhubSearchHit {
    symbol: String,
    description: String,
}

/// Live quote source backed by the Finnhub REST API. Quotes are cached
/// per symbol for five minutes so portfolio refreshes don't hammer the API.
pub struct FinnhubQuoteSource {
    client: reqwest::Client,
    api_key: String,
    cache: Mutex<HashMap<String, (Quote, Instant)>>,
}

impl FinnhubQuoteSource {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = Url::parse(&format!("{}/{}", BASE_URL, path))
            .map_err(|_| Error::QuoteUnavailable(path.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("token", &self.api_key);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        symbol: &str,
    ) -> Result<T, Error> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("finnhub request for {} failed: {}", symbol, e);
                Error::QuoteUnavailable(symbol.to_string())
            })?;

        if !response.status().is_success() {
            tracing::warn!("finnhub returned HTTP {} for {}", response.status(), symbol);
            return Err(Error::QuoteUnavailable(symbol.to_string()));
        }

        response
            .json::<T>()
            .await
            .map_err(|_| Error::QuoteUnavailable(symbol.to_string()))
    }
}

#[async_trait]
impl QuoteSource for FinnhubQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<Quote, Error> {
        let symbol = symbol.to_uppercase();
        let now = Instant::now();

        {
            let cache = self.cache.lock().await;
            if let Some((quote, fetched_at)) = cache.get(&symbol) {
                if now.duration_since(*fetched_at) < CACHE_TTL {
                    return Ok(quote.clone());
                }
            }
        }

        let quote_url = self.endpoint("quote", &[("symbol", symbol.as_str())])?;
        let raw: FinnhubQuote = self.get_json(quote_url, &symbol).await?;
        if raw.c <= 0.0 {
            return Err(Error::QuoteUnavailable(symbol));
        }

        // The profile call is best-effort; a missing company name falls
        // back to the symbol itself.
        let profile_url = self.endpoint("stock/profile2", &[("symbol", symbol.as_str())])?;
        let name = match self.get_json::<FinnhubProfile>(profile_url, &symbol).await {
            Ok(profile) => profile.name.unwrap_or_else(|| symbol.clone()),
            Err(_) => symbol.clone(),
        };

        let quote = Quote {
            symbol: symbol.clone(),
            name,
            price: raw.c,
        };

        self.cache
            .lock()
            .await
            .insert(symbol, (quote.clone(), now));

        Ok(quote)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolInfo>, Error> {
        let url = self.endpoint("search", &[("q", query)])?;
        let response: FinnhubSearchResponse = self.get_json(url, query).await?;
        Ok(response
            .result
            .into_iter()
            .map(|hit| SymbolInfo {
                symbol: hit.symbol,
                name: hit.description,
            })
            .collect())
    }
}
