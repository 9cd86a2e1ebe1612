//! Market-data provider client.
//!
//! The provider is treated as authoritative: whatever price it returns is
//! the price a trade executes at. Lookups are awaited inline with a client
//! timeout and no retry.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PROVIDER_URL: &str = "https://cloud.iexapis.com";

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
    #[error("symbol is invalid: {0}")]
    UnknownSymbol(String),
}

/// Point-in-time quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

/// Wire format of the provider's quote endpoint.
#[derive(Debug, Deserialize)]
struct ProviderQuote {
    #[serde(rename = "companyName")]
    company_name: String,
    #[serde(rename = "latestPrice")]
    latest_price: f64,
    symbol: String,
}

impl TryFrom<ProviderQuote> for Quote {
    type Error = QuoteError;

    fn try_from(raw: ProviderQuote) -> Result<Self, QuoteError> {
        if !raw.latest_price.is_finite() || raw.latest_price <= 0.0 {
            return Err(QuoteError::Parse(format!(
                "non-positive price {} for {}",
                raw.latest_price, raw.symbol
            )));
        }
        Ok(Quote {
            symbol: raw.symbol,
            name: raw.company_name,
            price: raw.latest_price,
        })
    }
}

pub struct QuoteClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl QuoteClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Fetch the current quote for a symbol.
    ///
    /// A provider 404 means the symbol does not exist and surfaces as
    /// `UnknownSymbol`; transport failures bubble up as `Request`.
    pub async fn lookup(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let symbol = normalize_symbol(symbol);
        let url = format!(
            "{}/stable/stock/{}/quote?token={}",
            self.base_url, symbol, self.api_key
        );

        debug!("looking up quote for {}", symbol);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(QuoteError::UnknownSymbol(symbol));
        }

        let raw: ProviderQuote = response.error_for_status()?.json().await?;
        Quote::try_from(raw)
    }
}

/// Symbols are matched case-insensitively by the provider and stored
/// uppercase on our side.
fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_symbols_to_uppercase() {
        assert_eq!(normalize_symbol("aapl"), "AAPL");
        assert_eq!(normalize_symbol("  nflx "), "NFLX");
        assert_eq!(normalize_symbol("BRK.B"), "BRK.B");
    }

    #[test]
    fn parses_provider_payload() {
        let raw: ProviderQuote = serde_json::from_str(
            r#"{"companyName": "Apple Inc", "latestPrice": 150.0, "symbol": "AAPL"}"#,
        )
        .unwrap();
        let quote = Quote::try_from(raw).unwrap();
        assert_eq!(
            quote,
            Quote {
                symbol: "AAPL".to_string(),
                name: "Apple Inc".to_string(),
                price: 150.0,
            }
        );
    }

    #[test]
    fn rejects_non_positive_price() {
        let raw: ProviderQuote = serde_json::from_str(
            r#"{"companyName": "Ghost Corp", "latestPrice": 0.0, "symbol": "GHST"}"#,
        )
        .unwrap();
        assert!(matches!(Quote::try_from(raw), Err(QuoteError::Parse(_))));
    }

    #[test]
    fn ignores_extra_provider_fields() {
        let raw: ProviderQuote = serde_json::from_str(
            r#"{"companyName": "Netflix Inc", "latestPrice": 400.5, "symbol": "NFLX", "volume": 123456, "peRatio": 40.1}"#,
        )
        .unwrap();
        assert_eq!(Quote::try_from(raw).unwrap().price, 400.5);
    }
}
