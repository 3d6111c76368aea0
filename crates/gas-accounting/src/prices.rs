//! SOL/USD pricing for a sync window (candle series → spot → fallback)
//! plus the USD→local-currency exchange rate
//!
//! One bulk candle fetch covers the whole window so aggregation never pays
//! one price lookup per transaction. Every failure degrades to the next
//! source; quotes built from the configured default carry
//! `PriceSource::Fallback` so downstream can tell they are estimates.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::constants;
use crate::error::SyncError;
use crate::retry::{RetryPolicy, with_retry};

/// Where a quote came from. `Fallback` marks an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Candle,
    Spot,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceQuote {
    pub usd_per_sol: f64,
    pub source: PriceSource,
}

/// One hourly candle; the price is the open/close midpoint.
#[derive(Debug, Clone, Copy)]
pub struct Candle {
    pub open_ms: i64,
    pub close_ms: i64,
    pub mid_price: f64,
}

/// CoinGecko simple price response
#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    solana: Option<SolanaPrice>,
}

#[derive(Debug, Deserialize)]
struct SolanaPrice {
    usd: f64,
}

/// Binance ticker response: {"symbol":"SOLUSDT","price":"172.50000000"}
#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

/// open.er-api.com response (only the rate table matters)
#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// Base URLs for the three price APIs, overridable via config.
#[derive(Debug, Clone)]
pub struct PriceEndpoints {
    pub binance_base: String,
    pub coingecko_base: String,
    pub exchange_rate_url: String,
}

impl Default for PriceEndpoints {
    fn default() -> Self {
        Self {
            binance_base: constants::BINANCE_API_BASE.to_string(),
            coingecko_base: constants::COINGECKO_API_BASE.to_string(),
            exchange_rate_url: constants::EXCHANGE_RATE_API.to_string(),
        }
    }
}

/// Price context for one sync run. Built best-effort: a source that fails
/// degrades to the next one, it never aborts the run.
pub struct PriceOracle {
    candles: Vec<Candle>,
    spot_usd: Option<f64>,
    fallback_usd: f64,
    usd_to_local: f64,
    fx_estimated: bool,
}

impl PriceOracle {
    /// Bulk-fetch everything the window needs: hourly candles, a spot price
    /// for gaps, and the USD→local exchange rate.
    pub async fn for_window(
        client: &reqwest::Client,
        endpoints: &PriceEndpoints,
        coingecko_api_key: Option<&str>,
        window_start: i64,
        window_end: i64,
        fallback_usd: f64,
        fallback_fx: f64,
        local_currency: &str,
    ) -> Self {
        let candles = match fetch_candles(client, endpoints, window_start, window_end).await {
            Ok(candles) => {
                println!("[prices] {} hourly candles for the window", candles.len());
                candles
            }
            Err(e) => {
                eprintln!("[prices] candle fetch failed ({}); using spot/fallback", e);
                Vec::new()
            }
        };

        let spot_usd = match fetch_spot_price(client, endpoints, coingecko_api_key).await {
            Ok(price) => Some(price),
            Err(e) => {
                eprintln!(
                    "[prices] spot price fetch failed ({}); fallback ${:.2}",
                    e, fallback_usd
                );
                None
            }
        };

        let (usd_to_local, fx_estimated) =
            match fetch_exchange_rate(client, endpoints, local_currency).await {
                Ok(rate) => (rate, false),
                Err(e) => {
                    eprintln!(
                        "[prices] {} rate fetch failed ({}); fallback {:.2}",
                        local_currency, e, fallback_fx
                    );
                    (fallback_fx, true)
                }
            };

        Self {
            candles,
            spot_usd,
            fallback_usd,
            usd_to_local,
            fx_estimated,
        }
    }

    /// Build an oracle from already-known parts (tests, offline runs).
    pub fn with_sources(
        candles: Vec<Candle>,
        spot_usd: Option<f64>,
        fallback_usd: f64,
        usd_to_local: f64,
    ) -> Self {
        Self {
            candles,
            spot_usd,
            fallback_usd,
            usd_to_local,
            fx_estimated: false,
        }
    }

    /// Mark the exchange rate as a configured default rather than a live one.
    pub fn with_estimated_fx(mut self) -> Self {
        self.fx_estimated = true;
        self
    }

    /// Quote at a transaction timestamp: the containing candle's midpoint,
    /// else the spot price, else the configured default.
    pub fn quote_at(&self, block_time: Option<i64>) -> PriceQuote {
        if let Some(ts) = block_time {
            let ts_ms = ts * 1000;
            if let Some(candle) = self
                .candles
                .iter()
                .find(|c| ts_ms >= c.open_ms && ts_ms <= c.close_ms)
            {
                return PriceQuote {
                    usd_per_sol: candle.mid_price,
                    source: PriceSource::Candle,
                };
            }
        }
        if let Some(spot) = self.spot_usd {
            return PriceQuote {
                usd_per_sol: spot,
                source: PriceSource::Spot,
            };
        }
        PriceQuote {
            usd_per_sol: self.fallback_usd,
            source: PriceSource::Fallback,
        }
    }

    pub fn usd_to_local(&self) -> f64 {
        self.usd_to_local
    }

    /// True when the exchange rate is the configured default
    pub fn fx_estimated(&self) -> bool {
        self.fx_estimated
    }
}

/// Fetch hourly SOLUSDT candles covering [window_start, window_end],
/// paginating past the Binance per-request row limit.
async fn fetch_candles(
    client: &reqwest::Client,
    endpoints: &PriceEndpoints,
    window_start: i64,
    window_end: i64,
) -> Result<Vec<Candle>, SyncError> {
    let policy = RetryPolicy::price_lookup();
    let mut candles = Vec::new();
    let mut cursor_ms = window_start * 1000;
    let end_ms = window_end * 1000;

    while cursor_ms <= end_ms {
        let url = format!(
            "{}{}&startTime={}&endTime={}&limit={}",
            endpoints.binance_base,
            constants::BINANCE_KLINES,
            cursor_ms,
            end_ms,
            constants::BINANCE_KLINES_LIMIT
        );

        let rows: Vec<Vec<serde_json::Value>> =
            with_retry(&policy, || fetch_json(client, &url)).await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            if let Some(candle) = parse_kline(row) {
                candles.push(candle);
            }
        }

        if rows.len() < constants::BINANCE_KLINES_LIMIT {
            break;
        }

        // Advance past the last candle; stop on a non-advancing cursor
        match rows.last().and_then(|r| r.first()).and_then(|v| v.as_i64()) {
            Some(last_open) if last_open > cursor_ms => cursor_ms = last_open + 1,
            _ => break,
        }
    }

    Ok(candles)
}

/// Kline row: [open_time, open, high, low, close, volume, close_time, ...]
/// Prices are returned as strings.
fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 7 {
        return None;
    }
    let open_ms = row[0].as_i64()?;
    let close_ms = row[6].as_i64()?;
    let open: f64 = row[1].as_str()?.parse().ok()?;
    let close: f64 = row[4].as_str()?.parse().ok()?;
    if open <= 0.0 || close <= 0.0 {
        return None;
    }
    Some(Candle {
        open_ms,
        close_ms,
        mid_price: (open + close) / 2.0,
    })
}

/// Current SOL price — tries CoinGecko first, falls back to Binance
async fn fetch_spot_price(
    client: &reqwest::Client,
    endpoints: &PriceEndpoints,
    api_key: Option<&str>,
) -> Result<f64, SyncError> {
    match fetch_spot_coingecko(client, endpoints, api_key).await {
        Ok(price) => Ok(price),
        Err(e) => {
            eprintln!("[prices] CoinGecko failed ({}), trying Binance...", e);
            fetch_spot_binance(client, endpoints).await
        }
    }
}

async fn fetch_spot_coingecko(
    client: &reqwest::Client,
    endpoints: &PriceEndpoints,
    api_key: Option<&str>,
) -> Result<f64, SyncError> {
    let policy = RetryPolicy::price_lookup();
    let url = format!(
        "{}{}",
        endpoints.coingecko_base,
        constants::COINGECKO_SIMPLE_PRICE
    );

    let data: SimplePriceResponse = with_retry(&policy, || async {
        let mut request = client.get(&url).header("Accept", "application/json");
        if let Some(key) = api_key {
            request = request.header("x-cg-demo-api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("request failed: {}", e)))?;
        if response.status().as_u16() == 429 {
            return Err(SyncError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json::<SimplePriceResponse>()
            .await
            .map_err(|e| SyncError::Transport(format!("parse error: {}", e)))
    })
    .await?;

    data.solana
        .map(|s| s.usd)
        .filter(|usd| *usd > 0.0)
        .ok_or_else(|| SyncError::Transport("no SOL price in response".into()))
}

async fn fetch_spot_binance(
    client: &reqwest::Client,
    endpoints: &PriceEndpoints,
) -> Result<f64, SyncError> {
    let policy = RetryPolicy::price_lookup();
    let url = format!("{}{}", endpoints.binance_base, constants::BINANCE_TICKER);

    let ticker: TickerResponse = with_retry(&policy, || fetch_json(client, &url)).await?;
    ticker
        .price
        .parse::<f64>()
        .ok()
        .filter(|p| *p > 0.0)
        .ok_or_else(|| SyncError::Transport("no price in Binance ticker".into()))
}

/// USD→local rate from the open exchange-rate table. USD itself never
/// touches the network.
async fn fetch_exchange_rate(
    client: &reqwest::Client,
    endpoints: &PriceEndpoints,
    currency: &str,
) -> Result<f64, SyncError> {
    if currency.eq_ignore_ascii_case("usd") {
        return Ok(1.0);
    }

    let policy = RetryPolicy::price_lookup();
    let data: RatesResponse =
        with_retry(&policy, || fetch_json(client, &endpoints.exchange_rate_url)).await?;

    data.rates
        .get(&currency.to_uppercase())
        .copied()
        .filter(|rate| *rate > 0.0)
        .ok_or_else(|| SyncError::Transport(format!("no {} rate in response", currency)))
}

async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SyncError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| SyncError::Transport(format!("request failed: {}", e)))?;

    if response.status().as_u16() == 429 {
        return Err(SyncError::RateLimited);
    }
    if !response.status().is_success() {
        return Err(SyncError::Transport(format!("HTTP {}", response.status())));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SyncError::Transport(format!("parse error: {}", e)))
}
