//! Configuration for the gas accounting engine

use anyhow::{Context, Result, ensure};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::prices::PriceEndpoints;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub rpc: RpcSection,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub prices: PricesSection,
}

/// Ledger RPC endpoint
#[derive(Debug, Deserialize)]
pub struct RpcSection {
    pub url: String,
}

/// API keys section (all optional; public endpoints work without them)
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub coingecko: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CacheSection {
    /// Path to the SQLite cache database
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

/// Scan pacing and sizing knobs
#[derive(Debug, Deserialize)]
pub struct SyncSection {
    /// Signatures per history page
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Hard cap on signatures scanned per run
    #[serde(default = "default_max_signatures")]
    pub max_signatures: usize,
    /// Transaction bodies fetched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between history pages (ms)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Delay between body batches (ms)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Per-attempt timeout for upstream calls (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// UTC offset in hours for day bucketing (e.g. 8 for UTC+8)
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            max_signatures: default_max_signatures(),
            batch_size: default_batch_size(),
            page_delay_ms: default_page_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            timeout_secs: default_timeout_secs(),
            utc_offset_hours: 0,
        }
    }
}

/// Price conversion settings
#[derive(Debug, Deserialize)]
pub struct PricesSection {
    /// Currency fees are reported in alongside USD
    #[serde(default = "default_local_currency")]
    pub local_currency: String,
    /// SOL/USD used when every price source fails
    #[serde(default = "default_fallback_sol_usd")]
    pub fallback_sol_usd: f64,
    /// USD→local rate used when the FX API is unreachable
    #[serde(default = "default_fallback_fx_rate")]
    pub fallback_fx_rate: f64,
    /// Base URL for the Binance REST API (candles and ticker)
    #[serde(default = "default_binance_api_base")]
    pub binance_api_base: String,
    /// Base URL for the CoinGecko REST API
    #[serde(default = "default_coingecko_api_base")]
    pub coingecko_api_base: String,
    /// Full URL of the USD exchange-rate table
    #[serde(default = "default_exchange_rate_url")]
    pub exchange_rate_url: String,
}

impl Default for PricesSection {
    fn default() -> Self {
        Self {
            local_currency: default_local_currency(),
            fallback_sol_usd: default_fallback_sol_usd(),
            fallback_fx_rate: default_fallback_fx_rate(),
            binance_api_base: default_binance_api_base(),
            coingecko_api_base: default_coingecko_api_base(),
            exchange_rate_url: default_exchange_rate_url(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/gas_cache.sqlite")
}

fn default_page_limit() -> usize {
    constants::SIGNATURE_PAGE_LIMIT
}

fn default_max_signatures() -> usize {
    constants::MAX_MONTH_SIGNATURES
}

fn default_batch_size() -> usize {
    constants::TX_BATCH_SIZE
}

fn default_page_delay_ms() -> u64 {
    constants::PAGE_DELAY_MS
}

fn default_batch_delay_ms() -> u64 {
    constants::BATCH_DELAY_MS
}

fn default_timeout_secs() -> u64 {
    constants::CALL_TIMEOUT_SECS
}

fn default_local_currency() -> String {
    "CNY".to_string()
}

fn default_fallback_sol_usd() -> f64 {
    constants::FALLBACK_SOL_PRICE
}

fn default_fallback_fx_rate() -> f64 {
    constants::FALLBACK_USD_TO_CNY
}

fn default_binance_api_base() -> String {
    constants::BINANCE_API_BASE.to_string()
}

fn default_coingecko_api_base() -> String {
    constants::COINGECKO_API_BASE.to_string()
}

fn default_exchange_rate_url() -> String {
    constants::EXCHANGE_RATE_API.to_string()
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Missing required fields (rpc.url)\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)\n\n\
             See config.toml.example for the expected format."
        })
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Main configuration struct with parsed values
#[derive(Clone)]
pub struct Config {
    /// Ledger RPC endpoint
    pub rpc_url: String,
    /// CoinGecko API key (optional)
    pub coingecko_api_key: Option<String>,
    /// SQLite cache path
    pub cache_path: PathBuf,
    /// Signatures per history page
    pub page_limit: usize,
    /// Hard cap on signatures scanned per run
    pub max_signatures: usize,
    /// Bodies fetched concurrently per batch
    pub batch_size: usize,
    /// Delay between history pages
    pub page_delay: Duration,
    /// Delay between body batches
    pub batch_delay: Duration,
    /// Per-attempt timeout for upstream calls
    pub call_timeout: Duration,
    /// Wallet-local offset for day bucketing
    pub tz: FixedOffset,
    /// Currency fees are reported in alongside USD
    pub local_currency: String,
    /// SOL/USD used when every price source fails
    pub fallback_sol_usd: f64,
    /// USD→local rate used when the FX API is unreachable
    pub fallback_fx_rate: f64,
    /// Price API base URLs
    pub price_endpoints: PriceEndpoints,
}

impl Config {
    /// Create runtime config from the parsed file, with an optional RPC URL
    /// override from the command line.
    pub fn from_file(file_config: &FileConfig, rpc_url: Option<String>) -> Result<Self> {
        let sync = &file_config.sync;
        let prices = &file_config.prices;

        ensure!(sync.page_limit > 0, "sync.page_limit must be positive");
        ensure!(sync.batch_size > 0, "sync.batch_size must be positive");
        ensure!(
            prices.fallback_sol_usd > 0.0,
            "prices.fallback_sol_usd must be positive"
        );
        ensure!(
            prices.fallback_fx_rate > 0.0,
            "prices.fallback_fx_rate must be positive"
        );

        let tz = FixedOffset::east_opt(sync.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid sync.utc_offset_hours: {}", sync.utc_offset_hours))?;

        Ok(Self {
            rpc_url: rpc_url.unwrap_or_else(|| file_config.rpc.url.clone()),
            coingecko_api_key: file_config.api_keys.coingecko.clone(),
            cache_path: file_config.cache.path.clone(),
            page_limit: sync.page_limit,
            max_signatures: sync.max_signatures,
            batch_size: sync.batch_size,
            page_delay: Duration::from_millis(sync.page_delay_ms),
            batch_delay: Duration::from_millis(sync.batch_delay_ms),
            call_timeout: Duration::from_secs(sync.timeout_secs),
            tz,
            local_currency: prices.local_currency.clone(),
            fallback_sol_usd: prices.fallback_sol_usd,
            fallback_fx_rate: prices.fallback_fx_rate,
            price_endpoints: PriceEndpoints {
                binance_base: prices.binance_api_base.clone(),
                coingecko_base: prices.coingecko_api_base.clone(),
                exchange_rate_url: prices.exchange_rate_url.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_file_config(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = minimal_file_config(
            r#"
            [rpc]
            url = "https://api.mainnet-beta.solana.com"
            "#,
        );
        let config = Config::from_file(&file, None).unwrap();

        assert_eq!(config.page_limit, constants::SIGNATURE_PAGE_LIMIT);
        assert_eq!(config.max_signatures, constants::MAX_MONTH_SIGNATURES);
        assert_eq!(config.batch_size, constants::TX_BATCH_SIZE);
        assert_eq!(config.local_currency, "CNY");
        assert_eq!(config.tz, FixedOffset::east_opt(0).unwrap());
        assert!(config.coingecko_api_key.is_none());
        assert_eq!(
            config.price_endpoints.binance_base,
            constants::BINANCE_API_BASE
        );
    }

    #[test]
    fn price_endpoint_bases_are_overridable() {
        let file = minimal_file_config(
            r#"
            [rpc]
            url = "https://rpc.example.com"

            [prices]
            binance_api_base = "http://127.0.0.1:9100"
            coingecko_api_base = "http://127.0.0.1:9100/cg"
            exchange_rate_url = "http://127.0.0.1:9100/rates"
            "#,
        );
        let config = Config::from_file(&file, None).unwrap();
        assert_eq!(config.price_endpoints.binance_base, "http://127.0.0.1:9100");
        assert_eq!(
            config.price_endpoints.exchange_rate_url,
            "http://127.0.0.1:9100/rates"
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        let file = minimal_file_config(
            r#"
            [rpc]
            url = "https://rpc.example.com"

            [sync]
            batch_size = 10
            utc_offset_hours = 8

            [prices]
            local_currency = "EUR"
            "#,
        );
        let config = Config::from_file(&file, None).unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.tz, FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(config.local_currency, "EUR");
    }

    #[test]
    fn cli_rpc_url_overrides_the_file() {
        let file = minimal_file_config(
            r#"
            [rpc]
            url = "https://rpc.example.com"
            "#,
        );
        let config =
            Config::from_file(&file, Some("https://other.example.com".to_string())).unwrap();
        assert_eq!(config.rpc_url, "https://other.example.com");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let file = minimal_file_config(
            r#"
            [rpc]
            url = "https://rpc.example.com"

            [sync]
            batch_size = 0
            "#,
        );
        assert!(Config::from_file(&file, None).is_err());
    }
}
