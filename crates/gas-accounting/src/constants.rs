//! Shared constants: endpoints, pacing, caps and price fallbacks

/// Lamports per SOL (fees are charged in lamports)
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Signatures requested per getSignaturesForAddress page (RPC maximum)
pub const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// Hard cap on signatures scanned in one run, to bound huge histories
pub const MAX_MONTH_SIGNATURES: usize = 3000;

/// Pacing delay between signature pages
pub const PAGE_DELAY_MS: u64 = 200;

/// Transaction bodies fetched concurrently per batch
pub const TX_BATCH_SIZE: usize = 5;

/// Pacing delay between body batches
pub const BATCH_DELAY_MS: u64 = 200;

/// Per-attempt timeout for upstream calls
pub const CALL_TIMEOUT_SECS: u64 = 10;

// Price endpoints
pub const BINANCE_API_BASE: &str = "https://api.binance.com";
pub const BINANCE_KLINES: &str = "/api/v3/klines?symbol=SOLUSDT&interval=1h";
pub const BINANCE_TICKER: &str = "/api/v3/ticker/price?symbol=SOLUSDT";
pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
pub const COINGECKO_SIMPLE_PRICE: &str = "/simple/price?ids=solana&vs_currencies=usd";
pub const EXCHANGE_RATE_API: &str = "https://open.er-api.com/v6/latest/USD";

/// Klines rows per request (Binance limit)
pub const BINANCE_KLINES_LIMIT: usize = 1000;

/// Used when every SOL/USD source fails; quotes built from this carry
/// PriceSource::Fallback so downstream can tell they are estimates
pub const FALLBACK_SOL_PRICE: f64 = 85.0;

/// Used when the exchange-rate API is unreachable
pub const FALLBACK_USD_TO_CNY: f64 = 7.25;
