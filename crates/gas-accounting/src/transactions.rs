//! Batched transaction-body fetch (bounded concurrency, partial tolerance)
//!
//! Bodies are fetched in fixed-size batches: every request in a batch runs
//! concurrently, batches run sequentially with a pacing delay. A signature
//! whose body errors or comes back empty is omitted from the output and
//! counted as missing — omission means unknown, never zero-fee.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;

use crate::retry::RetryPolicy;
use crate::rpc::{RpcHandle, TransactionEnvelope};
use crate::signatures::SignatureRecord;

/// Fee-bearing transaction body.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub signature: String,
    pub block_time: Option<i64>,
    /// Fee in lamports, straight from transaction metadata
    pub fee_lamports: u64,
    pub succeeded: bool,
}

/// Outcome of one batched fetch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<TransactionRecord>,
    /// Signatures whose body could not be retrieved this run
    pub missing: usize,
}

pub struct TransactionBatcher<'a> {
    rpc: &'a RpcHandle,
    batch_size: usize,
    batch_delay: Duration,
}

impl<'a> TransactionBatcher<'a> {
    pub fn new(rpc: &'a RpcHandle, batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            rpc,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    /// Fetch bodies for every signature, tolerating per-signature failures.
    pub async fn fetch_bodies(&self, signatures: &[SignatureRecord]) -> BatchOutcome {
        let policy = RetryPolicy::batch_item();
        let mut outcome = BatchOutcome {
            records: Vec::with_capacity(signatures.len()),
            missing: 0,
        };

        for (i, chunk) in signatures.chunks(self.batch_size).enumerate() {
            if i > 0 {
                sleep(self.batch_delay).await;
            }

            let fetches = chunk
                .iter()
                .map(|sig| self.rpc.get_transaction(&policy, &sig.signature));
            let results = join_all(fetches).await;

            for (sig, result) in chunk.iter().zip(results) {
                match result {
                    Ok(Some(envelope)) => match to_record(sig, envelope) {
                        Some(record) => outcome.records.push(record),
                        None => outcome.missing += 1,
                    },
                    Ok(None) => outcome.missing += 1,
                    Err(e) => {
                        eprintln!("[batch] body fetch failed for {}: {}", sig.signature, e);
                        outcome.missing += 1;
                    }
                }
            }
        }

        outcome
    }
}

/// Extract the fields the aggregator needs. A body without metadata carries
/// no fee information and is treated as missing.
fn to_record(sig: &SignatureRecord, envelope: TransactionEnvelope) -> Option<TransactionRecord> {
    let meta = envelope.meta?;
    Some(TransactionRecord {
        signature: sig.signature.clone(),
        block_time: envelope.block_time.or(Some(sig.block_time)),
        fee_lamports: meta.fee,
        succeeded: meta.err.is_none(),
    })
}
