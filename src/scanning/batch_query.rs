//! Balance and UTXO lookups across many addresses
//!
//! Lookups are independent, so they fan out over a bounded worker pool.
//! Results come back ordered by the caller's address order, not by
//! completion order. A failed lookup stays in its slot; cancellation stops
//! the whole batch.

use std::sync::Arc;

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, warn};

use crate::{
    common::CallContext,
    data_structures::{Address, SpendableOutput, TokenId},
    errors::{DraftError, DraftResult, LedgerError},
    ledger::LedgerRpc,
    scanning::progress::{BatchPhase, BatchProgress, BatchProgressCallback},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub address: Address,
    pub token_id: Option<TokenId>,
    pub total: u64,
    pub utxos: Vec<SpendableOutput>,
}

impl AddressBalance {
    pub fn from_utxos(
        address: Address,
        token_id: Option<TokenId>,
        utxos: Vec<SpendableOutput>,
    ) -> DraftResult<Self> {
        let total = utxos
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or_else(|| {
                DraftError::invalid_argument("address", address, "balance overflows u64")
            })?;
        Ok(Self {
            address,
            token_id,
            total,
            utxos,
        })
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }
}

pub struct BatchBalanceQuery {
    ledger: Arc<dyn LedgerRpc>,
    concurrency: usize,
}

impl BatchBalanceQuery {
    pub fn new(ledger: Arc<dyn LedgerRpc>, concurrency: usize) -> Self {
        Self {
            ledger,
            concurrency: concurrency.max(1),
        }
    }

    /// Query every address; entry `i` of the result belongs to `addresses[i]`
    pub async fn query(
        &self,
        addresses: &[Address],
        token_id: Option<&TokenId>,
        ctx: &CallContext,
        progress: &dyn BatchProgressCallback,
    ) -> DraftResult<Vec<DraftResult<AddressBalance>>> {
        ctx.check("batch_query")?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, address) in addresses.iter().copied().enumerate() {
            let semaphore = semaphore.clone();
            let ledger = self.ledger.clone();
            let ctx = ctx.clone();
            let token_id = token_id.cloned();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => ctx
                        .run("query_utxos", ledger.query_utxos(&address, token_id.as_ref()))
                        .await
                        .and_then(|utxos| AddressBalance::from_utxos(address, token_id, utxos)),
                    Err(e) => Err(LedgerError::Unreachable(e.to_string()).into()),
                };
                (index, result)
            });
        }

        let mut state = BatchProgress::new(addresses.len());
        let mut slots: Vec<Option<DraftResult<AddressBalance>>> =
            (0..addresses.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                DraftError::Ledger(LedgerError::Unreachable(format!("query task failed: {e}")))
            })?;
            if let Err(DraftError::Cancelled { step }) = &result {
                state.phase = BatchPhase::Cancelled;
                progress.on_progress(&state);
                return Err(DraftError::Cancelled { step });
            }
            if let Err(e) = &result {
                warn!(address = %addresses[index], error = %e, "Balance query failed");
                state.failed += 1;
            }
            state.completed += 1;
            progress.on_progress(&state);
            slots[index] = Some(result);
        }

        state.phase = BatchPhase::Completed;
        progress.on_progress(&state);
        debug!(
            addresses = addresses.len(),
            failed = state.failed,
            elapsed_ms = state.elapsed().as_millis() as u64,
            "Batch query finished"
        );

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    DraftError::Ledger(LedgerError::Unreachable(format!(
                        "no result for address {index}"
                    )))
                })
            })
            .collect()
    }
}
