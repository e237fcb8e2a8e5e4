//! Reservation of an address's spendable outputs while a draft is in flight
//!
//! Two concurrent drafts from one address may select the same outputs; the
//! ledger then rejects one of them as a double spend. A [`UtxoReservation`]
//! decides whether that hazard is accepted ([`UnreservedUtxos`]) or excluded
//! by serializing drafts per address ([`PerAddressLock`]).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::data_structures::Address;

type LockTable = Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>;

/// Held from input selection until submission finishes or fails
#[derive(Debug)]
pub struct ReservationGuard {
    owner: Address,
    lock: Option<OwnedMutexGuard<()>>,
    table: Weak<LockTable>,
}

impl ReservationGuard {
    /// A guard that excludes nothing
    pub fn unlocked(owner: Address) -> Self {
        Self {
            owner,
            lock: None,
            table: Weak::new(),
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn is_exclusive(&self) -> bool {
        self.lock.is_some()
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        drop(lock);
        // The table's own handle is the last one: nobody holds or awaits the address
        if let Some(table) = self.table.upgrade() {
            let mut locks = table.lock().unwrap_or_else(PoisonError::into_inner);
            if locks
                .get(&self.owner)
                .is_some_and(|entry| Arc::strong_count(entry) == 1)
            {
                locks.remove(&self.owner);
            }
        }
        debug!(owner = %self.owner, "Released UTXO reservation");
    }
}

#[async_trait]
pub trait UtxoReservation: Send + Sync {
    /// Wait until `owner` may compose a new draft
    async fn reserve(&self, owner: &Address) -> ReservationGuard;
}

/// No reservation: concurrent drafts may race for the same outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreservedUtxos;

#[async_trait]
impl UtxoReservation for UnreservedUtxos {
    async fn reserve(&self, owner: &Address) -> ReservationGuard {
        ReservationGuard::unlocked(*owner)
    }
}

/// At most one outstanding draft per address within this process
///
/// An address stays in the table only while a draft holds or awaits it.
#[derive(Debug, Default)]
pub struct PerAddressLock {
    locks: Arc<LockTable>,
}

impl PerAddressLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, owner: &Address) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(*owner).or_default().clone()
    }

    /// Reserve without waiting; `None` when another draft holds the address
    pub fn try_reserve(&self, owner: &Address) -> Option<ReservationGuard> {
        let guard = self.lock_for(owner).try_lock_owned().ok()?;
        Some(self.guard(owner, guard))
    }

    fn guard(&self, owner: &Address, lock: OwnedMutexGuard<()>) -> ReservationGuard {
        ReservationGuard {
            owner: *owner,
            lock: Some(lock),
            table: Arc::downgrade(&self.locks),
        }
    }
}

#[async_trait]
impl UtxoReservation for PerAddressLock {
    async fn reserve(&self, owner: &Address) -> ReservationGuard {
        let lock = self.lock_for(owner);
        let guard = lock.lock_owned().await;
        debug!(owner = %owner, "Acquired UTXO reservation");
        self.guard(owner, guard)
    }
}
