use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 256;

/// One async mutex per identity, created on demand.
///
/// Holders of the guard for the same key run one at a time; different keys never
/// contend. Idle slots are dropped once the map grows past a threshold.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() >= PRUNE_THRESHOLD {
                // A slot referenced only by the map has no holder and no waiter.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(identity.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
