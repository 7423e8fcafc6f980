use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::HashMap;
use tokio::sync::OwnedMutexGuard;

use crate::cache::VariantKey;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Keyed table of in-progress variant generations.
///
/// Holding a guard for a key means no other task is generating that
/// variant. Entries are removed once the last interested task is done.
#[derive(Default)]
pub struct InFlight {
    slots: Mutex<HashMap<VariantKey, Slot>>,
}

impl InFlight {
    pub async fn acquire(&self, key: &VariantKey) -> InFlightGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.clone()).or_insert_with(Default::default).clone()
        };

        let guard = slot.lock_owned().await;

        InFlightGuard {
            table: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct InFlightGuard<'a> {
    table: &'a InFlight,
    key: VariantKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // Release the key before checking for waiters, a waiter holds a
        // clone of the slot so the table is the only owner when nobody is.
        drop(self.guard.take());

        let mut slots = self.table.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}
