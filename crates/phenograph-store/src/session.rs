//! Scoped session acquisition.
//!
//! A [`SessionPool`] bounds the number of in-flight store calls. Each call
//! holds a [`Session`] guard; dropping the guard returns the slot, so a call
//! that fails (or is cancelled mid-await) still releases it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use phenograph_core::StoreError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct SessionPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    opened: Arc<AtomicU64>,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            opened: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<Session, StoreError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::SessionPool("pool is closed".to_string()))?;
        let seq = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(session = seq, in_use = self.in_use(), "session acquired");
        Ok(Session {
            seq,
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Sessions handed out since creation.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Refuse further acquisitions; held sessions stay valid.
    pub fn close(&self) {
        self.slots.close();
    }
}

/// A held pool slot.
#[derive(Debug)]
pub struct Session {
    seq: u64,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::trace!(session = self.seq, "session released");
    }
}
