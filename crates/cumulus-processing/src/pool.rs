//! Worker pool bounding concurrent derivative generation
//!
//! One pool is built at startup and shared (via `Arc`) by every pipeline.
//! Its capacity is read from the `thumb_max_task_count` setting the first
//! time a slot is requested and stays fixed for the life of the process.

use cumulus_core::constants::{DEFAULT_THUMB_MAX_TASK_COUNT, THUMB_MAX_TASK_COUNT};
use cumulus_core::SettingsProvider;
use std::sync::Arc;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};

struct Slots {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// Capacity-bounded admission gate.
///
/// Waiters are admitted in FIFO order. A slot is held by a [`WorkerSlot`]
/// and released when the guard drops, including during unwinding.
pub struct WorkerPool {
    settings: Option<Arc<dyn SettingsProvider>>,
    slots: OnceCell<Slots>,
}

impl WorkerPool {
    /// Pool whose capacity is resolved lazily from settings.
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            settings: Some(settings),
            slots: OnceCell::new(),
        }
    }

    /// Pool with a fixed capacity (clamped to at least one slot).
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = Self::build(capacity);
        tracing::debug!(capacity = slots.capacity, "Worker pool initialized");
        Self {
            settings: None,
            slots: OnceCell::new_with(Some(slots)),
        }
    }

    fn build(capacity: usize) -> Slots {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Slots {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    async fn slots(&self) -> &Slots {
        self.slots
            .get_or_init(|| async {
                let configured = match &self.settings {
                    Some(settings) => {
                        settings
                            .get_int(THUMB_MAX_TASK_COUNT, DEFAULT_THUMB_MAX_TASK_COUNT)
                            .await
                    }
                    None => DEFAULT_THUMB_MAX_TASK_COUNT,
                };
                let capacity = resolve_capacity(configured);
                tracing::debug!(capacity, configured, "Worker pool initialized");
                Self::build(capacity)
            })
            .await
    }

    /// Wait for a free slot.
    ///
    /// Never fails and has no timeout; callers that must give up early wrap
    /// the whole job instead.
    pub async fn acquire(&self) -> WorkerSlot {
        let slots = self.slots().await;
        // The pool never closes its semaphore, so a permit is always granted.
        let permit = slots.semaphore.clone().acquire_owned().await.ok();
        tracing::debug!(
            in_flight = slots.capacity - slots.semaphore.available_permits(),
            "Worker added to thumbnail task queue"
        );
        WorkerSlot {
            _permit: permit,
        }
    }

    /// Resolved capacity, `None` until the first acquisition.
    pub fn capacity(&self) -> Option<usize> {
        self.slots.get().map(|slots| slots.capacity)
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.slots
            .get()
            .map(|slots| slots.capacity - slots.semaphore.available_permits())
            .unwrap_or(0)
    }
}

/// A configured count of zero or less means "one per available CPU".
fn resolve_capacity(configured: i64) -> usize {
    if configured > 0 {
        return usize::try_from(configured).unwrap_or(Semaphore::MAX_PERMITS);
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A held pool slot; dropping it frees the slot.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct WorkerSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        tracing::debug!("Worker released from thumbnail task queue");
    }
}
