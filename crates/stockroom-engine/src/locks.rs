//! # Per-Variant Locks
//!
//! In-process async locks that serialize every operation touching the same
//! variant.
//!
//! ## Deadlock Avoidance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Task A wants {v-2, v-1}         Task B wants {v-1, v-3, v-1}           │
//! │         │                                │                              │
//! │   sort + dedup                     sort + dedup                         │
//! │         ▼                                ▼                              │
//! │   lock v-1, lock v-2               lock v-1, lock v-3                   │
//! │                                                                         │
//! │  Both start at v-1, so neither can hold a lock the other is waiting     │
//! │  on while waiting itself. No cycle, no deadlock.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Acquisition is bounded by one deadline for the whole set. Running out
//! of time drops whatever was acquired and reports
//! [`EngineError::Retryable`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Entries are pruned once the registry grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Registry of one async mutex per variant id.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct VariantLocks {
    registry: Arc<Mutex<LockMap>>,
    timeout: Duration,
}

/// Held locks. Dropping it releases every lock.
#[derive(Debug)]
pub struct VariantGuards {
    variant_ids: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl VariantGuards {
    /// Locked ids in acquisition order.
    pub fn variant_ids(&self) -> &[String] {
        &self.variant_ids
    }

    pub fn covers(&self, variant_id: &str) -> bool {
        self.variant_ids
            .binary_search_by(|id| id.as_str().cmp(variant_id))
            .is_ok()
    }
}

impl VariantLocks {
    pub fn new(timeout: Duration) -> Self {
        VariantLocks {
            registry: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Locks every id in sorted, de-duplicated order.
    ///
    /// ## Errors
    /// `Retryable` if the whole set is not held within the timeout.
    pub async fn acquire<I, S>(&self, operation: &str, variant_ids: I) -> EngineResult<VariantGuards>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: BTreeSet<String> = variant_ids.into_iter().map(Into::into).collect();
        let deadline = Instant::now() + self.timeout;

        let mut guards = Vec::with_capacity(ordered.len());
        for id in &ordered {
            let mutex = self.mutex_for(id);
            match timeout_at(deadline, mutex.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    warn!(operation, variant_id = %id, timeout = ?self.timeout, "Variant lock timed out");
                    return Err(EngineError::Retryable {
                        operation: operation.to_string(),
                        reason: format!("timed out waiting for variant {}", id),
                    });
                }
            }
        }

        debug!(operation, locked = ordered.len(), "Variant locks acquired");
        Ok(VariantGuards {
            variant_ids: ordered.into_iter().collect(),
            _guards: guards,
        })
    }

    /// Number of ids the registry currently tracks.
    pub fn tracked(&self) -> usize {
        self.lock_registry().len()
    }

    fn mutex_for(&self, variant_id: &str) -> Arc<AsyncMutex<()>> {
        let mut registry = self.lock_registry();

        if registry.len() >= PRUNE_THRESHOLD {
            // Only the registry holds an idle lock
            registry.retain(|_, m| Arc::strong_count(m) > 1);
        }

        registry
            .entry(variant_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, LockMap> {
        // The map is never left half-updated, so a poisoned guard is still usable
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for VariantLocks {
    fn default() -> Self {
        VariantLocks::new(Duration::from_secs(2))
    }
}
