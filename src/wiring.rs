//! Wiring scheduler: binds handlers to freshly written units.
//!
//! Small queues are wired serially in queue order. Queues at or above the
//! parallel threshold are split into contiguous, disjoint slices, one rayon
//! task per slice. The scheduler joins every slice before returning and then
//! reports the first error any slice produced; slices already running are
//! never cancelled.

use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LoaderError, LoaderResult};
use crate::handler::{Handler, wire_handler};
use crate::loader::DynamicLoader;
use crate::naming::unit_name;
use crate::store::{BindingMap, BlobMap};

/// Queues shorter than this are wired on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 100;

/// Tuning for the wiring scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// Minimum queue length that triggers parallel wiring.
    pub parallel_threshold: usize,
    /// Dedicated worker count. `None` shares rayon's global pool.
    pub workers: Option<usize>,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            workers: None,
        }
    }
}

/// Chooses serial or parallel dispatch for a wiring pass.
#[derive(Clone)]
pub struct WiringScheduler {
    parallel_threshold: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl WiringScheduler {
    /// Build a scheduler; a dedicated pool is created when `workers` is set.
    pub fn new(config: &WiringConfig) -> Result<Self, ConfigError> {
        let pool = match config.workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers.max(1))
                    .thread_name(|i| format!("unit-wiring-{i}"))
                    .build()
                    .map_err(|e| ConfigError::Pool {
                        message: e.to_string(),
                    })?;
                Some(Arc::new(pool))
            }
            None => None,
        };
        Ok(Self {
            parallel_threshold: config.parallel_threshold,
            pool,
        })
    }

    /// Share an existing pool between several stores.
    pub fn with_pool(parallel_threshold: usize, pool: Arc<ThreadPool>) -> Self {
        Self {
            parallel_threshold,
            pool: Some(pool),
        }
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Number of workers a parallel pass splits across.
    pub fn workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Wire every key in `keys`, serially or in parallel depending on length.
    pub(crate) fn wire_all<H: Handler>(
        &self,
        loader: &DynamicLoader,
        blobs: &BlobMap,
        bindings: &BindingMap<H>,
        keys: &[String],
    ) -> LoaderResult<()> {
        if keys.len() < self.parallel_threshold {
            return wire_slice(loader, blobs, bindings, keys);
        }

        let ranges = partition(keys.len(), self.workers());
        tracing::info!(
            units = keys.len(),
            slices = ranges.len(),
            "wiring units in parallel"
        );

        let (tx, rx) = mpsc::channel();
        match &self.pool {
            Some(pool) => pool.scope(|scope| {
                spawn_slices(scope, loader, blobs, bindings, keys, ranges, &tx)
            }),
            None => rayon::scope(|scope| {
                spawn_slices(scope, loader, blobs, bindings, keys, ranges, &tx)
            }),
        }
        drop(tx);

        match rx.try_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for WiringScheduler {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            pool: None,
        }
    }
}

impl std::fmt::Debug for WiringScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiringScheduler")
            .field("parallel_threshold", &self.parallel_threshold)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

/// Split `len` items into contiguous, disjoint ranges for `workers` tasks.
///
/// Slices hold `ceil(len / workers)` items; the last one takes whatever is
/// left. `workers` is clamped to `1..=len`, so no slice is ever empty.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, len);
    let size = len.div_ceil(workers);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Spawn one wiring task per range. Errors go to `tx`; the enclosing scope
/// joins every task before returning.
fn spawn_slices<'scope, H: Handler>(
    scope: &rayon::Scope<'scope>,
    loader: &'scope DynamicLoader,
    blobs: &'scope BlobMap,
    bindings: &'scope BindingMap<H>,
    keys: &'scope [String],
    ranges: Vec<Range<usize>>,
    tx: &mpsc::Sender<LoaderError>,
) {
    for range in ranges {
        let tx = tx.clone();
        let slice = &keys[range];
        scope.spawn(move |_| {
            if let Err(e) = wire_slice(loader, blobs, bindings, slice) {
                // The receiver outlives the scope, so the send cannot fail.
                let _ = tx.send(e);
            }
        });
    }
}

/// Wire `keys` in order on the current thread.
fn wire_slice<H: Handler>(
    loader: &DynamicLoader,
    blobs: &BlobMap,
    bindings: &BindingMap<H>,
    keys: &[String],
) -> LoaderResult<()> {
    for key in keys {
        let name = unit_name(key);
        let unit = loader.resolve(blobs, &name)?;
        if let Some(handler) = bindings.get(&name) {
            wire_handler(handler.as_ref(), unit);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(ranges: &[Range<usize>]) -> Vec<usize> {
        ranges.iter().flat_map(|r| r.clone()).collect()
    }

    #[test]
    fn partition_250_over_4() {
        let ranges = partition(250, 4);
        let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![63, 63, 63, 61]);
        assert_eq!(covered(&ranges), (0..250).collect::<Vec<_>>());
    }

    #[test]
    fn partition_even_split() {
        let ranges = partition(100, 4);
        assert_eq!(ranges, vec![0..25, 25..50, 50..75, 75..100]);
    }

    #[test]
    fn partition_more_workers_than_items() {
        let ranges = partition(3, 8);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn partition_single_worker() {
        assert_eq!(partition(10, 1), vec![0..10]);
        assert_eq!(partition(10, 0), vec![0..10]);
    }

    #[test]
    fn partition_empty() {
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn dedicated_pool_reports_worker_count() {
        let scheduler = WiringScheduler::new(&WiringConfig {
            parallel_threshold: 10,
            workers: Some(3),
        })
        .unwrap();
        assert_eq!(scheduler.workers(), 3);
        assert_eq!(scheduler.parallel_threshold(), 10);
    }
}
