//! Batched, rate-limited execution of article lookups.
//!
//! Items are cut into consecutive batches. Every lookup of a batch is started
//! at once and the batch is joined before the pipeline cools down and moves on
//! to the next one. Results are always placed by the item's original index.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use log::{error, info, warn};
use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::delay_manager;
use crate::error::{LookupError, RunFailure};
use crate::lookup_client::Lookup;

pub const AGGREGATE_LOOKUP_ERROR: &str = "Some lookups failed. The original codes were kept";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub search_key: String,
    pub fallback_value: String,
}

impl WorkItem {
    pub fn new(index: usize, search_key: impl Into<String>, fallback_value: impl Into<String>) -> Self {
        WorkItem {
            index,
            search_key: search_key.into(),
            fallback_value: fallback_value.into(),
        }
    }

    fn is_blank(&self) -> bool {
        self.search_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub index: usize,
    pub value: String,
    pub failed: bool,
}

impl ItemResult {
    fn kept(item: &WorkItem, failed: bool) -> Self {
        ItemResult {
            index: item.index,
            value: item.fallback_value.clone(),
            failed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub completed_count: usize,
    pub total_count: usize,
    pub is_running: bool,
    pub is_complete: bool,
    pub is_cancelled: bool,
    /// First lookup failure of the run. Later failures only set their item's flag.
    pub last_error: Option<String>,
    /// Set when the run itself broke down, as opposed to single lookups failing.
    pub run_failure: Option<String>,
}

/// Shared view of a run's progress, readable while the run is in flight.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle(Arc<Mutex<RunProgress>>);

impl ProgressHandle {
    pub fn snapshot(&self) -> RunProgress {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RunProgress> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, total: usize) {
        *self.lock() = RunProgress {
            total_count: total,
            is_running: true,
            ..RunProgress::default()
        };
    }

    fn record_item(&self, error: Option<&LookupError>) {
        let mut progress = self.lock();
        if progress.completed_count < progress.total_count {
            progress.completed_count += 1;
        }
        if let Some(e) = error {
            if progress.last_error.is_none() {
                progress.last_error = Some(format!("{} (first error: {})", AGGREGATE_LOOKUP_ERROR, e));
            }
        }
    }

    fn finish(&self, cancelled: bool) {
        let mut progress = self.lock();
        progress.is_running = false;
        progress.is_cancelled = cancelled;
        progress.is_complete = true;
    }

    fn fail(&self, failure: &RunFailure) {
        let mut progress = self.lock();
        progress.is_running = false;
        progress.run_failure = Some(failure.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Run,
    Pause,
    Stop,
}

/// Cooperative pause/stop requests. Only looked at between batches, never mid-batch.
#[derive(Debug, Clone, Default)]
pub struct RunControl(Arc<AtomicU8>);

impl RunControl {
    const RUN: u8 = 0;
    const PAUSE: u8 = 1;
    const STOP: u8 = 2;

    pub fn pause(&self) {
        // A stop is final.
        let _ = self
            .0
            .compare_exchange(Self::RUN, Self::PAUSE, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let _ = self
            .0
            .compare_exchange(Self::PAUSE, Self::RUN, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.store(Self::STOP, Ordering::SeqCst);
    }

    pub fn state(&self) -> ControlState {
        match self.0.load(Ordering::SeqCst) {
            Self::PAUSE => ControlState::Pause,
            Self::STOP => ControlState::Stop,
            _ => ControlState::Run,
        }
    }
}

pub struct BatchScheduler {
    config: SchedulerConfig,
    progress: ProgressHandle,
    control: RunControl,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_control(config, RunControl::default())
    }

    pub fn with_control(config: SchedulerConfig, control: RunControl) -> Self {
        BatchScheduler {
            config,
            progress: ProgressHandle::default(),
            control,
        }
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Runs every item to a result, in input order.
    ///
    /// Lookup failures never end the run: the item keeps its fallback value and
    /// is flagged. The only error is a [`RunFailure`], when a lookup task dies
    /// without producing an outcome.
    pub async fn run(&self, items: Vec<WorkItem>, lookup: Arc<dyn Lookup>) -> Result<Vec<ItemResult>, RunFailure> {
        let batch_size = self.config.batch_size.max(1);
        let total = items.len();
        let total_batches = total.div_ceil(batch_size);
        self.progress.start(total);

        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for (batch_no, batch) in items.chunks(batch_size).enumerate() {
            if batch_no > 0 {
                if !self.wait_for_go().await {
                    cancelled = true;
                    break;
                }
                delay_manager::cool_down(self.config.inter_batch_delay, batch_no, total_batches).await;
            }
            if !self.wait_for_go().await {
                cancelled = true;
                break;
            }

            info!(
                "Processing batch {}/{} ({} articles)",
                batch_no + 1,
                total_batches,
                batch.len()
            );
            match self.run_batch(batch, &lookup).await {
                Ok(batch_results) => results.extend(batch_results),
                Err(failure) => {
                    error!("Run aborted: {}", failure);
                    self.progress.fail(&failure);
                    return Err(failure);
                }
            }
        }

        if cancelled {
            warn!(
                "Run stopped after {} of {} articles; the rest keep their original codes",
                results.len(),
                total
            );
            let done = results.len();
            results.extend(items[done..].iter().map(|item| ItemResult::kept(item, false)));
        }

        self.progress.finish(cancelled);
        info!("Run finished: {} articles in {} batches", total, total_batches);
        Ok(results)
    }

    /// Launches the whole batch at once and waits for every lookup to settle.
    async fn run_batch(&self, batch: &[WorkItem], lookup: &Arc<dyn Lookup>) -> Result<Vec<ItemResult>, RunFailure> {
        let handles: Vec<_> = batch
            .iter()
            .cloned()
            .map(|item| {
                let lookup = Arc::clone(lookup);
                let progress = self.progress.clone();
                tokio::spawn(async move {
                    let (result, error) = resolve_item(&item, lookup.as_ref()).await;
                    progress.record_item(error.as_ref());
                    result
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(batch)
            .map(|(joined, item)| {
                joined.map_err(|e| {
                    if e.is_panic() {
                        RunFailure::TaskPanicked { index: item.index }
                    } else {
                        RunFailure::TaskCancelled { index: item.index }
                    }
                })
            })
            .collect()
    }

    /// Returns false once a stop was requested. Blocks while paused.
    async fn wait_for_go(&self) -> bool {
        let mut announced = false;
        loop {
            match self.control.state() {
                ControlState::Run => return true,
                ControlState::Stop => return false,
                ControlState::Pause => {
                    if !announced {
                        info!("Run paused");
                        announced = true;
                    }
                    delay_manager::pause_tick().await;
                }
            }
        }
    }
}

async fn resolve_item(item: &WorkItem, lookup: &dyn Lookup) -> (ItemResult, Option<LookupError>) {
    if item.is_blank() {
        return (ItemResult::kept(item, false), None);
    }

    match lookup.lookup(&item.search_key).await {
        Ok(value) => (
            ItemResult {
                index: item.index,
                value,
                failed: false,
            },
            None,
        ),
        Err(e) => {
            warn!("Lookup failed for article '{}': {}", item.search_key, e);
            (ItemResult::kept(item, true), Some(e))
        }
    }
}
