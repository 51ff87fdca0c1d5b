use super::sampler::ReadingCell;
use crate::config::Settings;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Something that can release memory when a reclamation pass fires
pub trait Reclaimer: Send + Sync {
    fn reclaim(&self);
}

/// Decision inputs for the coordinator
#[derive(Debug, Clone)]
pub struct ReclamationPolicy {
    pub batch_size: usize,
    pub memory_threshold_mb: u64,
    pub mixed_mode: bool,
    /// Readings older than this never trigger on memory
    pub max_reading_age: Duration,
}

impl ReclamationPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.gc_batch_size.max(1),
            memory_threshold_mb: settings.gc_memory_threshold,
            mixed_mode: settings.enable_mixed_mode,
            max_reading_age: Duration::from_secs(settings.memory_check_interval) * 2,
        }
    }
}

/// Why a pass fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    BatchCount,
    MemoryPressure { resident_mb: u64 },
}

/// Decides after every completed item whether to force a reclamation pass.
///
/// Safe to share between worker threads: the processed counter is only ever
/// changed by single atomic read-modify-write operations, so exactly one
/// caller observes each batch boundary.
pub struct ReclamationCoordinator {
    policy: ReclamationPolicy,
    readings: Option<ReadingCell>,
    processed: AtomicUsize,
    passes: AtomicUsize,
    reclaimers: Vec<Arc<dyn Reclaimer>>,
}

impl ReclamationCoordinator {
    pub fn new(policy: ReclamationPolicy, readings: Option<ReadingCell>) -> Self {
        Self {
            policy,
            readings,
            processed: AtomicUsize::new(0),
            passes: AtomicUsize::new(0),
            reclaimers: Vec::new(),
        }
    }

    pub fn with_reclaimer(mut self, reclaimer: Arc<dyn Reclaimer>) -> Self {
        self.reclaimers.push(reclaimer);
        self
    }

    /// Record one completed item; returns whether a reclamation pass ran
    pub fn on_item_completed(&self) -> bool {
        match self.decide() {
            Some(trigger) => {
                self.run_pass(trigger);
                true
            }
            None => false,
        }
    }

    /// Completed items since the last pass
    pub fn processed_since_last_pass(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    fn decide(&self) -> Option<Trigger> {
        if self.policy.mixed_mode
            && let Some(resident_mb) = self.pressure_reading()
        {
            self.processed.store(0, Ordering::Release);
            return Some(Trigger::MemoryPressure { resident_mb });
        }

        let batch_size = self.policy.batch_size;
        let previous = self
            .processed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count + 1 >= batch_size {
                    Some(0)
                } else {
                    Some(count + 1)
                }
            })
            .unwrap_or_else(|count| count);

        (previous + 1 >= batch_size).then_some(Trigger::BatchCount)
    }

    /// Resident size of the latest reading when it is fresh and above the threshold
    fn pressure_reading(&self) -> Option<u64> {
        let reading = self.readings.as_ref()?.latest()?;
        (reading.age() <= self.policy.max_reading_age
            && reading.resident_mb > self.policy.memory_threshold_mb)
            .then_some(reading.resident_mb)
    }

    fn run_pass(&self, trigger: Trigger) {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        match trigger {
            Trigger::BatchCount => tracing::info!(
                "Reclamation pass #{} after {} images",
                pass,
                self.policy.batch_size
            ),
            Trigger::MemoryPressure { resident_mb } => tracing::info!(
                "Reclamation pass #{}: resident memory {} MB above {} MB",
                pass,
                resident_mb,
                self.policy.memory_threshold_mb
            ),
        }
        for reclaimer in &self.reclaimers {
            reclaimer.reclaim();
        }
    }
}
