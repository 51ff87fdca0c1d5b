//! Memory pressure feedback loop
//!
//! ```text
//! ┌─────────────────┐  publish   ┌─────────────┐  latest()  ┌────────────────────────┐
//! │ MemorySampler   │──────────▶ │ ReadingCell │ ─────────▶ │ ReclamationCoordinator │
//! │ (ticker thread) │            │ (atomic)    │            │ on_item_completed()    │
//! └─────────────────┘            └─────────────┘            └───────────┬────────────┘
//!                                                                       │ trigger
//!                                                                       ▼
//!                                                               Reclaimer::reclaim()
//! ```
//!
//! The sampler and the workers never share a lock: workers only perform an
//! atomic load of the latest reading. In process-pool mode every worker
//! process owns its own sampler and coordinator.

pub mod reclaim;
pub mod sampler;

pub use reclaim::{ReclamationCoordinator, ReclamationPolicy, Reclaimer, Trigger};
pub use sampler::{MemoryProbe, MemoryReading, MemorySampler, ReadingCell, SysinfoProbe};

use crate::config::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Sampler plus coordinator for one memory space (the engine process, or a
/// single worker process)
pub struct MemoryManager {
    sampler: Option<MemorySampler>,
    coordinator: ReclamationCoordinator,
}

impl MemoryManager {
    /// Start sampling the current process and wire the coordinator to it
    pub fn start(settings: &Settings, reclaimer: Arc<dyn Reclaimer>) -> Self {
        let interval = Duration::from_secs(settings.memory_check_interval);
        let sampler = MemorySampler::for_current_process(interval);
        let readings = sampler.as_ref().map(MemorySampler::reading_cell);
        let coordinator =
            ReclamationCoordinator::new(ReclamationPolicy::from_settings(settings), readings)
                .with_reclaimer(reclaimer);
        Self {
            sampler,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &ReclamationCoordinator {
        &self.coordinator
    }

    pub fn latest_reading(&self) -> Option<MemoryReading> {
        self.sampler.as_ref().and_then(MemorySampler::latest_reading)
    }

    /// Stop sampling; returns the number of reclamation passes that ran
    pub fn finish(self) -> usize {
        if let Some(sampler) = self.sampler {
            sampler.stop();
        }
        self.coordinator.passes()
    }
}
