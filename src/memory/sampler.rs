use crate::error::WatermarkError;
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{Sender, bounded, select, tick};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// One completed resident-memory sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub resident_mb: u64,
    /// Monotonic sample number, starting at 1
    pub sequence: u64,
    pub taken_at: Instant,
}

impl MemoryReading {
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }
}

/// Latest reading, replaced wholesale on every publish
#[derive(Debug, Clone, Default)]
pub struct ReadingCell {
    latest: Arc<AtomicCell<Option<MemoryReading>>>,
}

impl ReadingCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<MemoryReading> {
        self.latest.load()
    }

    /// Publish a new sample in megabytes; returns the stored reading
    pub fn publish(&self, resident_mb: u64) -> MemoryReading {
        let sequence = self.latest().map_or(1, |prev| prev.sequence + 1);
        let reading = MemoryReading {
            resident_mb,
            sequence,
            taken_at: Instant::now(),
        };
        self.latest.store(Some(reading));
        reading
    }
}

/// Source of resident-memory measurements
pub trait MemoryProbe: Send {
    fn resident_bytes(&mut self) -> Result<u64, WatermarkError>;
}

/// Resident set size of the current process via `sysinfo`
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self, WatermarkError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| WatermarkError::MemorySample(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&mut self) -> Result<u64, WatermarkError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        self.system
            .process(self.pid)
            .map(|process| process.memory())
            .ok_or_else(|| {
                WatermarkError::MemorySample(format!("process {} not found", self.pid))
            })
    }
}

/// Background sampler publishing into a `ReadingCell` on a fixed interval.
///
/// The first sample is taken immediately. A failing probe leaves the previous
/// reading in place. The sampling thread is stopped and joined by `stop` or
/// on drop.
pub struct MemorySampler {
    cell: ReadingCell,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MemorySampler {
    pub fn start(interval: Duration, probe: Box<dyn MemoryProbe>) -> Self {
        let cell = ReadingCell::new();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread_cell = cell.clone();

        let handle = std::thread::Builder::new()
            .name("memory-sampler".to_string())
            .spawn(move || {
                let mut probe = probe;
                let ticker = tick(interval);
                sample_once(probe.as_mut(), &thread_cell);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => sample_once(probe.as_mut(), &thread_cell),
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Reclamation falls back to batch counts without readings
                tracing::warn!("Memory sampler could not start: {}", e);
                None
            }
        };

        Self {
            cell,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Start with the process RSS probe, or without sampling if the probe
    /// cannot be created on this platform
    pub fn for_current_process(interval: Duration) -> Option<Self> {
        match SysinfoProbe::new() {
            Ok(probe) => Some(Self::start(interval, Box::new(probe))),
            Err(e) => {
                tracing::warn!("Memory sampling disabled: {}", e);
                None
            }
        }
    }

    pub fn latest_reading(&self) -> Option<MemoryReading> {
        self.cell.latest()
    }

    /// Shared handle for readers such as the reclamation coordinator
    pub fn reading_cell(&self) -> ReadingCell {
        self.cell.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("Memory sampler thread panicked");
        }
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sample_once(probe: &mut dyn MemoryProbe, cell: &ReadingCell) {
    match probe.resident_bytes() {
        Ok(bytes) => {
            let reading = cell.publish(bytes / BYTES_PER_MB);
            tracing::trace!(
                "Memory sample #{}: {} MB",
                reading.sequence,
                reading.resident_mb
            );
        }
        Err(e) => {
            tracing::debug!("{}; keeping last reading", e);
        }
    }
}
