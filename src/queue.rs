use serde::Deserialize;
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::measurement::Measurement;

/// What a bounded queue gives up when it is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued measurement to make room
    #[default]
    DropOldest,
    /// Refuse the incoming measurement
    RejectNewest,
}

/// Configuration for the measurement queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum queued measurements; `None` means unbounded
    pub capacity: Option<usize>,

    /// Applied only when `capacity` is set
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// Result of a push
#[derive(Debug, Clone, PartialEq)]
pub enum Pushed {
    /// The measurement was appended
    Enqueued,
    /// The measurement was appended and the oldest one evicted
    DisplacedOldest(Measurement),
    /// The queue was full and the measurement was not appended
    Rejected(Measurement),
}

struct Shared {
    items: Mutex<VecDeque<Measurement>>,
    config: QueueConfig,
    dropped: AtomicU64,
}

/// Multi-producer, single-consumer FIFO of measurements.
///
/// Cloning gives another handle to the same queue. Runners only push, the
/// dispatcher only drains, so a single mutex around the deque is the whole
/// locking discipline.
#[derive(Clone)]
pub struct MeasurementQueue {
    shared: Arc<Shared>,
}

impl MeasurementQueue {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::with_config(QueueConfig::unbounded())
    }

    /// Create a queue with custom configuration
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::new()),
                config,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.shared.config
    }

    // A panicking holder cannot leave the deque half-modified, so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, VecDeque<Measurement>> {
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a measurement
    pub fn push(&self, measurement: Measurement) -> Pushed {
        let mut items = self.lock();

        match self.shared.config.capacity {
            Some(capacity) if items.len() >= capacity => match self.shared.config.overflow {
                OverflowPolicy::DropOldest => {
                    let evicted = items.pop_front();
                    items.push_back(measurement);
                    drop(items);
                    match evicted {
                        Some(evicted) => {
                            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                            Pushed::DisplacedOldest(evicted)
                        }
                        None => Pushed::Enqueued,
                    }
                }
                OverflowPolicy::RejectNewest => {
                    drop(items);
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    Pushed::Rejected(measurement)
                }
            },
            _ => {
                items.push_back(measurement);
                Pushed::Enqueued
            }
        }
    }

    /// Take every measurement present right now, oldest first.
    ///
    /// The swap happens under one lock acquisition: anything pushed while the
    /// caller processes the batch stays queued for the next drain.
    pub fn drain(&self) -> Vec<Measurement> {
        let taken = mem::take(&mut *self.lock());
        Vec::from(taken)
    }

    /// Number of queued measurements
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Measurements lost to the overflow policy since creation
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Default for MeasurementQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MeasurementQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementQueue")
            .field("len", &self.len())
            .field("config", &self.shared.config)
            .field("dropped", &self.dropped())
            .finish()
    }
}
