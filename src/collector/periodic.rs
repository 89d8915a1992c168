use super::config::{Cadence, CollectorConfig};
use super::core::Collector;
use crate::error::Result;
use crate::measurement::MeasurementKind;
use serde::Serialize;
use std::marker::PhantomData;

/// A collector that calls a polling closure on a fixed cadence
pub struct PeriodicCollector<T, F>
where
    T: Serialize + 'static,
    F: FnMut() -> Result<T> + Send + 'static,
{
    /// The collector configuration
    config: CollectorConfig,
    /// The collection function
    poll_fn: F,
    cadence: Cadence,
    _point: PhantomData<fn() -> T>,
}

impl<T, F> PeriodicCollector<T, F>
where
    T: Serialize + 'static,
    F: FnMut() -> Result<T> + Send + 'static,
{
    /// Create a new periodic collector
    pub fn new(config: CollectorConfig, poll_fn: F) -> Self {
        let cadence = config.cadence();
        Self {
            config,
            poll_fn,
            cadence,
            _point: PhantomData,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }
}

impl<T, F> Collector for PeriodicCollector<T, F>
where
    T: Serialize + 'static,
    F: FnMut() -> Result<T> + Send + 'static,
{
    type Point = T;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> MeasurementKind {
        self.config.kind
    }

    fn next_point(&mut self) -> Result<Option<T>> {
        self.cadence.wait();
        (self.poll_fn)().map(Some)
    }
}
