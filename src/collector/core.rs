//! Core collector trait
use serde::Serialize;

use crate::error::Result;
use crate::measurement::MeasurementKind;

/// A named, self-paced producer of measurement values.
///
/// A collector is driven by exactly one runner thread for its whole life, so
/// it only needs to be `Send`. It keeps whatever state it needs between polls
/// (previous counters and the like).
pub trait Collector: Send + 'static {
    /// The value yielded on each poll
    type Point: Serialize;

    /// Stable identifier, unique among running collectors
    fn name(&self) -> &str;

    /// Classification forwarded to the server
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Point
    }

    /// Block until the next value is ready and return it.
    ///
    /// The collector paces itself: sleeping, waiting on a file or running an
    /// external tool all happen in here. `Ok(None)` means the sequence is
    /// finished; an error means the collector cannot continue.
    fn next_point(&mut self) -> Result<Option<Self::Point>>;
}
