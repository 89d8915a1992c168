use std::thread;
use std::time::Duration;

use crate::measurement::MeasurementKind;

/// Configuration for a collector
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Name of the collector
    pub name: String,
    /// Classification forwarded to the server
    pub kind: MeasurementKind,
    /// Time between polls
    pub interval: Duration,
    /// Poll before the first wait instead of after it
    pub poll_immediately: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: "default_collector".to_string(),
            kind: MeasurementKind::Point,
            interval: Duration::from_secs(60),
            poll_immediately: false,
        }
    }
}

impl CollectorConfig {
    pub fn builder(name: impl Into<String>) -> CollectorConfigBuilder {
        CollectorConfigBuilder::new(name)
    }

    /// The pacing this configuration describes
    pub fn cadence(&self) -> Cadence {
        Cadence::new(self.interval, self.poll_immediately)
    }
}

/// Builder for collector configuration
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    /// Create a new collector config builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: CollectorConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set the measurement kind
    pub fn kind(mut self, kind: MeasurementKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Poll once before the first interval elapses
    pub fn poll_immediately(mut self, poll_immediately: bool) -> Self {
        self.config.poll_immediately = poll_immediately;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CollectorConfig {
        self.config
    }
}

/// Collector-owned pacing between polls.
///
/// With `poll_immediately` the first call to [`Cadence::wait`] returns at
/// once and every later call sleeps one interval ("poll then sleep").
/// Otherwise every call sleeps ("sleep then poll").
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    skip_next: bool,
}

impl Cadence {
    pub fn new(interval: Duration, poll_immediately: bool) -> Self {
        Self {
            interval,
            skip_next: poll_immediately,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long the next `wait` will block
    pub fn next_delay(&self) -> Duration {
        if self.skip_next {
            Duration::ZERO
        } else {
            self.interval
        }
    }

    /// Block the calling thread until the next poll is due
    pub fn wait(&mut self) {
        let delay = self.next_delay();
        self.skip_next = false;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}
