//! A host monitoring agent: independent collectors feed a shared queue that a
//! dispatcher drains and ships to the collection server over HTTP

pub mod collector;
pub mod collectors;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod measurement;
pub mod queue;
pub mod remote_config;
pub mod retry;
pub mod shutdown;
pub mod util;

#[cfg(test)]
mod test_support;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::collector::{
        BoxedCollector, Collector, CollectorConfig, CollectorHarness, PeriodicCollector,
        RunnerOutcome, boxed, start_all_collectors,
    };
    pub use crate::config::{AgentSettings, SettingsBuilder};
    pub use crate::delivery::{DeliveryClient, DeliveryReceipt, Endpoint, HttpDeliveryClient};
    pub use crate::dispatcher::{CycleOutcome, DispatchReport, Dispatcher, run_dispatcher};
    pub use crate::error::{AgentError, Result};
    pub use crate::measurement::{Measurement, MeasurementKind};
    pub use crate::queue::{MeasurementQueue, QueueConfig};
    pub use crate::retry::{RetryConfig, execute_with_retry};
    pub use crate::shutdown::{Shutdown, ShutdownListener};
    pub use crate::util::Logger;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
