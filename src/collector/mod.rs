mod config;
mod core;
mod periodic;
mod registry;
mod runner;

// Re-export public items
pub use self::config::{Cadence, CollectorConfig, CollectorConfigBuilder};
pub use self::core::Collector;
pub use periodic::PeriodicCollector;
pub use registry::CollectorRegistry;
pub use runner::{
    BoxedCollector, CollectorHarness, CollectorRunner, RunnableCollector, RunnerHandle,
    RunnerOutcome, boxed, start_all_collectors,
};
