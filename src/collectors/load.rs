use std::time::Duration;
use sysinfo::System;

use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;

pub const NAME: &str = "load";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME).interval(interval).build()
}

pub fn collector(interval: Duration) -> BoxedCollector {
    boxed(PeriodicCollector::new(config(interval), poll))
}

/// 1, 5 and 15 minute load averages
pub fn poll() -> Result<[f64; 3]> {
    let load = System::load_average();
    Ok([load.one, load.five, load.fifteen])
}
