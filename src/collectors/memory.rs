use serde::Serialize;
use std::time::Duration;
use sysinfo::System;

use super::percent;
use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;

pub const NAME: &str = "mem";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Physical memory in bytes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    /// Share of `total` that is not available
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPoint {
    pub mem: MemoryUsage,
    pub swap: SwapUsage,
}

impl MemoryUsage {
    pub fn new(total: u64, available: u64, used: u64, free: u64) -> Self {
        Self {
            total,
            available,
            used,
            free,
            percent: percent(total.saturating_sub(available), total),
        }
    }
}

impl SwapUsage {
    pub fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used,
            free: total.saturating_sub(used),
            percent: percent(used, total),
        }
    }
}

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME).interval(interval).build()
}

pub fn collector(interval: Duration) -> BoxedCollector {
    let mut sampler = MemorySampler::default();
    boxed(PeriodicCollector::new(config(interval), move || sampler.poll()))
}

#[derive(Default)]
pub struct MemorySampler {
    system: System,
}

impl MemorySampler {

    pub fn poll(&mut self) -> Result<MemoryPoint> {
        self.system.refresh_memory();
        let sys = &self.system;

        Ok(MemoryPoint {
            mem: MemoryUsage::new(
                sys.total_memory(),
                sys.available_memory(),
                sys.used_memory(),
                sys.free_memory(),
            ),
            swap: SwapUsage::new(sys.total_swap(), sys.used_swap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_counts_unavailable_memory() {
        let usage = MemoryUsage::new(8_000, 6_000, 1_500, 500);
        assert_eq!(usage.percent, 25.0);

        let swap = SwapUsage::new(0, 0);
        assert_eq!(swap.percent, 0.0);
        assert_eq!(swap.free, 0);
    }

    #[test]
    fn test_poll_reads_host_memory() {
        let mut sampler = MemorySampler::default();
        let point = sampler.poll().unwrap();
        assert!(point.mem.total > 0);

        let json = serde_json::to_value(&point).unwrap();
        assert!(json["mem"]["percent"].is_number());
        assert!(json["swap"]["total"].is_number());
    }
}
