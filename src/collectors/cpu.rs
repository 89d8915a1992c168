use std::time::Duration;
use sysinfo::System;

use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::{AgentError, Result};

pub const NAME: &str = "cpu";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME).interval(interval).build()
}

/// Per-CPU utilisation averaged over one interval
pub fn collector(interval: Duration) -> BoxedCollector {
    let mut sampler = CpuSampler::new();
    boxed(PeriodicCollector::new(config(interval), move || sampler.poll()))
}

/// Usage is measured between two refreshes, so every value covers the whole
/// sleep that preceded it.
pub struct CpuSampler {
    system: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }

    /// Usage percent of every logical CPU since the previous refresh
    pub fn poll(&mut self) -> Result<Vec<f32>> {
        self.system.refresh_cpu_all();
        let usage: Vec<f32> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| (cpu.cpu_usage() * 10.0).round() / 10.0)
            .collect();

        if usage.is_empty() {
            return Err(AgentError::collection("no CPU information available"));
        }
        Ok(usage)
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}
