use serde::Serialize;
use std::time::Duration;
use sysinfo::System;

use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;
use crate::measurement::MeasurementKind;

pub const NAME: &str = "processes";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);
const TOP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEntry {
    /// Command line, or the executable name when it is unavailable
    pub name: String,
    pub cpu: f32,
    /// Resident memory as a share of physical memory
    pub mem: f64,
}

/// The `n` entries with the highest CPU usage, busiest first
pub fn top_by_cpu(mut entries: Vec<ProcessEntry>, n: usize) -> Vec<ProcessEntry> {
    entries.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
    entries.truncate(n);
    entries
}

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME)
        .kind(MeasurementKind::Info)
        .interval(interval)
        .build()
}

/// The busiest processes of the last interval
pub fn collector(interval: Duration) -> BoxedCollector {
    let mut sampler = ProcessSampler::new();
    boxed(PeriodicCollector::new(config(interval), move || sampler.poll()))
}

pub struct ProcessSampler {
    system: System,
}

impl ProcessSampler {
    pub fn new() -> Self {
        // First refresh sets the baseline CPU usage is measured against
        let mut system = System::new();
        system.refresh_all();
        Self { system }
    }

    pub fn poll(&mut self) -> Result<Vec<ProcessEntry>> {
        self.system.refresh_all();
        let total_memory = self.system.total_memory();

        let entries = self
            .system
            .processes()
            .values()
            .map(|process| {
                let cmd = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let name = if cmd.trim().is_empty() {
                    process.name().to_string_lossy().into_owned()
                } else {
                    cmd
                };
                let mem = if total_memory == 0 {
                    0.0
                } else {
                    process.memory() as f64 / total_memory as f64 * 100.0
                };

                ProcessEntry {
                    name,
                    cpu: process.cpu_usage(),
                    mem,
                }
            })
            .collect();

        Ok(top_by_cpu(entries, TOP))
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}
