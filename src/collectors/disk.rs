use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::Disks;

use super::percent;
use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;

pub const NAME: &str = "disks";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

impl DiskUsage {
    pub fn new(total: u64, available: u64) -> Self {
        let used = total.saturating_sub(available);
        Self {
            total,
            used,
            free: available,
            percent: percent(used, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskEntry {
    pub mountpoint: String,
    pub fstype: String,
    pub usage: DiskUsage,
}

/// Mounted file systems keyed by device
pub type DiskPoint = BTreeMap<String, DiskEntry>;

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME).interval(interval).build()
}

pub fn collector(interval: Duration) -> BoxedCollector {
    boxed(PeriodicCollector::new(config(interval), poll))
}

/// Space usage of every mounted file system
pub fn poll() -> Result<DiskPoint> {
    // Rebuilt on every poll so mounts come and go with the host
    let disks = Disks::new_with_refreshed_list();
    let mut point = DiskPoint::new();

    for disk in disks.list() {
        point
            .entry(disk.name().to_string_lossy().into_owned())
            .or_insert_with(|| DiskEntry {
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
                usage: DiskUsage::new(disk.total_space(), disk.available_space()),
            });
    }

    Ok(point)
}
