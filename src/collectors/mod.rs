//! Host collectors shipped with the agent
pub mod cpu;
pub mod disk;
pub mod interfaces;
pub mod load;
pub mod memory;
pub mod network;
pub mod process;

pub use cpu::CpuSampler;
pub use memory::MemorySampler;
pub use network::NetworkSampler;
pub use process::ProcessSampler;

use crate::collector::BoxedCollector;
use crate::config::AgentSettings;

/// Every built-in collector, with intervals taken from `settings`
pub fn builtin_collectors(settings: &AgentSettings) -> Vec<BoxedCollector> {
    let interval = |name: &str, default| settings.interval_for(name, default);

    vec![
        cpu::collector(interval(cpu::NAME, cpu::DEFAULT_INTERVAL)),
        memory::collector(interval(memory::NAME, memory::DEFAULT_INTERVAL)),
        load::collector(interval(load::NAME, load::DEFAULT_INTERVAL)),
        disk::collector(interval(disk::NAME, disk::DEFAULT_INTERVAL)),
        network::collector(interval(network::NAME, network::DEFAULT_INTERVAL)),
        process::collector(interval(process::NAME, process::DEFAULT_INTERVAL)),
        interfaces::collector(interval(interfaces::NAME, interfaces::DEFAULT_INTERVAL)),
    ]
}

/// `part` as a percentage of `whole`, rounded to one decimal
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}
