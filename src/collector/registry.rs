use std::collections::HashMap;

use super::runner::BoxedCollector;
use crate::util::logging::Logger;

/// Startup switchboard deciding which collectors get a runner.
///
/// Collectors not listed are enabled. The registry is consulted once before
/// spawning; later changes are not picked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorRegistry {
    enabled: HashMap<String, bool>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `name -> enabled` map such as the server's `monitor_enabled`
    pub fn from_map(enabled: HashMap<String, bool>) -> Self {
        Self { enabled }
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) -> &mut Self {
        self.enabled.insert(name.into(), enabled);
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Keep only enabled collectors, logging the ones left out
    pub fn select(&self, collectors: Vec<BoxedCollector>, logger: &Logger) -> Vec<BoxedCollector> {
        collectors
            .into_iter()
            .filter(|collector| {
                let enabled = self.is_enabled(collector.name());
                if !enabled {
                    logger.info(format_args!(
                        "Collector {} disabled by configuration",
                        collector.name()
                    ));
                }
                enabled
            })
            .collect()
    }
}
