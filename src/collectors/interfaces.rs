use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use sysinfo::Networks;

use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;
use crate::measurement::MeasurementKind;

pub const NAME: &str = "ip";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    pub addr: String,
    pub prefix: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceAddresses {
    pub v4: Vec<AddressEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub v6: Vec<AddressEntry>,
}

pub type InterfacePoint = BTreeMap<String, InterfaceAddresses>;

/// Group `(interface, address, prefix)` triples, leaving out loopback
pub fn group_addresses<'a, I>(addresses: I) -> InterfacePoint
where
    I: IntoIterator<Item = (&'a str, IpAddr, u8)>,
{
    let mut point = InterfacePoint::new();
    for (interface, addr, prefix) in addresses {
        if interface == "lo" || addr.is_loopback() {
            continue;
        }
        let entry = AddressEntry {
            addr: addr.to_string(),
            prefix,
        };
        let block = point.entry(interface.to_string()).or_default();
        match addr {
            IpAddr::V4(_) => block.v4.push(entry),
            IpAddr::V6(_) => block.v6.push(entry),
        }
    }
    point
}

/// Polls first, then sleeps
pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME)
        .kind(MeasurementKind::Info)
        .interval(interval)
        .poll_immediately(true)
        .build()
}

pub fn collector(interval: Duration) -> BoxedCollector {
    boxed(PeriodicCollector::new(config(interval), poll))
}

/// Addresses assigned to each network interface
pub fn poll() -> Result<InterfacePoint> {
    let networks = Networks::new_with_refreshed_list();
    Ok(group_addresses(networks.iter().flat_map(|(name, data)| {
        data.ip_networks()
            .iter()
            .map(move |network| (name.as_str(), network.addr, network.prefix))
    })))
}
