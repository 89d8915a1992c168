use serde::Serialize;
use std::fs;
use std::time::Duration;
use sysinfo::Networks;

use crate::collector::{BoxedCollector, CollectorConfig, PeriodicCollector, boxed};
use crate::error::Result;

pub const NAME: &str = "net";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const TCP_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];
const UDP_TABLES: [&str; 2] = ["/proc/net/udp", "/proc/net/udp6"];

/// Traffic counters summed over every interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
}

impl NetCounters {
    /// Current totals since boot
    pub fn read() -> Self {
        let networks = Networks::new_with_refreshed_list();
        networks
            .iter()
            .fold(NetCounters::default(), |acc, (_, data)| NetCounters {
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
                bytes_recv: acc.bytes_recv + data.total_received(),
                packets_sent: acc.packets_sent + data.total_packets_transmitted(),
                packets_recv: acc.packets_recv + data.total_packets_received(),
                errin: acc.errin + data.total_errors_on_received(),
                errout: acc.errout + data.total_errors_on_transmitted(),
            })
    }

    /// Growth since `previous`; counters that went backwards report zero
    pub fn since(&self, previous: &NetCounters) -> NetCounters {
        NetCounters {
            bytes_sent: self.bytes_sent.saturating_sub(previous.bytes_sent),
            bytes_recv: self.bytes_recv.saturating_sub(previous.bytes_recv),
            packets_sent: self.packets_sent.saturating_sub(previous.packets_sent),
            packets_recv: self.packets_recv.saturating_sub(previous.packets_recv),
            errin: self.errin.saturating_sub(previous.errin),
            errout: self.errout.saturating_sub(previous.errout),
        }
    }
}

/// Sockets grouped by connection phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SocketTally {
    pub connected: u64,
    pub connecting: u64,
    pub closing: u64,
    pub listening: u64,
    pub unknown: u64,
}

impl SocketTally {
    /// Tally the kernel socket tables; missing tables count as empty
    pub fn read() -> Self {
        let mut tally = SocketTally::default();
        for path in TCP_TABLES {
            if let Ok(table) = fs::read_to_string(path) {
                tally.add_tcp_table(&table);
            }
        }
        for path in UDP_TABLES {
            if let Ok(table) = fs::read_to_string(path) {
                tally.unknown += table_rows(&table).count() as u64;
            }
        }
        tally
    }

    /// Count every row of a `/proc/net/tcp`-style table by its `st` column
    pub fn add_tcp_table(&mut self, table: &str) {
        for row in table_rows(table) {
            match row.split_whitespace().nth(3) {
                Some(state) => self.add_tcp_state(state),
                None => self.unknown += 1,
            }
        }
    }

    fn add_tcp_state(&mut self, state: &str) {
        match u8::from_str_radix(state, 16) {
            // ESTABLISHED
            Ok(0x01) => self.connected += 1,
            // SYN_SENT, SYN_RECV
            Ok(0x02 | 0x03) => self.connecting += 1,
            // FIN_WAIT1, FIN_WAIT2, TIME_WAIT, CLOSE_WAIT, LAST_ACK, CLOSING
            Ok(0x04 | 0x05 | 0x06 | 0x08 | 0x09 | 0x0B) => self.closing += 1,
            // LISTEN
            Ok(0x0A) => self.listening += 1,
            _ => self.unknown += 1,
        }
    }
}

fn table_rows(table: &str) -> impl Iterator<Item = &str> {
    table.lines().skip(1).filter(|line| !line.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkPoint {
    pub counters: NetCounters,
    pub sockets: SocketTally,
}

pub fn config(interval: Duration) -> CollectorConfig {
    CollectorConfig::builder(NAME).interval(interval).build()
}

pub fn collector(interval: Duration) -> BoxedCollector {
    let mut sampler = NetworkSampler::new();
    boxed(PeriodicCollector::new(config(interval), move || sampler.poll()))
}

/// Traffic since the previous poll plus a socket state summary
pub struct NetworkSampler {
    previous: NetCounters,
}

impl NetworkSampler {
    pub fn new() -> Self {
        Self {
            previous: NetCounters::read(),
        }
    }

    pub fn poll(&mut self) -> Result<NetworkPoint> {
        let sockets = SocketTally::read();
        let current = NetCounters::read();
        let counters = current.since(&self.previous);
        self.previous = current;

        Ok(NetworkPoint { counters, sockets })
    }
}

impl Default for NetworkSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41234 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 41235 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:C350 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000        0 41236 1 0000000000000000 20 4 30 10 -1
   3: 0A00000F:D2F0 5DB8D822:01BB 02 00000001:00000000 01:00000064 00000002  1000        0 41240 1 0000000000000000 200 0 0 10 -1
   4: 0A00000F:B4C2 5DB8D822:01BB 06 00000000:00000000 03:00001770 00000000     0        0 0 3 0000000000000000
   5: 0A00000F:B4C4 5DB8D822:01BB 08 00000000:00000000 00:00000000 00000000  1000        0 41250 1 0000000000000000 20 4 0 10 -1
   6: 0A00000F:B4C6 5DB8D822:01BB 07 00000000:00000000 00:00000000 00000000  1000        0 41251 1 0000000000000000 20 4 0 10 -1
";

    #[test]
    fn test_tcp_states_are_grouped() {
        let mut tally = SocketTally::default();
        tally.add_tcp_table(TCP_TABLE);

        assert_eq!(
            tally,
            SocketTally {
                connected: 2,
                connecting: 1,
                closing: 2,
                listening: 1,
                unknown: 1,
            }
        );
    }

    #[test]
    fn test_header_only_table_counts_nothing() {
        let mut tally = SocketTally::default();
        tally.add_tcp_table(TCP_TABLE.lines().next().unwrap());
        assert_eq!(tally, SocketTally::default());
    }

    #[test]
    fn test_counter_delta_never_underflows() {
        let before = NetCounters {
            bytes_sent: 1_000,
            bytes_recv: 5_000,
            packets_sent: 10,
            packets_recv: 40,
            errin: 2,
            errout: 0,
        };
        let after = NetCounters {
            bytes_sent: 1_500,
            bytes_recv: 4_000,
            packets_sent: 12,
            packets_recv: 45,
            errin: 2,
            errout: 1,
        };

        let delta = after.since(&before);
        assert_eq!(delta.bytes_sent, 500);
        assert_eq!(delta.bytes_recv, 0);
        assert_eq!(delta.packets_recv, 5);
        assert_eq!(delta.errout, 1);
    }

    #[test]
    fn test_poll_serializes_counters_and_sockets() {
        let mut sampler = NetworkSampler::new();
        let point = sampler.poll().unwrap();

        let json = serde_json::to_value(point).unwrap();
        assert!(json["counters"]["bytes_sent"].is_u64());
        assert!(json["sockets"]["listening"].is_u64());
    }
}
