//! Tunable limits and protocol constants of a stack.
//!
//! Everything here has a default matching a small embedded deployment. A [`Config`] is consumed by
//! `Stack::new` and is read-only afterwards.
//!
//! [`Config`]: struct.Config.html
use core::ops::Range;

use crate::wire::Ipv4Address;

/// The complete configuration of one stack.
#[derive(Clone, Debug)]
pub struct Config {
    pub tcp: TcpConfig,
    pub udp: UdpConfig,
    pub raw: RawConfig,
    pub dns: DnsConfig,
    /// Requests that may be queued to the engine before senders block.
    pub mailbox: usize,
    /// Local ports handed out to sockets that were not bound explicitly.
    pub dynamic_ports: Range<u16>,
    /// How long `close` waits for the connection to finish, in milliseconds.
    pub close_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Number of connection records, including listeners and `TIME_WAIT` leftovers.
    pub max_sockets: usize,
    pub send_buffer: usize,
    pub recv_buffer: usize,
    /// Idle time before the first keepalive probe, in seconds.
    pub keepalive_idle: u32,
    /// Time between keepalive probes, in seconds.
    pub keepalive_interval: u32,
    /// Unanswered probes before the connection is dropped.
    pub keepalive_probes: u32,
    /// Initial retransmission timeout, in milliseconds.
    pub initial_rto: u64,
    /// Upper bound of the doubled retransmission timeout, in milliseconds.
    pub max_rto: u64,
    /// Retransmissions of one segment before the connection is aborted.
    pub retries: u32,
    /// Maximum segment lifetime, in milliseconds. `TIME_WAIT` lasts twice as long.
    pub msl: u64,
    /// Segment size when the route does not tell better.
    pub default_mss: u16,
}

#[derive(Clone, Debug)]
pub struct UdpConfig {
    pub max_sockets: usize,
    /// Datagrams buffered per socket before new ones are dropped.
    pub recv_queue: usize,
}

#[derive(Clone, Debug)]
pub struct RawConfig {
    pub max_sockets: usize,
    pub recv_queue: usize,
}

#[derive(Clone, Debug)]
pub struct DnsConfig {
    /// Resolver to query for names not in the cache.
    pub server: Ipv4Address,
    pub port: u16,
    /// Longest name accepted for resolution.
    pub name_max: usize,
    /// Queries that may be outstanding at once.
    pub requests: usize,
    /// How long a caller waits for its query, in milliseconds.
    pub request_timeout: u64,
    pub cache_entries: usize,
    /// Period of the cache and retry timer, in seconds.
    pub update_period: u32,
    /// Seconds before an unanswered query is sent again.
    pub retry_timeout: u32,
    /// Transmissions of one query before giving up.
    pub retry_count: u32,
}

impl Config {
    /// Total number of sockets the handle table can hold.
    pub fn max_handles(&self) -> usize {
        self.tcp.max_sockets + self.udp.max_sockets + self.raw.max_sockets
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tcp: TcpConfig::default(),
            udp: UdpConfig::default(),
            raw: RawConfig::default(),
            dns: DnsConfig::default(),
            mailbox: 10,
            dynamic_ports: 1024..65535,
            close_timeout: 5000,
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            max_sockets: 10,
            send_buffer: 4096,
            recv_buffer: 4096,
            keepalive_idle: 2 * 60 * 60,
            keepalive_interval: 5,
            keepalive_probes: 10,
            initial_rto: 1000,
            max_rto: 8000,
            retries: 5,
            msl: 5000,
            default_mss: 536,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig { max_sockets: 10, recv_queue: 50 }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig { max_sockets: 10, recv_queue: 50 }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            server: Ipv4Address::new(8, 8, 8, 8),
            port: crate::wire::dns::PORT,
            name_max: 64,
            requests: 10,
            request_timeout: 5000,
            cache_entries: 10,
            update_period: 1,
            retry_timeout: 5,
            retry_count: 5,
        }
    }
}
