//! The protocol layers run by the engine.
//!
//! Each layer keeps its records in an [`Endpoint`]-like structure owned by the `Stack`. Layers
//! never call each other directly on input; the stack dispatches a received datagram to every
//! interested layer and hands each the pieces of shared state it needs.
//!
//! * [`ip`] owns the interfaces and devices, picks routes and wraps/unwraps IPv4.
//! * [`raw`] delivers whole datagrams of one protocol, e.g. ICMP.
//! * [`udp`] queues datagrams per socket.
//! * [`tcp`] runs the connection state machine.
//! * [`dns`] resolves names over an internal UDP socket.
//!
//! [`Endpoint`]: ip/struct.Endpoint.html
//! [`ip`]: ip/index.html
//! [`raw`]: raw/index.html
//! [`udp`]: udp/index.html
//! [`tcp`]: tcp/index.html
//! [`dns`]: dns/index.html
pub mod dns;
pub mod ip;
pub mod raw;
pub mod tcp;
pub mod udp;

#[cfg(test)]
mod harness;

use crate::config::Config;
use crate::managed::Key;
use crate::timer::Timers;

/// Everything a timer may be armed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    /// The retransmission timer of a TCP connection.
    Retransmit(Key),
    /// The keepalive timer of a TCP connection.
    Keepalive(Key),
    /// End of the `TIME_WAIT` period, frees the record.
    TimeWait(Key),
    /// Periodic maintenance of the DNS cache and outstanding queries.
    DnsUpdate,
}

/// Shared state lent to a layer while it handles one request, datagram or timer.
pub struct Context<'a> {
    pub config: &'a Config,
    pub ip: &'a mut ip::Endpoint,
    pub timers: &'a mut Timers<TimerEvent>,
}

/// Hands out local ports from the dynamic range, rotating through it.
#[derive(Debug)]
pub(crate) struct PortAllocator {
    next: u16,
}

impl PortAllocator {
    pub(crate) fn new(config: &Config) -> Self {
        PortAllocator { next: config.dynamic_ports.start }
    }

    /// Find a port for which `used` is false, starting after the last one handed out.
    pub(crate) fn alloc(&mut self, config: &Config, used: impl Fn(u16) -> bool) -> Option<u16> {
        let range = config.dynamic_ports.clone();
        let span = range.end.saturating_sub(range.start);
        for _ in 0..span {
            if self.next < range.start || self.next >= range.end {
                self.next = range.start;
            }
            let port = self.next;
            self.next = self.next.wrapping_add(1);
            if !used(port) {
                return Some(port);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_rotate_and_skip_used() {
        let mut config = Config::default();
        config.dynamic_ports = 5000..5003;
        let mut ports = PortAllocator::new(&config);
        assert_eq!(ports.alloc(&config, |_| false), Some(5000));
        assert_eq!(ports.alloc(&config, |port| port == 5001), Some(5002));
        // Wraps around to the start of the range.
        assert_eq!(ports.alloc(&config, |_| false), Some(5000));
        assert_eq!(ports.alloc(&config, |_| true), None);
    }
}
