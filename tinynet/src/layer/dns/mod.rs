//! The DNS resolver.
//!
//! A stub resolver for `A` records. Queries go to one configured server over an internal UDP
//! socket that is created on first use. Answers are cached with their TTL, and a periodic update
//! timer ages the cache and sends unanswered queries again.
//!
//! Callers own a request slot while they wait, handed out from a pool on the application side.
//! A query is remembered under its slot, so the caller can come back for the result after it was
//! woken.
use crate::config::{Config, DnsConfig};
use crate::managed::Key;
use crate::socket::{Error, Progress, Result, SockAddr, SockOps, Wait, Waiter};
use crate::wire::dns::{self, dns as dns_packet, Question, Rcode, Record};
use crate::wire::Ipv4Address;

use super::{udp, Context};


/// Largest message we read from the server.
const MESSAGE_MAX: usize = 512;

#[derive(Debug)]
struct Entry {
    name: String,
    addr: Ipv4Address,
    /// Seconds left.
    ttl: u32,
}

#[derive(Debug)]
struct Query {
    name: String,
    id: u16,
    /// Seconds until the query is sent again.
    ticks: u32,
    /// Transmissions so far.
    sent: u32,
    wait: Wait,
    result: Option<Result<Ipv4Address>>,
}

/// The resolver state.
pub struct Endpoint {
    config: DnsConfig,
    socket: Option<Key>,
    cache: Vec<Entry>,
    /// Indexed by request slot.
    queries: Vec<Option<Query>>,
    next_id: u16,
}

impl Endpoint {
    pub fn new(config: &Config) -> Self {
        let config = config.dns.clone();
        Endpoint {
            cache: Vec::with_capacity(config.cache_entries),
            queries: (0..config.requests).map(|_| None).collect(),
            socket: None,
            next_id: 0,
            config,
        }
    }

    /// The internal UDP socket, once a query was sent.
    pub fn socket(&self) -> Option<Key> {
        self.socket
    }

    fn server(&self) -> SockAddr {
        SockAddr::new(self.config.server, self.config.port)
    }

    /// Resolve a name without asking the server.
    ///
    /// `localhost` and dotted quads are answered directly, everything else from the cache.
    pub fn lookup(&self, name: &str) -> Option<Ipv4Address> {
        if name.eq_ignore_ascii_case("localhost") {
            return Some(Ipv4Address::LOOPBACK);
        }
        if let Ok(addr) = name.parse::<Ipv4Address>() {
            return Some(addr);
        }
        self.cache.iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.addr)
    }

    /// Resolve `name` for the caller holding request `slot`.
    ///
    /// `Wait` means a query is outstanding, the caller attaches with [`wait`] and asks again when
    /// woken. The second call collects the result and frees the slot for the next query.
    ///
    /// [`wait`]: #method.wait
    pub fn resolve(&mut self, cx: &mut Context, udp: &mut udp::Endpoint, name: &str, slot: usize)
        -> Result<Progress<Ipv4Address>>
    {
        if name.is_empty() || name.len() > self.config.name_max {
            return Err(Error::Param);
        }
        if slot >= self.queries.len() {
            return Err(Error::Param);
        }
        if let Some(addr) = self.lookup(name) {
            self.queries[slot] = None;
            return Ok(Progress::Done(addr));
        }

        let pending = match &mut self.queries[slot] {
            Some(query) if query.name.eq_ignore_ascii_case(name) => Some(query.result.take()),
            _ => None,
        };
        match pending {
            Some(Some(result)) => {
                self.queries[slot] = None;
                return result.map(Progress::Done);
            }
            Some(None) => return Ok(Progress::Wait),
            None => (),
        }

        let key = match self.socket {
            Some(key) => key,
            None => {
                let key = udp.create()?;
                self.socket = Some(key);
                key
            }
        };
        let mut query = Query {
            name: name.to_owned(),
            id: self.next_id,
            ticks: self.config.retry_timeout,
            sent: 0,
            wait: Wait::new(),
            result: None,
        };
        self.next_id = self.next_id.wrapping_add(1);
        transmit(cx, udp, key, self.server(), &mut query)?;
        net_debug!("dns: query {} for {}", query.id, name);
        self.queries[slot] = Some(query);
        Ok(Progress::Wait)
    }

    /// Register on the query of `slot`, parking for at most the request timeout.
    pub fn wait(&mut self, slot: usize) -> Option<Waiter> {
        let timeout = self.config.request_timeout;
        let query = self.queries.get_mut(slot)?.as_mut()?;
        Some(query.wait.add(timeout))
    }

    /// Drain the internal socket, matching responses to outstanding queries.
    pub fn receive(&mut self, cx: &mut Context, udp: &mut udp::Endpoint) {
        let key = match self.socket {
            Some(key) => key,
            None => return,
        };
        let server = self.server();
        while let Ok(Progress::Done((data, from))) = udp.recv_from(cx, key, MESSAGE_MAX) {
            if from != server {
                net_debug!("dns: ignoring message from {}", from);
                continue;
            }
            self.answer(&data);
        }
    }

    fn answer(&mut self, data: &[u8]) {
        let packet = match dns_packet::new_checked(data) {
            Ok(packet) => packet,
            Err(_) => {
                net_debug!("dns: short message");
                return;
            }
        };
        let id = packet.id();
        let slot = self.queries.iter().position(|query| {
            query.as_ref().map_or(false, |query| query.id == id && query.result.is_none())
        });
        let slot = match slot {
            Some(slot) => slot,
            None => {
                net_debug!("dns: no query {}", id);
                return;
            }
        };
        if !packet.is_response() || packet.truncated() || !packet.recursion_available() {
            net_debug!("dns: unusable response to {}", id);
            return;
        }

        let name = match &self.queries[slot] {
            Some(query) => query.name.clone(),
            None => return,
        };
        let result = match parse_response(packet, data, &name) {
            Some(result) => result,
            None => {
                net_debug!("dns: response {} is not about {}", id, name);
                return;
            }
        };
        match result {
            Ok((addr, ttl)) => {
                net_debug!("dns: {} is {} for {}s", name, addr, ttl);
                self.insert(&name, addr, ttl);
            }
            Err(err) => net_debug!("dns: {}: {}", name, err),
        }
        if let Some(query) = &mut self.queries[slot] {
            let result = result.map(|(addr, _)| addr);
            query.result = Some(result);
            query.wait.wakeup(result.map(|_| ()));
        }
    }

    /// Remember an answer, replacing the entry closest to expiry when the cache is full.
    fn insert(&mut self, name: &str, addr: Ipv4Address, ttl: u32) {
        if self.config.cache_entries == 0 {
            return;
        }
        let entry = Entry { name: name.to_owned(), addr, ttl };
        if let Some(old) = self.cache.iter_mut().find(|entry| entry.name.eq_ignore_ascii_case(name)) {
            *old = entry;
        } else if self.cache.len() < self.config.cache_entries {
            self.cache.push(entry);
        } else if let Some(victim) = self.cache.iter_mut().min_by_key(|entry| entry.ttl) {
            *victim = entry;
        }
    }

    /// The periodic update: age the cache, retry or fail queries without answer.
    pub fn on_timer(&mut self, cx: &mut Context, udp: &mut udp::Endpoint) {
        let period = self.config.update_period;
        for entry in &mut self.cache {
            entry.ttl = entry.ttl.saturating_sub(period);
        }
        self.cache.retain(|entry| entry.ttl > 0);

        let key = match self.socket {
            Some(key) => key,
            None => return,
        };
        let server = self.server();
        let retry_timeout = self.config.retry_timeout;
        let retry_count = self.config.retry_count;
        for query in self.queries.iter_mut().flatten() {
            if query.result.is_some() {
                continue;
            }
            query.ticks = query.ticks.saturating_sub(period);
            if query.ticks > 0 {
                continue;
            }
            if query.sent >= retry_count {
                net_warn!("dns: no answer for {}", query.name);
                query.result = Some(Err(Error::Timeout));
                query.wait.wakeup(Err(Error::Timeout));
            } else {
                query.ticks = retry_timeout;
                if let Err(err) = transmit(cx, udp, key, server, query) {
                    net_debug!("dns: resend of {} failed: {}", query.name, err);
                }
            }
        }
    }

    /// Number of cached names.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn transmit(cx: &mut Context, udp: &mut udp::Endpoint, key: Key, server: SockAddr, query: &mut Query)
    -> Result<()>
{
    let mut message = Vec::with_capacity(MESSAGE_MAX);
    dns::emit_query(&mut message, query.id, &query.name).map_err(|_| Error::Param)?;
    query.sent += 1;
    udp.send_to(cx, key, &message, server)?;
    Ok(())
}

/// Check a response against the question it answers.
///
/// `None` for a response that does not belong to the question, it is ignored. Otherwise the
/// first address with its TTL, or the error the server reported.
fn parse_response(packet: &dns_packet, data: &[u8], name: &str) -> Option<Result<(Ipv4Address, u32)>> {
    match packet.rcode() {
        Rcode::NoError => (),
        Rcode::FormErr => return Some(Err(Error::Format)),
        Rcode::ServFail => return Some(Err(Error::ServerFailure)),
        Rcode::NxDomain => return Some(Err(Error::NotExist)),
        Rcode::Refused => return Some(Err(Error::Refused)),
        Rcode::NotImp | Rcode::Unknown(_) => return Some(Err(Error::Unknown)),
    }
    if packet.question_count() != 1 {
        return None;
    }
    let offset = dns::match_name(data, dns::HEADER_LEN, name).ok()?;
    let question = Question::parse(data, offset).ok()?;
    if question.qtype != dns::TYPE_A || question.class != dns::CLASS_INET {
        return None;
    }

    let mut offset = offset + Question::LEN;
    for _ in 0..packet.answer_count() {
        let record = match dns::skip_name(data, offset).and_then(|at| Record::parse(data, at)) {
            Ok(record) => record,
            Err(_) => return Some(Err(Error::Broken)),
        };
        if let Some(addr) = record.ipv4(data) {
            return Some(Ok((addr, record.ttl)));
        }
        offset = record.end();
    }
    Some(Err(Error::None))
}
