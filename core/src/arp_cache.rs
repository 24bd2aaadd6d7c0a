//! ARP resolution cache and pending-request queue.
//!
//! Maps next-hop IPv4 addresses to Ethernet addresses, buffering datagrams
//! that arrive before resolution completes.  A request lives only while
//! unresolved: it is destroyed either by a matching insertion (the caller
//! drains its buffered frames) or by the sweeper once five probes have gone
//! unanswered.
//!
//! # Concurrency
//!
//! All mutable state sits behind one [`spin::Mutex`].  Methods acquire the
//! lock, compute any I/O work, release, and return the work as
//! [`SweepAction`] values for the caller to execute — frames are never
//! transmitted with the cache lock held.  Lookups and detach operations
//! return owned copies, so callers never hold references into the table.
//!
//! # Invariants
//!
//! - At most one valid entry and at most one queued request per IPv4 address.
//! - An entry and a request for the same address never coexist:
//!   [`insert`](ArpCache::insert) detaches and returns the request.
//! - Buffered frames are deep copies owned by their request; the receive
//!   buffer they came from is only lent to the router.

use std::time::{Duration, Instant};

use log::debug;
use spin::Mutex;

use vroute_wire::{Ipv4Addr, MacAddr};

// =============================================================================
// Constants
// =============================================================================

/// Fixed capacity of the resolution cache.
pub const ARP_CACHE_SIZE: usize = 100;

/// Age past which a valid entry is invalidated by the sweeper.
pub const ENTRY_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimum spacing between probes for one unresolved address.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Probes sent before giving up and failing the buffered datagrams.
pub const MAX_PROBES: u8 = 5;

/// Frames buffered per unresolved address; the oldest is dropped on overflow.
pub const MAX_PENDING_PACKETS: usize = 64;

// =============================================================================
// Data model
// =============================================================================

/// One resolved mapping.  Slots are recycled by flipping `valid`.
struct ArpEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    added: Instant,
    valid: bool,
}

/// A frame waiting for its next hop to resolve.
///
/// The Ethernet source/destination slots stay unpopulated until resolution;
/// the egress interface was fixed by the route lookup at enqueue time and is
/// not re-evaluated.
pub struct PendingPacket {
    /// Owned copy of the full frame.
    pub frame: Vec<u8>,
    /// Egress interface recorded when the frame was queued.
    pub iface: String,
}

/// An unresolved address with its buffered frames and retry state.
///
/// Requests only exist inside the cache or detached in the hands of exactly
/// one caller; dropping a detached request releases its buffered frames.
pub struct ArpRequest {
    /// Address being resolved.
    pub ip: Ipv4Addr,
    /// Buffered frames, most recent last.  Drained newest-first.
    pub packets: Vec<PendingPacket>,
    /// When the latest probe went out; `None` before the first probe.
    sent: Option<Instant>,
    /// Probes sent so far.
    times_sent: u8,
}

impl ArpRequest {
    fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            packets: Vec::new(),
            sent: None,
            times_sent: 0,
        }
    }

    /// Probes sent so far.
    pub fn times_sent(&self) -> u8 {
        self.times_sent
    }
}

/// I/O work computed under the cache lock, executed after release.
pub enum SweepAction {
    /// Broadcast an ARP request for `ip` out of `iface`.
    Probe {
        /// Egress interface name, taken from the newest buffered frame.
        iface: String,
        /// Address to resolve.
        ip: Ipv4Addr,
    },
    /// Resolution failed; answer every buffered frame with ICMP host
    /// unreachable.  The owning request is already gone from the queue.
    HostUnreachable {
        /// The detached frames, most recent last.
        packets: Vec<PendingPacket>,
    },
}

/// Per-request verdict from the retry logic.
enum Verdict {
    /// Probed less than [`PROBE_INTERVAL`] ago — leave alone.
    Wait,
    /// Send another probe out of the named interface.
    Probe(String),
    /// Out of probes (or out of packets) — detach and fail.
    GiveUp,
}

// =============================================================================
// ArpCache
// =============================================================================

/// Inner state, behind the cache lock.
struct ArpCacheInner {
    /// Entry slots.  Grows up to [`ARP_CACHE_SIZE`]; invalidated slots are
    /// reused in place.
    entries: Vec<ArpEntry>,
    /// Unresolved requests, at most one per address.
    requests: Vec<ArpRequest>,
}

/// The ARP resolution cache and pending-request queue.
///
/// See [module documentation](self) for the locking discipline.
pub struct ArpCache {
    inner: Mutex<ArpCacheInner>,
}

impl ArpCache {
    /// Create an empty cache.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(ArpCacheInner {
                entries: Vec::new(),
                requests: Vec::new(),
            }),
        }
    }

    // =========================================================================
    // lookup
    // =========================================================================

    /// Return the hardware address for `ip` iff a valid entry exists.
    ///
    /// The address is copied out; the cache may be mutated concurrently the
    /// moment this returns.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .find(|e| e.valid && e.ip == ip)
            .map(|e| e.mac)
    }

    // =========================================================================
    // queue
    // =========================================================================

    /// Buffer a deep copy of `frame` until `ip` resolves.
    ///
    /// Finds or creates the request for `ip` and appends the copy at the head
    /// of its list.  A full list drops its oldest frame first.
    pub fn queue(&self, ip: Ipv4Addr, frame: &[u8], iface: &str) {
        let mut inner = self.inner.lock();
        let found = inner.requests.iter().position(|r| r.ip == ip);
        let pos = match found {
            Some(pos) => pos,
            None => {
                debug!("arp: new request for {} via {}", ip, iface);
                inner.requests.push(ArpRequest::new(ip));
                inner.requests.len() - 1
            }
        };
        let req = &mut inner.requests[pos];
        if req.packets.len() >= MAX_PENDING_PACKETS {
            debug!("arp: pending list full for {}, dropping oldest", ip);
            req.packets.remove(0);
        }
        req.packets.push(PendingPacket {
            frame: frame.to_vec(),
            iface: iface.to_string(),
        });
    }

    // =========================================================================
    // insert
    // =========================================================================

    /// Record that `ip` resolves to `mac`.
    ///
    /// An existing valid entry for `ip` is refreshed in place; otherwise the
    /// first invalid slot is recycled, or a fresh slot is used while capacity
    /// remains.  With the table full the mapping is not stored — entries age
    /// out within [`ENTRY_TIMEOUT`] anyway.
    ///
    /// Any queued request for `ip` is detached and returned so the caller can
    /// drain its buffered frames; dropping it releases them.
    pub fn insert(&self, mac: MacAddr, ip: Ipv4Addr, now: Instant) -> Option<ArpRequest> {
        let mut inner = self.inner.lock();

        let pos = inner.requests.iter().position(|r| r.ip == ip);
        let detached = pos.map(|p| inner.requests.swap_remove(p));

        if let Some(entry) = inner.entries.iter_mut().find(|e| e.valid && e.ip == ip) {
            entry.mac = mac;
            entry.added = now;
            return detached;
        }

        let fresh = ArpEntry {
            ip,
            mac,
            added: now,
            valid: true,
        };
        if let Some(slot) = inner.entries.iter_mut().find(|e| !e.valid) {
            *slot = fresh;
        } else if inner.entries.len() < ARP_CACHE_SIZE {
            inner.entries.push(fresh);
        } else {
            debug!("arp: cache full, not caching {} -> {}", ip, mac);
        }
        detached
    }

    // =========================================================================
    // sweep / drive
    // =========================================================================

    /// One maintenance pass: invalidate aged entries, then apply the retry
    /// logic to every queued request.
    ///
    /// Returns the probes and failure bursts for the caller to execute
    /// outside the lock.
    pub fn sweep(&self, now: Instant) -> Vec<SweepAction> {
        let mut inner = self.inner.lock();

        let mut expired = 0usize;
        for entry in inner.entries.iter_mut() {
            if entry.valid && now.saturating_duration_since(entry.added) > ENTRY_TIMEOUT {
                entry.valid = false;
                expired += 1;
            }
        }
        if expired > 0 {
            debug!("arp: invalidated {} aged entries", expired);
        }

        let mut actions = Vec::new();
        let mut i = 0;
        while i < inner.requests.len() {
            match Self::drive_request(&mut inner.requests[i], now) {
                Verdict::Wait => i += 1,
                Verdict::Probe(iface) => {
                    let ip = inner.requests[i].ip;
                    actions.push(SweepAction::Probe { iface, ip });
                    i += 1;
                }
                Verdict::GiveUp => {
                    let req = inner.requests.swap_remove(i);
                    debug!(
                        "arp: giving up on {} after {} probes, failing {} frames",
                        req.ip,
                        req.times_sent,
                        req.packets.len()
                    );
                    actions.push(SweepAction::HostUnreachable {
                        packets: req.packets,
                    });
                }
            }
        }
        actions
    }

    /// Apply the retry logic to the single request for `ip`, if one exists.
    ///
    /// The forwarding path calls this right after queueing a frame so the
    /// first probe goes out immediately instead of waiting for the next
    /// sweeper tick.
    pub fn drive(&self, ip: Ipv4Addr, now: Instant) -> Option<SweepAction> {
        let mut inner = self.inner.lock();
        let pos = inner.requests.iter().position(|r| r.ip == ip)?;
        match Self::drive_request(&mut inner.requests[pos], now) {
            Verdict::Wait => None,
            Verdict::Probe(iface) => Some(SweepAction::Probe { iface, ip }),
            Verdict::GiveUp => {
                let req = inner.requests.swap_remove(pos);
                Some(SweepAction::HostUnreachable {
                    packets: req.packets,
                })
            }
        }
    }

    /// The per-request retry step.
    ///
    /// Skips requests probed within the last [`PROBE_INTERVAL`]; gives up
    /// after [`MAX_PROBES`]; otherwise stamps the probe and names the egress
    /// interface recorded on the head buffered frame.
    fn drive_request(req: &mut ArpRequest, now: Instant) -> Verdict {
        if let Some(sent) = req.sent {
            if now.saturating_duration_since(sent) < PROBE_INTERVAL {
                return Verdict::Wait;
            }
        }
        if req.times_sent >= MAX_PROBES {
            return Verdict::GiveUp;
        }
        let Some(head) = req.packets.last() else {
            // A request with nothing to deliver has no interface to probe on.
            return Verdict::GiveUp;
        };
        let iface = head.iface.clone();
        req.sent = Some(now);
        req.times_sent += 1;
        Verdict::Probe(iface)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Number of valid entries.
    pub fn valid_entries(&self) -> usize {
        self.inner.lock().entries.iter().filter(|e| e.valid).count()
    }

    /// Number of queued requests.
    pub fn request_count(&self) -> usize {
        self.inner.lock().requests.len()
    }

    /// Frames buffered for `ip` (0 when no request exists).
    pub fn pending_count(&self, ip: Ipv4Addr) -> usize {
        let inner = self.inner.lock();
        inner
            .requests
            .iter()
            .find(|r| r.ip == ip)
            .map_or(0, |r| r.packets.len())
    }

    /// Log every valid mapping.
    pub fn dump(&self) {
        let inner = self.inner.lock();
        for entry in inner.entries.iter().filter(|e| e.valid) {
            debug!("arp:   {} -> {}", entry.ip, entry.mac);
        }
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}
