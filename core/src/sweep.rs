//! Cache sweeper — the router's single timer.
//!
//! One tick per second: invalidate resolution entries older than
//! [`ENTRY_TIMEOUT`](crate::arp_cache::ENTRY_TIMEOUT), then drive every
//! unresolved request — re-probe ones that have been quiet for a second,
//! fail ones that have exhausted their probes.  The cache computes the work
//! under its lock; the tick executes it afterwards, so probe and error
//! frames go out without the lock held.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::pipeline::Router;

/// Spacing between maintenance ticks.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

impl Router {
    /// Run one maintenance tick at `now`.
    ///
    /// Exposed separately from [`spawn`] so embedders with their own timer
    /// (and tests) can drive the cadence themselves.
    pub fn sweep_tick(&self, now: Instant) {
        for action in self.cache().sweep(now) {
            self.execute(action);
        }
    }
}

/// Start the sweeper thread.
///
/// The thread ticks once per [`SWEEP_INTERVAL`] for the life of the process;
/// there is no shutdown signal — the router is torn down by process exit.
pub fn spawn(router: Arc<Router>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("arp-sweeper".into())
        .spawn(move || {
            loop {
                thread::sleep(SWEEP_INTERVAL);
                router.sweep_tick(Instant::now());
            }
        })
}
