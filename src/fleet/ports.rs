//! Host port allocation for new instances.
//!
//! Each kind of port has its own monotonically increasing counter. A port is
//! handed out at most once per process lifetime so a freshly started
//! container never collides with one that is still being torn down. Once a
//! counter passes 65535 that kind is exhausted and allocation fails.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::PortConfig;
use crate::fleet::model::Service;

/// Ports reserved for one load-balancer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbPorts {
    pub port: u16,
    pub health_port: u16,
}

/// Monotonic per-kind port counters.
#[derive(Debug)]
pub struct PortAllocator {
    backend: AtomicU32,
    lb: AtomicU32,
    lb_health: AtomicU32,
}

/// Hand out the counter's value and advance it, unless it left the port range.
fn take(counter: &AtomicU32) -> Option<u16> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
            u16::try_from(next).ok().map(|_| next + 1)
        })
        .ok()
        .and_then(|port| u16::try_from(port).ok())
}

impl PortAllocator {
    pub fn new(config: &PortConfig) -> Self {
        Self {
            backend: AtomicU32::new(config.backend_start.into()),
            lb: AtomicU32::new(config.lb_start.into()),
            lb_health: AtomicU32::new(config.lb_health_start.into()),
        }
    }

    /// Next backend port, or `None` once the range is used up.
    pub fn next_backend(&self) -> Option<u16> {
        take(&self.backend)
    }

    /// Next load-balancer port pair, or `None` once either range is used up.
    pub fn next_lb(&self) -> Option<LbPorts> {
        Some(LbPorts {
            port: take(&self.lb)?,
            health_port: take(&self.lb_health)?,
        })
    }

    /// Move every counter past the ports already used by adopted instances.
    pub fn seed_from(&self, services: &[Service]) {
        for service in services {
            for backend in &service.backends {
                self.backend
                    .fetch_max(u32::from(backend.port) + 1, Ordering::Relaxed);
            }
            for lb in &service.load_balancers {
                self.lb.fetch_max(u32::from(lb.port) + 1, Ordering::Relaxed);
                self.lb_health
                    .fetch_max(u32::from(lb.health_port) + 1, Ordering::Relaxed);
            }
        }
    }
}
