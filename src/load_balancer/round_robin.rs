//! Round-robin load balancing strategy.

use std::sync::Mutex;

use crate::fleet::BackendInstance;
use crate::load_balancer::BackendSelector;

/// Round-robin selector.
/// One shared cursor rotates over the backend list; every examined entry
/// advances it, healthy or not.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendSelector for RoundRobin {
    fn select<'a>(&self, backends: &'a [BackendInstance]) -> Option<&'a BackendInstance> {
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let mut cursor = self.cursor.lock().expect("round-robin mutex poisoned");
        // at most one full cycle
        for _ in 0..len {
            let index = *cursor % len;
            *cursor = (index + 1) % len;
            let backend = &backends[index];
            if backend.is_healthy {
                return Some(backend);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::InstanceId;

    fn backend(port: u16, is_healthy: bool) -> BackendInstance {
        BackendInstance {
            id: InstanceId::new(),
            service_id: 1,
            host: "localhost".into(),
            port,
            is_healthy,
            unhealthy_count: 0,
            container_name: format!("lb-web-demo-{port}"),
        }
    }

    fn ports(lb: &RoundRobin, backends: &[BackendInstance], n: usize) -> Vec<u16> {
        (0..n).map(|_| lb.select(backends).unwrap().port).collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let backends = vec![backend(7001, true), backend(7002, true), backend(7003, true)];
        assert_eq!(ports(&lb, &backends, 7), vec![7001, 7002, 7003, 7001, 7002, 7003, 7001]);
    }

    #[test]
    fn test_skips_unhealthy() {
        let lb = RoundRobin::new();
        let backends = vec![backend(7001, true), backend(7002, false), backend(7003, true)];
        assert_eq!(ports(&lb, &backends, 4), vec![7001, 7003, 7001, 7003]);
    }

    #[test]
    fn test_all_unhealthy() {
        let lb = RoundRobin::new();
        let backends = vec![backend(7001, false), backend(7002, false)];
        assert!(lb.select(&backends).is_none());
        assert!(lb.select(&[]).is_none());
    }

    #[test]
    fn test_shrinking_list() {
        let lb = RoundRobin::new();
        let backends = vec![backend(7001, true), backend(7002, true), backend(7003, true)];
        assert_eq!(ports(&lb, &backends, 2), vec![7001, 7002]);
        // cursor 2 wraps into the shorter list
        assert_eq!(ports(&lb, &backends[..2], 2), vec![7001, 7002]);
    }
}
