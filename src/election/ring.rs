//! Ring geometry and the election rule.

use crate::config::ElectionConfig;

/// Ports of every ring slot, in ring order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    ports: Vec<u16>,
}

impl Ring {
    /// Ring of `size` slots at `base + i * step`.
    pub fn new(base: u16, step: u16, size: usize) -> Self {
        let ports = (0..size)
            .map_while(|i| {
                let offset = u16::try_from(i).ok()?.checked_mul(step)?;
                base.checked_add(offset)
            })
            .collect();
        Self { ports }
    }

    pub fn from_config(config: &ElectionConfig, size: usize) -> Self {
        Self::new(config.base_port, config.port_step, size)
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Every other slot, starting after `own` and wrapping around.
    pub fn successors(&self, own: u16) -> Vec<u16> {
        let Some(index) = self.ports.iter().position(|p| *p == own) else {
            return Vec::new();
        };
        self.ports[index + 1..]
            .iter()
            .chain(&self.ports[..index])
            .copied()
            .collect()
    }
}

/// What a node does with an elect message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionStep {
    /// Pass the election on with this candidate.
    Forward(u16),
    /// The candidate went all the way around: this node wins.
    BecomeLeader,
}

/// Highest port wins: a lower candidate is replaced by our own port, our
/// own port coming back means every node saw it, a higher one travels on.
pub fn decide(candidate: u16, own: u16) -> ElectionStep {
    if candidate < own {
        ElectionStep::Forward(own)
    } else if candidate == own {
        ElectionStep::BecomeLeader
    } else {
        ElectionStep::Forward(candidate)
    }
}
