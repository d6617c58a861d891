// src/ports.rs

//! Host port resolution
//!
//! Some platforms refuse host ports below a floor (Runtipi reserves < 1000,
//! Umbrel < 10000) and all of them need distinct ports across the catalog.
//! One `PortResolver` lives per platform for a whole run so assignments never
//! collide, and the catalog is walked in sorted order so the result is the
//! same on every run.

use crate::record::PortMapping;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortError {
    #[error("No free host port left at or above {floor}")]
    Exhausted { floor: u16 },
}

/// Per-platform port rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPolicy {
    /// Lowest acceptable host port (0 accepts everything)
    pub floor: u16,
    /// Well-known replacements tried first for ports below the floor
    pub substitutions: Vec<(u16, u16)>,
    /// Added to ports below the floor (8080 -> 18080)
    pub offset: Option<u16>,
}

impl PortPolicy {
    /// Accept every requested port as-is
    pub fn passthrough() -> Self {
        Self {
            floor: 0,
            substitutions: Vec::new(),
            offset: None,
        }
    }
}

/// How a host port was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStrategy {
    Override,
    Passthrough,
    Substitution,
    Offset,
    Sequence,
}

impl fmt::Display for PortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Override => "override",
            Self::Passthrough => "passthrough",
            Self::Substitution => "substitution",
            Self::Offset => "offset",
            Self::Sequence => "sequence",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPort {
    pub container_port: u16,
    pub host_port: u16,
    pub strategy: PortStrategy,
}

/// Parse compose short port syntax (`[ip:]host:container[/proto]`)
pub fn parse_port_mapping(s: &str) -> Option<PortMapping> {
    PortMapping::parse_short(s.trim())
}

/// Stateful resolver for one platform
#[derive(Debug, Clone)]
pub struct PortResolver {
    policy: PortPolicy,
    next: u32,
    assigned: BTreeSet<u16>,
}

impl PortResolver {
    pub fn new(policy: PortPolicy) -> Self {
        let next = u32::from(policy.floor);
        Self {
            policy,
            next,
            assigned: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> &PortPolicy {
        &self.policy
    }

    /// Ports handed out so far
    pub fn assigned(&self) -> &BTreeSet<u16> {
        &self.assigned
    }

    /// Pick the host port for `container_port`
    ///
    /// Order: explicit override, then the requested port when it clears the
    /// floor, then a well-known substitution, then the offset, then the next
    /// free port counting up from the floor.
    pub fn resolve(
        &mut self,
        container_port: u16,
        requested: u16,
        override_port: Option<u16>,
    ) -> Result<ResolvedPort, PortError> {
        if let Some(port) = override_port {
            self.assigned.insert(port);
            return Ok(self.resolved(container_port, port, PortStrategy::Override));
        }

        if requested >= self.policy.floor {
            self.assigned.insert(requested);
            return Ok(self.resolved(container_port, requested, PortStrategy::Passthrough));
        }

        if let Some(port) = self.substitute(requested) {
            self.assigned.insert(port);
            return Ok(self.resolved(container_port, port, PortStrategy::Substitution));
        }

        if let Some(port) = self.offset(requested) {
            self.assigned.insert(port);
            return Ok(self.resolved(container_port, port, PortStrategy::Offset));
        }

        let port = self.next_free()?;
        self.assigned.insert(port);
        Ok(self.resolved(container_port, port, PortStrategy::Sequence))
    }

    fn substitute(&self, requested: u16) -> Option<u16> {
        self.policy
            .substitutions
            .iter()
            .find(|(from, _)| *from == requested)
            .map(|(_, to)| *to)
            .filter(|to| *to >= self.policy.floor && !self.assigned.contains(to))
    }

    fn offset(&self, requested: u16) -> Option<u16> {
        let offset = self.policy.offset?;
        let port = requested.checked_add(offset)?;
        (port >= self.policy.floor && !self.assigned.contains(&port)).then_some(port)
    }

    fn next_free(&mut self) -> Result<u16, PortError> {
        while self.next <= u32::from(u16::MAX) {
            let candidate = self.next as u16;
            self.next += 1;
            if !self.assigned.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(PortError::Exhausted {
            floor: self.policy.floor,
        })
    }

    fn resolved(&self, container_port: u16, host_port: u16, strategy: PortStrategy) -> ResolvedPort {
        ResolvedPort {
            container_port,
            host_port,
            strategy,
        }
    }
}
