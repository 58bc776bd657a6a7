//! Worker addressing.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, WorkerId};

/// Complete address of a worker process: socket plus identities.
///
/// Lifecycle events carry the address of the worker currently hosting an
/// actor; the submitter records the worker identity so each outgoing
/// request names its intended recipient, and compares sockets to detect
/// redundant reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAddress {
    /// IP address of the worker (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Port the worker listens on.
    pub port: u16,
    /// Identity of the worker process.
    pub worker_id: WorkerId,
    /// Identity of the node hosting the worker.
    pub node_id: NodeId,
}

impl WorkerAddress {
    /// Create a new worker address.
    pub fn new(ip: IpAddr, port: u16, worker_id: WorkerId, node_id: NodeId) -> Self {
        Self {
            ip,
            port,
            worker_id,
            node_id,
        }
    }

    /// Whether two addresses name the same socket, regardless of the
    /// worker identity they carry.
    pub fn same_endpoint(&self, other: &WorkerAddress) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl Default for WorkerAddress {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            worker_id: WorkerId::default(),
            node_id: NodeId::default(),
        }
    }
}

impl fmt::Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}
