//! # config
//!
//! why: give every node an immutable view of the cluster it belongs to
//! relations: owned by ServerContext, read by roles for quorum and peer sets
//! what: ConsensusConfig with membership, client sources, timeout bounds

use crate::ServerId;
use std::collections::BTreeMap;
use std::time::Duration;

/// how the node is driven: embedded in a caller's loop, or on its own thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// caller invokes `Server::run_once` itself
    InProcess,
    /// `Server::run` loops with a heartbeat-interval sleep
    Threaded,
}

/// static membership view; no dynamic reconfiguration
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    servers: BTreeMap<ServerId, String>,
    client_source_ids: Vec<u32>,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    pub execution_mode: ExecutionMode,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            client_source_ids: Vec::new(),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            execution_mode: ExecutionMode::InProcess,
        }
    }
}

impl ConsensusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, id: ServerId, address: impl Into<String>) -> Self {
        self.servers.insert(id, address.into());
        self
    }

    pub fn with_client_source(mut self, source_id: u32) -> Self {
        self.client_source_ids.push(source_id);
        self
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// strict majority of the configured server set
    pub fn quorum_size(&self) -> usize {
        self.servers.len() / 2 + 1
    }

    pub fn address(&self, id: ServerId) -> Option<&str> {
        self.servers.get(&id).map(String::as_str)
    }

    /// every configured server except `self_id`
    pub fn peer_ids(&self, self_id: ServerId) -> Vec<ServerId> {
        self.servers.keys().copied().filter(|&id| id != self_id).collect()
    }

    pub fn is_client_source(&self, source_id: u32) -> bool {
        self.client_source_ids.contains(&source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_strict_majority() {
        let mut config = ConsensusConfig::new();
        for id in 1..=3 {
            config = config.with_server(id, format!("node-{id}"));
        }
        assert_eq!(config.quorum_size(), 2);

        for id in 4..=5 {
            config = config.with_server(id, format!("node-{id}"));
        }
        assert_eq!(config.quorum_size(), 3);
    }

    #[test]
    fn single_server_cluster_has_quorum_of_one() {
        let config = ConsensusConfig::new().with_server(1, "solo");
        assert_eq!(config.quorum_size(), 1);
    }

    #[test]
    fn peer_ids_excludes_self() {
        let config = ConsensusConfig::new()
            .with_server(1, "a")
            .with_server(2, "b")
            .with_server(3, "c");
        assert_eq!(config.peer_ids(1), vec![2, 3]);
    }
}
