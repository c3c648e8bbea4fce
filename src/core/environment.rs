// src/core/environment.rs

//! The in-memory runtime registry of provisioned containers. Holds the
//! container list behind a single `RwLock` and the node round-robin
//! counter used by the provisioning pipeline.

use crate::core::hypervisor::ContainerInfo;
use crate::core::metrics::TEAMS_TRACKED;
use crate::core::model::{Container, Team};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

#[derive(Clone)]
pub struct Environment {
    inner: Arc<RwLock<Vec<Container>>>,
    node_creation_tracker: Arc<AtomicUsize>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            node_creation_tracker: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The next node to provision onto, round-robin across `nodes`. The
    /// counter lives here, not on the hypervisor adapter — the adapter
    /// is handed the chosen node as a plain parameter.
    pub fn next_node<'a>(&self, nodes: &'a [String]) -> Option<&'a str> {
        if nodes.is_empty() {
            return None;
        }
        let idx = self.node_creation_tracker.fetch_add(1, Ordering::SeqCst) % nodes.len();
        Some(nodes[idx].as_str())
    }

    pub fn push(&self, container: Container) {
        let mut guard = self.inner.write();
        guard.push(container);
        TEAMS_TRACKED.set(guard.len() as f64);
    }

    pub fn remove_by_name(&self, team_name: &str) -> Option<Container> {
        let mut guard = self.inner.write();
        let idx = guard.iter().position(|c| c.team.name == team_name)?;
        let removed = guard.remove(idx);
        TEAMS_TRACKED.set(guard.len() as f64);
        Some(removed)
    }

    pub fn by_name(&self, team_name: &str) -> Option<Container> {
        self.inner.read().iter().find(|c| c.team.name == team_name).cloned()
    }

    pub fn snapshot(&self) -> Vec<Container> {
        self.inner.read().clone()
    }

    pub fn team_names(&self) -> Vec<String> {
        self.inner.read().iter().map(|c| c.team.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logs a one-line-per-container status table as a single startup
    /// log burst.
    pub fn log_summary(&self) {
        for container in self.inner.read().iter() {
            info!(
                "container id: {}, team: {}, health: {}",
                container.team.container_id, container.team.name, container.status
            );
        }
    }

    /// Applies a batch of mutations under one write lock: each
    /// container's fresh checks/score plus any cross-team side-effect
    /// credits collected during the same scoring tick. Taking a single
    /// lock for the whole batch keeps the "Team Claim" credit to
    /// another team's score safe against concurrent per-task writers.
    pub fn apply_scoring_batch<F>(&self, mutate: F)
    where
        F: FnOnce(&mut [Container]),
    {
        let mut guard = self.inner.write();
        mutate(&mut guard);
    }

    pub fn credit_team(containers: &mut [Container], team_name: &str, delta: i64) {
        if let Some(c) = containers.iter_mut().find(|c| c.team.name == team_name) {
            c.team.score += delta;
        }
    }

    pub fn update_container_info(&self, team_name: &str, info: ContainerInfo) {
        let mut guard = self.inner.write();
        if let Some(c) = guard.iter_mut().find(|c| c.team.name == team_name) {
            c.status = info.status;
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_container(name: &str) -> Container {
        Container::new(Team::new(name.to_string(), "10.0.0.2".to_string(), 101), "running".to_string())
    }

    #[test]
    fn round_robin_wraps_across_nodes() {
        let env = Environment::new();
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(env.next_node(&nodes), Some("a"));
        assert_eq!(env.next_node(&nodes), Some("b"));
        assert_eq!(env.next_node(&nodes), Some("c"));
        assert_eq!(env.next_node(&nodes), Some("a"));
    }

    #[test]
    fn next_node_is_none_with_no_nodes() {
        let env = Environment::new();
        assert_eq!(env.next_node(&[]), None);
    }

    #[test]
    fn credit_team_only_touches_named_team() {
        let mut containers = vec![make_container("Alpha"), make_container("Beta")];
        Environment::credit_team(&mut containers, "Beta", 3);
        assert_eq!(containers[0].team.score, 0);
        assert_eq!(containers[1].team.score, 3);
    }

    #[test]
    fn push_and_remove_round_trip() {
        let env = Environment::new();
        env.push(make_container("Alpha"));
        assert_eq!(env.len(), 1);
        let removed = env.remove_by_name("Alpha").unwrap();
        assert_eq!(removed.team.name, "Alpha");
        assert!(env.is_empty());
    }
}
