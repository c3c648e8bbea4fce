// src/server/state.rs

//! The shared state every HTTP handler and background task closes over.

use crate::config::Config;
use crate::core::bootstrap::BootstrapTokenRegistry;
use crate::core::environment::Environment;
use crate::core::hypervisor::Hypervisor;
use crate::core::persistence::{PersistenceQueue, Store};
use crate::core::provisioning::Provisioner;
use crate::core::scoring::ScoringEngine;
use crate::core::sessions::SessionRegistry;
use crate::core::ssh_keys::SshKeys;
use std::sync::Arc;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub queue: PersistenceQueue,
    pub store: Store,
    pub environment: Environment,
    pub hypervisor: Arc<dyn Hypervisor>,
    pub ssh_keys: SshKeys,
    pub bootstrap_tokens: BootstrapTokenRegistry,
    pub sessions: SessionRegistry,
    pub provisioner: Provisioner,
    pub scoring_engine: ScoringEngine,
}
