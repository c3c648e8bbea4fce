// src/server/initialization.rs

//! Builds a [`ServerState`] from [`Config`]: opens the persistence
//! queue, loads or generates the SSH keypair, connects to the
//! hypervisor, and rebuilds the in-memory Environment from whatever
//! teams are already on disk.

use super::state::ServerState;
use crate::config::Config;
use crate::core::bootstrap::BootstrapTokenRegistry;
use crate::core::environment::Environment;
use crate::core::hypervisor::Hypervisor;
use crate::core::hypervisor::proxmox::ProxmoxHypervisor;
use crate::core::model::Container;
use crate::core::persistence::{PersistenceQueue, Store};
use crate::core::provisioning::Provisioner;
use crate::core::scoring::ScoringEngine;
use crate::core::sessions::SessionRegistry;
use crate::core::ssh_keys::SshKeys;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup(config: Config) -> Result<ServerState> {
    let config = Arc::new(config);

    let queue = PersistenceQueue::connect(&config.database.file, config.database.queue_size)
        .await
        .context("failed to open persistence queue")?;
    let store = Store::new(queue.clone());
    info!("persistence queue ready at {}", config.database.file);

    let ssh_keys = SshKeys::load_or_generate(&config.ssh.public_key_path, &config.ssh.private_key_path)
        .context("failed to load or generate SSH keypair")?;

    let hypervisor: Arc<dyn Hypervisor> = Arc::new(
        ProxmoxHypervisor::connect(&config, ssh_keys.public_key_openssh.clone())
            .await
            .context("failed to connect to the hypervisor cluster")?,
    );

    let environment = Environment::new();
    pull_from_store(&environment, &store, hypervisor.as_ref()).await?;
    environment.log_summary();

    let bootstrap_tokens = BootstrapTokenRegistry::new();
    let sessions = SessionRegistry::new();
    sessions.spawn_cleaner();

    let provisioner = Provisioner::new(
        &config,
        environment.clone(),
        store.clone(),
        hypervisor.clone(),
        ssh_keys.clone(),
        bootstrap_tokens.clone(),
    );

    let scoring_engine = ScoringEngine::new(environment.clone(), store.clone(), ssh_keys.private_key_path.clone());

    Ok(ServerState {
        config,
        queue,
        store,
        environment,
        hypervisor,
        ssh_keys,
        bootstrap_tokens,
        sessions,
        provisioner,
        scoring_engine,
    })
}

/// Rebuilds the Environment's container list from every team row
/// already on disk, refusing to run twice against a populated
/// environment. Aborts on the first container lookup failure rather
/// than leaving the environment partially populated.
async fn pull_from_store(environment: &Environment, store: &Store, hypervisor: &dyn Hypervisor) -> Result<()> {
    if !environment.is_empty() {
        anyhow::bail!("environment already populated");
    }

    let teams = store.team_list().await.context("failed to list teams from store")?;
    for team in teams {
        let info = hypervisor
            .get(None, team.container_id)
            .await
            .with_context(|| format!("failed to get container {} for team '{}'", team.container_id, team.name))?;
        environment.push(Container::new(team, info.status));
    }

    if environment.is_empty() {
        warn!("no containers found in the store");
    }

    Ok(())
}
