// src/main.rs

//! Entry point: dispatches to `run` (serve HTTP + scoring), `init`
//! (interactive bulk team provisioning), or `purge` (tear down every
//! owned container and wipe local state).

use anyhow::{Context, Result};
use kothctl::config::Config;
use kothctl::core::bootstrap::BootstrapTokenRegistry;
use kothctl::core::environment::Environment;
use kothctl::core::hypervisor::Hypervisor;
use kothctl::core::hypervisor::proxmox::ProxmoxHypervisor;
use kothctl::core::model::{validate_ipv4, validate_team_name};
use kothctl::core::persistence::{PersistenceQueue, Store};
use kothctl::core::provisioning::Provisioner;
use kothctl::core::ssh_keys::SshKeys;
use kothctl::server;
use std::io::BufRead;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    let (filter, _reload_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let result = match command {
        Some("run") => run_command().await,
        Some("init") => init_command().await,
        Some("purge") => purge_command().await,
        _ => {
            eprintln!("usage: kothctl <run|init|purge>");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run_command() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    server::run(config).await
}

/// Reads `name,ip` pairs from stdin (one per line, blank lines and
/// `#`-prefixed lines ignored) and runs them through the bucketed bulk
/// provisioning pipeline.
async fn init_command() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let queue = PersistenceQueue::connect(&config.database.file, config.database.queue_size)
        .await
        .context("failed to open persistence queue")?;
    let store = Store::new(queue.clone());

    let ssh_keys = SshKeys::load_or_generate(&config.ssh.public_key_path, &config.ssh.private_key_path)
        .context("failed to load or generate SSH keypair")?;

    let hypervisor: std::sync::Arc<dyn Hypervisor> = std::sync::Arc::new(
        ProxmoxHypervisor::connect(&config, ssh_keys.public_key_openssh.clone())
            .await
            .context("failed to connect to the hypervisor cluster")?,
    );

    let environment = Environment::new();
    let bootstrap_tokens = BootstrapTokenRegistry::new();
    let provisioner = Provisioner::new(
        &config,
        environment.clone(),
        store.clone(),
        hypervisor.clone(),
        ssh_keys.clone(),
        bootstrap_tokens.clone(),
    );

    let stdin = std::io::stdin();
    let mut inputs = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, ip)) = line.split_once(',') else {
            warn!("skipping malformed line (expected 'name,ip'): {line}");
            continue;
        };
        let (name, ip) = (name.trim().to_string(), ip.trim().to_string());
        if let Err(e) = validate_team_name(&name).and_then(|_| validate_ipv4(&ip)) {
            warn!("skipping invalid entry '{line}': {e}");
            continue;
        }
        inputs.push((name, ip));
    }

    if inputs.is_empty() {
        warn!("no team entries read from stdin, nothing to provision");
        return Ok(());
    }

    info!("provisioning {} team(s)", inputs.len());
    provisioner.bulk_create(&inputs).await;
    queue.shutdown();
    Ok(())
}

/// Stops and deletes every container this control plane owns, then
/// removes the SSH keypair and the local store file.
async fn purge_command() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let ssh_keys = SshKeys::load_or_generate(&config.ssh.public_key_path, &config.ssh.private_key_path)
        .context("failed to load or generate SSH keypair")?;
    let hypervisor = ProxmoxHypervisor::connect(&config, ssh_keys.public_key_openssh.clone())
        .await
        .context("failed to connect to the hypervisor cluster")?;

    let owned = hypervisor.relevant().await.context("failed to list owned containers")?;
    info!("purging {} owned container(s)", owned.len());

    for c in owned {
        if let Err(e) = hypervisor.stop(Some(&c.node), c.id).await {
            warn!("failed to stop container {} on {}: {e}", c.id, c.node);
        }
        if let Err(e) = hypervisor.delete(Some(&c.node), c.id).await {
            warn!("failed to delete container {} on {}: {e}", c.id, c.node);
        }
    }

    for path in [&config.ssh.public_key_path, &config.ssh.private_key_path, &config.database.file] {
        match std::fs::remove_file(path) {
            Ok(()) => info!("removed {path}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {path}: {e}"),
        }
    }

    info!("purge complete");
    Ok(())
}
