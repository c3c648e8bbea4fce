// tests/common/mod.rs

//! Shared test fixtures: a no-op `Hypervisor` and a `ServerState`
//! builder that avoids any real Proxmox/SSH network calls, so the
//! black-box HTTP tests can exercise the control plane end-to-end.

use async_trait::async_trait;
use kothctl::config::{
    Config, ContainerConfig, DatabaseConfig, MetricsConfig, ProxmoxConfig, SshConfig, WebServerConfig,
};
use kothctl::core::bootstrap::BootstrapTokenRegistry;
use kothctl::core::environment::Environment;
use kothctl::core::errors::KothError;
use kothctl::core::hypervisor::{ContainerInfo, Hypervisor};
use kothctl::core::persistence::{PersistenceQueue, Store};
use kothctl::core::provisioning::Provisioner;
use kothctl::core::scoring::ScoringEngine;
use kothctl::core::sessions::SessionRegistry;
use kothctl::core::ssh_keys::SshKeys;
use kothctl::server::ServerState;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub struct FakeHypervisor {
    next_id: AtomicI64,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(100) }
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn create_container(&self, node: &str, _ip: &str, _team: &str) -> Result<(ContainerInfo, i64), KothError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok((ContainerInfo { id, node: node.to_string(), status: "stopped".to_string() }, id))
    }

    async fn start(&self, _node: Option<&str>, _id: i64) -> Result<(), KothError> {
        Ok(())
    }

    async fn stop(&self, _node: Option<&str>, _id: i64) -> Result<(), KothError> {
        Ok(())
    }

    async fn delete(&self, _node: Option<&str>, _id: i64) -> Result<(), KothError> {
        Ok(())
    }

    async fn get(&self, node: Option<&str>, id: i64) -> Result<ContainerInfo, KothError> {
        Ok(ContainerInfo { id, node: node.unwrap_or("node1").to_string(), status: "running".to_string() })
    }

    async fn node_for_id(&self, _id: i64) -> Result<String, KothError> {
        Ok("node1".to_string())
    }

    async fn relevant(&self) -> Result<Vec<ContainerInfo>, KothError> {
        Ok(Vec::new())
    }

    async fn nodes(&self) -> Result<Vec<String>, KothError> {
        Ok(vec!["node1".to_string()])
    }
}

pub fn test_config() -> Config {
    Config {
        web_server: WebServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            tls_dir: None,
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            advertise_host: "127.0.0.1".to_string(),
        },
        proxmox: ProxmoxConfig {
            host: "proxmox.invalid".to_string(),
            token_id: "test@pve!test".to_string(),
            token_secret: "secret".to_string(),
            node_skip: Vec::new(),
        },
        ssh: SshConfig {
            public_key_path: "unused.pub".to_string(),
            private_key_path: "unused".to_string(),
        },
        container: ContainerConfig {
            hostname_prefix: "koth".to_string(),
            root_password: "changeme".to_string(),
            storage_gb: 8,
            memory_mb: 1024,
            cores: 1,
            template: "local:vztmpl/debian-12.tar.zst".to_string(),
            storage_pool: "local-lvm".to_string(),
            gateway_ipv4: "10.0.0.1".to_string(),
            individual_cidr: 24,
            nameserver: "1.1.1.1".to_string(),
            search_domain: "koth.local".to_string(),
        },
        database: DatabaseConfig {
            file: ":memory:".to_string(),
            salt: "test-salt".to_string(),
            queue_size: 32,
        },
        metrics: MetricsConfig { port: 0 },
    }
}

/// Builds a full `ServerState` against an in-memory store and a fake
/// hypervisor — no real network or subprocess calls anywhere.
pub async fn test_state() -> ServerState {
    let config = Arc::new(test_config());

    let queue = PersistenceQueue::connect(":memory:", config.database.queue_size)
        .await
        .expect("in-memory sqlite connects");
    let store = Store::new(queue.clone());

    let dir = tempfile::tempdir().expect("tempdir");
    let pub_path = dir.path().join("id_rsa.pub");
    let priv_path = dir.path().join("id_rsa");
    let ssh_keys = SshKeys::load_or_generate(pub_path.to_str().unwrap(), priv_path.to_str().unwrap())
        .expect("ssh keypair generates");
    std::mem::forget(dir); // keep the temp dir alive for the test's lifetime

    let environment = Environment::new();
    let hypervisor: Arc<dyn Hypervisor> = Arc::new(FakeHypervisor::new());
    let bootstrap_tokens = BootstrapTokenRegistry::new();
    let sessions = SessionRegistry::new();

    let provisioner = Provisioner::new(
        &config,
        environment.clone(),
        store.clone(),
        hypervisor.clone(),
        ssh_keys.clone(),
        bootstrap_tokens.clone(),
    );
    let scoring_engine = ScoringEngine::new(environment.clone(), store.clone(), ssh_keys.private_key_path.clone());

    ServerState {
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
    }
}
