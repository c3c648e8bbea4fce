// src/core/provisioning/mod.rs

//! The four-stage allocate/start/initialize/commit provisioning
//! pipeline, plus bucketed/barriered and naive bulk variants.

use crate::config::Config;
use crate::core::bootstrap::BootstrapTokenRegistry;
use crate::core::environment::Environment;
use crate::core::errors::KothError;
use crate::core::hypervisor::Hypervisor;
use crate::core::metrics::{PROVISIONING_FAILURE_TOTAL, PROVISIONING_SUCCESS_TOTAL};
use crate::core::model::{Container, Team};
use crate::core::net;
use crate::core::persistence::Store;
use crate::core::remote_shell::RemoteShell;
use crate::core::ssh_keys::SshKeys;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

const BUCKET_SIZE: usize = 10;
const NAIVE_SPACING: Duration = Duration::from_secs(10);
const SSH_CONNECT_RETRIES: u32 = 10;

#[derive(Clone)]
pub struct Provisioner {
    env: Environment,
    store: Store,
    hypervisor: Arc<dyn Hypervisor>,
    ssh_keys: SshKeys,
    bootstrap: BootstrapTokenRegistry,
    advertise_host: String,
    web_port: u16,
    scheme: &'static str,
}

impl Provisioner {
    pub fn new(
        cfg: &Config,
        env: Environment,
        store: Store,
        hypervisor: Arc<dyn Hypervisor>,
        ssh_keys: SshKeys,
        bootstrap: BootstrapTokenRegistry,
    ) -> Self {
        Self {
            env,
            store,
            hypervisor,
            ssh_keys,
            bootstrap,
            advertise_host: cfg.web_server.advertise_host.clone(),
            web_port: cfg.web_server.port,
            scheme: cfg.init_script_scheme(),
        }
    }

    /// Stage 1: refuse if the team already exists, pick the next
    /// round-robin node, request creation, block for completion.
    async fn allocate(&self, team: &str, ip: &str) -> Result<i64, KothError> {
        if self.store.team_exists(team).await {
            return Err(KothError::AlreadyExists(format!("team '{team}'")));
        }

        let nodes = self.hypervisor.nodes().await?;
        let node = self
            .env
            .next_node(&nodes)
            .ok_or_else(|| KothError::Internal("no online hypervisor nodes available".into()))?
            .to_string();

        info!("[{team}][{ip}]: allocating container on node {node}");
        let (_, ctid) = self.hypervisor.create_container(&node, ip, team).await?;
        info!("[{team}][{ip}]: container CT-{ctid} allocated");
        Ok(ctid)
    }

    /// Stage 2: start the container and wait for the job to complete.
    async fn start(&self, team: &str, ip: &str, ctid: i64) -> Result<(), KothError> {
        self.hypervisor.start(None, ctid).await?;
        info!("[{team}][{ip}]: container CT-{ctid} started");
        Ok(())
    }

    /// Stage 3: wait for ICMP reachability, open a shell, run the
    /// bootstrap script.
    async fn initialize(&self, team: &str, ip: &str, ctid: i64) -> Result<(), KothError> {
        if !net::wait_online(ip).await {
            return Err(KothError::RemoteJobTimeout(format!(
                "container CT-{ctid} never became reachable at {ip}"
            )));
        }
        info!("[{team}][{ip}]: container CT-{ctid} is online");

        let shell = RemoteShell::connect_with_retries(ip, &self.ssh_keys.private_key_path, SSH_CONNECT_RETRIES).await?;
        info!("[{team}][{ip}]: ssh connection established");

        let token = self.bootstrap.mint();
        let cmd = format!(
            "wget -O /tmp/init_script.sh \"{}://{}:{}/init_script.sh?token={}\" && sed -i 's/\\r$//' /tmp/init_script.sh && chmod +x /tmp/init_script.sh && bash /tmp/init_script.sh \"{}\" && rm /tmp/init_script.sh",
            self.scheme, self.advertise_host, self.web_port, token, team
        );

        let (exit, output) = shell.send_with_output(&cmd).await?;
        if exit != 0 {
            return Err(KothError::RemoteExit { code: exit, output });
        }
        info!("[{team}][{ip}]: container CT-{ctid} initialized");
        Ok(())
    }

    /// Stage 4: persist the `Team` row, re-fetch the container
    /// descriptor, attach a runtime `Container` record to the
    /// Environment.
    async fn commit(&self, team: &str, ip: &str, ctid: i64) -> Result<Container, KothError> {
        let saved = self
            .store
            .team_create(Team::new(team.to_string(), ip.to_string(), ctid))
            .await?;

        let info = self.hypervisor.get(None, ctid).await?;
        let container = Container::new(saved, info.status);
        self.env.push(container.clone());
        info!("[{team}][{ip}]: container added to environment");
        Ok(container)
    }

    /// Runs stages 1→4 in order for a single team. Any stage's error
    /// aborts the create; no automatic rollback of earlier stages — the
    /// caller purges the orphan via the purge flow.
    pub async fn create_single(&self, team: &str, ip: &str) -> Result<Container, KothError> {
        let result = async {
            let ctid = self.allocate(team, ip).await?;
            self.start(team, ip, ctid).await?;
            self.initialize(team, ip, ctid).await?;
            self.commit(team, ip, ctid).await
        }
        .await;

        match &result {
            Ok(_) => PROVISIONING_SUCCESS_TOTAL.inc(),
            Err(_) => PROVISIONING_FAILURE_TOTAL.inc(),
        }
        result
    }

    /// Bucketed/barriered bulk create: within each bucket of
    /// `BUCKET_SIZE`, stage 1 runs sequentially (hypervisor
    /// id allocation is serialized), then stages 2 and 3 run in parallel
    /// across the bucket, then stage 4 runs sequentially to preserve
    /// insertion order. A per-input failure is logged and drops that
    /// input from the rest of the bucket.
    pub async fn bulk_create(&self, inputs: &[(String, String)]) {
        for bucket in inputs.chunks(BUCKET_SIZE) {
            let mut allocated: Vec<(String, String, i64)> = Vec::new();
            for (team, ip) in bucket {
                match self.allocate(team, ip).await {
                    Ok(ctid) => allocated.push((team.clone(), ip.clone(), ctid)),
                    Err(e) => {
                        error!("[{team}][{ip}]: failed to allocate container: {e}");
                        PROVISIONING_FAILURE_TOTAL.inc();
                    }
                }
            }

            let started = self
                .run_stage_in_parallel(&allocated, |this, team, ip, ctid| {
                    let this = this.clone();
                    let team = team.to_string();
                    let ip = ip.to_string();
                    async move { this.start(&team, &ip, ctid).await }
                })
                .await;

            let initialized = self
                .run_stage_in_parallel(&started, |this, team, ip, ctid| {
                    let this = this.clone();
                    let team = team.to_string();
                    let ip = ip.to_string();
                    async move { this.initialize(&team, &ip, ctid).await }
                })
                .await;

            for (team, ip, ctid) in &initialized {
                match self.commit(team, ip, *ctid).await {
                    Ok(_) => PROVISIONING_SUCCESS_TOTAL.inc(),
                    Err(e) => {
                        error!("[{team}][{ip}]: failed to commit container CT-{ctid}: {e}");
                        PROVISIONING_FAILURE_TOTAL.inc();
                    }
                }
            }
        }
    }

    /// Runs `stage` over every `(team, ip, ctid)` in `batch` concurrently,
    /// logging and dropping entries whose stage fails.
    async fn run_stage_in_parallel<F, Fut>(
        &self,
        batch: &[(String, String, i64)],
        stage: F,
    ) -> Vec<(String, String, i64)>
    where
        F: Fn(&Self, &str, &str, i64) -> Fut,
        Fut: std::future::Future<Output = Result<(), KothError>>,
    {
        let futures = batch
            .iter()
            .map(|(team, ip, ctid)| stage(self, team, ip, *ctid));
        let results = futures::future::join_all(futures).await;

        batch
            .iter()
            .zip(results)
            .filter_map(|((team, ip, ctid), result)| match result {
                Ok(()) => Some((team.clone(), ip.clone(), *ctid)),
                Err(e) => {
                    error!("[{team}][{ip}]: stage failed for container CT-{ctid}: {e}");
                    PROVISIONING_FAILURE_TOTAL.inc();
                    None
                }
            })
            .collect()
    }

    /// Naive bulk create (kept alongside the bucketed version for
    /// comparison/tests): fans out full stage-1-to-4 pipelines per
    /// input, spaced 10 seconds apart.
    pub async fn naive_bulk_create(&self, inputs: &[(String, String)]) {
        let mut handles = Vec::new();
        for (team, ip) in inputs {
            let this = self.clone();
            let team = team.clone();
            let ip = ip.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = this.create_single(&team, &ip).await {
                    error!("[{team}][{ip}]: failed to create container: {e}");
                }
            }));
            sleep(NAIVE_SPACING).await;
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
