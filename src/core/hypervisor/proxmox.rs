// src/core/hypervisor/proxmox.rs

//! Proxmox VE implementation of [`Hypervisor`]. Talks to the node-scoped
//! REST API directly over `reqwest` rather than through a client crate.

use super::{ContainerInfo, Hypervisor};
use crate::config::{Config, ContainerConfig, ProxmoxConfig};
use crate::core::errors::KothError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);
const JOB_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct NodeStatus {
    node: String,
    status: String,
}

#[derive(Deserialize)]
struct LxcEntry {
    vmid: i64,
    name: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct TaskStatus {
    status: String,
    exitstatus: Option<String>,
}

pub struct ProxmoxHypervisor {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
    container: ContainerConfig,
    ssh_public_key: String,
    node_skip: Vec<String>,
}

impl ProxmoxHypervisor {
    /// Connects to the cluster, discovering the currently online node
    /// set up front.
    pub async fn connect(cfg: &Config, ssh_public_key: String) -> Result<Self, KothError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(KothError::from)?;

        let hv = Self {
            client,
            base_url: format!("https://{}/api2/json", cfg.proxmox.host),
            auth_header: Self::token_header(&cfg.proxmox),
            container: cfg.container.clone(),
            ssh_public_key,
            node_skip: cfg.proxmox.node_skip.clone(),
        };

        let nodes = hv.online_nodes().await?;
        info!(count = nodes.len(), "discovered online proxmox nodes");
        Ok(hv)
    }

    fn token_header(proxmox: &ProxmoxConfig) -> String {
        format!("PVEAPIToken={}={}", proxmox.token_id, proxmox.token_secret)
    }

    async fn online_nodes(&self) -> Result<Vec<String>, KothError> {
        let url = format!("{}/nodes", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<Vec<NodeStatus>>>()
            .await
            .map_err(KothError::from)?;

        Ok(resp
            .data
            .into_iter()
            .filter(|n| n.status == "online" && !self.node_skip.iter().any(|skip| skip == &n.node))
            .map(|n| n.node)
            .collect())
    }

    fn auth_header_cached(&self) -> &str {
        &self.auth_header
    }

    async fn next_vmid(&self) -> Result<i64, KothError> {
        let url = format!("{}/cluster/nextid", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<String>>()
            .await
            .map_err(KothError::from)?;
        resp.data.parse::<i64>().map_err(KothError::from)
    }

    async fn wait_for_task(&self, node: &str, upid: &str) -> Result<(), KothError> {
        let url = format!("{}/nodes/{node}/tasks/{upid}/status", self.base_url);
        let deadline = tokio::time::Instant::now() + JOB_TIMEOUT;
        loop {
            let resp = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header_cached())
                .send()
                .await
                .map_err(KothError::from)?
                .error_for_status()
                .map_err(KothError::from)?
                .json::<ApiEnvelope<TaskStatus>>()
                .await
                .map_err(KothError::from)?;

            if resp.data.status == "stopped" {
                return match resp.data.exitstatus.as_deref() {
                    Some("OK") | None => Ok(()),
                    Some(other) => Err(KothError::Transient(format!(
                        "proxmox task {upid} on {node} exited: {other}"
                    ))),
                };
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(KothError::Transient(format!(
                    "proxmox task {upid} on {node} did not complete within {JOB_TIMEOUT:?}"
                )));
            }
            sleep(JOB_POLL_INTERVAL).await;
        }
    }

    fn hostname_for(&self, team: &str) -> String {
        format!("{}-{}", self.container.hostname_prefix, team)
            .to_lowercase()
            .replace(' ', "-")
    }
}

#[async_trait]
impl Hypervisor for ProxmoxHypervisor {
    async fn create_container(
        &self,
        node: &str,
        ip: &str,
        team: &str,
    ) -> Result<(ContainerInfo, i64), KothError> {
        let vmid = self.next_vmid().await?;
        let hostname = self.hostname_for(team);

        let body = json!({
            "vmid": vmid,
            "ostemplate": self.container.template,
            "storage": self.container.storage_pool,
            "hostname": hostname,
            "password": self.container.root_password,
            "rootfs": format!("{}:{}", self.container.storage_pool, self.container.storage_gb),
            "memory": self.container.memory_mb,
            "cores": self.container.cores,
            "net0": format!(
                "name=eth0,bridge=vmbr0,firewall=1,gw={},ip={}/{}",
                self.container.gateway_ipv4, ip, self.container.individual_cidr
            ),
            "nameserver": self.container.nameserver,
            "searchdomain": self.container.search_domain,
            "unprivileged": 1,
            "features": "nesting=1",
            "ssh-public-keys": self.ssh_public_key,
        });

        let url = format!("{}/nodes/{node}/lxc", self.base_url);
        let upid = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header_cached())
            .json(&body)
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<String>>()
            .await
            .map_err(KothError::from)?
            .data;

        self.wait_for_task(node, &upid).await?;

        let info = self.get(Some(node), vmid).await?;
        Ok((info, vmid))
    }

    async fn start(&self, node: Option<&str>, id: i64) -> Result<(), KothError> {
        let node = match node {
            Some(n) => n.to_string(),
            None => self.node_for_id(id).await?,
        };
        let url = format!("{}/nodes/{node}/lxc/{id}/status/start", self.base_url);
        let upid = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<String>>()
            .await
            .map_err(KothError::from)?
            .data;
        self.wait_for_task(&node, &upid).await
    }

    async fn stop(&self, node: Option<&str>, id: i64) -> Result<(), KothError> {
        let node = match node {
            Some(n) => n.to_string(),
            None => self.node_for_id(id).await?,
        };
        let url = format!("{}/nodes/{node}/lxc/{id}/status/stop", self.base_url);
        let upid = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<String>>()
            .await
            .map_err(KothError::from)?
            .data;
        self.wait_for_task(&node, &upid).await
    }

    async fn delete(&self, node: Option<&str>, id: i64) -> Result<(), KothError> {
        let node = match node {
            Some(n) => n.to_string(),
            None => self.node_for_id(id).await?,
        };
        let url = format!("{}/nodes/{node}/lxc/{id}", self.base_url);
        let upid = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<String>>()
            .await
            .map_err(KothError::from)?
            .data;
        self.wait_for_task(&node, &upid).await
    }

    async fn get(&self, node: Option<&str>, id: i64) -> Result<ContainerInfo, KothError> {
        let node = match node {
            Some(n) => n.to_string(),
            None => self.node_for_id(id).await?,
        };
        let url = format!("{}/nodes/{node}/lxc/{id}/status/current", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header_cached())
            .send()
            .await
            .map_err(KothError::from)?
            .error_for_status()
            .map_err(KothError::from)?
            .json::<ApiEnvelope<Value>>()
            .await
            .map_err(KothError::from)?;

        let status = resp
            .data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Ok(ContainerInfo { id, node, status })
    }

    async fn node_for_id(&self, id: i64) -> Result<String, KothError> {
        for node in self.online_nodes().await? {
            let url = format!("{}/nodes/{node}/lxc/{id}/status/current", self.base_url);
            let resp = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header_cached())
                .send()
                .await
                .map_err(KothError::from)?;
            if resp.status().is_success() {
                return Ok(node);
            }
        }
        Err(KothError::NotFound(format!("container {id} on any online node")))
    }

    async fn relevant(&self) -> Result<Vec<ContainerInfo>, KothError> {
        let mut owned = Vec::new();
        for node in self.online_nodes().await? {
            let url = format!("{}/nodes/{node}/lxc", self.base_url);
            let resp = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header_cached())
                .send()
                .await
                .map_err(KothError::from)?
                .error_for_status()
                .map_err(KothError::from)?
                .json::<ApiEnvelope<Vec<LxcEntry>>>()
                .await
                .map_err(KothError::from)?;

            for entry in resp.data {
                if entry
                    .name
                    .as_deref()
                    .is_some_and(|n| n.starts_with(&self.container.hostname_prefix))
                {
                    owned.push(ContainerInfo {
                        id: entry.vmid,
                        node: node.clone(),
                        status: entry.status,
                    });
                }
            }
        }
        Ok(owned)
    }

    async fn nodes(&self) -> Result<Vec<String>, KothError> {
        self.online_nodes().await
    }
}
