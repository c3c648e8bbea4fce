// src/core/hypervisor/mod.rs

//! Thin, failure-aware wrapper over the cluster's container API.
//! `proxmox` holds the concrete implementation; this module defines
//! the trait boundary so the provisioning pipeline and tests don't
//! depend on the wire format underneath.

pub mod proxmox;

use crate::core::errors::KothError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A snapshot of a container as the hypervisor currently reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: i64,
    pub node: String,
    pub status: String,
}

/// The cluster container API. All mutating calls issue an async job and
/// block up to 3 minutes (polling every second) for its completion —
/// implementations must honor that bound so provisioning's own timeouts
/// stay meaningful.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Creates a container on `node` with the given management IP and
    /// hostname derived from `team`, blocking until the creation job
    /// completes. Returns the container's descriptor and numeric id.
    async fn create_container(
        &self,
        node: &str,
        ip: &str,
        team: &str,
    ) -> Result<(ContainerInfo, i64), KothError>;

    /// Starts a container, blocking until the start job completes.
    /// `node` may be omitted, in which case the adapter resolves it via
    /// [`Hypervisor::node_for_id`].
    async fn start(&self, node: Option<&str>, id: i64) -> Result<(), KothError>;

    /// Stops a container, blocking until the stop job completes.
    async fn stop(&self, node: Option<&str>, id: i64) -> Result<(), KothError>;

    /// Deletes a container, blocking until the delete job completes.
    async fn delete(&self, node: Option<&str>, id: i64) -> Result<(), KothError>;

    /// Reads a container's current descriptor. Read-only; does not block
    /// on a job.
    async fn get(&self, node: Option<&str>, id: i64) -> Result<ContainerInfo, KothError>;

    /// Finds which online node currently hosts container `id`.
    async fn node_for_id(&self, id: i64) -> Result<String, KothError>;

    /// Lists every container, on every online node, whose name begins
    /// with the configured hostname prefix — the containers this control
    /// plane owns.
    async fn relevant(&self) -> Result<Vec<ContainerInfo>, KothError>;

    /// Lists the currently online node names, for the provisioning
    /// pipeline's round-robin node selection.
    async fn nodes(&self) -> Result<Vec<String>, KothError>;
}
