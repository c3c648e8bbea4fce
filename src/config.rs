// src/config.rs

//! Loads and validates server configuration from environment variables,
//! preceded by an optional `.env` file.

use anyhow::{Context, Result};

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parses a comma-separated list, trimming whitespace and dropping empty
/// entries. Missing variable yields an empty list.
fn optional_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn required_parsed<T: std::str::FromStr>(name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = required(name)?;
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("environment variable {name}='{raw}' is invalid: {e}"))
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("environment variable {name}='{raw}' is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
    pub tls_dir: Option<String>,
    pub username: String,
    pub password: String,
    /// Host/IP containers use to reach this control plane when fetching
    /// `init_script.sh`.
    pub advertise_host: String,
}

#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    pub host: String,
    pub token_id: String,
    pub token_secret: String,
    /// Node names excluded from round-robin container placement.
    pub node_skip: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub public_key_path: String,
    pub private_key_path: String,
}

#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub hostname_prefix: String,
    pub root_password: String,
    pub storage_gb: u32,
    pub memory_mb: u32,
    pub cores: u32,
    pub template: String,
    pub storage_pool: String,
    pub gateway_ipv4: String,
    pub individual_cidr: u8,
    pub nameserver: String,
    pub search_domain: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub file: String,
    pub salt: String,
    pub queue_size: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub port: u16,
}

/// Top-level configuration, assembled once at startup by [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub web_server: WebServerConfig,
    pub proxmox: ProxmoxConfig,
    pub ssh: SshConfig,
    pub container: ContainerConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads a `.env` file if present (missing file is not an error), then
    /// reads and validates every environment variable the control plane needs.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded environment overrides from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => return Err(e).context("failed to parse .env file"),
        }

        Ok(Self {
            web_server: WebServerConfig {
                host: optional("WEB_HOST", "0.0.0.0"),
                port: optional_parsed("WEB_PORT", 8080u16)?,
                tls_dir: std::env::var("WEB_TLS_DIR").ok(),
                username: required("WEB_USERNAME")?,
                password: required("WEB_PASSWORD")?,
                advertise_host: required("WEB_ADVERTISE_HOST")?,
            },
            proxmox: ProxmoxConfig {
                host: required("PROXMOX_HOST")?,
                token_id: required("PROXMOX_API_TOKEN_ID")?,
                token_secret: required("PROXMOX_API_TOKEN_SECRET")?,
                node_skip: optional_list("PROXMOX_NODE_SKIP"),
            },
            ssh: SshConfig {
                public_key_path: required("SSH_PUBLIC_KEY")?,
                private_key_path: required("SSH_PRIVATE_KEY")?,
            },
            container: ContainerConfig {
                hostname_prefix: required("CONTAINER_HOSTNAME_PREFIX")?,
                root_password: required("CONTAINER_ROOT_PASSWORD")?,
                storage_gb: required_parsed("CONTAINER_STORAGE_GB")?,
                memory_mb: required_parsed("CONTAINER_MEMORY_MB")?,
                cores: required_parsed("CONTAINER_CPU_CORES")?,
                template: required("CONTAINER_TEMPLATE")?,
                storage_pool: required("CONTAINER_STORAGE_POOL")?,
                gateway_ipv4: required("CONTAINER_GATEWAY")?,
                individual_cidr: required_parsed("CONTAINER_CIDR")?,
                nameserver: required("CONTAINER_NAMESERVER")?,
                search_domain: required("CONTAINER_SEARCH_DOMAIN")?,
            },
            database: DatabaseConfig {
                file: optional("DB_FILE", "opnlaas.db"),
                salt: required("DB_SALT")?,
                queue_size: optional_parsed("DB_QUEUE_SIZE", 256usize)?,
            },
            metrics: MetricsConfig {
                port: optional_parsed("METRICS_PORT", 9090u16)?,
            },
        })
    }

    /// `https` when TLS is configured, `http` otherwise — used to build the
    /// init-script fetch URL handed to freshly booted containers.
    pub fn init_script_scheme(&self) -> &'static str {
        if self.web_server.tls_dir.is_some() {
            "https"
        } else {
            "http"
        }
    }
}
