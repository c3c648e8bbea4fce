// src/core/scoring/checks.rs

//! The static check set. Each check's serializable half (`CheckDef`)
//! lives in `core::model`; the probe closures here are process-local
//! and never serialized.

use crate::core::model::CheckDef;
use crate::core::net;
use crate::core::remote_shell::RemoteShell;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const SSH_CHECK_RETRIES: u32 = 3;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared context every probe needs: an HTTP client, the control
/// plane's SSH private key path, and (for "Team Claim" only) the full
/// roster of known team names.
pub struct ProbeContext {
    pub http_client: reqwest::Client,
    pub ssh_private_key_path: String,
    pub known_team_names: Vec<String>,
}

impl ProbeContext {
    pub fn new(ssh_private_key_path: String, known_team_names: Vec<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            ssh_private_key_path,
            known_team_names,
        }
    }
}

/// The outcome of a single probe. `claimed_team` is only ever set by
/// the "Team Claim" check, naming the team whose score should be
/// credited as a side effect of this tick.
pub struct ProbeOutcome {
    pub passed: bool,
    pub claimed_team: Option<String>,
}

impl ProbeOutcome {
    fn from_bool(passed: bool) -> Self {
        Self { passed, claimed_team: None }
    }
}

type ProbeFn = for<'a> fn(
    &'a ProbeContext,
    &'a str,
    &'a str,
) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;

/// A check definition paired with its probe. Not `Clone`/`Serialize` —
/// only `CheckDef` is; callers that need the wire form use `.def`.
pub struct Check {
    pub def: CheckDef,
    pub probe: ProbeFn,
}

pub fn checks() -> Vec<Check> {
    vec![
        Check {
            def: CheckDef { name: "Ping", desc: "Check if the container is reachable", reward: 3, penalty: 1 },
            probe: |_ctx, _team, ip| Box::pin(async move { ProbeOutcome::from_bool(net::ping_once(ip).await) }),
        },
        Check {
            def: CheckDef {
                name: "Nginx Status",
                desc: "Check if the container is running Nginx by asking the webserver for content",
                reward: 2,
                penalty: 2,
            },
            probe: |ctx, _team, ip| Box::pin(probe_nginx_status(ctx, ip)),
        },
        Check {
            def: CheckDef {
                name: "Root can log in",
                desc: "Check if the root user can log in via SSH using the private key",
                reward: 1,
                penalty: 1,
            },
            probe: |ctx, _team, ip| Box::pin(probe_root_login(ctx, ip)),
        },
        Check {
            def: CheckDef { name: "API Availability", desc: "Query database entries from API", reward: 3, penalty: 1 },
            probe: |ctx, _team, ip| Box::pin(probe_api_availability(ctx, ip)),
        },
        Check {
            def: CheckDef { name: "Prometheus", desc: "Make sure the Prometheus services are online", reward: 5, penalty: 5 },
            probe: |ctx, _team, ip| Box::pin(probe_prometheus(ctx, ip)),
        },
        Check {
            def: CheckDef { name: "Grafana", desc: "Make sure the Grafana service is online", reward: 5, penalty: 1 },
            probe: |ctx, _team, ip| Box::pin(probe_grafana(ctx, ip)),
        },
        Check {
            def: CheckDef {
                name: "Team Claim",
                desc: "Check that the container identifies itself as the team it was provisioned for",
                reward: 2,
                penalty: 0,
            },
            probe: |ctx, team, ip| Box::pin(probe_team_claim(ctx, team, ip)),
        },
    ]
}

async fn probe_nginx_status(ctx: &ProbeContext, ip: &str) -> ProbeOutcome {
    let passed = match ctx.http_client.get(format!("http://{ip}")).send().await {
        Ok(resp) if resp.status().is_success() => resp
            .bytes()
            .await
            .map(|body| body.len() >= 16)
            .unwrap_or(false),
        _ => false,
    };
    ProbeOutcome::from_bool(passed)
}

async fn probe_root_login(ctx: &ProbeContext, ip: &str) -> ProbeOutcome {
    let passed = match RemoteShell::connect_with_retries(ip, &ctx.ssh_private_key_path, SSH_CHECK_RETRIES).await {
        Ok(shell) => shell.send("whoami").await.is_ok(),
        Err(_) => false,
    };
    ProbeOutcome::from_bool(passed)
}

async fn probe_api_availability(ctx: &ProbeContext, ip: &str) -> ProbeOutcome {
    let passed = match ctx.http_client.get(format!("http://{ip}:5000/get-messages")).send().await {
        Ok(resp) if resp.status().is_success() => resp.json::<serde_json::Value>().await.is_ok(),
        _ => false,
    };
    ProbeOutcome::from_bool(passed)
}

async fn systemctl_active(shell: &RemoteShell, service: &str) -> bool {
    matches!(
        shell.send_with_output(&format!("systemctl status {service}")).await,
        Ok((0, output)) if output.contains("active (running)")
    )
}

async fn probe_prometheus(ctx: &ProbeContext, ip: &str) -> ProbeOutcome {
    let passed = match RemoteShell::connect_with_retries(ip, &ctx.ssh_private_key_path, SSH_CHECK_RETRIES).await {
        Ok(shell) => systemctl_active(&shell, "prometheus").await && systemctl_active(&shell, "node_exporter").await,
        Err(_) => false,
    };
    ProbeOutcome::from_bool(passed)
}

async fn probe_grafana(ctx: &ProbeContext, ip: &str) -> ProbeOutcome {
    let passed = match RemoteShell::connect_with_retries(ip, &ctx.ssh_private_key_path, SSH_CHECK_RETRIES).await {
        Ok(shell) => systemctl_active(&shell, "grafana").await,
        Err(_) => false,
    };
    ProbeOutcome::from_bool(passed)
}

/// Asks the container which team it thinks it is and compares against
/// the name it was provisioned under. A mismatch against another known
/// team's name is reported as a claim, so the scoring tick can credit
/// the impostor team's score as a side effect.
async fn probe_team_claim(ctx: &ProbeContext, team: &str, ip: &str) -> ProbeOutcome {
    let claimed = match ctx.http_client.get(format!("http://{ip}:5000/team-name")).send().await {
        Ok(resp) if resp.status().is_success() => resp.text().await.ok().map(|s| s.trim().to_string()),
        _ => None,
    };

    match claimed {
        Some(name) if name == team => ProbeOutcome::from_bool(true),
        Some(name) if ctx.known_team_names.iter().any(|known| known == &name) => {
            ProbeOutcome { passed: false, claimed_team: Some(name) }
        }
        _ => ProbeOutcome::from_bool(false),
    }
}
