// src/core/scoring/mod.rs

//! The scoring engine and its auto-update loop. Each tick fans out one
//! task per container, collects deltas, then applies every mutation —
//! including the "Team Claim" cross-team credit — under a single
//! write lock before persisting.

pub mod checks;

use crate::core::environment::Environment;
use crate::core::metrics::SCORING_TICKS_TOTAL;
use crate::core::persistence::Store;
use checks::{Check, ProbeContext, checks};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{error, info};

const TICK_INTERVAL: Duration = Duration::from_secs(30);

struct TickResult {
    team_name: String,
    service_total: i64,
    service_passed: i64,
    uptime_total_delta: i64,
    uptime_passed_delta: i64,
    score_delta: i64,
    passed_checks: Vec<String>,
    failed_checks: Vec<String>,
    claim_credit: Option<String>,
}

#[derive(Clone)]
pub struct ScoringEngine {
    env: Environment,
    store: Store,
    ssh_private_key_path: String,
}

impl ScoringEngine {
    pub fn new(env: Environment, store: Store, ssh_private_key_path: String) -> Self {
        Self { env, store, ssh_private_key_path }
    }

    /// Runs one scoring tick: snapshot, fan out, barrier, apply deltas
    /// (including cross-team credit) under one write lock, then persist.
    pub async fn tick(&self) {
        let containers = self.env.snapshot();
        if containers.is_empty() {
            SCORING_TICKS_TOTAL.inc();
            return;
        }

        let known_team_names = containers.iter().map(|c| c.team.name.clone()).collect();
        let ctx = Arc::new(ProbeContext::new(self.ssh_private_key_path.clone(), known_team_names));
        let checks = Arc::new(checks());

        let futures = containers
            .iter()
            .map(|c| run_checks_for(ctx.clone(), checks.clone(), c.team.name.clone(), c.team.container_ip.clone()));
        let results = futures::future::join_all(futures).await;

        self.env.apply_scoring_batch(|live| {
            for result in &results {
                if let Some(c) = live.iter_mut().find(|c| c.team.name == result.team_name) {
                    c.updated_at = Utc::now();
                    c.passed_checks = result.passed_checks.clone();
                    c.failed_checks = result.failed_checks.clone();
                    c.team.service_checks_total = result.service_total;
                    c.team.service_checks_passed = result.service_passed;
                    c.team.uptime_checks_total += result.uptime_total_delta;
                    c.team.uptime_checks_passed += result.uptime_passed_delta;
                    c.team.score += result.score_delta;
                }
            }
            for result in &results {
                if let Some(claimed) = &result.claim_credit {
                    Environment::credit_team(live, claimed, 3);
                }
            }
        });

        for container in self.env.snapshot() {
            if let Err(e) = self.store.team_update_full(&container.team).await {
                error!("[{}]: failed to persist scoring tick: {e}", container.team.name);
            }
        }

        SCORING_TICKS_TOTAL.inc();
    }
}

async fn run_checks_for(
    ctx: Arc<ProbeContext>,
    checks: Arc<Vec<Check>>,
    team_name: String,
    ip: String,
) -> TickResult {
    let mut service_total = 0i64;
    let mut service_passed = 0i64;
    let mut uptime_total_delta = 0i64;
    let mut uptime_passed_delta = 0i64;
    let mut score_delta = 0i64;
    let mut passed_checks = Vec::new();
    let mut failed_checks = Vec::new();
    let mut claim_credit = None;

    for check in checks.iter() {
        service_total += 1;
        let outcome = (check.probe)(&ctx, &team_name, &ip).await;

        if outcome.passed {
            service_passed += 1;
            score_delta += check.def.reward;
            passed_checks.push(check.def.name.to_string());

            if check.def.name == "Ping" {
                uptime_total_delta += 1;
                uptime_passed_delta += 1;
            }
        } else {
            score_delta -= check.def.penalty;
            failed_checks.push(check.def.name.to_string());

            if check.def.name == "Ping" {
                uptime_total_delta += 1;
            }
            if let Some(claimed) = outcome.claimed_team {
                claim_credit = Some(claimed);
            }
        }
    }

    TickResult {
        team_name,
        service_total,
        service_passed,
        uptime_total_delta,
        uptime_passed_delta,
        score_delta,
        passed_checks,
        failed_checks,
        claim_credit,
    }
}

/// The auto-update loop: one eager tick at startup, then a fixed
/// 30-second ticker, selecting against a shutdown signal between
/// ticks — never cancelling a tick already in flight.
pub struct ScoringLoop {
    shutdown: Option<oneshot::Sender<()>>,
}

impl ScoringLoop {
    pub fn spawn(engine: ScoringEngine) -> Self {
        let (tx, mut rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            engine.tick().await;

            let mut ticker = interval(TICK_INTERVAL);
            ticker.tick().await; // first tick() fires immediately; skip it, we already ran eagerly

            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.tick().await,
                    _ = &mut rx => {
                        info!("scoring loop shutting down");
                        return;
                    }
                }
            }
        });

        Self { shutdown: Some(tx) }
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
