// src/core/model.rs

//! Data model shared across the persistence, provisioning, and scoring
//! subsystems: `Team` rows, `Blob` rows, the in-memory `Container` runtime
//! record, and the static `Check` definition.

use crate::core::errors::KothError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TEAM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\- ]+$").expect("static regex is valid"));

/// Validates a team name: letters, digits, underscore, hyphen, and space only.
pub fn validate_team_name(name: &str) -> Result<(), KothError> {
    if name.is_empty() || !TEAM_NAME_RE.is_match(name) {
        return Err(KothError::BadInput(format!(
            "team name '{name}' does not match ^[A-Za-z0-9_\\- ]+$"
        )));
    }
    Ok(())
}

/// Validates an IPv4 dotted-quad, rejecting octet overflow.
pub fn validate_ipv4(ip: &str) -> Result<(), KothError> {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return Err(KothError::BadInput(format!("'{ip}' is not an IPv4 dotted-quad")));
    }
    for part in parts {
        part.parse::<u8>()
            .map_err(|_| KothError::BadInput(format!("'{ip}' has an out-of-range octet")))?;
    }
    Ok(())
}

/// A persisted team row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub container_ip: String,
    pub container_id: i64,
    pub score: i64,
    pub uptime_checks_total: i64,
    pub uptime_checks_passed: i64,
    pub service_checks_total: i64,
    pub service_checks_passed: i64,
}

impl Team {
    pub fn new(name: String, container_ip: String, container_id: i64) -> Self {
        Self {
            name,
            container_ip,
            container_id,
            score: 0,
            uptime_checks_total: 0,
            uptime_checks_passed: 0,
            service_checks_total: 0,
            service_checks_passed: 0,
        }
    }

    /// Uptime as a 0..1, 2-decimal fraction, defaulting to 1.0 when no
    /// uptime samples have been taken yet.
    pub fn uptime_fraction(&self) -> f64 {
        if self.uptime_checks_total == 0 {
            return 1.0;
        }
        (self.uptime_checks_passed as f64 / self.uptime_checks_total as f64 * 100.0).round() / 100.0
    }
}

/// A persisted opaque blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blob {
    pub name: String,
    pub value: String,
}

/// A free-form durable snapshot kept in a blob; exposed for callers
/// that want to track the maximum attainable score without the
/// scoring engine depending on it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SavedState {
    pub total_possible_points: i64,
}

/// The in-memory runtime record pairing a `Team` with its last observed
/// hypervisor status and last scoring tick's named checks.
#[derive(Debug, Clone)]
pub struct Container {
    pub team: Team,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub passed_checks: Vec<String>,
    pub failed_checks: Vec<String>,
}

impl Container {
    pub fn new(team: Team, status: String) -> Self {
        Self {
            team,
            status,
            updated_at: Utc::now(),
            passed_checks: Vec::new(),
            failed_checks: Vec::new(),
        }
    }
}

/// A static check definition. `probe` is a pure function
/// of the team's container state; the scoring engine supplies the rest of
/// the environment (hypervisor, shell, HTTP client) via `ProbeContext`.
#[derive(Clone, Serialize, Deserialize)]
pub struct CheckDef {
    pub name: &'static str,
    pub desc: &'static str,
    pub reward: i64,
    pub penalty: i64,
}
