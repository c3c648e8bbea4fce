// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the control plane.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait
/// implementations.
#[derive(Error, Debug, Clone)]
pub enum KothError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("queue timeout")]
    QueueTimeout,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("remote job timed out: {0}")]
    RemoteJobTimeout(String),

    #[error("remote init script exited with code {code}: {output}")]
    RemoteExit { code: i32, output: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for KothError {
    fn from(e: std::io::Error) -> Self {
        KothError::Io(Arc::new(e))
    }
}

impl From<sqlx::Error> for KothError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => KothError::NotFound("row".to_string()),
            other => KothError::Internal(format!("store error: {other}")),
        }
    }
}

impl From<reqwest::Error> for KothError {
    fn from(e: reqwest::Error) -> Self {
        KothError::Transient(format!("hypervisor HTTP error: {e}"))
    }
}

impl From<std::num::ParseIntError> for KothError {
    fn from(_: std::num::ParseIntError) -> Self {
        KothError::BadInput("not an integer".to_string())
    }
}

impl From<anyhow::Error> for KothError {
    fn from(e: anyhow::Error) -> Self {
        KothError::Internal(e.to_string())
    }
}
