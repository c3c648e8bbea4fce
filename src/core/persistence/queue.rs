// src/core/persistence/queue.rs

//! A process-wide single-consumer work queue. Every durable read or
//! write is expressed as a boxed closure submitted to the queue;
//! one worker task drains it in FIFO order against a single owned
//! connection, guaranteeing at most one in-flight store call at any
//! instant. Submission is synchronous from the caller's point of view:
//! the caller awaits the queued operation's result.

use crate::core::errors::KothError;
use crate::core::metrics::PERSISTENCE_QUEUE_DEPTH;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{info, warn};

const MAX_CONNECT_RETRIES: u32 = 5;
const CONNECT_RETRY_BASE: Duration = Duration::from_millis(100);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

pub const TEAMS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS teams (
    name TEXT PRIMARY KEY NOT NULL,
    container_ip TEXT NOT NULL,
    container_id INTEGER NOT NULL,
    score INTEGER NOT NULL,
    uptimeChecksTotal INTEGER DEFAULT 0,
    uptimeChecksPassed INTEGER DEFAULT 0,
    serviceChecksTotal INTEGER DEFAULT 0,
    serviceChecksPassed INTEGER DEFAULT 0
);";

pub const BLOBS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS blobs (
    name TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

/// A unit of queued work: given exclusive access to the connection, produce
/// a boxed future that runs to completion before the next job is dequeued.
type Job = Box<dyn for<'c> FnOnce(&'c mut SqliteConnection) -> Pin<Box<dyn Future<Output = ()> + Send + 'c>> + Send>;

/// The single-writer persistence queue. Cloning is cheap; all clones share
/// the same underlying worker and connection.
#[derive(Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<Job>,
    shutdown: Arc<Notify>,
    shut: Arc<AtomicBool>,
    depth: Arc<AtomicI64>,
}

impl PersistenceQueue {
    /// Opens the store with retries, idempotently creates the `teams` and
    /// `blobs` schemas, and spawns the single worker task.
    pub async fn connect(path: &str, capacity: usize) -> Result<Self, KothError> {
        let mut conn = Self::open_with_retries(path).await?;

        sqlx::query(TEAMS_SCHEMA)
            .execute(&mut conn)
            .await
            .map_err(KothError::from)?;
        sqlx::query(BLOBS_SCHEMA)
            .execute(&mut conn)
            .await
            .map_err(KothError::from)?;

        let (tx, mut rx) = mpsc::channel::<Job>(capacity);
        let shutdown = Arc::new(Notify::new());
        let shut = Arc::new(AtomicBool::new(false));
        let depth = Arc::new(AtomicI64::new(0));

        let worker_shutdown = shutdown.clone();
        let worker_depth = depth.clone();
        tokio::spawn(async move {
            let mut conn = conn;
            loop {
                tokio::select! {
                    biased;
                    _ = worker_shutdown.notified() => {
                        info!("persistence queue shutting down");
                        break;
                    }
                    maybe_job = rx.recv() => {
                        match maybe_job {
                            Some(job) => {
                                job(&mut conn).await;
                                worker_depth.fetch_sub(1, Ordering::Relaxed);
                                PERSISTENCE_QUEUE_DEPTH.set(worker_depth.load(Ordering::Relaxed) as f64);
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self { tx, shutdown, shut, depth })
    }

    async fn open_with_retries(path: &str) -> Result<SqliteConnection, KothError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let mut last_err = None;
        for attempt in 0..MAX_CONNECT_RETRIES {
            match opts.clone().connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!("store open attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                    tokio::time::sleep(CONNECT_RETRY_BASE * attempt.max(1)).await;
                }
            }
        }
        Err(KothError::Transient(format!(
            "failed to open store after {MAX_CONNECT_RETRIES} attempts: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Submits a unit of work and blocks until its result is available.
    /// Nested submission from within a queued operation is forbidden — it
    /// would deadlock the single worker, since the worker cannot drain a
    /// second job while awaiting the first.
    pub async fn submit<T, F>(&self, job: F) -> Result<T, KothError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> Pin<Box<dyn Future<Output = Result<T, KothError>> + Send + 'c>>
            + Send
            + 'static,
    {
        if self.shut.load(Ordering::SeqCst) {
            return Err(KothError::Internal("persistence queue is shut down".into()));
        }

        let (result_tx, result_rx) = oneshot::channel::<Result<T, KothError>>();
        let wrapped: Job = Box::new(move |conn| {
            Box::pin(async move {
                let res = job(conn).await;
                let _ = result_tx.send(res);
            })
        });

        self.depth.fetch_add(1, Ordering::Relaxed);
        PERSISTENCE_QUEUE_DEPTH.set(self.depth.load(Ordering::Relaxed) as f64);

        match tokio::time::timeout(SUBMIT_TIMEOUT, self.tx.send(wrapped)).await {
            Ok(Ok(())) => {}
            _ => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                return Err(KothError::QueueTimeout);
            }
        }

        match result_rx.await {
            Ok(res) => res,
            Err(_) => Err(KothError::Internal("persistence worker dropped the result channel".into())),
        }
    }

    /// Signals the worker to stop draining further operations; the
    /// submission channel accepts no new work afterward.
    pub fn shutdown(&self) {
        self.shut.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}
