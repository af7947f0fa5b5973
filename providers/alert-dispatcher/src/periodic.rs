//! Producer/worker pool shared by the periodic pipelines
//!
//! A producer task collects a batch on every tick and pushes it onto a
//! bounded queue; a fixed set of workers drains the queue one item at a time.
//! A full queue blocks the producer until a worker frees a slot or the runner
//! is stopped. Every task observes the runner's [`CancellationToken`].

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{DispatcherError, Result};

/// Workload driven by a [`PeriodicRunner`]
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Identity of an item. An item whose key is still queued or being
    /// processed is not enqueued again.
    fn key(&self, item: &Self::Item) -> String;

    /// Load the batch for one tick
    async fn collect(&self) -> Result<Vec<Self::Item>>;

    /// Handle one item. Failures are logged by the job itself.
    async fn process(&self, item: Self::Item);
}

/// Timing and pool sizing of a [`PeriodicRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub start_delay: Duration,
    pub interval: Duration,
    pub workers: usize,
    pub queue_size: usize,
}

impl ScheduleConfig {
    /// A zero `queue_size` is replaced by the worker count
    pub fn new(start_delay: Duration, interval: Duration, workers: usize, queue_size: usize) -> Self {
        Self {
            start_delay,
            interval,
            workers,
            queue_size: if queue_size == 0 {
                workers.max(1)
            } else {
                queue_size
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(DispatcherError::Configuration(
                "interval must be > 0".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(DispatcherError::Configuration(
                "workers must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

type PendingKeys = Arc<Mutex<HashSet<String>>>;

struct Running {
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

pub struct PeriodicRunner<J: Job> {
    job: Arc<J>,
    config: ScheduleConfig,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl<J: Job> PeriodicRunner<J> {
    /// Fails with a configuration error on a zero interval or worker count
    pub fn new(job: Arc<J>, config: ScheduleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            job,
            config,
            running: tokio::sync::Mutex::new(None),
        })
    }

    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn the producer and the worker pool
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(DispatcherError::AlreadyStarted(self.job.name()));
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let pending: PendingKeys = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..self.config.workers)
            .map(|worker| {
                tokio::spawn(work(
                    worker,
                    self.job.clone(),
                    rx.clone(),
                    pending.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        let producer = tokio::spawn(produce(
            self.job.clone(),
            self.config,
            tx,
            pending,
            cancel.clone(),
        ));

        info!(
            job = self.job.name(),
            workers = self.config.workers,
            queue_size = self.config.queue_size,
            interval_secs = self.config.interval.as_secs(),
            "Scheduler started"
        );
        *running = Some(Running {
            cancel,
            producer,
            workers,
        });
        Ok(())
    }

    /// Cancel the producer, then wait for every worker to finish the item in
    /// hand. Items still queued are dropped. No-op when not running.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();

        if let Err(e) = running.producer.await {
            warn!(job = self.job.name(), "producer task ended abnormally: {}", e);
        }
        for (worker, handle) in running.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(job = self.job.name(), worker, "worker task ended abnormally: {}", e);
            }
        }
        info!(job = self.job.name(), "Scheduler stopped");
    }
}

async fn produce<J: Job>(
    job: Arc<J>,
    config: ScheduleConfig,
    tx: mpsc::Sender<J::Item>,
    pending: PendingKeys,
    cancel: CancellationToken,
) {
    if !config.start_delay.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.start_delay) => {}
        }
    }

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'ticks: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = job.collect() => batch,
        };
        let items = match batch {
            Ok(items) => items,
            Err(e) => {
                warn!(job = job.name(), "failed to collect batch: {}", e);
                continue;
            }
        };

        let mut queued = 0usize;
        for item in items {
            let key = job.key(&item);
            if !pending.lock().insert(key.clone()) {
                debug!(job = job.name(), item = %key, "still pending, not enqueued again");
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    pending.lock().remove(&key);
                    break 'ticks;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break 'ticks;
                    }
                }
            }
            queued += 1;
        }
        debug!(job = job.name(), queued, "tick enqueued");
    }
    debug!(job = job.name(), "producer exited");
}

async fn work<J: Job>(
    worker: usize,
    job: Arc<J>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<J::Item>>>,
    pending: PendingKeys,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = async { rx.lock().await.recv().await } => match item {
                Some(item) => item,
                None => break,
            },
        };

        let key = job.key(&item);
        debug!(job = job.name(), worker, item = %key, "processing");
        let outcome = AssertUnwindSafe(job.process(item)).catch_unwind().await;
        pending.lock().remove(&key);

        if let Err(panic) = outcome {
            error!(
                job = job.name(),
                worker,
                item = %key,
                "task panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
    debug!(job = job.name(), worker, "worker exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
