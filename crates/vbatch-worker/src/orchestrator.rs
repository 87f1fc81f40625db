//! Batch orchestrator.
//!
//! Runs every discovered item through an [`ItemPipeline`] with at most
//! `max_concurrent` items in flight. Each item gets an item-level retry
//! policy on top of whatever the remote client already retried. Outcomes
//! stream into the report aggregator as items finish.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn, Instrument};
use vbatch_models::{
    retry_async, Backoff, BatchReport, ConcurrencyInfo, InputItem, ItemOutcome, ItemState, RetryOutcome, RetryPolicy,
};

use crate::config::WorkerConfig;
use crate::discovery::discover_inputs;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::metrics;
use crate::pipeline::{ItemPipeline, StateTrail};
use crate::report::{spawn_aggregator, ReportWriter};

/// A failed attempt together with the states it went through.
#[derive(Debug)]
pub struct AttemptError {
    pub error: WorkerError,
    pub trail: StateTrail,
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

/// Item-level retry policy: exponential backoff with full jitter.
pub fn item_retry_policy(config: &WorkerConfig) -> RetryPolicy<AttemptError> {
    RetryPolicy::new(
        "item",
        config.item_retry_attempts,
        Backoff::ExponentialJitter {
            multiplier: Duration::from_secs(1),
            max: config.item_retry_max_backoff,
        },
        AttemptError::is_retryable,
    )
}

/// Runs a batch of items through one pipeline.
pub struct BatchOrchestrator {
    config: WorkerConfig,
    pipeline: Arc<dyn ItemPipeline>,
    retry: Arc<RetryPolicy<AttemptError>>,
    shutdown: watch::Receiver<bool>,
}

impl BatchOrchestrator {
    pub fn new(config: &WorkerConfig, pipeline: Arc<dyn ItemPipeline>) -> Self {
        // Without `with_shutdown` the sender is dropped and shutdown never fires.
        let (_, shutdown) = watch::channel(false);
        Self {
            retry: Arc::new(item_retry_policy(config)),
            config: config.clone(),
            pipeline,
            shutdown,
        }
    }

    /// Stop starting new items once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy<AttemptError>) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Discover inputs and process them all.
    ///
    /// Discovery errors abort the batch. Once discovery succeeds a report
    /// is always produced.
    pub async fn run(&self) -> WorkerResult<BatchReport> {
        let items = discover_inputs(&self.config.input_dir, &self.config.patterns)?;
        self.run_items(items).await
    }

    /// Process `items` and return the final report.
    pub async fn run_items(&self, items: Vec<InputItem>) -> WorkerResult<BatchReport> {
        let started = Instant::now();
        let kind = self.pipeline.pipeline();
        let concurrency = ConcurrencyInfo {
            max_concurrent: self.config.max_concurrent,
            worker_count: self.config.worker_count,
        };

        info!(
            pipeline = %kind,
            items = items.len(),
            max_concurrent = concurrency.max_concurrent,
            worker_count = concurrency.worker_count,
            max_processes = concurrency.max_processes(),
            "Starting batch"
        );

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let writer = ReportWriter::new(self.config.report_path());
        let report = BatchReport::new(kind, items.len(), concurrency);
        let (tx, aggregator) = spawn_aggregator(report, writer.clone(), started);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut shutdown = self.shutdown.clone();
        let mut handles = Vec::with_capacity(items.len());
        let mut not_started = Vec::new();
        let mut pending = items.into_iter();

        while let Some(item) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                not_started.push(item.id().to_string());
                not_started.extend(pending.by_ref().map(|i| i.id().to_string()));
                warn!(
                    not_started = not_started.len(),
                    "Shutdown requested, waiting for in-flight items"
                );
                break;
            };

            let pipeline = Arc::clone(&self.pipeline);
            let retry = Arc::clone(&self.retry);
            let in_flight = Arc::clone(&in_flight);
            let tx = tx.clone();
            let task_item = item.clone();
            let span = ItemLogger::new(item.id(), kind).create_span();

            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    metrics::set_items_in_flight(in_flight.fetch_add(1, Ordering::SeqCst) + 1);

                    let outcome = run_item(pipeline.as_ref(), &retry, &task_item).await;

                    metrics::set_items_in_flight(in_flight.fetch_sub(1, Ordering::SeqCst) - 1);
                    metrics::record_item(kind, outcome.status, outcome.processing_time);
                    if tx.send(outcome).await.is_err() {
                        warn!(item_id = %task_item.id(), "Report aggregator closed before outcome was recorded");
                    }
                }
                .instrument(span),
            );
            handles.push((item, handle));
        }

        let joined = join_all(handles.into_iter().map(|(item, handle)| async move { (item, handle.await) })).await;
        for (item, result) in joined {
            if let Err(e) = result {
                // A panicking item still counts as a failure.
                let outcome = ItemOutcome::failed(&item, format!("item task aborted: {}", e));
                metrics::record_item(kind, outcome.status, 0.0);
                if tx.send(outcome).await.is_err() {
                    warn!(item_id = %item.id(), "Report aggregator closed before outcome was recorded");
                }
            }
        }
        drop(tx);

        let mut report = aggregator
            .await
            .map_err(|e| WorkerError::Aggregation(e.to_string()))?;

        let wall_clock = started.elapsed().as_secs_f64();
        report.finalize(wall_clock, not_started);
        writer.write(&report).await?;
        metrics::record_batch(kind, wall_clock);

        info!(
            pipeline = %kind,
            total = report.total,
            succeeded = report.succeeded,
            quality_rejected = report.quality_rejected,
            failed = report.failed,
            not_started = report.not_started.len(),
            wall_clock_secs = report.wall_clock_secs,
            time_saved_ratio = report.time_saved_ratio,
            report = %writer.path().display(),
            "Batch finished"
        );

        Ok(report)
    }
}

/// Run one item to a terminal outcome under `retry`.
async fn run_item(pipeline: &dyn ItemPipeline, retry: &RetryPolicy<AttemptError>, item: &InputItem) -> ItemOutcome {
    let started = Instant::now();
    let logger = ItemLogger::new(item.id(), pipeline.pipeline());
    let logger = &logger;

    let result = retry_async(retry, |attempt| async move {
        if attempt > 1 {
            metrics::record_retry("item");
            logger.log_progress(&format!("attempt {} of {}", attempt, retry.max_attempts()));
        }
        let mut trail = StateTrail::new(item.id());
        match pipeline.process(item, &mut trail).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                logger.log_transition(trail.current(), ItemState::Failed);
                trail.fail();
                Err(AttemptError { error, trail })
            }
        }
    })
    .await;

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        RetryOutcome::Success { value, attempts } => value.with_timing(attempts, elapsed),
        RetryOutcome::Failed {
            error,
            attempts,
            exhausted,
        } => {
            let message = if exhausted {
                format!("retries exhausted after {} attempts: {}", attempts, error.error)
            } else {
                error.error.to_string()
            };
            let outcome = ItemOutcome::failed(item, message).with_timing(attempts, elapsed);
            if let Err(e) = pipeline.finalize_failure(item, &outcome, &error.trail).await {
                logger.log_warning(&format!("failed to write failure manifest: {}", e));
            }
            outcome
        }
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
