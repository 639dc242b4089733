//! Cycle Runner
//!
//! Drives one polling cycle through the state machine and loops cycles on
//! the configured period.
//!
//! - At most one cycle active at a time (atomic guard)
//! - Sub-feeds fetched concurrently, one task per feed
//! - Graph merge is single-threaded, owned by the cycle
//! - Cursor written only after every batch was dispatched

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::backoff::BackoffPolicy;
use super::cursor::Cursor;
use super::state::CycleState;
use crate::error::{ConnectorError, ConnectorResult};
use crate::logic::emitter::{BundleEmitter, EmitReport};
use crate::logic::graph::{BuildReport, GraphBuilder};
use crate::logic::normalizer::{NormalizeError, Normalized, Normalizer};
use crate::logic::objects::SourceRef;
use crate::logic::platform::{PlatformClient, StateError, SubmitError};
use crate::logic::source::{FetchError, SourceClient};

// ============================================================================
// CONFIG & REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Connector name, used for work items
    pub name: String,
    /// Time between cycle starts
    pub period: Duration,
    /// Bound on every external call
    pub call_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl SchedulerConfig {
    /// Sleep before the next cycle, given how long the last one ran.
    /// A cycle that overran the period is followed immediately.
    pub fn wait_after(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Fetch attempts, 1 when no backoff happened
    pub attempts: u32,
    pub build: BuildReport,
    pub objects: usize,
    pub relationships: usize,
    pub batches: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed_batches: usize,
    pub work_id: Option<String>,
    /// Cursor written at the end of the cycle (`None` = not committed)
    pub committed: Option<Cursor>,
}

impl CycleReport {
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }
}

// ============================================================================
// CYCLE GUARD
// ============================================================================

/// Holds the "cycle active" flag; released on drop, including on error paths
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// FEED TASK RESULT
// ============================================================================

/// What one feed task hands back to the merge step
struct FeedBatch {
    position: usize,
    feed: String,
    results: Vec<Result<Normalized, (SourceRef, NormalizeError)>>,
    next_token: Option<String>,
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct Scheduler {
    config: SchedulerConfig,
    sources: Vec<Arc<dyn SourceClient>>,
    platform: Arc<dyn PlatformClient>,
    normalizer: Arc<Normalizer>,
    emitter: BundleEmitter,
    state: RwLock<CycleState>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        sources: Vec<Arc<dyn SourceClient>>,
        platform: Arc<dyn PlatformClient>,
        normalizer: Arc<Normalizer>,
        emitter: BundleEmitter,
    ) -> Self {
        Self {
            config,
            sources,
            platform,
            normalizer,
            emitter,
            state: RwLock::new(CycleState::Idle),
            running: AtomicBool::new(false),
        }
    }

    /// Current state (for status / tests)
    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    fn set_state(&self, next: CycleState) {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            tracing::warn!("Unexpected cycle transition {} -> {}", *state, next);
        }
        tracing::debug!(from = %*state, to = %next, "Cycle state");
        *state = next;
    }

    /// Loop cycles until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Scheduler started: {} feed(s), period {}s",
            self.sources.len(),
            self.config.period.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle_start = Instant::now();
            match self.run_cycle().await {
                Ok(report) => {
                    tracing::info!(
                        "Cycle done in {}ms: {} records ({} skipped), {} objects, {} relationships, {} accepted, {} rejected, committed={}",
                        report.duration_ms,
                        report.build.records_seen,
                        report.build.records_skipped(),
                        report.objects,
                        report.relationships,
                        report.accepted,
                        report.rejected,
                        report.is_committed()
                    );
                }
                Err(ConnectorError::CycleInProgress) => {
                    tracing::warn!("Previous cycle still running, skipping this trigger");
                }
                Err(e) => {
                    tracing::error!("Cycle failed: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.wait_after(cycle_start.elapsed())) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Run one full cycle, retrying transient failures with backoff.
    ///
    /// Returns `CycleInProgress` without side effects if another cycle is
    /// active. After `max_retries` consecutive backoffs the cycle is
    /// abandoned with `RetriesExhausted` and the cursor left untouched.
    pub async fn run_cycle(&self) -> ConnectorResult<CycleReport> {
        let _guard = CycleGuard::acquire(&self.running).ok_or(ConnectorError::CycleInProgress)?;
        let started = Instant::now();
        let started_at = Utc::now();
        let mut failures: u32 = 0;

        loop {
            match self.attempt(started_at).await {
                Ok(mut report) => {
                    self.set_state(CycleState::Idle);
                    report.attempts = failures + 1;
                    report.duration_ms = started.elapsed().as_millis() as u64;
                    return Ok(report);
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if self.config.backoff.exhausted(failures) {
                        self.set_state(CycleState::Idle);
                        tracing::error!(
                            "ALERT: cycle abandoned after {} attempts, cursor unchanged. Last error: {}",
                            failures,
                            e
                        );
                        return Err(ConnectorError::RetriesExhausted {
                            attempts: failures,
                            last: e.to_string(),
                        });
                    }

                    let delay = self.config.backoff.delay(failures, e.retry_after());
                    self.set_state(CycleState::Backoff { attempt: failures });
                    tracing::warn!(
                        "Transient failure ({}), retry {}/{} in {:?}",
                        e,
                        failures,
                        self.config.backoff.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.set_state(CycleState::Idle);
                    tracing::error!("Cycle failed with non-retryable error: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// One pass Fetching → Normalizing → Emitting → Committing
    async fn attempt(&self, started_at: DateTime<Utc>) -> ConnectorResult<CycleReport> {
        // Fetching
        self.set_state(CycleState::Fetching);
        let cursor = self.read_cursor().await?;
        if cursor.is_first_run() {
            tracing::info!("Connector has never run, starting from scratch");
        } else {
            tracing::info!("Resuming from cursor {:?}", cursor.last_run_timestamp);
        }
        let batches = self.fetch_all(&cursor).await?;

        // Normalizing
        self.set_state(CycleState::Normalizing);
        let mut builder = GraphBuilder::new(self.normalizer.anchors());
        let mut tokens = BTreeMap::new();
        for batch in batches {
            for result in batch.results {
                match result {
                    Ok(normalized) => builder.absorb(normalized),
                    Err((source_ref, error)) => builder.record_failure(&source_ref, &error),
                }
            }
            tokens.insert(batch.feed, batch.next_token);
        }
        let graph = builder.finalize();
        if graph.report.warnings() > 0 {
            tracing::warn!("{} relationship(s) dropped with unresolved endpoints", graph.report.warnings());
        }

        // Emitting
        self.set_state(CycleState::Emitting);
        let work_id = self.initiate_work(started_at).await?;
        let emitted: EmitReport = match self.emitter.emit(&graph, self.platform.as_ref(), work_id.as_deref()).await {
            Ok(report) => report,
            Err(e) => {
                self.complete_work(work_id.as_deref(), &format!("Interrupted: {}", e)).await;
                return Err(e.into());
            }
        };
        let summary = format!(
            "{} objects sent in {} bundle(s), {} rejected",
            emitted.accepted(),
            emitted.batches.len(),
            emitted.rejected()
        );
        self.complete_work(work_id.as_deref(), &summary).await;

        // Committing
        self.set_state(CycleState::Committing);
        let committed = if emitted.fully_dispatched() {
            let next = cursor.advance(started_at.timestamp(), tokens);
            self.write_cursor(&next).await?;
            match next.last_run_timestamp {
                Some(ts) if next.tokens.is_empty() => tracing::info!("Cursor committed at {}", ts),
                _ => tracing::info!("Cursor committed with {} feed(s) still paging", next.tokens.len()),
            }
            Some(next)
        } else {
            tracing::error!(
                "{} batch(es) failed durably, cursor not advanced",
                emitted.failed_batches()
            );
            None
        };

        Ok(CycleReport {
            started_at,
            duration_ms: 0,
            attempts: 1,
            objects: graph.object_count(),
            relationships: graph.relationships.len(),
            build: graph.report.clone(),
            batches: emitted.batches.len(),
            accepted: emitted.accepted(),
            rejected: emitted.rejected(),
            failed_batches: emitted.failed_batches(),
            work_id,
            committed,
        })
    }

    /// Fetch every feed concurrently; each task normalizes its own records
    async fn fetch_all(&self, cursor: &Cursor) -> ConnectorResult<Vec<FeedBatch>> {
        let mut tasks = JoinSet::new();

        for (position, source) in self.sources.iter().enumerate() {
            let source = Arc::clone(source);
            let normalizer = Arc::clone(&self.normalizer);
            let cursor = cursor.clone();
            let timeout = self.config.call_timeout;

            tasks.spawn(async move {
                let outcome = tokio::time::timeout(timeout, source.fetch(&cursor))
                    .await
                    .unwrap_or(Err(FetchError::Timeout))?;

                let results = outcome
                    .records
                    .iter()
                    .map(|record| {
                        normalizer
                            .normalize(record)
                            .map_err(|e| (record.source_ref.clone(), e))
                    })
                    .collect();

                Ok::<_, FetchError>(FeedBatch {
                    position,
                    feed: source.name().to_string(),
                    results,
                    next_token: outcome.next_token,
                })
            });
        }

        let mut batches = Vec::with_capacity(self.sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(batch)) => {
                    tracing::debug!("Feed {} returned {} records", batch.feed, batch.results.len());
                    batches.push(batch);
                }
                // Dropping the set aborts the remaining feeds
                Ok(Err(e)) => return Err(e.into()),
                Err(e) => return Err(ConnectorError::Task(e.to_string())),
            }
        }

        // Merge order follows configuration order, not completion order
        batches.sort_by_key(|b| b.position);
        Ok(batches)
    }

    async fn read_cursor(&self) -> ConnectorResult<Cursor> {
        let cursor = tokio::time::timeout(self.config.call_timeout, self.platform.read_cursor())
            .await
            .unwrap_or(Err(StateError::Timeout))?;
        Ok(cursor.unwrap_or_default())
    }

    async fn write_cursor(&self, cursor: &Cursor) -> ConnectorResult<()> {
        tokio::time::timeout(self.config.call_timeout, self.platform.write_cursor(cursor))
            .await
            .unwrap_or(Err(StateError::Timeout))?;
        Ok(())
    }

    async fn initiate_work(&self, started_at: DateTime<Utc>) -> ConnectorResult<Option<String>> {
        let name = format!("{} run @ {}", self.config.name, started_at.format("%Y-%m-%d %H:%M:%S"));
        let work_id = tokio::time::timeout(self.config.call_timeout, self.platform.initiate_work(&name))
            .await
            .unwrap_or(Err(SubmitError::Timeout))?;
        Ok(work_id)
    }

    /// Work completion is bookkeeping only; failures are logged
    async fn complete_work(&self, work_id: Option<&str>, message: &str) {
        let Some(work_id) = work_id else { return };
        let result = tokio::time::timeout(
            self.config.call_timeout,
            self.platform.complete_work(work_id, message),
        )
        .await
        .unwrap_or(Err(SubmitError::Timeout));

        if let Err(e) = result {
            tracing::warn!("Failed to complete work {}: {}", work_id, e);
        }
    }
}
