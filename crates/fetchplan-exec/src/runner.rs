//! Sequential plan executor
//!
//! Items run one at a time in plan order so the rate-limited source never
//! sees concurrent load and an abort takes effect at the next item. On a
//! rate limit:
//! - automated mode cools down, then restarts the interrupted scope from its
//!   first item with a fresh retrieval timestamp and a forced cache bust
//! - manual mode stops at once and reports how to resume
//!
//! The plan itself is never modified; DB coverage widening works on a local
//! copy of an item's windows. Covered items the snapshot DB is missing dates
//! for are promoted to executions carrying only `db_missing` windows.

use crate::cancel::{AbortSignal, Countdown, CountdownOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::{ExecConfig, ExecMode};
use crate::error::{ExecError, SinkError};
use crate::probe::{widen_windows, DbCoverageProbe};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::rate_limit::RateLimitDetector;
use crate::report::{ItemFailure, RunOutcome, RunReport, ScopeTally};
use crate::scope::{group_scopes, Scope};
use crate::sink::{ExecutionSink, ItemExecution};
use fetchplan_model::{Classification, FetchPlan, FetchPlanItem, FetchWindow};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// How one scope attempt ended
enum ScopeAttempt {
    Finished(ScopeTally),
    RateLimited {
        item_key: String,
        error: SinkError,
        tally: ScopeTally,
    },
    Aborted(ScopeTally),
}

/// Executes fetch plans against an [`ExecutionSink`]
#[derive(Clone)]
pub struct Executor {
    config: ExecConfig,
    detector: RateLimitDetector,
    sink: Arc<dyn ExecutionSink>,
    clock: Arc<dyn Clock>,
    probe: Option<Arc<dyn DbCoverageProbe>>,
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("has_probe", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Executor with the system clock and no progress reporting
    ///
    /// # Errors
    /// Returns `ExecError::InvalidConfig` when `config` fails validation.
    pub fn new(config: ExecConfig, sink: Arc<dyn ExecutionSink>) -> Result<Self, ExecError> {
        config.validate()?;
        Ok(Self {
            detector: RateLimitDetector::with_patterns(&config.rate_limit_patterns),
            config,
            sink,
            clock: Arc::new(SystemClock),
            probe: None,
            progress: Arc::new(NoProgress),
        })
    }

    /// With clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With DB coverage probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn DbCoverageProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// With progress sink
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Execute every fetch item of `plan`
    ///
    /// With a probe configured, covered items with snapshot DB gaps run too.
    /// Item failures are recorded in the report and never abort the run.
    ///
    /// # Errors
    /// - `ExecError::Plan` when the plan fails validation
    /// - `ExecError::RestartLimitExceeded` when a scope keeps hitting the
    ///   rate limit
    pub async fn run(&self, plan: &FetchPlan, mut abort: AbortSignal) -> Result<RunReport, ExecError> {
        plan.validate()?;
        let promoted = self.promote_covered(plan).await;
        let runnable: Vec<&FetchPlanItem> = plan
            .items
            .iter()
            .filter(|i| i.is_fetch() || promoted.contains_key(&i.item_key))
            .collect();
        let total = runnable.len();
        let mut report = RunReport::new(Uuid::new_v4(), plan.items.len() - total);
        let scopes = group_scopes(runnable);

        tracing::info!(
            run_id = %report.run_id,
            items = total,
            promoted = promoted.len(),
            scopes = scopes.len(),
            mode = ?self.config.mode,
            "Starting plan execution"
        );

        let mut position = 0;
        for scope in &scopes {
            let mut restarts = 0u32;
            loop {
                let attempt = self
                    .run_scope(scope, &promoted, restarts > 0, position, total, &abort)
                    .await;
                match attempt {
                    ScopeAttempt::Finished(tally) => {
                        tally.commit(&mut report);
                        break;
                    }
                    ScopeAttempt::Aborted(tally) => {
                        tally.commit(&mut report);
                        return Ok(self.finish(report, RunOutcome::Cancelled));
                    }
                    ScopeAttempt::RateLimited { item_key, error, tally } => {
                        tracing::warn!(
                            run_id = %report.run_id,
                            scope = %scope.key,
                            item = %item_key,
                            error = %error,
                            "Rate limit detected"
                        );
                        if self.config.mode == ExecMode::Manual {
                            tally.commit(&mut report);
                            let explanation = format!(
                                "rate limited while fetching {item_key} ({error}); {} of {total} items \
                                 completed before the limit. Re-plan from the current cache to resume.",
                                report.items_succeeded
                            );
                            return Ok(self.finish(report, RunOutcome::RateLimited { explanation }));
                        }
                        if restarts >= self.config.max_scope_restarts {
                            tracing::error!(scope = %scope.key, restarts, "Scope restart limit reached");
                            return Err(ExecError::RestartLimitExceeded {
                                scope: scope.key.to_string(),
                                restarts,
                            });
                        }
                        report.cooldowns += 1;
                        metrics::counter!("fetchplan_cooldowns_total").increment(1);
                        if self.cooldown(&mut abort).await == CountdownOutcome::Aborted {
                            tracing::info!(run_id = %report.run_id, "Run aborted during cooldown");
                            return Ok(self.finish(report, RunOutcome::Cancelled));
                        }
                        restarts += 1;
                        report.scope_restarts += 1;
                        metrics::counter!("fetchplan_scope_restarts_total").increment(1);
                        tracing::info!(scope = %scope.key, attempt = restarts, "Restarting scope");
                        self.progress.notify(&ProgressEvent::ScopeRestarted {
                            scope: scope.key.clone(),
                            attempt: restarts,
                        });
                    }
                }
            }
            position += scope.items.len();
        }

        Ok(self.finish(report, RunOutcome::Completed))
    }

    async fn run_scope(
        &self,
        scope: &Scope<'_>,
        promoted: &BTreeMap<String, Vec<FetchWindow>>,
        bust_cache: bool,
        position: usize,
        total: usize,
        abort: &AbortSignal,
    ) -> ScopeAttempt {
        let retrieved_at = self.clock.now();
        let mut tally = ScopeTally::default();

        for (offset, &item) in scope.items.iter().enumerate() {
            if abort.is_aborted() {
                return ScopeAttempt::Aborted(tally);
            }
            self.progress.notify(&ProgressEvent::ItemStarted {
                item_key: item.item_key.clone(),
                index: position + offset + 1,
                total,
            });

            let windows = match promoted.get(&item.item_key) {
                Some(windows) => windows.clone(),
                None => self.windows_for(item).await,
            };
            let request = ItemExecution {
                item,
                windows: &windows,
                retrieved_at,
                bust_cache,
            };
            match self.sink.execute(request).await {
                Ok(outcome) => {
                    metrics::counter!("fetchplan_items_executed_total").increment(1);
                    tracing::debug!(
                        item = %item.item_key,
                        cache_hit = outcome.cache_hit,
                        days = outcome.days_fetched,
                        "Item executed"
                    );
                    tally.succeeded += 1;
                    tally.days_fetched += u64::from(outcome.days_fetched);
                    if outcome.cache_hit {
                        tally.cache_hits += 1;
                    }
                    self.progress.notify(&ProgressEvent::ItemSucceeded {
                        item_key: item.item_key.clone(),
                        days_fetched: outcome.days_fetched,
                    });
                }
                Err(error) if self.detector.is_rate_limit(&error) => {
                    return ScopeAttempt::RateLimited {
                        item_key: item.item_key.clone(),
                        error,
                        tally,
                    };
                }
                Err(error) => {
                    metrics::counter!("fetchplan_items_failed_total").increment(1);
                    tracing::error!(item = %item.item_key, error = %error, "Item failed");
                    let message = error.to_string();
                    self.progress.notify(&ProgressEvent::ItemFailed {
                        item_key: item.item_key.clone(),
                        message: message.clone(),
                    });
                    tally.failures.push(ItemFailure {
                        item_key: item.item_key.clone(),
                        message,
                    });
                }
            }
        }
        ScopeAttempt::Finished(tally)
    }

    /// `db_missing` windows for covered items the snapshot DB has gaps in
    async fn promote_covered(&self, plan: &FetchPlan) -> BTreeMap<String, Vec<FetchWindow>> {
        let mut promoted = BTreeMap::new();
        let Some(probe) = &self.probe else {
            return promoted;
        };
        for item in plan
            .items
            .iter()
            .filter(|i| i.classification == Classification::Covered)
        {
            match probe.missing_dates(item).await {
                Ok(db_missing) if !db_missing.is_empty() => {
                    let windows = widen_windows(item, &db_missing);
                    tracing::info!(
                        item = %item.item_key,
                        windows = windows.len(),
                        "Covered item missing from snapshot DB; scheduling backfill"
                    );
                    promoted.insert(item.item_key.clone(), windows);
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(item = %item.item_key, error = %error, "DB coverage probe failed for covered item");
                }
            }
        }
        promoted
    }

    async fn windows_for(&self, item: &FetchPlanItem) -> Vec<FetchWindow> {
        let Some(probe) = &self.probe else {
            return item.windows.clone();
        };
        match probe.missing_dates(item).await {
            Ok(db_missing) => {
                let widened = widen_windows(item, &db_missing);
                if widened.len() > item.windows.len() {
                    tracing::info!(
                        item = %item.item_key,
                        planned = item.windows.len(),
                        widened = widened.len(),
                        "Widened windows from snapshot DB coverage"
                    );
                }
                widened
            }
            Err(error) => {
                tracing::warn!(item = %item.item_key, error = %error, "DB coverage probe failed; using planned windows");
                item.windows.clone()
            }
        }
    }

    async fn cooldown(&self, abort: &mut AbortSignal) -> CountdownOutcome {
        let duration = self.config.cooldown;
        tracing::info!(seconds = duration.as_secs(), "Entering rate-limit cooldown");
        self.progress.notify(&ProgressEvent::CooldownStarted { duration });
        let outcome = Countdown::new(duration, self.config.cooldown_tick)
            .run(abort, |remaining| {
                self.progress.notify(&ProgressEvent::CooldownTick { remaining });
            })
            .await;
        if outcome == CountdownOutcome::Elapsed {
            self.progress.notify(&ProgressEvent::CooldownFinished);
        }
        outcome
    }

    fn finish(&self, mut report: RunReport, outcome: RunOutcome) -> RunReport {
        report.outcome = outcome;
        tracing::info!(
            run_id = %report.run_id,
            outcome = ?report.outcome,
            succeeded = report.items_succeeded,
            failed = report.items_failed,
            skipped = report.items_skipped,
            days = report.days_fetched,
            cooldowns = report.cooldowns,
            "Plan execution finished"
        );
        report
    }
}
