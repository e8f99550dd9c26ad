//! Scenario orchestrator
//!
//! Each worker loops `idle -> running -> (pass | soft-fail | fatal)`: it
//! picks a scenario from the weighted table, leases a user, plays the
//! scenario, releases the user and records the outcome. A fatal outcome
//! aborts the shared run context; every other worker unwinds at its next
//! pool acquisition or in-flight request.

use crate::scenario::{Scenario, ScenarioContext, ScenarioTable};
use crate::summary::{CheckReport, RunSummary, WorkerReport};
use futures::future::join_all;
use loadcheck_config::RunConfig;
use loadcheck_core::{BenchError, BenchResult, ErrorKind, RunContext};
use loadcheck_http::HttpSettings;
use loadcheck_metrics::SharedCounters;
use loadcheck_pool::UserPool;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Load phase parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Concurrent workers
    pub workers: usize,
    /// Length of the load phase
    pub duration: Duration,
    /// Seed for every worker's scenario picker
    pub seed: u64,
    /// Abort after this many consecutive transport failures on one worker
    pub max_consecutive_transport_failures: Option<u32>,
    /// Every transport failure aborts the run
    pub transport_errors_fatal: bool,
    /// Distinct failure messages kept in the summary
    pub max_failure_messages: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            workers: config.workers,
            duration: config.duration,
            seed: config.seed.unwrap_or_else(rand::random),
            max_consecutive_transport_failures: config.max_consecutive_transport_failures,
            transport_errors_fatal: config.transport_errors_fatal,
            max_failure_messages: config.max_failure_messages,
        }
    }
}

/// Drives scenarios against the target with a fixed set of workers
#[derive(Debug)]
pub struct Orchestrator {
    settings: RunSettings,
    pool: UserPool,
    counters: SharedCounters,
    http: Arc<HttpSettings>,
}

impl Orchestrator {
    pub fn new(
        settings: RunSettings,
        pool: UserPool,
        counters: SharedCounters,
        http: HttpSettings,
    ) -> Self {
        Self {
            settings,
            pool,
            counters,
            http: Arc::new(http),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn pool(&self) -> &UserPool {
        &self.pool
    }

    pub fn counters(&self) -> &SharedCounters {
        &self.counters
    }

    fn scenario_context(&self, run: RunContext, seed: u64) -> ScenarioContext {
        ScenarioContext::new(
            run,
            self.pool.clone(),
            self.counters.clone(),
            self.http.clone(),
        )
        .with_seed(seed)
    }

    /// Pre-test phase: every check runs once, in order, with its own user.
    ///
    /// Any failure fails the phase and is reported as fatal. Idle sessions
    /// are reset afterwards so the load phase starts anonymous.
    pub async fn run_checks(
        &self,
        ctx: &RunContext,
        checks: &[Arc<dyn Scenario>],
    ) -> BenchResult<CheckReport> {
        let started = Instant::now();
        let scenario_ctx = self.scenario_context(ctx.clone(), self.settings.seed);
        let mut passed = Vec::with_capacity(checks.len());

        info!("Running {} pre-test checks", checks.len());

        for check in checks {
            let Some(mut lease) = self.pool.acquire_random(ctx).await else {
                return Err(BenchError::Cancelled);
            };
            debug!(user = %lease.name(), "Running check {}", check.name());

            let outcome = check.run(&scenario_ctx, &mut lease).await;
            lease.release();

            match outcome {
                Ok(()) => passed.push(check.name().to_string()),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    error!("Pre-test check {} failed: {}", check.name(), err);
                    return Err(err.escalate());
                }
            }
        }

        let reset = self.pool.reset_idle_sessions();
        debug!("Reset {} idle sessions after pre-test", reset);

        Ok(CheckReport {
            passed,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Load phase: run the table until the deadline or a fatal fault.
    ///
    /// The phase gets a child of `ctx` bounded by the configured duration;
    /// cancelling `ctx` ends the phase early.
    pub async fn run_load(&self, ctx: &RunContext, table: &ScenarioTable) -> BenchResult<RunSummary> {
        table.validate()?;
        if self.pool.is_empty() {
            return Err(BenchError::contract("user pool is empty"));
        }

        let run = ctx.child_with_deadline(self.settings.duration);
        run.arm_deadline();

        info!(
            "Starting load phase: {} workers, {:?}, seed {}",
            self.settings.workers, self.settings.duration, self.settings.seed
        );
        let started = Instant::now();

        let handles: Vec<_> = (0..self.settings.workers)
            .map(|index| {
                let worker = Worker {
                    index,
                    // Content stream kept apart from the scenario choice stream
                    ctx: self
                        .scenario_context(run.clone(), worker_seed(!self.settings.seed, index)),
                    table: table.clone(),
                    rng: StdRng::seed_from_u64(worker_seed(self.settings.seed, index)),
                    policy: TransportPolicy::from(&self.settings),
                    report: WorkerReport::new(self.settings.max_failure_messages),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // A panicking scenario means the harness itself is broken
                    run.abort(BenchError::fatal("worker", format!("worker task failed: {}", e)));
                }
            }
        }
        run.cancel();

        let fatal = run.fatal();
        let summary = RunSummary::aggregate(
            reports,
            self.settings.max_failure_messages,
            fatal.as_ref(),
            started.elapsed(),
            self.counters.snapshot(),
        );

        info!(
            "Load phase finished: {} attempts, {} passed, {:.2}/s",
            summary.attempts,
            summary.total_passed(),
            summary.throughput()
        );
        Ok(summary)
    }
}

/// Distinct, reproducible seed per worker
fn worker_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Debug, Clone, Copy)]
struct TransportPolicy {
    max_consecutive: Option<u32>,
    always_fatal: bool,
}

impl From<&RunSettings> for TransportPolicy {
    fn from(settings: &RunSettings) -> Self {
        Self {
            max_consecutive: settings.max_consecutive_transport_failures,
            always_fatal: settings.transport_errors_fatal,
        }
    }
}

struct Worker {
    index: usize,
    ctx: ScenarioContext,
    table: ScenarioTable,
    rng: StdRng,
    policy: TransportPolicy,
    report: WorkerReport,
}

impl Worker {
    async fn run(mut self) -> WorkerReport {
        let mut consecutive_transport = 0u32;

        while !self.ctx.run().is_cancelled() {
            let Some(scenario) = self.table.choose(&mut self.rng).cloned() else {
                break;
            };
            let Some(mut lease) = self.ctx.acquire().await else {
                break;
            };

            let outcome = scenario.run(&self.ctx, &mut lease).await;
            lease.release();

            let err = match outcome {
                Ok(()) => {
                    consecutive_transport = 0;
                    self.report.record_pass(scenario.name());
                    continue;
                }
                Err(err) => err,
            };

            match err.kind() {
                ErrorKind::Cancelled => {
                    self.report.interrupted += 1;
                    break;
                }
                ErrorKind::Check => {
                    consecutive_transport = 0;
                    debug!(worker = self.index, "{} failed: {}", scenario.name(), err);
                    self.report.record_failure(scenario.name(), &err);
                }
                ErrorKind::Transport => {
                    consecutive_transport += 1;
                    warn!(worker = self.index, "{} failed: {}", scenario.name(), err);
                    self.report.record_failure(scenario.name(), &err);

                    if self.policy.always_fatal {
                        self.ctx.run().abort(err.escalate());
                        break;
                    }
                    if let Some(limit) = self.policy.max_consecutive {
                        if consecutive_transport >= limit {
                            self.ctx.run().abort(BenchError::fatal(
                                scenario.name(),
                                format!(
                                    "{} consecutive transport failures, last: {}",
                                    consecutive_transport, err
                                ),
                            ));
                            break;
                        }
                    }
                }
                ErrorKind::Fatal | ErrorKind::Contract => {
                    self.ctx.run().abort(err);
                    break;
                }
            }
        }

        debug!(worker = self.index, "Worker stopped");
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loadcheck_core::Credentials;
    use loadcheck_metrics::Counters;
    use loadcheck_pool::{SessionSettings, UserLease};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scenario scripted by a closure over the attempt number
    struct Scripted<F> {
        name: &'static str,
        calls: AtomicUsize,
        outcome: F,
    }

    impl<F> Scripted<F>
    where
        F: Fn(usize) -> BenchResult<()> + Send + Sync,
    {
        fn new(name: &'static str, outcome: F) -> Self {
            Self {
                name,
                calls: AtomicUsize::new(0),
                outcome,
            }
        }
    }

    #[async_trait]
    impl<F> Scenario for Scripted<F>
    where
        F: Fn(usize) -> BenchResult<()> + Send + Sync,
    {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, ctx: &ScenarioContext, lease: &mut UserLease) -> BenchResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.counters().increment(&format!("{}-{}", self.name, lease.name()));
            tokio::time::sleep(Duration::from_millis(1)).await;
            (self.outcome)(call)
        }
    }

    fn orchestrator(users: &[&str], settings: RunSettings) -> Orchestrator {
        let seeds = users.iter().map(|n| Credentials::new(*n, "pw"));
        let pool = UserPool::seeded(seeds, SessionSettings::default(), 1).unwrap();
        let http = HttpSettings::new("http://127.0.0.1:9").unwrap();
        Orchestrator::new(settings, pool, Arc::new(Counters::new()), http)
    }

    fn settings(workers: usize, millis: u64) -> RunSettings {
        RunSettings {
            workers,
            duration: Duration::from_millis(millis),
            seed: 11,
            max_consecutive_transport_failures: None,
            transport_errors_fatal: false,
            max_failure_messages: 10,
        }
    }

    #[tokio::test]
    async fn test_load_runs_until_deadline() {
        let orch = orchestrator(&["alice", "bob"], settings(4, 150));
        let table = ScenarioTable::new()
            .with(Scripted::new("browse", |_| Ok(())), 3)
            .with(
                Scripted::new("post", |_| Err(BenchError::check("post", "expected 303, got 200"))),
                1,
            );

        let started = Instant::now();
        let summary = orch.run_load(&RunContext::new(), &table).await.unwrap();

        assert!(summary.passed());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(summary.scenarios["browse"].passed > 0);
        assert_eq!(summary.scenarios["browse"].failed, 0);
        assert_eq!(summary.scenarios.get("post").map_or(0, |t| t.passed), 0);
        assert_eq!(summary.attempts, summary.total_passed() + summary.total_failed());
        assert_eq!(orch.pool().available(), 2);
    }

    #[tokio::test]
    async fn test_fatal_aborts_run() {
        let orch = orchestrator(&["alice", "bob", "carol"], settings(3, 10_000));
        let table = ScenarioTable::new().with(
            Scripted::new("broken", |call| {
                if call == 5 {
                    Err(BenchError::fatal("top page", "unparsable body"))
                } else {
                    Ok(())
                }
            }),
            1,
        );

        let started = Instant::now();
        let summary = orch.run_load(&RunContext::new(), &table).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!summary.passed());
        assert_eq!(summary.fatal.as_deref(), Some("fatal: top page: unparsable body"));
        assert_eq!(orch.pool().available(), 3);
    }

    #[tokio::test]
    async fn test_consecutive_transport_failures_escalate() {
        let mut run = settings(1, 10_000);
        run.max_consecutive_transport_failures = Some(3);
        let orch = orchestrator(&["alice"], run);
        let table = ScenarioTable::new().with(
            Scripted::new("flaky", |_| Err(BenchError::transport("top page", "connection refused"))),
            1,
        );

        let summary = orch.run_load(&RunContext::new(), &table).await.unwrap();
        assert_eq!(summary.scenarios["flaky"].transport_failures, 3);
        let fatal = summary.fatal.unwrap();
        assert!(fatal.contains("3 consecutive transport failures"));
    }

    #[tokio::test]
    async fn test_transport_errors_fatal() {
        let mut run = settings(2, 10_000);
        run.transport_errors_fatal = true;
        let orch = orchestrator(&["alice", "bob"], run);
        let table = ScenarioTable::new().with(
            Scripted::new("flaky", |call| {
                if call == 0 {
                    Err(BenchError::timeout("top page"))
                } else {
                    Ok(())
                }
            }),
            1,
        );

        let summary = orch.run_load(&RunContext::new(), &table).await.unwrap();
        assert_eq!(summary.fatal.as_deref(), Some("fatal: top page: request timed out"));
    }

    #[tokio::test]
    async fn test_parent_cancellation_ends_load() {
        let orch = orchestrator(&["alice"], settings(2, 60_000));
        let table = ScenarioTable::new().with(Scripted::new("browse", |_| Ok(())), 1);
        let ctx = RunContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let summary = tokio::time::timeout(Duration::from_secs(2), orch.run_load(&ctx, &table))
            .await
            .expect("load phase should stop on cancellation")
            .unwrap();
        assert!(summary.passed());
    }

    #[tokio::test]
    async fn test_empty_table_is_contract_violation() {
        let orch = orchestrator(&["alice"], settings(1, 100));
        let err = orch
            .run_load(&RunContext::new(), &ScenarioTable::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
    }

    #[tokio::test]
    async fn test_checks_escalate_soft_failures() {
        let orch = orchestrator(&["alice"], settings(1, 100));
        let checks: Vec<Arc<dyn Scenario>> = vec![
            Arc::new(Scripted::new("pages render", |_| Ok(()))),
            Arc::new(Scripted::new("login rejected", |_| {
                Err(BenchError::check("unknown user login", "expected 403, got 302"))
            })),
        ];

        let err = orch.run_checks(&RunContext::new(), &checks).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.label(), Some("unknown user login"));

        let report = orch.run_checks(&RunContext::new(), &checks[..1]).await.unwrap();
        assert_eq!(report.passed, vec!["pages render"]);
    }

    #[test]
    fn test_worker_seeds_differ() {
        assert_ne!(worker_seed(7, 0), worker_seed(7, 1));
        assert_eq!(worker_seed(7, 3), worker_seed(7, 3));
    }
}
