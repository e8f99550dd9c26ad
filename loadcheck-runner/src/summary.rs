//! Aggregated outcome of a run

use loadcheck_core::{BenchError, ErrorKind};
use loadcheck_metrics::CounterSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome tallies of one scenario
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioTally {
    pub passed: u64,
    /// Soft check failures
    pub failed: u64,
    /// Transport failures (connection errors, timeouts)
    pub transport_failures: u64,
}

impl ScenarioTally {
    pub fn attempts(&self) -> u64 {
        self.passed + self.failed + self.transport_failures
    }

    fn merge(&mut self, other: &ScenarioTally) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.transport_failures += other.transport_failures;
    }
}

/// One distinct failure message and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub message: String,
    pub count: u64,
}

/// Distinct failure messages, bounded in size.
///
/// Messages seen after the bound is reached only bump `overflow`.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureLog {
    limit: usize,
    entries: BTreeMap<String, u64>,
    overflow: u64,
}

impl FailureLog {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, message: &str, count: u64) {
        if let Some(existing) = self.entries.get_mut(message) {
            *existing += count;
        } else if self.entries.len() < self.limit {
            self.entries.insert(message.to_string(), count);
        } else {
            self.overflow += count;
        }
    }

    fn merge(&mut self, other: &FailureLog) {
        for (message, count) in &other.entries {
            self.record(message, *count);
        }
        self.overflow += other.overflow;
    }

    /// Entries ordered by descending count, then message
    fn into_entries(self) -> Vec<FailureEntry> {
        let mut entries: Vec<FailureEntry> = self
            .entries
            .into_iter()
            .map(|(message, count)| FailureEntry { message, count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        entries
    }
}

/// What one worker observed
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkerReport {
    pub(crate) scenarios: BTreeMap<String, ScenarioTally>,
    pub(crate) failures: FailureLog,
    pub(crate) interrupted: u64,
}

impl WorkerReport {
    pub(crate) fn new(failure_limit: usize) -> Self {
        Self {
            failures: FailureLog::new(failure_limit),
            ..Self::default()
        }
    }

    pub(crate) fn record_pass(&mut self, scenario: &str) {
        self.tally(scenario).passed += 1;
    }

    pub(crate) fn record_failure(&mut self, scenario: &str, error: &BenchError) {
        let tally = self.tally(scenario);
        if error.kind() == ErrorKind::Transport {
            tally.transport_failures += 1;
        } else {
            tally.failed += 1;
        }
        self.failures.record(&error.to_string(), 1);
    }

    fn tally(&mut self, scenario: &str) -> &mut ScenarioTally {
        self.scenarios.entry(scenario.to_string()).or_default()
    }
}

/// Aggregate of a load phase, consumed by reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Completed scenario attempts
    pub attempts: u64,
    /// Tallies per scenario name
    pub scenarios: BTreeMap<String, ScenarioTally>,
    /// Most frequent distinct failure messages
    pub failures: Vec<FailureEntry>,
    /// Failures whose message did not fit in `failures`
    pub other_failures: u64,
    /// Attempts cut short by the deadline or a cancellation
    pub interrupted: u64,
    /// Message of the fault that aborted the run
    pub fatal: Option<String>,
    /// Wall-clock length of the phase in seconds
    pub elapsed_secs: f64,
    /// Metrics counters at the end of the phase
    pub counters: CounterSnapshot,
}

impl RunSummary {
    pub(crate) fn aggregate(
        reports: Vec<WorkerReport>,
        failure_limit: usize,
        fatal: Option<&BenchError>,
        elapsed: Duration,
        counters: CounterSnapshot,
    ) -> Self {
        let mut scenarios: BTreeMap<String, ScenarioTally> = BTreeMap::new();
        let mut failures = FailureLog::new(failure_limit);
        let mut interrupted = 0;

        for report in &reports {
            for (name, tally) in &report.scenarios {
                scenarios.entry(name.clone()).or_default().merge(tally);
            }
            failures.merge(&report.failures);
            interrupted += report.interrupted;
        }

        let other_failures = failures.overflow;
        Self {
            attempts: scenarios.values().map(ScenarioTally::attempts).sum(),
            scenarios,
            failures: failures.into_entries(),
            other_failures,
            interrupted,
            fatal: fatal.map(|f| f.to_string()),
            elapsed_secs: elapsed.as_secs_f64(),
            counters,
        }
    }

    /// The run finished without a fatal fault
    pub fn passed(&self) -> bool {
        self.fatal.is_none()
    }

    pub fn total_passed(&self) -> u64 {
        self.scenarios.values().map(|t| t.passed).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.scenarios
            .values()
            .map(|t| t.failed + t.transport_failures)
            .sum()
    }

    /// Passed scenario attempts per second
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.total_passed() as f64 / self.elapsed_secs
    }
}

/// Result of the pre-test phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// Names of the checks that ran, in order
    pub passed: Vec<String>,
    pub elapsed_secs: f64,
}
