//! Run report rendering

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use loadcheck_runner::{CheckReport, RunSettings, RunSummary};
use serde::Serialize;
use std::fmt::Write as _;

/// Number of counters shown in the text report
const TEXT_COUNTER_LIMIT: usize = 40;

/// Everything a run produced, as printed on stdout
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub seed: u64,
    pub workers: usize,
    pub duration_secs: u64,
    /// Pre-test outcome; absent when skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<CheckReport>,
    /// Load phase outcome; absent for `check` or when the pre-test failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<RunSummary>,
    /// Message of the fault that ended the run
    pub fatal: Option<String>,
    /// Stopped by an interrupt before the deadline
    pub interrupted: bool,
    /// Responses answered with 304 Not Modified, across all metric classes
    pub cache_hits: u64,
    pub passed: bool,
}

impl RunReport {
    pub fn new(target: &str, settings: &RunSettings) -> Self {
        Self {
            target: target.to_string(),
            seed: settings.seed,
            workers: settings.workers,
            duration_secs: settings.duration.as_secs(),
            checks: None,
            load: None,
            fatal: None,
            interrupted: false,
            cache_hits: 0,
            passed: true,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.fatal = Some(message.into());
        self.passed = false;
    }

    pub fn set_load(&mut self, summary: RunSummary) {
        if let Some(fatal) = &summary.fatal {
            self.fail(fatal.clone());
        }
        self.cache_hits = summary.counters.sum_matching(|key| key.ends_with("-304"));
        self.load = Some(summary);
    }

    pub fn set_interrupted(&mut self) {
        self.interrupted = true;
        self.passed = false;
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize run report")
            }
            OutputFormat::Text => Ok(self.render_text()),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        let verdict = if self.passed { "PASSED" } else { "FAILED" };

        let _ = writeln!(out, "loadcheck {} against {}", verdict, self.target);
        let _ = writeln!(
            out,
            "  workers {}  duration {}s  seed {}",
            self.workers, self.duration_secs, self.seed
        );
        if let Some(fatal) = &self.fatal {
            let _ = writeln!(out, "  fatal: {}", fatal);
        }
        if self.interrupted {
            let _ = writeln!(out, "  interrupted before the deadline");
        }

        if let Some(checks) = &self.checks {
            let _ = writeln!(
                out,
                "\nPre-test: {} checks passed in {:.2}s",
                checks.passed.len(),
                checks.elapsed_secs
            );
            for name in &checks.passed {
                let _ = writeln!(out, "  ok  {}", name);
            }
        }

        if let Some(load) = &self.load {
            let _ = writeln!(
                out,
                "\nLoad: {} attempts in {:.2}s, {} passed, {} failed, {} interrupted",
                load.attempts,
                load.elapsed_secs,
                load.total_passed(),
                load.total_failed(),
                load.interrupted
            );
            let _ = writeln!(out, "  throughput {:.2} scenarios/s", load.throughput());
            let _ = writeln!(out, "  cache hits {}", self.cache_hits);

            let _ = writeln!(
                out,
                "\n  {:<32} {:>10} {:>10} {:>10}",
                "scenario", "passed", "failed", "transport"
            );
            for (name, tally) in &load.scenarios {
                let _ = writeln!(
                    out,
                    "  {:<32} {:>10} {:>10} {:>10}",
                    name, tally.passed, tally.failed, tally.transport_failures
                );
            }

            if !load.failures.is_empty() {
                let _ = writeln!(out, "\n  Failures:");
                for failure in &load.failures {
                    let _ = writeln!(out, "  {:>8}x {}", failure.count, failure.message);
                }
                if load.other_failures > 0 {
                    let _ = writeln!(out, "  {:>8}x (other messages)", load.other_failures);
                }
            }

            if load.counters.iter().next().is_some() {
                let _ = writeln!(out, "\n  Responses:");
                for (key, value) in load.counters.iter().take(TEXT_COUNTER_LIMIT) {
                    let _ = writeln!(out, "  {:<40} {:>10}", key, value);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        serde_json::from_value(serde_json::json!({
            "attempts": 4,
            "scenarios": {
                "browse": {"passed": 3, "failed": 0, "transport_failures": 0},
                "post": {"passed": 0, "failed": 1, "transport_failures": 0}
            },
            "failures": [{"message": "login: expected 302 or 303, got 200", "count": 1}],
            "other_failures": 0,
            "interrupted": 1,
            "fatal": null,
            "elapsed_secs": 2.0,
            "counters": {"root-200": 3, "login-200": 1, "staticfile-200": 1, "staticfile-304": 2, "icon-304": 1}
        }))
        .unwrap()
    }

    #[test]
    fn test_text_report() {
        let mut report = RunReport::new("http://target.test", &RunSettings::default());
        report.set_load(summary());
        let text = report.render(OutputFormat::Text).unwrap();

        assert!(text.starts_with("loadcheck PASSED against http://target.test"));
        assert!(text.contains("4 attempts"));
        assert!(text.contains("throughput 1.50 scenarios/s"));
        assert!(text.contains("login: expected 302 or 303, got 200"));
        assert!(text.contains("root-200"));
        assert!(text.contains("cache hits 3"));
        assert_eq!(report.cache_hits, 3);
    }

    #[test]
    fn test_fatal_load_fails_report() {
        let mut load = summary();
        load.fatal = Some("fatal: top page: response declared as text/html is not valid UTF-8".into());

        let mut report = RunReport::new("http://target.test", &RunSettings::default());
        report.set_load(load);
        assert!(!report.passed);

        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["passed"], false);
        assert!(json["fatal"].as_str().unwrap().starts_with("fatal: top page"));
        assert_eq!(json["load"]["counters"]["root-200"], 3);
        assert_eq!(json["cache_hits"], 3);
        assert!(json.get("checks").is_none());
    }

    #[test]
    fn test_interrupted_report_fails() {
        let mut report = RunReport::new("http://target.test", &RunSettings::default());
        report.set_interrupted();
        assert!(!report.passed);
        assert!(report.render_text().contains("interrupted"));
    }
}
