//! Reporting types and renderers.

use serde::Serialize;

use crate::{Failure, Mode};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Pass,
    Fail,
    Error,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
            Self::Error => 2,
        }
    }

    /// Severity ordering for aggregation: Error dominates Fail dominates Pass.
    pub fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Error, _) | (_, Self::Error) => Self::Error,
            (Self::Fail, _) | (_, Self::Fail) => Self::Fail,
            _ => Self::Pass,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub kind: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<usize>,
    pub path: String,
    pub message: String,
    pub repaired: bool,
}

impl FailureReport {
    pub fn from_failure(f: &Failure, repaired: bool) -> Self {
        Self {
            kind: f.kind.to_string(),
            mode: f.mode,
            event: f.event_index(),
            path: f.path.to_string(),
            message: f.message.clone(),
            repaired,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub scenario: String,
    pub status: ExitStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureReport>,
    #[serde(rename = "repairsApplied")]
    pub repairs_applied: usize,
    #[serde(rename = "repairsSkipped")]
    pub repairs_skipped: usize,
    /// True when the scenario file on disk was rewritten.
    pub rewrote: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn error(scenario: String, message: String) -> Self {
        Self {
            scenario,
            status: ExitStatus::Error,
            failures: Vec::new(),
            repairs_applied: 0,
            repairs_skipped: 0,
            rewrote: false,
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: ExitStatus,
    pub outcomes: Vec<FileOutcome>,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: Vec<FileOutcome>) -> Self {
        let mut status = ExitStatus::Pass;
        let (mut passed, mut failed, mut errored) = (0usize, 0usize, 0usize);
        for o in &outcomes {
            status = status.worst(o.status);
            match o.status {
                ExitStatus::Pass => passed += 1,
                ExitStatus::Fail => failed += 1,
                ExitStatus::Error => errored += 1,
            }
        }
        Self {
            status,
            outcomes,
            passed,
            failed,
            errored,
        }
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for o in &self.outcomes {
            let tag = match o.status {
                ExitStatus::Pass => "PASS",
                ExitStatus::Fail => "FAIL",
                ExitStatus::Error => "ERROR",
            };
            out.push_str(&format!("{tag} {}", o.scenario));
            if o.rewrote {
                out.push_str(" (updated)");
            }
            out.push('\n');
            if let Some(err) = &o.error {
                out.push_str(&format!("  {err}\n"));
            }
            // Grouped by event, then by kind within the event.
            let mut failures: Vec<&FailureReport> = o.failures.iter().collect();
            failures.sort_by(|a, b| a.event.cmp(&b.event).then_with(|| a.kind.cmp(&b.kind)));
            for f in failures {
                let fixed = if f.repaired { " [repaired]" } else { "" };
                out.push_str(&format!("  [{}] {}: {}{fixed}\n", f.kind, f.path, f.message));
            }
        }
        out.push_str(&format!(
            "scenarios: passed={} failed={} errored={}\n",
            self.passed, self.failed, self.errored
        ));
        out.trim_end().to_string()
    }

    pub fn render(&self, reporter: Reporter) -> String {
        match reporter {
            Reporter::Pretty => self.pretty(),
            Reporter::Json => serde_json::to_string_pretty(self).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: ExitStatus) -> FileOutcome {
        FileOutcome {
            scenario: "demo.yaml".to_string(),
            status,
            failures: Vec::new(),
            repairs_applied: 0,
            repairs_skipped: 0,
            rewrote: false,
            error: None,
        }
    }

    #[test]
    fn summary_status_takes_the_worst_outcome() {
        let s = RunSummary::from_outcomes(vec![
            outcome(ExitStatus::Pass),
            outcome(ExitStatus::Fail),
            outcome(ExitStatus::Pass),
        ]);
        assert_eq!(s.status, ExitStatus::Fail);
        assert_eq!((s.passed, s.failed, s.errored), (2, 1, 0));
        assert_eq!(s.status.code(), 1);
    }

    #[test]
    fn error_dominates_fail() {
        let s = RunSummary::from_outcomes(vec![outcome(ExitStatus::Fail), outcome(ExitStatus::Error)]);
        assert_eq!(s.status, ExitStatus::Error);
        assert_eq!(s.status.code(), 2);
    }

    fn report(kind: &str, event: usize, path: &str) -> FailureReport {
        FailureReport {
            kind: kind.to_string(),
            mode: Mode::Stdout,
            event: Some(event),
            path: path.to_string(),
            message: "mismatch".to_string(),
            repaired: false,
        }
    }

    #[test]
    fn pretty_lists_each_scenario() {
        let mut bad = outcome(ExitStatus::Fail);
        bad.failures.push(report("wrong", 0, "events[0].expect_stdout"));
        let s = RunSummary::from_outcomes(vec![bad]);
        let text = s.pretty();
        assert!(text.contains("FAIL demo.yaml"));
        assert!(text.contains("events[0].expect_stdout"));
        assert!(text.contains("failed=1"));
    }

    #[test]
    fn pretty_groups_failures_by_event_then_kind() {
        let mut bad = outcome(ExitStatus::Fail);
        bad.failures.push(report("wrong", 2, "events[2].expect_stdout"));
        bad.failures.push(report("wrong", 0, "events[0].expect_stderr"));
        bad.failures.push(report("extra", 2, "events[2]"));
        let s = RunSummary::from_outcomes(vec![bad]);
        let text = s.pretty();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].contains("events[0].expect_stderr"));
        assert!(lines[2].contains("[extra] events[2]"));
        assert!(lines[3].contains("[wrong] events[2].expect_stdout"));
    }
}
