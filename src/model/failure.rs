//! Assertion failures and the declarative repairs attached to them.

use serde::Serialize;
use serde_yaml::Value;

use std::fmt;

use crate::{Mode, YamlPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Observed value disagrees with the matcher.
    Wrong,
    /// Nothing was scripted for an observed behavior.
    Missing,
    /// A scripted event was never satisfied by an observation.
    Extra,
    /// A valid event arrived at the wrong queue position.
    OutOfOrder,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Wrong => "wrong",
            Self::Missing => "missing",
            Self::Extra => "extra",
            Self::OutOfOrder => "out-of-order",
        };
        write!(f, "{s}")
    }
}

/// The minimal document mutation that would have made a failing assertion
/// pass. Failures carry these instead of update callbacks so nothing holds a
/// reference into the document during a run.
#[derive(Debug, Clone)]
pub enum Repair {
    /// Replace the node (literal rewrite, constraint downgrade, body/exit
    /// rewrites).
    SetScalar { path: YamlPath, value: Value },
    /// Append to a sequence (`in` promotion, extra input lines).
    AppendElement { path: YamlPath, value: Value },
    /// Add an observed key to a closed structural matcher.
    InsertKey { path: YamlPath, key: String, value: Value },
    /// Drop a scripted key the observation never produced.
    RemoveKey { path: YamlPath },
    /// Materialize a synthesized event at a queue position.
    InsertEvent { index: usize, node: Value },
    /// Delete a trailing scripted event nothing observed.
    RemoveEvent { index: usize },
}

#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub mode: Mode,
    pub path: YamlPath,
    pub message: String,
    pub repair: Option<Repair>,
}

impl Failure {
    pub fn new(
        kind: FailureKind,
        mode: Mode,
        path: YamlPath,
        message: impl Into<String>,
        repair: Option<Repair>,
    ) -> Self {
        Self {
            kind,
            mode,
            path,
            message: message.into(),
            repair,
        }
    }

    /// Event index this failure belongs to, for grouped reporting.
    pub fn event_index(&self) -> Option<usize> {
        match &self.repair {
            Some(Repair::InsertEvent { index, .. }) | Some(Repair::RemoveEvent { index }) => {
                Some(*index)
            }
            _ => self.path.event_index(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
    }
}
