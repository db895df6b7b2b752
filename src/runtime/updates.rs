//! Update modes and the repair applicator.
//!
//! Failures carry declarative `Repair` values; this module decides which of
//! them are licensed by the active mode set and replays them against the
//! document. Path-addressed repairs go first, then event inserts/removes from
//! the highest index down, so no repair invalidates another's address.

use serde::Serialize;
use serde_yaml::Value;

use std::fmt;

use crate::{Failure, Repair, RehearseError, RehearseResult, ScenarioDoc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Stdout,
    Stderr,
    UserInput,
    ApiRequests,
    ApiResponsePayloads,
    Exit,
    Ux,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Stdout,
        Mode::Stderr,
        Mode::UserInput,
        Mode::ApiRequests,
        Mode::ApiResponsePayloads,
        Mode::Exit,
        Mode::Ux,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::UserInput => "user-input",
            Self::ApiRequests => "api-requests",
            Self::ApiResponsePayloads => "api-response-payloads",
            Self::Exit => "exit",
            Self::Ux => "ux",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The set of update modes a run is allowed to repair under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeSet(u8);

impl ModeSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut s = Self::empty();
        for m in Mode::ALL {
            s = s.with(m);
        }
        s
    }

    pub fn with(self, mode: Mode) -> Self {
        Self(self.0 | Self::bit(mode))
    }

    pub fn contains(self, mode: Mode) -> bool {
        self.0 & Self::bit(mode) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn bit(mode: Mode) -> u8 {
        1 << (mode as u8)
    }

    /// Parses one mode name. `ux` expands to stdout+stderr+user-input, and
    /// `result` to stdout+exit, matching how reviewers think about a change.
    pub fn parse_one(self, name: &str) -> RehearseResult<Self> {
        let folded = name.trim().replace('_', "-");
        Ok(match folded.as_str() {
            "stdout" => self.with(Mode::Stdout),
            "stderr" => self.with(Mode::Stderr),
            "user-input" => self.with(Mode::UserInput),
            "api-requests" => self.with(Mode::ApiRequests),
            "api-response-payloads" => self.with(Mode::ApiResponsePayloads),
            "exit" => self.with(Mode::Exit),
            "ux" => self
                .with(Mode::Stdout)
                .with(Mode::Stderr)
                .with(Mode::UserInput)
                .with(Mode::Ux),
            "result" => self.with(Mode::Stdout).with(Mode::Exit),
            "all" => Self::all(),
            other => {
                return Err(RehearseError::InvalidArgument(format!(
                    "unknown update mode {other:?}"
                )))
            }
        })
    }

    pub fn parse_list(names: &[String]) -> RehearseResult<Self> {
        let mut s = Self::empty();
        for n in names {
            s = s.parse_one(n)?;
        }
        Ok(s)
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for m in Mode::ALL {
            if self.contains(m) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{m}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub applied: usize,
    pub skipped: usize,
    /// Parallel to the failure list: true where the repair was applied.
    pub repaired: Vec<bool>,
}

impl UpdateOutcome {
    pub fn fully_repaired(&self) -> bool {
        self.repaired.iter().all(|r| *r)
    }
}

/// Applies every licensed repair to the document. Failures whose mode is not
/// in `modes`, that carry no repair, or whose target no longer exists are
/// counted as skipped.
pub fn apply_repairs(
    doc: &mut ScenarioDoc,
    failures: &[Failure],
    modes: ModeSet,
) -> UpdateOutcome {
    let mut out = UpdateOutcome {
        repaired: vec![false; failures.len()],
        ..Default::default()
    };

    // Pass 1: in-place path repairs. Event indices are still the scheduler's.
    for (n, f) in failures.iter().enumerate() {
        if !modes.contains(f.mode) {
            continue;
        }
        let ok = match &f.repair {
            Some(Repair::SetScalar { path, value }) => doc.set_node(path, value.clone()),
            Some(Repair::AppendElement { path, value }) => {
                match doc.node_at_mut(path).and_then(Value::as_sequence_mut) {
                    Some(seq) => {
                        seq.push(value.clone());
                        true
                    }
                    None => false,
                }
            }
            Some(Repair::InsertKey { path, key, value }) => {
                match doc.node_at_mut(path).and_then(Value::as_mapping_mut) {
                    Some(m) => {
                        m.insert(Value::String(key.clone()), value.clone());
                        true
                    }
                    None => false,
                }
            }
            Some(Repair::RemoveKey { path }) => doc.remove_key(path),
            Some(Repair::InsertEvent { .. }) | Some(Repair::RemoveEvent { .. }) | None => continue,
        };
        out.repaired[n] = ok;
    }

    // Pass 2: event-level edits, grouped by index, highest index first so
    // earlier groups keep their addresses. Within a group removes go first,
    // then inserts in observation order.
    let mut indices: Vec<usize> = failures
        .iter()
        .enumerate()
        .filter(|(_, f)| modes.contains(f.mode))
        .filter_map(|(_, f)| match &f.repair {
            Some(Repair::InsertEvent { index, .. }) | Some(Repair::RemoveEvent { index }) => {
                Some(*index)
            }
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();

    for &idx in indices.iter().rev() {
        for (n, f) in failures.iter().enumerate() {
            if !modes.contains(f.mode) {
                continue;
            }
            if let Some(Repair::RemoveEvent { index }) = &f.repair {
                if *index == idx {
                    out.repaired[n] = doc.remove_event(idx);
                }
            }
        }
        let mut offset = 0usize;
        for (n, f) in failures.iter().enumerate() {
            if !modes.contains(f.mode) {
                continue;
            }
            if let Some(Repair::InsertEvent { index, node }) = &f.repair {
                if *index == idx {
                    out.repaired[n] = doc.insert_event(idx + offset, node.clone());
                    offset += 1;
                }
            }
        }
    }

    out.applied = out.repaired.iter().filter(|r| **r).count();
    out.skipped = failures.len() - out.applied;
    out
}
