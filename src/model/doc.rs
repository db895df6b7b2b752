//! Scenario document: an order-preserving YAML tree plus path addressing.
//!
//! The document is the single mutable artifact of a run. Events hold a
//! `YamlPath` into it instead of a reference, so the update engine is the
//! only code that ever touches the tree, and only after the run is over.
//!
//! `serde_yaml` mappings preserve key order, so a load/dump round trip is
//! stable. Comments and anchors are not retained; a rewrite drops them.

use serde_yaml::{Mapping, Value};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{RehearseError, RehearseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    Key(String),
    Index(usize),
}

/// A path from the document root to one YAML node, e.g.
/// `events[2].api_call.expect_request.uri`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct YamlPath(Vec<Seg>);

impl YamlPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn event(index: usize) -> Self {
        Self(vec![Seg::Key("events".to_string()), Seg::Index(index)])
    }

    pub fn key(&self, k: &str) -> Self {
        let mut segs = self.0.clone();
        segs.push(Seg::Key(k.to_string()));
        Self(segs)
    }

    pub fn index(&self, i: usize) -> Self {
        let mut segs = self.0.clone();
        segs.push(Seg::Index(i));
        Self(segs)
    }

    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Index of the event this path points into, if it is event-rooted.
    pub fn event_index(&self) -> Option<usize> {
        match self.0.as_slice() {
            [Seg::Key(k), Seg::Index(i), ..] if k == "events" => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for YamlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, ".");
        }
        for (n, seg) in self.0.iter().enumerate() {
            match seg {
                Seg::Key(k) => {
                    if n > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{k}")?;
                }
                Seg::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

pub fn yaml_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn mapping_get<'a>(m: &'a Mapping, key: &str) -> Option<&'a Value> {
    m.get(Value::String(key.to_string()))
}

#[derive(Debug, Clone)]
pub struct ScenarioDoc {
    root: Value,
    path: Option<PathBuf>,
}

impl ScenarioDoc {
    pub fn load(path: &Path) -> RehearseResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RehearseError::Scenario(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut doc = Self::parse_str(&text)
            .map_err(|e| RehearseError::Scenario(format!("{}: {e}", path.display())))?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    pub fn parse_str(text: &str) -> RehearseResult<Self> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|e| RehearseError::Scenario(format!("invalid YAML: {e}")))?;
        if !root.is_mapping() {
            return Err(RehearseError::Scenario(
                "scenario root must be a mapping".to_string(),
            ));
        }
        let doc = Self { root, path: None };
        doc.command()?;
        doc.event_nodes()?;
        Ok(doc)
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn command(&self) -> RehearseResult<String> {
        self.root
            .as_mapping()
            .and_then(|m| mapping_get(m, "command"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RehearseError::Scenario("missing `command` string".to_string()))
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let Some(env) = self
            .root
            .as_mapping()
            .and_then(|m| mapping_get(m, "env"))
            .and_then(Value::as_mapping)
        else {
            return out;
        };
        for (k, v) in env {
            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                out.insert(k.to_string(), v.to_string());
            }
        }
        out
    }

    pub fn event_nodes(&self) -> RehearseResult<&Vec<Value>> {
        self.root
            .as_mapping()
            .and_then(|m| mapping_get(m, "events"))
            .and_then(Value::as_sequence)
            .ok_or_else(|| RehearseError::Scenario("missing `events` list".to_string()))
    }

    pub fn node_at(&self, path: &YamlPath) -> Option<&Value> {
        let mut cur = &self.root;
        for seg in path.segments() {
            cur = match seg {
                Seg::Key(k) => cur.as_mapping().and_then(|m| mapping_get(m, k))?,
                Seg::Index(i) => cur.as_sequence().and_then(|s| s.get(*i))?,
            };
        }
        Some(cur)
    }

    pub fn node_at_mut(&mut self, path: &YamlPath) -> Option<&mut Value> {
        let mut cur = &mut self.root;
        for seg in path.segments() {
            cur = match seg {
                Seg::Key(k) => cur
                    .as_mapping_mut()
                    .and_then(|m| m.get_mut(Value::String(k.clone())))?,
                Seg::Index(i) => cur.as_sequence_mut().and_then(|s| s.get_mut(*i))?,
            };
        }
        Some(cur)
    }

    /// Sets the node at `path`, materializing the final mapping key if the
    /// parent exists but the key does not.
    pub fn set_node(&mut self, path: &YamlPath, value: Value) -> bool {
        if let Some(node) = self.node_at_mut(path) {
            *node = value;
            return true;
        }
        let Some((Seg::Key(last), parent_segs)) = path.segments().split_last() else {
            return false;
        };
        let parent = YamlPath(parent_segs.to_vec());
        let Some(Value::Mapping(m)) = self.node_at_mut(&parent) else {
            return false;
        };
        m.insert(yaml_str(last), value);
        true
    }

    pub fn remove_key(&mut self, path: &YamlPath) -> bool {
        let Some((Seg::Key(last), parent_segs)) = path.segments().split_last() else {
            return false;
        };
        let parent = YamlPath(parent_segs.to_vec());
        let Some(Value::Mapping(m)) = self.node_at_mut(&parent) else {
            return false;
        };
        m.remove(Value::String(last.clone())).is_some()
    }

    pub fn insert_event(&mut self, index: usize, node: Value) -> bool {
        let Some(events) = self
            .root
            .as_mapping_mut()
            .and_then(|m| m.get_mut(yaml_str("events")))
            .and_then(Value::as_sequence_mut)
        else {
            return false;
        };
        let at = index.min(events.len());
        events.insert(at, node);
        true
    }

    pub fn remove_event(&mut self, index: usize) -> bool {
        let Some(events) = self
            .root
            .as_mapping_mut()
            .and_then(|m| m.get_mut(yaml_str("events")))
            .and_then(Value::as_sequence_mut)
        else {
            return false;
        };
        if index >= events.len() {
            return false;
        }
        events.remove(index);
        true
    }

    pub fn to_yaml_string(&self) -> RehearseResult<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Atomic rewrite of the source file (tmp file + rename).
    pub fn write(&self) -> RehearseResult<()> {
        let Some(path) = &self.path else {
            return Err(RehearseError::InvalidArgument(
                "scenario has no source path to write back to".to_string(),
            ));
        };
        self.write_to(path)
    }

    pub fn write_to(&self, path: &Path) -> RehearseResult<()> {
        let text = self.to_yaml_string()?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("scenario.yaml");
        let tmp_name = format!(
            ".{file_name}.{}.{}.tmp",
            std::process::id(),
            uuid::Uuid::new_v4()
        );
        let tmp_path = parent.join(tmp_name);
        std::fs::write(&tmp_path, text)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
