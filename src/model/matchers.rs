//! Assertion primitives: value-level matchers with repairs.
//!
//! Matchers are parsed from their YAML wrapper key (`{matches: R}`,
//! `{in: [...]}`, `{is_none: b}`, `{equals: V}`); a plain mapping is an open
//! structural matcher and any other value is a literal.

use regex::Regex;
use serde_json::Value as Json;
use serde_yaml::Value as Yaml;

use crate::{Failure, FailureKind, Mode, Repair, RehearseError, RehearseResult, YamlPath};

/// Knobs that change which repair a failing matcher proposes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckPolicy {
    /// Widen `in` sets with the observed element instead of downgrading the
    /// matcher to a literal.
    pub promote_constraints: bool,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(Yaml),
    Regex(Regex),
    In(Vec<Yaml>),
    IsNone(bool),
    Structural { expected: Yaml, closed: bool },
}

const WRAPPER_KEYS: [&str; 4] = ["matches", "in", "is_none", "equals"];

fn wrapper_entry(node: &Yaml) -> Option<(&str, &Yaml)> {
    let m = node.as_mapping()?;
    if m.len() != 1 {
        return None;
    }
    let (k, v) = m.iter().next()?;
    let k = k.as_str()?;
    WRAPPER_KEYS.contains(&k).then_some((k, v))
}

impl Matcher {
    pub fn from_node(node: &Yaml) -> RehearseResult<Self> {
        if let Some((key, value)) = wrapper_entry(node) {
            return match key {
                "matches" => {
                    let pat = value.as_str().ok_or_else(|| {
                        RehearseError::Scenario("`matches` takes a string pattern".to_string())
                    })?;
                    let re = Regex::new(&format!("^(?:{pat})$")).map_err(|e| {
                        RehearseError::Scenario(format!("invalid `matches` pattern {pat:?}: {e}"))
                    })?;
                    Ok(Self::Regex(re))
                }
                "in" => {
                    let seq = value.as_sequence().ok_or_else(|| {
                        RehearseError::Scenario("`in` takes a list".to_string())
                    })?;
                    Ok(Self::In(seq.clone()))
                }
                "is_none" => {
                    let b = value.as_bool().ok_or_else(|| {
                        RehearseError::Scenario("`is_none` takes a bool".to_string())
                    })?;
                    Ok(Self::IsNone(b))
                }
                "equals" => {
                    if value.is_mapping() {
                        Ok(Self::Structural {
                            expected: value.clone(),
                            closed: true,
                        })
                    } else {
                        Ok(Self::Literal(value.clone()))
                    }
                }
                _ => unreachable!("wrapper_entry only yields known keys"),
            };
        }
        if node.is_mapping() {
            return Ok(Self::Structural {
                expected: node.clone(),
                closed: false,
            });
        }
        Ok(Self::Literal(node.clone()))
    }

    /// Evaluates the matcher against an observed JSON value. Failures are
    /// reported in pre-order over the assertion tree.
    pub fn check(
        &self,
        path: &YamlPath,
        observed: &Json,
        mode: Mode,
        policy: &CheckPolicy,
    ) -> Vec<Failure> {
        let mut out = Vec::new();
        match self {
            Self::Literal(expected) => {
                let expected_json = yaml_to_json(expected);
                if !json_eq(&expected_json, observed) {
                    out.push(wrong(
                        path,
                        mode,
                        format!("expected {}, observed {}", render(&expected_json), render(observed)),
                        observed,
                    ));
                }
            }
            Self::Regex(re) => {
                let matched = observed.as_str().is_some_and(|s| re.is_match(s));
                if !matched {
                    out.push(wrong(
                        path,
                        mode,
                        format!("expected match of /{re}/, observed {}", render(observed)),
                        observed,
                    ));
                }
            }
            Self::In(set) => {
                let member = set.iter().any(|v| json_eq(&yaml_to_json(v), observed));
                if !member {
                    let repair = if policy.promote_constraints {
                        Repair::AppendElement {
                            path: path.key("in"),
                            value: json_to_yaml(observed),
                        }
                    } else {
                        Repair::SetScalar {
                            path: path.clone(),
                            value: json_to_yaml(observed),
                        }
                    };
                    out.push(Failure::new(
                        FailureKind::Wrong,
                        mode,
                        path.clone(),
                        format!("observed {} is not in the scripted set", render(observed)),
                        Some(repair),
                    ));
                }
            }
            Self::IsNone(expect_none) => {
                if observed.is_null() != *expect_none {
                    out.push(wrong(
                        path,
                        mode,
                        format!(
                            "expected {}, observed {}",
                            if *expect_none { "null" } else { "non-null" },
                            render(observed)
                        ),
                        observed,
                    ));
                }
            }
            Self::Structural { expected, closed } => {
                check_structural(expected, observed, path, mode, *closed, policy, &mut out);
            }
        }
        out
    }

    pub fn check_str(
        &self,
        path: &YamlPath,
        observed: &str,
        mode: Mode,
        policy: &CheckPolicy,
    ) -> Vec<Failure> {
        self.check(path, &Json::String(observed.to_string()), mode, policy)
    }
}

fn wrong(path: &YamlPath, mode: Mode, message: String, observed: &Json) -> Failure {
    Failure::new(
        FailureKind::Wrong,
        mode,
        path.clone(),
        message,
        Some(Repair::SetScalar {
            path: path.clone(),
            value: json_to_yaml(observed),
        }),
    )
}

fn check_structural(
    expected: &Yaml,
    observed: &Json,
    path: &YamlPath,
    mode: Mode,
    closed: bool,
    policy: &CheckPolicy,
    out: &mut Vec<Failure>,
) {
    // Nested wrapper keys are sub-matchers.
    if wrapper_entry(expected).is_some() {
        let sub = match Matcher::from_node(expected) {
            Ok(sub) => sub,
            Err(e) => {
                out.push(Failure::new(
                    FailureKind::Wrong,
                    mode,
                    path.clone(),
                    e.to_string(),
                    None,
                ));
                return;
            }
        };
        out.extend(sub.check(path, observed, mode, policy));
        return;
    }

    match expected {
        Yaml::Mapping(em) => {
            let Some(obj) = observed.as_object() else {
                out.push(wrong(
                    path,
                    mode,
                    format!("expected an object, observed {}", render(observed)),
                    observed,
                ));
                return;
            };
            for (k, ev) in em {
                let Some(key) = k.as_str() else { continue };
                let sub_path = path.key(key);
                match obj.get(key) {
                    Some(ov) => {
                        check_structural(ev, ov, &sub_path, mode, closed, policy, out);
                    }
                    None if ev.is_null() => {} // absent and null are the same
                    None => {
                        // Scripted key the observation never produced.
                        out.push(Failure::new(
                            FailureKind::Extra,
                            mode,
                            sub_path.clone(),
                            format!("scripted key {key:?} absent from observed value"),
                            Some(Repair::RemoveKey { path: sub_path }),
                        ));
                    }
                }
            }
            if closed {
                for (k, ov) in obj {
                    if em.contains_key(Yaml::String(k.clone())) {
                        continue;
                    }
                    out.push(Failure::new(
                        FailureKind::Missing,
                        mode,
                        path.key(k),
                        format!("observed key {k:?} not scripted in closed matcher"),
                        Some(Repair::InsertKey {
                            path: path.clone(),
                            key: k.clone(),
                            value: json_to_yaml(ov),
                        }),
                    ));
                }
            }
        }
        Yaml::Sequence(es) => {
            let Some(arr) = observed.as_array() else {
                out.push(wrong(
                    path,
                    mode,
                    format!("expected a list, observed {}", render(observed)),
                    observed,
                ));
                return;
            };
            if es.len() != arr.len() {
                out.push(wrong(
                    path,
                    mode,
                    format!("expected {} list entries, observed {}", es.len(), arr.len()),
                    observed,
                ));
                return;
            }
            for (i, (ev, ov)) in es.iter().zip(arr).enumerate() {
                check_structural(ev, ov, &path.index(i), mode, closed, policy, out);
            }
        }
        leaf => {
            let expected_json = yaml_to_json(leaf);
            if !json_eq(&expected_json, observed) {
                out.push(wrong(
                    path,
                    mode,
                    format!("expected {}, observed {}", render(&expected_json), render(observed)),
                    observed,
                ));
            }
        }
    }
}

/// JSON equality with numeric-value comparison (`1 == 1.0`).
pub fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return xi == yi;
            }
            if let (Some(xu), Some(yu)) = (x.as_u64(), y.as_u64()) {
                return xu == yu;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(xf), Some(yf)) => xf == yf,
                _ => false,
            }
        }
        (Json::Array(xs), Json::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Json::Object(xm), Json::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

pub fn yaml_to_json(v: &Yaml) -> Json {
    match v {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                n.as_f64().and_then(serde_json::Number::from_f64).map_or(Json::Null, Json::Number)
            }
        }
        Yaml::String(s) => Json::String(s.clone()),
        Yaml::Sequence(s) => Json::Array(s.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(m) => {
            let mut out = serde_json::Map::new();
            for (k, v) in m {
                let key = match k {
                    Yaml::String(s) => s.clone(),
                    other => serde_yaml::to_string(other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                out.insert(key, yaml_to_json(v));
            }
            Json::Object(out)
        }
        Yaml::Tagged(t) => yaml_to_json(&t.value),
    }
}

pub fn json_to_yaml(v: &Json) -> Yaml {
    match v {
        Json::Null => Yaml::Null,
        Json::Bool(b) => Yaml::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Yaml::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Yaml::Number(u.into())
            } else {
                Yaml::Number(n.as_f64().unwrap_or(0.0).into())
            }
        }
        Json::String(s) => Yaml::String(s.clone()),
        Json::Array(a) => Yaml::Sequence(a.iter().map(json_to_yaml).collect()),
        Json::Object(o) => {
            let mut m = serde_yaml::Mapping::new();
            for (k, v) in o {
                m.insert(Yaml::String(k.clone()), json_to_yaml(v));
            }
            Yaml::Mapping(m)
        }
    }
}

fn render(v: &Json) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "<unprintable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> CheckPolicy {
        CheckPolicy::default()
    }

    fn matcher(yaml: &str) -> Matcher {
        let node: Yaml = serde_yaml::from_str(yaml).expect("yaml");
        Matcher::from_node(&node).expect("matcher")
    }

    fn check(m: &Matcher, observed: Json) -> Vec<Failure> {
        m.check(&YamlPath::root(), &observed, Mode::ApiRequests, &policy())
    }

    #[test]
    fn literal_passes_and_fails() {
        let m = matcher("hello");
        assert!(check(&m, json!("hello")).is_empty());
        let failures = check(&m, json!("other"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Wrong);
        assert!(matches!(
            failures[0].repair,
            Some(Repair::SetScalar { .. })
        ));
    }

    #[test]
    fn numbers_compare_by_value() {
        let m = matcher("1");
        assert!(check(&m, json!(1.0)).is_empty());
        assert!(!check(&m, json!(2)).is_empty());
    }

    #[test]
    fn regex_is_full_match() {
        let m = matcher("{matches: \"Bearer .+\"}");
        assert!(check(&m, json!("Bearer abc")).is_empty());
        assert!(!check(&m, json!("prefix Bearer abc")).is_empty());
        assert!(!check(&m, json!("Basic abc")).is_empty());
    }

    #[test]
    fn invalid_regex_is_a_scenario_error() {
        let node: Yaml = serde_yaml::from_str("{matches: \"(\"}").expect("yaml");
        assert!(Matcher::from_node(&node).is_err());
    }

    #[test]
    fn in_set_membership_and_promotion() {
        let m = matcher("{in: [a, b]}");
        assert!(check(&m, json!("a")).is_empty());

        let failures = check(&m, json!("c"));
        assert!(matches!(failures[0].repair, Some(Repair::SetScalar { .. })));

        let promote = CheckPolicy {
            promote_constraints: true,
        };
        let failures = m.check(&YamlPath::root(), &json!("c"), Mode::ApiRequests, &promote);
        match &failures[0].repair {
            Some(Repair::AppendElement { path, value }) => {
                assert_eq!(path.to_string(), "in");
                assert_eq!(value, &Yaml::String("c".to_string()));
            }
            other => panic!("expected AppendElement, got {other:?}"),
        }
    }

    #[test]
    fn is_none_checks_nullness() {
        let m = matcher("{is_none: true}");
        assert!(check(&m, Json::Null).is_empty());
        assert!(!check(&m, json!("x")).is_empty());
    }

    #[test]
    fn open_structural_ignores_observed_extras() {
        let m = matcher("{name: w1, size: 3}");
        assert!(check(&m, json!({"name": "w1", "size": 3, "etag": "xyz"})).is_empty());
    }

    #[test]
    fn open_structural_flags_absent_scripted_key() {
        let m = matcher("{name: w1, size: 3}");
        let failures = check(&m, json!({"name": "w1"}));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Extra);
        assert!(matches!(failures[0].repair, Some(Repair::RemoveKey { .. })));
        assert_eq!(failures[0].path.to_string(), "size");
    }

    #[test]
    fn closed_structural_flags_observed_extras() {
        let m = matcher("{equals: {name: w1}}");
        let failures = check(&m, json!({"name": "w1", "etag": "xyz"}));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Missing);
        assert!(matches!(failures[0].repair, Some(Repair::InsertKey { .. })));
    }

    #[test]
    fn nested_wrapper_inside_structural() {
        let m = matcher("{name: {matches: \"w.*\"}, size: 3}");
        assert!(check(&m, json!({"name": "w9", "size": 3})).is_empty());
        let failures = check(&m, json!({"name": "x", "size": 3}));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path.to_string(), "name");
    }

    #[test]
    fn failures_are_preorder() {
        let m = matcher("{a: 1, b: {c: 2, d: 3}}");
        let failures = check(&m, json!({"a": 9, "b": {"c": 9, "d": 9}}));
        let paths: Vec<String> = failures.iter().map(|f| f.path.to_string()).collect();
        assert_eq!(paths, vec!["a", "b.c", "b.d"]);
    }

    #[test]
    fn list_entries_compare_by_index() {
        let m = matcher("{items: [1, 2]}");
        assert!(check(&m, json!({"items": [1, 2]})).is_empty());
        assert!(!check(&m, json!({"items": [2, 1]})).is_empty());
        // Length mismatch is one failure on the list itself.
        let failures = check(&m, json!({"items": [1, 2, 3]}));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path.to_string(), "items");
    }
}
