//! Scripted event types: the tagged variants behind each `events:` entry.

use serde_json::Value as Json;
use serde_yaml::{Mapping, Value as Yaml};
use url::Url;

use std::collections::BTreeMap;

use crate::{
    json_to_yaml, mapping_get, yaml_str, CheckPolicy, Failure, FailureKind, Matcher, Mode,
    Repair, RehearseError, RehearseResult, YamlPath,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Stdout,
    Stderr,
    UserInput,
    ApiCall,
    Exit,
}

impl EventKind {
    pub fn mode(self) -> Mode {
        match self {
            Self::Stdout => Mode::Stdout,
            Self::Stderr => Mode::Stderr,
            Self::UserInput => Mode::UserInput,
            Self::ApiCall => Mode::ApiRequests,
            Self::Exit => Mode::Exit,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Self::Stdout => "expect_stdout",
            Self::Stderr => "expect_stderr",
            Self::UserInput => "user_input",
            Self::ApiCall => "api_call",
            Self::Exit => "expect_exit_code",
        }
    }
}

/// An HTTP request as the subject under test issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub uri: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            method: method.to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn json_body(mut self, body: &Json) -> Self {
        self.body = serde_json::to_vec(body).ok();
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    pub fn text_body(mut self, body: &str) -> Self {
        self.body = Some(body.as_bytes().to_vec());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<Json> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Clone)]
pub struct TextEvent {
    pub index: usize,
    pub expected: String,
    kind: EventKind,
}

impl TextEvent {
    pub fn path(&self) -> YamlPath {
        YamlPath::event(self.index).key(self.kind.field())
    }

    pub fn wrong(&self, observed: &str) -> Failure {
        Failure::new(
            FailureKind::Wrong,
            self.kind.mode(),
            self.path(),
            format!("expected {:?}, observed {:?}", self.expected, observed),
            Some(Repair::SetScalar {
                path: self.path(),
                value: yaml_str(observed),
            }),
        )
    }
}

#[derive(Debug, Clone)]
pub struct UserInputEvent {
    pub index: usize,
    pub lines: Vec<String>,
}

impl UserInputEvent {
    pub fn path(&self) -> YamlPath {
        YamlPath::event(self.index).key("user_input")
    }
}

#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub index: usize,
    pub code: i64,
}

impl ExitEvent {
    pub fn path(&self) -> YamlPath {
        YamlPath::event(self.index).key("expect_exit_code")
    }

    pub fn handle(&self, observed: i32) -> Vec<Failure> {
        if i64::from(observed) == self.code {
            return Vec::new();
        }
        vec![Failure::new(
            FailureKind::Wrong,
            Mode::Exit,
            self.path(),
            format!("expected exit code {}, observed {observed}", self.code),
            Some(Repair::SetScalar {
                path: self.path(),
                value: Yaml::Number(i64::from(observed).into()),
            }),
        )]
    }
}

#[derive(Debug, Clone)]
pub enum BodyAssertion {
    /// No `body:` key scripted; an observed body is captured on update.
    Unspecified,
    /// `body: null` — the request must carry no payload.
    ExpectAbsent,
    Check(Matcher),
}

#[derive(Debug, Clone)]
pub struct RequestAssertion {
    pub uri: Matcher,
    pub method: Matcher,
    /// Header name as scripted, matcher. Lookup folds names to lowercase.
    pub headers: Vec<(String, Matcher)>,
    pub body: BodyAssertion,
}

#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Default for CannedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiCallEvent {
    pub index: usize,
    pub request: RequestAssertion,
    pub response: CannedResponse,
    pub repeatable: bool,
}

impl ApiCallEvent {
    fn request_path(&self) -> YamlPath {
        YamlPath::event(self.index)
            .key("api_call")
            .key("expect_request")
    }

    /// Validates the observed request against the scripted assertion bundle.
    pub fn handle(&self, req: &HttpRequest, policy: &CheckPolicy) -> Vec<Failure> {
        let base = self.request_path();
        let mode = Mode::ApiRequests;
        let mut out = Vec::new();

        let observed_uri = normalize_uri(&req.uri);
        out.extend(
            self.request
                .uri
                .check_str(&base.key("uri"), &observed_uri, mode, policy),
        );

        let observed_method = req.method.to_ascii_uppercase();
        out.extend(
            self.request
                .method
                .check_str(&base.key("method"), &observed_method, mode, policy),
        );

        let folded: BTreeMap<String, &String> = req
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        for (name, matcher) in &self.request.headers {
            let observed = folded
                .get(&name.to_ascii_lowercase())
                .map(|v| Json::String((*v).clone()))
                .unwrap_or(Json::Null);
            out.extend(matcher.check(
                &base.key("headers").key(name),
                &observed,
                mode,
                policy,
            ));
        }

        out.extend(self.check_body(req, &base, policy));
        out
    }

    fn check_body(
        &self,
        req: &HttpRequest,
        base: &YamlPath,
        policy: &CheckPolicy,
    ) -> Vec<Failure> {
        let body_path = base.key("body");
        // An empty payload and no payload are the same thing.
        let bytes = req.body.as_deref().filter(|b| !b.is_empty());
        let parsed: Option<Json> = bytes.and_then(|b| serde_json::from_slice(b).ok());

        match &self.request.body {
            BodyAssertion::Unspecified => match bytes {
                None => Vec::new(),
                Some(b) => vec![Failure::new(
                    FailureKind::Missing,
                    Mode::ApiRequests,
                    body_path.clone(),
                    "request carried a body but none is scripted".to_string(),
                    Some(Repair::SetScalar {
                        path: body_path,
                        value: captured_body(b, parsed.as_ref()),
                    }),
                )],
            },
            BodyAssertion::ExpectAbsent => match bytes {
                None => Vec::new(),
                Some(b) => vec![Failure::new(
                    FailureKind::Wrong,
                    Mode::ApiRequests,
                    body_path.clone(),
                    "scripted `body: null` but the request carried a payload".to_string(),
                    Some(Repair::SetScalar {
                        path: body_path,
                        value: captured_body(b, parsed.as_ref()),
                    }),
                )],
            },
            BodyAssertion::Check(matcher) => {
                let observed = match (&parsed, bytes) {
                    (Some(json), _) => json.clone(),
                    (None, Some(b)) => Json::String(String::from_utf8_lossy(b).into_owned()),
                    (None, None) => Json::Null,
                };
                matcher.check(&body_path, &observed, Mode::ApiRequests, policy)
            }
        }
    }

    pub fn respond(&self) -> HttpResponse {
        HttpResponse {
            status: self.response.status,
            headers: self.response.headers.clone(),
            body: self.response.body.clone(),
        }
    }

    /// `repeatable:` must reflect whether the event actually repeated.
    pub fn check_repeatable(&self, was_repeated: bool) -> Vec<Failure> {
        if self.repeatable == was_repeated {
            return Vec::new();
        }
        let path = YamlPath::event(self.index)
            .key("api_call")
            .key("repeatable");
        vec![Failure::new(
            FailureKind::Wrong,
            Mode::ApiRequests,
            path.clone(),
            format!(
                "scripted repeatable: {} but the call {} repeated",
                self.repeatable,
                if was_repeated { "was" } else { "was never" }
            ),
            Some(Repair::SetScalar {
                path,
                value: Yaml::Bool(was_repeated),
            }),
        )]
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Stdout(TextEvent),
    Stderr(TextEvent),
    UserInput(UserInputEvent),
    ApiCall(Box<ApiCallEvent>),
    Exit(ExitEvent),
}

impl ScriptedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Stdout(_) => EventKind::Stdout,
            Self::Stderr(_) => EventKind::Stderr,
            Self::UserInput(_) => EventKind::UserInput,
            Self::ApiCall(_) => EventKind::ApiCall,
            Self::Exit(_) => EventKind::Exit,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Stdout(e) | Self::Stderr(e) => e.index,
            Self::UserInput(e) => e.index,
            Self::ApiCall(e) => e.index,
            Self::Exit(e) => e.index,
        }
    }

    /// Parses one `events:` entry, which must carry exactly one event key.
    pub fn from_node(index: usize, node: &Yaml) -> RehearseResult<Self> {
        let m = node.as_mapping().ok_or_else(|| {
            RehearseError::Scenario(format!("events[{index}] must be a mapping"))
        })?;
        let mut found = Vec::new();
        for (k, _) in m {
            if let Some(k) = k.as_str() {
                found.push(k.to_string());
            }
        }
        if found.len() != 1 {
            return Err(RehearseError::Scenario(format!(
                "events[{index}] must have exactly one event key, found {found:?}"
            )));
        }
        let key = found[0].as_str();
        let value = mapping_get(m, key).unwrap_or(&Yaml::Null);
        match key {
            "expect_stdout" | "expect_stderr" => {
                let expected = match value {
                    Yaml::Null => String::new(),
                    Yaml::String(s) => s.clone(),
                    other => {
                        return Err(RehearseError::Scenario(format!(
                            "events[{index}].{key} must be a string, got {other:?}"
                        )))
                    }
                };
                let kind = if key == "expect_stdout" {
                    EventKind::Stdout
                } else {
                    EventKind::Stderr
                };
                let ev = TextEvent {
                    index,
                    expected,
                    kind,
                };
                Ok(if kind == EventKind::Stdout {
                    Self::Stdout(ev)
                } else {
                    Self::Stderr(ev)
                })
            }
            "user_input" => {
                let seq = value.as_sequence().ok_or_else(|| {
                    RehearseError::Scenario(format!(
                        "events[{index}].user_input must be a list of strings"
                    ))
                })?;
                let mut lines = Vec::with_capacity(seq.len());
                for v in seq {
                    let s = v.as_str().ok_or_else(|| {
                        RehearseError::Scenario(format!(
                            "events[{index}].user_input entries must be strings"
                        ))
                    })?;
                    lines.push(s.to_string());
                }
                Ok(Self::UserInput(UserInputEvent { index, lines }))
            }
            "expect_exit_code" => {
                let code = value.as_i64().ok_or_else(|| {
                    RehearseError::Scenario(format!(
                        "events[{index}].expect_exit_code must be an integer"
                    ))
                })?;
                Ok(Self::Exit(ExitEvent { index, code }))
            }
            "api_call" => Ok(Self::ApiCall(Box::new(parse_api_call(index, value)?))),
            other => Err(RehearseError::Scenario(format!(
                "events[{index}] has unknown event key {other:?}"
            ))),
        }
    }
}

fn parse_api_call(index: usize, value: &Yaml) -> RehearseResult<ApiCallEvent> {
    let m = value.as_mapping().ok_or_else(|| {
        RehearseError::Scenario(format!("events[{index}].api_call must be a mapping"))
    })?;
    for (k, _) in m {
        match k.as_str() {
            Some("expect_request") | Some("return_response") | Some("repeatable") => {}
            other => {
                return Err(RehearseError::Scenario(format!(
                    "events[{index}].api_call has unknown key {other:?}"
                )))
            }
        }
    }

    let req = mapping_get(m, "expect_request")
        .and_then(Yaml::as_mapping)
        .ok_or_else(|| {
            RehearseError::Scenario(format!(
                "events[{index}].api_call.expect_request is required"
            ))
        })?;
    let request = parse_request_assertion(index, req)?;

    let response = match mapping_get(m, "return_response") {
        None | Some(Yaml::Null) => CannedResponse::default(),
        Some(v) => parse_canned_response(index, v)?,
    };

    let repeatable = match mapping_get(m, "repeatable") {
        None => false,
        Some(v) => v.as_bool().ok_or_else(|| {
            RehearseError::Scenario(format!("events[{index}].api_call.repeatable must be a bool"))
        })?,
    };

    Ok(ApiCallEvent {
        index,
        request,
        response,
        repeatable,
    })
}

fn parse_request_assertion(index: usize, m: &Mapping) -> RehearseResult<RequestAssertion> {
    let uri = match mapping_get(m, "uri") {
        None => Matcher::Literal(yaml_str("")),
        Some(v) => normalize_uri_matcher(Matcher::from_node(v)?),
    };
    let method = match mapping_get(m, "method") {
        None => Matcher::Literal(yaml_str("GET")),
        Some(v) => uppercase_matcher(Matcher::from_node(v)?),
    };

    let mut headers = Vec::new();
    if let Some(hm) = mapping_get(m, "headers").and_then(Yaml::as_mapping) {
        for (k, v) in hm {
            let name = k.as_str().ok_or_else(|| {
                RehearseError::Scenario(format!(
                    "events[{index}].api_call.expect_request.headers keys must be strings"
                ))
            })?;
            headers.push((name.to_string(), Matcher::from_node(v)?));
        }
    }

    let body = if !m.contains_key("body") {
        BodyAssertion::Unspecified
    } else {
        match mapping_get(m, "body") {
            Some(Yaml::Null) | None => BodyAssertion::ExpectAbsent,
            Some(v) => BodyAssertion::Check(Matcher::from_node(v)?),
        }
    };

    Ok(RequestAssertion {
        uri,
        method,
        headers,
        body,
    })
}

fn parse_canned_response(index: usize, value: &Yaml) -> RehearseResult<CannedResponse> {
    let m = value.as_mapping().ok_or_else(|| {
        RehearseError::Scenario(format!(
            "events[{index}].api_call.return_response must be a mapping"
        ))
    })?;
    let status = match mapping_get(m, "status") {
        None => 200,
        Some(v) => v
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| {
                RehearseError::Scenario(format!(
                    "events[{index}].api_call.return_response.status must be an HTTP status"
                ))
            })?,
    };
    let mut headers = BTreeMap::new();
    if let Some(hm) = mapping_get(m, "headers").and_then(Yaml::as_mapping) {
        for (k, v) in hm {
            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                headers.insert(k.to_string(), v.to_string());
            }
        }
    }
    let body = match mapping_get(m, "body") {
        None | Some(Yaml::Null) => Vec::new(),
        Some(Yaml::String(s)) => s.clone().into_bytes(),
        Some(v @ Yaml::Mapping(_)) | Some(v @ Yaml::Sequence(_)) => {
            let json = crate::yaml_to_json(v);
            serde_json::to_vec(&json)?
        }
        Some(other) => {
            return Err(RehearseError::Scenario(format!(
                "events[{index}].api_call.return_response.body must be a string or structure, got {other:?}"
            )))
        }
    };
    Ok(CannedResponse {
        status,
        headers,
        body,
    })
}

fn normalize_uri_matcher(m: Matcher) -> Matcher {
    match m {
        Matcher::Literal(Yaml::String(s)) => Matcher::Literal(yaml_str(&normalize_uri(&s))),
        Matcher::In(set) => Matcher::In(
            set.into_iter()
                .map(|v| match v {
                    Yaml::String(s) => yaml_str(&normalize_uri(&s)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn uppercase_matcher(m: Matcher) -> Matcher {
    match m {
        Matcher::Literal(Yaml::String(s)) => Matcher::Literal(yaml_str(&s.to_ascii_uppercase())),
        Matcher::In(set) => Matcher::In(
            set.into_iter()
                .map(|v| match v {
                    Yaml::String(s) => yaml_str(&s.to_ascii_uppercase()),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Canonical URI form: scheme/host folded by the parser, query parameters
/// sorted so their order never matters.
pub fn normalize_uri(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        return url.to_string();
    }
    pairs.sort();
    let mut out = url.clone();
    out.set_query(None);
    out.query_pairs_mut().extend_pairs(pairs);
    out.to_string()
}

fn captured_body(bytes: &[u8], parsed: Option<&Json>) -> Yaml {
    match parsed {
        Some(json) => json_to_yaml(json),
        None => yaml_str(&String::from_utf8_lossy(bytes)),
    }
}

/// Builds the YAML node a synthesized event materializes on repair.
pub fn missing_text_node(kind: EventKind, text: &str) -> Yaml {
    let mut m = Mapping::new();
    m.insert(yaml_str(kind.field()), yaml_str(text));
    Yaml::Mapping(m)
}

pub fn missing_user_input_node(lines: &[String]) -> Yaml {
    let mut m = Mapping::new();
    m.insert(
        yaml_str("user_input"),
        Yaml::Sequence(lines.iter().map(|l| yaml_str(l)).collect()),
    );
    Yaml::Mapping(m)
}

pub fn missing_exit_node(code: i32) -> Yaml {
    let mut m = Mapping::new();
    m.insert(
        yaml_str("expect_exit_code"),
        Yaml::Number(i64::from(code).into()),
    );
    Yaml::Mapping(m)
}

/// Captures an out-of-script request verbatim: literal uri/method/headers/body
/// plus the default 200 response.
pub fn missing_api_call_node(req: &HttpRequest) -> Yaml {
    let mut expect = Mapping::new();
    expect.insert(yaml_str("uri"), yaml_str(&normalize_uri(&req.uri)));
    expect.insert(yaml_str("method"), yaml_str(&req.method.to_ascii_uppercase()));
    let mut headers = Mapping::new();
    for (k, v) in &req.headers {
        headers.insert(yaml_str(&k.to_ascii_lowercase()), yaml_str(v));
    }
    expect.insert(yaml_str("headers"), Yaml::Mapping(headers));
    let body = match req.body.as_deref().filter(|b| !b.is_empty()) {
        None => Yaml::Null,
        Some(b) => captured_body(b, serde_json::from_slice::<Json>(b).ok().as_ref()),
    };
    expect.insert(yaml_str("body"), body);

    let mut response = Mapping::new();
    response.insert(yaml_str("status"), Yaml::Number(200.into()));
    response.insert(yaml_str("headers"), Yaml::Mapping(Mapping::new()));
    response.insert(yaml_str("body"), yaml_str(""));

    let mut call = Mapping::new();
    call.insert(yaml_str("expect_request"), Yaml::Mapping(expect));
    call.insert(yaml_str("return_response"), Yaml::Mapping(response));

    let mut node = Mapping::new();
    node.insert(yaml_str("api_call"), Yaml::Mapping(call));
    Yaml::Mapping(node)
}
