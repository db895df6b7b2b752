//! Event-stream scheduler: matches live observations against scripted events.
//!
//! Stdout and stderr are pumped independently against their own chains of
//! text slots, so interleaving between the two channels never matters. API
//! calls, input requests, and exit are hard sync points: both channels flush,
//! and any buffered divergence resolves before the sync event is consumed.
//!
//! Nothing here touches the document. Every mismatch becomes a `Failure`
//! carrying the `Repair` that would have made it pass; the update engine
//! replays licensed repairs afterwards.

use crate::{
    missing_api_call_node, missing_exit_node, missing_text_node, missing_user_input_node,
    normalize_uri, yaml_str, CheckPolicy, EventKind, Failure, FailureKind, HttpRequest,
    HttpResponse, Mode, Repair, RehearseResult, ScenarioDoc, ScriptedEvent, YamlPath,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn kind(self) -> EventKind {
        match self {
            Self::Stdout => EventKind::Stdout,
            Self::Stderr => EventKind::Stderr,
        }
    }

    pub fn mode(self) -> Mode {
        match self {
            Self::Stdout => Mode::Stdout,
            Self::Stderr => Mode::Stderr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    /// Text: bytes of the expected string matched so far.
    /// User input: lines served so far.
    Partial(usize),
    Retired,
}

#[derive(Debug)]
struct Slot {
    event: ScriptedEvent,
    state: SlotState,
}

#[derive(Debug)]
struct Latch {
    index: usize,
    uri: String,
    method: String,
    body: Option<Vec<u8>>,
    repeatable: bool,
    repeated: bool,
}

#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<Slot>,
    failures: Vec<Failure>,
    policy: CheckPolicy,
    stdout_buf: String,
    stderr_buf: String,
    latch: Option<Latch>,
}

impl Scheduler {
    pub fn new(events: Vec<ScriptedEvent>, policy: CheckPolicy) -> Self {
        Self {
            slots: events
                .into_iter()
                .map(|event| Slot {
                    event,
                    state: SlotState::Pending,
                })
                .collect(),
            failures: Vec::new(),
            policy,
            stdout_buf: String::new(),
            stderr_buf: String::new(),
            latch: None,
        }
    }

    pub fn from_doc(doc: &ScenarioDoc, policy: CheckPolicy) -> RehearseResult<Self> {
        let nodes = doc.event_nodes()?;
        let mut events = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            events.push(ScriptedEvent::from_node(i, node)?);
        }
        Ok(Self::new(events, policy))
    }

    pub fn write(&mut self, ch: Channel, text: &str) {
        self.buf_mut(ch).push_str(text);
        self.pump(ch);
    }

    /// Hard sync point: the subject issued an HTTP request. Returns the
    /// canned response (default 200/empty when nothing was scripted).
    pub fn observe_api_call(&mut self, req: &HttpRequest) -> HttpResponse {
        self.flush(Channel::Stdout);
        self.flush(Channel::Stderr);

        let uri = normalize_uri(&req.uri);
        let method = req.method.to_ascii_uppercase();
        let body = req.body.clone().filter(|b| !b.is_empty());

        // An identical consecutive call against a `repeatable: true` event is
        // a repeat of it, not a fresh event. A non-repeatable event is
        // consumed once; identical follow-ups match the next scripted event.
        if let Some(latch) = &mut self.latch {
            if latch.repeatable && latch.uri == uri && latch.method == method && latch.body == body
            {
                latch.repeated = true;
                if let ScriptedEvent::ApiCall(ev) = &self.slots[latch.index].event {
                    return ev.respond();
                }
            }
        }

        match self.head_for_sync() {
            Some(i) if matches!(self.slots[i].event, ScriptedEvent::ApiCall(_)) => {
                let (new_failures, response, repeatable) = {
                    let ScriptedEvent::ApiCall(ev) = &self.slots[i].event else {
                        unreachable!()
                    };
                    (ev.handle(req, &self.policy), ev.respond(), ev.repeatable)
                };
                self.failures.extend(new_failures);
                self.slots[i].state = SlotState::Retired;
                self.release_latch();
                self.latch = Some(Latch {
                    index: i,
                    uri,
                    method,
                    body,
                    repeatable,
                    repeated: false,
                });
                response
            }
            _ => {
                let at = self.first_unretired();
                self.failures.push(Failure::new(
                    FailureKind::Missing,
                    Mode::ApiRequests,
                    YamlPath::event(at).key("api_call"),
                    format!("unscripted API call {method} {uri}"),
                    Some(Repair::InsertEvent {
                        index: at,
                        node: missing_api_call_node(req),
                    }),
                ));
                HttpResponse {
                    status: 200,
                    headers: Default::default(),
                    body: Vec::new(),
                }
            }
        }
    }

    /// Hard sync point: the subject asked for a line of input. An unscripted
    /// prompt is answered "y" so the run can keep going.
    pub fn request_input(&mut self) -> String {
        self.flush(Channel::Stdout);
        // Prompt text that no stderr event claims is tolerated here: the
        // input event itself is the assertion, not the prompt wording.
        self.pump(Channel::Stderr);
        if !self.stderr_buf.is_empty() && self.next_text_slot(Channel::Stderr).is_none() {
            self.stderr_buf.clear();
        } else {
            self.flush(Channel::Stderr);
        }

        let Some(i) = self.head_for_sync() else {
            let at = self.slots.len();
            self.synthesize_input(at);
            return "y".to_string();
        };
        if let ScriptedEvent::UserInput(ev) = &self.slots[i].event {
            let served = match self.slots[i].state {
                SlotState::Partial(n) => n,
                _ => 0,
            };
            if ev.lines.is_empty() {
                let path = ev.path();
                self.failures.push(Failure::new(
                    FailureKind::Missing,
                    Mode::UserInput,
                    path.clone(),
                    "prompt answered but no input lines scripted".to_string(),
                    Some(Repair::AppendElement {
                        path,
                        value: yaml_str("y"),
                    }),
                ));
                self.slots[i].state = SlotState::Retired;
                return "y".to_string();
            }
            let line = ev.lines[served].clone();
            let exhausted = served + 1 == ev.lines.len();
            self.slots[i].state = if exhausted {
                SlotState::Retired
            } else {
                SlotState::Partial(served + 1)
            };
            return line;
        }

        let head_field = self.slots[i].event.kind().field();
        let later_input = self.slots[i..].iter().any(|s| {
            s.state != SlotState::Retired && matches!(s.event, ScriptedEvent::UserInput(_))
        });
        if later_input {
            self.failures.push(Failure::new(
                FailureKind::OutOfOrder,
                Mode::Ux,
                YamlPath::event(i).key(head_field),
                "prompt arrived before this scripted event".to_string(),
                None,
            ));
        } else {
            self.synthesize_input(i);
        }
        "y".to_string()
    }

    /// The subject exited. Resolves everything still scripted.
    pub fn finish(&mut self, code: i32) {
        self.flush(Channel::Stdout);
        self.flush(Channel::Stderr);

        self.release_latch();

        let mut exit_seen = false;
        for i in 0..self.slots.len() {
            if self.slots[i].state == SlotState::Retired {
                continue;
            }
            let state = self.slots[i].state;
            let kind = self.slots[i].event.kind();
            let (new_failure, retire): (Option<Failure>, bool) = match &self.slots[i].event {
                ScriptedEvent::Stdout(t) | ScriptedEvent::Stderr(t) => match state {
                    SlotState::Partial(n) => {
                        let observed = &t.expected[..n];
                        (Some(t.wrong(observed)), true)
                    }
                    _ if t.expected.is_empty() => (None, true),
                    _ => (
                        Some(Failure::new(
                            FailureKind::Extra,
                            kind.mode(),
                            YamlPath::event(i),
                            format!("scripted output {:?} never observed", t.expected),
                            Some(Repair::RemoveEvent { index: i }),
                        )),
                        true,
                    ),
                },
                ScriptedEvent::UserInput(ev) => match state {
                    SlotState::Partial(n) => {
                        let served: Vec<serde_yaml::Value> =
                            ev.lines[..n].iter().map(|l| yaml_str(l)).collect();
                        (
                            Some(Failure::new(
                                FailureKind::Wrong,
                                Mode::UserInput,
                                ev.path(),
                                format!(
                                    "only {n} of {} scripted input lines were read",
                                    ev.lines.len()
                                ),
                                Some(Repair::SetScalar {
                                    path: ev.path(),
                                    value: serde_yaml::Value::Sequence(served),
                                }),
                            )),
                            true,
                        )
                    }
                    _ => (
                        Some(Failure::new(
                            FailureKind::Extra,
                            Mode::UserInput,
                            YamlPath::event(i),
                            "scripted user input was never requested".to_string(),
                            Some(Repair::RemoveEvent { index: i }),
                        )),
                        true,
                    ),
                },
                ScriptedEvent::ApiCall(_) => (
                    Some(Failure::new(
                        FailureKind::Extra,
                        Mode::ApiRequests,
                        YamlPath::event(i),
                        "scripted API call never observed".to_string(),
                        Some(Repair::RemoveEvent { index: i }),
                    )),
                    true,
                ),
                ScriptedEvent::Exit(ev) => {
                    exit_seen = true;
                    let fs = ev.handle(code);
                    self.failures.extend(fs);
                    (None, true)
                }
            };
            if let Some(f) = new_failure {
                self.failures.push(f);
            }
            if retire {
                self.slots[i].state = SlotState::Retired;
            }
        }

        // Absent expect_exit_code means 0.
        if !exit_seen && code != 0 {
            let at = self.slots.len();
            self.failures.push(Failure::new(
                FailureKind::Missing,
                Mode::Exit,
                YamlPath::event(at).key("expect_exit_code"),
                format!("exit code {code} was not scripted"),
                Some(Repair::InsertEvent {
                    index: at,
                    node: missing_exit_node(code),
                }),
            ));
        }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }

    /// Settles the outgoing latch's `repeatable:` flag against what actually
    /// happened. Runs whenever a new API call event takes over, and at finish.
    fn release_latch(&mut self) {
        if let Some(latch) = self.latch.take() {
            if let ScriptedEvent::ApiCall(ev) = &self.slots[latch.index].event {
                let fs = ev.check_repeatable(latch.repeated);
                self.failures.extend(fs);
            }
        }
    }

    fn synthesize_input(&mut self, at: usize) {
        self.failures.push(Failure::new(
            FailureKind::Missing,
            Mode::UserInput,
            YamlPath::event(at).key("user_input"),
            "unscripted prompt".to_string(),
            Some(Repair::InsertEvent {
                index: at,
                node: missing_user_input_node(&["y".to_string()]),
            }),
        ));
    }

    fn buf_mut(&mut self, ch: Channel) -> &mut String {
        match ch {
            Channel::Stdout => &mut self.stdout_buf,
            Channel::Stderr => &mut self.stderr_buf,
        }
    }

    /// First non-retired slot of this channel's kind. Other-channel text
    /// slots never block; sync events always do.
    fn next_text_slot(&self, ch: Channel) -> Option<usize> {
        let want = ch.kind();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.state == SlotState::Retired {
                continue;
            }
            let kind = slot.event.kind();
            if kind == want {
                return Some(i);
            }
            if kind == EventKind::Stdout || kind == EventKind::Stderr {
                continue;
            }
            return None;
        }
        None
    }

    /// Greedy prefix matching against successive same-channel text slots.
    /// Divergent text stays buffered until the next sync point attributes it.
    fn pump(&mut self, ch: Channel) {
        let mut buf = std::mem::take(self.buf_mut(ch));
        loop {
            if buf.is_empty() {
                break;
            }
            let Some(i) = self.next_text_slot(ch) else {
                break;
            };
            let (expected, consumed) = {
                let (ScriptedEvent::Stdout(t) | ScriptedEvent::Stderr(t)) = &self.slots[i].event
                else {
                    unreachable!()
                };
                let consumed = match self.slots[i].state {
                    SlotState::Partial(n) => n,
                    _ => 0,
                };
                (t.expected.clone(), consumed)
            };
            let rem = &expected[consumed..];
            if rem.is_empty() {
                self.slots[i].state = SlotState::Retired;
                continue;
            }
            if rem.starts_with(buf.as_str()) {
                let matched = consumed + buf.len();
                buf.clear();
                self.slots[i].state = if matched == expected.len() {
                    SlotState::Retired
                } else {
                    SlotState::Partial(matched)
                };
                break;
            }
            if buf.starts_with(rem) {
                buf.drain(..rem.len());
                self.slots[i].state = SlotState::Retired;
                continue;
            }
            break;
        }
        *self.buf_mut(ch) = buf;
    }

    /// Resolves a channel at a hard sync point: buffered divergence becomes
    /// a Wrong against the next compatible slot, or a Missing insertion when
    /// no compatible slot exists before the barrier.
    fn flush(&mut self, ch: Channel) {
        self.pump(ch);
        let buf = std::mem::take(self.buf_mut(ch));
        let slot = self.next_text_slot(ch);
        match (buf.is_empty(), slot) {
            (true, Some(i)) => {
                if let SlotState::Partial(n) = self.slots[i].state {
                    let (ScriptedEvent::Stdout(t) | ScriptedEvent::Stderr(t)) =
                        &self.slots[i].event
                    else {
                        unreachable!()
                    };
                    let f = t.wrong(&t.expected[..n]);
                    self.failures.push(f);
                    self.slots[i].state = SlotState::Retired;
                }
            }
            (true, None) => {}
            (false, Some(i)) => {
                let (ScriptedEvent::Stdout(t) | ScriptedEvent::Stderr(t)) = &self.slots[i].event
                else {
                    unreachable!()
                };
                let consumed = match self.slots[i].state {
                    SlotState::Partial(n) => n,
                    _ => 0,
                };
                let observed = format!("{}{buf}", &t.expected[..consumed]);
                let f = t.wrong(&observed);
                self.failures.push(f);
                self.slots[i].state = SlotState::Retired;
            }
            (false, None) => {
                let at = self.first_unretired();
                self.failures.push(Failure::new(
                    FailureKind::Missing,
                    ch.mode(),
                    YamlPath::event(at).key(ch.kind().field()),
                    format!("unscripted output {buf:?}"),
                    Some(Repair::InsertEvent {
                        index: at,
                        node: missing_text_node(ch.kind(), &buf),
                    }),
                ));
            }
        }
    }

    /// First slot a sync event could consume: retires empty text slots on
    /// the way, stops at anything else.
    fn head_for_sync(&mut self) -> Option<usize> {
        for i in 0..self.slots.len() {
            if self.slots[i].state == SlotState::Retired {
                continue;
            }
            if let (ScriptedEvent::Stdout(t) | ScriptedEvent::Stderr(t), SlotState::Pending) =
                (&self.slots[i].event, self.slots[i].state)
            {
                if t.expected.is_empty() {
                    self.slots[i].state = SlotState::Retired;
                    continue;
                }
            }
            return Some(i);
        }
        None
    }

    fn first_unretired(&self) -> usize {
        self.slots
            .iter()
            .position(|s| s.state != SlotState::Retired)
            .unwrap_or(self.slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(yaml: &str) -> Scheduler {
        let doc = ScenarioDoc::parse_str(yaml).expect("parse");
        Scheduler::from_doc(&doc, CheckPolicy::default()).expect("events")
    }

    const OUTPUT_ONLY: &str = "\
command: widgets list
events:
- expect_stderr: \"Listing widgets...\\n\"
- expect_stdout: \"w1\\nw2\\n\"
- expect_exit_code: 0
";

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let mut s = scheduler(OUTPUT_ONLY);
        s.write(Channel::Stderr, "Listing wid");
        s.write(Channel::Stderr, "gets...\n");
        s.write(Channel::Stdout, "w1\nw2\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn one_chunk_can_span_two_events() {
        let mut s = scheduler(
            "command: c\nevents:\n- expect_stdout: \"a\\n\"\n- expect_stdout: \"b\\n\"\n",
        );
        s.write(Channel::Stdout, "a\nb\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn channels_are_independent() {
        // Stdout arrives before the scripted stderr; order between channels
        // is not part of the contract.
        let mut s = scheduler(OUTPUT_ONLY);
        s.write(Channel::Stdout, "w1\nw2\n");
        s.write(Channel::Stderr, "Listing widgets...\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn divergent_output_repairs_to_observed_text() {
        let mut s = scheduler(OUTPUT_ONLY);
        s.write(Channel::Stderr, "Listing widgets...\n");
        s.write(Channel::Stdout, "w1\nw3\n");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Wrong);
        assert_eq!(failures[0].path.to_string(), "events[1].expect_stdout");
        match &failures[0].repair {
            Some(Repair::SetScalar { value, .. }) => {
                assert_eq!(value.as_str(), Some("w1\nw3\n"));
            }
            other => panic!("expected SetScalar, got {other:?}"),
        }
    }

    #[test]
    fn unscripted_output_synthesizes_an_event() {
        let mut s = scheduler("command: c\nevents:\n- expect_exit_code: 0\n");
        s.write(Channel::Stdout, "surprise\n");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Missing);
        match &failures[0].repair {
            Some(Repair::InsertEvent { index, .. }) => assert_eq!(*index, 0),
            other => panic!("expected InsertEvent, got {other:?}"),
        }
    }

    #[test]
    fn unobserved_events_are_extra() {
        let mut s = scheduler(OUTPUT_ONLY);
        s.write(Channel::Stderr, "Listing widgets...\n");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Extra);
        assert!(matches!(failures[0].repair, Some(Repair::RemoveEvent { index: 1 })));
    }

    const WITH_API: &str = "\
command: widgets delete w1
events:
- expect_stderr: \"Deleting widget [w1]...\\n\"
- api_call:
    expect_request:
      uri: https://widgets.example.com/v1/widgets/w1
      method: DELETE
    return_response:
      status: 200
      body: \"{}\"
- expect_stdout: \"Deleted [w1].\\n\"
- expect_exit_code: 0
";

    #[test]
    fn scripted_api_call_serves_its_response() {
        let mut s = scheduler(WITH_API);
        s.write(Channel::Stderr, "Deleting widget [w1]...\n");
        let resp =
            s.observe_api_call(&HttpRequest::new("DELETE", "https://widgets.example.com/v1/widgets/w1"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_str(), "{}");
        s.write(Channel::Stdout, "Deleted [w1].\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn unscripted_api_call_gets_default_response_and_missing_event() {
        let mut s = scheduler(OUTPUT_ONLY);
        s.write(Channel::Stderr, "Listing widgets...\n");
        let resp = s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/v1"));
        assert_eq!(resp.status, 200);
        assert!(resp.body.is_empty());
        s.write(Channel::Stdout, "w1\nw2\n");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Missing);
        assert!(matches!(failures[0].repair, Some(Repair::InsertEvent { index: 1, .. })));
    }

    #[test]
    fn identical_consecutive_calls_latch_as_repeats() {
        let yaml = "\
command: widgets wait
events:
- api_call:
    expect_request:
      uri: https://x.example.com/op
      method: GET
    return_response:
      body: \"pending\"
    repeatable: true
- expect_exit_code: 0
";
        let mut s = scheduler(yaml);
        for _ in 0..3 {
            let resp = s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/op"));
            assert_eq!(resp.body_str(), "pending");
        }
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn identical_scripted_calls_consume_one_event_each() {
        // Polling written out explicitly: two identical requests, each with
        // its own canned response and no repeatable flag.
        let yaml = "\
command: widgets wait
events:
- api_call:
    expect_request:
      uri: https://x.example.com/op
      method: GET
    return_response:
      body: \"pending\"
- api_call:
    expect_request:
      uri: https://x.example.com/op
      method: GET
    return_response:
      body: \"done\"
- expect_exit_code: 0
";
        let mut s = scheduler(yaml);
        let first = s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/op"));
        assert_eq!(first.body_str(), "pending");
        let second = s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/op"));
        assert_eq!(second.body_str(), "done");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn repeatable_flag_is_settled_when_the_next_call_takes_over() {
        let yaml = "\
command: widgets wait
events:
- api_call:
    expect_request:
      uri: https://x.example.com/op
      method: GET
    repeatable: true
- api_call:
    expect_request:
      uri: https://x.example.com/other
      method: GET
";
        let mut s = scheduler(yaml);
        s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/op"));
        s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/other"));
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path.to_string(), "events[0].api_call.repeatable");
    }

    #[test]
    fn unrepeated_repeatable_call_is_flagged() {
        let yaml = "\
command: widgets wait
events:
- api_call:
    expect_request:
      uri: https://x.example.com/op
      method: GET
    repeatable: true
";
        let mut s = scheduler(yaml);
        s.observe_api_call(&HttpRequest::new("GET", "https://x.example.com/op"));
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].path.to_string(),
            "events[0].api_call.repeatable"
        );
    }

    const WITH_INPUT: &str = "\
command: widgets delete w1
events:
- expect_stderr: \"Continue? \"
- user_input:
  - \"y\"
- expect_stdout: \"done\\n\"
- expect_exit_code: 0
";

    #[test]
    fn scripted_input_lines_are_served_in_order() {
        let mut s = scheduler(WITH_INPUT);
        s.write(Channel::Stderr, "Continue? ");
        assert_eq!(s.request_input(), "y");
        s.write(Channel::Stdout, "done\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn unscripted_prompt_text_is_tolerated() {
        // Only the input lines are scripted; the prompt wording on stderr is
        // not an assertion.
        let mut s = scheduler(
            "command: c\nevents:\n- user_input:\n  - \"y\"\n- expect_stdout: \"Deleted\\n\"\n- expect_exit_code: 0\n",
        );
        s.write(Channel::Stderr, "Continue? ");
        assert_eq!(s.request_input(), "y");
        s.write(Channel::Stdout, "Deleted\n");
        s.finish(0);
        assert!(s.failures().is_empty(), "{:?}", s.failures());
    }

    #[test]
    fn unscripted_prompt_is_answered_and_synthesized() {
        let mut s = scheduler("command: c\nevents:\n- expect_exit_code: 0\n");
        assert_eq!(s.request_input(), "y");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Missing);
        assert_eq!(failures[0].mode, Mode::UserInput);
    }

    #[test]
    fn early_prompt_is_out_of_order() {
        let mut s = scheduler(WITH_API.replace("- expect_stdout: \"Deleted [w1].\\n\"",
            "- user_input:\n  - \"y\"").as_str());
        s.write(Channel::Stderr, "Deleting widget [w1]...\n");
        // Prompt arrives while the api_call event is still pending.
        assert_eq!(s.request_input(), "y");
        let failures = s.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::OutOfOrder);
        assert_eq!(failures[0].mode, Mode::Ux);
        assert!(failures[0].repair.is_none());
    }

    #[test]
    fn wrong_exit_code_and_missing_exit_event() {
        let mut s = scheduler("command: c\nevents:\n- expect_exit_code: 0\n");
        s.finish(3);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Wrong);

        let mut s = scheduler("command: c\nevents:\n- expect_stdout: \"\"\n");
        s.finish(3);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Missing);
        assert_eq!(failures[0].mode, Mode::Exit);

        let mut s = scheduler("command: c\nevents: []\n");
        s.finish(0);
        assert!(s.failures().is_empty());
    }

    #[test]
    fn trailing_partial_output_is_wrong_at_finish() {
        let mut s = scheduler("command: c\nevents:\n- expect_stdout: \"abcdef\"\n");
        s.write(Channel::Stdout, "abc");
        s.finish(0);
        let failures = s.into_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Wrong);
        match &failures[0].repair {
            Some(Repair::SetScalar { value, .. }) => assert_eq!(value.as_str(), Some("abc")),
            other => panic!("expected SetScalar, got {other:?}"),
        }
    }
}
