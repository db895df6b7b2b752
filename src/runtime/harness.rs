//! Subject harness: the mock environment a command under test runs in.
//!
//! A `Subject` is handed a `SubjectContext` and must do all of its I/O
//! through it. The context forwards every observation to the scheduler, so
//! a subject never sees a real terminal, real stdin, or the network.

use std::collections::BTreeMap;

use crate::{
    CheckPolicy, Channel, Failure, HttpRequest, HttpResponse, RehearseResult, ScenarioDoc,
    Scheduler,
};

pub trait Subject {
    fn run(&mut self, ctx: &mut SubjectContext<'_>) -> RehearseResult<i32>;
}

/// Produces a fresh subject per execution. Verification re-runs a scenario
/// after rewriting it, so one scenario may need several subject instances.
pub trait SubjectFactory {
    fn subject(&self) -> Box<dyn Subject>;
}

impl<F> SubjectFactory for F
where
    F: Fn() -> Box<dyn Subject>,
{
    fn subject(&self) -> Box<dyn Subject> {
        self()
    }
}

pub struct SubjectContext<'a> {
    scheduler: &'a mut Scheduler,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl<'a> SubjectContext<'a> {
    pub fn new(
        scheduler: &'a mut Scheduler,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            scheduler,
            args,
            env,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn stdout(&mut self, text: &str) {
        self.scheduler.write(Channel::Stdout, text);
    }

    pub fn stderr(&mut self, text: &str) {
        self.scheduler.write(Channel::Stderr, text);
    }

    pub fn read_line(&mut self) -> String {
        self.scheduler.request_input()
    }

    /// Writes the prompt to stderr, then reads one line. Scenarios may
    /// script the prompt wording in an `expect_stderr` event, but leaving it
    /// unscripted is not a failure.
    pub fn prompt(&mut self, message: &str) -> String {
        self.stderr(message);
        self.read_line()
    }

    pub fn http(&mut self, req: &HttpRequest) -> HttpResponse {
        self.scheduler.observe_api_call(req)
    }
}

/// Runs one subject against one scenario document and returns everything
/// that did not match the script. A subject error is surfaced the way a real
/// CLI would surface it: a line on stderr and a nonzero exit.
pub fn execute(
    subject: &mut dyn Subject,
    doc: &ScenarioDoc,
    policy: CheckPolicy,
) -> RehearseResult<Vec<Failure>> {
    let mut scheduler = Scheduler::from_doc(doc, policy)?;
    let args = split_command(&doc.command()?);
    let mut ctx = SubjectContext::new(&mut scheduler, args, doc.env());
    let code = match subject.run(&mut ctx) {
        Ok(code) => code,
        Err(e) => {
            ctx.stderr(&format!("ERROR: {e}\n"));
            1
        }
    };
    scheduler.finish(code);
    Ok(scheduler.into_failures())
}

/// Whitespace split with single and double quoting, enough for scenario
/// command lines. No escapes inside quotes.
pub fn split_command(command: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            None => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}
