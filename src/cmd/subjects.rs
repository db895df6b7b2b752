//! Built-in demo subjects and the registry the CLI resolves commands from.
//!
//! The `widgets` subject is a small fake cloud CLI with enough surface to
//! exercise every event type: prompts, both output channels, API calls with
//! JSON bodies, polling, and failure exits.

use serde_json::{json, Value as Json};

use std::collections::BTreeMap;

use crate::{
    HttpRequest, RehearseError, RehearseResult, Subject, SubjectContext, SubjectFactory,
};

pub struct SubjectRegistry {
    factories: BTreeMap<String, Box<dyn SubjectFactory>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every built-in subject.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register("widgets", || Box::new(Widgets) as Box<dyn Subject>);
        reg
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Subject> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Resolves the factory for a scenario `command:` line by its first token.
    pub fn factory_for(&self, command: &str) -> RehearseResult<&dyn SubjectFactory> {
        let name = command.split_whitespace().next().unwrap_or_default();
        self.factories
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| {
                RehearseError::Harness(format!("no subject registered for command {name:?}"))
            })
    }
}

impl Default for SubjectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Fake widget-store CLI.
pub struct Widgets;

impl Widgets {
    fn base_uri(ctx: &SubjectContext<'_>) -> String {
        match ctx.env_var("WIDGETS_PROJECT") {
            Some(project) => {
                format!("https://widgets.example.com/v1/projects/{project}/widgets")
            }
            None => "https://widgets.example.com/v1/widgets".to_string(),
        }
    }

    fn delete(ctx: &mut SubjectContext<'_>, name: &str) -> RehearseResult<i32> {
        ctx.stderr(&format!("Deleting widget [{name}]...\n"));
        let answer = ctx.prompt("Continue (y/N)? ");
        if !answer.trim().eq_ignore_ascii_case("y") {
            ctx.stderr("Aborted.\n");
            return Ok(1);
        }
        let uri = format!("{}/{name}", Self::base_uri(ctx));
        let resp = ctx.http(&HttpRequest::new("DELETE", &uri));
        if resp.status >= 300 {
            ctx.stderr(&format!("ERROR: delete failed with status {}\n", resp.status));
            return Ok(1);
        }
        ctx.stdout(&format!("Deleted [{name}].\n"));
        Ok(0)
    }

    fn list(ctx: &mut SubjectContext<'_>, args: &[String]) -> RehearseResult<i32> {
        let mut uri = Self::base_uri(ctx);
        let mut params = Vec::new();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            match a.as_str() {
                "--zone" | "--limit" => {
                    let v = it.next().ok_or_else(|| {
                        RehearseError::Harness(format!("{a} requires a value"))
                    })?;
                    params.push(format!("{}={v}", a.trim_start_matches("--")));
                }
                other => {
                    return Err(RehearseError::Harness(format!(
                        "unknown list flag {other:?}"
                    )))
                }
            }
        }
        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }
        let resp = ctx.http(&HttpRequest::new("GET", &uri));
        if let Some(Json::Array(widgets)) = resp.json().and_then(|j| j.get("widgets").cloned()) {
            for w in widgets {
                if let Some(name) = w.get("name").and_then(Json::as_str) {
                    ctx.stdout(&format!("{name}\n"));
                }
            }
        }
        Ok(0)
    }

    fn create(ctx: &mut SubjectContext<'_>, args: &[String]) -> RehearseResult<i32> {
        let name = args
            .first()
            .ok_or_else(|| RehearseError::Harness("create requires a widget name".to_string()))?
            .clone();
        let mut body = json!({ "name": name });
        if let Some(pos) = args.iter().position(|a| a == "--size") {
            let size: i64 = args
                .get(pos + 1)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    RehearseError::Harness("--size requires an integer".to_string())
                })?;
            body["size"] = json!(size);
        }
        let req = HttpRequest::new("POST", &Self::base_uri(ctx)).json_body(&body);
        let resp = ctx.http(&req);
        if resp.status >= 300 {
            ctx.stderr(&format!("ERROR: create failed with status {}\n", resp.status));
            return Ok(1);
        }
        ctx.stdout(&format!("Created [{name}].\n"));
        Ok(0)
    }

    fn describe(ctx: &mut SubjectContext<'_>, name: &str) -> RehearseResult<i32> {
        let uri = format!("{}/{name}", Self::base_uri(ctx));
        let resp = ctx.http(&HttpRequest::new("GET", &uri));
        if resp.status >= 300 {
            ctx.stderr(&format!("ERROR: widget [{name}] not found\n"));
            return Ok(1);
        }
        ctx.stdout(&resp.body_str());
        if !resp.body.ends_with(b"\n") {
            ctx.stdout("\n");
        }
        Ok(0)
    }

    /// Polls the operation endpoint until it reports done. Identical
    /// consecutive polls are the repeatable-call case.
    fn wait(ctx: &mut SubjectContext<'_>, op: &str) -> RehearseResult<i32> {
        let uri = format!("https://widgets.example.com/v1/operations/{op}");
        for _ in 0..5 {
            let resp = ctx.http(&HttpRequest::new("GET", &uri));
            let done = resp
                .json()
                .and_then(|j| j.get("done").and_then(Json::as_bool))
                .unwrap_or(false);
            if done {
                ctx.stdout(&format!("Operation [{op}] done.\n"));
                return Ok(0);
            }
        }
        ctx.stderr(&format!("ERROR: operation [{op}] timed out\n"));
        Ok(1)
    }
}

impl Subject for Widgets {
    fn run(&mut self, ctx: &mut SubjectContext<'_>) -> RehearseResult<i32> {
        let args = ctx.args().to_vec();
        let (sub, rest) = match args.split_first() {
            Some((first, tail)) if first == "widgets" => match tail.split_first() {
                Some((sub, rest)) => (sub.clone(), rest.to_vec()),
                None => {
                    return Err(RehearseError::Harness(
                        "widgets requires a subcommand".to_string(),
                    ))
                }
            },
            _ => {
                return Err(RehearseError::Harness(
                    "widgets subject invoked with a different command".to_string(),
                ))
            }
        };
        match sub.as_str() {
            "delete" => {
                let name = rest.first().ok_or_else(|| {
                    RehearseError::Harness("delete requires a widget name".to_string())
                })?;
                Self::delete(ctx, name)
            }
            "list" => Self::list(ctx, &rest),
            "create" => Self::create(ctx, &rest),
            "describe" => {
                let name = rest.first().ok_or_else(|| {
                    RehearseError::Harness("describe requires a widget name".to_string())
                })?;
                Self::describe(ctx, name)
            }
            "wait" => {
                let op = rest.first().ok_or_else(|| {
                    RehearseError::Harness("wait requires an operation id".to_string())
                })?;
                Self::wait(ctx, op)
            }
            other => Err(RehearseError::Harness(format!(
                "unknown widgets subcommand {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{execute, CheckPolicy, ScenarioDoc};

    fn run(yaml: &str) -> Vec<crate::Failure> {
        let doc = ScenarioDoc::parse_str(yaml).expect("parse");
        execute(&mut Widgets, &doc, CheckPolicy::default()).expect("run")
    }

    #[test]
    fn delete_flow_matches_its_script() {
        let failures = run(
            "\
command: widgets delete w1
events:
- expect_stderr: \"Deleting widget [w1]...\\nContinue (y/N)? \"
- user_input:
  - \"y\"
- api_call:
    expect_request:
      uri: https://widgets.example.com/v1/widgets/w1
      method: DELETE
    return_response:
      status: 200
- expect_stdout: \"Deleted [w1].\\n\"
- expect_exit_code: 0
",
        );
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn declined_prompt_aborts_without_an_api_call() {
        let failures = run(
            "\
command: widgets delete w1
events:
- expect_stderr: \"Deleting widget [w1]...\\nContinue (y/N)? \"
- user_input:
  - \"n\"
- expect_stderr: \"Aborted.\\n\"
- expect_exit_code: 1
",
        );
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn project_env_var_changes_the_uri() {
        let failures = run(
            "\
command: widgets list
env:
  WIDGETS_PROJECT: demo
events:
- api_call:
    expect_request:
      uri: https://widgets.example.com/v1/projects/demo/widgets
      method: GET
    return_response:
      body:
        widgets:
        - name: w1
        - name: w2
- expect_stdout: \"w1\\nw2\\n\"
- expect_exit_code: 0
",
        );
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn wait_polls_until_done() {
        let failures = run(
            "\
command: widgets wait op-7
events:
- api_call:
    expect_request:
      uri: https://widgets.example.com/v1/operations/op-7
      method: GET
    return_response:
      body:
        done: true
- expect_stdout: \"Operation [op-7] done.\\n\"
- expect_exit_code: 0
",
        );
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn registry_resolves_by_first_token() {
        let reg = SubjectRegistry::builtin();
        assert!(reg.factory_for("widgets delete w1").is_ok());
        assert!(reg.factory_for("gadgets list").is_err());
    }
}
