//! Scenario driver: run, repair, rewrite, verify.
//!
//! A run produces failures; the update engine applies the licensed repairs;
//! then the scenario is executed again until it comes back clean or stops
//! changing. Only a converged document is written back to disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    apply_repairs, execute, CheckPolicy, FailureReport, FileOutcome, ModeSet, RehearseResult,
    RunSummary, ScenarioDoc, SubjectFactory,
};

/// Repair rounds before declaring non-convergence. Cascading repairs (an
/// inserted event enabling a repeat collapse, say) settle in two.
const MAX_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub modes: ModeSet,
    pub promote_constraints: bool,
    pub verify_fixed_point: bool,
    pub dry_run: bool,
    pub backup: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            modes: ModeSet::empty(),
            promote_constraints: false,
            verify_fixed_point: true,
            dry_run: false,
            backup: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocOutcome {
    pub failures: Vec<FailureReport>,
    pub repairs_applied: usize,
    pub repairs_skipped: usize,
    /// The in-memory document differs from what was loaded.
    pub changed: bool,
    pub pass: bool,
}

pub struct Driver<'a> {
    factory: &'a dyn SubjectFactory,
    options: DriverOptions,
}

impl<'a> Driver<'a> {
    pub fn new(factory: &'a dyn SubjectFactory, options: DriverOptions) -> Self {
        Self { factory, options }
    }

    /// Runs one in-memory document to a fixed point.
    pub fn run_doc(&self, doc: &mut ScenarioDoc) -> RehearseResult<DocOutcome> {
        let policy = CheckPolicy {
            promote_constraints: self.options.promote_constraints,
        };
        let mut out = DocOutcome::default();

        for round in 0..MAX_ROUNDS {
            let mut subject = self.factory.subject();
            let failures = execute(subject.as_mut(), doc, policy)?;
            if failures.is_empty() {
                out.pass = true;
                return Ok(out);
            }
            debug!(round, failures = failures.len(), "scenario diverged");

            if self.options.modes.is_empty() {
                out.failures
                    .extend(failures.iter().map(|f| FailureReport::from_failure(f, false)));
                return Ok(out);
            }

            let repairs = apply_repairs(doc, &failures, self.options.modes);
            out.failures.extend(
                failures
                    .iter()
                    .zip(&repairs.repaired)
                    .map(|(f, r)| FailureReport::from_failure(f, *r)),
            );
            out.repairs_applied += repairs.applied;
            out.repairs_skipped += repairs.skipped;
            if repairs.applied > 0 {
                out.changed = true;
            }
            if !repairs.fully_repaired() {
                return Ok(out);
            }
            if !self.options.verify_fixed_point {
                out.pass = true;
                return Ok(out);
            }
        }
        warn!("scenario did not converge after {MAX_ROUNDS} repair rounds");
        Ok(out)
    }

    pub fn run_file(&self, path: &Path) -> FileOutcome {
        let name = path.display().to_string();
        match self.run_file_inner(path) {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::error(name, e.to_string()),
        }
    }

    fn run_file_inner(&self, path: &Path) -> RehearseResult<FileOutcome> {
        let mut doc = ScenarioDoc::load(path)?;
        let out = self.run_doc(&mut doc)?;

        let mut rewrote = false;
        if out.changed && !self.options.dry_run {
            if self.options.backup {
                let file_name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("scenario.yaml");
                std::fs::copy(path, path.with_file_name(format!("{file_name}.orig")))?;
            }
            doc.write()?;
            rewrote = true;
            info!(scenario = %path.display(), repairs = out.repairs_applied, "rewrote scenario");
        }

        Ok(FileOutcome {
            scenario: path.display().to_string(),
            status: if out.pass {
                crate::ExitStatus::Pass
            } else {
                crate::ExitStatus::Fail
            },
            failures: out.failures,
            repairs_applied: out.repairs_applied,
            repairs_skipped: out.repairs_skipped,
            rewrote,
            error: None,
        })
    }

    pub fn run_files(&self, paths: &[PathBuf]) -> RunSummary {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            debug!(scenario = %path.display(), "running scenario");
            outcomes.push(self.run_file(path));
        }
        RunSummary::from_outcomes(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RehearseResult, Subject, SubjectContext};

    struct Greeter;

    impl Subject for Greeter {
        fn run(&mut self, ctx: &mut SubjectContext<'_>) -> RehearseResult<i32> {
            ctx.stdout("hello\n");
            Ok(0)
        }
    }

    const STALE: &str = "\
command: greet
events:
- expect_stdout: \"goodbye\\n\"
- expect_exit_code: 0
";

    #[test]
    fn no_update_modes_reports_and_fails() {
        let wrap = move || -> Box<dyn Subject> { Box::new(Greeter) };
        let driver = Driver::new(&wrap, DriverOptions::default());
        let mut doc = ScenarioDoc::parse_str(STALE).expect("parse");
        let out = driver.run_doc(&mut doc).expect("run");
        assert!(!out.pass);
        assert!(!out.changed);
        assert_eq!(out.failures.len(), 1);
        assert!(!out.failures[0].repaired);
        // Document untouched.
        assert_eq!(
            doc.to_yaml_string().expect("dump"),
            ScenarioDoc::parse_str(STALE)
                .expect("parse")
                .to_yaml_string()
                .expect("dump")
        );
    }

    #[test]
    fn update_mode_converges_to_a_passing_document() {
        let wrap = move || -> Box<dyn Subject> { Box::new(Greeter) };
        let options = DriverOptions {
            modes: ModeSet::empty().parse_one("stdout").expect("mode"),
            ..Default::default()
        };
        let driver = Driver::new(&wrap, options);
        let mut doc = ScenarioDoc::parse_str(STALE).expect("parse");
        let out = driver.run_doc(&mut doc).expect("run");
        assert!(out.pass, "{:?}", out.failures);
        assert!(out.changed);
        assert_eq!(out.repairs_applied, 1);

        // The rewritten document is already a fixed point.
        let driver2 = Driver::new(&wrap, DriverOptions::default());
        let out2 = driver2.run_doc(&mut doc).expect("rerun");
        assert!(out2.pass);
        assert!(out2.failures.is_empty());
    }

    #[test]
    fn mode_scoping_limits_what_gets_repaired() {
        // Exit mismatch under a stdout-only mode set stays a failure.
        let yaml = "command: greet\nevents:\n- expect_stdout: \"hello\\n\"\n- expect_exit_code: 7\n";
        let wrap = move || -> Box<dyn Subject> { Box::new(Greeter) };
        let options = DriverOptions {
            modes: ModeSet::empty().parse_one("stdout").expect("mode"),
            ..Default::default()
        };
        let driver = Driver::new(&wrap, options);
        let mut doc = ScenarioDoc::parse_str(yaml).expect("parse");
        let out = driver.run_doc(&mut doc).expect("run");
        assert!(!out.pass);
        assert_eq!(out.repairs_skipped, 1);
    }
}
