//! Rehearse CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use rehearse::{
    expand_scenario_args, Config, Driver, DriverOptions, ExitStatus, FileOutcome, Mode, ModeSet,
    Reporter, RunSummary, ScenarioDoc, ScriptedEvent, SubjectRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "rehearse")]
#[command(about = "scenario-driven CLI testing with self-updating assertions")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "rehearse.toml")]
    config: PathBuf,

    /// Working directory for execution.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run scenario files against their subjects
    Run {
        /// Scenario files or glob patterns. Defaults to the config globs.
        scenarios: Vec<String>,

        /// Rewrite expected stdout chunks that diverged.
        #[arg(long)]
        update_stdout: bool,

        /// Rewrite expected stderr chunks that diverged.
        #[arg(long)]
        update_stderr: bool,

        /// Rewrite scripted input lines.
        #[arg(long)]
        update_user_input: bool,

        /// Rewrite request assertions on API call events.
        #[arg(long)]
        update_api_requests: bool,

        /// Rewrite canned response payloads.
        #[arg(long)]
        update_api_response_payloads: bool,

        /// Rewrite the expected exit code.
        #[arg(long)]
        update_exit: bool,

        /// Shorthand for stdout + stderr + user input.
        #[arg(long)]
        update_ux: bool,

        /// Enable every update mode.
        #[arg(long)]
        update_all: bool,

        /// Widen `in` sets on mismatch instead of downgrading to literals.
        #[arg(long)]
        promote_constraints: bool,

        /// Skip the post-rewrite verification run.
        #[arg(long)]
        no_verify: bool,

        /// Compute repairs but leave scenario files untouched.
        #[arg(long)]
        dry_run: bool,

        /// Keep a `<scenario>.orig` copy before rewriting.
        #[arg(long)]
        backup: bool,

        /// Reporter format.
        #[arg(long, default_value = "pretty")]
        reporter: Reporter,
    },

    /// Check that scenario files parse and follow the event schema
    Validate {
        scenarios: Vec<String>,
    },

    /// Rewrite scenario files into canonical YAML form
    Normalize {
        scenarios: Vec<String>,

        /// Print the canonical form instead of rewriting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print version and build info
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_global_args(std::env::args()));

    if let Err(err) = init_tracing(&cli.log) {
        // Tracing is best-effort; if it fails, we still continue.
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let cwd = cli
        .cwd
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    if let Err(err) = std::env::set_current_dir(&cwd) {
        return print_error_and_exit(
            &cli,
            anyhow::anyhow!(err).context(format!("failed to set cwd to {}", cwd.display())),
        );
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn normalize_global_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let all: Vec<String> = args.into_iter().collect();
    if all.is_empty() {
        return all;
    }

    let mut globals = Vec::new();
    let mut rest = Vec::new();

    let mut i = 1usize;
    while i < all.len() {
        let arg = &all[i];
        match arg.as_str() {
            "--json" => {
                globals.push(arg.clone());
                i += 1;
            }
            "--config" | "--cwd" | "--log" => {
                globals.push(arg.clone());
                if i + 1 < all.len() {
                    globals.push(all[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ if arg.starts_with("--config=")
                || arg.starts_with("--cwd=")
                || arg.starts_with("--log=") =>
            {
                globals.push(arg.clone());
                i += 1;
            }
            _ => {
                rest.push(arg.clone());
                i += 1;
            }
        }
    }

    let mut normalized = Vec::with_capacity(all.len());
    normalized.push(all[0].clone());
    normalized.extend(globals);
    normalized.extend(rest);
    normalized
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Run {
            scenarios,
            update_stdout,
            update_stderr,
            update_user_input,
            update_api_requests,
            update_api_response_payloads,
            update_exit,
            update_ux,
            update_all,
            promote_constraints,
            no_verify,
            dry_run,
            backup,
            reporter,
        } => {
            let mut modes = ModeSet::parse_list(&config.update)?;
            for (on, mode) in [
                (*update_stdout, Mode::Stdout),
                (*update_stderr, Mode::Stderr),
                (*update_user_input, Mode::UserInput),
                (*update_api_requests, Mode::ApiRequests),
                (*update_api_response_payloads, Mode::ApiResponsePayloads),
                (*update_exit, Mode::Exit),
            ] {
                if on {
                    modes = modes.with(mode);
                }
            }
            if *update_ux {
                modes = modes.parse_one("ux")?;
            }
            if *update_all {
                modes = ModeSet::all();
            }

            let paths = resolve_scenarios(scenarios, config)?;
            let registry = SubjectRegistry::builtin();
            let options = DriverOptions {
                modes,
                promote_constraints: *promote_constraints || config.promote_constraints,
                verify_fixed_point: config.verify_fixed_point && !*no_verify,
                dry_run: *dry_run,
                backup: *backup || config.backup,
            };

            let mut outcomes = Vec::with_capacity(paths.len());
            for path in &paths {
                let name = path.display().to_string();
                match ScenarioDoc::load(path).and_then(|doc| registry.factory_for(&doc.command()?))
                {
                    Ok(factory) => {
                        let driver = Driver::new(factory, options);
                        outcomes.push(driver.run_file(path));
                    }
                    Err(e) => outcomes.push(FileOutcome::error(name, e.to_string())),
                }
            }
            let summary = RunSummary::from_outcomes(outcomes);
            print_run_summary(cli, &summary, *reporter)?;
            Ok(exit_code_for_status(summary.status))
        }

        Command::Validate { scenarios } => {
            let paths = resolve_scenarios(scenarios, config)?;
            let mut outcomes = Vec::with_capacity(paths.len());
            for path in &paths {
                let name = path.display().to_string();
                outcomes.push(match validate_file(path) {
                    Ok(()) => FileOutcome {
                        scenario: name,
                        status: ExitStatus::Pass,
                        failures: Vec::new(),
                        repairs_applied: 0,
                        repairs_skipped: 0,
                        rewrote: false,
                        error: None,
                    },
                    Err(e) => FileOutcome::error(name, e.to_string()),
                });
            }
            let summary = RunSummary::from_outcomes(outcomes);
            print_run_summary(cli, &summary, Reporter::Pretty)?;
            Ok(exit_code_for_status(summary.status))
        }

        Command::Normalize { scenarios, dry_run } => {
            let paths = resolve_scenarios(scenarios, config)?;
            for path in &paths {
                let doc = ScenarioDoc::load(path)?;
                if *dry_run {
                    println!("{}", doc.to_yaml_string()?);
                } else {
                    doc.write()?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Version => {
            let info = rehearse::version_info();
            print_json_or_text(cli, &info)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_scenarios(args: &[String], config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let paths = if args.is_empty() {
        expand_scenario_args(&config.scenario_globs)?
    } else {
        expand_scenario_args(args)?
    };
    if paths.is_empty() {
        anyhow::bail!("no scenario files matched");
    }
    Ok(paths)
}

fn validate_file(path: &std::path::Path) -> rehearse::RehearseResult<()> {
    let doc = ScenarioDoc::load(path)?;
    for (i, node) in doc.event_nodes()?.iter().enumerate() {
        ScriptedEvent::from_node(i, node)?;
    }
    Ok(())
}

fn print_run_summary(cli: &Cli, summary: &RunSummary, reporter: Reporter) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", summary.render(Reporter::Json));
    } else {
        println!("{}", summary.render(reporter));
    }
    Ok(())
}

fn print_json_or_text<T: serde::Serialize>(cli: &Cli, value: &T) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}

fn exit_code_for_status(status: ExitStatus) -> ExitCode {
    match status {
        ExitStatus::Pass => ExitCode::SUCCESS,
        ExitStatus::Fail => ExitCode::from(1),
        ExitStatus::Error => ExitCode::from(2),
    }
}
