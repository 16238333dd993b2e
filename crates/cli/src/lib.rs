pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use estimator_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

use crate::commands::assess::AssessArgs;
use crate::commands::estimate::EstimateArgs;
use crate::commands::qna::QnaArgs;
use crate::commands::run::RunArgs;
use crate::commands::takeoff::TakeoffArgs;
use crate::commands::CommandResult;

const EXAMPLES: &str = "\
Examples:
  estimator health
  estimator run --project p1 --file plan.pdf --answer p1_roofing_material_0=metal
  estimator qna --project p1 --answer p1_foundation_type_1=slab
  estimator config";

#[derive(Debug, Parser)]
#[command(
    name = "estimator",
    about = "Construction estimating workflow CLI",
    long_about = "Drive the takeoff, estimate, assessment and clarification workflow \
                  against an estimation service.",
    after_help = EXAMPLES
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    #[arg(
        long,
        global = true,
        help = "Config file (defaults to estimator.toml or config/estimator.toml)"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Estimation service base URL")]
    pub base_url: Option<String>,
    #[arg(long, global = true, help = "Request timeout in seconds")]
    pub timeout_secs: Option<u64>,
    #[arg(long, global = true, help = "Log filter for stderr diagnostics")]
    pub log_level: Option<String>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                base_url: self.base_url.clone(),
                timeout_secs: self.timeout_secs,
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }

    /// Config keys set from the command line.
    pub fn flagged_keys(&self) -> Vec<&'static str> {
        [
            (self.base_url.is_some(), "service.base_url"),
            (self.timeout_secs.is_some(), "service.timeout_secs"),
            (self.log_level.is_some(), "logging.level"),
        ]
        .into_iter()
        .filter_map(|(set, key)| set.then_some(key))
        .collect()
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Check that the estimation service is reachable")]
    Health,
    #[command(about = "Extract trade quantities from a plan PDF")]
    Takeoff(TakeoffArgs),
    #[command(about = "Price a quantities file or a whole-building program")]
    Estimate(EstimateArgs),
    #[command(about = "Assess a plan and list the clarification questions")]
    Assess(AssessArgs),
    #[command(about = "Answer clarification questions from an earlier assessment")]
    Qna(QnaArgs),
    #[command(about = "Run takeoff, estimate, assessment and an optional QnA round")]
    Run(RunArgs),
    #[command(about = "Ask the estimating assistant a question")]
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = dispatch(cli);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn dispatch(cli: Cli) -> CommandResult {
    let Cli { global, command } = cli;
    match command {
        Command::Ask { message } => commands::ask::run(&message),
        Command::Config => commands::config::run(global.load_options(), &global.flagged_keys()),
        Command::Health => with_config(&global, "health", commands::health::run),
        Command::Takeoff(args) => {
            with_config(&global, "takeoff", |config| commands::takeoff::run(config, args))
        }
        Command::Estimate(args) => {
            with_config(&global, "estimate", |config| commands::estimate::run(config, args))
        }
        Command::Assess(args) => {
            with_config(&global, "assess", |config| commands::assess::run(config, args))
        }
        Command::Qna(args) => {
            with_config(&global, "qna", |config| commands::qna::run(config, args))
        }
        Command::Run(args) => {
            with_config(&global, "run", |config| commands::run::run(config, args))
        }
    }
}

fn with_config(
    global: &GlobalArgs,
    command: &str,
    work: impl FnOnce(&AppConfig) -> CommandResult,
) -> CommandResult {
    let config = match AppConfig::load(global.load_options()) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure(command, &error),
    };
    init_logging(&config);
    work(&config)
}

/// Diagnostics go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.parse().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level);

    // A subscriber may already be installed when commands run in-process.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::parse_from([
            "estimator",
            "health",
            "--base-url",
            "http://127.0.0.1:9999",
            "--timeout-secs",
            "5",
        ]);

        assert!(matches!(cli.command, Command::Health));
        let options = cli.global.load_options();
        assert_eq!(options.overrides.base_url.as_deref(), Some("http://127.0.0.1:9999"));
        assert_eq!(options.overrides.timeout_secs, Some(5));
        assert!(!options.require_file);
        assert_eq!(cli.global.flagged_keys(), vec!["service.base_url", "service.timeout_secs"]);
    }

    #[test]
    fn plan_inputs_are_mutually_exclusive() {
        let both = Cli::try_parse_from([
            "estimator",
            "assess",
            "--project",
            "p1",
            "--file",
            "plan.pdf",
            "--server-path",
            "/srv/plan.pdf",
        ]);
        assert!(both.is_err());

        let neither = Cli::try_parse_from(["estimator", "takeoff", "--project", "p1"]);
        assert!(neither.is_err());
    }

    #[test]
    fn answers_repeat() {
        let cli = Cli::try_parse_from([
            "estimator",
            "qna",
            "--project",
            "p1",
            "--answer",
            "p1_roofing_material_0=metal",
            "--answer",
            "p1_window_type_2=vinyl",
        ])
        .expect("qna args");

        let Command::Qna(args) = cli.command else {
            panic!("expected qna");
        };
        assert_eq!(args.answers.len(), 2);
        assert_eq!(args.answers[1].value(), Some("vinyl"));
    }
}
