//! Command Line Interface of the feasibility checker
//!
//! The CLI is built with the `clap` crate. This module defines all available
//! commands and options (and their documentation) as well as the functions
//! applying them.

use std::{fs, path::PathBuf};

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use config::Config as Settings;
use log::{LevelFilter, info, warn};
use log4rs::{
    Config,
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};

use deadline_checker::{
    CheckerOptions, DebugArg, FeasibilityVerdict, ScheduleChecker,
    artifacts::{Artifact, ArtifactWriter},
    model::{Metadata, ModelCombiner},
};
use deadline_combine::{CombineOptions, Combiner, ExternalCombiner, SmvCombiner};
use deadline_schedule::{DeadlineSpecBuilder, PlantState, Schedule, TaskCounts};
use deadline_smv::SmvSolver;

use crate::deadline_config::DeadlineConfig;

/// Prefix of environment variables overriding the configuration
pub const ENV_PREFIX: &str = "DEADLINE";

/// DEADLINE - feasibility checker for production schedules
///
/// Checks whether the task of a schedule that is active in the current plant
/// state can still meet its deadline, using an SMV model checker. If the
/// deadline can not be met, the delay of the deadline needed to complete the
/// task is computed.
///
/// All results are written to the output directory: the counterexample path
/// witnessing feasibility in `path.cex` and the delay of an infeasible task in
/// `delay.json`.
#[derive(Parser, Debug)]
#[command(version, name = "DEADLINE CLI", about, long_about)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) log_config: LoggerConfig,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Check whether the active task of the schedule can meet its deadline
    Check {
        /// Schedule and plant state files
        #[arg(short, long, num_args = 2, value_names = ["SCHEDULE", "STATE"], required = true)]
        input: Vec<PathBuf>,

        /// Directory all results are written to
        #[arg(short, long, value_name = "DIR")]
        output_directory: PathBuf,

        /// Only check tasks of this scheduling unit
        #[arg(short, long, value_name = "UNIT")]
        key_scheduling_unit: Option<String>,

        /// Model checker executable
        #[arg(long, value_name = "SOLVER")]
        solver_path: Option<String>,

        /// Arguments passed to the model checker before the mode options.
        /// **Note**: Must be passed last, values may start with a hyphen.
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        solver_arguments: Vec<String>,

        /// JSON file listing auxiliary model files per unit and task
        #[arg(short, long, value_name = "METADATA")]
        metadata: Option<PathBuf>,

        #[command(flatten)]
        combine: CombineArgs,

        /// Shortcuts for testing, e.g. `simple_delay`
        #[arg(long, num_args = 1..)]
        debug_args: Vec<DebugArg>,

        /// Configuration file of the checker
        #[arg(short, long, value_name = "CONFIG_FILE")]
        config_file: Option<PathBuf>,

        /// Report inconclusive bounded model checking instead of running full
        /// model checking
        #[arg(long, default_value_t = false)]
        no_full_mc: bool,

        /// Declare tasks infeasible if the timeout heuristic of bounded model
        /// checking suggests so. This is NOT sound.
        #[arg(long, default_value_t = false)]
        trust_bmc_timeout: bool,
    },
    /// Combine SMV model files into a single model
    ///
    /// Also available as `--combine`, the form used when the tool is
    /// configured as its own external combine command.
    #[command(long_flag = "combine")]
    Combine {
        /// Model files, in order
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        #[command(flatten)]
        combine: CombineArgs,

        /// Write the combined model to this file instead of stdout
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: Option<PathBuf>,
    },
    /// Generate the deadline specification of a schedule
    Spec {
        /// Schedule file
        #[arg(short, long, value_name = "SCHEDULE")]
        input: PathBuf,

        /// Plant state file, its initial constraints are written as well
        #[arg(short, long, value_name = "STATE")]
        state: Option<PathBuf>,

        /// Directory the specification is written to
        #[arg(short, long, value_name = "DIR")]
        output_directory: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct CombineArgs {
    /// Plugins applied to the combined model
    #[arg(long, num_args = 1..)]
    plugins: Vec<String>,

    /// Plugin options as `key=value`
    #[arg(long, num_args = 1..)]
    plugin_options: Vec<String>,

    /// Additional state variables as `name : type`
    #[arg(long, num_args = 1..)]
    variables: Vec<String>,
}

impl From<CombineArgs> for CombineOptions {
    fn from(args: CombineArgs) -> Self {
        CombineOptions {
            plugins: args.plugins,
            plugin_options: args.plugin_options,
            variables: args.variables,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct LoggerConfig {
    /// Read the logger configuration from file.
    /// Logger configuration can be provided in the log4rs specification format.
    #[arg(long)]
    logger_config_file: Option<String>,

    /// Enable debug output.
    /// **Note**: This flag must be passed first, before any command.
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

/// Initialize the logger as specified in `cfg`
///
/// By default the logger is configured to log to `target`. If a log4rs
/// configuration file is given in `cfg`, the configuration from that file will
/// be used instead
pub(crate) fn initialize_logger(cfg: LoggerConfig, target: Target) -> Result<(), anyhow::Error> {
    if let Some(f) = cfg.logger_config_file {
        log4rs::init_file(f, Default::default())
            .with_context(|| "Failed to read logger config file")?;
        return Ok(());
    }

    let p_encoder = match cfg.debug {
        true => PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} - {h({l})} - [{f}:{L} - {M}] - {m}{n}"),
        false => PatternEncoder::new("{d(%H:%M:%S)} - {h({l})} - {m}{n}"),
    };

    let console = ConsoleAppender::builder()
        .encoder(Box::new(p_encoder))
        .target(target)
        .build();

    let mut level = LevelFilter::Info;
    if cfg.debug {
        level = LevelFilter::Debug;
    }

    let log_config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))
        .with_context(|| "Failed to build logger configuration")?;

    log4rs::init_config(log_config).with_context(|| "Failed to initialize console logger")?;
    Ok(())
}

/// Console the logger writes to while running `command`
///
/// A combined model printed to stdout must not be interleaved with log lines,
/// so logs go to stderr in that case.
pub(crate) fn log_target(command: &Commands) -> Target {
    match command {
        Commands::Combine { output: None, .. } => Target::Stderr,
        _ => Target::Stdout,
    }
}

/// Read the configuration from `config_file` (if given) and the environment
pub(crate) fn read_config(config_file: Option<PathBuf>) -> Result<DeadlineConfig, anyhow::Error> {
    let mut settings = Settings::builder();
    if let Some(config_file) = config_file {
        if !config_file.exists() {
            return Err(anyhow!(
                "Specified configuration file '{}' does not exist.",
                config_file.display()
            ));
        }

        settings = settings.add_source(config::File::from(config_file));
    }

    // e.g. DEADLINE_BMC__BASE_TIMEOUT
    settings = settings.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = settings
        .build()?
        .try_deserialize::<DeadlineConfig>()
        .with_context(|| "Failed to parse configuration")?;
    Ok(config)
}

/// Get the model checker, with the executable and its arguments overridden by
/// the command line if given
pub(crate) fn get_solver(
    config: &DeadlineConfig,
    solver_path: Option<String>,
    solver_arguments: Vec<String>,
) -> SmvSolver {
    let mut cfg = config.get_solver_cfg();
    if let Some(path) = solver_path {
        cfg.set_command(path);
    }
    if !solver_arguments.is_empty() {
        cfg.set_args(solver_arguments);
    }

    info!("Using model checker '{}'", cfg.command());
    SmvSolver::new(cfg).with_poll_interval(config.get_poll_interval())
}

/// Get the combiner, the external combine command if one is configured
pub(crate) fn get_combiner(config: &DeadlineConfig) -> Box<dyn Combiner> {
    match config.get_combine_command() {
        Some(argv) if !argv.is_empty() => {
            info!("Combining models with '{}'", argv.join(" "));
            Box::new(ExternalCombiner::new(argv.to_vec()))
        }
        _ => Box::new(SmvCombiner::new()),
    }
}

/// Options of the `check` command that are not part of the configuration
#[derive(Debug)]
pub(crate) struct CheckArgs {
    pub(crate) input: Vec<PathBuf>,
    pub(crate) output_directory: PathBuf,
    pub(crate) key_scheduling_unit: Option<String>,
    pub(crate) solver_path: Option<String>,
    pub(crate) solver_arguments: Vec<String>,
    pub(crate) metadata: Option<PathBuf>,
    pub(crate) combine: CombineOptions,
    pub(crate) debug_args: Vec<DebugArg>,
    pub(crate) no_full_mc: bool,
    pub(crate) trust_bmc_timeout: bool,
}

/// Run the feasibility check
pub(crate) fn check_schedule(
    args: CheckArgs,
    mut config: DeadlineConfig,
) -> Result<FeasibilityVerdict, anyhow::Error> {
    let [schedule_file, state_file] = args.input.as_slice() else {
        return Err(anyhow!("Expected a schedule and a state file as input"));
    };

    if args.no_full_mc {
        config.set_fallback_to_full_mc(false);
    }
    if args.trust_bmc_timeout {
        config.set_trust_bmc_timeout_heuristic(true);
    }
    if config.get_trust_bmc_timeout_heuristic() {
        warn!("Trusting the timeout heuristic of bounded model checking, infeasibility verdicts are NOT sound");
    }

    let options = CheckerOptions {
        key_scheduling_unit: args.key_scheduling_unit,
        bmc: config.get_bmc_options()?,
        fallback_to_full_mc: config.get_fallback_to_full_mc(),
        trust_bmc_timeout_heuristic: config.get_trust_bmc_timeout_heuristic(),
        combine: config.get_combine_options(args.combine),
        debug_args: args.debug_args,
    };

    let metadata = args
        .metadata
        .map(|path| Metadata::from_file(&path))
        .transpose()?;
    let combiner = ModelCombiner::new(get_combiner(&config), options.combine.clone(), metadata);
    let solver = get_solver(&config, args.solver_path, args.solver_arguments);

    let writer = ArtifactWriter::new(args.output_directory)?;
    let checker = ScheduleChecker::new(solver, combiner, options, writer);

    let verdict = checker
        .check_schedule(schedule_file, state_file)
        .with_context(|| "Feasibility check failed")?;
    info!(
        "Results written to '{}'",
        checker.writer().dir().display()
    );
    Ok(verdict)
}

/// Combine the model files in `input` and return the combined model
pub(crate) fn combine_files(
    input: &[PathBuf],
    combine: CombineOptions,
) -> Result<String, anyhow::Error> {
    let config = read_config(None)?;
    let options = config.get_combine_options(combine);
    let model = get_combiner(&config)
        .combine_files(input, &options)
        .with_context(|| "Failed to combine models")?;
    Ok(model)
}

/// Write the combined model to `output`, or print it if no file is given
pub(crate) fn write_combined(model: &str, output: Option<PathBuf>) -> Result<(), anyhow::Error> {
    match output {
        Some(path) => {
            fs::write(&path, model)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            info!("Combined model written to '{}'", path.display());
        }
        None => print!("{model}"),
    }
    Ok(())
}

/// Write the deadline specification of `input` and the initial constraints of
/// `state` to `output_directory`
pub(crate) fn write_spec(
    input: PathBuf,
    state: Option<PathBuf>,
    output_directory: PathBuf,
) -> Result<(), anyhow::Error> {
    let schedule = Schedule::from_file(&input)
        .with_context(|| format!("Failed to read schedule '{}'", input.display()))?;
    let spec = DeadlineSpecBuilder::new(TaskCounts::new()).build(&schedule);

    let writer = ArtifactWriter::new(output_directory)?;
    let path = writer.write(Artifact::Schedule, &spec.to_string())?;
    info!(
        "Deadline specification of {} task(s) written to '{}'",
        spec.targets().len(),
        path.display()
    );

    if let Some(state) = state {
        let state = PlantState::from_file(&state)
            .with_context(|| format!("Failed to read state '{}'", state.display()))?;
        let path = writer.write(Artifact::State, &state.to_smv())?;
        info!("Initial state written to '{}'", path.display());
    }
    Ok(())
}
