//! DEADLINE Command Line Interface
//!
//! This crate contains the `deadline` binary, which checks whether the active
//! task of a production schedule can meet its deadline, combines SMV models and
//! generates deadline specifications. Advanced options can be set in a
//! configuration file or through environment variables prefixed with
//! `DEADLINE`.

use clap::Parser;
use cli::{Cli, initialize_logger, log_target};
use human_panic::setup_panic;
use log::{debug, info};

use crate::cli::{CheckArgs, Commands, check_schedule, combine_files, read_config, write_combined, write_spec};

mod cli;
mod deadline_config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_panic!();

    // parse the cli arguments
    let cli = Cli::parse();
    initialize_logger(cli.log_config, log_target(&cli.command))?;

    match cli.command {
        Commands::Check {
            input,
            output_directory,
            key_scheduling_unit,
            solver_path,
            solver_arguments,
            metadata,
            combine,
            debug_args,
            config_file,
            no_full_mc,
            trust_bmc_timeout,
        } => {
            let config = read_config(config_file)?;
            debug!("Configuration: {config:?}");

            let args = CheckArgs {
                input,
                output_directory,
                key_scheduling_unit,
                solver_path,
                solver_arguments,
                metadata,
                combine: combine.into(),
                debug_args,
                no_full_mc,
                trust_bmc_timeout,
            };
            let verdict = check_schedule(args, config)?;
            info!("{verdict}");
        }
        Commands::Combine {
            input,
            combine,
            output,
        } => {
            let model = combine_files(&input, combine.into())?;
            write_combined(&model, output)?;
        }
        Commands::Spec {
            input,
            state,
            output_directory,
        } => {
            write_spec(input, state, output_directory)?;
        }
    }

    Ok(())
}
