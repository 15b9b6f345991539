//! Command-line surface (§6 "CLI surface"): only `run-station` and
//! `run-config-update` are exposed; everything else about the runtime is a
//! library concern.

use crate::errors::CliError;
use crate::output::{LogLevel, init_logging};
use clap::{Args, Parser, Subcommand};
use station_runtime::config::{ConfigStore, TomlConfigStore};
use station_runtime::engine::{DutIdentity, StationInstruments, TestEngine};
use station_runtime::view::ViewSink;
use std::path::PathBuf;
use tracing::info;

/// A laboratory test station.
///
/// This binary should be invoked directly (`station run-station ...`); it
/// does not wrap `cargo` the way a build-tool companion binary would.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct StationCli {
    #[arg(long, value_enum, global = true, default_value = "INFO")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one test iteration against a DUT.
    RunStation(RunStationArgs),
    /// Validate (and, in a full deployment, publish) a station config file.
    RunConfigUpdate(RunConfigUpdateArgs),
}

#[derive(Debug, Args)]
struct RunStationArgs {
    /// Path to the TOML file backing the `ConfigStore`.
    #[arg(long)]
    config: PathBuf,

    /// Model number of the DUT to test.
    #[arg(long)]
    mn: u32,

    /// Serial number of the DUT to test.
    #[arg(long)]
    sn: u64,

    /// Option suffix, if the model requires one.
    #[arg(long)]
    option: Option<String>,
}

#[derive(Debug, Args)]
struct RunConfigUpdateArgs {
    /// Path to the TOML file to validate.
    #[arg(long)]
    config: PathBuf,
}

impl StationCli {
    /// Runs the selected subcommand, returning the process exit code.
    pub async fn exec(self) -> i32 {
        init_logging(self.log_level);
        match self.command.run().await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("{e}");
                e.process_exit_code()
            }
        }
    }
}

impl Command {
    async fn run(self) -> Result<i32, CliError> {
        match self {
            Command::RunStation(args) => run_station(args).await,
            Command::RunConfigUpdate(args) => run_config_update(args).await,
        }
    }
}

async fn run_station(args: RunStationArgs) -> Result<i32, CliError> {
    let store = TomlConfigStore::load(&args.config)?;
    let view = ViewSink::new(64);
    let steps = TestEngine::default_steps();
    let mut engine = TestEngine::new(&store as &dyn ConfigStore, view, steps);

    let dut = DutIdentity {
        sn: args.sn,
        mn: args.mn,
        option: args.option,
    };

    match engine.run(dut, StationInstruments::default()).await {
        Ok(iteration) => {
            info!(pass = ?iteration.pass, "iteration finished");
            println!("{}", serde_json::to_string_pretty(&iteration).unwrap_or_default());
            Ok(crate::errors::ExitCode::SUCCESS)
        }
        Err((iteration, failure)) => {
            println!("{}", serde_json::to_string_pretty(&iteration).unwrap_or_default());
            Err(CliError::StationFatal(failure))
        }
    }
}

async fn run_config_update(args: RunConfigUpdateArgs) -> Result<i32, CliError> {
    TomlConfigStore::load(&args.config)?;
    info!(path = %args.config.display(), "config file parsed successfully");
    Ok(crate::errors::ExitCode::SUCCESS)
}
