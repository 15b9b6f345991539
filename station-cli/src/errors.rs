//! The CLI's own error taxonomy, distinct from `station_runtime::errors`:
//! these are about invoking the binary, not about a station run itself.

use thiserror::Error;

/// Process exit codes per the CLI surface contract: 0 success, 1
/// station-fatal, 2 misconfiguration, 130 user interrupt.
pub struct ExitCode;

impl ExitCode {
    pub const SUCCESS: i32 = 0;
    pub const STATION_FATAL: i32 = 1;
    pub const MISCONFIGURED: i32 = 2;
    pub const USER_INTERRUPT: i32 = 130;
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load station configuration: {0}")]
    ConfigLoad(#[from] station_runtime::errors::ConfigParseError),

    #[error("station run did not complete: {0}")]
    StationFatal(#[from] station_runtime::errors::StationFailure),

    #[error("interrupted")]
    Interrupted,
}

impl CliError {
    pub fn process_exit_code(&self) -> i32 {
        match self {
            CliError::ConfigLoad(_) => ExitCode::MISCONFIGURED,
            CliError::StationFatal(_) => ExitCode::STATION_FATAL,
            CliError::Interrupted => ExitCode::USER_INTERRUPT,
        }
    }
}
