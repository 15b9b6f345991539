mod dispatch;
mod errors;
mod output;

use clap::Parser;
use dispatch::StationCli;
use errors::CliError;

#[tokio::main]
async fn main() {
    let cli = StationCli::parse();

    let code = tokio::select! {
        code = cli.exec() => code,
        _ = tokio::signal::ctrl_c() => {
            let err = CliError::Interrupted;
            tracing::error!("{err}");
            err.process_exit_code()
        }
    };

    std::process::exit(code);
}
