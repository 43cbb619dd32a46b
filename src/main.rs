use std::process::ExitCode;

use assetpipe::{cli, logging};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::from(2);
    }

    match assetpipe::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "exiting with failure");
            if err.is_fatal_config() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
