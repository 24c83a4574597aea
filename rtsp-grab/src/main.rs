use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use rtsp_grab::cli::Args;
use rtsp_grab::error::{EXIT_CONFIG, EXIT_OK};
use rtsp_grab::{app, logging, panic_hook};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(EXIT_OK),
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    if let Err(e) = logging::init_logging(args.settings.log_format) {
        eprintln!("Error: {e}");
        return ExitCode::from(e.exit_code());
    }
    panic_hook::install();

    match app::run(args).await {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "rtsp-grab exiting with error");
            ExitCode::from(e.exit_code())
        }
    }
}
