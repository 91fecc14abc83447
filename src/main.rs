use std::process::ExitCode;

use clap::Parser;
use polaroidfx::cli::{self, CliArgs};
use polaroidfx::{log_info, logger, preview};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Session log (overwrites the previous session's log)
    logger::init();
    logger::set_echo(args.verbose);
    log_info!("Arguments: {:?}", std::env::args().collect::<Vec<_>>());

    if args.preview {
        preview::run(args)
    } else {
        cli::run(args)
    }
}
