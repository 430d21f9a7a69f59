use clap::Parser;

use ink_filter::{cli, logger};

fn main() -> std::process::ExitCode {
    // Session log (overwrites the previous run's log)
    logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
