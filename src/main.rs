use clap::Parser;
use vintage::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
