use artifact_signer::cli::{run_cli, Cli};
use chrono::Utc;
use clap::Parser;
use color_eyre::Result;
use dotenvy::dotenv;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

fn main() -> Result<()> {
    color_eyre::install()?;
    // load environment variables from .env file, if present
    dotenv().ok();

    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    match run_cli(cli) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn setup_cli_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // stdout carries command output, so log lines go to stderr
    Builder::from_default_env()
        .format(|buf, record| {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(
                buf,
                "[{}] {} [{}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .filter(None, level)
        .init();

    Ok(())
}
