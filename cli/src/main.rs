mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{join, run as run_cmd, summarize};
use tracing::Level;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    // a subscriber may already be installed when embedded
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match &cli.command {
        Commands::Run(args) => run_cmd::run(&cli, args),
        Commands::Join(args) => join::run(&cli, args),
        Commands::Summarize(args) => summarize::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
