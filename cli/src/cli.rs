use std::path::PathBuf;

/// NDUI pipeline CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "ndui", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline from a JSON configuration (forbids stdout)
    Run(RunArgs),

    /// Join two zonal-mean tables and compute NDUI (forbids stdout)
    Join(JoinArgs),

    /// Count, mean and standard deviation of table columns
    Summarize(SummarizeArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Run configuration file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Output directory, overrides the configuration
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Run years in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Overwrite existing outputs
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    /// Zonal means of the light layer (CSV with a `mean` column)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub light: PathBuf,

    /// Zonal means of the vegetation layer (CSV with a `mean` column)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub vegetation: PathBuf,

    /// Identifier field shared by both tables, e.g. COUNTYFP or CBSAFP
    #[arg(short, long)]
    pub key: String,

    /// Output CSV file, defaults to "./ndui.csv"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct SummarizeArgs {
    /// Input CSV table
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub table: PathBuf,

    /// Columns to summarize
    #[arg(short, long, value_delimiter = ',', default_value = "NDUI")]
    pub columns: Vec<String>,

    /// Key column kept as text, e.g. COUNTYFP
    #[arg(short, long, default_value = "COUNTYFP")]
    pub key: String,

    /// Write the summary to a CSV file instead of printing it
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output
    #[arg(long)]
    pub force: bool,
}
