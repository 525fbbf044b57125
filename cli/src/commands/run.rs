use anyhow::Result;
use ndui::{run_config, RunConfig};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RunArgs) -> Result<()> {
    let mut config = RunConfig::from_path(&args.config)?;
    if let Some(dir) = &args.output { config.output.dir = dir.clone() }
    if args.parallel { config.parallel = true }

    let summary = run_config(&config, args.force)?;
    for table in &summary.tables {
        println!("[run] {} rows={} dropped={}/{} -> {}", table.name, table.rows,
            table.join.primary_dropped, table.join.secondary_dropped, table.path.display());
    }
    Ok(())
}
