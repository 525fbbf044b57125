use anyhow::Result;
use ndui::{inner_join, read_table, with_ndui, write_csv};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::JoinArgs) -> Result<()> {
    let out_path = args.output.clone().unwrap_or("./ndui.csv".into());

    let light = read_table(&args.light, &args.key)?;
    let vegetation = read_table(&args.vegetation, &args.key)?;
    let (joined, report) = inner_join(&light, &vegetation, &args.key)?;
    let indexed = with_ndui(&joined)?;

    let path = write_csv(&indexed, &out_path, args.force)?;
    println!("[join] {} rows ({} light, {} vegetation rows unmatched) -> {}",
        report.matched_rows, report.primary_dropped, report.secondary_dropped, path.display());
    Ok(())
}
