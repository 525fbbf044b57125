use anyhow::Result;
use ndui::{read_table, summarize, write_csv};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::SummarizeArgs) -> Result<()> {
    let table = read_table(&args.table, &args.key)?;
    let columns: Vec<&str> = args.columns.iter().map(String::as_str).collect();
    let summary = summarize(&table, &columns)?;

    match &args.output {
        Some(path) => {
            let path = write_csv(&summary, path, args.force)?;
            println!("[summarize] wrote {}", path.display());
        }
        None => println!("{summary}"),
    }
    Ok(())
}
