use lentil::common::*;
use lentil::edist_stats::*;
use lentil::results::ResultTable;

use clap::Args;

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[arg(
        required = true,
        help = "Result table",
        long_help = "Test predictions written by `lentil train`\n\
		     (.csv, .tsv, .json with optional .gz, or .bin)."
    )]
    results: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for statistics:\n\
		     - {out}.edist.tsv.gz (per cell type and compound)\n\
		     - {out}.summary.tsv (per cell type)\n"
    )]
    out: Box<str>,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn run_stats(args: &StatsArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let table = ResultTable::from_file(&*args.results)?;
    let formatted = format_test_results(&table.records);
    info!(
        "{} of {} records carry a compound and a non-zero dose",
        formatted.len(),
        table.len()
    );

    let stats = get_model_stats(&formatted)?;
    stats.log_summary();

    let edist_file = format!("{}.edist.tsv.gz", args.out);
    let summary_file = format!("{}.summary.tsv", args.out);
    stats.to_tsv(&edist_file)?;
    stats.summary_to_tsv(&summary_file)?;

    info!("wrote {} and {}", edist_file, summary_file);
    Ok(())
}
