mod run_simulate;
mod run_stats;
mod run_train;

use run_simulate::*;
use run_stats::*;
use run_train::*;

use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Drug perturbation responses learned from matched control cells\n\
		  Cell tables are parquet files with `cell_type`, `product_name`,\n\
		  `dose` and `sm_embedding` columns next to expression features."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train a perturbation model and predict the test compounds",
        long_about = "Train and evaluate in the four stages:\n\
		      (1) Match every treated cell with a random control of its cell type\n\
		      (2) Split compounds into train and test sets\n\
		      (3) Fit the model by minibatch AdamW\n\
		      (4) Predict the test cells and write down the results.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Energy distance statistics of test predictions",
        long_about = "For each cell type and compound, compare predicted, true\n\
		      treated and control cells by the energy distance.\n"
    )]
    Stats(StatsArgs),

    /// simulate a cell table with compound lists
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            run_train(args)?;
        }
        Commands::Stats(args) => {
            run_stats(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    info!("Done");
    Ok(())
}
