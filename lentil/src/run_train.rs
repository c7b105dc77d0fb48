use lentil::common::*;
use lentil::harness::Experiment;

use clap::Args;
use matrix_util::common_io::mkdir;

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        required = true,
        help = "Experiment configuration (YAML)",
        long_help = "Experiment configuration file (YAML) with\n\
		     `dataset_params`, `train_params` and optionally\n\
		     `model_params`, `device` and `seed`."
    )]
    config: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results.\n\
		     Generates the following files:\n\
		     - {out}.{format} (test predictions)\n\
		     - {out}.loss.gz (minibatch losses)\n\
		     - {out}.safetensors (model parameters)\n"
    )]
    out: Box<str>,

    #[arg(
        long,
        short,
        default_value = "tsv.gz",
        help = "Result format",
        long_help = "Format of the test predictions by suffix:\n\
		     csv, tsv, json (each with optional .gz) or bin."
    )]
    format: Box<str>,

    #[arg(long, default_value_t = false, help = "Save model parameters")]
    save_model: bool,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn run_train(args: &TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let result_file = format!("{}.{}", args.out, args.format);
    // fail on the format before any expensive work
    lentil::results::ResultFormat::from_path(&result_file)?;
    mkdir(&result_file)?;

    let configured = Experiment::configure_from_file(&*args.config)?.with_progress(true);
    let trained = configured.train()?;

    let loss_file = format!("{}.loss.gz", args.out);
    trained.write_losses(&loss_file)?;
    info!("minibatch losses: {}", loss_file);

    if args.save_model {
        let model_file = format!("{}.safetensors", args.out);
        trained.save_parameters(&model_file)?;
        info!("model parameters: {}", model_file);
    }

    let evaluated = trained.evaluate()?;
    evaluated.persist(&result_file)?;

    info!("test predictions: {}", result_file);
    Ok(())
}
