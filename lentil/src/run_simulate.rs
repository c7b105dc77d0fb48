use lentil::simulate::*;

use clap::Args;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// number of cell types
    #[arg(short = 'k', long, default_value_t = 3)]
    cell_types: usize,

    /// number of control cells per cell type
    #[arg(long, default_value_t = 50)]
    controls: usize,

    /// number of compounds
    #[arg(short = 'c', long, default_value_t = 10)]
    compounds: usize,

    /// number of treated cells per compound and cell type
    #[arg(short = 't', long, default_value_t = 20)]
    treated: usize,

    /// expression embedding dimension
    #[arg(short = 'd', long, default_value_t = 16)]
    features: usize,

    /// drug embedding dimension
    #[arg(short = 'p', long, default_value_t = 8)]
    drug_dims: usize,

    /// doses (comma-separated), assigned to treated cells in turn
    #[arg(long, value_delimiter(','), default_values_t = vec![10., 100., 1000., 10000.])]
    doses: Vec<f64>,

    /// standard deviation of the cell-level noise
    #[arg(long, default_value_t = 0.5)]
    noise_sd: f32,

    /// standard deviation of the drug-to-expression map
    #[arg(long, default_value_t = 0.3)]
    effect_sd: f32,

    /// fraction of compounds in the train list
    #[arg(long, default_value_t = 0.8)]
    pct_train: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let sim = generate_perturbation_data(&SimArgs {
        cell_types: args.cell_types,
        controls: args.controls,
        compounds: args.compounds,
        treated: args.treated,
        features: args.features,
        drug_dims: args.drug_dims,
        doses: args.doses.clone(),
        noise_sd: args.noise_sd,
        effect_sd: args.effect_sd,
        pct_train: args.pct_train,
        rseed: args.rseed,
    })?;

    write_simulation(&sim, &args.out)
}
