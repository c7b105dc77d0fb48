use crate::cell_table::*;
use crate::common::*;

use matrix_util::common_io::{mkdir, write_lines};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct SimArgs {
    pub cell_types: usize,
    /// control cells per cell type
    pub controls: usize,
    pub compounds: usize,
    /// treated cells per compound and cell type
    pub treated: usize,
    pub features: usize,
    pub drug_dims: usize,
    /// doses are assigned to treated cells in turn
    pub doses: Vec<f64>,
    pub noise_sd: f32,
    pub effect_sd: f32,
    /// fraction of compounds in the train list
    pub pct_train: f64,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            cell_types: 3,
            controls: 50,
            compounds: 10,
            treated: 20,
            features: 16,
            drug_dims: 8,
            doses: vec![10., 100., 1000., 10000.],
            noise_sd: 0.5,
            effect_sd: 0.3,
            pct_train: 0.8,
            rseed: 42,
        }
    }
}

pub struct SimOut {
    pub table: CellTable,
    pub train_compounds: Vec<Box<str>>,
    pub test_compounds: Vec<Box<str>>,
}

///
/// Simulate a cell table with Vehicle controls and treated cells
///
/// ```text
/// x(control) ~ N(mu(k), s^2)
/// x(treated) ~ N(mu(k) + ln(1 + dose) * W e(c), s^2)
/// ```
///
/// where `k` is the cell type, `e(c)` the embedding of the compound
/// `c`, and `W` a shared random map from drug to expression space.
///
pub fn generate_perturbation_data(args: &SimArgs) -> anyhow::Result<SimOut> {
    let kk = args.cell_types;
    let dd = args.features;
    let pp = args.drug_dims;

    if kk == 0 || dd == 0 || args.controls == 0 {
        return Err(PerturbError::Config(
            "need at least one cell type, feature, and control cell".into(),
        )
        .into());
    }

    if args.compounds > 0 && args.doses.is_empty() {
        return Err(PerturbError::Config("need at least one dose".into()).into());
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    let rnorm = Normal::new(0_f32, 1_f32)?;
    let noise = Normal::new(0_f32, args.noise_sd)?;
    let effect = Normal::new(0_f32, args.effect_sd)?;

    // 1. cell type centres
    let mu_kd = Mat::from_shape_simple_fn((kk, dd), || 3. * rnorm.sample(&mut rng));

    // 2. compound embeddings and their expression effects
    let emb_cp = Mat::from_shape_simple_fn((args.compounds, pp), || rnorm.sample(&mut rng));
    let w_pd = Mat::from_shape_simple_fn((pp, dd), || effect.sample(&mut rng));
    let delta_cd = emb_cp.dot(&w_pd);

    let emb_literals: Vec<Box<str>> = emb_cp
        .rows()
        .into_iter()
        .map(|e| {
            let inner: Vec<String> = e.iter().map(|x| x.to_string()).collect();
            format!("[{}]", inner.join(", ")).into_boxed_str()
        })
        .collect();

    let compounds: Vec<Box<str>> = (0..args.compounds)
        .map(|c| format!("drug{}", c).into_boxed_str())
        .collect();

    // 3. cells
    let nn = kk * (args.controls + args.compounds * args.treated);
    let mut cells = Vec::with_capacity(nn);
    let mut expression = Mat::zeros((nn, dd));
    let mut row = 0;

    for k in 0..kk {
        let cell_type: Box<str> = format!("ct{}", k).into_boxed_str();

        for _ in 0..args.controls {
            for (x, &m) in expression.row_mut(row).iter_mut().zip(mu_kd.row(k)) {
                *x = m + noise.sample(&mut rng);
            }
            cells.push(CellMeta {
                cell_name: format!("cell{}", row).into_boxed_str(),
                cell_type: cell_type.clone(),
                product_name: VEHICLE.into(),
                dose: 0.,
                sm_embedding: "[]".into(),
            });
            row += 1;
        }

        for c in 0..args.compounds {
            for t in 0..args.treated {
                let dose = args.doses[t % args.doses.len()];
                let scale = dose.ln_1p() as f32;
                let mut x_row = expression.row_mut(row);
                for ((x, &m), &delta) in x_row
                    .iter_mut()
                    .zip(mu_kd.row(k))
                    .zip(delta_cd.row(c))
                {
                    *x = m + scale * delta + noise.sample(&mut rng);
                }
                cells.push(CellMeta {
                    cell_name: format!("cell{}", row).into_boxed_str(),
                    cell_type: cell_type.clone(),
                    product_name: compounds[c].clone(),
                    dose,
                    sm_embedding: emb_literals[c].clone(),
                });
                row += 1;
            }
        }
    }

    let feature_names = (0..dd)
        .map(|g| format!("f{}", g).into_boxed_str())
        .collect();

    let table = CellTable::new(cells, expression, feature_names)?;

    // 4. compound lists for an explicit split
    let mut shuffled = compounds.clone();
    shuffled.shuffle(&mut rng);
    let ntrain = (args.pct_train.clamp(0., 1.) * shuffled.len() as f64).floor() as usize;
    let test_compounds = shuffled.split_off(ntrain);
    let mut train_compounds = shuffled;
    train_compounds.sort();
    let mut test_compounds = test_compounds;
    test_compounds.sort();

    info!(
        "simulated {} cells: {} cell types, {} compounds ({} train / {} test)",
        table.num_cells(),
        kk,
        compounds.len(),
        train_compounds.len(),
        test_compounds.len()
    );

    Ok(SimOut {
        table,
        train_compounds,
        test_compounds,
    })
}

///
/// Write `{out}.parquet`, `{out}.drugs_train.txt` and
/// `{out}.drugs_test.txt`
///
pub fn write_simulation(sim: &SimOut, out: &str) -> anyhow::Result<()> {
    mkdir(out)?;

    let table_file = format!("{}.parquet", out);
    let train_file = format!("{}.drugs_train.txt", out);
    let test_file = format!("{}.drugs_test.txt", out);

    sim.table.to_parquet(&table_file)?;
    write_lines(&sim.train_compounds, &train_file)?;
    write_lines(&sim.test_compounds, &test_file)?;

    info!(
        "wrote simulated data:\n{}\n{}\n{}",
        table_file, train_file, test_file
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimArgs {
        SimArgs {
            cell_types: 2,
            controls: 4,
            compounds: 5,
            treated: 3,
            features: 6,
            drug_dims: 3,
            ..Default::default()
        }
    }

    #[test]
    fn layout_of_simulated_cells() -> anyhow::Result<()> {
        let sim = generate_perturbation_data(&small())?;
        let table = &sim.table;
        assert_eq!(table.num_cells(), 2 * (4 + 5 * 3));
        assert_eq!(table.num_features(), 6);

        let controls = table.cells().iter().filter(|c| c.is_control()).count();
        assert_eq!(controls, 8);

        for cell in table.cells().iter().filter(|c| !c.is_control()) {
            assert!(cell.dose > 0.);
            assert_eq!(decode_drug_embedding(&cell.sm_embedding)?.len(), 3);
        }

        assert_eq!(sim.train_compounds.len(), 4);
        assert_eq!(sim.test_compounds.len(), 1);
        assert!(!sim.train_compounds.contains(&sim.test_compounds[0]));
        Ok(())
    }

    #[test]
    fn same_seed_same_table() -> anyhow::Result<()> {
        let a = generate_perturbation_data(&small())?;
        let b = generate_perturbation_data(&small())?;
        assert_eq!(a.table.expression(), b.table.expression());
        assert_eq!(a.table.cells(), b.table.cells());
        assert_eq!(a.train_compounds, b.train_compounds);
        Ok(())
    }
}
