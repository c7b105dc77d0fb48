use crate::cell_table::*;
use crate::common::*;
use crate::split::InclusionPolicy;

use candle_util::candle_data_loader::InMemoryPerturbData;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

///
/// Row indexes of the control (Vehicle) cells grouped by cell type
///
#[derive(Debug, Default)]
pub struct ControlPools {
    pools: HashMap<Box<str>, Vec<usize>>,
}

impl ControlPools {
    pub fn from_table(table: &CellTable) -> Self {
        let mut pools: HashMap<Box<str>, Vec<usize>> = HashMap::new();
        for (i, cell) in table.cells().iter().enumerate() {
            if cell.is_control() {
                pools.entry(cell.cell_type.clone()).or_default().push(i);
            }
        }
        Self { pools }
    }

    pub fn get(&self, cell_type: &str) -> Option<&[usize]> {
        self.pools.get(cell_type).map(|v| v.as_slice())
    }

    pub fn num_cell_types(&self) -> usize {
        self.pools.len()
    }

    /// Draw one control row of the `cell_type` uniformly at random
    pub fn draw<R: Rng + ?Sized>(&self, cell_type: &str, rng: &mut R) -> anyhow::Result<usize> {
        match self.get(cell_type) {
            Some(rows) if !rows.is_empty() => Ok(rows[rng.random_range(0..rows.len())]),
            _ => Err(PerturbError::UnknownCellType(cell_type.to_string()).into()),
        }
    }
}

/// What we remember about the treated cell of a sample
#[derive(Clone, Debug, PartialEq)]
pub struct SampleMeta {
    pub compound: Box<str>,
    pub dose: f64,
    pub cell_type: Box<str>,
}

/// A treated cell paired with a randomly drawn control of its cell type
#[derive(Clone, Debug)]
pub struct MatchedSample {
    /// row of the treated cell in the source table
    pub source_row: usize,
    /// row of the matched control cell in the source table
    pub control_row: usize,
    pub treated: DVec,
    pub control: DVec,
    pub drug: DVec,
    pub log_dose: f32,
    pub meta: SampleMeta,
}

///
/// Matched samples in the order of the source table. Every sample
/// shares the same expression width (`dim_obs`) and drug embedding
/// width (`dim_drug`).
///
#[derive(Clone, Debug)]
pub struct MatchedDataset {
    samples: Vec<MatchedSample>,
    dim_obs: usize,
    dim_drug: usize,
}

impl MatchedDataset {
    ///
    /// Pair every retained treated cell with a control cell of the same
    /// cell type drawn uniformly at random.
    ///
    /// * `table` - source cells
    /// * `policy` - which compounds to keep
    /// * `rng` - the only source of randomness
    ///
    /// Fails without a partial result if a retained cell's type has no
    /// control cells, or if a drug embedding cannot be decoded.
    ///
    pub fn build<R: Rng + ?Sized>(
        table: &CellTable,
        policy: &InclusionPolicy,
        rng: &mut R,
    ) -> anyhow::Result<Self> {
        let pools = ControlPools::from_table(table);
        let expression = table.expression();

        let mut drug_cache: HashMap<&str, DVec> = HashMap::new();
        let mut dim_drug: Option<usize> = None;
        let mut samples = vec![];

        for (i, cell) in table.cells().iter().enumerate() {
            if cell.is_control() || !policy.includes(&cell.product_name) {
                continue;
            }

            let control_row = pools.draw(&cell.cell_type, rng)?;

            let literal = cell.sm_embedding.as_ref();
            let drug = match drug_cache.get(literal) {
                Some(x) => x.clone(),
                None => {
                    let x = DVec::from_vec(decode_drug_embedding(literal)?);
                    drug_cache.insert(literal, x.clone());
                    x
                }
            };

            match dim_drug {
                Some(expected) if expected != drug.len() => {
                    return Err(PerturbError::DrugEmbeddingWidth {
                        expected,
                        actual: drug.len(),
                    }
                    .into());
                }
                None => dim_drug = Some(drug.len()),
                _ => {}
            }

            samples.push(MatchedSample {
                source_row: i,
                control_row,
                treated: expression.row(i).to_owned(),
                control: expression.row(control_row).to_owned(),
                drug,
                log_dose: cell.log_dose(),
                meta: SampleMeta {
                    compound: cell.product_name.clone(),
                    dose: cell.dose,
                    cell_type: cell.cell_type.clone(),
                },
            });
        }

        debug!(
            "matched {} treated cells against {} control pools ({} distinct drug embeddings)",
            samples.len(),
            pools.num_cell_types(),
            drug_cache.len()
        );

        Ok(Self {
            samples,
            dim_obs: table.num_features(),
            dim_drug: dim_drug.unwrap_or(0),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[MatchedSample] {
        &self.samples
    }

    pub fn dim_obs(&self) -> usize {
        self.dim_obs
    }

    pub fn dim_drug(&self) -> usize {
        self.dim_drug
    }

    /// Distinct compound names, sorted
    pub fn compounds(&self) -> Vec<Box<str>> {
        self.samples
            .iter()
            .map(|s| s.meta.compound.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keep the samples satisfying `pred` in their current order
    pub fn filter<F>(&self, pred: F) -> Self
    where
        F: Fn(&MatchedSample) -> bool,
    {
        Self {
            samples: self.samples.iter().filter(|s| pred(s)).cloned().collect(),
            dim_obs: self.dim_obs,
            dim_drug: self.dim_drug,
        }
    }

    /// Stack all the samples into dense arrays for minibatch training
    pub fn to_loader_data(&self) -> anyhow::Result<InMemoryPerturbData> {
        let nn = self.len();
        let mut control = Mat::zeros((nn, self.dim_obs));
        let mut treated = Mat::zeros((nn, self.dim_obs));
        let mut drug = Mat::zeros((nn, self.dim_drug));
        let mut log_dose = DVec::zeros(nn);

        for (i, s) in self.samples.iter().enumerate() {
            control.row_mut(i).assign(&s.control);
            treated.row_mut(i).assign(&s.treated);
            drug.row_mut(i).assign(&s.drug);
            log_dose[i] = s.log_dose;
        }

        InMemoryPerturbData::new(control, drug, log_dose, treated)
    }
}
