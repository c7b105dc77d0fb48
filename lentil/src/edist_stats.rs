use crate::common::*;
use crate::results::ResultRecord;

use matrix_util::common_io::{mkdir, open_buf_writer};
use matrix_util::traits::DistanceOps;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

///
/// Drop the records that carry no perturbation signal: those without
/// a compound and those with zero dose
///
pub fn format_test_results(records: &[ResultRecord]) -> Vec<&ResultRecord> {
    records
        .iter()
        .filter(|r| r.compound.is_some() && r.dose != 0.)
        .collect()
}

/// Energy distances of one `(cell_type, compound)` group
#[derive(Clone, Debug, PartialEq)]
pub struct GroupLoss {
    pub cell_type: Box<str>,
    pub compound: Box<str>,
    pub n_cells: usize,
    /// predicted vs. true treated
    pub pred_loss: f64,
    /// control vs. true treated
    pub null_loss: f64,
    /// control vs. predicted
    pub similarity_loss: f64,
}

impl GroupLoss {
    pub fn key(&self) -> String {
        format!("{}_{}", self.cell_type, self.compound)
    }

    pub fn beats_null(&self) -> bool {
        self.pred_loss < self.null_loss
    }
}

/// Averages over the compounds of one cell type
#[derive(Clone, Debug, PartialEq)]
pub struct CellTypeSummary {
    pub cell_type: Box<str>,
    pub n_compounds: usize,
    pub mean_pred_loss: f64,
    pub mean_null_loss: f64,
    pub mean_similarity_loss: f64,
    /// number of compounds with `pred_loss < null_loss`
    pub n_beats_null: usize,
}

/// Group losses sorted by `(cell_type, compound)`
#[derive(Clone, Debug, Default)]
pub struct ModelStats {
    pub groups: Vec<GroupLoss>,
}

impl ModelStats {
    pub fn pred_loss_map(&self) -> BTreeMap<String, f64> {
        self.loss_map(|g| g.pred_loss)
    }

    pub fn null_loss_map(&self) -> BTreeMap<String, f64> {
        self.loss_map(|g| g.null_loss)
    }

    pub fn similarity_loss_map(&self) -> BTreeMap<String, f64> {
        self.loss_map(|g| g.similarity_loss)
    }

    fn loss_map<F: Fn(&GroupLoss) -> f64>(&self, f: F) -> BTreeMap<String, f64> {
        self.groups.iter().map(|g| (g.key(), f(g))).collect()
    }

    pub fn cell_types(&self) -> Vec<&str> {
        self.groups
            .iter()
            .map(|g| g.cell_type.as_ref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Groups of one cell type
    pub fn stratified(&self, cell_type: &str) -> Vec<&GroupLoss> {
        self.groups
            .iter()
            .filter(|g| g.cell_type.as_ref() == cell_type)
            .collect()
    }

    pub fn summarize(&self) -> Vec<CellTypeSummary> {
        self.cell_types()
            .into_iter()
            .map(|ct| {
                let groups = self.stratified(ct);
                let nn = groups.len() as f64;
                let mean = |f: fn(&GroupLoss) -> f64| groups.iter().map(|g| f(g)).sum::<f64>() / nn;
                CellTypeSummary {
                    cell_type: ct.into(),
                    n_compounds: groups.len(),
                    mean_pred_loss: mean(|g: &GroupLoss| g.pred_loss),
                    mean_null_loss: mean(|g: &GroupLoss| g.null_loss),
                    mean_similarity_loss: mean(|g: &GroupLoss| g.similarity_loss),
                    n_beats_null: groups.iter().filter(|g| g.beats_null()).count(),
                }
            })
            .collect()
    }

    pub fn log_summary(&self) {
        for s in self.summarize() {
            info!(
                "{}: {} compounds, avg pred loss {:.4}, avg null loss {:.4}, avg similarity loss {:.4}, {} below null",
                s.cell_type,
                s.n_compounds,
                s.mean_pred_loss,
                s.mean_null_loss,
                s.mean_similarity_loss,
                s.n_beats_null
            );
        }
    }

    /// One row per group
    pub fn to_tsv<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        mkdir(file_path.as_ref())?;
        let mut buf = open_buf_writer(file_path.as_ref())?;
        writeln!(
            buf,
            "key\tcell_type\tcompound\tn_cells\tpred_loss\tnull_loss\tsimilarity_loss"
        )?;
        for g in self.groups.iter() {
            writeln!(
                buf,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                g.key(),
                g.cell_type,
                g.compound,
                g.n_cells,
                g.pred_loss,
                g.null_loss,
                g.similarity_loss
            )?;
        }
        buf.flush()?;
        Ok(())
    }

    /// One row per cell type
    pub fn summary_to_tsv<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        mkdir(file_path.as_ref())?;
        let mut buf = open_buf_writer(file_path.as_ref())?;
        writeln!(
            buf,
            "cell_type\tn_compounds\tmean_pred_loss\tmean_null_loss\tmean_similarity_loss\tn_beats_null"
        )?;
        for s in self.summarize() {
            writeln!(
                buf,
                "{}\t{}\t{}\t{}\t{}\t{}",
                s.cell_type,
                s.n_compounds,
                s.mean_pred_loss,
                s.mean_null_loss,
                s.mean_similarity_loss,
                s.n_beats_null
            )?;
        }
        buf.flush()?;
        Ok(())
    }
}

///
/// Energy distances per `(cell_type, compound)` group of already
/// formatted records. Groups are evaluated in parallel.
///
pub fn get_model_stats(records: &[&ResultRecord]) -> anyhow::Result<ModelStats> {
    let mut grouped: BTreeMap<(&str, &str), Vec<&ResultRecord>> = BTreeMap::new();
    for &r in records {
        let Some(compound) = r.compound.as_deref() else {
            continue;
        };
        grouped
            .entry((r.cell_type.as_ref(), compound))
            .or_default()
            .push(r);
    }

    let groups = grouped
        .into_par_iter()
        .map(|((cell_type, compound), rows)| -> anyhow::Result<GroupLoss> {
            let ctrl = stack_rows(rows.iter().map(|r| r.ctrl_emb.as_slice()))?;
            let pert = stack_rows(rows.iter().map(|r| r.pert_emb.as_slice()))?;
            let pred = stack_rows(rows.iter().map(|r| r.pred_emb.as_slice()))?;

            Ok(GroupLoss {
                cell_type: cell_type.into(),
                compound: compound.into(),
                n_cells: rows.len(),
                pred_loss: pert.energy_distance(&pred)?,
                null_loss: ctrl.energy_distance(&pert)?,
                similarity_loss: ctrl.energy_distance(&pred)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ModelStats { groups })
}

fn stack_rows<'a, I>(rows: I) -> anyhow::Result<Mat>
where
    I: Iterator<Item = &'a [f32]>,
{
    let rows: Vec<&[f32]> = rows.collect();
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);

    if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
        return Err(PerturbError::ShapeMismatch(format!(
            "embedding of width {} among width {}",
            bad.len(),
            ncols
        ))
        .into());
    }

    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Ok(Mat::from_shape_vec((rows.len(), ncols), flat)?)
}
