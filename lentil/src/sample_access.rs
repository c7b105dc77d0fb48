use crate::common::*;
use crate::control_match::{MatchedDataset, SampleMeta};

use ndarray::{concatenate, ArrayView1, Axis};

/// Fields of one matched sample in the fixed order the models consume
#[derive(Debug)]
pub struct SampleView<'a> {
    pub control: ArrayView1<'a, f32>,
    pub drug: ArrayView1<'a, f32>,
    /// `[ln(1 + dose)]`
    pub log_dose: DVec,
    pub treated: ArrayView1<'a, f32>,
    pub meta: &'a SampleMeta,
}

impl MatchedDataset {
    pub fn get(&self, i: usize) -> Option<SampleView<'_>> {
        self.samples().get(i).map(|s| SampleView {
            control: s.control.view(),
            drug: s.drug.view(),
            log_dose: DVec::from_elem(1, s.log_dose),
            treated: s.treated.view(),
            meta: &s.meta,
        })
    }

    /// `([control | drug | log_dose], treated)` of the sample `i`
    pub fn concat_input(&self, i: usize) -> Option<(DVec, DVec)> {
        let view = self.get(i)?;
        let input = concatenate(
            Axis(0),
            &[view.control, view.drug, view.log_dose.view()],
        )
        .ok()?;
        Some((input, view.treated.to_owned()))
    }

    /// width of [`MatchedDataset::concat_input`]
    pub fn dim_concat_input(&self) -> usize {
        self.dim_obs() + self.dim_drug() + 1
    }
}

#[cfg(test)]
mod tests {
    use crate::cell_table::*;
    use crate::common::*;
    use crate::control_match::MatchedDataset;
    use crate::split::InclusionPolicy;
    use rand::SeedableRng;

    fn dataset() -> anyhow::Result<MatchedDataset> {
        let cells = vec![
            CellMeta {
                cell_name: "c0".into(),
                cell_type: "A".into(),
                product_name: VEHICLE.into(),
                dose: 0.,
                sm_embedding: "[]".into(),
            },
            CellMeta {
                cell_name: "t1".into(),
                cell_type: "A".into(),
                product_name: "drugX".into(),
                dose: 1.,
                sm_embedding: "[7, 8]".into(),
            },
        ];
        let expression = Mat::from_shape_vec((2, 3), vec![1., 2., 3., 4., 5., 6.])?;
        let table = CellTable::new(cells, expression, vec!["a".into(), "b".into(), "c".into()])?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        MatchedDataset::build(&table, &InclusionPolicy::All, &mut rng)
    }

    #[test]
    fn fields_come_in_fixed_order() -> anyhow::Result<()> {
        let data = dataset()?;
        let view = data.get(0).ok_or(anyhow::anyhow!("no sample"))?;
        assert_eq!(view.control.to_vec(), vec![1., 2., 3.]);
        assert_eq!(view.drug.to_vec(), vec![7., 8.]);
        assert_eq!(view.treated.to_vec(), vec![4., 5., 6.]);
        assert_eq!(view.log_dose.len(), 1);
        approx::assert_abs_diff_eq!(view.log_dose[0], 2_f32.ln(), epsilon = 1e-6);
        assert_eq!(view.meta.compound.as_ref(), "drugX");
        assert!(data.get(1).is_none());
        Ok(())
    }

    #[test]
    fn concatenated_input() -> anyhow::Result<()> {
        let data = dataset()?;
        let (x, y) = data.concat_input(0).ok_or(anyhow::anyhow!("no sample"))?;
        assert_eq!(x.len(), data.dim_concat_input());
        assert_eq!(x.slice(ndarray::s![..5]).to_vec(), vec![1., 2., 3., 7., 8.]);
        approx::assert_abs_diff_eq!(x[5], 2_f32.ln(), epsilon = 1e-6);
        assert_eq!(y.to_vec(), vec![4., 5., 6.]);
        Ok(())
    }
}
