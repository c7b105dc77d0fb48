use candle_core::{Device, Tensor};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

/// One minibatch of matched perturbation data
pub struct PerturbMinibatch {
    pub control: Tensor,
    pub drug: Tensor,
    pub log_dose: Tensor,
    pub treated: Tensor,
    /// row positions of the samples in the original data
    pub samples: Vec<usize>,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<PerturbMinibatch>;

    fn num_minibatch(&self) -> usize;

    /// Randomly permute samples and partition them into minibatches
    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()>;

    /// Partition samples into minibatches keeping the original order
    fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// A simple data loader for in-memory matched samples. Each row is
/// a sample: control (n x d), drug (n x p), log-dose (n) and treated
/// (n x d) rows are aligned.
///
pub struct InMemoryPerturbData {
    control: Array2<f32>,
    drug: Array2<f32>,
    log_dose: Array1<f32>,
    treated: Array2<f32>,
    minibatches: Minibatches,
}

impl InMemoryPerturbData {
    pub fn new(
        control: Array2<f32>,
        drug: Array2<f32>,
        log_dose: Array1<f32>,
        treated: Array2<f32>,
    ) -> anyhow::Result<Self> {
        let nn = control.nrows();

        if drug.nrows() != nn || log_dose.len() != nn || treated.nrows() != nn {
            return Err(anyhow::anyhow!(
                "misaligned rows: control {}, drug {}, dose {}, treated {}",
                nn,
                drug.nrows(),
                log_dose.len(),
                treated.nrows()
            ));
        }

        if control.ncols() != treated.ncols() {
            return Err(anyhow::anyhow!(
                "control ({}) and treated ({}) widths differ",
                control.ncols(),
                treated.ncols()
            ));
        }

        Ok(Self {
            control,
            drug,
            log_dose,
            treated,
            minibatches: Minibatches {
                samples: (0..nn).collect(),
                chunks: vec![],
            },
        })
    }

    pub fn num_samples(&self) -> usize {
        self.control.nrows()
    }

    pub fn dim_obs(&self) -> usize {
        self.control.ncols()
    }

    pub fn dim_drug(&self) -> usize {
        self.drug.ncols()
    }
}

impl DataLoader for InMemoryPerturbData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<PerturbMinibatch> {
        let samples = self
            .minibatches
            .chunks
            .get(batch_idx)
            .ok_or(anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            ))?;

        let nb = samples.len();
        let log_dose: Vec<f32> = samples.iter().map(|&i| self.log_dose[i]).collect();

        Ok(PerturbMinibatch {
            control: take_rows(&self.control, samples, target_device)?,
            drug: take_rows(&self.drug, samples, target_device)?,
            log_dose: Tensor::from_vec(log_dose, (nb, 1), target_device)?,
            treated: take_rows(&self.treated, samples, target_device)?,
            samples: samples.clone(),
        })
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        self.minibatches.shuffle_minibatch(batch_size, rng)
    }

    fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.ordered_minibatch(batch_size)
    }
}

fn take_rows(data: &Array2<f32>, rows: &[usize], target_device: &Device) -> anyhow::Result<Tensor> {
    let sub = data.select(Axis(0), rows);
    let ncol = sub.ncols();
    let (vec, _) = sub.into_raw_vec_and_offset();
    Ok(Tensor::from_vec(vec, (rows.len(), ncol), target_device)?)
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    pub samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn shuffle_minibatch<R: Rng + ?Sized>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        self.samples.shuffle(rng);
        self.partition(batch_size)
    }

    pub fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.samples.sort_unstable();
        self.partition(batch_size)
    }

    fn partition(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn toy_data(nn: usize) -> anyhow::Result<InMemoryPerturbData> {
        let control = Array2::from_shape_fn((nn, 3), |(i, j)| (i * 10 + j) as f32);
        let treated = control.mapv(|x| x + 0.5);
        let drug = Array2::from_shape_fn((nn, 2), |(i, _)| i as f32);
        let log_dose = Array1::from_shape_fn(nn, |i| (i as f32).ln_1p());
        InMemoryPerturbData::new(control, drug, log_dose, treated)
    }

    #[test]
    fn shuffled_minibatches_cover_every_sample_once() -> anyhow::Result<()> {
        let mut data = toy_data(10)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        data.shuffle_minibatch(4, &mut rng)?;
        assert_eq!(data.num_minibatch(), 3);

        let mut seen = vec![];
        for b in 0..data.num_minibatch() {
            let mb = data.minibatch_data(b, &Device::Cpu)?;
            let nb = mb.samples.len();
            assert_eq!(mb.control.dims(), &[nb, 3]);
            assert_eq!(mb.drug.dims(), &[nb, 2]);
            assert_eq!(mb.log_dose.dims(), &[nb, 1]);

            // rows stay aligned with their sample index
            let ctrl = mb.control.to_vec2::<f32>()?;
            let trt = mb.treated.to_vec2::<f32>()?;
            for (r, &i) in mb.samples.iter().enumerate() {
                assert_eq!(ctrl[r][0], (i * 10) as f32);
                assert_eq!(trt[r][0], (i * 10) as f32 + 0.5);
            }
            seen.extend(mb.samples);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn ordered_minibatches_keep_order() -> anyhow::Result<()> {
        let mut data = toy_data(5)?;
        data.ordered_minibatch(2)?;
        let order: Vec<usize> = (0..data.num_minibatch())
            .map(|b| data.minibatch_data(b, &Device::Cpu).map(|mb| mb.samples))
            .collect::<anyhow::Result<Vec<_>>>()?
            .concat();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(data.ordered_minibatch(0).is_err());
        assert!(data.minibatch_data(3, &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn misaligned_rows_are_rejected() {
        let control = Array2::<f32>::zeros((3, 2));
        let treated = Array2::<f32>::zeros((2, 2));
        let drug = Array2::<f32>::zeros((3, 1));
        let log_dose = Array1::<f32>::zeros(3);
        assert!(InMemoryPerturbData::new(control, drug, log_dose, treated).is_err());
    }
}
