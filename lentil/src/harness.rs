use crate::cell_table::CellTable;
use crate::common::*;
use crate::config::*;
use crate::control_match::MatchedDataset;
use crate::results::*;
use crate::split::*;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_inference::*;
use candle_util::candle_model_traits::PerturbationModuleT;
use candle_util::candle_perturb_models::*;
use matrix_util::common_io::write_lines;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// The concrete models a config can ask for
pub enum PerturbModel {
    Film(FilmResidualModel),
    Concat(ConcatMlpModel),
}

impl PerturbModel {
    pub fn new(
        params: &ModelParams,
        dim_obs: usize,
        dim_drug: usize,
        vb: VarBuilder,
    ) -> anyhow::Result<Self> {
        let args = PerturbModelArgs {
            dim_obs,
            dim_drug,
            hidden_dim: params.hidden_dim,
            num_layers: params.num_layers,
            dropout: params.dropout,
        };
        Ok(match params.kind {
            ModelKind::Film => Self::Film(FilmResidualModel::new(&args, vb)?),
            ModelKind::Concat => Self::Concat(ConcatMlpModel::new(&args, vb)?),
        })
    }
}

impl PerturbationModuleT for PerturbModel {
    fn forward_t(
        &self,
        control_nd: &Tensor,
        drug_np: &Tensor,
        log_dose_n1: &Tensor,
        train: bool,
    ) -> candle_core::Result<Tensor> {
        match self {
            Self::Film(m) => m.forward_t(control_nd, drug_np, log_dose_n1, train),
            Self::Concat(m) => m.forward_t(control_nd, drug_np, log_dose_n1, train),
        }
    }

    fn dim_obs(&self) -> usize {
        match self {
            Self::Film(m) => m.dim_obs(),
            Self::Concat(m) => m.dim_obs(),
        }
    }

    fn dim_drug(&self) -> usize {
        match self {
            Self::Film(m) => m.dim_drug(),
            Self::Concat(m) => m.dim_drug(),
        }
    }
}

/// Map the configured device to a candle device
pub fn select_device(device: ComputeDevice) -> anyhow::Result<Device> {
    let dev = match device {
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::Cuda => Device::new_cuda(0)?,
        ComputeDevice::Metal => Device::new_metal(0)?,
        ComputeDevice::Auto => {
            let dev = Device::cuda_if_available(0)?;
            if dev.is_cpu() {
                Device::metal_if_available(0)?
            } else {
                dev
            }
        }
    };
    info!("compute device: {:?}", dev);
    Ok(dev)
}

///
/// Build train and test datasets from the table. Explicit compound
/// lists win over a random split.
///
pub fn build_train_test<R: rand::Rng + ?Sized>(
    config: &ExperimentConfig,
    table: &CellTable,
    rng: &mut R,
) -> anyhow::Result<(MatchedDataset, MatchedDataset)> {
    if let Some((train_file, test_file)) = config.explicit_lists() {
        let train_policy = InclusionPolicy::from_file(train_file)?;
        let test_policy = InclusionPolicy::from_file(test_file)?;

        let overlap = train_policy.overlap(&test_policy);
        if !overlap.is_empty() {
            warn!(
                "{} compounds are listed for both train and test, e.g., {}",
                overlap.len(),
                overlap[0]
            );
        }

        let train = MatchedDataset::build(table, &train_policy, rng)?;
        let test = MatchedDataset::build(table, &test_policy, rng)?;
        Ok((train, test))
    } else {
        let ds = &config.dataset_params;
        let split = RandomSplit::new(ds.pct_train, ds.split_seed)?;
        let full = MatchedDataset::build(table, &InclusionPolicy::All, rng)?;
        split.split_dataset(&full)
    }
}

/// Entry point of the experiment state machine
pub struct Experiment;

impl Experiment {
    /// Read the config file and the cell table it points to
    pub fn configure_from_file<P: AsRef<Path>>(
        config_file: P,
    ) -> anyhow::Result<ConfiguredExperiment> {
        Self::configure(ExperimentConfig::from_file(config_file)?)
    }

    pub fn configure(config: ExperimentConfig) -> anyhow::Result<ConfiguredExperiment> {
        let table = CellTable::from_parquet(&*config.dataset_params.sciplex_adata_path)?;
        Self::configure_with_table(config, &table)
    }

    ///
    /// Match controls, split, and set up a fresh model on the
    /// configured device
    ///
    pub fn configure_with_table(
        config: ExperimentConfig,
        table: &CellTable,
    ) -> anyhow::Result<ConfiguredExperiment> {
        let device = select_device(config.device)?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let (train_data, test_data) = build_train_test(&config, table, &mut rng)?;

        info!(
            "{} train samples ({} compounds), {} test samples ({} compounds)",
            train_data.len(),
            train_data.compounds().len(),
            test_data.len(),
            test_data.compounds().len()
        );

        if train_data.is_empty() {
            return Err(PerturbError::Config("no training samples".into()).into());
        }

        if !test_data.is_empty() && test_data.dim_drug() != train_data.dim_drug() {
            return Err(PerturbError::DrugEmbeddingWidth {
                expected: train_data.dim_drug(),
                actual: test_data.dim_drug(),
            }
            .into());
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PerturbModel::new(
            &config.model_params,
            train_data.dim_obs(),
            train_data.dim_drug(),
            vb,
        )?;

        Ok(ConfiguredExperiment {
            config,
            device,
            train_data,
            test_data,
            model,
            varmap,
            rng,
            show_progress: false,
        })
    }
}

pub struct ConfiguredExperiment {
    config: ExperimentConfig,
    device: Device,
    train_data: MatchedDataset,
    test_data: MatchedDataset,
    model: PerturbModel,
    varmap: VarMap,
    rng: StdRng,
    show_progress: bool,
}

impl ConfiguredExperiment {
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn train_data(&self) -> &MatchedDataset {
        &self.train_data
    }

    pub fn test_data(&self) -> &MatchedDataset {
        &self.test_data
    }

    /// Minimize MSE by AdamW for exactly `num_epochs` epochs
    pub fn train(mut self) -> anyhow::Result<TrainedExperiment> {
        let tp = &self.config.train_params;
        let train_config = TrainConfig {
            learning_rate: tp.lr,
            weight_decay: tp.weight_decay,
            batch_size: tp.batch_size,
            num_epochs: tp.num_epochs,
            device: self.device.clone(),
            verbose: log::log_enabled!(log::Level::Info),
            show_progress: self.show_progress,
        };

        let mut loader = self.train_data.to_loader_data()?;

        let losses = train_perturbation_model(
            &self.model,
            &self.varmap,
            &mut loader,
            &candle_nn::loss::mse,
            &train_config,
            &mut self.rng,
        )?;

        if let Some(last) = losses.last() {
            info!(
                "trained {} epochs, {} steps, last loss {}",
                tp.num_epochs,
                losses.len(),
                last
            );
        }

        Ok(TrainedExperiment {
            config: self.config,
            device: self.device,
            test_data: self.test_data,
            model: self.model,
            varmap: self.varmap,
            losses,
        })
    }
}

pub struct TrainedExperiment {
    config: ExperimentConfig,
    device: Device,
    test_data: MatchedDataset,
    model: PerturbModel,
    varmap: VarMap,
    losses: Vec<f32>,
}

impl TrainedExperiment {
    /// loss of every minibatch step
    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    pub fn write_losses<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        write_lines(&self.losses, file_path)
    }

    /// Save the model parameters (safetensors)
    pub fn save_parameters<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        self.varmap.save(file_path.as_ref())?;
        Ok(())
    }

    /// Predict every test sample in dataset order without dropout
    pub fn evaluate(self) -> anyhow::Result<EvaluatedExperiment> {
        let nn = self.test_data.len();
        let mut loader = self.test_data.to_loader_data()?;

        let pred = if nn > 0 {
            predict_perturbation(
                &self.model,
                &mut loader,
                nn,
                self.config.train_params.batch_size,
                &self.device,
            )?
        } else {
            Mat::zeros((0, self.model.dim_obs()))
        };

        let records = self
            .test_data
            .samples()
            .iter()
            .zip(pred.rows())
            .map(|(s, p)| ResultRecord {
                ctrl_emb: s.control.to_vec(),
                pert_emb: s.treated.to_vec(),
                pred_emb: p.to_vec(),
                compound: Some(s.meta.compound.clone()),
                dose: s.meta.dose,
                cell_type: s.meta.cell_type.clone(),
            })
            .collect();

        info!("evaluated {} test samples", nn);

        Ok(EvaluatedExperiment {
            losses: self.losses,
            results: ResultTable::new(records),
        })
    }
}

pub struct EvaluatedExperiment {
    losses: Vec<f32>,
    results: ResultTable,
}

impl EvaluatedExperiment {
    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    pub fn results(&self) -> &ResultTable {
        &self.results
    }

    /// Write the results in the format of the file suffix
    pub fn persist<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        self.results.to_file(file_path)
    }
}
