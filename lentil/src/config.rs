use crate::common::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where tensors live during training and evaluation
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// CUDA if available, else Metal if available, else CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Film,
    Concat,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatasetParams {
    /// cell table (parquet)
    pub sciplex_adata_path: Box<str>,
    /// explicit train compound list
    #[serde(default)]
    pub sciplex_drugs_train: Option<Box<str>>,
    /// explicit test compound list
    #[serde(default)]
    pub sciplex_drugs_test: Option<Box<str>>,
    #[serde(default = "default_pct_train")]
    pub pct_train: f64,
    #[serde(default)]
    pub split_seed: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TrainParams {
    pub lr: f64,
    #[serde(default)]
    pub weight_decay: f64,
    pub batch_size: usize,
    pub num_epochs: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelParams {
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            hidden_dim: default_hidden_dim(),
            num_layers: default_num_layers(),
            dropout: default_dropout(),
        }
    }
}

fn default_pct_train() -> f64 {
    0.8
}

fn default_hidden_dim() -> usize {
    128
}

fn default_num_layers() -> usize {
    2
}

fn default_dropout() -> f32 {
    0.1
}

///
/// Experiment configuration document
///
/// ```yaml
/// dataset_params:
///   sciplex_adata_path: sim.parquet
///   pct_train: 0.8
///   split_seed: 42
/// train_params: { lr: 1.0e-3, weight_decay: 1.0e-5, batch_size: 64, num_epochs: 10 }
/// model_params: { kind: film, hidden_dim: 128, num_layers: 2, dropout: 0.1 }
/// device: auto
/// seed: 0
/// ```
///
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub dataset_params: DatasetParams,
    pub train_params: TrainParams,
    #[serde(default)]
    pub model_params: ModelParams,
    #[serde(default)]
    pub device: ComputeDevice,
    #[serde(default)]
    pub seed: u64,
}

impl ExperimentConfig {
    pub fn from_file<P: AsRef<Path>>(config_file: P) -> anyhow::Result<Self> {
        let path = config_file.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PerturbError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml(&text)?;

        // relative paths are resolved against the config file's directory
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            let resolve = |p: &str| -> Box<str> {
                if Path::new(p).is_absolute() {
                    p.into()
                } else {
                    dir.join(p).to_string_lossy().into()
                }
            };
            let ds = &mut config.dataset_params;
            ds.sciplex_adata_path = resolve(&ds.sciplex_adata_path);
            ds.sciplex_drugs_train = ds.sciplex_drugs_train.as_deref().map(resolve);
            ds.sciplex_drugs_test = ds.sciplex_drugs_test.as_deref().map(resolve);
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| PerturbError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Explicit train/test compound lists, if both are given
    pub fn explicit_lists(&self) -> Option<(&str, &str)> {
        match (
            self.dataset_params.sciplex_drugs_train.as_deref(),
            self.dataset_params.sciplex_drugs_test.as_deref(),
        ) {
            (Some(train), Some(test)) => Some((train, test)),
            _ => None,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let tp = &self.train_params;
        if tp.batch_size == 0 {
            return Err(PerturbError::Config("batch_size must be positive".into()).into());
        }
        if !(tp.lr.is_finite() && tp.lr > 0.) {
            return Err(PerturbError::Config(format!("invalid learning rate {}", tp.lr)).into());
        }
        if !(tp.weight_decay.is_finite() && tp.weight_decay >= 0.) {
            return Err(PerturbError::Config(format!(
                "invalid weight decay {}",
                tp.weight_decay
            ))
            .into());
        }

        let mp = &self.model_params;
        if mp.hidden_dim == 0 {
            return Err(PerturbError::Config("hidden_dim must be positive".into()).into());
        }
        if !(0. ..1.).contains(&mp.dropout) {
            return Err(
                PerturbError::Config(format!("dropout {} not in [0, 1)", mp.dropout)).into(),
            );
        }

        let ds = &self.dataset_params;
        if ds.sciplex_drugs_train.is_some() != ds.sciplex_drugs_test.is_some() {
            return Err(PerturbError::Config(
                "sciplex_drugs_train and sciplex_drugs_test go together".into(),
            )
            .into());
        }
        Ok(())
    }
}
