use crate::candle_data_loader::*;
use crate::candle_model_traits::PerturbationModuleT;

use candle_core::{Device, Result, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use ndarray::Array2;
use rand::Rng;

/// report the minibatch loss every this many iterations
pub const LOG_EVERY_ITER: usize = 10;

pub struct TrainConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub device: Device,
    pub verbose: bool,
    pub show_progress: bool,
}

///
/// Fit a perturbation model by minibatch gradient descent (AdamW).
/// Every epoch reshuffles the data. There is no early stopping.
///
/// * `model` - forward `(control, drug, log_dose)` to a prediction
/// * `variable_map` - all the trainable parameters of the `model`
/// * `data` - data loader
/// * `loss_fn` - fn (prediction, target) -> scalar loss
/// * `train_config` - training configuration
/// * `rng` - random generator for shuffling
///
/// Returns the loss of every minibatch step in order.
///
pub fn train_perturbation_model<Model, DataL, LossFn, R>(
    model: &Model,
    variable_map: &candle_nn::VarMap,
    data: &mut DataL,
    loss_fn: &LossFn,
    train_config: &TrainConfig,
    rng: &mut R,
) -> anyhow::Result<Vec<f32>>
where
    Model: PerturbationModuleT,
    DataL: DataLoader,
    LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    R: Rng + ?Sized,
{
    let device = &train_config.device;

    let mut adam = AdamW::new(
        variable_map.all_vars(),
        ParamsAdamW {
            lr: train_config.learning_rate,
            weight_decay: train_config.weight_decay,
            ..Default::default()
        },
    )?;

    let pb = ProgressBar::new(train_config.num_epochs as u64);

    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut loss_trace = vec![];
    let mut iteration = 0_usize;

    for epoch in 0..train_config.num_epochs {
        data.shuffle_minibatch(train_config.batch_size, rng)?;

        for b in 0..data.num_minibatch() {
            let mb = data.minibatch_data(b, device)?;
            let pred = model.forward_t(&mb.control, &mb.drug, &mb.log_dose, true)?;
            let loss = loss_fn(&pred, &mb.treated)?;
            adam.backward_step(&loss)?;

            let loss_val = loss.to_scalar::<f32>()?;
            loss_trace.push(loss_val);
            iteration += 1;

            if iteration % LOG_EVERY_ITER == 0 {
                info!(
                    "[{}/{}] iteration {}, loss: {}",
                    epoch + 1,
                    train_config.num_epochs,
                    iteration,
                    loss_val
                );
            }
        }
        pb.inc(1);
    } // each epoch

    pb.finish_and_clear();
    Ok(loss_trace)
}

///
/// Predict treated embeddings for all the samples in the original
/// order, without dropout
///
/// * `model` - a fitted perturbation model
/// * `data` - data loader (minibatches will be reset)
/// * `batch_size` - number of samples per forward pass
/// * `device` - target device
///
/// Returns `n x d` predictions, the row `i` for the sample `i`.
///
pub fn predict_perturbation<Model, DataL>(
    model: &Model,
    data: &mut DataL,
    num_samples: usize,
    batch_size: usize,
    device: &Device,
) -> anyhow::Result<Array2<f32>>
where
    Model: PerturbationModuleT,
    DataL: DataLoader,
{
    data.ordered_minibatch(batch_size)?;

    let mut pred_nd = Array2::<f32>::zeros((num_samples, model.dim_obs()));

    for b in 0..data.num_minibatch() {
        let mb = data.minibatch_data(b, device)?;
        let pred = model
            .forward_t(&mb.control, &mb.drug, &mb.log_dose, false)?
            .detach()
            .to_device(&Device::Cpu)?
            .to_vec2::<f32>()?;

        for (row, &i) in pred.into_iter().zip(mb.samples.iter()) {
            if i >= num_samples || row.len() != model.dim_obs() {
                return Err(anyhow::anyhow!(
                    "prediction for sample {} does not fit {} x {}",
                    i,
                    num_samples,
                    model.dim_obs()
                ));
            }
            pred_nd
                .row_mut(i)
                .iter_mut()
                .zip(row)
                .for_each(|(p, x)| *p = x);
        }
    }

    Ok(pred_nd)
}
