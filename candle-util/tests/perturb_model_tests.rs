use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::*;
use candle_util::candle_inference::*;
use candle_util::candle_model_traits::PerturbationModuleT;
use candle_util::candle_perturb_models::*;
use ndarray::{Array1, Array2};
use rand::SeedableRng;

fn args(dropout: f32) -> PerturbModelArgs {
    PerturbModelArgs {
        dim_obs: 8,
        dim_drug: 4,
        hidden_dim: 32,
        num_layers: 2,
        dropout,
    }
}

#[test]
fn dropout_only_in_train_mode() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
    let model = FilmResidualModel::new(&args(0.5), vb)?;

    let x = Tensor::randn(0_f32, 1_f32, (16, 8), &dev)?;
    let d = Tensor::randn(0_f32, 1_f32, (16, 4), &dev)?;
    let z = Tensor::ones((16, 1), DType::F32, &dev)?;

    let eval_1 = model.forward_t(&x, &d, &z, false)?.to_vec2::<f32>()?;
    let eval_2 = model.forward_t(&x, &d, &z, false)?.to_vec2::<f32>()?;
    assert_eq!(eval_1, eval_2);

    let train_1 = model.forward_t(&x, &d, &z, true)?.to_vec2::<f32>()?;
    assert_ne!(eval_1, train_1);
    Ok(())
}

#[test]
fn concat_model_learns_a_dose_dependent_shift() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let nn = 64;

    let control = Array2::from_shape_fn((nn, 8), |(i, j)| ((i * 7 + j * 3) % 11) as f32 / 11.);
    let drug = Array2::from_shape_fn((nn, 4), |(i, j)| if i % 4 == j { 1. } else { 0. });
    let log_dose = Array1::from_shape_fn(nn, |i| ((i % 5) as f32).ln_1p());
    let treated = Array2::from_shape_fn((nn, 8), |(i, j)| {
        control[[i, j]] + log_dose[i] * (i % 4) as f32 * 0.25
    });
    let mut data =
        InMemoryPerturbData::new(control.clone(), drug.clone(), log_dose.clone(), treated)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
    let model = ConcatMlpModel::new(&args(0.), vb)?;

    let config = TrainConfig {
        learning_rate: 1e-2,
        weight_decay: 0.,
        batch_size: 16,
        num_epochs: 50,
        device: dev.clone(),
        verbose: false,
        show_progress: false,
    };

    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let trace = train_perturbation_model(
        &model,
        &varmap,
        &mut data,
        &candle_nn::loss::mse,
        &config,
        &mut rng,
    )?;
    assert_eq!(trace.len(), 50 * 4);

    let first: f32 = trace[..4].iter().sum::<f32>() / 4.;
    let last: f32 = trace[trace.len() - 4..].iter().sum::<f32>() / 4.;
    assert!(last < 0.5 * first, "{} vs. {}", first, last);

    let pred = predict_perturbation(&model, &mut data, nn, 10, &dev)?;
    assert_eq!(pred.dim(), (nn, 8));

    // batched prediction keeps every row in its sample position
    let to_tensor = |x: Array2<f32>| -> anyhow::Result<Tensor> {
        let shape = x.dim();
        let (vec, _) = x.into_raw_vec_and_offset();
        Ok(Tensor::from_vec(vec, shape, &dev)?)
    };
    let z = Tensor::from_vec(log_dose.to_vec(), (nn, 1), &dev)?;
    let direct = model
        .forward_t(&to_tensor(control)?, &to_tensor(drug)?, &z, false)?
        .to_vec2::<f32>()?;
    for (i, row) in direct.iter().enumerate() {
        for (j, &x) in row.iter().enumerate() {
            assert_abs_diff_eq!(pred[[i, j]], x, epsilon = 1e-5);
        }
    }
    Ok(())
}
