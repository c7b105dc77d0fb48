use crate::candle_aux_layers::*;
use crate::candle_model_traits::PerturbationModuleT;

use candle_core::{Result, Tensor};
use candle_nn::{Activation, Dropout, Linear, Module, ModuleT, VarBuilder};

/// Hyper-parameters shared by the perturbation models
#[derive(Clone, Debug)]
pub struct PerturbModelArgs {
    pub dim_obs: usize,
    pub dim_drug: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub dropout: f32,
}

////////////////////////////////////////////////
// FiLM: feature-wise modulation by the drug  //
////////////////////////////////////////////////

///
/// A residual model where the drug and dose produce a feature-wise
/// scale and shift (FiLM) of a hidden representation of the control
/// cell:
///
/// ```text
/// c = condition([drug, log_dose])
/// h = relu(W x_ctrl)
/// h = (1 + gamma(c)) * h + beta(c)
/// x_pred = x_ctrl + decoder(h)
/// ```
///
pub struct FilmResidualModel {
    dim_obs: usize,
    dim_drug: usize,
    control_proj: Linear,
    condition: StackLayers<Linear>,
    film_gamma: Linear,
    film_beta: Linear,
    dropout: Dropout,
    decoder: StackLayers<Linear>,
}

impl FilmResidualModel {
    pub fn new(args: &PerturbModelArgs, vb: VarBuilder) -> Result<Self> {
        let hh = args.hidden_dim;
        let hidden = vec![hh; args.num_layers.saturating_sub(1)];

        let control_proj = candle_nn::linear(args.dim_obs, hh, vb.pp("control"))?;

        let mut condition = StackLayers::new();
        condition.push_with_act(
            candle_nn::linear(args.dim_drug + 1, hh, vb.pp("condition.0"))?,
            Activation::Relu,
        );

        let film_gamma = candle_nn::linear(hh, hh, vb.pp("film.gamma"))?;
        let film_beta = candle_nn::linear(hh, hh, vb.pp("film.beta"))?;

        let decoder = relu_mlp(hh, &hidden, args.dim_obs, args.dropout, vb.pp("decoder"))?;

        Ok(Self {
            dim_obs: args.dim_obs,
            dim_drug: args.dim_drug,
            control_proj,
            condition,
            film_gamma,
            film_beta,
            dropout: Dropout::new(args.dropout),
            decoder,
        })
    }
}

impl PerturbationModuleT for FilmResidualModel {
    fn forward_t(
        &self,
        control_nd: &Tensor,
        drug_np: &Tensor,
        log_dose_n1: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let cond_nh = self
            .condition
            .forward_t(&Tensor::cat(&[drug_np, log_dose_n1], 1)?, train)?;
        let gamma_nh = self.film_gamma.forward(&cond_nh)?;
        let beta_nh = self.film_beta.forward(&cond_nh)?;

        let h_nh = self.control_proj.forward(control_nd)?.relu()?;
        let h_nh = h_nh.mul(&(gamma_nh + 1.0)?)?.add(&beta_nh)?;
        let h_nh = self.dropout.forward_t(&h_nh, train)?;

        let delta_nd = self.decoder.forward_t(&h_nh, train)?;
        control_nd.add(&delta_nd)
    }

    fn dim_obs(&self) -> usize {
        self.dim_obs
    }

    fn dim_drug(&self) -> usize {
        self.dim_drug
    }
}

////////////////////////////////////////////////
// Baseline: MLP on the concatenated input    //
////////////////////////////////////////////////

///
/// Feed `[control, drug, log_dose]` through a ReLU network that
/// outputs the treated embedding directly
///
pub struct ConcatMlpModel {
    dim_obs: usize,
    dim_drug: usize,
    mlp: StackLayers<Linear>,
}

impl ConcatMlpModel {
    pub fn new(args: &PerturbModelArgs, vb: VarBuilder) -> Result<Self> {
        let hidden = vec![args.hidden_dim; args.num_layers.max(1)];
        let mlp = relu_mlp(
            args.dim_obs + args.dim_drug + 1,
            &hidden,
            args.dim_obs,
            args.dropout,
            vb.pp("mlp"),
        )?;
        Ok(Self {
            dim_obs: args.dim_obs,
            dim_drug: args.dim_drug,
            mlp,
        })
    }
}

impl PerturbationModuleT for ConcatMlpModel {
    fn forward_t(
        &self,
        control_nd: &Tensor,
        drug_np: &Tensor,
        log_dose_n1: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let x_nm = Tensor::cat(&[control_nd, drug_np, log_dose_n1], 1)?;
        self.mlp.forward_t(&x_nm, train)
    }

    fn dim_obs(&self) -> usize {
        self.dim_obs
    }

    fn dim_drug(&self) -> usize {
        self.dim_drug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn args() -> PerturbModelArgs {
        PerturbModelArgs {
            dim_obs: 6,
            dim_drug: 3,
            hidden_dim: 8,
            num_layers: 2,
            dropout: 0.2,
        }
    }

    fn inputs(dev: &Device) -> anyhow::Result<(Tensor, Tensor, Tensor)> {
        Ok((
            Tensor::randn(0_f32, 1_f32, (5, 6), dev)?,
            Tensor::randn(0_f32, 1_f32, (5, 3), dev)?,
            Tensor::ones((5, 1), DType::F32, dev)?,
        ))
    }

    #[test]
    fn film_output_has_control_shape() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let model = FilmResidualModel::new(&args(), vb)?;
        let (x, d, z) = inputs(&dev)?;
        let y = model.forward_t(&x, &d, &z, true)?;
        assert_eq!(y.dims(), &[5, 6]);
        assert_eq!(model.dim_obs(), 6);
        assert_eq!(model.dim_drug(), 3);
        assert!(!varmap.all_vars().is_empty());
        Ok(())
    }

    #[test]
    fn concat_output_has_control_shape() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let model = ConcatMlpModel::new(&args(), vb)?;
        let (x, d, z) = inputs(&dev)?;
        let y = model.forward_t(&x, &d, &z, false)?;
        assert_eq!(y.dims(), &[5, 6]);
        Ok(())
    }
}
