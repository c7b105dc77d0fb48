use candle_core::{Result, Tensor};

pub trait PerturbationModuleT {
    /// Predict the perturbed expression embedding of a minibatch
    ///
    /// # Arguments
    /// * `control_nd` - matched control embedding (n x d)
    /// * `drug_np` - drug (small molecule) embedding (n x p)
    /// * `log_dose_n1` - `ln(1 + dose)` (n x 1)
    /// * `train` - whether to use dropout or not
    ///
    /// # Returns `pred_nd` - predicted treated embedding (n x d)
    fn forward_t(
        &self,
        control_nd: &Tensor,
        drug_np: &Tensor,
        log_dose_n1: &Tensor,
        train: bool,
    ) -> Result<Tensor>;

    /// width of the expression embedding
    fn dim_obs(&self) -> usize;

    /// width of the drug embedding
    fn dim_drug(&self) -> usize;
}
