use candle_core::{Result, Tensor};
use candle_nn::{Activation, Dropout, Module, ModuleT, VarBuilder};

/// build a stack of alternating `M` and `A` layers, with an optional
/// dropout after each activation (only active in training)
pub struct StackLayers<M>
where
    M: Module,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
    dropout: Option<Dropout>,
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
            dropout: None,
        }
    }

    /// Drop hidden units with probability `p` during training
    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout = if p > 0. { Some(Dropout::new(p)) } else { None };
        self
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }

    /// * `train` - whether to apply dropout
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
                if let Some(dropout) = &self.dropout {
                    x = dropout.forward_t(&x, train)?;
                }
            }
        }
        Ok(x)
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

///
/// A multi-layer perceptron `in_dim -> hidden ... -> out_dim` with
/// ReLU between the layers and a linear last layer
///
/// * `vb` - variables will be named `{prefix}.{layer}`
///
pub fn relu_mlp(
    in_dim: usize,
    hidden_dims: &[usize],
    out_dim: usize,
    dropout: f32,
    vb: VarBuilder,
) -> Result<StackLayers<candle_nn::Linear>> {
    let mut layers = StackLayers::new().with_dropout(dropout);
    let mut prev_dim = in_dim;
    for (j, &dim) in hidden_dims.iter().enumerate() {
        let fc = candle_nn::linear(prev_dim, dim, vb.pp(format!("{}", j)))?;
        layers.push_with_act(fc, Activation::Relu);
        prev_dim = dim;
    }
    let last = candle_nn::linear(prev_dim, out_dim, vb.pp(format!("{}", hidden_dims.len())))?;
    layers.push(last);
    Ok(layers)
}
