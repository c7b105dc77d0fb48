pub use log::{debug, info, warn};

pub use crate::error::PerturbError;

/// `product_name` of untreated control cells
pub const VEHICLE: &str = "Vehicle";

pub const COL_CELL_TYPE: &str = "cell_type";
pub const COL_PRODUCT_NAME: &str = "product_name";
pub const COL_DOSE: &str = "dose";
pub const COL_SM_EMBEDDING: &str = "sm_embedding";

pub type Mat = ndarray::Array2<f32>;
pub type DVec = ndarray::Array1<f32>;

pub use candle_util::{candle_core, candle_nn};
