use crate::traits::DistanceOps;
use ndarray::{ArrayBase, Axis, Data, Ix2};
use rayon::prelude::*;

/// Row blocks above this size are summed in parallel
const PAR_MIN_ROWS: usize = 256;

///
/// Average squared Euclidean distance over all pairs of rows
///
/// * `xx` - `n x d` points
/// * `yy` - `m x d` points
///
/// Accumulated in `f64` regardless of the element type.
///
pub fn mean_pairwise_sq_euclidean<S, T>(
    xx: &ArrayBase<S, Ix2>,
    yy: &ArrayBase<T, Ix2>,
) -> anyhow::Result<f64>
where
    S: Data<Elem = f32> + Sync,
    T: Data<Elem = f32> + Sync,
{
    let (nx, dx) = xx.dim();
    let (ny, dy) = yy.dim();

    if nx == 0 || ny == 0 {
        return Err(anyhow::anyhow!(
            "empty point set: {} x {} vs. {} x {}",
            nx,
            dx,
            ny,
            dy
        ));
    }

    if dx != dy {
        return Err(anyhow::anyhow!(
            "dimension mismatch: {} vs. {} columns",
            dx,
            dy
        ));
    }

    let row_sum = |i: usize| -> f64 {
        let x = xx.index_axis(Axis(0), i);
        yy.axis_iter(Axis(0))
            .map(|y| {
                x.iter()
                    .zip(y.iter())
                    .map(|(&a, &b)| {
                        let d = a as f64 - b as f64;
                        d * d
                    })
                    .sum::<f64>()
            })
            .sum::<f64>()
    };

    let tot: f64 = if nx >= PAR_MIN_ROWS {
        // collect first so the summation order does not depend on scheduling
        let partial: Vec<f64> = (0..nx).into_par_iter().map(row_sum).collect();
        partial.into_iter().sum()
    } else {
        (0..nx).map(row_sum).sum()
    };

    Ok(tot / (nx as f64 * ny as f64))
}

///
/// Energy distance between the row distributions of `xx` and `yy`
///
/// ```text
/// E(X,Y) = 2 * mean d2(X,Y) - mean d2(X,X) - mean d2(Y,Y)
/// ```
///
pub fn energy_distance<S, T>(xx: &ArrayBase<S, Ix2>, yy: &ArrayBase<T, Ix2>) -> anyhow::Result<f64>
where
    S: Data<Elem = f32> + Sync,
    T: Data<Elem = f32> + Sync,
{
    let delta = mean_pairwise_sq_euclidean(xx, yy)?;
    let sigma_x = mean_pairwise_sq_euclidean(xx, xx)?;
    let sigma_y = mean_pairwise_sq_euclidean(yy, yy)?;
    Ok(2.0 * delta - sigma_x - sigma_y)
}

impl<S> DistanceOps for ArrayBase<S, Ix2>
where
    S: Data<Elem = f32> + Sync,
{
    type Scalar = f64;
    type Other = Self;

    fn mean_sq_euclidean(&self, other: &Self) -> anyhow::Result<f64> {
        mean_pairwise_sq_euclidean(self, other)
    }

    fn energy_distance(&self, other: &Self) -> anyhow::Result<f64> {
        energy_distance(self, other)
    }
}
