/// Distances between two point sets stored row-wise (`n x d`)
pub trait DistanceOps {
    type Scalar;
    type Other: ?Sized;

    /// Average of the squared Euclidean distances over all pairs of
    /// rows `(self[i,], other[j,])`
    fn mean_sq_euclidean(&self, other: &Self::Other) -> anyhow::Result<Self::Scalar>;

    /// Energy distance between the empirical distributions of the
    /// rows in `self` and the rows in `other`
    ///
    /// ```text
    /// E(X,Y) = 2 * mean d2(X,Y) - mean d2(X,X) - mean d2(Y,Y)
    /// ```
    fn energy_distance(&self, other: &Self::Other) -> anyhow::Result<Self::Scalar>;
}
