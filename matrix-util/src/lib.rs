pub mod common_io; // plain and gzipped line files
pub mod ndarray_dist; // distances between point sets
pub mod parquet; // mixed-type parquet tables
pub mod traits;
