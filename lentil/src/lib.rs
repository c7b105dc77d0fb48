pub mod cell_table; // cells, doses, drug literals and expression
pub mod common;
pub mod config; // yaml experiment configuration
pub mod control_match; // treated cells paired with random controls
pub mod edist_stats; // energy distance per cell type and compound
pub mod error;
pub mod harness; // configure -> train -> evaluate -> persist
pub mod results; // csv/tsv/json/bin result tables
pub mod sample_access;
pub mod simulate; // synthetic cell tables
pub mod split; // compound-level train/test splits
