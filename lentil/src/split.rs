use crate::common::*;
use crate::control_match::MatchedDataset;

use matrix_util::common_io::read_names;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Which treated cells a dataset build keeps
#[derive(Clone, Debug, Default)]
pub enum InclusionPolicy {
    /// every treated cell
    #[default]
    All,
    /// only the cells treated with one of these compounds
    Compounds(HashSet<Box<str>>),
}

impl InclusionPolicy {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Compounds(names.into_iter().map(|x| x.as_ref().into()).collect())
    }

    /// Read compound names, one per line (blank lines are skipped)
    pub fn from_file<P: AsRef<Path>>(list_file: P) -> anyhow::Result<Self> {
        let names = read_names(list_file.as_ref())?;
        info!(
            "read {} compound names from {}",
            names.len(),
            list_file.as_ref().display()
        );
        Ok(Self::Compounds(names.into_iter().collect()))
    }

    pub fn includes(&self, compound: &str) -> bool {
        match self {
            Self::All => true,
            Self::Compounds(names) => names.contains(compound),
        }
    }

    /// Compounds named by both policies, sorted
    pub fn overlap(&self, other: &Self) -> Vec<Box<str>> {
        match (self, other) {
            (Self::Compounds(a), Self::Compounds(b)) => a
                .intersection(b)
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            _ => vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitSide {
    Train,
    Test,
}

/// Compound-level partition; samples follow their compound
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitAssignment {
    pub train: BTreeSet<Box<str>>,
    pub test: BTreeSet<Box<str>>,
}

impl SplitAssignment {
    pub fn side_of(&self, compound: &str) -> Option<SplitSide> {
        if self.train.contains(compound) {
            Some(SplitSide::Train)
        } else if self.test.contains(compound) {
            Some(SplitSide::Test)
        } else {
            None
        }
    }

    /// Samples of the `side` in their original order
    pub fn select(&self, dataset: &MatchedDataset, side: SplitSide) -> MatchedDataset {
        dataset.filter(|s| self.side_of(&s.meta.compound) == Some(side))
    }
}

///
/// Split distinct compound names at random: sort, shuffle with a
/// seeded generator, and put the first `floor(train_fraction * n)`
/// names in the train set.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomSplit {
    pub train_fraction: f64,
    pub seed: u64,
}

impl RandomSplit {
    pub fn new(train_fraction: f64, seed: u64) -> anyhow::Result<Self> {
        if !(train_fraction > 0. && train_fraction < 1.) {
            return Err(PerturbError::Config(format!(
                "train fraction {} is not in (0, 1)",
                train_fraction
            ))
            .into());
        }
        Ok(Self {
            train_fraction,
            seed,
        })
    }

    pub fn assign<I, S>(&self, names: I) -> anyhow::Result<SplitAssignment>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<Box<str>> = names
            .into_iter()
            .map(|x| Box::from(x.as_ref()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let nn = names.len();
        let ntrain = (self.train_fraction * nn as f64).floor() as usize;

        if ntrain == 0 || ntrain >= nn {
            return Err(PerturbError::Config(format!(
                "cannot split {} compounds with train fraction {}",
                nn, self.train_fraction
            ))
            .into());
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        names.shuffle(&mut rng);
        let test = names.split_off(ntrain);

        Ok(SplitAssignment {
            train: names.into_iter().collect(),
            test: test.into_iter().collect(),
        })
    }

    /// `(train, test)` datasets split by compound
    pub fn split_dataset(
        &self,
        dataset: &MatchedDataset,
    ) -> anyhow::Result<(MatchedDataset, MatchedDataset)> {
        let assignment = self.assign(dataset.compounds())?;
        info!(
            "random split: {} train / {} test compounds",
            assignment.train.len(),
            assignment.test.len()
        );
        Ok((
            assignment.select(dataset, SplitSide::Train),
            assignment.select(dataset, SplitSide::Test),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_config_error;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("drug{}", i)).collect()
    }

    #[test]
    fn sizes_follow_floor() -> anyhow::Result<()> {
        let split = RandomSplit::new(0.75, 1)?.assign(names(10))?;
        assert_eq!(split.train.len(), 7);
        assert_eq!(split.test.len(), 3);
        assert!(split.train.is_disjoint(&split.test));
        Ok(())
    }

    #[test]
    fn same_seed_same_split_regardless_of_input_order() -> anyhow::Result<()> {
        let forward = names(20);
        let mut backward = forward.clone();
        backward.reverse();
        backward.extend(forward.iter().take(5).cloned());

        let a = RandomSplit::new(0.5, 42)?.assign(&forward)?;
        let b = RandomSplit::new(0.5, 42)?.assign(&backward)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn degenerate_splits_are_config_errors() {
        assert!(is_config_error(&RandomSplit::new(0., 0).unwrap_err()));
        assert!(is_config_error(&RandomSplit::new(1., 0).unwrap_err()));
        assert!(is_config_error(&RandomSplit::new(f64::NAN, 0).unwrap_err()));

        let single = RandomSplit { train_fraction: 0.8, seed: 0 };
        assert!(is_config_error(&single.assign(["only"]).unwrap_err()));
    }

    #[test]
    fn inclusion_lists() {
        let a = InclusionPolicy::from_names(["x", "y"]);
        let b = InclusionPolicy::from_names(["y", "z"]);
        assert!(a.includes("x"));
        assert!(!a.includes("z"));
        assert!(InclusionPolicy::All.includes("anything"));
        assert_eq!(a.overlap(&b), vec![Box::<str>::from("y")]);
        assert!(a.overlap(&InclusionPolicy::All).is_empty());
    }
}
