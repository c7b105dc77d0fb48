use lentil::cell_table::*;
use lentil::common::*;
use lentil::control_match::*;
use lentil::split::*;

use matrix_util::common_io::write_lines;
use rand::SeedableRng;
use std::collections::BTreeSet;

fn table(n_compounds: usize) -> anyhow::Result<CellTable> {
    let mut cells = vec![];
    for ct in ["A", "B"] {
        for _ in 0..3 {
            cells.push(CellMeta {
                cell_name: format!("c{}", cells.len()).into(),
                cell_type: ct.into(),
                product_name: VEHICLE.into(),
                dose: 0.,
                sm_embedding: "[]".into(),
            });
        }
        for c in 0..n_compounds {
            for _ in 0..2 {
                cells.push(CellMeta {
                    cell_name: format!("c{}", cells.len()).into(),
                    cell_type: ct.into(),
                    product_name: format!("drug{}", c).into(),
                    dose: 1.,
                    sm_embedding: format!("[{}, 1]", c).into(),
                });
            }
        }
    }
    let nn = cells.len();
    CellTable::new(cells, Mat::zeros((nn, 2)), vec!["x".into(), "y".into()])
}

fn compounds_of(data: &MatchedDataset) -> BTreeSet<Box<str>> {
    data.samples().iter().map(|s| s.meta.compound.clone()).collect()
}

#[test]
fn random_split_has_no_leakage() -> anyhow::Result<()> {
    let table = table(10)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let full = MatchedDataset::build(&table, &InclusionPolicy::All, &mut rng)?;

    let (train, test) = RandomSplit::new(0.8, 3)?.split_dataset(&full)?;
    let train_names = compounds_of(&train);
    let test_names = compounds_of(&test);

    assert_eq!(train_names.len(), 8);
    assert_eq!(test_names.len(), 2);
    assert!(train_names.is_disjoint(&test_names));
    assert_eq!(train.len() + test.len(), full.len());

    // every cell type of a compound goes to the same side
    assert_eq!(test.len(), 2 * 2 * 2);
    Ok(())
}

#[test]
fn random_split_is_reproducible() -> anyhow::Result<()> {
    let table = table(7)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let full = MatchedDataset::build(&table, &InclusionPolicy::All, &mut rng)?;

    let split = RandomSplit::new(0.5, 99)?;
    let (a, _) = split.split_dataset(&full)?;
    let (b, _) = split.split_dataset(&full)?;
    assert_eq!(compounds_of(&a), compounds_of(&b));

    let assignment = split.assign(full.compounds())?;
    assert_eq!(assignment.train.len(), 3);
    for s in a.samples() {
        assert_eq!(assignment.side_of(&s.meta.compound), Some(SplitSide::Train));
    }
    Ok(())
}

#[test]
fn explicit_lists_from_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let train_file = dir.path().join("train.txt");
    let test_file = dir.path().join("test.txt.gz");
    write_lines(&["drug0", "  drug1  ", "", "drug2"], &train_file)?;
    write_lines(&["drug3"], &test_file)?;

    let train_policy = InclusionPolicy::from_file(&train_file)?;
    let test_policy = InclusionPolicy::from_file(&test_file)?;
    assert!(train_policy.overlap(&test_policy).is_empty());

    let table = table(5)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let train = MatchedDataset::build(&table, &train_policy, &mut rng)?;
    let test = MatchedDataset::build(&table, &test_policy, &mut rng)?;

    let expected: BTreeSet<Box<str>> = ["drug0", "drug1", "drug2"]
        .into_iter()
        .map(Box::from)
        .collect();
    assert_eq!(compounds_of(&train), expected);
    assert_eq!(test.len(), 4);
    Ok(())
}

/// 3 cell types x (5 controls + 10 treated over 2 compounds)
fn two_compounds() -> anyhow::Result<CellTable> {
    let mut cells = vec![];
    for ct in ["A549", "K562", "MCF7"] {
        for _ in 0..5 {
            cells.push(CellMeta {
                cell_name: format!("c{}", cells.len()).into(),
                cell_type: ct.into(),
                product_name: VEHICLE.into(),
                dose: 0.,
                sm_embedding: "[]".into(),
            });
        }
        for t in 0..10 {
            let (compound, emb) = [("dA", "[1, 0]"), ("dB", "[0, 1]")][t % 2];
            cells.push(CellMeta {
                cell_name: format!("c{}", cells.len()).into(),
                cell_type: ct.into(),
                product_name: compound.into(),
                dose: 100.,
                sm_embedding: emb.into(),
            });
        }
    }
    let nn = cells.len();
    let features = (0..3).map(|j| format!("f{}", j).into()).collect();
    CellTable::new(cells, Mat::zeros((nn, 3)), features)
}

#[test]
fn half_split_of_two_compounds_keeps_whole_compounds() -> anyhow::Result<()> {
    let table = two_compounds()?;
    let split = RandomSplit::new(0.5, 0)?;

    let mut train_names = vec![];
    for match_seed in [0, 1, 2] {
        let mut rng = rand::rngs::StdRng::seed_from_u64(match_seed);
        let full = MatchedDataset::build(&table, &InclusionPolicy::All, &mut rng)?;
        assert_eq!(full.len(), 30);

        let (train, test) = split.split_dataset(&full)?;
        let train_set = compounds_of(&train);
        assert_eq!(train_set.len(), 1);
        assert_eq!(compounds_of(&test).len(), 1);
        assert!(train_set.is_disjoint(&compounds_of(&test)));

        // train holds every treated row of its compound
        let train_rows = (0..table.num_cells())
            .filter(|&i| train_set.contains(&table.cell(i).product_name))
            .count();
        assert_eq!(train.len(), train_rows);
        assert_eq!(train.len(), 15);
        assert_eq!(test.len(), 15);
        train_names.push(train_set);
    }
    assert!(train_names.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}
