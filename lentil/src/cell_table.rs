use crate::common::*;

use matrix_util::parquet::{FrameColumn, ParquetFrame};
use std::path::Path;

/// Per-cell annotation of the source table
#[derive(Clone, Debug, PartialEq)]
pub struct CellMeta {
    pub cell_name: Box<str>,
    pub cell_type: Box<str>,
    /// drug name or [`VEHICLE`]
    pub product_name: Box<str>,
    pub dose: f64,
    /// literal list of reals, e.g. `[0.1, -2, 3e-1]`
    pub sm_embedding: Box<str>,
}

impl CellMeta {
    pub fn is_control(&self) -> bool {
        self.product_name.as_ref() == VEHICLE
    }

    /// `ln(1 + dose)`
    pub fn log_dose(&self) -> f32 {
        self.dose.ln_1p() as f32
    }
}

///
/// Cells with their annotations and a dense `cells x features`
/// expression embedding. Row `i` of `expression` belongs to `cells[i]`.
///
#[derive(Clone, Debug)]
pub struct CellTable {
    cells: Vec<CellMeta>,
    expression: Mat,
    feature_names: Vec<Box<str>>,
}

impl CellTable {
    pub fn new(
        cells: Vec<CellMeta>,
        expression: Mat,
        feature_names: Vec<Box<str>>,
    ) -> anyhow::Result<Self> {
        if cells.len() != expression.nrows() {
            return Err(PerturbError::ShapeMismatch(format!(
                "{} cells vs. {} expression rows",
                cells.len(),
                expression.nrows()
            ))
            .into());
        }

        if feature_names.len() != expression.ncols() {
            return Err(PerturbError::ShapeMismatch(format!(
                "{} feature names vs. {} expression columns",
                feature_names.len(),
                expression.ncols()
            ))
            .into());
        }

        if let Some(bad) = cells.iter().find(|c| !(c.dose.is_finite() && c.dose >= 0.)) {
            return Err(PerturbError::InvalidDose {
                cell: bad.cell_name.to_string(),
                dose: bad.dose,
            }
            .into());
        }

        Ok(Self {
            cells,
            expression,
            feature_names,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn num_features(&self) -> usize {
        self.expression.ncols()
    }

    pub fn cells(&self) -> &[CellMeta] {
        &self.cells
    }

    pub fn cell(&self, i: usize) -> &CellMeta {
        &self.cells[i]
    }

    pub fn expression(&self) -> &Mat {
        &self.expression
    }

    pub fn feature_names(&self) -> &[Box<str>] {
        &self.feature_names
    }

    ///
    /// Read a cell table from parquet. The column `0` holds cell
    /// names; `cell_type`, `product_name`, `sm_embedding` (strings)
    /// and `dose` (numeric) are required; every other numeric column
    /// is an expression feature in file order.
    ///
    pub fn from_parquet<P: AsRef<Path>>(file_path: P) -> anyhow::Result<Self> {
        let frame = ParquetFrame::from_parquet(file_path.as_ref(), Some(0))?;
        let nn = frame.num_rows();

        let cell_type = required_text(&frame, COL_CELL_TYPE)?;
        let product_name = required_text(&frame, COL_PRODUCT_NAME)?;
        let sm_embedding = required_text(&frame, COL_SM_EMBEDDING)?;
        let dose = frame
            .numeric_column(COL_DOSE)
            .ok_or_else(|| PerturbError::MissingColumn(COL_DOSE.to_string()))?;

        let feature_names = frame.numeric_column_names(&[COL_DOSE]);
        if feature_names.is_empty() {
            return Err(PerturbError::MissingColumn("expression features".into()).into());
        }

        let features = feature_names
            .iter()
            .map(|f| {
                frame
                    .numeric_column(f)
                    .ok_or_else(|| PerturbError::MissingColumn(f.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let expression = Mat::from_shape_fn((nn, features.len()), |(i, j)| features[j][i] as f32);

        let cells = (0..nn)
            .map(|i| CellMeta {
                cell_name: frame.row_names[i].clone(),
                cell_type: cell_type[i].clone(),
                product_name: product_name[i].clone(),
                dose: dose[i],
                sm_embedding: sm_embedding[i].clone(),
            })
            .collect();

        info!(
            "read {} cells x {} features from {}",
            nn,
            feature_names.len(),
            file_path.as_ref().display()
        );

        Self::new(cells, expression, feature_names)
    }

    /// Write down the table in the layout `from_parquet` reads
    pub fn to_parquet<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        let mut frame =
            ParquetFrame::new(self.cells.iter().map(|c| c.cell_name.clone()).collect());

        let cells = &self.cells;
        frame.push_column(
            COL_CELL_TYPE,
            FrameColumn::Text(cells.iter().map(|c| c.cell_type.clone()).collect()),
        )?;
        frame.push_column(
            COL_PRODUCT_NAME,
            FrameColumn::Text(cells.iter().map(|c| c.product_name.clone()).collect()),
        )?;
        frame.push_column(
            COL_DOSE,
            FrameColumn::Numeric(cells.iter().map(|c| c.dose).collect()),
        )?;
        frame.push_column(
            COL_SM_EMBEDDING,
            FrameColumn::Text(cells.iter().map(|c| c.sm_embedding.clone()).collect()),
        )?;

        for (name, column) in self.feature_names.iter().zip(self.expression.columns()) {
            frame.push_column(
                name,
                FrameColumn::Numeric(column.iter().map(|&x| x as f64).collect()),
            )?;
        }

        frame.to_parquet(file_path, "cell")
    }
}

fn required_text<'a>(frame: &'a ParquetFrame, name: &str) -> anyhow::Result<&'a [Box<str>]> {
    frame
        .text_column(name)
        .ok_or_else(|| PerturbError::MissingColumn(name.to_string()).into())
}

///
/// Decode a literal list of reals such as `"[0.1, -2, 3e-1]"`
/// (parentheses are accepted too)
///
pub fn decode_drug_embedding(literal: &str) -> anyhow::Result<Vec<f32>> {
    let malformed = |reason: String| PerturbError::MalformedDrugEmbedding {
        literal: literal.to_string(),
        reason,
    };

    let s = literal.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|x| x.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|x| x.strip_suffix(')')))
        .ok_or_else(|| malformed("expected a bracketed list".into()))?
        .trim();

    if inner.is_empty() {
        return Ok(vec![]);
    }

    let inner = inner.strip_suffix(',').unwrap_or(inner);

    inner
        .split(',')
        .map(|tok| {
            let tok = tok.trim();
            let x: f64 = tok
                .parse()
                .map_err(|_| malformed(format!("not a number: {:?}", tok)))?;
            if !x.is_finite() {
                return Err(malformed(format!("not finite: {:?}", tok)));
            }
            Ok(x as f32)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(anyhow::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, dose: f64) -> CellMeta {
        CellMeta {
            cell_name: name.into(),
            cell_type: "A549".into(),
            product_name: VEHICLE.into(),
            dose,
            sm_embedding: "[]".into(),
        }
    }

    #[test]
    fn drug_literals() -> anyhow::Result<()> {
        assert_eq!(decode_drug_embedding("[0.1, -2, 3e-1]")?, vec![0.1, -2., 0.3]);
        assert_eq!(decode_drug_embedding(" (1,2,) ")?, vec![1., 2.]);
        assert!(decode_drug_embedding("[]")?.is_empty());

        for bad in ["0.1, 2", "[0.1, x]", "[1,,2]", "[nan]", ""] {
            let err = decode_drug_embedding(bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PerturbError>(),
                Some(PerturbError::MalformedDrugEmbedding { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn log_dose_is_log1p() {
        assert_eq!(meta("a", 0.).log_dose(), 0.);
        approx::assert_abs_diff_eq!(meta("a", 9.).log_dose(), 10_f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let names = || vec!["g1".into(), "g2".into()];

        let ok = CellTable::new(vec![meta("a", 1.)], Mat::zeros((1, 2)), names());
        assert!(ok.is_ok());

        let rows = CellTable::new(vec![meta("a", 1.)], Mat::zeros((2, 2)), names());
        assert!(matches!(
            rows.unwrap_err().downcast_ref::<PerturbError>(),
            Some(PerturbError::ShapeMismatch(_))
        ));

        let dose = CellTable::new(vec![meta("a", -1.)], Mat::zeros((1, 1)), vec!["g1".into()]);
        assert!(matches!(
            dose.unwrap_err().downcast_ref::<PerturbError>(),
            Some(PerturbError::InvalidDose { .. })
        ));
    }
}
