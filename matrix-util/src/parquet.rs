use log::warn;
use parquet::basic::Type as ParquetType;
use parquet::basic::{Compression, ConvertedType, Repetition, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::types::Type;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// get field names by peeking into `file_path`
pub fn peek_parquet_field_names<P: AsRef<Path>>(file_path: P) -> anyhow::Result<Vec<Box<str>>> {
    let file = File::open(file_path)?;
    let reader = SerializedFileReader::new(file)?;
    let metadata = reader.metadata();
    let fields = metadata.file_metadata().schema().get_fields();

    Ok(fields
        .iter()
        .map(|f| f.name().to_string().into_boxed_str())
        .collect())
}

/// A column of a mixed-type table
#[derive(Clone, Debug, PartialEq)]
pub enum FrameColumn {
    Text(Vec<Box<str>>),
    Numeric(Vec<f64>),
}

impl FrameColumn {
    pub fn len(&self) -> usize {
        match self {
            FrameColumn::Text(x) => x.len(),
            FrameColumn::Numeric(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

///
/// A table with named rows and a mix of string and numeric columns,
/// e.g., cell metadata kept next to an embedding matrix. String
/// columns are `BYTE_ARRAY` (UTF8); numeric columns are read from any
/// of `FLOAT`, `DOUBLE`, `INT32`, `INT64` and written as `DOUBLE`.
///
#[derive(Clone, Debug, Default)]
pub struct ParquetFrame {
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
    pub columns: Vec<FrameColumn>,
}

enum FieldKind {
    Text,
    Float,
    Double,
    Int32,
    Int64,
}

impl ParquetFrame {
    pub fn new(row_names: Vec<Box<str>>) -> Self {
        Self {
            row_names,
            column_names: vec![],
            columns: vec![],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.row_names.len()
    }

    /// Append a column; its length must match the number of rows
    pub fn push_column(&mut self, name: &str, column: FrameColumn) -> anyhow::Result<()> {
        if column.len() != self.num_rows() {
            return Err(anyhow::anyhow!(
                "column {} has {} values, but the frame has {} rows",
                name,
                column.len(),
                self.num_rows()
            ));
        }
        if self.column_index(name).is_some() {
            return Err(anyhow::anyhow!("duplicate column name: {}", name));
        }
        self.column_names.push(name.to_string().into_boxed_str());
        self.columns.push(column);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|x| x.as_ref() == name)
    }

    pub fn text_column(&self, name: &str) -> Option<&[Box<str>]> {
        match self.column_index(name).map(|j| &self.columns[j]) {
            Some(FrameColumn::Text(x)) => Some(x),
            _ => None,
        }
    }

    pub fn numeric_column(&self, name: &str) -> Option<&[f64]> {
        match self.column_index(name).map(|j| &self.columns[j]) {
            Some(FrameColumn::Numeric(x)) => Some(x),
            _ => None,
        }
    }

    /// Names of the numeric columns in file order, skipping `exclude`
    pub fn numeric_column_names(&self, exclude: &[&str]) -> Vec<Box<str>> {
        self.column_names
            .iter()
            .zip(self.columns.iter())
            .filter(|(name, col)| {
                matches!(col, FrameColumn::Numeric(_)) && !exclude.contains(&name.as_ref())
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    ///
    /// Read a parquet file
    ///
    /// * `row_name_index`: if `None`, the column `0` will be so.
    ///
    pub fn from_parquet<P: AsRef<Path>>(
        file_path: P,
        row_name_index: Option<usize>,
    ) -> anyhow::Result<Self> {
        let row_name_index = row_name_index.unwrap_or(0);

        let file = File::open(file_path.as_ref())?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();
        let nrows = metadata.file_metadata().num_rows() as usize;
        let fields = metadata.file_metadata().schema().get_fields();

        if row_name_index >= fields.len() {
            return Err(anyhow::anyhow!(
                "row name column {} is out of {} columns",
                row_name_index,
                fields.len()
            ));
        }

        let selected: Vec<(usize, FieldKind)> = fields
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != row_name_index)
            .filter_map(|(j, f)| {
                if !f.is_primitive() {
                    warn!("skip nested column {}", f.name());
                    return None;
                }
                let kind = match f.get_physical_type() {
                    ParquetType::BYTE_ARRAY => FieldKind::Text,
                    ParquetType::FLOAT => FieldKind::Float,
                    ParquetType::DOUBLE => FieldKind::Double,
                    ParquetType::INT32 => FieldKind::Int32,
                    ParquetType::INT64 => FieldKind::Int64,
                    other => {
                        warn!("skip column {} of type {:?}", f.name(), other);
                        return None;
                    }
                };
                Some((j, kind))
            })
            .collect();

        let mut frame = ParquetFrame {
            row_names: Vec::with_capacity(nrows),
            column_names: selected
                .iter()
                .map(|(j, _)| fields[*j].name().to_string().into_boxed_str())
                .collect(),
            columns: selected
                .iter()
                .map(|(_, kind)| match kind {
                    FieldKind::Text => FrameColumn::Text(Vec::with_capacity(nrows)),
                    _ => FrameColumn::Numeric(Vec::with_capacity(nrows)),
                })
                .collect(),
        };

        let row_iter = reader.get_row_iter(None)?;

        for record in row_iter {
            let row = record?;
            frame
                .row_names
                .push(row.get_string(row_name_index)?.clone().into_boxed_str());

            for ((j, kind), column) in selected.iter().zip(frame.columns.iter_mut()) {
                match (kind, column) {
                    (FieldKind::Text, FrameColumn::Text(v)) => {
                        v.push(row.get_string(*j)?.clone().into_boxed_str())
                    }
                    (FieldKind::Float, FrameColumn::Numeric(v)) => {
                        v.push(row.get_float(*j)? as f64)
                    }
                    (FieldKind::Double, FrameColumn::Numeric(v)) => v.push(row.get_double(*j)?),
                    (FieldKind::Int32, FrameColumn::Numeric(v)) => v.push(row.get_int(*j)? as f64),
                    (FieldKind::Int64, FrameColumn::Numeric(v)) => v.push(row.get_long(*j)? as f64),
                    _ => return Err(anyhow::anyhow!("column type changed while reading")),
                }
            }
        }

        Ok(frame)
    }

    ///
    /// Write down the frame in one row group with ZSTD compression
    ///
    /// * `file_path`: output file path
    /// * `row_name_column`: name of the first (row name) column
    ///
    pub fn to_parquet<P: AsRef<Path>>(
        &self,
        file_path: P,
        row_name_column: &str,
    ) -> anyhow::Result<()> {
        let schema = self.build_schema(row_name_column)?;

        let file = File::create(file_path.as_ref())?;
        let zstd_level = ZstdLevel::try_new(5)?;
        let writer_properties = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::ZSTD(zstd_level))
                .build(),
        );

        let mut writer = SerializedFileWriter::new(file, schema, writer_properties)?;
        let mut row_group = writer.next_row_group()?;

        let rows: Vec<ByteArray> = self
            .row_names
            .iter()
            .map(|r| ByteArray::from(r.as_ref()))
            .collect();

        if let Some(mut col_writer) = row_group.next_column()? {
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&rows, None, None)?;
            col_writer.close()?;
        }

        for column in self.columns.iter() {
            if let Some(mut col_writer) = row_group.next_column()? {
                match column {
                    FrameColumn::Text(values) => {
                        let values: Vec<ByteArray> =
                            values.iter().map(|x| ByteArray::from(x.as_ref())).collect();
                        col_writer
                            .typed::<ByteArrayType>()
                            .write_batch(&values, None, None)?;
                    }
                    FrameColumn::Numeric(values) => {
                        col_writer
                            .typed::<DoubleType>()
                            .write_batch(values, None, None)?;
                    }
                }
                col_writer.close()?;
            }
        }

        row_group.close()?;
        writer.close()?;
        Ok(())
    }

    fn build_schema(&self, row_name_column: &str) -> anyhow::Result<Arc<Type>> {
        let mut fields = vec![Arc::new(
            Type::primitive_type_builder(row_name_column, ParquetType::BYTE_ARRAY)
                .with_repetition(Repetition::REQUIRED)
                .with_converted_type(ConvertedType::UTF8)
                .build()?,
        )];

        for (name, column) in self.column_names.iter().zip(self.columns.iter()) {
            let field = match column {
                FrameColumn::Text(_) => Type::primitive_type_builder(name, ParquetType::BYTE_ARRAY)
                    .with_repetition(Repetition::REQUIRED)
                    .with_converted_type(ConvertedType::UTF8)
                    .build()?,
                FrameColumn::Numeric(_) => Type::primitive_type_builder(name, ParquetType::DOUBLE)
                    .with_repetition(Repetition::REQUIRED)
                    .build()?,
            };
            fields.push(Arc::new(field));
        }

        Ok(Arc::new(
            Type::group_type_builder("frame")
                .with_fields(fields)
                .build()?,
        ))
    }
}
