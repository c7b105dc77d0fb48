use crate::common::*;

use matrix_util::common_io::{file_ext, mkdir, open_buf_reader, open_buf_writer};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;

/// One evaluated test sample
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResultRecord {
    pub ctrl_emb: Vec<f32>,
    pub pert_emb: Vec<f32>,
    pub pred_emb: Vec<f32>,
    pub compound: Option<Box<str>>,
    pub dose: f64,
    pub cell_type: Box<str>,
}

const HEADER: [&str; 6] = [
    "ctrl_emb",
    "pert_emb",
    "pred_emb",
    "compound",
    "dose",
    "cell_type",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    Csv,
    Tsv,
    Json,
    Bin,
}

impl ResultFormat {
    /// Take the format from the file suffix (a trailing `.gz` is
    /// looked through)
    pub fn from_path<P: AsRef<Path>>(file_path: P) -> anyhow::Result<Self> {
        match file_ext(file_path.as_ref()).as_ref() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            "bin" => Ok(Self::Bin),
            _ => Err(PerturbError::UnsupportedFormat(
                file_path.as_ref().display().to_string(),
            )
            .into()),
        }
    }

    fn delimiter(&self) -> Option<char> {
        match self {
            Self::Csv => Some(','),
            Self::Tsv => Some('\t'),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultTable {
    pub records: Vec<ResultRecord>,
}

impl ResultTable {
    pub fn new(records: Vec<ResultRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    ///
    /// Write down the records in the format of the file suffix:
    /// `.csv`, `.tsv`, `.json` (each possibly `.gz`) or `.bin`
    ///
    pub fn to_file<P: AsRef<Path>>(&self, file_path: P) -> anyhow::Result<()> {
        let format = ResultFormat::from_path(file_path.as_ref())?;
        mkdir(file_path.as_ref())?;
        let mut buf = open_buf_writer(file_path.as_ref())?;

        match format {
            ResultFormat::Json => serde_json::to_writer(&mut buf, &self.records)?,
            ResultFormat::Bin => bincode::serialize_into(&mut buf, &self.records)?,
            ResultFormat::Csv | ResultFormat::Tsv => {
                let delim = format.delimiter().unwrap_or(',');
                let sep = delim.to_string();
                writeln!(buf, "{}", HEADER.join(sep.as_str()))?;
                for rec in self.records.iter() {
                    let fields = [
                        render_vec(&rec.ctrl_emb),
                        render_vec(&rec.pert_emb),
                        render_vec(&rec.pred_emb),
                        rec.compound.as_deref().map(|x| quote(x, delim)).unwrap_or_default(),
                        rec.dose.to_string(),
                        quote(&rec.cell_type, delim),
                    ];
                    writeln!(buf, "{}", fields.join(sep.as_str()))?;
                }
            }
        }
        buf.flush()?;
        info!(
            "wrote {} result records to {}",
            self.len(),
            file_path.as_ref().display()
        );
        Ok(())
    }

    /// Read back what [`ResultTable::to_file`] wrote
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> anyhow::Result<Self> {
        let format = ResultFormat::from_path(file_path.as_ref())?;
        let buf = open_buf_reader(file_path.as_ref())?;

        let records = match format {
            ResultFormat::Json => {
                let json: Vec<JsonRecord> = serde_json::from_reader(buf)?;
                json.into_iter().map(ResultRecord::from).collect()
            }
            ResultFormat::Bin => bincode::deserialize_from(buf)?,
            ResultFormat::Csv | ResultFormat::Tsv => {
                let delim = format.delimiter().unwrap_or(',');
                let mut records = vec![];
                for (line_no, line) in buf.lines().enumerate().skip(1) {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    records.push(parse_record(&line, delim).map_err(|e| {
                        anyhow::anyhow!("line {}: {}", line_no + 1, e)
                    })?);
                }
                records
            }
        };
        Ok(Self { records })
    }
}

/// JSON stores non-finite floats as `null`; they read back as NaN
#[derive(Deserialize)]
struct JsonRecord {
    ctrl_emb: Vec<Option<f32>>,
    pert_emb: Vec<Option<f32>>,
    pred_emb: Vec<Option<f32>>,
    compound: Option<Box<str>>,
    dose: Option<f64>,
    cell_type: Box<str>,
}

impl From<JsonRecord> for ResultRecord {
    fn from(rec: JsonRecord) -> Self {
        let floats = |xx: Vec<Option<f32>>| -> Vec<f32> {
            xx.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect()
        };
        Self {
            ctrl_emb: floats(rec.ctrl_emb),
            pert_emb: floats(rec.pert_emb),
            pred_emb: floats(rec.pred_emb),
            compound: rec.compound,
            dose: rec.dose.unwrap_or(f64::NAN),
            cell_type: rec.cell_type,
        }
    }
}

fn render_vec(xx: &[f32]) -> String {
    let inner: Vec<String> = xx.iter().map(|x| x.to_string()).collect();
    format!("[{}]", inner.join(", "))
}

fn quote(x: &str, delim: char) -> String {
    if x.contains(|c: char| c == delim || matches!(c, '"' | '\n' | '[' | ']')) {
        format!("\"{}\"", x.replace('"', "\"\""))
    } else {
        x.to_string()
    }
}

/// Split on `delim` outside of quotes and brackets
fn split_fields(line: &str, delim: char) -> Vec<String> {
    let mut fields = vec![];
    let mut current = String::new();
    let mut depth = 0_usize;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ']' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == delim && !in_quotes && depth == 0 => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_vec(field: &str) -> anyhow::Result<Vec<f32>> {
    let inner = field
        .trim()
        .strip_prefix('[')
        .and_then(|x| x.strip_suffix(']'))
        .ok_or(anyhow::anyhow!("not a list: {}", field))?
        .trim();
    if inner.is_empty() {
        return Ok(vec![]);
    }
    inner
        .split(',')
        .map(|x| {
            x.trim()
                .parse::<f32>()
                .map_err(|e| anyhow::anyhow!("{}: {:?}", e, x))
        })
        .collect()
}

fn parse_record(line: &str, delim: char) -> anyhow::Result<ResultRecord> {
    let fields = split_fields(line, delim);
    if fields.len() != HEADER.len() {
        return Err(anyhow::anyhow!(
            "expected {} fields, found {}",
            HEADER.len(),
            fields.len()
        ));
    }
    Ok(ResultRecord {
        ctrl_emb: parse_vec(&fields[0])?,
        pert_emb: parse_vec(&fields[1])?,
        pred_emb: parse_vec(&fields[2])?,
        compound: Some(fields[3].as_str())
            .filter(|x| !x.is_empty())
            .map(Box::from),
        dose: fields[4].trim().parse()?,
        cell_type: fields[5].as_str().into(),
    })
}
