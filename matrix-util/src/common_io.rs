use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
///
pub fn open_buf_reader<P: AsRef<Path>>(input_file: P) -> anyhow::Result<Box<dyn BufRead>> {
    let path = input_file.as_ref();
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?;

    if is_gzipped(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not; `stdout` and
///   `stderr` are recognized
///
pub fn open_buf_writer<P: AsRef<Path>>(output_file: P) -> anyhow::Result<Box<dyn Write>> {
    let path = output_file.as_ref();

    match path.to_str() {
        Some(s) if s.eq_ignore_ascii_case("stdout") => {
            return Ok(Box::new(BufWriter::new(std::io::stdout())));
        }
        Some(s) if s.eq_ignore_ascii_case("stderr") => {
            return Ok(Box::new(BufWriter::new(std::io::stderr())));
        }
        _ => {}
    }

    let file = File::create(path)?;
    if is_gzipped(path) {
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

///
/// Read every line of the input file into memory
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines<P: AsRef<Path>>(input_file: P) -> anyhow::Result<Vec<Box<str>>> {
    let buf = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for x in buf.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

///
/// Read a list of names, one per line. Surrounding white space is
/// trimmed and blank lines are ignored.
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_names<P: AsRef<Path>>(input_file: P) -> anyhow::Result<Vec<Box<str>>> {
    Ok(read_lines(input_file)?
        .into_iter()
        .map(|x| x.trim().to_string().into_boxed_str())
        .filter(|x| !x.is_empty())
        .collect())
}

///
/// Write every line into the output file
///
/// * `lines` - anything we can display line by line
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T, P>(lines: &[T], output_file: P) -> anyhow::Result<()>
where
    T: std::fmt::Display,
    P: AsRef<Path>,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow::anyhow!("unexpected error: {}", e));
        }
    }
    buf.flush()?;
    Ok(())
}

///
/// Create the parent directory of a file if needed
/// * `file` - file name
///
pub fn mkdir<P: AsRef<Path>>(file: P) -> anyhow::Result<()> {
    if let Some(dir) = file.as_ref().parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// Whether the file name ends with `.gz`
pub fn is_gzipped<P: AsRef<Path>>(file: P) -> bool {
    file.as_ref()
        .extension()
        .and_then(|x| x.to_str())
        .map(|x| x.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

///
/// Take the lower-case format extension of a file, looking through
/// a trailing `.gz`, e.g., `out.csv.gz` -> `csv`. Returns an empty
/// string if there is no extension.
///
pub fn file_ext<P: AsRef<Path>>(file: P) -> Box<str> {
    let path = file.as_ref();
    let inner = if is_gzipped(path) {
        path.file_stem().map(Path::new)
    } else {
        Some(path)
    };

    inner
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
        .into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_extension_looks_through_gzip() {
        assert_eq!(file_ext("out/results.csv.gz").as_ref(), "csv");
        assert_eq!(file_ext("results.JSON").as_ref(), "json");
        assert_eq!(file_ext("results").as_ref(), "");
        assert!(is_gzipped("a.tsv.gz"));
        assert!(!is_gzipped("a.tsv"));
    }

    #[test]
    fn names_are_trimmed_and_blank_lines_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("names.txt.gz");
        let lines: Vec<Box<str>> = vec!["  drug_a ".into(), "".into(), "drug_b".into()];
        write_lines(&lines, &file)?;
        let names = read_names(&file)?;
        assert_eq!(names, vec![Box::from("drug_a"), Box::from("drug_b")]);
        Ok(())
    }
}
