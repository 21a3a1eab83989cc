use crate::error::{GanError, GanResult};
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A table of phase space samples with one named column per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    pub keys: Vec<String>,
    pub values: Array2<f32>,
}

/// Writes `samples` as whitespace separated text, preceded by a `# key ...` header line.
pub fn write_samples<P: AsRef<Path>>(
    path: P,
    keys: &[String],
    samples: ArrayView2<'_, f32>,
) -> GanResult<()> {
    if keys.len() != samples.ncols() {
        return Err(GanError::ShapeMismatch(format!(
            "{} keys for {} columns",
            keys.len(),
            samples.ncols()
        )));
    }
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# {}", keys.join(" "))?;
    for row in samples.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_samples<P: AsRef<Path>>(path: P) -> GanResult<SampleTable> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut keys: Option<Vec<String>> = None;
    let mut data: Vec<f32> = Vec::new();
    let mut rows = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('#') {
            if keys.is_none() && rows == 0 {
                keys = Some(header.split_whitespace().map(String::from).collect());
            }
            continue;
        }

        let fields = trimmed
            .split_whitespace()
            .map(|f| {
                f.parse::<f32>().map_err(|e| {
                    GanError::InvalidArgument(format!(
                        "{}:{}: cannot parse '{}': {}",
                        path.display(),
                        number + 1,
                        f,
                        e
                    ))
                })
            })
            .collect::<GanResult<Vec<f32>>>()?;

        let width = keys.as_ref().map_or(fields.len(), Vec::len);
        let expected = if rows == 0 { width } else { data.len() / rows };
        if fields.len() != expected {
            return Err(GanError::ShapeMismatch(format!(
                "{}:{}: expected {} values, found {}",
                path.display(),
                number + 1,
                expected,
                fields.len()
            )));
        }
        data.extend(fields);
        rows += 1;
    }

    let keys = match keys {
        Some(keys) => keys,
        None => {
            let width = if rows == 0 { 0 } else { data.len() / rows };
            (0..width).map(|i| format!("x{}", i)).collect()
        }
    };
    let values = Array2::from_shape_vec((rows, keys.len()), data)?;
    Ok(SampleTable { keys, values })
}
