use std::path::Path;

use crate::datasets::{out_of_range, require_path, Dataset, Sample, Target};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

pub const UCI_DATASETS: [&str; 9] =
    ["boston", "concrete", "energy", "kin8nm", "naval", "power", "protein", "wine", "yacht"];

/// UCI regression benchmark read from `root/uci/<name>.csv`, with inputs and
/// target standardized to zero mean and unit variance.
#[derive(Debug, Clone)]
pub struct UciRegression {
    pub name: String,
    inputs: Tensor,
    targets: Tensor,
    pub target_mean: f64,
    pub target_std: f64,
}

impl UciRegression {
    pub fn new(root: impl AsRef<Path>, name: &str) -> Result<UciRegression> {
        if !UCI_DATASETS.contains(&name) {
            return Err(Error::invalid(format!(
                "unknown UCI dataset {name}, expected one of {}",
                UCI_DATASETS.join(", ")
            )));
        }
        let path = root.as_ref().join("uci").join(format!("{name}.csv"));
        require_path(name, &path)?;
        let ds = UciRegression::from_csv(name, &std::fs::read(&path)?)?;
        tracing::info!(dataset = name, samples = ds.len(), features = ds.num_features(), "loaded UCI dataset");
        Ok(ds)
    }

    /// Parses comma- or whitespace-separated rows. A first row with any
    /// non-numeric cell is taken as a header and skipped.
    pub fn from_csv(name: &str, data: &[u8]) -> Result<UciRegression> {
        let text = std::str::from_utf8(data).map_err(|_| Error::Parse("CSV file is not valid UTF-8".into()))?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        if lines.peek().is_some_and(|first| is_header(first)) {
            lines.next();
        }

        let mut features = Vec::new();
        let mut targets = Vec::new();
        let mut width = None;
        for (row_idx, line) in lines.enumerate() {
            let row = parse_floats(&parse_row(line), row_idx + 1)?;
            let (x, y) = split_target(name, &row)
                .ok_or_else(|| Error::Parse(format!("row {}: too few columns ({})", row_idx + 1, row.len())))?;
            match width {
                None => width = Some(x.len()),
                Some(w) if w != x.len() => {
                    return Err(Error::Parse(format!(
                        "row {}: feature count {} does not match first row's {w}",
                        row_idx + 1,
                        x.len()
                    )))
                }
                Some(_) => {}
            }
            features.push(x);
            targets.push(vec![y]);
        }
        if features.is_empty() {
            return Err(Error::Parse("CSV contains no data rows".into()));
        }

        let mut inputs = Tensor::from_rows(&features)?;
        let mut targets = Tensor::from_rows(&targets)?;
        standardize(&mut inputs);
        let (target_mean, target_std) = standardize(&mut targets)[0];
        Ok(UciRegression { name: name.to_string(), inputs, targets, target_mean, target_std })
    }

    pub fn num_features(&self) -> usize {
        self.inputs.sample_len()
    }
}

/// Returns the per-column `(mean, std)` used; constant columns keep std 1.
fn standardize(t: &mut Tensor) -> Vec<(f64, f64)> {
    let (n, d) = (t.batch(), t.sample_len());
    (0..d)
        .map(|j| {
            let mean = (0..n).map(|i| t.data[i * d + j]).sum::<f64>() / n as f64;
            let var = (0..n).map(|i| (t.data[i * d + j] - mean).powi(2)).sum::<f64>() / n as f64;
            let std = if var > 0.0 { var.sqrt() } else { 1.0 };
            for i in 0..n {
                t.data[i * d + j] = (t.data[i * d + j] - mean) / std;
            }
            (mean, std)
        })
        .collect()
}

/// protein regresses its first column; energy and naval carry two targets
/// and use the heating load and the turbine decay respectively.
fn split_target(name: &str, row: &[f64]) -> Option<(Vec<f64>, f64)> {
    let n = row.len();
    match name {
        "protein" if n >= 2 => Some((row[1..].to_vec(), row[0])),
        "energy" if n >= 3 => Some((row[..n - 2].to_vec(), row[n - 2])),
        "naval" if n >= 3 => Some((row[..n - 2].to_vec(), row[n - 1])),
        "protein" | "energy" | "naval" => None,
        _ if n >= 2 => Some((row[..n - 1].to_vec(), row[n - 1])),
        _ => None,
    }
}

fn is_header(line: &str) -> bool {
    parse_row(line).iter().any(|c| {
        let t = c.trim();
        !t.is_empty() && t.parse::<f64>().is_err()
    })
}

/// Splits one row, honouring double-quoted fields; rows without commas are
/// split on whitespace.
fn parse_row(line: &str) -> Vec<String> {
    if !line.contains(',') {
        return line.split_whitespace().map(str::to_string).collect();
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_floats(cells: &[String], row_num: usize) -> Result<Vec<f64>> {
    cells
        .iter()
        .map(|c| {
            c.trim()
                .parse::<f64>()
                .map_err(|_| Error::Parse(format!("row {row_num}: '{c}' is not a valid number")))
        })
        .collect()
}

impl Dataset for UciRegression {
    fn len(&self) -> usize {
        self.inputs.batch()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.len() {
            return Err(out_of_range(idx, self.len()));
        }
        Ok(Sample {
            input: Tensor::new(&[self.num_features()], self.inputs.sample(idx).to_vec())?,
            target: Target::Value(self.targets.sample(idx).to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_standardization() {
        let csv = b"a,b,y\n1,10,0\n3,10,2\n";
        let ds = UciRegression::from_csv("yacht", csv).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.num_features(), 2);
        let s = ds.get(0).unwrap();
        assert_eq!(s.input.data, vec![-1.0, 0.0]);
        assert_eq!(s.target, Target::Value(vec![-1.0]));
        assert_eq!((ds.target_mean, ds.target_std), (1.0, 1.0));
    }

    #[test]
    fn protein_target_is_first_column() {
        let ds = UciRegression::from_csv("protein", b"5 1 2\n7 1 4\n").unwrap();
        assert_eq!(ds.target_mean, 6.0);
        assert_eq!(ds.num_features(), 2);
    }

    #[test]
    fn quoted_fields_and_bad_numbers() {
        assert_eq!(parse_row("\"1,5\",2"), vec!["1,5".to_string(), "2".to_string()]);
        assert!(UciRegression::from_csv("wine", b"1,2\n3,x\n").is_err());
    }

    #[test]
    fn unknown_and_missing_datasets() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(UciRegression::new(dir.path(), "iris"), Err(Error::InvalidArgument(_))));
        assert!(matches!(UciRegression::new(dir.path(), "kin8nm"), Err(Error::DatasetNotFound { .. })));
    }
}
