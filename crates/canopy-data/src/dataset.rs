//! CSV datasets: one sample per row, `label,x_1,…,x_n`.

use crate::{DataError, Result};
use canopy_core::CanopyError;
use ndarray::Array2;
use std::io::BufRead;
use std::path::Path;

/// A labelled dataset held row-major.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<String>,
}

impl Dataset {
    /// Parse `label,x_1,…,x_n` rows. Blank lines are skipped; every row
    /// must agree on the feature count.
    pub fn from_csv(reader: impl BufRead) -> Result<Self> {
        let mut labels = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        let mut dimension = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(',');
            let label = fields
                .next()
                .expect("split yields at least one field")
                .trim();
            if label.is_empty() {
                return Err(DataError::parse(i + 1, "missing label"));
            }

            let row_start = values.len();
            for field in fields {
                let v: f64 = field.trim().parse().map_err(|_| {
                    DataError::parse(i + 1, format!("expected a number, got `{}`", field.trim()))
                })?;
                values.push(v);
            }

            let row_len = values.len() - row_start;
            match dimension {
                None => dimension = Some(row_len),
                Some(n) if n != row_len => {
                    return Err(DataError::parse(
                        i + 1,
                        format!("row has {row_len} features, expected {n}"),
                    ));
                }
                _ => {}
            }
            labels.push(label.to_string());
        }

        let dimension = dimension.ok_or_else(|| {
            DataError::Invalid(CanopyError::InvalidInput("empty dataset".into()))
        })?;
        if dimension == 0 {
            return Err(DataError::Invalid(CanopyError::InvalidInput(
                "dataset rows carry no features".into(),
            )));
        }

        let features = Array2::from_shape_vec((labels.len(), dimension), values)
            .expect("row count and dimension were just established");
        Ok(Self { features, labels })
    }

    pub fn read_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv(std::io::BufReader::new(file))
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of features per sample.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.features.ncols()
    }

    /// The i-th sample's feature vector.
    pub fn sample(&self, i: usize) -> &[f64] {
        self.features
            .row(i)
            .to_slice()
            .expect("dataset rows are contiguous")
    }

    /// The i-th sample's true label.
    pub fn label(&self, i: usize) -> &str {
        &self.labels[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_rows() {
        let csv = "A,0.1,0.2\nB,0.3,0.4\n\nA,0.5,0.6\n";
        let ds = Dataset::from_csv(Cursor::new(csv)).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.dimension(), 2);
        assert_eq!(ds.sample(1), &[0.3, 0.4]);
        assert_eq!(ds.label(2), "A");
    }

    #[test]
    fn rejects_ragged_rows() {
        let csv = "A,0.1,0.2\nB,0.3\n";
        let err = Dataset::from_csv(Cursor::new(csv)).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_non_numeric_features() {
        let err = Dataset::from_csv(Cursor::new("A,x\n")).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 1, .. }));
    }

    #[test]
    fn rejects_empty_inputs() {
        assert!(Dataset::from_csv(Cursor::new("")).is_err());
        assert!(Dataset::from_csv(Cursor::new("A\nB\n")).is_err());
    }

    #[test]
    fn reads_from_a_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "spam,1.0,2.0").unwrap();
        writeln!(file, "ham,3.0,4.0").unwrap();
        let ds = Dataset::read_path(file.path()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.label(0), "spam");
    }
}
