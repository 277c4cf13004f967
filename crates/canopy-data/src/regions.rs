//! Region streams and the counterexample log.
//!
//! An externally supplied adversarial region is a whitespace-separated
//! sequence of `[l;u]` pairs, one pair per feature, one region per
//! sample. Counterexamples are persisted as
//! `<sample_id>: [l0,u0] [l1,u1] …` lines.

use crate::Result;
use canopy_core::{CanopyError, Hyperrectangle, Interval};
use std::io::{BufRead, Write};

/// Reads one hyperrectangle per sample from a `[l;u]`-pair stream.
pub struct RegionStream<R> {
    reader: R,
    /// Tokens of the current line not yet consumed, in reverse order.
    pending: Vec<String>,
}

impl<R: BufRead> RegionStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    fn next_token(&mut self) -> Result<String> {
        loop {
            if let Some(token) = self.pending.pop() {
                return Ok(token);
            }
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| CanopyError::MalformedRegion(format!("read failed: {e}")))?;
            if read == 0 {
                return Err(CanopyError::MalformedRegion(
                    "region stream ended early".into(),
                )
                .into());
            }
            self.pending
                .extend(line.split_whitespace().rev().map(str::to_string));
        }
    }

    /// Read the next region, expecting exactly `dimension` pairs.
    pub fn next_region(&mut self, dimension: usize) -> Result<Hyperrectangle> {
        let mut intervals = Vec::with_capacity(dimension);
        for i in 0..dimension {
            let token = self.next_token()?;
            intervals.push(parse_pair(&token, i)?);
        }
        Ok(Hyperrectangle::new(intervals))
    }
}

fn parse_pair(token: &str, dimension: usize) -> Result<Interval> {
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| malformed(token, dimension))?;
    let (lower, upper) = inner.split_once(';').ok_or_else(|| malformed(token, dimension))?;
    let lower: f64 = lower.parse().map_err(|_| malformed(token, dimension))?;
    let upper: f64 = upper.parse().map_err(|_| malformed(token, dimension))?;
    Ok(Interval::new(lower, upper))
}

fn malformed(token: &str, dimension: usize) -> crate::DataError {
    CanopyError::MalformedRegion(format!(
        "expected `[l;u]` on dimension {dimension}, got `{token}`"
    ))
    .into()
}

/// Append one counterexample line: `<sample_id>: [l0,u0] [l1,u1] …`.
pub fn write_counterexample(
    out: &mut impl Write,
    sample_id: usize,
    region: &Hyperrectangle,
) -> std::io::Result<()> {
    write!(out, "{sample_id}:")?;
    for iv in region.intervals() {
        write!(out, " [{},{}]", iv.lower, iv.upper)?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataError;
    use std::io::Cursor;

    #[test]
    fn reads_regions_across_lines() {
        let text = "[0;1] [2;3]\n[4;5]\n[6;7]\n";
        let mut stream = RegionStream::new(Cursor::new(text));
        let a = stream.next_region(2).unwrap();
        assert_eq!(a.intervals()[0], Interval::new(0.0, 1.0));
        assert_eq!(a.intervals()[1], Interval::new(2.0, 3.0));
        let b = stream.next_region(2).unwrap();
        assert_eq!(b.intervals()[1], Interval::new(6.0, 7.0));
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        for text in ["0;1", "[0:1]", "[a;b]", "[0;1"] {
            let mut stream = RegionStream::new(Cursor::new(text));
            let err = stream.next_region(1).unwrap_err();
            assert!(
                matches!(err, DataError::Invalid(CanopyError::MalformedRegion(_))),
                "`{text}` should be malformed"
            );
        }
    }

    #[test]
    fn early_end_is_malformed() {
        let mut stream = RegionStream::new(Cursor::new("[0;1]"));
        assert!(stream.next_region(2).is_err());
    }

    #[test]
    fn counterexample_line_format() {
        let region = Hyperrectangle::new(vec![
            Interval::new(0.5, 1.0),
            Interval::new(-1.0, -0.25),
        ]);
        let mut out = Vec::new();
        write_counterexample(&mut out, 7, &region).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "7: [0.5,1] [-1,-0.25]\n"
        );
    }
}
