//! Loads one day of expected output from a CSV file.

use std::io::Read;
use std::path::Path;

use crate::curve::InterpolatedDay;
use crate::error::CurveError;

/// Reads a daily curve from `path`.
///
/// The file holds one sample per line (first column), evenly spaced over the
/// day starting at midnight UTC. Blank lines and lines starting with `#` are
/// skipped.
///
/// # Errors
///
/// Returns a `CurveError` if the file cannot be read, a value is not a
/// number, or the file holds no samples.
pub fn load_day(path: &Path) -> Result<InterpolatedDay, CurveError> {
    let reader = builder().from_path(path).map_err(|source| CurveError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    collect(reader, path)
}

/// Reads a daily curve from any reader; `origin` only labels errors.
///
/// # Errors
///
/// Same as [`load_day`].
pub fn read_day(input: impl Read, origin: &Path) -> Result<InterpolatedDay, CurveError> {
    collect(builder().from_reader(input), origin)
}

fn builder() -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All);
    b
}

fn collect<R: Read>(mut reader: csv::Reader<R>, origin: &Path) -> Result<InterpolatedDay, CurveError> {
    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| CurveError::Read {
            path: origin.to_path_buf(),
            source,
        })?;
        let Some(field) = record.get(0).filter(|f| !f.is_empty()) else {
            continue;
        };
        let value = field.parse::<f64>().map_err(|_| CurveError::Parse {
            path: origin.to_path_buf(),
            line: record.position().map_or(0, |p| p.line() as usize),
            value: field.to_string(),
        })?;
        samples.push(value);
    }
    InterpolatedDay::new(samples).ok_or_else(|| CurveError::Empty {
        path: origin.to_path_buf(),
    })
}
