//! CSV input/output helpers.
//!
//! Every stage boundary is a delimited text file. Writes go through a
//! sibling temp file followed by a rename, so a stage that fails mid-write
//! never leaves a partial output behind.

use crate::error::Result;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load a CSV file into a DataFrame with header and schema inference.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()?;
    debug!("Read {:?}: shape {:?}", path, df.shape());
    Ok(df)
}

/// Write a DataFrame as CSV, atomically with respect to the final path.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_sibling(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .inspect_err(|_| {
                let _ = fs::remove_file(&tmp_path);
            })?;
    }
    fs::rename(&tmp_path, path)?;
    debug!("Wrote {:?}: shape {:?}", path, df.shape());
    Ok(())
}

/// Write plain text, with the same all-or-nothing guarantee as [`write_csv`].
pub fn write_text(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_sibling(path);
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.csv");

        let mut df = df!(
            "make" => ["TOYOTA", "FORD"],
            "sellingprice" => [20000.0f64, 15000.0],
        )
        .unwrap();

        write_csv(&mut df, &path).unwrap();
        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded.shape(), (2, 2));
        assert!(!path.with_file_name("roundtrip.csv.tmp").exists());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/tables/out.csv");

        let mut df = df!("x" => [1i64]).unwrap();
        write_csv(&mut df, &path).unwrap();
        assert!(path.exists());
    }
}
