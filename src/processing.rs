//! Post-processing of saved acquisition CSVs.
//!
//! A separate, idempotent pass over whatever files exist: enumerate every
//! combo CSV in a folder, extract one named column, and append one summary
//! row per file to `total_averages.csv`. One malformed file must not abort
//! aggregation of the rest, so per-file problems are warnings, not errors.
//!
//! Counter exports carry a few preamble rows before the real header, so the
//! reader scans rows until one contains the named column instead of assuming
//! the header is row zero.

use crate::error::{AppResult, TomoError};
use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{info, warn};

/// Name of the cumulative summary file.
pub const SUMMARY_FILE: &str = "total_averages.csv";

/// Files never treated as acquisition output.
const EXCLUDED: [&str; 2] = [SUMMARY_FILE, "position_report.csv"];

/// One summary row: file name and the computed average of the target column.
///
/// `average` is `None` when the column held no numeric data; it is rendered
/// as the explicit `no data` flag rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    /// Input file name, without directory
    pub file_name: String,
    /// Arithmetic mean of the column's numeric values
    pub average: Option<f64>,
}

/// Compute the mean of a named column in one CSV file.
///
/// The header row is the first row containing `column` as an exact,
/// case-sensitive cell. Rows shorter than the column index are skipped, and
/// non-numeric cells are excluded from the denominator. `Ok(None)` means the
/// column exists but held no numeric data. A file without the column at all
/// is an error, which callers downgrade to a warning.
pub fn average_column_in_file(path: &Path, column: &str) -> Result<Option<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = reader.records();
    let column_index = loop {
        let Some(record) = records.next() else {
            bail!("column '{column}' not found in {}", path.display());
        };
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        if let Some(index) = record.iter().position(|cell| cell == column) {
            break index;
        }
    };

    let mut sum = 0.0;
    let mut count: usize = 0;
    for record in records {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        let Some(cell) = record.get(column_index) else {
            continue;
        };
        if let Ok(value) = cell.trim().parse::<f64>() {
            sum += value;
            count += 1;
        }
    }

    Ok((count > 0).then(|| sum / count as f64))
}

/// Enumerate the acquisition CSVs in a folder, sorted by file name.
fn acquisition_files(folder: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)
        .with_context(|| format!("failed to read folder {}", folder.display()))?
    {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        let excluded = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| EXCLUDED.contains(&name));
        if is_csv && !excluded {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Average the named column across every acquisition CSV in `folder` and
/// append one row per file to the cumulative summary.
///
/// The summary header (`filename, avg_<column>`) is written only when the
/// summary file is first created, so repeated invocations keep appending.
/// Files missing the column are skipped with a warning.
pub fn process_folder(folder: &Path, column: &str) -> AppResult<Vec<SummaryRecord>> {
    let files =
        acquisition_files(folder).map_err(|err| TomoError::Processing(format!("{err:#}")))?;
    if files.is_empty() {
        warn!(folder = %folder.display(), "no acquisition CSV files to process");
        return Ok(Vec::new());
    }

    let summary_path = folder.join(SUMMARY_FILE);
    let is_new = !summary_path.exists();
    let summary_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&summary_path)
        .map_err(|err| {
            TomoError::Processing(format!(
                "failed to open summary {}: {err}",
                summary_path.display()
            ))
        })?;
    let mut writer = csv::Writer::from_writer(summary_file);

    if is_new {
        let average_header = format!("avg_{column}");
        writer
            .write_record(["filename", average_header.as_str()])
            .map_err(|err| TomoError::Processing(format!("failed to write header: {err}")))?;
    }

    let mut records = Vec::new();
    for path in files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match average_column_in_file(&path, column) {
            Ok(average) => {
                let rendered = average.map_or_else(|| "no data".to_string(), |v| v.to_string());
                info!(file = %file_name, average = %rendered, "file processed");
                writer
                    .write_record([file_name.as_str(), rendered.as_str()])
                    .map_err(|err| {
                        TomoError::Processing(format!("failed to write summary row: {err}"))
                    })?;
                records.push(SummaryRecord { file_name, average });
            }
            Err(err) => {
                warn!(file = %file_name, error = %format!("{err:#}"), "file skipped");
            }
        }
    }

    writer
        .flush()
        .map_err(|err| TomoError::Processing(format!("failed to flush summary: {err}")))?;
    Ok(records)
}
