use anyhow::{bail, Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::config::YearRange;
use crate::process::{
    raw_table::RawTable,
    utils::{is_yearly_file, year_from_file_name, yearly_file_glob, SOURCE_YEAR_COLUMN},
};

/// Outcome of a consolidation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidySummary {
    /// Yearly files read, with the year taken from each name.
    pub files: Vec<(PathBuf, i32)>,
    pub rows_read: usize,
    pub duplicates_removed: usize,
    pub output: PathBuf,
}

/// Yearly CSVs under `csv_dir` whose name encodes a year inside `years`,
/// sorted by file name. Names without a parseable year are skipped.
pub fn select_yearly_files(csv_dir: &Path, years: YearRange) -> Result<Vec<(PathBuf, i32)>> {
    let pattern = yearly_file_glob(csv_dir);
    let pattern = pattern.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_yearly_file)
        })
        .collect();
    paths.sort();

    let mut selected = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(year) = year_from_file_name(&path) else {
            debug!(path = %path.display(), "no year in file name; skipping");
            continue;
        };
        if !years.contains(year) {
            debug!(path = %path.display(), year, "outside year range; skipping");
            continue;
        }
        selected.push((path, year));
    }
    Ok(selected)
}

/// Read every in-range yearly file, stamp rows with their year, union them,
/// drop exact duplicates, and write the consolidated CSV to `output`.
#[instrument(level = "info", skip_all, fields(dir = %csv_dir.display(), min = years.min, max = years.max))]
pub fn tidy_yearly_files(
    csv_dir: &Path,
    years: YearRange,
    output: &Path,
) -> Result<(RawTable, TidySummary)> {
    let files = select_yearly_files(csv_dir, years)?;
    if files.is_empty() {
        bail!(
            "no atus_anual_<year>.csv files for {}-{} under {} (was the archive extracted?)",
            years.min,
            years.max,
            csv_dir.display()
        );
    }

    let mut tables = Vec::with_capacity(files.len());
    for (path, year) in &files {
        info!(file = %path.display(), year, "reading");
        let mut table = RawTable::read_csv(path)?;
        table.stamp_column(SOURCE_YEAR_COLUMN, &year.to_string());
        tables.push(table);
    }

    // AÑO goes last even when files disagree on their other columns
    let mut all = RawTable::union(tables);
    if let Some(idx) = all.column_index(SOURCE_YEAR_COLUMN) {
        let last = all.headers.len() - 1;
        if idx != last {
            all.headers[idx..].rotate_left(1);
            for row in &mut all.rows {
                row[idx..].rotate_left(1);
            }
        }
    }

    let rows_read = all.len();
    let duplicates_removed = all.drop_duplicates();
    all.write_csv(output)?;

    info!(
        rows = all.len(),
        duplicates_removed,
        output = %output.display(),
        "consolidated"
    );

    let summary = TidySummary {
        files,
        rows_read,
        duplicates_removed,
        output: output.to_path_buf(),
    };
    Ok((all, summary))
}
