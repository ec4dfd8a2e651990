use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{
    collections::{hash_map::DefaultHasher, HashMap, HashSet},
    fs::{self, File},
    hash::{Hash, Hasher},
    io::Read,
    path::Path,
};
use tracing::warn;

use crate::process::utils::canonical_column;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Canonical column names, in file order.
    pub headers: Vec<String>,
    /// One entry per record, always `headers.len()` cells long.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Read a CSV with a header row from `path`.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open CSV: {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to parse CSV: {}", path.display()))
    }

    /// Parse CSV text. Headers are canonicalized; short records are padded
    /// with empty cells and long ones truncated to the header width.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .context("reading CSV header row")?
            .iter()
            .map(canonical_column)
            .collect();
        let width = headers.len();

        let mut rows = Vec::new();
        let mut ragged = 0usize;
        for (idx, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
            if record.len() != width {
                ragged += 1;
            }
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        if ragged > 0 {
            warn!(ragged, width, "records with a field count different from the header");
        }

        Ok(Self { headers, rows })
    }

    /// Write the table, headers first, creating parent directories.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {:?}", parent))?;
        }
        let mut wtr = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to flush CSV: {}", path.display()))?;
        Ok(())
    }

    /// Set every cell of `name` to `value`, appending the column if absent.
    pub fn stamp_column(&mut self, name: &str, value: &str) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
                self.headers.len() - 1
            }
        };
        for row in &mut self.rows {
            row[idx] = value.to_string();
        }
    }

    /// Concatenate tables, aligning cells by column name. Columns are
    /// ordered by first appearance; a column missing from one table reads as
    /// an empty cell there.
    pub fn union(tables: Vec<RawTable>) -> RawTable {
        let mut headers: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for h in &table.headers {
                if !positions.contains_key(h) {
                    positions.insert(h.clone(), headers.len());
                    headers.push(h.clone());
                }
            }
        }

        let mut out = RawTable::new(headers);
        out.rows.reserve(tables.iter().map(RawTable::len).sum());
        let width = out.headers.len();
        for table in tables {
            // first occurrence wins when a file repeats a column name
            let mut mapping: Vec<Option<usize>> = Vec::with_capacity(table.headers.len());
            let mut seen = HashSet::new();
            for h in &table.headers {
                if seen.insert(h.as_str()) {
                    mapping.push(positions.get(h).copied());
                } else {
                    warn!(column = %h, "duplicate column name; keeping first occurrence");
                    mapping.push(None);
                }
            }
            for row in table.rows {
                let mut aligned = vec![String::new(); width];
                for (cell, target) in row.into_iter().zip(&mapping) {
                    if let Some(t) = target {
                        aligned[*t] = cell;
                    }
                }
                out.rows.push(aligned);
            }
        }
        out
    }

    /// Drop rows identical in every column to an earlier row.
    /// Returns how many were removed.
    pub fn drop_duplicates(&mut self) -> usize {
        let before = self.rows.len();
        // row hash -> indices into `kept`; rows are moved, never cloned
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::with_capacity(before);
        let mut kept: Vec<Vec<String>> = Vec::with_capacity(before);
        for row in std::mem::take(&mut self.rows) {
            let mut hasher = DefaultHasher::new();
            row.hash(&mut hasher);
            let bucket = buckets.entry(hasher.finish()).or_default();
            if bucket.iter().any(|&i| kept[i] == row) {
                continue;
            }
            bucket.push(kept.len());
            kept.push(row);
        }
        self.rows = kept;
        before - self.rows.len()
    }

    /// Keep the rows for which `keep` returns `true`; returns how many were dropped.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[String]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }
}
