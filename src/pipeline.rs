// src/pipeline.rs

//! The stages of a run, in order: fetch, tidy, transform, load, validate.
//! Each stage finishes before the next starts; the first error ends the run.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::db::{
    self,
    load::{load_table, LoadSummary},
    validate::{validate_load, ValidationReport},
    Store,
};
use crate::fetch::{self, zips::extract_archive};
use crate::process::{
    filter::{filter_region, filter_year_range, FilterSummary},
    profile::{log_profile, profile},
    raw_table::RawTable,
    tidy::{tidy_yearly_files, TidySummary},
};

#[derive(Debug, Clone)]
pub struct EtlSummary {
    pub filter: FilterSummary,
    pub load: LoadSummary,
    pub report: ValidationReport,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tidy: TidySummary,
    pub etl: EtlSummary,
}

/// Download the archive when missing, optionally unpack it, then consolidate
/// the yearly CSVs into the tidy file.
#[instrument(level = "info", skip_all)]
pub async fn fetch_stage(cfg: &PipelineConfig, client: &Client) -> Result<TidySummary> {
    let archive = cfg.archive_path();
    fetch::download_archive(client, &cfg.source_url, &archive).await?;

    if cfg.extract {
        let raw_dir = cfg.raw_dir.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &raw_dir))
            .await
            .context("extraction task panicked")??;
    } else {
        info!(csv_dir = %cfg.csv_dir().display(), "extraction disabled; using CSVs already on disk");
    }

    tidy_stage(cfg).await
}

pub async fn tidy_stage(cfg: &PipelineConfig) -> Result<TidySummary> {
    let csv_dir = cfg.csv_dir();
    let output = cfg.tidy_path();
    let years = cfg.years;
    let (_, summary) =
        tokio::task::spawn_blocking(move || tidy_yearly_files(&csv_dir, years, &output))
            .await
            .context("consolidation task panicked")??;
    Ok(summary)
}

/// Read the tidy CSV, profile it, and apply the year and region filters.
#[instrument(level = "info", skip_all, fields(input = %cfg.tidy_path().display()))]
pub fn transform_stage(cfg: &PipelineConfig) -> Result<(RawTable, FilterSummary)> {
    let mut table = RawTable::read_csv(cfg.tidy_path())
        .context("reading the consolidated CSV (has the fetch stage run?)")?;
    log_profile(&table, &profile(&table));

    filter_year_range(&mut table, cfg.years)?;
    let summary = filter_region(&mut table, cfg.region)?;
    Ok((table, summary))
}

/// Prepare the target database and append `table` to it.
#[instrument(level = "info", skip_all, fields(rows = table.len()))]
pub async fn load_stage<F>(cfg: &PipelineConfig, table: &RawTable, confirm: F) -> Result<(Store, LoadSummary)>
where
    F: FnMut(&str) -> Result<bool>,
{
    db::ensure_database(&cfg.db, cfg.on_existing, confirm).await?;
    let store = db::connect(&cfg.db).await?;
    let summary = load_table(&store, table, cfg.years, cfg.batch_size).await?;
    Ok((store, summary))
}

/// Run the sanity queries, print them, and write the JSON report when asked.
pub async fn validate_stage(cfg: &PipelineConfig, store: &Store) -> Result<ValidationReport> {
    let report = validate_load(store).await?;
    println!("{}", report);
    if let Some(path) = &cfg.report_path {
        report.write_json(path)?;
        info!(path = %path.display(), "validation report written");
    }
    Ok(report)
}

/// Transform, load and validate from an existing tidy CSV.
pub async fn etl<F>(cfg: &PipelineConfig, confirm: F) -> Result<EtlSummary>
where
    F: FnMut(&str) -> Result<bool>,
{
    let (table, filter) = transform_stage(cfg)?;
    let (store, load) = load_stage(cfg, &table, confirm).await?;
    let report = validate_stage(cfg, &store).await?;
    store.pool.close().await;
    Ok(EtlSummary { filter, load, report })
}

/// One line naming the data source and the slice of it this run keeps.
pub fn describe_source(cfg: &PipelineConfig) -> String {
    let scope = if cfg.region.filter_municipality {
        format!(
            "entity {}, municipality {}",
            cfg.region.entity, cfg.region.municipality
        )
    } else {
        format!("entity {}", cfg.region.entity)
    };
    format!(
        "INEGI road accidents in urban and suburban areas (ATUS); source {}; period {}-{}; \
         national coverage filtered to {}; zipped CSV",
        cfg.source_url, cfg.years.min, cfg.years.max, scope
    )
}

/// Every stage end to end.
#[instrument(level = "info", skip_all, fields(years = %format!("{}-{}", cfg.years.min, cfg.years.max), entity = cfg.region.entity))]
pub async fn run<F>(cfg: &PipelineConfig, client: &Client, confirm: F) -> Result<RunSummary>
where
    F: FnMut(&str) -> Result<bool>,
{
    let start = Instant::now();
    info!("{}", describe_source(cfg));
    let tidy = fetch_stage(cfg, client).await?;
    let etl = etl(cfg, confirm).await?;
    info!(
        files = tidy.files.len(),
        consolidated = tidy.rows_read - tidy.duplicates_removed,
        filtered = etl.filter.rows_after,
        loaded = etl.load.rows,
        elapsed = ?start.elapsed(),
        "pipeline finished"
    );
    Ok(RunSummary { tidy, etl })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Region;

    #[test]
    fn source_description_names_url_period_and_scope() {
        let mut cfg = PipelineConfig::default();
        let text = describe_source(&cfg);
        assert!(text.contains(crate::config::INEGI_ZIP_URL));
        assert!(text.contains("period 2018-2024"));
        assert!(text.ends_with("filtered to entity 26; zipped CSV"));

        cfg.region = Region {
            filter_municipality: true,
            ..Region::default()
        };
        assert!(describe_source(&cfg).contains("entity 26, municipality 30"));
    }
}
