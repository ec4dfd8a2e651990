use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, fs, path::Path};
use tracing::{info, instrument};

use crate::db::Store;
use crate::schema::{quote_ident, TABLE_NAME};

/// Values shown by the top-N queries.
pub const TOP_N: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: Option<i64>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: Option<String>,
    pub count: i64,
}

/// Results of the post-load sanity queries. Diagnostic only: nothing here
/// passes or fails a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub total: i64,
    pub per_year: Vec<YearCount>,
    pub top_accident_types: Vec<ValueCount>,
    pub top_causes: Vec<ValueCount>,
}

impl ValidationReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}

fn write_counts(f: &mut fmt::Formatter<'_>, title: &str, label: &str, rows: &[ValueCount]) -> fmt::Result {
    writeln!(f, "\n{}", title)?;
    writeln!(f, "{: <40} {:>12}", label, "cantidad")?;
    writeln!(f, "{:-<53}", "")?;
    for r in rows {
        writeln!(f, "{: <40} {:>12}", r.value.as_deref().unwrap_or("<null>"), r.count)?;
    }
    Ok(())
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TOTAL DE REGISTROS: {}", self.total)?;

        writeln!(f, "\nDISTRIBUCIÓN POR AÑO")?;
        writeln!(f, "{: <40} {:>12}", "anio", "cantidad")?;
        writeln!(f, "{:-<53}", "")?;
        for r in &self.per_year {
            let year = r.year.map(|y| y.to_string()).unwrap_or_else(|| "<null>".into());
            writeln!(f, "{: <40} {:>12}", year, r.count)?;
        }

        write_counts(f, "TOP 5 TIPOS DE ACCIDENTE", "tipaccid", &self.top_accident_types)?;
        write_counts(f, "TOP 5 CAUSAS DE ACCIDENTE", "causaacci", &self.top_causes)
    }
}

async fn top_values(store: &Store, column: &str) -> Result<Vec<ValueCount>> {
    let col = quote_ident(column);
    let sql = format!(
        "SELECT {col}, COUNT(*) AS cantidad FROM {table} \
         GROUP BY {col} ORDER BY cantidad DESC, {col} LIMIT {n}",
        col = col,
        table = quote_ident(TABLE_NAME),
        n = TOP_N
    );
    let rows: Vec<(Option<String>, i64)> = sqlx::query_as(&sql)
        .fetch_all(&store.pool)
        .await
        .with_context(|| format!("top values of {}", column))?;
    Ok(rows
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect())
}

/// Run the four sanity queries against the loaded table.
#[instrument(level = "info", skip(store))]
pub async fn validate_load(store: &Store) -> Result<ValidationReport> {
    let table = quote_ident(TABLE_NAME);

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) AS total FROM {}", table))
        .fetch_one(&store.pool)
        .await
        .with_context(|| format!("counting rows of {} (has it been loaded?)", TABLE_NAME))?;

    let per_year: Vec<(Option<i64>, i64)> = sqlx::query_as(&format!(
        "SELECT CAST(anio AS BIGINT) AS anio, COUNT(*) AS cantidad FROM {} \
         GROUP BY anio ORDER BY anio",
        table
    ))
    .fetch_all(&store.pool)
    .await
    .context("per-year distribution")?;

    let report = ValidationReport {
        generated_at: Utc::now(),
        total,
        per_year: per_year
            .into_iter()
            .map(|(year, count)| YearCount { year, count })
            .collect(),
        top_accident_types: top_values(store, "tipaccid").await?,
        top_causes: top_values(store, "causaacci").await?,
    };

    info!(total = report.total, years = report.per_year.len(), "validation queries done");
    Ok(report)
}
