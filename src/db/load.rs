use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::YearRange;
use crate::db::Store;
use crate::process::{
    convert::{coerce_rows, CellValue, LoadPlan},
    raw_table::RawTable,
};
use crate::schema::{create_index_statements, create_table_statement, insert_statement, TABLE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows: usize,
    pub batches: usize,
}

/// Create the accident table and its indexes if they do not exist yet.
#[instrument(level = "info", skip(store))]
pub async fn create_table(store: &Store) -> Result<()> {
    let ddl = create_table_statement(store.backend);
    sqlx::raw_sql(&ddl)
        .execute(&store.pool)
        .await
        .with_context(|| format!("creating table {}", TABLE_NAME))?;
    for stmt in create_index_statements() {
        sqlx::raw_sql(&stmt)
            .execute(&store.pool)
            .await
            .with_context(|| format!("running `{}`", stmt))?;
    }
    info!(table = TABLE_NAME, "table and indexes ready");
    Ok(())
}

/// Append `rows` in batches of `batch_size`, one transaction per batch.
/// A failing batch is rolled back; earlier batches stay committed.
#[instrument(level = "info", skip(store, plan, rows), fields(rows = rows.len()))]
pub async fn insert_rows(
    store: &Store,
    plan: &LoadPlan,
    rows: &[Vec<CellValue>],
    batch_size: usize,
) -> Result<LoadSummary> {
    let sql = insert_statement(store.backend, plan.columns);
    let start = Instant::now();
    let mut batches = 0;

    for (n, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        let mut tx = store.pool.begin().await.context("opening batch transaction")?;
        for row in batch {
            let mut query = sqlx::query(&sql);
            for value in row {
                query = match value {
                    CellValue::Int(v) => query.bind(*v),
                    CellValue::Text(s) => query.bind(s.as_str()),
                };
            }
            query
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting batch {} into {}", n, TABLE_NAME))?;
        }
        tx.commit()
            .await
            .with_context(|| format!("committing batch {}", n))?;
        batches += 1;
        debug!(batch = n, rows = batch.len(), "batch committed");
    }

    info!(rows = rows.len(), batches, elapsed = ?start.elapsed(), "rows loaded");
    Ok(LoadSummary {
        rows: rows.len(),
        batches,
    })
}

/// Coerce `table` to the fixed schema and append it to the accident table.
pub async fn load_table(
    store: &Store,
    table: &RawTable,
    years: YearRange,
    batch_size: usize,
) -> Result<LoadSummary> {
    let plan = LoadPlan::new(table);
    let rows = coerce_rows(&plan, table, years);
    create_table(store).await?;
    insert_rows(store, &plan, &rows, batch_size).await
}
