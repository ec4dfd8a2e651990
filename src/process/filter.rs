use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::config::{Region, YearRange};
use crate::process::{
    raw_table::RawTable,
    utils::{format_numeric, parse_numeric, ENTITY_COLUMN, MUNICIPALITY_COLUMN, YEAR_COLUMN},
};

/// Row counts around the regional filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSummary {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Retained rows per `ANIO` value; rows without a numeric year are not counted.
    pub per_year: BTreeMap<i64, usize>,
}

impl FilterSummary {
    pub fn retained_pct(&self) -> f64 {
        if self.rows_before == 0 {
            0.0
        } else {
            self.rows_after as f64 / self.rows_before as f64 * 100.0
        }
    }
}

fn require_column(table: &RawTable, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| anyhow!("column {} not found in consolidated data", name))
}

/// Keep rows whose numeric `ANIO` lies in `years`; unparseable years are dropped.
#[instrument(level = "info", skip(table), fields(rows = table.len()))]
pub fn filter_year_range(table: &mut RawTable, years: YearRange) -> Result<usize> {
    let idx = require_column(table, YEAR_COLUMN)?;
    let dropped = table.retain(|row| {
        parse_numeric(&row[idx])
            .map(|y| y >= years.min as f64 && y <= years.max as f64)
            .unwrap_or(false)
    });
    info!(dropped, remaining = table.len(), "year filter");
    Ok(dropped)
}

/// Rewrite a column as numbers: parseable cells in canonical form,
/// everything else empty (missing). Absent columns are left alone.
pub fn coerce_numeric_column(table: &mut RawTable, name: &str) {
    let Some(idx) = table.column_index(name) else {
        return;
    };
    for row in &mut table.rows {
        row[idx] = parse_numeric(&row[idx])
            .map(format_numeric)
            .unwrap_or_default();
    }
}

/// Numeric value of `row[idx]` equals `target`; missing never matches.
fn code_matches(row: &[String], idx: usize, target: i64) -> bool {
    parse_numeric(&row[idx]) == Some(target as f64)
}

/// Keep rows in the configured entity, and municipality when that filter
/// is switched on.
#[instrument(level = "info", skip(table), fields(rows = table.len()))]
pub fn filter_region(table: &mut RawTable, region: Region) -> Result<FilterSummary> {
    coerce_numeric_column(table, ENTITY_COLUMN);
    coerce_numeric_column(table, MUNICIPALITY_COLUMN);

    let entity_idx = require_column(table, ENTITY_COLUMN)?;
    let municipality_idx = if region.filter_municipality {
        Some(require_column(table, MUNICIPALITY_COLUMN)?)
    } else {
        None
    };

    let rows_before = table.len();
    table.retain(|row| {
        code_matches(row, entity_idx, region.entity)
            && municipality_idx.map_or(true, |m| code_matches(row, m, region.municipality))
    });

    let mut per_year = BTreeMap::new();
    if let Some(year_idx) = table.column_index(YEAR_COLUMN) {
        for row in &table.rows {
            if let Some(y) = parse_numeric(&row[year_idx]) {
                *per_year.entry(y as i64).or_insert(0) += 1;
            }
        }
    }

    let summary = FilterSummary {
        rows_before,
        rows_after: table.len(),
        per_year,
    };

    if summary.rows_after == 0 {
        warn!(
            entity = region.entity,
            municipality = ?municipality_idx.map(|_| region.municipality),
            "no rows matched the region; check the codes"
        );
    } else {
        info!(
            before = summary.rows_before,
            after = summary.rows_after,
            removed = summary.rows_before - summary.rows_after,
            retained_pct = %format!("{:.2}", summary.retained_pct()),
            "regional filter"
        );
        for (year, count) in &summary.per_year {
            info!(year, count, "retained per year");
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawTable {
        RawTable::from_reader(
            "ANIO,ID_ENTIDAD,ID_MUNICIPIO\n\
             2018,26,30\n\
             2019,26.0,18\n\
             2019,99,30\n\
             2020,,30\n\
             2020,Sonora,30\n\
             2017,26,30\n\
             abc,26,30\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn year_filter_drops_out_of_range_and_unparseable() -> Result<()> {
        let mut t = sample();
        let dropped = filter_year_range(&mut t, YearRange::new(2018, 2024))?;
        assert_eq!(dropped, 2);
        assert!(t.rows.iter().all(|r| r[0] != "2017" && r[0] != "abc"));
        Ok(())
    }

    #[test]
    fn region_filter_is_exact_on_entity() -> Result<()> {
        let mut t = sample();
        let original = t.clone();
        let summary = filter_region(&mut t, Region::default())?;

        assert_eq!(summary.rows_before, 7);
        assert_eq!(summary.rows_after, 4);
        assert!(t.rows.iter().all(|r| r[1] == "26"));

        // every dropped row had a non-matching or missing entity
        let kept = original
            .rows
            .iter()
            .filter(|r| parse_numeric(&r[1]) == Some(26.0))
            .count();
        assert_eq!(kept, summary.rows_after);
        Ok(())
    }

    #[test]
    fn codes_are_coerced_to_numbers_or_missing() -> Result<()> {
        let mut t = sample();
        coerce_numeric_column(&mut t, ENTITY_COLUMN);
        let entities: Vec<&str> = t.rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(entities, vec!["26", "26", "99", "", "", "26", "26"]);
        Ok(())
    }

    #[test]
    fn municipality_filter_only_when_enabled() -> Result<()> {
        let mut t = sample();
        let region = Region {
            filter_municipality: true,
            ..Region::default()
        };
        let summary = filter_region(&mut t, region)?;
        assert_eq!(summary.rows_after, 3);
        assert!(t.rows.iter().all(|r| r[2] == "30"));
        Ok(())
    }

    #[test]
    fn per_year_distribution_of_kept_rows() -> Result<()> {
        let mut t = sample();
        filter_year_range(&mut t, YearRange::new(2018, 2024))?;
        let summary = filter_region(&mut t, Region::default())?;
        assert_eq!(summary.per_year, BTreeMap::from([(2018, 1), (2019, 1)]));
        assert!((summary.retained_pct() - 40.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn missing_entity_column_is_an_error() {
        let mut t = RawTable::from_reader("ANIO\n2019\n".as_bytes()).unwrap();
        assert!(filter_region(&mut t, Region::default()).is_err());
    }
}
