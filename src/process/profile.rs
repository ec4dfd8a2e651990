use std::collections::HashSet;
use tracing::info;

use crate::process::{
    raw_table::RawTable,
    utils::{parse_numeric, ENTITY_COLUMN, MUNICIPALITY_COLUMN, YEAR_COLUMN},
};

/// First look at the consolidated data before it is transformed.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    pub rows: usize,
    pub columns: usize,
    pub year_min: Option<i64>,
    pub year_max: Option<i64>,
    pub distinct_entities: usize,
    pub distinct_municipalities: usize,
    /// Cells that are empty after trimming.
    pub empty_cells: usize,
}

fn distinct_non_empty(table: &RawTable, name: &str) -> usize {
    let Some(idx) = table.column_index(name) else {
        return 0;
    };
    table
        .rows
        .iter()
        .map(|r| r[idx].trim())
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

pub fn profile(table: &RawTable) -> TableProfile {
    let years: Vec<i64> = table
        .column_index(YEAR_COLUMN)
        .map(|idx| {
            table
                .rows
                .iter()
                .filter_map(|r| parse_numeric(&r[idx]))
                .map(|y| y as i64)
                .collect()
        })
        .unwrap_or_default();

    TableProfile {
        rows: table.len(),
        columns: table.headers.len(),
        year_min: years.iter().min().copied(),
        year_max: years.iter().max().copied(),
        distinct_entities: distinct_non_empty(table, ENTITY_COLUMN),
        distinct_municipalities: distinct_non_empty(table, MUNICIPALITY_COLUMN),
        empty_cells: table
            .rows
            .iter()
            .flatten()
            .filter(|c| c.trim().is_empty())
            .count(),
    }
}

/// Log the profile plus the first and last few column names.
pub fn log_profile(table: &RawTable, p: &TableProfile) {
    info!(
        rows = p.rows,
        columns = p.columns,
        year_min = ?p.year_min,
        year_max = ?p.year_max,
        entities = p.distinct_entities,
        municipalities = p.distinct_municipalities,
        empty_cells = p.empty_cells,
        "dataset profile"
    );
    let n = table.headers.len();
    info!(
        first = ?&table.headers[..n.min(5)],
        last = ?&table.headers[n.saturating_sub(5)..],
        "columns"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_counts() {
        let t = RawTable::from_reader(
            "ANIO,ID_ENTIDAD,ID_MUNICIPIO,TIPACCID\n\
             2019,26,30,Colisión\n\
             2021,26,18,\n\
             2018,9,30, \n"
                .as_bytes(),
        )
        .unwrap();
        let p = profile(&t);
        assert_eq!(p.rows, 3);
        assert_eq!(p.columns, 4);
        assert_eq!(p.year_min, Some(2018));
        assert_eq!(p.year_max, Some(2021));
        assert_eq!(p.distinct_entities, 2);
        assert_eq!(p.distinct_municipalities, 2);
        assert_eq!(p.empty_cells, 2);
    }

    #[test]
    fn profile_of_empty_table() {
        let p = profile(&RawTable::new(vec!["ANIO".into()]));
        assert_eq!(p.rows, 0);
        assert_eq!(p.year_min, None);
    }
}
