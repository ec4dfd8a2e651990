use tracing::{info, warn};

use crate::config::YearRange;
use crate::process::{raw_table::RawTable, utils::parse_numeric};
use crate::schema::{Column, ColumnKind, COLUMNS};

/// A cell typed for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Int(i32),
    Text(String),
}

/// Integer coercion that never fails: numbers (decimals truncated toward
/// zero) map to themselves, everything else, including out-of-range
/// values, maps to 0.
pub fn coerce_int(raw: &str) -> i32 {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i32>() {
        return v;
    }
    match parse_numeric(s) {
        Some(v) if v.trunc() >= i32::MIN as f64 && v.trunc() <= i32::MAX as f64 => v.trunc() as i32,
        _ => 0,
    }
}

/// Text coercion: the cell as written; a missing cell is already `""`.
pub fn coerce_text(raw: Option<&str>) -> String {
    raw.unwrap_or_default().to_string()
}

pub fn coerce_cell(column: &Column, raw: Option<&str>) -> CellValue {
    match column.kind {
        ColumnKind::Integer => CellValue::Int(raw.map(coerce_int).unwrap_or(0)),
        ColumnKind::Text(_) => CellValue::Text(coerce_text(raw)),
    }
}

/// Mapping from the fixed table columns to positions in a `RawTable`.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub columns: &'static [Column],
    /// Source index per column; `None` when the input lacks it.
    sources: Vec<Option<usize>>,
    /// Input columns that have no table counterpart.
    pub ignored: Vec<String>,
}

impl LoadPlan {
    pub fn new(table: &RawTable) -> Self {
        let sources: Vec<Option<usize>> = COLUMNS
            .iter()
            .map(|c| table.column_index(&c.source_name()))
            .collect();
        let known: Vec<String> = COLUMNS.iter().map(Column::source_name).collect();
        let ignored: Vec<String> = table
            .headers
            .iter()
            .filter(|h| !known.contains(h))
            .cloned()
            .collect();

        let missing: Vec<&str> = COLUMNS
            .iter()
            .zip(&sources)
            .filter(|(_, s)| s.is_none())
            .map(|(c, _)| c.name)
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "table columns absent from input; loading defaults");
        }
        if !ignored.is_empty() {
            warn!(?ignored, "input columns not in the table; ignoring");
        }

        Self {
            columns: COLUMNS,
            sources,
            ignored,
        }
    }

    pub fn coerce_row(&self, row: &[String]) -> Vec<CellValue> {
        self.columns
            .iter()
            .zip(&self.sources)
            .map(|(col, src)| coerce_cell(col, src.map(|i| row[i].as_str())))
            .collect()
    }

    fn year_position(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.name == "anio")
    }
}

/// Coerce every row of `table` through `plan`, then drop rows whose
/// coerced `anio` falls below `years.min` (unparseable years coerce to 0).
pub fn coerce_rows(plan: &LoadPlan, table: &RawTable, years: YearRange) -> Vec<Vec<CellValue>> {
    let year_pos = plan.year_position();
    let mut rows: Vec<Vec<CellValue>> = table.rows.iter().map(|r| plan.coerce_row(r)).collect();
    let before = rows.len();
    if let Some(pos) = year_pos {
        rows.retain(|r| matches!(r[pos], CellValue::Int(y) if y >= years.min));
    }
    let dropped = before - rows.len();
    if dropped > 0 {
        warn!(dropped, min = years.min, "rows with year below range after coercion");
    }
    info!(rows = rows.len(), "types converted");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_coercion_is_total() {
        for (raw, want) in [
            ("7", 7),
            (" 7 ", 7),
            ("3.0", 3),
            ("3.9", 3),
            ("-2.5", -2),
            ("", 0),
            ("NaN", 0),
            ("inf", 0),
            ("Certificada", 0),
            ("99999999999", 0),
            ("1e3", 1000),
        ] {
            assert_eq!(coerce_int(raw), want, "{:?}", raw);
        }
    }

    #[test]
    fn text_coercion_keeps_content() {
        assert_eq!(coerce_text(Some("Colisión con peatón")), "Colisión con peatón");
        assert_eq!(coerce_text(None), "");
    }

    #[test]
    fn plan_maps_known_columns_and_defaults_missing() {
        let t = RawTable::from_reader(
            "ANIO,ID_ENTIDAD,TIPACCID,AÑO,EXTRA\n2019,26.0,Colisión,2019,x\n".as_bytes(),
        )
        .unwrap();
        let plan = LoadPlan::new(&t);
        assert_eq!(plan.ignored, vec!["EXTRA"]);

        let row = plan.coerce_row(&t.rows[0]);
        assert_eq!(row.len(), COLUMNS.len());
        let get = |name: &str| row[COLUMNS.iter().position(|c| c.name == name).unwrap()].clone();
        assert_eq!(get("anio"), CellValue::Int(2019));
        assert_eq!(get("id_entidad"), CellValue::Int(26));
        assert_eq!(get("tipaccid"), CellValue::Text("Colisión".into()));
        assert_eq!(get("año"), CellValue::Text("2019".into()));
        assert_eq!(get("automovil"), CellValue::Int(0));
        assert_eq!(get("estatus"), CellValue::Text(String::new()));
    }

    #[test]
    fn second_year_check_drops_low_years() {
        let t = RawTable::from_reader("ANIO\n2019\n2017\nbad\n".as_bytes()).unwrap();
        let plan = LoadPlan::new(&t);
        let rows = coerce_rows(&plan, &t, YearRange::new(2018, 2024));
        assert_eq!(rows.len(), 1);
    }
}
