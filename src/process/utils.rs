use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Column added by the consolidator with the year encoded in the file name.
pub const SOURCE_YEAR_COLUMN: &str = "AÑO";
pub const YEAR_COLUMN: &str = "ANIO";
pub const ENTITY_COLUMN: &str = "ID_ENTIDAD";
pub const MUNICIPALITY_COLUMN: &str = "ID_MUNICIPIO";

/// File-name prefix of the yearly CSVs inside the archive.
pub const YEARLY_FILE_PREFIX: &str = "atus_anual_";

static YEARLY_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{}.*\.csv$", regex::escape(YEARLY_FILE_PREFIX)))
        .expect("yearly file pattern is valid")
});

/// The one canonical spelling of a column name: trimmed, without embedded
/// line breaks or byte-order mark, upper-cased.
pub fn canonical_column(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .to_uppercase()
}

/// `true` for names shaped like `atus_anual_<something>.csv`.
pub fn is_yearly_file(file_name: &str) -> bool {
    YEARLY_FILE.is_match(file_name)
}

/// Glob for the candidate yearly CSVs under `dir`. It may over-match on
/// case-insensitive file systems; callers confirm with [`is_yearly_file`].
pub fn yearly_file_glob(dir: &Path) -> PathBuf {
    dir.join(format!("{}*.csv", YEARLY_FILE_PREFIX))
}

/// Year encoded after the last `_` of a yearly file name.
/// `atus_anual_2019.csv` → `Some(2019)`; `atus_anual_old.csv` → `None`.
pub fn year_from_file_name(path: &Path) -> Option<i32> {
    let name = path.file_name()?.to_str()?;
    let suffix = name.rsplit('_').next()?;
    suffix.replace(".csv", "").trim().parse().ok()
}

/// Lenient numeric read of a cell: integers, decimals (`"26.0"`) and
/// surrounding whitespace are accepted; anything else is missing.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a parsed numeric cell back to text, dropping a zero fraction.
pub fn format_numeric(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_column_trims_strips_and_upcases() {
        assert_eq!(canonical_column("  anio "), "ANIO");
        assert_eq!(canonical_column("id_\r\nentidad"), "ID_ENTIDAD");
        assert_eq!(canonical_column("año"), "AÑO");
        assert_eq!(canonical_column("\u{feff}COBERTURA"), "COBERTURA");
    }

    #[test]
    fn year_comes_from_last_underscore() {
        assert_eq!(year_from_file_name(Path::new("x/atus_anual_2019.csv")), Some(2019));
        assert_eq!(year_from_file_name(Path::new("atus_anual_old.csv")), None);
        assert_eq!(year_from_file_name(Path::new("atus_anual_.csv")), None);
    }

    #[test]
    fn yearly_file_pattern() {
        assert!(is_yearly_file("atus_anual_2020.csv"));
        assert!(!is_yearly_file("diccionario_de_datos.csv"));
        assert!(!is_yearly_file("atus_anual_2020.csv.bak"));
    }

    #[test]
    fn glob_and_regex_share_the_prefix() {
        let pattern = yearly_file_glob(Path::new("datos"));
        assert_eq!(pattern, PathBuf::from("datos/atus_anual_*.csv"));
        let name = pattern.file_name().unwrap().to_str().unwrap().replace('*', "2021");
        assert!(is_yearly_file(&name));
    }

    #[test]
    fn numeric_parsing_is_lenient() {
        assert_eq!(parse_numeric(" 26 "), Some(26.0));
        assert_eq!(parse_numeric("26.0"), Some(26.0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("Sonora"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(format_numeric(26.0), "26");
        assert_eq!(format_numeric(2.5), "2.5");
    }
}
