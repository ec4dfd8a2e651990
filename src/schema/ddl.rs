// src/schema/ddl.rs

use crate::db::Backend;

use super::{Column, COLUMNS, INDEXES, TABLE_NAME};

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` for the accident table.
pub fn create_table_statement(backend: Backend) -> String {
    let id = match backend {
        Backend::Postgres => "id SERIAL PRIMARY KEY",
        Backend::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
    };
    let mut cols = Vec::with_capacity(COLUMNS.len() + 1);
    cols.push(format!("    {}", id));
    for c in COLUMNS {
        cols.push(format!("    {} {}", quote_ident(c.name), c.sql_type()));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_ident(TABLE_NAME),
        cols.join(",\n")
    )
}

/// One `CREATE INDEX IF NOT EXISTS` per secondary index, so a kept
/// database can be loaded again.
pub fn create_index_statements() -> Vec<String> {
    INDEXES
        .iter()
        .map(|(index, col)| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(index),
                quote_ident(TABLE_NAME),
                quote_ident(col)
            )
        })
        .collect()
}

/// Single-row parameterized `INSERT` over `columns`.
pub fn insert_statement(backend: Backend, columns: &[Column]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c.name)).collect();
    let params: Vec<String> = (1..=columns.len())
        .map(|i| backend.placeholder(i))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(TABLE_NAME),
        names.join(", "),
        params.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_statement_per_backend() {
        let pg = create_table_statement(Backend::Postgres);
        assert!(pg.starts_with("CREATE TABLE IF NOT EXISTS \"accidentes_hermosillo\""));
        assert!(pg.contains("id SERIAL PRIMARY KEY"));
        assert!(pg.contains("\"causaacci\" VARCHAR(200)"));
        assert!(pg.contains("\"año\" VARCHAR(10)"));

        let lite = create_table_statement(Backend::Sqlite);
        assert!(lite.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn four_idempotent_indexes() {
        let stmts = create_index_statements();
        assert_eq!(stmts.len(), 4);
        assert!(stmts.iter().all(|s| s.contains("IF NOT EXISTS")));
        assert!(stmts[0].ends_with("(\"anio\")"));
    }

    #[test]
    fn insert_placeholders() {
        let cols = &COLUMNS[..3];
        assert_eq!(
            insert_statement(Backend::Postgres, cols),
            "INSERT INTO \"accidentes_hermosillo\" (\"cobertura\", \"id_entidad\", \"id_municipio\") VALUES ($1, $2, $3)"
        );
        assert!(insert_statement(Backend::Sqlite, cols).ends_with("VALUES (?, ?, ?)"));
    }

    #[test]
    fn quoting_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
