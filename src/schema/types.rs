// src/schema/types.rs

/// SQL type of a loaded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// `INTEGER`; unparseable input loads as 0.
    Integer,
    /// `VARCHAR(n)`; missing input loads as an empty string.
    Text(u16),
}

/// A single column of the accident table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// SQL name, lower-case.
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }

    pub const fn text(name: &'static str, len: u16) -> Self {
        Self {
            name,
            kind: ColumnKind::Text(len),
        }
    }

    /// Name of the CSV column this one is loaded from (canonical, upper-case).
    pub fn source_name(&self) -> String {
        self.name.to_uppercase()
    }

    pub fn sql_type(&self) -> String {
        match self.kind {
            ColumnKind::Integer => "INTEGER".to_string(),
            ColumnKind::Text(len) => format!("VARCHAR({})", len),
        }
    }

    pub fn is_integer(&self) -> bool {
        self.kind == ColumnKind::Integer
    }
}
