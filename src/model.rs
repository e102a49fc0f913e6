use rusqlite::types::{Value, ValueRef};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) => Some(*f as i64),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text form as MySQL would render the value in a text result row.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(format_float(*f)),
            Cell::Text(s) => Some(s.clone()),
            Cell::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Engine literal for this value.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Cell::Null => "NULL".into(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => format_float(*f),
            Cell::Text(s) => crate::ident::string_literal(s),
            Cell::Blob(b) => crate::ident::blob_literal(b),
        }
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Int(i),
            ValueRef::Real(f) => Cell::Float(f),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
}

impl From<&Cell> for Value {
    fn from(c: &Cell) -> Self {
        match c {
            Cell::Null => Value::Null,
            Cell::Int(i) => Value::Integer(*i),
            Cell::Float(f) => Value::Real(*f),
            Cell::Text(s) => Value::Text(s.clone()),
            Cell::Blob(b) => Value::Blob(b.clone()),
        }
    }
}

/// Renders a float without a trailing `.0` for integral values, matching
/// MySQL's text protocol output for DOUBLE columns.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutput {
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        info: String,
    },
    ResultSet {
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    },
}

impl ExecOutput {
    pub fn ok() -> Self {
        ExecOutput::affected(0)
    }

    pub fn affected(affected_rows: u64) -> Self {
        ExecOutput::Ok {
            affected_rows,
            last_insert_id: 0,
            info: String::new(),
        }
    }

    pub fn rows(columns: &[&str], rows: Vec<Vec<Cell>>) -> Self {
        ExecOutput::ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}
