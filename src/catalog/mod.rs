//! Shadow INFORMATION_SCHEMA: typed rows, the store that persists them, the
//! mutator that keeps them consistent across DDL, the physical schema they
//! describe, and the startup reconciler.

pub mod builder;
pub mod ddl;
pub mod reconciler;
pub mod reconstruct;
pub mod store;
pub mod types;

use crate::ident;
use types::MysqlType;

/// Schema name stored in catalog rows. The configured schema name is
/// substituted when rows are read back through INFORMATION_SCHEMA.
pub const SCHEMA_SENTINEL: &str = "main";

pub const DEFAULT_ENGINE: &str = "InnoDB";
pub const DEFAULT_CHARSET: &str = "utf8mb4";
pub const DEFAULT_COLLATION: &str = "utf8mb4_0900_ai_ci";

#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub expression: String,
    pub stored: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: MysqlType,
    pub nullable: bool,
    /// Raw default. `None` means no default, or DEFAULT NULL on a nullable
    /// column.
    pub default: Option<String>,
    /// The default is an expression (`CURRENT_TIMESTAMP`, `(expr)`).
    pub default_generated: bool,
    pub auto_increment: bool,
    pub on_update_current_timestamp: bool,
    pub generated: Option<Generated>,
    pub comment: String,
    /// Derived: `PRI`, `UNI`, `MUL` or empty.
    pub key: String,
}

impl ColumnInfo {
    pub fn new(name: &str, ty: MysqlType) -> Self {
        ColumnInfo {
            name: name.to_string(),
            ty,
            nullable: true,
            default: None,
            default_generated: false,
            auto_increment: false,
            on_update_current_timestamp: false,
            generated: None,
            comment: String::new(),
            key: String::new(),
        }
    }

    pub fn extra(&self) -> String {
        let mut parts = Vec::new();
        if self.auto_increment {
            parts.push("auto_increment".to_string());
        }
        if self.default_generated {
            parts.push("DEFAULT_GENERATED".to_string());
        }
        if self.on_update_current_timestamp {
            parts.push("on update CURRENT_TIMESTAMP".to_string());
        }
        if let Some(g) = &self.generated {
            parts.push(if g.stored { "STORED GENERATED" } else { "VIRTUAL GENERATED" }.to_string());
        }
        parts.join(" ")
    }

    /// True when an INSERT may omit the column without MySQL complaining.
    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.nullable || self.auto_increment || self.generated.is_some()
    }

    pub fn charset(&self) -> Option<String> {
        if !self.ty.is_textual() {
            return None;
        }
        Some(
            self.ty
                .charset
                .clone()
                .unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
        )
    }

    pub fn collation(&self) -> Option<String> {
        if !self.ty.is_textual() {
            return None;
        }
        Some(match &self.ty.collation {
            Some(c) if c == "binary" => format!("{}_bin", self.charset().unwrap_or_default()),
            Some(c) => c.clone(),
            None => DEFAULT_COLLATION.to_string(),
        })
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.ty.is_textual() && types::is_case_insensitive(self.collation().as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Btree,
    Fulltext,
    Spatial,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Btree => "BTREE",
            IndexKind::Fulltext => "FULLTEXT",
            IndexKind::Spatial => "SPATIAL",
        }
    }

    pub fn parse(s: &str) -> IndexKind {
        match s.to_ascii_uppercase().as_str() {
            "FULLTEXT" => IndexKind::Fulltext,
            "SPATIAL" => IndexKind::Spatial,
            _ => IndexKind::Btree,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyPart {
    pub column: Option<String>,
    /// Functional key part; `column` is `None`.
    pub expression: Option<String>,
    pub sub_part: Option<u32>,
    pub descending: bool,
}

impl KeyPart {
    pub fn column(name: &str) -> Self {
        KeyPart {
            column: Some(name.to_string()),
            expression: None,
            sub_part: None,
            descending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub kind: IndexKind,
    pub parts: Vec<KeyPart>,
    pub comment: String,
    pub visible: bool,
}

impl IndexInfo {
    pub fn is_primary(&self) -> bool {
        self.name == "PRIMARY"
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.parts.iter().filter_map(|p| p.column.as_deref()).collect()
    }

    pub fn covers_column(&self, column: &str) -> bool {
        self.parts
            .iter()
            .any(|p| p.column.as_deref().is_some_and(|c| ident::eq(c, column)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckInfo {
    pub name: String,
    pub clause: String,
    pub enforced: bool,
}

/// Everything the catalog knows about one table. The mutator edits this
/// model and the store persists it as INFORMATION_SCHEMA rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub temporary: bool,
    pub engine: String,
    pub row_format: String,
    pub collation: String,
    pub comment: String,
    pub auto_increment: Option<i64>,
    pub create_time: String,
    pub columns: Vec<ColumnInfo>,
    /// PRIMARY first, then in creation order.
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub checks: Vec<CheckInfo>,
}

impl TableSchema {
    pub fn new(name: &str, temporary: bool) -> Self {
        TableSchema {
            name: name.to_string(),
            temporary,
            engine: DEFAULT_ENGINE.to_string(),
            row_format: "Dynamic".to_string(),
            collation: DEFAULT_COLLATION.to_string(),
            comment: String::new(),
            auto_increment: None,
            create_time: String::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| ident::eq(&c.name, name))
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| ident::eq(&c.name, name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| ident::eq(&i.name, name))
    }

    pub fn primary_key(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.is_primary())
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Recomputes the derived `key` and PK nullability of every column.
    pub fn sync_derived(&mut self) {
        let primary: Vec<String> = self
            .primary_key()
            .map(|pk| pk.column_names().iter().map(|c| ident::fold(c)).collect())
            .unwrap_or_default();
        let mut keys = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let folded = ident::fold(&column.name);
            let key = if primary.contains(&folded) {
                "PRI"
            } else if self.indexes.iter().any(|i| {
                i.unique
                    && i.parts.len() == 1
                    && i.parts[0].column.as_deref().is_some_and(|c| ident::eq(c, &column.name))
            }) {
                "UNI"
            } else if self.indexes.iter().any(|i| {
                i.parts
                    .first()
                    .and_then(|p| p.column.as_deref())
                    .is_some_and(|c| ident::eq(c, &column.name))
            }) {
                "MUL"
            } else {
                ""
            };
            keys.push(key);
        }
        for (column, key) in self.columns.iter_mut().zip(keys) {
            column.key = key.to_string();
            if key == "PRI" {
                column.nullable = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, ty: &str) -> ColumnInfo {
        ColumnInfo::new(name, MysqlType::parse(ty).unwrap())
    }

    fn index(name: &str, unique: bool, cols: &[&str]) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            unique,
            kind: IndexKind::Btree,
            parts: cols.iter().map(|c| KeyPart::column(c)).collect(),
            comment: String::new(),
            visible: true,
        }
    }

    #[test]
    fn derived_keys_follow_mysql_precedence() {
        let mut t = TableSchema::new("t", false);
        t.columns = vec![
            column("id", "int"),
            column("email", "varchar(100)"),
            column("a", "int"),
            column("b", "int"),
        ];
        t.indexes = vec![
            index("PRIMARY", true, &["id"]),
            index("email", true, &["email"]),
            index("ab", true, &["a", "b"]),
        ];
        t.sync_derived();
        let keys: Vec<&str> = t.columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["PRI", "UNI", "MUL", ""]);
        assert!(!t.columns[0].nullable);
    }

    #[test]
    fn extra_flags_render_in_mysql_order() {
        let mut c = column("ts", "timestamp");
        c.default = Some("CURRENT_TIMESTAMP".into());
        c.default_generated = true;
        c.on_update_current_timestamp = true;
        assert_eq!(c.extra(), "DEFAULT_GENERATED on update CURRENT_TIMESTAMP");
        assert_eq!(c.charset(), None);
        assert_eq!(column("n", "varchar(5)").collation().as_deref(), Some(DEFAULT_COLLATION));
    }
}
