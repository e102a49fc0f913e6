//! MySQL data types: parsing of declared type strings, normalization to the
//! `COLUMN_TYPE` form MySQL 8 reports, and the mapping to engine affinities.

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MysqlType {
    /// Normalized base name, lowercase (`int`, `varchar`, `enum`, ...).
    pub data_type: String,
    /// Character length, display width, bit width or fractional seconds.
    pub length: Option<u64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
    pub zerofill: bool,
    /// Members of ENUM and SET, unquoted.
    pub members: Vec<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
}

/// Value domain of a type, as seen by the coercion engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeClass {
    Integer { min: i128, max: i128 },
    Bit { bits: u32 },
    Decimal { precision: u32, scale: u32, unsigned: bool },
    Float { unsigned: bool },
    Date,
    DateTime { fsp: u32 },
    Time { fsp: u32 },
    Year,
    Text { max_chars: Option<u64> },
    Binary { max_bytes: Option<u64> },
    Enum,
    Set,
    Json,
    Spatial,
}

const SPATIAL: &[&str] = &[
    "geometry",
    "point",
    "linestring",
    "polygon",
    "multipoint",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
    "geomcollection",
];

impl MysqlType {
    /// Parses a declared type such as `INT(11) UNSIGNED`, `varchar(255)`,
    /// `ENUM('a','b')` or `double precision`.
    pub fn parse(text: &str) -> Result<MysqlType> {
        let mut lexer = TypeLexer::new(text);
        let mut words = Vec::new();
        while let Some(TypeToken::Word(w)) = lexer.peek() {
            // Modifiers end the base name.
            if matches!(
                w.as_str(),
                "unsigned" | "signed" | "zerofill" | "character" | "charset" | "collate" | "binary"
                    | "ascii" | "unicode"
            ) && !words.is_empty()
            {
                break;
            }
            words.push(w);
            lexer.next();
        }
        if words.is_empty() {
            return Err(DriverError::Parse(format!("invalid data type '{text}'")));
        }

        let mut ty = MysqlType::default();
        let mut args: Vec<String> = Vec::new();
        if let Some(TypeToken::Open) = lexer.peek() {
            lexer.next();
            loop {
                match lexer.next() {
                    Some(TypeToken::Close) | None => break,
                    Some(TypeToken::Comma) => {}
                    Some(TypeToken::Word(w)) => args.push(w),
                    Some(TypeToken::Str(s)) => ty.members.push(s),
                    Some(TypeToken::Open) => {
                        return Err(DriverError::Parse(format!("invalid data type '{text}'")))
                    }
                }
            }
        }
        while let Some(tok) = lexer.next() {
            let TypeToken::Word(w) = tok else { continue };
            match w.as_str() {
                "unsigned" => ty.unsigned = true,
                "zerofill" => {
                    ty.zerofill = true;
                    ty.unsigned = true;
                }
                "character" => {
                    if let Some(TypeToken::Word(set)) = lexer.peek() {
                        if set == "set" {
                            lexer.next();
                        }
                    }
                    if let Some(TypeToken::Word(cs)) = lexer.next() {
                        ty.charset = Some(cs);
                    }
                }
                "charset" => {
                    if let Some(TypeToken::Word(cs)) = lexer.next() {
                        ty.charset = Some(cs);
                    }
                }
                "collate" => {
                    if let Some(TypeToken::Word(c)) = lexer.next() {
                        ty.collation = Some(c);
                    }
                }
                "binary" => ty.collation = Some("binary".into()),
                _ => {}
            }
        }

        let base = words.join(" ");
        let num = |i: usize| -> Option<u64> { args.get(i).and_then(|a| a.parse().ok()) };
        let (name, length, precision, scale): (&str, Option<u64>, Option<u32>, Option<u32>) =
            match base.as_str() {
                "bool" | "boolean" => ("tinyint", Some(1), None, None),
                "tinyint" | "int1" => ("tinyint", num(0), None, None),
                "smallint" | "int2" => ("smallint", num(0), None, None),
                "mediumint" | "int3" | "middleint" => ("mediumint", num(0), None, None),
                "int" | "integer" | "int4" => ("int", num(0), None, None),
                "bigint" | "int8" => ("bigint", num(0), None, None),
                "serial" => {
                    ty.unsigned = true;
                    ("bigint", None, None, None)
                }
                "decimal" | "dec" | "numeric" | "fixed" => (
                    "decimal",
                    None,
                    Some(num(0).unwrap_or(10) as u32),
                    Some(num(1).unwrap_or(0) as u32),
                ),
                "float" => match (num(0), num(1)) {
                    (Some(p), None) if p > 24 => ("double", None, None, None),
                    (Some(p), Some(s)) => ("float", None, Some(p as u32), Some(s as u32)),
                    _ => ("float", None, None, None),
                },
                "double" | "double precision" | "real" | "float8" => {
                    ("double", None, num(0).map(|p| p as u32), num(1).map(|s| s as u32))
                }
                "float4" => ("float", None, None, None),
                "bit" => ("bit", Some(num(0).unwrap_or(1)), None, None),
                "char" | "character" | "nchar" | "national char" | "national character" => {
                    ("char", Some(num(0).unwrap_or(1)), None, None)
                }
                "varchar" | "character varying" | "nvarchar" | "national varchar"
                | "char varying" | "varcharacter" => ("varchar", num(0), None, None),
                "binary" => ("binary", Some(num(0).unwrap_or(1)), None, None),
                "varbinary" => ("varbinary", num(0), None, None),
                "tinytext" => ("tinytext", None, None, None),
                "text" => ("text", None, None, None),
                "mediumtext" | "long varchar" | "long" => ("mediumtext", None, None, None),
                "longtext" => ("longtext", None, None, None),
                "tinyblob" => ("tinyblob", None, None, None),
                "blob" => ("blob", None, None, None),
                "mediumblob" | "long varbinary" => ("mediumblob", None, None, None),
                "longblob" => ("longblob", None, None, None),
                "date" => ("date", None, None, None),
                "datetime" => ("datetime", num(0).filter(|f| *f > 0), None, None),
                "timestamp" => ("timestamp", num(0).filter(|f| *f > 0), None, None),
                "time" => ("time", num(0).filter(|f| *f > 0), None, None),
                "year" => ("year", None, None, None),
                "enum" => ("enum", None, None, None),
                "set" => ("set", None, None, None),
                "json" => ("json", None, None, None),
                other if SPATIAL.contains(&other) => {
                    let name = if other == "geomcollection" { "geometrycollection" } else { other };
                    ty.data_type = name.to_string();
                    return Ok(ty);
                }
                other => {
                    return Err(DriverError::Parse(format!("unknown data type '{other}'")));
                }
            };
        if matches!(name, "varchar" | "varbinary") && length.is_none() {
            return Err(DriverError::Parse(format!(
                "{} requires a length",
                name.to_ascii_uppercase()
            )));
        }
        ty.data_type = name.to_string();
        ty.length = length;
        ty.precision = precision;
        ty.scale = scale;
        Ok(ty)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint"
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob"
        )
    }

    pub fn is_blob_or_text(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "tinytext" | "text" | "mediumtext" | "longtext" | "tinyblob" | "blob" | "mediumblob"
                | "longblob" | "json"
        ) || self.is_spatial()
    }

    pub fn is_spatial(&self) -> bool {
        SPATIAL.contains(&self.data_type.as_str())
    }

    /// The `COLUMN_TYPE` string MySQL 8 reports for this type.
    pub fn column_type(&self) -> String {
        let mut out = match self.data_type.as_str() {
            "tinyint" if self.length == Some(1) && !self.unsigned => "tinyint(1)".to_string(),
            t if self.is_integer() && self.zerofill => {
                format!("{t}({})", self.length.unwrap_or_else(|| default_width(t, self.unsigned)))
            }
            "decimal" => format!(
                "decimal({},{})",
                self.precision.unwrap_or(10),
                self.scale.unwrap_or(0)
            ),
            "float" | "double" => match (self.precision, self.scale) {
                (Some(p), Some(s)) => format!("{}({p},{s})", self.data_type),
                _ => self.data_type.clone(),
            },
            "bit" | "char" | "varchar" | "binary" | "varbinary" => {
                format!("{}({})", self.data_type, self.length.unwrap_or(1))
            }
            "datetime" | "timestamp" | "time" => match self.length {
                Some(fsp) if fsp > 0 => format!("{}({fsp})", self.data_type),
                _ => self.data_type.clone(),
            },
            "enum" | "set" => {
                let members: Vec<String> = self
                    .members
                    .iter()
                    .map(|m| format!("'{}'", m.replace('\'', "''")))
                    .collect();
                format!("{}({})", self.data_type, members.join(","))
            }
            other => other.to_string(),
        };
        if self.unsigned
            && (self.is_integer() || matches!(self.data_type.as_str(), "decimal" | "float" | "double"))
        {
            out.push_str(" unsigned");
        }
        if self.zerofill {
            out.push_str(" zerofill");
        }
        out
    }

    pub fn class(&self) -> TypeClass {
        let unsigned = self.unsigned;
        match self.data_type.as_str() {
            "tinyint" => int_range(8, unsigned),
            "smallint" => int_range(16, unsigned),
            "mediumint" => int_range(24, unsigned),
            "int" => int_range(32, unsigned),
            "bigint" => int_range(64, unsigned),
            "bit" => TypeClass::Bit {
                bits: self.length.unwrap_or(1) as u32,
            },
            "decimal" => TypeClass::Decimal {
                precision: self.precision.unwrap_or(10),
                scale: self.scale.unwrap_or(0),
                unsigned,
            },
            "float" | "double" => TypeClass::Float { unsigned },
            "date" => TypeClass::Date,
            "datetime" | "timestamp" => TypeClass::DateTime {
                fsp: self.length.unwrap_or(0) as u32,
            },
            "time" => TypeClass::Time {
                fsp: self.length.unwrap_or(0) as u32,
            },
            "year" => TypeClass::Year,
            "char" | "varchar" => TypeClass::Text {
                max_chars: self.length,
            },
            "tinytext" => TypeClass::Text { max_chars: Some(255) },
            "text" => TypeClass::Text { max_chars: Some(65_535) },
            "mediumtext" => TypeClass::Text { max_chars: Some(16_777_215) },
            "longtext" => TypeClass::Text { max_chars: None },
            "binary" | "varbinary" => TypeClass::Binary {
                max_bytes: self.length,
            },
            "tinyblob" => TypeClass::Binary { max_bytes: Some(255) },
            "blob" => TypeClass::Binary { max_bytes: Some(65_535) },
            "mediumblob" => TypeClass::Binary { max_bytes: Some(16_777_215) },
            "longblob" => TypeClass::Binary { max_bytes: None },
            "enum" => TypeClass::Enum,
            "set" => TypeClass::Set,
            "json" => TypeClass::Json,
            _ => TypeClass::Spatial,
        }
    }

    /// Engine column affinity.
    pub fn affinity(&self) -> &'static str {
        match self.class() {
            TypeClass::Integer { .. } | TypeClass::Bit { .. } => "INTEGER",
            TypeClass::Decimal { .. } | TypeClass::Float { .. } => "REAL",
            TypeClass::Binary { .. } => "BLOB",
            _ => "TEXT",
        }
    }

    /// Literal MySQL substitutes for an invalid or omitted NOT NULL value
    /// in non-strict mode. Spatial types have none.
    pub fn implicit_default(&self) -> Option<String> {
        let lit = match self.class() {
            TypeClass::Integer { .. }
            | TypeClass::Bit { .. }
            | TypeClass::Decimal { .. }
            | TypeClass::Float { .. } => "0".to_string(),
            TypeClass::Text { .. } | TypeClass::Binary { .. } | TypeClass::Set => "''".to_string(),
            TypeClass::Enum => match self.members.first() {
                Some(first) => format!("'{}'", first.replace('\'', "''")),
                None => "''".to_string(),
            },
            TypeClass::Json => "'null'".to_string(),
            TypeClass::Date => "'0000-00-00'".to_string(),
            TypeClass::DateTime { .. } => "'0000-00-00 00:00:00'".to_string(),
            TypeClass::Time { .. } => "'00:00:00'".to_string(),
            TypeClass::Year => "'0000'".to_string(),
            TypeClass::Spatial => return None,
        };
        Some(lit)
    }

    pub fn character_maximum_length(&self) -> Option<i64> {
        match self.class() {
            TypeClass::Text { max_chars } => Some(max_chars.unwrap_or(4_294_967_295) as i64),
            TypeClass::Binary { max_bytes } => Some(max_bytes.unwrap_or(4_294_967_295) as i64),
            TypeClass::Enum | TypeClass::Set => Some(
                self.members.iter().map(|m| m.chars().count()).max().unwrap_or(0) as i64,
            ),
            _ => None,
        }
    }

    pub fn character_octet_length(&self) -> Option<i64> {
        match self.class() {
            TypeClass::Text { max_chars: Some(n) } if matches!(self.data_type.as_str(), "char" | "varchar") => {
                Some(n as i64 * 4)
            }
            TypeClass::Enum | TypeClass::Set => self.character_maximum_length().map(|n| n * 4),
            _ => self.character_maximum_length(),
        }
    }

    pub fn numeric_precision(&self) -> Option<i64> {
        match self.data_type.as_str() {
            "tinyint" => Some(3),
            "smallint" => Some(5),
            "mediumint" => Some(7),
            "int" => Some(10),
            "bigint" => Some(if self.unsigned { 20 } else { 19 }),
            "decimal" => Some(self.precision.unwrap_or(10) as i64),
            "float" => Some(self.precision.unwrap_or(12) as i64),
            "double" => Some(self.precision.unwrap_or(22) as i64),
            "bit" => Some(self.length.unwrap_or(1) as i64),
            _ => None,
        }
    }

    pub fn numeric_scale(&self) -> Option<i64> {
        match self.data_type.as_str() {
            t if self.is_integer() && !t.is_empty() => Some(0),
            "decimal" => Some(self.scale.unwrap_or(0) as i64),
            "float" | "double" => self.scale.map(|s| s as i64),
            _ => None,
        }
    }

    pub fn datetime_precision(&self) -> Option<i64> {
        match self.data_type.as_str() {
            "datetime" | "timestamp" | "time" => Some(self.length.unwrap_or(0) as i64),
            _ => None,
        }
    }
}

fn int_range(bits: u32, unsigned: bool) -> TypeClass {
    if unsigned {
        TypeClass::Integer {
            min: 0,
            max: (1i128 << bits) - 1,
        }
    } else {
        TypeClass::Integer {
            min: -(1i128 << (bits - 1)),
            max: (1i128 << (bits - 1)) - 1,
        }
    }
}

fn default_width(t: &str, unsigned: bool) -> u64 {
    let w = match t {
        "tinyint" => 4,
        "smallint" => 6,
        "mediumint" => 9,
        "int" => 11,
        _ => 20,
    };
    if unsigned && t != "bigint" {
        w - 1
    } else {
        w
    }
}

/// Infers a MySQL type from an engine declared type using SQLite's
/// column-affinity rules.
pub fn infer_from_affinity(declared: &str) -> &'static str {
    let d = declared.to_ascii_uppercase();
    if d.contains("INT") {
        "int"
    } else if d.contains("CHAR") || d.contains("CLOB") || d.contains("TEXT") {
        "text"
    } else if d.is_empty() || d.contains("BLOB") {
        "longblob"
    } else if d.contains("REAL") || d.contains("FLOA") || d.contains("DOUB") {
        "double"
    } else {
        "decimal(10,0)"
    }
}

/// Default collation MySQL 8 assigns to a character set.
pub fn default_collation(charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "utf8mb4" => "utf8mb4_0900_ai_ci".to_string(),
        "utf8" | "utf8mb3" => "utf8mb3_general_ci".to_string(),
        "latin1" => "latin1_swedish_ci".to_string(),
        "binary" => "binary".to_string(),
        other => format!("{other}_general_ci"),
    }
}

/// Text collations that compare case-insensitively.
pub fn is_case_insensitive(collation: Option<&str>) -> bool {
    match collation {
        None => true,
        Some(c) => {
            let c = c.to_ascii_lowercase();
            !(c == "binary" || c.ends_with("_bin") || c.ends_with("_cs"))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TypeToken {
    Word(String),
    Str(String),
    Open,
    Close,
    Comma,
}

struct TypeLexer {
    tokens: Vec<TypeToken>,
    pos: usize,
}

impl TypeLexer {
    fn new(text: &str) -> Self {
        let mut tokens = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                '(' => tokens.push(TypeToken::Open),
                ')' => tokens.push(TypeToken::Close),
                ',' => tokens.push(TypeToken::Comma),
                '\'' | '"' => {
                    let mut s = String::new();
                    i += 1;
                    while i < chars.len() {
                        if chars[i] == c {
                            if chars.get(i + 1) == Some(&c) {
                                s.push(c);
                                i += 2;
                                continue;
                            }
                            break;
                        }
                        if chars[i] == '\\' && i + 1 < chars.len() {
                            s.push(chars[i + 1]);
                            i += 2;
                            continue;
                        }
                        s.push(chars[i]);
                        i += 1;
                    }
                    tokens.push(TypeToken::Str(s));
                }
                c if c.is_whitespace() || c == '=' => {}
                _ => {
                    let start = i;
                    while i < chars.len()
                        && !chars[i].is_whitespace()
                        && !matches!(chars[i], '(' | ')' | ',' | '\'' | '"' | '=')
                    {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    tokens.push(TypeToken::Word(
                        word.trim_matches('`').to_ascii_lowercase(),
                    ));
                    continue;
                }
            }
            i += 1;
        }
        TypeLexer { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<TypeToken> {
        self.tokens.get(self.pos).cloned()
    }

    fn next(&mut self) -> Option<TypeToken> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_type(s: &str) -> String {
        MysqlType::parse(s).unwrap().column_type()
    }

    #[test]
    fn normalizes_like_mysql_8() {
        assert_eq!(column_type("INT(11)"), "int");
        assert_eq!(column_type("int(10) unsigned"), "int unsigned");
        assert_eq!(column_type("TINYINT(1)"), "tinyint(1)");
        assert_eq!(column_type("BOOLEAN"), "tinyint(1)");
        assert_eq!(column_type("INTEGER"), "int");
        assert_eq!(column_type("DECIMAL"), "decimal(10,0)");
        assert_eq!(column_type("numeric(8, 2)"), "decimal(8,2)");
        assert_eq!(column_type("DOUBLE PRECISION"), "double");
        assert_eq!(column_type("float(30)"), "double");
        assert_eq!(column_type("VARCHAR(255)"), "varchar(255)");
        assert_eq!(column_type("CHAR"), "char(1)");
        assert_eq!(column_type("DATETIME(6)"), "datetime(6)");
        assert_eq!(column_type("DATETIME"), "datetime");
        assert_eq!(column_type("ENUM('a', 'b''c')"), "enum('a','b''c')");
        assert_eq!(column_type("int(5) zerofill"), "int(5) unsigned zerofill");
        assert_eq!(column_type("geomcollection"), "geometrycollection");
    }

    #[test]
    fn rejects_bad_types() {
        assert!(MysqlType::parse("VARCHAR").is_err());
        assert!(MysqlType::parse("wibble").is_err());
    }

    #[test]
    fn affinity_mapping() {
        assert_eq!(MysqlType::parse("bigint").unwrap().affinity(), "INTEGER");
        assert_eq!(MysqlType::parse("decimal(10,2)").unwrap().affinity(), "REAL");
        assert_eq!(MysqlType::parse("longblob").unwrap().affinity(), "BLOB");
        assert_eq!(MysqlType::parse("datetime").unwrap().affinity(), "TEXT");
    }

    #[test]
    fn implicit_defaults() {
        let d = |s: &str| MysqlType::parse(s).unwrap().implicit_default();
        assert_eq!(d("int").as_deref(), Some("0"));
        assert_eq!(d("varchar(10)").as_deref(), Some("''"));
        assert_eq!(d("enum('x','y')").as_deref(), Some("'x'"));
        assert_eq!(d("date").as_deref(), Some("'0000-00-00'"));
        assert_eq!(d("timestamp").as_deref(), Some("'0000-00-00 00:00:00'"));
        assert_eq!(d("year").as_deref(), Some("'0000'"));
        assert_eq!(d("point"), None);
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(
            MysqlType::parse("tinyint").unwrap().class(),
            TypeClass::Integer { min: -128, max: 127 }
        );
        assert_eq!(
            MysqlType::parse("smallint unsigned").unwrap().class(),
            TypeClass::Integer { min: 0, max: 65535 }
        );
    }

    #[test]
    fn affinity_inference() {
        assert_eq!(infer_from_affinity("INTEGER"), "int");
        assert_eq!(infer_from_affinity("VARCHAR(10)"), "text");
        assert_eq!(infer_from_affinity(""), "longblob");
        assert_eq!(infer_from_affinity("REAL"), "double");
        assert_eq!(infer_from_affinity("NUMERIC"), "decimal(10,0)");
    }
}
