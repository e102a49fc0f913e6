//! Scalar functions registered on every engine connection: MySQL built-ins
//! SQLite lacks, and the value normalizers used by translated writes.

use crate::coercion;
use crate::error::DriverError;
use crate::ident;
use crate::model::Cell;
use regex::RegexBuilder;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{ToSql, Value};
use rusqlite::Connection;
use sha1::{Digest, Sha1};

/// Error raised from inside a function. Its text carries the MySQL error
/// number back through the engine, see `engine::reinterpret`.
#[derive(Debug, thiserror::Error)]
#[error("mysql-error:{code}:{message}")]
struct Thrown {
    code: u16,
    message: String,
}

fn thrown(err: DriverError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(Thrown {
        code: err.code(),
        message: err.to_string(),
    }))
}

fn scalar<T, F>(conn: &Connection, name: &str, n_arg: i32, f: F) -> rusqlite::Result<()>
where
    T: ToSql,
    F: FnMut(&Context<'_>) -> rusqlite::Result<T> + Send + 'static,
{
    conn.create_scalar_function(
        name,
        n_arg,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        f,
    )
}

fn cell(ctx: &Context<'_>, i: usize) -> Cell {
    Cell::from(ctx.get_raw(i))
}

fn text(ctx: &Context<'_>, i: usize) -> Option<String> {
    cell(ctx, i).to_text()
}

fn float(ctx: &Context<'_>, i: usize) -> Option<f64> {
    match cell(ctx, i) {
        Cell::Null => None,
        Cell::Int(n) => Some(n as f64),
        Cell::Float(f) => Some(f),
        other => other
            .to_text()
            .and_then(|s| s.trim().parse().ok())
            .or(Some(0.0)),
    }
}

fn int(ctx: &Context<'_>, i: usize) -> Option<i64> {
    match cell(ctx, i) {
        Cell::Null => None,
        Cell::Float(f) => Some(f.round() as i64),
        other => Some(other.as_i64().unwrap_or(0)),
    }
}

/// Runs a normalizer and converts its outcome into a function result.
fn normalized(result: crate::error::Result<Cell>) -> rusqlite::Result<Value> {
    result.map(|c| Value::from(&c)).map_err(thrown)
}

pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    scalar(conn, "_mysql_throw", 2, |ctx| -> rusqlite::Result<Value> {
        let code = int(ctx, 0).unwrap_or(1105) as u16;
        let message = text(ctx, 1).unwrap_or_default();
        Err(thrown(DriverError::value(code, message)))
    })?;

    register_patterns(conn)?;
    register_strings(conn)?;
    register_math(conn)?;
    register_normalizers(conn)
}

fn regex_error() -> rusqlite::Error {
    thrown(DriverError::value(
        3685,
        "Illegal argument to a regular expression.",
    ))
}

fn register_patterns(conn: &Connection) -> rusqlite::Result<()> {
    // (text, pattern, case_insensitive)
    scalar(conn, "_mysql_regexp", 3, |ctx| {
        let (Some(subject), Some(pattern)) = (text(ctx, 0), text(ctx, 1)) else {
            return Ok(None);
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(int(ctx, 2).unwrap_or(1) != 0)
            .build()
            .map_err(|_| regex_error())?;
        Ok(Some(re.is_match(&subject) as i64))
    })?;
    scalar(conn, "_mysql_regexp_replace", 3, |ctx| {
        let (Some(subject), Some(pattern), Some(replacement)) =
            (text(ctx, 0), text(ctx, 1), text(ctx, 2))
        else {
            return Ok(None);
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|_| regex_error())?;
        Ok(Some(re.replace_all(&subject, replacement.as_str()).into_owned()))
    })?;
    scalar(conn, "_mysql_regexp_substr", 2, |ctx| {
        let (Some(subject), Some(pattern)) = (text(ctx, 0), text(ctx, 1)) else {
            return Ok(None);
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|_| regex_error())?;
        Ok(re.find(&subject).map(|m| m.as_str().to_string()))
    })?;
    // (text, pattern, escape)
    scalar(conn, "_mysql_like_binary", 3, |ctx| {
        let (Some(subject), Some(pattern)) = (text(ctx, 0), text(ctx, 1)) else {
            return Ok(None);
        };
        let escape = text(ctx, 2).and_then(|e| e.chars().next()).unwrap_or('\\');
        Ok(Some(ident::like_matches(&subject, &pattern, escape, true) as i64))
    })
}

fn pad(ctx: &Context<'_>, left: bool) -> Option<String> {
    let s = text(ctx, 0)?;
    let len = int(ctx, 1)?;
    let filler = text(ctx, 2)?;
    if len < 0 {
        return None;
    }
    let len = len as usize;
    let chars: Vec<char> = s.chars().collect();
    if chars.len() >= len {
        return Some(chars[..len].iter().collect());
    }
    if filler.is_empty() {
        return None;
    }
    let padding: String = filler.chars().cycle().take(len - chars.len()).collect();
    Some(if left { padding + &s } else { s + &padding })
}

fn register_strings(conn: &Connection) -> rusqlite::Result<()> {
    scalar(conn, "_mysql_find_in_set", 2, |ctx| {
        let (Some(needle), Some(list)) = (text(ctx, 0), text(ctx, 1)) else {
            return Ok(None);
        };
        if needle.contains(',') || list.is_empty() {
            return Ok(Some(0i64));
        }
        Ok(Some(
            list.split(',')
                .position(|item| item.eq_ignore_ascii_case(&needle))
                .map(|p| p as i64 + 1)
                .unwrap_or(0),
        ))
    })?;
    scalar(conn, "_mysql_lpad", 3, |ctx| Ok(pad(ctx, true)))?;
    scalar(conn, "_mysql_rpad", 3, |ctx| Ok(pad(ctx, false)))?;
    scalar(conn, "_mysql_repeat", 2, |ctx| {
        let (Some(s), Some(n)) = (text(ctx, 0), int(ctx, 1)) else {
            return Ok(None);
        };
        Ok(Some(if n <= 0 { String::new() } else { s.repeat(n as usize) }))
    })?;
    scalar(conn, "_mysql_reverse", 1, |ctx| {
        Ok(text(ctx, 0).map(|s| s.chars().rev().collect::<String>()))
    })?;
    scalar(conn, "_mysql_sha1", 1, |ctx| {
        let bytes = match cell(ctx, 0) {
            Cell::Null => return Ok(None),
            Cell::Blob(b) => b,
            other => other.to_text().unwrap_or_default().into_bytes(),
        };
        let digest = Sha1::digest(&bytes);
        Ok(Some(digest.iter().map(|b| format!("{b:02x}")).collect::<String>()))
    })?;
    scalar(conn, "_mysql_substring_index", 3, |ctx| {
        let (Some(s), Some(delim), Some(count)) = (text(ctx, 0), text(ctx, 1), int(ctx, 2)) else {
            return Ok(None);
        };
        Ok(Some(substring_index(&s, &delim, count)))
    })?;
    // LOCATE(substr, str, pos)
    scalar(conn, "_mysql_locate", 3, |ctx| {
        let (Some(needle), Some(hay), Some(pos)) = (text(ctx, 0), text(ctx, 1), int(ctx, 2)) else {
            return Ok(None);
        };
        if pos < 1 {
            return Ok(Some(0i64));
        }
        let chars: Vec<char> = hay.chars().collect();
        let start = (pos - 1) as usize;
        if start > chars.len() {
            return Ok(Some(0));
        }
        let tail: String = chars[start..].iter().collect();
        Ok(Some(match tail.to_lowercase().find(&needle.to_lowercase()) {
            Some(byte) => (tail[..byte].chars().count() + start + 1) as i64,
            None => 0,
        }))
    })
}

pub fn substring_index(s: &str, delim: &str, count: i64) -> String {
    if delim.is_empty() || count == 0 {
        return String::new();
    }
    let parts: Vec<&str> = s.split(delim).collect();
    let n = count.unsigned_abs() as usize;
    if n >= parts.len() {
        return s.to_string();
    }
    if count > 0 {
        parts[..n].join(delim)
    } else {
        parts[parts.len() - n..].join(delim)
    }
}

fn numeric_result(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Integer(f as i64)
    } else {
        Value::Real(f)
    }
}

fn unary(conn: &Connection, name: &str, op: fn(f64) -> Option<f64>) -> rusqlite::Result<()> {
    scalar(conn, name, 1, move |ctx| {
        Ok(float(ctx, 0).and_then(op).filter(|r| r.is_finite()).map(Value::Real))
    })
}

fn register_math(conn: &Connection) -> rusqlite::Result<()> {
    scalar(conn, "_mysql_ceil", 1, |ctx| match cell(ctx, 0) {
        Cell::Int(n) => Ok(Some(Value::Integer(n))),
        _ => Ok(float(ctx, 0).map(|f| numeric_result(f.ceil()))),
    })?;
    scalar(conn, "_mysql_floor", 1, |ctx| match cell(ctx, 0) {
        Cell::Int(n) => Ok(Some(Value::Integer(n))),
        _ => Ok(float(ctx, 0).map(|f| numeric_result(f.floor()))),
    })?;
    scalar(conn, "_mysql_pow", 2, |ctx| {
        let (Some(x), Some(y)) = (float(ctx, 0), float(ctx, 1)) else {
            return Ok(None);
        };
        Ok(Some(x.powf(y)).filter(|r| r.is_finite()))
    })?;
    unary(conn, "_mysql_sqrt", |x| (x >= 0.0).then(|| x.sqrt()))?;
    unary(conn, "_mysql_ln", |x| (x > 0.0).then(|| x.ln()))?;
    unary(conn, "_mysql_log", |x| (x > 0.0).then(|| x.ln()))?;
    unary(conn, "_mysql_log2", |x| (x > 0.0).then(|| x.log2()))?;
    unary(conn, "_mysql_log10", |x| (x > 0.0).then(|| x.log10()))?;
    unary(conn, "_mysql_exp", |x| Some(x.exp()))?;
    scalar(conn, "_mysql_log", 2, |ctx| {
        let (Some(base), Some(x)) = (float(ctx, 0), float(ctx, 1)) else {
            return Ok(None);
        };
        if base <= 0.0 || base == 1.0 || x <= 0.0 {
            return Ok(None);
        }
        Ok(Some(x.ln() / base.ln()))
    })?;
    scalar(conn, "_mysql_mod", 2, |ctx| match (cell(ctx, 0), cell(ctx, 1)) {
        (Cell::Int(_), Cell::Int(0)) => Ok(None),
        (Cell::Int(a), Cell::Int(b)) => Ok(Some(Value::Integer(a.wrapping_rem(b)))),
        _ => match (float(ctx, 0), float(ctx, 1)) {
            (Some(a), Some(b)) if b != 0.0 => Ok(Some(Value::Real(a % b))),
            _ => Ok(None),
        },
    })?;
    scalar(conn, "_mysql_truncate", 2, |ctx| {
        let (Some(x), Some(d)) = (float(ctx, 0), int(ctx, 1)) else {
            return Ok(None);
        };
        let factor = 10f64.powi(d.clamp(-30, 30) as i32);
        let truncated = (x * factor).trunc() / factor;
        Ok(Some(if d <= 0 {
            numeric_result(truncated)
        } else {
            Value::Real(truncated)
        }))
    })
}

fn register_normalizers(conn: &Connection) -> rusqlite::Result<()> {
    // (value, min, max, flags, column)
    scalar(conn, "_mysql_int", 5, |ctx| {
        normalized(coercion::normalize_int(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(i64::MIN),
            int(ctx, 2).unwrap_or(i64::MAX),
            int(ctx, 3).unwrap_or(0),
            &text(ctx, 4).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_bit", 4, |ctx| {
        normalized(coercion::normalize_bit(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(1),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    // (value, precision, scale, unsigned, flags, column)
    scalar(conn, "_mysql_decimal", 6, |ctx| {
        normalized(coercion::normalize_decimal(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(10),
            int(ctx, 2).unwrap_or(0),
            int(ctx, 3).unwrap_or(0) != 0,
            int(ctx, 4).unwrap_or(0),
            &text(ctx, 5).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_float", 4, |ctx| {
        normalized(coercion::normalize_float(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(0) != 0,
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_string", 4, |ctx| {
        normalized(coercion::normalize_string(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(-1),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_binary", 4, |ctx| {
        normalized(coercion::normalize_binary(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(-1),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_enum", 4, |ctx| {
        normalized(coercion::normalize_enum(
            &cell(ctx, 0),
            &text(ctx, 1).unwrap_or_default(),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_set", 4, |ctx| {
        normalized(coercion::normalize_set(
            &cell(ctx, 0),
            &text(ctx, 1).unwrap_or_default(),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_date", 3, |ctx| {
        normalized(coercion::normalize_date(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(0),
            &text(ctx, 2).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_datetime", 4, |ctx| {
        normalized(coercion::normalize_datetime(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(0),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_time", 4, |ctx| {
        normalized(coercion::normalize_time(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(0),
            int(ctx, 2).unwrap_or(0),
            &text(ctx, 3).unwrap_or_default(),
        ))
    })?;
    scalar(conn, "_mysql_year", 3, |ctx| {
        normalized(coercion::normalize_year(
            &cell(ctx, 0),
            int(ctx, 1).unwrap_or(0),
            &text(ctx, 2).unwrap_or_default(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::THROW_MARKER;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        conn
    }

    fn scalar_text(conn: &Connection, sql: &str) -> Option<String> {
        conn.query_row(sql, [], |r| r.get::<_, Option<String>>(0))
            .unwrap()
    }

    fn scalar_i64(conn: &Connection, sql: &str) -> Option<i64> {
        conn.query_row(sql, [], |r| r.get::<_, Option<i64>>(0))
            .unwrap()
    }

    #[test]
    fn thrown_text_carries_the_marker() {
        let t = Thrown {
            code: 1264,
            message: "Out of range".into(),
        };
        assert_eq!(t.to_string(), format!("{THROW_MARKER}1264:Out of range"));
    }

    #[test]
    fn string_functions() {
        let c = conn();
        assert_eq!(scalar_i64(&c, "SELECT _mysql_find_in_set('b', 'a,b,c')"), Some(2));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_find_in_set('z', 'a,b,c')"), Some(0));
        assert_eq!(scalar_text(&c, "SELECT _mysql_lpad('5', 3, '0')").as_deref(), Some("005"));
        assert_eq!(scalar_text(&c, "SELECT _mysql_rpad('abc', 2, 'x')").as_deref(), Some("ab"));
        assert_eq!(scalar_text(&c, "SELECT _mysql_repeat('ab', 3)").as_deref(), Some("ababab"));
        assert_eq!(scalar_text(&c, "SELECT _mysql_reverse('abc')").as_deref(), Some("cba"));
        assert_eq!(
            scalar_text(&c, "SELECT _mysql_sha1('abc')").as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            scalar_text(&c, "SELECT _mysql_substring_index('www.mysql.com', '.', -2)").as_deref(),
            Some("mysql.com")
        );
        assert_eq!(scalar_i64(&c, "SELECT _mysql_locate('bar', 'foobarbar', 5)"), Some(7));
    }

    #[test]
    fn pattern_functions() {
        let c = conn();
        assert_eq!(scalar_i64(&c, "SELECT _mysql_regexp('Hello', '^h', 1)"), Some(1));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_regexp('Hello', '^h', 0)"), Some(0));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_like_binary('ABC', 'a%', '\\')"), Some(0));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_like_binary('abc', 'a%', '\\')"), Some(1));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_regexp(NULL, 'a', 1)"), None);
    }

    #[test]
    fn math_functions() {
        let c = conn();
        assert_eq!(scalar_i64(&c, "SELECT _mysql_ceil(1.2)"), Some(2));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_floor(-1.2)"), Some(-2));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_mod(7, 3)"), Some(1));
        assert_eq!(scalar_i64(&c, "SELECT _mysql_mod(7, 0)"), None);
        assert_eq!(scalar_i64(&c, "SELECT _mysql_truncate(1.999, 0)"), Some(1));
        let sqrt: f64 = c.query_row("SELECT _mysql_sqrt(16)", [], |r| r.get(0)).unwrap();
        assert_eq!(sqrt, 4.0);
        assert_eq!(scalar_i64(&c, "SELECT _mysql_ln(0) IS NULL"), Some(1));
    }

    #[test]
    fn normalizers_run_inside_statements() {
        let c = conn();
        assert_eq!(scalar_text(&c, "SELECT _mysql_year(69, 1, 'y')").as_deref(), Some("2069"));
        assert_eq!(
            scalar_text(&c, "SELECT _mysql_date('2024-1-5', 1, 'd')").as_deref(),
            Some("2024-01-05")
        );
        let err = c
            .query_row("SELECT _mysql_int(1000, -128, 127, 1, 'n')", [], |r| {
                r.get::<_, i64>(0)
            })
            .unwrap_err();
        assert!(err.to_string().contains("mysql-error:1264:"), "{err}");
    }
}
