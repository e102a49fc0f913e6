//! MySQL value coercion.
//!
//! Two halves: [`coerce_expr`] builds the engine expression that routes a
//! value bound for a column through the matching normalizer function, and the
//! `normalize_*` functions are those normalizers, registered as UDFs by
//! [`crate::functions`]. Normalizers return the canonical stored value, raise
//! a MySQL value error in strict mode, or fall back to the implicit default.

use crate::catalog::types::TypeClass;
use crate::catalog::ColumnInfo;
use crate::error::{DriverError, Result};
use crate::ident;
use crate::model::Cell;
use crate::session::SqlMode;
use chrono::{Datelike, NaiveDate, Timelike};

pub const STRICT: i64 = 1;
pub const NO_ZERO_DATE: i64 = 2;
pub const NO_ZERO_IN_DATE: i64 = 4;
pub const ALLOW_INVALID_DATES: i64 = 8;

/// Member separator used when passing ENUM/SET members to a normalizer.
pub const MEMBER_SEPARATOR: char = '\u{1f}';

/// Normalizer flags for a statement.
pub fn flags(sql_mode: SqlMode, strict: bool) -> i64 {
    let mut f = 0;
    if strict {
        f |= STRICT;
    }
    if sql_mode.contains(SqlMode::NO_ZERO_DATE) {
        f |= NO_ZERO_DATE;
    }
    if sql_mode.contains(SqlMode::NO_ZERO_IN_DATE) {
        f |= NO_ZERO_IN_DATE;
    }
    if sql_mode.contains(SqlMode::ALLOW_INVALID_DATES) {
        f |= ALLOW_INVALID_DATES;
    }
    f
}

/// Wraps `value_sql` so the stored value follows MySQL's rules for `column`.
pub fn coerce_expr(column: &ColumnInfo, sql_mode: SqlMode, strict: bool, value_sql: &str) -> String {
    let f = flags(sql_mode, strict);
    let col = ident::string_literal(&column.name);
    let ty = &column.ty;
    let mut expr = match ty.class() {
        TypeClass::Integer { min, max } => {
            let clamp = |v: i128| v.clamp(i64::MIN as i128, i64::MAX as i128);
            format!(
                "_mysql_int({value_sql}, {}, {}, {f}, {col})",
                clamp(min),
                clamp(max)
            )
        }
        TypeClass::Bit { bits } => format!("_mysql_bit({value_sql}, {bits}, {f}, {col})"),
        TypeClass::Decimal {
            precision,
            scale,
            unsigned,
        } => format!(
            "_mysql_decimal({value_sql}, {precision}, {scale}, {}, {f}, {col})",
            unsigned as i64
        ),
        TypeClass::Float { unsigned } => {
            format!("_mysql_float({value_sql}, {}, {f}, {col})", unsigned as i64)
        }
        TypeClass::Date => format!("_mysql_date({value_sql}, {f}, {col})"),
        TypeClass::DateTime { fsp } => format!("_mysql_datetime({value_sql}, {fsp}, {f}, {col})"),
        TypeClass::Time { fsp } => format!("_mysql_time({value_sql}, {fsp}, {f}, {col})"),
        TypeClass::Year => format!("_mysql_year({value_sql}, {f}, {col})"),
        TypeClass::Text { max_chars } => format!(
            "_mysql_string({value_sql}, {}, {f}, {col})",
            max_chars.map(|n| n as i64).unwrap_or(-1)
        ),
        TypeClass::Binary { max_bytes } => format!(
            "_mysql_binary({value_sql}, {}, {f}, {col})",
            max_bytes.map(|n| n as i64).unwrap_or(-1)
        ),
        TypeClass::Enum | TypeClass::Set => {
            let members = ty.members.join(&MEMBER_SEPARATOR.to_string());
            let func = if ty.class() == TypeClass::Enum { "_mysql_enum" } else { "_mysql_set" };
            format!(
                "{func}({value_sql}, {}, {f}, {col})",
                ident::string_literal(&members)
            )
        }
        TypeClass::Json | TypeClass::Spatial => value_sql.to_string(),
    };
    if column.auto_increment && !sql_mode.contains(SqlMode::NO_AUTO_VALUE_ON_ZERO) {
        expr = format!("NULLIF({expr}, 0)");
    } else if !strict && !column.nullable && !column.auto_increment {
        if let Some(default) = ty.implicit_default() {
            expr = format!("COALESCE({expr}, {default})");
        }
    }
    expr
}

/// Value supplied for a column an INSERT omits, or `None` to leave the
/// column out so the engine default applies.
pub fn omitted_column_value(column: &ColumnInfo, strict: bool) -> Option<String> {
    if strict || column.has_default() {
        return None;
    }
    column.ty.implicit_default()
}

fn at_row(column: &str) -> String {
    format!("for column '{column}' at row 1")
}

fn out_of_range(column: &str) -> DriverError {
    DriverError::value(1264, format!("Out of range value {}", at_row(column)))
}

fn truncated(column: &str) -> DriverError {
    DriverError::value(1265, format!("Data truncated {}", at_row(column)))
}

fn incorrect(kind: &str, value: &str, column: &str) -> DriverError {
    let code = if matches!(kind, "date" | "datetime" | "time") { 1292 } else { 1366 };
    DriverError::value(
        code,
        format!("Incorrect {kind} value: '{value}' {}", at_row(column)),
    )
}

fn cell_text(v: &Cell) -> String {
    v.to_text().unwrap_or_default()
}

/// Result of reading a numeric prefix the way MySQL converts strings.
#[derive(Debug, PartialEq)]
enum Numeric {
    Int(i128),
    Float(f64),
}

/// Parses the longest numeric prefix of `s`. Returns the value and whether
/// the whole (trimmed) string was consumed.
fn parse_numeric_prefix(s: &str) -> Option<(Numeric, bool)> {
    let t = s.trim();
    let bytes = t.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let save = i;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == save + 1 && save == digits_start {
            return None;
        }
        is_float = true;
    }
    if i == digits_start {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
            is_float = true;
        }
    }
    let text = &t[..i];
    let complete = i == bytes.len();
    let value = if is_float {
        Numeric::Float(text.parse().ok()?)
    } else {
        match text.parse::<i128>() {
            Ok(n) => Numeric::Int(n),
            Err(_) => Numeric::Float(text.parse().ok()?),
        }
    };
    Some((value, complete))
}

fn round_half_away(f: f64) -> i128 {
    let r = f.round();
    if r >= i128::MAX as f64 {
        i128::MAX
    } else if r <= i128::MIN as f64 {
        i128::MIN
    } else {
        r as i128
    }
}

/// Reads a numeric value, applying MySQL's string conversion rules.
/// `kind` names the type in "Incorrect ... value" errors.
fn numeric_input(value: &Cell, strict: bool, kind: &str, column: &str) -> Result<Option<Numeric>> {
    match value {
        Cell::Null => Ok(None),
        Cell::Int(i) => Ok(Some(Numeric::Int(*i as i128))),
        Cell::Float(f) => Ok(Some(Numeric::Float(*f))),
        Cell::Text(_) | Cell::Blob(_) => {
            let text = cell_text(value);
            match parse_numeric_prefix(&text) {
                Some((n, true)) => Ok(Some(n)),
                Some((n, false)) => {
                    if strict {
                        Err(truncated(column))
                    } else {
                        Ok(Some(n))
                    }
                }
                None => {
                    if strict {
                        Err(incorrect(kind, &text, column))
                    } else {
                        Ok(Some(Numeric::Int(0)))
                    }
                }
            }
        }
    }
}

pub fn normalize_int(value: &Cell, min: i64, max: i64, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let Some(n) = numeric_input(value, strict, "integer", column)? else {
        return Ok(Cell::Null);
    };
    let n = match n {
        Numeric::Int(i) => i,
        Numeric::Float(f) => round_half_away(f),
    };
    let (lo, hi) = (min as i128, max as i128);
    if n < lo || n > hi {
        if strict {
            return Err(out_of_range(column));
        }
        return Ok(Cell::Int(n.clamp(lo, hi) as i64));
    }
    Ok(Cell::Int(n as i64))
}

pub fn normalize_bit(value: &Cell, bits: i64, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let max: i128 = if bits >= 64 { i64::MAX as i128 } else { (1i128 << bits) - 1 };
    let n: i128 = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Blob(b) => b.iter().fold(0i128, |acc, byte| (acc << 8) | *byte as i128),
        other => match numeric_input(other, strict, "integer", column)? {
            Some(Numeric::Int(i)) => i,
            Some(Numeric::Float(f)) => round_half_away(f),
            None => return Ok(Cell::Null),
        },
    };
    if n < 0 || n > max {
        if strict {
            return Err(DriverError::value(1406, format!("Data too long {}", at_row(column))));
        }
        return Ok(Cell::Int(n.clamp(0, max) as i64));
    }
    Ok(Cell::Int(n as i64))
}

pub fn normalize_decimal(
    value: &Cell,
    precision: i64,
    scale: i64,
    unsigned: bool,
    flags: i64,
    column: &str,
) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let Some(n) = numeric_input(value, strict, "decimal", column)? else {
        return Ok(Cell::Null);
    };
    let f = match n {
        Numeric::Int(i) => i as f64,
        Numeric::Float(f) => f,
    };
    let factor = 10f64.powi(scale as i32);
    let mut rounded = (f * factor).round() / factor;
    let max = 10f64.powi((precision - scale) as i32) - 1.0 / factor;
    let min = if unsigned { 0.0 } else { -max };
    if rounded > max || rounded < min {
        if strict {
            return Err(out_of_range(column));
        }
        rounded = rounded.clamp(min, max);
    }
    Ok(Cell::Float(rounded))
}

pub fn normalize_float(value: &Cell, unsigned: bool, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let Some(n) = numeric_input(value, strict, "double", column)? else {
        return Ok(Cell::Null);
    };
    let f = match n {
        Numeric::Int(i) => i as f64,
        Numeric::Float(f) => f,
    };
    if !f.is_finite() || (unsigned && f < 0.0) {
        if strict {
            return Err(out_of_range(column));
        }
        return Ok(Cell::Float(if f.is_finite() { 0.0 } else { f64::MAX.copysign(f) }));
    }
    Ok(Cell::Float(f))
}

pub fn normalize_string(value: &Cell, max_chars: i64, flags: i64, column: &str) -> Result<Cell> {
    let text = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Text(s) => s.clone(),
        other => cell_text(other),
    };
    if max_chars >= 0 && text.chars().count() > max_chars as usize {
        if flags & STRICT != 0 {
            return Err(DriverError::value(1406, format!("Data too long {}", at_row(column))));
        }
        return Ok(Cell::Text(text.chars().take(max_chars as usize).collect()));
    }
    Ok(Cell::Text(text))
}

pub fn normalize_binary(value: &Cell, max_bytes: i64, flags: i64, column: &str) -> Result<Cell> {
    let len = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Blob(b) => b.len(),
        other => cell_text(other).len(),
    };
    if max_bytes >= 0 && len > max_bytes as usize {
        if flags & STRICT != 0 {
            return Err(DriverError::value(1406, format!("Data too long {}", at_row(column))));
        }
        let bytes = match value {
            Cell::Blob(b) => b.clone(),
            other => cell_text(other).into_bytes(),
        };
        return Ok(Cell::Blob(bytes[..max_bytes as usize].to_vec()));
    }
    Ok(match value {
        Cell::Int(_) | Cell::Float(_) => Cell::Text(cell_text(value)),
        other => other.clone(),
    })
}

fn split_members(members: &str) -> Vec<&str> {
    if members.is_empty() {
        return Vec::new();
    }
    members.split(MEMBER_SEPARATOR).collect()
}

pub fn normalize_enum(value: &Cell, members: &str, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let members = split_members(members);
    let found = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Int(_) | Cell::Float(_) => {
            let idx = match value {
                Cell::Int(i) => *i,
                Cell::Float(f) => f.round() as i64,
                _ => 0,
            };
            (idx >= 1)
                .then(|| members.get(idx as usize - 1))
                .flatten()
                .map(|m| m.to_string())
        }
        other => {
            let text = cell_text(other);
            let wanted = text.trim_end_matches(' ');
            members
                .iter()
                .find(|m| m.trim_end_matches(' ').to_lowercase() == wanted.to_lowercase())
                .map(|m| m.to_string())
        }
    };
    match found {
        Some(m) => Ok(Cell::Text(m)),
        None if strict => Err(truncated(column)),
        None => Ok(Cell::Text(String::new())),
    }
}

pub fn normalize_set(value: &Cell, members: &str, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let members = split_members(members);
    let mut chosen = vec![false; members.len()];
    let mut invalid = false;
    match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Int(_) | Cell::Float(_) => {
            let mask = value.as_i64().unwrap_or(0);
            if mask < 0 || (members.len() < 63 && mask >> members.len() != 0) {
                invalid = true;
            }
            for (i, slot) in chosen.iter_mut().enumerate() {
                if i < 63 && mask & (1 << i) != 0 {
                    *slot = true;
                }
            }
        }
        other => {
            let text = cell_text(other);
            for part in text.split(',').filter(|p| !p.is_empty()) {
                match members
                    .iter()
                    .position(|m| m.to_lowercase() == part.trim_end_matches(' ').to_lowercase())
                {
                    Some(i) => chosen[i] = true,
                    None => invalid = true,
                }
            }
        }
    }
    if invalid && strict {
        return Err(truncated(column));
    }
    let out: Vec<&str> = members
        .iter()
        .zip(&chosen)
        .filter(|(_, on)| **on)
        .map(|(m, _)| *m)
        .collect();
    Ok(Cell::Text(out.join(",")))
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct DateTimeParts {
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
}

fn two_digit_year(y: u32) -> u32 {
    if y < 70 {
        2000 + y
    } else {
        1900 + y
    }
}

fn parse_fraction(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = s.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    digits.parse().ok()
}

fn parse_time_of_day(s: &str, parts: &mut DateTimeParts) -> Option<()> {
    let (main, frac) = match s.split_once('.') {
        Some((m, f)) => (m, Some(f)),
        None => (s, None),
    };
    let fields: Vec<&str> = main.split(':').collect();
    let nums: Option<Vec<u32>> = fields.iter().map(|f| f.trim().parse().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [h, m, s] => {
            parts.hour = *h;
            parts.minute = *m;
            parts.second = *s;
        }
        [h, m] => {
            parts.hour = *h;
            parts.minute = *m;
        }
        [h] => parts.hour = *h,
        _ => return None,
    }
    if let Some(f) = frac {
        parts.micros = parse_fraction(f)?;
    }
    Some(())
}

fn parse_datetime(text: &str) -> Option<DateTimeParts> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let mut parts = DateTimeParts::default();
    if t.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        let (digits, frac) = match t.split_once('.') {
            Some((d, f)) => (d, Some(f)),
            None => (t, None),
        };
        let n = |a: usize, b: usize| -> Option<u32> { digits.get(a..b)?.parse().ok() };
        match digits.len() {
            8 | 14 => {
                parts.year = n(0, 4)?;
                parts.month = n(4, 6)?;
                parts.day = n(6, 8)?;
                if digits.len() == 14 {
                    parts.hour = n(8, 10)?;
                    parts.minute = n(10, 12)?;
                    parts.second = n(12, 14)?;
                }
            }
            6 | 12 => {
                parts.year = two_digit_year(n(0, 2)?);
                parts.month = n(2, 4)?;
                parts.day = n(4, 6)?;
                if digits.len() == 12 {
                    parts.hour = n(6, 8)?;
                    parts.minute = n(8, 10)?;
                    parts.second = n(10, 12)?;
                }
            }
            1 if digits == "0" => return Some(parts),
            _ => return None,
        }
        if let Some(f) = frac {
            if digits.len() > 8 {
                parts.micros = parse_fraction(f)?;
            }
        }
        return Some(parts);
    }

    let (date, time) = match t.find(|c: char| c == ' ' || c == 'T') {
        Some(i) => (&t[..i], Some(t[i + 1..].trim())),
        None => (t, None),
    };
    let fields: Vec<&str> = date
        .split(|c: char| !c.is_ascii_digit())
        .filter(|f| !f.is_empty())
        .collect();
    if fields.len() != 3 || date.starts_with(|c: char| !c.is_ascii_digit()) {
        return None;
    }
    let year_text = fields[0];
    let year: u32 = year_text.parse().ok()?;
    parts.year = if year_text.len() <= 2 { two_digit_year(year) } else { year };
    parts.month = fields[1].parse().ok()?;
    parts.day = fields[2].parse().ok()?;
    if let Some(time) = time.filter(|t| !t.is_empty()) {
        parse_time_of_day(time, &mut parts)?;
    }
    Some(parts)
}

enum DateCheck {
    Valid,
    Zero,
    ZeroInDate,
    Invalid,
}

fn check_date(p: &DateTimeParts, flags: i64) -> DateCheck {
    if p.year == 0 && p.month == 0 && p.day == 0 {
        return DateCheck::Zero;
    }
    if p.month > 12 || p.day > 31 || p.year > 9999 {
        return DateCheck::Invalid;
    }
    if p.month == 0 || p.day == 0 {
        return DateCheck::ZeroInDate;
    }
    if flags & ALLOW_INVALID_DATES == 0
        && NaiveDate::from_ymd_opt(p.year as i32, p.month, p.day).is_none()
    {
        return DateCheck::Invalid;
    }
    DateCheck::Valid
}

fn format_fraction(micros: u32, fsp: u32) -> String {
    if fsp == 0 {
        return String::new();
    }
    let digits = format!("{micros:06}");
    format!(".{}", &digits[..fsp.min(6) as usize])
}

/// Rounds to `fsp` digits; the flag is set when the rounding carries into
/// the next whole second.
fn round_micros(micros: u32, fsp: u32) -> (u32, bool) {
    let unit = 10u32.pow(6 - fsp.min(6));
    let rounded = (micros + unit / 2) / unit * unit;
    if rounded >= 1_000_000 {
        (0, true)
    } else {
        (rounded, false)
    }
}

/// Rounds the fraction of a validated datetime, carrying into the seconds
/// and beyond. A carry past the last representable second truncates.
fn round_parts(p: &DateTimeParts, fsp: u32) -> DateTimeParts {
    let (micros, carry) = round_micros(p.micros, fsp);
    let mut out = DateTimeParts { micros, ..*p };
    if !carry {
        return out;
    }
    let next = NaiveDate::from_ymd_opt(p.year as i32, p.month, p.day)
        .and_then(|d| d.and_hms_opt(p.hour, p.minute, p.second))
        .and_then(|dt| dt.checked_add_signed(chrono::Duration::seconds(1)));
    match next {
        Some(dt) if dt.year() <= 9999 => {
            out.year = dt.year() as u32;
            out.month = dt.month();
            out.day = dt.day();
            out.hour = dt.hour();
            out.minute = dt.minute();
            out.second = dt.second();
        }
        // Zero-in-date values have no calendar successor.
        Some(_) | None if p.second < 59 => out.second += 1,
        _ => out.micros = 1_000_000 - 10u32.pow(6 - fsp.min(6)),
    }
    out
}

fn normalize_temporal(
    value: &Cell,
    kind: &str,
    fsp: Option<u32>,
    flags: i64,
    column: &str,
) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let text = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => cell_text(other),
    };
    let zero = match fsp {
        None => "0000-00-00".to_string(),
        Some(fsp) => format!("0000-00-00 00:00:00{}", format_fraction(0, fsp)),
    };
    let render = |p: &DateTimeParts| -> String {
        match fsp {
            None => format!("{:04}-{:02}-{:02}", p.year, p.month, p.day),
            Some(fsp) => {
                let p = round_parts(p, fsp);
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
                    p.year,
                    p.month,
                    p.day,
                    p.hour,
                    p.minute,
                    p.second,
                    format_fraction(p.micros, fsp)
                )
            }
        }
    };
    let Some(parts) = parse_datetime(&text) else {
        return if strict {
            Err(incorrect(kind, &text, column))
        } else {
            Ok(Cell::Text(zero))
        };
    };
    if parts.hour > 23 || parts.minute > 59 || parts.second > 59 {
        return if strict {
            Err(incorrect(kind, &text, column))
        } else {
            Ok(Cell::Text(zero))
        };
    }
    match check_date(&parts, flags) {
        DateCheck::Valid => Ok(Cell::Text(render(&parts))),
        DateCheck::Zero => {
            if strict && flags & NO_ZERO_DATE != 0 {
                Err(incorrect(kind, &text, column))
            } else {
                Ok(Cell::Text(zero))
            }
        }
        DateCheck::ZeroInDate => {
            if flags & NO_ZERO_IN_DATE == 0 {
                Ok(Cell::Text(render(&parts)))
            } else if strict {
                Err(incorrect(kind, &text, column))
            } else {
                Ok(Cell::Text(zero))
            }
        }
        DateCheck::Invalid => {
            if strict {
                Err(incorrect(kind, &text, column))
            } else {
                Ok(Cell::Text(zero))
            }
        }
    }
}

pub fn normalize_date(value: &Cell, flags: i64, column: &str) -> Result<Cell> {
    normalize_temporal(value, "date", None, flags, column)
}

pub fn normalize_datetime(value: &Cell, fsp: i64, flags: i64, column: &str) -> Result<Cell> {
    normalize_temporal(value, "datetime", Some(fsp.clamp(0, 6) as u32), flags, column)
}

const MAX_TIME_SECONDS: i64 = 838 * 3600 + 59 * 60 + 59;

pub fn normalize_time(value: &Cell, fsp: i64, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let fsp = fsp.clamp(0, 6) as u32;
    let text = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => cell_text(other),
    };
    let zero = format!("00:00:00{}", format_fraction(0, fsp));
    let Some((negative, seconds, micros)) = parse_time(&text) else {
        return if strict {
            Err(incorrect("time", &text, column))
        } else {
            Ok(Cell::Text(zero))
        };
    };
    let (micros, carry) = round_micros(micros, fsp);
    let seconds = seconds + i64::from(carry);
    let (seconds, micros) = if seconds > MAX_TIME_SECONDS {
        if strict {
            return Err(incorrect("time", &text, column));
        }
        (MAX_TIME_SECONDS, 0)
    } else {
        (seconds, micros)
    };
    Ok(Cell::Text(format!(
        "{}{:02}:{:02}:{:02}{}",
        if negative && (seconds > 0 || micros > 0) { "-" } else { "" },
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        format_fraction(micros, fsp)
    )))
}

/// Parses `[-][D ]HH:MM[:SS][.f]`, `HHMMSS` or a datetime; returns the sign,
/// whole seconds and microseconds.
fn parse_time(text: &str) -> Option<(bool, i64, u32)> {
    let t = text.trim();
    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, t),
    };
    if t.is_empty() {
        return None;
    }
    if t.contains('-') || t.len() >= 19 && t.contains(' ') {
        let p = parse_datetime(t)?;
        if p.hour > 23 || p.minute > 59 || p.second > 59 {
            return None;
        }
        let seconds = i64::from(p.hour) * 3600 + i64::from(p.minute) * 60 + i64::from(p.second);
        return Some((negative, seconds, p.micros));
    }
    let (days, rest) = match t.split_once(' ') {
        Some((d, r)) => (d.parse::<i64>().ok()?, r.trim()),
        None => (0, t),
    };
    let (main, frac) = match rest.split_once('.') {
        Some((m, f)) => (m, parse_fraction(f)?),
        None => (rest, 0),
    };
    let (h, m, s): (i64, i64, i64) = if main.contains(':') {
        let f: Option<Vec<i64>> = main.split(':').map(|x| x.trim().parse().ok()).collect();
        match f?.as_slice() {
            [h, m, s] => (*h, *m, *s),
            [h, m] => (*h, *m, 0),
            _ => return None,
        }
    } else {
        if !main.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: i64 = main.parse().ok()?;
        (n / 10_000, (n / 100) % 100, n % 100)
    };
    if m > 59 || s > 59 || days < 0 || h < 0 || m < 0 || s < 0 {
        return None;
    }
    let seconds = days
        .checked_mul(24 * 3600)?
        .checked_add(h.checked_mul(3600)?)?
        .checked_add(m * 60 + s)?;
    Some((negative, seconds, frac))
}

pub fn normalize_year(value: &Cell, flags: i64, column: &str) -> Result<Cell> {
    let strict = flags & STRICT != 0;
    let year: i128 = match value {
        Cell::Null => return Ok(Cell::Null),
        Cell::Int(i) => *i as i128,
        Cell::Float(f) => round_half_away(*f),
        other => {
            let text = cell_text(other);
            let trimmed = text.trim();
            // A string zero of one or two digits means 2000, unlike the number.
            if !trimmed.is_empty() && trimmed.len() <= 2 && trimmed.bytes().all(|b| b == b'0') {
                return Ok(Cell::Text("2000".into()));
            }
            match parse_numeric_prefix(trimmed) {
                Some((Numeric::Int(i), true)) => i,
                Some((Numeric::Float(f), true)) => round_half_away(f),
                Some((n, false)) if !strict => match n {
                    Numeric::Int(i) => i,
                    Numeric::Float(f) => round_half_away(f),
                },
                Some((_, false)) => return Err(truncated(column)),
                None if strict => return Err(incorrect("integer", &text, column)),
                None => 0,
            }
        }
    };
    let normalized = match year {
        0 => 0,
        1..=69 => 2000 + year,
        70..=99 => 1900 + year,
        1901..=2155 => year,
        _ => {
            if strict {
                return Err(out_of_range(column));
            }
            0
        }
    };
    Ok(Cell::Text(format!("{normalized:04}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::MysqlType;

    const S: i64 = STRICT;

    fn text(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    #[test]
    fn year_normalization() {
        assert_eq!(normalize_year(&Cell::Int(69), S, "y").unwrap(), text("2069"));
        assert_eq!(normalize_year(&Cell::Int(70), S, "y").unwrap(), text("1970"));
        assert_eq!(normalize_year(&Cell::Int(0), S, "y").unwrap(), text("0000"));
        assert_eq!(normalize_year(&Cell::Int(2155), S, "y").unwrap(), text("2155"));
        let err = normalize_year(&Cell::Int(2200), S, "y").unwrap_err();
        assert_eq!(err.code(), 1264);
        assert_eq!(normalize_year(&Cell::Int(2200), 0, "y").unwrap(), text("0000"));
        assert_eq!(normalize_year(&text("1999"), S, "y").unwrap(), text("1999"));
    }

    #[test]
    fn integers_clamp_or_fail() {
        assert_eq!(normalize_int(&Cell::Int(5), -128, 127, S, "n").unwrap(), Cell::Int(5));
        assert_eq!(normalize_int(&Cell::Float(2.5), -128, 127, S, "n").unwrap(), Cell::Int(3));
        assert_eq!(normalize_int(&text(" 42 "), -128, 127, S, "n").unwrap(), Cell::Int(42));
        assert_eq!(normalize_int(&Cell::Int(300), -128, 127, S, "n").unwrap_err().code(), 1264);
        assert_eq!(normalize_int(&Cell::Int(300), -128, 127, 0, "n").unwrap(), Cell::Int(127));
        assert_eq!(normalize_int(&text("abc"), 0, 10, S, "n").unwrap_err().code(), 1366);
        assert_eq!(normalize_int(&text("abc"), 0, 10, 0, "n").unwrap(), Cell::Int(0));
        assert_eq!(normalize_int(&text("7xyz"), 0, 10, S, "n").unwrap_err().code(), 1265);
        assert_eq!(normalize_int(&text("7xyz"), 0, 10, 0, "n").unwrap(), Cell::Int(7));
        assert_eq!(normalize_int(&Cell::Null, 0, 10, S, "n").unwrap(), Cell::Null);
    }

    #[test]
    fn decimals_round_to_scale() {
        assert_eq!(
            normalize_decimal(&text("3.14159"), 5, 2, false, S, "d").unwrap(),
            Cell::Float(3.14)
        );
        assert_eq!(
            normalize_decimal(&Cell::Int(1000), 5, 2, false, S, "d").unwrap_err().code(),
            1264
        );
        match normalize_decimal(&Cell::Int(1000), 5, 2, false, 0, "d").unwrap() {
            Cell::Float(f) => assert!((f - 999.99).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strings_are_length_checked() {
        assert_eq!(normalize_string(&text("héllo"), 5, S, "s").unwrap(), text("héllo"));
        assert_eq!(normalize_string(&text("toolong"), 3, S, "s").unwrap_err().code(), 1406);
        assert_eq!(normalize_string(&text("toolong"), 3, 0, "s").unwrap(), text("too"));
        assert_eq!(normalize_string(&Cell::Int(12), -1, S, "s").unwrap(), text("12"));
    }

    #[test]
    fn enums_and_sets() {
        let members = format!("small{MEMBER_SEPARATOR}Large");
        assert_eq!(normalize_enum(&text("LARGE"), &members, S, "e").unwrap(), text("Large"));
        assert_eq!(normalize_enum(&Cell::Int(1), &members, S, "e").unwrap(), text("small"));
        assert_eq!(normalize_enum(&text("huge"), &members, S, "e").unwrap_err().code(), 1265);
        assert_eq!(normalize_enum(&text("huge"), &members, 0, "e").unwrap(), text(""));

        let members = format!("a{MEMBER_SEPARATOR}b{MEMBER_SEPARATOR}c");
        assert_eq!(normalize_set(&text("c,a,a"), &members, S, "s").unwrap(), text("a,c"));
        assert_eq!(normalize_set(&Cell::Int(6), &members, S, "s").unwrap(), text("b,c"));
        assert_eq!(normalize_set(&text("a,z"), &members, S, "s").unwrap_err().code(), 1265);
        assert_eq!(normalize_set(&text("a,z"), &members, 0, "s").unwrap(), text("a"));
    }

    #[test]
    fn dates_validate_and_fall_back() {
        assert_eq!(normalize_date(&text("2024-02-29"), S, "d").unwrap(), text("2024-02-29"));
        assert_eq!(normalize_date(&text("2024-2-3"), S, "d").unwrap(), text("2024-02-03"));
        assert_eq!(normalize_date(&Cell::Int(20240115), S, "d").unwrap(), text("2024-01-15"));
        assert_eq!(
            normalize_date(&text("2024-01-15 10:11:12"), S, "d").unwrap(),
            text("2024-01-15")
        );
        assert_eq!(normalize_date(&text("2023-02-30"), S, "d").unwrap_err().code(), 1292);
        assert_eq!(normalize_date(&text("2023-02-30"), 0, "d").unwrap(), text("0000-00-00"));
        assert_eq!(normalize_date(&text("garbage"), 0, "d").unwrap(), text("0000-00-00"));
        assert_eq!(
            normalize_date(&text("0000-00-00"), S | NO_ZERO_DATE, "d").unwrap_err().code(),
            1292
        );
        assert_eq!(normalize_date(&text("0000-00-00"), S, "d").unwrap(), text("0000-00-00"));
    }

    #[test]
    fn datetimes_keep_fractional_precision() {
        assert_eq!(
            normalize_datetime(&text("2024-01-15 10:11:12.123456"), 3, S, "t").unwrap(),
            text("2024-01-15 10:11:12.123")
        );
        assert_eq!(
            normalize_datetime(&text("2024-01-15"), 0, S, "t").unwrap(),
            text("2024-01-15 00:00:00")
        );
        assert_eq!(
            normalize_datetime(&text("2024-01-15 25:00:00"), 0, 0, "t").unwrap(),
            text("0000-00-00 00:00:00")
        );
    }

    #[test]
    fn times() {
        assert_eq!(normalize_time(&text("12:34:56"), 0, S, "t").unwrap(), text("12:34:56"));
        assert_eq!(normalize_time(&text("1 02:00:00"), 0, S, "t").unwrap(), text("26:00:00"));
        assert_eq!(normalize_time(&Cell::Int(123456), 0, S, "t").unwrap(), text("12:34:56"));
        assert_eq!(normalize_time(&text("-5:30"), 0, S, "t").unwrap(), text("-05:30:00"));
        assert_eq!(normalize_time(&text("900:00:00"), 0, 0, "t").unwrap(), text("838:59:59"));
        assert_eq!(normalize_time(&text("12:61:00"), 0, S, "t").unwrap_err().code(), 1292);
    }

    #[test]
    fn oversized_times_are_incorrect_values() {
        for input in [
            "2020-01-01 99999999:00:00",
            "99999999999999999 00:00:00",
            "4294967295:00:00",
            "9223372036854775807:00:00",
        ] {
            assert_eq!(normalize_time(&text(input), 0, S, "t").unwrap_err().code(), 1292, "{input}");
        }
        assert_eq!(
            normalize_time(&text("4294967295:00:00"), 0, 0, "t").unwrap(),
            text("838:59:59")
        );
    }

    #[test]
    fn fractions_round_into_the_next_second() {
        assert_eq!(normalize_time(&text("12:00:00.5"), 0, S, "t").unwrap(), text("12:00:01"));
        assert_eq!(normalize_time(&text("12:00:00.9"), 0, S, "t").unwrap(), text("12:00:01"));
        assert_eq!(normalize_time(&text("12:00:00.4"), 0, S, "t").unwrap(), text("12:00:00"));
        assert_eq!(normalize_time(&text("23:59:59.9"), 0, S, "t").unwrap(), text("24:00:00"));
        assert_eq!(normalize_time(&text("12:00:00.96"), 1, S, "t").unwrap(), text("12:00:01.0"));
        assert_eq!(
            normalize_datetime(&text("2024-01-15 12:00:00.9"), 0, S, "t").unwrap(),
            text("2024-01-15 12:00:01")
        );
        assert_eq!(
            normalize_datetime(&text("2024-12-31 23:59:59.9"), 0, S, "t").unwrap(),
            text("2025-01-01 00:00:00")
        );
        assert_eq!(
            normalize_datetime(&text("2024-01-15 10:59:59.9996"), 3, S, "t").unwrap(),
            text("2024-01-15 11:00:00.000")
        );
    }

    fn assert_idempotent(input: Cell, f: impl Fn(&Cell) -> Result<Cell>) {
        let once = f(&input).unwrap();
        let twice = f(&once).unwrap();
        assert_eq!(once, twice, "input {input:?}");
    }

    #[test]
    fn strict_coercion_is_idempotent() {
        assert_idempotent(Cell::Int(2069), |v| normalize_year(v, S, "y"));
        assert_idempotent(text("2024-03-01"), |v| normalize_date(v, S, "d"));
        assert_idempotent(text("2024-03-01 01:02:03.5"), |v| normalize_datetime(v, 1, S, "d"));
        assert_idempotent(text("-01:02:03"), |v| normalize_time(v, 0, S, "t"));
        assert_idempotent(Cell::Float(12.345), |v| normalize_decimal(v, 6, 2, false, S, "d"));
        assert_idempotent(text("abc"), |v| normalize_string(v, 3, S, "s"));
        assert_idempotent(text("b,a"), |v| normalize_set(v, "a\u{1f}b", S, "s"));
    }

    fn column(ty: &str, nullable: bool) -> ColumnInfo {
        let mut c = ColumnInfo::new("c", MysqlType::parse(ty).unwrap());
        c.nullable = nullable;
        c
    }

    #[test]
    fn expressions_route_through_normalizers() {
        let mode = SqlMode::STRICT_TRANS_TABLES;
        assert_eq!(
            coerce_expr(&column("tinyint", true), mode, true, "?"),
            "_mysql_int(?, -128, 127, 1, 'c')"
        );
        assert_eq!(
            coerce_expr(&column("year", false), SqlMode::empty(), false, "x"),
            "COALESCE(_mysql_year(x, 0, 'c'), '0000')"
        );
        let mut id = column("int", false);
        id.auto_increment = true;
        assert_eq!(
            coerce_expr(&id, mode, true, "v"),
            "NULLIF(_mysql_int(v, -2147483648, 2147483647, 1, 'c'), 0)"
        );
        assert_eq!(coerce_expr(&column("json", true), mode, true, "v"), "v");
    }

    #[test]
    fn omitted_columns() {
        assert_eq!(omitted_column_value(&column("int", false), true), None);
        assert_eq!(omitted_column_value(&column("int", false), false).as_deref(), Some("0"));
        assert_eq!(omitted_column_value(&column("int", true), false), None);
        assert_eq!(omitted_column_value(&column("point", false), false), None);
    }
}
