//! MySQL built-in functions expressed with engine functions and the
//! `_mysql_*` helpers registered on every connection.

use sqlparser::ast::{
    self, DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArgumentClause,
    FunctionArguments,
};

use super::expr::{date_shift, substr_sql};
use super::Translator;
use crate::catalog::reconstruct::now_sql;
use crate::error::{DriverError, Result};
use crate::ident;
use crate::session::{FoundRows, SERVER_VERSION};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const DAY_NAMES: [&str; 7] = ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];

/// Arguments of one call.
struct Call<'f> {
    name: String,
    args: Vec<&'f Expr>,
    star: bool,
    distinct: bool,
    order_by: &'f [ast::OrderByExpr],
    separator: Option<String>,
}

fn parse_call(f: &Function) -> Result<Call<'_>> {
    let name = f.name.to_string().to_ascii_uppercase();
    if f.name.0.len() > 1 {
        return Err(DriverError::not_supported(format!("function > stored function {name}")));
    }
    if f.over.is_some() {
        return Err(DriverError::not_supported(format!("function > window function {name}")));
    }
    if f.filter.is_some() {
        return Err(DriverError::not_supported(format!("function > {name} FILTER")));
    }
    let mut call = Call {
        name,
        args: Vec::new(),
        star: false,
        distinct: false,
        order_by: &[],
        separator: None,
    };
    match &f.args {
        FunctionArguments::None => {}
        FunctionArguments::List(list) => {
            call.distinct = matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => call.args.push(e),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => call.star = true,
                    other => {
                        return Err(DriverError::not_supported(format!(
                            "function > {} argument {other}",
                            call.name
                        )))
                    }
                }
            }
            for clause in &list.clauses {
                match clause {
                    FunctionArgumentClause::OrderBy(items) => call.order_by = items,
                    FunctionArgumentClause::Separator(v) => {
                        call.separator = Some(ident::unquote_string(&v.to_string()))
                    }
                    other => {
                        return Err(DriverError::not_supported(format!(
                            "function > {} clause {other}",
                            call.name
                        )))
                    }
                }
            }
        }
        FunctionArguments::Subquery(_) => {
            return Err(DriverError::not_supported(format!(
                "function > {} with a subquery argument",
                call.name
            )))
        }
    }
    Ok(call)
}

fn parameter_count(name: &str) -> DriverError {
    DriverError::value(
        1582,
        format!("Incorrect parameter count in the call to native function '{name}'"),
    )
}

fn check_arity(call: &Call, min: usize, max: usize) -> Result<()> {
    let n = call.args.len();
    if n < min || n > max || call.star {
        return Err(parameter_count(&call.name));
    }
    Ok(())
}

/// Integer literal argument, such as a fractional seconds precision.
fn literal_int(e: &Expr) -> Option<i64> {
    match e {
        Expr::Value(v) => match &v.value {
            ast::Value::Number(n, _) => n.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

fn literal_string(e: &Expr) -> Option<&str> {
    match e {
        Expr::Value(v) => match &v.value {
            ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn strftime_int(fmt: &str, d: &str) -> String {
    format!("CAST(strftime('{fmt}', {d}) AS INTEGER)")
}

fn name_case(index: &str, names: &[&str], first: usize, abbreviate: bool) -> String {
    let mut out = format!("CASE {index}");
    for (i, n) in names.iter().enumerate() {
        let n = if abbreviate { &n[..3] } else { n };
        out.push_str(&format!(" WHEN {} THEN '{n}'", i + first));
    }
    out.push_str(" END");
    out
}

fn month_name(d: &str, abbreviate: bool) -> String {
    name_case(&strftime_int("%m", d), &MONTH_NAMES, 1, abbreviate)
}

fn day_name(d: &str, abbreviate: bool) -> String {
    name_case(&strftime_int("%w", d), &DAY_NAMES, 0, abbreviate)
}

fn hour12(d: &str) -> String {
    format!("(({} + 11) % 12 + 1)", strftime_int("%H", d))
}

fn am_pm(d: &str) -> String {
    format!("CASE WHEN {} < 12 THEN 'AM' ELSE 'PM' END", strftime_int("%H", d))
}

/// `DATE_FORMAT(d, format)` for a literal format string.
pub fn date_format(d: &str, format: &str) -> Result<String> {
    // Compared numerically by applications, e.g. `DATE_FORMAT(t, '%H.%i') < 9.30`.
    if format == "%H.%i" {
        return Ok(format!("CAST(strftime('%H.%M', {d}) AS REAL)"));
    }
    let mut pieces: Vec<String> = Vec::new();
    let mut pattern = String::new();
    let flush = |pattern: &mut String, pieces: &mut Vec<String>| {
        if !pattern.is_empty() {
            pieces.push(format!("strftime({}, {d})", ident::string_literal(pattern)));
            pattern.clear();
        }
    };
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            pattern.push(c);
            continue;
        }
        let Some(spec) = chars.next() else {
            pattern.push_str("%%");
            break;
        };
        let direct = match spec {
            'Y' => Some("%Y"),
            'm' => Some("%m"),
            'd' => Some("%d"),
            'H' => Some("%H"),
            'i' => Some("%M"),
            's' | 'S' => Some("%S"),
            'j' => Some("%j"),
            'w' => Some("%w"),
            'T' => Some("%H:%M:%S"),
            '%' => Some("%%"),
            _ => None,
        };
        if let Some(p) = direct {
            pattern.push_str(p);
            continue;
        }
        let piece = match spec {
            'y' => format!("substr(strftime('%Y', {d}), 3)"),
            'c' => strftime_int("%m", d),
            'e' => strftime_int("%d", d),
            'k' => strftime_int("%H", d),
            'l' => hour12(d),
            'h' | 'I' => format!("printf('%02d', {})", hour12(d)),
            'p' => am_pm(d),
            'r' => format!(
                "printf('%02d', {}) || strftime(':%M:%S ', {d}) || {}",
                hour12(d),
                am_pm(d)
            ),
            'f' => format!("substr(strftime('%f', {d}), 4) || '000'"),
            'M' => month_name(d, false),
            'b' => month_name(d, true),
            'W' => day_name(d, false),
            'a' => day_name(d, true),
            'D' => {
                let day = strftime_int("%d", d);
                format!(
                    "{day} || CASE WHEN {day} IN (11, 12, 13) THEN 'th' \
                     WHEN {day} % 10 = 1 THEN 'st' WHEN {day} % 10 = 2 THEN 'nd' \
                     WHEN {day} % 10 = 3 THEN 'rd' ELSE 'th' END"
                )
            }
            'U' | 'u' | 'V' | 'v' | 'X' | 'x' => {
                return Err(DriverError::not_supported(format!(
                    "function > DATE_FORMAT week specifier %{spec}"
                )))
            }
            other => {
                // Unknown specifiers print the character itself.
                pattern.push(other);
                continue;
            }
        };
        flush(&mut pattern, &mut pieces);
        pieces.push(format!("({piece})"));
    }
    flush(&mut pattern, &mut pieces);
    Ok(match pieces.len() {
        0 => "''".to_string(),
        1 => pieces.remove(0),
        _ => format!("({})", pieces.join(" || ")),
    })
}

impl<'a> Translator<'a> {
    pub(super) fn function(&mut self, f: &Function) -> Result<String> {
        let call = parse_call(f)?;
        let name = call.name.clone();
        match name.as_str() {
            "COUNT" => {
                if call.star {
                    return Ok("COUNT(*)".to_string());
                }
                check_arity(&call, 1, 1)?;
                let distinct = if call.distinct { "DISTINCT " } else { "" };
                Ok(format!("COUNT({distinct}{})", self.expr(call.args[0])?))
            }
            "SUM" | "AVG" | "MIN" | "MAX" => {
                check_arity(&call, 1, 1)?;
                let distinct = if call.distinct { "DISTINCT " } else { "" };
                Ok(format!("{name}({distinct}{})", self.expr(call.args[0])?))
            }
            "GROUP_CONCAT" => self.group_concat(&call),
            "ANY_VALUE" => {
                check_arity(&call, 1, 1)?;
                self.expr(call.args[0])
            }
            "VALUES" if self.upsert => {
                check_arity(&call, 1, 1)?;
                match call.args[0] {
                    Expr::Identifier(i) => Ok(format!("excluded.{}", ident::quote(&i.value))),
                    Expr::CompoundIdentifier(ids) => match ids.last() {
                        Some(i) => Ok(format!("excluded.{}", ident::quote(&i.value))),
                        None => Err(parameter_count(&name)),
                    },
                    other => Err(DriverError::not_supported(format!("function > VALUES({other})"))),
                }
            }
            _ => {
                if call.distinct || !call.order_by.is_empty() || call.separator.is_some() {
                    return Err(DriverError::not_supported(format!("function > {name} modifiers")));
                }
                self.scalar_function(&call)
            }
        }
    }

    fn group_concat(&mut self, call: &Call) -> Result<String> {
        if call.args.is_empty() || call.star {
            return Err(parameter_count(&call.name));
        }
        let parts = call
            .args
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>>>()?;
        let value = if parts.len() == 1 {
            parts[0].clone()
        } else {
            format!("({})", parts.join(" || "))
        };
        let separator = call.separator.clone().unwrap_or_else(|| ",".to_string());
        let mut order = Vec::new();
        for item in call.order_by {
            order.push(self.order_item(item)?);
        }
        let order = if order.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order.join(", "))
        };
        if call.distinct {
            if separator != "," {
                return Err(DriverError::not_supported(
                    "function > GROUP_CONCAT(DISTINCT ..) with a separator",
                ));
            }
            return Ok(format!("group_concat(DISTINCT {value}{order})"));
        }
        Ok(format!(
            "group_concat({value}, {}{order})",
            ident::string_literal(&separator)
        ))
    }

    fn scalar_function(&mut self, call: &Call) -> Result<String> {
        let name = call.name.as_str();
        // Functions that inspect their arguments before rendering them.
        match name {
            "NOW" | "CURRENT_TIMESTAMP" | "LOCALTIME" | "LOCALTIMESTAMP" | "SYSDATE" => {
                check_arity(call, 0, 1)?;
                let fsp = call.args.first().and_then(|e| literal_int(e)).unwrap_or(0);
                return Ok(now_sql(fsp.clamp(0, 6) as u32));
            }
            "DATE_ADD" | "DATE_SUB" | "ADDDATE" | "SUBDATE" => {
                check_arity(call, 2, 2)?;
                let base = self.expr(call.args[0])?;
                let subtract = name == "DATE_SUB" || name == "SUBDATE";
                return match call.args[1] {
                    Expr::Interval(i) => {
                        let amount = self.expr(&i.value)?;
                        let unit = i.leading_field.as_ref().map(|f| f.to_string()).unwrap_or_default();
                        date_shift(&base, &amount, &unit, subtract)
                    }
                    days if name == "ADDDATE" || name == "SUBDATE" => {
                        let amount = self.expr(days)?;
                        date_shift(&base, &amount, "DAY", subtract)
                    }
                    _ => Err(parameter_count(name)),
                };
            }
            "TIMESTAMPDIFF" => {
                check_arity(call, 3, 3)?;
                let unit = call.args[0].to_string().to_ascii_uppercase();
                let a = self.expr(call.args[1])?;
                let b = self.expr(call.args[2])?;
                return timestamp_diff(&unit, &a, &b);
            }
            "DATE_FORMAT" | "FROM_UNIXTIME" if call.args.len() == 2 => {
                let Some(format) = literal_string(call.args[1]) else {
                    return Err(DriverError::not_supported(format!(
                        "function > {name} with a non-literal format"
                    )));
                };
                let d = self.expr(call.args[0])?;
                let d = if name == "FROM_UNIXTIME" {
                    format!("datetime({d}, 'unixepoch', 'localtime')")
                } else {
                    d
                };
                return date_format(&d, format);
            }
            "LAST_INSERT_ID" => {
                if !call.args.is_empty() {
                    return Err(DriverError::not_supported("function > LAST_INSERT_ID(expr)"));
                }
                return Ok(self.session.last_insert_id.to_string());
            }
            "FOUND_ROWS" => {
                check_arity(call, 0, 0)?;
                return self.found_rows();
            }
            "RAND" if !call.args.is_empty() => {
                return Err(DriverError::not_supported("function > RAND(seed)"));
            }
            _ => {}
        }

        let args = call
            .args
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>>>()?;
        let a = |i: usize| args[i].as_str();
        let sql = match name {
            // Control flow
            "IF" => {
                check_arity(call, 3, 3)?;
                format!("CASE WHEN {} THEN {} ELSE {} END", a(0), a(1), a(2))
            }
            "IFNULL" => {
                check_arity(call, 2, 2)?;
                format!("ifnull({}, {})", a(0), a(1))
            }
            "NULLIF" => {
                check_arity(call, 2, 2)?;
                format!("nullif({}, {})", a(0), a(1))
            }
            "COALESCE" => {
                check_arity(call, 1, usize::MAX)?;
                if args.len() == 1 {
                    args[0].clone()
                } else {
                    format!("coalesce({})", args.join(", "))
                }
            }
            "ISNULL" => {
                check_arity(call, 1, 1)?;
                format!("({} IS NULL)", a(0))
            }

            // Strings
            "CONCAT" => {
                check_arity(call, 1, usize::MAX)?;
                if args.len() == 1 {
                    format!("CAST({} AS TEXT)", a(0))
                } else {
                    format!("({})", args.join(" || "))
                }
            }
            "CONCAT_WS" => {
                check_arity(call, 2, usize::MAX)?;
                format!("concat_ws({})", args.join(", "))
            }
            "LENGTH" | "OCTET_LENGTH" => {
                check_arity(call, 1, 1)?;
                format!("length(CAST({} AS BLOB))", a(0))
            }
            "CHAR_LENGTH" | "CHARACTER_LENGTH" => {
                check_arity(call, 1, 1)?;
                format!("length({})", a(0))
            }
            "LOWER" | "LCASE" => {
                check_arity(call, 1, 1)?;
                format!("lower({})", a(0))
            }
            "UPPER" | "UCASE" => {
                check_arity(call, 1, 1)?;
                format!("upper({})", a(0))
            }
            "SUBSTRING" | "SUBSTR" | "MID" => {
                check_arity(call, 2, 3)?;
                substr_sql(a(0), a(1), args.get(2).map(String::as_str))
            }
            "LEFT" => {
                check_arity(call, 2, 2)?;
                format!("substr({}, 1, max({}, 0))", a(0), a(1))
            }
            "RIGHT" => {
                check_arity(call, 2, 2)?;
                format!("(CASE WHEN ({1}) <= 0 THEN '' ELSE substr({0}, -({1})) END)", a(0), a(1))
            }
            "LOCATE" => {
                check_arity(call, 2, 3)?;
                let pos = args.get(2).map(String::as_str).unwrap_or("1");
                format!("_mysql_locate({}, {}, {pos})", a(0), a(1))
            }
            "INSTR" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_locate({}, {}, 1)", a(1), a(0))
            }
            "LPAD" | "RPAD" => {
                check_arity(call, 3, 3)?;
                format!("_mysql_{}({}, {}, {})", name.to_ascii_lowercase(), a(0), a(1), a(2))
            }
            "REPEAT" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_repeat({}, {})", a(0), a(1))
            }
            "SPACE" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_repeat(' ', {})", a(0))
            }
            "REVERSE" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_reverse({})", a(0))
            }
            "SHA1" | "SHA" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_sha1({})", a(0))
            }
            "SUBSTRING_INDEX" => {
                check_arity(call, 3, 3)?;
                format!("_mysql_substring_index({}, {}, {})", a(0), a(1), a(2))
            }
            "FIND_IN_SET" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_find_in_set({}, {})", a(0), a(1))
            }
            "REPLACE" => {
                check_arity(call, 3, 3)?;
                format!("replace({}, {}, {})", a(0), a(1), a(2))
            }
            "TRIM" | "LTRIM" | "RTRIM" => {
                check_arity(call, 1, 1)?;
                format!("{}({})", name.to_ascii_lowercase(), a(0))
            }
            "ASCII" | "ORD" => {
                check_arity(call, 1, 1)?;
                format!("(CASE WHEN {0} = '' THEN 0 ELSE unicode({0}) END)", a(0))
            }
            "CHAR" => {
                check_arity(call, 1, usize::MAX)?;
                format!("char({})", args.join(", "))
            }
            "STRCMP" => {
                check_arity(call, 2, 2)?;
                format!(
                    "(CASE WHEN {0} < {1} THEN -1 WHEN {0} > {1} THEN 1 WHEN {0} = {1} THEN 0 END)",
                    a(0),
                    a(1)
                )
            }
            "HEX" => {
                check_arity(call, 1, 1)?;
                format!(
                    "(CASE WHEN typeof({0}) = 'integer' THEN printf('%X', {0}) ELSE hex({0}) END)",
                    a(0)
                )
            }
            "UNHEX" => {
                check_arity(call, 1, 1)?;
                format!("unhex({})", a(0))
            }
            "FIELD" => {
                check_arity(call, 2, usize::MAX)?;
                let mut out = format!("CASE {}", a(0));
                for (i, v) in args[1..].iter().enumerate() {
                    out.push_str(&format!(" WHEN {v} THEN {}", i + 1));
                }
                out.push_str(" ELSE 0 END");
                out
            }
            "ELT" => {
                check_arity(call, 2, usize::MAX)?;
                let mut out = format!("CASE {}", a(0));
                for (i, v) in args[1..].iter().enumerate() {
                    out.push_str(&format!(" WHEN {} THEN {v}", i + 1));
                }
                out.push_str(" END");
                out
            }
            "REGEXP_LIKE" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_regexp({}, {}, 1)", a(0), a(1))
            }
            "REGEXP_REPLACE" => {
                check_arity(call, 3, 3)?;
                format!("_mysql_regexp_replace({}, {}, {})", a(0), a(1), a(2))
            }
            "REGEXP_SUBSTR" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_regexp_substr({}, {})", a(0), a(1))
            }

            // Math
            "ABS" => {
                check_arity(call, 1, 1)?;
                format!("abs({})", a(0))
            }
            "SIGN" => {
                check_arity(call, 1, 1)?;
                format!("sign({})", a(0))
            }
            "CEIL" | "CEILING" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_ceil({})", a(0))
            }
            "FLOOR" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_floor({})", a(0))
            }
            "ROUND" => {
                check_arity(call, 1, 2)?;
                format!("round({})", args.join(", "))
            }
            "TRUNCATE" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_truncate({}, {})", a(0), a(1))
            }
            "MOD" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_mod({}, {})", a(0), a(1))
            }
            "POW" | "POWER" => {
                check_arity(call, 2, 2)?;
                format!("_mysql_pow({}, {})", a(0), a(1))
            }
            "SQRT" | "EXP" | "LN" | "LOG2" | "LOG10" => {
                check_arity(call, 1, 1)?;
                format!("_mysql_{}({})", name.to_ascii_lowercase(), a(0))
            }
            "LOG" => {
                check_arity(call, 1, 2)?;
                format!("_mysql_log({})", args.join(", "))
            }
            "PI" => {
                check_arity(call, 0, 0)?;
                "3.141592653589793".to_string()
            }
            "RAND" => "(abs(random() % 1000000000) / 1000000000.0)".to_string(),
            "GREATEST" => {
                check_arity(call, 2, usize::MAX)?;
                format!("max({})", args.join(", "))
            }
            "LEAST" => {
                check_arity(call, 2, usize::MAX)?;
                format!("min({})", args.join(", "))
            }

            // Dates and times
            "CURDATE" | "CURRENT_DATE" => {
                check_arity(call, 0, 0)?;
                "date('now', 'localtime')".to_string()
            }
            "CURTIME" | "CURRENT_TIME" => {
                check_arity(call, 0, 1)?;
                "time('now', 'localtime')".to_string()
            }
            "UTC_TIMESTAMP" => "datetime('now')".to_string(),
            "UTC_DATE" => "date('now')".to_string(),
            "UTC_TIME" => "time('now')".to_string(),
            "UNIX_TIMESTAMP" => {
                check_arity(call, 0, 1)?;
                match args.first() {
                    None => "CAST(strftime('%s', 'now') AS INTEGER)".to_string(),
                    Some(d) => format!("CAST(strftime('%s', {d}, 'utc') AS INTEGER)"),
                }
            }
            "FROM_UNIXTIME" => {
                check_arity(call, 1, 1)?;
                format!("datetime({}, 'unixepoch', 'localtime')", a(0))
            }
            "DATE" => {
                check_arity(call, 1, 1)?;
                format!("date({})", a(0))
            }
            "TIME" => {
                check_arity(call, 1, 1)?;
                format!("time({})", a(0))
            }
            "TIMESTAMP" => {
                check_arity(call, 1, 1)?;
                format!("datetime({})", a(0))
            }
            "YEAR" | "MONTH" | "DAY" | "DAYOFMONTH" | "HOUR" | "MINUTE" | "SECOND" | "QUARTER"
            | "MICROSECOND" => {
                check_arity(call, 1, 1)?;
                let field = if name == "DAYOFMONTH" { "DAY" } else { name };
                self.extract(field, a(0))?
            }
            "DAYOFYEAR" => {
                check_arity(call, 1, 1)?;
                strftime_int("%j", a(0))
            }
            "DAYOFWEEK" => {
                check_arity(call, 1, 1)?;
                format!("({} + 1)", strftime_int("%w", a(0)))
            }
            "WEEKDAY" => {
                check_arity(call, 1, 1)?;
                format!("(({} + 6) % 7)", strftime_int("%w", a(0)))
            }
            "DAYNAME" => {
                check_arity(call, 1, 1)?;
                day_name(a(0), false)
            }
            "MONTHNAME" => {
                check_arity(call, 1, 1)?;
                month_name(a(0), false)
            }
            "LAST_DAY" => {
                check_arity(call, 1, 1)?;
                format!("date({}, 'start of month', '+1 month', '-1 day')", a(0))
            }
            "DATEDIFF" => {
                check_arity(call, 2, 2)?;
                format!("CAST(julianday(date({})) - julianday(date({})) AS INTEGER)", a(0), a(1))
            }

            // JSON
            "JSON_EXTRACT" => {
                check_arity(call, 2, 2)?;
                format!("({} -> {})", a(0), a(1))
            }
            "JSON_UNQUOTE" => {
                check_arity(call, 1, 1)?;
                format!(
                    "(CASE WHEN json_valid({0}) AND json_type({0}) = 'text' THEN {0} ->> '$' ELSE {0} END)",
                    a(0)
                )
            }
            "JSON_OBJECT" => format!("json_object({})", args.join(", ")),
            "JSON_ARRAY" => format!("json_array({})", args.join(", ")),
            "JSON_VALID" => {
                check_arity(call, 1, 1)?;
                format!("json_valid({})", a(0))
            }
            "JSON_TYPE" => {
                check_arity(call, 1, 1)?;
                format!(
                    "(CASE json_type({0}) WHEN 'text' THEN 'STRING' WHEN 'true' THEN 'BOOLEAN' \
                     WHEN 'false' THEN 'BOOLEAN' WHEN 'real' THEN 'DOUBLE' ELSE upper(json_type({0})) END)",
                    a(0)
                )
            }

            // Session
            "DATABASE" | "SCHEMA" => match &self.session.current_db {
                Some(db) => ident::string_literal(db),
                None => "NULL".to_string(),
            },
            "VERSION" => ident::string_literal(SERVER_VERSION),
            "CONNECTION_ID" => self.session.conn_id.to_string(),
            "ROW_COUNT" => self.session.row_count.to_string(),
            "USER" | "CURRENT_USER" | "SESSION_USER" | "SYSTEM_USER" => {
                ident::string_literal(&format!("{}@localhost", self.session.user))
            }
            "UUID" => "lower(hex(randomblob(4)) || '-' || hex(randomblob(2)) || '-' || \
                       hex(randomblob(2)) || '-' || hex(randomblob(2)) || '-' || hex(randomblob(6)))"
                .to_string(),

            other => {
                return Err(DriverError::not_supported(format!("function > {other}")));
            }
        };
        Ok(sql)
    }

    /// `FOUND_ROWS()` for the previous SELECT.
    fn found_rows(&self) -> Result<String> {
        match &self.session.found_rows {
            FoundRows::None => Ok("0".to_string()),
            FoundRows::Count(n) => Ok(n.to_string()),
            FoundRows::Pending(sql) => {
                let count = self
                    .engine
                    .query_scalar(&format!("SELECT COUNT(*) FROM ({sql})"), &[])?
                    .and_then(|c| c.as_i64())
                    .unwrap_or(0);
                Ok(count.to_string())
            }
        }
    }
}

/// `TIMESTAMPDIFF(unit, a, b)`: whole units from `a` to `b`, truncated.
fn timestamp_diff(unit: &str, a: &str, b: &str) -> Result<String> {
    let seconds = format!(
        "(CAST(strftime('%s', {b}) AS INTEGER) - CAST(strftime('%s', {a}) AS INTEGER))"
    );
    let months = || {
        let raw = format!(
            "(({} - {}) * 12 + {} - {})",
            strftime_int("%Y", b),
            strftime_int("%Y", a),
            strftime_int("%m", b),
            strftime_int("%m", a)
        );
        let tail = |d: &str| format!("strftime('%d %H:%M:%f', {d})");
        format!(
            "({raw} - CASE WHEN {raw} > 0 AND {} < {} THEN 1 \
             WHEN {raw} < 0 AND {} > {} THEN -1 ELSE 0 END)",
            tail(b),
            tail(a),
            tail(b),
            tail(a)
        )
    };
    Ok(match unit {
        "SECOND" => seconds,
        "MINUTE" => format!("({seconds} / 60)"),
        "HOUR" => format!("({seconds} / 3600)"),
        "DAY" => format!("({seconds} / 86400)"),
        "WEEK" => format!("({seconds} / 604800)"),
        "MONTH" => months(),
        "QUARTER" => format!("({} / 3)", months()),
        "YEAR" => format!("({} / 12)", months()),
        other => return Err(DriverError::not_supported(format!("function > TIMESTAMPDIFF unit {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::session::{Session, SqlMode};
    use crate::translator::render_expression;

    fn eval(engine: &Engine, session: &Session, text: &str) -> Option<String> {
        let sql = render_expression(session, engine, text).unwrap();
        engine
            .query_scalar(&format!("SELECT {sql}"), &[])
            .unwrap()
            .and_then(|c| c.to_text())
    }

    fn session() -> Session {
        let mut s = Session::new(3, "app", SqlMode::STRICT_TRANS_TABLES);
        s.current_db = Some("app".into());
        s.user = "root".into();
        s
    }

    #[test]
    fn string_functions() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        assert_eq!(eval(&engine, &s, "CONCAT('a', 1, 'b')").as_deref(), Some("a1b"));
        assert_eq!(eval(&engine, &s, "CONCAT('a', NULL)"), None);
        assert_eq!(eval(&engine, &s, "CONCAT_WS('-', 'a', NULL, 'b')").as_deref(), Some("a-b"));
        assert_eq!(eval(&engine, &s, "LENGTH('é')").as_deref(), Some("2"));
        assert_eq!(eval(&engine, &s, "CHAR_LENGTH('é')").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "LEFT('hello', 2)").as_deref(), Some("he"));
        assert_eq!(eval(&engine, &s, "RIGHT('hello', 3)").as_deref(), Some("llo"));
        assert_eq!(eval(&engine, &s, "LOCATE('l', 'hello')").as_deref(), Some("3"));
        assert_eq!(eval(&engine, &s, "INSTR('hello', 'lo')").as_deref(), Some("4"));
        assert_eq!(eval(&engine, &s, "LPAD('7', 3, '0')").as_deref(), Some("007"));
        assert_eq!(eval(&engine, &s, "FIELD('b', 'a', 'b')").as_deref(), Some("2"));
        assert_eq!(eval(&engine, &s, "IF(1 > 2, 'y', 'n')").as_deref(), Some("n"));
        assert_eq!(eval(&engine, &s, "HEX(255)").as_deref(), Some("FF"));
        assert_eq!(eval(&engine, &s, "SUBSTRING_INDEX('a.b.c', '.', 2)").as_deref(), Some("a.b"));
    }

    #[test]
    fn date_functions() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        assert_eq!(eval(&engine, &s, "YEAR('2024-05-06')").as_deref(), Some("2024"));
        assert_eq!(eval(&engine, &s, "DAYOFWEEK('2024-05-06')").as_deref(), Some("2"));
        assert_eq!(eval(&engine, &s, "DATEDIFF('2024-03-01', '2024-02-01')").as_deref(), Some("29"));
        assert_eq!(
            eval(&engine, &s, "DATE_ADD('2024-01-31', INTERVAL 1 MONTH)").as_deref(),
            Some("2024-02-29")
        );
        assert_eq!(
            eval(&engine, &s, "TIMESTAMPDIFF(MONTH, '2024-01-31', '2024-02-29')").as_deref(),
            Some("0")
        );
        assert_eq!(
            eval(&engine, &s, "TIMESTAMPDIFF(MONTH, '2024-01-15', '2024-03-15')").as_deref(),
            Some("2")
        );
        assert_eq!(
            eval(&engine, &s, "TIMESTAMPDIFF(HOUR, '2024-01-01 00:00:00', '2024-01-02 06:30:00')").as_deref(),
            Some("30")
        );
        assert_eq!(eval(&engine, &s, "LAST_DAY('2023-02-10')").as_deref(), Some("2023-02-28"));
    }

    #[test]
    fn date_format_specifiers() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        assert_eq!(
            eval(&engine, &s, "DATE_FORMAT('2024-05-06 14:07:09', '%Y-%m-%d %H:%i:%s')").as_deref(),
            Some("2024-05-06 14:07:09")
        );
        assert_eq!(
            eval(&engine, &s, "DATE_FORMAT('2024-05-06 14:07:09', '%W %M %D, %y')").as_deref(),
            Some("Monday May 6th, 24")
        );
        assert_eq!(
            eval(&engine, &s, "DATE_FORMAT('2024-05-06 14:07:09', '%l:%i %p')").as_deref(),
            Some("2:07 PM")
        );
        assert_eq!(eval(&engine, &s, "DATE_FORMAT('2024-05-06', '100%%')").as_deref(), Some("100%"));
        assert_eq!(
            eval(&engine, &s, "DATE_FORMAT('2024-05-06 09:15:00', '%H.%i') < 9.3").as_deref(),
            Some("1")
        );
    }

    #[test]
    fn aggregates_and_session_values() {
        let engine = Engine::open_in_memory().unwrap();
        let mut s = session();
        s.last_insert_id = 42;
        s.found_rows = FoundRows::Pending("SELECT 1 UNION ALL SELECT 2".into());
        assert_eq!(eval(&engine, &s, "LAST_INSERT_ID()").as_deref(), Some("42"));
        assert_eq!(eval(&engine, &s, "FOUND_ROWS()").as_deref(), Some("2"));
        assert_eq!(eval(&engine, &s, "DATABASE()").as_deref(), Some("app"));
        assert_eq!(eval(&engine, &s, "CURRENT_USER()").as_deref(), Some("root@localhost"));
        assert_eq!(
            render_expression(&s, &engine, "GROUP_CONCAT(x ORDER BY x DESC SEPARATOR ';')").unwrap(),
            "group_concat(\"x\", ';' ORDER BY \"x\" DESC)"
        );
        assert!(matches!(
            render_expression(&s, &engine, "LEFT('a')"),
            Err(DriverError::Value { code: 1582, .. })
        ));
        assert!(matches!(
            render_expression(&s, &engine, "ROW_NUMBER() OVER ()"),
            Err(DriverError::NotSupported(_))
        ));
    }
}
