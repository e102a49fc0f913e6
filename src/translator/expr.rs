//! Expression rendering.

use sqlparser::ast::{self, BinaryOperator, Expr, Ident};

use super::names;
use super::Translator;
use crate::error::{DriverError, Result};
use crate::ident;
use crate::lexer;

/// How an operand compares: `BINARY`, `_bin` collations and `_binary`
/// strings make LIKE and REGEXP case sensitive.
fn is_binary(expr: &Expr) -> bool {
    match expr {
        Expr::Collate { collation, .. } => {
            let c = collation.to_string().to_ascii_lowercase();
            c.trim_matches('`').ends_with("_bin") || c.trim_matches('`') == "binary"
        }
        Expr::Cast { data_type, .. } => data_type.to_string().to_ascii_uppercase().starts_with("BINARY"),
        Expr::Prefixed { prefix, .. } => prefix.value.eq_ignore_ascii_case("_binary"),
        Expr::Nested(inner) => is_binary(inner),
        _ => false,
    }
}

/// Engine type for a `CAST(.. AS type)` target.
fn cast_target(data_type: &str) -> Result<&'static str> {
    let upper = data_type.to_ascii_uppercase();
    let head = upper
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("");
    Ok(match head {
        "SIGNED" | "UNSIGNED" | "INT" | "INTEGER" | "BIGINT" => "INTEGER",
        "CHAR" | "NCHAR" | "VARCHAR" | "TEXT" | "JSON" => "TEXT",
        "BINARY" | "VARBINARY" | "BLOB" => "BLOB",
        "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => "NUMERIC",
        "DOUBLE" | "FLOAT" | "REAL" => "REAL",
        "DATE" => "DATE",
        "DATETIME" | "TIMESTAMP" => "DATETIME",
        "TIME" => "TIME",
        "YEAR" => "YEAR",
        _ => return Err(DriverError::not_supported(format!("expression > CAST AS {data_type}"))),
    })
}

/// Unit of an interval, in the engine's date modifier vocabulary, with a
/// multiplier. Units of a day or longer keep DATE values as dates.
fn interval_unit(unit: &str) -> Result<(&'static str, f64, bool)> {
    Ok(match unit.to_ascii_uppercase().as_str() {
        "MICROSECOND" => ("seconds", 0.000_001, false),
        "SECOND" | "" => ("seconds", 1.0, false),
        "MINUTE" => ("minutes", 1.0, false),
        "HOUR" => ("hours", 1.0, false),
        "DAY" => ("days", 1.0, true),
        "WEEK" => ("days", 7.0, true),
        "MONTH" => ("months", 1.0, true),
        "QUARTER" => ("months", 3.0, true),
        "YEAR" => ("years", 1.0, true),
        other => return Err(DriverError::not_supported(format!("expression > INTERVAL unit {other}"))),
    })
}

/// Engine expression shifting a date or datetime by `amount` units.
pub fn date_shift(base: &str, amount: &str, unit: &str, subtract: bool) -> Result<String> {
    let (modifier, scale, date_preserving) = interval_unit(unit)?;
    let sign = if subtract { "-" } else { "" };
    let scaled = if scale == 1.0 {
        format!("{sign}({amount})")
    } else {
        format!("{sign}({amount}) * {scale}")
    };
    let shift = match modifier {
        "seconds" => format!("printf('%+.6f seconds', {scaled})"),
        // Months clamp to the last day like MySQL instead of overflowing.
        "months" | "years" => format!("printf('%+d {modifier}', {scaled}), 'floor'"),
        _ => format!("printf('%+d {modifier}', {scaled})"),
    };
    let long = format!(
        "CASE WHEN length({base}) > 19 THEN strftime('%Y-%m-%d %H:%M:%f', {base}, {shift}) \
         ELSE datetime({base}, {shift}) END"
    );
    if date_preserving {
        Ok(format!(
            "(CASE WHEN length({base}) = 10 THEN date({base}, {shift}) ELSE {long} END)"
        ))
    } else {
        Ok(format!("({long})"))
    }
}

impl<'a> Translator<'a> {
    pub fn expr(&mut self, e: &Expr) -> Result<String> {
        match e {
            Expr::Identifier(i) => self.identifier(i),
            Expr::CompoundIdentifier(ids) => self.compound_identifier(ids),
            Expr::Value(v) => self.value(&v.value),
            Expr::Nested(inner) => Ok(format!("({})", self.expr(inner)?)),
            Expr::BinaryOp { left, op, right } => self.binary(left, op, right),
            Expr::UnaryOp { op, expr } => {
                let inner = self.expr(expr)?;
                match op.to_string().as_str() {
                    "NOT" | "!" => Ok(format!("(NOT {inner})")),
                    "-" => Ok(format!("(- {inner})")),
                    "+" => Ok(inner),
                    "~" => Ok(format!("(~ {inner})")),
                    other => Err(DriverError::not_supported(format!("operator > unary {other}"))),
                }
            }
            Expr::IsNull(inner) | Expr::IsUnknown(inner) => Ok(format!("({} IS NULL)", self.expr(inner)?)),
            Expr::IsNotNull(inner) | Expr::IsNotUnknown(inner) => {
                Ok(format!("({} IS NOT NULL)", self.expr(inner)?))
            }
            Expr::IsTrue(inner) => Ok(format!("({} IS TRUE)", self.expr(inner)?)),
            Expr::IsNotTrue(inner) => Ok(format!("({} IS NOT TRUE)", self.expr(inner)?)),
            Expr::IsFalse(inner) => Ok(format!("({} IS FALSE)", self.expr(inner)?)),
            Expr::IsNotFalse(inner) => Ok(format!("({} IS NOT FALSE)", self.expr(inner)?)),
            Expr::IsDistinctFrom(a, b) => Ok(format!("({} IS NOT {})", self.expr(a)?, self.expr(b)?)),
            Expr::IsNotDistinctFrom(a, b) => Ok(format!("({} IS {})", self.expr(a)?, self.expr(b)?)),
            Expr::InList { expr, list, negated } => {
                let target = self.expr(expr)?;
                let items = self.expr_list(list)?;
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("({target} {not}IN ({}))", items.join(", ")))
            }
            Expr::InSubquery { expr, subquery, negated } => {
                let target = self.expr(expr)?;
                let sub = self.subquery(subquery)?;
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("({target} {not}IN ({sub}))"))
            }
            Expr::Exists { subquery, negated } => {
                let sub = self.subquery(subquery)?;
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("({not}EXISTS ({sub}))"))
            }
            Expr::Subquery(q) => Ok(format!("({})", self.subquery(q)?)),
            Expr::Between { expr, negated, low, high } => {
                let not = if *negated { "NOT " } else { "" };
                Ok(format!(
                    "({} {not}BETWEEN {} AND {})",
                    self.expr(expr)?,
                    self.expr(low)?,
                    self.expr(high)?
                ))
            }
            Expr::Like { negated, expr, pattern, escape_char, .. }
            | Expr::ILike { negated, expr, pattern, escape_char, .. } => {
                let escape = escape_char.as_ref().map(|c| ident::unquote_string(&c.to_string()));
                self.like(*negated, expr, pattern, escape)
            }
            Expr::RLike { negated, expr, pattern, .. } => {
                let ci = if is_binary(expr) || is_binary(pattern) { 0 } else { 1 };
                let call = format!("_mysql_regexp({}, {}, {ci})", self.expr(expr)?, self.expr(pattern)?);
                Ok(if *negated { format!("(NOT {call})") } else { call })
            }
            Expr::Tuple(items) => Ok(format!("({})", self.expr_list(items)?.join(", "))),
            Expr::Case { operand, conditions, else_result, .. } => {
                let mut out = String::from("CASE");
                if let Some(op) = operand {
                    out.push(' ');
                    out.push_str(&self.expr(op)?);
                }
                for when in conditions {
                    let c = self.expr(&when.condition)?;
                    let r = self.expr(&when.result)?;
                    out.push_str(&format!(" WHEN {c} THEN {r}"));
                }
                if let Some(e) = else_result {
                    out.push_str(&format!(" ELSE {}", self.expr(e)?));
                }
                out.push_str(" END");
                Ok(out)
            }
            Expr::Cast { expr, data_type, .. } => self.cast(expr, &data_type.to_string()),
            Expr::Convert { expr, data_type, .. } => match data_type {
                Some(t) => self.cast(expr, &t.to_string()),
                // CONVERT(.. USING charset): one storage charset.
                None => self.expr(expr),
            },
            Expr::Extract { field, expr, .. } => {
                let inner = self.expr(expr)?;
                self.extract(&field.to_string(), &inner)
            }
            Expr::Ceil { expr, .. } => Ok(format!("_mysql_ceil({})", self.expr(expr)?)),
            Expr::Floor { expr, .. } => Ok(format!("_mysql_floor({})", self.expr(expr)?)),
            Expr::Position { expr, r#in } => {
                Ok(format!("_mysql_locate({}, {}, 1)", self.expr(expr)?, self.expr(r#in)?))
            }
            Expr::Substring { expr, substring_from, substring_for, .. } => {
                let s = self.expr(expr)?;
                let from = match substring_from {
                    Some(f) => self.expr(f)?,
                    None => "1".to_string(),
                };
                let len = substring_for.as_ref().map(|l| self.expr(l)).transpose()?;
                Ok(substr_sql(&s, &from, len.as_deref()))
            }
            Expr::Trim { expr, trim_where, trim_what, .. } => {
                let s = self.expr(expr)?;
                let func = match trim_where.as_ref().map(|w| w.to_string().to_ascii_uppercase()) {
                    Some(w) if w == "LEADING" => "ltrim",
                    Some(w) if w == "TRAILING" => "rtrim",
                    _ => "trim",
                };
                match trim_what {
                    None => Ok(format!("{func}({s})")),
                    Some(what) => {
                        if let Expr::Value(v) = what.as_ref() {
                            if let ast::Value::SingleQuotedString(chars) = &v.value {
                                if chars.chars().count() > 1 {
                                    return Err(DriverError::not_supported(
                                        "expression > TRIM of a multi-character string",
                                    ));
                                }
                            }
                        }
                        Ok(format!("{func}({s}, {})", self.expr(what)?))
                    }
                }
            }
            Expr::Collate { expr, collation } => {
                let inner = self.expr(expr)?;
                let name = collation.to_string().trim_matches('`').to_ascii_lowercase();
                if name.ends_with("_bin") || name == "binary" {
                    Ok(format!("({inner} COLLATE BINARY)"))
                } else if name.ends_with("_ci") {
                    Ok(format!("({inner} COLLATE NOCASE)"))
                } else {
                    Ok(inner)
                }
            }
            Expr::Prefixed { prefix, value } if prefix.value.starts_with('_') => {
                let literal = match value.as_ref() {
                    Expr::Value(v) => self.value(&v.value)?,
                    other => self.expr(other)?,
                };
                if prefix.value.eq_ignore_ascii_case("_binary") {
                    Ok(format!("CAST({literal} AS BLOB)"))
                } else {
                    Ok(literal)
                }
            }
            Expr::Function(f) => self.function(f),
            Expr::Interval(_) => Err(DriverError::not_supported("expression > INTERVAL outside date arithmetic")),
            Expr::MatchAgainst { .. } => Err(DriverError::not_supported("expression > MATCH ... AGAINST")),
            other => Err(DriverError::not_supported(format!("expression > {other}"))),
        }
    }

    pub fn expr_list(&mut self, list: &[Expr]) -> Result<Vec<String>> {
        list.iter().map(|e| self.expr(e)).collect()
    }

    fn identifier(&mut self, i: &Ident) -> Result<String> {
        if i.quote_style.is_none() {
            if i.value.starts_with("@@") {
                return Ok(self.session.system_variable(&i.value)?.to_sql_literal());
            }
            if i.value.starts_with('@') {
                return Ok(self.session.user_variable(&i.value).to_sql_literal());
            }
        }
        Ok(ident::quote(&i.value))
    }

    fn compound_identifier(&mut self, ids: &[Ident]) -> Result<String> {
        if ids.first().is_some_and(|i| i.value.starts_with("@@")) {
            let name: Vec<&str> = ids.iter().map(|i| i.value.as_str()).collect();
            return Ok(self.session.system_variable(&name.join("."))?.to_sql_literal());
        }
        let parts = names::column_parts(self.session, ids)?;
        Ok(parts
            .iter()
            .map(|i| ident::quote(&i.value))
            .collect::<Vec<_>>()
            .join("."))
    }

    pub(super) fn value(&self, v: &ast::Value) -> Result<String> {
        match v {
            ast::Value::Number(n, _) => Ok(n.to_string()),
            ast::Value::SingleQuotedString(s)
            | ast::Value::DoubleQuotedString(s)
            | ast::Value::NationalStringLiteral(s)
            | ast::Value::EscapedStringLiteral(s) => Ok(ident::string_literal(s)),
            ast::Value::HexStringLiteral(h) => lexer::hex_bytes(h)
                .map(|b| ident::blob_literal(&b))
                .ok_or_else(|| DriverError::Parse(format!("invalid hex literal X'{h}'"))),
            ast::Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            ast::Value::Null => Ok("NULL".to_string()),
            ast::Value::Placeholder(_) => Ok("?".to_string()),
            other => Err(DriverError::not_supported(format!("literal > {other}"))),
        }
    }

    fn binary(&mut self, left: &Expr, op: &BinaryOperator, right: &Expr) -> Result<String> {
        match (op, left, right) {
            (BinaryOperator::Plus | BinaryOperator::Minus, base, Expr::Interval(i)) => {
                let base = self.expr(base)?;
                return self.interval_shift(&base, i, *op == BinaryOperator::Minus);
            }
            (BinaryOperator::Plus, Expr::Interval(i), base) => {
                let base = self.expr(base)?;
                return self.interval_shift(&base, i, false);
            }
            _ => {}
        }
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        let sql = match op {
            BinaryOperator::Plus => format!("({l} + {r})"),
            BinaryOperator::Minus => format!("({l} - {r})"),
            BinaryOperator::Multiply => format!("({l} * {r})"),
            BinaryOperator::Divide => format!("({l} * 1.0 / {r})"),
            BinaryOperator::Modulo => format!("_mysql_mod({l}, {r})"),
            BinaryOperator::MyIntegerDivide => format!("CAST({l} / {r} AS INTEGER)"),
            BinaryOperator::Eq => format!("({l} = {r})"),
            BinaryOperator::NotEq => format!("({l} <> {r})"),
            BinaryOperator::Lt => format!("({l} < {r})"),
            BinaryOperator::LtEq => format!("({l} <= {r})"),
            BinaryOperator::Gt => format!("({l} > {r})"),
            BinaryOperator::GtEq => format!("({l} >= {r})"),
            BinaryOperator::Spaceship => format!("({l} IS {r})"),
            BinaryOperator::And => format!("({l} AND {r})"),
            BinaryOperator::Or => format!("({l} OR {r})"),
            BinaryOperator::Xor => format!("((({l}) <> 0) <> (({r}) <> 0))"),
            BinaryOperator::BitwiseAnd => format!("({l} & {r})"),
            BinaryOperator::BitwiseOr => format!("({l} | {r})"),
            BinaryOperator::BitwiseXor => format!("((({l}) | ({r})) - (({l}) & ({r})))"),
            BinaryOperator::PGBitwiseShiftLeft => format!("({l} << {r})"),
            BinaryOperator::PGBitwiseShiftRight => format!("({l} >> {r})"),
            BinaryOperator::StringConcat if self.session.pipes_as_concat() => format!("({l} || {r})"),
            BinaryOperator::StringConcat => format!("({l} OR {r})"),
            BinaryOperator::Arrow => format!("({l} -> {r})"),
            BinaryOperator::LongArrow => format!("({l} ->> {r})"),
            other => return Err(DriverError::not_supported(format!("operator > {other}"))),
        };
        Ok(sql)
    }

    fn interval_shift(&mut self, base: &str, interval: &ast::Interval, subtract: bool) -> Result<String> {
        let amount = self.expr(&interval.value)?;
        let unit = interval
            .leading_field
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default();
        date_shift(base, &amount, &unit, subtract)
    }

    fn like(&mut self, negated: bool, expr: &Expr, pattern: &Expr, escape: Option<String>) -> Result<String> {
        let binary = is_binary(expr) || is_binary(pattern);
        let e = self.expr(expr)?;
        let p = self.expr(pattern)?;
        let escape = match escape {
            Some(c) => Some(c),
            None if self.session.no_backslash_escapes() => None,
            None => Some("\\".to_string()),
        };
        let not = if negated { "NOT " } else { "" };
        if binary {
            let esc = escape.as_deref().map(ident::string_literal).unwrap_or_else(|| "NULL".into());
            return Ok(format!("({not}_mysql_like_binary({e}, {p}, {esc}))"));
        }
        match escape {
            Some(c) => Ok(format!("({e} {not}LIKE {p} ESCAPE {})", ident::string_literal(&c))),
            None => Ok(format!("({e} {not}LIKE {p})")),
        }
    }

    fn cast(&mut self, expr: &Expr, data_type: &str) -> Result<String> {
        let inner = self.expr(expr)?;
        Ok(match cast_target(data_type)? {
            "DATE" => format!("date({inner})"),
            "DATETIME" => format!("datetime({inner})"),
            "TIME" => format!("time({inner})"),
            "YEAR" => format!("CAST(strftime('%Y', {inner}) AS INTEGER)"),
            target => format!("CAST({inner} AS {target})"),
        })
    }

    pub(super) fn extract(&mut self, field: &str, inner: &str) -> Result<String> {
        let part = |fmt: &str| format!("CAST(strftime('{fmt}', {inner}) AS INTEGER)");
        Ok(match field.to_ascii_uppercase().as_str() {
            "YEAR" => part("%Y"),
            "MONTH" => part("%m"),
            "DAY" => part("%d"),
            "HOUR" => part("%H"),
            "MINUTE" => part("%M"),
            "SECOND" => part("%S"),
            "QUARTER" => format!("(({} + 2) / 3)", part("%m")),
            "MICROSECOND" => format!("CAST(substr(strftime('%f', {inner}), 4) || '000' AS INTEGER)"),
            "YEAR_MONTH" => format!("({} * 100 + {})", part("%Y"), part("%m")),
            other => return Err(DriverError::not_supported(format!("expression > EXTRACT({other})"))),
        })
    }
}

/// `SUBSTRING(s, pos[, len])` with MySQL's position and length rules.
pub fn substr_sql(s: &str, pos: &str, len: Option<&str>) -> String {
    match len {
        Some(len) => format!("(CASE WHEN ({pos}) = 0 THEN '' ELSE substr({s}, {pos}, max({len}, 0)) END)"),
        None => format!("(CASE WHEN ({pos}) = 0 THEN '' ELSE substr({s}, {pos}) END)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::session::{Session, SqlMode};
    use crate::translator::render_expression;

    fn session(mode: SqlMode) -> Session {
        let mut s = Session::new(7, "app", mode);
        s.current_db = Some("app".into());
        s
    }

    fn eval(engine: &Engine, session: &Session, text: &str) -> Option<String> {
        let sql = render_expression(session, engine, text).unwrap();
        engine
            .query_scalar(&format!("SELECT {sql}"), &[])
            .unwrap()
            .and_then(|c| c.to_text())
    }

    #[test]
    fn arithmetic_follows_mysql() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        assert_eq!(eval(&engine, &s, "7 / 2").as_deref(), Some("3.5"));
        assert_eq!(eval(&engine, &s, "7 DIV 2").as_deref(), Some("3"));
        assert_eq!(eval(&engine, &s, "7 % 0"), None);
        assert_eq!(eval(&engine, &s, "NULL <=> NULL").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "1 XOR 1").as_deref(), Some("0"));
        assert_eq!(eval(&engine, &s, "5 ^ 3").as_deref(), Some("6"));
    }

    #[test]
    fn variables_become_literals() {
        let engine = Engine::open_in_memory().unwrap();
        let mut s = session(SqlMode::STRICT_TRANS_TABLES);
        s.set_user_variable("@x", crate::model::Cell::Int(41));
        assert_eq!(render_expression(&s, &engine, "@x + 1").unwrap(), "(41 + 1)");
        assert_eq!(render_expression(&s, &engine, "@@autocommit").unwrap(), "1");
        assert_eq!(render_expression(&s, &engine, "@@session.autocommit").unwrap(), "1");
        assert!(matches!(
            render_expression(&s, &engine, "@@no_such_thing"),
            Err(DriverError::UnknownSystemVariable(_))
        ));
    }

    #[test]
    fn pipes_depend_on_sql_mode() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::empty());
        assert_eq!(eval(&engine, &s, "0 || 1").as_deref(), Some("1"));
        let s = session(SqlMode::PIPES_AS_CONCAT);
        assert_eq!(eval(&engine, &s, "'a' || 'b'").as_deref(), Some("ab"));
    }

    #[test]
    fn like_escapes_and_binary_collations() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        assert_eq!(eval(&engine, &s, "'ABC' LIKE 'a%'").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "'ABC' LIKE 'a%' COLLATE utf8mb4_bin").as_deref(), Some("0"));
        assert_eq!(eval(&engine, &s, "'a_c' LIKE 'a|_c' ESCAPE '|'").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "'abc' LIKE 'a|_c' ESCAPE '|'").as_deref(), Some("0"));
        assert_eq!(eval(&engine, &s, "'Abc' REGEXP '^a'").as_deref(), Some("1"));
    }

    #[test]
    fn charset_introducers() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        let sql = render_expression(&s, &engine, "_binary 'ABC' LIKE 'a%'").unwrap();
        assert!(sql.contains("_mysql_like_binary"), "{sql}");
        assert_eq!(eval(&engine, &s, "_binary 'ABC' LIKE 'a%'").as_deref(), Some("0"));
        assert_eq!(eval(&engine, &s, "'ABC' LIKE _binary 'A%'").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "_utf8mb4 'ABC' LIKE 'a%'").as_deref(), Some("1"));
        assert_eq!(eval(&engine, &s, "_utf8mb4 'it''s'").as_deref(), Some("it's"));
    }

    #[test]
    fn interval_arithmetic_keeps_dates_as_dates() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        assert_eq!(eval(&engine, &s, "'2024-01-31' + INTERVAL 1 MONTH").as_deref(), Some("2024-02-29"));
        assert_eq!(eval(&engine, &s, "'2024-03-01' - INTERVAL 1 DAY").as_deref(), Some("2024-02-29"));
        assert_eq!(
            eval(&engine, &s, "'2024-03-01 10:00:00' + INTERVAL 90 MINUTE").as_deref(),
            Some("2024-03-01 11:30:00")
        );
        assert_eq!(
            eval(&engine, &s, "'2024-03-01' + INTERVAL 1 HOUR").as_deref(),
            Some("2024-03-01 01:00:00")
        );
    }

    #[test]
    fn casts_and_substrings() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        assert_eq!(eval(&engine, &s, "CAST('12abc' AS SIGNED)").as_deref(), Some("12"));
        assert_eq!(eval(&engine, &s, "CAST('2024-05-06 07:08:09' AS DATE)").as_deref(), Some("2024-05-06"));
        assert_eq!(eval(&engine, &s, "SUBSTRING('hello', 0)").as_deref(), Some(""));
        assert_eq!(eval(&engine, &s, "SUBSTRING('hello' FROM 2 FOR 3)").as_deref(), Some("ell"));
        assert_eq!(eval(&engine, &s, "EXTRACT(YEAR FROM '2024-05-06')").as_deref(), Some("2024"));
        assert!(matches!(
            render_expression(&s, &engine, "MATCH (a) AGAINST ('x')"),
            Err(DriverError::NotSupported(_))
        ));
    }
}
