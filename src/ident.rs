//! Identifier handling shared by the translator and the catalog.
//!
//! SQLite folds case for ASCII letters only, so every name comparison in the
//! crate goes through [`fold`] / [`eq`] instead of ad hoc lowercasing.

use crate::error::{DriverError, Result};

/// Case-folds an identifier the way the engine compares names.
pub fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

pub fn eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Rejects names the engine cannot compare consistently with MySQL.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DriverError::Parse("empty identifier".into()));
    }
    if name.contains('\0') {
        return Err(DriverError::Parse(format!(
            "identifier contains a NUL byte: '{}'",
            name.replace('\0', "\\0")
        )));
    }
    if !name.is_ascii() {
        return Err(DriverError::not_supported(format!(
            "identifier > non-ASCII name '{name}'"
        )));
    }
    Ok(())
}

/// Quotes a name for the engine dialect.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a name for MySQL-facing output such as SHOW CREATE TABLE.
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Engine string literal. NUL bytes cannot appear in a literal, so such
/// strings become a cast of a blob literal.
pub fn string_literal(value: &str) -> String {
    if value.contains('\0') {
        return format!("CAST({} AS TEXT)", blob_literal(value.as_bytes()));
    }
    format!("'{}'", value.replace('\'', "''"))
}

pub fn blob_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out.push('\'');
    out
}

/// Physical name of an index: indexes share a namespace per schema in the
/// engine but are per table in MySQL.
pub fn physical_index_name(table: &str, index: &str) -> String {
    format!("{table}__{index}")
}

/// Strips MySQL/ANSI quoting from a single token.
pub fn unquote(token: &str) -> String {
    let t = token.trim();
    if let Some(stripped) = t.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        stripped.replace("``", "`")
    } else if let Some(stripped) = t.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        stripped.replace("\"\"", "\"")
    } else {
        t.to_string()
    }
}

/// Strips string-literal quoting from a single token.
pub fn unquote_string(token: &str) -> String {
    let t = token.trim();
    if let Some(stripped) = t.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        stripped.replace("''", "'").replace("\\'", "'")
    } else if let Some(stripped) = t.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        stripped.replace("\"\"", "\"")
    } else {
        t.to_string()
    }
}

/// Splits a `db.table` token into its parts.
pub fn split_qualified(token: &str) -> Result<(Option<String>, String)> {
    let parts = split_outside_quotes(token, '.');
    match parts.as_slice() {
        [table] => Ok((None, unquote(table))),
        [db, table] => Ok((Some(unquote(db)), unquote(table))),
        _ => Err(DriverError::not_supported(format!(
            "identifier > {}-part name '{token}'",
            parts.len()
        ))),
    }
}

fn split_outside_quotes(token: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut last = 0;
    for (i, ch) in token.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '`' || ch == '"' => quote = Some(ch),
            None if ch == sep => {
                out.push(&token[last..i]);
                last = i + ch.len_utf8();
            }
            None => {}
        }
    }
    out.push(&token[last..]);
    out
}

/// MySQL LIKE matching used by SHOW ... LIKE filters and the binary LIKE
/// function. `escape` defaults to backslash.
pub fn like_matches(text: &str, pattern: &str, escape: char, case_sensitive: bool) -> bool {
    let (text, pattern): (Vec<char>, Vec<char>) = if case_sensitive {
        (text.chars().collect(), pattern.chars().collect())
    } else {
        (
            text.to_lowercase().chars().collect(),
            pattern.to_lowercase().chars().collect(),
        )
    };

    fn rec(t: &[char], p: &[char], escape: char) -> bool {
        let Some(&pc) = p.first() else {
            return t.is_empty();
        };
        if pc == escape && p.len() > 1 {
            return t.first() == Some(&p[1]) && rec(&t[1..], &p[2..], escape);
        }
        match pc {
            '%' => {
                let rest = &p[1..];
                (0..=t.len()).any(|i| rec(&t[i..], rest, escape))
            }
            '_' => !t.is_empty() && rec(&t[1..], &p[1..], escape),
            c => t.first() == Some(&c) && rec(&t[1..], &p[1..], escape),
        }
    }

    rec(&text, &pattern, escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folding_is_ascii_only() {
        assert!(eq("Users", "USERS"));
        assert!(!eq("straße", "STRASSE"));
        assert_eq!(fold("WP_Posts"), "wp_posts");
    }

    #[test]
    fn rejects_non_ascii_and_nul() {
        assert!(validate("posts").is_ok());
        assert!(validate("pöst").is_err());
        assert!(validate("a\0b").is_err());
    }

    #[test]
    fn nul_strings_become_blob_casts() {
        assert_eq!(string_literal("it's"), "'it''s'");
        assert_eq!(string_literal("a\0b"), "CAST(X'610062' AS TEXT)");
    }

    #[test]
    fn qualified_names() {
        assert_eq!(
            split_qualified("`app`.`my.table`").unwrap(),
            (Some("app".into()), "my.table".into())
        );
        assert_eq!(split_qualified("t").unwrap(), (None, "t".into()));
        assert!(split_qualified("a.b.c").is_err());
    }

    #[test]
    fn like_patterns() {
        assert!(like_matches("wp_posts", "wp\\_%", '\\', false));
        assert!(!like_matches("wpxposts", "wp\\_%", '\\', false));
        assert!(like_matches("ABC", "a_c", '\\', false));
        assert!(!like_matches("ABC", "a_c", '\\', true));
    }
}
