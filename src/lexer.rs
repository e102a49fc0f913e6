//! MySQL token scanner used by the DDL parser, the statement pre-handlers
//! and source preprocessing. Tokens keep their byte span so callers can
//! recover verbatim source text.

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Unquoted identifier or keyword, as written.
    Word(String),
    /// Backtick-quoted identifier, unescaped.
    Quoted(String),
    /// Single- or double-quoted string, unescaped.
    Str(String),
    Number(String),
    /// `X'..'` or `0x..`, decoded.
    Hex(Vec<u8>),
    /// `b'..'` or `0b..`, decoded to whole bytes.
    Bits(Vec<u8>),
    Param,
    /// `@name` or `@@name`, including the sigils.
    Var(String),
    Punct(char),
    Op(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_word(&self, kw: &str) -> bool {
        matches!(&self.tok, Tok::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.tok == Tok::Punct(c)
    }

    /// Identifier text for a bare or backtick-quoted name.
    pub fn ident(&self) -> Option<&str> {
        match &self.tok {
            Tok::Word(w) | Tok::Quoted(w) => Some(w),
            _ => None,
        }
    }
}

/// Decodes hex digits, left-padding an odd count with a zero nibble.
pub fn hex_bytes(digits: &str) -> Option<Vec<u8>> {
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
        .collect()
}

/// Decodes a bit string, left-padding to whole bytes.
fn bit_bytes(bits: &str) -> Option<Vec<u8>> {
    if !bits.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    if bits.is_empty() {
        return Some(Vec::new());
    }
    let pad = (8 - bits.len() % 8) % 8;
    let padded = format!("{}{bits}", "0".repeat(pad));
    (0..padded.len())
        .step_by(8)
        .map(|i| u8::from_str_radix(&padded[i..i + 8], 2).ok())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn tokenize(sql: &str, backslash_escapes: bool) -> Result<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut in_version_comment = false;
    let unterminated = |what: &str| DriverError::Parse(format!("unterminated {what}"));

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == '#'
            || (c == '-'
                && bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).map_or(true, |b| b.is_ascii_whitespace()))
        {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            if bytes.get(i + 2) == Some(&b'!') {
                // Versioned comment: its content is code.
                i += 3;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                in_version_comment = true;
                continue;
            }
            match sql[i + 2..].find("*/") {
                Some(end) => i += 2 + end + 2,
                None => return Err(unterminated("comment")),
            }
            continue;
        }
        if in_version_comment && c == '*' && bytes.get(i + 1) == Some(&b'/') {
            in_version_comment = false;
            i += 2;
            continue;
        }

        // X'..', B'..', 0x.., 0b..
        if (c == 'x' || c == 'X' || c == 'b' || c == 'B') && bytes.get(i + 1) == Some(&b'\'') {
            let body_start = i + 2;
            let Some(len) = sql[body_start..].find('\'') else {
                return Err(unterminated("literal"));
            };
            let body = &sql[body_start..body_start + len];
            let tok = if c == 'x' || c == 'X' {
                if body.len() % 2 == 1 {
                    return Err(DriverError::Parse(format!("invalid hex literal X'{body}'")));
                }
                Tok::Hex(hex_bytes(body).ok_or_else(|| {
                    DriverError::Parse(format!("invalid hex literal X'{body}'"))
                })?)
            } else {
                Tok::Bits(bit_bytes(body).ok_or_else(|| {
                    DriverError::Parse(format!("invalid bit literal b'{body}'"))
                })?)
            };
            i = body_start + len + 1;
            out.push(Token { tok, start, end: i });
            continue;
        }
        if c == '0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'b')) {
            let hex = bytes[i + 1] == b'x';
            let mut j = i + 2;
            while j < bytes.len()
                && (if hex { bytes[j].is_ascii_hexdigit() } else { bytes[j] == b'0' || bytes[j] == b'1' })
            {
                j += 1;
            }
            let word_continues = j < bytes.len() && is_word_char(bytes[j] as char);
            if j > i + 2 && !word_continues {
                let body = &sql[i + 2..j];
                let decoded = if hex { hex_bytes(body) } else { bit_bytes(body) };
                if let Some(b) = decoded {
                    out.push(Token {
                        tok: if hex { Tok::Hex(b) } else { Tok::Bits(b) },
                        start,
                        end: j,
                    });
                    i = j;
                    continue;
                }
            }
        }

        if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) {
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'.' {
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
            }
            if j < bytes.len() && (bytes[j] == b'e' || bytes[j] == b'E') {
                let mut k = j + 1;
                if k < bytes.len() && (bytes[k] == b'+' || bytes[k] == b'-') {
                    k += 1;
                }
                if k < bytes.len() && bytes[k].is_ascii_digit() {
                    while k < bytes.len() && bytes[k].is_ascii_digit() {
                        k += 1;
                    }
                    j = k;
                }
            }
            // Identifiers may start with digits, e.g. `1col`.
            if j < bytes.len() && is_word_char(bytes[j] as char) && !sql[i..j].contains('.') {
                while j < bytes.len() && is_word_char(sql[j..].chars().next().unwrap_or(' ')) {
                    j += sql[j..].chars().next().map_or(1, char::len_utf8);
                }
                out.push(Token {
                    tok: Tok::Word(sql[i..j].to_string()),
                    start,
                    end: j,
                });
            } else {
                out.push(Token {
                    tok: Tok::Number(sql[i..j].to_string()),
                    start,
                    end: j,
                });
            }
            i = j;
            continue;
        }

        if c == '\'' || c == '"' || c == '`' {
            let quote = c;
            let mut j = i + 1;
            let mut value = String::new();
            loop {
                let Some(ch) = sql[j..].chars().next() else {
                    return Err(unterminated("quoted text"));
                };
                if ch == quote {
                    if sql[j + 1..].starts_with(quote) {
                        value.push(quote);
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                if ch == '\\' && quote != '`' && backslash_escapes {
                    let Some(next) = sql[j + 1..].chars().next() else {
                        return Err(unterminated("quoted text"));
                    };
                    match next {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'b' => value.push('\u{8}'),
                        'Z' => value.push('\u{1a}'),
                        // LIKE wildcards keep their backslash.
                        '%' | '_' => {
                            value.push('\\');
                            value.push(next);
                        }
                        other => value.push(other),
                    }
                    j += 1 + next.len_utf8();
                    continue;
                }
                value.push(ch);
                j += ch.len_utf8();
            }
            let tok = if quote == '`' { Tok::Quoted(value) } else { Tok::Str(value) };
            out.push(Token { tok, start, end: j });
            i = j;
            continue;
        }

        if c == '@' {
            let mut j = i + 1;
            if bytes.get(j) == Some(&b'@') {
                j += 1;
            }
            if let Some(q) = bytes.get(j).filter(|b| matches!(b, b'\'' | b'"' | b'`')) {
                let q = *q as char;
                let end = sql[j + 1..]
                    .find(q)
                    .ok_or_else(|| unterminated("variable"))?;
                let name = &sql[j + 1..j + 1 + end];
                let sigils = &sql[i..j];
                out.push(Token {
                    tok: Tok::Var(format!("{sigils}{name}")),
                    start,
                    end: j + end + 2,
                });
                i = j + end + 2;
                continue;
            }
            while j < bytes.len() {
                let ch = sql[j..].chars().next().unwrap_or(' ');
                if is_word_char(ch) || ch == '.' {
                    j += ch.len_utf8();
                } else {
                    break;
                }
            }
            out.push(Token {
                tok: Tok::Var(sql[i..j].to_string()),
                start,
                end: j,
            });
            i = j;
            continue;
        }

        let ch = sql[i..].chars().next().unwrap_or(' ');
        if is_word_char(ch) {
            let mut j = i;
            while j < bytes.len() {
                let ch = sql[j..].chars().next().unwrap_or(' ');
                if is_word_char(ch) {
                    j += ch.len_utf8();
                } else {
                    break;
                }
            }
            out.push(Token {
                tok: Tok::Word(sql[i..j].to_string()),
                start,
                end: j,
            });
            i = j;
            continue;
        }

        match c {
            '(' | ')' | ',' | ';' | '.' => {
                out.push(Token {
                    tok: Tok::Punct(c),
                    start,
                    end: i + 1,
                });
                i += 1;
            }
            '?' => {
                out.push(Token {
                    tok: Tok::Param,
                    start,
                    end: i + 1,
                });
                i += 1;
            }
            _ => {
                const TWO: &[&str] = &["<=>", "<=", ">=", "<>", "!=", "||", "&&", "<<", ">>", ":="];
                let op = TWO
                    .iter()
                    .find(|op| sql[i..].starts_with(**op))
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| ch.to_string());
                i += op.len();
                out.push(Token {
                    tok: Tok::Op(op),
                    start,
                    end: i,
                });
            }
        }
    }
    Ok(out)
}

/// Splits a script into statements at top-level semicolons.
pub fn split_statements(script: &str) -> Result<Vec<String>> {
    let tokens = tokenize(script, true)?;
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    for t in &tokens {
        if t.is_punct(';') {
            if let Some(s) = start.take() {
                out.push(script[s..end].to_string());
            }
            continue;
        }
        start.get_or_insert(t.start);
        end = t.end;
    }
    if let Some(s) = start {
        out.push(script[s..end].to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(sql: &str) -> Vec<Tok> {
        tokenize(sql, true).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn scans_identifiers_strings_and_numbers() {
        assert_eq!(
            toks("SELECT `a``b`, 'it''s', \"x\\ny\", 1.5e3 FROM t"),
            vec![
                Tok::Word("SELECT".into()),
                Tok::Quoted("a`b".into()),
                Tok::Punct(','),
                Tok::Str("it's".into()),
                Tok::Punct(','),
                Tok::Str("x\ny".into()),
                Tok::Punct(','),
                Tok::Number("1.5e3".into()),
                Tok::Word("FROM".into()),
                Tok::Word("t".into()),
            ]
        );
    }

    #[test]
    fn decodes_hex_and_bit_literals() {
        assert_eq!(toks("0xABC"), vec![Tok::Hex(vec![0x0a, 0xbc])]);
        assert_eq!(toks("X'4142'"), vec![Tok::Hex(vec![0x41, 0x42])]);
        assert_eq!(toks("b'101'"), vec![Tok::Bits(vec![5])]);
        assert_eq!(toks("0b100000001"), vec![Tok::Bits(vec![1, 1])]);
        assert_eq!(toks("0xzz"), vec![Tok::Word("0xzz".into())]);
    }

    #[test]
    fn skips_comments_but_keeps_versioned_code() {
        assert_eq!(
            toks("a -- note\n/* x */ b # y\n/*!40101 c */"),
            vec![Tok::Word("a".into()), Tok::Word("b".into()), Tok::Word("c".into())]
        );
    }

    #[test]
    fn respects_no_backslash_escapes() {
        let t = tokenize(r"'a\n'", false).unwrap();
        assert_eq!(t[0].tok, Tok::Str(r"a\n".into()));
    }

    #[test]
    fn variables_and_operators() {
        assert_eq!(
            toks("@@session.sql_mode <=> @x"),
            vec![
                Tok::Var("@@session.sql_mode".into()),
                Tok::Op("<=>".into()),
                Tok::Var("@x".into()),
            ]
        );
    }

    #[test]
    fn splits_scripts() {
        let parts = split_statements("CREATE TABLE a (x int); ; INSERT INTO a VALUES (';');").unwrap();
        assert_eq!(parts, vec!["CREATE TABLE a (x int)", "INSERT INTO a VALUES (';')"]);
    }
}
