//! Statement text preprocessing.
//!
//! Some MySQL syntax never reaches the parser: query-cache and priority
//! modifiers are blanked out, and `0x..`, `0b..` and `b'..'` literals are
//! rewritten as `X'..'`. Under `NO_BACKSLASH_ESCAPES` backslashes in string
//! literals are doubled so the parser reads them literally. Rewrites are
//! recorded in an edit map so that spans of the edited text can be traced
//! back to the text the client sent, which is what MySQL uses to name
//! unaliased result columns.

use crate::error::Result;
use crate::ident;
use crate::lexer::{self, Tok, Token};

/// Modifiers removed before parsing.
const BLANKED: &[&str] = &["SQL_CALC_FOUND_ROWS", "SQL_NO_CACHE", "SQL_CACHE", "HIGH_PRIORITY"];

/// Words that end a select list at its own nesting depth.
const PROJECTION_END: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "EXCEPT", "INTERSECT", "INTO",
    "FOR", "WINDOW", "LOCK",
];

/// Select modifiers that may precede the first item.
const SELECT_MODIFIERS: &[&str] = &[
    "ALL",
    "DISTINCT",
    "DISTINCTROW",
    "STRAIGHT_JOIN",
    "SQL_SMALL_RESULT",
    "SQL_BIG_RESULT",
    "SQL_BUFFER_RESULT",
];

#[derive(Debug, Clone, PartialEq)]
struct Edit {
    /// Span in the edited text.
    start: usize,
    len: usize,
    /// Span in the original text.
    original_start: usize,
    original_len: usize,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub original: String,
    /// Text handed to the parser.
    pub text: String,
    pub calc_found_rows: bool,
    edits: Vec<Edit>,
}

impl Source {
    pub fn prepare(sql: &str, backslash_escapes: bool) -> Result<Source> {
        let tokens = lexer::tokenize(sql, backslash_escapes)?;
        let mut text = String::with_capacity(sql.len());
        let mut edits = Vec::new();
        let mut calc_found_rows = false;
        let mut copied = 0;

        for t in &tokens {
            let raw = &sql[t.start..t.end];
            let replacement = match &t.tok {
                Tok::Word(w) if BLANKED.iter().any(|b| w.eq_ignore_ascii_case(b)) => {
                    if w.eq_ignore_ascii_case("SQL_CALC_FOUND_ROWS") {
                        calc_found_rows = true;
                    }
                    " ".repeat(raw.len())
                }
                Tok::Hex(bytes) if !raw.starts_with(['x', 'X']) => ident::blob_literal(bytes),
                Tok::Bits(bytes) => ident::blob_literal(bytes),
                // The parser always reads backslash escapes.
                Tok::Str(_) if !backslash_escapes && raw.contains('\\') => raw.replace('\\', "\\\\"),
                _ => continue,
            };
            text.push_str(&sql[copied..t.start]);
            if replacement.len() != raw.len() {
                edits.push(Edit {
                    start: text.len(),
                    len: replacement.len(),
                    original_start: t.start,
                    original_len: raw.len(),
                });
            }
            text.push_str(&replacement);
            copied = t.end;
        }
        text.push_str(&sql[copied..]);

        Ok(Source {
            original: sql.to_string(),
            text,
            calc_found_rows,
            edits,
        })
    }

    /// Maps an offset in the edited text to the original text.
    fn original_offset(&self, offset: usize, end: bool) -> usize {
        let mut delta: isize = 0;
        for e in &self.edits {
            if offset >= e.start + e.len {
                delta += e.original_len as isize - e.len as isize;
            } else if offset > e.start || (offset == e.start && end && e.len > 0) {
                // Inside a rewritten literal: snap to its edge.
                return if end {
                    e.original_start + e.original_len
                } else {
                    e.original_start
                };
            } else {
                break;
            }
        }
        (offset as isize + delta).max(0) as usize
    }

    /// Original text for a span of the edited text.
    pub fn original_span(&self, start: usize, end: usize) -> &str {
        let s = self.original_offset(start, false);
        let e = self.original_offset(end, true).max(s);
        self.original.get(s..e).unwrap_or("").trim()
    }

    /// Verbatim text of each item in the outermost select list, as the
    /// client wrote it. Empty when the statement has no select list.
    pub fn select_items(&self) -> Vec<String> {
        let Ok(tokens) = lexer::tokenize(&self.text, true) else {
            return Vec::new();
        };
        let Some(spans) = projection_spans(&tokens) else {
            return Vec::new();
        };
        spans
            .into_iter()
            .map(|(s, e)| self.original_span(s, e).to_string())
            .collect()
    }
}

/// Byte spans of the items of the first select list at the shallowest
/// nesting depth that has one.
fn projection_spans(tokens: &[Token]) -> Option<Vec<(usize, usize)>> {
    let mut depth = 0i32;
    let mut best: Option<(i32, usize)> = None;
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct('(') {
            depth += 1;
        } else if t.is_punct(')') {
            depth -= 1;
        } else if t.is_word("SELECT") && best.map_or(true, |(d, _)| depth < d) {
            best = Some((depth, i));
        }
    }
    let (_, select_at) = best?;

    let mut i = select_at + 1;
    while tokens
        .get(i)
        .is_some_and(|t| SELECT_MODIFIERS.iter().any(|m| t.is_word(m)))
    {
        i += 1;
    }

    let mut spans = Vec::new();
    let mut depth = 0i32;
    let mut item_start: Option<usize> = None;
    let mut item_end = 0;
    while let Some(t) = tokens.get(i) {
        if depth == 0 {
            let ends = t.is_punct(';')
                || t.is_punct(')')
                || PROJECTION_END.iter().any(|w| t.is_word(w));
            if ends {
                break;
            }
            if t.is_punct(',') {
                if let Some(s) = item_start.take() {
                    spans.push((s, item_end));
                }
                i += 1;
                continue;
            }
        }
        if t.is_punct('(') {
            depth += 1;
        } else if t.is_punct(')') {
            depth -= 1;
        }
        item_start.get_or_insert(t.start);
        item_end = t.end;
        i += 1;
    }
    if let Some(s) = item_start {
        spans.push((s, item_end));
    }
    Some(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_modifiers_and_records_calc_flag() {
        let s = Source::prepare("SELECT SQL_CALC_FOUND_ROWS SQL_NO_CACHE * FROM t", true).unwrap();
        assert!(s.calc_found_rows);
        assert_eq!(s.text.split_whitespace().collect::<Vec<_>>(), vec!["SELECT", "*", "FROM", "t"]);
        assert_eq!(s.text.len(), s.original.len());
    }

    #[test]
    fn rewrites_literals_and_maps_spans_back() {
        let s = Source::prepare("SELECT 0xFF, b'1', x'41' + 1, a FROM t", true).unwrap();
        assert_eq!(s.text, "SELECT X'FF', X'01', x'41' + 1, a FROM t");
        assert_eq!(s.select_items(), vec!["0xFF", "b'1'", "x'41' + 1", "a"]);
    }

    #[test]
    fn select_items_follow_the_outermost_select() {
        let s = Source::prepare(
            "WITH c AS (SELECT 1 AS x) SELECT COUNT(*), (SELECT 2), 'a,b' FROM c ORDER BY 1",
            true,
        )
        .unwrap();
        assert_eq!(s.select_items(), vec!["COUNT(*)", "(SELECT 2)", "'a,b'"]);

        let s = Source::prepare("(SELECT a  +  1 FROM t) UNION (SELECT b FROM u)", true).unwrap();
        assert_eq!(s.select_items(), vec!["a  +  1"]);

        let s = Source::prepare("SELECT DISTINCT x FROM t", true).unwrap();
        assert_eq!(s.select_items(), vec!["x"]);
        assert!(Source::prepare("UPDATE t SET a = 1", true).unwrap().select_items().is_empty());
    }
}
