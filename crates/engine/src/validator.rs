use crate::generator::SqlCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

static LEADING_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^SELECT\b").expect("static regex"));

static FORBIDDEN: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|k| (*k, Regex::new(&format!(r"(?i)\b{k}\b")).expect("static regex")))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("statement is empty")]
    Empty,
    #[error("only SELECT statements are allowed")]
    NotSelect,
    #[error("statement contains forbidden keyword {0}")]
    ForbiddenKeyword(&'static str),
    #[error("statement has an unterminated quote or comment")]
    Unterminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Code,
    Quoted(char),
    /// `E'...'`, where a backslash escapes the next character.
    Escaped,
    /// `$tag$...$tag$`; the delimiter is `chars[start..start + len]`.
    Dollar { start: usize, len: usize },
    LineComment,
    BlockComment(u32),
}

fn blank(c: char) -> char {
    if c == '\n' {
        '\n'
    } else {
        ' '
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Length of a `$tag$` delimiter opening at `chars[i]`. `$1` style
/// parameters are not delimiters.
fn dollar_delimiter(chars: &[char], i: usize) -> Option<usize> {
    if i > 0 && is_ident_char(chars[i - 1]) {
        return None;
    }
    if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    (chars.get(j) == Some(&'$')).then_some(j + 1 - i)
}

/// Copy of `sql` with comments and the contents of quoted spans replaced by
/// spaces, so only code is left for the keyword scan. Quote characters and
/// newlines are kept. Handles doubled quotes, `E'..'` backslash escapes,
/// dollar quoting and nested block comments. A span still open at the end of
/// the statement is an [`Rejection::Unterminated`] error.
pub fn keyword_scan_view(sql: &str) -> Result<String, Rejection> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut span = Span::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match span {
            Span::Code => match c {
                '-' if next == Some('-') => {
                    span = Span::LineComment;
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    span = Span::BlockComment(1);
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                '\'' => {
                    let escape_prefix = i > 0
                        && matches!(chars[i - 1], 'e' | 'E')
                        && !(i > 1 && is_ident_char(chars[i - 2]));
                    span = if escape_prefix { Span::Escaped } else { Span::Quoted(c) };
                    out.push(c);
                }
                '"' => {
                    span = Span::Quoted(c);
                    out.push(c);
                }
                '$' => match dollar_delimiter(&chars, i) {
                    Some(len) => {
                        out.extend(&chars[i..i + len]);
                        span = Span::Dollar { start: i, len };
                        i += len;
                        continue;
                    }
                    None => out.push(c),
                },
                _ => out.push(c),
            },
            Span::Quoted(q) if c == q => {
                if next == Some(q) {
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                span = Span::Code;
                out.push(c);
            }
            Span::Escaped if c == '\\' => {
                out.push(' ');
                if let Some(n) = next {
                    out.push(blank(n));
                }
                i += 2;
                continue;
            }
            Span::Escaped if c == '\'' => {
                if next == Some('\'') {
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                span = Span::Code;
                out.push(c);
            }
            Span::Dollar { start, len } if chars[i..].starts_with(&chars[start..start + len]) => {
                out.extend(&chars[i..i + len]);
                span = Span::Code;
                i += len;
                continue;
            }
            Span::LineComment if c == '\n' => {
                span = Span::Code;
                out.push(c);
            }
            Span::BlockComment(depth) if c == '*' && next == Some('/') => {
                span = if depth == 1 {
                    Span::Code
                } else {
                    Span::BlockComment(depth - 1)
                };
                out.push_str("  ");
                i += 2;
                continue;
            }
            Span::BlockComment(depth) if c == '/' && next == Some('*') => {
                span = Span::BlockComment(depth + 1);
                out.push_str("  ");
                i += 2;
                continue;
            }
            _ => out.push(blank(c)),
        }
        i += 1;
    }

    match span {
        Span::Code | Span::LineComment => Ok(out),
        _ => Err(Rejection::Unterminated),
    }
}

/// Deterministic read-only gate run before every execution.
pub fn validate(sql: &str) -> Result<(), Rejection> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(Rejection::Empty);
    }
    if !LEADING_SELECT.is_match(trimmed) {
        return Err(Rejection::NotSelect);
    }

    // report the keyword that appears first
    let view = keyword_scan_view(trimmed)?;
    let first = FORBIDDEN
        .iter()
        .filter_map(|(keyword, re)| re.find(&view).map(|m| (m.start(), *keyword)))
        .min();
    match first {
        Some((_, keyword)) => Err(Rejection::ForbiddenKeyword(keyword)),
        None => Ok(()),
    }
}

/// A statement that passed [`validate`]. Only this type reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn check(candidate: &SqlCandidate) -> Result<Self, Rejection> {
        validate(candidate.as_str())?;
        Ok(Self(candidate.as_str().trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for ValidatedSql {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
