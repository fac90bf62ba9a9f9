use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SqlAdapterError;

lazy_static! {
    static ref PARAM_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("valid regex");
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// One piece of an engine-agnostic query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Positional,
    Named(&'a str),
}

/// A template split into literal text and placeholders.
#[derive(Debug, Clone)]
pub(crate) struct Template<'a> {
    pub(crate) segments: Vec<Segment<'a>>,
}

impl<'a> Template<'a> {
    pub(crate) fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Text(_)))
            .count()
    }

    pub(crate) fn is_named(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Named(_)))
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Named(name) => Some(*name),
            _ => None,
        })
    }
}

/// Split `sql` into text and placeholders.
///
/// `?` is a positional placeholder and `:name` a named one. Placeholders inside quoted
/// strings, quoted identifiers, comments and dollar-quoted blocks are left alone, and `::`
/// casts pass through untouched.
///
/// # Errors
/// Returns `MalformedQuery` for unterminated literals or comments, dialect-numbered markers
/// such as `?1`, and templates mixing positional and named placeholders.
pub(crate) fn parse_template(sql: &str) -> Result<Template<'_>, SqlAdapterError> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut state = State::Normal;
    let mut text_start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b'?' => {
                    if bytes.get(idx + 1).is_some_and(u8::is_ascii_digit) {
                        return Err(SqlAdapterError::MalformedQuery(format!(
                            "numbered placeholder at byte {idx}; templates use plain `?`"
                        )));
                    }
                    push_text(&mut segments, &sql[text_start..idx]);
                    segments.push(Segment::Positional);
                    text_start = idx + 1;
                }
                b':' if bytes.get(idx + 1) == Some(&b':') => {
                    idx += 1;
                }
                b':' => {
                    if let Some(found) = PARAM_NAME.find(&sql[idx + 1..]) {
                        push_text(&mut segments, &sql[text_start..idx]);
                        segments.push(Segment::Named(found.as_str()));
                        idx += found.end();
                        text_start = idx + 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match state {
        State::Normal | State::LineComment => {}
        State::SingleQuoted => return Err(unterminated("string literal")),
        State::DoubleQuoted => return Err(unterminated("quoted identifier")),
        State::BlockComment(_) => return Err(unterminated("block comment")),
        State::DollarQuoted(_) => return Err(unterminated("dollar-quoted block")),
    }
    push_text(&mut segments, &sql[text_start..]);

    let template = Template { segments };
    if template.is_named()
        && template
            .segments
            .iter()
            .any(|s| matches!(s, Segment::Positional))
    {
        return Err(SqlAdapterError::MalformedQuery(
            "template mixes positional `?` and named `:name` placeholders".into(),
        ));
    }
    Ok(template)
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
}

fn unterminated(what: &str) -> SqlAdapterError {
    SqlAdapterError::MalformedQuery(format!("unterminated {what}"))
}

fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    // `$1` is a dialect placeholder, not a quote tag.
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_positional_placeholders() {
        let t = parse_template("select * from t where a = ? and b = ?").unwrap();
        assert_eq!(t.placeholder_count(), 2);
        assert_eq!(
            t.segments,
            vec![
                Segment::Text("select * from t where a = "),
                Segment::Positional,
                Segment::Text(" and b = "),
                Segment::Positional,
            ]
        );
    }

    #[test]
    fn splits_named_placeholders_and_keeps_casts() {
        let t = parse_template("select :id::int, :name").unwrap();
        assert!(t.is_named());
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(
            t.segments,
            vec![
                Segment::Text("select "),
                Segment::Named("id"),
                Segment::Text("::int, "),
                Segment::Named("name"),
            ]
        );
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?', \"a?\" -- ?\n/* :x /* ? */ */ from t where a = ?";
        let t = parse_template(sql).unwrap();
        assert_eq!(t.placeholder_count(), 1);
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let t = parse_template("select $foo$ ? :a $foo$, ?").unwrap();
        assert_eq!(t.placeholder_count(), 1);
        let t = parse_template("select $$ ? $$").unwrap();
        assert_eq!(t.placeholder_count(), 0);
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let t = parse_template("select 'it''s ?' , ?").unwrap();
        assert_eq!(t.placeholder_count(), 1);
    }

    #[test]
    fn rejects_unterminated_literal() {
        let err = parse_template("select 'oops").unwrap_err();
        assert!(matches!(err, SqlAdapterError::MalformedQuery(_)));
    }

    #[test]
    fn rejects_mixed_placeholder_kinds() {
        let err = parse_template("select ?, :a").unwrap_err();
        assert!(matches!(err, SqlAdapterError::MalformedQuery(_)));
    }

    #[test]
    fn rejects_numbered_markers() {
        let err = parse_template("select ?1").unwrap_err();
        assert!(matches!(err, SqlAdapterError::MalformedQuery(_)));
    }

    #[test]
    fn multibyte_text_survives() {
        let t = parse_template("select 'é' || ? as ünï").unwrap();
        assert_eq!(t.segments.last(), Some(&Segment::Text(" as ünï")));
    }
}
