//! Targeted field operations over TOML-like provider config documents.
//!
//! The editors keep dedicated form inputs in sync with fields inside a
//! free-text config document the user can also edit by hand. This crate
//! reads and rewrites those fields with line-level surgery instead of a
//! parse/serialize round trip, so comments, ordering and unrelated content
//! survive every write. Reads are best-effort: a malformed document yields
//! "absent", never an error.

use serde::{Deserialize, Serialize};

/// Where a tracked field is expected to live inside the document.
///
/// A field scoped under a named section never matches a same-named key at
/// the top level, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldScope {
    TopLevel,
    Section(String),
}

/// Location contract for one tracked field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub scope: FieldScope,
}

impl FieldSpec {
    pub fn top_level(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            scope: FieldScope::TopLevel,
        }
    }

    pub fn in_section(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            scope: FieldScope::Section(section.into()),
        }
    }
}

/// Inline diagnostic for the embedded editor widget (1-based line/column).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marker {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Read the logical value of `spec` out of `document`.
///
/// Quotes are stripped, so the returned string is exactly what the paired
/// form input would show. Absent or malformed fields return `None`.
pub fn extract_field(document: &str, spec: &FieldSpec) -> Option<String> {
    let lines: Vec<&str> = document.split('\n').collect();
    find_field(&lines, spec).and_then(|hit| hit.token.map(|t| t.logical))
}

/// Rewrite `spec` to `value`, preserving all surrounding content.
///
/// A present field has only its value token replaced in place (the line's
/// indentation, key spelling and trailing comment survive). An absent field
/// gets a minimal correctly-scoped declaration, creating the section when
/// needed. Written values always use canonical double-quote style.
pub fn set_field(document: &str, spec: &FieldSpec, value: &str) -> String {
    let mut lines: Vec<String> = document.split('\n').map(str::to_string).collect();
    match find_field(&lines, spec) {
        Some(hit) => {
            let line = &lines[hit.line_idx];
            let new_line = match &hit.token {
                Some(token) => format!(
                    "{}{}{}",
                    &line[..token.start],
                    quote_value(value),
                    &line[token.start + token.len..]
                ),
                // Malformed value (e.g. unterminated quote): rewrite from the
                // `=` to the end of the line.
                None => format!("{} {}", line[..hit.eq_end].trim_end(), quote_value(value)),
            };
            lines[hit.line_idx] = new_line;
        }
        None => {
            let decl = format!("{} = {}", spec.key, quote_value(value));
            match &spec.scope {
                FieldScope::TopLevel => {
                    let at = lines
                        .iter()
                        .position(|l| parse_header(l).is_some())
                        .unwrap_or(lines.len());
                    insert_line(&mut lines, at, decl);
                }
                FieldScope::Section(name) => match find_section(&lines, name) {
                    Some(header_idx) => {
                        let end = lines[header_idx + 1..]
                            .iter()
                            .position(|l| parse_header(l).is_some())
                            .map(|p| header_idx + 1 + p)
                            .unwrap_or(lines.len());
                        insert_line(&mut lines, end, decl);
                    }
                    None => append_section(&mut lines, name, decl),
                },
            }
        }
    }
    lines.join("\n")
}

/// Delete the field's declaration. No-op when absent.
pub fn remove_field(document: &str, spec: &FieldSpec) -> String {
    let mut lines: Vec<String> = document.split('\n').map(str::to_string).collect();
    match find_field(&lines, spec) {
        Some(hit) => {
            lines.remove(hit.line_idx);
            lines.join("\n")
        }
        None => document.to_string(),
    }
}

/// Full-document well-formedness check, decoupled from field extraction.
///
/// Returns one marker per parse failure (the TOML parser stops at the
/// first), or an empty vec for a well-formed document.
pub fn validate_document(document: &str) -> Vec<Marker> {
    match document.parse::<toml::Value>() {
        Ok(_) => Vec::new(),
        Err(err) => {
            let (line, column) = err
                .span()
                .map(|span| offset_to_line_col(document, span.start))
                .unwrap_or((1, 1));
            vec![Marker {
                line,
                column,
                message: err.message().to_string(),
            }]
        }
    }
}

#[derive(Debug)]
struct ValueToken {
    /// Byte offset of the token within its line.
    start: usize,
    /// Byte length of the token, quotes included.
    len: usize,
    /// Quote-stripped value.
    logical: String,
}

#[derive(Debug)]
struct FieldHit {
    line_idx: usize,
    /// Byte offset just past the `=`.
    eq_end: usize,
    /// `None` when the key matched but its value is malformed.
    token: Option<ValueToken>,
}

#[derive(Debug, PartialEq)]
enum Region {
    TopLevel,
    Section(String),
    /// An unterminated or empty header; keys below it match nothing.
    Invalid,
}

fn region_matches(region: &Region, scope: &FieldScope) -> bool {
    match (region, scope) {
        (Region::TopLevel, FieldScope::TopLevel) => true,
        (Region::Section(name), FieldScope::Section(wanted)) => name == wanted,
        _ => false,
    }
}

fn find_field<L: AsRef<str>>(lines: &[L], spec: &FieldSpec) -> Option<FieldHit> {
    let mut region = Region::TopLevel;
    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.as_ref();
        if let Some(header) = parse_header(line) {
            region = match header {
                Some(name) => Region::Section(name),
                None => Region::Invalid,
            };
            continue;
        }
        if !region_matches(&region, &spec.scope) {
            continue;
        }
        let Some((key, eq_end)) = parse_key_value(line) else {
            continue;
        };
        if key != spec.key {
            continue;
        }
        return Some(FieldHit {
            line_idx: idx,
            eq_end,
            token: parse_value_token(line, eq_end),
        });
    }
    None
}

fn find_section<L: AsRef<str>>(lines: &[L], name: &str) -> Option<usize> {
    lines.iter().position(|l| match parse_header(l.as_ref()) {
        Some(Some(n)) => n == name,
        _ => false,
    })
}

/// `Some(Some(name))` for a section header, `Some(None)` for a malformed
/// one, `None` for a non-header line.
fn parse_header(line: &str) -> Option<Option<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    let Some(close) = trimmed.find(']') else {
        return Some(None);
    };
    let mut inner = trimmed[1..close].trim();
    // [[array.of.tables]] headers scope their keys like a plain section.
    if let Some(rest) = inner.strip_prefix('[') {
        inner = rest.trim();
    }
    if inner.is_empty() {
        return Some(None);
    }
    Some(Some(inner.to_string()))
}

fn parse_key_value(line: &str) -> Option<(String, usize)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let eq = line.find('=')?;
    let key = line[..eq].trim().trim_matches('"').trim_matches('\'');
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return None;
    }
    Some((key.to_string(), eq + 1))
}

fn parse_value_token(line: &str, from: usize) -> Option<ValueToken> {
    let rest = &line[from..];
    let start = from + (rest.len() - rest.trim_start().len());
    let rest = &line[start..];
    match rest.chars().next() {
        None => None,
        Some('"') => {
            let mut logical = String::new();
            let mut escaped = false;
            for (i, c) in rest.char_indices().skip(1) {
                if escaped {
                    match c {
                        'n' => logical.push('\n'),
                        't' => logical.push('\t'),
                        'r' => logical.push('\r'),
                        '"' => logical.push('"'),
                        '\\' => logical.push('\\'),
                        other => {
                            logical.push('\\');
                            logical.push(other);
                        }
                    }
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    return Some(ValueToken {
                        start,
                        len: i + 1,
                        logical,
                    });
                } else {
                    logical.push(c);
                }
            }
            None
        }
        Some('\'') => rest[1..].find('\'').map(|i| ValueToken {
            start,
            len: i + 2,
            logical: rest[1..1 + i].to_string(),
        }),
        Some(_) => {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '#')
                .unwrap_or(rest.len());
            if end == 0 {
                None
            } else {
                Some(ValueToken {
                    start,
                    len: end,
                    logical: rest[..end].to_string(),
                })
            }
        }
    }
}

fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Insert after the last non-blank line of the region ending at `at`, so
/// declarations land next to their neighbors instead of after separator
/// blanks (and the document keeps its final newline).
fn insert_line(lines: &mut Vec<String>, at: usize, line: String) {
    let mut at = at.min(lines.len());
    while at > 0 && lines[at - 1].trim().is_empty() {
        at -= 1;
    }
    lines.insert(at, line);
}

fn append_section(lines: &mut Vec<String>, name: &str, decl: String) {
    let mut end = lines.len();
    while end > 0 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    lines.truncate(end);
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("[{}]", name));
    lines.push(decl);
    lines.push(String::new());
}

fn offset_to_line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map(|nl| offset - nl)
        .unwrap_or(offset + 1);
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> FieldSpec {
        FieldSpec::top_level("base_url")
    }

    fn chat_model() -> FieldSpec {
        FieldSpec::in_section("chat", "model")
    }

    #[test]
    fn extracts_double_and_single_quoted_values() {
        assert_eq!(
            extract_field("base_url = \"X\"", &base_url()).as_deref(),
            Some("X")
        );
        assert_eq!(
            extract_field("base_url = 'X'", &base_url()).as_deref(),
            Some("X")
        );
    }

    #[test]
    fn extracts_bare_tokens() {
        let spec = FieldSpec::top_level("stream");
        assert_eq!(
            extract_field("stream = true # keep on", &spec).as_deref(),
            Some("true")
        );
    }

    #[test]
    fn absent_field_is_none_not_an_error() {
        assert_eq!(extract_field("", &base_url()), None);
        assert_eq!(extract_field("other = \"x\"", &base_url()), None);
    }

    #[test]
    fn sectioned_key_does_not_match_top_level() {
        let doc = "model = \"top\"\n[chat]\ntemperature = \"0\"\n";
        assert_eq!(extract_field(doc, &chat_model()), None);

        let doc = "[chat]\nmodel = \"scoped\"\n";
        assert_eq!(extract_field(doc, &FieldSpec::top_level("model")), None);
        assert_eq!(extract_field(doc, &chat_model()).as_deref(), Some("scoped"));
    }

    #[test]
    fn unterminated_quote_yields_absent() {
        assert_eq!(extract_field("base_url = \"oops", &base_url()), None);
    }

    #[test]
    fn unterminated_section_header_hides_following_keys() {
        let doc = "[chat\nmodel = \"gpt-x\"\n";
        assert_eq!(extract_field(doc, &chat_model()), None);
    }

    #[test]
    fn set_field_replaces_in_place_and_preserves_comments() {
        let doc = "# provider config\nbase_url = 'old' # keep me\nextra = 1\n";
        let out = set_field(doc, &base_url(), "new");
        assert_eq!(
            out,
            "# provider config\nbase_url = \"new\" # keep me\nextra = 1\n"
        );
    }

    #[test]
    fn set_field_is_idempotent() {
        let doc = "a = 1\n[chat]\ntemp = \"0\"\n";
        let once = set_field(doc, &chat_model(), "gpt-x");
        let twice = set_field(&once, &chat_model(), "gpt-x");
        assert_eq!(once, twice);
    }

    #[test]
    fn set_field_round_trips_through_extract() {
        let doc = "other = \"x\"\n";
        let out = set_field(doc, &base_url(), "https://api.example.com/v1");
        assert_eq!(
            extract_field(&out, &base_url()).as_deref(),
            Some("https://api.example.com/v1")
        );
    }

    #[test]
    fn set_field_creates_missing_section() {
        let out = set_field("base_url = \"x\"\n", &chat_model(), "gpt-x");
        assert_eq!(out, "base_url = \"x\"\n\n[chat]\nmodel = \"gpt-x\"\n");
        assert_eq!(extract_field(&out, &chat_model()).as_deref(), Some("gpt-x"));
    }

    #[test]
    fn set_field_top_level_lands_before_first_section() {
        let doc = "[chat]\nmodel = \"m\"\n";
        let out = set_field(doc, &base_url(), "https://x");
        assert_eq!(out, "base_url = \"https://x\"\n[chat]\nmodel = \"m\"\n");
    }

    #[test]
    fn set_field_on_empty_document() {
        assert_eq!(set_field("", &base_url(), "v"), "base_url = \"v\"\n");
    }

    #[test]
    fn set_field_escapes_quotes_and_backslashes() {
        let out = set_field("", &base_url(), "a\"b\\c");
        assert_eq!(out, "base_url = \"a\\\"b\\\\c\"\n");
        assert_eq!(extract_field(&out, &base_url()).as_deref(), Some("a\"b\\c"));
    }

    #[test]
    fn remove_field_deletes_the_line() {
        let doc = "a = 1\nbase_url = \"x\"\nb = 2\n";
        assert_eq!(remove_field(doc, &base_url()), "a = 1\nb = 2\n");
    }

    #[test]
    fn remove_absent_field_is_a_no_op() {
        let doc = "a = 1\n";
        assert_eq!(remove_field(doc, &base_url()), doc);
    }

    #[test]
    fn validate_flags_malformed_document() {
        assert!(validate_document("base_url = \"x\"\n").is_empty());
        let markers = validate_document("base_url = \n");
        assert_eq!(markers.len(), 1);
        assert!(markers[0].line >= 1);
    }

    #[test]
    fn offset_to_line_col_is_one_based() {
        let text = "ab\ncd";
        assert_eq!(offset_to_line_col(text, 0), (1, 1));
        assert_eq!(offset_to_line_col(text, 3), (2, 1));
        assert_eq!(offset_to_line_col(text, 4), (2, 2));
    }
}
