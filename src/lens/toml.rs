//! The `toml` lens.
//!
//! The document is parsed with `toml_edit` to check validity and the type
//! of the addressed value; the value's position on its line is then located
//! with a quote-tracking scanner, since only double-quoted string values
//! are editable in place.

use toml_edit::DocumentMut;

use crate::error::{Error, Result};
use crate::lens::Setter;
use crate::splice::{span, Span};
use crate::yaml::ptr::tokens;

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let doc: DocumentMut = src
        .parse()
        .map_err(|e: toml_edit::TomlError| Error::parse(e.to_string()))?;

    let sections = scan_sections(src);

    let mut ops = Vec::with_capacity(setters.len());
    for setter in setters.iter_mut() {
        let toks = tokens(&setter.pointer)?;
        if toks.is_empty() || toks == [""] {
            return Err(Error::syntax(format!(
                "pointer {:?} does not address a key",
                setter.pointer
            )));
        }

        let item = lookup_item(&doc, &toks)
            .ok_or_else(|| Error::not_found(format!("pointer {:?}", setter.pointer)))?;
        let old = item.as_str().ok_or_else(|| Error::TypeUnsupported {
            what: format!("pointer {:?}", setter.pointer),
            kind: "non-string TOML value".to_string(),
        })?;

        let (section_toks, key) = toks.split_at(toks.len() - 1);
        let region = find_section(&sections, section_toks)?;
        let value_span = find_value_span(src, region, &key[0])?;

        let new_value = setter.value.transform(old)?;
        ops.push(span(value_span.start, value_span.end).with(quote_toml(&new_value)));
    }

    crate::splice::transform(src, ops)
}

fn lookup_item<'a>(doc: &'a DocumentMut, toks: &[String]) -> Option<&'a toml_edit::Item> {
    let mut item: &toml_edit::Item = doc.as_item();
    for tok in toks {
        item = item.as_table_like()?.get(tok)?;
    }
    Some(item)
}

fn quote_toml(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// One `[header]` section and the char range of its body.
#[derive(Debug)]
struct Section {
    path: Vec<String>,
    body_start: usize,
    body_end: usize,
}

/// Scans section headers and body extents in one pass over the lines.
/// The implicit root section spans from the start of the document to the
/// first header.
fn scan_sections(src: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut offset = 0usize;
    let mut root_end = None;

    for line in src.split_inclusive('\n') {
        let line_start = offset;
        let line_len = line.chars().count();
        offset += line_len;

        let trimmed = line.trim_start();
        if !trimmed.starts_with('[') {
            continue;
        }
        if root_end.is_none() {
            root_end = Some(line_start);
        }
        if let Some(path) = parse_header(trimmed) {
            if let Some(Section { body_end, .. }) = sections.last_mut() {
                *body_end = line_start;
            }
            sections.push(Section {
                path,
                body_start: line_start + line_len,
                body_end: line_start + line_len,
            });
        }
    }

    if let Some(last) = sections.last_mut() {
        last.body_end = offset;
    }
    sections.insert(
        0,
        Section {
            path: Vec::new(),
            body_start: 0,
            body_end: root_end.unwrap_or(offset),
        },
    );
    sections
}

fn parse_header(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim_end();
    let inner = if let Some(rest) = trimmed.strip_prefix("[[") {
        &rest[..rest.find("]]")?]
    } else {
        let rest = trimmed.strip_prefix('[')?;
        &rest[..rest.find(']')?]
    };
    Some(
        inner
            .split('.')
            .map(|p| p.trim().trim_matches('"').trim_matches('\'').to_string())
            .collect(),
    )
}

fn find_section<'a>(sections: &'a [Section], path: &[String]) -> Result<&'a Section> {
    let matches: Vec<&Section> = sections.iter().filter(|s| s.path == path).collect();
    match matches.len() {
        0 => Err(Error::not_found(format!("section {:?}", path.join(".")))),
        1 => Ok(matches[0]),
        n => Err(Error::Ambiguous {
            what: format!("section {:?}", path.join(".")),
            count: n,
        }),
    }
}

/// Finds the char span of the double-quoted value assigned to `key` within
/// a section body.
fn find_value_span(src: &str, section: &Section, key: &str) -> Result<Span> {
    let mut offset = 0usize;
    let mut matches = Vec::new();

    for line in src.split_inclusive('\n') {
        let line_start = offset;
        offset += line.chars().count();
        if line_start < section.body_start || line_start >= section.body_end {
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            continue;
        }
        if let Some((line_key, value)) = scan_assignment(line) {
            if line_key == key || line_key.trim_matches('"') == key {
                matches.push(value.map(|(s, e)| span(line_start + s, line_start + e)));
            }
        }
    }

    match matches.len() {
        0 => Err(Error::not_found(format!("key {key:?}"))),
        1 => matches[0].ok_or_else(|| Error::TypeUnsupported {
            what: format!("key {key:?}"),
            kind: "non-double-quoted TOML value".to_string(),
        }),
        n => Err(Error::Ambiguous {
            what: format!("key {key:?}"),
            count: n,
        }),
    }
}

/// Splits a `key = value` line, tracking quotes so `=` and `#` inside
/// strings don't confuse it. Returns the trimmed key text and, when the
/// value is a double-quoted string, the char span of the quoted literal
/// (quotes included) relative to the line start.
fn scan_assignment(line: &str) -> Option<(String, Option<(usize, usize)>)> {
    let chars: Vec<char> = line.chars().collect();

    let mut in_double = false;
    let mut in_single = false;
    let mut escape = false;
    let mut eq = None;
    for (i, &c) in chars.iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        if in_double {
            match c {
                '\\' => escape = true,
                '"' => in_double = false,
                _ => {}
            }
            continue;
        }
        if in_single {
            if c == '\'' {
                in_single = false;
            }
            continue;
        }
        match c {
            '"' => in_double = true,
            '\'' => in_single = true,
            '=' => {
                eq = Some(i);
                break;
            }
            '#' => return None,
            _ => {}
        }
    }
    let eq = eq?;
    let key: String = chars[..eq].iter().collect();
    let key = key.trim().to_string();
    if key.is_empty() {
        return None;
    }

    // Locate the opening quote of the value, then its matching close.
    let mut i = eq + 1;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    if i >= chars.len() || chars[i] != '"' {
        return Some((key, None));
    }
    let start = i;
    i += 1;
    let mut escape = false;
    while i < chars.len() {
        if escape {
            escape = false;
        } else if chars[i] == '\\' {
            escape = true;
        } else if chars[i] == '"' {
            return Some((key, Some((start, i + 1))));
        }
        i += 1;
    }
    Some((key, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::{self, Mapping};

    #[test]
    fn scan_assignment_spans() {
        let (key, value) = scan_assignment("k1 =  \"v1\" # a comment\n").unwrap();
        assert_eq!(key, "k1");
        assert_eq!(value, Some((6, 10)));

        let (key, value) = scan_assignment("k2 = 42\n").unwrap();
        assert_eq!(key, "k2");
        assert_eq!(value, None);

        assert!(scan_assignment("# only a comment\n").is_none());
    }

    #[test]
    fn scan_assignment_ignores_hash_inside_string() {
        let (_, value) = scan_assignment("k = \"a#b\" # trailing\n").unwrap();
        assert_eq!(value, Some((4, 9)));
    }

    #[test]
    fn edits_value_preserving_surroundings() {
        let src = "[s1]\nk1 =  \"v1\" # a comment\nk2 = \"v2\"\n";
        let got = lens::apply(src, vec![Mapping::new("~(toml)/s1/k1", "V1")]).unwrap();
        assert_eq!(got, "[s1]\nk1 =  \"V1\" # a comment\nk2 = \"v2\"\n");
    }

    #[test]
    fn edits_toml_nested_in_yaml_block() {
        let src = "foo: |\n  [s1]\n  k1 =  \"v1\" # a comment\n  k2 = \"v2\"\n";
        let got = lens::apply(src, vec![Mapping::new("/foo/~(toml)/s1/k1", "V1")]).unwrap();
        assert_eq!(
            got,
            "foo: |\n  [s1]\n  k1 =  \"V1\" # a comment\n  k2 = \"v2\"\n"
        );
    }

    #[test]
    fn edits_root_level_key() {
        let src = "top = \"a\"\n\n[s]\nk = \"b\"\n";
        let got = lens::apply(src, vec![Mapping::new("~(toml)/top", "z")]).unwrap();
        assert_eq!(got, "top = \"z\"\n\n[s]\nk = \"b\"\n");
    }

    #[test]
    fn header_with_trailing_comment() {
        let src = "[s1] # section\nk = \"v\"\n";
        let got = lens::apply(src, vec![Mapping::new("~(toml)/s1/k", "w")]).unwrap();
        assert_eq!(got, "[s1] # section\nk = \"w\"\n");
    }

    #[test]
    fn non_string_values_are_unsupported() {
        let src = "[s]\nk = 42\n";
        let err = lens::apply(src, vec![Mapping::new("~(toml)/s/k", "x")]).unwrap_err();
        assert!(matches!(err, Error::TypeUnsupported { .. }));
    }

    #[test]
    fn missing_key_is_not_found() {
        let src = "[s]\nk = \"v\"\n";
        let err = lens::apply(src, vec![Mapping::new("~(toml)/s/missing", "x")]).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = lens::apply("= nope", vec![Mapping::new("~(toml)/k", "x")]).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
