//! Replacement-literal encoding for YAML scalars.
//!
//! The goal: the document re-parses with the new value, and the quotation
//! style survives when it was intentional. If the original value had to be
//! quoted (e.g. a number kept as a string) and the new value doesn't, the
//! quotes are dropped. If the original didn't have to be quoted, the user
//! quoted it on purpose and the new value keeps the same quote character.

use crate::error::Result;
use crate::yaml::parse::{self, Kind};

/// Encodes `value` as the literal replacing `old` at a position whose line
/// starts with `line_prefix`.
pub fn quote(value: &str, old: &str, line_prefix: &str) -> Result<String> {
    // An empty plain scalar is permissible at any position.
    if value.is_empty() {
        return Ok(String::new());
    }

    let indent = line_prefix.chars().take_while(|c| *c == ' ').count();

    if let Some(q) = old.chars().next() {
        if q == '"' || q == '\'' {
            let re_encoded = yaml_round_trip(old)?;
            if re_encoded.chars().next() != Some(q) {
                // The original value did not force quoting, so the quotes
                // were the user's choice. Keep the same quote character.
                if q == '"' {
                    return json_quote(value);
                }
                return try_single_quoted(value, indent);
            }
        }
    }

    Ok(yaml_string(value, indent))
}

/// Decodes a scalar literal from YAML and re-encodes it with the automatic
/// style chooser, revealing whether quoting was forced by the content.
fn yaml_round_trip(literal: &str) -> Result<String> {
    let node = parse::parse_single(literal)?;
    let value = match node.kind {
        Kind::Scalar => node.value,
        _ => literal.to_string(),
    };
    Ok(yaml_string(&value, 0))
}

/// Encodes a string with YAML's automatic style rules: plain when safe,
/// double-quoted when the plain form would resolve to another type or
/// contains non-printable characters, single-quoted when plain is
/// syntactically unsafe, and a literal block scalar for multi-line values.
///
/// Block continuation lines are indented two columns past `indent`, the
/// leading-space count of the line holding the scalar's first character.
pub fn yaml_string(value: &str, indent: usize) -> String {
    if value.is_empty() {
        return String::new();
    }

    if value.contains('\n') {
        if value.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
            return json_quote_infallible(value);
        }
        return block_literal(value, indent);
    }

    if !is_printable(value) {
        return json_quote_infallible(value);
    }
    if resolves_non_string(value) {
        return json_quote_infallible(value);
    }
    if plain_unsafe(value) {
        return single_quoted(value);
    }
    value.to_string()
}

/// Single-quoted form unless the value cannot be represented that way
/// (non-printable characters), in which case the automatic style applies.
fn try_single_quoted(value: &str, indent: usize) -> Result<String> {
    if !is_printable(value) {
        return Ok(yaml_string(value, indent));
    }
    Ok(single_quoted(value))
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn json_quote(value: &str) -> Result<String> {
    Ok(json_quote_infallible(value))
}

fn json_quote_infallible(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// Emits a literal block scalar. The chomping indicator preserves the
/// trailing-newline count of the value: `|-` for none, `|` for exactly one,
/// `|+` for more.
fn block_literal(value: &str, indent: usize) -> String {
    let trimmed = value.trim_end_matches('\n');
    let trailing = value.chars().rev().take_while(|c| *c == '\n').count();

    let chomp = match trailing {
        0 => "-",
        1 => "",
        _ => "+",
    };

    let pad = " ".repeat(indent + 2);
    let body = trimmed
        .split('\n')
        .map(|l| {
            if l.is_empty() {
                String::new()
            } else {
                format!("{pad}{l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("|{chomp}\n{body}{}", "\n".repeat(trailing.saturating_sub(1)))
}

fn is_printable(s: &str) -> bool {
    s.chars().all(|c| !c.is_control())
}

/// True if the plain form of `s` would resolve to something other than a
/// string under YAML core resolution (null, bool, int, float).
fn resolves_non_string(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "~" | "null" | "true" | "false" | "yes" | "no" | "on" | "off"
    ) {
        return true;
    }

    let unsigned = s.strip_prefix(|c| c == '-' || c == '+').unwrap_or(s);
    if !unsigned.is_empty() && unsigned.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if let Some(hex) = unsigned.strip_prefix("0x") {
        if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return true;
        }
    }
    if let Some(oct) = unsigned.strip_prefix("0o") {
        if !oct.is_empty() && oct.chars().all(|c| ('0'..='7').contains(&c)) {
            return true;
        }
    }
    if matches!(lower.as_str(), ".inf" | "-.inf" | "+.inf" | ".nan") {
        return true;
    }
    // Floats: require a digit somewhere so "." and "-" stay strings.
    if s.chars().any(|c| c.is_ascii_digit()) && s.parse::<f64>().is_ok() {
        return true;
    }
    looks_like_timestamp(s)
}

/// YYYY-MM-DD, optionally followed by a time part.
fn looks_like_timestamp(s: &str) -> bool {
    let b: Vec<char> = s.chars().collect();
    if b.len() < 10 {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(|c| c.is_ascii_digit());
    digits(0..4)
        && b[4] == '-'
        && digits(5..7)
        && b[7] == '-'
        && digits(8..10)
        && (b.len() == 10 || matches!(b[10], 'T' | 't' | ' '))
}

/// True if `s` cannot be written as a plain scalar in block context.
fn plain_unsafe(s: &str) -> bool {
    let first = match s.chars().next() {
        Some(c) => c,
        None => return false,
    };

    if s.starts_with(' ') || s.ends_with(' ') || s.contains('\t') {
        return true;
    }

    match first {
        '!' | '&' | '*' | '|' | '>' | '%' | '@' | '`' | '"' | '\'' | '#' | ','
        | '[' | ']' | '{' | '}' => return true,
        '-' | '?' | ':' => {
            let rest = &s[first.len_utf8()..];
            if rest.is_empty() || rest.starts_with(' ') {
                return true;
            }
        }
        _ => {}
    }

    let chars: Vec<char> = s.chars().collect();
    for i in 0..chars.len() {
        match chars[i] {
            '#' if i > 0 && chars[i - 1] == ' ' => return true,
            ':' if i + 1 == chars.len() || chars[i + 1] == ' ' => return true,
            _ => {}
        }
    }
    false
}
