//! Extended JSON Pointer resolution over located YAML trees.
//!
//! The standard RFC 6901 grammar is extended with two constructs usable over
//! sequences, designed for manifests whose arrays carry a field that
//! uniquely identifies each entry:
//!
//! - `~{json-object}` selects the elements into which the object embeds as a
//!   recursive subset (`~{}` matches every element);
//! - `~[key=value]` is shorthand for `~{"key":"value"}`.
//!
//! A pointer is meant to address exactly one node; [`find`] enforces that
//! dynamically, while [`find_all`] exposes every match.

use crate::error::{Error, Result};
use crate::yaml::parse::{self, Kind, Node};

/// Splits a pointer into decoded reference tokens (`~1` → `/`, `~0` → `~`).
pub fn tokens(ptr: &str) -> Result<Vec<String>> {
    if !ptr.starts_with('/') {
        return Err(Error::syntax(format!(
            "{ptr:?} is not a valid pointer: missing leading '/'"
        )));
    }
    Ok(ptr
        .split('/')
        .skip(1)
        .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Finds all nodes matched by `ptr` under `root`.
pub fn find_all<'a>(root: &'a Node, ptr: &str) -> Result<Vec<&'a Node>> {
    let toks = tokens(ptr)?;
    if toks.is_empty() {
        return Err(Error::syntax(format!("empty pointer {ptr:?}")));
    }
    find_toks(root, &toks).map_err(|e| match e {
        Error::NotFound { what } => Error::NotFound {
            what: format!("{ptr:?}: {what}"),
        },
        other => other,
    })
}

/// Like [`find_all`] but requires exactly one match.
pub fn find<'a>(root: &'a Node, ptr: &str) -> Result<&'a Node> {
    let res = find_all(root, ptr)?;
    match res.len() {
        0 => Err(Error::not_found(format!("{ptr:?}"))),
        1 => Ok(res[0]),
        n => Err(Error::TooManyResults {
            what: format!("{ptr:?}"),
            count: n,
        }),
    }
}

fn find_toks<'a>(root: &'a Node, toks: &[String]) -> Result<Vec<&'a Node>> {
    let next = match_token(root, &toks[0])?;
    if toks.len() == 1 {
        return Ok(next);
    }

    let mut res = Vec::new();
    for n in next {
        res.extend(find_toks(n, &toks[1..])?);
    }
    Ok(res)
}

/// Matches one reference token against a node.
///
/// Over a mapping the token is a literal key name; over a sequence it is a
/// range-checked decimal index or one of the filter constructs.
fn match_token<'a>(root: &'a Node, tok: &str) -> Result<Vec<&'a Node>> {
    match root.kind {
        Kind::Mapping => {
            for (key, value) in root.pairs() {
                if key.kind == Kind::Scalar && key.value == tok {
                    return Ok(vec![value]);
                }
            }
            Err(Error::not_found(format!("key {tok:?}")))
        }
        Kind::Sequence => {
            if let Some(query) = tok.strip_prefix('~') {
                let query = parse_filter(tok, query)?;
                return Ok(root
                    .children
                    .iter()
                    .filter(|el| is_tree_subset(&query, el))
                    .collect());
            }
            let i: usize = tok
                .parse()
                .map_err(|_| Error::syntax(format!("bad sequence index {tok:?}")))?;
            if i >= root.children.len() {
                return Err(Error::OutOfBounds {
                    index: i,
                    len: root.children.len(),
                });
            }
            Ok(vec![&root.children[i]])
        }
        _ => Err(Error::TypeUnsupported {
            what: format!("token {tok:?}"),
            kind: root.short_kind().to_string(),
        }),
    }
}

/// Parses the `{…}` or `[key=value]` part of a filter token into a query
/// tree matched by-example against sequence elements.
fn parse_filter(tok: &str, query: &str) -> Result<Node> {
    if query.starts_with('{') {
        return parse::parse_single(query)
            .map_err(|e| Error::syntax(format!("bad filter {tok:?}: {e}")));
    }
    if let Some(body) = query.strip_prefix('[').and_then(|q| q.strip_suffix(']')) {
        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| Error::syntax("expecting ~[key=value]".to_string()))?;
        return Ok(key_value_query(key, value));
    }
    Err(Error::syntax(format!("bad filter token {tok:?}")))
}

/// Builds the query tree equivalent to `~{"key":"value"}`.
fn key_value_query(key: &str, value: &str) -> Node {
    let scalar = |v: &str| Node {
        kind: Kind::Scalar,
        value: v.to_string(),
        style: parse::Style::Plain,
        span: crate::splice::span(0, 0),
        line: 0,
        col: 0,
        children: Vec::new(),
    };
    let mut query = scalar("");
    query.kind = Kind::Mapping;
    query.children = vec![scalar(key), scalar(value)];
    query
}

/// True if every element of tree `a` exists in tree `b`: scalars compare by
/// resolved value, mapping entries must all be present, and each array
/// element of `a` must embed somewhere in `b`'s array.
pub fn is_tree_subset(a: &Node, b: &Node) -> bool {
    if a.kind != b.kind {
        return false;
    }
    if a.value != b.value {
        return false;
    }

    match a.kind {
        Kind::Mapping => a.pairs().all(|(ka, va)| {
            b.pairs()
                .any(|(kb, vb)| ka.value == kb.value && is_tree_subset(va, vb))
        }),
        Kind::Sequence => a
            .children
            .iter()
            .all(|ea| b.children.iter().any(|eb| is_tree_subset(ea, eb))),
        _ => true,
    }
}
