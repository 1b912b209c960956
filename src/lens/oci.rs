//! The `ociImageRef` lens.
//!
//! Parses a container image reference into `image`, `tag` and `digest`
//! components. Setting a component that is absent inserts it together with
//! its separator (`:` for tags, `@sha256:` for digests).

use crate::error::{Error, Result};
use crate::lens::util::{char_offset, compile_regex};
use crate::lens::Setter;
use crate::splice::span;
use crate::yaml::ptr::tokens;

const REFERENCE_PATTERN: &str = "^([^:@]*)(:([^@]*))?(@sha256:([a-f0-9]*))?$";

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let re = compile_regex(REFERENCE_PATTERN)?;

    let mut ops = Vec::with_capacity(setters.len());
    for setter in setters.iter_mut() {
        let toks = tokens(&setter.pointer)?;
        if toks.len() != 1 {
            return Err(Error::syntax(format!(
                "ociImageRef lens wants exactly one token, got {}",
                toks.len()
            )));
        }
        let field = toks[0].as_str();

        let caps = re
            .captures(src)
            .ok_or_else(|| Error::parse(format!("{src:?} is not an image reference")))?;

        let group = match field {
            "image" => 1,
            "tag" => 3,
            "digest" => 5,
            other => {
                return Err(Error::syntax(format!("unknown oci field {other:?}")));
            }
        };

        match caps.get(group) {
            Some(m) => {
                let new_value = checked_value(field, setter.value.transform(m.as_str())?)?;
                ops.push(
                    span(char_offset(src, m.start()), char_offset(src, m.end()))
                        .with(new_value),
                );
            }
            None => {
                // The component is absent: transform its implied value and
                // insert it, separator included, after the reference.
                let implied = if field == "tag" { "latest" } else { "" };
                let new_value = checked_value(field, setter.value.transform(implied)?)?;
                let sep = match field {
                    "tag" => ":",
                    "digest" => "@sha256:",
                    other => {
                        return Err(Error::syntax(format!("unknown oci field {other:?}")));
                    }
                };
                let at = char_offset(src, caps.get(0).map(|m| m.end()).unwrap_or(0));
                ops.push(span(at, at).with(format!("{sep}{new_value}")));
            }
        }
    }

    crate::splice::transform(src, ops)
}

/// Digests must be lowercase hex to survive the reference grammar.
fn checked_value(field: &str, value: String) -> Result<String> {
    if field == "digest"
        && !(value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) && !value.is_empty())
    {
        return Err(Error::syntax(format!(
            "digest must be lowercase hex, got {value:?}"
        )));
    }
    Ok(value)
}
