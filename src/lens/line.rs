//! The `line` lens: selects the unique line matching a regular expression,
//! like awk's or sed's `/re/` construct.

use regex::Regex;

use crate::error::{Error, Result};
use crate::lens::Setter;
use crate::lens::util::{char_offset, compile_regex};
use crate::splice::span;
use crate::yaml::ptr::tokens;

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let mut ops = Vec::with_capacity(setters.len());

    for setter in setters.iter_mut() {
        let toks = tokens(&setter.pointer)?;
        if toks.len() != 1 {
            return Err(Error::syntax(format!(
                "line lens wants exactly one token, got {}",
                toks.len()
            )));
        }

        let re: Regex = compile_regex(&format!(".*{}.*", toks[0]))?;
        let matches: Vec<_> = re.find_iter(src).collect();
        if matches.len() > 1 {
            return Err(Error::Ambiguous {
                what: format!("line /{}/", toks[0]),
                count: matches.len(),
            });
        }
        let m = matches.into_iter().next().ok_or_else(|| {
            Error::not_found(format!("no line matches regexp {:?}", toks[0]))
        })?;

        let start = char_offset(src, m.start());
        let end = char_offset(src, m.end());
        let new_value = setter.value.transform(m.as_str())?;
        ops.push(span(start, end).with(new_value));
    }

    crate::splice::transform(src, ops)
}
