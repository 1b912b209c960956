//! The `regexp` lens: selects a substring via a regular expression and
//! exposes capturing groups as child positions, referenced by number or,
//! for `(?P<name>…)` subexpressions, by name. Group 0 is the whole match.

use crate::error::{Error, Result};
use crate::lens::util::{char_offset, compile_regex};
use crate::lens::Setter;
use crate::splice::span;
use crate::yaml::ptr::tokens;

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let mut ops = Vec::with_capacity(setters.len());

    for setter in setters.iter_mut() {
        let toks = tokens(&setter.pointer)?;
        if toks.len() > 2 {
            return Err(Error::syntax(format!(
                "regexp lens wants at most two tokens, got {}",
                toks.len()
            )));
        }

        let re = compile_regex(&toks[0])?;

        let group = match toks.get(1) {
            None => 0,
            Some(sub) => match sub.parse::<usize>() {
                Ok(n) => n,
                Err(_) => re
                    .capture_names()
                    .position(|name| name == Some(sub.as_str()))
                    .ok_or_else(|| {
                        Error::syntax(format!("cannot find subexpression {sub:?}"))
                    })?,
            },
        };

        let count = re.find_iter(src).count();
        if count > 1 {
            return Err(Error::Ambiguous {
                what: format!("regexp {:?}", toks[0]),
                count,
            });
        }
        let caps = re
            .captures(src)
            .ok_or_else(|| Error::not_found(format!("no matches for regexp {:?}", toks[0])))?;
        let m = caps.get(group).ok_or_else(|| {
            Error::not_found(format!("group {group} of regexp {:?}", toks[0]))
        })?;

        let start = char_offset(src, m.start());
        let end = char_offset(src, m.end());
        let new_value = setter.value.transform(m.as_str())?;
        ops.push(span(start, end).with(new_value));
    }

    crate::splice::transform(src, ops)
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::lens::{self, Mapping};

    const SRC: &str = "data: |\n  foo\n    bar 123\n  baz\n";
    const OUT: &str = "data: |\n  foo\n    bar 023\n  baz\n";

    #[test]
    fn whole_match() {
        let got = lens::apply(
            SRC,
            vec![Mapping::new("/data/~(regexp)/b.* ([0-9])", "bar 0")],
        )
        .unwrap();
        assert_eq!(got, OUT);
    }

    #[test]
    fn group_by_number() {
        let got = lens::apply(
            SRC,
            vec![Mapping::new("/data/~(regexp)/b.* (?P<num>[0-9])/1", "0")],
        )
        .unwrap();
        assert_eq!(got, OUT);
    }

    #[test]
    fn group_by_name() {
        let got = lens::apply(
            SRC,
            vec![Mapping::new("/data/~(regexp)/b.* (?P<num>[0-9])/num", "0")],
        )
        .unwrap();
        assert_eq!(got, OUT);
    }

    #[test]
    fn regexp_as_outer_lens_chains_into_base64() {
        let got = lens::apply(
            "foo:YmFy",
            vec![Mapping::new("~(regexp)/foo:(.*)/1/~(base64)", "baz")],
        )
        .unwrap();
        assert_eq!(got, "foo:YmF6");
    }

    #[test]
    fn unknown_group_name() {
        let err = lens::apply(
            SRC,
            vec![Mapping::new("/data/~(regexp)/bar (x)/nope", "0")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn multiple_matches_are_ambiguous() {
        let err = lens::apply(
            "a1 a2",
            vec![Mapping::new("~(regexp)/a[0-9]", "b")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Ambiguous { .. }));
    }
}
