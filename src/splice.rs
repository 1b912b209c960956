//! Span replacement over a character stream.
//!
//! The core operation: replace the current content of a selection with a new
//! string, in one pass over the input. Deletion is replacement with an empty
//! string; insertion is replacement at a zero-length selection. Selections
//! are addressed by character offsets, not byte offsets.

use crate::error::{Error, Result};

/// A half-open range `[start, end)` of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Constructs a [`Span`].
pub fn span(start: usize, end: usize) -> Span {
    Span { start, end }
}

impl Span {
    /// An operation that replaces this span with a fixed string.
    pub fn with(self, replacement: impl Into<String>) -> Op<'static> {
        let replacement = replacement.into();
        self.with_fn(move |_old, _line| Ok(replacement.clone()))
    }

    /// An operation that replaces this span with the return value of `f`.
    ///
    /// `f` receives the previous content of the span and the prefix of the
    /// line the span starts on (everything from the start of that line up to
    /// the span start), which callers use to derive indentation.
    pub fn with_fn<'a, F>(self, f: F) -> Op<'a>
    where
        F: FnMut(&str, &str) -> Result<String> + 'a,
    {
        Op {
            span: self,
            replace: Box::new(f),
        }
    }
}

/// A request to replace a span with a replacement produced by a callback.
pub struct Op<'a> {
    pub span: Span,
    replace: Box<dyn FnMut(&str, &str) -> Result<String> + 'a>,
}

/// Applies a set of non-overlapping span replacements to `src` in one pass.
///
/// Operations are sorted by ascending start position. Overlapping spans are
/// a caller error and are rejected before any replacer runs. An empty
/// operation list returns the input unchanged.
pub fn transform(src: &str, mut ops: Vec<Op<'_>>) -> Result<String> {
    let chars: Vec<char> = src.chars().collect();

    ops.sort_by_key(|op| op.span.start);

    let mut last_end = 0;
    for op in &ops {
        let Span { start, end } = op.span;
        if start > end {
            return Err(Error::syntax(format!("inverted span [{start}, {end})")));
        }
        if end > chars.len() {
            return Err(Error::OutOfBounds {
                index: end,
                len: chars.len(),
            });
        }
        if start < last_end {
            return Err(Error::syntax(format!(
                "overlapping spans at position {start}"
            )));
        }
        last_end = end;
    }

    let mut out = String::with_capacity(src.len());
    let mut pos = 0usize;
    let mut line_start = 0usize;

    for op in ops.iter_mut() {
        while pos < op.span.start {
            let ch = chars[pos];
            out.push(ch);
            pos += 1;
            if ch == '\n' {
                line_start = pos;
            }
        }

        let old: String = chars[op.span.start..op.span.end].iter().collect();
        let line_prefix: String = chars[line_start..op.span.start].iter().collect();
        let next = (op.replace)(&old, &line_prefix)?;
        out.push_str(&next);

        // Consume the replaced characters, keeping line tracking accurate
        // for any later op on the same buffer.
        while pos < op.span.end {
            if chars[pos] == '\n' {
                line_start = pos + 1;
            }
            pos += 1;
        }
    }

    out.extend(&chars[pos..]);
    Ok(out)
}

/// Extracts the current content of each span in one pass.
///
/// The result order matches the caller-supplied span order, which may be
/// arbitrary; spans are sorted internally.
pub fn peek(src: &str, spans: &[Span]) -> Result<Vec<String>> {
    let chars: Vec<char> = src.chars().collect();

    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| spans[i].start);

    let mut res = vec![String::new(); spans.len()];
    for &i in &order {
        let Span { start, end } = spans[i];
        if start > end || end > chars.len() {
            return Err(Error::OutOfBounds {
                index: end,
                len: chars.len(),
            });
        }
        res[i] = chars[start..end].iter().collect();
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_single() {
        let got = transform("abcd", vec![span(1, 2).with("B")]).unwrap();
        assert_eq!(got, "aBcd");
    }

    #[test]
    fn replace_multiple() {
        let got = transform(
            "abcd",
            vec![span(1, 2).with("B"), span(3, 4).with("D")],
        )
        .unwrap();
        assert_eq!(got, "aBcD");

        let got = transform(
            "abcd",
            vec![
                span(1, 2).with("Ba"),
                span(2, 3).with(""),
                span(3, 4).with("Da"),
            ],
        )
        .unwrap();
        assert_eq!(got, "aBaDa");
    }

    #[test]
    fn replace_out_of_order() {
        let got = transform(
            "abcd",
            vec![span(3, 4).with("D"), span(1, 2).with("B")],
        )
        .unwrap();
        assert_eq!(got, "aBcD");
    }

    #[test]
    fn insert() {
        let got = transform("abcd", vec![span(2, 2).with("X")]).unwrap();
        assert_eq!(got, "abXcd");
    }

    #[test]
    fn delete() {
        let got = transform("abcd", vec![span(2, 3).with("")]).unwrap();
        assert_eq!(got, "abd");
    }

    #[test]
    fn empty_op_list_is_identity() {
        let src = "a: b\nc: d\n";
        assert_eq!(transform(src, vec![]).unwrap(), src);
    }

    #[test]
    fn replacer_sees_old_content_and_line_prefix() {
        let src = "  foo: bar\n";
        let got = transform(
            src,
            vec![span(7, 10).with_fn(|old, prefix| {
                assert_eq!(old, "bar");
                assert_eq!(prefix, "  foo: ");
                Ok("baz".to_string())
            })],
        )
        .unwrap();
        assert_eq!(got, "  foo: baz\n");
    }

    #[test]
    fn line_prefix_tracks_later_lines() {
        let src = "a: 1\n    b: 2\n";
        let got = transform(
            src,
            vec![span(12, 13).with_fn(|old, prefix| {
                assert_eq!(old, "2");
                assert_eq!(prefix, "    b: ");
                Ok("3".to_string())
            })],
        )
        .unwrap();
        assert_eq!(got, "a: 1\n    b: 3\n");
    }

    #[test]
    fn overlap_is_rejected() {
        let err = transform(
            "abcd",
            vec![span(0, 2).with("x"), span(1, 3).with("y")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let err = transform("ab", vec![span(0, 5).with("x")]).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
    }

    #[test]
    fn replacer_error_aborts() {
        let err = transform(
            "abcd",
            vec![span(1, 2).with_fn(|_, _| Err(Error::syntax("boom")))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn peek_returns_caller_order() {
        let got = peek("abcdef", &[span(4, 6), span(0, 2)]).unwrap();
        assert_eq!(got, vec!["ef".to_string(), "ab".to_string()]);
    }

    #[test]
    fn one_pass_equals_backwards_one_at_a_time() {
        let src = "aa bb cc dd\n";
        let edits = [(0usize, 2usize, "AA"), (3, 5, "B"), (9, 11, "DDDD")];

        let one_pass = transform(
            src,
            edits
                .iter()
                .map(|&(s, e, r)| span(s, e).with(r))
                .collect(),
        )
        .unwrap();

        let mut sequential = src.to_string();
        for &(s, e, r) in edits.iter().rev() {
            sequential = transform(&sequential, vec![span(s, e).with(r)]).unwrap();
        }

        assert_eq!(one_pass, sequential);
        assert_eq!(one_pass, "AA B cc DDDD\n");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let got = transform("é: ü\n", vec![span(3, 4).with("ö")]).unwrap();
        assert_eq!(got, "é: ö\n");
    }
}
