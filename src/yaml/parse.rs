//! Location-aware YAML trees.
//!
//! The parser's event stream carries start/end markers; this module folds it
//! into a tree whose every node knows its character span in the source, and,
//! for scalars, the resolved value and the quotation style. These trees are
//! what the pointer locator walks and what the splice engine edits through.
//!
//! Spans for block scalars are normalized: the whitespace-only tail of the
//! reported span is trimmed, so the span never covers the scalar's trailing
//! newline regardless of how the parser reports block extents.

use saphyr_parser::{Event, Parser, ScalarStyle, Span as EventSpan};

use crate::error::{Error, Result};
use crate::splice::{span, Span};

/// Quotation style of a scalar in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar,
    Sequence,
    Mapping,
    Alias,
}

/// One node of a parsed document, annotated with its source location.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Kind,
    /// Scalar value after YAML scalar resolution; empty for collections.
    pub value: String,
    pub style: Style,
    /// Character span of the node in the source, including any quotes or
    /// block indicators.
    pub span: Span,
    /// 1-based source line of the node's first character.
    pub line: usize,
    pub col: usize,
    /// Sequence elements, or the flattened key/value pairs of a mapping
    /// (even indices are keys, odd indices their values).
    pub children: Vec<Node>,
}

impl Node {
    fn container(kind: Kind, start: usize, line: usize, col: usize) -> Self {
        Node {
            kind,
            value: String::new(),
            style: Style::Plain,
            span: span(start, start),
            line,
            col,
            children: Vec::new(),
        }
    }

    /// Key/value pairs of a mapping node.
    pub fn pairs(&self) -> impl Iterator<Item = (&Node, &Node)> {
        self.children.chunks_exact(2).map(|c| (&c[0], &c[1]))
    }

    pub fn short_kind(&self) -> &'static str {
        match self.kind {
            Kind::Scalar => "scalar",
            Kind::Sequence => "sequence",
            Kind::Mapping => "mapping",
            Kind::Alias => "alias",
        }
    }
}

struct TreeBuilder<'a> {
    chars: &'a [char],
    docs: Vec<Node>,
    stack: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(chars: &'a [char]) -> Self {
        TreeBuilder {
            chars,
            docs: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn attach(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.docs.push(node),
        }
    }

    fn on_event(&mut self, ev: Event<'_>, ev_span: EventSpan) {
        let start = ev_span.start.index();
        let line = ev_span.start.line();
        let col = ev_span.start.col();

        match ev {
            Event::Scalar(value, style, _, _) => {
                let style = match style {
                    ScalarStyle::SingleQuoted => Style::SingleQuoted,
                    ScalarStyle::DoubleQuoted => Style::DoubleQuoted,
                    ScalarStyle::Literal => Style::Literal,
                    ScalarStyle::Folded => Style::Folded,
                    _ => Style::Plain,
                };
                let node_span = self.scalar_span(style, start, ev_span.end.index());
                self.attach(Node {
                    kind: Kind::Scalar,
                    value: value.into_owned(),
                    style,
                    span: node_span,
                    line,
                    col,
                    children: Vec::new(),
                });
            }
            Event::SequenceStart(..) => {
                self.stack
                    .push(Node::container(Kind::Sequence, start, line, col));
            }
            Event::MappingStart(..) => {
                self.stack
                    .push(Node::container(Kind::Mapping, start, line, col));
            }
            Event::SequenceEnd | Event::MappingEnd => {
                if let Some(mut node) = self.stack.pop() {
                    node.span.end = ev_span.end.index().min(self.chars.len());
                    self.attach(node);
                }
            }
            Event::Alias(_) => {
                self.attach(Node {
                    kind: Kind::Alias,
                    value: String::new(),
                    style: Style::Plain,
                    span: span(start, start),
                    line,
                    col,
                    children: Vec::new(),
                });
            }
            // Stream and document delimiters carry no tree content; document
            // boundaries fall out of the stack becoming empty.
            _ => {}
        }
    }

    /// Normalizes a scalar's reported extent into the span the splice
    /// engine edits: quoted scalars cover their quotes, block scalars start
    /// at their indicator, and the whitespace-only tail is trimmed so block
    /// scalars never claim their trailing newline.
    fn scalar_span(&self, style: Style, start: usize, end: usize) -> Span {
        let len = self.chars.len();
        let mut start = start.min(len);
        let mut end = end.min(len).max(start);

        match style {
            Style::SingleQuoted | Style::DoubleQuoted => {
                let q = if style == Style::DoubleQuoted { '"' } else { '\'' };
                if start == end && start > 0 && self.chars[start - 1] == q {
                    // Zero-length content between the quotes.
                    start -= 1;
                    end = (end + 1).min(len);
                } else {
                    if self.chars.get(start) != Some(&q)
                        && start > 0
                        && self.chars[start - 1] == q
                    {
                        start -= 1;
                    }
                    let quoted = end > start + 1
                        && self.chars[start] == q
                        && self.chars[end - 1] == q;
                    if !quoted && self.chars.get(end) == Some(&q) {
                        end += 1;
                    }
                }
            }
            Style::Literal | Style::Folded => {
                start = self.block_indicator(start);
                while end > start && matches!(self.chars[end - 1], '\n' | '\r' | ' ' | '\t') {
                    end -= 1;
                }
            }
            Style::Plain => {
                while end > start && matches!(self.chars[end - 1], '\n' | '\r' | ' ' | '\t') {
                    end -= 1;
                }
            }
        }
        span(start, end.max(start))
    }

    /// Walks back from a block scalar's reported start to its `|` or `>`
    /// indicator, in case the reported position is the first content
    /// character instead.
    fn block_indicator(&self, start: usize) -> usize {
        if matches!(self.chars.get(start), Some('|') | Some('>')) {
            return start;
        }
        let mut i = start;
        while i > 0 {
            i -= 1;
            match self.chars[i] {
                ' ' | '\t' | '\n' | '\r' | '+' | '-' | '0'..='9' => continue,
                '|' | '>' => return i,
                _ => break,
            }
        }
        start
    }
}

/// Parses every document in a YAML stream into a located tree.
///
/// Empty documents contribute no tree.
pub fn parse_documents(src: &str) -> Result<Vec<Node>> {
    let chars: Vec<char> = src.chars().collect();
    let mut builder = TreeBuilder::new(&chars);

    for res in Parser::new_from_str(src) {
        let (ev, ev_span) = res.map_err(|e| Error::parse(e.to_string()))?;
        builder.on_event(ev, ev_span);
    }
    Ok(builder.docs)
}

/// Parses a source expected to hold a single document and returns its root.
pub fn parse_single(src: &str) -> Result<Node> {
    parse_documents(src)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse("empty document"))
}
