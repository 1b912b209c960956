//! The `jsonnet` lens.
//!
//! Jsonnet support covers the fragment needed to retarget configuration
//! values: double-quoted string literals, object fields, arrays addressed
//! by index or by a single-level `~{"k":"v"}` match over string fields,
//! transparent `local` binds, and `import`/`importstr`/`importbin` paths
//! via the reserved `~file` sub-token. Everything else is opaque and
//! cannot be edited.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::lens::Setter;
use crate::splice::{span, Span};
use crate::yaml::ptr::tokens;

pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let root = Reader::new(src).parse_root()?;

    let mut ops = Vec::with_capacity(setters.len());
    for setter in setters.iter_mut() {
        let toks = tokens(&setter.pointer)?;
        let toks: Vec<&str> = toks.iter().map(String::as_str).collect();
        let toks = if toks == [""] { &toks[..0] } else { &toks[..] };

        let node = find(&root, toks)?;
        match node {
            Expr::Str {
                value,
                quoted,
                span: str_span,
            } => {
                if !quoted {
                    return Err(Error::TypeUnsupported {
                        what: format!("pointer {:?}", setter.pointer),
                        kind: "non-double-quoted jsonnet string".to_string(),
                    });
                }
                let new_value = setter.value.transform(value)?;
                let literal = serde_json::to_string(&new_value)
                    .unwrap_or_else(|_| format!("{new_value:?}"));
                ops.push(span(str_span.start, str_span.end).with(literal));
            }
            Expr::Import { .. } => {
                return Err(Error::TypeUnsupported {
                    what: format!("pointer {:?}", setter.pointer),
                    kind: "import node, use .../~file".to_string(),
                });
            }
            other => {
                return Err(Error::TypeUnsupported {
                    what: format!("pointer {:?}", setter.pointer),
                    kind: other.kind_name().to_string(),
                });
            }
        }
    }

    crate::splice::transform(src, ops)
}

/// A located expression of the supported fragment.
#[derive(Debug)]
enum Expr {
    Str {
        value: String,
        /// True for double-quoted literals, the only writable kind.
        quoted: bool,
        /// Char span including the quotes.
        span: Span,
    },
    Object {
        fields: Vec<(String, Expr)>,
    },
    Array {
        elements: Vec<Expr>,
    },
    Import {
        file: Box<Expr>,
    },
    Opaque,
}

impl Expr {
    fn kind_name(&self) -> &'static str {
        match self {
            Expr::Str { .. } => "string",
            Expr::Object { .. } => "object",
            Expr::Array { .. } => "array",
            Expr::Import { .. } => "import",
            Expr::Opaque => "unsupported jsonnet expression",
        }
    }
}

fn find<'a>(root: &'a Expr, toks: &[&str]) -> Result<&'a Expr> {
    let tok = match toks.first() {
        None => return Ok(root),
        Some(t) => *t,
    };

    match root {
        Expr::Object { fields } => {
            for (name, body) in fields {
                if name == tok {
                    return find(body, &toks[1..]);
                }
            }
            Err(Error::not_found(format!("field {tok:?}")))
        }
        Expr::Array { elements } => {
            let el = match_array_item(tok, elements)?;
            find(el, &toks[1..])
        }
        Expr::Import { file } => {
            if toks == ["~file"] {
                Ok(file)
            } else {
                Err(Error::syntax(format!(
                    "import nodes only support the ~file field, found {toks:?}"
                )))
            }
        }
        other => Err(Error::TypeUnsupported {
            what: format!("token {tok:?}"),
            kind: other.kind_name().to_string(),
        }),
    }
}

fn match_array_item<'a>(tok: &str, elements: &'a [Expr]) -> Result<&'a Expr> {
    if let Some(body) = tok.strip_prefix('~') {
        let query: BTreeMap<String, String> = serde_json::from_str(body)
            .map_err(|e| Error::syntax(format!("bad matcher {tok:?}: {e}")))?;
        let matches: Vec<&Expr> = elements
            .iter()
            .filter(|el| object_matches(el, &query))
            .collect();
        return match matches.len() {
            1 => Ok(matches[0]),
            n => Err(Error::Ambiguous {
                what: format!("matcher {tok:?}"),
                count: n,
            }),
        };
    }
    let i: usize = tok
        .parse()
        .map_err(|_| Error::syntax(format!("bad array index {tok:?}")))?;
    elements.get(i).ok_or(Error::OutOfBounds {
        index: i,
        len: elements.len(),
    })
}

/// True if `el` is an object whose string fields cover every entry of the
/// query.
fn object_matches(el: &Expr, query: &BTreeMap<String, String>) -> bool {
    let fields = match el {
        Expr::Object { fields } => fields,
        _ => return false,
    };
    query.iter().all(|(k, v)| {
        fields.iter().any(|(name, body)| {
            name == k && matches!(body, Expr::Str { value, .. } if value == v)
        })
    })
}

/// A recursive-descent reader for the supported jsonnet fragment, tracking
/// character positions for every string literal it can address.
struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(src: &str) -> Self {
        Reader {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn parse_root(mut self) -> Result<Expr> {
        self.skip_trivia();
        let expr = self.parse_expr()?;
        Ok(expr)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.pos += 1;
                }
                Some('#') => self.skip_line(),
                Some('/') => match self.chars.get(self.pos + 1) {
                    Some('/') => self.skip_line(),
                    Some('*') => {
                        self.pos += 2;
                        while !self.eof() {
                            if self.peek() == Some('*')
                                && self.chars.get(self.pos + 1) == Some(&'/')
                            {
                                self.pos += 2;
                                break;
                            }
                            self.pos += 1;
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.skip_trivia();
        let start = self.pos;

        let primary = match self.peek() {
            None => return Err(Error::parse("unexpected end of jsonnet input")),
            Some('{') => self.parse_object()?,
            Some('[') => self.parse_array()?,
            Some('"') | Some('\'') => self.parse_string()?,
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.peek_word();
                match word.as_str() {
                    "local" => return self.parse_local(),
                    "import" | "importstr" | "importbin" => self.parse_import()?,
                    _ => {
                        self.skip_opaque();
                        Expr::Opaque
                    }
                }
            }
            Some(_) => {
                self.skip_opaque();
                Expr::Opaque
            }
        };

        // A trailing operator turns the whole expression opaque: the reader
        // cannot locate values inside computed expressions.
        self.skip_trivia();
        match self.peek() {
            None => Ok(primary),
            Some(c) if ",]});".contains(c) => Ok(primary),
            Some(_) => {
                self.pos = start;
                self.skip_opaque();
                Ok(Expr::Opaque)
            }
        }
    }

    fn peek_word(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .collect()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_trivia();
        if self.bump() != Some(c) {
            return Err(Error::parse(format!(
                "expected {c:?} at position {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn parse_object(&mut self) -> Result<Expr> {
        self.expect('{')?;
        let mut fields = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(Error::parse("unterminated object")),
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                }
                Some(_) => {
                    if self.peek_word() == "local" {
                        // Object-level binds are invisible to pointers.
                        self.skip_opaque();
                        continue;
                    }
                    let name = self.parse_field_name()?;
                    self.skip_trivia();
                    while self.peek() == Some(':') {
                        self.pos += 1;
                    }
                    let body = self.parse_expr()?;
                    fields.push((name, body));
                }
            }
        }
        Ok(Expr::Object { fields })
    }

    fn parse_field_name(&mut self) -> Result<String> {
        self.skip_trivia();
        match self.peek() {
            Some('"') | Some('\'') => {
                let (value, _, _) = self.scan_string()?;
                Ok(value)
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.peek_word();
                self.pos += word.chars().count();
                Ok(word)
            }
            _ => {
                // Computed or bracketed field names: consume as opaque.
                self.skip_opaque_until_colon()?;
                Ok(String::new())
            }
        }
    }

    fn parse_array(&mut self) -> Result<Expr> {
        self.expect('[')?;
        let mut elements = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(Error::parse("unterminated array")),
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                }
                Some(_) => elements.push(self.parse_expr()?),
            }
        }
        Ok(Expr::Array { elements })
    }

    fn parse_string(&mut self) -> Result<Expr> {
        let (value, quoted, str_span) = self.scan_string()?;
        Ok(Expr::Str {
            value,
            quoted,
            span: str_span,
        })
    }

    fn scan_string(&mut self) -> Result<(String, bool, Span)> {
        let start = self.pos;
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::parse("unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let esc = self
                        .bump()
                        .ok_or_else(|| Error::parse("unterminated escape"))?;
                    match esc {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let d = self
                                    .bump()
                                    .and_then(|c| c.to_digit(16))
                                    .ok_or_else(|| Error::parse("bad \\u escape"))?;
                                code = code * 16 + d;
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        other => value.push(other),
                    }
                }
                Some(c) => value.push(c),
            }
        }
        Ok((value, quote == '"', span(start, self.pos)))
    }

    fn parse_local(&mut self) -> Result<Expr> {
        // `local` binds are transparent: skip up to the terminating `;` and
        // continue with the body expression.
        self.pos += "local".chars().count();
        self.skip_balanced_until(|c| c == ';')?;
        self.expect(';')?;
        self.parse_expr()
    }

    fn parse_import(&mut self) -> Result<Expr> {
        let word = self.peek_word();
        self.pos += word.chars().count();
        self.skip_trivia();
        let file = self.parse_string()?;
        Ok(Expr::Import {
            file: Box::new(file),
        })
    }

    /// Consumes an expression the reader doesn't model, up to a delimiter
    /// at bracket depth zero.
    fn skip_opaque(&mut self) {
        let _ = self.skip_balanced_until(|c| ",]});".contains(c));
    }

    fn skip_opaque_until_colon(&mut self) -> Result<()> {
        self.skip_balanced_until(|c| c == ':')
    }

    fn skip_balanced_until<F: Fn(char) -> bool>(&mut self, stop: F) -> Result<()> {
        let mut depth = 0usize;
        loop {
            self.skip_trivia();
            let c = match self.peek() {
                None => return Ok(()),
                Some(c) => c,
            };
            if depth == 0 && stop(c) {
                return Ok(());
            }
            match c {
                '{' | '[' | '(' => {
                    depth += 1;
                    self.pos += 1;
                }
                '}' | ']' | ')' => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                    self.pos += 1;
                }
                '"' | '\'' => {
                    self.parse_string()?;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
    }
}
