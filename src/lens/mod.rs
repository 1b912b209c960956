//! Pointer-addressed in-place edits across nested formats.
//!
//! A lens knows how to edit scalar positions inside one format's
//! representation. Pointer expressions chain lenses with `~(name)` tokens,
//! so a single expression can address, say, a YAML value inside a base64
//! blob inside another YAML document. The dispatcher composes the chain
//! from the innermost format outward: the innermost lens decodes, receives
//! the new literal, re-encodes, and each outer format splices the enclosing
//! scalar back into place.

mod base64;
mod jsonnet;
mod line;
mod oci;
mod regexp;
mod toml;
mod util;
mod yaml;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Error, Result};

/// A request to replace the value addressed by `pointer` with a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub pointer: String,
    pub replacement: String,
}

impl Mapping {
    pub fn new(pointer: impl Into<String>, replacement: impl Into<String>) -> Self {
        Mapping {
            pointer: pointer.into(),
            replacement: replacement.into(),
        }
    }
}

/// Transforms the current value at a pointer target into its replacement.
/// Nested lenses are themselves replacers, which is what makes chains
/// compose.
pub trait Replacer {
    fn transform(&mut self, src: &str) -> Result<String>;
}

/// Like a [`Mapping`], but the replacement is computed by a [`Replacer`].
pub struct Setter {
    pub pointer: String,
    pub value: Box<dyn Replacer>,
}

/// The closed set of formats the engine can see through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lens {
    Yaml,
    MultiYaml,
    Toml,
    Base64,
    Line,
    Regexp,
    OciImageRef,
    Jsonnet,
}

impl Lens {
    fn apply(self, src: &str, setters: &mut [Setter]) -> Result<String> {
        match self {
            Lens::Yaml => yaml::apply(src, setters),
            Lens::MultiYaml => yaml::apply_multi(src, setters),
            Lens::Toml => toml::apply(src, setters),
            Lens::Base64 => base64::apply(src, setters),
            Lens::Line => line::apply(src, setters),
            Lens::Regexp => regexp::apply(src, setters),
            Lens::OciImageRef => oci::apply(src, setters),
            Lens::Jsonnet => jsonnet::apply(src, setters),
        }
    }
}

/// A collection of named lenses. Configured once at startup and treated as
/// an immutable dependency by everything that dispatches pointers.
#[derive(Debug, Clone)]
pub struct LensMap(BTreeMap<String, Lens>);

impl Default for LensMap {
    fn default() -> Self {
        let mut m = BTreeMap::new();
        m.insert(String::new(), Lens::Yaml);
        m.insert("yaml".to_string(), Lens::Yaml);
        m.insert("yamls".to_string(), Lens::MultiYaml);
        m.insert("toml".to_string(), Lens::Toml);
        m.insert("base64".to_string(), Lens::Base64);
        m.insert("line".to_string(), Lens::Line);
        m.insert("regexp".to_string(), Lens::Regexp);
        m.insert("ociImageRef".to_string(), Lens::OciImageRef);
        m.insert("oci".to_string(), Lens::OciImageRef);
        m.insert("jsonnet".to_string(), Lens::Jsonnet);
        LensMap(m)
    }
}

impl LensMap {
    fn lookup(&self, name: &str) -> Result<Lens> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownLens(name.to_string()))
    }

    /// Applies a set of mappings to `src`, resolving lens names from this
    /// map.
    pub fn apply(&self, src: &str, mappings: Vec<Mapping>) -> Result<String> {
        let setters = mappings
            .into_iter()
            .map(|m| Setter {
                pointer: m.pointer,
                value: Box::new(LeafReplacer(m.replacement)) as Box<dyn Replacer>,
            })
            .collect();
        self.apply_setters(src, setters)
    }

    /// Applies setters whose replacement values are computed by replacers.
    pub fn apply_setters(&self, src: &str, setters: Vec<Setter>) -> Result<String> {
        let mut cur = src.to_string();
        for mut applied in self.compose(setters)? {
            cur = applied.transform(&cur)?;
        }
        Ok(cur)
    }

    /// Reads the current value at each pointer by running the chain with a
    /// capturing leaf, so values thread correctly through every decoding.
    pub fn get(&self, src: &str, ptrs: &[String]) -> Result<Vec<String>> {
        let mut slots = Vec::with_capacity(ptrs.len());
        let mut setters = Vec::with_capacity(ptrs.len());
        for p in ptrs {
            let slot = Rc::new(RefCell::new(None));
            slots.push(Rc::clone(&slot));
            setters.push(Setter {
                pointer: p.clone(),
                value: Box::new(CaptureReplacer(slot)),
            });
        }
        self.apply_setters(src, setters)?;
        Ok(slots
            .iter()
            .map(|s| s.borrow_mut().take().unwrap_or_default())
            .collect())
    }

    /// Builds, for each setter, the nest of lens applications described by
    /// its pointer expression, innermost first.
    fn compose(&self, setters: Vec<Setter>) -> Result<Vec<Box<dyn Replacer>>> {
        let mut res = Vec::with_capacity(setters.len());
        for setter in setters {
            let mut segments = Vec::new();
            let mut rest = normalize(&setter.pointer);
            while !rest.is_empty() {
                let (name, pointer, tail) = split(&rest)?;
                segments.push((self.lookup(&name)?, pointer));
                rest = tail;
            }

            let mut value = setter.value;
            for (lens, pointer) in segments.into_iter().rev() {
                value = Box::new(AppliedLens {
                    lens,
                    setters: vec![Setter { pointer, value }],
                });
            }
            res.push(value);
        }
        Ok(res)
    }
}

/// Applies mappings through the default lens map.
pub fn apply(src: &str, mappings: Vec<Mapping>) -> Result<String> {
    LensMap::default().apply(src, mappings)
}

/// Reads pointers through the default lens map.
pub fn get(src: &str, ptrs: &[String]) -> Result<Vec<String>> {
    LensMap::default().get(src, ptrs)
}

struct LeafReplacer(String);

impl Replacer for LeafReplacer {
    fn transform(&mut self, _src: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct CaptureReplacer(Rc<RefCell<Option<String>>>);

impl Replacer for CaptureReplacer {
    fn transform(&mut self, src: &str) -> Result<String> {
        *self.0.borrow_mut() = Some(src.to_string());
        Ok(src.to_string())
    }
}

struct AppliedLens {
    lens: Lens,
    setters: Vec<Setter>,
}

impl Replacer for AppliedLens {
    fn transform(&mut self, src: &str) -> Result<String> {
        self.lens.apply(src, &mut self.setters)
    }
}

/// Rewrites a pointer expression into canonical form: an empty expression
/// becomes `~()/`, a leading `/` gains the identity lens, and a trailing
/// lens token gains an empty subpath. Idempotent.
pub fn normalize(ptr: &str) -> String {
    if ptr.is_empty() {
        return "~()/".to_string();
    }
    let mut ptr = if ptr.starts_with('/') {
        format!("~(){ptr}")
    } else {
        ptr.to_string()
    };

    if let Some(trimmed) = ptr.strip_suffix('/') {
        ptr = trimmed.to_string();
    }
    if let Some(last) = ptr.split('/').next_back() {
        if last.starts_with("~(") {
            ptr.push('/');
        }
    }
    ptr
}

fn lens_name(tok: &str) -> Option<&str> {
    tok.strip_prefix("~(")
        .map(|rest| rest.strip_suffix(')').unwrap_or(rest))
}

/// Slices the leading `~(lens)/pointer` segment off a canonical expression,
/// returning the lens name, its pointer, and the remainder (which again
/// starts with a lens token, or is empty).
fn split(src: &str) -> Result<(String, String, String)> {
    let parts: Vec<&str> = src.split('/').collect();
    let lens = lens_name(parts[0]).ok_or_else(|| {
        Error::syntax(format!("expression {src:?} does not start with a lens"))
    })?;

    let mut pointer = String::new();
    for (i, part) in parts.iter().enumerate().skip(1) {
        if lens_name(part).is_some() {
            if pointer.is_empty() {
                pointer = "/".to_string();
            }
            return Ok((
                lens.to_string(),
                pointer,
                parts[i..].join("/"),
            ));
        }
        pointer.push('/');
        pointer.push_str(part);
    }
    Ok((lens.to_string(), pointer, String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_expressions() {
        let cases = [
            ("/foo/bar", "~()/foo/bar"),
            ("/", "~()/"),
            ("~()/foo/bar", "~()/foo/bar"),
            ("~(yaml)/foo/bar", "~(yaml)/foo/bar"),
            ("~(yaml)/foo/bar/", "~(yaml)/foo/bar"),
            ("~(yaml)/foo/bar/~(baz)", "~(yaml)/foo/bar/~(baz)/"),
            ("~(yaml)/foo/bar/~(baz)/", "~(yaml)/foo/bar/~(baz)/"),
            ("/~(yaml)", "~()/~(yaml)/"),
            ("/(notalens)", "~()/(notalens)"),
            ("", "~()/"),
        ];
        for (ptr, want) in cases {
            assert_eq!(normalize(ptr), want, "ptr={ptr:?}");
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for ptr in ["/a/b", "", "/~(yaml)", "~(toml)/x/~(base64)"] {
            let once = normalize(ptr);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn split_segments() {
        let cases = [
            ("~(l0)/a/b/~(l1)/c/d", "l0", "/a/b", "~(l1)/c/d"),
            ("~(l0)/a/b/~(l1)/c/d/~(l2)/", "l0", "/a/b", "~(l1)/c/d/~(l2)/"),
            ("~(l0)/", "l0", "/", ""),
            ("~(l0)/~(l1)/", "l0", "/", "~(l1)/"),
        ];
        for (src, lens, ptr, rest) in cases {
            let (l, p, r) = split(src).unwrap();
            assert_eq!(l, lens, "src={src:?}");
            assert_eq!(p, ptr, "src={src:?}");
            assert_eq!(r, rest, "src={src:?}");
        }
    }

    #[test]
    fn unknown_lens_is_reported() {
        let err = apply("a: b\n", vec![Mapping::new("/a/~(nope)/x", "y")]).unwrap_err();
        assert!(matches!(err, Error::UnknownLens(_)));
    }

    #[test]
    fn get_reads_values() {
        let src = "foo: x\nbar: y";
        let r = get(src, &["/foo".to_string(), "/bar".to_string()]).unwrap();
        assert_eq!(r, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn apply_simple_scalar() {
        let got = apply("sc: alar\n", vec![Mapping::new("/sc", "otty")]).unwrap();
        assert_eq!(got, "sc: otty\n");
    }

    #[test]
    fn apply_nested_yaml_in_block_scalar() {
        let src = "sc: alar\nfoo: |\n  bar: a\n  baz: b\n  quz: '{\"x\": \"y\"}'\n";
        let got = apply(
            src,
            vec![
                Mapping::new("/sc", "otty"),
                Mapping::new("/foo/~(yaml)/bar", "A"),
                Mapping::new("/foo/~(yaml)/baz", "B"),
            ],
        )
        .unwrap();
        assert_eq!(
            got,
            "sc: otty\nfoo: |\n  bar: A\n  baz: B\n  quz: '{\"x\": \"y\"}'\n"
        );
    }

    #[test]
    fn apply_doubly_nested_yaml() {
        let src = "foo: |\n  bar: a\n  quz: '{\"x\": \"y\"}'\n";
        let got = apply(
            src,
            vec![Mapping::new("/foo/~(yaml)/quz/~(yaml)/x", "Y")],
        )
        .unwrap();
        assert_eq!(got, "foo: |\n  bar: a\n  quz: '{\"x\": \"Y\"}'\n");
    }
}
