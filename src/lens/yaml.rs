//! The `yaml` and `yamls` lenses.

use crate::error::{Error, Result};
use crate::lens::Setter;
use crate::splice;
use crate::yaml::parse::{self, Kind, Node};
use crate::yaml::{ptr, quote};

/// Edits scalars of a single YAML document, preserving quotation style
/// through the quote preserver.
pub fn apply(src: &str, setters: &mut [Setter]) -> Result<String> {
    let root = parse::parse_single(src)?;

    let mut ops = Vec::with_capacity(setters.len());
    for setter in setters.iter_mut() {
        let node = ptr::find(&root, &setter.pointer)?;
        ops.push(replacement_op(node, setter)?);
    }
    splice::transform(src, ops)
}

/// Edits scalars of a multi-document YAML stream. The leading pointer token
/// is the decimal index of the target document; edits to several documents
/// are grouped into a single splice pass over the buffer.
pub fn apply_multi(src: &str, setters: &mut [Setter]) -> Result<String> {
    let docs = parse::parse_documents(src)?;

    let mut ops = Vec::with_capacity(setters.len());
    for setter in setters.iter_mut() {
        let (head, tail) = chomp_pointer(&setter.pointer)?;
        let n: usize = head
            .parse()
            .map_err(|_| Error::syntax(format!("bad document index {head:?}")))?;
        let root = docs.get(n).ok_or(Error::OutOfBounds {
            index: n,
            len: docs.len(),
        })?;
        if tail.is_empty() {
            return Err(Error::syntax(format!(
                "pointer {:?} stops at the document index",
                setter.pointer
            )));
        }
        let node = ptr::find(root, &tail)?;
        ops.push(replacement_op(node, setter)?);
    }
    splice::transform(src, ops)
}

fn replacement_op<'a>(node: &Node, setter: &mut Setter) -> Result<splice::Op<'a>> {
    if node.kind != Kind::Scalar {
        return Err(Error::TypeUnsupported {
            what: format!("pointer {:?}", setter.pointer),
            kind: node.short_kind().to_string(),
        });
    }
    let new_value = setter.value.transform(&node.value)?;
    Ok(node
        .span
        .with_fn(move |old, line_prefix| quote::quote(&new_value, old, line_prefix)))
}

/// Splits a pointer into its first token and the remaining pointer (which
/// keeps its leading `/`, or is empty when nothing remains).
fn chomp_pointer(ptr: &str) -> Result<(String, String)> {
    if !ptr.starts_with('/') {
        return Err(Error::syntax(format!(
            "{ptr:?} is not a valid pointer: missing leading '/'"
        )));
    }
    let mut parts = ptr.splitn(3, '/');
    parts.next(); // empty leading segment
    let head = parts.next().unwrap_or_default().to_string();
    match parts.next() {
        Some(rest) => Ok((head, format!("/{rest}"))),
        None => Ok((head, String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens;

    #[test]
    fn chomp_pointer_splits_head() {
        assert_eq!(
            chomp_pointer("/a/b/c").unwrap(),
            ("a".to_string(), "/b/c".to_string())
        );
        assert_eq!(
            chomp_pointer("/a/b").unwrap(),
            ("a".to_string(), "/b".to_string())
        );
        assert_eq!(
            chomp_pointer("/a").unwrap(),
            ("a".to_string(), String::new())
        );
        assert!(chomp_pointer("a").is_err());
        assert!(chomp_pointer("").is_err());
    }

    #[test]
    fn reads_documents_by_index() {
        let src = "---\na: 1\n---\na: 2\n---\nb: 3\n";
        for (ptr, want) in [
            ("~(yamls)/0/a", "1"),
            ("~(yamls)/1/a", "2"),
            ("~(yamls)/2/b", "3"),
        ] {
            let r = lens::get(src, &[ptr.to_string()]).unwrap();
            assert_eq!(r[0], want, "ptr={ptr}");
        }
    }

    #[test]
    fn edits_multiple_documents_in_one_pass() {
        let src = "---\na: 1\n---\na: 2\n";
        let got = lens::apply(
            src,
            vec![
                lens::Mapping::new("~(yamls)/0/a", "x"),
                lens::Mapping::new("~(yamls)/1/a", "y"),
            ],
        )
        .unwrap();
        assert_eq!(got, "---\na: x\n---\na: y\n");
    }

    #[test]
    fn document_index_out_of_bounds() {
        let err =
            lens::apply("a: 1\n", vec![lens::Mapping::new("~(yamls)/3/a", "x")]).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));
    }

    #[test]
    fn editing_a_mapping_is_unsupported() {
        let err = lens::apply("a:\n  b: c\n", vec![lens::Mapping::new("/a", "x")]).unwrap_err();
        assert!(matches!(err, Error::TypeUnsupported { .. }));
    }

    #[test]
    fn quote_style_is_preserved() {
        let got = lens::apply("v: \"1\"\n", vec![lens::Mapping::new("/v", "1.0")]).unwrap();
        assert_eq!(got, "v: \"1.0\"\n");
    }
}
