//! Workload manifests: YAML documents that declare `apiVersion` and `kind`.
//!
//! A buffer may contain a stream of documents; each one that looks like a
//! manifest is retained together with its located parse tree, its position
//! in the stream, and the reserved annotations that declare fields.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::buffer::ShadowFile;
use crate::error::{Error, Errors, Result};
use crate::yaml::parse::{self, Kind, Node};

/// Domain of the reserved annotations.
pub const ANNO_DOMAIN: &str = "knot8.io";
/// Annotations under this prefix declare fields; the suffix is the field
/// name, the value a pointer expression.
pub const FIELD_ANNO_PREFIX: &str = "field.knot8.io/";
/// The annotation holding the frozen-original snapshot.
pub const ORIGINAL_ANNO: &str = "knot8.io/original";

/// True for annotation keys in the reserved domain.
pub fn is_reserved_annotation(key: &str) -> bool {
    key.split('/').next().is_some_and(|d| d.ends_with(ANNO_DOMAIN))
}

/// The fully qualified name of a manifest, unique within a loaded set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fqn {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for Fqn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// One parsed manifest and its backing buffer.
#[derive(Debug)]
pub struct Manifest {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Reserved annotations only; foreign annotations are dropped at parse.
    pub annotations: RefCell<BTreeMap<String, String>>,
    /// Located parse tree, valid until the buffer is next edited.
    pub root: Node,
    pub file: Rc<RefCell<ShadowFile>>,
    /// Position of this document in the file's YAML stream.
    pub stream_pos: usize,
}

impl Manifest {
    pub fn fqn(&self) -> Fqn {
        Fqn {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        self.file.borrow().name()
    }
}

/// Parses every manifest out of a shadow file. Documents lacking both
/// `apiVersion` and `kind` are skipped; a parse failure is fatal for the
/// whole file.
pub fn parse_manifests(file: &Rc<RefCell<ShadowFile>>) -> Result<Vec<Rc<Manifest>>> {
    let contents = file.borrow().contents();
    let path = file.borrow().name();
    let docs = parse::parse_documents(&contents)
        .map_err(|e| e.with_path(std::path::Path::new(&path)))?;

    let mut res = Vec::new();
    for (stream_pos, root) in docs.into_iter().enumerate() {
        let api_version = scalar_at(&root, &["apiVersion"]);
        let kind = scalar_at(&root, &["kind"]);
        if api_version.is_empty() && kind.is_empty() {
            continue;
        }

        let mut annotations = BTreeMap::new();
        if let Some(anns) = node_at(&root, &["metadata", "annotations"]) {
            if anns.kind == Kind::Mapping {
                for (k, v) in anns.pairs() {
                    if k.kind == Kind::Scalar
                        && v.kind == Kind::Scalar
                        && is_reserved_annotation(&k.value)
                    {
                        annotations.insert(k.value.clone(), v.value.clone());
                    }
                }
            }
        }

        res.push(Rc::new(Manifest {
            api_version,
            kind,
            namespace: scalar_at(&root, &["metadata", "namespace"]),
            name: scalar_at(&root, &["metadata", "name"]),
            annotations: RefCell::new(annotations),
            root,
            file: Rc::clone(file),
            stream_pos,
        }));
    }
    debug!(file = %path, manifests = res.len(), "parsed manifests");
    Ok(res)
}

fn node_at<'a>(root: &'a Node, path: &[&str]) -> Option<&'a Node> {
    let mut cur = root;
    for key in path {
        if cur.kind != Kind::Mapping {
            return None;
        }
        cur = cur
            .pairs()
            .find(|(k, _)| k.kind == Kind::Scalar && k.value == *key)
            .map(|(_, v)| v)?;
    }
    Some(cur)
}

fn scalar_at(root: &Node, path: &[&str]) -> String {
    node_at(root, path)
        .filter(|n| n.kind == Kind::Scalar)
        .map(|n| n.value.clone())
        .unwrap_or_default()
}

/// A loaded set of manifests, possibly spanning several buffers.
#[derive(Debug, Default)]
pub struct Manifests(pub Vec<Rc<Manifest>>);

impl Manifests {
    /// The distinct buffers backing this set, in first-seen order.
    pub fn files(&self) -> Vec<Rc<RefCell<ShadowFile>>> {
        let mut seen: Vec<Rc<RefCell<ShadowFile>>> = Vec::new();
        for m in &self.0 {
            if !seen.iter().any(|f| Rc::ptr_eq(f, &m.file)) {
                seen.push(Rc::clone(&m.file));
            }
        }
        seen
    }

    /// Persists every backing buffer, reporting all failures together.
    pub fn commit(&self) -> Result<()> {
        let mut errs = Errors::new();
        for file in self.files() {
            if let Err(e) = file.borrow().commit() {
                errs.push(e);
            }
        }
        errs.into_result()
    }

    /// The subset of this set whose FQN also appears in `src`.
    pub fn intersect(&self, src: &Manifests) -> Manifests {
        let exists: Vec<Fqn> = src.0.iter().map(|m| m.fqn()).collect();
        Manifests(
            self.0
                .iter()
                .filter(|m| exists.contains(&m.fqn()))
                .map(Rc::clone)
                .collect(),
        )
    }

    /// Copies reserved annotations from matching manifests of `src` into
    /// this set.
    pub fn merge_annotations(&self, src: &Manifests) {
        let mut by_fqn: BTreeMap<Fqn, &Rc<Manifest>> = BTreeMap::new();
        for s in &src.0 {
            by_fqn.insert(s.fqn(), s);
        }

        for d in &self.0 {
            if let Some(s) = by_fqn.get(&d.fqn()) {
                let mut anns = d.annotations.borrow_mut();
                for (k, v) in s.annotations.borrow().iter() {
                    if is_reserved_annotation(k) {
                        anns.insert(k.clone(), v.clone());
                    }
                }
            }
        }
    }
}

/// The manifest shape emitted by the `schema` command: just enough to carry
/// field declarations out-of-band.
#[derive(Debug, Serialize)]
pub struct SchemaManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: SchemaMetadata,
}

#[derive(Debug, Serialize)]
pub struct SchemaMetadata {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

impl SchemaManifest {
    pub fn from_manifest(m: &Manifest) -> Self {
        SchemaManifest {
            api_version: m.api_version.clone(),
            kind: m.kind.clone(),
            metadata: SchemaMetadata {
                namespace: m.namespace.clone(),
                name: m.name.clone(),
                annotations: m.annotations.borrow().clone(),
            },
        }
    }
}

/// Parse error helper shared by loaders: attach buffer name to failures.
pub fn open_shadow(source: crate::buffer::FileSource) -> Result<Rc<RefCell<ShadowFile>>> {
    Ok(Rc::new(RefCell::new(ShadowFile::open(source)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FileSource;

    fn shadow(src: &str) -> Rc<RefCell<ShadowFile>> {
        Rc::new(RefCell::new(ShadowFile::from_bytes(
            FileSource::Memory("test.yaml".into()),
            src.as_bytes(),
        )))
    }

    const MANIFEST: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  namespace: default
  annotations:
    field.knot8.io/replicas: /spec/replicas
    other.example.com/ignored: x
spec:
  replicas: '3'
";

    #[test]
    fn parses_manifest_head() {
        let file = shadow(MANIFEST);
        let ms = parse_manifests(&file).unwrap();
        assert_eq!(ms.len(), 1);
        let m = &ms[0];
        assert_eq!(m.api_version, "apps/v1");
        assert_eq!(m.kind, "Deployment");
        assert_eq!(m.name, "app");
        assert_eq!(m.namespace, "default");
        assert_eq!(m.fqn().to_string(), "apps/v1/Deployment/default/app");
    }

    #[test]
    fn keeps_only_reserved_annotations() {
        let file = shadow(MANIFEST);
        let ms = parse_manifests(&file).unwrap();
        let anns = ms[0].annotations.borrow();
        assert_eq!(anns.len(), 1);
        assert_eq!(
            anns.get("field.knot8.io/replicas").map(String::as_str),
            Some("/spec/replicas")
        );
    }

    #[test]
    fn skips_documents_without_manifest_shape() {
        let src = "just: yaml\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\n";
        let file = shadow(src);
        let ms = parse_manifests(&file).unwrap();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].kind, "ConfigMap");
        assert_eq!(ms[0].stream_pos, 1);
    }

    #[test]
    fn reserved_annotation_predicate() {
        assert!(is_reserved_annotation("field.knot8.io/replicas"));
        assert!(is_reserved_annotation("knot8.io/original"));
        assert!(!is_reserved_annotation("example.com/other"));
        assert!(!is_reserved_annotation("plain"));
    }

    #[test]
    fn intersect_and_merge_annotations() {
        let a = parse_manifests(&shadow(MANIFEST)).unwrap();
        let schema_src = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  namespace: default
  annotations:
    field.knot8.io/extra: /spec/extra
";
        let b = parse_manifests(&shadow(schema_src)).unwrap();
        let (a, b) = (Manifests(a), Manifests(b));

        let common = b.intersect(&a);
        assert_eq!(common.0.len(), 1);

        a.merge_annotations(&common);
        let anns = a.0[0].annotations.borrow();
        assert_eq!(
            anns.get("field.knot8.io/extra").map(String::as_str),
            Some("/spec/extra")
        );
        assert_eq!(anns.len(), 2);
    }
}
