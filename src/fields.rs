//! The field registry: named scalar pointers discovered from manifest
//! annotations, read and edited in batches through the lens engine.
//!
//! A field is a user-facing knob. It owns one or more pointers, possibly
//! spread over several documents and files, whose current values must
//! agree. Edits are queued per field, grouped by backing buffer, and
//! spliced in a single dispatch per buffer.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::buffer::{FileSource, ShadowFile};
use crate::error::{Error, Errors, Result};
use crate::lens::{self, LensMap, Mapping};
use crate::manifest::{
    parse_manifests, Manifest, Manifests, FIELD_ANNO_PREFIX, ORIGINAL_ANNO,
};
use crate::splice::Span;
use crate::yaml::ptr;

/// A pointer expression bound to the document it addresses.
#[derive(Debug, Clone)]
pub struct Pointer {
    pub expr: String,
    pub manifest: Rc<Manifest>,
}

impl Pointer {
    /// The expression rewritten to address the pointer's own document
    /// within its (possibly multi-document) buffer: a leading `yaml`
    /// segment becomes `~(yamls)/<stream index>`.
    pub fn scoped_expr(&self) -> String {
        let normalized = lens::normalize(&self.expr);
        for head in ["~()/", "~(yaml)/"] {
            if let Some(rest) = normalized.strip_prefix(head) {
                return format!("~(yamls)/{}/{}", self.manifest.stream_pos, rest);
            }
        }
        normalized
    }

    /// Structural identity used for schema-merge deduplication.
    fn same_as(&self, other: &Pointer) -> bool {
        self.expr == other.expr && self.manifest.fqn() == other.manifest.fqn()
    }
}

/// The current value of one pointer, with its source location when the
/// outermost segment resolves to a node in the file.
#[derive(Debug, Clone)]
pub struct FieldValue {
    pub value: String,
    pub file: String,
    pub line: Option<usize>,
    pub span: Option<Span>,
}

/// A named knob: an ordered, deduplicated list of pointers.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub name: String,
    pub pointers: Vec<Pointer>,
}

impl Field {
    /// Evaluates every pointer against the current buffer contents,
    /// threading values through the full lens chain. Failures across
    /// pointers are reported together.
    pub fn get_all(&self, lenses: &LensMap) -> Result<Vec<FieldValue>> {
        let mut errs = Errors::new();
        let mut res = Vec::new();

        for p in &self.pointers {
            let contents = p.manifest.file.borrow().contents();
            match lenses.get(&contents, &[p.scoped_expr()]) {
                Err(e) => errs.push(e),
                Ok(values) => {
                    let (line, span) = locate(p);
                    res.push(FieldValue {
                        value: values.into_iter().next().unwrap_or_default(),
                        file: p.manifest.file_name(),
                        line,
                        span,
                    });
                }
            }
        }

        errs.into_result()?;
        Ok(res)
    }
}

/// Best-effort location of a pointer's outermost YAML node in its document
/// tree. Inner lens segments have no stable file position.
fn locate(p: &Pointer) -> (Option<usize>, Option<Span>) {
    let normalized = lens::normalize(&p.expr);
    let rest = match ["~()/", "~(yaml)/"]
        .iter()
        .find_map(|head| normalized.strip_prefix(head))
    {
        Some(rest) => rest,
        None => return (None, None),
    };
    let outer = format!("/{}", rest.split("/~(").next().unwrap_or(rest));
    match ptr::find(&p.manifest.root, &outer) {
        Ok(node) => (Some(node.line), Some(node.span)),
        Err(_) => (None, None),
    }
}

/// All fields discovered in a loaded manifest set, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Fields(pub BTreeMap<String, Field>);

impl Fields {
    /// Scans the reserved annotations of every manifest and collects
    /// field-name → pointer bindings.
    pub fn discover(manifests: &Manifests) -> Fields {
        let mut fields = Fields::default();
        for m in &manifests.0 {
            for (key, expr) in m.annotations.borrow().iter() {
                if let Some(name) = key.strip_prefix(FIELD_ANNO_PREFIX) {
                    let field = fields
                        .0
                        .entry(name.to_string())
                        .or_insert_with(|| Field {
                            name: name.to_string(),
                            ..Field::default()
                        });
                    field.pointers.push(Pointer {
                        expr: expr.clone(),
                        manifest: Rc::clone(m),
                    });
                }
            }
        }
        fields
    }

    /// Field names, sorted lexicographically.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<&Field> {
        self.0
            .get(name)
            .ok_or_else(|| Error::not_found(format!("field {name:?}")))
    }

    pub fn get_all(&self, name: &str, lenses: &LensMap) -> Result<Vec<FieldValue>> {
        self.get(name)?.get_all(lenses)
    }

    /// The single value of a field, failing with `ValuesNotUnique` when its
    /// pointers disagree.
    pub fn get_value(&self, name: &str, lenses: &LensMap) -> Result<String> {
        let values = self.get_all(name, lenses)?;
        let first = values
            .first()
            .ok_or_else(|| Error::not_found(format!("field {name:?} has no pointers")))?;
        if !values.iter().all(|v| v.value == first.value) {
            return Err(Error::ValuesNotUnique {
                field: name.to_string(),
                values: values.into_iter().map(|v| v.value).collect(),
            });
        }
        Ok(first.value.clone())
    }

    /// Verifies that every multi-pointer field agrees on its value,
    /// reporting all violations together.
    pub fn check_uniqueness(&self, lenses: &LensMap) -> Result<()> {
        let mut errs = Errors::new();
        for name in self.names() {
            match self.get_all(&name, lenses) {
                Err(e) => errs.push(e),
                Ok(values) => {
                    if !values.windows(2).all(|w| w[0].value == w[1].value) {
                        errs.push(Error::ValuesNotUnique {
                            field: name.clone(),
                            values: values.into_iter().map(|v| v.value).collect(),
                        });
                    }
                }
            }
        }
        errs.into_result()
    }

    /// Rewrites every pointer to reference the manifest with the same FQN
    /// in `targets`. Fails for any pointer whose FQN has no counterpart.
    pub fn rebase(&mut self, targets: &Manifests) -> Result<()> {
        let mut by_fqn = BTreeMap::new();
        for m in &targets.0 {
            by_fqn.insert(m.fqn(), Rc::clone(m));
        }

        let mut errs = Errors::new();
        for field in self.0.values_mut() {
            for p in &mut field.pointers {
                match by_fqn.get(&p.manifest.fqn()) {
                    Some(target) => p.manifest = Rc::clone(target),
                    None => errs.push(Error::not_found(format!(
                        "manifest {} for field {:?}",
                        p.manifest.fqn(),
                        field.name
                    ))),
                }
            }
        }
        errs.into_result()
    }

    /// Unions pointers from a schema collection into this one, skipping
    /// pointers already present.
    pub fn merge_schema(&mut self, other: Fields) {
        for (name, src) in other.0 {
            let dst = self.0.entry(name.clone()).or_insert_with(|| Field {
                name,
                ..Field::default()
            });
            for p in src.pointers {
                if !dst.pointers.iter().any(|q| q.same_as(&p)) {
                    dst.pointers.push(p);
                }
            }
        }
    }

    pub fn new_edit_batch<'a>(&'a self, lenses: &'a LensMap) -> EditBatch<'a> {
        EditBatch {
            fields: self,
            lenses,
            queues: Vec::new(),
            committed: false,
        }
    }
}

/// Queued edits for one commit. Single-use: a batch that has committed
/// refuses further work.
pub struct EditBatch<'a> {
    fields: &'a Fields,
    lenses: &'a LensMap,
    queues: Vec<(Rc<RefCell<ShadowFile>>, Vec<Mapping>)>,
    committed: bool,
}

impl EditBatch<'_> {
    /// Queues one mapping per pointer of the named field, grouped by the
    /// buffer each pointer lives in.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let field = self.fields.get(name)?;
        for p in &field.pointers {
            let mapping = Mapping::new(p.scoped_expr(), value);
            match self
                .queues
                .iter_mut()
                .find(|(f, _)| Rc::ptr_eq(f, &p.manifest.file))
            {
                Some((_, q)) => q.push(mapping),
                None => self
                    .queues
                    .push((Rc::clone(&p.manifest.file), vec![mapping])),
            }
        }
        Ok(())
    }

    /// Applies every queued mapping, one lens dispatch per buffer. Aborts
    /// on the first failing buffer; earlier buffers keep their new content.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(Error::AlreadyCommitted);
        }
        self.committed = true;

        for (file, mappings) in self.queues.drain(..) {
            debug!(file = %file.borrow().name(), edits = mappings.len(), "applying batch");
            let contents = file.borrow().contents();
            let next = self.lenses.apply(&contents, mappings)?;
            file.borrow_mut().set_contents(&next);
        }
        Ok(())
    }
}

/// A set of manifests together with the fields they declare.
#[derive(Debug, Default)]
pub struct ManifestSet {
    pub manifests: Manifests,
    pub fields: Fields,
}

/// Opens all sources, discovers their fields, and folds in an optional
/// out-of-band schema file. Per-file failures are reported together.
pub fn open_set(sources: Vec<FileSource>, schema: Option<FileSource>) -> Result<ManifestSet> {
    let mut manifests = Manifests::default();
    let mut errs = Errors::new();

    for source in sources {
        let file = match ShadowFile::open(source) {
            Ok(f) => Rc::new(RefCell::new(f)),
            Err(e) => {
                errs.push(e);
                continue;
            }
        };
        match parse_manifests(&file) {
            Ok(ms) => manifests.0.extend(ms),
            Err(e) => errs.push(e),
        }
    }
    errs.into_result()?;

    let mut fields = Fields::discover(&manifests);

    if let Some(schema_source) = schema {
        let file = Rc::new(RefCell::new(ShadowFile::open(schema_source)?));
        let schema_manifests = Manifests(parse_manifests(&file)?);
        let common = schema_manifests.intersect(&manifests);
        manifests.merge_annotations(&common);
        let mut ext = Fields::discover(&common);
        ext.rebase(&manifests)?;
        fields.merge_schema(ext);
    }

    Ok(ManifestSet {
        manifests,
        fields,
    })
}

/// Renders the current name → value map of the registry as a YAML mapping.
pub fn render_values(fields: &Fields, lenses: &LensMap) -> Result<String> {
    let mut values = BTreeMap::new();
    for name in fields.names() {
        let all = fields.get_all(&name, lenses)?;
        let first = all
            .first()
            .ok_or_else(|| Error::not_found(format!("field {name:?} has no pointers")))?;
        values.insert(name, first.value.clone());
    }
    serde_yaml::to_string(&values).map_err(|e| Error::parse(e.to_string()))
}

/// Rewrites the frozen-original annotation of every manifest that already
/// carries it to the current field values.
pub fn freeze(set: &ManifestSet, lenses: &LensMap) -> Result<()> {
    let body = render_values(&set.fields, lenses)?;

    for m in &set.manifests.0 {
        if !m.annotations.borrow().contains_key(ORIGINAL_ANNO) {
            continue;
        }
        let expr = format!(
            "~(yamls)/{}/metadata/annotations/{}",
            m.stream_pos,
            ORIGINAL_ANNO.replace('/', "~1")
        );
        let contents = m.file.borrow().contents();
        let next = lenses.apply(&contents, vec![Mapping::new(expr, body.clone())])?;
        m.file.borrow_mut().set_contents(&next);
    }
    Ok(())
}

/// The frozen name → value snapshot, merged first-manifest-wins across the
/// set.
pub fn find_original(set: &ManifestSet) -> Result<BTreeMap<String, String>> {
    let mut res = BTreeMap::new();
    let mut found = false;

    for m in &set.manifests.0 {
        let anns = m.annotations.borrow();
        let body = match anns.get(ORIGINAL_ANNO) {
            Some(b) => b.clone(),
            None => continue,
        };
        found = true;
        let parsed: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&body)
            .map_err(|e| Error::parse(format!("bad {ORIGINAL_ANNO} annotation: {e}")))?;
        for (k, v) in parsed {
            res.entry(k).or_insert_with(|| scalar_string(&v));
        }
    }

    if !found {
        return Err(Error::not_found(format!(
            "no manifest carries the {ORIGINAL_ANNO} annotation"
        )));
    }
    Ok(res)
}

fn scalar_string(v: &serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// The fields whose current value differs from the frozen original.
pub fn diff(set: &ManifestSet, lenses: &LensMap) -> Result<BTreeMap<String, String>> {
    let original = find_original(set)?;

    let mut dirty = BTreeMap::new();
    for name in set.fields.names() {
        let values = set.fields.get_all(&name, lenses)?;
        let current = match values.first() {
            Some(v) => v.value.clone(),
            None => continue,
        };
        if original.get(&name).map(String::as_str).unwrap_or("") != current {
            dirty.insert(name, current);
        }
    }
    Ok(dirty)
}

/// Three-way pull: applies the local diff against its frozen original onto
/// the upstream set, then adopts the upstream buffer as the local file's
/// in-memory content. Restricted to a single-file local input.
pub fn pull(local: &ManifestSet, upstream: &ManifestSet, lenses: &LensMap) -> Result<()> {
    let local_files = local.manifests.files();
    if local_files.len() != 1 {
        return Err(Error::syntax(format!(
            "pull/merge with {} files currently not supported",
            local_files.len()
        )));
    }

    let dirty = diff(local, lenses)?;

    let mut batch = upstream.fields.new_edit_batch(lenses);
    for (name, value) in &dirty {
        batch.set(name, value)?;
    }
    batch.commit()?;

    let upstream_files = upstream.manifests.files();
    let merged = upstream_files
        .first()
        .ok_or_else(|| Error::not_found("upstream contains no manifests"))?
        .borrow()
        .contents();
    local_files[0].borrow_mut().set_contents(&merged);
    Ok(())
}
