//! fieldlens: edit annotated fields of structured manifests in place.
//!
//! Manifest authors declare named parameters ("fields") through reserved
//! annotations whose values are extended JSON Pointer expressions, possibly
//! chaining format lenses (`~(base64)`, `~(toml)`, …) to reach scalars
//! nested inside other encodings. This crate reads those fields, sets them
//! while preserving the surrounding formatting byte for byte, diffs them
//! against a frozen snapshot, and merges upstream revisions.
//!
//! # Architecture
//!
//! Everything compiles down to one primitive: a sorted, non-overlapping set
//! of character-span replacements applied in a single pass over a buffer
//! ([`splice`]). Intelligence lives in span acquisition, not in the
//! application logic: per-format lenses resolve pointers to spans
//! ([`lens`]) and the quote preserver keeps YAML scalars in the style
//! their author chose ([`yaml::quote`]). The [`fields`] registry batches
//! edits across documents and files; [`buffer`] commits buffers
//! atomically.
//!
//! Parsed trees are ephemeral: every position they carry is valid only
//! until the next commit to their buffer.

pub mod buffer;
pub mod error;
pub mod fields;
pub mod lens;
pub mod manifest;
pub mod paths;
pub mod splice;
pub mod yaml;

pub use buffer::{FileSource, ShadowFile};
pub use error::{Error, Errors, Result};
pub use fields::{diff, freeze, open_set, pull, EditBatch, Field, Fields, ManifestSet, Pointer};
pub use lens::{Lens, LensMap, Mapping};
pub use manifest::{Manifest, Manifests, FIELD_ANNO_PREFIX, ORIGINAL_ANNO};
pub use splice::Span;
