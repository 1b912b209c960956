//! Expansion of path arguments into openable sources.
//!
//! A path argument may be a plain file, a directory (whose `.yaml`, `.yml`
//! and `.json` entries are taken), a glob pattern, or `-` for the standard
//! input stream.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::buffer::FileSource;
use crate::error::{Error, Errors, Result};

const MANIFEST_EXTS: [&str; 3] = ["yaml", "yml", "json"];

/// Expands every path argument, preserving argument order; entries within a
/// directory or glob are sorted.
pub fn expand_paths(paths: &[String]) -> Result<Vec<FileSource>> {
    let mut res = Vec::new();
    let mut errs = Errors::new();

    for p in paths {
        if p == "-" {
            res.push(FileSource::Stdio);
            continue;
        }
        match expand_one(p) {
            Ok(sources) => res.extend(sources),
            Err(e) => errs.push(e),
        }
    }

    errs.into_result()?;
    Ok(res)
}

fn expand_one(p: &str) -> Result<Vec<FileSource>> {
    let path = Path::new(p);

    if path.is_dir() {
        return Ok(manifests_in_dir(path).into_iter().map(FileSource::Path).collect());
    }
    if path.is_file() {
        return Ok(vec![FileSource::Path(path.to_path_buf())]);
    }
    if p.contains(|c| matches!(c, '*' | '?' | '[')) {
        let mut files: Vec<PathBuf> = glob::glob(p)
            .map_err(|e| Error::syntax(format!("bad glob {p:?}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        return Ok(files.into_iter().map(FileSource::Path).collect());
    }

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such file or directory: {p}"),
    )))
}

/// All potential manifest files directly inside a directory, sorted by
/// name.
fn manifests_in_dir(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MANIFEST_EXTS.contains(&e))
        })
        .collect();
    files.sort();
    files
}
