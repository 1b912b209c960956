//! In-memory shadow copies of manifest files.
//!
//! A [`ShadowFile`] holds the decoded content of one source as a sequence of
//! Unicode scalar values, so every position used by the splice engine is a
//! character offset. Mutations stay in memory until [`ShadowFile::commit`]
//! persists them, atomically for filesystem targets.

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Where a shadow file comes from and where a commit sends it back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A filesystem path; commits rewrite it atomically.
    Path(PathBuf),
    /// Standard input on open, standard output on commit.
    Stdio,
    /// Pre-resident content under a display name; commits are a no-op.
    Memory(String),
}

impl FileSource {
    pub fn display_name(&self) -> String {
        match self {
            FileSource::Path(p) => p.display().to_string(),
            FileSource::Stdio => "-".to_string(),
            FileSource::Memory(name) => name.clone(),
        }
    }
}

/// An in-memory copy of a file that can be committed back to its source.
#[derive(Debug)]
pub struct ShadowFile {
    source: FileSource,
    buf: Vec<char>,
}

impl ShadowFile {
    /// Opens a source and decodes it into a character buffer.
    ///
    /// All encodings YAML allows are accepted: UTF-8 and both UTF-16
    /// variants, detected by byte-order mark. Ill-formed sequences are
    /// replaced with U+FFFD. The output encoding is always UTF-8.
    pub fn open(source: FileSource) -> Result<Self> {
        let bytes = match &source {
            FileSource::Path(p) => fs::read(p)?,
            FileSource::Stdio => {
                let stdin = io::stdin();
                if stdin.is_terminal() {
                    eprintln!(
                        "(reading manifests from standard input; hit ctrl-c if this is not what you wanted)"
                    );
                }
                let mut buf = Vec::new();
                stdin.lock().read_to_end(&mut buf)?;
                buf
            }
            FileSource::Memory(name) => {
                return Err(Error::not_found(format!("memory source {name:?} has no content")))
            }
        };
        Ok(Self::from_bytes(source, &bytes))
    }

    /// Builds a shadow file from pre-resident bytes, applying the same
    /// BOM-aware decoding as [`ShadowFile::open`].
    pub fn from_bytes(source: FileSource, bytes: &[u8]) -> Self {
        let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
        ShadowFile {
            source,
            buf: text.chars().collect(),
        }
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn name(&self) -> String {
        self.source.display_name()
    }

    /// Redirects the commit target to standard output, leaving the buffer
    /// untouched. Used by `--stdout` to suppress in-place writes.
    pub fn redirect_to_stdout(&mut self) {
        self.source = FileSource::Stdio;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn contents(&self) -> String {
        self.buf.iter().collect()
    }

    /// Returns the text at `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<String> {
        if start > end || end > self.buf.len() {
            return Err(Error::OutOfBounds {
                index: end,
                len: self.buf.len(),
            });
        }
        Ok(self.buf[start..end].iter().collect())
    }

    /// Replaces `[start, end)` with `value` in place. Positions are
    /// validated, never corrected.
    pub fn splice(&mut self, start: usize, end: usize, value: &str) -> Result<()> {
        if start > end || end > self.buf.len() {
            return Err(Error::OutOfBounds {
                index: end,
                len: self.buf.len(),
            });
        }
        self.buf.splice(start..end, value.chars());
        Ok(())
    }

    /// Replaces the whole buffer.
    pub fn set_contents(&mut self, contents: &str) {
        self.buf = contents.chars().collect();
    }

    /// Reads the buffer, applies `f`, and replaces the buffer with the
    /// result, atomically in memory.
    pub fn transform<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let next = f(&self.contents())?;
        self.set_contents(&next);
        Ok(())
    }

    /// Persists the buffer to its source.
    ///
    /// Filesystem targets are written through a temporary file in the same
    /// directory, inheriting the permissions of a pre-existing destination,
    /// then renamed onto the target so a failed write never leaves a torn
    /// file. The stdio sentinel streams UTF-8 to standard output; memory
    /// sources are left alone.
    pub fn commit(&self) -> Result<()> {
        match &self.source {
            FileSource::Path(path) => {
                debug!(file = %path.display(), chars = self.buf.len(), "committing");
                atomic_write(path, self.contents().as_bytes())
            }
            FileSource::Stdio => {
                let mut out = io::stdout().lock();
                out.write_all(self.contents().as_bytes())?;
                out.flush()?;
                Ok(())
            }
            FileSource::Memory(_) => Ok(()),
        }
    }
}

/// Writes `content` to `path` via tempfile + rename in the same directory.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the permissions of an already-existing destination.
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    // On rename failure the temp file is removed by NamedTempFile's drop.
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
