//! Report discovery and text extraction.
//!
//! This module turns command-line paths into ordered document handles and
//! reads their text. Extraction is behind the `TextProvider` trait so the
//! analysis engine never touches the filesystem directly.

use crate::error::ExtractionError;
use crate::models::DocumentId;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A report waiting to be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub id: DocumentId,
    pub display_name: String,
    pub path: PathBuf,
}

/// Anything that can turn a document handle into plain text.
pub trait TextProvider {
    fn extract(&self, source: &DocumentSource) -> Result<String, ExtractionError>;
}

/// Reads UTF-8 text files and the text layer of PDFs.
#[derive(Debug, Clone)]
pub struct FileTextProvider {
    /// Maximum file size in bytes.
    pub max_file_size: u64,
}

impl Default for FileTextProvider {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl TextProvider for FileTextProvider {
    fn extract(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        let failed = |reason: String| ExtractionError::ExtractionFailed {
            document: source.display_name.clone(),
            reason,
        };

        let metadata = fs::metadata(&source.path).map_err(|e| failed(e.to_string()))?;
        if metadata.len() > self.max_file_size {
            return Err(failed(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                self.max_file_size
            )));
        }

        let bytes = fs::read(&source.path).map_err(|e| failed(e.to_string()))?;
        let text = if is_pdf(&source.path) {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| failed(format!("unreadable PDF: {:?}", e)))?
        } else {
            String::from_utf8(bytes).map_err(|_| failed("not valid UTF-8 text".to_string()))?
        };

        if text.trim().is_empty() {
            return Err(failed("no extractable text".to_string()));
        }

        Ok(text)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Expands files and directories into ordered document handles.
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    /// File extensions to include when walking directories.
    extensions: Vec<String>,
}

impl DocumentScanner {
    pub fn new(extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self { extensions }
    }

    /// Resolve `paths` in the order given.
    ///
    /// Files named explicitly are always included; directories are walked
    /// in sorted order and filtered by extension. Missing paths are errors.
    pub fn discover(&self, paths: &[PathBuf]) -> Result<Vec<DocumentSource>> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_dir() {
                let before = files.len();
                for entry in WalkDir::new(path).sort_by_file_name() {
                    let entry = entry
                        .with_context(|| format!("Failed to walk {}", path.display()))?;
                    if entry.file_type().is_file() && self.matches(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                if files.len() == before {
                    warn!("No reports found in {}", path.display());
                }
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                anyhow::bail!("Report path does not exist: {}", path.display());
            }
        }

        Ok(assign_ids(files))
    }

    fn matches(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            return false;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        self.extensions.contains(&ext)
    }
}

/// Derive ids from file names, suffixing `-2`, `-3`, ... on collisions.
///
/// A suffixed id is bumped again if another file already carries that
/// name, so every emitted id is unique.
fn assign_ids(files: Vec<PathBuf>) -> Vec<DocumentSource> {
    let names: Vec<String> = files
        .iter()
        .map(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string())
        })
        .collect();

    // Plain names are reserved up front so a later `report.txt-2` keeps its own name.
    let mut taken: HashSet<String> = HashSet::new();
    let mut reserved: HashSet<&str> = names.iter().map(String::as_str).collect();

    files
        .into_iter()
        .zip(names.iter())
        .map(|(path, name)| {
            let id = if taken.contains(name) {
                let mut n = 2;
                loop {
                    let candidate = format!("{}-{}", name, n);
                    if !taken.contains(&candidate) && !reserved.contains(candidate.as_str()) {
                        break candidate;
                    }
                    n += 1;
                }
            } else {
                reserved.remove(name.as_str());
                name.clone()
            };
            taken.insert(id.clone());
            debug!("Discovered report {} at {}", id, path.display());

            DocumentSource {
                id: DocumentId::new(id),
                display_name: name.clone(),
                path,
            }
        })
        .collect()
}
