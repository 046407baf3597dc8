// src/process/mod.rs

pub mod batch;
pub mod columns;
pub mod dialect;
pub mod lines;
pub mod loader;

use glob::glob;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

use crate::error::{CensusError, Result};
use dialect::Dialect;
use lines::LineStream;

pub use loader::{FileFailure, FileStats, IngestOptions, IngestReport, Loader};

/// One extracted data file waiting to be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name without directories; the key recorded in the ledger.
    pub name: String,
    pub path: PathBuf,
    pub dialect: Dialect,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dialect = Dialect::from_path(&path)
            .ok_or_else(|| CensusError::UnsupportedSource(path.display().to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CensusError::UnsupportedSource(path.display().to_string()))?;
        Ok(Self {
            name,
            path,
            dialect,
        })
    }
}

/// Every `.csv` and `.dat` file under `raw_dir`, recursively, sorted by path.
/// Shapefiles and other collaborator artifacts next to them are ignored.
pub fn discover_sources(raw_dir: impl AsRef<Path>) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for ext in ["csv", "dat"] {
        let pattern = format!("{}/**/*.{}", raw_dir.as_ref().display(), ext);
        let paths = glob(&pattern).map_err(|e| CensusError::UnsupportedSource(e.to_string()))?;
        for entry in paths {
            let path = entry.map_err(|e| CensusError::Io(e.into_error()))?;
            if path.is_file() {
                sources.push(SourceFile::new(path)?);
            }
        }
    }
    sources.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = sources.len(), "discovered source files");
    Ok(sources)
}

pub async fn open_lines(path: &Path) -> Result<LineStream<File>> {
    let file = File::open(path).await?;
    Ok(LineStream::new(file))
}

/// Tokenized first line of `path`, or `None` for an empty file.
pub async fn read_header(path: &Path, dialect: Dialect) -> Result<Option<Vec<String>>> {
    let mut lines = open_lines(path).await?;
    Ok(lines
        .next_line()
        .await?
        .map(|line| dialect.split_line(&line)))
}
