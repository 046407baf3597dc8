// src/schema/mod.rs

pub mod evolution;

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

use crate::process::{columns::classify_header, dialect::Dialect, read_header, SourceFile};

pub use evolution::ensure_data_table;

/// How many headers are read at once while synthesizing.
const HEADER_FANOUT: usize = 8;

/// Union of every estimate ColumnID seen across the source headers.
/// Only grows; iteration is sorted so generated DDL is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstimateColumnSet {
    ids: BTreeSet<String>,
}

impl EstimateColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one tokenized header and add its estimate ids.
    /// Returns how many ids were new.
    pub fn extend_from_header(&mut self, header: &[String], dialect: Dialect) -> usize {
        let before = self.ids.len();
        self.ids
            .extend(classify_header(header, dialect).into_iter().map(|c| c.id));
        self.ids.len() - before
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Reads only the header line of every source and unions their estimate
/// columns. Headers are read concurrently; a source that cannot be read is
/// logged and skipped here, and reported again when the loader reaches it.
#[instrument(level = "info", skip(sources), fields(files = sources.len()))]
pub async fn synthesize_schema(sources: &[SourceFile]) -> EstimateColumnSet {
    let headers: Vec<_> = stream::iter(sources)
        .map(|src| async move { (src, read_header(&src.path, src.dialect).await) })
        .buffered(HEADER_FANOUT)
        .collect()
        .await;

    let mut set = EstimateColumnSet::new();
    for (src, header) in headers {
        match header {
            Ok(Some(header)) => {
                let added = set.extend_from_header(&header, src.dialect);
                debug!(file = %src.name, added, "scanned header");
            }
            Ok(None) => warn!(file = %src.name, "empty file, no header"),
            Err(e) => warn!(file = %src.name, error = %e, "could not read header"),
        }
    }

    info!("{} estimate columns across {} files", set.len(), sources.len());
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    #[test]
    fn unions_headers_across_dialects() {
        let mut set = EstimateColumnSet::new();
        let csv: Vec<String> = ["GEO_ID", "NAME", "B01001_001E", "B01001_001M"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let dat: Vec<String> = ["GEO_ID", "B01001_E001", "B25001_E001", "B25001_M001"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(set.extend_from_header(&csv, Dialect::QuotedComma), 1);
        assert_eq!(set.extend_from_header(&dat, Dialect::Pipe), 1);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["B01001_001E", "B25001_001E"]
        );
    }

    #[tokio::test]
    async fn synthesizes_from_files_and_skips_unreadable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("a.csv"),
            "\"GEO_ID\",\"NAME\",\"B01001_001E\"\n\"Geography\",\"Name\",\"Total\"\n",
        )?;
        fs::write(dir.path().join("b.dat"), "GEO_ID|B19013_E001|B19013_M001\n1|2|3\n")?;
        fs::write(dir.path().join("empty.csv"), "")?;

        let mut sources = crate::process::discover_sources(dir.path())?;
        sources.push(SourceFile::new(dir.path().join("missing.csv"))?);

        let set = synthesize_schema(&sources).await;
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["B01001_001E", "B19013_001E"]);
        Ok(())
    }
}
