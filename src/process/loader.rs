use regex::Regex;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, instrument, warn};

use super::{
    batch::{parse_number, UpsertBatch},
    columns::{classify_header, EstimateColumn},
    dialect::Dialect,
    lines::LineStream,
    open_lines, SourceFile,
};
use crate::error::{CensusError, Result};
use crate::history::FileLedger;
use crate::query::QueryService;
use crate::schema::{ensure_data_table, evolution::truncate_data, synthesize_schema, EstimateColumnSet};

pub const DEFAULT_BATCH_SIZE: usize = 4000;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Rows per merge-insert statement.
    pub batch_size: usize,
    /// Only rows whose GeoID matches are loaded.
    pub geoid_filter: Option<Regex>,
    /// Empty `data` and the ledger before loading.
    pub force: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            geoid_filter: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub columns: usize,
    pub rows: u64,
    pub filtered: u64,
    pub batches: u64,
}

#[derive(Debug)]
pub struct FileFailure {
    pub name: String,
    pub error: CensusError,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub loaded: Vec<(String, FileStats)>,
    pub skipped: Vec<String>,
    pub failed: Vec<FileFailure>,
}

impl IngestReport {
    pub fn rows(&self) -> u64 {
        self.loaded.iter().map(|(_, s)| s.rows).sum()
    }
}

/// Streams source files into the `data` table.
///
/// Files are processed one after another and each file's batches are
/// flushed in order, so this is the only writer for the duration of a run.
pub struct Loader<'a, S> {
    service: &'a S,
    ledger: FileLedger<'a, S>,
    opts: IngestOptions,
}

impl<'a, S: QueryService> Loader<'a, S> {
    pub fn new(service: &'a S, opts: IngestOptions) -> Self {
        Self {
            service,
            ledger: FileLedger::new(service),
            opts,
        }
    }

    pub fn ledger(&self) -> &FileLedger<'a, S> {
        &self.ledger
    }

    /// Schema pass plus load pass over `sources`.
    pub async fn run(&self, sources: &[SourceFile]) -> Result<IngestReport> {
        self.prepare(sources).await?;
        Ok(self.load_all(sources).await)
    }

    /// Creates the ledger, resets the store when forced, and widens `data`
    /// to every estimate column found in `sources`. Must finish before any
    /// row is loaded.
    pub async fn prepare(&self, sources: &[SourceFile]) -> Result<EstimateColumnSet> {
        self.ledger.ensure().await?;
        if self.opts.force {
            info!("force: truncating data and file ledger");
            truncate_data(self.service).await?;
            self.ledger.clear().await?;
        }
        let columns = synthesize_schema(sources).await;
        ensure_data_table(self.service, &columns).await?;
        Ok(columns)
    }

    /// Loads every source not yet in the ledger. A failing file is logged
    /// and reported; the remaining files still load.
    pub async fn load_all(&self, sources: &[SourceFile]) -> IngestReport {
        let mut report = IngestReport::default();
        let total = sources.len();

        for (i, src) in sources.iter().enumerate() {
            match self.ledger.contains(&src.name).await {
                Ok(true) => {
                    info!("Skipping {} because it's already in the files table", src.name);
                    report.skipped.push(src.name.clone());
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(file = %src.name, error = %e, "ledger lookup failed");
                    report.failed.push(FileFailure {
                        name: src.name.clone(),
                        error: e,
                    });
                    continue;
                }
            }

            info!("Loading {}/{}: {}", i + 1, total, src.name);
            let loaded = match self.load_source(src).await {
                Ok(stats) => self.ledger.record(&src.name).await.map(|_| stats),
                Err(e) => Err(e),
            };
            match loaded {
                Ok(stats) => report.loaded.push((src.name.clone(), stats)),
                Err(e) => {
                    error!(file = %src.name, error = %e, "load failed");
                    report.failed.push(FileFailure {
                        name: src.name.clone(),
                        error: e,
                    });
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            rows = report.rows(),
            "ingest finished"
        );
        report
    }

    /// Loads one file without consulting or updating the ledger.
    pub async fn load_source(&self, src: &SourceFile) -> Result<FileStats> {
        let lines = open_lines(&src.path).await?;
        self.load_lines(&src.name, src.dialect, lines).await
    }

    /// Loads an arbitrary byte stream in the given dialect.
    pub async fn load_reader<R: AsyncRead + Unpin>(
        &self,
        name: &str,
        dialect: Dialect,
        reader: R,
    ) -> Result<FileStats> {
        self.load_lines(name, dialect, LineStream::new(reader)).await
    }

    #[instrument(level = "info", skip_all, fields(file = %name, dialect = dialect.as_str()))]
    async fn load_lines<R: AsyncRead + Unpin>(
        &self,
        name: &str,
        dialect: Dialect,
        mut lines: LineStream<R>,
    ) -> Result<FileStats> {
        let start = Instant::now();
        let mut stats = FileStats::default();

        let Some(header) = lines.next_line().await? else {
            warn!("empty file, nothing to load");
            return Ok(stats);
        };
        let columns = classify_header(&dialect.split_line(&header), dialect);
        stats.columns = columns.len();
        info!("-- {} columns in {}", columns.len(), name);

        let batch_size = self.opts.batch_size.max(1);
        let mut batch = UpsertBatch::new(&columns, batch_size);
        let mut label_pending = dialect.has_label_row();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let fields = dialect.split_line(&line);

            if label_pending {
                label_pending = false;
                if is_label_row(&fields, &columns) {
                    debug!("skipped label row");
                    continue;
                }
            }

            let Some(geo_id) = fields.first().filter(|g| !g.is_empty()) else {
                continue;
            };
            if let Some(filter) = &self.opts.geoid_filter {
                if !filter.is_match(geo_id) {
                    stats.filtered += 1;
                    continue;
                }
            }

            let values = columns
                .iter()
                .map(|c| fields.get(c.index).and_then(|v| parse_number(v)))
                .collect();
            batch.push(geo_id.clone(), values);
            stats.rows += 1;

            if batch.len() >= batch_size {
                self.flush(name, &mut batch, &mut stats).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(name, &mut batch, &mut stats).await?;
        }

        info!(
            "-- Loaded {} with {} rows in {:?}",
            name,
            stats.rows,
            start.elapsed()
        );
        Ok(stats)
    }

    async fn flush(&self, name: &str, batch: &mut UpsertBatch, stats: &mut FileStats) -> Result<()> {
        self.service.query(&batch.to_sql()).await?;
        stats.batches += 1;
        debug!("  -- Inserted {} rows for {}", batch.len(), name);
        batch.clear();
        Ok(())
    }
}

/// The line after a `.csv` header normally holds human-readable labels
/// (`Geography`, `Estimate!!Total`, ...). It is recognised by a first field
/// with no digit in it, where every GeoID has some, and by carrying no
/// numeric value in any estimate column. A data row whose estimates are all
/// suppressed still has its GeoID and is loaded.
fn is_label_row(fields: &[String], columns: &[EstimateColumn]) -> bool {
    let geo_like = fields
        .first()
        .is_some_and(|g| g.bytes().any(|b| b.is_ascii_digit()));
    !geo_like
        && columns
            .iter()
            .all(|c| fields.get(c.index).map_or(true, |v| parse_number(v).is_none()))
}
