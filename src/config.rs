//! Command-line and environment configuration for the `censusdb` binary.
//!
//! Every flag that names a location or a port also reads an environment
//! variable, so a deployment can be configured without arguments:
//! `CENSUS_DATA_DIR`, `CENSUS_PORT`, `CENSUS_GEOID`.

use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::{path::PathBuf, str::FromStr};

use crate::duck::{LocalQueryService, OpenOptions};
use crate::error::Result;
use crate::process::{loader::DEFAULT_BATCH_SIZE, IngestOptions};
use crate::query::{QueryBackend, RemoteQueryService};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Parser, Debug)]
#[command(
    name = "censusdb",
    about = "Load census extracts into DuckDB and query them by name"
)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Defaults to `ingest`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load every new .csv/.dat file under the raw directory.
    Ingest(IngestArgs),
    /// Read values for places and columns.
    Query(QueryArgs),
    /// List every callable alias path.
    Aliases,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Root holding `raw/` and the database file.
    #[arg(long, env = "CENSUS_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
    /// Database file, defaults to `<data-dir>/census.db`.
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
    /// Go through the running query server instead of opening the file.
    #[arg(long)]
    pub live: bool,
    /// Port of the query server used with `--live`.
    #[arg(long, env = "CENSUS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// DuckDB extension to install and load after opening, e.g. `spatial`.
    /// Repeatable.
    #[arg(long = "extension", value_name = "NAME")]
    pub extensions: Vec<String>,
}

impl StoreArgs {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("census.db"))
    }

    pub fn remote_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn open_options(&self, read_only: bool) -> OpenOptions {
        OpenOptions {
            read_only,
            extensions: self.extensions.clone(),
        }
    }

    /// The remote service with `--live`, otherwise the database file.
    pub fn connect(&self, read_only: bool) -> Result<QueryBackend> {
        if self.live {
            return Ok(RemoteQueryService::new(self.remote_url()).into());
        }
        let opts = self.open_options(read_only);
        Ok(LocalQueryService::open(self.db_path(), &opts)?.into())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Empty `data` and the file ledger first, then reload everything.
    #[arg(long)]
    pub force: bool,
    /// Rows per merge-insert statement.
    #[arg(long = "batch-size", value_name = "ROWS", value_parser = parse_batch_size)]
    pub batch_size: Option<usize>,
    /// Only load rows whose GeoID matches this pattern.
    #[arg(long, env = "CENSUS_GEOID", value_name = "REGEX")]
    pub geoid: Option<String>,
}

impl IngestArgs {
    pub fn options(&self) -> Result<IngestOptions> {
        Ok(IngestOptions {
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            geoid_filter: self.geoid.as_deref().map(Regex::new).transpose()?,
            force: self.force,
        })
    }
}

/// Resolved settings for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub raw_dir: PathBuf,
    pub db_path: PathBuf,
    pub options: IngestOptions,
}

impl IngestConfig {
    pub fn from_args(store: &StoreArgs, args: &IngestArgs) -> Result<Self> {
        Ok(Self {
            raw_dir: store.raw_dir(),
            db_path: store.db_path(),
            options: args.options()?,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// GeoIDs to read, comma separated or repeated.
    #[arg(long = "place", short = 'p', value_delimiter = ',', required = true)]
    pub places: Vec<String>,
    /// Raw ColumnIDs.
    #[arg(long = "column", short = 'c', value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Alias path, optionally with keys: `housing.units.occupied:byOwner,byRenter`.
    #[arg(long = "alias", short = 'a')]
    pub aliases: Vec<AliasRequest>,
    #[arg(long)]
    pub transpose: bool,
    /// Report aliases under their ColumnID.
    #[arg(long = "raw-ids")]
    pub raw_ids: bool,
}

/// `path[:key,key...]` as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRequest {
    pub path: String,
    pub keys: Vec<String>,
}

impl FromStr for AliasRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (path, keys) = match s.split_once(':') {
            Some((path, keys)) => (
                path,
                keys.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (s, Vec::new()),
        };
        let path = path.trim();
        if path.is_empty() {
            return Err(format!("empty alias path in '{s}'"));
        }
        Ok(Self {
            path: path.to_string(),
            keys,
        })
    }
}

fn parse_batch_size(value: &str) -> std::result::Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|err| format!("invalid batch size '{value}': {err}"))?;
    if parsed == 0 {
        return Err("batch size must be greater than zero".into());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_under_data_dir() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["censusdb", "--data-dir", "/srv/census", "ingest"])?;
        assert_eq!(cli.store.raw_dir(), PathBuf::from("/srv/census/raw"));
        assert_eq!(cli.store.db_path(), PathBuf::from("/srv/census/census.db"));
        let Some(Command::Ingest(args)) = cli.command else {
            panic!("expected ingest");
        };
        let cfg = IngestConfig::from_args(&cli.store, &args)?;
        assert_eq!(cfg.options.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!cfg.options.force);
        Ok(())
    }

    #[test]
    fn ingest_flags() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "censusdb",
            "--port",
            "8080",
            "ingest",
            "--force",
            "--batch-size",
            "500",
            "--geoid",
            "^06",
        ])?;
        assert_eq!(cli.store.remote_url(), "http://localhost:8080");
        assert!(cli.store.open_options(false).extensions.is_empty());
        let Some(Command::Ingest(args)) = cli.command else {
            panic!("expected ingest");
        };
        let opts = args.options()?;
        assert!(opts.force);
        assert_eq!(opts.batch_size, 500);
        assert!(opts.geoid_filter.as_ref().is_some_and(|r| r.is_match("0600001")));

        assert!(Cli::try_parse_from(["censusdb", "ingest", "--batch-size", "0"]).is_err());
        Ok(())
    }

    #[test]
    fn extensions_reach_the_store() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("census.db");
        let cli = Cli::try_parse_from([
            "censusdb",
            "--db",
            db.to_str().unwrap(),
            "--extension",
            "json",
            "--extension",
            "spatial",
            "ingest",
        ])?;
        let opts = cli.store.open_options(true);
        assert_eq!(opts.extensions, vec!["json", "spatial"]);
        assert!(opts.read_only);

        let only_json = StoreArgs {
            extensions: vec!["json".into()],
            ..cli.store
        };
        assert!(matches!(only_json.connect(false)?, QueryBackend::Local(_)));
        Ok(())
    }

    #[test]
    fn bad_geoid_pattern_is_an_error() {
        let args = IngestArgs {
            geoid: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            args.options(),
            Err(crate::error::CensusError::Pattern(_))
        ));
    }

    #[test]
    fn query_arguments() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "censusdb",
            "--live",
            "query",
            "-p",
            "0600001,0600002",
            "-c",
            "B01001_001E",
            "-a",
            "housing.units",
            "-a",
            "housing.units.occupied:byOwner, byRenter",
            "--transpose",
        ])?;
        assert!(cli.store.live);
        let Some(Command::Query(q)) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(q.places, vec!["0600001", "0600002"]);
        assert_eq!(q.columns, vec!["B01001_001E"]);
        assert_eq!(q.aliases[0].keys.len(), 0);
        assert_eq!(
            q.aliases[1],
            AliasRequest {
                path: "housing.units.occupied".into(),
                keys: vec!["byOwner".into(), "byRenter".into()],
            }
        );
        assert!(q.transpose);
        assert!(!q.raw_ids);
        Ok(())
    }
}
