use anyhow::{bail, Context, Result};
use censusdb::{
    config::{Cli, Command, IngestArgs, IngestConfig, QueryArgs, StoreArgs},
    process::{discover_sources, Loader},
    Census, CensusError, ColumnSelector, Encoder, QueryBackend, RunOptions,
};
use clap::Parser;
use std::fs;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,censusdb=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) parse args ───────────────────────────────────────────────
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Ingest(IngestArgs::default()));

    match command {
        Command::Ingest(args) => ingest(&cli.store, &args).await,
        Command::Query(args) => query(&cli.store, &args).await,
        Command::Aliases => {
            for path in Encoder::housing()?.paths() {
                println!("{path}");
            }
            Ok(())
        }
    }
}

fn connect(store: &StoreArgs, read_only: bool) -> Result<QueryBackend> {
    match store.connect(read_only) {
        Err(CensusError::StoreBusy { path }) => {
            eprintln!(
                "{} is locked by another process (is the query server running?). \
                 Re-run with --live to go through it.",
                path.display()
            );
            bail!("store busy")
        }
        other => other.with_context(|| format!("opening {}", store.db_path().display())),
    }
}

async fn ingest(store: &StoreArgs, args: &IngestArgs) -> Result<()> {
    let cfg = IngestConfig::from_args(store, args)?;
    info!(raw = %cfg.raw_dir.display(), db = %cfg.db_path.display(), "ingest");

    if !store.live {
        if let Some(parent) = cfg.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    let backend = connect(store, false)?;

    let sources = discover_sources(&cfg.raw_dir)
        .with_context(|| format!("scanning {}", cfg.raw_dir.display()))?;
    if sources.is_empty() {
        warn!("no .csv or .dat files under {}", cfg.raw_dir.display());
        return Ok(());
    }
    info!("{} source files", sources.len());

    let start = Instant::now();
    let report = Loader::new(&backend, cfg.options).run(&sources).await?;
    info!(
        "loaded {} files ({} rows), skipped {}, failed {} in {:?}",
        report.loaded.len(),
        report.rows(),
        report.skipped.len(),
        report.failed.len(),
        start.elapsed()
    );

    for failure in &report.failed {
        error!("{}: {}", failure.name, failure.error);
    }
    if !report.failed.is_empty() {
        bail!("{} of {} files failed to load", report.failed.len(), sources.len());
    }
    Ok(())
}

async fn query(store: &StoreArgs, args: &QueryArgs) -> Result<()> {
    let census = Census::new(connect(store, true)?, Encoder::housing()?);

    let mut columns: Vec<ColumnSelector> = args.columns.iter().cloned().map(Into::into).collect();
    for alias in &args.aliases {
        let keys: Vec<&str> = alias.keys.iter().map(String::as_str).collect();
        let items = census
            .encoder()
            .resolve(&alias.path, &keys)
            .with_context(|| format!("resolving alias {}", alias.path))?;
        columns.extend(items.into_iter().map(ColumnSelector::Alias));
    }
    if columns.is_empty() {
        bail!("nothing to select: pass --column or --alias");
    }

    let opts = RunOptions {
        places: args.places.clone(),
        columns,
        transpose: args.transpose,
        raw_ids: args.raw_ids,
    };
    let result = census.run(&opts).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
