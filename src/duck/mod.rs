use duckdb::{types::ValueRef, AccessMode, Config, Connection, OptionalExt, Statement};
use serde_json::{Number, Value};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, instrument};

use crate::error::{CensusError, Result};
use crate::query::{QueryService, Row};

/// How to open the database file.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Open without the write lock, so several readers can share the file.
    pub read_only: bool,
    /// Extensions to `INSTALL` and `LOAD` right after opening, e.g. `spatial`.
    pub extensions: Vec<String>,
}

/// Runs statements against an embedded DuckDB database.
///
/// The connection sits behind a mutex and every statement runs on the
/// blocking pool, so the lock is never held across an `.await`. Writes are
/// visible to the next query on the same service.
#[derive(Clone)]
pub struct LocalQueryService {
    conn: Arc<Mutex<Connection>>,
}

impl LocalQueryService {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>, opts: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let mode = if opts.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };
        let config = Config::default().access_mode(mode)?;
        let conn = Connection::open_with_flags(path, config).map_err(|e| classify_open_error(path, e))?;
        info!(path = %path.display(), read_only = opts.read_only, "opened store");
        Self::from_connection(conn, &opts.extensions)
    }

    /// Open a DuckDB in‐memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, &[])
    }

    fn from_connection(conn: Connection, extensions: &[String]) -> Result<Self> {
        for ext in extensions {
            load_extension(&conn, ext)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl QueryService for LocalQueryService {
    #[instrument(level = "trace", skip(self, sql), fields(len = sql.len()))]
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            run_statement(&conn, &sql)
        })
        .await?
    }
}

/// `INSTALL` and `LOAD` one extension unless it is already loaded, which is
/// the case for extensions linked into the library.
fn load_extension(conn: &Connection, ext: &str) -> Result<()> {
    let loaded: Option<bool> = conn
        .query_row(
            "SELECT loaded FROM duckdb_extensions() WHERE extension_name = ?",
            [ext],
            |row| row.get(0),
        )
        .optional()?;
    if loaded == Some(true) {
        debug!(extension = %ext, "extension already loaded");
        return Ok(());
    }
    debug!(extension = %ext, "loading extension");
    conn.execute_batch(&format!("INSTALL {ext}; LOAD {ext};"))?;
    Ok(())
}

fn run_statement(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut names: Option<Vec<String>> = None;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let names = names.get_or_insert_with(|| {
            let stmt: &Statement<'_> = row.as_ref();
            stmt.column_names()
        });
        let mut obj = Row::new();
        for (i, name) in names.iter().enumerate() {
            obj.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(obj);
    }
    Ok(out)
}

fn to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => float(i as f64),
        ValueRef::Float(f) => float(f as f64),
        ValueRef::Double(f) => float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        other => Value::String(format!("{other:?}")),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// DuckDB refuses a second writer with an IO error mentioning the file lock.
pub fn is_lock_conflict(message: &str) -> bool {
    message.contains("Could not set lock") || message.contains("Conflicting lock")
}

fn classify_open_error(path: &Path, e: duckdb::Error) -> CensusError {
    if is_lock_conflict(&e.to_string()) {
        CensusError::StoreBusy {
            path: PathBuf::from(path),
        }
    } else {
        CensusError::Store(e)
    }
}
