//! Creates the wide `data` table, or widens it when new estimate columns
//! appear. Columns are only ever added, never dropped.

use std::collections::HashSet;
use tracing::{info, instrument};

use super::EstimateColumnSet;
use crate::error::Result;
use crate::process::batch::{quote_ident, quote_literal};
use crate::query::QueryService;

pub const DATA_TABLE: &str = "data";

#[instrument(level = "info", skip(service, columns), fields(columns = columns.len()))]
pub async fn ensure_data_table<S: QueryService>(
    service: &S,
    columns: &EstimateColumnSet,
) -> Result<()> {
    let existing = existing_columns(service).await?;

    if existing.is_empty() {
        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {DATA_TABLE} (\n  id TEXT PRIMARY KEY");
        for id in columns.iter() {
            ddl.push_str(",\n  ");
            ddl.push_str(&quote_ident(id));
            ddl.push_str(" DOUBLE");
        }
        ddl.push_str("\n);");
        service.query(&ddl).await?;
        info!("created {} table with {} columns", DATA_TABLE, columns.len());
        return Ok(());
    }

    let missing: Vec<&str> = columns.iter().filter(|id| !existing.contains(*id)).collect();
    for id in &missing {
        let ddl = format!(
            "ALTER TABLE {DATA_TABLE} ADD COLUMN IF NOT EXISTS {} DOUBLE;",
            quote_ident(id)
        );
        service.query(&ddl).await?;
    }
    info!(
        "{} table has {} columns, added {}",
        DATA_TABLE,
        existing.len() - 1 + missing.len(),
        missing.len()
    );
    Ok(())
}

/// Column names of `data`, empty when the table does not exist yet.
pub async fn existing_columns<S: QueryService>(service: &S) -> Result<HashSet<String>> {
    let sql = format!(
        "SELECT column_name FROM information_schema.columns WHERE table_name = {};",
        quote_literal(DATA_TABLE)
    );
    let rows = service.query(&sql).await?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("column_name").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect())
}

/// Empty `data` so a forced run reloads everything. The schema stays.
pub async fn truncate_data<S: QueryService>(service: &S) -> Result<()> {
    if !existing_columns(service).await?.is_empty() {
        service.query(&format!("DELETE FROM {DATA_TABLE};")).await?;
        info!("truncated {} table", DATA_TABLE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duck::LocalQueryService;
    use anyhow::Result;

    fn set(ids: &[&str]) -> EstimateColumnSet {
        let mut s = EstimateColumnSet::new();
        for id in ids {
            s.insert(*id);
        }
        s
    }

    #[tokio::test]
    async fn creates_wide_table_once() -> Result<()> {
        let svc = LocalQueryService::open_in_memory()?;
        ensure_data_table(&svc, &set(&["B01001_001E", "B01001_002E"])).await?;
        ensure_data_table(&svc, &set(&["B01001_001E", "B01001_002E"])).await?;

        let cols = existing_columns(&svc).await?;
        assert_eq!(cols.len(), 3);
        assert!(cols.contains("id"));
        assert!(cols.contains("B01001_002E"));
        Ok(())
    }

    #[tokio::test]
    async fn truncate_keeps_schema() -> Result<()> {
        let svc = LocalQueryService::open_in_memory()?;
        truncate_data(&svc).await?;
        ensure_data_table(&svc, &set(&["X_001E"])).await?;
        svc.query("INSERT INTO data VALUES ('g', 1)").await?;

        truncate_data(&svc).await?;
        assert!(svc.query("SELECT * FROM data").await?.is_empty());
        assert_eq!(existing_columns(&svc).await?.len(), 2);
        Ok(())
    }
}
