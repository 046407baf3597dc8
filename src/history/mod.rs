// src/history/mod.rs

use tracing::{debug, info};

use crate::error::Result;
use crate::process::batch::quote_literal;
use crate::query::QueryService;

/// Records which source files have been fully loaded, in the `files` table of
/// the store itself. A file listed here is skipped on every later run.
pub struct FileLedger<'a, S> {
    service: &'a S,
}

impl<'a, S: QueryService> FileLedger<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Create the `files` table if this is a fresh store.
    pub async fn ensure(&self) -> Result<()> {
        self.service
            .query("CREATE TABLE IF NOT EXISTS files (name TEXT PRIMARY KEY);")
            .await?;
        debug!("files table ready");
        Ok(())
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        let sql = format!("SELECT name FROM files WHERE name = {};", quote_literal(name));
        Ok(!self.service.query(&sql).await?.is_empty())
    }

    /// Mark `name` as loaded. Recording the same name twice is a no-op.
    pub async fn record(&self, name: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO files (name) VALUES ({}) ON CONFLICT (name) DO NOTHING;",
            quote_literal(name)
        );
        self.service.query(&sql).await?;
        Ok(())
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        let rows = self
            .service
            .query("SELECT name FROM files ORDER BY name;")
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    /// Forget every loaded file so the next run reloads everything.
    pub async fn clear(&self) -> Result<()> {
        self.service.query("DELETE FROM files;").await?;
        info!("cleared file ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duck::LocalQueryService;
    use anyhow::Result;

    #[tokio::test]
    async fn records_and_skips_files() -> Result<()> {
        let svc = LocalQueryService::open_in_memory()?;
        let ledger = FileLedger::new(&svc);
        ledger.ensure().await?;
        ledger.ensure().await?;

        assert!(!ledger.contains("ACSDT5Y2023.B01001-Data.csv").await?);
        ledger.record("ACSDT5Y2023.B01001-Data.csv").await?;
        ledger.record("ACSDT5Y2023.B01001-Data.csv").await?;
        ledger.record("it's.dat").await?;

        assert!(ledger.contains("ACSDT5Y2023.B01001-Data.csv").await?);
        assert!(ledger.contains("it's.dat").await?);
        assert_eq!(ledger.names().await?.len(), 2);

        ledger.clear().await?;
        assert!(ledger.names().await?.is_empty());
        Ok(())
    }
}
