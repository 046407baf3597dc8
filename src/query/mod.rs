// src/query/mod.rs

pub mod remote;

use std::future::Future;

use crate::duck::LocalQueryService;
use crate::error::Result;
pub use remote::RemoteQueryService;

/// One result row, column name → value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Submit one statement, get its rows back in order.
///
/// Every component that touches the store (ledger, loader, facade) is generic
/// over this trait so it runs unchanged against the embedded database or a
/// remote query endpoint.
pub trait QueryService {
    fn query(&self, sql: &str) -> impl Future<Output = Result<Vec<Row>>> + Send;
}

/// Runtime choice between the two backends.
pub enum QueryBackend {
    Local(LocalQueryService),
    Remote(RemoteQueryService),
}

impl QueryService for QueryBackend {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        match self {
            QueryBackend::Local(s) => s.query(sql).await,
            QueryBackend::Remote(s) => s.query(sql).await,
        }
    }
}

impl From<LocalQueryService> for QueryBackend {
    fn from(s: LocalQueryService) -> Self {
        QueryBackend::Local(s)
    }
}

impl From<RemoteQueryService> for QueryBackend {
    fn from(s: RemoteQueryService) -> Self {
        QueryBackend::Remote(s)
    }
}
