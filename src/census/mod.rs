// src/census/mod.rs

use serde_json::Value;
use std::{
    collections::{BTreeMap, HashSet},
    fmt::Write,
    path::Path,
};
use tracing::{debug, instrument};

use crate::duck::{LocalQueryService, OpenOptions};
use crate::encoder::{EncodedItem, Encoder};
use crate::error::Result;
use crate::process::batch::{parse_number, quote_ident, quote_literal};
use crate::query::{QueryService, RemoteQueryService};
use crate::schema::evolution::DATA_TABLE;

/// `outer key → inner key → value`. Outer keys are GeoIDs unless transposed.
pub type QueryResult = BTreeMap<String, BTreeMap<String, Option<f64>>>;

/// One requested column: a raw ColumnID or a resolved alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Raw(String),
    Alias(EncodedItem),
}

impl ColumnSelector {
    pub fn id(&self) -> &str {
        match self {
            ColumnSelector::Raw(id) => id,
            ColumnSelector::Alias(item) => &item.id,
        }
    }

    /// Key the column is reported under.
    pub fn output_key(&self, raw_ids: bool) -> &str {
        match self {
            ColumnSelector::Raw(id) => id,
            ColumnSelector::Alias(item) if raw_ids => &item.id,
            ColumnSelector::Alias(item) => &item.label,
        }
    }
}

impl From<&str> for ColumnSelector {
    fn from(id: &str) -> Self {
        ColumnSelector::Raw(id.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(id: String) -> Self {
        ColumnSelector::Raw(id)
    }
}

impl From<EncodedItem> for ColumnSelector {
    fn from(item: EncodedItem) -> Self {
        ColumnSelector::Alias(item)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub places: Vec<String>,
    pub columns: Vec<ColumnSelector>,
    /// Key the result by column first, then by place.
    pub transpose: bool,
    /// Report aliases under their ColumnID instead of their label.
    pub raw_ids: bool,
}

impl RunOptions {
    pub fn new<P: Into<String>>(places: impl IntoIterator<Item = P>) -> Self {
        Self {
            places: places.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: impl Into<ColumnSelector>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<C: Into<ColumnSelector>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn transpose(mut self, yes: bool) -> Self {
        self.transpose = yes;
        self
    }

    pub fn raw_ids(mut self, yes: bool) -> Self {
        self.raw_ids = yes;
        self
    }
}

/// Name-addressed reads over the `data` table through any backend.
pub struct Census<S> {
    service: S,
    encoder: Encoder,
}

impl Census<LocalQueryService> {
    pub fn local(path: impl AsRef<Path>, opts: &OpenOptions, encoder: Encoder) -> Result<Self> {
        Ok(Self::new(LocalQueryService::open(path, opts)?, encoder))
    }
}

impl Census<RemoteQueryService> {
    pub fn remote(url: impl Into<String>, encoder: Encoder) -> Self {
        Self::new(RemoteQueryService::new(url), encoder)
    }
}

impl<S: QueryService> Census<S> {
    pub fn new(service: S, encoder: Encoder) -> Self {
        Self { service, encoder }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// One SELECT for the requested places and columns. Every requested
    /// (place, column) pair is present in the result; anything the store
    /// does not hold, including a place with no row at all, is `None`.
    /// No places or no columns is an empty result and no query.
    #[instrument(level = "debug", skip(self, opts), fields(places = opts.places.len(), columns = opts.columns.len()))]
    pub async fn run(&self, opts: &RunOptions) -> Result<QueryResult> {
        if opts.places.is_empty() || opts.columns.is_empty() {
            return Ok(QueryResult::new());
        }

        let projection = projection(&opts.columns, opts.raw_ids);
        let sql = select_sql(&opts.places, &projection);
        let rows = self.service.query(&sql).await?;
        debug!(rows = rows.len(), "query returned");

        let mut out = QueryResult::new();
        for row in rows {
            let Some(place) = row.get("id").and_then(Value::as_str) else {
                continue;
            };
            let values = projection
                .iter()
                .map(|(_, key)| (key.to_string(), row.get(*key).and_then(to_number)))
                .collect();
            out.insert(place.to_string(), values);
        }

        for place in &opts.places {
            let entry = out.entry(place.clone()).or_default();
            for (_, key) in &projection {
                entry.entry(key.to_string()).or_insert(None);
            }
        }

        Ok(if opts.transpose { transpose(out) } else { out })
    }
}

/// `(ColumnID, output key)` per requested column, first request of a key wins.
fn projection(columns: &[ColumnSelector], raw_ids: bool) -> Vec<(&str, &str)> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .map(|c| (c.id(), c.output_key(raw_ids)))
        .filter(|(_, key)| seen.insert(*key))
        .collect()
}

fn select_sql(places: &[String], projection: &[(&str, &str)]) -> String {
    let mut sql = String::from("SELECT \"id\"");
    for (id, key) in projection {
        let _ = write!(sql, ", {} AS {}", quote_ident(id), quote_ident(key));
    }
    let _ = write!(sql, " FROM {DATA_TABLE} WHERE id IN (");
    for (i, place) in places.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_literal(place));
    }
    sql.push_str(");");
    sql
}

/// Remote backends may send DECIMAL as a string.
fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Swap the two key levels: `m[a][b] == transpose(m)[b][a]`.
pub fn transpose<A, B, V>(matrix: BTreeMap<A, BTreeMap<B, V>>) -> BTreeMap<B, BTreeMap<A, V>>
where
    A: Ord + Clone,
    B: Ord,
{
    let mut out: BTreeMap<B, BTreeMap<A, V>> = BTreeMap::new();
    for (a, inner) in matrix {
        for (b, v) in inner {
            out.entry(b).or_default().insert(a.clone(), v);
        }
    }
    out
}
