use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{debug, instrument};

use super::{QueryService, Row};
use crate::error::{CensusError, Result};

/// Forwards statements to a query endpoint over HTTP.
///
/// The statement travels as the raw request body; the endpoint answers with a
/// JSON array of row objects. There is no timeout or retry here: a failed
/// call is returned as is and the caller decides what to do.
#[derive(Clone)]
pub struct RemoteQueryService {
    client: Client,
    url: String,
}

impl RemoteQueryService {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl QueryService for RemoteQueryService {
    #[instrument(level = "debug", skip(self, sql), fields(url = %self.url, len = sql.len()))]
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(sql.to_string())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CensusError::RemoteStatus {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let rows: Vec<Row> =
            serde_json::from_slice(&bytes).map_err(|source| CensusError::MalformedPayload {
                url: self.url.clone(),
                source,
            })?;
        debug!(rows = rows.len(), "remote query done");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::net::SocketAddr;
    use warp::{http::StatusCode, hyper::body::Bytes, Filter};

    /// Serves one canned reply; `{sql}` in it is replaced by the request body.
    fn serve(status: StatusCode, reply: &'static str) -> SocketAddr {
        let route = warp::post()
            .and(warp::header::exact("content-type", "application/json"))
            .and(warp::body::bytes())
            .map(move |body: Bytes| {
                let sql = String::from_utf8_lossy(&body).to_string();
                let reply = if reply.contains("{sql}") {
                    reply.replace("{sql}", &sql.replace('"', "\\\""))
                } else {
                    reply.to_string()
                };
                warp::reply::with_status(reply, status)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    #[tokio::test]
    async fn posts_raw_sql_and_decodes_rows() -> Result<()> {
        let addr = serve(StatusCode::OK, r#"[{"sql": "{sql}", "n": 1}, {"sql": null, "n": 2}]"#);
        let svc = RemoteQueryService::new(format!("http://{addr}/"));

        let rows = svc.query("select 1 as \"n\"").await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["sql"], "select 1 as \"n\"");
        assert_eq!(rows[1]["n"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() -> Result<()> {
        let addr = serve(StatusCode::INTERNAL_SERVER_ERROR, "table data does not exist");
        let svc = RemoteQueryService::new(format!("http://{addr}/"));

        match svc.query("select * from data").await {
            Err(CensusError::RemoteStatus { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "table data does not exist");
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() -> Result<()> {
        let addr = serve(StatusCode::OK, r#"{"not": "an array"}"#);
        let svc = RemoteQueryService::new(format!("http://{addr}/"));

        let err = svc.query("select 1").await.unwrap_err();
        assert!(matches!(err, CensusError::MalformedPayload { .. }));
        Ok(())
    }
}
