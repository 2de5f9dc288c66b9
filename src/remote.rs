//! HTTP client for the managed backend's REST interface (PostgREST style).

use crate::store::{RecordStore, StoreError, decode_rows};
use crate::visitor::{CellGroup, VisitorRecord};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Record store backed by a remote table.
#[derive(Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
    cells_table: String,
}

impl RemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        cells_table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Remote {
                status: 0,
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            cells_table: cells_table.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }
        // Mutations echo the written rows back.
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: String,
        req: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let resp = req
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| StoreError::Unreachable {
                url: url.clone(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        resp.json().await.map_err(|e| StoreError::Remote {
            status: status.as_u16(),
            message: format!("unexpected response body: {e}"),
        })
    }

    /// Lists a table. Rows that do not decode are skipped.
    async fn get_rows<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table);
        let req = self
            .client
            .get(&url)
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let rows: Vec<serde_json::Value> = self.send(url, req).await?;
        Ok(decode_rows(rows, table))
    }

    /// PostgREST equality filter on `id`, percent-encoded by reqwest.
    fn by_id(req: reqwest::RequestBuilder, id: &str) -> reqwest::RequestBuilder {
        req.query(&[("id", format!("eq.{id}"))])
    }

    /// Writes `body` and returns the first row echoed back.
    async fn write_row<B, T>(
        &self,
        url: String,
        req: reqwest::RequestBuilder,
        body: &B,
        missing: impl FnOnce() -> StoreError,
    ) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rows: Vec<T> = self.send(url, req.json(body)).await?;
        rows.into_iter().next().ok_or_else(missing)
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    async fn fetch_all(&self) -> Result<Vec<VisitorRecord>, StoreError> {
        self.get_rows(&self.table).await
    }

    async fn fetch_one(&self, id: &str) -> Result<VisitorRecord, StoreError> {
        let url = self.table_url(&self.table);
        let req = Self::by_id(self.client.get(&url).query(&[("select", "*")]), id);
        let rows: Vec<VisitorRecord> = self.send(url, req).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(&self, record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        let url = self.table_url(&self.table);
        let req = self.client.post(&url);
        self.write_row(url, req, &[record], || StoreError::Remote {
            status: 200,
            message: "insert returned no rows".into(),
        })
        .await
    }

    async fn update(&self, id: &str, mut record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        let stored = self.fetch_one(id).await?;
        record.id = stored.id;
        record.created_at = stored.created_at;

        let url = self.table_url(&self.table);
        let req = Self::by_id(self.client.patch(&url), id);
        self.write_row(url, req, &record, || StoreError::NotFound(id.to_string()))
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = self.table_url(&self.table);
        let req = Self::by_id(self.client.delete(&url), id);
        let rows: Vec<serde_json::Value> = self.send(url, req).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_cells(&self) -> Result<Vec<CellGroup>, StoreError> {
        self.get_rows(&self.cells_table).await
    }

    async fn insert_cell(&self, cell: CellGroup) -> Result<CellGroup, StoreError> {
        let url = self.table_url(&self.cells_table);
        let req = self.client.post(&url);
        self.write_row(url, req, &[cell], || StoreError::Remote {
            status: 200,
            message: "insert returned no rows".into(),
        })
        .await
    }
}
