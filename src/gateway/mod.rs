//! Gateway API bindings.
//!
//! One request helper owns the HTTP envelope: auth header, status-code to
//! error-taxonomy mapping, and response schema validation. Everything above
//! it is a thin typed wrapper per endpoint, so the rest of the crate never
//! touches a raw response.

use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{DatastoreError, Result};
use crate::schema::{
    Schema, ACK_RESPONSE_SCHEMA, DEVICE_ROOT_SCHEMA, FILE_ENTRY_SCHEMA,
    GET_DATASTORE_RESPONSE_SCHEMA, LISTING_RESPONSE_SCHEMA, PUT_DATASTORE_RESPONSE_SCHEMA,
    PUT_FILE_RESPONSE_SCHEMA,
};
use crate::types::{
    CreateDatastoreBody, DeleteDatastoreBody, GetDatastoreResponse, PutDatastoreResponse,
    PutFileResponse, WriteRequestBody,
};

/// HTTP client for one gateway endpoint
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    session_token: Option<String>,
    api_password: Option<String>,
}

impl GatewayClient {
    /// Create a client for the configured gateway
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| DatastoreError::Request(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(&config.endpoint())
            .map_err(|e| DatastoreError::config(format!("Invalid gateway endpoint: {e}")))?;

        Ok(Self {
            http,
            base_url,
            session_token: None,
            api_password: None,
        })
    }

    /// Authenticate subsequent requests with a session bearer token
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Authenticate with the gateway API password (administrative path)
    pub fn with_api_password(mut self, password: impl Into<String>) -> Self {
        self.api_password = Some(password.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| DatastoreError::config("Gateway URL cannot be a base".to_string()))?;
            for segment in segments {
                path.push(segment);
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<reqwest::Response> {
        debug!(%method, %url, "gateway request");
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.session_token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("bearer {token}"));
        } else if let Some(password) = &self.api_password {
            request = request.header(reqwest::header::AUTHORIZATION, format!("bearer {password}"));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DatastoreError::from_status(status.as_u16(), message));
        }
        Ok(response)
    }

    /// Single JSON request helper: send, map status to the error taxonomy,
    /// validate the response against its schema.
    async fn request_json(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        schema: &Schema,
    ) -> Result<Value> {
        let response = self.send(method, url, body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| DatastoreError::remote_io(format!("Malformed gateway response: {e}")))?;
        schema
            .validate(&value)
            .map_err(|e| DatastoreError::remote_io(format!("Gateway response rejected: {e}")))?;
        Ok(value)
    }

    async fn request_bytes(&self, url: Url) -> Result<Vec<u8>> {
        let response = self.send(Method::GET, url, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ── Node ────────────────────────────────────────────────────────────

    /// `GET /v1/node/ping` liveness check
    pub async fn ping(&self) -> Result<bool> {
        let url = self.url(&["v1", "node", "ping"], &[])?;
        self.send(Method::GET, url, None).await?;
        Ok(true)
    }

    // ── Stores ──────────────────────────────────────────────────────────

    /// Single-reader mount: `GET /v1/stores/<id>?device_ids=…&device_pubkeys=…`
    pub async fn get_datastore_by_id(
        &self,
        datastore_id: &str,
        device_ids: &[String],
        device_pubkeys: &[String],
    ) -> Result<GetDatastoreResponse> {
        let device_ids = device_ids.join(",");
        let device_pubkeys = device_pubkeys.join(",");
        let url = self.url(
            &["v1", "stores", datastore_id],
            &[
                ("device_ids", device_ids.as_str()),
                ("device_pubkeys", device_pubkeys.as_str()),
            ],
        )?;
        let value = self
            .request_json(Method::GET, url, None, &GET_DATASTORE_RESPONSE_SCHEMA)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Multi-reader mount: `GET /v1/stores/<app>?blockchain_id=<bid>`
    pub async fn get_datastore_by_name(
        &self,
        app_name: &str,
        blockchain_id: &str,
    ) -> Result<GetDatastoreResponse> {
        let url = self.url(
            &["v1", "stores", app_name],
            &[("blockchain_id", blockchain_id)],
        )?;
        let value = self
            .request_json(Method::GET, url, None, &GET_DATASTORE_RESPONSE_SCHEMA)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST /v1/stores`: create a datastore from its signed bundle.
    ///
    /// `datastore_pubkey` accompanies API-password auth, where no session
    /// binds the request to a keypair.
    pub async fn put_datastore(
        &self,
        body: &CreateDatastoreBody,
        datastore_pubkey: Option<&str>,
    ) -> Result<PutDatastoreResponse> {
        let query: Vec<(&str, &str)> = match datastore_pubkey {
            Some(pubkey) => vec![("datastore_pubkey", pubkey)],
            None => vec![],
        };
        let url = self.url(&["v1", "stores"], &query)?;
        let value = self
            .request_json(
                Method::POST,
                url,
                Some(serde_json::to_value(body)?),
                &PUT_DATASTORE_RESPONSE_SCHEMA,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `DELETE /v1/stores`: delete a datastore via its signed tombstones
    pub async fn delete_datastore(&self, body: &DeleteDatastoreBody) -> Result<()> {
        let url = self.url(&["v1", "stores"], &[])?;
        self.request_json(
            Method::DELETE,
            url,
            Some(serde_json::to_value(body)?),
            &ACK_RESPONSE_SCHEMA,
        )
        .await?;
        Ok(())
    }

    // ── Device roots ────────────────────────────────────────────────────

    /// `GET /v1/stores/<id>/device_roots?this_device_id=…`
    pub async fn get_device_root(
        &self,
        datastore_id: &str,
        this_device_id: &str,
    ) -> Result<crate::inode::DeviceRoot> {
        let url = self.url(
            &["v1", "stores", datastore_id, "device_roots"],
            &[("this_device_id", this_device_id)],
        )?;
        let value = self
            .request_json(Method::GET, url, None, &DEVICE_ROOT_SCHEMA)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST /v1/stores/<id>/device_roots?sync=…`
    pub async fn put_device_root(
        &self,
        datastore_id: &str,
        sync: bool,
        body: &WriteRequestBody,
    ) -> Result<PutFileResponse> {
        body.check_positional()?;
        let url = self.url(
            &["v1", "stores", datastore_id, "device_roots"],
            &[("sync", if sync { "true" } else { "false" })],
        )?;
        let value = self
            .request_json(
                Method::POST,
                url,
                Some(serde_json::to_value(body)?),
                &PUT_FILE_RESPONSE_SCHEMA,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // ── Files ───────────────────────────────────────────────────────────

    /// `GET /v1/stores/<id>/headers?path=…&this_device_id=…`
    pub async fn get_file_header(
        &self,
        datastore_id: &str,
        path: &str,
        this_device_id: &str,
    ) -> Result<crate::inode::FileEntry> {
        let url = self.url(
            &["v1", "stores", datastore_id, "headers"],
            &[("path", path), ("this_device_id", this_device_id)],
        )?;
        let value = self
            .request_json(Method::GET, url, None, &FILE_ENTRY_SCHEMA)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET /v1/stores/<id>/files?path=…`: raw file bytes
    pub async fn get_file(&self, datastore_id: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.url(
            &["v1", "stores", datastore_id, "files"],
            &[("path", path)],
        )?;
        self.request_bytes(url).await
    }

    /// `GET /v1/stores/<id>/listing`: the aggregate root
    pub async fn get_listing(
        &self,
        datastore_id: &str,
    ) -> Result<std::collections::BTreeMap<String, crate::inode::FileEntry>> {
        let url = self.url(&["v1", "stores", datastore_id, "listing"], &[])?;
        let value = self
            .request_json(Method::GET, url, None, &LISTING_RESPONSE_SCHEMA)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST /v1/stores/<id>/files?path=…`: create or update one file
    pub async fn put_file(
        &self,
        datastore_id: &str,
        path: &str,
        body: &WriteRequestBody,
    ) -> Result<PutFileResponse> {
        body.check_positional()?;
        let url = self.url(
            &["v1", "stores", datastore_id, "files"],
            &[("path", path)],
        )?;
        let value = self
            .request_json(
                Method::POST,
                url,
                Some(serde_json::to_value(body)?),
                &PUT_FILE_RESPONSE_SCHEMA,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `DELETE /v1/stores/<id>/files?path=…`
    pub async fn delete_file(
        &self,
        datastore_id: &str,
        path: &str,
        body: &WriteRequestBody,
    ) -> Result<()> {
        let url = self.url(
            &["v1", "stores", datastore_id, "files"],
            &[("path", path)],
        )?;
        self.request_json(
            Method::DELETE,
            url,
            Some(serde_json::to_value(body)?),
            &ACK_RESPONSE_SCHEMA,
        )
        .await?;
        Ok(())
    }

    // ── Names ───────────────────────────────────────────────────────────

    /// `GET /v1/names/<blockchain_id>/profile`: the owner's profile, with
    /// the embedded keyfile JWT
    pub async fn get_profile(&self, blockchain_id: &str) -> Result<Value> {
        let url = self.url(&["v1", "names", blockchain_id, "profile"], &[])?;
        self.request_json(Method::GET, url, None, &Schema::Any).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GatewayClient {
        GatewayClient::new(&ClientConfig::default()).unwrap()
    }

    #[test]
    fn test_url_building_escapes_queries() {
        let url = client()
            .url(
                &["v1", "stores", "1Ds", "files"],
                &[("path", "/dir/file one")],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:6270/v1/stores/1Ds/files?path=%2Fdir%2Ffile+one"
        );
    }

    #[test]
    fn test_url_building_plain_segments() {
        let url = client().url(&["v1", "node", "ping"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:6270/v1/node/ping");
    }

    #[test]
    fn test_auth_selection_prefers_session_token() {
        let with_both = client()
            .with_api_password("admin")
            .with_session_token("jwt");
        assert_eq!(with_both.session_token.as_deref(), Some("jwt"));
        assert_eq!(with_both.api_password.as_deref(), Some("admin"));
    }
}
