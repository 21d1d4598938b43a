//! Azure Blob Storage backend over the Blob REST API.
//!
//! Operations map to:
//!   `get_blob_properties` -> Get Blob Properties (`HEAD`)
//!   `get_blob`            -> Get Blob (`GET`)
//!   `create_append_blob`  -> Put Blob with `x-ms-blob-type: AppendBlob`
//!   `append_block`        -> Append Block (`comp=appendblock`) with `Content-MD5`
//!   `delete_blob`         -> Delete Blob (snapshots included)

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Client, Method, Response, StatusCode, Url};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{SharedKey, SignableRequest};
use crate::{
    AppendBlobStore, AppendBlock, AzureStorageConfig, BlobError, BlobProperties, BlobResult, FetchedBlob,
    StorageCredentials,
};

/// REST API version sent with every request
const AZURE_API_VERSION: &str = "2023-11-03";

/// Everything except unreserved characters and `/`, which stays literal in blob paths
const BLOB_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a blob path for use in a URL
pub fn encode_blob_path(path: &str) -> String {
    utf8_percent_encode(path, BLOB_PATH_ENCODE_SET).to_string()
}

struct BlobRequest<'a> {
    operation: &'static str,
    method: Method,
    container: &'a str,
    path: &'a str,
    query: Vec<(&'static str, String)>,
    ms_headers: Vec<(&'static str, String)>,
    content_type: Option<&'a str>,
    content_md5: Option<&'a str>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl<'a> BlobRequest<'a> {
    fn new(operation: &'static str, method: Method, container: &'a str, path: &'a str) -> Self {
        Self {
            operation,
            method,
            container,
            path,
            query: Vec::new(),
            ms_headers: Vec::new(),
            content_type: None,
            content_md5: None,
            body: None,
            timeout: None,
        }
    }
}

/// Blob service client for one storage account
#[derive(Clone, Debug)]
pub struct AzureBlobService {
    client: Client,
    key: SharedKey,
    base_url: String,
}

impl AzureBlobService {
    /// Build a client for the account in `credentials`.
    ///
    /// `endpoint` overrides `https://{account}.blob.core.windows.net`, e.g.
    /// `http://127.0.0.1:10000/devstoreaccount1` for a local emulator.
    pub fn new(credentials: &StorageCredentials, endpoint: Option<&str>) -> BlobResult<Self> {
        let key = SharedKey::from_credentials(credentials)?;
        let base_url = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", key.account()),
        };
        Url::parse(&base_url).map_err(|e| BlobError::config(format!("invalid endpoint {}: {}", base_url, e)))?;

        let client = Client::builder().build().map_err(BlobError::transport)?;

        Ok(Self { client, key, base_url })
    }

    /// Build a client from the credentials and endpoint in `config`
    pub fn from_config(config: &AzureStorageConfig) -> BlobResult<Self> {
        let credentials = config
            .credentials
            .as_ref()
            .ok_or_else(|| BlobError::config("storage credentials are required for the Azure backend"))?;
        Self::new(credentials, config.endpoint.as_deref())
    }

    fn blob_url(&self, container: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, container, encode_blob_path(path))
    }

    fn rfc1123_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    async fn send(&self, request: BlobRequest<'_>) -> BlobResult<Response> {
        let mut url = Url::parse(&self.blob_url(request.container, request.path))
            .map_err(|e| BlobError::invalid(format!("invalid blob url: {}", e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        let mut ms_headers = request.ms_headers;
        ms_headers.push(("x-ms-date", Self::rfc1123_date()));
        ms_headers.push(("x-ms-version", AZURE_API_VERSION.to_string()));
        ms_headers.push(("x-ms-client-request-id", Uuid::new_v4().to_string()));

        let content_length = request.body.as_ref().map(|b| b.len());
        let authorization = self.key.authorization(&SignableRequest {
            method: request.method.as_str(),
            content_length,
            content_md5: request.content_md5,
            content_type: request.content_type,
            ms_headers: &ms_headers,
            path: url.path(),
            query: &request.query,
        })?;

        let mut builder = self
            .client
            .request(request.method, url)
            .header("Authorization", authorization);
        for (name, value) in &ms_headers {
            builder = builder.header(*name, value);
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(md5) = request.content_md5 {
            builder = builder.header("Content-MD5", md5);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match request.body {
            Some(body) => builder.body(body),
            None => builder,
        };

        let operation = request.operation;
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BlobError::Timeout {
                    operation,
                    after: request.timeout.unwrap_or_default(),
                }
            } else {
                BlobError::transport(e)
            }
        })?;

        debug!(operation, status = response.status().as_u16(), "Blob service responded");

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::map_error(request.container, request.path, response).await)
        }
    }

    async fn map_error(container: &str, path: &str, response: Response) -> BlobError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return BlobError::not_found(format!("{}/{}", container, path));
        }

        let code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let message = response.text().await.unwrap_or_default();
        BlobError::http(status.as_u16(), code, message)
    }

    fn properties(headers: &HeaderMap) -> BlobProperties {
        let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

        BlobProperties {
            content_length: header(CONTENT_LENGTH).and_then(|v| v.parse().ok()).unwrap_or(0),
            content_type: header(CONTENT_TYPE).map(str::to_string),
            etag: header(ETAG).map(str::to_string),
            last_modified: header(LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            blob_type: header(HeaderName::from_static("x-ms-blob-type")).map(str::to_string),
        }
    }
}

#[async_trait]
impl AppendBlobStore for AzureBlobService {
    async fn get_blob_properties(&self, container: &str, path: &str) -> BlobResult<BlobProperties> {
        let response = self
            .send(BlobRequest::new("get blob properties", Method::HEAD, container, path))
            .await?;
        Ok(Self::properties(response.headers()))
    }

    async fn get_blob(&self, container: &str, path: &str) -> BlobResult<FetchedBlob> {
        let response = self
            .send(BlobRequest::new("get blob", Method::GET, container, path))
            .await?;
        let properties = Self::properties(response.headers());
        let content = response.bytes().await.map_err(BlobError::transport)?;
        Ok(FetchedBlob { properties, content })
    }

    async fn create_append_blob(
        &self,
        container: &str,
        path: &str,
        content_type: &str,
    ) -> BlobResult<BlobProperties> {
        let mut request = BlobRequest::new("create append blob", Method::PUT, container, path);
        request.ms_headers.push(("x-ms-blob-type", "AppendBlob".to_string()));
        request.ms_headers.push(("x-ms-blob-content-type", content_type.to_string()));
        request.body = Some(Bytes::new());

        // Put Blob answers with version headers only; the blob itself is empty.
        let response = self.send(request).await?;
        let headers = Self::properties(response.headers());
        Ok(BlobProperties {
            content_length: 0,
            content_type: Some(content_type.to_string()),
            etag: headers.etag,
            last_modified: headers.last_modified,
            blob_type: Some("AppendBlob".to_string()),
        })
    }

    async fn append_block(&self, container: &str, path: &str, block: AppendBlock) -> BlobResult<()> {
        let mut request = BlobRequest::new("append block", Method::PUT, container, path);
        request.query.push(("comp", "appendblock".to_string()));
        request.query.push(("timeout", block.timeout.as_secs().to_string()));
        request.content_md5 = Some(&block.content_md5);
        request.timeout = Some(block.timeout);
        request.body = Some(block.payload.clone());

        self.send(request).await?;
        Ok(())
    }

    async fn delete_blob(&self, container: &str, path: &str) -> BlobResult<()> {
        let mut request = BlobRequest::new("delete blob", Method::DELETE, container, path);
        request.ms_headers.push(("x-ms-delete-snapshots", "include".to_string()));

        self.send(request).await?;
        Ok(())
    }

    fn blob_uri(&self, container: &str, path: &str) -> String {
        self.blob_url(container, path)
    }
}
