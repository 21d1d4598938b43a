use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::{BlobError, BlobResult};

/// Default chunk size for appended blocks (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest block the append-block operation accepts (4 MiB)
pub const MAX_APPEND_BLOCK_BYTES: usize = 4 * 1024 * 1024;

/// Server-side and client-side bound for a single append call
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(300);

/// Content type used when neither the file nor the caller declares one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Account name and shared access key for a storage account
#[derive(Debug, Clone, Deserialize)]
pub struct StorageCredentials {
    pub account_name: String,
    pub access_key: String,
}

impl StorageCredentials {
    pub fn new<A: Into<String>, K: Into<String>>(account_name: A, access_key: K) -> Self {
        Self {
            account_name: account_name.into(),
            access_key: access_key.into(),
        }
    }
}

/// Configuration for Azure append-blob storage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AzureStorageConfig {
    /// Account credentials, only needed by the REST backend
    pub credentials: Option<StorageCredentials>,

    /// Container every blob lives in
    pub container: String,

    /// Content type for new blobs when the file declares none
    pub content_type: String,

    /// Public host prefixed to `{container}/{path}` instead of the service URI
    pub asset_host: Option<String>,

    /// Service endpoint override (e.g. a local emulator)
    pub endpoint: Option<String>,

    /// Bytes per appended block
    pub chunk_size: usize,

    /// Bound on a single append round trip
    #[serde(with = "duration_secs")]
    pub append_timeout: Duration,
}

impl Default for AzureStorageConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            container: String::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            asset_host: None,
            endpoint: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            append_timeout: DEFAULT_APPEND_TIMEOUT,
        }
    }
}

impl AzureStorageConfig {
    /// Create a new config for the given container with defaults
    pub fn new<S: Into<String>>(container: S) -> Self {
        Self {
            container: container.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `AZURE_*` environment variables
    pub fn from_env() -> BlobResult<Self> {
        fn get_env(key: &str) -> BlobResult<String> {
            env::var(key).map_err(|_| BlobError::config(format!("{} environment variable required", key)))
        }

        let mut config = Self::new(get_env("AZURE_CONTAINER")?).with_credentials(StorageCredentials::new(
            get_env("AZURE_STORAGE_ACCOUNT_NAME")?,
            get_env("AZURE_STORAGE_ACCESS_KEY")?,
        ));

        if let Ok(host) = env::var("AZURE_ASSET_HOST") {
            config = config.with_asset_host(host);
        }
        if let Ok(endpoint) = env::var("AZURE_STORAGE_ENDPOINT") {
            config = config.with_endpoint(endpoint);
        }
        if let Ok(content_type) = env::var("AZURE_CONTENT_TYPE") {
            config = config.with_content_type(content_type);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set account credentials
    pub fn with_credentials(mut self, credentials: StorageCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the default content type
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Serve URLs from an asset host instead of the service endpoint
    pub fn with_asset_host<S: Into<String>>(mut self, host: S) -> Self {
        self.asset_host = Some(host.into().trim_end_matches('/').to_string());
        self
    }

    /// Override the service endpoint
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// Set chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the per-append timeout
    pub fn with_append_timeout(mut self, timeout: Duration) -> Self {
        self.append_timeout = timeout;
        self
    }

    /// Check values that would otherwise fail mid-upload
    pub fn validate(&self) -> BlobResult<()> {
        if self.container.trim().is_empty() {
            return Err(BlobError::config("container name must not be empty"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_APPEND_BLOCK_BYTES {
            return Err(BlobError::config(format!(
                "chunk size {} must be between 1 and {} bytes",
                self.chunk_size, MAX_APPEND_BLOCK_BYTES
            )));
        }
        if self.append_timeout.is_zero() {
            return Err(BlobError::config("append timeout must be greater than zero"));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
