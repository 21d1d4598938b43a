use async_trait::async_trait;

use crate::{AppendBlock, BlobProperties, BlobResult, FetchedBlob};

/// Wire operations against an append-blob service.
///
/// Implementations report a missing blob as [`crate::BlobError::NotFound`]
/// so callers can branch on it without inspecting status codes.
#[async_trait]
pub trait AppendBlobStore: Send + Sync {
    /// Fetch blob metadata without content
    async fn get_blob_properties(&self, container: &str, path: &str) -> BlobResult<BlobProperties>;

    /// Fetch blob metadata and the full body
    async fn get_blob(&self, container: &str, path: &str) -> BlobResult<FetchedBlob>;

    /// Create an empty append blob tagged with a content type
    async fn create_append_blob(
        &self,
        container: &str,
        path: &str,
        content_type: &str,
    ) -> BlobResult<BlobProperties>;

    /// Commit one block at the end of an existing append blob
    async fn append_block(&self, container: &str, path: &str, block: AppendBlock) -> BlobResult<()>;

    /// Delete a blob
    async fn delete_blob(&self, container: &str, path: &str) -> BlobResult<()>;

    /// Direct URI of `{container}/{path}`
    fn blob_uri(&self, container: &str, path: &str) -> String;
}

/// Maps an upload identifier to the remote path inside the container
pub trait StorePath: Send + Sync {
    fn store_path(&self, identifier: &str) -> String;
}

/// Default strategy: `{prefix}/{identifier}`
#[derive(Debug, Clone)]
pub struct PrefixStorePath {
    prefix: String,
}

impl PrefixStorePath {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }
}

impl Default for PrefixStorePath {
    fn default() -> Self {
        Self::new("uploads")
    }
}

impl StorePath for PrefixStorePath {
    fn store_path(&self, identifier: &str) -> String {
        let identifier = identifier.trim_start_matches('/');
        if self.prefix.is_empty() {
            identifier.to_string()
        } else {
            format!("{}/{}", self.prefix, identifier)
        }
    }
}

impl<F> StorePath for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn store_path(&self, identifier: &str) -> String {
        self(identifier)
    }
}
