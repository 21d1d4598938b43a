use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::BlobResult;

/// Where a file lives or will live: `{container}/{path}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub container: String,
    pub path: String,
    pub content_type: Option<String>,
}

impl UploadTarget {
    pub fn new<C: Into<String>, P: Into<String>>(container: C, path: P) -> Self {
        Self {
            container: container.into(),
            path: path.into().trim_start_matches('/').to_string(),
            content_type: None,
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// `{container}/{path}` as used for addressing and URLs
    pub fn blob_path(&self) -> String {
        format!("{}/{}", self.container, self.path)
    }
}

impl std::fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.blob_path())
    }
}

/// One chunk of a source file, ready to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 1-based position; must match the block order on the remote blob
    pub sequence: u32,
    pub payload: Bytes,
    /// Base64 of the MD5 digest of `payload`
    pub checksum: String,
}

/// A single append-block request
#[derive(Debug, Clone)]
pub struct AppendBlock {
    pub payload: Bytes,
    pub content_md5: String,
    pub timeout: Duration,
}

/// Metadata of a remote blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub blob_type: Option<String>,
}

/// Properties and full body returned by a blob fetch
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub properties: BlobProperties,
    pub content: Bytes,
}

/// A file handed over for upload: a forward-only reader plus its declared content type
pub struct UploadFile<R> {
    pub reader: R,
    pub content_type: Option<String>,
}

impl<R: AsyncRead + Unpin + Send> UploadFile<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            content_type: None,
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl UploadFile<tokio::fs::File> {
    /// Open a local file for upload
    pub async fn open<P: AsRef<Path>>(path: P) -> BlobResult<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file))
    }
}

impl UploadFile<Cursor<Bytes>> {
    /// Upload an in-memory buffer
    pub fn from_bytes<B: Into<Bytes>>(data: B) -> Self {
        Self::new(Cursor::new(data.into()))
    }
}
