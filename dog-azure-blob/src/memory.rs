use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::chunk::content_md5;
use crate::{AppendBlobStore, AppendBlock, BlobError, BlobProperties, BlobResult, FetchedBlob};

const APPEND_BLOB: &str = "AppendBlob";

#[derive(Debug, Clone)]
struct MemoryBlob {
    properties: BlobProperties,
    data: BytesMut,
    block_sizes: Vec<usize>,
}

/// In-memory append-blob service for testing and development.
///
/// Mirrors the service's observable behaviour: missing blobs are
/// `NotFound`, appends verify `Content-MD5` and commit in call order.
#[derive(Clone, Default)]
pub struct MemoryAppendBlobStore {
    blobs: Arc<RwLock<HashMap<(String, String), MemoryBlob>>>,
}

impl MemoryAppendBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes of the committed blocks of a blob, in commit order
    pub fn block_sizes(&self, container: &str, path: &str) -> Option<Vec<usize>> {
        self.blobs
            .read()
            .get(&key(container, path))
            .map(|blob| blob.block_sizes.clone())
    }

    /// Current body of a blob
    pub fn contents(&self, container: &str, path: &str) -> Option<Bytes> {
        self.blobs
            .read()
            .get(&key(container, path))
            .map(|blob| Bytes::copy_from_slice(&blob.data))
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

fn key(container: &str, path: &str) -> (String, String) {
    (container.to_string(), path.to_string())
}

fn new_etag() -> String {
    format!("\"0x{}\"", Uuid::new_v4().simple())
}

#[async_trait]
impl AppendBlobStore for MemoryAppendBlobStore {
    async fn get_blob_properties(&self, container: &str, path: &str) -> BlobResult<BlobProperties> {
        self.blobs
            .read()
            .get(&key(container, path))
            .map(|blob| blob.properties.clone())
            .ok_or_else(|| BlobError::not_found(format!("{}/{}", container, path)))
    }

    async fn get_blob(&self, container: &str, path: &str) -> BlobResult<FetchedBlob> {
        self.blobs
            .read()
            .get(&key(container, path))
            .map(|blob| FetchedBlob {
                properties: blob.properties.clone(),
                content: Bytes::copy_from_slice(&blob.data),
            })
            .ok_or_else(|| BlobError::not_found(format!("{}/{}", container, path)))
    }

    async fn create_append_blob(
        &self,
        container: &str,
        path: &str,
        content_type: &str,
    ) -> BlobResult<BlobProperties> {
        let properties = BlobProperties {
            content_length: 0,
            content_type: Some(content_type.to_string()),
            etag: Some(new_etag()),
            last_modified: Some(Utc::now()),
            blob_type: Some(APPEND_BLOB.to_string()),
        };

        // Creating over an existing blob replaces it, as the service does.
        self.blobs.write().insert(
            key(container, path),
            MemoryBlob {
                properties: properties.clone(),
                data: BytesMut::new(),
                block_sizes: Vec::new(),
            },
        );

        Ok(properties)
    }

    async fn append_block(&self, container: &str, path: &str, block: AppendBlock) -> BlobResult<()> {
        if content_md5(&block.payload) != block.content_md5 {
            return Err(BlobError::http(
                400,
                Some("Md5Mismatch".to_string()),
                "The MD5 value specified in the request did not match with the MD5 value calculated by the server.",
            ));
        }

        let mut blobs = self.blobs.write();
        let blob = blobs
            .get_mut(&key(container, path))
            .ok_or_else(|| BlobError::not_found(format!("{}/{}", container, path)))?;

        blob.data.extend_from_slice(&block.payload);
        blob.block_sizes.push(block.payload.len());
        blob.properties.content_length = blob.data.len() as u64;
        blob.properties.etag = Some(new_etag());
        blob.properties.last_modified = Some(Utc::now());

        Ok(())
    }

    async fn delete_blob(&self, container: &str, path: &str) -> BlobResult<()> {
        self.blobs
            .write()
            .remove(&key(container, path))
            .map(|_| ())
            .ok_or_else(|| BlobError::not_found(format!("{}/{}", container, path)))
    }

    fn blob_uri(&self, container: &str, path: &str) -> String {
        format!("memory://{}/{}", container, path)
    }
}
