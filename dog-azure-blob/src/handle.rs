use std::sync::Arc;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::{AppendBlobStore, BlobProperties, BlobResult, UploadTarget};

/// Result of the handle's single fetch
#[derive(Debug, Clone)]
enum Fetched {
    Present { properties: BlobProperties, content: Bytes },
    Absent,
}

/// A lazily populated view of one remote blob.
///
/// The first accessor that needs remote state fetches the blob once and
/// caches the outcome for the life of the handle; there is no refresh.
/// Handles on the same path do not coordinate and may disagree.
pub struct BlobHandle {
    store: Arc<dyn AppendBlobStore>,
    target: UploadTarget,
    asset_host: Option<String>,
    content_type: Option<String>,
    fetched: Option<Fetched>,
}

impl BlobHandle {
    pub fn new(store: Arc<dyn AppendBlobStore>, target: UploadTarget) -> Self {
        Self {
            store,
            target,
            asset_host: None,
            content_type: None,
            fetched: None,
        }
    }

    /// Serve [`BlobHandle::url`] from this host instead of the service
    pub fn with_asset_host<S: Into<String>>(mut self, host: S) -> Self {
        self.asset_host = Some(host.into());
        self
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Remote path inside the container
    pub fn path(&self) -> &str {
        &self.target.path
    }

    /// Fetch the blob unless a previous call already did.
    ///
    /// A missing blob is cached as absent. Any other error is returned and
    /// nothing is cached, so a later call fetches again.
    async fn ensure_fetched(&mut self) -> BlobResult<&Fetched> {
        let fetched = match self.fetched.take() {
            Some(fetched) => fetched,
            None => self.fetch().await?,
        };
        Ok(self.fetched.insert(fetched))
    }

    async fn fetch(&self) -> BlobResult<Fetched> {
        match self.store.get_blob(&self.target.container, &self.target.path).await {
            Ok(blob) => Ok(Fetched::Present {
                properties: blob.properties,
                content: blob.content,
            }),
            Err(e) if e.is_not_found() => {
                debug!(blob = %self.target, "Blob absent");
                Ok(Fetched::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn properties(&mut self) -> BlobResult<Option<&BlobProperties>> {
        Ok(match self.ensure_fetched().await? {
            Fetched::Present { properties, .. } => Some(properties),
            Fetched::Absent => None,
        })
    }

    /// Whether the blob exists
    pub async fn exists(&mut self) -> BlobResult<bool> {
        Ok(matches!(self.ensure_fetched().await?, Fetched::Present { .. }))
    }

    /// Size in bytes, `None` if the blob does not exist
    pub async fn size(&mut self) -> BlobResult<Option<u64>> {
        Ok(self.properties().await?.map(|p| p.content_length))
    }

    /// Explicitly set content type, else the blob's own, else `None`
    pub async fn content_type(&mut self) -> BlobResult<Option<String>> {
        if let Some(content_type) = &self.content_type {
            return Ok(Some(content_type.clone()));
        }
        let fetched = self.properties().await?.and_then(|p| p.content_type.clone());
        self.content_type = fetched.clone();
        Ok(fetched)
    }

    /// Override the content type reported by this handle
    pub fn set_content_type<S: Into<String>>(&mut self, content_type: S) {
        self.content_type = Some(content_type.into());
    }

    /// Full body, `None` if the blob does not exist
    pub async fn read(&mut self) -> BlobResult<Option<Bytes>> {
        Ok(match self.ensure_fetched().await? {
            Fetched::Present { content, .. } => Some(content.clone()),
            Fetched::Absent => None,
        })
    }

    /// `{asset_host}/{container}/{path}` when an asset host is set,
    /// otherwise the service URI of the blob
    pub fn url(&self) -> String {
        match &self.asset_host {
            Some(host) => format!("{}/{}", host, self.target.blob_path()),
            None => self.store.blob_uri(&self.target.container, &self.target.path),
        }
    }

    /// Last segment of the decoded URL
    pub fn filename(&self) -> String {
        let url = self.url();
        let decoded = percent_decode_str(&url).decode_utf8_lossy();
        decoded.rsplit('/').next().unwrap_or_default().to_string()
    }

    /// Text after the last `.` of the path; the whole path if it has none
    pub fn extension(&self) -> &str {
        self.target.path.rsplit('.').next().unwrap_or_default()
    }

    /// Delete the blob.
    ///
    /// Returns `false` instead of an error when the service answers with an
    /// error status, a missing blob included. Transport failures propagate.
    pub async fn delete(&self) -> BlobResult<bool> {
        match self.store.delete_blob(&self.target.container, &self.target.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_http() => {
                warn!(blob = %self.target, error = %e, "Blob delete rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHandle")
            .field("target", &self.target)
            .field("asset_host", &self.asset_host)
            .field("content_type", &self.content_type)
            .field("fetched", &self.fetched.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::content_md5;
    use crate::{AppendBlock, BlobError, FetchedBlob, MemoryAppendBlobStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `get_blob` with a 503 and every delete with a timeout
    struct FlakyStore {
        inner: MemoryAppendBlobStore,
        get_calls: AtomicU32,
    }

    #[async_trait]
    impl AppendBlobStore for FlakyStore {
        async fn get_blob_properties(&self, container: &str, path: &str) -> BlobResult<BlobProperties> {
            self.inner.get_blob_properties(container, path).await
        }

        async fn get_blob(&self, container: &str, path: &str) -> BlobResult<FetchedBlob> {
            if self.get_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BlobError::http(503, Some("ServerBusy".to_string()), "busy"));
            }
            self.inner.get_blob(container, path).await
        }

        async fn create_append_blob(
            &self,
            container: &str,
            path: &str,
            content_type: &str,
        ) -> BlobResult<BlobProperties> {
            self.inner.create_append_blob(container, path, content_type).await
        }

        async fn append_block(&self, container: &str, path: &str, block: AppendBlock) -> BlobResult<()> {
            self.inner.append_block(container, path, block).await
        }

        async fn delete_blob(&self, _container: &str, _path: &str) -> BlobResult<()> {
            Err(BlobError::Timeout {
                operation: "delete blob",
                after: Duration::from_secs(300),
            })
        }

        fn blob_uri(&self, container: &str, path: &str) -> String {
            self.inner.blob_uri(container, path)
        }
    }

    fn flaky(inner: MemoryAppendBlobStore, path: &str) -> BlobHandle {
        let store = FlakyStore {
            inner,
            get_calls: AtomicU32::new(0),
        };
        BlobHandle::new(Arc::new(store), UploadTarget::new("media", path))
    }

    async fn seeded(path: &str, content_type: &str, data: &'static [u8]) -> MemoryAppendBlobStore {
        let store = MemoryAppendBlobStore::new();
        store.create_append_blob("media", path, content_type).await.unwrap();
        store
            .append_block(
                "media",
                path,
                AppendBlock {
                    payload: Bytes::from_static(data),
                    content_md5: content_md5(data),
                    timeout: Duration::from_secs(300),
                },
            )
            .await
            .unwrap();
        store
    }

    fn handle(store: &MemoryAppendBlobStore, path: &str) -> BlobHandle {
        BlobHandle::new(Arc::new(store.clone()), UploadTarget::new("media", path))
    }

    #[tokio::test]
    async fn test_existing_blob_metadata() {
        let store = seeded("docs/report.pdf", "application/pdf", b"%PDF-1.7").await;
        let mut handle = handle(&store, "docs/report.pdf");

        assert!(handle.exists().await.unwrap());
        assert_eq!(handle.size().await.unwrap(), Some(8));
        assert_eq!(handle.content_type().await.unwrap().as_deref(), Some("application/pdf"));
        assert_eq!(handle.read().await.unwrap(), Some(Bytes::from_static(b"%PDF-1.7")));
    }

    #[tokio::test]
    async fn test_missing_blob_reports_absence() {
        let store = MemoryAppendBlobStore::new();
        let mut handle = handle(&store, "nothing/here.txt");

        assert!(!handle.exists().await.unwrap());
        assert_eq!(handle.size().await.unwrap(), None);
        assert_eq!(handle.content_type().await.unwrap(), None);
        assert_eq!(handle.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_is_cached_for_the_handle_lifetime() {
        let store = MemoryAppendBlobStore::new();
        let mut handle = handle(&store, "late.txt");
        assert!(!handle.exists().await.unwrap());

        // Created after the first fetch: this handle keeps its stale view.
        store.create_append_blob("media", "late.txt", "text/plain").await.unwrap();
        assert!(!handle.exists().await.unwrap());

        let mut fresh = BlobHandle::new(Arc::new(store.clone()), UploadTarget::new("media", "late.txt"));
        assert!(fresh.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_content_type_wins() {
        let store = seeded("a.bin", "application/octet-stream", b"x").await;
        let mut handle = handle(&store, "a.bin");

        handle.set_content_type("image/png");
        assert_eq!(handle.content_type().await.unwrap().as_deref(), Some("image/png"));
    }

    #[test]
    fn test_url_with_and_without_asset_host() {
        let store = MemoryAppendBlobStore::new();

        let plain = handle(&store, "uploads/a.png");
        assert_eq!(plain.url(), "memory://media/uploads/a.png");

        let hosted = handle(&store, "uploads/a.png").with_asset_host("https://cdn.example.com");
        assert_eq!(hosted.url(), "https://cdn.example.com/media/uploads/a.png");
    }

    #[test]
    fn test_filename_is_decoded_last_segment() {
        let store = MemoryAppendBlobStore::new();
        let handle = handle(&store, "uploads/my%20photo.png");
        assert_eq!(handle.filename(), "my photo.png");
    }

    #[test]
    fn test_extension() {
        let store = MemoryAppendBlobStore::new();
        assert_eq!(handle(&store, "a/b/archive.tar.gz").extension(), "gz");
        assert_eq!(handle(&store, "a/b/README").extension(), "a/b/README");
    }

    #[tokio::test]
    async fn test_delete_returns_false_for_missing_blob() {
        let store = seeded("gone.txt", "text/plain", b"bye").await;
        let handle = handle(&store, "gone.txt");

        assert!(handle.delete().await.unwrap());
        assert!(!handle.delete().await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_is_not_cached() {
        let store = seeded("busy.txt", "text/plain", b"hi").await;
        let mut handle = flaky(store, "busy.txt");

        let first = handle.exists().await;
        assert!(matches!(first, Err(BlobError::Http { status: 503, .. })));

        assert!(handle.exists().await.unwrap());
        assert_eq!(handle.size().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_transport_failure_propagates() {
        let store = seeded("slow.txt", "text/plain", b"hi").await;
        let handle = flaky(store.clone(), "slow.txt");

        let result = handle.delete().await;

        assert!(matches!(result, Err(BlobError::Timeout { .. })));
        assert_eq!(store.len(), 1);
    }
}
