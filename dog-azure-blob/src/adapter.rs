use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{instrument, warn};

use crate::{
    AppendBlobStore, AzureBlobService, AzureStorageConfig, BlobError, BlobHandle, BlobResult, ChunkedUploader,
    PrefixStorePath, StorePath, UploadFile, UploadTarget,
};

/// Entry point for the host application: store files, retrieve handles.
pub struct BlobAdapter {
    store: Arc<dyn AppendBlobStore>,
    paths: Arc<dyn StorePath>,
    uploader: ChunkedUploader,
    config: AzureStorageConfig,
}

impl BlobAdapter {
    /// Create an adapter over any append-blob store
    pub fn new<S: AppendBlobStore + 'static>(store: S, config: AzureStorageConfig) -> BlobResult<Self> {
        Self::with_store_path(store, PrefixStorePath::default(), config)
    }

    /// Create with a custom store-path strategy
    pub fn with_store_path<S, P>(store: S, paths: P, config: AzureStorageConfig) -> BlobResult<Self>
    where
        S: AppendBlobStore + 'static,
        P: StorePath + 'static,
    {
        config.validate()?;

        let store: Arc<dyn AppendBlobStore> = Arc::new(store);
        let uploader = ChunkedUploader::new(store.clone())
            .with_chunk_size(config.chunk_size)
            .with_append_timeout(config.append_timeout);

        Ok(Self {
            store,
            paths: Arc::new(paths),
            uploader,
            config,
        })
    }

    /// Create an adapter backed by the Azure REST service described in `config`
    pub fn azure(config: AzureStorageConfig) -> BlobResult<Self> {
        let service = AzureBlobService::from_config(&config)?;
        Self::new(service, config)
    }

    /// Build configuration and client from `AZURE_*` environment variables
    pub fn from_env() -> BlobResult<Self> {
        Self::azure(AzureStorageConfig::from_env()?)
    }

    fn target(&self, identifier: &str) -> UploadTarget {
        UploadTarget::new(self.config.container.clone(), self.paths.store_path(identifier))
    }

    fn handle(&self, target: UploadTarget) -> BlobHandle {
        let handle = BlobHandle::new(self.store.clone(), target);
        match &self.config.asset_host {
            Some(host) => handle.with_asset_host(host.clone()),
            None => handle,
        }
    }

    /// Stream `file` into the append blob for `identifier`.
    ///
    /// Returns `Ok(None)` when no append blob could be found or created; no
    /// chunk is sent in that case. Errors after that point propagate, with
    /// already appended chunks left in place.
    #[instrument(skip(self, file), fields(container = %self.config.container))]
    pub async fn store<R>(&self, identifier: &str, file: UploadFile<R>) -> BlobResult<Option<BlobHandle>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let content_type = file
            .content_type
            .unwrap_or_else(|| self.config.content_type.clone());
        let target = self.target(identifier).with_content_type(content_type);

        match self.uploader.upload(&target, file.reader).await {
            Ok(_) => Ok(Some(self.handle(target))),
            Err(BlobError::StoreAborted { path, source }) => {
                warn!(%path, error = %source, "Store aborted before any chunk was sent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Handle for a previously stored identifier. Nothing is fetched until
    /// an accessor needs it.
    pub fn retrieve(&self, identifier: &str) -> BlobHandle {
        self.handle(self.target(identifier))
    }

    pub fn uploader(&self) -> &ChunkedUploader {
        &self.uploader
    }

    pub fn config(&self) -> &AzureStorageConfig {
        &self.config
    }
}
