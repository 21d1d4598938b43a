use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument};

use crate::chunk::chunk_stream;
use crate::config::{DEFAULT_APPEND_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE, MAX_APPEND_BLOCK_BYTES};
use crate::{AppendBlobStore, AppendBlock, BlobError, BlobResult, ChunkDescriptor, UploadTarget};

/// How the resolver obtained the append target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// A blob already existed at the path and is appended to
    Existing,
    /// No blob existed; a new append blob was created
    Created,
}

/// Outcome of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub resolution: Resolution,
    pub chunks: u32,
    pub bytes: u64,
}

/// Streams a reader into an append blob one block at a time.
///
/// Chunks are read, checksummed and appended strictly in sequence; the
/// next chunk is not read until the previous append has completed, so at
/// most one chunk is held in memory. Failed appends are neither retried
/// nor rolled back.
#[derive(Clone)]
pub struct ChunkedUploader {
    store: Arc<dyn AppendBlobStore>,
    chunk_size: usize,
    append_timeout: Duration,
}

impl ChunkedUploader {
    pub fn new(store: Arc<dyn AppendBlobStore>) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            append_timeout: DEFAULT_APPEND_TIMEOUT,
        }
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_append_timeout(mut self, timeout: Duration) -> Self {
        self.append_timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn check_chunk_size(&self) -> BlobResult<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_APPEND_BLOCK_BYTES {
            return Err(BlobError::invalid(format!(
                "chunk size {} must be between 1 and {} bytes",
                self.chunk_size, MAX_APPEND_BLOCK_BYTES
            )));
        }
        Ok(())
    }

    /// Resolve the target blob, then append every chunk of `reader` to it.
    ///
    /// An out-of-range chunk size is rejected with [`BlobError::Invalid`]
    /// before the blob is touched. Resolver failures become
    /// [`BlobError::StoreAborted`] and send no chunks. A failure while chunking or appending becomes
    /// [`BlobError::PartialUpload`]; blocks committed before it stay.
    #[instrument(skip(self, target, reader), fields(blob = %target))]
    pub async fn upload<R>(&self, target: &UploadTarget, reader: R) -> BlobResult<UploadReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.check_chunk_size()?;

        let resolution = self.resolve(target).await.map_err(|e| BlobError::StoreAborted {
            path: target.blob_path(),
            source: Box::new(e),
        })?;

        let (chunks, bytes) = self.append_chunks(target, reader).await?;

        info!(chunks, bytes, ?resolution, "Upload complete");
        Ok(UploadReport {
            resolution,
            chunks,
            bytes,
        })
    }

    /// Reuse the blob at the target path, or create one if there is none.
    ///
    /// An existing blob keeps its metadata; the declared content type only
    /// applies to a newly created blob.
    #[instrument(skip(self, target), fields(blob = %target))]
    pub async fn resolve(&self, target: &UploadTarget) -> BlobResult<Resolution> {
        match self.store.get_blob_properties(&target.container, &target.path).await {
            Ok(properties) => {
                info!(size = properties.content_length, "Appending to existing blob");
                Ok(Resolution::Existing)
            }
            Err(e) if e.is_not_found() => {
                let content_type = target.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
                self.store
                    .create_append_blob(&target.container, &target.path, content_type)
                    .await?;
                info!(content_type, "Created append blob");
                Ok(Resolution::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Append every chunk of `reader` in order. Returns chunk and byte counts.
    pub async fn append_chunks<R>(&self, target: &UploadTarget, reader: R) -> BlobResult<(u32, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.check_chunk_size()?;

        let chunks = chunk_stream(reader, self.chunk_size);
        futures_util::pin_mut!(chunks);

        let mut committed: u32 = 0;
        let mut bytes: u64 = 0;

        loop {
            let sequence = committed + 1;
            let partial = |source: BlobError| BlobError::PartialUpload {
                path: target.blob_path(),
                committed,
                failed_sequence: sequence,
                source: Box::new(source),
            };

            let payload = match chunks.try_next().await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => return Err(partial(e.into())),
            };

            let chunk = ChunkDescriptor::new(sequence, payload);
            let len = chunk.payload.len();
            self.append(target, chunk).await.map_err(partial)?;

            committed = sequence;
            bytes += len as u64;
            debug!(sequence, len, "Appended chunk");
        }

        Ok((committed, bytes))
    }

    async fn append(&self, target: &UploadTarget, chunk: ChunkDescriptor) -> BlobResult<()> {
        let block = AppendBlock {
            payload: chunk.payload,
            content_md5: chunk.checksum,
            timeout: self.append_timeout,
        };

        tokio::time::timeout(
            self.append_timeout,
            self.store.append_block(&target.container, &target.path, block),
        )
        .await
        .map_err(|_| BlobError::Timeout {
            operation: "append block",
            after: self.append_timeout,
        })?
    }
}
