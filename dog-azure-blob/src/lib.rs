//! # dog-azure-blob: Chunked append-blob uploads for Azure Blob Storage
//!
//! `dog-azure-blob` persists files of any size to Azure Blob Storage by
//! streaming them in fixed-size chunks and appending each chunk as a block
//! of an append blob.
//!
//! ## Key Features
//!
//! - **Bounded memory**: one chunk (1 MiB by default) in flight, regardless of file size
//! - **Idempotent resolve**: an existing blob is appended to, a missing one is created
//! - **Per-chunk integrity**: every block carries the MD5 of exactly its payload
//! - **Bounded appends**: each append round trip is limited to 5 minutes
//! - **Lazy handles**: metadata and content are fetched once, on first use
//! - **Storage agnostic core**: the engine talks to an [`AppendBlobStore`]; an
//!   Azure REST client and an in-memory store are included
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_azure_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! // 1. Create the adapter (use `BlobAdapter::from_env()` for Azure)
//! let adapter = BlobAdapter::new(
//!     MemoryAppendBlobStore::new(),
//!     AzureStorageConfig::new("media"),
//! )?;
//!
//! // 2. Store a file
//! let file = UploadFile::from_bytes("Hello, world!").with_content_type("text/plain");
//! let mut handle = adapter.store("hello.txt", file).await?.expect("append blob resolved");
//!
//! // 3. Read it back
//! assert!(handle.exists().await?);
//! assert_eq!(handle.size().await?, Some(13));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   BlobAdapter    │  ← store / retrieve, paths, defaults
//! ├──────────────────┤
//! │ ChunkedUploader  │  ← resolve blob, chunk, checksum, append
//! │   BlobHandle     │  ← lazy metadata, url, delete
//! ├──────────────────┤
//! │ AppendBlobStore  │  ← wire operations (Azure REST, memory)
//! └──────────────────┘
//! ```

pub mod adapter;
mod auth;
mod azure;
pub mod chunk;
mod config;
mod error;
mod handle;
mod memory;
pub mod store;
mod types;
mod upload;

pub use adapter::BlobAdapter;
pub use azure::{encode_blob_path, AzureBlobService};
pub use chunk::{chunk_stream, content_md5};
pub use config::{
    AzureStorageConfig, StorageCredentials, DEFAULT_APPEND_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE,
    MAX_APPEND_BLOCK_BYTES,
};
pub use error::{BlobError, BlobResult};
pub use handle::BlobHandle;
pub use memory::MemoryAppendBlobStore;
pub use store::{AppendBlobStore, PrefixStorePath, StorePath};
pub use types::{AppendBlock, BlobProperties, ChunkDescriptor, FetchedBlob, UploadFile, UploadTarget};
pub use upload::{ChunkedUploader, Resolution, UploadReport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AppendBlobStore, AzureStorageConfig, BlobAdapter, BlobError, BlobHandle, BlobResult,
        MemoryAppendBlobStore, UploadFile,
    };
}
