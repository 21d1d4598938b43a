//! Fixed-size chunking of a forward-only reader.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ChunkDescriptor;

/// Split a reader into a lazy stream of chunks.
///
/// Every chunk holds exactly `chunk_size` bytes except the last, which holds
/// the remainder. Empty input yields no chunks. The reader is consumed
/// forward-only; nothing is read until the stream is polled, and at most one
/// chunk is buffered at a time. A `chunk_size` of zero yields a single
/// [`std::io::ErrorKind::InvalidInput`] error.
pub fn chunk_stream<R>(
    mut reader: R,
    chunk_size: usize,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send
where
    R: AsyncRead + Unpin + Send,
{
    async_stream::try_stream! {
        if chunk_size == 0 {
            Err::<(), _>(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk size must be greater than zero",
            ))?;
        }

        loop {
            let mut buf = BytesMut::zeroed(chunk_size);
            let mut filled = 0;

            // Short reads are not chunk boundaries.
            while filled < chunk_size {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                break;
            }

            buf.truncate(filled);
            yield buf.freeze();

            if filled < chunk_size {
                break;
            }
        }
    }
}

/// Base64 of the raw MD5 digest, the form the `Content-MD5` header carries.
pub fn content_md5(payload: &[u8]) -> String {
    BASE64_STANDARD.encode(Md5::digest(payload))
}

impl ChunkDescriptor {
    /// Describe one chunk, computing its checksum over exactly `payload`.
    pub fn new(sequence: u32, payload: Bytes) -> Self {
        let checksum = content_md5(&payload);
        Self {
            sequence,
            payload,
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use proptest::prelude::*;

    async fn collect(data: Vec<u8>, chunk_size: usize) -> Vec<Bytes> {
        chunk_stream(std::io::Cursor::new(data), chunk_size)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_yields_no_chunks() {
        assert!(collect(Vec::new(), 16).await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_short_tail() {
        let chunks = collect(vec![7u8; 64], 16).await;
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 16));
    }

    #[tokio::test]
    async fn test_two_and_a_half_mebibytes() {
        let data: Vec<u8> = (0..(5 * 1024 * 1024 / 2)).map(|i| (i % 251) as u8).collect();
        let chunks = collect(data.clone(), 1024 * 1024).await;

        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1_048_576, 1_048_576, 524_288]);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_short_reads_do_not_split_chunks() {
        // The mock hands out at most 3 bytes per read.
        let reader = tokio_test::io::Builder::new()
            .read(b"abc")
            .read(b"def")
            .read(b"gh")
            .read(b"ijk")
            .build();

        let chunks: Vec<Bytes> = chunk_stream(reader, 4).try_collect().await.unwrap();
        assert_eq!(
            chunks,
            vec![Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh"), Bytes::from_static(b"ijk")]
        );
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_an_error() {
        let result: std::io::Result<Vec<Bytes>> = chunk_stream(std::io::Cursor::new(vec![1u8; 10]), 0)
            .try_collect()
            .await;

        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_read_error_surfaces_in_stream() {
        let reader = tokio_test::io::Builder::new()
            .read(b"abcd")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let mut stream = Box::pin(chunk_stream(reader, 4));
        assert_eq!(stream.try_next().await.unwrap(), Some(Bytes::from_static(b"abcd")));
        let err = stream.try_next().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_content_md5_known_values() {
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(content_md5(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
    }

    #[test]
    fn test_descriptor_checksum_covers_only_its_payload() {
        let first = ChunkDescriptor::new(1, Bytes::from_static(b"hello world"));
        let second = ChunkDescriptor::new(2, Bytes::from_static(b""));
        assert_eq!(first.checksum, "XrY7u+Ae7tCTyyK7j1rNww==");
        assert_eq!(second.checksum, "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_the_input(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk_size in 1usize..512,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let chunks = rt.block_on(collect(data.clone(), chunk_size));

            prop_assert_eq!(chunks.len(), data.len().div_ceil(chunk_size));
            if let Some((last, rest)) = chunks.split_last() {
                prop_assert!(rest.iter().all(|c| c.len() == chunk_size));
                prop_assert!(!last.is_empty() && last.len() <= chunk_size);
            }
            prop_assert_eq!(chunks.concat(), data);
        }

        #[test]
        fn prop_checksum_is_deterministic(payload in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let a = content_md5(&payload);
            let b = content_md5(&payload);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(BASE64_STANDARD.decode(&a).unwrap().len(), 16);
        }
    }
}
