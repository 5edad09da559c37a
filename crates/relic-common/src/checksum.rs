//! SHA-256 digests for binaries
//!
//! Repositories verify uploaded bytes against a `Digest` header of the form
//! `sha-256=<hex>`.

use crate::error::Result;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Algorithm label used in `Digest` headers
pub const DIGEST_ALGORITHM: &str = "sha-256";

const BUFFER_SIZE: usize = 8192;

/// Hex-encoded SHA-256 of an async stream, consuming it
pub async fn sha256_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Format a hex digest as a `Digest` header value
pub fn digest_header(hex_digest: &str) -> String {
    format!("{}={}", DIGEST_ALGORITHM, hex_digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_sha256_async() {
        let mut reader: &[u8] = b"hello world";
        assert_eq!(sha256_async(&mut reader).await.unwrap(), HELLO_WORLD);
    }

    #[tokio::test]
    async fn test_sha256_async_spans_buffers() {
        let data = vec![b'x'; BUFFER_SIZE * 2 + 17];
        let mut whole: &[u8] = &data;
        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(sha256_async(&mut whole).await.unwrap(), expected);
    }

    #[test]
    fn test_digest_header() {
        assert_eq!(digest_header("abc123"), "sha-256=abc123");
    }
}
