//! SHA-256 digests for cached and downloaded objects.

use std::io::{self, Write};

use sha2::{Digest, Sha256};

use crate::error::{GavcError, Result};

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Check `content` against a server-advertised digest (hex, any case).
pub fn verify_sha256(object: &str, content: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(content);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(GavcError::IntegrityMismatch {
            object: object.to_string(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

/// Writer that hashes and counts everything passing through it.
pub(crate) struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Hex digest, byte count and the wrapped writer.
    pub(crate) fn finish(self) -> (String, u64, W) {
        (format!("{:x}", self.hasher.finalize()), self.written, self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(sha256_hex(b""), EMPTY);
    }

    #[test]
    fn test_verify_accepts_uppercase() {
        verify_sha256("empty", b"", &EMPTY.to_uppercase()).unwrap();
        let err = verify_sha256("x", b"x", EMPTY).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    }

    #[test]
    fn test_hashing_writer_matches_digest() {
        let mut w = HashingWriter::new(Vec::new());
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        let (digest, n, buf) = w.finish();
        assert_eq!(n, 11);
        assert_eq!(buf, b"hello world");
        assert_eq!(digest, sha256_hex(b"hello world"));
    }
}
