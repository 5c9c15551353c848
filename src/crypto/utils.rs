//! Stream chunking and transport-encoding detection shared by the key ring
//! loader and the signature engine.

use crate::error::{Result, SignerError};
use std::io::{self, Read};

/// Size of every read issued against a caller-supplied stream.
pub const CHUNK_SIZE: usize = 4096;

const ARMOR_PREFIX: &[u8] = b"-----BEGIN PGP";

/// Transport encoding of an OpenPGP blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Radix-64 with `-----BEGIN PGP ...-----` delimiters and a CRC24 trailer.
    Armored,
    /// Raw packet stream.
    Binary,
}

impl Encoding {
    /// Detect the encoding from the first bytes, ignoring leading whitespace.
    pub fn detect(bytes: &[u8]) -> Self {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        if bytes[start..].starts_with(ARMOR_PREFIX) {
            Encoding::Armored
        } else {
            Encoding::Binary
        }
    }
}

/// Reader adapter that bounds each read to [`CHUNK_SIZE`] and remembers the
/// first I/O failure of the wrapped stream.
///
/// rPGP folds reader errors into its own error type. Keeping the original
/// `io::Error` here lets the engine report it as an I/O failure instead of a
/// cryptographic one.
pub struct ChunkedReader<R> {
    inner: R,
    consumed: u64,
    exhausted: bool,
    failure: Option<io::Error>,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            exhausted: false,
            failure: None,
        }
    }

    /// Total bytes handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Whether the wrapped stream reported end-of-stream.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Take the recorded stream failure, if any.
    pub fn take_failure(&mut self) -> Option<io::Error> {
        self.failure.take()
    }

    /// Feed every chunk to `consumer` until end-of-stream.
    ///
    /// Short reads are normal for pipes and sockets; only a zero-length read
    /// ends the loop.
    pub fn for_each_chunk<F>(&mut self, mut consumer: F) -> io::Result<()>
    where
        F: FnMut(&[u8]),
    {
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let length = self.read(&mut buffer)?;
            if length == 0 {
                return Ok(());
            }
            consumer(&buffer[..length]);
        }
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.exhausted {
            return Ok(0);
        }
        let limit = buf.len().min(CHUNK_SIZE);
        loop {
            match self.inner.read(&mut buf[..limit]) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(length) => {
                    self.consumed += length as u64;
                    return Ok(length);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let forwarded = io::Error::new(e.kind(), e.to_string());
                    if self.failure.is_none() {
                        self.failure = Some(e);
                    }
                    return Err(forwarded);
                }
            }
        }
    }
}

/// Drain a stream into memory in fixed-size chunks.
pub fn read_fully<R: Read>(stream: R, context: &str) -> Result<Vec<u8>> {
    let mut reader = ChunkedReader::new(stream);
    let mut bytes = Vec::new();
    reader
        .for_each_chunk(|chunk| bytes.extend_from_slice(chunk))
        .map_err(|e| {
            let cause = reader.take_failure().unwrap_or(e);
            SignerError::io(format!("reading {}", context), cause)
        })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields at most `step` bytes per read, like a pipe.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn test_detect_armored_with_leading_whitespace() {
        assert_eq!(
            Encoding::detect(b"\r\n  -----BEGIN PGP SIGNATURE-----\n"),
            Encoding::Armored
        );
        assert_eq!(Encoding::detect(&[0x88, 0x75, 0x04]), Encoding::Binary);
        assert_eq!(Encoding::detect(b""), Encoding::Binary);
    }

    #[test]
    fn test_short_reads_are_looped_until_exhausted() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = ChunkedReader::new(Trickle {
            data: &data,
            step: 7,
        });

        let mut collected = Vec::new();
        reader
            .for_each_chunk(|chunk| {
                assert!(chunk.len() <= CHUNK_SIZE);
                collected.extend_from_slice(chunk);
            })
            .unwrap();

        assert_eq!(collected, data);
        assert_eq!(reader.consumed(), data.len() as u64);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_reads_are_capped_at_chunk_size() {
        let data = vec![1u8; CHUNK_SIZE * 3];
        let mut reader = ChunkedReader::new(data.as_slice());
        let mut buf = vec![0u8; CHUNK_SIZE * 2];
        assert_eq!(reader.read(&mut buf).unwrap(), CHUNK_SIZE);
    }

    #[test]
    fn test_failure_is_recorded() {
        let mut reader = ChunkedReader::new(Broken);
        let err = reader.for_each_chunk(|_| {}).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let original = reader.take_failure().unwrap();
        assert_eq!(original.kind(), io::ErrorKind::BrokenPipe);
        assert!(reader.take_failure().is_none());
    }

    #[test]
    fn test_read_fully_maps_io_errors() {
        let err = read_fully(Broken, "signature").unwrap_err();
        assert!(matches!(err, SignerError::Io { .. }));
        assert!(err.to_string().contains("reading signature"));
    }
}
