//! Upload element readers: the sources a request body is drained from.

use std::io::{self, Read};

use bytes::Bytes;

use crate::error::NetError;

/// Size of the scratch buffer used when draining a `Read` source.
pub const UPLOAD_CHUNK_SIZE: usize = 1024;

/// A request body source. `read_all` must either append the whole element to
/// `sink` or fail.
pub trait UploadElementReader: Send {
    fn read_all(&mut self, sink: &mut Vec<u8>) -> Result<(), NetError>;
}

/// An in-memory upload element.
#[derive(Debug, Clone)]
pub struct BytesUploadReader {
    data: Bytes,
}

impl BytesUploadReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl UploadElementReader for BytesUploadReader {
    fn read_all(&mut self, sink: &mut Vec<u8>) -> Result<(), NetError> {
        sink.extend_from_slice(&self.data);
        Ok(())
    }
}

/// Drains any blocking `Read` source until EOF.
pub struct IoUploadReader<R> {
    source: R,
}

impl<R: Read + Send> IoUploadReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }
}

impl<R: Read + Send> UploadElementReader for IoUploadReader<R> {
    fn read_all(&mut self, sink: &mut Vec<u8>) -> Result<(), NetError> {
        let mut buf = [0u8; UPLOAD_CHUNK_SIZE];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => sink.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("upload reader failed after {} bytes: {e}", sink.len());
                    return Err(NetError::UploadReadFailed(e.to_string()));
                }
            }
        }
    }
}

/// Drain every reader in order into one buffer, stopping at the first failure.
pub fn drain_readers(readers: &mut [Box<dyn UploadElementReader>]) -> Result<Vec<u8>, NetError> {
    let mut body = Vec::new();
    for reader in readers.iter_mut() {
        reader.read_all(&mut body)?;
    }
    Ok(body)
}
