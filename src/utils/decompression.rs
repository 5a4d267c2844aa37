//! Transparent decompression of playlist documents
//!
//! Some providers serve playlists gzip-compressed without a matching
//! `Content-Encoding` header, so the format is detected from magic bytes.

use bytes::Bytes;

/// Compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        match infer::get(data) {
            Some(kind) if kind.mime_type() == "application/gzip" => CompressionFormat::Gzip,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Decompress data based on detected format
    ///
    /// Output larger than `max_output` bytes is an `InvalidData` error.
    pub fn decompress(data: Bytes, max_output: usize) -> std::io::Result<Vec<u8>> {
        match Self::detect_compression_format(&data) {
            CompressionFormat::Gzip => Self::decompress_gzip(data, max_output),
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }

    #[cfg(feature = "compression-gzip")]
    fn decompress_gzip(data: Bytes, max_output: usize) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        // one byte past the limit tells a full-size document from an oversized one
        let mut decoder = GzDecoder::new(data.as_ref()).take(max_output as u64 + 1);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() > max_output {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("decompressed size exceeds {max_output} bytes"),
            ));
        }
        Ok(decompressed)
    }

    #[cfg(not(feature = "compression-gzip"))]
    fn decompress_gzip(_data: Bytes, _max_output: usize) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "gzip-compressed playlist but gzip support is not compiled in",
        ))
    }
}
