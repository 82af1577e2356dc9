//! Compression codecs for source files.
//!
//! Each codec wraps a raw byte stream in a buffered, decompressing reader so
//! that sources can be streamed line by line without loading them in memory.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Trait for compression codecs that can decompress a stream.
pub trait CompressionCodec: Send + Sync {
    /// Wrap `reader` in a reader yielding decompressed bytes.
    fn wrap<'a>(&self, reader: Box<dyn Read + 'a>) -> io::Result<Box<dyn BufRead + 'a>>;

    /// Human-readable name of this codec (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// Gzip codec using flate2. Accepts multi-member files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn wrap<'a>(&self, reader: Box<dyn Read + 'a>) -> io::Result<Box<dyn BufRead + 'a>> {
        Ok(Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            reader,
        ))))
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Zstandard codec using zstd.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl CompressionCodec for ZstdCodec {
    fn wrap<'a>(&self, reader: Box<dyn Read + 'a>) -> io::Result<Box<dyn BufRead + 'a>> {
        let decoder = zstd::stream::read::Decoder::new(reader)?;
        Ok(Box::new(BufReader::new(decoder)))
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

/// No-op codec for uncompressed data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl CompressionCodec for NoopCodec {
    fn wrap<'a>(&self, reader: Box<dyn Read + 'a>) -> io::Result<Box<dyn BufRead + 'a>> {
        Ok(Box::new(BufReader::new(reader)))
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Compression format of a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    /// Pick from the file extension (`.gz`, `.zst`, otherwise none).
    #[default]
    Auto,
    Gzip,
    Zstd,
    None,
}

impl CompressionFormat {
    /// Resolve `Auto` against the file name.
    pub fn resolve(self, path: &Path) -> CompressionFormat {
        if self != CompressionFormat::Auto {
            return self;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz" | "gzip") => CompressionFormat::Gzip,
            Some("zst" | "zstd") => CompressionFormat::Zstd,
            _ => CompressionFormat::None,
        }
    }

    /// Codec for this format, resolving `Auto` against `path`.
    pub fn codec(self, path: &Path) -> Box<dyn CompressionCodec> {
        match self.resolve(path) {
            CompressionFormat::Gzip => Box::new(GzipCodec),
            CompressionFormat::Zstd => Box::new(ZstdCodec),
            CompressionFormat::None | CompressionFormat::Auto => Box::new(NoopCodec),
        }
    }
}
