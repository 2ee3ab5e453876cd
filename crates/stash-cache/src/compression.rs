//! Streaming compression around archive byte streams.

use crate::types::CompressionType;
use stash_core::{Error, Result};
use std::io::{self, BufReader, Read, Write};

/// Compressing writer selected by [`CompressionType`].
pub enum Encoder<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, algorithm: CompressionType) -> Result<Self> {
        Ok(match algorithm {
            CompressionType::None => Encoder::None(writer),
            CompressionType::Gzip => Encoder::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            CompressionType::Zstd => Encoder::Zstd(
                zstd::stream::write::Encoder::new(writer, 3)
                    .map_err(|e| Error::ArchiveFailed(format!("Zstd init failed: {}", e)))?,
            ),
            CompressionType::Lz4 => Encoder::Lz4(lz4_flex::frame::FrameEncoder::new(writer)),
        })
    }

    /// Write any trailing frame data and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        match self {
            Encoder::None(w) => Ok(w),
            Encoder::Gzip(enc) => enc
                .finish()
                .map_err(|e| Error::ArchiveFailed(format!("Gzip finish failed: {}", e))),
            Encoder::Zstd(enc) => enc
                .finish()
                .map_err(|e| Error::ArchiveFailed(format!("Zstd finish failed: {}", e))),
            Encoder::Lz4(enc) => enc
                .finish()
                .map_err(|e| Error::ArchiveFailed(format!("LZ4 finish failed: {}", e))),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::None(w) => w.write(buf),
            Encoder::Gzip(enc) => enc.write(buf),
            Encoder::Zstd(enc) => enc.write(buf),
            Encoder::Lz4(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::None(w) => w.flush(),
            Encoder::Gzip(enc) => enc.flush(),
            Encoder::Zstd(enc) => enc.flush(),
            Encoder::Lz4(enc) => enc.flush(),
        }
    }
}

/// Decompressing reader selected by [`CompressionType`].
pub enum Decoder<R: Read> {
    None(R),
    Gzip(flate2::read::GzDecoder<R>),
    Zstd(zstd::stream::read::Decoder<'static, BufReader<R>>),
    Lz4(lz4_flex::frame::FrameDecoder<R>),
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, algorithm: CompressionType) -> Result<Self> {
        Ok(match algorithm {
            CompressionType::None => Decoder::None(reader),
            CompressionType::Gzip => Decoder::Gzip(flate2::read::GzDecoder::new(reader)),
            CompressionType::Zstd => Decoder::Zstd(
                zstd::stream::read::Decoder::new(reader).map_err(|e| {
                    Error::ExtractionFailed(format!("Failed to create decoder: {}", e))
                })?,
            ),
            CompressionType::Lz4 => Decoder::Lz4(lz4_flex::frame::FrameDecoder::new(reader)),
        })
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::None(r) => r.read(buf),
            Decoder::Gzip(dec) => dec.read(buf),
            Decoder::Zstd(dec) => dec.read(buf),
            Decoder::Lz4(dec) => dec.read(buf),
        }
    }
}
