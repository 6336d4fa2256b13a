// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Error types for JPEG decoding and encoding.
//!
//! Every failure is one of three kinds (see [`ErrorKind`]): a malformed
//! stream, a valid but unsupported coding process, or an I/O failure from
//! the caller's reader/writer.

use thiserror::Error;

/// Broad category of a [`JpegError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream violates the JPEG grammar.
    Format,
    /// The stream is well formed but uses a feature this codec does not implement.
    Unsupported,
    /// The underlying reader or writer failed.
    Io,
}

/// Errors that can occur during JPEG decoding or encoding.
#[derive(Error, Debug)]
pub enum JpegError {
    /// Missing SOI (0xFFD8) at start of data.
    #[error("missing SOI marker (not a JPEG)")]
    NotAJpeg,
    /// Input ended inside a marker segment.
    #[error("unexpected end of JPEG data")]
    UnexpectedEof,
    /// A marker segment has invalid or inconsistent length/content.
    #[error("invalid marker segment: {0}")]
    InvalidSegment(&'static str),
    /// A marker that may not appear at this point of the stream.
    #[error("unknown or misplaced marker: 0xFF{0:02X}")]
    UnknownMarker(u8),
    /// Four-component frame without an Adobe APP14 segment.
    #[error("unknown color model: 4-component JPEG without Adobe marker")]
    UnknownColorModel,
    /// A restart marker was expected in the entropy-coded data but not found.
    #[error("missing restart marker")]
    MissingRestartMarker,
    /// Huffman decode error (invalid code encountered in scan data).
    #[error("Huffman decode error")]
    HuffmanDecode,
    /// A scan references a Huffman table that was never defined.
    #[error("scan references undefined {class} Huffman table {id}")]
    MissingHuffmanTable { class: &'static str, id: u8 },
    /// A component references a quantization table that was never defined.
    #[error("component references undefined quantization table {0}")]
    MissingQuantTable(u8),
    /// Component ID referenced in SOS not found in SOF.
    #[error("unknown component ID in SOS: {0}")]
    UnknownComponentId(u8),
    /// SOS encountered before any SOF.
    #[error("scan before frame header")]
    MissingFrame,
    /// EOI reached without any scan.
    #[error("no scan data in image")]
    MissingScan,
    /// Image dimensions are zero or out of range.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    /// Image exceeds the configured pixel limit.
    #[error("image of {pixels} pixels exceeds limit of {limit}")]
    ImageTooLarge { pixels: u64, limit: u64 },
    /// A metadata blob does not fit into its APP segments.
    #[error("metadata block of {0} bytes is too large")]
    MetadataTooLarge(usize),
    /// Pixel buffer length does not match its declared geometry.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    /// Sample precision other than 8 bits.
    #[error("unsupported sample precision: {0}-bit")]
    UnsupportedPrecision(u8),
    /// Lossless, hierarchical or arithmetic-coded frame (SOF3, SOF5–SOF15).
    #[error("unsupported coding process: SOF marker 0xFF{0:02X}")]
    UnsupportedProcess(u8),
    /// Marker for a feature outside baseline/progressive Huffman coding
    /// (DAC, DNL, hierarchical or extension markers).
    #[error("unsupported marker: 0xFF{0:02X}")]
    UnsupportedMarker(u8),
    /// Failure of the underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JpegError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedPrecision(_) | Self::UnsupportedProcess(_) | Self::UnsupportedMarker(_) => {
                ErrorKind::Unsupported
            }
            Self::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    /// True for malformed-stream errors.
    pub fn is_format(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}

pub type Result<T> = std::result::Result<T, JpegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(JpegError::InvalidSegment("Bad Pq value").kind(), ErrorKind::Format);
        assert_eq!(JpegError::UnknownColorModel.kind(), ErrorKind::Format);
        assert_eq!(JpegError::UnsupportedPrecision(12).kind(), ErrorKind::Unsupported);
        assert_eq!(JpegError::UnsupportedProcess(0xC3).kind(), ErrorKind::Unsupported);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(JpegError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn messages() {
        let e = JpegError::InvalidSegment("Bad Pq value");
        assert!(e.to_string().contains("Bad Pq value"));
        assert_eq!(
            JpegError::UnknownMarker(0x01).to_string(),
            "unknown or misplaced marker: 0xFF01"
        );
    }
}
