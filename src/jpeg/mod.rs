// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Pure-Rust JPEG codec.
//!
//! Decodes baseline and progressive JPEG files to pixels (or to quantized
//! DCT coefficients) and encodes pixels to baseline JPEG.
//!
//! Supports:
//! - Baseline (SOF0), extended sequential (SOF1) and progressive (SOF2)
//!   Huffman-coded frames, 8-bit precision
//! - Grayscale, YCbCr, RGB, Adobe CMYK and YCCK colour models
//! - Chroma subsampling 4:4:4, 4:2:2, 4:2:0 and 4:1:1 on decode;
//!   4:4:4 and 4:2:0 on encode
//! - Restart markers (DRI/RST) in both directions
//! - JFIF density, EXIF and ICC profile pass-through
//! - Optimized Huffman tables on encode
//!
//! Does NOT support:
//! - Arithmetic coding, lossless and hierarchical processes (SOF3, SOF5+)
//! - 12-bit precision
//!
//! Pipeline modules, in data-flow order:
//! [`marker`] and [`tables`]/[`frame`]/[`metadata`] parse segments,
//! [`bitio`] and [`huffman`] drive [`scan`], [`transform`] converts between
//! coefficients and samples, [`color`] converts samples to pixels.

pub mod error;
pub mod zigzag;
pub mod dct;
pub mod bitio;
pub mod tables;
pub mod huffman;
pub mod frame;
pub mod marker;
pub mod metadata;
pub mod scan;
pub mod transform;
pub mod color;
pub mod decoder;
pub mod encoder;

pub use color::ColorSpace;
pub use decoder::{CoefficientImage, ComponentCoefficients, DecodedImage, DecoderOptions, ImageInfo, JpegDecoder};
pub use encoder::{ChromaSubsampling, EncoderConfig, JpegEncoder};
pub use error::{ErrorKind, JpegError, Result};
pub use metadata::{Density, DensityUnit};
