// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! # phasm-jpeg
//!
//! Pure-Rust JPEG codec: baseline and progressive decoding, baseline
//! encoding.
//!
//! - **Decode** to Gray8/RGB8 pixels with [`JpegDecoder::decode`], to the
//!   quantized coefficient planes with [`JpegDecoder::decode_coefficients`],
//!   or only the header with [`JpegDecoder::read_info`].
//! - **Encode** Gray8, RGB8 or RGBA8 pixels with [`JpegEncoder`], with
//!   4:4:4 or 4:2:0 chroma, optional restart markers, optimized Huffman
//!   tables and EXIF/ICC/JFIF-density metadata.
//!
//! Truncated streams decode to a partial image flagged
//! [`DecodedImage::truncated`] instead of failing. Dequantization, IDCT,
//! colour conversion and the forward DCT run on Rayon when the `parallel`
//! feature (default) is enabled.
//!
//! The library logs through the `log` facade and never installs a logger.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use phasm_jpeg::{EncoderConfig, Image, JpegDecoder, JpegEncoder, PixelFormat};
//!
//! let jpeg = std::fs::read("photo.jpg").unwrap();
//! let decoded = JpegDecoder::default().decode(&jpeg).unwrap();
//! println!("{}x{} {:?}", decoded.info.width, decoded.info.height, decoded.info.color_space);
//!
//! let encoder = JpegEncoder::new(EncoderConfig::default().with_quality(90));
//! let bytes = encoder.encode_to_vec(&decoded.image).unwrap();
//! ```

pub mod image;
pub mod jpeg;

pub use image::{Image, PixelFormat};
pub use jpeg::error::{ErrorKind, JpegError, Result as JpegResult};
pub use jpeg::dct::{DctGrid, QuantTable};
pub use jpeg::frame::FrameInfo;
pub use jpeg::{
    ChromaSubsampling, CoefficientImage, ColorSpace, ComponentCoefficients, DecodedImage, DecoderOptions, Density,
    DensityUnit, EncoderConfig, ImageInfo, JpegDecoder, JpegEncoder,
};
