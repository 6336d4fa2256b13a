// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Interleaved 8-bit pixel buffer used as decoder output and encoder input.

use crate::jpeg::error::{JpegError, Result};

/// Sample layout of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    /// RGB plus alpha. The encoder ignores alpha.
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// A row-major image with tightly packed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Image {
    /// Wrap a pixel buffer, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let image = Self {
            width,
            height,
            format,
            data,
        };
        image.check_buffer()?;
        Ok(image)
    }

    /// Check that `data` holds exactly `width * height` pixels. Needed when
    /// the public fields were set directly instead of through [`Image::new`].
    pub fn check_buffer(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize * self.bytes_per_pixel();
        if self.data.len() != expected {
            return Err(JpegError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Bytes of one row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    /// Pixel bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Pixel at (x, y) widened to RGBA. Grey is replicated, missing alpha is 255.
    pub fn pixel_rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.bytes_per_pixel();
        let i = (y as usize * self.width as usize + x as usize) * bpp;
        let p = &self.data[i..i + bpp];
        match self.format {
            PixelFormat::Gray8 => [p[0], p[0], p[0], 255],
            PixelFormat::Rgb8 => [p[0], p[1], p[2], 255],
            PixelFormat::Rgba8 => [p[0], p[1], p[2], p[3]],
        }
    }
}
