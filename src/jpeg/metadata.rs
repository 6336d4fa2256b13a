// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! APPn segment handling: JFIF, Exif, ICC profile and Adobe markers.
//!
//! EXIF and ICC payloads are carried as opaque byte blobs. Only the fields
//! that affect decoding (JFIF presence, Adobe colour transform) and the JFIF
//! pixel density are interpreted.

use log::{debug, warn};

use super::error::{JpegError, Result};
use super::marker;

const JFIF_TAG: &[u8] = b"JFIF\0";
const EXIF_TAG: &[u8] = b"Exif\0\0";
const ICC_TAG: &[u8] = b"ICC_PROFILE\0";
const ADOBE_TAG: &[u8] = b"Adobe";

/// Largest segment body: 65535 minus the two length bytes.
const MAX_SEGMENT_BODY: usize = 65533;
/// ICC payload per APP2 segment after the tag and the two chunk bytes.
const MAX_ICC_CHUNK: usize = MAX_SEGMENT_BODY - ICC_TAG.len() - 2;

/// Unit of the JFIF density fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityUnit {
    /// No absolute unit, `x`/`y` give the pixel aspect ratio.
    AspectRatio,
    PixelsPerInch,
    PixelsPerCm,
}

impl DensityUnit {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::AspectRatio),
            1 => Some(Self::PixelsPerInch),
            2 => Some(Self::PixelsPerCm),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::AspectRatio => 0,
            Self::PixelsPerInch => 1,
            Self::PixelsPerCm => 2,
        }
    }
}

/// Pixel density from the JFIF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Density {
    pub unit: DensityUnit,
    pub x: u16,
    pub y: u16,
}

impl Density {
    pub fn new(unit: DensityUnit, x: u16, y: u16) -> Self {
        Self { unit, x, y }
    }
}

impl Default for Density {
    /// Square pixels, no absolute resolution.
    fn default() -> Self {
        Self::new(DensityUnit::AspectRatio, 1, 1)
    }
}

/// Metadata collected from the APPn segments of one stream.
#[derive(Debug, Default, Clone)]
pub struct Metadata {
    /// A JFIF APP0 header was present.
    pub is_jfif: bool,
    pub density: Option<Density>,
    /// Colour transform byte of the Adobe APP14 segment.
    pub adobe_transform: Option<u8>,
    pub exif: Option<Vec<u8>>,
    /// ICC chunks as (index, count, payload).
    icc_chunks: Vec<(u8, u8, Vec<u8>)>,
}

impl Metadata {
    /// Record the contents of one APPn segment body.
    ///
    /// Unrecognized payloads are ignored. With `capture_blobs` false the
    /// EXIF and ICC payloads are not copied.
    pub fn parse_app(&mut self, app_marker: u8, body: &[u8], capture_blobs: bool) {
        match app_marker {
            marker::APP0 if body.starts_with(JFIF_TAG) => self.parse_jfif(body),
            marker::APP1 if body.starts_with(EXIF_TAG) => {
                if capture_blobs {
                    debug!("EXIF block of {} bytes", body.len() - EXIF_TAG.len());
                    self.exif = Some(body[EXIF_TAG.len()..].to_vec());
                }
            }
            marker::APP2 if body.starts_with(ICC_TAG) => {
                if capture_blobs {
                    match body.get(ICC_TAG.len()..ICC_TAG.len() + 2) {
                        Some(&[index, count]) => {
                            let payload = body[ICC_TAG.len() + 2..].to_vec();
                            self.icc_chunks.push((index, count, payload));
                        }
                        _ => warn!("ICC chunk header truncated"),
                    }
                }
            }
            marker::APP14 if body.starts_with(ADOBE_TAG) => {
                // "Adobe", version (2), flags0 (2), flags1 (2), transform (1)
                if body.len() >= 12 {
                    self.adobe_transform = Some(body[11]);
                } else {
                    warn!("Adobe APP14 segment too short ({} bytes)", body.len());
                }
            }
            _ => {}
        }
    }

    fn parse_jfif(&mut self, body: &[u8]) {
        self.is_jfif = true;
        if body.len() < 12 {
            warn!("JFIF header too short ({} bytes)", body.len());
            return;
        }
        match DensityUnit::from_byte(body[7]) {
            Some(unit) => {
                let x = u16::from_be_bytes([body[8], body[9]]);
                let y = u16::from_be_bytes([body[10], body[11]]);
                self.density = Some(Density::new(unit, x, y));
            }
            None => warn!("unknown JFIF density unit {}", body[7]),
        }
    }

    /// The ICC profile reassembled from its chunks.
    ///
    /// Returns `None` if no chunk was seen or the chunk set is inconsistent
    /// (differing counts, duplicate or missing indices).
    pub fn icc_profile(&self) -> Option<Vec<u8>> {
        let (_, count, _) = self.icc_chunks.first()?;
        let count = *count as usize;
        let mut ordered: Vec<Option<&[u8]>> = vec![None; count];
        for (index, chunk_count, payload) in &self.icc_chunks {
            let slot = (*index as usize).checked_sub(1).filter(|&i| i < count);
            match slot {
                Some(i) if *chunk_count as usize == count && ordered[i].is_none() => {
                    ordered[i] = Some(payload.as_slice());
                }
                _ => {
                    warn!("inconsistent ICC profile chunks, profile dropped");
                    return None;
                }
            }
        }
        if count == 0 || ordered.iter().any(Option::is_none) {
            warn!("incomplete ICC profile, profile dropped");
            return None;
        }
        Some(ordered.into_iter().flatten().flatten().copied().collect())
    }
}

/// Write a JFIF 1.01 APP0 segment without thumbnail.
pub fn write_jfif(density: &Density) -> Vec<u8> {
    let mut body = Vec::with_capacity(14);
    body.extend_from_slice(JFIF_TAG);
    body.extend_from_slice(&[1, 1, density.unit.to_byte()]);
    body.extend_from_slice(&density.x.to_be_bytes());
    body.extend_from_slice(&density.y.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    marker::segment(marker::APP0, &body)
}

/// Write an Exif APP1 segment. The blob must fit one segment.
pub fn write_exif(exif: &[u8]) -> Result<Vec<u8>> {
    if exif.len() + EXIF_TAG.len() > MAX_SEGMENT_BODY {
        return Err(JpegError::MetadataTooLarge(exif.len()));
    }
    let mut body = Vec::with_capacity(EXIF_TAG.len() + exif.len());
    body.extend_from_slice(EXIF_TAG);
    body.extend_from_slice(exif);
    Ok(marker::segment(marker::APP1, &body))
}

/// Write an ICC profile as a sequence of APP2 segments.
pub fn write_icc(profile: &[u8]) -> Result<Vec<u8>> {
    let num_chunks = profile.len().div_ceil(MAX_ICC_CHUNK);
    if num_chunks > 255 {
        return Err(JpegError::MetadataTooLarge(profile.len()));
    }
    let mut out = Vec::with_capacity(profile.len() + num_chunks * 18);
    let mut body = Vec::with_capacity(MAX_SEGMENT_BODY);
    for (i, chunk) in profile.chunks(MAX_ICC_CHUNK).enumerate() {
        body.clear();
        body.extend_from_slice(ICC_TAG);
        body.push(i as u8 + 1);
        body.push(num_chunks as u8);
        body.extend_from_slice(chunk);
        out.extend_from_slice(&marker::segment(marker::APP2, &body));
    }
    Ok(out)
}
