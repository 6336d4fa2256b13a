// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! JPEG marker parsing and writing.
//!
//! [`SegmentReader`] walks the marker segments of a byte stream, tolerating
//! fill bytes and stray non-marker bytes between segments. SOS and DRI
//! bodies are parsed here; the other segments have their own modules.

use log::warn;

use super::error::{JpegError, Result};

/// JPEG marker constants.
pub const SOF0: u8 = 0xC0;
pub const SOF1: u8 = 0xC1;
pub const SOF2: u8 = 0xC2;
pub const DHT: u8 = 0xC4;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DRI: u8 = 0xDD;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP2: u8 = 0xE2;
pub const APP14: u8 = 0xEE;
pub const APP15: u8 = 0xEF;
pub const COM: u8 = 0xFE;

/// True for RST0–RST7.
pub fn is_restart(marker: u8) -> bool {
    (RST0..=RST7).contains(&marker)
}

/// True for APP0–APP15.
pub fn is_app(marker: u8) -> bool {
    (APP0..=APP15).contains(&marker)
}

/// SOF markers of processes this codec does not implement: lossless,
/// hierarchical and arithmetic-coded frames.
pub fn is_unsupported_sof(marker: u8) -> bool {
    matches!(
        marker,
        0xC3 // SOF3 lossless
        | 0xC5..=0xC7 // SOF5-7 differential
        | 0xC9..=0xCB // SOF9-11 arithmetic
        | 0xCD..=0xCF // SOF13-15 differential arithmetic
    )
}

/// Cursor over the marker segments of a JPEG stream.
pub struct SegmentReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Consume the SOI marker that must open every stream.
    pub fn expect_soi(&mut self) -> Result<()> {
        if self.data.len() < 2 || self.data[0] != 0xFF || self.data[1] != SOI {
            return Err(JpegError::NotAJpeg);
        }
        self.pos = 2;
        Ok(())
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Resume at `pos`, e.g. after entropy-coded data.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Advance to the next marker and return its code, or `None` at the
    /// end of the data.
    ///
    /// Runs of 0xFF fill bytes are skipped. Other bytes before a marker,
    /// including a stuffed `FF 00` pair, are extraneous and skipped with a
    /// warning.
    pub fn next_marker(&mut self) -> Option<u8> {
        let data = self.data;
        let mut skipped = 0usize;
        loop {
            while self.pos < data.len() && data[self.pos] != 0xFF {
                self.pos += 1;
                skipped += 1;
            }
            while self.pos + 1 < data.len() && data[self.pos + 1] == 0xFF {
                self.pos += 1;
            }
            if self.pos + 1 >= data.len() {
                self.pos = data.len();
                if skipped > 0 {
                    warn!("{skipped} extraneous bytes at end of data");
                }
                return None;
            }
            let marker = data[self.pos + 1];
            self.pos += 2;
            if marker == 0x00 {
                skipped += 2;
                continue;
            }
            if skipped > 0 {
                warn!("skipped {skipped} extraneous bytes before marker 0xFF{marker:02X}");
            }
            return Some(marker);
        }
    }

    /// Read the length-prefixed body of the segment whose marker was just returned.
    pub fn read_segment(&mut self) -> Result<&'a [u8]> {
        let data = self.data;
        if self.pos + 2 > data.len() {
            return Err(JpegError::UnexpectedEof);
        }
        let length = u16::from_be_bytes([data[self.pos], data[self.pos + 1]]) as usize;
        if length < 2 {
            return Err(JpegError::InvalidSegment("invalid segment length"));
        }
        let end = self.pos + length;
        if end > data.len() {
            return Err(JpegError::UnexpectedEof);
        }
        let body = &data[self.pos + 2..end];
        self.pos = end;
        Ok(body)
    }
}

/// Find the end of entropy-coded data starting at `pos`.
///
/// Skips stuffed bytes, restart markers and fill bytes. Returns the offset
/// of the 0xFF of the next real marker, or the data length if none follows.
pub fn skip_entropy_data(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data.get(pos + 1) {
            None => return data.len(),
            Some(0x00) => pos += 2,
            Some(&m) if is_restart(m) => pos += 2,
            Some(0xFF) => pos += 1,
            Some(_) => return pos,
        }
    }
    data.len()
}

/// Spectral selection and successive approximation parameters from an SOS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SosParams {
    /// Start of spectral selection (zigzag index 0-63).
    pub ss: u8,
    /// End of spectral selection (zigzag index 0-63).
    pub se: u8,
    /// Successive approximation high bit (0 = first scan for this band).
    pub ah: u8,
    /// Successive approximation low bit (point transform).
    pub al: u8,
}

impl SosParams {
    /// Parameters of a sequential (baseline) scan.
    pub const SEQUENTIAL: SosParams = SosParams {
        ss: 0,
        se: 63,
        ah: 0,
        al: 0,
    };
}

/// One component selector of an SOS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSelector {
    pub component_id: u8,
    pub dc_table: u8,
    pub ac_table: u8,
}

/// Parsed SOS header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    pub selectors: Vec<ScanSelector>,
    pub params: SosParams,
}

/// Parse an SOS (Start of Scan) header body.
pub fn parse_sos(data: &[u8]) -> Result<ScanHeader> {
    let num_components = *data.first().ok_or(JpegError::InvalidSegment("SOS has wrong length"))? as usize;
    if !(1..=4).contains(&num_components) {
        return Err(JpegError::InvalidSegment("SOS has wrong number of components"));
    }
    if data.len() != 1 + num_components * 2 + 3 {
        return Err(JpegError::InvalidSegment("SOS has wrong length"));
    }

    let selectors = data[1..1 + num_components * 2]
        .chunks_exact(2)
        .map(|sel| ScanSelector {
            component_id: sel[0],
            dc_table: sel[1] >> 4,
            ac_table: sel[1] & 0x0F,
        })
        .collect();

    let p = &data[1 + num_components * 2..];
    let params = SosParams {
        ss: p[0],
        se: p[1],
        ah: p[2] >> 4,
        al: p[2] & 0x0F,
    };
    Ok(ScanHeader { selectors, params })
}

/// Write an SOS segment (including marker and length).
pub fn write_sos(header: &ScanHeader) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + header.selectors.len() * 2);
    body.push(header.selectors.len() as u8);
    for sel in &header.selectors {
        body.push(sel.component_id);
        body.push((sel.dc_table << 4) | (sel.ac_table & 0x0F));
    }
    let p = header.params;
    body.extend_from_slice(&[p.ss, p.se, (p.ah << 4) | (p.al & 0x0F)]);
    segment(SOS, &body)
}

/// Parse DRI (Define Restart Interval) marker data.
pub fn parse_dri(data: &[u8]) -> Result<u16> {
    match data {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(JpegError::InvalidSegment("DRI has wrong length")),
    }
}

/// Write a DRI segment.
pub fn write_dri(interval: u16) -> Vec<u8> {
    segment(DRI, &interval.to_be_bytes())
}

/// Frame a segment body with its marker and big-endian length.
///
/// Callers keep bodies below 65534 bytes.
pub fn segment(marker: u8, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= u16::MAX as usize - 2);
    let length = (body.len() + 2) as u16;
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soi_required() {
        assert!(SegmentReader::new(&[0xFF, 0xD8]).expect_soi().is_ok());
        assert!(matches!(SegmentReader::new(&[0x00, 0x00]).expect_soi(), Err(JpegError::NotAJpeg)));
        assert!(matches!(SegmentReader::new(&[0xFF]).expect_soi(), Err(JpegError::NotAJpeg)));
    }

    #[test]
    fn walk_segments() {
        let data = [
            0xFF, 0xD8, // SOI
            0xFF, 0xFE, 0x00, 0x04, b'h', b'i', // COM
            0xFF, 0xD9, // EOI
        ];
        let mut r = SegmentReader::new(&data);
        r.expect_soi().unwrap();
        assert_eq!(r.next_marker(), Some(COM));
        assert_eq!(r.read_segment().unwrap(), b"hi");
        assert_eq!(r.next_marker(), Some(EOI));
        assert_eq!(r.next_marker(), None);
    }

    #[test]
    fn skips_fill_and_extraneous_bytes() {
        let data = [0xFF, 0xD8, 0x12, 0x34, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xD9];
        let mut r = SegmentReader::new(&data);
        r.expect_soi().unwrap();
        assert_eq!(r.next_marker(), Some(EOI));
    }

    #[test]
    fn truncated_segment() {
        let data = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00];
        let mut r = SegmentReader::new(&data);
        r.expect_soi().unwrap();
        assert_eq!(r.next_marker(), Some(DQT));
        assert!(matches!(r.read_segment(), Err(JpegError::UnexpectedEof)));
    }

    #[test]
    fn bad_segment_length() {
        let data = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x01];
        let mut r = SegmentReader::new(&data);
        r.expect_soi().unwrap();
        r.next_marker();
        assert!(matches!(r.read_segment(), Err(JpegError::InvalidSegment(_))));
    }

    #[test]
    fn entropy_skip() {
        let data = [0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD3, 0x56, 0xFF, 0xFF, 0xD9];
        assert_eq!(skip_entropy_data(&data, 0), 8);
        assert_eq!(skip_entropy_data(&data[..4], 0), 4);
    }

    #[test]
    fn sos_roundtrip() {
        let header = ScanHeader {
            selectors: vec![
                ScanSelector { component_id: 1, dc_table: 0, ac_table: 0 },
                ScanSelector { component_id: 2, dc_table: 1, ac_table: 1 },
            ],
            params: SosParams::SEQUENTIAL,
        };
        let written = write_sos(&header);
        assert_eq!(&written[..4], &[0xFF, 0xDA, 0x00, 0x0A]);
        assert_eq!(parse_sos(&written[4..]).unwrap(), header);
    }

    #[test]
    fn sos_successive_approximation() {
        let data = [1, 1, 0x00, 1, 5, 0x21];
        let header = parse_sos(&data).unwrap();
        assert_eq!(header.params, SosParams { ss: 1, se: 5, ah: 2, al: 1 });
    }

    #[test]
    fn sos_wrong_length() {
        assert!(parse_sos(&[2, 1, 0x00, 0, 63, 0]).is_err());
        assert!(parse_sos(&[0, 0, 63, 0]).is_err());
        assert!(parse_sos(&[]).is_err());
    }

    #[test]
    fn dri_value() {
        assert_eq!(parse_dri(&[0x00, 0x0A]).unwrap(), 10);
        assert!(matches!(
            parse_dri(&[0x00, 0x0A, 0x00]),
            Err(JpegError::InvalidSegment("DRI has wrong length"))
        ));
        assert_eq!(write_dri(10), vec![0xFF, 0xDD, 0x00, 0x04, 0x00, 0x0A]);
    }

    #[test]
    fn unsupported_processes() {
        assert!(is_unsupported_sof(0xC3));
        assert!(is_unsupported_sof(0xC9));
        assert!(!is_unsupported_sof(SOF0));
        assert!(!is_unsupported_sof(SOF2));
        assert!(!is_unsupported_sof(DHT));
    }
}
