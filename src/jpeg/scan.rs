// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! JPEG scan data encoding and decoding.
//!
//! Decodes entropy-coded scan data into [`DctGrid`]s (one per frame
//! component) and encodes grids back to entropy-coded bytes. Handles
//! interleaved MCU ordering, non-interleaved single-component scans,
//! restart markers, DC prediction and all four progressive scan types.

use log::{trace, warn};

use super::bitio::{BitReader, BitWriter};
use super::dct::DctGrid;
use super::error::{JpegError, Result};
use super::frame::FrameInfo;
use super::huffman::{encode_value, extend_sign, HuffmanDecodeTable, HuffmanEncodeTable};
use super::marker::SosParams;
use super::tables::HuffmanSpec;
use super::zigzag::{NATURAL_TO_ZIGZAG, ZIGZAG_TO_NATURAL};

/// Component selector for one scan component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    /// Index into FrameInfo.components.
    pub comp_idx: usize,
    /// DC Huffman table index.
    pub dc_table: usize,
    /// AC Huffman table index.
    pub ac_table: usize,
}

/// One scan: its components, spectral/approximation parameters and the
/// restart interval in force.
#[derive(Debug, Clone)]
pub struct Scan {
    pub components: Vec<ScanComponent>,
    pub params: SosParams,
    pub restart_interval: u16,
}

/// Which of the coding passes a scan carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Baseline/extended: DC and all AC coefficients at full precision.
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl ScanKind {
    pub fn classify(params: &SosParams, progressive: bool) -> Self {
        match (progressive, params.ss == 0, params.ah == 0) {
            (false, _, _) => Self::Sequential,
            (true, true, true) => Self::DcFirst,
            (true, true, false) => Self::DcRefine,
            (true, false, true) => Self::AcFirst,
            (true, false, false) => Self::AcRefine,
        }
    }

    fn needs_dc_table(self) -> bool {
        matches!(self, Self::Sequential | Self::DcFirst)
    }

    fn needs_ac_table(self) -> bool {
        matches!(self, Self::Sequential | Self::AcFirst | Self::AcRefine)
    }
}

/// Huffman decode tables currently defined, indexed by table ID (0–3).
#[derive(Default)]
pub struct HuffmanTables {
    pub dc: [Option<HuffmanDecodeTable>; 4],
    pub ac: [Option<HuffmanDecodeTable>; 4],
}

impl HuffmanTables {
    /// Build and install a table from a DHT entry, replacing any previous
    /// table in the same slot.
    pub fn install(&mut self, spec: &HuffmanSpec) -> Result<()> {
        let table = HuffmanDecodeTable::build(&spec.bits, &spec.huffval)?;
        let slots = if spec.class == 0 { &mut self.dc } else { &mut self.ac };
        slots[spec.id as usize & 3] = Some(table);
        Ok(())
    }
}

/// Result of decoding one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Byte offset where the reader stopped.
    pub end: usize,
    /// Entropy data ran out before the scan was complete.
    pub truncated: bool,
}

/// Tables resolved for one scan component.
struct BlockCoder<'t> {
    comp_idx: usize,
    dc: Option<&'t HuffmanDecodeTable>,
    ac: Option<&'t HuffmanDecodeTable>,
}

/// Decode one scan into `grids` (indexed by frame component).
///
/// - `data`: full JPEG file bytes
/// - `scan_start`: byte offset of the first entropy-coded byte (right after SOS header)
///
/// Running out of data, or hitting a marker in the middle of the scan, is
/// not an error: decoding stops and the outcome is flagged truncated.
pub fn decode_scan(
    data: &[u8],
    scan_start: usize,
    frame: &FrameInfo,
    scan: &Scan,
    tables: &HuffmanTables,
    grids: &mut [DctGrid],
) -> Result<ScanOutcome> {
    let kind = ScanKind::classify(&scan.params, frame.is_progressive);

    let mut coders = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let dc = if kind.needs_dc_table() {
            let table = tables.dc.get(sc.dc_table).and_then(Option::as_ref);
            Some(table.ok_or(JpegError::MissingHuffmanTable {
                class: "DC",
                id: sc.dc_table as u8,
            })?)
        } else {
            None
        };
        let ac = if kind.needs_ac_table() {
            let table = tables.ac.get(sc.ac_table).and_then(Option::as_ref);
            Some(table.ok_or(JpegError::MissingHuffmanTable {
                class: "AC",
                id: sc.ac_table as u8,
            })?)
        } else {
            None
        };
        coders.push(BlockCoder {
            comp_idx: sc.comp_idx,
            dc,
            ac,
        });
    }

    let (units_wide, units_tall) = scan_geometry(frame, &scan.components);
    let total = units_wide * units_tall;
    let restart_interval = scan.restart_interval as usize;

    let mut dec = BlockDecoder {
        reader: BitReader::new(data, scan_start),
        kind,
        ss: scan.params.ss as usize,
        se: scan.params.se as usize,
        al: scan.params.al,
        dc_pred: [0; 4],
        eob_run: 0,
    };
    let mut truncated = false;
    let mut decoded = 0usize;

    for unit in 0..total {
        if restart_interval > 0 && unit > 0 && unit % restart_interval == 0 {
            // Any RST index is accepted, as libjpeg does
            if dec.reader.check_restart_marker().is_some() {
                dec.dc_pred = [0; 4];
                dec.eob_run = 0;
            } else if at_marker_or_end(data, dec.reader.position()) {
                warn!("entropy data ended at MCU {unit} of {total}");
                truncated = true;
                break;
            } else {
                return Err(JpegError::MissingRestartMarker);
            }
        }

        let (row, col) = (unit / units_wide, unit % units_wide);
        let result = dec.decode_unit(frame, &coders, grids, row, col);
        // Garbage decoded from padding is not a format error
        if dec.reader.is_overrun() {
            warn!("entropy data ended inside MCU {unit} of {total}");
            truncated = true;
            break;
        }
        result?;
        decoded += 1;
    }

    trace!("scan {kind:?} decoded {decoded}/{total} MCUs");
    Ok(ScanOutcome {
        end: dec.reader.position(),
        truncated,
    })
}

/// MCU grid of a scan: whole-MCU grid for interleaved scans, the
/// component's own (unpadded) block grid for single-component scans.
fn scan_geometry(frame: &FrameInfo, components: &[ScanComponent]) -> (usize, usize) {
    match components {
        [only] => (frame.scan_blocks_wide(only.comp_idx), frame.scan_blocks_tall(only.comp_idx)),
        _ => (frame.mcus_wide as usize, frame.mcus_tall as usize),
    }
}

fn at_marker_or_end(data: &[u8], pos: usize) -> bool {
    match data.get(pos..pos + 2) {
        Some([0xFF, next]) => *next != 0x00,
        Some(_) => false,
        None => true,
    }
}

struct BlockDecoder<'d> {
    reader: BitReader<'d>,
    kind: ScanKind,
    ss: usize,
    se: usize,
    al: u8,
    dc_pred: [i32; 4],
    /// Remaining blocks of the current end-of-band run.
    eob_run: u32,
}

impl BlockDecoder<'_> {
    /// Decode one MCU, or one block of a single-component scan.
    fn decode_unit(
        &mut self,
        frame: &FrameInfo,
        coders: &[BlockCoder],
        grids: &mut [DctGrid],
        row: usize,
        col: usize,
    ) -> Result<()> {
        if let [coder] = coders {
            return self.decode_block(coder, 0, grids[coder.comp_idx].block_mut(row, col));
        }
        for (sci, coder) in coders.iter().enumerate() {
            let comp = &frame.components[coder.comp_idx];
            let (h, v) = (comp.h_sampling as usize, comp.v_sampling as usize);
            for by in 0..v {
                for bx in 0..h {
                    let block = grids[coder.comp_idx].block_mut(row * v + by, col * h + bx);
                    self.decode_block(coder, sci, block)?;
                }
            }
        }
        Ok(())
    }

    fn decode_block(&mut self, coder: &BlockCoder, sci: usize, block: &mut [i16]) -> Result<()> {
        match self.kind {
            ScanKind::Sequential => {
                self.decode_dc(coder, sci, 0, block)?;
                self.decode_ac_sequential(coder, block)
            }
            ScanKind::DcFirst => self.decode_dc(coder, sci, self.al, block),
            ScanKind::DcRefine => {
                if self.reader.read_bit() {
                    block[0] |= 1i16 << self.al;
                }
                Ok(())
            }
            ScanKind::AcFirst => self.decode_ac_first(coder, block),
            ScanKind::AcRefine => self.decode_ac_refine(coder, block),
        }
    }

    /// DC difference, added to the predictor and stored shifted left by `al`.
    fn decode_dc(&mut self, coder: &BlockCoder, sci: usize, al: u8, block: &mut [i16]) -> Result<()> {
        let table = coder.dc.ok_or(JpegError::HuffmanDecode)?;
        let size = table.decode(&mut self.reader)?;
        if size > 15 {
            return Err(JpegError::HuffmanDecode);
        }
        if size > 0 {
            let diff = extend_sign(self.reader.read_bits(size), size);
            self.dc_pred[sci] = self.dc_pred[sci].saturating_add(diff as i32);
        }
        block[0] = clamp_i16((self.dc_pred[sci] as i64) << al);
        Ok(())
    }

    fn decode_ac_sequential(&mut self, coder: &BlockCoder, block: &mut [i16]) -> Result<()> {
        let table = coder.ac.ok_or(JpegError::HuffmanDecode)?;
        let mut k = 1;
        while k < 64 {
            let rs = table.decode(&mut self.reader)?;
            let run = (rs >> 4) as usize;
            let size = rs & 0x0F;

            if size == 0 {
                if run == 15 {
                    // ZRL
                    k += 16;
                    continue;
                }
                // EOB
                break;
            }

            k += run;
            if k >= 64 {
                return Err(JpegError::HuffmanDecode);
            }
            block[ZIGZAG_TO_NATURAL[k]] = extend_sign(self.reader.read_bits(size), size);
            k += 1;
        }
        Ok(())
    }

    /// First pass over the band [ss..se], with EOBn runs spanning blocks.
    fn decode_ac_first(&mut self, coder: &BlockCoder, block: &mut [i16]) -> Result<()> {
        if self.eob_run > 0 {
            self.eob_run -= 1;
            return Ok(());
        }
        let table = coder.ac.ok_or(JpegError::HuffmanDecode)?;

        let mut k = self.ss;
        while k <= self.se {
            let rs = table.decode(&mut self.reader)?;
            let run = (rs >> 4) as u32;
            let size = rs & 0x0F;

            if size == 0 {
                if run < 15 {
                    // EOBn: this block plus 2^run - 1 + extra more
                    self.eob_run = (1 << run) - 1;
                    if run > 0 {
                        self.eob_run += self.reader.read_bits(run as u8) as u32;
                    }
                    break;
                }
                k += 16;
                continue;
            }

            k += run as usize;
            if k > self.se {
                return Err(JpegError::HuffmanDecode);
            }
            let value = extend_sign(self.reader.read_bits(size), size);
            block[ZIGZAG_TO_NATURAL[k]] = clamp_i16((value as i64) << self.al);
            k += 1;
        }
        Ok(())
    }

    /// Refinement pass over the band (ITU-T T.81 G.1.2.3): one correction
    /// bit for every coefficient that is already nonzero, interleaved with
    /// newly nonzero coefficients of magnitude 1.
    fn decode_ac_refine(&mut self, coder: &BlockCoder, block: &mut [i16]) -> Result<()> {
        let table = coder.ac.ok_or(JpegError::HuffmanDecode)?;
        let p1 = 1i16 << self.al;
        let m1 = -1i16 << self.al;
        let mut k = self.ss;

        if self.eob_run == 0 {
            while k <= self.se {
                let rs = table.decode(&mut self.reader)?;
                let mut run = (rs >> 4) as u32;
                let size = rs & 0x0F;

                let mut value = 0i16;
                if size != 0 {
                    if size != 1 {
                        return Err(JpegError::HuffmanDecode);
                    }
                    value = if self.reader.read_bit() { p1 } else { m1 };
                } else if run != 15 {
                    self.eob_run = 1 << run;
                    if run > 0 {
                        self.eob_run += self.reader.read_bits(run as u8) as u32;
                    }
                    break;
                }

                // Skip `run` zero coefficients, refining nonzero ones on the way
                while k <= self.se {
                    let coef = &mut block[ZIGZAG_TO_NATURAL[k]];
                    if *coef != 0 {
                        self.refine(coef, p1, m1);
                    } else {
                        if run == 0 {
                            break;
                        }
                        run -= 1;
                    }
                    k += 1;
                }

                if value != 0 && k <= self.se {
                    block[ZIGZAG_TO_NATURAL[k]] = value;
                }
                k += 1;
            }
        }

        if self.eob_run > 0 {
            // Inside an EOB run only correction bits remain
            while k <= self.se {
                let coef = &mut block[ZIGZAG_TO_NATURAL[k]];
                if *coef != 0 {
                    self.refine(coef, p1, m1);
                }
                k += 1;
            }
            self.eob_run -= 1;
        }
        Ok(())
    }

    fn refine(&mut self, coef: &mut i16, p1: i16, m1: i16) {
        if self.reader.read_bit() && (*coef & p1) == 0 {
            *coef = coef.saturating_add(if *coef >= 0 { p1 } else { m1 });
        }
    }
}

fn clamp_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Receiver of the entropy coder's output: either the bit writer or a
/// symbol counter for building optimized tables.
trait EntropySink {
    fn symbol(&mut self, ac: bool, table: usize, symbol: u8) -> Result<()>;
    fn bits(&mut self, bits: u16, size: u8);
    fn restart(&mut self, index: u8);
}

struct HuffmanWriter<'t> {
    writer: BitWriter,
    dc: &'t [HuffmanEncodeTable],
    ac: &'t [HuffmanEncodeTable],
}

impl EntropySink for HuffmanWriter<'_> {
    fn symbol(&mut self, ac: bool, table: usize, symbol: u8) -> Result<()> {
        let tables = if ac { self.ac } else { self.dc };
        let table = tables
            .get(table)
            .ok_or(JpegError::MissingHuffmanTable {
                class: if ac { "AC" } else { "DC" },
                id: table as u8,
            })?;
        let (code, len) = table.encode(symbol)?;
        self.writer.emit(code as u32, len);
        Ok(())
    }

    fn bits(&mut self, bits: u16, size: u8) {
        self.writer.emit(bits as u32, size);
    }

    fn restart(&mut self, index: u8) {
        self.writer.write_marker(super::marker::RST0 + (index & 7));
    }
}

/// Symbol frequencies per table, gathered by a dry run of the encoder.
#[derive(Debug, Clone)]
pub struct SymbolCounts {
    pub dc: Vec<[u32; 256]>,
    pub ac: Vec<[u32; 256]>,
}

impl EntropySink for SymbolCounts {
    fn symbol(&mut self, ac: bool, table: usize, symbol: u8) -> Result<()> {
        let counts = if ac { &mut self.ac } else { &mut self.dc };
        if counts.len() <= table {
            counts.resize(table + 1, [0; 256]);
        }
        counts[table][symbol as usize] += 1;
        Ok(())
    }

    fn bits(&mut self, _bits: u16, _size: u8) {}

    fn restart(&mut self, _index: u8) {}
}

/// Entropy-encode `grids` as one sequential scan.
///
/// `dc_tables`/`ac_tables` are indexed by the table IDs of the scan
/// components. Returns the entropy-coded bytes, including RST markers when
/// `restart_interval` > 0.
pub fn encode_scan(
    frame: &FrameInfo,
    components: &[ScanComponent],
    grids: &[DctGrid],
    dc_tables: &[HuffmanEncodeTable],
    ac_tables: &[HuffmanEncodeTable],
    restart_interval: u16,
) -> Result<Vec<u8>> {
    let capacity = grids.iter().map(|g| g.total_blocks()).sum::<usize>() * 16;
    let mut sink = HuffmanWriter {
        writer: BitWriter::with_capacity(capacity),
        dc: dc_tables,
        ac: ac_tables,
    };
    walk_scan(&mut sink, frame, components, grids, restart_interval)?;
    Ok(sink.writer.finish())
}

/// Count the Huffman symbols `encode_scan` would emit for these grids.
pub fn count_symbols(
    frame: &FrameInfo,
    components: &[ScanComponent],
    grids: &[DctGrid],
    restart_interval: u16,
) -> Result<SymbolCounts> {
    let mut counts = SymbolCounts {
        dc: vec![[0; 256]; 2],
        ac: vec![[0; 256]; 2],
    };
    walk_scan(&mut counts, frame, components, grids, restart_interval)?;
    Ok(counts)
}

fn walk_scan<S: EntropySink>(
    sink: &mut S,
    frame: &FrameInfo,
    components: &[ScanComponent],
    grids: &[DctGrid],
    restart_interval: u16,
) -> Result<()> {
    let (units_wide, units_tall) = scan_geometry(frame, components);
    let restart_interval = restart_interval as usize;
    let mut dc_pred = [0i32; 4];

    for unit in 0..units_wide * units_tall {
        if restart_interval > 0 && unit > 0 && unit % restart_interval == 0 {
            sink.restart(((unit / restart_interval - 1) % 8) as u8);
            dc_pred = [0; 4];
        }

        let (row, col) = (unit / units_wide, unit % units_wide);
        if let [sc] = components {
            encode_block(sink, sc, &mut dc_pred[0], grids[sc.comp_idx].block(row, col))?;
        } else {
            for (sci, sc) in components.iter().enumerate() {
                let comp = &frame.components[sc.comp_idx];
                let (h, v) = (comp.h_sampling as usize, comp.v_sampling as usize);
                for by in 0..v {
                    for bx in 0..h {
                        let block = grids[sc.comp_idx].block(row * v + by, col * h + bx);
                        encode_block(sink, sc, &mut dc_pred[sci], block)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn encode_block<S: EntropySink>(sink: &mut S, sc: &ScanComponent, dc_pred: &mut i32, block: &[i16]) -> Result<()> {
    let mut zz = [0i16; 64];
    for (ni, &v) in block.iter().enumerate() {
        zz[NATURAL_TO_ZIGZAG[ni]] = v;
    }

    let (dc_bits, dc_size) = encode_value(zz[0] as i32 - *dc_pred);
    *dc_pred = zz[0] as i32;
    sink.symbol(false, sc.dc_table, dc_size)?;
    sink.bits(dc_bits, dc_size);

    let mut run = 0u8;
    for &coef in &zz[1..] {
        if coef == 0 {
            run += 1;
            continue;
        }
        while run >= 16 {
            sink.symbol(true, sc.ac_table, 0xF0)?;
            run -= 16;
        }
        let (bits, size) = encode_value(coef as i32);
        sink.symbol(true, sc.ac_table, (run << 4) | size)?;
        sink.bits(bits, size);
        run = 0;
    }
    if run > 0 {
        sink.symbol(true, sc.ac_table, 0x00)?;
    }
    Ok(())
}
