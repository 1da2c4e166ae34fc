// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! H.264 Annex-B bitstream helpers.
//!
//! The central piece is [`extract_parameter_sets`], which pulls the SPS and
//! PPS out of a key frame so the video track can be opened. The producer's
//! encoder emits every key frame as `SPS, PPS, IDR slice...`, each unit
//! preceded by a start code, and the extractor relies on that order: the unit
//! between the first and second start code is the SPS, the unit between the
//! second and third start code is the PPS.
//!
//! A buffer that does not satisfy this layout is not an error. Extraction
//! reports [`Extraction::NotReady`] and the caller tries again on the next key
//! frame.

/// 4-byte Annex-B start code.
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 3-byte Annex-B start code.
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// H.264 NAL unit type constants.
pub mod nal_type {
    /// Non-IDR coded slice
    pub const NON_IDR_SLICE: u8 = 1;
    /// IDR coded slice
    pub const IDR_SLICE: u8 = 5;
    /// Sequence Parameter Set
    pub const SPS: u8 = 7;
    /// Picture Parameter Set
    pub const PPS: u8 = 8;
    /// Access unit delimiter
    pub const AUD: u8 = 9;
}

/// Extracts the NAL unit type from a NAL header byte.
pub fn nal_unit_type(header: u8) -> u8 {
    header & 0x1f
}

/// The pair of parameter sets a decoder (and the `avcC` box) needs before the
/// first slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    /// SPS NAL unit without start code.
    pub sps: Vec<u8>,
    /// PPS NAL unit without start code.
    pub pps: Vec<u8>,
}

impl ParameterSets {
    /// `profile_idc` from the SPS (Baseline=66, Main=77, High=100).
    pub fn profile_idc(&self) -> u8 {
        self.sps.get(1).copied().unwrap_or(66)
    }

    /// Constraint flags byte following `profile_idc`.
    pub fn profile_compatibility(&self) -> u8 {
        self.sps.get(2).copied().unwrap_or(0)
    }

    /// `level_idc` from the SPS (31 = level 3.1).
    pub fn level_idc(&self) -> u8 {
        self.sps.get(3).copied().unwrap_or(31)
    }
}

/// Why a buffer did not yield parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The buffer does not start with a start code followed by an SPS.
    NotKeyFrame,
    /// Fewer than three start codes: the PPS has no closing boundary.
    TooFewStartCodes { found: usize },
    /// The unit after the second start code is not a PPS.
    MissingPps,
}

/// Outcome of [`extract_parameter_sets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Ready(ParameterSets),
    NotReady(NotReadyReason),
}

impl Extraction {
    pub fn ready(self) -> Option<ParameterSets> {
        match self {
            Extraction::Ready(sets) => Some(sets),
            Extraction::NotReady(_) => None,
        }
    }
}

/// A start code found in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    /// Offset of the first byte of the start code.
    pub offset: usize,
    /// 3 or 4.
    pub len: usize,
}

impl StartCode {
    /// Offset of the NAL unit following this start code.
    pub fn payload_offset(&self) -> usize {
        self.offset + self.len
    }
}

/// Returns the length of the start code at `offset`, checking the 4-byte form
/// first.
fn start_code_at(buf: &[u8], offset: usize) -> Option<usize> {
    let rest = &buf[offset..];
    if rest.starts_with(&START_CODE_4) {
        Some(4)
    } else if rest.starts_with(&START_CODE_3) {
        Some(3)
    } else {
        None
    }
}

/// Scans `buf` for start codes.
///
/// Matching resumes right after each start code, so overlapping patterns are
/// never reported twice. The scan stops at `buf.len() - 3`.
pub fn find_start_codes(buf: &[u8]) -> Vec<StartCode> {
    let mut codes = Vec::new();
    let mut i = 0;
    while i + 3 < buf.len() {
        match start_code_at(buf, i) {
            Some(len) => {
                codes.push(StartCode { offset: i, len });
                i += len;
            }
            None => i += 1,
        }
    }
    codes
}

/// Returns the NAL type of the unit at the very start of `buf`, if `buf`
/// begins with a start code.
pub fn leading_nal_type(buf: &[u8]) -> Option<u8> {
    let len = start_code_at(buf, 0)?;
    buf.get(len).copied().map(nal_unit_type)
}

/// Extracts SPS and PPS from a key frame.
///
/// # Examples
///
/// ```
/// use avmux::nal::{extract_parameter_sets, Extraction};
///
/// let keyframe = [
///     0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f, // SPS
///     0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x3c, 0x80, // PPS
///     0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR slice
/// ];
///
/// let sets = extract_parameter_sets(&keyframe).ready().unwrap();
/// assert_eq!(sets.sps, [0x67, 0x42, 0x00, 0x1f]);
/// assert_eq!(sets.pps, [0x68, 0xce, 0x3c, 0x80]);
/// ```
pub fn extract_parameter_sets(buf: &[u8]) -> Extraction {
    if leading_nal_type(buf) != Some(nal_type::SPS) {
        return Extraction::NotReady(NotReadyReason::NotKeyFrame);
    }

    let codes = find_start_codes(buf);
    if codes.len() < 3 {
        return Extraction::NotReady(NotReadyReason::TooFewStartCodes { found: codes.len() });
    }

    let sps = &buf[codes[0].payload_offset()..codes[1].offset];
    let pps = &buf[codes[1].payload_offset()..codes[2].offset];
    if pps.first().map(|header| nal_unit_type(*header)) != Some(nal_type::PPS) {
        return Extraction::NotReady(NotReadyReason::MissingPps);
    }

    Extraction::Ready(ParameterSets {
        sps: sps.to_vec(),
        pps: pps.to_vec(),
    })
}

/// Iterator over the NAL units of an Annex-B buffer, without start codes.
///
/// Unlike [`find_start_codes`] this walks to the very end of the buffer, so
/// the last unit is always yielded in full.
pub struct NalUnits<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> NalUnits<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let pos = next_start_code(buf, 0).map_or(buf.len(), |code| code.payload_offset());
        Self { buf, pos }
    }
}

fn next_start_code(buf: &[u8], from: usize) -> Option<StartCode> {
    let mut i = from;
    while i + 3 <= buf.len() {
        if let Some(len) = start_code_at(buf, i) {
            return Some(StartCode { offset: i, len });
        }
        i += 1;
    }
    None
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        let (end, next) = match next_start_code(self.buf, start) {
            Some(code) => (code.offset, code.payload_offset()),
            None => (self.buf.len(), self.buf.len()),
        };
        self.pos = next;
        Some(&self.buf[start..end])
    }
}

/// Rewrites an Annex-B buffer as 4-byte length-prefixed NAL units, the
/// sample layout MP4 expects.
///
/// Units for which `skip` returns `true` (checked against the NAL type) are
/// left out, as are empty units.
pub fn annexb_to_length_prefixed(buf: &[u8], skip: impl Fn(u8) -> bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + 16);
    for nal in NalUnits::new(buf) {
        let Some(header) = nal.first() else {
            continue;
        };
        if skip(nal_unit_type(*header)) {
            continue;
        }
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}
