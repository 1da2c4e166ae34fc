// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The container writer interface the pump serializes into.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::{Result, nal::ParameterSets};

/// Media type of a container track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// Dense index, usable for per-track arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Opaque track handle returned by [`ContainerWriter::open_track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

/// Per-sample flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const NONE: SampleFlags = SampleFlags(0);
    /// The sample is an IDR / key frame.
    pub const KEY_FRAME: SampleFlags = SampleFlags(1);
    /// The sample is a random access point for the container index.
    pub const SYNC_FRAME: SampleFlags = SampleFlags(1 << 1);

    pub fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SampleFlags {
    type Output = SampleFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SampleFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SampleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Everything needed to open an H.264 track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrackParams {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, used for default sample durations.
    pub frame_rate: u32,
    pub parameter_sets: ParameterSets,
}

/// Everything needed to open an AAC track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// PCM frames per compressed access unit (1024 for AAC-LC).
    pub samples_per_frame: u32,
    /// MPEG-4 AudioSpecificConfig.
    pub decoder_config: Vec<u8>,
}

/// Parameters for [`ContainerWriter::open_track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackParams {
    Video(VideoTrackParams),
    Audio(AudioTrackParams),
}

impl TrackParams {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackParams::Video(_) => TrackKind::Video,
            TrackParams::Audio(_) => TrackKind::Audio,
        }
    }
}

/// Backend that serializes tracks and samples into a container file.
///
/// Only the pump thread calls a writer, so implementations need no internal
/// locking. Timestamps are presentation times in microseconds relative to the
/// session epoch and are non-decreasing per track.
pub trait ContainerWriter: Send {
    /// Opens a track.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TrackAlreadyOpen`] if a track of the same kind
    /// is already open, or a backend error.
    fn open_track(&mut self, params: &TrackParams) -> Result<TrackId>;

    /// Writes one access unit to `track`.
    fn write_sample(
        &mut self,
        track: TrackId,
        payload: &[u8],
        pts_us: u64,
        flags: SampleFlags,
    ) -> Result<()>;

    /// Terminates `track`. No sample may be written to it afterwards.
    fn write_end_of_stream(&mut self, track: TrackId, pts_us: u64) -> Result<()>;

    /// Completes the file. Further calls are no-ops.
    fn finalize(&mut self) -> Result<()>;
}
