// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Frame records handed from producers to the pump.

use crate::TrackKind;

/// Producer-assigned frame type tag.
///
/// Producers tag every compressed video frame with an integer type. Only one
/// value carries meaning for the muxer: [`FrameType::KEY`] marks a key frame
/// that starts with the stream's parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(pub i32);

impl FrameType {
    /// Key frame carrying SPS and PPS in front of the IDR slice.
    pub const KEY: FrameType = FrameType(3);

    pub fn is_key(self) -> bool {
        self == Self::KEY
    }
}

impl From<i32> for FrameType {
    fn from(value: i32) -> Self {
        FrameType(value)
    }
}

/// One compressed video access unit in Annex-B form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub payload: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_type: FrameType,
}

impl VideoFrame {
    pub fn is_valid(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// One chunk of raw interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub payload: Vec<u8>,
}

impl AudioFrame {
    pub fn is_valid(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// A frame the session queues for one track.
pub(crate) trait QueuedFrame {
    const KIND: TrackKind;

    /// Whether the frame may be queued at all.
    fn is_valid(&self) -> bool;
}

impl QueuedFrame for VideoFrame {
    const KIND: TrackKind = TrackKind::Video;

    fn is_valid(&self) -> bool {
        VideoFrame::is_valid(self)
    }
}

impl QueuedFrame for AudioFrame {
    const KIND: TrackKind = TrackKind::Audio;

    fn is_valid(&self) -> bool {
        AudioFrame::is_valid(self)
    }
}
