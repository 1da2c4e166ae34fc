// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Start-anchored presentation clock shared by both tracks.

use std::time::Instant;

use crate::TrackKind;

/// Converts monotonic clock reads into stream-relative presentation
/// timestamps, in microseconds.
///
/// The epoch is taken lazily from the first stamped sample, whichever track
/// it belongs to, so the first sample of a session is stamped `0` and both
/// tracks share one time base. Timestamps handed out for a track never
/// decrease.
///
/// The clock is owned by the pump thread and is not synchronized.
#[derive(Debug, Default)]
pub struct TimestampClock {
    epoch: Option<Instant>,
    last: [Option<u64>; 2],
}

impl TimestampClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sample has been stamped since creation or the last [`Self::reset`].
    pub fn is_anchored(&self) -> bool {
        self.epoch.is_some()
    }

    /// Microseconds since the epoch, `0` while unanchored.
    pub fn now_us(&self) -> u64 {
        self.epoch
            .map_or(0, |epoch| epoch.elapsed().as_micros() as u64)
    }

    /// Stamps a sample of `track` written now, anchoring the clock if needed.
    pub fn stamp(&mut self, track: TrackKind) -> u64 {
        self.stamp_at(track, Instant::now())
    }

    /// Stamps a sample of `track` observed at `now`.
    pub fn stamp_at(&mut self, track: TrackKind, now: Instant) -> u64 {
        let epoch = *self.epoch.get_or_insert(now);
        let elapsed = now.saturating_duration_since(epoch).as_micros() as u64;
        let slot = &mut self.last[track.index()];
        let pts = slot.map_or(elapsed, |last| elapsed.max(last));
        *slot = Some(pts);
        pts
    }

    /// Timestamp for the end-of-stream marker of `track`.
    ///
    /// Does not anchor the clock: an unanchored clock yields `0`.
    pub fn end_of_stream_pts(&self, track: TrackKind) -> u64 {
        let elapsed = self.now_us();
        self.last[track.index()].map_or(elapsed, |last| elapsed.max(last))
    }

    /// Last timestamp handed out for `track`.
    pub fn last_pts(&self, track: TrackKind) -> Option<u64> {
        self.last[track.index()]
    }

    /// Forgets the epoch and every per-track timestamp.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
