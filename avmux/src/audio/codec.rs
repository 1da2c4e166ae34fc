// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use super::slot::{InputSlot, OutputSlot};
use crate::{AudioTrackParams, Result, config::AudioConfig};

/// Something the codec produced.
#[derive(Debug)]
pub enum OutputEvent {
    /// The output configuration is known; carries what is needed to open the
    /// audio track.
    FormatChanged(AudioTrackParams),
    /// One compressed frame.
    Frame(OutputSlot),
}

/// A slot-based audio compressor.
///
/// The codec owns fixed input and output buffer pools. Callers lease an input
/// slot, fill it and submit it, then poll compressed frames until none is
/// left and release each one. Only the pump thread drives a codec.
pub trait AudioCodec: Send {
    /// Applies the encoder parameters. Called once, before [`Self::start`].
    fn configure(&mut self, config: &AudioConfig) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Leases a free input slot without blocking. `None` means the codec is
    /// saturated and the caller should decline the raw frame.
    fn try_acquire_input(&mut self) -> Option<InputSlot>;

    /// Queues the first `len` bytes of `slot` for compression.
    fn submit(&mut self, slot: InputSlot, len: usize, pts_us: u64) -> Result<()>;

    /// Returns the next output event without blocking.
    fn poll_output(&mut self) -> Option<OutputEvent>;

    /// Hands an output slot back to the codec.
    fn release(&mut self, slot: OutputSlot);

    /// Stops the codec and releases its native resources. Idempotent.
    fn stop(&mut self) -> Result<()>;
}
