// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Raw PCM in, compressed frames out.

use tracing::{debug, trace};

use super::codec::{AudioCodec, OutputEvent};
use crate::{AudioTrackParams, Result, config::AudioConfig};

/// Something the encoder hands to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutput {
    /// The codec announced its output configuration.
    Format(AudioTrackParams),
    /// One compressed frame, copied out of its codec slot.
    Frame(Vec<u8>),
}

/// Result of [`AudioEncoder::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// The frame was copied into an input slot and submitted.
    Submitted {
        /// Bytes submitted; less than the frame size if it was truncated.
        bytes: usize,
    },
    /// No input slot was free. The frame was not consumed.
    Declined,
}

/// Stateful adapter over an [`AudioCodec`].
///
/// Owns the codec for the lifetime of a session. Once [`Self::finish`] ran the
/// encoder declines every frame.
pub struct AudioEncoder {
    codec: Box<dyn AudioCodec>,
    format: Option<AudioTrackParams>,
    finished: bool,
}

impl AudioEncoder {
    /// Configures and starts `codec`.
    ///
    /// # Errors
    ///
    /// Returns the codec's error if it rejects the configuration or fails to
    /// start.
    pub fn new(mut codec: Box<dyn AudioCodec>, config: &AudioConfig) -> Result<Self> {
        codec.configure(config)?;
        codec.start()?;
        debug!(
            "Audio encoder started: {} Hz, {} channel(s), {} bit/s",
            config.sample_rate, config.channels, config.bit_rate
        );
        Ok(Self {
            codec,
            format: None,
            finished: false,
        })
    }

    /// Output configuration, once the codec announced it.
    pub fn format(&self) -> Option<&AudioTrackParams> {
        self.format.as_ref()
    }

    /// Submits one raw frame, then drains every available output into `sink`.
    ///
    /// Outputs are drained even if the frame is declined, so a saturated codec
    /// makes progress on the next call.
    pub fn encode(
        &mut self,
        raw: &[u8],
        sink: impl FnMut(AudioOutput),
    ) -> Result<EncodeOutcome> {
        let outcome = self.submit(raw)?;
        self.poll(sink);
        Ok(outcome)
    }

    fn submit(&mut self, raw: &[u8]) -> Result<EncodeOutcome> {
        if self.finished {
            return Ok(EncodeOutcome::Declined);
        }
        let Some(mut slot) = self.codec.try_acquire_input() else {
            debug!("No free audio input slot, declining {} bytes", raw.len());
            return Ok(EncodeOutcome::Declined);
        };
        let bytes = slot.fill(raw);
        if bytes < raw.len() {
            debug!(
                "Truncating audio frame from {} to {} bytes",
                raw.len(),
                bytes
            );
        }
        self.codec.submit(slot, bytes, 0)?;
        Ok(EncodeOutcome::Submitted { bytes })
    }

    /// Drains every available output into `sink` and returns how many events
    /// were handed over.
    pub fn poll(&mut self, mut sink: impl FnMut(AudioOutput)) -> usize {
        if self.finished {
            return 0;
        }
        let mut events = 0;
        while let Some(event) = self.codec.poll_output() {
            events += 1;
            match event {
                OutputEvent::FormatChanged(params) => {
                    debug!(
                        "Audio output format: {} Hz, {} channel(s), {} byte(s) of decoder config",
                        params.sample_rate,
                        params.channels,
                        params.decoder_config.len()
                    );
                    self.format = Some(params.clone());
                    sink(AudioOutput::Format(params));
                }
                OutputEvent::Frame(slot) => {
                    let payload = slot.payload().to_vec();
                    trace!("Encoded audio frame of {} bytes", payload.len());
                    self.codec.release(slot);
                    sink(AudioOutput::Frame(payload));
                }
            }
        }
        events
    }

    /// Stops the codec. Further calls are no-ops.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.codec.stop()
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::error!("Failed to stop audio codec: {:?}", err);
        }
    }
}
