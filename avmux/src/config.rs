// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Session configuration and native library path resolution.
//!
//! Every knob the pipeline exposes lives in [`MuxConfig`]: which tracks are
//! required, how often the pump wakes up, how much it drains per cycle, how
//! many frames producers may queue, and the audio encoder parameters. The
//! defaults reproduce the behavior of a 25 fps H.264 + 32 kHz stereo AAC
//! recorder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable overriding the `libmp4v2` location.
pub const MP4V2_LIB_ENV: &str = "AVMUX_MP4V2_LIB";

/// Environment variable overriding the `libfdk-aac` location.
pub const FDK_AAC_LIB_ENV: &str = "AVMUX_FDK_AAC_LIB";

/// Which tracks a session produces.
///
/// A disabled track ignores its producer calls entirely. The session only
/// enters [`crate::SessionState::Start`] once every enabled track is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackPolicy {
    pub video: bool,
    pub audio: bool,
}

impl Default for TrackPolicy {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Audio encoder parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count of the raw input.
    pub channels: u16,
    /// Target bit rate of the compressed stream, in bits per second.
    pub bit_rate: u32,
    /// Capacity of one codec input slot, in bytes. Larger raw frames are truncated.
    pub max_input_size: usize,
    /// Number of input slots the codec owns.
    pub input_slots: usize,
    /// Number of output slots the codec owns.
    pub output_slots: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32_000,
            channels: 2,
            bit_rate: 320_000,
            max_input_size: 100 * 1024,
            input_slots: 4,
            output_slots: 8,
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Tracks required before samples are written.
    pub tracks: TrackPolicy,
    /// Upper bound of the pump's idle wait between two drain cycles.
    pub tick_interval_ms: u64,
    /// Maximum number of frames taken from each queue per cycle (`None` = all).
    pub drain_batch_size: Option<usize>,
    /// Maximum number of frames waiting in each queue (`None` = unbounded).
    /// Frames arriving at a full queue are dropped.
    pub max_queued_frames: Option<usize>,
    /// Nominal video frame rate, used for the container's default sample duration.
    pub video_frame_rate: u32,
    pub audio: AudioConfig,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            tracks: TrackPolicy::default(),
            tick_interval_ms: 30,
            drain_batch_size: None,
            max_queued_frames: None,
            video_frame_rate: 25,
            audio: AudioConfig::default(),
        }
    }
}

impl MuxConfig {
    /// Parses a configuration document. Missing fields take their default value.
    ///
    /// # Examples
    ///
    /// ```
    /// let config = avmux::MuxConfig::from_json(r#"{"tick_interval_ms": 10}"#).unwrap();
    /// assert_eq!(config.tick_interval_ms, 10);
    /// assert!(config.tracks.audio);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MuxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the pump's idle wait as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Checks that the configuration can drive a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no track is enabled, when a
    /// count or rate that must be positive is zero, or when the audio channel
    /// count is not mono or stereo.
    pub fn validate(&self) -> Result<()> {
        if !self.tracks.video && !self.tracks.audio {
            return Err(Error::InvalidConfig("at least one track must be enabled".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig("tick_interval_ms must be positive".into()));
        }
        if self.drain_batch_size == Some(0) {
            return Err(Error::InvalidConfig("drain_batch_size must be positive".into()));
        }
        if self.video_frame_rate == 0 {
            return Err(Error::InvalidConfig("video_frame_rate must be positive".into()));
        }
        if self.tracks.audio {
            let audio = &self.audio;
            if audio.sample_rate == 0 || audio.bit_rate == 0 {
                return Err(Error::InvalidConfig(
                    "audio sample_rate and bit_rate must be positive".into(),
                ));
            }
            if !(1..=2).contains(&audio.channels) {
                return Err(Error::InvalidConfig(format!(
                    "unsupported audio channel count {}",
                    audio.channels
                )));
            }
            if audio.max_input_size == 0 || audio.input_slots == 0 || audio.output_slots == 0 {
                return Err(Error::InvalidConfig(
                    "audio slot counts and sizes must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Returns the path used to load `libmp4v2`.
///
/// Honors [`MP4V2_LIB_ENV`] and otherwise returns the bare library name, so
/// the platform loader's search path applies.
pub fn default_mp4v2_path() -> std::path::PathBuf {
    std::env::var_os(MP4V2_LIB_ENV)
        .map(Into::into)
        .unwrap_or_else(|| "libmp4v2.so".into())
}

/// Returns the path used to load `libfdk-aac`.
///
/// Honors [`FDK_AAC_LIB_ENV`] and otherwise returns the bare library name.
pub fn default_fdk_aac_path() -> std::path::PathBuf {
    std::env::var_os(FDK_AAC_LIB_ENV)
        .map(Into::into)
        .unwrap_or_else(|| "libfdk-aac.so".into())
}
