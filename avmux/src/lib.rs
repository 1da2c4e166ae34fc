// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # avmux - real-time audio/video muxing
//!
//! Takes a live stream of compressed H.264 access units and raw PCM audio from
//! independent producer threads, compresses the audio, timestamps both streams
//! against one clock and writes them into an MP4 file.
//!
//! ## Overview
//!
//! Producers only ever touch a [`MuxSession`]: adding a frame pushes it onto a
//! queue under a short lock. A single background pump thread owns everything
//! else: it drains the queues, opens the container tracks once their
//! parameters are known, drives the [`AudioEncoder`] and stamps every unit
//! through the [`TimestampClock`].
//!
//! ### Key Concepts
//!
//! - **Session**: one recording, from [`MuxSession::start`] to [`MuxSession::stop`]
//! - **Backend**: a [`MuxBackend`] creating the [`ContainerWriter`] and [`AudioCodec`]
//!   of a session; [`DynamicBackend`] loads `libmp4v2` and `libfdk-aac` at runtime
//! - **Parameter sets**: SPS and PPS, pulled out of the first key frame by
//!   [`nal::extract_parameter_sets`] to open the video track
//! - **Slots**: the codec's fixed buffers, leased as [`InputSlot`] / [`OutputSlot`]
//!
//! ## Architecture
//!
//! ```text
//! producers ──► add_video ──► video queue ─┐
//!           └─► add_audio ──► audio queue ─┤
//!                                          ▼
//!                                   pump thread
//!                                   ├─► nal::extract_parameter_sets (until video opens)
//!                                   ├─► AudioEncoder ──► AudioCodec
//!                                   ├─► TimestampClock
//!                                   └─► ContainerWriter
//! ```
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use avmux::{DynamicBackend, MuxConfig, MuxSession};
//!
//! # fn main() -> Result<(), avmux::Error> {
//! let backend = Arc::new(DynamicBackend::from_default_paths()?);
//! let session = MuxSession::new(MuxConfig::default(), backend)?;
//! session.start("/tmp/out.mp4")?;
//! // ... producers call add_video / add_audio from their threads ...
//! session.stop();
//! let report = session.join()?;
//! println!("{} video samples", report.video_samples);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`MuxSession`] is `Send + Sync`; share it behind an `Arc` between producers
//! - Writers and codecs are `Send` only and are used by the pump thread alone

mod api;
mod backend;
mod error;
mod pump;
mod session;

pub mod audio;
pub mod clock;
pub mod config;
pub mod container;
pub mod frame;
pub mod nal;
pub mod queue;

pub use api::{
    FdkAacApi, FdkAacApiHandle, Mp4v2Api, Mp4v2ApiHandle, load_fdk_aac_api, load_mp4v2_api,
};
pub use audio::{
    codec::{AudioCodec, OutputEvent},
    encoder::{AudioEncoder, AudioOutput, EncodeOutcome},
    fdk::FdkAacCodec,
    slot::{InputSlot, OutputSlot, SlotPool},
};
pub use backend::{DynamicBackend, MuxBackend};
pub use clock::TimestampClock;
pub use config::{AudioConfig, MuxConfig, TrackPolicy};
pub use container::{
    mp4v2::Mp4v2Writer,
    writer::{
        AudioTrackParams, ContainerWriter, SampleFlags, TrackId, TrackKind, TrackParams,
        VideoTrackParams,
    },
};
pub use error::{Error, Result};
pub use frame::{AudioFrame, FrameType, VideoFrame};
pub use nal::{Extraction, NotReadyReason, ParameterSets};
pub use session::{MuxSession, SessionReport, SessionState, SessionStats};
