// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Muxes an Annex-B H.264 elementary stream and a raw PCM file into an MP4.
//!
//! Both inputs are replayed in real time from two producer threads, the way a
//! capture pipeline would feed a session.
//!
//! ```text
//! cargo run --example mux_file -- --video in.h264 --audio in.pcm --output out.mp4
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use avmux::{
    DynamicBackend, FrameType, MuxConfig, MuxSession,
    config::{FDK_AAC_LIB_ENV, MP4V2_LIB_ENV, default_fdk_aac_path, default_mp4v2_path},
    nal::{NalUnits, START_CODE_4, nal_type, nal_unit_type},
};
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Opts {
    /// H.264 Annex-B elementary stream.
    #[arg(long)]
    video: PathBuf,

    /// Interleaved signed 16-bit little-endian PCM.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Output MP4 file.
    #[arg(long, default_value = "out.mp4")]
    output: PathBuf,

    /// JSON session configuration. Missing fields take their default value.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Path to libmp4v2.
    #[arg(long, env = MP4V2_LIB_ENV)]
    mp4v2_lib: Option<PathBuf>,

    /// Path to libfdk-aac.
    #[arg(long, env = FDK_AAC_LIB_ENV)]
    fdk_aac_lib: Option<PathBuf>,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Groups NAL units into access units: everything up to and including a slice.
fn access_units(stream: &[u8]) -> Vec<(Vec<u8>, FrameType)> {
    let mut units = Vec::new();
    let mut current = Vec::new();
    let mut has_sps = false;
    for nal in NalUnits::new(stream) {
        let Some(header) = nal.first() else {
            continue;
        };
        let kind = nal_unit_type(*header);
        has_sps |= kind == nal_type::SPS;
        current.extend_from_slice(&START_CODE_4);
        current.extend_from_slice(nal);
        if kind == nal_type::NON_IDR_SLICE || kind == nal_type::IDR_SLICE {
            let frame_type = if has_sps { FrameType::KEY } else { FrameType(1) };
            units.push((std::mem::take(&mut current), frame_type));
            has_sps = false;
        }
    }
    units
}

fn main() -> Result<(), avmux::Error> {
    setup_logging();
    let opts: Opts = Opts::parse();

    let mut config = match &opts.config {
        Some(path) => MuxConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => MuxConfig::default(),
    };
    config.tracks.audio = opts.audio.is_some();
    config.validate()?;

    let backend = DynamicBackend::load(
        opts.mp4v2_lib.unwrap_or_else(default_mp4v2_path),
        opts.fdk_aac_lib.unwrap_or_else(default_fdk_aac_path),
    )?;
    let frame_interval = Duration::from_secs(1) / config.video_frame_rate;
    let audio_chunk = (config.audio.sample_rate as usize * config.audio.channels as usize * 2)
        / config.video_frame_rate as usize;

    let session = Arc::new(MuxSession::new(config, Arc::new(backend))?);
    session.start(&opts.output)?;

    let units = access_units(&std::fs::read(&opts.video)?);
    info!("Replaying {} video access units", units.len());
    let (width, height) = (opts.width, opts.height);
    let video = {
        let session = session.clone();
        std::thread::spawn(move || {
            for (payload, frame_type) in units {
                if !session.add_video(payload, width, height, frame_type) {
                    warn!("Video frame refused");
                }
                std::thread::sleep(frame_interval);
            }
        })
    };

    let audio = match &opts.audio {
        Some(path) => {
            let pcm = std::fs::read(path)?;
            let session = session.clone();
            Some(std::thread::spawn(move || {
                for chunk in pcm.chunks(audio_chunk.max(2)) {
                    session.add_audio(chunk);
                    std::thread::sleep(frame_interval);
                }
            }))
        }
        None => None,
    };

    video
        .join()
        .map_err(|_| avmux::Error::Other("video producer panicked".into()))?;
    if let Some(audio) = audio {
        audio
            .join()
            .map_err(|_| avmux::Error::Other("audio producer panicked".into()))?;
    }

    session.stop();
    let report = session.join()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
