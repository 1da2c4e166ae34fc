// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The pump: the single thread that moves frames from the session queues into
//! the container writer.

use std::sync::Arc;

use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::{
    AudioEncoder, ContainerWriter, Error, SampleFlags, TimestampClock, TrackId, TrackKind,
    TrackParams, VideoTrackParams,
    audio::encoder::{AudioOutput, EncodeOutcome},
    config::TrackPolicy,
    frame::{AudioFrame, VideoFrame},
    nal::{Extraction, extract_parameter_sets},
    session::{SessionReport, Shared},
};

/// Video frames held while the video track is open but the start gate is
/// closed. Holds one group of pictures; a longer one is dropped.
const MAX_HELD_VIDEO_FRAMES: usize = 250;

/// Writer-side state: tracks, clock and counters.
struct Muxer {
    shared: Arc<Shared>,
    writer: Box<dyn ContainerWriter>,
    clock: TimestampClock,
    policy: TrackPolicy,
    video_frame_rate: u32,
    video_track: Option<TrackId>,
    audio_track: Option<TrackId>,
    /// Every required track is open.
    started: bool,
    /// Frames since the last key frame, waiting for the start gate.
    held_video: Vec<VideoFrame>,
    /// No key frame was written yet; delta frames cannot be decoded.
    awaiting_key_frame: bool,
    report: SessionReport,
}

impl Muxer {
    fn track(&self, kind: TrackKind) -> Option<TrackId> {
        match kind {
            TrackKind::Video => self.video_track,
            TrackKind::Audio => self.audio_track,
        }
    }

    fn open_track(&mut self, params: TrackParams) {
        let kind = params.kind();
        if self.track(kind).is_some() {
            return;
        }
        match self.writer.open_track(&params) {
            Ok(id) => {
                info!("Opened {} track", kind);
                match kind {
                    TrackKind::Video => self.video_track = Some(id),
                    TrackKind::Audio => self.audio_track = Some(id),
                }
                self.check_start();
            }
            Err(Error::TrackAlreadyOpen(_)) => {
                debug!("{} track already open", kind);
            }
            Err(err) => {
                error!("Failed to open {} track: {:?}", kind, err);
            }
        }
    }

    /// Passes the start gate once every track required by policy is open.
    fn check_start(&mut self) {
        if self.started {
            return;
        }
        let video_ready = !self.policy.video || self.video_track.is_some();
        let audio_ready = !self.policy.audio || self.audio_track.is_some();
        if video_ready && audio_ready {
            self.started = true;
            if self.shared.promote_to_start() {
                info!("All tracks open, muxing");
            }
            let held = std::mem::take(&mut self.held_video);
            if !held.is_empty() {
                debug!("Writing {} held video frame(s)", held.len());
            }
            for frame in held {
                self.write_video_frame(frame);
            }
        }
    }

    /// Keeps `frame` until the start gate opens. A key frame starts a new
    /// group and discards the previous one.
    fn hold_video_frame(&mut self, frame: VideoFrame) {
        if frame.frame_type.is_key() {
            self.report.video_not_ready += self.held_video.len() as u64;
            self.held_video.clear();
        } else if self.held_video.is_empty() {
            trace!("No key frame held, dropping video frame");
            self.report.video_not_ready += 1;
            return;
        } else if self.held_video.len() >= MAX_HELD_VIDEO_FRAMES {
            debug!("Held video group too long, waiting for the next key frame");
            self.report.video_not_ready += self.held_video.len() as u64 + 1;
            self.held_video.clear();
            return;
        }
        self.held_video.push(frame);
    }

    fn write(&mut self, kind: TrackKind, track: TrackId, payload: &[u8], flags: SampleFlags) {
        let pts = self.clock.stamp(kind);
        match self.writer.write_sample(track, payload, pts, flags) {
            Ok(()) => {
                trace!("Wrote {} sample of {} bytes at {} us", kind, payload.len(), pts);
                match kind {
                    TrackKind::Video => self.report.video_samples += 1,
                    TrackKind::Audio => self.report.audio_samples += 1,
                }
            }
            Err(err) => {
                error!("Failed to write {} sample: {:?}", kind, err);
                self.report.write_errors += 1;
            }
        }
    }

    fn write_video_frame(&mut self, frame: VideoFrame) {
        if self.video_track.is_none() {
            if !frame.frame_type.is_key() {
                trace!("Video track not open, dropping frame of type {}", frame.frame_type.0);
                self.report.video_not_ready += 1;
                return;
            }
            match extract_parameter_sets(&frame.payload) {
                Extraction::Ready(parameter_sets) => {
                    self.open_track(TrackParams::Video(VideoTrackParams {
                        width: frame.width,
                        height: frame.height,
                        frame_rate: self.video_frame_rate,
                        parameter_sets,
                    }));
                }
                Extraction::NotReady(reason) => {
                    debug!("Parameter sets not ready: {:?}", reason);
                }
            }
        }
        let Some(track) = self.video_track else {
            self.report.video_not_ready += 1;
            return;
        };
        if !self.started {
            self.hold_video_frame(frame);
            return;
        }
        if self.awaiting_key_frame {
            if !frame.frame_type.is_key() {
                trace!("Waiting for a key frame, dropping video frame");
                self.report.video_not_ready += 1;
                return;
            }
            self.awaiting_key_frame = false;
        }
        let flags = if frame.frame_type.is_key() {
            SampleFlags::KEY_FRAME | SampleFlags::SYNC_FRAME
        } else {
            SampleFlags::SYNC_FRAME
        };
        self.write(TrackKind::Video, track, &frame.payload, flags);
    }

    fn on_audio_output(&mut self, output: AudioOutput) {
        match output {
            AudioOutput::Format(params) => self.open_track(TrackParams::Audio(params)),
            AudioOutput::Frame(payload) => {
                let Some(track) = self.audio_track.filter(|_| self.started) else {
                    trace!("Audio track not ready, dropping {} bytes", payload.len());
                    self.report.audio_not_ready += 1;
                    return;
                };
                self.write(TrackKind::Audio, track, &payload, SampleFlags::SYNC_FRAME);
            }
        }
    }
}

/// Background worker of one session.
pub(crate) struct Pump {
    shared: Arc<Shared>,
    encoder: Option<AudioEncoder>,
    muxer: Muxer,
}

impl Pump {
    pub(crate) fn new(
        id: Uuid,
        shared: Arc<Shared>,
        writer: Box<dyn ContainerWriter>,
        encoder: Option<AudioEncoder>,
    ) -> Self {
        let config = &shared.config;
        let muxer = Muxer {
            shared: shared.clone(),
            writer,
            clock: TimestampClock::new(),
            policy: config.tracks,
            video_frame_rate: config.video_frame_rate,
            video_track: None,
            audio_track: None,
            started: false,
            held_video: Vec::new(),
            awaiting_key_frame: true,
            report: SessionReport {
                session_id: id,
                ..Default::default()
            },
        };
        Self {
            shared,
            encoder,
            muxer,
        }
    }

    /// Runs until the session stops, then tears down and reports.
    pub(crate) fn run(mut self) -> SessionReport {
        debug!("Pump running");
        // Lets the codec announce its format so the audio track opens first.
        self.poll_encoder();
        let tick = self.shared.config.tick_interval();
        loop {
            let batch = self.shared.take_batch();
            for frame in batch.video {
                self.muxer.write_video_frame(frame);
            }
            for frame in batch.audio {
                self.encode_audio(frame);
            }
            if batch.stopping {
                break;
            }
            if !batch.backlog {
                self.shared.wait(tick);
            }
        }
        self.teardown()
    }

    fn encode_audio(&mut self, frame: AudioFrame) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let muxer = &mut self.muxer;
        match encoder.encode(&frame.payload, |output| muxer.on_audio_output(output)) {
            Ok(EncodeOutcome::Submitted { .. }) => {}
            Ok(EncodeOutcome::Declined) => self.muxer.report.audio_declined += 1,
            Err(err) => {
                error!("Failed to encode audio frame: {:?}", err);
                self.muxer.report.write_errors += 1;
            }
        }
    }

    fn poll_encoder(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            let muxer = &mut self.muxer;
            encoder.poll(|output| muxer.on_audio_output(output));
        }
    }

    fn teardown(mut self) -> SessionReport {
        self.poll_encoder();
        let mut errors = Vec::new();

        let open = [
            (TrackKind::Video, self.muxer.video_track),
            (TrackKind::Audio, self.muxer.audio_track),
        ];
        for (kind, track) in open {
            let Some(track) = track else { continue };
            let pts = self.muxer.clock.end_of_stream_pts(kind);
            if let Err(err) = self.muxer.writer.write_end_of_stream(track, pts) {
                error!("Failed to end {} track: {:?}", kind, err);
                errors.push(format!("end of {kind} stream: {err}"));
            }
        }
        if let Err(err) = self.muxer.writer.finalize() {
            error!("Failed to finalize container: {:?}", err);
            errors.push(format!("finalize: {err}"));
        }
        if let Some(encoder) = self.encoder.as_mut()
            && let Err(err) = encoder.finish()
        {
            error!("Failed to stop audio codec: {:?}", err);
            errors.push(format!("codec stop: {err}"));
        }
        self.muxer.clock.reset();
        self.muxer.report.video_not_ready += self.muxer.held_video.len() as u64;
        self.muxer.held_video.clear();

        let mut report = std::mem::take(&mut self.muxer.report);
        report.stats = self.shared.stats();
        report.teardown_errors = errors;
        info!(
            "Session finished: {} video and {} audio samples",
            report.video_samples, report.audio_samples
        );
        report
    }
}
