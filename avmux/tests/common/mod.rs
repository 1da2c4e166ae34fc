// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use avmux::{
    AudioCodec, AudioConfig, AudioTrackParams, ContainerWriter, Error, InputSlot, MuxBackend,
    MuxSession, OutputEvent, OutputSlot, Result, SampleFlags, SlotPool, TrackId, TrackKind,
    TrackParams,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Unique, never created output path.
pub fn output_path(test: &str) -> PathBuf {
    std::env::temp_dir().join(format!("avmux_test_{}_{}.mp4", test, uuid::Uuid::new_v4()))
}

/// One call received by a [`RecordingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(TrackKind),
    Write {
        kind: TrackKind,
        payload: Vec<u8>,
        pts_us: u64,
        flags: SampleFlags,
    },
    EndOfStream {
        kind: TrackKind,
        pts_us: u64,
    },
    Finalize,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Container writer recording every call.
pub struct RecordingWriter {
    calls: CallLog,
    open: Vec<TrackKind>,
}

impl RecordingWriter {
    fn kind(&self, track: TrackId) -> Result<TrackKind> {
        self.open
            .get((track.0 as usize).wrapping_sub(1))
            .copied()
            .ok_or(Error::UnknownTrack(track.0))
    }
}

impl ContainerWriter for RecordingWriter {
    fn open_track(&mut self, params: &TrackParams) -> Result<TrackId> {
        let kind = params.kind();
        if self.open.contains(&kind) {
            return Err(Error::TrackAlreadyOpen(kind));
        }
        self.open.push(kind);
        self.calls.lock().unwrap().push(Call::Open(kind));
        Ok(TrackId(self.open.len() as u32))
    }

    fn write_sample(
        &mut self,
        track: TrackId,
        payload: &[u8],
        pts_us: u64,
        flags: SampleFlags,
    ) -> Result<()> {
        let kind = self.kind(track)?;
        self.calls.lock().unwrap().push(Call::Write {
            kind,
            payload: payload.to_vec(),
            pts_us,
            flags,
        });
        Ok(())
    }

    fn write_end_of_stream(&mut self, track: TrackId, pts_us: u64) -> Result<()> {
        let kind = self.kind(track)?;
        self.calls
            .lock()
            .unwrap()
            .push(Call::EndOfStream { kind, pts_us });
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Finalize);
        Ok(())
    }
}

/// Codec emitting one compressed frame per submitted input.
///
/// The compressed frame is the submitted PCM prefixed with `0xAC`. The output
/// format is announced on start, or with the first frame when `lazy_format`
/// is set, as hardware encoders do.
pub struct FakeCodec {
    inputs: Option<SlotPool>,
    outputs: SlotPool,
    ready: VecDeque<OutputEvent>,
    config: Option<AudioConfig>,
    lazy_format: bool,
    announced: bool,
    stopped: Arc<Mutex<usize>>,
}

impl FakeCodec {
    fn announce(&mut self) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Codec("not configured".into()))?;
        self.ready
            .push_back(OutputEvent::FormatChanged(AudioTrackParams {
                sample_rate: config.sample_rate,
                channels: config.channels,
                samples_per_frame: 1024,
                decoder_config: vec![0x12, 0x90],
            }));
        self.announced = true;
        Ok(())
    }
}

impl AudioCodec for FakeCodec {
    fn configure(&mut self, config: &AudioConfig) -> Result<()> {
        self.inputs = Some(SlotPool::new(config.input_slots, config.max_input_size));
        self.config = Some(config.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.lazy_format {
            return Ok(());
        }
        self.announce()
    }

    fn try_acquire_input(&mut self) -> Option<InputSlot> {
        self.inputs.as_ref()?.try_acquire_input()
    }

    fn submit(&mut self, slot: InputSlot, len: usize, _pts_us: u64) -> Result<()> {
        if !self.announced {
            self.announce()?;
        }
        let mut out = self
            .outputs
            .try_acquire_output()
            .ok_or_else(|| Error::Codec("no output slot".into()))?;
        let mut frame = vec![0xAC];
        frame.extend_from_slice(&slot.data()[..len]);
        out.fill(&frame);
        self.ready.push_back(OutputEvent::Frame(out));
        Ok(())
    }

    fn poll_output(&mut self) -> Option<OutputEvent> {
        self.ready.pop_front()
    }

    fn release(&mut self, slot: OutputSlot) {
        drop(slot);
    }

    fn stop(&mut self) -> Result<()> {
        *self.stopped.lock().unwrap() += 1;
        Ok(())
    }
}

/// Backend handing out recording writers and fake codecs.
#[derive(Default)]
pub struct TestBackend {
    pub calls: CallLog,
    pub paths: Mutex<Vec<PathBuf>>,
    pub codecs_created: Mutex<usize>,
    pub codecs_stopped: Arc<Mutex<usize>>,
    /// Codecs announce their format with the first encoded frame.
    pub lazy_format: bool,
}

impl TestBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_lazy_format() -> Arc<Self> {
        Arc::new(Self {
            lazy_format: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opens(&self, kind: TrackKind) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Open(kind))
            .count()
    }

    pub fn writes(&self, kind: TrackKind) -> Vec<(Vec<u8>, u64, SampleFlags)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write {
                    kind: k,
                    payload,
                    pts_us,
                    flags,
                } if k == kind => Some((payload, pts_us, flags)),
                _ => None,
            })
            .collect()
    }
}

impl MuxBackend for TestBackend {
    fn create_writer(&self, path: &Path) -> Result<Box<dyn ContainerWriter>> {
        self.paths.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(RecordingWriter {
            calls: self.calls.clone(),
            open: Vec::new(),
        }))
    }

    fn create_audio_codec(&self, _config: &AudioConfig) -> Result<Box<dyn AudioCodec>> {
        *self.codecs_created.lock().unwrap() += 1;
        Ok(Box::new(FakeCodec {
            inputs: None,
            outputs: SlotPool::new(8, 256),
            ready: VecDeque::new(),
            config: None,
            lazy_format: self.lazy_format,
            announced: false,
            stopped: self.codecs_stopped.clone(),
        }))
    }
}

/// Key frame: SPS, PPS, then an IDR slice, each behind a 4-byte start code.
pub fn key_frame(tag: u8) -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f, 0xe9, //
        0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x3c, 0x80, //
        0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, tag,
    ]
}

/// Non-IDR slice.
pub fn delta_frame(tag: u8) -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x01, 0x41, 0x9a, tag]
}

/// Waits until the pump has taken every queued frame.
pub fn wait_until_drained(session: &MuxSession) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = session.stats();
        if stats.queued_video == 0 && stats.queued_audio == 0 {
            return;
        }
        assert!(Instant::now() < deadline, "pump did not drain: {stats:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
