// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The muxing session: producer-facing API and lifecycle.

use std::{
    fmt,
    path::Path,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    AudioEncoder, Error, FrameType, MuxBackend, Result, TrackKind,
    config::MuxConfig,
    frame::{AudioFrame, QueuedFrame, VideoFrame},
    pump::Pump,
    queue::FrameQueue,
};

/// Lifecycle of a [`MuxSession`].
///
/// `Unknown → Init → Start → Stop`. `Stop` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// Created, not started.
    #[default]
    Unknown,
    /// Writer and codec are ready; waiting for every required track to open.
    Init,
    /// Every required track is open; samples are being written.
    Start,
    /// Stopped. No frame is accepted anymore.
    Stop,
}

impl SessionState {
    /// Whether `add_video` / `add_audio` accept frames in this state.
    pub fn accepts_frames(self) -> bool {
        matches!(self, SessionState::Init | SessionState::Start)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unknown => "unknown",
            SessionState::Init => "init",
            SessionState::Start => "start",
            SessionState::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Live counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    /// Video frames waiting for the pump.
    pub queued_video: usize,
    /// Audio frames waiting for the pump.
    pub queued_audio: usize,
    /// Video frames dropped because the queue was full.
    pub overflow_video: u64,
    /// Audio frames dropped because the queue was full.
    pub overflow_audio: u64,
    /// Frames refused at enqueue time: empty payloads and disabled tracks.
    pub rejected: u64,
    /// Frames that were still queued when the session stopped.
    pub discarded_on_stop: u64,
}

/// Outcome of a finished session, returned by [`MuxSession::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// Video samples handed to the container writer.
    pub video_samples: u64,
    /// Audio samples handed to the container writer.
    pub audio_samples: u64,
    /// Video frames dropped because the video track was not open yet.
    pub video_not_ready: u64,
    /// Compressed audio frames dropped because not every required track was open.
    pub audio_not_ready: u64,
    /// Raw audio frames declined because the codec had no free input slot.
    pub audio_declined: u64,
    /// Samples the writer or codec failed on.
    pub write_errors: u64,
    /// Counters of the producer side, as of the end of the session.
    pub stats: SessionStats,
    /// Failures during teardown, in the order they happened.
    pub teardown_errors: Vec<String>,
}

pub(crate) struct Inner {
    pub(crate) state: SessionState,
    pub(crate) video: FrameQueue<VideoFrame>,
    pub(crate) audio: FrameQueue<AudioFrame>,
    rejected: u64,
    discarded_on_stop: u64,
}

/// Frames taken by the pump in one cycle.
pub(crate) struct Batch {
    pub(crate) video: Vec<VideoFrame>,
    pub(crate) audio: Vec<AudioFrame>,
    /// The session was stopped when the batch was taken.
    pub(crate) stopping: bool,
    /// Frames were left behind because of the batch size limit.
    pub(crate) backlog: bool,
}

/// State shared between producers and the pump.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    wake: Mutex<bool>,
    wake_cond: Condvar,
    pub(crate) config: MuxConfig,
}

impl Shared {
    fn new(config: MuxConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Unknown,
                video: FrameQueue::new(config.max_queued_frames),
                audio: FrameQueue::new(config.max_queued_frames),
                rejected: 0,
                discarded_on_stop: 0,
            }),
            wake: Mutex::new(false),
            wake_cond: Condvar::new(),
            config,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let inner = self.lock();
        SessionStats {
            state: inner.state,
            queued_video: inner.video.len(),
            queued_audio: inner.audio.len(),
            overflow_video: inner.video.dropped(),
            overflow_audio: inner.audio.dropped(),
            rejected: inner.rejected,
            discarded_on_stop: inner.discarded_on_stop,
        }
    }

    /// Moves `Init → Start`. Any other state is left alone.
    pub(crate) fn promote_to_start(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == SessionState::Init {
            inner.state = SessionState::Start;
            true
        } else {
            false
        }
    }

    /// Takes up to `drain_batch_size` frames from each queue.
    pub(crate) fn take_batch(&self) -> Batch {
        let limit = self.config.drain_batch_size;
        let mut inner = self.lock();
        let video = inner.video.drain(limit);
        let audio = inner.audio.drain(limit);
        Batch {
            video,
            audio,
            stopping: inner.state == SessionState::Stop,
            backlog: !inner.video.is_empty() || !inner.audio.is_empty(),
        }
    }

    /// Sleeps until the next tick or until [`Self::wake`] is called.
    pub(crate) fn wait(&self, timeout: Duration) {
        let woken = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let mut woken = if *woken {
            woken
        } else {
            self.wake_cond
                .wait_timeout(woken, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        };
        *woken = false;
    }

    fn wake(&self) {
        *self.wake.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake_cond.notify_all();
    }

    fn enqueue<T: QueuedFrame>(&self, item: T) -> bool
    where
        Inner: QueueFor<T>,
    {
        let kind = T::KIND;
        let enabled = match kind {
            TrackKind::Video => self.config.tracks.video,
            TrackKind::Audio => self.config.tracks.audio,
        };
        let mut inner = self.lock();
        if !inner.state.accepts_frames() {
            debug!("Ignoring {} frame in state {}", kind, inner.state);
            return false;
        }
        if !item.is_valid() {
            debug!("Dropping empty {} frame", kind);
            inner.rejected += 1;
            return false;
        }
        if !enabled {
            debug!("Dropping {} frame, track disabled", kind);
            inner.rejected += 1;
            return false;
        }
        let accepted = QueueFor::<T>::queue_mut(&mut *inner).push(item);
        if !accepted {
            warn!("{} queue full, dropping frame", kind);
        }
        accepted
    }
}

/// Selects the queue of a frame type.
pub(crate) trait QueueFor<T> {
    fn queue_mut(&mut self) -> &mut FrameQueue<T>;
}

impl QueueFor<VideoFrame> for Inner {
    fn queue_mut(&mut self) -> &mut FrameQueue<VideoFrame> {
        &mut self.video
    }
}

impl QueueFor<AudioFrame> for Inner {
    fn queue_mut(&mut self) -> &mut FrameQueue<AudioFrame> {
        &mut self.audio
    }
}

#[derive(Default)]
struct PumpSlot {
    handle: Option<JoinHandle<SessionReport>>,
    report: Option<SessionReport>,
}

/// A real-time audio/video muxing session.
///
/// Producers push compressed video access units and raw PCM audio from any
/// thread through [`Self::add_video`] and [`Self::add_audio`]. A background
/// pump thread drains both queues, compresses the audio, timestamps every
/// unit against a clock anchored at the first written sample and hands the
/// result to the backend's [`crate::ContainerWriter`].
///
/// Adding a frame only takes a short lock and never waits for I/O.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), avmux::Error> {
/// use std::sync::Arc;
///
/// use avmux::{DynamicBackend, FrameType, MuxConfig, MuxSession};
///
/// let backend = Arc::new(DynamicBackend::from_default_paths()?);
/// let session = MuxSession::new(MuxConfig::default(), backend)?;
/// session.start("capture.mp4")?;
///
/// # let (annexb, pcm) = (vec![0u8; 16], vec![0u8; 4096]);
/// session.add_video(annexb, 1280, 720, FrameType::KEY);
/// session.add_audio(pcm);
///
/// session.stop();
/// let report = session.join()?;
/// println!("wrote {} video samples", report.video_samples);
/// # Ok(())
/// # }
/// ```
pub struct MuxSession {
    id: Uuid,
    span: tracing::Span,
    shared: Arc<Shared>,
    backend: Arc<dyn MuxBackend>,
    pump: Mutex<PumpSlot>,
}

impl MuxSession {
    /// Creates an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(config: MuxConfig, backend: Arc<dyn MuxBackend>) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        Ok(Self {
            id,
            span: info_span!("mux_session", id = %id),
            shared: Arc::new(Shared::new(config)),
            backend,
            pump: Mutex::new(PumpSlot::default()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MuxConfig {
        &self.shared.config
    }

    /// Opens the output file, starts the audio codec and spawns the pump.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyPath`] if `path` is empty.
    /// - [`Error::AlreadyStarted`] if the session is running.
    /// - [`Error::Stopped`] if the session was stopped. Create a new session
    ///   to record again.
    /// - Backend errors if the writer or the codec cannot be created.
    pub fn start(&self, path: impl AsRef<Path>) -> Result<()> {
        let _enter = self.span.enter();
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyPath);
        }

        let mut slot = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        match self.shared.state() {
            SessionState::Unknown => {}
            SessionState::Init | SessionState::Start => return Err(Error::AlreadyStarted),
            SessionState::Stop => return Err(Error::Stopped),
        }

        let config = &self.shared.config;
        let writer = self.backend.create_writer(path)?;
        let encoder = if config.tracks.audio {
            let codec = self.backend.create_audio_codec(&config.audio)?;
            Some(AudioEncoder::new(codec, &config.audio)?)
        } else {
            None
        };

        self.shared.lock().state = SessionState::Init;
        let pump = Pump::new(self.id, self.shared.clone(), writer, encoder);
        let span = self.span.clone();
        let spawned = std::thread::Builder::new()
            .name("avmux-pump".into())
            .spawn(move || span.in_scope(|| pump.run()));
        match spawned {
            Ok(handle) => {
                slot.handle = Some(handle);
                info!("Session started, writing to \"{}\"", path.display());
                Ok(())
            }
            Err(err) => {
                self.shared.lock().state = SessionState::Unknown;
                error!("Failed to spawn pump thread: {}", err);
                Err(err.into())
            }
        }
    }

    /// Queues one compressed video access unit (Annex-B).
    ///
    /// Returns whether the frame was queued. Frames are refused when the
    /// session is not running, the payload is empty, video is disabled or
    /// the queue is full.
    pub fn add_video(
        &self,
        payload: impl Into<Vec<u8>>,
        width: u32,
        height: u32,
        frame_type: impl Into<FrameType>,
    ) -> bool {
        let frame = VideoFrame {
            payload: payload.into(),
            width,
            height,
            frame_type: frame_type.into(),
        };
        self.shared.enqueue(frame)
    }

    /// Queues one frame of interleaved signed 16-bit little-endian PCM.
    ///
    /// Returns whether the frame was queued, under the same rules as
    /// [`Self::add_video`].
    pub fn add_audio(&self, payload: impl Into<Vec<u8>>) -> bool {
        let frame = AudioFrame {
            payload: payload.into(),
        };
        self.shared.enqueue(frame)
    }

    /// Stops the session.
    ///
    /// Frames still queued are discarded; frames the pump already took are
    /// written. The pump then terminates every open track and finalizes the
    /// file. Use [`Self::join`] to wait for that to complete. Stopping a
    /// session that never started, or stopping twice, does nothing.
    pub fn stop(&self) {
        let _enter = self.span.enter();
        {
            let mut inner = self.shared.lock();
            if !inner.state.accepts_frames() {
                debug!("Ignoring stop in state {}", inner.state);
                return;
            }
            inner.state = SessionState::Stop;
            let discarded = (inner.video.clear() + inner.audio.clear()) as u64;
            inner.discarded_on_stop += discarded;
            if discarded > 0 {
                warn!("Discarded {} queued frame(s) on stop", discarded);
            }
        }
        self.shared.wake();
        info!("Session stopping");
    }

    pub fn status(&self) -> SessionState {
        self.shared.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    /// Waits for the pump to finish its teardown.
    ///
    /// Blocks until some thread calls [`Self::stop`]. Subsequent calls return
    /// the same report. A session that never started yields an empty report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the pump thread panicked.
    pub fn join(&self) -> Result<SessionReport> {
        let mut slot = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(report) = &slot.report {
            return Ok(report.clone());
        }
        let Some(handle) = slot.handle.take() else {
            return Ok(SessionReport {
                session_id: self.id,
                stats: self.stats(),
                ..Default::default()
            });
        };
        let report = handle
            .join()
            .map_err(|_| Error::Other("pump thread panicked".into()))?;
        slot.report = Some(report.clone());
        Ok(report)
    }
}

impl fmt::Debug for MuxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxSession")
            .field("id", &self.id)
            .field("state", &self.status())
            .finish()
    }
}

impl Drop for MuxSession {
    /// Stops a running session and waits for its file to be finalized.
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.join() {
            error!("Failed to join pump thread: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(config: MuxConfig) -> Shared {
        let shared = Shared::new(config);
        shared.lock().state = SessionState::Init;
        shared
    }

    #[test]
    fn enqueue_requires_running_state() {
        let shared = Shared::new(MuxConfig::default());
        assert!(!shared.enqueue(AudioFrame { payload: vec![1] }));
        shared.lock().state = SessionState::Start;
        assert!(shared.enqueue(AudioFrame { payload: vec![1] }));
        shared.lock().state = SessionState::Stop;
        assert!(!shared.enqueue(AudioFrame { payload: vec![1] }));
    }

    #[test]
    fn invalid_frames_are_counted_as_rejected() {
        let shared = shared(MuxConfig::default());
        assert!(!shared.enqueue(AudioFrame { payload: Vec::new() }));
        assert!(!shared.enqueue(VideoFrame {
            payload: Vec::new(),
            width: 1280,
            height: 720,
            frame_type: FrameType::KEY,
        }));
        assert!(shared.enqueue(VideoFrame {
            payload: vec![0, 0, 0, 1, 0x41],
            width: 1280,
            height: 720,
            frame_type: FrameType(1),
        }));
        let stats = shared.stats();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.queued_video, 1);
        assert_eq!(stats.queued_audio, 0);
    }

    #[test]
    fn batches_respect_the_size_limit() {
        let shared = shared(MuxConfig {
            drain_batch_size: Some(2),
            ..Default::default()
        });
        for i in 0..3u8 {
            assert!(shared.enqueue(AudioFrame { payload: vec![i] }));
        }
        let batch = shared.take_batch();
        assert_eq!(batch.audio.len(), 2);
        assert!(batch.backlog);
        assert!(!batch.stopping);

        let batch = shared.take_batch();
        assert_eq!(batch.audio[0].payload, vec![2]);
        assert!(!batch.backlog);
    }

    #[test]
    fn promote_only_from_init() {
        let shared = shared(MuxConfig::default());
        assert!(shared.promote_to_start());
        assert!(!shared.promote_to_start());
        shared.lock().state = SessionState::Stop;
        assert!(!shared.promote_to_start());
        assert_eq!(shared.state(), SessionState::Stop);
    }

    #[test]
    fn wake_cuts_the_wait_short() {
        let shared = shared(MuxConfig::default());
        shared.wake();
        let begin = std::time::Instant::now();
        shared.wait(Duration::from_secs(10));
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Start.to_string(), "start");
        assert!(!SessionState::Unknown.accepts_frames());
    }
}
