// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! [`ContainerWriter`] backed by `libmp4v2`.
//!
//! mp4v2 stores sample *durations*, while the pump hands out presentation
//! *timestamps*. Each track therefore holds back its most recent sample until
//! the next one (or the end-of-stream marker) arrives and the duration is
//! known. Video samples are rewritten from Annex-B to 4-byte length-prefixed
//! NAL units; in-band SPS/PPS units are dropped since they live in the track's
//! `avcC` box.

use std::{ffi::CString, path::Path};

use tracing::{debug, error, trace};

use super::writer::{
    AudioTrackParams, ContainerWriter, SampleFlags, TrackId, TrackKind, TrackParams,
    VideoTrackParams,
};
use crate::{
    Error, Result,
    api::Mp4v2ApiHandle,
    nal::{annexb_to_length_prefixed, nal_type},
};

/// Movie and video track timescale.
const VIDEO_TIMESCALE: u32 = 90_000;

/// `videoProfileLevel` value meaning "no visual capability required".
const VIDEO_PROFILE_LEVEL_NONE: u8 = 0x7f;

/// `audioProfileLevel` for AAC-LC.
const AUDIO_PROFILE_LEVEL_AAC_LC: u8 = 0x02;

/// Converts a microsecond interval into `timescale` ticks.
fn to_ticks(delta_us: u64, timescale: u32) -> u64 {
    (delta_us as u128 * timescale as u128 / 1_000_000) as u64
}

/// Whether a sample starts a point a decoder can begin from. Every AAC frame
/// does; an H.264 sample only when it is a key frame.
fn is_sync_sample(kind: TrackKind, flags: SampleFlags) -> bool {
    match kind {
        TrackKind::Video => flags.contains(SampleFlags::KEY_FRAME),
        TrackKind::Audio => true,
    }
}

/// Frame dimensions as stored in the `avc1` sample entry.
fn video_dimensions(width: u32, height: u32) -> Result<(u16, u16)> {
    let narrow = |value: u32, what: &str| {
        u16::try_from(value)
            .map_err(|_| Error::Container(format!("Video {what} {value} exceeds 65535.")))
    };
    Ok((narrow(width, "width")?, narrow(height, "height")?))
}

struct PendingSample {
    data: Vec<u8>,
    pts_us: u64,
    sync: bool,
}

struct TrackState {
    id: avmux_sys::MP4TrackId,
    kind: TrackKind,
    timescale: u32,
    default_duration: u64,
    pending: Option<PendingSample>,
    ended: bool,
}

/// MP4 writer on top of a loaded `libmp4v2`.
pub struct Mp4v2Writer {
    api: Mp4v2ApiHandle,
    file: avmux_sys::MP4FileHandle,
    tracks: Vec<TrackState>,
}

// Safety: the mp4v2 file handle is not shared; the writer is moved to the pump
// thread and only used there.
unsafe impl Send for Mp4v2Writer {}

impl Mp4v2Writer {
    /// Creates (truncates) the MP4 file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path contains a NUL byte or mp4v2 cannot create
    /// the file.
    pub fn create(api: Mp4v2ApiHandle, path: &Path) -> Result<Self> {
        let c_path = CString::new(path.to_string_lossy().as_bytes())?;
        let file = unsafe { api.create(c_path.as_ptr(), avmux_sys::MP4_CREATE_DEFAULT) };
        if file == avmux_sys::MP4_INVALID_FILE_HANDLE {
            return Err(Error::Container(format!(
                "Failed to create MP4 file \"{}\".",
                path.display()
            )));
        }
        let writer = Self {
            api,
            file,
            tracks: Vec::new(),
        };
        if !unsafe { writer.api.set_time_scale(writer.file, VIDEO_TIMESCALE) } {
            return Err(Error::Container("Failed to set movie timescale.".into()));
        }
        debug!("Created MP4 file \"{}\"", path.display());
        Ok(writer)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.is_null() {
            return Err(Error::Container("MP4 file is already closed.".into()));
        }
        Ok(())
    }

    fn track_mut(&mut self, track: TrackId) -> Result<&mut TrackState> {
        self.tracks
            .iter_mut()
            .find(|state| state.id == track.0)
            .ok_or(Error::UnknownTrack(track.0))
    }

    fn add_video_track(&mut self, params: &VideoTrackParams) -> Result<TrackState> {
        let sets = &params.parameter_sets;
        let sample_duration = (VIDEO_TIMESCALE / params.frame_rate.max(1)) as u64;
        let (width, height) = video_dimensions(params.width, params.height)?;
        let id = unsafe {
            self.api.add_h264_video_track(
                self.file,
                VIDEO_TIMESCALE,
                sample_duration,
                width,
                height,
                sets.profile_idc(),
                sets.profile_compatibility(),
                sets.level_idc(),
                3,
            )
        };
        if id == avmux_sys::MP4_INVALID_TRACK_ID {
            return Err(Error::Container("Failed to add H.264 track.".into()));
        }
        let sps_len = u16::try_from(sets.sps.len())
            .map_err(|_| Error::Container("SPS exceeds 65535 bytes.".into()))?;
        let pps_len = u16::try_from(sets.pps.len())
            .map_err(|_| Error::Container("PPS exceeds 65535 bytes.".into()))?;
        unsafe {
            self.api
                .set_video_profile_level(self.file, VIDEO_PROFILE_LEVEL_NONE);
            self.api
                .add_h264_sequence_parameter_set(self.file, id, sets.sps.as_ptr(), sps_len);
            self.api
                .add_h264_picture_parameter_set(self.file, id, sets.pps.as_ptr(), pps_len);
        }
        Ok(TrackState {
            id,
            kind: TrackKind::Video,
            timescale: VIDEO_TIMESCALE,
            default_duration: sample_duration,
            pending: None,
            ended: false,
        })
    }

    fn add_audio_track(&mut self, params: &AudioTrackParams) -> Result<TrackState> {
        let sample_duration = params.samples_per_frame as u64;
        let id = unsafe {
            self.api.add_audio_track(
                self.file,
                params.sample_rate,
                sample_duration,
                avmux_sys::MP4_MPEG4_AUDIO_TYPE,
            )
        };
        if id == avmux_sys::MP4_INVALID_TRACK_ID {
            return Err(Error::Container("Failed to add AAC track.".into()));
        }
        unsafe {
            self.api
                .set_audio_profile_level(self.file, AUDIO_PROFILE_LEVEL_AAC_LC);
        }
        let configured = unsafe {
            self.api.set_track_es_configuration(
                self.file,
                id,
                params.decoder_config.as_ptr(),
                params.decoder_config.len() as u32,
            )
        };
        if !configured {
            return Err(Error::Container("Failed to set AudioSpecificConfig.".into()));
        }
        Ok(TrackState {
            id,
            kind: TrackKind::Audio,
            timescale: params.sample_rate,
            default_duration: sample_duration,
            pending: None,
            ended: false,
        })
    }

    /// Writes the held-back sample of `state`, ending at `until_us` if known.
    fn flush_pending(
        api: &Mp4v2ApiHandle,
        file: avmux_sys::MP4FileHandle,
        state: &mut TrackState,
        until_us: Option<u64>,
    ) -> Result<()> {
        let Some(sample) = state.pending.take() else {
            return Ok(());
        };
        let duration = until_us
            .map(|until| to_ticks(until.saturating_sub(sample.pts_us), state.timescale))
            .filter(|ticks| *ticks > 0)
            .unwrap_or(state.default_duration);
        let written = unsafe {
            api.write_sample(
                file,
                state.id,
                sample.data.as_ptr(),
                sample.data.len() as u32,
                duration,
                0,
                sample.sync,
            )
        };
        if !written {
            return Err(Error::Container(format!(
                "Failed to write {} sample of {} bytes.",
                state.kind,
                sample.data.len()
            )));
        }
        trace!(
            "Wrote {} sample at {} us, duration {} ticks",
            state.kind, sample.pts_us, duration
        );
        Ok(())
    }
}

impl ContainerWriter for Mp4v2Writer {
    fn open_track(&mut self, params: &TrackParams) -> Result<TrackId> {
        self.ensure_open()?;
        let kind = params.kind();
        if self.tracks.iter().any(|state| state.kind == kind) {
            return Err(Error::TrackAlreadyOpen(kind));
        }
        let state = match params {
            TrackParams::Video(video) => self.add_video_track(video)?,
            TrackParams::Audio(audio) => self.add_audio_track(audio)?,
        };
        let id = TrackId(state.id);
        debug!("Opened {} track {}", kind, state.id);
        self.tracks.push(state);
        Ok(id)
    }

    fn write_sample(
        &mut self,
        track: TrackId,
        payload: &[u8],
        pts_us: u64,
        flags: SampleFlags,
    ) -> Result<()> {
        self.ensure_open()?;
        let api = self.api.clone();
        let file = self.file;
        let state = self.track_mut(track)?;
        if state.ended {
            return Err(Error::Container(format!("{} track already ended.", state.kind)));
        }
        let data = match state.kind {
            TrackKind::Video => annexb_to_length_prefixed(payload, |kind| {
                kind == nal_type::SPS || kind == nal_type::PPS || kind == nal_type::AUD
            }),
            TrackKind::Audio => payload.to_vec(),
        };
        if data.is_empty() {
            trace!("Skipping {} sample without slice data", state.kind);
            return Ok(());
        }
        Self::flush_pending(&api, file, state, Some(pts_us))?;
        state.pending = Some(PendingSample {
            data,
            pts_us,
            sync: is_sync_sample(state.kind, flags),
        });
        Ok(())
    }

    fn write_end_of_stream(&mut self, track: TrackId, pts_us: u64) -> Result<()> {
        self.ensure_open()?;
        let api = self.api.clone();
        let file = self.file;
        let state = self.track_mut(track)?;
        Self::flush_pending(&api, file, state, Some(pts_us))?;
        state.ended = true;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.file.is_null() {
            return Ok(());
        }
        let api = self.api.clone();
        let file = self.file;
        let mut result = Ok(());
        for state in &mut self.tracks {
            if let Err(err) = Self::flush_pending(&api, file, state, None) {
                error!("Failed to flush {} track: {:?}", state.kind, err);
                result = Err(err);
            }
        }
        unsafe { api.close(file, avmux_sys::MP4_CLOSE_DEFAULT) };
        self.file = std::ptr::null_mut();
        debug!("Closed MP4 file");
        result
    }
}

impl Drop for Mp4v2Writer {
    /// Closes the file if the session never finalized it.
    fn drop(&mut self) {
        if !self.file.is_null()
            && let Err(err) = self.finalize()
        {
            error!("Failed to finalize MP4 file on drop: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microseconds_to_ticks() {
        assert_eq!(to_ticks(40_000, VIDEO_TIMESCALE), 3_600);
        assert_eq!(to_ticks(32_000, 32_000), 1_024);
        assert_eq!(to_ticks(0, 48_000), 0);
        // One hour at 90 kHz.
        assert_eq!(to_ticks(3_600_000_000, VIDEO_TIMESCALE), 324_000_000);
    }

    #[test]
    fn video_sync_follows_key_frame() {
        let key = SampleFlags::KEY_FRAME | SampleFlags::SYNC_FRAME;
        assert!(is_sync_sample(TrackKind::Video, key));
        assert!(!is_sync_sample(TrackKind::Video, SampleFlags::SYNC_FRAME));
        assert!(!is_sync_sample(TrackKind::Video, SampleFlags::NONE));
    }

    #[test]
    fn audio_samples_are_always_sync() {
        assert!(is_sync_sample(TrackKind::Audio, SampleFlags::SYNC_FRAME));
        assert!(is_sync_sample(TrackKind::Audio, SampleFlags::NONE));
    }

    #[test]
    fn video_dimensions_must_fit_sample_entry() {
        assert_eq!(video_dimensions(1920, 1080).unwrap(), (1920, 1080));
        assert_eq!(video_dimensions(65_535, 1).unwrap(), (65_535, 1));
        assert!(matches!(
            video_dimensions(65_536, 720),
            Err(Error::Container(_))
        ));
        assert!(matches!(
            video_dimensions(1280, 70_000),
            Err(Error::Container(_))
        ));
    }
}
