// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # avmux-sys: Raw FFI declarations for the avmux backends
//!
//! This crate declares the C types, constants and dynamically loaded function
//! tables of the two native libraries the `avmux` backends drive:
//!
//! - `libmp4v2`: MP4 container serialization ([`Mp4v2Api`])
//! - `libfdk-aac`: AAC-LC audio compression ([`FdkAacApi`])
//!
//! Both libraries are opened at runtime with `libloading`, so neither is
//! required at build time.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `avmux`
//! wrapper crate, which provides RAII handles, `Result` based error handling
//! and the session/pump pipeline on top of these tables.
//!
//! ## Safety
//!
//! Every function in this crate is `unsafe`. Callers must uphold the C
//! libraries' invariants:
//! - handles must be created before use and not used after close
//! - neither library handle is thread-safe
//! - pointer/length pairs must describe valid memory for the call duration

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

extern crate libloading;

use std::os::raw::{c_char, c_int, c_uchar, c_uint, c_void};

// ---------------------------------------------------------------------------
// libmp4v2
// ---------------------------------------------------------------------------

pub type MP4FileHandle = *mut c_void;
pub type MP4TrackId = u32;
pub type MP4Duration = u64;

pub const MP4_INVALID_FILE_HANDLE: MP4FileHandle = std::ptr::null_mut();
pub const MP4_INVALID_TRACK_ID: MP4TrackId = 0;
pub const MP4_MPEG4_AUDIO_TYPE: u8 = 0x40;
pub const MP4_CREATE_DEFAULT: u32 = 0;
pub const MP4_CLOSE_DEFAULT: u32 = 0;

/// Function table for `libmp4v2`, resolved once when the library is loaded.
pub struct Mp4v2Api {
    __library: ::libloading::Library,
    create: unsafe extern "C" fn(fileName: *const c_char, flags: u32) -> MP4FileHandle,
    set_time_scale: unsafe extern "C" fn(hFile: MP4FileHandle, value: u32) -> bool,
    add_h264_video_track: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        timeScale: u32,
        sampleDuration: MP4Duration,
        width: u16,
        height: u16,
        AVCProfileIndication: u8,
        profile_compat: u8,
        AVCLevelIndication: u8,
        sampleLenFieldSizeMinusOne: u8,
    ) -> MP4TrackId,
    set_video_profile_level: unsafe extern "C" fn(hFile: MP4FileHandle, value: u8),
    add_h264_sequence_parameter_set: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pSequence: *const u8,
        sequenceLen: u16,
    ),
    add_h264_picture_parameter_set: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pPict: *const u8,
        pictLen: u16,
    ),
    add_audio_track: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        timeScale: u32,
        sampleDuration: MP4Duration,
        audioType: u8,
    ) -> MP4TrackId,
    set_audio_profile_level: unsafe extern "C" fn(hFile: MP4FileHandle, value: u8),
    set_track_es_configuration: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pConfig: *const u8,
        configSize: u32,
    ) -> bool,
    write_sample: unsafe extern "C" fn(
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pBytes: *const u8,
        numBytes: u32,
        duration: MP4Duration,
        renderingOffset: MP4Duration,
        isSyncSample: bool,
    ) -> bool,
    close: unsafe extern "C" fn(hFile: MP4FileHandle, flags: u32),
}

impl Mp4v2Api {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr>,
    {
        let library = ::libloading::Library::new(path)?;
        Self::from_library(library)
    }

    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        let create = __library.get(b"MP4Create\0").map(|sym| *sym)?;
        let set_time_scale = __library.get(b"MP4SetTimeScale\0").map(|sym| *sym)?;
        let add_h264_video_track = __library.get(b"MP4AddH264VideoTrack\0").map(|sym| *sym)?;
        let set_video_profile_level = __library
            .get(b"MP4SetVideoProfileLevel\0")
            .map(|sym| *sym)?;
        let add_h264_sequence_parameter_set = __library
            .get(b"MP4AddH264SequenceParameterSet\0")
            .map(|sym| *sym)?;
        let add_h264_picture_parameter_set = __library
            .get(b"MP4AddH264PictureParameterSet\0")
            .map(|sym| *sym)?;
        let add_audio_track = __library.get(b"MP4AddAudioTrack\0").map(|sym| *sym)?;
        let set_audio_profile_level = __library
            .get(b"MP4SetAudioProfileLevel\0")
            .map(|sym| *sym)?;
        let set_track_es_configuration = __library
            .get(b"MP4SetTrackESConfiguration\0")
            .map(|sym| *sym)?;
        let write_sample = __library.get(b"MP4WriteSample\0").map(|sym| *sym)?;
        let close = __library.get(b"MP4Close\0").map(|sym| *sym)?;
        Ok(Mp4v2Api {
            __library,
            create,
            set_time_scale,
            add_h264_video_track,
            set_video_profile_level,
            add_h264_sequence_parameter_set,
            add_h264_picture_parameter_set,
            add_audio_track,
            set_audio_profile_level,
            set_track_es_configuration,
            write_sample,
            close,
        })
    }

    pub unsafe fn create(&self, fileName: *const c_char, flags: u32) -> MP4FileHandle {
        (self.create)(fileName, flags)
    }

    pub unsafe fn set_time_scale(&self, hFile: MP4FileHandle, value: u32) -> bool {
        (self.set_time_scale)(hFile, value)
    }

    pub unsafe fn add_h264_video_track(
        &self,
        hFile: MP4FileHandle,
        timeScale: u32,
        sampleDuration: MP4Duration,
        width: u16,
        height: u16,
        AVCProfileIndication: u8,
        profile_compat: u8,
        AVCLevelIndication: u8,
        sampleLenFieldSizeMinusOne: u8,
    ) -> MP4TrackId {
        (self.add_h264_video_track)(
            hFile,
            timeScale,
            sampleDuration,
            width,
            height,
            AVCProfileIndication,
            profile_compat,
            AVCLevelIndication,
            sampleLenFieldSizeMinusOne,
        )
    }

    pub unsafe fn set_video_profile_level(&self, hFile: MP4FileHandle, value: u8) {
        (self.set_video_profile_level)(hFile, value)
    }

    pub unsafe fn add_h264_sequence_parameter_set(
        &self,
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pSequence: *const u8,
        sequenceLen: u16,
    ) {
        (self.add_h264_sequence_parameter_set)(hFile, trackId, pSequence, sequenceLen)
    }

    pub unsafe fn add_h264_picture_parameter_set(
        &self,
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pPict: *const u8,
        pictLen: u16,
    ) {
        (self.add_h264_picture_parameter_set)(hFile, trackId, pPict, pictLen)
    }

    pub unsafe fn add_audio_track(
        &self,
        hFile: MP4FileHandle,
        timeScale: u32,
        sampleDuration: MP4Duration,
        audioType: u8,
    ) -> MP4TrackId {
        (self.add_audio_track)(hFile, timeScale, sampleDuration, audioType)
    }

    pub unsafe fn set_audio_profile_level(&self, hFile: MP4FileHandle, value: u8) {
        (self.set_audio_profile_level)(hFile, value)
    }

    pub unsafe fn set_track_es_configuration(
        &self,
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pConfig: *const u8,
        configSize: u32,
    ) -> bool {
        (self.set_track_es_configuration)(hFile, trackId, pConfig, configSize)
    }

    pub unsafe fn write_sample(
        &self,
        hFile: MP4FileHandle,
        trackId: MP4TrackId,
        pBytes: *const u8,
        numBytes: u32,
        duration: MP4Duration,
        renderingOffset: MP4Duration,
        isSyncSample: bool,
    ) -> bool {
        (self.write_sample)(
            hFile,
            trackId,
            pBytes,
            numBytes,
            duration,
            renderingOffset,
            isSyncSample,
        )
    }

    pub unsafe fn close(&self, hFile: MP4FileHandle, flags: u32) {
        (self.close)(hFile, flags)
    }
}

// ---------------------------------------------------------------------------
// libfdk-aac (encoder half)
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct AACENCODER {
    _private: [u8; 0],
}

pub type HANDLE_AACENCODER = *mut AACENCODER;
pub type AACENC_ERROR = c_uint;
pub type AACENC_PARAM = c_uint;

pub const AACENC_OK: AACENC_ERROR = 0x0000;
pub const AACENC_INVALID_HANDLE: AACENC_ERROR = 0x0020;
pub const AACENC_MEMORY_ERROR: AACENC_ERROR = 0x0021;
pub const AACENC_UNSUPPORTED_PARAMETER: AACENC_ERROR = 0x0022;
pub const AACENC_INVALID_CONFIG: AACENC_ERROR = 0x0023;
pub const AACENC_INIT_ERROR: AACENC_ERROR = 0x0040;
pub const AACENC_ENCODE_ERROR: AACENC_ERROR = 0x0060;
pub const AACENC_ENCODE_EOF: AACENC_ERROR = 0x0080;

pub const AACENC_AOT: AACENC_PARAM = 0x0100;
pub const AACENC_BITRATE: AACENC_PARAM = 0x0101;
pub const AACENC_SAMPLERATE: AACENC_PARAM = 0x0103;
pub const AACENC_CHANNELMODE: AACENC_PARAM = 0x0106;
pub const AACENC_AFTERBURNER: AACENC_PARAM = 0x0200;
pub const AACENC_TRANSMUX: AACENC_PARAM = 0x0300;

/// MPEG-4 AAC Low Complexity audio object type.
pub const AOT_AAC_LC: c_uint = 2;
/// Raw access units, no ADTS/LATM framing.
pub const TT_MP4_RAW: c_uint = 0;

pub const IN_AUDIO_DATA: c_int = 0;
pub const OUT_BITSTREAM_DATA: c_int = 3;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct AACENC_BufDesc {
    pub numBufs: c_int,
    pub bufs: *mut *mut c_void,
    pub bufferIdentifiers: *mut c_int,
    pub bufSizes: *mut c_int,
    pub bufElSizes: *mut c_int,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct AACENC_InArgs {
    pub numInSamples: c_int,
    pub numAncBytes: c_int,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct AACENC_OutArgs {
    pub numOutBytes: c_int,
    pub numInSamples: c_int,
    pub numAncBytes: c_int,
    pub bitResState: c_int,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct AACENC_InfoStruct {
    pub maxOutBufBytes: c_uint,
    pub maxAncBytes: c_uint,
    pub inBufFillLevel: c_uint,
    pub inputChannels: c_uint,
    pub frameLength: c_uint,
    pub nDelay: c_uint,
    pub nDelayCore: c_uint,
    pub confBuf: [c_uchar; 64],
    pub confSize: c_uint,
}

impl Default for AACENC_InfoStruct {
    fn default() -> Self {
        Self {
            maxOutBufBytes: 0,
            maxAncBytes: 0,
            inBufFillLevel: 0,
            inputChannels: 0,
            frameLength: 0,
            nDelay: 0,
            nDelayCore: 0,
            confBuf: [0; 64],
            confSize: 0,
        }
    }
}

/// Function table for `libfdk-aac`, resolved once when the library is loaded.
pub struct FdkAacApi {
    __library: ::libloading::Library,
    enc_open: unsafe extern "C" fn(
        phAacEncoder: *mut HANDLE_AACENCODER,
        encModules: c_uint,
        maxChannels: c_uint,
    ) -> AACENC_ERROR,
    enc_close: unsafe extern "C" fn(phAacEncoder: *mut HANDLE_AACENCODER) -> AACENC_ERROR,
    enc_encode: unsafe extern "C" fn(
        hAacEncoder: HANDLE_AACENCODER,
        inBufDesc: *const AACENC_BufDesc,
        outBufDesc: *const AACENC_BufDesc,
        inargs: *const AACENC_InArgs,
        outargs: *mut AACENC_OutArgs,
    ) -> AACENC_ERROR,
    enc_info:
        unsafe extern "C" fn(hAacEncoder: HANDLE_AACENCODER, pInfo: *mut AACENC_InfoStruct) -> AACENC_ERROR,
    encoder_set_param: unsafe extern "C" fn(
        hAacEncoder: HANDLE_AACENCODER,
        param: AACENC_PARAM,
        value: c_uint,
    ) -> AACENC_ERROR,
}

impl FdkAacApi {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr>,
    {
        let library = ::libloading::Library::new(path)?;
        Self::from_library(library)
    }

    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        let enc_open = __library.get(b"aacEncOpen\0").map(|sym| *sym)?;
        let enc_close = __library.get(b"aacEncClose\0").map(|sym| *sym)?;
        let enc_encode = __library.get(b"aacEncEncode\0").map(|sym| *sym)?;
        let enc_info = __library.get(b"aacEncInfo\0").map(|sym| *sym)?;
        let encoder_set_param = __library.get(b"aacEncoder_SetParam\0").map(|sym| *sym)?;
        Ok(FdkAacApi {
            __library,
            enc_open,
            enc_close,
            enc_encode,
            enc_info,
            encoder_set_param,
        })
    }

    pub unsafe fn enc_open(
        &self,
        phAacEncoder: *mut HANDLE_AACENCODER,
        encModules: c_uint,
        maxChannels: c_uint,
    ) -> AACENC_ERROR {
        (self.enc_open)(phAacEncoder, encModules, maxChannels)
    }

    pub unsafe fn enc_close(&self, phAacEncoder: *mut HANDLE_AACENCODER) -> AACENC_ERROR {
        (self.enc_close)(phAacEncoder)
    }

    pub unsafe fn enc_encode(
        &self,
        hAacEncoder: HANDLE_AACENCODER,
        inBufDesc: *const AACENC_BufDesc,
        outBufDesc: *const AACENC_BufDesc,
        inargs: *const AACENC_InArgs,
        outargs: *mut AACENC_OutArgs,
    ) -> AACENC_ERROR {
        (self.enc_encode)(hAacEncoder, inBufDesc, outBufDesc, inargs, outargs)
    }

    pub unsafe fn enc_info(
        &self,
        hAacEncoder: HANDLE_AACENCODER,
        pInfo: *mut AACENC_InfoStruct,
    ) -> AACENC_ERROR {
        (self.enc_info)(hAacEncoder, pInfo)
    }

    pub unsafe fn encoder_set_param(
        &self,
        hAacEncoder: HANDLE_AACENCODER,
        param: AACENC_PARAM,
        value: c_uint,
    ) -> AACENC_ERROR {
        (self.encoder_set_param)(hAacEncoder, param, value)
    }
}
