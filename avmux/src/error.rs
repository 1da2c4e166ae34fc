// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for avmux operations.
//!
//! Not-ready conditions (missing parameter sets, no free codec slot) are never
//! reported through [`Error`]; they are ordinary outcomes of the pipeline and
//! are expressed as dedicated result types instead. This enum covers lifecycle
//! misuse, configuration problems and failures of the native backends.

use crate::TrackKind;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the avmux API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `start` was called with an empty output path.
    #[error("Output path is empty")]
    EmptyPath,

    /// `start` was called on a session that is already running.
    #[error("Session already started")]
    AlreadyStarted,

    /// The session reached its terminal state and cannot be started again.
    #[error("Session is stopped")]
    Stopped,

    /// A track of this kind is already open in the container.
    #[error("Track already open: {0}")]
    TrackAlreadyOpen(TrackKind),

    /// The container does not know this track handle.
    #[error("Unknown track: {0}")]
    UnknownTrack(u32),

    /// The configuration cannot be used to run a session.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The container backend rejected an operation.
    #[error("Container error: {0}")]
    Container(String),

    /// The audio codec rejected an operation.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A generic error for failures not covered by another variant.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or interact with a native backend library.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),

    /// An OS level operation failed (spawning the pump thread, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Converts a `libfdk-aac` encoder status code to a Rust [`Result`].
    ///
    /// `AACENC_ENCODE_EOF` is not an error: the encoder reports it once it has
    /// flushed everything it buffered.
    pub fn from_aac_status(status: avmux_sys::AACENC_ERROR) -> Result<()> {
        match status {
            avmux_sys::AACENC_OK | avmux_sys::AACENC_ENCODE_EOF => Ok(()),
            avmux_sys::AACENC_INVALID_HANDLE => Err(Error::Codec("invalid encoder handle".into())),
            avmux_sys::AACENC_MEMORY_ERROR => Err(Error::Codec("out of memory".into())),
            avmux_sys::AACENC_UNSUPPORTED_PARAMETER => {
                Err(Error::Codec("unsupported parameter".into()))
            }
            avmux_sys::AACENC_INVALID_CONFIG => Err(Error::Codec("invalid configuration".into())),
            avmux_sys::AACENC_INIT_ERROR => Err(Error::Codec("initialization failed".into())),
            avmux_sys::AACENC_ENCODE_ERROR => Err(Error::Codec("encoding failed".into())),
            other => Err(Error::Codec(format!("status {other:#06x}"))),
        }
    }
}
