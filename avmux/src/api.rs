// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic loading of the native backend libraries.

use std::{ffi::OsStr, sync::Arc};

use tracing::debug;

use crate::Result;

pub use avmux_sys::{FdkAacApi, Mp4v2Api};

/// Shared handle to a loaded `libmp4v2`.
pub type Mp4v2ApiHandle = Arc<Mp4v2Api>;

/// Shared handle to a loaded `libfdk-aac`.
pub type FdkAacApiHandle = Arc<FdkAacApi>;

/// Loads `libmp4v2` and resolves every symbol the container backend uses.
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library cannot be opened or a
/// symbol is missing.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), avmux::Error> {
/// let api = avmux::load_mp4v2_api(avmux::config::default_mp4v2_path())?;
/// # Ok(())
/// # }
/// ```
pub fn load_mp4v2_api(path: impl AsRef<OsStr>) -> Result<Mp4v2ApiHandle> {
    let path = path.as_ref();
    debug!("Loading libmp4v2 from {:?}", path);
    let api = unsafe { Mp4v2Api::new(path)? };
    Ok(Arc::new(api))
}

/// Loads `libfdk-aac` and resolves every encoder symbol.
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library cannot be opened or a
/// symbol is missing.
pub fn load_fdk_aac_api(path: impl AsRef<OsStr>) -> Result<FdkAacApiHandle> {
    let path = path.as_ref();
    debug!("Loading libfdk-aac from {:?}", path);
    let api = unsafe { FdkAacApi::new(path)? };
    Ok(Arc::new(api))
}
