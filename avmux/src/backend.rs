// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Factories for the collaborators a session drives.

use std::{ffi::OsStr, path::Path};

use tracing::info;

use crate::{
    AudioCodec, ContainerWriter, FdkAacCodec, Mp4v2Writer, Result,
    api::{FdkAacApiHandle, Mp4v2ApiHandle, load_fdk_aac_api, load_mp4v2_api},
    config::{AudioConfig, default_fdk_aac_path, default_mp4v2_path},
};

/// Creates the container writer and audio codec of a session.
///
/// A backend is shared by every session created from it, hence `Sync`.
pub trait MuxBackend: Send + Sync {
    /// Creates a writer for a new file at `path`.
    fn create_writer(&self, path: &Path) -> Result<Box<dyn ContainerWriter>>;

    /// Creates an unconfigured audio codec.
    fn create_audio_codec(&self, config: &AudioConfig) -> Result<Box<dyn AudioCodec>>;
}

/// Backend over the dynamically loaded `libmp4v2` and `libfdk-aac`.
#[derive(Clone)]
pub struct DynamicBackend {
    mp4v2: Mp4v2ApiHandle,
    fdk_aac: FdkAacApiHandle,
}

impl DynamicBackend {
    /// Loads both libraries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LibLoading`] if either library or one of its
    /// symbols cannot be found.
    pub fn load(mp4v2_path: impl AsRef<OsStr>, fdk_aac_path: impl AsRef<OsStr>) -> Result<Self> {
        let mp4v2 = load_mp4v2_api(mp4v2_path)?;
        let fdk_aac = load_fdk_aac_api(fdk_aac_path)?;
        info!("Loaded libmp4v2 and libfdk-aac");
        Ok(Self { mp4v2, fdk_aac })
    }

    /// Loads both libraries from [`default_mp4v2_path`] and
    /// [`default_fdk_aac_path`].
    pub fn from_default_paths() -> Result<Self> {
        Self::load(default_mp4v2_path(), default_fdk_aac_path())
    }
}

impl MuxBackend for DynamicBackend {
    fn create_writer(&self, path: &Path) -> Result<Box<dyn ContainerWriter>> {
        Ok(Box::new(Mp4v2Writer::create(self.mp4v2.clone(), path)?))
    }

    fn create_audio_codec(&self, _config: &AudioConfig) -> Result<Box<dyn AudioCodec>> {
        Ok(Box::new(FdkAacCodec::new(self.fdk_aac.clone())))
    }
}
