// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Audio compression: the slot-based codec interface, the encoder adapter the
//! pump drives and the `libfdk-aac` backend.

pub mod codec;
pub mod encoder;
pub mod fdk;
pub mod slot;
