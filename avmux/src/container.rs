// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Container writing: the writer interface and the `libmp4v2` backend.

pub mod mp4v2;
pub mod writer;
