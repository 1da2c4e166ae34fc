// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Smoke tests for the hand-declared C layouts.

/// The encoder info struct must match the C layout: seven `UINT`s, a 64 byte
/// configuration buffer and a trailing `UINT`.
#[test]
fn aac_info_struct_layout() {
    let info = avmux_sys::AACENC_InfoStruct {
        frameLength: 1024,
        confSize: 2,
        ..Default::default()
    };

    assert_eq!(std::mem::size_of::<avmux_sys::AACENC_InfoStruct>(), 7 * 4 + 64 + 4);
    assert_eq!(info.frameLength, 1024);
    assert_eq!(info.confBuf.len(), 64);
}

#[test]
fn aac_arg_structs_are_plain_ints() {
    assert_eq!(std::mem::size_of::<avmux_sys::AACENC_InArgs>(), 2 * 4);
    assert_eq!(std::mem::size_of::<avmux_sys::AACENC_OutArgs>(), 4 * 4);
}

#[test]
fn loading_a_missing_library_fails() {
    let result = unsafe { avmux_sys::Mp4v2Api::new("libavmux-does-not-exist.so") };
    assert!(result.is_err());
}
