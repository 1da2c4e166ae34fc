// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! [`AudioCodec`] backed by `libfdk-aac`.

use std::{collections::VecDeque, ffi::c_void, ptr};

use tracing::{debug, error, trace, warn};

use super::{
    codec::{AudioCodec, OutputEvent},
    slot::{InputSlot, OutputSlot, SlotPool},
};
use crate::{AudioTrackParams, Error, Result, api::FdkAacApiHandle, config::AudioConfig};

/// AAC-LC encoder producing raw access units (no ADTS framing).
///
/// Raw PCM is staged until a full codec frame (`frameLength` samples per
/// channel) is available; every full frame is compressed into its own output
/// slot.
pub struct FdkAacCodec {
    api: FdkAacApiHandle,
    handle: avmux_sys::HANDLE_AACENCODER,
    inputs: Option<SlotPool>,
    outputs: Option<SlotPool>,
    staging: Vec<i16>,
    frame_samples: usize,
    format: Option<AudioTrackParams>,
    ready: VecDeque<OutputEvent>,
    started: bool,
}

// Safety: the encoder handle is exclusively owned and only used by the thread
// that currently owns the codec.
unsafe impl Send for FdkAacCodec {}

impl FdkAacCodec {
    pub fn new(api: FdkAacApiHandle) -> Self {
        Self {
            api,
            handle: ptr::null_mut(),
            inputs: None,
            outputs: None,
            staging: Vec::new(),
            frame_samples: 0,
            format: None,
            ready: VecDeque::new(),
            started: false,
        }
    }

    fn set_param(&self, param: avmux_sys::AACENC_PARAM, value: u32) -> Result<()> {
        Error::from_aac_status(unsafe { self.api.encoder_set_param(self.handle, param, value) })
    }

    /// Compresses one staged frame into a fresh output slot.
    ///
    /// Returns `false` when no progress can be made right now.
    fn encode_frame(&mut self) -> Result<bool> {
        let Some(outputs) = self.outputs.as_ref() else {
            return Ok(false);
        };
        let Some(mut out) = outputs.try_acquire_output() else {
            debug!("No free AAC output slot, keeping {} samples staged", self.staging.len());
            return Ok(false);
        };

        let mut in_ptr = self.staging.as_mut_ptr() as *mut c_void;
        let mut in_id = avmux_sys::IN_AUDIO_DATA;
        let mut in_size = (self.frame_samples * size_of::<i16>()) as i32;
        let mut in_el_size = size_of::<i16>() as i32;
        let in_desc = avmux_sys::AACENC_BufDesc {
            numBufs: 1,
            bufs: &mut in_ptr,
            bufferIdentifiers: &mut in_id,
            bufSizes: &mut in_size,
            bufElSizes: &mut in_el_size,
        };

        let out_buffer = out.buffer_mut();
        let mut out_ptr = out_buffer.as_mut_ptr() as *mut c_void;
        let mut out_id = avmux_sys::OUT_BITSTREAM_DATA;
        let mut out_size = out_buffer.len() as i32;
        let mut out_el_size = 1;
        let out_desc = avmux_sys::AACENC_BufDesc {
            numBufs: 1,
            bufs: &mut out_ptr,
            bufferIdentifiers: &mut out_id,
            bufSizes: &mut out_size,
            bufElSizes: &mut out_el_size,
        };

        let in_args = avmux_sys::AACENC_InArgs {
            numInSamples: self.frame_samples as i32,
            numAncBytes: 0,
        };
        let mut out_args = avmux_sys::AACENC_OutArgs::default();
        let status = unsafe {
            self.api
                .enc_encode(self.handle, &in_desc, &out_desc, &in_args, &mut out_args)
        };
        Error::from_aac_status(status)?;

        let consumed = (out_args.numInSamples.max(0) as usize).min(self.staging.len());
        self.staging.drain(..consumed);
        let produced = out_args.numOutBytes.max(0) as usize;
        if produced > 0 {
            out.set_len(produced);
            trace!("AAC frame of {} bytes", produced);
            self.ready.push_back(OutputEvent::Frame(out));
        }
        Ok(consumed > 0 || produced > 0)
    }

    fn close(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let status = unsafe { self.api.enc_close(&mut self.handle) };
        self.handle = ptr::null_mut();
        Error::from_aac_status(status)
    }
}

impl AudioCodec for FdkAacCodec {
    fn configure(&mut self, config: &AudioConfig) -> Result<()> {
        if !self.handle.is_null() {
            return Err(Error::Codec("encoder already configured".into()));
        }
        let channels = config.channels as u32;
        Error::from_aac_status(unsafe { self.api.enc_open(&mut self.handle, 0, channels) })?;

        self.set_param(avmux_sys::AACENC_AOT, avmux_sys::AOT_AAC_LC)?;
        self.set_param(avmux_sys::AACENC_SAMPLERATE, config.sample_rate)?;
        // MODE_1 and MODE_2 share their value with the channel count.
        self.set_param(avmux_sys::AACENC_CHANNELMODE, channels)?;
        self.set_param(avmux_sys::AACENC_BITRATE, config.bit_rate)?;
        self.set_param(avmux_sys::AACENC_TRANSMUX, avmux_sys::TT_MP4_RAW)?;
        self.set_param(avmux_sys::AACENC_AFTERBURNER, 1)?;

        // An encode call without buffers applies the parameters.
        Error::from_aac_status(unsafe {
            self.api.enc_encode(
                self.handle,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            )
        })?;

        let mut info = avmux_sys::AACENC_InfoStruct::default();
        Error::from_aac_status(unsafe { self.api.enc_info(self.handle, &mut info) })?;
        let conf_size = (info.confSize as usize).min(info.confBuf.len());

        self.frame_samples = info.frameLength as usize * config.channels as usize;
        self.inputs = Some(SlotPool::new(config.input_slots, config.max_input_size));
        self.outputs = Some(SlotPool::new(
            config.output_slots,
            info.maxOutBufBytes.max(768 * channels) as usize,
        ));
        self.format = Some(AudioTrackParams {
            sample_rate: config.sample_rate,
            channels: config.channels,
            samples_per_frame: info.frameLength,
            decoder_config: info.confBuf[..conf_size].to_vec(),
        });
        debug!(
            "Configured AAC-LC encoder: frame length {}, {} byte(s) of decoder config",
            info.frameLength, conf_size
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let Some(format) = self.format.clone() else {
            return Err(Error::Codec("encoder not configured".into()));
        };
        if !self.started {
            self.started = true;
            self.ready.push_back(OutputEvent::FormatChanged(format));
        }
        Ok(())
    }

    fn try_acquire_input(&mut self) -> Option<InputSlot> {
        if !self.started {
            return None;
        }
        self.inputs.as_ref()?.try_acquire_input()
    }

    fn submit(&mut self, slot: InputSlot, len: usize, _pts_us: u64) -> Result<()> {
        let data = &slot.data()[..len.min(slot.data().len())];
        if data.len() % 2 != 0 {
            warn!("Dropping trailing odd byte of PCM input");
        }
        self.staging.extend(
            data.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
        drop(slot);

        while self.frame_samples > 0 && self.staging.len() >= self.frame_samples {
            if !self.encode_frame()? {
                break;
            }
        }
        Ok(())
    }

    fn poll_output(&mut self) -> Option<OutputEvent> {
        self.ready.pop_front()
    }

    fn release(&mut self, slot: OutputSlot) {
        trace!("Releasing AAC output slot {}", slot.index());
        drop(slot);
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        self.ready.clear();
        self.staging.clear();
        self.close()
    }
}

impl Drop for FdkAacCodec {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!("Failed to close AAC encoder: {:?}", err);
        }
    }
}
