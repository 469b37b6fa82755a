//! Real-time device output
//!
//! Pulls rendered frames from a shared `PlaybackController` inside the cpal
//! output callback. Only devices with a 32-bit float default format are
//! supported.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use crate::error::{BinauralError, Result};
use crate::session::PlaybackController;

fn device_error(reason: impl Into<String>) -> BinauralError {
    BinauralError::GraphConstruction {
        reason: reason.into(),
    }
}

/// An open output stream on the default device
pub struct DeviceOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl DeviceOutput {
    /// Sample rate of the default output device, for sizing the controller
    pub fn default_sample_rate() -> Result<u32> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| device_error("no audio output device found"))?;
        let config = device
            .default_output_config()
            .map_err(|e| device_error(format!("failed to get audio config: {}", e)))?;
        Ok(config.sample_rate().0)
    }

    /// Open the default device and start pulling frames from `controller`
    pub fn start(controller: Arc<Mutex<PlaybackController>>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| device_error("no audio output device found"))?;
        let config = device
            .default_output_config()
            .map_err(|e| device_error(format!("failed to get audio config: {}", e)))?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(BinauralError::UnsupportedFormat {
                format: format!("device sample format {:?}", config.sample_format()),
            });
        }

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        info!(
            "[OUTPUT] {} @ {}Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        let device_channels = channels as usize;
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / device_channels.max(1);
                    let Ok(mut controller) = controller.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    let stereo = controller.render_interleaved(frames);
                    for (frame, lr) in data.chunks_mut(device_channels).zip(stereo.chunks(2)) {
                        match frame.len() {
                            1 => frame[0] = 0.5 * (lr[0] + lr[1]),
                            _ => {
                                frame[0] = lr[0];
                                frame[1] = lr[1];
                                frame[2..].fill(0.0);
                            }
                        }
                    }
                },
                |err| error!("[OUTPUT] Audio stream error: {}", err),
                None,
            )
            .map_err(|e| device_error(format!("failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| device_error(format!("failed to start audio stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
