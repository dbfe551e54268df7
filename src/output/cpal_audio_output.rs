use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error};

use super::error::{OutputError, OutputResult};
use crate::engine::OfflineEngine;

pub struct CpalAudioOutput {
    device: cpal::Device,
    current_config: cpal::SupportedStreamConfig,
    stream: Option<cpal::Stream>
}

impl CpalAudioOutput {
    pub fn new() -> OutputResult<Self> {
        let host = cpal::default_host();
        let device = match host.default_output_device() {
            Some(device) => device,
            None => return Err(OutputError::new("No output devices detected"))
        };

        let current_config = match device.default_output_config() {
            Ok(current_config) => current_config,
            Err(err) => {
                let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());
                let msg = format!("Could not query default config for device {}: {}", device_name, err);
                return Err(OutputError::new(&msg));
            }
        };

        debug!(
            sample_rate = current_config.sample_rate().0,
            channels = current_config.channels(),
            "opened output device"
        );
        Ok(CpalAudioOutput { device, current_config, stream: None })
    }

    pub fn get_device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown device".to_string())
    }

    pub fn get_sample_rate(&self) -> u32 {
        self.current_config.sample_rate().0
    }

    pub fn get_channel_count(&self) -> u16 {
        self.current_config.channels()
    }

    /// Builds a stream whose callback renders `engine` and starts it
    pub fn play(&mut self, engine: Arc<OfflineEngine>) -> OutputResult<()> {
        let config = self.current_config.config();
        let stream_result = match self.current_config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &config, engine),
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &config, engine),
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &config, engine),
        };

        let stream = match stream_result {
            Ok(stream) => stream,
            Err(err) => {
                let msg = format!("Failed to create a cpal output stream: {}", err);
                return Err(OutputError::new(&msg));
            }
        };

        if let Err(err) = stream.play() {
            let msg = format!("Failed to play audio stream: {}", err);
            return Err(OutputError::new(&msg));
        }
        self.stream = Some(stream);
        Ok(())
    }

    pub fn pause(&mut self) -> OutputResult<()> {
        match &self.stream {
            Some(stream) => stream.pause().map_err(|err| {
                let msg = format!("Failed to pause audio stream: {}", err);
                OutputError::new(&msg)
            }),
            None => Err(OutputError::new("Failed to pause stream because nothing is playing"))
        }
    }
}

fn build_stream<T: cpal::Sample>(
    device: &cpal::Device, config: &cpal::StreamConfig, engine: Arc<OfflineEngine>
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    // Grows on the first callbacks only
    let mut mix_buffer: Vec<f32> = Vec::new();
    let output_callback = move |sample_buffer: &mut [T], _: &cpal::OutputCallbackInfo| {
        let buffer_length = sample_buffer.len();
        if mix_buffer.len() < buffer_length {
            mix_buffer.resize(buffer_length, 0.0);
        }
        let mix = &mut mix_buffer[..buffer_length];
        engine.render(mix);
        for (output_sample, mixed_sample) in sample_buffer.iter_mut().zip(mix.iter()) {
            *output_sample = T::from(mixed_sample);
        }
    };
    device.build_output_stream(config, output_callback, stream_error_callback)
}

fn stream_error_callback(err: cpal::StreamError) {
    error!(%err, "audio stream error");
}
