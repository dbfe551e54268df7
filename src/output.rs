mod error;
mod cpal_audio_output;

pub use error::{OutputError, OutputResult};
pub use cpal_audio_output::CpalAudioOutput;

use std::sync::Arc;

use crate::engine::{EngineConfig, OfflineEngine};

/// Plays an engine's mix on the default output device
pub struct AudioInterface {
    cpal_out: CpalAudioOutput
}

impl AudioInterface {
    /// Opens the default output device
    pub fn new() -> OutputResult<Self> {
        let cpal_out = CpalAudioOutput::new()?;
        Ok(Self { cpal_out })
    }

    /// Engine settings that match the device, `max_units` is left at its default
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_sample_rate(self.cpal_out.get_sample_rate())
            .with_channel_count(self.cpal_out.get_channel_count())
    }

    pub fn get_device_name(&self) -> String {
        self.cpal_out.get_device_name()
    }

    /// Starts pulling blocks from `engine`. The engine must render as many channels as the device has
    pub fn play(&mut self, engine: Arc<OfflineEngine>) -> OutputResult<()> {
        let engine_channels = engine.config().channel_count;
        let device_channels = self.cpal_out.get_channel_count();
        if engine_channels != device_channels {
            let msg = format!(
                "Engine renders {} channels but the device expects {}", engine_channels, device_channels
            );
            return Err(OutputError::new(&msg));
        }
        self.cpal_out.play(engine)
    }

    pub fn pause(&mut self) -> OutputResult<()> {
        self.cpal_out.pause()
    }
}
