use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::{
    fourcc, ComponentDescription, ComponentType, EngineResult, GeneratorUnit, OutputInfo
};
use crate::parameter::{ParameterId, ParameterRamp};

/// Component description of the white noise generator
pub const WHITE_NOISE: ComponentDescription = ComponentDescription {
    component_type: ComponentType::Generator,
    sub_type: fourcc(b"wnoz"),
    manufacturer: fourcc(b"AuKt")
};

pub const WHITE_NOISE_NAME: &str = "Local WhiteNoise";

/// Uniform white noise in [-1, 1)
pub struct WhiteNoise {
    rng: StdRng
}

impl Default for WhiteNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl WhiteNoise {
    pub fn new() -> Self {
        let rng = StdRng::from_entropy();
        Self { rng }
    }

    /// A generator that always produces the same sequence, for tests and offline renders
    pub fn with_seed(seed: u64) -> Self {
        let rng = StdRng::seed_from_u64(seed);
        Self { rng }
    }

    pub fn get(&mut self) -> f32 {
        self.rng.gen_range(-1.0_f32, 1.0_f32)
    }
}

/// Processing unit that renders white noise scaled by its amplitude ramp.
///
/// The ramp is advanced once per block and the gain is interpolated across the block between the
/// previous and the new value.
pub struct WhiteNoiseUnit {
    noise: WhiteNoise,
    amplitude: Option<ParameterRamp>,
    gain: f32
}

impl WhiteNoiseUnit {
    pub fn new(noise: WhiteNoise) -> Self {
        let amplitude = None;
        let gain = 1.0;
        Self { noise, amplitude, gain }
    }

    /// `UnitFactory` registered for `WHITE_NOISE`
    pub fn create() -> Box<dyn GeneratorUnit> {
        Box::new(Self::new(WhiteNoise::new()))
    }
}

impl GeneratorUnit for WhiteNoiseUnit {
    fn bind_parameter(&mut self, id: ParameterId, ramp: ParameterRamp) -> EngineResult<()> {
        match id {
            ParameterId::Amplitude => {
                self.gain = ramp.value();
                self.amplitude = Some(ramp);
            }
        }
        Ok(())
    }

    fn render(&mut self, buffer: &mut [f32], output_info: &OutputInfo) {
        let start_gain = self.gain;
        let end_gain = match &mut self.amplitude {
            Some(ramp) => ramp.advance(output_info.block_time.duration),
            None => start_gain
        };

        let buffer_len = buffer.len() as f32;
        let gain_delta = end_gain - start_gain;
        for (i, sample) in buffer.iter_mut().enumerate() {
            let gain = start_gain + gain_delta * (i + 1) as f32 / buffer_len;
            *sample = self.noise.get() * gain;
        }
        self.gain = end_gain;
    }
}
