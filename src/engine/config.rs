/// Settings of an `OfflineEngine`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Number of interleaved channels `render` writes. Units are mono and copied to every channel
    pub channel_count: u16,
    /// Instantiation fails once this many units are alive
    pub max_units: usize,
    /// Longest block a unit is asked to render at once. Longer `render` calls are split
    pub max_block_frames: usize
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channel_count(mut self, channel_count: u16) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_max_units(mut self, max_units: usize) -> Self {
        self.max_units = max_units;
        self
    }

    pub fn with_max_block_frames(mut self, max_block_frames: usize) -> Self {
        self.max_block_frames = max_block_frames;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sample_rate = 44_100;
        let channel_count = 2;
        let max_units = 64;
        let max_block_frames = 4096;
        Self { sample_rate, channel_count, max_units, max_block_frames }
    }
}
