/// Position and length of one rendered block
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlockTime {
    /// Index of the first frame in the block, counted from when the clock started
    pub start_frame: u64,
    pub n_frames: usize,
    /// Length of the block in seconds
    pub duration: f32
}

/// A frame counter. It turns block sizes into positions and durations
#[derive(Debug, Copy, Clone)]
pub struct SampleClock {
    sample_rate: u32,
    frame: u64
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        let frame = 0;
        Self { sample_rate, frame }
    }

    /// Gets the number of frames that have been handed out so far
    pub fn get_frame(&self) -> u64 {
        self.frame
    }

    /// Gets the time that has been handed out so far in seconds
    pub fn get_seconds(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    /// Hands out the next `n_frames` frames
    pub fn next_block(&mut self, n_frames: usize) -> BlockTime {
        let start_frame = self.frame;
        let duration = n_frames as f32 / self.sample_rate as f32;
        self.frame += n_frames as u64;
        BlockTime { start_frame, n_frames, duration }
    }
}
