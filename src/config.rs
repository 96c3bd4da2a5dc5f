use std::time::Duration;

use crate::decode::DecodeStrategy;

// CPU: 700 times per second
// Display: 60 times per second
// Timer: 60 times per second
pub const DEFAULT_IPS: u32 = 700;
pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const DEFAULT_SCALE: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub title: String,
    pub scale: u32,
    pub instructions_per_second: u32,
    pub frame_rate: u32,
    pub decoder: DecodeStrategy,
    /// Seed for `CXNN`; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Stop executing after the first faulting instruction instead of
    /// logging it and moving on.
    pub halt_on_error: bool,
}

impl Config {
    /// Instruction batch run between two timer ticks, rounded to nearest.
    pub fn instructions_per_frame(&self) -> u32 {
        let fps = self.frame_rate.max(1);
        ((self.instructions_per_second + fps / 2) / fps).max(1)
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "chipvm".to_string(),
            scale: DEFAULT_SCALE,
            instructions_per_second: DEFAULT_IPS,
            frame_rate: DEFAULT_FRAME_RATE,
            decoder: DecodeStrategy::default(),
            seed: None,
            halt_on_error: false,
        }
    }
}
