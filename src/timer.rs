/// One of the two 8-bit countdown timers, decremented once per frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    count: u8,
}

impl Timer {
    pub fn new(init_count: u8) -> Self {
        Self { count: init_count }
    }

    pub fn set(&mut self, value: u8) {
        self.count = value;
    }

    pub fn get(&self) -> u8 {
        self.count
    }

    /// Counts down by one, stopping at zero. Returns whether the timer was
    /// running when the tick arrived.
    pub fn tick(&mut self) -> bool {
        if self.count == 0 {
            return false;
        }
        self.count -= 1;
        true
    }
}
