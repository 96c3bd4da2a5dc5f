use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use minifb::{Key, ScaleMode, Window, WindowOptions};

use crate::error::EmuError;

pub const WIDTH: usize = 64;
pub const HEIGHT: usize = 32;

const FOREGROUND: u32 = 0x00_7F_FF;
const BACKGROUND: u32 = 0x00_00_00;

/// What the engine draws on. Pixels are XOR-toggled one at a time.
pub trait Display {
    fn init(&mut self, title: &str, scale: u32) -> Result<(), EmuError>;

    /// Toggles the pixel at `(x, y)`. Returns true when the pixel was on and
    /// is now off. Coordinates outside the grid are ignored.
    fn put_pixel(&mut self, x: u8, y: u8) -> bool;

    fn present(&mut self) -> Result<(), EmuError>;

    fn clear(&mut self);

    fn should_close(&self) -> bool;

    fn close(&mut self);
}

/// The 64x32 monochrome grid, with no window attached.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    bit_buffer: Vec<bool>,
    presented: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            bit_buffer: vec![false; WIDTH * HEIGHT],
            presented: 0,
        }
    }

    pub fn clear_buffer(&mut self) {
        self.bit_buffer.fill(false);
    }

    pub fn toggle(&mut self, x: u8, y: u8) -> bool {
        let (x, y) = (x as usize, y as usize);
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        let pixel = &mut self.bit_buffer[y * WIDTH + x];
        *pixel = !*pixel;
        !*pixel
    }

    pub fn is_set(&self, x: usize, y: usize) -> bool {
        x < WIDTH && y < HEIGHT && self.bit_buffer[y * WIDTH + x]
    }

    pub fn is_blank(&self) -> bool {
        self.bit_buffer.iter().all(|bit| !bit)
    }

    pub fn lit_pixels(&self) -> usize {
        self.bit_buffer.iter().filter(|bit| **bit).count()
    }

    /// How many frames have been presented since construction.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("lit_pixels", &self.lit_pixels())
            .field("presented", &self.presented)
            .finish()
    }
}

impl fmt::Display for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.bit_buffer.chunks(WIDTH) {
            let line: String = row.iter().map(|&bit| if bit { '#' } else { '.' }).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl Display for FrameBuffer {
    fn init(&mut self, _title: &str, _scale: u32) -> Result<(), EmuError> {
        Ok(())
    }

    fn put_pixel(&mut self, x: u8, y: u8) -> bool {
        self.toggle(x, y)
    }

    fn present(&mut self) -> Result<(), EmuError> {
        self.presented += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.clear_buffer();
    }

    fn should_close(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Draws nothing and never asks to close.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDisplay;

impl Display for EmptyDisplay {
    fn init(&mut self, _title: &str, _scale: u32) -> Result<(), EmuError> {
        Ok(())
    }

    fn put_pixel(&mut self, _x: u8, _y: u8) -> bool {
        false
    }

    fn present(&mut self) -> Result<(), EmuError> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn should_close(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// A window shared between the display and the keyboard reading from it.
pub(crate) type SharedWindow = Rc<RefCell<Option<Window>>>;

/// `minifb` window backend.
pub struct MinifbDisplay {
    window: SharedWindow,
    fb: FrameBuffer,
    pixel_buffer: Vec<u32>,
    title: String,
    fps_frames: u32,
    fps_since: Instant,
}

impl MinifbDisplay {
    pub fn new() -> Self {
        Self {
            window: Rc::new(RefCell::new(None)),
            fb: FrameBuffer::new(),
            pixel_buffer: vec![BACKGROUND; WIDTH * HEIGHT],
            title: String::new(),
            fps_frames: 0,
            fps_since: Instant::now(),
        }
    }

    /// Keyboard reading keys from this display's window.
    pub fn keyboard(&self) -> crate::keyboard::MinifbKeyboard {
        crate::keyboard::MinifbKeyboard::new(Rc::clone(&self.window))
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.fb
    }

    fn update_fps(&mut self, window: &mut Window) {
        self.fps_frames += 1;
        let elapsed = self.fps_since.elapsed();
        if elapsed.as_secs() >= 1 {
            let fps = self.fps_frames as f64 / elapsed.as_secs_f64();
            window.set_title(&format!("{} [FPS: {:.2}]", self.title, fps));
            self.fps_frames = 0;
            self.fps_since = Instant::now();
        }
    }
}

impl Default for MinifbDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Window size in host pixels: each CHIP-8 pixel becomes a `scale` square.
fn window_size(scale: u32) -> (usize, usize) {
    let scale = scale.max(1) as usize;
    (WIDTH * scale, HEIGHT * scale)
}

impl Display for MinifbDisplay {
    fn init(&mut self, title: &str, scale: u32) -> Result<(), EmuError> {
        let (width, height) = window_size(scale);
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                scale_mode: ScaleMode::Stretch,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| EmuError::Backend(e.to_string()))?;
        // the run loop paces frames itself
        window.limit_update_rate(None);
        self.title = title.to_string();
        self.fps_since = Instant::now();
        *self.window.borrow_mut() = Some(window);
        Ok(())
    }

    fn put_pixel(&mut self, x: u8, y: u8) -> bool {
        let erased = self.fb.toggle(x, y);
        let (x, y) = (x as usize, y as usize);
        if x < WIDTH && y < HEIGHT {
            self.pixel_buffer[y * WIDTH + x] = if self.fb.is_set(x, y) {
                FOREGROUND
            } else {
                BACKGROUND
            };
        }
        erased
    }

    fn present(&mut self) -> Result<(), EmuError> {
        let window = Rc::clone(&self.window);
        let mut slot = window.borrow_mut();
        let Some(window) = slot.as_mut() else {
            return Ok(());
        };
        window
            .update_with_buffer(&self.pixel_buffer, WIDTH, HEIGHT)
            .map_err(|e| EmuError::Backend(e.to_string()))?;
        self.fb.present()?;
        self.update_fps(window);
        Ok(())
    }

    fn clear(&mut self) {
        self.fb.clear_buffer();
        self.pixel_buffer.fill(BACKGROUND);
    }

    fn should_close(&self) -> bool {
        match self.window.borrow().as_ref() {
            Some(window) => !window.is_open() || window.is_key_down(Key::Escape),
            None => true,
        }
    }

    fn close(&mut self) {
        // dropping the window closes it
        self.window.borrow_mut().take();
    }
}
