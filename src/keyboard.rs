use minifb::Key;

use crate::display::SharedWindow;

/// The 16-key hex keypad.
pub trait Keyboard {
    /// One bit per key 0x0..=0xF, set while the key is held.
    fn poll_bitmask(&mut self) -> u16;

    /// A key released since the last frame, if any.
    fn wait_for_key_release(&mut self) -> Option<u8>;
}

// keypad      qwerty
// 1 2 3 C     1 2 3 4
// 4 5 6 D     Q W E R
// 7 8 9 E     A S D F
// A 0 B F     Z X C V
const KEYMAP: [Key; 16] = [
    Key::X,    // 0
    Key::Key1, // 1
    Key::Key2, // 2
    Key::Key3, // 3
    Key::Q,    // 4
    Key::W,    // 5
    Key::E,    // 6
    Key::A,    // 7
    Key::S,    // 8
    Key::D,    // 9
    Key::Z,    // A
    Key::C,    // B
    Key::Key4, // C
    Key::R,    // D
    Key::F,    // E
    Key::V,    // F
];

pub fn key_to_num(key: Key) -> Option<u8> {
    KEYMAP.iter().position(|k| *k == key).map(|n| n as u8)
}

/// Reads keys from the window owned by a `MinifbDisplay`.
pub struct MinifbKeyboard {
    window: SharedWindow,
}

impl MinifbKeyboard {
    pub(crate) fn new(window: SharedWindow) -> Self {
        Self { window }
    }
}

impl Keyboard for MinifbKeyboard {
    fn poll_bitmask(&mut self) -> u16 {
        let window = self.window.borrow();
        let Some(window) = window.as_ref() else {
            return 0;
        };
        KEYMAP
            .iter()
            .enumerate()
            .filter(|(_, key)| window.is_key_down(**key))
            .fold(0, |mask, (n, _)| mask | 1 << n)
    }

    fn wait_for_key_release(&mut self) -> Option<u8> {
        let window = self.window.borrow();
        let window = window.as_ref()?;
        window
            .get_keys_released()
            .into_iter()
            .find_map(key_to_num)
    }
}

/// Keys driven by the host: `press` and `release` from whatever input source
/// it has.
#[derive(Debug, Default, Clone)]
pub struct VirtualKeyboard {
    pressed: u16,
    released: Option<u8>,
}

impl VirtualKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: u8) {
        self.pressed |= 1 << (key & 0xF);
    }

    /// Lifts a key. The release is reported once by `wait_for_key_release`.
    pub fn release(&mut self, key: u8) {
        let key = key & 0xF;
        self.pressed &= !(1 << key);
        self.released = Some(key);
    }

    pub fn reset(&mut self) {
        self.pressed = 0;
        self.released = None;
    }
}

impl Keyboard for VirtualKeyboard {
    fn poll_bitmask(&mut self) -> u16 {
        self.pressed
    }

    fn wait_for_key_release(&mut self) -> Option<u8> {
        self.released.take()
    }
}

/// No keys, ever.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyKeyboard;

impl Keyboard for EmptyKeyboard {
    fn poll_bitmask(&mut self) -> u16 {
        0
    }

    fn wait_for_key_release(&mut self) -> Option<u8> {
        None
    }
}
