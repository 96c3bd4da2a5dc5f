// 16 8-bit data registers named V0 to VF
// I -> address register (16 bits, only 12 reach memory)
//
// Stack of return addresses, 16 deep
//
// Delay timer & Sound timer: Count down at 60 times / s until 0
// Beep when sound timer is non-zero
//
// Display res: 64 width, 32 height
//
// 35 opcodes, each are 2 bytes (big-endian)
//      NNN: address
//      NN: 8-bit constant
//      N: 4-bit constant
//      X and Y: 4-bit register identifier

pub mod config;
pub mod decode;
pub mod disasm;
pub mod display;
pub mod emulator;
pub mod error;
pub mod keyboard;
pub mod memory;
pub mod registers;
pub mod sound;
pub mod timer;

pub use config::Config;
pub use decode::{DecodeStrategy, OpCodes};
pub use disasm::Disassembler;
pub use display::{Display, EmptyDisplay, FrameBuffer, MinifbDisplay};
pub use emulator::{EmuState, Emulator};
pub use error::EmuError;
pub use keyboard::{EmptyKeyboard, Keyboard, MinifbKeyboard, VirtualKeyboard};
pub use sound::{CpalSound, Mute, Sound};
