use log::debug;

use crate::error::EmuError;
use crate::registers::{IndexRegister, ProgramCounter};

pub type TypeAddr = u16; // in reality u12
type FontBytes = [u8; 5 * 16];

pub const MEMORY_SIZE: usize = 4096;
pub const PROGRAM_START: TypeAddr = 0x200;
pub const FONT_ADDR: TypeAddr = 0x000;
pub const FONT_GLYPH_LEN: u16 = 5;
pub const STACK_SIZE: usize = 16;

/// Largest image that fits between `PROGRAM_START` and the end of memory.
pub const MAX_PROGRAM_SIZE: usize = MEMORY_SIZE - PROGRAM_START as usize;

const DEFAULT_FONT: FontBytes = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

pub struct Memory {
    // 4k bytes
    // font data stored from 000 -> 04F, programs from 200 onwards
    bytes: [u8; MEMORY_SIZE],
    pub pc: ProgramCounter,
    pub index: IndexRegister,
    pub stack: Stack,
}

impl Memory {
    /// Fresh memory with the font table already in place.
    pub fn new() -> Self {
        let mut mem = Self {
            bytes: [0; MEMORY_SIZE],
            pc: ProgramCounter(PROGRAM_START),
            index: IndexRegister(0x0),
            stack: Stack::new(),
        };
        mem.dma(FONT_ADDR, &DEFAULT_FONT);
        mem
    }

    /// Zeroes the program region, empties the stack and points PC at the
    /// program start. The font below `PROGRAM_START` survives.
    pub fn reset(&mut self) {
        self.bytes[PROGRAM_START as usize..].fill(0);
        self.stack.reset();
        self.pc.set_addr(PROGRAM_START);
        self.index.set_addr(0);
    }

    fn dma(&mut self, dest: TypeAddr, src: &[u8]) {
        let start = dest as usize;
        self.bytes[start..start + src.len()].copy_from_slice(src);
    }

    // addresses wrap at the top of memory
    pub fn set(&mut self, addr: TypeAddr, val: u8) {
        self.bytes[addr as usize % MEMORY_SIZE] = val;
    }

    pub fn get(&self, addr: TypeAddr) -> u8 {
        self.bytes[addr as usize % MEMORY_SIZE]
    }

    pub fn increment_pc(&mut self) {
        self.pc.increment();
    }

    pub fn decrement_pc(&mut self) {
        self.pc.decrement();
    }

    /// Reads the big-endian word at PC and steps past it.
    pub fn next_instruction(&mut self) -> Result<u16, EmuError> {
        let pc = self.pc.0 as usize;
        if pc + 1 >= MEMORY_SIZE {
            return Err(EmuError::AddressOutOfRange { address: self.pc.0 });
        }
        let (l, r) = (self.bytes[pc], self.bytes[pc + 1]);
        self.increment_pc();
        Ok(((l as u16) << 8) | r as u16)
    }

    /// Moves PC to `addr`, refusing targets outside memory.
    pub fn set_pc(&mut self, addr: TypeAddr) -> Result<(), EmuError> {
        check_addr(addr)?;
        self.pc.set_addr(addr);
        Ok(())
    }

    pub fn set_index(&mut self, addr: TypeAddr) {
        self.index.set_addr(addr);
    }

    /// Copies a program image to `PROGRAM_START`. Callers reset first.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), EmuError> {
        if bytes.len() > MAX_PROGRAM_SIZE {
            return Err(EmuError::ProgramTooLarge {
                size: bytes.len(),
                max_size: MAX_PROGRAM_SIZE,
            });
        }
        self.dma(PROGRAM_START, bytes);
        debug!("loaded {} bytes at {:#05X}", bytes.len(), PROGRAM_START);
        Ok(())
    }

    pub fn slice(&self, addr: TypeAddr, len: usize) -> &[u8] {
        let start = (addr as usize).min(MEMORY_SIZE);
        let end = (start + len).min(MEMORY_SIZE);
        &self.bytes[start..end]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

pub fn check_addr(addr: TypeAddr) -> Result<(), EmuError> {
    if addr as usize >= MEMORY_SIZE {
        return Err(EmuError::AddressOutOfRange { address: addr });
    }
    Ok(())
}

/// Return addresses for `CALL`/`RET`, at most `STACK_SIZE` deep.
pub struct Stack {
    addresses: Vec<TypeAddr>,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            addresses: Vec::with_capacity(STACK_SIZE),
        }
    }

    pub fn reset(&mut self) {
        self.addresses.clear();
    }

    pub fn push(&mut self, addr: TypeAddr) -> Result<(), EmuError> {
        if self.addresses.len() >= STACK_SIZE {
            return Err(EmuError::StackOverflow);
        }
        self.addresses.push(addr);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<TypeAddr, EmuError> {
        self.addresses.pop().ok_or(EmuError::StackUnderflow)
    }

    pub fn depth(&self) -> usize {
        self.addresses.len()
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
