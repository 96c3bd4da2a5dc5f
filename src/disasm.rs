use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::Config;
use crate::decode::{DecodeStrategy, OpCodes};
use crate::display::EmptyDisplay;
use crate::emulator::Emulator;
use crate::error::EmuError;
use crate::keyboard::EmptyKeyboard;
use crate::memory::{TypeAddr, PROGRAM_START};
use crate::sound::Mute;

pub const LISTING_HEADER: &str = "Addr : [code] Asm\t\t; Desc";

impl OpCodes {
    /// Assembly text, e.g. `ADD V1, V2`.
    pub fn mnemonic(&self) -> String {
        match *self {
            Self::ClearScreen => "CLS".into(),
            Self::PopSubroutine => "RET".into(),
            Self::MachineRoutine(addr) => format!("SYS {addr:#05X}"),
            Self::Jump(addr) => format!("JP {addr:#05X}"),
            Self::PushSubroutine(addr) => format!("CALL {addr:#05X}"),
            Self::SkipEqualConstant(x, kk) => format!("SE V{x:X}, {kk:02}"),
            Self::SkipNotEqualConstant(x, kk) => format!("SNE V{x:X}, {kk:02}"),
            Self::SkipEqualRegister(x, y) => format!("SE V{x:X}, V{y:X}"),
            Self::SkipNotEqualRegister(x, y) => format!("SNE V{x:X}, V{y:X}"),
            Self::SetRegister(x, kk) => format!("LD V{x:X}, {kk:02}"),
            Self::AddToRegister(x, kk) => format!("ADD V{x:X}, {kk:02}"),
            Self::CopyRegister(x, y) => format!("LD V{x:X}, V{y:X}"),
            Self::Or(x, y) => format!("OR V{x:X}, V{y:X}"),
            Self::And(x, y) => format!("AND V{x:X}, V{y:X}"),
            Self::XOr(x, y) => format!("XOR V{x:X}, V{y:X}"),
            Self::Add(x, y) => format!("ADD V{x:X}, V{y:X}"),
            Self::SubtractForward(x, y) => format!("SUB V{x:X}, V{y:X}"),
            Self::RightShift(x, y) => format!("SHR V{x:X}, V{y:X}"),
            Self::SubtractBackward(x, y) => format!("SUBN V{x:X}, V{y:X}"),
            Self::LeftShift(x, y) => format!("SHL V{x:X}, V{y:X}"),
            Self::SetIndexRegister(addr) => format!("LD I, {addr:#05X}"),
            Self::JumpWithOffset(addr) => format!("JP V0, {addr:#05X}"),
            Self::Random(x, kk) => format!("RND V{x:X}, {kk:02}"),
            Self::Draw(x, y, n) => format!("DRW V{x:X}, V{y:X}, {n:02}"),
            Self::SkipIfPressed(x) => format!("SKP V{x:X}"),
            Self::SkipIfNotPressed(x) => format!("SKPN V{x:X}"),
            Self::CopyDelayToRegister(x) => format!("LD V{x:X}, DT"),
            Self::GetKey(x) => format!("LD V{x:X}, K"),
            Self::CopyRegisterToDelay(x) => format!("LD DT, V{x:X}"),
            Self::CopyRegisterToSound(x) => format!("LD ST, V{x:X}"),
            Self::AddToIndex(x) => format!("ADD I, V{x:X}"),
            Self::PointChar(x) => format!("LD F, V{x:X}"),
            Self::ToDecimal(x) => format!("LD B, V{x:X}"),
            Self::StoreRegisterToMemory(x) => format!("LD [I], V{x:X}"),
            Self::LoadRegisterFromMemory(x) => format!("LD V{x:X}, [I]"),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ClearScreen => "Clear the display",
            Self::PopSubroutine => "Return from a subroutine",
            Self::MachineRoutine(_) => "Jump to a machine code routine at nnn (ignored)",
            Self::Jump(_) => "Jump to location nnn",
            Self::PushSubroutine(_) => "Call subroutine at nnn",
            Self::SkipEqualConstant(..) => "Skip next instruction if Vx = kk",
            Self::SkipNotEqualConstant(..) => "Skip next instruction if Vx != kk",
            Self::SkipEqualRegister(..) => "Skip next instruction if Vx = Vy",
            Self::SkipNotEqualRegister(..) => "Skip next instruction if Vx != Vy",
            Self::SetRegister(..) => "Set Vx = kk",
            Self::AddToRegister(..) => "Set Vx = Vx + kk",
            Self::CopyRegister(..) => "Set Vx = Vy",
            Self::Or(..) => "Set Vx = Vx OR Vy",
            Self::And(..) => "Set Vx = Vx AND Vy",
            Self::XOr(..) => "Set Vx = Vx XOR Vy",
            Self::Add(..) => "Set Vx = Vx + Vy, set VF = carry",
            Self::SubtractForward(..) => "Set Vx = Vx - Vy, set VF = NOT borrow",
            Self::RightShift(..) => "Set Vx = Vy SHR 1, set VF = shifted out bit",
            Self::SubtractBackward(..) => "Set Vx = Vy - Vx, set VF = NOT borrow",
            Self::LeftShift(..) => "Set Vx = Vy SHL 1, set VF = shifted out bit",
            Self::SetIndexRegister(_) => "Set I = nnn",
            Self::JumpWithOffset(_) => "Jump to location nnn + V0",
            Self::Random(..) => "Set Vx = random byte AND kk",
            Self::Draw(..) => {
                "Display n-byte sprite starting at memory location I at (Vx, Vy), set VF = collision"
            }
            Self::SkipIfPressed(_) => "Skip next instruction if key with the value of Vx is pressed",
            Self::SkipIfNotPressed(_) => {
                "Skip next instruction if key with the value of Vx is not pressed"
            }
            Self::CopyDelayToRegister(_) => "Set Vx = delay timer value",
            Self::GetKey(_) => "Wait for a key press, store the value of the key in Vx",
            Self::CopyRegisterToDelay(_) => "Set delay timer = Vx",
            Self::CopyRegisterToSound(_) => "Set sound timer = Vx",
            Self::AddToIndex(_) => "Set I = I + Vx",
            Self::PointChar(_) => "Set I = location of sprite for digit Vx",
            Self::ToDecimal(_) => {
                "Store BCD representation of Vx in memory locations I, I+1, and I+2"
            }
            Self::StoreRegisterToMemory(_) => {
                "Store registers V0 through Vx in memory starting at location I"
            }
            Self::LoadRegisterFromMemory(_) => {
                "Read registers V0 through Vx from memory starting at location I"
            }
        }
    }
}

impl fmt::Display for OpCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t; {}", self.mnemonic(), self.description())
    }
}

/// Static listing of a program image, decoded without running it.
pub struct Disassembler {
    emu: Emulator<EmptyDisplay, EmptyKeyboard, Mute>,
    len: usize,
}

impl Disassembler {
    pub fn new(program: &[u8], decoder: DecodeStrategy) -> Result<Self, EmuError> {
        let config = Config {
            decoder,
            seed: Some(0),
            ..Config::default()
        };
        let mut emu = Emulator::new(EmptyDisplay, EmptyKeyboard, Mute, config);
        emu.load_program(program)?;
        Ok(Self {
            emu,
            len: program.len(),
        })
    }

    /// Every word of the image with its address and decoding.
    pub fn words(&self) -> impl Iterator<Item = (TypeAddr, u16, Result<OpCodes, EmuError>)> + '_ {
        (0..self.len).step_by(2).map(move |offset| {
            let addr = PROGRAM_START + offset as TypeAddr;
            let word = (self.emu.mem.get(addr) as u16) << 8 | self.emu.mem.get(addr + 1) as u16;
            (addr, word, self.emu.decode(word))
        })
    }

    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{LISTING_HEADER}");
        for (addr, word, op) in self.words() {
            match op {
                Ok(op) => {
                    let _ = writeln!(out, "{addr:04X}h: [{word:04X}] {op}");
                }
                Err(e) => {
                    let _ = writeln!(out, "{addr:04X}h: [{word:04X}] Unk: {word:#06X}");
                    let _ = writeln!(out, "{e}");
                }
            }
        }
        out
    }
}

/// Where the listing for `rom` is written: the ROM path plus `.dis.txt`.
pub fn listing_path(rom: &Path) -> PathBuf {
    let mut path = rom.as_os_str().to_owned();
    path.push(".dis.txt");
    PathBuf::from(path)
}

/// Disassembles the ROM at `rom` next to it and returns the listing's path.
pub fn disassemble_file(rom: &Path, decoder: DecodeStrategy) -> Result<PathBuf, EmuError> {
    let program = fs::read(rom)?;
    let listing = Disassembler::new(&program, decoder)?.listing();
    let out = listing_path(rom);
    fs::write(&out, listing)?;
    info!("wrote {}", out.display());
    Ok(out)
}
