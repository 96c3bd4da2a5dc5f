use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Instant;

use log::{debug, error, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::decode::OpCodes;
use crate::display::{Display, HEIGHT, WIDTH};
use crate::error::EmuError;
use crate::keyboard::Keyboard;
use crate::memory::{check_addr, Memory, TypeAddr, FONT_ADDR, FONT_GLYPH_LEN, PROGRAM_START};
use crate::registers::{Registers, FLAG};
use crate::sound::Sound;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    Running,
    /// Stopped after a fault; frames are still presented until the display
    /// asks to close.
    Halted,
}

pub struct Emulator<D, K, S> {
    pub regs: Registers,
    pub mem: Memory,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    keys: u16,
    display: D,
    keyboard: K,
    sound: S,
    rng: StdRng,
    config: Config,
    state: EmuState,
}

impl<D: Display, K: Keyboard, S: Sound> Emulator<D, K, S> {
    pub fn new(display: D, keyboard: K, sound: S, config: Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut emu = Self {
            regs: Registers::new(),
            mem: Memory::new(),
            delay_timer: Timer::default(),
            sound_timer: Timer::default(),
            keys: 0,
            display,
            keyboard,
            sound,
            rng,
            config,
            state: EmuState::Running,
        };
        emu.reset();
        emu
    }

    /// Back to power-on: program memory, registers, stack, timers and screen
    /// cleared, PC at the program start.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.regs.reset();
        self.delay_timer.set(0);
        self.sound_timer.set(0);
        self.keys = 0;
        self.display.clear();
        self.state = EmuState::Running;
    }

    pub fn load_program(&mut self, program: &[u8]) -> Result<(), EmuError> {
        self.reset();
        self.mem.load_rom(program)?;
        debug!(
            "program image:\n{}",
            hex_dump(self.mem.slice(PROGRAM_START, program.len()))
        );
        Ok(())
    }

    pub fn load_from(&mut self, reader: &mut impl io::Read) -> Result<(), EmuError> {
        let mut program = Vec::new();
        reader.read_to_end(&mut program)?;
        self.load_program(&program)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), EmuError> {
        let program = std::fs::read(path)?;
        self.load_program(&program)
    }

    pub fn state(&self) -> EmuState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }

    pub fn sound(&self) -> &S {
        &self.sound
    }

    pub fn decode(&self, ins: u16) -> Result<OpCodes, EmuError> {
        self.config.decoder.decode(ins)
    }

    /// Re-reads the keypad. The run loop does this once per frame.
    pub fn snapshot_keys(&mut self) {
        self.keys = self.keyboard.poll_bitmask();
    }

    // keys past 0xF have no bit in the mask and are never down
    fn key_down(&self, key: u8) -> bool {
        key < 16 && self.keys & (1 << key) != 0
    }

    /// One fetch, decode and execute. A failed fetch halts the engine since
    /// PC can no longer advance.
    pub fn tick(&mut self) -> Result<OpCodes, EmuError> {
        let pc = self.mem.pc.0;
        let ins = match self.mem.next_instruction() {
            Ok(ins) => ins,
            Err(e) => {
                self.halt();
                return Err(e);
            }
        };
        let op = self.decode(ins)?;
        trace!("{pc:04X}: [{ins:04X}] {op}");
        self.execute_ins(op)?;
        Ok(op)
    }

    fn halt(&mut self) {
        if self.state == EmuState::Halted {
            return;
        }
        self.state = EmuState::Halted;
        error!("halted at {:#05X}", self.mem.pc.0);
        debug!("\n{}", self.dump_registers());
    }

    pub fn execute_ins(&mut self, ins: OpCodes) -> Result<(), EmuError> {
        match ins {
            OpCodes::ClearScreen => {
                self.display.clear();
            }
            OpCodes::PopSubroutine => {
                let addr = self.mem.stack.pop()?;
                self.mem.set_pc(addr)?;
            }
            OpCodes::MachineRoutine(addr) => {
                debug!("ignoring machine routine at {addr:#05X}");
            }
            OpCodes::Jump(addr) => {
                self.mem.set_pc(addr)?;
            }
            OpCodes::PushSubroutine(addr) => {
                check_addr(addr)?;
                // PC already points past the call
                self.mem.stack.push(self.mem.pc.0)?;
                self.mem.set_pc(addr)?;
            }
            OpCodes::SkipEqualConstant(vx, nn) => {
                if self.regs.get(vx) == nn {
                    self.mem.increment_pc();
                }
            }
            OpCodes::SkipNotEqualConstant(vx, nn) => {
                if self.regs.get(vx) != nn {
                    self.mem.increment_pc();
                }
            }
            OpCodes::SkipEqualRegister(vx, vy) => {
                if self.regs.get(vx) == self.regs.get(vy) {
                    self.mem.increment_pc();
                }
            }
            OpCodes::SkipNotEqualRegister(vx, vy) => {
                if self.regs.get(vx) != self.regs.get(vy) {
                    self.mem.increment_pc();
                }
            }
            OpCodes::SetRegister(vx, nn) => {
                self.regs.set_register(vx, nn);
            }
            OpCodes::AddToRegister(vx, nn) => {
                self.regs.add_to_register(vx, nn);
            }
            OpCodes::CopyRegister(vx, vy) => {
                self.regs.set_register(vx, self.regs.get(vy));
            }
            OpCodes::Or(vx, vy) => {
                self.regs
                    .set_register(vx, self.regs.get(vx) | self.regs.get(vy));
                self.logic_flag(vx);
            }
            OpCodes::And(vx, vy) => {
                self.regs
                    .set_register(vx, self.regs.get(vx) & self.regs.get(vy));
                self.logic_flag(vx);
            }
            OpCodes::XOr(vx, vy) => {
                self.regs
                    .set_register(vx, self.regs.get(vx) ^ self.regs.get(vy));
                self.logic_flag(vx);
            }
            OpCodes::Add(vx, vy) => {
                let sum = self.regs.get(vx) as u16 + self.regs.get(vy) as u16;
                self.regs.set_register(vx, (sum & 0xFF) as u8);
                self.regs.set_flag((sum > 0xFF) as u8);
            }
            OpCodes::SubtractForward(vx, vy) => {
                let diff = self.regs.get(vx) as i16 - self.regs.get(vy) as i16;
                self.regs.set_register(vx, (diff & 0xFF) as u8);
                self.regs.set_flag((diff >= 0) as u8); // no borrow
            }
            OpCodes::SubtractBackward(vx, vy) => {
                let diff = self.regs.get(vy) as i16 - self.regs.get(vx) as i16;
                self.regs.set_register(vx, (diff & 0xFF) as u8);
                self.regs.set_flag((diff >= 0) as u8); // no borrow
            }
            OpCodes::RightShift(vx, vy) => {
                // COSMAC VIP: shift Vy into Vx
                let vx_value = self.regs.get(vy);
                self.regs.set_register(vx, vx_value);

                let vf = vx_value & 1;
                self.regs.set_register(vx, vx_value >> 1);
                self.regs.set_flag(vf);
            }
            OpCodes::LeftShift(vx, vy) => {
                let vx_value = self.regs.get(vy);
                self.regs.set_register(vx, vx_value);

                let vf = (vx_value >> 7) & 1;
                self.regs.set_register(vx, vx_value << 1);
                self.regs.set_flag(vf);
            }
            OpCodes::SetIndexRegister(addr) => self.mem.set_index(addr),
            OpCodes::JumpWithOffset(addr) => {
                self.mem.set_pc(addr + self.regs.get(0) as u16)?;
            }
            OpCodes::Random(vx, nn) => {
                let ransuu: u8 = self.rng.gen();
                self.regs.set_register(vx, nn & ransuu);
            }
            OpCodes::Draw(reg_x, reg_y, height) => {
                self.draw(reg_x, reg_y, height);
            }
            OpCodes::SkipIfPressed(vx) => {
                if self.key_down(self.regs.get(vx)) {
                    self.mem.increment_pc();
                }
            }
            OpCodes::SkipIfNotPressed(vx) => {
                if !self.key_down(self.regs.get(vx)) {
                    self.mem.increment_pc();
                }
            }
            OpCodes::CopyDelayToRegister(vx) => self.regs.set_register(vx, self.delay_timer.get()),
            OpCodes::GetKey(vx) => match self.keyboard.wait_for_key_release() {
                Some(key) => self.regs.set_register(vx, key),
                // run this instruction again next cycle
                None => self.mem.decrement_pc(),
            },
            OpCodes::CopyRegisterToDelay(vx) => self.delay_timer.set(self.regs.get(vx)),
            OpCodes::CopyRegisterToSound(vx) => self.sound_timer.set(self.regs.get(vx)),
            OpCodes::AddToIndex(vx) => {
                self.mem.index.advance(self.regs.get(vx) as u16);
            }
            OpCodes::PointChar(vx) => {
                let digit = (self.regs.get(vx) & 0x0F) as u16;
                self.mem.set_index(FONT_ADDR + digit * FONT_GLYPH_LEN);
            }
            OpCodes::ToDecimal(vx) => {
                let value = self.regs.get(vx);
                let index = self.mem.index.0;
                let digits = [value / 100, (value / 10) % 10, value % 10];
                for (i, digit) in digits.into_iter().enumerate() {
                    self.mem.set(index.wrapping_add(i as u16), digit);
                }
            }
            OpCodes::StoreRegisterToMemory(vx) => {
                for reg in 0..=vx {
                    self.mem.set(self.mem.index.0, self.regs.get(reg));
                    self.mem.index.advance(1);
                }
            }
            OpCodes::LoadRegisterFromMemory(vx) => {
                for reg in 0..=vx {
                    let reg_val = self.mem.get(self.mem.index.0);
                    self.regs.set_register(reg, reg_val);
                    self.mem.index.advance(1);
                }
            }
        }
        Ok(())
    }

    // 8XY1..8XY3 reset VF, except that with VF as destination the result is
    // shifted down instead
    fn logic_flag(&mut self, vx: u8) {
        if vx == FLAG {
            self.regs.set_flag(self.regs.flag() >> 7);
        } else {
            self.regs.set_flag(0);
        }
    }

    fn draw(&mut self, reg_x: u8, reg_y: u8, height: u8) {
        // the anchor wraps, the rest of the sprite is clipped
        let x = self.regs.get(reg_x) % WIDTH as u8;
        let y = self.regs.get(reg_y) % HEIGHT as u8;

        let mut vf = false;
        for row in 0..height {
            let line = self.mem.get(self.mem.index.0.wrapping_add(row as u16));
            for col in 0..8u8 {
                if line & (0x80 >> col) != 0 && self.display.put_pixel(x + col, y + row) {
                    vf = true;
                }
            }
        }
        self.regs.set_flag(vf as u8);
    }

    /// Counts both timers down once, beeping while the sound timer runs.
    pub fn sync_timers(&mut self) {
        if self.sound_timer.tick() {
            self.sound.beep();
        }
        self.delay_timer.tick();
    }

    /// One frame: read keys, run the instruction batch, tick timers, present.
    pub fn run_frame(&mut self) {
        if self.state == EmuState::Running {
            self.snapshot_keys();
            for _ in 0..self.config.instructions_per_frame() {
                if let Err(e) = self.tick() {
                    warn!("{e}");
                    if self.config.halt_on_error || !e.is_instruction_fault() {
                        self.halt();
                    }
                }
                if self.state == EmuState::Halted {
                    break;
                }
            }
            self.sync_timers();
        }
        if let Err(e) = self.display.present() {
            warn!("{e}");
        }
    }

    /// Runs frames at the configured rate until the display asks to close.
    pub fn run(&mut self) {
        let budget = self.config.frame_budget();
        while !self.display.should_close() {
            let start = Instant::now();
            self.run_frame();
            if let Some(rest) = budget.checked_sub(start.elapsed()) {
                thread::sleep(rest);
            }
        }
        self.display.close();
    }

    pub fn dump_registers(&self) -> String {
        let mut out = String::from("   | 0| 1| 2| 3| 4| 5| 6| 7| 8| 9| A| B| C| D| E| F|\n v |");
        for v in self.regs.as_slice() {
            let _ = write!(out, "{v:02X}|");
        }
        let _ = write!(
            out,
            "\n I = {:04X}  PC = {:04X}  SP = {}",
            self.mem.index.0,
            self.mem.pc.0,
            self.mem.stack.depth()
        );
        out
    }

    pub fn pc(&self) -> TypeAddr {
        self.mem.pc.0
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", row * 16);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;
    use crate::keyboard::VirtualKeyboard;
    use std::cell::Cell;

    /// Counts beeps instead of playing them.
    #[derive(Default)]
    struct CountingSound {
        beeps: usize,
    }

    impl Sound for CountingSound {
        fn beep(&mut self) {
            self.beeps += 1;
        }
    }

    type TestEmu = Emulator<FrameBuffer, VirtualKeyboard, CountingSound>;

    fn emu() -> TestEmu {
        let config = Config {
            seed: Some(7),
            ..Config::default()
        };
        Emulator::new(
            FrameBuffer::new(),
            VirtualKeyboard::new(),
            CountingSound::default(),
            config,
        )
    }

    fn emu_with(program: &[u16]) -> TestEmu {
        let mut emu = emu();
        let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_be_bytes()).collect();
        emu.load_program(&bytes).unwrap();
        emu
    }

    #[test]
    fn clear_screen() {
        let mut emu = emu_with(&[0x00E0, 0x00E0]);
        emu.display_mut().put_pixel(0, 0);
        emu.tick().unwrap();
        assert!(emu.display().is_blank());
        emu.tick().unwrap();
        assert!(emu.display().is_blank());
    }

    #[test]
    fn call_and_return() {
        let mut emu = emu_with(&[0x2206, 0x0000, 0x0000, 0x00EE]);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x206);
        assert_eq!(emu.mem.stack.depth(), 1);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x202);
        assert_eq!(emu.mem.stack.depth(), 0);
    }

    #[test]
    fn return_on_empty_stack_underflows() {
        let mut emu = emu_with(&[0x00EE]);
        assert!(matches!(emu.tick(), Err(EmuError::StackUnderflow)));
        assert_eq!(emu.state(), EmuState::Running);
    }

    #[test]
    fn seventeenth_call_overflows() {
        // a subroutine that calls itself
        let mut emu = emu_with(&[0x2200]);
        for _ in 0..16 {
            emu.tick().unwrap();
        }
        assert!(matches!(emu.tick(), Err(EmuError::StackOverflow)));
    }

    #[test]
    fn jump_with_offset_checks_range() {
        let mut emu = emu_with(&[0xBFFF, 0xB300]);
        emu.regs.set_register(0, 1);
        assert!(matches!(
            emu.tick(),
            Err(EmuError::AddressOutOfRange { address: 0x1000 })
        ));
        assert_eq!(emu.pc(), 0x202);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x301);
    }

    #[test]
    fn skips_advance_by_an_extra_word() {
        let mut emu = emu_with(&[0x3A12, 0x0000, 0x4A12, 0x5AB0, 0x0000, 0x9AB0]);
        emu.regs.set_register(0xA, 0x12);
        emu.regs.set_register(0xB, 0x12);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x204);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x206);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x20A);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x20C);
    }

    #[test]
    fn add_immediate_wraps_without_flag() {
        let mut emu = emu_with(&[0x63FF, 0x7302]);
        emu.tick().unwrap();
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(3), 0x01);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn add_with_carry() {
        let mut emu = emu_with(&[0x8014, 0x8014]);
        emu.regs.set_register(0, 0xFF);
        emu.regs.set_register(1, 0x01);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0x00);
        assert_eq!(emu.regs.flag(), 1);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0x01);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn subtract_sets_not_borrow() {
        let mut emu = emu_with(&[0x8015, 0x8015]);
        emu.regs.set_register(0, 0x01);
        emu.regs.set_register(1, 0x01);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0x00);
        assert_eq!(emu.regs.flag(), 1);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0xFF);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn subtract_backward() {
        let mut emu = emu_with(&[0x8017, 0x8017]);
        emu.regs.set_register(0, 0x02);
        emu.regs.set_register(1, 0x05);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0x03);
        assert_eq!(emu.regs.flag(), 1);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(0), 0x02);
        assert_eq!(emu.regs.flag(), 1);
        emu.regs.set_register(1, 0x00);
        emu.execute_ins(OpCodes::SubtractBackward(0, 1)).unwrap();
        assert_eq!(emu.regs.get(0), 0xFE);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn flag_wins_over_vf_destination() {
        let mut emu = emu();
        emu.regs.set_register(0xF, 0xFF);
        emu.regs.set_register(0x1, 0x01);
        emu.execute_ins(OpCodes::Add(0xF, 0x1)).unwrap();
        assert_eq!(emu.regs.get(0xF), 1);
    }

    #[test]
    fn logic_ops_clear_flag() {
        for op in [OpCodes::Or(1, 2), OpCodes::And(1, 2), OpCodes::XOr(1, 2)] {
            let mut emu = emu();
            emu.regs.set_register(1, 0b1100);
            emu.regs.set_register(2, 0b1010);
            emu.regs.set_flag(0x55);
            emu.execute_ins(op).unwrap();
            assert_eq!(emu.regs.flag(), 0, "{op:?}");
        }
        let mut emu = emu();
        emu.regs.set_register(1, 0b1100);
        emu.regs.set_register(2, 0b1010);
        emu.execute_ins(OpCodes::Or(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0b1110);
        emu.execute_ins(OpCodes::And(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0b1010);
        emu.execute_ins(OpCodes::XOr(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0);
    }

    #[test]
    fn logic_op_into_vf_shifts_flag() {
        let mut emu = emu();
        emu.regs.set_register(0xF, 0x80);
        emu.regs.set_register(0x1, 0x01);
        emu.execute_ins(OpCodes::Or(0xF, 0x1)).unwrap();
        // 0x80 | 0x01 = 0x81, then >> 7
        assert_eq!(emu.regs.flag(), 1);

        emu.regs.set_register(0xF, 0x7F);
        emu.execute_ins(OpCodes::And(0xF, 0x1)).unwrap();
        assert_eq!(emu.regs.flag(), 0);

        emu.regs.set_register(0xF, 0xF0);
        emu.execute_ins(OpCodes::XOr(0xF, 0x1)).unwrap();
        assert_eq!(emu.regs.flag(), 1);
    }

    #[test]
    fn shifts_read_vy() {
        let mut emu = emu();
        emu.regs.set_register(1, 0x00);
        emu.regs.set_register(2, 0b1000_0011);
        emu.execute_ins(OpCodes::RightShift(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0b0100_0001);
        assert_eq!(emu.regs.flag(), 1);
        assert_eq!(emu.regs.get(2), 0b1000_0011);

        emu.execute_ins(OpCodes::LeftShift(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0b0000_0110);
        assert_eq!(emu.regs.flag(), 1);

        emu.regs.set_register(2, 0b0100_0000);
        emu.execute_ins(OpCodes::LeftShift(1, 2)).unwrap();
        assert_eq!(emu.regs.get(1), 0b1000_0000);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn random_is_masked_and_seeded() {
        let mut a = emu();
        let mut b = emu();
        for _ in 0..32 {
            a.execute_ins(OpCodes::Random(3, 0x0F)).unwrap();
            b.execute_ins(OpCodes::Random(3, 0x0F)).unwrap();
            assert_eq!(a.regs.get(3), b.regs.get(3));
            assert_eq!(a.regs.get(3) & 0xF0, 0);
        }
        a.execute_ins(OpCodes::Random(3, 0x00)).unwrap();
        assert_eq!(a.regs.get(3), 0);
    }

    #[test]
    fn draw_twice_collides_and_erases() {
        let mut emu = emu_with(&[0xA300, 0xD011, 0xD011]);
        emu.mem.set(0x300, 0xFF);
        emu.regs.set_register(0, 10);
        emu.regs.set_register(1, 5);
        emu.tick().unwrap();
        emu.tick().unwrap();
        assert_eq!(emu.regs.flag(), 0);
        assert_eq!(emu.display().lit_pixels(), 8);
        assert!(emu.display().is_set(10, 5) && emu.display().is_set(17, 5));
        emu.tick().unwrap();
        assert_eq!(emu.regs.flag(), 1);
        assert!(emu.display().is_blank());
    }

    #[test]
    fn draw_wraps_anchor_and_clips_overhang() {
        let mut emu = emu();
        emu.mem.set_index(0x300);
        emu.mem.set(0x300, 0xFF);
        emu.mem.set(0x301, 0xFF);
        // 124 % 64 = 60, 63 % 32 = 31
        emu.regs.set_register(0, 124);
        emu.regs.set_register(1, 63);
        emu.execute_ins(OpCodes::Draw(0, 1, 2)).unwrap();
        assert_eq!(emu.display().lit_pixels(), 4);
        for x in 60..64 {
            assert!(emu.display().is_set(x, 31));
        }
        assert!(!emu.display().is_set(0, 31));
        assert!(!emu.display().is_set(60, 0));
    }

    #[test]
    fn font_glyph_draws() {
        let mut emu = emu();
        emu.regs.set_register(2, 0x1A);
        emu.execute_ins(OpCodes::PointChar(2)).unwrap();
        assert_eq!(emu.mem.index.0, FONT_ADDR + 0xA * 5);
        emu.execute_ins(OpCodes::Draw(0, 0, 5)).unwrap();
        // "A" glyph: F0 90 F0 90 90
        assert_eq!(emu.display().lit_pixels(), 4 + 2 + 4 + 2 + 2);
    }

    #[test]
    fn key_skips_use_frame_snapshot() {
        let mut emu = emu_with(&[0xE19E, 0x0000, 0xE1A1, 0xE1A1]);
        emu.regs.set_register(1, 0x5);
        emu.keyboard_mut().press(0x5);
        // not snapshotted yet
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x202);

        emu.mem.pc.set_addr(PROGRAM_START);
        emu.snapshot_keys();
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x204);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x206);
    }

    #[test]
    fn key_index_past_keypad_is_never_down() {
        let mut emu = emu_with(&[0xE19E, 0xE1A1]);
        emu.regs.set_register(1, 0x15);
        emu.keyboard_mut().press(0x5);
        emu.snapshot_keys();
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x202);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), 0x206);
    }

    #[test]
    fn get_key_busy_waits_until_release() {
        let mut emu = emu_with(&[0xF30A]);
        for _ in 0..5 {
            emu.tick().unwrap();
            assert_eq!(emu.pc(), PROGRAM_START);
            assert_eq!(emu.regs.get(3), 0);
        }
        emu.keyboard_mut().press(0xB);
        emu.tick().unwrap();
        assert_eq!(emu.pc(), PROGRAM_START);

        emu.keyboard_mut().release(0xB);
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(3), 0xB);
        assert_eq!(emu.pc(), PROGRAM_START + 2);
    }

    #[test]
    fn timers_copy_and_tick() {
        let mut emu = emu_with(&[0x6105, 0xF115, 0xF118, 0xF207]);
        for _ in 0..3 {
            emu.tick().unwrap();
        }
        assert_eq!(emu.delay_timer.get(), 5);
        assert_eq!(emu.sound_timer.get(), 5);
        emu.sync_timers();
        emu.tick().unwrap();
        assert_eq!(emu.regs.get(2), 4);
        assert_eq!(emu.sound().beeps, 1);
        for _ in 0..10 {
            emu.sync_timers();
        }
        assert_eq!(emu.delay_timer.get(), 0);
        assert_eq!(emu.sound_timer.get(), 0);
        assert_eq!(emu.sound().beeps, 5);
    }

    #[test]
    fn add_to_index_is_16_bit() {
        let mut emu = emu();
        emu.mem.set_index(0x0FFF);
        emu.regs.set_register(4, 0x02);
        emu.execute_ins(OpCodes::AddToIndex(4)).unwrap();
        assert_eq!(emu.mem.index.0, 0x1001);
        assert_eq!(emu.regs.flag(), 0);
    }

    #[test]
    fn bcd() {
        let mut emu = emu();
        emu.mem.set_index(0x400);
        emu.regs.set_register(7, 234);
        emu.execute_ins(OpCodes::ToDecimal(7)).unwrap();
        assert_eq!(emu.mem.slice(0x400, 3), &[2, 3, 4]);
        emu.regs.set_register(7, 7);
        emu.execute_ins(OpCodes::ToDecimal(7)).unwrap();
        assert_eq!(emu.mem.slice(0x400, 3), &[0, 0, 7]);
        assert_eq!(emu.mem.index.0, 0x400);
    }

    #[test]
    fn block_store_and_load_advance_index() {
        let mut emu = emu();
        for reg in 0..=3 {
            emu.regs.set_register(reg, 0x10 + reg);
        }
        emu.mem.set_index(0x500);
        emu.execute_ins(OpCodes::StoreRegisterToMemory(3)).unwrap();
        assert_eq!(emu.mem.slice(0x500, 5), &[0x10, 0x11, 0x12, 0x13, 0x00]);
        assert_eq!(emu.mem.index.0, 0x504);

        emu.regs.reset();
        emu.mem.set_index(0x501);
        emu.execute_ins(OpCodes::LoadRegisterFromMemory(1)).unwrap();
        assert_eq!(emu.regs.get(0), 0x11);
        assert_eq!(emu.regs.get(1), 0x12);
        assert_eq!(emu.regs.get(2), 0x00);
        assert_eq!(emu.mem.index.0, 0x503);
    }

    #[test]
    fn unknown_opcode_is_skipped_by_run_frame() {
        let mut emu = emu_with(&[0x5121, 0x6142]);
        emu.run_frame();
        assert_eq!(emu.state(), EmuState::Running);
        assert_eq!(emu.regs.get(1), 0x42);
        assert_eq!(emu.display().presented(), 1);
    }

    #[test]
    fn halt_on_error_stops_execution() {
        let mut emu = emu();
        emu.config.halt_on_error = true;
        let bytes = [0x51, 0x21, 0x61, 0x42];
        emu.load_program(&bytes).unwrap();
        emu.run_frame();
        assert_eq!(emu.state(), EmuState::Halted);
        assert_eq!(emu.regs.get(1), 0);
        emu.run_frame();
        assert_eq!(emu.pc(), 0x202);
        assert_eq!(emu.display().presented(), 2);
    }

    #[test]
    fn fetch_past_memory_halts() {
        let mut emu = emu();
        emu.mem.pc.set_addr(0xFFF);
        assert!(matches!(
            emu.tick(),
            Err(EmuError::AddressOutOfRange { address: 0xFFF })
        ));
        assert_eq!(emu.state(), EmuState::Halted);
    }

    #[test]
    fn run_frame_executes_one_batch_and_one_tick() {
        // V0 += 1 forever
        let mut emu = emu_with(&[0x7001, 0x1200]);
        emu.delay_timer.set(10);
        emu.run_frame();
        // 12 instructions: six adds, six jumps
        assert_eq!(emu.regs.get(0), 6);
        assert_eq!(emu.delay_timer.get(), 9);
        assert_eq!(emu.display().presented(), 1);
    }

    /// Headless display that asks to close after a fixed number of frames.
    struct ClosingDisplay {
        fb: FrameBuffer,
        frames: u64,
        close_checks: Cell<u64>,
        closed: bool,
    }

    impl Display for ClosingDisplay {
        fn init(&mut self, title: &str, scale: u32) -> Result<(), EmuError> {
            self.fb.init(title, scale)
        }

        fn put_pixel(&mut self, x: u8, y: u8) -> bool {
            self.fb.put_pixel(x, y)
        }

        fn present(&mut self) -> Result<(), EmuError> {
            self.fb.present()
        }

        fn clear(&mut self) {
            self.fb.clear_buffer();
        }

        fn should_close(&self) -> bool {
            self.close_checks.set(self.close_checks.get() + 1);
            self.fb.presented() >= self.frames
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn run_paces_frames_until_close() {
        let display = ClosingDisplay {
            fb: FrameBuffer::new(),
            frames: 3,
            close_checks: Cell::new(0),
            closed: false,
        };
        let config = Config {
            seed: Some(7),
            ..Config::default()
        };
        let mut emu = Emulator::new(
            display,
            VirtualKeyboard::new(),
            CountingSound::default(),
            config,
        );
        // V0 += 1 forever
        emu.load_program(&[0x70, 0x01, 0x12, 0x00]).unwrap();
        emu.delay_timer.set(10);

        let start = Instant::now();
        emu.run();
        let elapsed = start.elapsed();

        assert_eq!(emu.display().fb.presented(), 3);
        // checked before every frame and once more to stop
        assert_eq!(emu.display().close_checks.get(), 4);
        assert!(emu.display().closed);
        // one batch and one timer tick per frame
        assert_eq!(emu.regs.get(0), 18);
        assert_eq!(emu.delay_timer.get(), 7);
        assert!(elapsed >= emu.config().frame_budget() * 2);
    }

    #[test]
    fn reload_resets_state() {
        let mut emu = emu_with(&[0x6AFF, 0x2200]);
        emu.tick().unwrap();
        emu.tick().unwrap();
        emu.delay_timer.set(3);
        emu.load_program(&[0x00, 0xE0]).unwrap();
        assert_eq!(emu.regs.get(0xA), 0);
        assert_eq!(emu.mem.stack.depth(), 0);
        assert_eq!(emu.delay_timer.get(), 0);
        assert_eq!(emu.pc(), PROGRAM_START);
        assert_eq!(emu.mem.slice(PROGRAM_START, 4), &[0x00, 0xE0, 0x00, 0x00]);
    }

    #[test]
    fn machine_routine_is_ignored() {
        let mut emu = emu_with(&[0x0123]);
        assert_eq!(emu.tick().unwrap(), OpCodes::MachineRoutine(0x123));
        assert_eq!(emu.pc(), 0x202);
    }

    #[test]
    fn register_dump_lists_all_registers() {
        let mut emu = emu();
        emu.regs.set_register(0xA, 0xBE);
        let dump = emu.dump_registers();
        assert!(dump.contains("|BE|"));
        assert!(dump.contains("PC = 0200"));
    }

    #[test]
    fn load_dumps_what_landed_in_memory() {
        let mut emu = emu();
        let program = [0x60, 0x2A, 0xA3];
        emu.load_program(&program).unwrap();
        let dump = hex_dump(emu.mem.slice(PROGRAM_START, program.len()));
        assert_eq!(dump, "00000000  60 2a a3\n");
    }

    #[test]
    fn hex_dump_rows() {
        let dump = hex_dump(&[0xAB; 17]);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.starts_with("00000000  ab"));
        assert!(dump.lines().nth(1).unwrap().starts_with("00000010  ab"));
    }
}
