use crate::memory::TypeAddr;

/// Index of VF, the register overwritten by carry, borrow and collision flags.
pub const FLAG: u8 = 0xF;

pub struct Registers {
    registers: [u8; 16],
}

impl Registers {
    pub fn new() -> Self {
        Self { registers: [0; 16] }
    }

    pub fn reset(&mut self) {
        self.registers = [0; 16];
    }

    pub fn set_register(&mut self, reg_num: u8, value: u8) {
        self.registers[(reg_num & 0xF) as usize] = value;
    }

    pub fn add_to_register(&mut self, reg_num: u8, value: u8) {
        let total = self.get(reg_num).wrapping_add(value);
        self.set_register(reg_num, total);
    }

    pub fn get(&self, reg_num: u8) -> u8 {
        self.registers[(reg_num & 0xF) as usize]
    }

    /// Writes VF. Call this after the primary result so the flag wins when
    /// the destination is VF itself.
    pub fn set_flag(&mut self, value: u8) {
        self.set_register(FLAG, value);
    }

    pub fn flag(&self) -> u8 {
        self.get(FLAG)
    }

    pub fn as_slice(&self) -> &[u8; 16] {
        &self.registers
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

// Special registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramCounter(pub TypeAddr);

impl ProgramCounter {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(2);
    }

    pub fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(2);
    }

    pub fn set_addr(&mut self, addr: TypeAddr) {
        self.0 = addr;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRegister(pub TypeAddr);

impl IndexRegister {
    pub fn set_addr(&mut self, addr: TypeAddr) {
        self.0 = addr;
    }

    /// 16-bit add, no flag.
    pub fn advance(&mut self, by: u16) {
        self.0 = self.0.wrapping_add(by);
    }
}
